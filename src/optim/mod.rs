//! Batch optimization for smooth objectives.
//!
//! - [`LBFGS`] - Limited-memory BFGS, optionally box-bounded
//! - [`WolfeLineSearch`] - step size selection
//! - [`check_grad`] - finite-difference check of an analytic gradient
//!
//! ```
//! use geoloc::optim::{ConvergenceStatus, Optimizer, LBFGS};
//! use geoloc::primitives::Vector;
//!
//! let mut optimizer = LBFGS::new(100, 1e-5, 10);
//! let objective = |x: &Vector<f64>| (x[0] - 5.0).powi(2) + (x[1] - 3.0).powi(2);
//! let gradient = |x: &Vector<f64>| Vector::from_slice(&[2.0 * (x[0] - 5.0), 2.0 * (x[1] - 3.0)]);
//!
//! let result = optimizer.minimize(objective, gradient, Vector::from_slice(&[0.0, 0.0]));
//! assert_eq!(result.status, ConvergenceStatus::Converged);
//! assert!((result.solution[0] - 5.0).abs() < 1e-4);
//! ```

use serde::{Deserialize, Serialize};

use crate::primitives::Vector;

mod lbfgs;
mod line_search;

pub use lbfgs::LBFGS;
pub use line_search::WolfeLineSearch;

/// Result of an optimization procedure.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Final solution (optimized parameters)
    pub solution: Vector<f64>,
    /// Final objective function value
    pub objective_value: f64,
    /// Number of iterations performed
    pub iterations: usize,
    /// Convergence status
    pub status: ConvergenceStatus,
    /// Final (projected) gradient infinity norm
    pub gradient_norm: f64,
    /// Total elapsed time
    pub elapsed_time: std::time::Duration,
}

/// Convergence status of an optimization procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceStatus {
    /// Gradient or objective reduction below tolerance
    Converged,
    /// Reached maximum iteration limit
    MaxIterations,
    /// Progress stalled (step size too small)
    Stalled,
    /// Numerical error (NaN, Inf, etc.)
    NumericalError,
}

/// Batch minimizer of a differentiable objective.
pub trait Optimizer {
    /// Minimizes `objective` starting from `x0`, using `gradient` as its
    /// derivative. Always returns the best iterate reached; check `status`.
    fn minimize<F, G>(&mut self, objective: F, gradient: G, x0: Vector<f64>) -> OptimizationResult
    where
        F: Fn(&Vector<f64>) -> f64,
        G: Fn(&Vector<f64>) -> Vector<f64>;

    /// Clears any state carried between runs.
    fn reset(&mut self);
}

/// Euclidean norm of the difference between `gradient(x0)` and a symmetric
/// finite-difference estimate of the gradient of `objective` at `x0`.
///
/// ```
/// use geoloc::optim::check_grad;
/// use geoloc::primitives::Vector;
///
/// let f = |x: &Vector<f64>| x[0] * x[0] + 3.0 * x[1];
/// let g = |x: &Vector<f64>| Vector::from_slice(&[2.0 * x[0], 3.0]);
/// assert!(check_grad(f, g, &Vector::from_slice(&[1.0, 2.0])) < 1e-6);
/// ```
pub fn check_grad<F, G>(objective: F, gradient: G, x0: &Vector<f64>) -> f64
where
    F: Fn(&Vector<f64>) -> f64,
    G: Fn(&Vector<f64>) -> Vector<f64>,
{
    const H: f64 = 1e-6;
    let analytic = gradient(x0);
    let mut sq = 0.0;
    for i in 0..x0.len() {
        let mut up = x0.clone();
        let mut down = x0.clone();
        up[i] += H;
        down[i] -= H;
        let numeric = (objective(&up) - objective(&down)) / (2.0 * H);
        sq += (analytic[i] - numeric).powi(2);
    }
    sq.sqrt()
}
