//! Limited-memory BFGS (L-BFGS) optimizer.
//!
//! L-BFGS is a quasi-Newton method for large-scale optimization that approximates
//! the inverse Hessian using a limited history of gradient information. Optional
//! box bounds turn it into a projected variant: iterates are clipped to the box
//! and convergence is judged on the projected gradient.

use crate::primitives::Vector;

use super::line_search::WolfeLineSearch;
use super::{ConvergenceStatus, OptimizationResult, Optimizer};

/// Limited-memory BFGS (L-BFGS) optimizer.
///
/// # Algorithm
///
/// 1. Compute gradient `g_k` = ∇`f(x_k)`
/// 2. Compute search direction `d_k` using two-loop recursion (approximates H^(-1) * `g_k`)
/// 3. Find step size `α_k` via line search (Wolfe conditions; Armijo along the
///    projected path when bounded)
/// 4. Update: x_{k+1} = `x_k` + `α_k` * `d_k`
/// 5. Store gradient and position differences for next iteration
///
/// Stops when the (projected) gradient infinity norm drops below `tol`, or
/// when the relative objective reduction drops below `ftol`.
///
/// # Example
///
/// ```
/// use geoloc::optim::{ConvergenceStatus, Optimizer, LBFGS};
/// use geoloc::primitives::Vector;
///
/// let mut optimizer = LBFGS::new(100, 1e-5, 10);
///
/// let f = |x: &Vector<f64>| {
///     let (a, b) = (x[0], x[1]);
///     (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2)
/// };
/// let grad = |x: &Vector<f64>| {
///     let (a, b) = (x[0], x[1]);
///     Vector::from_slice(&[
///         -2.0 * (1.0 - a) - 400.0 * a * (b - a * a),
///         200.0 * (b - a * a),
///     ])
/// };
///
/// let result = optimizer.minimize(f, grad, Vector::from_slice(&[0.0, 0.0]));
/// assert_eq!(result.status, ConvergenceStatus::Converged);
/// assert!((result.solution[0] - 1.0).abs() < 1e-3);
/// ```
#[derive(Debug, Clone)]
pub struct LBFGS {
    /// Maximum number of iterations
    pub(crate) max_iter: usize,
    /// Convergence tolerance (projected gradient infinity norm)
    pub(crate) tol: f64,
    /// Relative objective reduction tolerance (0 disables)
    pub(crate) ftol: f64,
    /// History size (number of correction pairs to store)
    pub(crate) m: usize,
    /// Optional `(lower, upper)` box
    bounds: Option<(Vector<f64>, Vector<f64>)>,
    line_search: WolfeLineSearch,
    /// Position differences: `s_k` = x_{k+1} - `x_k`
    pub(crate) s_history: Vec<Vector<f64>>,
    /// Gradient differences: `y_k` = g_{k+1} - `g_k`
    pub(crate) y_history: Vec<Vector<f64>>,
}

impl LBFGS {
    /// Creates a new L-BFGS optimizer.
    ///
    /// * `max_iter` - Maximum number of iterations (typical: 100-15000)
    /// * `tol` - Convergence tolerance for the gradient (typical: 1e-5)
    /// * `m` - History size (typical: 5-20)
    #[must_use]
    pub fn new(max_iter: usize, tol: f64, m: usize) -> Self {
        Self {
            max_iter,
            tol,
            ftol: 0.0,
            m,
            bounds: None,
            line_search: WolfeLineSearch::new(1e-4, 0.9, 50),
            s_history: Vec::with_capacity(m),
            y_history: Vec::with_capacity(m),
        }
    }

    /// Also stop once `(f_k - f_{k+1}) / max(|f_k|, |f_{k+1}|, 1) <= ftol`.
    #[must_use]
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.ftol = ftol;
        self
    }

    /// Restricts iterates to `lower <= x <= upper`.
    ///
    /// # Panics
    ///
    /// Panics if the bounds have different lengths or cross.
    #[must_use]
    pub fn with_bounds(mut self, lower: Vector<f64>, upper: Vector<f64>) -> Self {
        assert_eq!(lower.len(), upper.len(), "bounds of unequal lengths");
        assert!(
            (0..lower.len()).all(|i| lower[i] <= upper[i]),
            "lower bound above upper bound"
        );
        self.bounds = Some((lower, upper));
        self
    }

    fn project(&self, x: &Vector<f64>) -> Vector<f64> {
        match &self.bounds {
            None => x.clone(),
            Some((lo, hi)) => Vector::from_vec(
                (0..x.len()).map(|i| x[i].clamp(lo[i], hi[i])).collect(),
            ),
        }
    }

    /// Infinity norm of `P(x - g) - x`, which is `‖g‖∞` when unbounded.
    fn projected_gradient_norm(&self, x: &Vector<f64>, grad: &Vector<f64>) -> f64 {
        self.project(&x.sub(grad)).sub(x).norm_inf()
    }

    /// Two-loop recursion: approximates -H^(-1) * grad.
    fn compute_direction(&self, grad: &Vector<f64>) -> Vector<f64> {
        let k = self.s_history.len();
        let mut q = grad.mul_scalar(-1.0);
        if k == 0 {
            return q;
        }

        let mut alpha = vec![0.0; k];
        let mut rho = vec![0.0; k];
        for i in (0..k).rev() {
            let (s, y) = (&self.s_history[i], &self.y_history[i]);
            rho[i] = 1.0 / y.dot(s);
            alpha[i] = rho[i] * s.dot(&q);
            q = q.add_scaled(-alpha[i], y);
        }

        // H_0 = (s^T y) / (y^T y) from the most recent pair
        let (s_last, y_last) = (&self.s_history[k - 1], &self.y_history[k - 1]);
        let gamma = s_last.dot(y_last) / y_last.dot(y_last);
        let mut r = q.mul_scalar(gamma);

        for i in 0..k {
            let (s, y) = (&self.s_history[i], &self.y_history[i]);
            let beta = rho[i] * y.dot(&r);
            r = r.add_scaled(alpha[i] - beta, s);
        }
        r
    }

    /// Armijo backtracking along the projected path `P(x + α d)`.
    fn projected_search<F>(&self, f: &F, x: &Vector<f64>, fx: f64, grad: &Vector<f64>, d: &Vector<f64>) -> Vector<f64>
    where
        F: Fn(&Vector<f64>) -> f64,
    {
        let c1 = self.line_search.c1;
        let mut alpha = 1.0;
        for _ in 0..self.line_search.max_iter {
            let x_new = self.project(&x.add_scaled(alpha, d));
            let decrease = grad.dot(&x_new.sub(x));
            let fx_new = f(&x_new);
            if fx_new.is_finite() && fx_new <= fx + c1 * decrease {
                return x_new;
            }
            alpha *= 0.5;
        }
        self.project(&x.add_scaled(alpha, d))
    }

    fn push_pair(&mut self, s_k: Vector<f64>, y_k: Vector<f64>) {
        // Curvature condition y^T s > 0 keeps the implicit Hessian positive definite
        if y_k.dot(&s_k) > 1e-10 {
            if self.s_history.len() >= self.m {
                self.s_history.remove(0);
                self.y_history.remove(0);
            }
            self.s_history.push(s_k);
            self.y_history.push(y_k);
        }
    }
}

impl Optimizer for LBFGS {
    fn minimize<F, G>(&mut self, objective: F, gradient: G, x0: Vector<f64>) -> OptimizationResult
    where
        F: Fn(&Vector<f64>) -> f64,
        G: Fn(&Vector<f64>) -> Vector<f64>,
    {
        let start_time = std::time::Instant::now();
        self.reset();

        let mut x = self.project(&x0);
        let mut fx = objective(&x);
        let mut grad = gradient(&x);
        let mut grad_norm = self.projected_gradient_norm(&x, &grad);

        let finish = |x: Vector<f64>, fx: f64, iterations: usize, status: ConvergenceStatus, grad_norm: f64| {
            OptimizationResult {
                solution: x,
                objective_value: fx,
                iterations,
                status,
                gradient_norm: grad_norm,
                elapsed_time: start_time.elapsed(),
            }
        };

        for iter in 0..self.max_iter {
            if grad_norm < self.tol {
                return finish(x, fx, iter, ConvergenceStatus::Converged, grad_norm);
            }

            let mut d = self.compute_direction(&grad);
            if grad.dot(&d) >= 0.0 {
                // Not a descent direction; restart from steepest descent
                self.reset();
                d = grad.mul_scalar(-1.0);
            }

            let x_new = if self.bounds.is_some() {
                self.projected_search(&objective, &x, fx, &grad, &d)
            } else {
                let alpha = self.line_search.search(&objective, &gradient, &x, &d);
                if alpha < 1e-12 {
                    return finish(x, fx, iter, ConvergenceStatus::Stalled, grad_norm);
                }
                x.add_scaled(alpha, &d)
            };

            let fx_new = objective(&x_new);
            if !fx_new.is_finite() {
                return finish(x, fx, iter, ConvergenceStatus::NumericalError, grad_norm);
            }
            let grad_new = gradient(&x_new);

            let s_k = x_new.sub(&x);
            if s_k.norm_inf() == 0.0 {
                return finish(x, fx, iter, ConvergenceStatus::Stalled, grad_norm);
            }
            self.push_pair(s_k, grad_new.sub(&grad));

            let reduction = (fx - fx_new) / fx.abs().max(fx_new.abs()).max(1.0);
            x = x_new;
            fx = fx_new;
            grad = grad_new;
            grad_norm = self.projected_gradient_norm(&x, &grad);

            if self.ftol > 0.0 && reduction <= self.ftol {
                return finish(x, fx, iter + 1, ConvergenceStatus::Converged, grad_norm);
            }
        }

        finish(x, fx, self.max_iter, ConvergenceStatus::MaxIterations, grad_norm)
    }

    fn reset(&mut self) {
        self.s_history.clear();
        self.y_history.clear();
    }
}
