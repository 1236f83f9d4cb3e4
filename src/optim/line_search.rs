//! Step-size selection for L-BFGS.

use crate::primitives::Vector;

/// Bisection search for a step satisfying the weak Wolfe conditions.
///
/// ```text
/// sufficient decrease: f(x + αd) ≤ f(x) + c₁ α ∇f(x)ᵀd
/// curvature:           |∇f(x + αd)ᵀd| ≤ c₂ |∇f(x)ᵀd|
/// ```
///
/// Steps that make the objective non-finite count as too long.
///
/// # Example
///
/// ```
/// use geoloc::optim::WolfeLineSearch;
/// use geoloc::primitives::Vector;
///
/// let ls = WolfeLineSearch::new(1e-4, 0.9, 50);
/// let f = |x: &Vector<f64>| (x[0] - 3.0).powi(2);
/// let g = |x: &Vector<f64>| Vector::from_slice(&[2.0 * (x[0] - 3.0)]);
///
/// let x = Vector::from_slice(&[0.0]);
/// let d = Vector::from_slice(&[1.0]);
/// let alpha = ls.search(&f, &g, &x, &d);
/// assert!(f(&x.add_scaled(alpha, &d)) < f(&x));
/// ```
#[derive(Debug, Clone)]
pub struct WolfeLineSearch {
    pub(crate) c1: f64,
    pub(crate) c2: f64,
    pub(crate) max_iter: usize,
}

impl WolfeLineSearch {
    /// # Panics
    ///
    /// Panics unless `0 < c1 < c2 < 1`.
    #[must_use]
    pub fn new(c1: f64, c2: f64, max_iter: usize) -> Self {
        assert!(
            c1 > 0.0 && c1 < c2 && c2 < 1.0,
            "Wolfe constants need 0 < c1 < c2 < 1, got c1={c1} c2={c2}"
        );
        Self { c1, c2, max_iter }
    }

    /// Step length along `d` from `x`. When `max_iter` trials pass without
    /// meeting both conditions, returns the longest step that met the
    /// decrease condition, or the last trial if none did.
    pub fn search<F, G>(&self, f: &F, grad: &G, x: &Vector<f64>, d: &Vector<f64>) -> f64
    where
        F: Fn(&Vector<f64>) -> f64,
        G: Fn(&Vector<f64>) -> Vector<f64>,
    {
        let f0 = f(x);
        let slope0 = grad(x).dot(d);
        let (mut lo, mut hi) = (0.0, f64::INFINITY);
        let mut alpha = 1.0;

        for _ in 0..self.max_iter {
            let trial = x.add_scaled(alpha, d);
            let ft = f(&trial);
            if !ft.is_finite() || ft > f0 + self.c1 * alpha * slope0 {
                hi = alpha;
            } else {
                let slope = grad(&trial).dot(d);
                if slope.abs() <= self.c2 * slope0.abs() {
                    return alpha;
                }
                if slope > 0.0 {
                    hi = alpha;
                } else {
                    lo = alpha;
                }
            }
            alpha = if hi.is_finite() { 0.5 * (lo + hi) } else { 2.0 * lo };
        }
        if lo > 0.0 {
            lo
        } else {
            alpha
        }
    }
}
