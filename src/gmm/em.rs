//! Expectation-Maximization fitting of [`Mixture`]s.

use super::kmeans::KMeans;
use super::mixture::{logsumexp, Cov2, CovarianceType, Mixture, EPS};
use crate::error::{GeolocError, Result};
use crate::primitives::Matrix;
use crate::traits::UnsupervisedEstimator;
use tracing::debug;

/// Gaussian Mixture Model estimator for 2-D points.
///
/// # Algorithm
///
/// 1. Seed means with K-Means, weights uniform, covariances from the data
/// 2. **E-step**: responsibilities of each component for each point
/// 3. **M-step**: update weights, means and covariances (plus `min_covar`
///    on the diagonal)
/// 4. Repeat until the total log likelihood changes by less than `tol`
///
/// # Examples
///
/// ```
/// use geoloc::gmm::{CovarianceType, GaussianMixture};
/// use geoloc::primitives::Matrix;
/// use geoloc::traits::UnsupervisedEstimator;
///
/// let data = Matrix::from_points(&[
///     (1.0, 1.0), (1.1, 1.0), (1.0, 1.1),
///     (5.0, 5.0), (5.1, 5.0), (5.0, 5.1),
/// ]);
/// let mut gmm = GaussianMixture::new(2, CovarianceType::Full);
/// gmm.fit(&data).expect("fit succeeds");
/// let labels = gmm.predict(&data);
/// assert_eq!(labels[0], labels[2]);
/// assert_ne!(labels[0], labels[3]);
/// ```
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    /// Number of mixture components.
    n_components: usize,
    /// Covariance constraint.
    covariance_type: CovarianceType,
    /// Maximum number of EM iterations.
    max_iter: usize,
    /// Convergence tolerance on total log likelihood.
    tol: f64,
    /// Floor added to covariance diagonals.
    min_covar: f64,
    /// Random seed for initialization.
    random_state: u64,
    /// Fitted mixture.
    mixture: Option<Mixture>,
    /// Iterations run by the last fit.
    n_iter: usize,
    /// Whether the last fit met `tol`.
    converged: bool,
}

impl GaussianMixture {
    /// Create new `GaussianMixture` with specified number of components and covariance type.
    #[must_use]
    pub fn new(n_components: usize, covariance_type: CovarianceType) -> Self {
        Self {
            n_components,
            covariance_type,
            max_iter: 1000,
            tol: 1e-3,
            min_covar: 1e-3,
            random_state: 0,
            mixture: None,
            n_iter: 0,
            converged: false,
        }
    }

    /// Set maximum number of EM iterations.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set convergence tolerance.
    #[must_use]
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set covariance diagonal floor.
    #[must_use]
    pub fn with_min_covar(mut self, min_covar: f64) -> Self {
        self.min_covar = min_covar;
        self
    }

    /// Set random seed for reproducibility.
    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fitted mixture, if any.
    #[must_use]
    pub fn mixture(&self) -> Option<&Mixture> {
        self.mixture.as_ref()
    }

    /// Consumes the estimator, returning the fitted mixture.
    #[must_use]
    pub fn into_mixture(self) -> Option<Mixture> {
        self.mixture
    }

    /// Iterations run by the last fit.
    #[must_use]
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Whether the last fit converged.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Covariance of all data plus the floor, shaped by covariance type.
    fn initial_covariance(&self, x: &Matrix<f64>) -> Cov2 {
        let n = x.n_rows();
        let means = x.column_means();
        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        for r in x.rows_iter() {
            let (dx, dy) = (r[0] - means[0], r[1] - means[1]);
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
        }
        let ddof = if n > 1 { (n - 1) as f64 } else { 1.0 };
        let (xx, xy, yy) = (sxx / ddof, sxy / ddof, syy / ddof);
        let m = self.min_covar;
        match self.covariance_type {
            CovarianceType::Full | CovarianceType::Tied => Cov2::new(xx + m, xy, yy + m),
            CovarianceType::Diag => Cov2::new(xx + m, 0.0, yy + m),
            CovarianceType::Spherical => Cov2::isotropic((xx + yy) / 2.0 + m),
        }
    }

    fn initialize(&self, x: &Matrix<f64>) -> Result<Mixture> {
        let mut kmeans = KMeans::new(self.n_components).with_random_state(self.random_state);
        kmeans.fit(x)?;
        let centroids = kmeans
            .centroids()
            .ok_or_else(|| GeolocError::Other("k-means produced no centroids".to_string()))?;
        let means: Vec<[f64; 2]> = centroids.rows_iter().map(|r| [r[0], r[1]]).collect();
        let k = self.n_components;
        Mixture::new(
            vec![1.0 / k as f64; k],
            means,
            vec![self.initial_covariance(x); k],
            self.covariance_type,
        )
    }

    /// E-step: responsibilities (`n × k`) and total log likelihood.
    fn expectation(mixture: &Mixture, x: &Matrix<f64>) -> (Matrix<f64>, f64) {
        let k = mixture.n_components();
        let mut resp = Matrix::zeros(x.n_rows(), k);
        let mut total = 0.0;
        for (i, r) in x.rows_iter().enumerate() {
            let lp = mixture.weighted_log_probs(r[0], r[1]);
            let norm = logsumexp(&lp);
            total += norm;
            for (j, v) in lp.iter().enumerate() {
                resp.set(i, j, (v - norm).exp());
            }
        }
        (resp, total)
    }

    /// M-step.
    fn maximization(&self, x: &Matrix<f64>, resp: &Matrix<f64>) -> Result<Mixture> {
        let (n, k) = resp.shape();
        let m = self.min_covar;
        let mut nk = vec![0.0; k];
        let mut sums = vec![[0.0, 0.0]; k];
        for (i, r) in x.rows_iter().enumerate() {
            for j in 0..k {
                let p = resp.get(i, j);
                nk[j] += p;
                sums[j][0] += p * r[0];
                sums[j][1] += p * r[1];
            }
        }
        let total: f64 = nk.iter().sum();
        let weights: Vec<f64> = nk.iter().map(|w| w / (total + 10.0 * EPS) + EPS).collect();
        let means: Vec<[f64; 2]> = sums
            .iter()
            .zip(&nk)
            .map(|(s, w)| [s[0] / (w + 10.0 * EPS), s[1] / (w + 10.0 * EPS)])
            .collect();

        // weighted scatter per component
        let mut scatter = vec![(0.0, 0.0, 0.0); k];
        for (i, r) in x.rows_iter().enumerate() {
            for j in 0..k {
                let p = resp.get(i, j);
                let (dx, dy) = (r[0] - means[j][0], r[1] - means[j][1]);
                scatter[j].0 += p * dx * dx;
                scatter[j].1 += p * dx * dy;
                scatter[j].2 += p * dy * dy;
            }
        }

        let covariances: Vec<Cov2> = match self.covariance_type {
            CovarianceType::Full => scatter
                .iter()
                .zip(&nk)
                .map(|(s, w)| {
                    let d = w + 10.0 * EPS;
                    Cov2::new(s.0 / d + m, s.1 / d, s.2 / d + m)
                })
                .collect(),
            CovarianceType::Diag => scatter
                .iter()
                .zip(&nk)
                .map(|(s, w)| {
                    let d = w + 10.0 * EPS;
                    Cov2::new(s.0 / d + m, 0.0, s.2 / d + m)
                })
                .collect(),
            CovarianceType::Spherical => scatter
                .iter()
                .zip(&nk)
                .map(|(s, w)| {
                    let d = w + 10.0 * EPS;
                    Cov2::isotropic((s.0 / d + s.2 / d) / 2.0 + m)
                })
                .collect(),
            CovarianceType::Tied => {
                let (mut xx, mut xy, mut yy) = (0.0, 0.0, 0.0);
                for s in &scatter {
                    xx += s.0;
                    xy += s.1;
                    yy += s.2;
                }
                let nf = n as f64;
                vec![Cov2::new(xx / nf + m, xy / nf, yy / nf + m); k]
            }
        };

        Mixture::new(weights, means, covariances, self.covariance_type)
    }
}

impl UnsupervisedEstimator for GaussianMixture {
    type Labels = Vec<usize>;

    /// # Errors
    ///
    /// Returns an error if data is empty or has fewer points than components.
    fn fit(&mut self, x: &Matrix<f64>) -> Result<()> {
        if x.n_cols() != 2 {
            return Err(GeolocError::dimension_mismatch("cols", 2, x.n_cols()));
        }
        let mut mixture = self.initialize(x)?;
        let mut prev = f64::NEG_INFINITY;
        self.converged = false;
        self.n_iter = 0;

        for iter in 0..self.max_iter {
            let (resp, log_likelihood) = Self::expectation(&mixture, x);
            self.n_iter = iter + 1;
            if (log_likelihood - prev).abs() < self.tol {
                self.converged = true;
                break;
            }
            prev = log_likelihood;
            mixture = self.maximization(x, &resp)?;
        }

        debug!(
            n_points = x.n_rows(),
            n_components = self.n_components,
            n_iter = self.n_iter,
            converged = self.converged,
            "EM fit finished"
        );
        self.mixture = Some(mixture);
        Ok(())
    }

    fn predict(&self, x: &Matrix<f64>) -> Vec<usize> {
        match &self.mixture {
            Some(m) => m.predict(x),
            None => vec![0; x.n_rows()],
        }
    }
}
