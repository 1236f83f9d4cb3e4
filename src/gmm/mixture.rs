//! Plain Gaussian mixture value over 2-D points.
//!
//! A [`Mixture`] is just weights, means and covariances. Fitting lives in
//! [`super::em`]; the geographic interpretation in [`super::GeoGmm`].

use crate::error::{GeolocError, Result};
use crate::primitives::Matrix;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::str::FromStr;

/// Guard against division by zero in normalizations.
pub(crate) const EPS: f64 = f64::EPSILON;

/// Covariance matrix types for Gaussian Mixture Models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceType {
    /// Full covariance matrix (most flexible, most parameters).
    #[default]
    Full,
    /// Tied covariance (all components share same covariance).
    Tied,
    /// Diagonal covariance (assumes feature independence).
    Diag,
    /// Spherical covariance (isotropic, like K-Means).
    Spherical,
}

impl CovarianceType {
    /// Free covariance parameters for `k` components in 2-D.
    #[must_use]
    pub fn n_cov_params(self, k: usize) -> usize {
        const D: usize = 2;
        match self {
            CovarianceType::Full => k * D * (D + 1) / 2,
            CovarianceType::Diag => k * D,
            CovarianceType::Spherical => k,
            CovarianceType::Tied => D * (D + 1) / 2,
        }
    }
}

impl FromStr for CovarianceType {
    type Err = GeolocError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(Self::Full),
            "tied" => Ok(Self::Tied),
            "diag" => Ok(Self::Diag),
            "spherical" => Ok(Self::Spherical),
            _ => Err(GeolocError::invalid_param(
                "covariance_type",
                s,
                "one of full, tied, diag, spherical",
            )),
        }
    }
}

/// Symmetric 2×2 covariance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cov2 {
    /// Variance of x.
    pub xx: f64,
    /// Covariance of x and y.
    pub xy: f64,
    /// Variance of y.
    pub yy: f64,
}

impl Cov2 {
    /// Builds a covariance from its three distinct entries.
    #[must_use]
    pub fn new(xx: f64, xy: f64, yy: f64) -> Self {
        Self { xx, xy, yy }
    }

    /// Isotropic covariance `v·I`.
    #[must_use]
    pub fn isotropic(v: f64) -> Self {
        Self::new(v, 0.0, v)
    }

    /// Determinant.
    #[must_use]
    pub fn det(&self) -> f64 {
        self.xx * self.yy - self.xy * self.xy
    }

    /// Squared Mahalanobis distance of `(dx, dy)` from the mean.
    #[must_use]
    pub fn mahalanobis_sq(&self, dx: f64, dy: f64) -> f64 {
        (self.yy * dx * dx - 2.0 * self.xy * dx * dy + self.xx * dy * dy) / self.det()
    }

    /// Log density of a zero-mean Gaussian with this covariance at `(dx, dy)`.
    #[must_use]
    pub fn log_pdf(&self, dx: f64, dy: f64) -> f64 {
        -(2.0 * PI).ln() - 0.5 * self.det().ln() - 0.5 * self.mahalanobis_sq(dx, dy)
    }

    /// Lower Cholesky factor `(l11, l21, l22)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix is not positive definite.
    pub fn cholesky(&self) -> Result<(f64, f64, f64)> {
        let m = Matrix::from_vec(2, 2, vec![self.xx, self.xy, self.xy, self.yy])?;
        let l = m.cholesky()?;
        Ok((l.get(0, 0), l.get(1, 0), l.get(1, 1)))
    }

    /// Entries in row-major order.
    #[must_use]
    pub fn entries(&self) -> [f64; 4] {
        [self.xx, self.xy, self.xy, self.yy]
    }
}

/// A mixture of bivariate Gaussians.
///
/// Covariances are always stored per component; `covariance_type` records
/// the constraint they were fitted under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mixture {
    weights: Vec<f64>,
    means: Vec<[f64; 2]>,
    covariances: Vec<Cov2>,
    covariance_type: CovarianceType,
}

impl Mixture {
    /// Assembles a mixture from its parts.
    ///
    /// # Errors
    ///
    /// Returns an error if the parts have different lengths or are empty.
    pub fn new(
        weights: Vec<f64>,
        means: Vec<[f64; 2]>,
        covariances: Vec<Cov2>,
        covariance_type: CovarianceType,
    ) -> Result<Self> {
        if weights.is_empty() {
            return Err(GeolocError::empty_input("mixture components"));
        }
        if means.len() != weights.len() {
            return Err(GeolocError::dimension_mismatch(
                "means",
                weights.len(),
                means.len(),
            ));
        }
        if covariances.len() != weights.len() {
            return Err(GeolocError::dimension_mismatch(
                "covariances",
                weights.len(),
                covariances.len(),
            ));
        }
        Ok(Self {
            weights,
            means,
            covariances,
            covariance_type,
        })
    }

    /// Number of components.
    #[must_use]
    pub fn n_components(&self) -> usize {
        self.weights.len()
    }

    /// Component weights.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Component means.
    #[must_use]
    pub fn means(&self) -> &[[f64; 2]] {
        &self.means
    }

    /// Component covariances.
    #[must_use]
    pub fn covariances(&self) -> &[Cov2] {
        &self.covariances
    }

    /// Covariance constraint.
    #[must_use]
    pub fn covariance_type(&self) -> CovarianceType {
        self.covariance_type
    }

    /// Per-component `log w_k + log N(x | μ_k, Σ_k)`.
    #[must_use]
    pub fn weighted_log_probs(&self, x: f64, y: f64) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.means)
            .zip(&self.covariances)
            .map(|((w, m), c)| w.ln() + c.log_pdf(x - m[0], y - m[1]))
            .collect()
    }

    /// Mixture log density and most responsible component at a point.
    #[must_use]
    pub fn score_and_component(&self, x: f64, y: f64) -> (f64, usize) {
        let lp = self.weighted_log_probs(x, y);
        (logsumexp(&lp), argmax(&lp))
    }

    /// Mixture log density at a point.
    #[must_use]
    pub fn score(&self, x: f64, y: f64) -> f64 {
        logsumexp(&self.weighted_log_probs(x, y))
    }

    /// Log density for every row of an `n × 2` matrix.
    #[must_use]
    pub fn score_samples(&self, data: &Matrix<f64>) -> Vec<f64> {
        data.rows_iter().map(|r| self.score(r[0], r[1])).collect()
    }

    /// Most responsible component for every row.
    #[must_use]
    pub fn predict(&self, data: &Matrix<f64>) -> Vec<usize> {
        data.rows_iter()
            .map(|r| argmax(&self.weighted_log_probs(r[0], r[1])))
            .collect()
    }

    /// Posterior responsibilities (`n × k`).
    #[must_use]
    pub fn predict_proba(&self, data: &Matrix<f64>) -> Matrix<f64> {
        let k = self.n_components();
        let mut out = Matrix::zeros(data.n_rows(), k);
        for (i, r) in data.rows_iter().enumerate() {
            let lp = self.weighted_log_probs(r[0], r[1]);
            let norm = logsumexp(&lp);
            for (j, v) in lp.iter().enumerate() {
                out.set(i, j, (v - norm).exp());
            }
        }
        out
    }

    /// Total log likelihood of `data`.
    #[must_use]
    pub fn log_likelihood(&self, data: &Matrix<f64>) -> f64 {
        self.score_samples(data).iter().sum()
    }

    /// Number of free parameters.
    #[must_use]
    pub fn n_parameters(&self) -> usize {
        let k = self.n_components();
        self.covariance_type.n_cov_params(k) + 2 * k + k - 1
    }

    /// Bayesian information criterion on `data`.
    #[must_use]
    pub fn bic(&self, data: &Matrix<f64>) -> f64 {
        -2.0 * self.log_likelihood(data) + self.n_parameters() as f64 * (data.n_rows() as f64).ln()
    }

    /// Akaike information criterion on `data`.
    #[must_use]
    pub fn aic(&self, data: &Matrix<f64>) -> f64 {
        -2.0 * self.log_likelihood(data) + 2.0 * self.n_parameters() as f64
    }

    /// Draws `n` points with the index of the component each came from.
    ///
    /// # Errors
    ///
    /// Returns an error if a covariance is not positive definite.
    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Result<Vec<([f64; 2], usize)>> {
        let factors = self
            .covariances
            .iter()
            .map(Cov2::cholesky)
            .collect::<Result<Vec<_>>>()?;
        let mut cumulative = Vec::with_capacity(self.weights.len());
        let mut acc = 0.0;
        for w in &self.weights {
            acc += w;
            cumulative.push(acc);
        }
        let last = self.weights.len() - 1;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let u: f64 = rng.gen::<f64>() * acc;
            let k = cumulative.partition_point(|&c| c <= u).min(last);
            let (l11, l21, l22) = factors[k];
            let z1: f64 = rng.sample(StandardNormal);
            let z2: f64 = rng.sample(StandardNormal);
            let m = self.means[k];
            out.push(([m[0] + l11 * z1, m[1] + l21 * z1 + l22 * z2], k));
        }
        Ok(out)
    }

    /// Keeps the listed components and renormalizes their weights.
    #[must_use]
    pub fn select(&self, keep: &[usize]) -> Self {
        let weights: Vec<f64> = keep.iter().map(|&i| self.weights[i]).collect();
        let total: f64 = weights.iter().sum();
        Self {
            weights: weights.iter().map(|w| w / total).collect(),
            means: keep.iter().map(|&i| self.means[i]).collect(),
            covariances: keep.iter().map(|&i| self.covariances[i]).collect(),
            covariance_type: self.covariance_type,
        }
    }

    /// Concatenates mixtures, scaling each one's weights by its factor, then
    /// renormalizes the whole weight vector.
    ///
    /// # Panics
    ///
    /// Panics if `parts` is empty or covariance types differ.
    #[must_use]
    pub fn concat(parts: &[(&Mixture, f64)]) -> Self {
        assert!(!parts.is_empty(), "cannot concatenate zero mixtures");
        let covariance_type = parts[0].0.covariance_type;
        let mut weights = Vec::new();
        let mut means = Vec::new();
        let mut covariances = Vec::new();
        for (m, scale) in parts {
            assert_eq!(
                m.covariance_type, covariance_type,
                "mixed covariance types in concatenation"
            );
            weights.extend(m.weights.iter().map(|w| w * scale));
            means.extend_from_slice(&m.means);
            covariances.extend_from_slice(&m.covariances);
        }
        let total: f64 = weights.iter().sum();
        weights.iter_mut().for_each(|w| *w /= total);
        Self {
            weights,
            means,
            covariances,
            covariance_type,
        }
    }

    /// Weighted mean of the component means.
    #[must_use]
    pub fn weighted_mean(&self) -> [f64; 2] {
        let total: f64 = self.weights.iter().sum();
        let mut acc = [0.0, 0.0];
        for (w, m) in self.weights.iter().zip(&self.means) {
            acc[0] += w * m[0];
            acc[1] += w * m[1];
        }
        [acc[0] / total, acc[1] / total]
    }

    /// The component mean with the highest mixture density.
    #[must_use]
    pub fn max_mean(&self) -> [f64; 2] {
        let scores: Vec<f64> = self.means.iter().map(|m| self.score(m[0], m[1])).collect();
        self.means[argmax(&scores)]
    }

    /// Sum of all entries of the covariance representation for this type.
    ///
    /// Full: each 2×2 matrix. Diag: each diagonal. Spherical: each variance,
    /// counted once per dimension. Tied: the single shared matrix.
    #[must_use]
    pub fn covar_sumsum(&self) -> f64 {
        match self.covariance_type {
            CovarianceType::Full => self.covariances.iter().map(|c| c.entries().iter().sum::<f64>()).sum(),
            CovarianceType::Diag | CovarianceType::Spherical => {
                self.covariances.iter().map(|c| c.xx + c.yy).sum()
            }
            CovarianceType::Tied => self.covariances[0].entries().iter().sum(),
        }
    }

    /// Sum over representation rows of the product of their entries.
    ///
    /// Full: product of all four entries per component. Diag and spherical:
    /// product of the diagonal per component. Tied: row products of the
    /// shared matrix.
    #[must_use]
    pub fn covar_sumprod(&self) -> f64 {
        match self.covariance_type {
            CovarianceType::Full => self
                .covariances
                .iter()
                .map(|c| c.entries().iter().product::<f64>())
                .sum(),
            CovarianceType::Diag | CovarianceType::Spherical => {
                self.covariances.iter().map(|c| c.xx * c.yy).sum()
            }
            CovarianceType::Tied => {
                let c = self.covariances[0];
                c.xx * c.xy + c.xy * c.yy
            }
        }
    }
}

/// Numerically stable `ln Σ exp(v)`.
#[must_use]
pub fn logsumexp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Index of the largest value (first on ties).
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
