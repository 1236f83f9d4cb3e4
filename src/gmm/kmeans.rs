//! K-Means used to seed EM.
//!
//! Deterministic: the first centroid is picked by seed, the rest by
//! farthest-first selection, then Lloyd iterations.

use crate::error::{GeolocError, Result};
use crate::primitives::Matrix;
use crate::traits::UnsupervisedEstimator;

/// K-Means clustering over `n × 2` point matrices.
#[derive(Debug, Clone)]
pub struct KMeans {
    /// Number of clusters.
    n_clusters: usize,
    /// Maximum iterations.
    max_iter: usize,
    /// Convergence tolerance on centroid movement.
    tol: f64,
    /// Random seed for initialization.
    random_state: u64,
    /// Cluster centroids after fitting (`k × 2`).
    centroids: Option<Matrix<f64>>,
}

impl KMeans {
    /// Creates a new K-Means with `n_clusters` clusters.
    #[must_use]
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iter: 300,
            tol: 1e-4,
            random_state: 0,
            centroids: None,
        }
    }

    /// Sets the random seed for reproducibility.
    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Sets the maximum number of Lloyd iterations.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Fitted centroids.
    #[must_use]
    pub fn centroids(&self) -> Option<&Matrix<f64>> {
        self.centroids.as_ref()
    }

    fn dist_sq(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    }

    fn farthest_first_init(&self, x: &Matrix<f64>) -> Vec<Vec<f64>> {
        let n_samples = x.n_rows();
        let first_idx = (self.random_state % n_samples as u64) as usize;
        let mut centroids = vec![x.row_slice(first_idx).to_vec()];

        while centroids.len() < self.n_clusters {
            let mut max_dist = 0.0;
            let mut max_idx = 0;
            for (i, row) in x.rows_iter().enumerate() {
                let d = centroids
                    .iter()
                    .map(|c| Self::dist_sq(row, c))
                    .fold(f64::INFINITY, f64::min);
                if d > max_dist {
                    max_dist = d;
                    max_idx = i;
                }
            }
            centroids.push(x.row_slice(max_idx).to_vec());
        }
        centroids
    }

    fn assign_labels(x: &Matrix<f64>, centroids: &[Vec<f64>]) -> Vec<usize> {
        x.rows_iter()
            .map(|row| {
                let mut best = 0;
                let mut best_d = f64::INFINITY;
                for (k, c) in centroids.iter().enumerate() {
                    let d = Self::dist_sq(row, c);
                    if d < best_d {
                        best_d = d;
                        best = k;
                    }
                }
                best
            })
            .collect()
    }

    /// Mean of assigned points; clusters left empty keep their centroid.
    fn update_centroids(x: &Matrix<f64>, labels: &[usize], old: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let d = x.n_cols();
        let mut sums = vec![vec![0.0; d]; old.len()];
        let mut counts = vec![0usize; old.len()];
        for (row, &k) in x.rows_iter().zip(labels) {
            counts[k] += 1;
            for (s, v) in sums[k].iter_mut().zip(row) {
                *s += v;
            }
        }
        sums.into_iter()
            .zip(counts)
            .zip(old)
            .map(|((s, ct), prev)| {
                if ct == 0 {
                    prev.clone()
                } else {
                    s.into_iter().map(|v| v / ct as f64).collect()
                }
            })
            .collect()
    }
}

impl UnsupervisedEstimator for KMeans {
    type Labels = Vec<usize>;

    /// # Errors
    ///
    /// Returns an error if data is empty or has fewer samples than clusters.
    fn fit(&mut self, x: &Matrix<f64>) -> Result<()> {
        let n_samples = x.n_rows();
        if n_samples == 0 {
            return Err(GeolocError::empty_input("k-means data"));
        }
        if n_samples < self.n_clusters || self.n_clusters == 0 {
            return Err(GeolocError::invalid_param(
                "n_clusters",
                self.n_clusters,
                &format!("in 1..={n_samples}"),
            ));
        }

        let mut centroids = self.farthest_first_init(x);
        for _ in 0..self.max_iter {
            let labels = Self::assign_labels(x, &centroids);
            let updated = Self::update_centroids(x, &labels, &centroids);
            let moved = centroids
                .iter()
                .zip(&updated)
                .any(|(a, b)| Self::dist_sq(a, b) > self.tol * self.tol);
            centroids = updated;
            if !moved {
                break;
            }
        }

        let flat: Vec<f64> = centroids.into_iter().flatten().collect();
        self.centroids = Some(Matrix::from_vec(self.n_clusters, x.n_cols(), flat)?);
        Ok(())
    }

    fn predict(&self, x: &Matrix<f64>) -> Vec<usize> {
        match &self.centroids {
            Some(c) => {
                let rows: Vec<Vec<f64>> = c.rows_iter().map(<[f64]>::to_vec).collect();
                Self::assign_labels(x, &rows)
            }
            None => vec![0; x.n_rows()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> Matrix<f64> {
        Matrix::from_points(&[
            (1.0, 2.0),
            (1.5, 1.8),
            (5.0, 8.0),
            (8.0, 8.0),
            (1.0, 0.6),
            (9.0, 11.0),
        ])
    }

    #[test]
    fn test_fit_two_clusters() {
        let mut km = KMeans::new(2).with_random_state(0);
        km.fit(&sample_data()).expect("fit");
        let labels = km.predict(&sample_data());
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[4]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn test_reproducibility() {
        let mut a = KMeans::new(2).with_random_state(42);
        let mut b = KMeans::new(2).with_random_state(42);
        a.fit(&sample_data()).expect("fit");
        b.fit(&sample_data()).expect("fit");
        assert_eq!(a.centroids(), b.centroids());
    }

    #[test]
    fn test_too_many_clusters_error() {
        let mut km = KMeans::new(10);
        assert!(km.fit(&sample_data()).is_err());
    }

    #[test]
    fn test_empty_data_error() {
        let mut km = KMeans::new(1);
        assert!(matches!(
            km.fit(&Matrix::from_points(&[])),
            Err(GeolocError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_identical_points() {
        let data = Matrix::from_points(&[(3.0, 3.0); 4]);
        let mut km = KMeans::new(2).with_max_iter(10);
        km.fit(&data).expect("fit");
        let c = km.centroids().expect("fitted");
        assert_eq!(c.row_slice(0), &[3.0, 3.0]);
        assert_eq!(c.row_slice(1), &[3.0, 3.0]);
    }
}
