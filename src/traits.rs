//! Core traits shared across the crate.
//!
//! [`UnsupervisedEstimator`] is the fit/predict contract of the numeric
//! learners (k-means, EM); [`LocationModel`] is the build/locate contract
//! every geolocation model satisfies.

use crate::error::Result;
use crate::estimate::LocationEstimate;
use crate::primitives::Matrix;

/// Trait for unsupervised learning models.
///
/// # Examples
///
/// ```
/// use geoloc::prelude::*;
///
/// // Create data with 2 clear clusters
/// let data = Matrix::from_vec(6, 2, vec![
///     0.0, 0.0, 0.1, 0.1, 0.2, 0.0,  // Cluster 1
///     10.0, 10.0, 10.1, 10.1, 10.0, 10.2,  // Cluster 2
/// ]).unwrap();
///
/// let mut kmeans = KMeans::new(2).with_random_state(42);
/// kmeans.fit(&data).unwrap();
/// let labels = kmeans.predict(&data);
/// assert_eq!(labels.len(), 6);
/// assert_eq!(labels[0], labels[2]);
/// assert_ne!(labels[0], labels[3]);
/// ```
pub trait UnsupervisedEstimator {
    /// The type of labels/clusters produced.
    type Labels;

    /// Fits the model to data.
    ///
    /// # Errors
    ///
    /// Returns an error if fitting fails (empty data, invalid parameters, etc.).
    fn fit(&mut self, x: &Matrix<f64>) -> Result<()>;

    /// Predicts cluster assignments or transforms data.
    fn predict(&self, x: &Matrix<f64>) -> Self::Labels;
}

/// A geolocation model: built once from training data, then asked to locate
/// tokenized messages.
///
/// Built models are read-only, so `locate` takes `&self` and may be called
/// from many threads at once.
pub trait LocationModel: Send + Sync {
    /// Fits whatever the model needs from its training data.
    ///
    /// # Errors
    ///
    /// Propagates fitting failures.
    fn build(&mut self) -> Result<()>;

    /// Locates a message given its tokens, preparing the estimate at
    /// `confidence`. `Ok(None)` means the model has no confident guess.
    ///
    /// # Errors
    ///
    /// Propagates failures of fitting or preparing the estimate.
    fn locate(&self, tokens: &[&str], confidence: f64)
        -> Result<Option<Box<dyn LocationEstimate>>>;

    /// SRID of the estimates this model produces.
    fn srid(&self) -> u32;

    /// Logs a warning if asked to run in parallel; for models that only
    /// make sense serially.
    fn warn_if_parallel(&self) {
        let threads = rayon::current_num_threads();
        if threads > 1 {
            tracing::warn!(
                model = std::any::type_name::<Self>(),
                threads,
                "serial model running with a parallel thread pool"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeolocError;

    // Mock estimator to exercise the trait contract
    struct MeanLabeler {
        mean: Option<f64>,
    }

    impl UnsupervisedEstimator for MeanLabeler {
        type Labels = Vec<bool>;

        fn fit(&mut self, x: &Matrix<f64>) -> Result<()> {
            if x.n_rows() == 0 {
                return Err(GeolocError::empty_input("mock data"));
            }
            let n = (x.n_rows() * x.n_cols()) as f64;
            self.mean = Some(x.as_slice().iter().sum::<f64>() / n);
            Ok(())
        }

        fn predict(&self, x: &Matrix<f64>) -> Vec<bool> {
            let mean = self.mean.unwrap_or(0.0);
            x.rows_iter().map(|r| r[0] > mean).collect()
        }
    }

    #[test]
    fn test_unsupervised_contract() {
        let mut est = MeanLabeler { mean: None };
        let x = Matrix::from_vec(3, 1, vec![1.0, 2.0, 6.0]).expect("matrix");
        est.fit(&x).expect("fit");
        assert_eq!(est.predict(&x), vec![false, false, true]);
    }

    #[test]
    fn test_unsupervised_empty_is_error() {
        let mut est = MeanLabeler { mean: None };
        let x = Matrix::from_vec(0, 1, vec![]).expect("matrix");
        assert!(est.fit(&x).is_err());
    }

    struct NullModel;

    impl LocationModel for NullModel {
        fn build(&mut self) -> Result<()> {
            Ok(())
        }

        fn locate(&self, _tokens: &[&str], _confidence: f64) -> Result<Option<Box<dyn LocationEstimate>>> {
            Ok(None)
        }

        fn srid(&self) -> u32 {
            4326
        }
    }

    #[test]
    fn test_location_model_is_object_safe() {
        let mut m: Box<dyn LocationModel> = Box::new(NullModel);
        m.build().expect("build");
        m.warn_if_parallel();
        assert!(m.locate(&["foo"], 0.5).expect("locate").is_none());
        assert_eq!(m.srid(), 4326);
    }
}
