//! Error types for geoloc operations.
//!
//! Degenerate data (no usable tokens, all weights zero, components filtered
//! away) is not an error: those cases surface as `None` or as a refit.
//! Errors are reserved for bad configuration, unsupported geometry and I/O.

use thiserror::Error;

/// Main error type for geoloc operations.
///
/// # Examples
///
/// ```
/// use geoloc::error::GeolocError;
///
/// let err = GeolocError::UnknownParameter("mc_samples".to_string());
/// assert!(err.to_string().contains("mc_samples"));
/// ```
#[derive(Debug, Error)]
pub enum GeolocError {
    /// Matrix/vector dimensions don't match for the operation.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensions description
        expected: String,
        /// Actual dimensions found
        actual: String,
    },

    /// Parameter value outside its allowed range or not parseable.
    #[error("Invalid hyperparameter: {param} = {value}, expected {constraint}")]
    InvalidHyperparameter {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Parameter name not in the supported set.
    #[error("parameter {0} is not supported")]
    UnknownParameter(String),

    /// Parameter left without a value after defaults were applied.
    #[error("model parameter {0} has no value")]
    MissingParameter(String),

    /// SRID not known to the spatial reference registry.
    #[error("unsupported SRID {0}")]
    UnsupportedSrid(u32),

    /// Geometries with different spatial references were mixed.
    #[error("SRID mismatch: expected {expected}, got {actual}")]
    SridMismatch {
        /// SRID required by the operation
        expected: u32,
        /// SRID actually supplied
        actual: u32,
    },

    /// Operation does not accept this kind of geometry.
    #[error("need {expected}, not {actual}")]
    GeometryType {
        /// Accepted geometry kinds
        expected: String,
        /// Geometry kind supplied
        actual: String,
    },

    /// Input collection was empty where at least one element is required.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// I/O error (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Raster encoding failed.
    #[error("image error: {0}")]
    Image(String),

    /// Generic error with string message.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for GeolocError {
    fn from(err: serde_json::Error) -> Self {
        GeolocError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for GeolocError {
    fn from(err: image::ImageError) -> Self {
        GeolocError::Image(err.to_string())
    }
}

impl From<&str> for GeolocError {
    fn from(msg: &str) -> Self {
        GeolocError::Other(msg.to_string())
    }
}

impl From<String> for GeolocError {
    fn from(msg: String) -> Self {
        GeolocError::Other(msg)
    }
}

impl GeolocError {
    /// Create a dimension mismatch error with descriptive context
    #[must_use]
    pub fn dimension_mismatch(context: &str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            expected: format!("{context}={expected}"),
            actual: format!("{actual}"),
        }
    }

    /// Create an invalid-parameter error
    #[must_use]
    pub fn invalid_param(param: &str, value: impl ToString, constraint: &str) -> Self {
        Self::InvalidHyperparameter {
            param: param.to_string(),
            value: value.to_string(),
            constraint: constraint.to_string(),
        }
    }

    /// Create an empty input error
    #[must_use]
    pub fn empty_input(context: &str) -> Self {
        Self::EmptyInput(context.to_string())
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, GeolocError>;
