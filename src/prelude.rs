//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use geoloc::prelude::*;
//! ```

pub use crate::estimate::LocationEstimate;
pub use crate::gmm::{GaussianMixture, GeoGmm, KMeans};
pub use crate::model::{AllPointsModel, EstimateReport, Message, MessageModel, ModelParams, TokenModel};
pub use crate::primitives::{Matrix, Vector};
pub use crate::srs::{GeoMultiPoint, GeoPoint, Geom};
pub use crate::traits::{LocationModel, UnsupervisedEstimator};
pub use crate::weight::WeightFn;
