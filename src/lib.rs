//! Geoloc: estimating where a short message was sent from, using the words
//! in it.
//!
//! Each token of a training corpus gets a Gaussian mixture fitted to the
//! places it was observed. A new message is located by combining the
//! mixtures of its tokens, weighted by how informative each token is, and
//! sampling the result to get a best point and a prediction region that
//! covers the true location with a chosen probability.
//!
//! # Quick Start
//!
//! ```
//! use geoloc::prelude::*;
//!
//! let paris = GeoMultiPoint::from_coords(4326, &[(2.35, 48.85), (2.36, 48.86), (2.34, 48.84)]).unwrap();
//! let tokyo = GeoMultiPoint::from_coords(4326, &[(139.69, 35.68), (139.70, 35.69), (139.68, 35.67)]).unwrap();
//!
//! let mut model = TokenModel::new([("paris", paris), ("tokyo", tokyo)], 4326, ModelParams::default()).unwrap();
//! model.build().unwrap();
//!
//! let est = model.locate(&["i", "love", "paris"], 0.9).unwrap().unwrap();
//! let truth = Geom::new(4326, geo::Point::new(2.35, 48.85)).unwrap();
//! assert!(est.sae(&truth) < 10.0);
//! assert!(model.locate(&["nowhere"], 0.9).unwrap().is_none());
//! ```
//!
//! # Modules
//!
//! - [`srs`]: Spatial references, projections, geodesy, trimming and GeoJSON
//! - [`estimate`]: The [`LocationEstimate`](estimate::LocationEstimate) trait
//! - [`gmm`]: Mixtures, EM fitting and the geographic mixture [`GeoGmm`](gmm::GeoGmm)
//! - [`optim`]: L-BFGS minimization
//! - [`weight`]: Token weights, heuristic or optimized
//! - [`model`]: Parameters and the token, message and all-points models
//! - [`primitives`]: Core Vector and Matrix types

pub mod error;
pub mod estimate;
pub mod gmm;
pub mod model;
pub mod optim;
pub mod prelude;
pub mod primitives;
pub mod srs;
pub mod traits;
pub mod weight;

pub use error::{GeolocError, Result};
pub use primitives::{Matrix, Vector};
pub use traits::{LocationModel, UnsupervisedEstimator};
