//! Gaussian mixture models over geographic points.
//!
//! - [`Mixture`]: weights, means and covariances; density and sampling.
//! - [`GaussianMixture`]: EM fitting, seeded with [`KMeans`].
//! - [`ComponentCount`]: how many components a token's points get.
//! - [`GeoGmm`]: a mixture with an SRID and the tokens it came from,
//!   usable as a [`LocationEstimate`](crate::estimate::LocationEstimate).
//!
//! # Examples
//!
//! ```
//! use geoloc::estimate::LocationEstimate;
//! use geoloc::gmm::GeoGmm;
//! use geoloc::model::ModelParams;
//! use geoloc::srs::GeoMultiPoint;
//!
//! let params = ModelParams::default();
//! let mp = GeoMultiPoint::from_coords(4326, &[(30.0, 60.0), (40.0, 70.0)]).unwrap();
//! let mut g = GeoGmm::fit_token("foo", &mp, &params).unwrap();
//! g.prepare(Some(0.95)).unwrap();
//! let bp = g.best_point().unwrap();
//! assert!((bp.x() - 35.0).abs() < 1e-6 && (bp.y() - 65.0).abs() < 1e-6);
//! ```

mod em;
mod features;
mod fit;
mod geo_gmm;
mod geoimage;
mod kmeans;
mod mixture;

pub use em::GaussianMixture;
pub use features::FeatureMap;
pub use fit::ComponentCount;
pub use geo_gmm::{BestPoint, FitStats, GeoGmm, Sample, LIKELIHOOD_THRESHOLD};
pub use geoimage::{bend, BEND, GEOIMG_LONMAX, GEOIMG_LONMIN};
pub use kmeans::KMeans;
pub use mixture::{logsumexp, Cov2, CovarianceType, Mixture};
