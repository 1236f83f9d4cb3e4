//! Geolocation models.
//!
//! A model is constructed from `(token, points)` pairs, the training points
//! observed with each token, then [`build`](crate::traits::LocationModel::build)
//! once and asked to [`locate`](crate::traits::LocationModel::locate) many
//! messages.
//!
//! - [`TokenModel`]: one mixture per token, combined per message by token weight
//! - [`MessageModel`]: one mixture per message, fit to its tokens' points
//! - [`AllPointsModel`]: one mixture for everything
//! - [`PipelineModel`]: first answer from a list of models
//!
//! # Examples
//!
//! ```
//! use geoloc::estimate::LocationEstimate;
//! use geoloc::model::{ModelParams, TokenModel};
//! use geoloc::srs::GeoMultiPoint;
//! use geoloc::traits::LocationModel;
//!
//! let mp = GeoMultiPoint::from_coords(4326, &[(30.0, 60.0), (40.0, 70.0)]).unwrap();
//! let mut m = TokenModel::new([("foo", mp)], 4326, ModelParams::default()).unwrap();
//! m.build().unwrap();
//! let est = m.locate(&["foo"], 0.95).unwrap().unwrap();
//! let bp = est.best_point().unwrap();
//! assert!((bp.x() - 35.0).abs() < 1e-6 && (bp.y() - 65.0).abs() < 1e-6);
//! ```

mod all_points;
mod message;
mod params;
mod pipeline;
mod report;
mod token;

pub use all_points::AllPointsModel;
pub use message::MessageModel;
pub use params::{EstimateParams, ModelParams, MISC_FEATURES};
pub use pipeline::PipelineModel;
pub use report::EstimateReport;
pub use token::{TokenModel, TokenSummary};

use crate::error::{GeolocError, Result};
use crate::srs::{transform, GeoMultiPoint, GeoPoint, SpatialRef};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// A training message: its tokens and where it was sent from.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Tokens, in message order.
    pub tokens: Vec<String>,
    /// True location.
    pub point: GeoPoint,
}

impl Message {
    /// Message with `tokens` sent from `point`.
    pub fn new<I, S>(tokens: I, point: GeoPoint) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            point,
        }
    }
}

/// Validates `params`, resolves `srid` and collects per-token points in it.
///
/// Point sets for the same token are merged.
pub(crate) fn collect_token_points<I, S>(
    tokens: I,
    srid: u32,
    params: &ModelParams,
) -> Result<(SpatialRef, BTreeMap<String, GeoMultiPoint>)>
where
    I: IntoIterator<Item = (S, GeoMultiPoint)>,
    S: Into<String>,
{
    params.validate()?;
    let srs = SpatialRef::from_srid(srid)?;
    let mut out: BTreeMap<String, GeoMultiPoint> = BTreeMap::new();
    for (token, points) in tokens {
        let points = transform(&points, srid)?.into_owned();
        match out.entry(token.into()) {
            Entry::Vacant(e) => {
                e.insert(points);
            }
            Entry::Occupied(mut e) => {
                let merged = e.get().geom().0.iter().chain(&points.geom().0).copied().collect();
                e.insert(GeoMultiPoint::with_srs(srs, merged));
            }
        }
    }
    Ok((srs, out))
}

/// Error for `locate` on a model that has not been built.
pub(crate) fn not_built(model: &str) -> GeolocError {
    GeolocError::Other(format!("{model} is not built"))
}
