use super::{collect_token_points, not_built, ModelParams};
use crate::error::Result;
use crate::estimate::LocationEstimate;
use crate::gmm::GeoGmm;
use crate::srs::{GeoMultiPoint, SpatialRef};
use crate::traits::LocationModel;
use geo::MultiPoint;
use std::collections::BTreeMap;
use tracing::debug;

/// Token recorded on every per-message mixture.
const MESSAGE_TOKEN: &str = "all";

/// Fits a fresh mixture per message to the training points of all of its
/// tokens. Slow, but needs no token weights.
#[derive(Debug)]
pub struct MessageModel {
    srs: SpatialRef,
    params: ModelParams,
    token_points: BTreeMap<String, GeoMultiPoint>,
    built: bool,
}

impl MessageModel {
    /// Model over `(token, points)` pairs, producing estimates in `srid`.
    ///
    /// # Errors
    ///
    /// Fails if `params` are invalid or an SRID is unsupported.
    pub fn new<I, S>(tokens: I, srid: u32, params: ModelParams) -> Result<Self>
    where
        I: IntoIterator<Item = (S, GeoMultiPoint)>,
        S: Into<String>,
    {
        let (srs, token_points) = collect_token_points(tokens, srid, &params)?;
        Ok(Self {
            srs,
            params,
            token_points,
            built: false,
        })
    }

    /// Fits and prepares the mixture of a message, concrete type.
    ///
    /// # Errors
    ///
    /// Fails if the model is not built or fitting fails.
    pub fn locate_gmm(&self, tokens: &[&str], confidence: f64) -> Result<Option<GeoGmm>> {
        if !self.built {
            return Err(not_built("MessageModel"));
        }
        let points: MultiPoint<f64> = tokens
            .iter()
            .filter_map(|t| self.token_points.get(*t))
            .flat_map(|mp| mp.geom().0.iter().copied())
            .collect();
        if points.0.is_empty() {
            return Ok(None);
        }
        let points = GeoMultiPoint::with_srs(self.srs, points);
        let mut gmm = GeoGmm::fit_token(MESSAGE_TOKEN, &points, &self.params)?;
        gmm.prepare(Some(confidence))?;
        Ok(Some(gmm))
    }
}

impl LocationModel for MessageModel {
    fn build(&mut self) -> Result<()> {
        self.warn_if_parallel();
        debug!(tokens = self.token_points.len(), "message model keeps token points");
        self.built = true;
        Ok(())
    }

    fn locate(&self, tokens: &[&str], confidence: f64) -> Result<Option<Box<dyn LocationEstimate>>> {
        Ok(self
            .locate_gmm(tokens, confidence)?
            .map(|g| Box::new(g) as Box<dyn LocationEstimate>))
    }

    fn srid(&self) -> u32 {
        self.srs.srid()
    }
}
