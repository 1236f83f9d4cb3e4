use super::{collect_token_points, not_built, ModelParams};
use crate::error::{GeolocError, Result};
use crate::estimate::LocationEstimate;
use crate::gmm::GeoGmm;
use crate::srs::{GeoMultiPoint, SpatialRef};
use crate::traits::LocationModel;
use geo::MultiPoint;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

/// Token recorded on the global mixture.
const ALL_TOKEN: &str = "_all_tweets_";

/// One mixture over every training point; tokens are ignored when
/// locating. A baseline.
#[derive(Debug)]
pub struct AllPointsModel {
    srs: SpatialRef,
    params: ModelParams,
    token_points: BTreeMap<String, GeoMultiPoint>,
    global: Option<GeoGmm>,
}

impl AllPointsModel {
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
            global: None,
        })
    }

    /// The global mixture, once built.
    #[must_use]
    pub fn global_gmm(&self) -> Option<&GeoGmm> {
        self.global.as_ref()
    }
}

impl LocationModel for AllPointsModel {
    fn build(&mut self) -> Result<()> {
        self.warn_if_parallel();
        let start = Instant::now();
        let all: MultiPoint<f64> = self
            .token_points
            .values()
            .flat_map(|mp| mp.geom().0.iter().copied())
            .collect();
        if all.0.is_empty() {
            return Err(GeolocError::empty_input("training points"));
        }
        let all = GeoMultiPoint::with_srs(self.srs, all);
        debug!(points = all.len(), "fitting global mixture");
        self.global = Some(GeoGmm::fit_token(ALL_TOKEN, &all, &self.params)?);
        debug!(elapsed = ?start.elapsed(), "built all-points model");
        Ok(())
    }

    fn locate(&self, _tokens: &[&str], confidence: f64) -> Result<Option<Box<dyn LocationEstimate>>> {
        let mut gmm = self.global.clone().ok_or_else(|| not_built("AllPointsModel"))?;
        gmm.prepare(Some(confidence))?;
        Ok(Some(Box::new(gmm)))
    }

    fn srid(&self) -> u32 {
        self.srs.srid()
    }
}
