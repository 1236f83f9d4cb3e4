use super::{collect_token_points, not_built, Message, ModelParams};
use crate::error::Result;
use crate::estimate::LocationEstimate;
use crate::gmm::{FeatureMap, GeoGmm};
use crate::srs::{dump_geojson, transform, GeoMultiPoint, SpatialRef};
use crate::traits::LocationModel;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;
use tracing::debug;

/// Coverage used when dumping a token mixture that was never prepared.
const DUMP_COVERAGE: f64 = 0.95;

/// Human-readable summary of one token's mixture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenSummary {
    /// The token.
    pub token: String,
    /// Training points observed with it.
    pub point_ct: usize,
    /// Descriptive features of its mixture.
    pub features: FeatureMap,
}

/// One mixture per token; a message is located by combining the mixtures
/// of its known tokens, weighted by learned or heuristic token weights.
#[derive(Debug)]
pub struct TokenModel {
    srs: SpatialRef,
    params: ModelParams,
    token_points: BTreeMap<String, GeoMultiPoint>,
    messages: Vec<Message>,
    token_gmms: BTreeMap<String, GeoGmm>,
    token_weights: BTreeMap<String, f64>,
    built: bool,
}

impl TokenModel {
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
            messages: Vec::new(),
            token_gmms: BTreeMap::new(),
            token_weights: BTreeMap::new(),
            built: false,
        })
    }

    /// Training messages for the optimizing weight functions.
    ///
    /// # Errors
    ///
    /// Fails if a message point cannot be brought into the model's SRID.
    pub fn with_messages(mut self, messages: Vec<Message>) -> Result<Self> {
        let srid = self.srs.srid();
        self.messages = messages
            .into_iter()
            .map(|m| -> Result<Message> {
                let point = transform(&m.point, srid)?.into_owned();
                Ok(Message { point, ..m })
            })
            .collect::<Result<_>>()?;
        Ok(self)
    }

    /// Token weights computed by `build`.
    #[must_use]
    pub fn token_weights(&self) -> &BTreeMap<String, f64> {
        &self.token_weights
    }

    /// The fitted mixture of `token`, once built.
    #[must_use]
    pub fn token_gmm(&self, token: &str) -> Option<&GeoGmm> {
        self.token_gmms.get(token)
    }

    /// Summary of `token`, or `None` if the model has no mixture for it.
    #[must_use]
    pub fn token_summary(&self, token: &str) -> Option<TokenSummary> {
        let gmm = self.token_gmms.get(token)?;
        Some(TokenSummary {
            token: token.to_string(),
            point_ct: self.token_points.get(token).map_or(0, GeoMultiPoint::len),
            features: gmm.features(false, true),
        })
    }

    /// Writes the training points of `token` (`basename.points.geojson`)
    /// and its mixture's geofiles.
    ///
    /// # Errors
    ///
    /// Fails if the model is not built or knows nothing of `token`, or on
    /// I/O errors.
    pub fn dump_geofiles(&self, basename: &str, width_px: usize, token: &str) -> Result<Vec<PathBuf>> {
        let (Some(points), Some(gmm)) = (self.token_points.get(token), self.token_gmms.get(token)) else {
            return Err(not_built(&format!("token {token:?} of TokenModel")));
        };
        let mut written = vec![dump_geojson(&format!("{basename}.points"), &points.clone().into_geometry())?];
        let mut gmm = gmm.clone();
        let coverage = if gmm.prepared() { None } else { Some(DUMP_COVERAGE) };
        written.extend(gmm.dump_geofiles(basename, width_px, coverage)?);
        Ok(written)
    }

    /// Mixtures of the known tokens among `tokens`, first occurrence only.
    fn relevant_gmms<'a>(&'a self, tokens: &[&str]) -> Vec<&'a GeoGmm> {
        let mut seen = HashSet::new();
        tokens
            .iter()
            .filter(|t| seen.insert(**t))
            .filter_map(|t| self.token_gmms.get(*t))
            .collect()
    }
}

impl LocationModel for TokenModel {
    fn build(&mut self) -> Result<()> {
        let start = Instant::now();
        let params = &self.params;
        self.token_gmms = self
            .token_points
            .par_iter()
            .map(|(token, points)| -> Result<(String, GeoGmm)> {
                Ok((token.clone(), GeoGmm::fit_token(token, points, params)?))
            })
            .collect::<Result<_>>()?;
        debug!(tokens = self.token_gmms.len(), elapsed = ?start.elapsed(), "fitted token mixtures");
        self.token_weights = self.params.weight_f.weights(
            &mut self.token_gmms,
            &self.messages,
            &self.token_points,
            &self.params,
        )?;
        self.built = true;
        debug!(elapsed = ?start.elapsed(), "built token model");
        Ok(())
    }

    fn locate(&self, tokens: &[&str], confidence: f64) -> Result<Option<Box<dyn LocationEstimate>>> {
        if !self.built {
            return Err(not_built("TokenModel"));
        }
        let gmms = self.relevant_gmms(tokens);
        Ok(GeoGmm::combine(&gmms, &self.token_weights, confidence, &self.params)?
            .map(|g| Box::new(g) as Box<dyn LocationEstimate>))
    }

    fn srid(&self) -> u32 {
        self.srs.srid()
    }
}
