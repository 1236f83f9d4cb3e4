//! Token weights.
//!
//! A weight in `(0, 1]` per token decides how much that token's mixture
//! counts when a message's mixtures are combined. Weights come either from
//! a fixed heuristic over mixture features or errors, or from the
//! [`WeightOptimizer`] trained on located messages.

mod optimize;

pub use optimize::{OptimizerDiagnostics, OptimizerOptions, WeightOptimizer, WeightReport};

use crate::error::{GeolocError, Result};
use crate::estimate::LocationEstimate;
use crate::gmm::GeoGmm;
use crate::model::{Message, ModelParams};
use crate::srs::{GeoMultiPoint, Geom};
use geo::Point;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, warn};

/// Floor on the per-message CAE fed to the optimizer.
const CAE_FLOOR: f64 = 1e-5;
/// Monte Carlo samples per mixture when scoring messages by CAE.
const OPT_SAMPLE_CT: usize = 100;

/// How token weights are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightFn {
    /// `1 / (1 + f)` of the `weight_feature`, then [`scale`]d.
    #[default]
    InvFeature,
    /// The `weight_feature` itself, [`inverse`]d.
    NegFeature,
    /// `1 / (1 + E^x)` with E the mean SAE of the mixture over its own points.
    InvErrorSae,
    /// As `InvErrorSae` with CAE.
    InvErrorCae,
    /// Optimized against CAE on the training messages.
    CaeOpt,
    /// Optimized against SAE on the training messages.
    SaeOpt,
}

impl FromStr for WeightFn {
    type Err = GeolocError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inv_feature" => Ok(Self::InvFeature),
            "neg_feature" => Ok(Self::NegFeature),
            "inv_error_sae" => Ok(Self::InvErrorSae),
            "inv_error_cae" => Ok(Self::InvErrorCae),
            "cae_opt" => Ok(Self::CaeOpt),
            "sae_opt" => Ok(Self::SaeOpt),
            _ => Err(GeolocError::invalid_param(
                "weight_f",
                s,
                "inv_feature, neg_feature, inv_error_sae, inv_error_cae, cae_opt or sae_opt",
            )),
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum ErrorKind {
    Sae,
    Cae,
}

impl WeightFn {
    /// Computes a weight for every token in `gmms`.
    ///
    /// `token_points` are the training points of each token and `messages`
    /// the training messages; which of them are consulted depends on the
    /// variant. Mixtures may be left with a best point populated.
    ///
    /// # Errors
    ///
    /// Fails if `weight_feature` is not available on some mixture, or if
    /// sampling or optimization fails.
    pub fn weights(
        self,
        gmms: &mut BTreeMap<String, GeoGmm>,
        messages: &[Message],
        token_points: &BTreeMap<String, GeoMultiPoint>,
        params: &ModelParams,
    ) -> Result<BTreeMap<String, f64>> {
        debug!(weight_f = ?self, tokens = gmms.len(), "computing token weights");
        match self {
            Self::InvFeature => {
                let f = feature_values(gmms, &params.weight_feature)?;
                Ok(scale(&f.into_iter().map(|(t, v)| (t, 1.0 / (1.0 + v))).collect()))
            }
            Self::NegFeature => Ok(inverse(&feature_values(gmms, &params.weight_feature)?)),
            Self::InvErrorSae => inv_error(gmms, token_points, params, ErrorKind::Sae),
            Self::InvErrorCae => inv_error(gmms, token_points, params, ErrorKind::Cae),
            Self::SaeOpt => optimized(gmms, messages, params, ErrorKind::Sae),
            Self::CaeOpt => optimized(gmms, messages, params, ErrorKind::Cae),
        }
    }
}

fn feature_values(gmms: &BTreeMap<String, GeoGmm>, feature: &str) -> Result<BTreeMap<String, f64>> {
    gmms.iter()
        .map(|(t, g)| {
            g.features(false, true)
                .get(feature)
                .map(|v| (t.clone(), v))
                .ok_or_else(|| {
                    GeolocError::invalid_param("weight_feature", feature, "a feature of every mixture")
                })
        })
        .collect()
}

/// Drops what weighting populated, leaving the mixture as fitted.
fn release(g: &mut GeoGmm) {
    g.unprepare();
    g.state_mut().best_point = None;
}

fn mean_error(g: &mut GeoGmm, points: &GeoMultiPoint, params: &ModelParams, kind: ErrorKind) -> Result<f64> {
    let srs = points.srs();
    let pts = points.coords();
    let total: f64 = match kind {
        ErrorKind::Sae => {
            g.populate_best_point()?;
            pts.iter()
                .map(|&(x, y)| g.sae(&Geom::with_srs(srs, Point::new(x, y))))
                .sum()
        }
        ErrorKind::Cae => {
            g.populate_samples(params.wt_inv_sample_ct)?;
            pts.iter()
                .map(|&(x, y)| g.cae(&Geom::with_srs(srs, Point::new(x, y))))
                .sum()
        }
    };
    release(g);
    Ok(total / pts.len() as f64)
}

fn inv_error(
    gmms: &mut BTreeMap<String, GeoGmm>,
    token_points: &BTreeMap<String, GeoMultiPoint>,
    params: &ModelParams,
    kind: ErrorKind,
) -> Result<BTreeMap<String, f64>> {
    gmms.par_iter_mut()
        .map(|(token, g)| -> Result<(String, f64)> {
            let error = match token_points.get(token) {
                Some(pts) if pts.len() >= params.wt_inv_min_tweets && !pts.is_empty() => {
                    mean_error(g, pts, params, kind)?
                }
                _ => f64::INFINITY,
            };
            let w = (1.0 / (1.0 + error.powf(params.wt_inv_error_exponent))).abs().min(1.0);
            Ok((token.clone(), w))
        })
        .collect()
}

fn optimized(
    gmms: &mut BTreeMap<String, GeoGmm>,
    messages: &[Message],
    params: &ModelParams,
    kind: ErrorKind,
) -> Result<BTreeMap<String, f64>> {
    gmms.par_iter_mut().try_for_each(|(_, g)| match kind {
        ErrorKind::Sae => g.populate_best_point(),
        ErrorKind::Cae => g.populate_samples(OPT_SAMPLE_CT),
    })?;
    let weights = train(gmms, messages, params, kind);
    gmms.values_mut().for_each(release);
    weights
}

fn train(
    gmms: &BTreeMap<String, GeoGmm>,
    messages: &[Message],
    params: &ModelParams,
    kind: ErrorKind,
) -> Result<BTreeMap<String, f64>> {
    let (gmms_list, errors_list): (Vec<Vec<&GeoGmm>>, Vec<Vec<f64>>) = messages
        .par_iter()
        .filter_map(|m| {
            let relevant: Vec<&GeoGmm> = m.tokens.iter().filter_map(|t| gmms.get(t)).collect();
            if relevant.is_empty() {
                return None;
            }
            let errors = relevant
                .iter()
                .map(|g| match kind {
                    ErrorKind::Sae => g.sae(&m.point),
                    ErrorKind::Cae => g.cae(&m.point).max(CAE_FLOOR),
                })
                .collect();
            Some((relevant, errors))
        })
        .unzip();
    if gmms_list.is_empty() {
        warn!(messages = messages.len(), "no training message has a weighted token; using uniform weights");
        return Ok(gmms.keys().map(|t| (t.clone(), 1.0)).collect());
    }
    let optimizer = WeightOptimizer::new(&gmms_list, &errors_list, OptimizerOptions::from_params(params))?;
    let report = optimizer.optimize()?;
    debug!(
        n_messages = report.diagnostics.n_messages,
        final_objective = report.diagnostics.final_objective,
        status = ?report.diagnostics.status,
        "learned token weights"
    );
    Ok(report.weights)
}

/// Maps negative weights into `(0, 1]` by `exp(w - max)`, keeping their
/// order; weights that are all non-negative are returned unchanged.
///
/// # Examples
///
/// ```
/// use geoloc::weight::scale;
/// use std::collections::BTreeMap;
///
/// let w = scale(&BTreeMap::from([("a".to_string(), -1.0), ("b".to_string(), 1.0)]));
/// assert!((w["a"] - 0.135_335).abs() < 1e-6);
/// assert_eq!(w["b"], 1.0);
/// ```
#[must_use]
pub fn scale(weights: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    if !weights.values().any(|&v| v < 0.0) {
        return weights.clone();
    }
    let max = weights.values().copied().fold(f64::NEG_INFINITY, f64::max);
    weights.iter().map(|(k, &v)| (k.clone(), (v - max).exp())).collect()
}

/// Reverses the order of weights by `max + 1 - w` when any is negative, so
/// the smallest becomes the largest and the largest becomes 1; otherwise
/// returns them unchanged.
#[must_use]
pub fn inverse(weights: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    if !weights.values().any(|&v| v < 0.0) {
        return weights.clone();
    }
    let max = weights.values().copied().fold(f64::NEG_INFINITY, f64::max);
    weights.iter().map(|(k, &v)| (k.clone(), max + 1.0 - v)).collect()
}
