//! A Gaussian mixture with geographic meaning.
//!
//! [`GeoGmm`] owns a plain [`Mixture`] and implements [`LocationEstimate`]
//! on top of it: Monte Carlo samples give the prediction region (convex
//! hulls of the most likely samples, per component), the comprehensive
//! error and the contour.

use super::mixture::{CovarianceType, Mixture};
use crate::error::{GeolocError, Result};
use crate::estimate::{EstimateState, LocationEstimate};
use crate::model::{EstimateParams, ModelParams};
use crate::srs::{
    geodesic_distance_mp, lat_bounds, GeoMultiPoint, GeoMultiPolygon, GeoPoint, GeoPolygon, Geom, SpatialRef,
    Trim,
};
use geo::{
    Area, BooleanOps, Contains, ConvexHull, Coord, MultiPoint, MultiPolygon, Point, Polygon, Rect,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Default `threshold` of [`GeoGmm::likelihood_polygons`].
pub const LIKELIHOOD_THRESHOLD: f64 = 0.001;

/// Padding of a degenerate prediction region, as a fraction of the map's
/// latitude range (about 200 m).
const PAD_FRACTION: f64 = 1e-5;

/// How the single best point is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BestPoint {
    /// Weighted average of the component means. May fall outside the
    /// prediction region.
    #[default]
    WeightedAvg,
    /// The component mean with the highest mixture density.
    MaxMean,
}

impl FromStr for BestPoint {
    type Err = GeolocError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "weighted_avg" => Ok(Self::WeightedAvg),
            "max_mean" => Ok(Self::MaxMean),
            _ => Err(GeolocError::invalid_param(
                "best_point_f",
                s,
                "weighted_avg or max_mean",
            )),
        }
    }
}

impl BestPoint {
    /// Best point of `mixture` under this policy.
    #[must_use]
    pub fn select(self, mixture: &Mixture) -> [f64; 2] {
        match self {
            Self::WeightedAvg => mixture.weighted_mean(),
            Self::MaxMean => mixture.max_mean(),
        }
    }
}

/// Statistics cached when a mixture is fitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitStats {
    /// Akaike information criterion.
    pub aic: f64,
    /// Bayesian information criterion.
    pub bic: f64,
    /// Mean of the x and y variances of the fitted points.
    pub variance: f64,
}

/// Bounding rectangle of `pts` grown by a small fraction of the map's
/// latitude range, so that a single point or a line still has area.
fn padded_extent(pts: &[[f64; 2]], srs: &SpatialRef) -> MultiPolygon<f64> {
    let Some(first) = pts.first() else {
        return MultiPolygon::new(vec![]);
    };
    let (south, north) = lat_bounds(srs);
    let pad = (north - south) * PAD_FRACTION;
    let (mut min, mut max) = (*first, *first);
    for p in pts {
        min = [min[0].min(p[0]), min[1].min(p[1])];
        max = [max[0].max(p[0]), max[1].max(p[1])];
    }
    let rect = Rect::new(
        Coord { x: min[0] - pad, y: min[1] - pad },
        Coord { x: max[0] + pad, y: max[1] + pad },
    );
    MultiPolygon::new(vec![rect.to_polygon()])
}

/// One Monte Carlo draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Coordinates in the model's SRID.
    pub point: [f64; 2],
    /// Mixture log-density at `point`.
    pub log_prob: f64,
    /// Most likely component for `point`.
    pub component: usize,
}

/// Gaussian mixture location estimate.
///
/// Clones share the instance id, so they share the identity feature.
#[derive(Debug, Clone)]
pub struct GeoGmm {
    id: u64,
    mixture: Mixture,
    tokens: BTreeMap<String, f64>,
    n_points: usize,
    fit_stats: Option<FitStats>,
    params: EstimateParams,
    state: EstimateState,
    samples: Option<Vec<Sample>>,
    samples_inbound: Option<GeoMultiPoint>,
    pred_region_threshold: Option<f64>,
}

impl GeoGmm {
    pub(crate) fn from_parts(
        srs: SpatialRef,
        mixture: Mixture,
        tokens: BTreeMap<String, f64>,
        n_points: usize,
        fit_stats: Option<FitStats>,
        params: EstimateParams,
    ) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            mixture,
            tokens,
            n_points,
            fit_stats,
            state: EstimateState::new(srs, params.geodesic),
            params,
            samples: None,
            samples_inbound: None,
            pred_region_threshold: None,
        }
    }

    /// Process-unique instance id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The underlying mixture.
    #[must_use]
    pub fn mixture(&self) -> &Mixture {
        &self.mixture
    }

    /// Number of components.
    #[must_use]
    pub fn n_components(&self) -> usize {
        self.mixture.n_components()
    }

    /// Covariance constraint of the mixture.
    #[must_use]
    pub fn covariance_type(&self) -> CovarianceType {
        self.mixture.covariance_type()
    }

    /// Contributing tokens and their relative weights.
    #[must_use]
    pub fn tokens(&self) -> &BTreeMap<String, f64> {
        &self.tokens
    }

    /// Number of points the mixture was fitted to.
    #[must_use]
    pub fn n_points(&self) -> usize {
        self.n_points
    }

    /// SRID of the component means.
    #[must_use]
    pub fn srid(&self) -> u32 {
        self.state.srs.srid()
    }

    /// Fit-time statistics; `None` for combined mixtures.
    #[must_use]
    pub fn fit_stats(&self) -> Option<&FitStats> {
        self.fit_stats.as_ref()
    }

    /// Per-estimate parameters.
    #[must_use]
    pub fn params(&self) -> &EstimateParams {
        &self.params
    }

    /// Monte Carlo samples, most likely first, while prepared.
    #[must_use]
    pub fn samples(&self) -> Option<&[Sample]> {
        self.samples.as_deref()
    }

    /// The samples that fall inside the valid map extent.
    #[must_use]
    pub fn samples_inbound(&self) -> Option<&GeoMultiPoint> {
        self.samples_inbound.as_ref()
    }

    /// Log-density cutoff of the current prediction region.
    #[must_use]
    pub fn pred_region_threshold(&self) -> Option<f64> {
        self.pred_region_threshold
    }

    fn the_token(&self) -> &str {
        assert!(
            self.tokens.len() == 1 && self.tokens.values().all(|&w| w == 1.0),
            "combine needs single-token mixtures with weight 1, got {:?}",
            self.tokens
        );
        self.tokens.keys().next().map_or("", String::as_str)
    }

    /// Merges single-token mixtures into one, weighted by `weights[token]`,
    /// and prepares the result at `coverage`.
    ///
    /// Tokens weighing at most `weight_min` times the largest weight are
    /// dropped; missing tokens weigh 0. The result counts the points of the
    /// surviving inputs only. Returns `Ok(None)` when there are
    /// no mixtures or every weight is zero.
    ///
    /// # Errors
    ///
    /// Propagates failures of `prepare`.
    ///
    /// # Panics
    ///
    /// Panics if the inputs differ in SRID or covariance type, carry more
    /// than one token, or have negative weights.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::BTreeMap;
    /// use geoloc::estimate::LocationEstimate;
    /// use geoloc::gmm::GeoGmm;
    /// use geoloc::model::ModelParams;
    /// use geoloc::srs::GeoMultiPoint;
    ///
    /// let params = ModelParams::from_pairs([("component_sz_min", "1")]).unwrap();
    /// let mp = GeoMultiPoint::from_coords(4326, &[(1.0, 2.0), (3.0, 4.0)]).unwrap();
    /// let m1 = GeoGmm::from_fit(&mp, 1, &["foo"], &params).unwrap();
    /// let m2 = GeoGmm::from_fit(&mp, 2, &["bar"], &params).unwrap();
    /// let m3 = GeoGmm::from_fit(&mp, 1, &["baz"], &params).unwrap();
    ///
    /// let weights: BTreeMap<String, f64> =
    ///     [("foo", 2.0), ("bar", 3.0), ("baz", 1e-6)].map(|(k, v)| (k.to_string(), v)).into();
    /// let c = GeoGmm::combine(&[&m1, &m2, &m3], &weights, 0.95, &params).unwrap().unwrap();
    /// let w = c.mixture().weights();
    /// assert!((w[0] - 0.4).abs() < 1e-9 && (w[1] - 0.3).abs() < 1e-9 && (w[2] - 0.3).abs() < 1e-9);
    /// assert!((c.explanation()["bar"] - 0.6).abs() < 1e-9);
    /// assert!((c.explanation()["foo"] - 0.4).abs() < 1e-9);
    /// assert_eq!(c.n_points(), 4);
    /// assert_eq!(c.pred_coverage(), Some(0.95));
    ///
    /// let zeros: BTreeMap<String, f64> =
    ///     ["foo", "bar", "baz"].map(|k| (k.to_string(), 0.0)).into();
    /// assert!(GeoGmm::combine(&[&m1, &m2, &m3], &zeros, 0.95, &params).unwrap().is_none());
    /// ```
    pub fn combine(
        gmms: &[&GeoGmm],
        weights: &BTreeMap<String, f64>,
        coverage: f64,
        params: &ModelParams,
    ) -> Result<Option<GeoGmm>> {
        let Some(first) = gmms.first() else {
            return Ok(None);
        };
        let srs = first.state.srs;
        let covariance_type = first.covariance_type();
        let mut weighted = Vec::with_capacity(gmms.len());
        for &g in gmms {
            assert_eq!(g.srid(), srs.srid(), "combine: SRID mismatch");
            assert_eq!(g.covariance_type(), covariance_type, "combine: covariance type mismatch");
            let token = g.the_token();
            let w = weights.get(token).copied().unwrap_or(0.0);
            assert!(w >= 0.0, "combine: negative weight {w} for {token:?}");
            weighted.push((g, token, w));
        }
        let max = weighted.iter().map(|&(_, _, w)| w).fold(0.0, f64::max);
        if max == 0.0 {
            return Ok(None);
        }
        let floor = max * params.weight_min;
        let kept: Vec<_> = weighted.into_iter().filter(|&(_, _, w)| w > floor).collect();
        let total: f64 = kept.iter().map(|&(_, _, w)| w).sum();
        let tokens = kept
            .iter()
            .map(|&(_, t, w)| (t.to_string(), w / total))
            .collect();
        let parts: Vec<(&Mixture, f64)> = kept.iter().map(|&(g, _, w)| (&g.mixture, w)).collect();
        let mixture = Mixture::concat(&parts);
        let n_points = kept.iter().map(|&(g, _, _)| g.n_points).sum();
        debug!(
            inputs = gmms.len(),
            kept = kept.len(),
            n_components = mixture.n_components(),
            "combined mixtures"
        );
        let mut merged = GeoGmm::from_parts(srs, mixture, tokens, n_points, None, params.estimate_params());
        merged.prepare(Some(coverage))?;
        Ok(Some(merged))
    }

    /// Mixture log-density at `pt`.
    ///
    /// # Panics
    ///
    /// Panics if `pt` is in a different SRID.
    #[must_use]
    pub fn score_pt(&self, pt: &GeoPoint) -> f64 {
        assert_eq!(pt.srid(), self.srid(), "point SRID differs from mixture SRID");
        self.mixture.score(pt.x(), pt.y())
    }

    /// Draws `n` samples, most likely first. Sampling is seeded, so the
    /// same mixture always yields the same samples.
    ///
    /// # Errors
    ///
    /// Fails if a covariance is not positive definite.
    pub fn populate_samples(&mut self, n: usize) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut samples: Vec<Sample> = self
            .mixture
            .sample(n, &mut rng)?
            .into_iter()
            .map(|(point, _)| {
                let (log_prob, component) = self.mixture.score_and_component(point[0], point[1]);
                Sample {
                    point,
                    log_prob,
                    component,
                }
            })
            .collect();
        samples.sort_by(|a, b| b.log_prob.total_cmp(&a.log_prob));
        let mp = MultiPoint::new(samples.iter().map(|s| Point::new(s.point[0], s.point[1])).collect());
        self.samples_inbound = Some(Geom::with_srs(self.state.srs, mp).trim());
        self.samples = Some(samples);
        Ok(())
    }

    fn samples_or_panic(&self) -> &[Sample] {
        match self.samples.as_deref() {
            Some(s) => s,
            None => panic!("no samples; call prepare() first"),
        }
    }

    /// `(index, likelihood)` for each polygon whose likelihood is at least
    /// `threshold`.
    #[must_use]
    pub fn likelihood_polygons(&self, polygons: &[GeoPolygon], threshold: f64) -> Vec<(usize, f64)> {
        polygons
            .iter()
            .enumerate()
            .filter_map(|(i, pg)| self.likelihood_polygon(pg).map(|p| (i, p)))
            .filter(|&(_, p)| p >= threshold)
            .collect()
    }
}

impl LocationEstimate for GeoGmm {
    fn state(&self) -> &EstimateState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EstimateState {
        &mut self.state
    }

    fn explanation(&self) -> BTreeMap<String, f64> {
        self.tokens.clone()
    }

    /// Mean distance from `pt` to the in-bounds samples; NaN if there are none.
    fn cae(&self, pt: &GeoPoint) -> f64 {
        assert_eq!(pt.srid(), self.srid(), "point SRID differs from mixture SRID");
        let inbound = match &self.samples_inbound {
            Some(mp) => mp,
            None => panic!("no samples; call prepare() first"),
        };
        let d = geodesic_distance_mp(pt, inbound, self.params.geodesic);
        d.iter().sum::<f64>() / d.len() as f64
    }

    /// Fraction of samples less likely than `pt`.
    fn contour(&self, pt: &GeoPoint) -> f64 {
        let score = self.score_pt(pt);
        let samples = self.samples_or_panic();
        samples.iter().filter(|s| s.log_prob < score).count() as f64 / samples.len() as f64
    }

    fn coverst_p_real(&self, pt: &GeoPoint) -> bool {
        let threshold = match self.pred_region_threshold {
            Some(t) => t,
            None => panic!("prediction region not populated; call prepare() first"),
        };
        self.score_pt(pt) > threshold
    }

    /// Fraction of samples inside `pg`.
    fn likelihood_polygon(&self, pg: &GeoPolygon) -> Option<f64> {
        assert_eq!(pg.srid(), self.srid(), "polygon SRID differs from mixture SRID");
        let samples = self.samples.as_deref()?;
        let inside = samples
            .iter()
            .filter(|s| pg.geom().contains(&Point::new(s.point[0], s.point[1])))
            .count();
        Some(inside as f64 / samples.len() as f64)
    }

    fn populate_best_point(&mut self) -> Result<()> {
        let [x, y] = self.params.best_point.select(&self.mixture);
        self.state.best_point = Some(Geom::with_srs(self.state.srs, Point::new(x, y)));
        Ok(())
    }

    fn populate_pred_region_real(&mut self) -> Result<()> {
        let coverage = self
            .state
            .pred_coverage
            .ok_or_else(|| GeolocError::Other("no coverage set".to_string()))?;
        let samples = self
            .samples
            .as_deref()
            .ok_or_else(|| GeolocError::Other("no samples; call prepare() first".to_string()))?;
        if samples.is_empty() {
            return Err(GeolocError::empty_input("Monte Carlo samples"));
        }
        let n = samples.len();
        let idx = ((coverage * n as f64).round() as usize).min(n);
        let threshold = samples[idx.min(n - 1)].log_prob;

        let mut by_component: Vec<Vec<Point<f64>>> = vec![Vec::new(); self.mixture.n_components()];
        for s in &samples[..idx] {
            by_component[s.component].push(Point::new(s.point[0], s.point[1]));
        }
        let hulls: Vec<Polygon<f64>> = by_component
            .into_iter()
            .filter(|pts| pts.len() >= 3)
            .map(|pts| MultiPoint::new(pts).convex_hull())
            .filter(|hull| hull.unsigned_area() > 0.0)
            .collect();
        let mut region = MultiPolygon::new(vec![]);
        for hull in hulls {
            region = region.union(&MultiPolygon::new(vec![hull]));
        }
        if region.0.is_empty() {
            let mut pts: Vec<[f64; 2]> = samples[..idx].iter().map(|s| s.point).collect();
            if pts.is_empty() {
                pts.extend(self.state.best_point.as_ref().map(|p| [p.x(), p.y()]));
            }
            debug!(n_points = pts.len(), coverage, "no component hull has area, padding the confident set");
            region = padded_extent(&pts, &self.state.srs);
        }
        let region: GeoMultiPolygon = Geom::with_srs(self.state.srs, region).trim();
        if region.geom().0.is_empty() {
            warn!(
                tokens = ?self.tokens.keys().collect::<Vec<_>>(),
                coverage,
                "empty prediction region"
            );
        }
        self.state.pred_region = Some(region);
        self.pred_region_threshold = Some(threshold);
        Ok(())
    }

    fn prepare_real(&mut self) -> Result<()> {
        self.populate_samples(self.params.mc_sample_ct)
    }

    fn unprepare(&mut self) {
        self.samples = None;
        self.samples_inbound = None;
        self.state.prepared = false;
    }

    fn dump_geoimage(&self, basename: &str, width_px: usize) -> Result<Vec<PathBuf>> {
        super::geoimage::dump_geoimage(self, basename, width_px)
    }
}

#[cfg(test)]
#[path = "geo_gmm_tests.rs"]
mod tests;
