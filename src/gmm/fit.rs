//! Fitting a [`GeoGmm`] to one token's points.
//!
//! The number of components is chosen by a [`ComponentCount`] policy, then
//! EM runs, then components that explain too few points are dropped. If
//! nothing survives, the points are refit with a single component.

use super::em::GaussianMixture;
use super::geo_gmm::{FitStats, GeoGmm};
use super::mixture::Mixture;
use crate::error::{GeolocError, Result};
use crate::model::ModelParams;
use crate::primitives::Matrix;
use crate::srs::GeoMultiPoint;
use crate::traits::UnsupervisedEstimator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// Policy for choosing how many components to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentCount {
    /// `round(log2(n) / 2)`, clamped to the configured bounds.
    #[default]
    LogHeuristic,
    /// `round(sqrt(n / 2))`, clamped to the configured bounds.
    SqrtHeuristic,
    /// `min(n / 2, component_ct_min)`, at least 1.
    Fixed,
    /// Lowest BIC over every count in `[component_ct_min, min(component_ct_max, n))`.
    Exhaustive,
    /// Ternary search for the lowest BIC, assuming BIC is unimodal in the count.
    Ternary,
}

impl FromStr for ComponentCount {
    type Err = GeolocError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "log_heuristic" => Ok(Self::LogHeuristic),
            "sqrt_heuristic" => Ok(Self::SqrtHeuristic),
            "fixed" => Ok(Self::Fixed),
            "exhaustive" => Ok(Self::Exhaustive),
            "ternary" => Ok(Self::Ternary),
            _ => Err(GeolocError::invalid_param(
                "gmm_fit_f",
                s,
                "one of log_heuristic, sqrt_heuristic, fixed, exhaustive, ternary",
            )),
        }
    }
}

impl ComponentCount {
    /// Component count for `n` points, for the policies that compute it
    /// directly. `None` for the search policies.
    #[must_use]
    pub fn heuristic_count(self, n: usize, ct_min: usize, ct_max: usize) -> Option<usize> {
        let clamp = |k: usize| k.min(ct_max).max(ct_min);
        match self {
            Self::LogHeuristic => Some(clamp(((n as f64).log2() / 2.0).round() as usize)),
            Self::SqrtHeuristic => Some(clamp(((n / 2) as f64).sqrt().round() as usize)),
            Self::Fixed => Some((n / 2).min(ct_min).max(1)),
            Self::Exhaustive | Self::Ternary => None,
        }
    }

    /// Fits a single-token mixture to `points` under this policy.
    ///
    /// # Errors
    ///
    /// Returns an error if `points` is empty or EM fails.
    pub fn fit(self, token: &str, points: &GeoMultiPoint, params: &ModelParams) -> Result<GeoGmm> {
        if points.is_empty() {
            return Err(GeolocError::empty_input("token points"));
        }
        let n = points.len();
        let (lo, hi) = (params.component_ct_min, params.component_ct_max);
        if let Some(k) = self.heuristic_count(n, lo, hi) {
            return GeoGmm::from_fit(points, k, &[token], params);
        }
        match self {
            Self::Exhaustive => fit_exhaustive(token, points, lo, hi.min(n), params),
            _ => fit_ternary(token, points, lo, hi.min(n.saturating_sub(1)).max(lo), params),
        }
    }
}

fn bic_of(g: &GeoGmm) -> f64 {
    g.fit_stats().map_or(f64::INFINITY, |s| s.bic)
}

fn fit_exhaustive(
    token: &str,
    points: &GeoMultiPoint,
    lo: usize,
    hi_exclusive: usize,
    params: &ModelParams,
) -> Result<GeoGmm> {
    let mut best: Option<GeoGmm> = None;
    for k in lo..hi_exclusive {
        let g = GeoGmm::from_fit(points, k, &[token], params)?;
        if best.as_ref().map_or(true, |b| bic_of(&g) < bic_of(b)) {
            best = Some(g);
        }
    }
    match best {
        Some(g) => Ok(g),
        None => GeoGmm::from_fit(points, lo, &[token], params),
    }
}

fn fit_ternary(
    token: &str,
    points: &GeoMultiPoint,
    lo: usize,
    hi: usize,
    params: &ModelParams,
) -> Result<GeoGmm> {
    let fit = |k: usize| GeoGmm::from_fit(points, k, &[token], params);
    let (mut min_i, mut min_g) = (lo, fit(lo)?);
    let (mut max_i, mut max_g) = (hi, fit(hi)?);
    loop {
        let left_i = (2 * min_i + max_i) / 3;
        let right_i = (min_i + 2 * max_i) / 3;
        let left_g = fit(left_i)?;
        let right_g = fit(right_i)?;
        debug!(min_i, left_i, right_i, max_i, "ternary component search");
        if max_i - min_i <= 3 {
            let mut best = min_g;
            for g in [left_g, right_g, max_g] {
                if bic_of(&g) < bic_of(&best) {
                    best = g;
                }
            }
            return Ok(best);
        }
        if bic_of(&left_g) > bic_of(&right_g) {
            (min_i, min_g) = (left_i, left_g);
        } else {
            (max_i, max_g) = (right_i, right_g);
        }
    }
}

fn fit_mixture(data: &Matrix<f64>, k: usize, params: &ModelParams) -> Result<Mixture> {
    let mut em = GaussianMixture::new(k, params.covariance_type)
        .with_min_covar(params.min_covar)
        .with_max_iter(params.em_max_iter)
        .with_random_state(params.seed);
    em.fit(data)?;
    em.into_mixture()
        .ok_or_else(|| GeolocError::Other("EM produced no mixture".to_string()))
}

/// Drops components with fewer than `component_sz_min` assigned points
/// (components with no points are always dropped). Refits with one
/// component if none remain.
pub(crate) fn filter_small_components(
    mixture: Mixture,
    data: &Matrix<f64>,
    params: &ModelParams,
) -> Result<Mixture> {
    let mut counts = vec![0usize; mixture.n_components()];
    for c in mixture.predict(data) {
        counts[c] += 1;
    }
    let keep: Vec<usize> = counts
        .iter()
        .enumerate()
        .filter(|&(_, &ct)| ct > 0 && ct >= params.component_sz_min)
        .map(|(i, _)| i)
        .collect();
    if keep.is_empty() {
        debug!(n_components = counts.len(), "all components too small, refitting with 1");
        return fit_mixture(data, 1, params);
    }
    if keep.len() < counts.len() {
        debug!(kept = keep.len(), dropped = counts.len() - keep.len(), "filtered small components");
    }
    Ok(mixture.select(&keep))
}

impl GeoGmm {
    /// Fits a mixture of `n_components` components to `points`.
    ///
    /// The requested count is clamped to `[1, len(points)]`. Each token in
    /// `tokens` is recorded with contribution weight 1.
    ///
    /// # Errors
    ///
    /// Returns [`GeolocError::EmptyInput`] if `points` is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use geoloc::gmm::GeoGmm;
    /// use geoloc::model::ModelParams;
    /// use geoloc::srs::GeoMultiPoint;
    ///
    /// let params = ModelParams::from_pairs([("component_sz_min", "1")]).unwrap();
    /// let mp = GeoMultiPoint::from_coords(4326, &[(1.0, 2.0), (3.0, 4.0)]).unwrap();
    /// let g = GeoGmm::from_fit(&mp, 1, &["foo"], &params).unwrap();
    /// let m = g.mixture().means()[0];
    /// assert!((m[0] - 2.0).abs() < 1e-9 && (m[1] - 3.0).abs() < 1e-9);
    /// ```
    pub fn from_fit(
        points: &GeoMultiPoint,
        n_components: usize,
        tokens: &[&str],
        params: &ModelParams,
    ) -> Result<Self> {
        if points.is_empty() {
            return Err(GeolocError::empty_input("points to fit"));
        }
        let data = Matrix::from_points(&points.coords());
        let n = data.n_rows();
        let k = n_components.clamp(1, n);
        let mixture = fit_mixture(&data, k, params)?;
        let mixture = filter_small_components(mixture, &data, params)?;
        let variances = data.column_variances();
        let stats = FitStats {
            aic: mixture.aic(&data),
            bic: mixture.bic(&data),
            variance: (variances[0] + variances[1]) / 2.0,
        };
        let tokens: BTreeMap<String, f64> = tokens.iter().map(|t| ((*t).to_string(), 1.0)).collect();
        Ok(GeoGmm::from_parts(
            points.srs(),
            mixture,
            tokens,
            n,
            Some(stats),
            params.estimate_params(),
        ))
    }

    /// Fits `points` for `token` using the configured component-count policy.
    ///
    /// # Errors
    ///
    /// Returns an error if `points` is empty or fitting fails.
    pub fn fit_token(token: &str, points: &GeoMultiPoint, params: &ModelParams) -> Result<Self> {
        params.gmm_fit_f.fit(token, points, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn params(pairs: &[(&str, &str)]) -> ModelParams {
        ModelParams::from_pairs(pairs.iter().copied()).expect("valid params")
    }

    fn diagonal(n: usize) -> GeoMultiPoint {
        let coords: Vec<(f64, f64)> = (0..n).map(|i| (i as f64, i as f64)).collect();
        GeoMultiPoint::from_coords(4326, &coords).expect("wgs84")
    }

    /// Two tight 3x3 grids plus their centers, 10 points each.
    fn two_blobs() -> GeoMultiPoint {
        let mut coords = Vec::new();
        for (cx, cy) in [(0.0, 0.0), (10.0, 10.0)] {
            coords.push((cx, cy));
            for i in -1..=1 {
                for j in -1..=1 {
                    if i != 0 || j != 0 {
                        coords.push((cx + 0.1 * f64::from(i), cy + 0.1 * f64::from(j)));
                    }
                }
            }
            coords.push((cx + 0.05, cy - 0.05));
        }
        GeoMultiPoint::from_coords(4326, &coords).expect("wgs84")
    }

    #[test]
    fn test_heuristic_counts() {
        let log = ComponentCount::LogHeuristic;
        assert_eq!(log.heuristic_count(16, 1, 20), Some(2));
        assert_eq!(log.heuristic_count(32, 1, 20), Some(3));
        assert_eq!(log.heuristic_count(1, 1, 20), Some(1));
        assert_eq!(log.heuristic_count(1 << 20, 1, 4), Some(4));
        let sqrt = ComponentCount::SqrtHeuristic;
        assert_eq!(sqrt.heuristic_count(10, 1, 20), Some(2));
        assert_eq!(sqrt.heuristic_count(50, 1, 20), Some(5));
        let fixed = ComponentCount::Fixed;
        assert_eq!(fixed.heuristic_count(5, 2, 2), Some(2));
        assert_eq!(fixed.heuristic_count(2, 2, 2), Some(1));
        assert_eq!(fixed.heuristic_count(1, 2, 2), Some(1));
        assert_eq!(ComponentCount::Exhaustive.heuristic_count(10, 1, 20), None);
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("ternary".parse::<ComponentCount>().expect("known"), ComponentCount::Ternary);
        assert!("bogus".parse::<ComponentCount>().is_err());
    }

    #[test]
    fn test_log_heuristic_fit() {
        let p = params(&[]);
        let g = ComponentCount::LogHeuristic.fit("foo", &diagonal(16), &p).expect("fit");
        assert_eq!(g.n_components(), 2);
        let g = ComponentCount::LogHeuristic.fit("bar", &diagonal(32), &p).expect("fit");
        assert_eq!(g.n_components(), 3);
    }

    #[test]
    fn test_from_fit_two_points() {
        let p = params(&[("component_sz_min", "1")]);
        let mp = GeoMultiPoint::from_coords(4326, &[(1.0, 2.0), (3.0, 4.0)]).expect("wgs84");
        let g = GeoGmm::from_fit(&mp, 1, &["foo"], &p).expect("fit");
        assert_eq!(g.n_components(), 1);
        assert_relative_eq!(g.mixture().means()[0][0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(g.mixture().means()[0][1], 3.0, epsilon = 1e-9);
        assert_eq!(g.n_points(), 2);
        assert_eq!(g.srid(), 4326);
        assert_eq!(g.tokens().get("foo"), Some(&1.0));
    }

    #[test]
    fn test_from_fit_clamps_component_count() {
        let p = params(&[("component_sz_min", "1")]);
        let mp = GeoMultiPoint::from_coords(4326, &[(1.0, 2.0), (3.0, 4.0)]).expect("wgs84");
        let g = GeoGmm::from_fit(&mp, 10, &["foo"], &p).expect("fit");
        assert_eq!(g.n_components(), 2);
    }

    #[test]
    fn test_from_fit_empty_is_error() {
        let p = params(&[]);
        let mp = GeoMultiPoint::from_coords(4326, &[]).expect("wgs84");
        assert!(matches!(
            GeoGmm::from_fit(&mp, 1, &["foo"], &p),
            Err(GeolocError::EmptyInput(_))
        ));
        assert!(ComponentCount::LogHeuristic.fit("foo", &mp, &p).is_err());
    }

    #[test]
    fn test_filter_drops_outlier_component() {
        let p = params(&[("component_sz_min", "2")]);
        let mut rng = StdRng::seed_from_u64(100);
        let noise = Normal::new(0.0, 1.0).expect("valid normal");
        let mut coords = Vec::new();
        for i in 0..100 {
            let c = if i % 2 == 0 { 10.0 } else { 20.0 };
            coords.push((c + noise.sample(&mut rng), c + noise.sample(&mut rng)));
        }
        coords.push((100.0, 100.0));
        let mp = GeoMultiPoint::from_coords(4326, &coords).expect("wgs84");
        let g = GeoGmm::from_fit(&mp, 3, &["foo"], &p).expect("fit");
        assert_eq!(g.n_components(), 2);
        assert_relative_eq!(g.mixture().weights().iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_filter_refits_when_nothing_survives() {
        let p = params(&[("component_sz_min", "2")]);
        let mp = GeoMultiPoint::from_coords(4326, &[(10.0, 10.0), (20.0, 20.0)]).expect("wgs84");
        let g = GeoGmm::from_fit(&mp, 2, &["foo"], &p).expect("fit");
        assert_eq!(g.n_components(), 1);
    }

    #[test]
    fn test_single_component_always_succeeds() {
        let p = params(&[("component_ct_min", "1"), ("component_ct_max", "1")]);
        for mp in [
            GeoMultiPoint::from_coords(4326, &[(5.0, 5.0)]).expect("wgs84"),
            GeoMultiPoint::from_coords(4326, &[(5.0, 5.0); 7]).expect("wgs84"),
            diagonal(40),
        ] {
            let g = GeoGmm::fit_token("t", &mp, &p).expect("fit");
            assert_eq!(g.n_components(), 1);
        }
    }

    #[test]
    fn test_exhaustive_prefers_two_blobs() {
        let p = params(&[("gmm_fit_f", "exhaustive"), ("component_ct_max", "4")]);
        let g = GeoGmm::fit_token("t", &two_blobs(), &p).expect("fit");
        assert_eq!(g.n_components(), 2);
    }

    #[test]
    fn test_exhaustive_empty_range_falls_back() {
        let p = params(&[("gmm_fit_f", "exhaustive"), ("component_sz_min", "1")]);
        let mp = GeoMultiPoint::from_coords(4326, &[(1.0, 1.0)]).expect("wgs84");
        let g = GeoGmm::fit_token("t", &mp, &p).expect("fit");
        assert_eq!(g.n_components(), 1);
    }

    #[test]
    fn test_ternary_prefers_two_blobs() {
        let p = params(&[("gmm_fit_f", "ternary"), ("component_ct_max", "6")]);
        let g = GeoGmm::fit_token("t", &two_blobs(), &p).expect("fit");
        assert_eq!(g.n_components(), 2);
    }

    #[test]
    fn test_fit_stats_cached() {
        let p = params(&[("component_sz_min", "1")]);
        let mp = GeoMultiPoint::from_coords(4326, &[(1.0, 2.0), (3.0, 4.0), (6.0, 5.0), (9.0, 7.0)])
            .expect("wgs84");
        let g = GeoGmm::from_fit(&mp, 2, &["tx foo"], &p).expect("fit");
        let stats = g.fit_stats().expect("cached at fit time");
        assert_relative_eq!(stats.variance, 6.21875, epsilon = 1e-12);
        assert!(stats.aic.is_finite());
        assert!(stats.bic.is_finite());
    }
}
