//! Model parameters.
//!
//! One flat, enumerable set of named parameters, passed explicitly to every
//! fit and locate call. Unknown keys are rejected and every key must end up
//! with a value.

use crate::error::{GeolocError, Result};
use crate::gmm::{BestPoint, ComponentCount, CovarianceType};
use crate::srs::GeodesicMethod;
use crate::weight::WeightFn;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

/// Names accepted by `weight_feature` and `opt_init`.
pub const MISC_FEATURES: &[&str] = &[
    "one",
    "n_components",
    "n_points",
    "aic",
    "bic",
    "variance",
    "variance_comp",
    "variance_pt",
    "covar_sumsum",
    "covar_sumprod",
    "covar_sumsum_comp",
    "covar_sumsum_pt",
    "covar_sumprod_comp",
    "covar_sumprod_pt",
];

/// Parameters for fitting, weighting and locating.
///
/// # Examples
///
/// ```
/// use geoloc::model::ModelParams;
///
/// let p = ModelParams::from_pairs([("component_sz_min", "1"), ("mc_sample_ct", "500")])
///     .expect("valid parameters");
/// assert_eq!(p.component_sz_min, 1);
/// assert_eq!(p.component_ct_max, 20);
///
/// assert!(ModelParams::from_pairs([("bogus", "1")]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelParams {
    /// Best-point policy.
    pub best_point_f: BestPoint,
    /// Upper clamp on component count.
    pub component_ct_max: usize,
    /// Lower clamp on component count.
    pub component_ct_min: usize,
    /// Minimum points assigned to a kept component.
    pub component_sz_min: usize,
    /// Covariance constraint for fitted mixtures.
    pub covariance_type: CovarianceType,
    /// Component-count policy.
    pub gmm_fit_f: ComponentCount,
    /// Floor added to covariance diagonals.
    pub min_covar: f64,
    /// Give each token its own optimizer feature.
    pub opt_feature_id: bool,
    /// Add shared descriptive features to the optimizer.
    pub opt_feature_misc: bool,
    /// L2 regularization weight λ.
    pub opt_reg: f64,
    /// Feature used to initialize the optimizer; empty for random.
    pub opt_init: String,
    /// Token weighting function.
    pub weight_f: WeightFn,
    /// Feature used by the feature-based weighting functions.
    pub weight_feature: String,
    /// Drop ratio relative to the heaviest token in `combine`.
    pub weight_min: f64,
    /// Exponent x in `1 / (1 + E^x)`.
    pub wt_inv_error_exponent: f64,
    /// Minimum points for a nonzero inverse-error weight.
    pub wt_inv_min_tweets: usize,
    /// Monte Carlo samples for inverse-error CAE.
    pub wt_inv_sample_ct: usize,
    /// Monte Carlo samples drawn by `prepare`.
    pub mc_sample_ct: usize,
    /// EM iteration bound.
    pub em_max_iter: usize,
    /// Distance method for error metrics.
    pub geodesic: GeodesicMethod,
    /// Seed for EM init, sampling and optimizer init.
    pub seed: u64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            best_point_f: BestPoint::WeightedAvg,
            component_ct_max: 20,
            component_ct_min: 1,
            component_sz_min: 3,
            covariance_type: CovarianceType::Full,
            gmm_fit_f: ComponentCount::LogHeuristic,
            min_covar: 0.001,
            opt_feature_id: true,
            opt_feature_misc: false,
            opt_reg: 1.0,
            opt_init: String::new(),
            weight_f: WeightFn::InvFeature,
            weight_feature: "covar_sumprod".to_string(),
            weight_min: 0.001,
            wt_inv_error_exponent: 4.0,
            wt_inv_min_tweets: 3,
            wt_inv_sample_ct: 100,
            mc_sample_ct: 1000,
            em_max_iter: 1000,
            geodesic: GeodesicMethod::Spherical,
            seed: 0,
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str, constraint: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| GeolocError::invalid_param(key, value, constraint))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(GeolocError::invalid_param(key, value, "0, 1, true or false")),
    }
}

impl ModelParams {
    /// Builds parameters from a flat key → value mapping over the defaults.
    ///
    /// # Errors
    ///
    /// - [`GeolocError::UnknownParameter`] for keys not in the set
    /// - [`GeolocError::MissingParameter`] for empty or `none` values
    /// - [`GeolocError::InvalidHyperparameter`] for unparsable or
    ///   out-of-range values
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut p = Self::default();
        for (k, v) in pairs {
            p.set(k.as_ref(), v.as_ref())?;
        }
        p.validate()?;
        Ok(p)
    }

    /// Parses a JSON object of parameters over the defaults.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON, unknown keys, or invalid values.
    pub fn from_json(json: &str) -> Result<Self> {
        let p: Self = serde_json::from_str(json).map_err(|e| {
            let msg = e.to_string();
            match msg
                .strip_prefix("unknown field `")
                .and_then(|rest| rest.split('`').next())
            {
                Some(field) => GeolocError::UnknownParameter(field.to_string()),
                None => GeolocError::Serialization(msg),
            }
        })?;
        p.validate()?;
        Ok(p)
    }

    /// Sets one parameter from its string form.
    ///
    /// # Errors
    ///
    /// See [`ModelParams::from_pairs`].
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        // opt_init is the one key whose empty value is meaningful
        if key != "opt_init" && (value.is_empty() || value.eq_ignore_ascii_case("none")) {
            if key_known(key) {
                return Err(GeolocError::MissingParameter(key.to_string()));
            }
            return Err(GeolocError::UnknownParameter(key.to_string()));
        }
        match key {
            "best_point_f" => self.best_point_f = value.parse()?,
            "component_ct_max" => self.component_ct_max = parse(key, value, "a positive integer")?,
            "component_ct_min" => self.component_ct_min = parse(key, value, "a positive integer")?,
            "component_sz_min" => {
                self.component_sz_min = parse(key, value, "a non-negative integer")?;
            }
            "covariance_type" => self.covariance_type = value.parse()?,
            "gmm_fit_f" => self.gmm_fit_f = value.parse()?,
            "min_covar" => self.min_covar = parse(key, value, "a positive number")?,
            "opt_feature_id" => self.opt_feature_id = parse_flag(key, value)?,
            "opt_feature_misc" => self.opt_feature_misc = parse_flag(key, value)?,
            "opt_reg" => self.opt_reg = parse(key, value, "a non-negative number")?,
            "opt_init" => self.opt_init = value.to_string(),
            "weight_f" => self.weight_f = value.parse()?,
            "weight_feature" => self.weight_feature = value.to_string(),
            "weight_min" => self.weight_min = parse(key, value, "a number in [0, 1)")?,
            "wt_inv_error_exponent" => {
                self.wt_inv_error_exponent = parse(key, value, "a number")?;
            }
            "wt_inv_min_tweets" => {
                self.wt_inv_min_tweets = parse(key, value, "a non-negative integer")?;
            }
            "wt_inv_sample_ct" => self.wt_inv_sample_ct = parse(key, value, "a positive integer")?,
            "mc_sample_ct" => self.mc_sample_ct = parse(key, value, "a positive integer")?,
            "em_max_iter" => self.em_max_iter = parse(key, value, "a positive integer")?,
            "geodesic" => self.geodesic = value.parse()?,
            "seed" => self.seed = parse(key, value, "a non-negative integer")?,
            _ => return Err(GeolocError::UnknownParameter(key.to_string())),
        }
        Ok(())
    }

    /// Checks value ranges and cross-parameter consistency.
    ///
    /// # Errors
    ///
    /// Returns [`GeolocError::InvalidHyperparameter`] naming the first bad
    /// parameter.
    pub fn validate(&self) -> Result<()> {
        if self.component_ct_min == 0 {
            return Err(GeolocError::invalid_param("component_ct_min", 0, ">= 1"));
        }
        if self.component_ct_max < self.component_ct_min {
            return Err(GeolocError::invalid_param(
                "component_ct_max",
                self.component_ct_max,
                &format!(">= component_ct_min ({})", self.component_ct_min),
            ));
        }
        if !(self.min_covar > 0.0) {
            return Err(GeolocError::invalid_param("min_covar", self.min_covar, "> 0"));
        }
        if !(self.opt_reg >= 0.0) {
            return Err(GeolocError::invalid_param("opt_reg", self.opt_reg, ">= 0"));
        }
        if !(0.0..1.0).contains(&self.weight_min) {
            return Err(GeolocError::invalid_param("weight_min", self.weight_min, "in [0, 1)"));
        }
        if !self.wt_inv_error_exponent.is_finite() {
            return Err(GeolocError::invalid_param(
                "wt_inv_error_exponent",
                self.wt_inv_error_exponent,
                "finite",
            ));
        }
        for (key, v) in [
            ("mc_sample_ct", self.mc_sample_ct),
            ("wt_inv_sample_ct", self.wt_inv_sample_ct),
            ("em_max_iter", self.em_max_iter),
        ] {
            if v == 0 {
                return Err(GeolocError::invalid_param(key, v, ">= 1"));
            }
        }
        if !MISC_FEATURES.contains(&self.weight_feature.as_str()) {
            return Err(GeolocError::invalid_param(
                "weight_feature",
                &self.weight_feature,
                "a misc feature name",
            ));
        }
        if !self.opt_init.is_empty() && !MISC_FEATURES.contains(&self.opt_init.as_str()) {
            return Err(GeolocError::invalid_param(
                "opt_init",
                &self.opt_init,
                "empty or a misc feature name",
            ));
        }
        Ok(())
    }

    /// The per-estimate subset copied into every fitted mixture.
    #[must_use]
    pub fn estimate_params(&self) -> EstimateParams {
        EstimateParams {
            mc_sample_ct: self.mc_sample_ct,
            best_point: self.best_point_f,
            geodesic: self.geodesic,
            seed: self.seed,
        }
    }

    /// Logs every parameter at `info`, sorted by name.
    pub fn log_report(&self) {
        info!("model parameters:");
        if let Ok(serde_json::Value::Object(map)) = serde_json::to_value(self) {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (k, v) in entries {
                info!("  {k}: {:>width$} {v}", "", width = 19usize.saturating_sub(k.len()));
            }
        }
    }
}

fn key_known(key: &str) -> bool {
    matches!(
        key,
        "best_point_f"
            | "component_ct_max"
            | "component_ct_min"
            | "component_sz_min"
            | "covariance_type"
            | "gmm_fit_f"
            | "min_covar"
            | "opt_feature_id"
            | "opt_feature_misc"
            | "opt_reg"
            | "opt_init"
            | "weight_f"
            | "weight_feature"
            | "weight_min"
            | "wt_inv_error_exponent"
            | "wt_inv_min_tweets"
            | "wt_inv_sample_ct"
            | "mc_sample_ct"
            | "em_max_iter"
            | "geodesic"
            | "seed"
    )
}

/// Settings each location estimate carries with it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimateParams {
    /// Monte Carlo samples drawn by `prepare`.
    pub mc_sample_ct: usize,
    /// Best-point policy.
    pub best_point: BestPoint,
    /// Distance method for error metrics.
    pub geodesic: GeodesicMethod,
    /// Sampling seed.
    pub seed: u64,
}

impl Default for EstimateParams {
    fn default() -> Self {
        ModelParams::default().estimate_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let p = ModelParams::default();
        p.validate().expect("defaults valid");
        assert_eq!(p.weight_feature, "covar_sumprod");
        assert_eq!(p.gmm_fit_f, ComponentCount::LogHeuristic);
        assert_eq!(p.weight_f, WeightFn::InvFeature);
    }

    #[test]
    fn test_from_pairs_overrides() {
        let p = ModelParams::from_pairs([
            ("covariance_type", "diag"),
            ("gmm_fit_f", "exhaustive"),
            ("opt_feature_misc", "1"),
            ("weight_f", "cae_opt"),
            ("best_point_f", "max_mean"),
            ("geodesic", "ellipsoidal"),
        ])
        .expect("valid");
        assert_eq!(p.covariance_type, CovarianceType::Diag);
        assert_eq!(p.gmm_fit_f, ComponentCount::Exhaustive);
        assert!(p.opt_feature_misc);
        assert_eq!(p.weight_f, WeightFn::CaeOpt);
        assert_eq!(p.best_point_f, BestPoint::MaxMean);
        assert_eq!(p.geodesic, GeodesicMethod::Ellipsoidal);
    }

    #[test]
    fn test_unknown_parameter() {
        let err = ModelParams::from_pairs([("mc_samples", "5")]).unwrap_err();
        assert_eq!(err.to_string(), "parameter mc_samples is not supported");
    }

    #[test]
    fn test_missing_parameter() {
        let err = ModelParams::from_pairs([("weight_feature", "none")]).unwrap_err();
        assert!(matches!(err, GeolocError::MissingParameter(k) if k == "weight_feature"));
        let err = ModelParams::from_pairs([("min_covar", "")]).unwrap_err();
        assert!(matches!(err, GeolocError::MissingParameter(_)));
    }

    #[test]
    fn test_opt_init_may_be_empty() {
        let p = ModelParams::from_pairs([("opt_init", "")]).expect("valid");
        assert!(p.opt_init.is_empty());
        let p = ModelParams::from_pairs([("opt_init", "variance")]).expect("valid");
        assert_eq!(p.opt_init, "variance");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            ModelParams::from_pairs([("component_ct_min", "abc")]),
            Err(GeolocError::InvalidHyperparameter { .. })
        ));
        assert!(ModelParams::from_pairs([("component_ct_min", "0")]).is_err());
        assert!(ModelParams::from_pairs([("component_ct_min", "5"), ("component_ct_max", "2")]).is_err());
        assert!(ModelParams::from_pairs([("weight_min", "1.5")]).is_err());
        assert!(ModelParams::from_pairs([("weight_feature", "shoe_size")]).is_err());
        assert!(ModelParams::from_pairs([("covariance_type", "banana")]).is_err());
    }

    #[test]
    fn test_json_round_trip_and_unknown_field() {
        let p = ModelParams::from_json(r#"{"mc_sample_ct": 200, "covariance_type": "spherical"}"#)
            .expect("valid json");
        assert_eq!(p.mc_sample_ct, 200);
        assert_eq!(p.covariance_type, CovarianceType::Spherical);
        let back = ModelParams::from_json(&serde_json::to_string(&p).expect("serializable"))
            .expect("round trip");
        assert_eq!(back, p);
        let err = ModelParams::from_json(r#"{"bogus": 1}"#).unwrap_err();
        assert!(matches!(err, GeolocError::UnknownParameter(k) if k == "bogus"));
    }

    #[test]
    fn test_estimate_params_subset() {
        let p = ModelParams::from_pairs([("mc_sample_ct", "42"), ("seed", "9")]).expect("valid");
        let e = p.estimate_params();
        assert_eq!(e.mc_sample_ct, 42);
        assert_eq!(e.seed, 9);
        assert_eq!(e.best_point, BestPoint::WeightedAvg);
    }
}
