//! Quality features of a fitted mixture, for the token-weight optimizer.

use super::geo_gmm::GeoGmm;
use serde::ser::{Serialize, Serializer};

/// Feature name → value, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMap(Vec<(String, f64)>);

impl FeatureMap {
    /// Empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`. An existing entry keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Value of `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(k, _)| k == name).map(|&(_, v)| v)
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    /// Appends every entry of `other`.
    pub fn extend(&mut self, other: FeatureMap) {
        for (k, v) in other.0 {
            self.insert(k, v);
        }
    }
}

impl Serialize for FeatureMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

impl GeoGmm {
    /// Name of this instance's identity feature. Only meaningful within
    /// one process.
    #[must_use]
    pub fn identity_feature(&self) -> String {
        format!("GeoGmm/{}", self.id())
    }

    /// Features worth judging this mixture's quality on.
    ///
    /// With `identity`, a feature unique to this instance (value 1). With
    /// `misc`: the two-character field prefix of each token, then `one`,
    /// `n_components`, `n_points`, the fit statistics when cached, and
    /// covariance sums, each also per component and per point.
    ///
    /// # Panics
    ///
    /// Panics if neither group is requested.
    ///
    /// # Examples
    ///
    /// ```
    /// use geoloc::gmm::GeoGmm;
    /// use geoloc::model::ModelParams;
    /// use geoloc::srs::GeoMultiPoint;
    ///
    /// let params = ModelParams::from_pairs([("component_sz_min", "1")]).unwrap();
    /// let mp = GeoMultiPoint::from_coords(4326, &[(1.0, 2.0), (3.0, 4.0), (6.0, 5.0), (9.0, 7.0)])
    ///     .unwrap();
    /// let g = GeoGmm::from_fit(&mp, 2, &["tx foo"], &params).unwrap();
    /// let f = g.features(true, true);
    /// let keys: Vec<&str> = f.keys().take(5).collect();
    /// assert_eq!(&keys[1..], &["tx", "one", "n_components", "n_points"]);
    /// assert!(keys[0].starts_with("GeoGmm/"));
    /// assert_eq!(f.get("n_points"), Some(4.0));
    /// assert!((f.get("variance").unwrap() - 6.21875).abs() < 1e-9);
    /// ```
    #[must_use]
    pub fn features(&self, identity: bool, misc: bool) -> FeatureMap {
        assert!(identity || misc, "features: request at least one group");
        let mut f = FeatureMap::new();
        if identity {
            f.insert(self.identity_feature(), 1.0);
        }
        if !misc {
            return f;
        }
        for token in self.tokens().keys() {
            f.insert(token.chars().take(2).collect::<String>(), 1.0);
        }
        let k = self.n_components() as f64;
        let n = self.n_points() as f64;
        f.insert("one", 1.0);
        f.insert("n_components", k);
        f.insert("n_points", n);
        if let Some(stats) = self.fit_stats() {
            f.insert("aic", stats.aic);
            f.insert("bic", stats.bic);
            f.insert("variance", stats.variance);
            f.insert("variance_comp", stats.variance / k);
            f.insert("variance_pt", stats.variance / n);
        }
        let sumsum = self.mixture().covar_sumsum();
        let sumprod = self.mixture().covar_sumprod();
        f.insert("covar_sumsum", sumsum);
        f.insert("covar_sumprod", sumprod);
        f.insert("covar_sumsum_comp", sumsum / k);
        f.insert("covar_sumsum_pt", sumsum / n);
        f.insert("covar_sumprod_comp", sumprod / k);
        f.insert("covar_sumprod_pt", sumprod / n);
        f
    }
}
