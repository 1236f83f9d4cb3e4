//! Location estimates.
//!
//! A [`LocationEstimate`] is what a model returns for one message: a best
//! point, a prediction region at some coverage, that region's area, and
//! error and coverage metrics against a true point. Concrete estimates hold
//! an [`EstimateState`] and implement the model-specific hooks; the trait's
//! provided methods do the orchestration.
//!
//! The lifecycle is `prepare(coverage)` (expensive setup, then best point,
//! then region) → metrics → optionally `populate_pred_region` again for other
//! coverages → `unprepare()` to drop bulky intermediate state.

mod fixed;

pub use fixed::{FixedEstimate, FixedModel};

use crate::error::{GeolocError, Result};
use crate::srs::{
    self, geodesic_area_mp, geometry_to_geojson, GeoMultiPolygon, GeoPoint, GeoPolygon,
    GeodesicMethod, SpatialRef, SRID_WGS84,
};
use geo::{Contains, Geometry};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Outputs shared by every location estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateState {
    /// Reference the estimate's outputs are expressed in.
    pub srs: SpatialRef,
    /// Distance method used by the error metrics.
    pub geodesic: GeodesicMethod,
    /// Coverage the current prediction region was built for.
    pub pred_coverage: Option<f64>,
    /// Prediction region, trimmed to the valid map extent.
    pub pred_region: Option<GeoMultiPolygon>,
    /// Area of the prediction region in km².
    pub pred_area: Option<f64>,
    /// Single best guess.
    pub best_point: Option<GeoPoint>,
    /// Whether `prepare` has completed since the last `unprepare`.
    pub prepared: bool,
}

impl EstimateState {
    /// Empty state in `srs`.
    #[must_use]
    pub fn new(srs: SpatialRef, geodesic: GeodesicMethod) -> Self {
        Self {
            srs,
            geodesic,
            pred_coverage: None,
            pred_region: None,
            pred_area: None,
            best_point: None,
            prepared: false,
        }
    }
}

fn populated<'a, T>(v: Option<&'a T>, what: &str) -> &'a T {
    match v {
        Some(v) => v,
        None => panic!("{what} not populated; call prepare() first"),
    }
}

fn check_coverage(coverage: f64) -> Result<()> {
    if coverage > 0.0 && coverage < 1.0 {
        Ok(())
    } else {
        Err(GeolocError::invalid_param("coverage", coverage, "0 < coverage < 1"))
    }
}

/// The capability every model output provides.
///
/// Implementors supply [`state`](Self::state)/[`state_mut`](Self::state_mut),
/// [`cae`](Self::cae), [`populate_best_point`](Self::populate_best_point) and
/// [`populate_pred_region_real`](Self::populate_pred_region_real); the rest
/// have working defaults.
pub trait LocationEstimate: fmt::Debug + Send + Sync {
    /// Shared outputs.
    fn state(&self) -> &EstimateState;

    /// Shared outputs, mutably.
    fn state_mut(&mut self) -> &mut EstimateState;

    /// SRID of the estimate's outputs.
    fn srid(&self) -> u32 {
        self.state().srs.srid()
    }

    /// Best point, once populated.
    fn best_point(&self) -> Option<&GeoPoint> {
        self.state().best_point.as_ref()
    }

    /// Prediction region, once populated.
    fn pred_region(&self) -> Option<&GeoMultiPolygon> {
        self.state().pred_region.as_ref()
    }

    /// Prediction region area in km², once populated.
    fn pred_area(&self) -> Option<f64> {
        self.state().pred_area
    }

    /// Coverage of the current prediction region.
    fn pred_coverage(&self) -> Option<f64> {
        self.state().pred_coverage
    }

    /// Whether the estimate is prepared.
    fn prepared(&self) -> bool {
        self.state().prepared
    }

    /// Human-readable factors behind the estimate and their weights.
    fn explanation(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }

    /// Comprehensive absolute error (km) for the true point `pt`.
    fn cae(&self, pt: &GeoPoint) -> f64;

    /// Simple absolute error: distance (km) from the best point to `pt`.
    ///
    /// # Panics
    ///
    /// Panics if the best point has not been populated.
    fn sae(&self, pt: &GeoPoint) -> f64 {
        let bp = populated(self.best_point(), "best point");
        srs::geodesic_distance(bp, pt, self.state().geodesic)
    }

    /// Contour value in `[0, 1]` on which `pt` lies, or -1 if the estimate
    /// cannot compute one.
    fn contour(&self, _pt: &GeoPoint) -> f64 {
        -1.0
    }

    /// True if `pt` lies strictly inside the prediction region.
    ///
    /// # Panics
    ///
    /// Panics if `pt` is in a different SRID or the region is not populated.
    fn covers_p(&self, pt: &GeoPoint) -> bool {
        assert_eq!(pt.srid(), self.srid(), "point SRID differs from estimate SRID");
        populated(self.pred_region(), "prediction region")
            .geom()
            .contains(pt.geom())
    }

    /// Coverage test that may use a cheaper model-specific criterion.
    ///
    /// # Panics
    ///
    /// Panics if `pt` is in a different SRID.
    fn coverst_p(&self, pt: &GeoPoint) -> bool {
        assert_eq!(pt.srid(), self.srid(), "point SRID differs from estimate SRID");
        self.coverst_p_real(pt)
    }

    /// Hook behind [`coverst_p`](Self::coverst_p); geometric containment by default.
    fn coverst_p_real(&self, pt: &GeoPoint) -> bool {
        self.covers_p(pt)
    }

    /// Probability that the true point lies in `pg`, if the estimate can say.
    fn likelihood_polygon(&self, _pg: &GeoPolygon) -> Option<f64> {
        None
    }

    /// Computes and stores the best point.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn populate_best_point(&mut self) -> Result<()>;

    /// Computes and stores the prediction region for the stored coverage.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn populate_pred_region_real(&mut self) -> Result<()>;

    /// Recomputes the prediction region and its area for `coverage`.
    ///
    /// # Errors
    ///
    /// Fails unless `0 < coverage < 1`, and propagates failures of the
    /// region computation.
    fn populate_pred_region(&mut self, coverage: f64) -> Result<()> {
        check_coverage(coverage)?;
        self.state_mut().pred_coverage = Some(coverage);
        self.populate_pred_region_real()?;
        self.populate_pred_area();
        Ok(())
    }

    /// Stores the area of the current prediction region.
    fn populate_pred_area(&mut self) {
        let area = self.pred_region().map(geodesic_area_mp);
        self.state_mut().pred_area = area;
    }

    /// Coverage-independent setup, such as sampling.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn prepare_real(&mut self) -> Result<()> {
        Ok(())
    }

    /// Makes the estimate usable: setup, best point, then prediction region.
    /// Uses the previously stored coverage when `coverage` is `None`.
    ///
    /// # Errors
    ///
    /// Fails if no valid coverage is known, or if any stage fails.
    fn prepare(&mut self, coverage: Option<f64>) -> Result<()> {
        if let Some(c) = coverage {
            check_coverage(c)?;
            self.state_mut().pred_coverage = Some(c);
        }
        let coverage = self
            .pred_coverage()
            .ok_or_else(|| GeolocError::Other("prepare() needs a coverage".to_string()))?;
        self.prepare_real()?;
        self.populate_best_point()?;
        self.populate_pred_region(coverage)?;
        self.state_mut().prepared = true;
        Ok(())
    }

    /// Drops bulky intermediate state. `prepare` restores it.
    fn unprepare(&mut self) {
        self.state_mut().prepared = false;
    }

    /// Writes a georeferenced raster of the estimate, if it has one.
    /// Returns the files written.
    ///
    /// # Errors
    ///
    /// I/O and encoding failures.
    fn dump_geoimage(&self, _basename: &str, _width_px: usize) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    /// Writes `basename.pr.geojson` (the prediction region) and the raster,
    /// re-preparing first if `coverage` is given. Returns the files written.
    ///
    /// # Errors
    ///
    /// Fails if the region is not populated, or on I/O errors.
    fn dump_geofiles(
        &mut self,
        basename: &str,
        width_px: usize,
        coverage: Option<f64>,
    ) -> Result<Vec<PathBuf>> {
        if coverage.is_some() {
            self.prepare(coverage)?;
        }
        let region = self
            .pred_region()
            .cloned()
            .ok_or_else(|| GeolocError::Other("no prediction region to dump".to_string()))?;
        let mut written = vec![srs::dump_geojson(
            &format!("{basename}.pr"),
            &region.into_geometry(),
        )?];
        written.extend(self.dump_geoimage(basename, width_px)?);
        Ok(written)
    }

    /// GeoJSON FeatureCollection (WGS84) with the best point and the
    /// prediction region.
    ///
    /// # Errors
    ///
    /// Fails if the estimate is not prepared.
    fn to_geojson(&self) -> Result<Value> {
        let (Some(bp), Some(region)) = (self.best_point(), self.pred_region()) else {
            return Err(GeolocError::Other("estimate is not prepared".to_string()));
        };
        let bp = srs::transform(bp, SRID_WGS84)?;
        let region = srs::transform(region, SRID_WGS84)?;
        Ok(json!({
            "type": "FeatureCollection",
            "crs": { "type": "name", "properties": { "name": format!("EPSG:{SRID_WGS84}") } },
            "features": [
                {
                    "type": "Feature",
                    "properties": { "name": "best_point" },
                    "geometry": geometry_to_geojson(&Geometry::Point(*bp.geom()))?,
                },
                {
                    "type": "Feature",
                    "properties": { "name": "pred_region", "coverage": self.pred_coverage() },
                    "geometry": geometry_to_geojson(&Geometry::MultiPolygon(region.geom().clone()))?,
                },
            ],
        }))
    }
}
