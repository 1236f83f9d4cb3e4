//! A model that always predicts the same place: New York City.
//!
//! Useful as a baseline and as a second, trivially checkable realization of
//! [`LocationEstimate`].

use super::{EstimateState, LocationEstimate};
use crate::error::{GeolocError, Result};
use crate::model::ModelParams;
use crate::srs::{transform_to, GeoMultiPolygon, GeoPoint, GeodesicMethod, Geom, SpatialRef};
use crate::traits::LocationModel;
use geo::{BooleanOps, Destination, Geodesic, LineString, MultiPolygon, Point, Polygon};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Borough centers (WGS84) and radii in meters.
const BOROUGHS: [(f64, f64, f64); 4] = [
    (-73.994_168_453_729_49, 40.728_336_221_610_91, 9500.0), // Manhattan
    (-73.952_226_686_315_37, 40.624_725_493_754_33, 5000.0), // Brooklyn
    (-73.886_107_872_132_63, 40.837_218_482_134_33, 2000.0), // Bronx
    (-73.866_669_474_546_63, 40.749_999_941_150_72, 1000.0), // Queens
];

const CIRCLE_VERTICES: usize = 64;

/// Default `fail_interval`.
pub const DEFAULT_FAIL_INTERVAL: u32 = 7;

fn geodesic_circle(lon: f64, lat: f64, radius_m: f64) -> Polygon<f64> {
    let center = Point::new(lon, lat);
    let mut ring: Vec<Point<f64>> = (0..CIRCLE_VERTICES)
        .map(|i| {
            let bearing = 360.0 * i as f64 / CIRCLE_VERTICES as f64;
            Geodesic::destination(center, bearing, radius_m)
        })
        .collect();
    ring.push(ring[0]);
    Polygon::new(LineString::from(ring), vec![])
}

/// The fixed New York region, in WGS84.
fn new_york() -> MultiPolygon<f64> {
    let mut circles = BOROUGHS.iter().map(|&(lon, lat, r)| geodesic_circle(lon, lat, r));
    let mut region = circles
        .next()
        .map_or_else(|| MultiPolygon::new(vec![]), |p| MultiPolygon::new(vec![p]));
    for c in circles {
        region = region.union(&MultiPolygon::new(vec![c]));
    }
    region
}

/// Estimate with a fixed best point and region; coverage is ignored.
#[derive(Debug, Clone)]
pub struct FixedEstimate {
    state: EstimateState,
    center: GeoPoint,
    region: GeoMultiPolygon,
}

impl FixedEstimate {
    /// Estimate that always answers `center` and `region`.
    ///
    /// # Errors
    ///
    /// Returns [`GeolocError::SridMismatch`] if the two differ in SRID.
    pub fn new(center: GeoPoint, region: GeoMultiPolygon, geodesic: GeodesicMethod) -> Result<Self> {
        if center.srid() != region.srid() {
            return Err(GeolocError::SridMismatch {
                expected: center.srid(),
                actual: region.srid(),
            });
        }
        Ok(Self {
            state: EstimateState::new(center.srs(), geodesic),
            center,
            region,
        })
    }
}

impl LocationEstimate for FixedEstimate {
    fn state(&self) -> &EstimateState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EstimateState {
        &mut self.state
    }

    fn cae(&self, pt: &GeoPoint) -> f64 {
        self.sae(pt)
    }

    fn populate_best_point(&mut self) -> Result<()> {
        self.state.best_point = Some(self.center.clone());
        Ok(())
    }

    fn populate_pred_region_real(&mut self) -> Result<()> {
        self.state.pred_region = Some(self.region.clone());
        Ok(())
    }
}

/// Everyone is a New Yorker.
///
/// With a nonzero `fail_interval` n, each `locate` gives up with
/// probability 1/n.
#[derive(Debug)]
pub struct FixedModel {
    srs: SpatialRef,
    geodesic: GeodesicMethod,
    fail_interval: u32,
    rng: Mutex<StdRng>,
    fixed: Option<(GeoPoint, GeoMultiPolygon)>,
}

impl FixedModel {
    /// Unbuilt model producing estimates in `srid`.
    ///
    /// # Errors
    ///
    /// Returns [`GeolocError::UnsupportedSrid`] for unknown SRIDs.
    pub fn new(srid: u32, params: &ModelParams) -> Result<Self> {
        Ok(Self {
            srs: SpatialRef::from_srid(srid)?,
            geodesic: params.geodesic,
            fail_interval: DEFAULT_FAIL_INTERVAL,
            rng: Mutex::new(StdRng::seed_from_u64(params.seed)),
            fixed: None,
        })
    }

    /// Sets the failure interval; 0 never fails.
    #[must_use]
    pub fn with_fail_interval(mut self, n: u32) -> Self {
        self.fail_interval = n;
        self
    }

    fn fails(&self) -> bool {
        self.fail_interval > 0 && self.rng.lock().gen::<f64>() < 1.0 / f64::from(self.fail_interval)
    }

    /// Locates a message, returning the concrete estimate type.
    ///
    /// # Errors
    ///
    /// Fails if the model is not built.
    pub fn locate_fixed(&self, confidence: f64) -> Result<Option<FixedEstimate>> {
        let (center, region) = self
            .fixed
            .clone()
            .ok_or_else(|| GeolocError::Other("FixedModel is not built".to_string()))?;
        if self.fails() {
            return Ok(None);
        }
        let mut est = FixedEstimate::new(center, region, self.geodesic)?;
        est.prepare(Some(confidence))?;
        Ok(Some(est))
    }
}

impl LocationModel for FixedModel {
    fn build(&mut self) -> Result<()> {
        self.warn_if_parallel();
        let (lon, lat, _) = BOROUGHS[0];
        let center = transform_to(&Geom::with_srs(SpatialRef::WGS84, Point::new(lon, lat)), &self.srs);
        let region = transform_to(&Geom::with_srs(SpatialRef::WGS84, new_york()), &self.srs);
        debug!(srid = self.srs.srid(), parts = region.geom().0.len(), "built fixed region");
        self.fixed = Some((center, region));
        Ok(())
    }

    fn locate(&self, _tokens: &[&str], confidence: f64) -> Result<Option<Box<dyn LocationEstimate>>> {
        Ok(self
            .locate_fixed(confidence)?
            .map(|e| Box::new(e) as Box<dyn LocationEstimate>))
    }

    fn srid(&self) -> u32 {
        self.srs.srid()
    }
}
