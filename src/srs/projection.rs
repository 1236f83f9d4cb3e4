//! Projection math and the memoized coordinate-transform cache.

use super::Geom;
use crate::error::{GeolocError, Result};
use geo::{Coord, MapCoords};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::borrow::Cow;
use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, SQRT_2};

/// WGS84 semi-major axis (m).
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 first eccentricity squared.
const WGS84_ES: f64 = 0.006_694_379_990_14;
/// WGS84 authalic sphere radius (m).
const WGS84_R_A: f64 = 6_371_007.181;

/// A map projection from WGS84 degrees to planar coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Longitude/latitude in degrees.
    Geographic,
    /// Miller cylindrical on the authalic sphere. Geodetic latitude is
    /// shifted to the sphere through geocentric latitude.
    Miller {
        /// Meters per output unit.
        to_meter: f64,
    },
    /// Mollweide with the WGS84 semi-major axis as sphere radius.
    Mollweide {
        /// Meters per output unit.
        to_meter: f64,
    },
}

impl Projection {
    /// Projects WGS84 `(lon, lat)` degrees.
    #[must_use]
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        match *self {
            Projection::Geographic => (lon, lat),
            Projection::Miller { to_meter } => {
                let lam = lon.to_radians();
                let phi = ((1.0 - WGS84_ES) * lat.to_radians().tan()).atan();
                let x = WGS84_R_A * lam;
                let y = WGS84_R_A * 1.25 * (FRAC_PI_4 + 0.4 * phi).tan().ln();
                (x / to_meter, y / to_meter)
            }
            Projection::Mollweide { to_meter } => {
                let lam = lon.to_radians();
                let theta = mollweide_theta(lat.to_radians());
                let x = WGS84_A * 2.0 * SQRT_2 / PI * lam * theta.cos();
                let y = WGS84_A * SQRT_2 * theta.sin();
                (x / to_meter, y / to_meter)
            }
        }
    }

    /// Inverse of [`Projection::forward`], returning WGS84 degrees.
    #[must_use]
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Projection::Geographic => (x, y),
            Projection::Miller { to_meter } => {
                let (x, y) = (x * to_meter / WGS84_R_A, y * to_meter / WGS84_R_A);
                let phi_c = 2.5 * (0.8 * y).exp().atan() - 0.625 * PI;
                let phi = (phi_c.tan() / (1.0 - WGS84_ES)).atan();
                (x.to_degrees(), phi.to_degrees())
            }
            Projection::Mollweide { to_meter } => {
                let (x, y) = (x * to_meter / WGS84_A, y * to_meter / WGS84_A);
                let theta = (y / SQRT_2).clamp(-1.0, 1.0).asin();
                let lam = if theta.cos().abs() < 1e-12 {
                    0.0
                } else {
                    x * PI / (2.0 * SQRT_2 * theta.cos())
                };
                let phi = ((2.0 * theta + (2.0 * theta).sin()) / PI)
                    .clamp(-1.0, 1.0)
                    .asin();
                (lam.to_degrees(), phi.to_degrees())
            }
        }
    }
}

/// Auxiliary angle θ solving `2θ + sin 2θ = π sin φ` by Newton iteration.
fn mollweide_theta(phi: f64) -> f64 {
    if phi.abs() >= FRAC_PI_2 {
        return phi.signum() * FRAC_PI_2;
    }
    let k = PI * phi.sin();
    let mut t = phi;
    for _ in 0..30 {
        let v = (t + t.sin() - k) / (1.0 + t.cos());
        t -= v;
        if v.abs() < 1e-12 {
            break;
        }
    }
    t * 0.5
}

/// A resolved spatial reference: SRID, name and projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialRef {
    srid: u32,
    name: &'static str,
    projection: Projection,
}

impl SpatialRef {
    /// WGS84 geographic coordinates.
    pub const WGS84: SpatialRef = SpatialRef {
        srid: 4326,
        name: "WGS 84",
        projection: Projection::Geographic,
    };

    /// Mollweide in meters, the equal-area reference.
    pub const EQAREA: SpatialRef = SpatialRef {
        srid: 54009,
        name: "Mollweide",
        projection: Projection::Mollweide { to_meter: 1.0 },
    };

    /// Looks up a supported SRID.
    ///
    /// # Errors
    ///
    /// Returns [`GeolocError::UnsupportedSrid`] for unknown SRIDs.
    pub fn from_srid(srid: u32) -> Result<Self> {
        let (name, projection) = match srid {
            4326 => return Ok(Self::WGS84),
            54003 => ("Miller", Projection::Miller { to_meter: 1.0 }),
            540033 => ("Miller_Km", Projection::Miller { to_meter: 1e3 }),
            540036 => ("Miller_Mm", Projection::Miller { to_meter: 1e6 }),
            54009 => return Ok(Self::EQAREA),
            540093 => ("Mollweide_Km", Projection::Mollweide { to_meter: 1e3 }),
            540096 => ("Mollweide_Mm", Projection::Mollweide { to_meter: 1e6 }),
            _ => return Err(GeolocError::UnsupportedSrid(srid)),
        };
        Ok(Self {
            srid,
            name,
            projection,
        })
    }

    /// Numeric SRID.
    #[must_use]
    pub fn srid(&self) -> u32 {
        self.srid
    }

    /// Human-readable name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Projection from WGS84.
    #[must_use]
    pub fn projection(&self) -> Projection {
        self.projection
    }
}

/// Transform between two spatial references through WGS84.
#[derive(Debug, Clone, Copy)]
struct CoordTransform {
    src: Projection,
    dst: Projection,
}

impl CoordTransform {
    fn apply(&self, c: Coord<f64>) -> Coord<f64> {
        let (lon, lat) = self.src.inverse(c.x, c.y);
        let (x, y) = self.dst.forward(lon, lat);
        Coord { x, y }
    }
}

static TRANSFORMERS: Lazy<RwLock<HashMap<(u32, u32), CoordTransform>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn cached_transform(src: &SpatialRef, dst: &SpatialRef) -> CoordTransform {
    let key = (src.srid, dst.srid);
    if let Some(ct) = TRANSFORMERS.read().get(&key) {
        return *ct;
    }
    *TRANSFORMERS.write().entry(key).or_insert(CoordTransform {
        src: src.projection,
        dst: dst.projection,
    })
}

/// Transforms `geom` to an already resolved target reference.
pub(crate) fn transform_to<G>(geom: &Geom<G>, target: &SpatialRef) -> Geom<G>
where
    G: MapCoords<f64, f64, Output = G>,
{
    let ct = cached_transform(&geom.srs, target);
    Geom::with_srs(*target, geom.geom.map_coords(move |c| ct.apply(c)))
}

/// Returns `geom` in SRID `srid`.
///
/// The input itself is returned (borrowed) when no transformation is
/// needed; use [`transform_copy`] to always get an owned value.
///
/// # Errors
///
/// Returns [`GeolocError::UnsupportedSrid`] for unknown target SRIDs.
pub fn transform<G>(geom: &Geom<G>, srid: u32) -> Result<Cow<'_, Geom<G>>>
where
    G: MapCoords<f64, f64, Output = G> + Clone,
{
    if geom.srid() == srid {
        return Ok(Cow::Borrowed(geom));
    }
    let target = SpatialRef::from_srid(srid)?;
    Ok(Cow::Owned(transform_to(geom, &target)))
}

/// Like [`transform`] but always returns a fresh copy.
///
/// # Errors
///
/// Returns [`GeolocError::UnsupportedSrid`] for unknown target SRIDs.
pub fn transform_copy<G>(geom: &Geom<G>, srid: u32) -> Result<Geom<G>>
where
    G: MapCoords<f64, f64, Output = G> + Clone,
{
    Ok(transform(geom, srid)?.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::Point;

    #[test]
    fn test_all_srids_resolve() {
        for srid in [4326, 54003, 540033, 540036, 54009, 540093, 540096] {
            assert_eq!(SpatialRef::from_srid(srid).expect("supported").srid(), srid);
        }
        assert!(matches!(
            SpatialRef::from_srid(3857),
            Err(GeolocError::UnsupportedSrid(3857))
        ));
    }

    #[test]
    fn test_transform_to_miller_mm_and_back() {
        let a = Geom::new(4326, Point::new(1.0, 2.0)).expect("wgs84");
        let b = transform(&a, 540036).expect("supported");
        assert_eq!(a.srid(), 4326);
        assert_eq!(b.srid(), 540036);
        assert_relative_eq!(b.x(), 0.111_195, epsilon = 1e-5);
        assert_relative_eq!(b.y(), 0.220_931, epsilon = 1e-5);
        let c = transform(&b, 4326).expect("supported");
        assert_eq!(c.srid(), 4326);
        assert_relative_eq!(c.x(), 1.0, epsilon = 1e-4);
        assert_relative_eq!(c.y(), 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_transform_same_srid_borrows() {
        let a = Geom::new(4326, Point::new(1.0, 2.0)).expect("wgs84");
        assert!(matches!(transform(&a, 4326).expect("same"), Cow::Borrowed(_)));
        let copy = transform_copy(&a, 4326).expect("same");
        assert_eq!(copy, a);
    }

    #[test]
    fn test_mollweide_round_trip() {
        let proj = Projection::Mollweide { to_meter: 1e3 };
        for &(lon, lat) in &[(0.0, 0.0), (-109.05, 41.0), (170.0, -75.0), (45.0, 89.0)] {
            let (x, y) = proj.forward(lon, lat);
            let (lon2, lat2) = proj.inverse(x, y);
            assert_relative_eq!(lon, lon2, epsilon = 1e-7);
            assert_relative_eq!(lat, lat2, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_mollweide_poles() {
        let proj = Projection::Mollweide { to_meter: 1.0 };
        let (x, y) = proj.forward(30.0, 90.0);
        assert_relative_eq!(x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(y, WGS84_A * SQRT_2, epsilon = 1e-6);
    }

    #[test]
    fn test_transform_cache_is_reused() {
        let miller = SpatialRef::from_srid(54003).expect("supported");
        let _ = cached_transform(&SpatialRef::WGS84, &miller);
        assert!(TRANSFORMERS.read().contains_key(&(4326, 54003)));
    }
}
