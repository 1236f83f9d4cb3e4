//! Geodesic distances and areas.

use super::{
    geometry_type_name, transform_to, Geom, GeoGeometry, GeoMultiPoint, GeoMultiPolygon, GeoPoint,
    SpatialRef,
};
use crate::error::{GeolocError, Result};
use geo::{Area, Distance, Geodesic, Geometry, MultiPolygon, Point};
use serde::{Deserialize, Serialize};

/// Mean Earth radius (km) for spherical distances.
pub const EARTH_RADIUS_KM: f64 = 6371.009;
/// Degrees to radians, truncated to match historical outputs.
pub const DEG2RAD: f64 = 0.017_453_293;

/// How geodesic distances are computed.
///
/// Spherical is fast and off by about 0.2-0.3%; ellipsoidal uses the WGS84
/// geodesic and is slower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeodesicMethod {
    /// Haversine on a sphere of radius [`EARTH_RADIUS_KM`].
    #[default]
    Spherical,
    /// Karney geodesic on the WGS84 ellipsoid.
    Ellipsoidal,
}

impl std::str::FromStr for GeodesicMethod {
    type Err = GeolocError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "spherical" => Ok(Self::Spherical),
            "ellipsoidal" => Ok(Self::Ellipsoidal),
            _ => Err(GeolocError::invalid_param(
                "geodesic",
                s,
                "spherical or ellipsoidal",
            )),
        }
    }
}

fn wgs84_coords(points: &GeoMultiPoint) -> Vec<(f64, f64)> {
    transform_to(points, &SpatialRef::WGS84).coords()
}

fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (alon, alat) = (a.0 * DEG2RAD, a.1 * DEG2RAD);
    let (blon, blat) = (b.0 * DEG2RAD, b.1 * DEG2RAD);
    let h = ((alat - blat) / 2.0).sin().powi(2)
        + alat.cos() * blat.cos() * ((alon - blon) / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * h.sqrt().asin()
}

fn ellipsoidal_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    Geodesic::distance(Point::new(a.0, a.1), Point::new(b.0, b.1)) / 1000.0
}

/// Distance in km from `a` to every member of `b`. Inputs may be in any SRID.
#[must_use]
pub fn geodesic_distance_mp(a: &GeoPoint, b: &GeoMultiPoint, method: GeodesicMethod) -> Vec<f64> {
    let a = transform_to(a, &SpatialRef::WGS84);
    let origin = (a.x(), a.y());
    let f = match method {
        GeodesicMethod::Spherical => haversine_km,
        GeodesicMethod::Ellipsoidal => ellipsoidal_km,
    };
    wgs84_coords(b).into_iter().map(|p| f(origin, p)).collect()
}

/// Distance in km from `a` to `b`. Inputs may be in any SRID.
#[must_use]
pub fn geodesic_distance(a: &GeoPoint, b: &GeoPoint, method: GeodesicMethod) -> f64 {
    let a = transform_to(a, &SpatialRef::WGS84);
    let b = transform_to(b, &SpatialRef::WGS84);
    let (pa, pb) = ((a.x(), a.y()), (b.x(), b.y()));
    match method {
        GeodesicMethod::Spherical => haversine_km(pa, pb),
        GeodesicMethod::Ellipsoidal => ellipsoidal_km(pa, pb),
    }
}

/// Area in km² of a MultiPolygon, via the equal-area projection.
#[must_use]
pub fn geodesic_area_mp(mp: &GeoMultiPolygon) -> f64 {
    transform_to(mp, &SpatialRef::EQAREA).geom().unsigned_area() / 1e6
}

/// Area in km² of a Polygon or MultiPolygon.
///
/// # Errors
///
/// Returns [`GeolocError::GeometryType`] for any other geometry type.
pub fn geodesic_area(geom: &GeoGeometry) -> Result<f64> {
    let mp = match geom.geom() {
        Geometry::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
        Geometry::MultiPolygon(mp) => mp.clone(),
        other => {
            return Err(GeolocError::GeometryType {
                expected: "Polygon or MultiPolygon".to_string(),
                actual: geometry_type_name(other).to_string(),
            })
        }
    };
    Ok(geodesic_area_mp(&Geom::with_srs(geom.srs(), mp)))
}
