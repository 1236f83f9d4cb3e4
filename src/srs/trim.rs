//! Map bounds and trimming of geometries that extend off the globe.
//!
//! Only valid for projections whose parallels are straight horizontal lines,
//! which holds for every supported SRID.

use super::{transform_to, GeoMultiPoint, GeoMultiPolygon, GeoPoint, GeoPolygon, Geom, SpatialRef};
use crate::error::Result;
use geo::{BooleanOps, MultiPoint, MultiPolygon, Point, Polygon};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Northernmost valid latitude.
pub const LATMAX: f64 = 89.99;
/// Southernmost valid latitude.
pub const LATMIN: f64 = -LATMAX;
/// Easternmost longitude.
pub const LONMAX: f64 = 180.0;
/// Westernmost longitude.
pub const LONMIN: f64 = -LONMAX;
/// Multiplier applied to the projected ±180° longitude range.
pub const LON_BUFFER: f64 = 12.0;

type BoundsCache = Lazy<RwLock<HashMap<u32, (f64, f64)>>>;

static LAT_BOUNDS: BoundsCache = Lazy::new(|| RwLock::new(HashMap::new()));
static LON_BOUNDS: BoundsCache = Lazy::new(|| RwLock::new(HashMap::new()));

fn memoized(cache: &BoundsCache, srid: u32, compute: impl FnOnce() -> (f64, f64)) -> (f64, f64) {
    if let Some(b) = cache.read().get(&srid) {
        return *b;
    }
    *cache.write().entry(srid).or_insert_with(compute)
}

fn project(srs: &SpatialRef, lon: f64, lat: f64) -> (f64, f64) {
    let p = Geom::with_srs(SpatialRef::WGS84, Point::new(lon, lat));
    let q = transform_to(&p, srs);
    (q.x(), q.y())
}

/// Y coordinates of the (south, north) poles in `srs`.
#[must_use]
pub fn lat_bounds(srs: &SpatialRef) -> (f64, f64) {
    memoized(&LAT_BOUNDS, srs.srid(), || {
        (project(srs, 0.0, LATMIN).1, project(srs, 0.0, LATMAX).1)
    })
}

/// Buffered X coordinates of the (west, east) map edges in `srs`.
///
/// The globe has no real east/west boundary, so the range is widened by
/// [`LON_BUFFER`] to leave room for wrap-around geometry.
#[must_use]
pub fn lon_bounds(srs: &SpatialRef) -> (f64, f64) {
    memoized(&LON_BOUNDS, srs.srid(), || {
        (
            project(srs, LONMIN, 0.0).0 * LON_BUFFER,
            project(srs, LONMAX, 0.0).0 * LON_BUFFER,
        )
    })
}

/// Bounding box of the valid map extent in `srs`.
#[must_use]
pub fn bounding_box(srs: &SpatialRef) -> GeoPolygon {
    let (xmin, xmax) = lon_bounds(srs);
    let (ymin, ymax) = lat_bounds(srs);
    let ring = vec![
        (xmin, ymin),
        (xmin, ymax),
        (xmax, ymax),
        (xmax, ymin),
        (xmin, ymin),
    ];
    Geom::with_srs(*srs, Polygon::new(ring.into(), vec![]))
}

/// [`lat_bounds`] by SRID.
///
/// # Errors
///
/// Returns an error for unknown SRIDs.
pub fn lat_bounds_srid(srid: u32) -> Result<(f64, f64)> {
    Ok(lat_bounds(&SpatialRef::from_srid(srid)?))
}

/// [`lon_bounds`] by SRID.
///
/// # Errors
///
/// Returns an error for unknown SRIDs.
pub fn lon_bounds_srid(srid: u32) -> Result<(f64, f64)> {
    Ok(lon_bounds(&SpatialRef::from_srid(srid)?))
}

/// [`bounding_box`] by SRID.
///
/// # Errors
///
/// Returns an error for unknown SRIDs.
pub fn bounding_box_srid(srid: u32) -> Result<GeoPolygon> {
    Ok(bounding_box(&SpatialRef::from_srid(srid)?))
}

/// True if the point lies strictly between the poles.
#[must_use]
pub fn inbounds_p(pt: &GeoPoint) -> bool {
    let (s, n) = lat_bounds(&pt.srs());
    pt.y() > s && pt.y() < n
}

/// Removes the parts of a geometry that extend past the poles.
pub trait Trim {
    /// Geometry type left after trimming.
    type Output;

    /// Intersects with the valid map extent of the geometry's own SRID.
    fn trim(&self) -> Self::Output;
}

impl Trim for GeoMultiPoint {
    type Output = GeoMultiPoint;

    fn trim(&self) -> GeoMultiPoint {
        let (xmin, xmax) = lon_bounds(&self.srs());
        let (ymin, ymax) = lat_bounds(&self.srs());
        let kept: Vec<Point<f64>> = self
            .geom()
            .0
            .iter()
            .filter(|p| p.x() >= xmin && p.x() <= xmax && p.y() >= ymin && p.y() <= ymax)
            .copied()
            .collect();
        Geom::with_srs(self.srs(), MultiPoint::new(kept))
    }
}

impl Trim for GeoMultiPolygon {
    type Output = GeoMultiPolygon;

    fn trim(&self) -> GeoMultiPolygon {
        let bbox = MultiPolygon::new(vec![bounding_box(&self.srs()).into_inner()]);
        Geom::with_srs(self.srs(), bbox.intersection(self.geom()))
    }
}

impl Trim for GeoPolygon {
    type Output = GeoMultiPolygon;

    fn trim(&self) -> GeoMultiPolygon {
        self.clone()
            .map(|p| MultiPolygon::new(vec![p]))
            .trim()
    }
}

/// Free-function form of [`Trim::trim`].
pub fn trim<T: Trim>(geom: &T) -> T::Output {
    geom.trim()
}
