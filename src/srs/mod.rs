//! Spatial reference systems and geodesy.
//!
//! Geometries carry their SRID in a [`Geom`] wrapper. Supported references:
//!
//! | SRID | name | units |
//! |---|---|---|
//! | 4326 | WGS84 | degrees |
//! | 54003 / 540033 / 540036 | Miller cylindrical | m / km / Mm |
//! | 54009 / 540093 / 540096 | Mollweide (equal area) | m / km / Mm |
//!
//! A km- or Mm-based variant of a meter-based SRID `x` is numbered `x*10+3`
//! or `x*10+6` respectively.
//!
//! # Examples
//!
//! ```
//! use geo::Point;
//! use geoloc::srs::{self, Geom, GeodesicMethod};
//!
//! let bna = Geom::new(4326, Point::new(-86.67, 36.12)).unwrap();
//! let lax = Geom::new(4326, Point::new(-118.40, 33.94)).unwrap();
//! let d = srs::geodesic_distance(&bna, &lax, GeodesicMethod::Spherical);
//! assert!((d - 2886.44).abs() < 0.01);
//! ```

mod geodesy;
mod geojson;
mod projection;
mod trim;

pub use geodesy::{
    geodesic_area, geodesic_area_mp, geodesic_distance, geodesic_distance_mp, GeodesicMethod,
    DEG2RAD, EARTH_RADIUS_KM,
};
pub use geojson::{dump_geojson, feature_collection, geometry_to_geojson};
pub use projection::{transform, transform_copy, Projection, SpatialRef};
pub use trim::{
    bounding_box, bounding_box_srid, inbounds_p, lat_bounds, lat_bounds_srid, lon_bounds,
    lon_bounds_srid, trim, Trim, LATMAX, LATMIN, LONMAX, LONMIN, LON_BUFFER,
};

pub(crate) use projection::transform_to;

use crate::error::Result;
use geo::{Geometry, MultiPoint, MultiPolygon, Point, Polygon};

/// WGS84 geographic coordinates.
pub const SRID_WGS84: u32 = 4326;
/// Equal-area reference used for area computations (Mollweide, meters).
pub const SRID_EQAREA: u32 = 54009;

/// A geometry tagged with its spatial reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Geom<G> {
    srs: SpatialRef,
    geom: G,
}

/// Point with SRID.
pub type GeoPoint = Geom<Point<f64>>;
/// MultiPoint with SRID.
pub type GeoMultiPoint = Geom<MultiPoint<f64>>;
/// Polygon with SRID.
pub type GeoPolygon = Geom<Polygon<f64>>;
/// MultiPolygon with SRID.
pub type GeoMultiPolygon = Geom<MultiPolygon<f64>>;
/// Any geometry with SRID.
pub type GeoGeometry = Geom<Geometry<f64>>;

impl<G> Geom<G> {
    /// Tags `geom` with `srid`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GeolocError::UnsupportedSrid`] for unknown SRIDs.
    pub fn new(srid: u32, geom: G) -> Result<Self> {
        Ok(Self {
            srs: SpatialRef::from_srid(srid)?,
            geom,
        })
    }

    /// Tags `geom` with an already resolved spatial reference.
    #[must_use]
    pub fn with_srs(srs: SpatialRef, geom: G) -> Self {
        Self { srs, geom }
    }

    /// SRID of the geometry.
    #[must_use]
    pub fn srid(&self) -> u32 {
        self.srs.srid()
    }

    /// Spatial reference of the geometry.
    #[must_use]
    pub fn srs(&self) -> SpatialRef {
        self.srs
    }

    /// The untagged geometry.
    #[must_use]
    pub fn geom(&self) -> &G {
        &self.geom
    }

    /// Consumes the wrapper, returning the untagged geometry.
    #[must_use]
    pub fn into_inner(self) -> G {
        self.geom
    }

    /// Applies `f` to the geometry, keeping the SRID.
    #[must_use]
    pub fn map<H>(self, f: impl FnOnce(G) -> H) -> Geom<H> {
        Geom {
            srs: self.srs,
            geom: f(self.geom),
        }
    }

    /// Widens to an untyped geometry.
    #[must_use]
    pub fn into_geometry(self) -> GeoGeometry
    where
        G: Into<Geometry<f64>>,
    {
        self.map(Into::into)
    }
}

impl GeoPoint {
    /// X coordinate (longitude in WGS84).
    #[must_use]
    pub fn x(&self) -> f64 {
        self.geom.x()
    }

    /// Y coordinate (latitude in WGS84).
    #[must_use]
    pub fn y(&self) -> f64 {
        self.geom.y()
    }
}

impl GeoMultiPoint {
    /// Builds a MultiPoint from `(x, y)` pairs.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown SRIDs.
    pub fn from_coords(srid: u32, coords: &[(f64, f64)]) -> Result<Self> {
        let points: Vec<Point<f64>> = coords.iter().map(|&(x, y)| Point::new(x, y)).collect();
        Self::new(srid, MultiPoint::new(points))
    }

    /// Number of member points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.geom.0.len()
    }

    /// True if there are no member points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geom.0.is_empty()
    }

    /// Member coordinates as `(x, y)` pairs.
    #[must_use]
    pub fn coords(&self) -> Vec<(f64, f64)> {
        self.geom.0.iter().map(|p| (p.x(), p.y())).collect()
    }
}

/// Name of a geometry's type, for error messages.
pub(crate) fn geometry_type_name(g: &Geometry<f64>) -> &'static str {
    match g {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geom_new_rejects_unknown_srid() {
        assert!(Geom::new(1234, Point::new(0.0, 0.0)).is_err());
        let p = Geom::new(540036, Point::new(0.0, 0.0)).expect("known srid");
        assert_eq!(p.srid(), 540036);
        assert_eq!(p.srs().name(), "Miller_Mm");
    }

    #[test]
    fn test_multipoint_coords() {
        let mp = GeoMultiPoint::from_coords(4326, &[(1.0, 2.0), (3.0, 4.0)]).expect("wgs84");
        assert_eq!(mp.len(), 2);
        assert_eq!(mp.coords(), vec![(1.0, 2.0), (3.0, 4.0)]);
    }

    #[test]
    fn test_into_geometry() {
        let g = Geom::new(4326, Point::new(0.0, 0.0))
            .expect("wgs84")
            .into_geometry();
        assert_eq!(geometry_type_name(g.geom()), "Point");
    }
}
