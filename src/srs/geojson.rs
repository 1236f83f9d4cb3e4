//! GeoJSON output.

use super::{geometry_type_name, transform_to, GeoGeometry, SpatialRef, SRID_WGS84};
use crate::error::{GeolocError, Result};
use geo::{Coord, Geometry, LineString, Polygon};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;

fn position(c: &Coord<f64>) -> Value {
    json!([c.x, c.y])
}

fn ring(ls: &LineString<f64>) -> Value {
    Value::Array(ls.0.iter().map(position).collect())
}

fn polygon_rings(p: &Polygon<f64>) -> Value {
    let mut rings = vec![ring(p.exterior())];
    rings.extend(p.interiors().iter().map(ring));
    Value::Array(rings)
}

/// GeoJSON geometry object for `g` (coordinates as given, no reprojection).
///
/// # Errors
///
/// Returns [`GeolocError::GeometryType`] for geometry collections.
pub fn geometry_to_geojson(g: &Geometry<f64>) -> Result<Value> {
    let (kind, coordinates) = match g {
        Geometry::Point(p) => ("Point", position(&p.0)),
        Geometry::MultiPoint(mp) => (
            "MultiPoint",
            Value::Array(mp.0.iter().map(|p| position(&p.0)).collect()),
        ),
        Geometry::Line(l) => ("LineString", json!([[l.start.x, l.start.y], [l.end.x, l.end.y]])),
        Geometry::LineString(ls) => ("LineString", ring(ls)),
        Geometry::MultiLineString(mls) => (
            "MultiLineString",
            Value::Array(mls.0.iter().map(ring).collect()),
        ),
        Geometry::Polygon(p) => ("Polygon", polygon_rings(p)),
        Geometry::MultiPolygon(mp) => (
            "MultiPolygon",
            Value::Array(mp.0.iter().map(polygon_rings).collect()),
        ),
        Geometry::Rect(r) => ("Polygon", polygon_rings(&r.to_polygon())),
        Geometry::Triangle(t) => ("Polygon", polygon_rings(&t.to_polygon())),
        Geometry::GeometryCollection(_) => {
            return Err(GeolocError::GeometryType {
                expected: "a single-type geometry".to_string(),
                actual: geometry_type_name(g).to_string(),
            })
        }
    };
    Ok(json!({ "type": kind, "coordinates": coordinates }))
}

/// Splits multi-geometries into their members, one feature each.
fn members(g: &Geometry<f64>) -> Vec<Geometry<f64>> {
    match g {
        Geometry::MultiPoint(mp) => mp.0.iter().copied().map(Geometry::Point).collect(),
        Geometry::MultiLineString(mls) => {
            mls.0.iter().cloned().map(Geometry::LineString).collect()
        }
        Geometry::MultiPolygon(mp) => mp.0.iter().cloned().map(Geometry::Polygon).collect(),
        other => vec![other.clone()],
    }
}

/// Feature collection of `geoms` in WGS84, one feature per member geometry.
///
/// # Errors
///
/// Returns [`GeolocError::GeometryType`] for geometry collections, which
/// mix types within one layer.
pub fn feature_collection(geoms: &GeoGeometry) -> Result<Value> {
    if let Geometry::GeometryCollection(_) = geoms.geom() {
        return Err(GeolocError::GeometryType {
            expected: "a single-type geometry".to_string(),
            actual: "GeometryCollection".to_string(),
        });
    }
    let wgs84 = transform_to(geoms, &SpatialRef::WGS84);
    let features = members(wgs84.geom())
        .iter()
        .map(|g| {
            Ok(json!({
                "type": "Feature",
                "properties": {},
                "geometry": geometry_to_geojson(g)?,
            }))
        })
        .collect::<Result<Vec<Value>>>()?;
    Ok(json!({
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": format!("EPSG:{SRID_WGS84}") } },
        "features": features,
    }))
}

/// Writes `geoms` as GeoJSON to `basename.geojson`, returning the path.
///
/// # Errors
///
/// Fails on geometry collections and on I/O errors.
pub fn dump_geojson(basename: &str, geoms: &GeoGeometry) -> Result<PathBuf> {
    let doc = feature_collection(geoms)?;
    let path = PathBuf::from(format!("{basename}.geojson"));
    fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
    Ok(path)
}
