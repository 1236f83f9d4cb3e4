//! Georeferenced raster export of a mixture's density.
//!
//! The density is evaluated on a regular grid spanning the world in the
//! estimate's SRID, squashed to `(0, 1)`, bent to make low values visible,
//! and written as an 8-bit grayscale PNG. A world file (`.pgw`) places
//! the pixel centers; the `.prj` sidecar names the SRID.

use super::geo_gmm::GeoGmm;
use crate::error::{GeolocError, Result};
use crate::estimate::LocationEstimate;
use crate::srs::{transform_to, Geom, SpatialRef, LATMAX, LATMIN};
use geo::Point;
use image::{ColorType, ImageFormat};
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Western edge of the raster; ±180 wraps around in some projections.
pub const GEOIMG_LONMIN: f64 = -179.9999;
/// Eastern edge of the raster.
pub const GEOIMG_LONMAX: f64 = 179.9999;
/// Default "bendiness" of [`bend`].
pub const BEND: f64 = 4.0;

/// Boosts low probabilities: `(b·p + p) / (b·p + 1)`. Fixes 0 and 1.
#[must_use]
pub fn bend(p: f64, b: f64) -> f64 {
    (b * p + p) / (b * p + 1.0)
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn project(srs: &SpatialRef, lon: f64, lat: f64) -> (f64, f64) {
    let p = transform_to(&Geom::with_srs(SpatialRef::WGS84, Point::new(lon, lat)), srs);
    (p.x(), p.y())
}

/// Writes `basename.png`, `basename.pgw` and `basename.prj`.
pub(crate) fn dump_geoimage(gmm: &GeoGmm, basename: &str, width_px: usize) -> Result<Vec<PathBuf>> {
    if width_px < 2 {
        return Err(GeolocError::invalid_param("width_px", width_px, ">= 2"));
    }
    let srs = gmm.state().srs;
    let xmin = project(&srs, GEOIMG_LONMIN, 0.0).0;
    let xmax = project(&srs, GEOIMG_LONMAX, 0.0).0;
    let ymin = project(&srs, 0.0, LATMIN).1;
    let ymax = project(&srs, 0.0, LATMAX).1;
    let height_px = (width_px as f64 * (xmax - xmin) / (ymax - ymin)) as usize;
    if height_px < 2 {
        return Err(GeolocError::invalid_param("height_px", height_px, ">= 2"));
    }
    let to_u32 = |v: usize| {
        u32::try_from(v).map_err(|_| GeolocError::invalid_param("width_px", width_px, "fits in u32"))
    };
    let (w, h) = (to_u32(width_px)?, to_u32(height_px)?);

    // Pixel centers, first row northernmost.
    let dx = (xmax - xmin) / (width_px - 1) as f64;
    let dy = (ymax - ymin) / (height_px - 1) as f64;
    let mixture = gmm.mixture();
    let rows: Vec<Vec<f64>> = (0..height_px)
        .into_par_iter()
        .map(|r| {
            let y = ymax - r as f64 * dy;
            (0..width_px)
                .map(|c| bend(logistic(mixture.score(xmin + c as f64 * dx, y)), BEND))
                .collect()
        })
        .collect();
    let probs: Vec<f64> = rows.concat();
    let max = probs.iter().copied().fold(0.0, f64::max);
    debug!(width_px, height_px, max_bent = max, "rendered density raster");
    let pixels: Vec<u8> = if max > 0.0 {
        probs.iter().map(|p| (255.0 / max * p).clamp(0.0, 255.0) as u8).collect()
    } else {
        vec![0; probs.len()]
    };

    let png = PathBuf::from(format!("{basename}.png"));
    image::save_buffer_with_format(&png, &pixels, w, h, ColorType::L8, ImageFormat::Png)?;
    let pgw = PathBuf::from(format!("{basename}.pgw"));
    fs::write(&pgw, format!("{dx}\n0\n0\n{}\n{xmin}\n{ymax}\n", -dy))?;
    let prj = PathBuf::from(format!("{basename}.prj"));
    fs::write(&prj, format!("SRID={};{}\n", srs.srid(), srs.name()))?;
    Ok(vec![png, pgw, prj])
}
