//! Core numeric containers (Vector, Matrix).
//!
//! Point sets are carried as `n × 2` row-major matrices; optimizer
//! parameters as dense vectors. Everything is `f64`: geodesic and projected
//! coordinates lose too much precision in `f32`.

mod matrix;
mod vector;

pub use matrix::Matrix;
pub use vector::Vector;
