//! Product spaces `M × ℝ` where `M` is a 2D constant-curvature surface.
//!
//! A point at fiber level `l` over the surface point `(x, y, w)` is stored as
//! `exp(l) * (x, y, w, 0)`: the surface coordinates move to the first three
//! slots (so the homogeneous coordinate of the surface lives in `z`), and the
//! level is encoded in the overall scale. Isometries of the surface
//! combined with a level shift `dz` are then plain linear maps
//! `exp(dz) * U`.

use crate::math::{Curvature, Point, Transform, W};
use nalgebra::Vector4;

/// The origin at level 0
pub fn origin() -> Point {
    Vector4::new(0.0, 0.0, 1.0, 0.0)
}

/// Move a transform of the underlying surface (homogeneous coordinate in
/// `w`) into product layout (homogeneous coordinate in `z`). This is its own
/// inverse, so it also converts back.
pub fn swap_layout(m: &Transform) -> Transform {
    let mut out = *m;
    out.swap_rows(2, W);
    out.swap_columns(2, W);
    out
}

/// Same as [swap_layout], for points
pub fn swap_point(p: &Point) -> Point {
    Vector4::new(p.x, p.y, p.w, p.z)
}

/// Shift along the fiber by `dz`
pub fn level_shift(dz: f64) -> Transform {
    let e = dz.exp();
    Transform::from_diagonal(&Vector4::new(e, e, e, 1.0))
}

/// Fiber level of a point
pub fn zlevel(underlying: Curvature, p: &Point) -> f64 {
    match underlying {
        Curvature::Spherical => (p.x * p.x + p.y * p.y + p.z * p.z).ln() / 2.0,
        Curvature::Hyperbolic => {
            (p.z * p.z - p.x * p.x - p.y * p.y).abs().ln() / 2.0
        }
        Curvature::Euclidean => p.z.ln(),
    }
}

/// Scale a point's representation to a different fiber level
pub fn mscale(p: &Point, dz: f64) -> Point {
    let mut out = p * dz.exp();
    out.w = p.w;
    out
}

/// Split a point into its fiber level and its projection to level 0
pub fn decompose(underlying: Curvature, p: &Point) -> (f64, Point) {
    let z = zlevel(underlying, p);
    (z, mscale(p, -z))
}

/// Distance between two points of the product space
pub fn distance(underlying: Curvature, p: &Point, q: &Point) -> f64 {
    let (zp, hp) = decompose(underlying, p);
    let (zq, hq) = decompose(underlying, q);
    let flat = underlying.hdist(&swap_point(&hp), &swap_point(&hq));
    (flat * flat + (zp - zq) * (zp - zq)).sqrt()
}
