//! Horocyclic coordinates in the hyperbolic model, used by binary tilings.
//! Horospheres are the level sets of `w - x`, all centered on the ideal
//! point `(1, 0, 0, 1)`.

use crate::math::{Curvature, Point, Transform};

/// Parabolic isometry that slides along the horospheres centered on the
/// ideal point `(1, 0, 0, 1)`, by `u` along y and `v` along z. Every point's
/// horocyclic coordinate `y / (w - x)` shifts by exactly `u`.
pub fn parabolic(u: f64, v: f64) -> Transform {
    let h = (u * u + v * v) / 2.0;
    Transform::new(
        1.0 - h, u, v, h, //
        -u, 1.0, 0.0, u, //
        -v, 0.0, 1.0, v, //
        -h, u, v, 1.0 + h,
    )
}

/// Horocyclic level of a point. [Curvature::xpush] by `t` raises the level
/// by `t`, parabolic moves preserve it.
pub fn level(p: &Point) -> f64 {
    -(p.w - p.x).ln()
}

/// Point at the given horocyclic level, shifted by `u` along the horocycle
/// through the origin's column
pub fn horopoint(lev: f64, u: f64) -> Point {
    Curvature::Hyperbolic.xpush(lev) * parabolic(u, 0.0) * crate::math::c0()
}
