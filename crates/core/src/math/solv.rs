//! Solv geometry, with the metric `e^(2z) dx² + e^(-2z) dy² + dz²`. Left
//! translations `(a, b, c) * (x, y, z) = (a + e^-c x, b + e^c y, c + z)`
//! are affine, so like Nil they fit in a [Transform].

use crate::math::{Point, Transform};

/// Left translation by the group element `a`
pub fn translate(a: &Point) -> Transform {
    Transform::new(
        (-a.z).exp(), 0.0, 0.0, a.x, //
        0.0, a.z.exp(), 0.0, a.y, //
        0.0, 0.0, 1.0, a.z, //
        0.0, 0.0, 0.0, 1.0,
    )
}
