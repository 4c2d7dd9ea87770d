//! Nil is the Heisenberg group with a left-invariant metric. We use the
//! coordinates in which the group law is
//! `(a * b) = (a.x + b.x, a.y + b.y, a.z + b.z + a.x * b.y)`, so left
//! translations are affine maps and fit in a [Transform].

use crate::math::{Point, Transform};
use nalgebra::Vector4;

/// Group product of two points
pub fn compose(a: &Point, b: &Point) -> Point {
    Vector4::new(a.x + b.x, a.y + b.y, a.z + b.z + a.x * b.y, 1.0)
}

/// Group inverse of a point
pub fn group_inverse(a: &Point) -> Point {
    Vector4::new(-a.x, -a.y, -a.z + a.x * a.y, 1.0)
}

/// Left translation by `a`, i.e. the transform mapping `b` to `a * b`
pub fn translate(a: &Point) -> Transform {
    Transform::new(
        1.0, 0.0, 0.0, a.x, //
        0.0, 1.0, 0.0, a.y, //
        0.0, a.x, 1.0, a.z, //
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Left translation by the inverse of `a`
pub fn itranslate(a: &Point) -> Transform {
    translate(&group_inverse(a))
}

/// The z coordinate the raycaster compares against the cell box. Near the
/// x/y diagonal the box is sheared, which this corrects for.
pub fn box_z(p: &Point) -> f64 {
    let shear = if p.x.abs() > p.y.abs() { -p.x * p.y } else { 0.0 };
    shear + p.z
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{c0, eq_matrix, inverse};
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_translate_matches_group_law() {
        let a = Vector4::new(0.3, -1.2, 0.5, 1.0);
        let b = Vector4::new(2.0, 0.7, -0.1, 1.0);
        let expected = compose(&a, &b);
        let actual = translate(&a) * b;
        for i in 0..4 {
            assert_approx_eq!(actual[i], expected[i], 1e-12);
        }
    }

    #[test]
    fn test_inverse() {
        let a = Vector4::new(0.3, -1.2, 0.5, 1.0);
        let id = compose(&a, &group_inverse(&a));
        assert_approx_eq!((id - c0()).norm(), 0.0, 1e-12);
        assert!(eq_matrix(&itranslate(&a), &inverse(&translate(&a)), 1e-12));
    }

    #[test]
    fn test_non_commutative() {
        let x = Vector4::new(1.0, 0.0, 0.0, 1.0);
        let y = Vector4::new(0.0, 1.0, 0.0, 1.0);
        // The commutator of the x and y generators is a unit z translation
        let xy = compose(&x, &y);
        let yx = compose(&y, &x);
        assert_approx_eq!(xy.z - yx.z, 1.0, 1e-12);
    }
}
