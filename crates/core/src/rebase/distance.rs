use crate::{
    geometry::GeometryFamily,
    math::{c0, horo, product, Point},
};

/// Primary values closer than this compare equal
const PRIMARY_EPSILON: f64 = 1e-6;
/// Secondary values must improve by more than this to count
const SECONDARY_EPSILON: f64 = 1e-4;

/// How far a point is from its cell's center, for deciding whether a
/// neighbor would hold it better. The primary component `a` measures
/// drift across horocycles (binary tiling) or along the z axis (Solv); it is
/// zero elsewhere. The secondary `b` is the family's cheap distance-like
/// value.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HoroDistance {
    pub a: f64,
    pub b: f64,
}

impl HoroDistance {
    pub fn new(family: GeometryFamily, p: &Point) -> Self {
        match family {
            GeometryFamily::BinaryTiling => Self {
                a: horo::level(p).abs(),
                b: family.curvature().intval(p, &c0()),
            },
            GeometryFamily::Solv => Self {
                a: p.z.abs(),
                b: p.x.hypot(p.y),
            },
            GeometryFamily::Product(curv)
            | GeometryFamily::RotationSpace(curv) => {
                // Horizontal distance only, the fiber is handled separately
                let (_, flat) = product::decompose(curv, p);
                Self {
                    a: 0.0,
                    b: curv.intval(&product::swap_point(&flat), &c0()),
                }
            }
            GeometryFamily::Nil => Self {
                a: 0.0,
                b: p.xyz().norm(),
            },
            _ => Self {
                a: 0.0,
                b: family.curvature().intval(p, &c0()),
            },
        }
    }

    /// Lexicographic: a clearly smaller `a` wins, a clearly larger one
    /// loses, and otherwise `b` has to be clearly smaller. The margins keep
    /// points on a cell boundary from bouncing between the two cells.
    pub fn is_better(&self, other: &Self) -> bool {
        if self.a < other.a - PRIMARY_EPSILON {
            true
        } else if self.a > other.a + PRIMARY_EPSILON {
            false
        } else {
            self.b < other.b - SECONDARY_EPSILON
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Curvature;

    #[test]
    fn test_primary_dominates() {
        let near = HoroDistance { a: 0.0, b: 5.0 };
        let far = HoroDistance { a: 1.0, b: 0.0 };
        assert!(near.is_better(&far));
        assert!(!far.is_better(&near));
    }

    #[test]
    fn test_margin() {
        let d = HoroDistance { a: 0.5, b: 1.0 };
        let tiny = HoroDistance { a: 0.5, b: 1.0 - 1e-5 };
        assert!(!tiny.is_better(&d));
        assert!(!d.is_better(&d));
        let clear = HoroDistance { a: 0.5 + 1e-7, b: 0.9 };
        assert!(clear.is_better(&d));
    }

    #[test]
    fn test_product_ignores_level() {
        let curv = Curvature::Hyperbolic;
        let flat = product::swap_point(&curv.xpush0(0.7));
        let family = GeometryFamily::Product(curv);
        let low = HoroDistance::new(family, &product::mscale(&flat, -1.5));
        let high = HoroDistance::new(family, &product::mscale(&flat, 2.0));
        assert!((low.b - high.b).abs() < 1e-9);
        assert!((low.b - curv.intval(&curv.xpush0(0.7), &c0())).abs() < 1e-9);
    }
}
