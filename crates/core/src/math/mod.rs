//! Homogeneous-coordinate primitives for the models every geometry family is
//! expressed in. All points are 4-vectors `(x, y, z, w)` and all transforms
//! are 4x4 matrices acting on them from the left. Two-dimensional geometries
//! leave the `z` axis inert, so a 2D transform is still a [Transform] and can
//! be multiplied with any other.
//!
//! The constant-curvature models are:
//! - hyperbolic: the upper sheet of `x² + y² + z² - w² = -1`
//! - spherical: the unit sphere `x² + y² + z² + w² = 1`
//! - Euclidean: the affine plane `w = 1`
//!
//! Nil, Solv, product spaces and horocyclic coordinates have their own helper
//! modules.

pub mod horo;
pub mod nil;
pub mod product;
pub mod solv;

use derive_more::Display;
use log::error;
use nalgebra::{Matrix4, Vector4};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString};

/// A rigid transformation (isometry) in homogeneous coordinates
pub type Transform = Matrix4<f64>;

/// A point (or a tangent vector) in homogeneous coordinates
pub type Point = Vector4<f64>;

/// Index of the homogeneous (time-like) coordinate
pub const W: usize = 3;

/// Default tolerance when comparing matrices entry by entry
pub const MATRIX_EPSILON: f64 = 1e-6;

/// The origin of the constant-curvature models and of Nil
pub fn c0() -> Point {
    Vector4::new(0.0, 0.0, 0.0, 1.0)
}

/// Image of the origin under a transform
pub fn tc0(m: &Transform) -> Point {
    m.column(W).into_owned()
}

/// The sign of the curvature of a space. This decides which trigonometric
/// functions are used for distances and which bilinear form is preserved by
/// isometries.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Curvature {
    Hyperbolic,
    Euclidean,
    Spherical,
}

impl Curvature {
    /// Classify a regular tiling with `p`-gon faces and a (possibly
    /// fractional) vertex degree of `q`.
    pub fn of_tiling(p: f64, q: f64) -> Self {
        let excess = (p - 2.0) * (q - 2.0) - 4.0;
        if excess.abs() < 1e-9 {
            Self::Euclidean
        } else if excess > 0.0 {
            Self::Hyperbolic
        } else {
            Self::Spherical
        }
    }

    /// -1 for hyperbolic, 0 for Euclidean, 1 for spherical
    pub fn sign(self) -> f64 {
        match self {
            Self::Hyperbolic => -1.0,
            Self::Euclidean => 0.0,
            Self::Spherical => 1.0,
        }
    }

    /// Sign of the `w` term in the bilinear form preserved by isometries
    fn w_sign(self) -> f64 {
        match self {
            Self::Hyperbolic => -1.0,
            Self::Euclidean | Self::Spherical => 1.0,
        }
    }

    pub fn sin_auto(self, x: f64) -> f64 {
        match self {
            Self::Hyperbolic => x.sinh(),
            Self::Euclidean => x,
            Self::Spherical => x.sin(),
        }
    }

    pub fn cos_auto(self, x: f64) -> f64 {
        match self {
            Self::Hyperbolic => x.cosh(),
            Self::Euclidean => 1.0,
            Self::Spherical => x.cos(),
        }
    }

    pub fn tan_auto(self, x: f64) -> f64 {
        match self {
            Self::Hyperbolic => x.tanh(),
            Self::Euclidean => x,
            Self::Spherical => x.tan(),
        }
    }

    pub fn asin_auto(self, x: f64) -> f64 {
        match self {
            Self::Hyperbolic => x.asinh(),
            Self::Euclidean => x,
            Self::Spherical => x.clamp(-1.0, 1.0).asin(),
        }
    }

    /// Inverse of [Self::cos_auto]. In Euclidean space the cosine is constant,
    /// so this is the identity, matching how the Euclidean branches of the
    /// formulas below degenerate.
    pub fn acos_auto(self, x: f64) -> f64 {
        match self {
            Self::Hyperbolic => x.max(1.0).acosh(),
            Self::Euclidean => x,
            Self::Spherical => x.clamp(-1.0, 1.0).acos(),
        }
    }

    pub fn atan_auto(self, x: f64) -> f64 {
        match self {
            Self::Hyperbolic => x.clamp(-1.0 + 1e-15, 1.0 - 1e-15).atanh(),
            Self::Euclidean => x,
            Self::Spherical => x.atan(),
        }
    }

    /// Length of the side opposite to the angle `alpha` in a triangle with
    /// angles `alpha`, `beta` and `gamma`. Only meaningful in curved space,
    /// since Euclidean triangles are not determined by their angles.
    pub fn edge_of_triangle_with_angles(
        self,
        alpha: f64,
        beta: f64,
        gamma: f64,
    ) -> f64 {
        self.acos_auto(
            (alpha.cos() + beta.cos() * gamma.cos())
                / (beta.sin() * gamma.sin()),
        )
    }

    /// Translation by `d` along the given spatial axis (0, 1 or 2)
    pub fn cpush(self, axis: usize, d: f64) -> Transform {
        let mut m = Transform::identity();
        m[(axis, axis)] = self.cos_auto(d);
        m[(W, W)] = self.cos_auto(d);
        m[(axis, W)] = self.sin_auto(d);
        m[(W, axis)] = -self.sign() * self.sin_auto(d);
        m
    }

    /// Translation by `d` along the x axis
    pub fn xpush(self, d: f64) -> Transform {
        self.cpush(0, d)
    }

    /// Translation by `d` along the z axis
    pub fn zpush(self, d: f64) -> Transform {
        self.cpush(2, d)
    }

    /// The point at distance `d` from the origin along the x axis
    pub fn xpush0(self, d: f64) -> Point {
        Vector4::new(self.sin_auto(d), 0.0, 0.0, self.cos_auto(d))
    }

    /// The point at distance `d` from the origin, in the direction rotated by
    /// `angle` from the x axis
    pub fn xspinpush0(self, angle: f64, d: f64) -> Point {
        spin(angle) * self.xpush0(d)
    }

    /// A quantity monotonic in the distance between two points, cheaper to
    /// compute than the distance itself. This is the squared coordinate
    /// difference under the form the isometries preserve.
    pub fn intval(self, p: &Point, q: &Point) -> f64 {
        let d = p - q;
        d.x * d.x + d.y * d.y + d.z * d.z + self.w_sign() * d.w * d.w
    }

    /// Intrinsic distance between two points
    pub fn hdist(self, p: &Point, q: &Point) -> f64 {
        let iv = self.intval(p, q).max(0.0);
        match self {
            Self::Hyperbolic => 2.0 * (iv.sqrt() / 2.0).asinh(),
            Self::Euclidean => iv.sqrt(),
            Self::Spherical => 2.0 * (iv.sqrt() / 2.0).min(1.0).asin(),
        }
    }

    /// Distance from the origin
    pub fn hdist0(self, p: &Point) -> f64 {
        self.hdist(p, &c0())
    }

    /// Project a point back onto the model surface, removing accumulated
    /// floating point drift
    pub fn normalize(self, p: &Point) -> Point {
        let norm = match self {
            Self::Hyperbolic => {
                (p.w * p.w - p.x * p.x - p.y * p.y - p.z * p.z).abs().sqrt()
            }
            Self::Euclidean => p.w,
            Self::Spherical => p.norm(),
        };
        if norm == 0.0 || !norm.is_finite() {
            *p
        } else {
            p / norm
        }
    }

    /// Midpoint of the geodesic between two points
    pub fn mid(self, p: &Point, q: &Point) -> Point {
        self.normalize(&(p + q))
    }

    /// Exact inverse of an isometry of this space. Unlike a general matrix
    /// inverse this never fails and does not amplify rounding errors.
    pub fn iso_inverse(self, m: &Transform) -> Transform {
        match self {
            Self::Hyperbolic => {
                let j = Transform::from_diagonal(&Vector4::new(
                    1.0, 1.0, 1.0, -1.0,
                ));
                j * m.transpose() * j
            }
            Self::Spherical => m.transpose(),
            Self::Euclidean => {
                // Affine isometry: orthogonal linear part plus a translation
                let mut inv = Transform::identity();
                for i in 0..3 {
                    for j in 0..3 {
                        inv[(i, j)] = m[(j, i)];
                    }
                }
                for i in 0..3 {
                    inv[(i, W)] =
                        -(0..3).map(|j| m[(j, i)] * m[(j, W)]).sum::<f64>();
                }
                inv
            }
        }
    }
}

/// Rotation by `angle` in the plane spanned by axes `a` and `b`
pub fn cspin(a: usize, b: usize, angle: f64) -> Transform {
    let mut m = Transform::identity();
    let (s, c) = angle.sin_cos();
    m[(a, a)] = c;
    m[(b, b)] = c;
    m[(a, b)] = s;
    m[(b, a)] = -s;
    m
}

/// Rotation by `angle` in the x/y plane
pub fn spin(angle: f64) -> Transform {
    cspin(0, 1, angle)
}

/// Reflection that negates a single spatial axis
pub fn mirror(axis: usize) -> Transform {
    let mut m = Transform::identity();
    m[(axis, axis)] = -1.0;
    m
}

/// Angle of the projection of a point onto the x/y plane, in the same
/// convention as [spin], i.e. `angle_of(spin(a) * xpush0(d)) == a`
pub fn angle_of(p: &Point) -> f64 {
    (-p.y).atan2(p.x)
}

/// Entry-wise comparison of two matrices within a tolerance
pub fn eq_matrix(a: &Transform, b: &Transform, eps: f64) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= eps)
}

/// General matrix inverse, for transforms that aren't isometries of a
/// constant-curvature model (Nil translations, product level shifts). A
/// singular matrix is a bug upstream; we log it and fall back to identity
/// rather than poisoning every later computation with NaNs.
pub fn inverse(m: &Transform) -> Transform {
    m.try_inverse().unwrap_or_else(|| {
        error!("attempted to invert singular transform {}", m);
        Transform::identity()
    })
}
