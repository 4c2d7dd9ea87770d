//! Derivation of the metric constants and move matrices for a geometry
//! configuration, and the cache that holds them.
//!
//! Every decision that depends on "what kind of space is this" goes through
//! [GeometryFamily]: there is one `match` per operation rather than boolean
//! flags scattered through the code.

mod builder;
mod cache;
mod derive;
mod heights;
mod params;

pub use builder::ParameterBuilder;
pub use cache::{GeometryCache, GeometryContext, GeometryHandle, PinGuard};
pub use derive::archimedean::edge_length_for_angles;
pub use heights::{HeightInputs, HeightLevels, HeightMapping};
pub use params::{
    ArchimedeanTables, BinaryMove, BinaryTables, CellShape, Distances,
    Extension, GeometryParameterSet, GoldbergTables, IrregularTables,
    LatticeKind, LatticeTables, Moves, ProductLevels, Scales, HCROSSF7, HEXF7,
    HEXHEXDIST7, TESSF7,
};

use crate::{
    config::{GeometryConfig, GeometryKind},
    math::{self, product, Curvature, Point, Transform},
};
use derive_more::Display;
use serde::Serialize;

/// The class of space a geometry lives in. This decides the formulas for
/// distances, inverses, height mapping, rebasing and raycasting.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryFamily {
    Hyperbolic,
    Spherical,
    Euclidean,
    /// A constant-curvature surface times a line
    #[display(fmt = "Product({})", _0)]
    Product(Curvature),
    /// The twisted product: the unit tangent bundle of a surface
    #[display(fmt = "RotationSpace({})", _0)]
    RotationSpace(Curvature),
    Nil,
    Solv,
    /// The binary tiling of the hyperbolic plane. Isometries are hyperbolic,
    /// but cells are bounded by horocycles.
    BinaryTiling,
}

impl GeometryFamily {
    pub fn of(config: &GeometryConfig) -> Self {
        match &config.geometry {
            GeometryKind::Product { twisted: false, .. } => {
                Self::Product(config.curvature())
            }
            GeometryKind::Product { twisted: true, .. } => {
                Self::RotationSpace(config.curvature())
            }
            GeometryKind::Nil { .. } => Self::Nil,
            GeometryKind::Solv => Self::Solv,
            GeometryKind::BinaryTiling { .. } => Self::BinaryTiling,
            _ => Self::of_curvature(config.curvature()),
        }
    }

    fn of_curvature(curvature: Curvature) -> Self {
        match curvature {
            Curvature::Hyperbolic => Self::Hyperbolic,
            Curvature::Euclidean => Self::Euclidean,
            Curvature::Spherical => Self::Spherical,
        }
    }

    /// Curvature of the model the isometries act on. For hybrid spaces this
    /// is the curvature of the base surface.
    pub fn curvature(self) -> Curvature {
        match self {
            Self::Hyperbolic | Self::BinaryTiling => Curvature::Hyperbolic,
            Self::Spherical => Curvature::Spherical,
            Self::Euclidean | Self::Nil | Self::Solv => Curvature::Euclidean,
            Self::Product(c) | Self::RotationSpace(c) => c,
        }
    }

    /// Product or rotation space, i.e. built over an underlying surface
    pub fn is_hybrid(self) -> bool {
        matches!(self, Self::Product(_) | Self::RotationSpace(_))
    }

    /// Spaces without closed-form geodesics, where rays have to be
    /// integrated numerically
    pub fn is_step_based(self) -> bool {
        matches!(self, Self::Nil | Self::Solv | Self::RotationSpace(_))
    }

    /// Does the constant-curvature model (with its exact isometry inverse)
    /// describe this family?
    pub fn is_isotropic(self) -> bool {
        matches!(
            self,
            Self::Hyperbolic
                | Self::Spherical
                | Self::Euclidean
                | Self::BinaryTiling
        )
    }

    /// The point all cell frames are centered on
    pub fn origin(self) -> Point {
        match self {
            Self::Product(_) | Self::RotationSpace(_) => product::origin(),
            _ => math::c0(),
        }
    }

    /// Invert a transform between two cell frames
    pub fn invert(self, m: &Transform) -> Transform {
        if self.is_isotropic() {
            self.curvature().iso_inverse(m)
        } else {
            math::inverse(m)
        }
    }

    /// Distance between two points given in the same frame. For Nil and
    /// Solv this is the coordinate distance, which is only monotone in the
    /// true distance close to the origin.
    pub fn distance(self, p: &Point, q: &Point) -> f64 {
        match self {
            Self::Product(c) | Self::RotationSpace(c) => {
                product::distance(c, p, q)
            }
            Self::Nil | Self::Solv => (p - q).xyz().norm(),
            _ => self.curvature().hdist(p, q),
        }
    }

    /// How render levels map to factors for this family and view
    pub fn height_mapping(self, config: &GeometryConfig) -> HeightMapping {
        let heights = &config.heights;
        match self {
            Self::Product(_) | Self::RotationSpace(_) => HeightMapping::Product,
            _ if config.is_native_3d() => HeightMapping::Native3D,
            _ if config.show_3d => HeightMapping::Embedded3D {
                depth: heights.depth,
            },
            Self::Hyperbolic | Self::BinaryTiling => {
                HeightMapping::Hyperbolic {
                    camera: heights.camera,
                    depth: heights.depth,
                }
            }
            _ => HeightMapping::Affine {
                camera: heights.camera,
                depth: heights.depth,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variation;

    #[test]
    fn test_family_of() {
        let config = |geometry| GeometryConfig {
            geometry,
            variation: Variation::Pure,
            ..Default::default()
        };
        assert_eq!(
            GeometryFamily::of(&config(GeometryKind::Regular {
                face: 5,
                vertex: 3
            })),
            GeometryFamily::Spherical
        );
        assert_eq!(
            GeometryFamily::of(&config(GeometryKind::Product {
                face: 7,
                vertex: 3,
                plevel_factor: 1.0,
                twisted: false,
            })),
            GeometryFamily::Product(Curvature::Hyperbolic)
        );
        assert_eq!(
            GeometryFamily::of(&config(GeometryKind::Honeycomb {
                edge_order: 5
            })),
            GeometryFamily::Hyperbolic
        );
        assert_eq!(
            GeometryFamily::of(&config(GeometryKind::Fake {
                face: 6,
                vertex: 3,
                around: 3.5
            })),
            GeometryFamily::Hyperbolic
        );
    }

    #[test]
    fn test_height_mapping_dispatch() {
        let mut config = GeometryConfig::default();
        let family = GeometryFamily::of(&config);
        assert!(matches!(
            family.height_mapping(&config),
            HeightMapping::Hyperbolic { .. }
        ));
        config.show_3d = true;
        assert_eq!(
            family.height_mapping(&config),
            HeightMapping::Embedded3D { depth: 1.0 }
        );
    }
}
