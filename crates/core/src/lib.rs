//! Hypertile computes everything needed to draw tessellations of
//! non-Euclidean spaces: the metric constants of a tiling, the transforms
//! between the frames of any two cells, re-anchoring of points that drift
//! away from their cell, and a GPU raycaster that walks the cell graph.
//!
//! ```
//! use hypertile::{GeometryConfig, GeometryContext};
//!
//! let mut context = GeometryContext::default();
//! let params = context.set_current(&GeometryConfig::default()).unwrap();
//! println!("{}: {}", params.family, params.distances.tessf);
//! ```
//!
//! See [GeometryConfig] for which tilings can be described, and
//! [TransformResolver] for working with cells once you have parameters.

mod config;
pub mod geometry;
pub mod graph;
pub mod math;
pub mod raycast;
pub mod rebase;
pub mod transform;
mod util;

pub use crate::{
    config::{
        GeometryConfig, GeometryKind, RaycastConfig, RaycastMode, Variation,
        WorldHeightConfig,
    },
    geometry::{
        GeometryCache, GeometryContext, GeometryFamily, GeometryParameterSet,
    },
    graph::CellGraph,
    math::{Curvature, Point, Transform},
    raycast::{RaycastShaderBuilder, Raycaster},
    rebase::RebaseEngine,
    transform::TransformResolver,
};
