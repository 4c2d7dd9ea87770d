use crate::{
    config::GeometryKind,
    geometry::{
        derive::{bisect, Derive},
        ArchimedeanTables, Distances, Extension, ParameterBuilder,
    },
    math::{self, Curvature},
};
use anyhow::{bail, ensure};
use std::f64::consts::PI;

const EDGE_ITERATIONS: usize = 100;

/// Largest edge we look for in hyperbolic space. Angles vanish long before.
const MAX_HYPERBOLIC_EDGE: f64 = 20.0;

/// Archimedean tilings. The master cell is the first face of the vertex
/// configuration; the other cell types are described by the per-face tables
/// in the extension block.
#[derive(Debug)]
pub struct ArchimedeanDistances;

impl Derive for ArchimedeanDistances {
    fn derive(&self, builder: &mut ParameterBuilder) -> anyhow::Result<()> {
        let faces = match &builder.config.geometry {
            GeometryKind::Archimedean { faces } => faces.clone(),
            other => bail!("not an Archimedean tiling: {:?}", other),
        };
        ensure!(faces.len() >= 3, "vertex configuration too short");
        let curv = builder.family.curvature();
        let corners: Vec<(usize, f64)> =
            faces.iter().map(|&n| (n as usize, 1.0)).collect();
        let edge = edge_length_for_angles(curv, &corners);

        let metrics: Vec<PolygonMetrics> = faces
            .iter()
            .map(|&n| PolygonMetrics::new(curv, n as usize, edge))
            .collect();
        let master = metrics[0];
        // Scalar distances use the face that follows the master in the
        // configuration. The move table alternates between both neighbors.
        let neighbor = metrics[1];

        builder.set_distances(Distances {
            hexf: master.circumradius,
            hcrossf: master.inradius + neighbor.inradius,
            rhexf: master.circumradius,
            tessf: master.inradius + neighbor.inradius,
            crossf: master.inradius + neighbor.inradius,
            hexhexdist: 2.0 * neighbor.inradius,
            hexvdist: neighbor.circumradius,
            edgelen: edge,
        })?;
        builder.extension = Extension::Archimedean(ArchimedeanTables {
            faces,
            edge,
            inradius: metrics.iter().map(|m| m.inradius).collect(),
            circumradius: metrics.iter().map(|m| m.circumradius).collect(),
            angles: metrics.iter().map(|m| m.angle).collect(),
        });
        Ok(())
    }
}

/// Size of a regular polygon with a given edge length
#[derive(Copy, Clone, Debug)]
pub struct PolygonMetrics {
    pub circumradius: f64,
    pub inradius: f64,
    /// Interior angle
    pub angle: f64,
}

impl PolygonMetrics {
    pub fn new(curv: Curvature, sides: usize, edge: f64) -> Self {
        let n = sides as f64;
        let circumradius =
            curv.asin_auto(curv.sin_auto(edge / 2.0) / (PI / n).sin());
        let corner = curv.xpush0(circumradius);
        let next = math::spin(2.0 * PI / n) * corner;
        Self {
            circumradius,
            inradius: curv.hdist0(&curv.mid(&corner, &next)),
            angle: interior_angle(curv, sides, edge),
        }
    }
}

/// Interior angle of a regular polygon with the given edge length
fn interior_angle(curv: Curvature, sides: usize, edge: f64) -> f64 {
    let ratio = (PI / sides as f64).cos() / curv.cos_auto(edge / 2.0);
    2.0 * ratio.clamp(-1.0, 1.0).asin()
}

/// Find the edge length at which regular polygons fit around a vertex. Each
/// entry is a polygon's side count and how many of them meet at the vertex
/// (which may be fractional). Euclidean tilings work with any edge length,
/// we use 1.
pub fn edge_length_for_angles(
    curv: Curvature,
    corners: &[(usize, f64)],
) -> f64 {
    let total = |edge: f64| -> f64 {
        corners
            .iter()
            .map(|&(sides, count)| count * interior_angle(curv, sides, edge))
            .sum()
    };
    match curv {
        Curvature::Euclidean => 1.0,
        // Angles shrink as polygons grow
        Curvature::Hyperbolic => {
            bisect(0.0, MAX_HYPERBOLIC_EDGE, EDGE_ITERATIONS, |edge| {
                total(edge) > 2.0 * PI
            })
        }
        // Angles grow as polygons grow
        Curvature::Spherical => bisect(0.0, PI, EDGE_ITERATIONS, |edge| {
            total(edge) < 2.0 * PI
        }),
    }
}
