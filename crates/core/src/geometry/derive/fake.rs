use crate::{
    config::GeometryKind,
    geometry::{
        derive::{
            archimedean::PolygonMetrics, bisect, regular::HEXF_ITERATIONS,
            Derive,
        },
        edge_length_for_angles, Distances, ParameterBuilder,
    },
    math::{self, Curvature},
};
use anyhow::bail;
use std::f64::consts::PI;

/// Fake geometries: the combinatorics of `{S7, S3}`, drawn as if `around`
/// cells met at every vertex. Bitruncated distances come from closed-form
/// identities of the polygons that fit around such a vertex. Pure ones
/// bisect for the `hexf` where the master's edge matches the edge of the
/// `2·S3`-gon around each vertex.
#[derive(Debug)]
pub struct FakeDistances;

impl Derive for FakeDistances {
    fn derive(&self, builder: &mut ParameterBuilder) -> anyhow::Result<()> {
        let vertex = match builder.config.geometry {
            GeometryKind::Fake { vertex, .. } => vertex as usize,
            ref other => bail!("not a fake geometry: {:?}", other),
        };
        let distances = fake_distances(
            builder.family.curvature(),
            builder.sides,
            vertex,
            builder.vertex,
            builder.bitruncated,
        );
        builder.set_distances(distances)
    }
}

/// Distances of a fake `{sides, vertex}` tiling with `around` cells per
/// vertex
pub fn fake_distances(
    curv: Curvature,
    sides: usize,
    vertex: usize,
    around: f64,
    bitruncated: bool,
) -> Distances {
    let s7 = sides as f64;
    let alpha = 2.0 * PI / s7;

    // In the bitruncated tiling, every vertex sees one master and two
    // secondary cells (both with 2*S3 sides), each counted `around / 3`
    // times
    let secondary_sides = 2 * vertex;
    let edge = edge_length_for_angles(
        curv,
        &[(sides, around / 3.0), (secondary_sides, around * 2.0 / 3.0)],
    );
    let master = PolygonMetrics::new(curv, sides, edge);
    let secondary = PolygonMetrics::new(curv, secondary_sides, edge);

    if bitruncated {
        return Distances {
            hexf: master.circumradius,
            hcrossf: master.inradius + secondary.inradius,
            rhexf: master.circumradius,
            tessf: 2.0 * master.circumradius + edge,
            crossf: master.inradius + secondary.inradius,
            hexhexdist: 2.0 * secondary.inradius,
            hexvdist: secondary.circumradius,
            edgelen: edge,
        };
    }

    let beta = 2.0 * PI / around;
    let (tessf, hcrossf) = match curv {
        Curvature::Euclidean => (1.0, 0.5 / (PI / around).sin()),
        _ => (
            curv.edge_of_triangle_with_angles(beta, PI / s7, PI / s7),
            curv.edge_of_triangle_with_angles(PI / 2.0, PI / s7, beta / 2.0),
        ),
    };
    let half = PI / secondary_sides as f64;
    let vertex_distance = |f: f64| {
        curv.hdist(&curv.xpush0(f), &curv.xspinpush0(alpha / 2.0, hcrossf))
    };
    let hexf = bisect(0.0, tessf, HEXF_ITERATIONS, |f| {
        master_edge(curv, s7, f) < chord(curv, half, vertex_distance(f))
    });
    let hexvdist = vertex_distance(hexf);
    let hexhexdist = 2.0
        * curv.hdist0(&curv.mid(
            &curv.xspinpush0(half, hexvdist),
            &curv.xspinpush0(-half, hexvdist),
        ));
    Distances {
        hexf,
        hcrossf,
        rhexf: hcrossf,
        tessf,
        crossf: tessf,
        hexhexdist,
        hexvdist,
        edgelen: curv.hdist(
            &curv.xpush0(hcrossf),
            &(math::spin(alpha) * curv.xpush0(hcrossf)),
        ),
    }
}

/// Edge of a regular `sides`-gon with circumradius `radius`
fn master_edge(curv: Curvature, sides: f64, radius: f64) -> f64 {
    chord(curv, PI / sides, radius)
}

/// Distance between the points at `radius` and angles `±half`
fn chord(curv: Curvature, half: f64, radius: f64) -> f64 {
    curv.hdist(
        &curv.xspinpush0(half, radius),
        &curv.xspinpush0(-half, radius),
    )
}
