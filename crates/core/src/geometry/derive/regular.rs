use crate::{
    config::GeometryKind,
    geometry::{
        derive::{bisect, Derive},
        Distances, ParameterBuilder, HCROSSF7, HEXF7,
    },
    math::{Curvature, Point},
    unwrap_or_bail,
};
use anyhow::bail;
use std::f64::consts::PI;

/// Iterations of the `hexf` bisection
pub(super) const HEXF_ITERATIONS: usize = 100;

/// Distances of a regular `{S7, S3}` tiling, from triangle identities plus a
/// bisection for `hexf`
#[derive(Debug)]
pub struct RegularDistances;

impl Derive for RegularDistances {
    fn derive(&self, builder: &mut ParameterBuilder) -> anyhow::Result<()> {
        let distances = tiling_distances(
            builder.family.curvature(),
            builder.sides,
            builder.vertex,
            builder.bitruncated,
        );
        builder.hexshift = hexshift(builder.sides, builder.bitruncated);
        builder.set_distances(distances)
    }
}

/// Cube honeycombs `{4,3,r}`. Curved honeycombs reuse the standard
/// creature-scale constants; the center distance comes from the cube's
/// inradius.
#[derive(Debug)]
pub struct HoneycombDistances;

impl Derive for HoneycombDistances {
    fn derive(&self, builder: &mut ParameterBuilder) -> anyhow::Result<()> {
        let edge_order = match builder.config.geometry {
            GeometryKind::Honeycomb { edge_order } => edge_order,
            ref other => bail!("not a honeycomb: {:?}", other),
        };
        let curv = builder.family.curvature();
        let rho = unwrap_or_bail!(
            cube_inradius(curv, edge_order),
            "no cube honeycomb with {} cubes around an edge",
            edge_order
        );

        let mut distances = match curv {
            // A cube grid is the Euclidean square grid, one dimension up
            Curvature::Euclidean => tiling_distances(curv, 4, 4.0, false),
            _ => Distances {
                hexf: HEXF7,
                rhexf: HEXF7,
                hcrossf: HCROSSF7,
                crossf: HCROSSF7,
                ..Default::default()
            },
        };
        distances.tessf = 2.0 * rho;

        // Cube vertices lie on the diagonals in the projective model
        let k = curv.tan_auto(rho);
        let vertex = curv.normalize(&Point::new(k, k, k, 1.0));
        let next = curv.normalize(&Point::new(k, k, -k, 1.0));
        distances.edgelen = curv.hdist(&vertex, &next);

        let alpha = 2.0 * PI / builder.sides as f64;
        distances.hexvdist = curv.hdist(
            &curv.xpush0(distances.hexf),
            &curv.xspinpush0(alpha / 2.0, distances.hcrossf),
        );
        distances.hexhexdist = curv.hdist(
            &curv.xpush0(distances.crossf),
            &curv.xspinpush0(alpha, distances.crossf),
        );
        builder.set_distances(distances)
    }
}

/// Distances of a regular tiling with `sides`-gons, `vertex` of them around
/// each vertex. `vertex` may be fractional.
pub fn tiling_distances(
    curv: Curvature,
    sides: usize,
    vertex: f64,
    bitruncated: bool,
) -> Distances {
    let s7 = sides as f64;
    let alpha = 2.0 * PI / s7;
    let beta = 2.0 * PI / vertex;

    let mut tessf = match curv {
        Curvature::Euclidean => 1.0,
        _ => curv.edge_of_triangle_with_angles(beta, PI / s7, PI / s7),
    };
    if curv == Curvature::Spherical && sides == 4 {
        tessf = PI / 2.0;
    }
    let hcrossf = match curv {
        Curvature::Euclidean => tessf / 2.0 / (PI / vertex).sin(),
        _ => curv.edge_of_triangle_with_angles(PI / 2.0, PI / s7, beta / 2.0),
    };
    let crossf = if bitruncated { hcrossf } else { tessf };

    // The vertex of a bitruncated master cell is where the master's edge
    // is as long as the edge of the secondary cell
    let hexf = bisect(0.0, tessf, HEXF_ITERATIONS, |f| {
        let h = curv.xpush0(f);
        let h1 = curv.xspinpush0(alpha, f);
        let h2 = curv.xpush0(tessf - f);
        curv.intval(&h, &h1) < curv.intval(&h, &h2)
    });
    let rhexf = if bitruncated { hexf } else { hcrossf };

    Distances {
        hexf,
        hcrossf,
        rhexf,
        tessf,
        crossf,
        hexhexdist: curv
            .hdist(&curv.xpush0(crossf), &curv.xspinpush0(alpha, crossf)),
        hexvdist: curv
            .hdist(&curv.xpush0(hexf), &curv.xspinpush0(alpha / 2.0, hcrossf)),
        edgelen: curv
            .hdist(&curv.xpush0(rhexf), &curv.xspinpush0(alpha, rhexf)),
    }
}

/// Rotation of the secondary cells' direction 0. Only bitruncated tilings
/// with even-sided masters need one.
pub fn hexshift(sides: usize, bitruncated: bool) -> f64 {
    if bitruncated && sides % 2 == 0 {
        let alpha = 2.0 * PI / sides as f64;
        alpha / 2.0 + alpha * ((sides - 1) / 2) as f64 + PI
    } else {
        0.0
    }
}

/// Inradius of the cube in the `{4,3,edge_order}` honeycomb. The dihedral
/// angle of the cube has to be `2π / edge_order`.
fn cube_inradius(curv: Curvature, edge_order: u8) -> Option<f64> {
    let c = (2.0 * PI / edge_order as f64).cos();
    let rho = match curv {
        Curvature::Euclidean => 0.5,
        Curvature::Hyperbolic => (c / (1.0 + c)).sqrt().atanh(),
        Curvature::Spherical => (-c / (1.0 + c)).sqrt().atan(),
    };
    Some(rho).filter(|rho| rho.is_finite() && *rho > 0.0)
}
