//! Steps shared by every geometry, run once the distances are known

use crate::{
    config::GeometryKind,
    geometry::{
        derive::Derive, BinaryMove, BinaryTables, Extension, GeometryFamily,
        HeightInputs, HeightLevels, LatticeKind, LatticeTables, Moves,
        ParameterBuilder, ProductLevels, Scales, HCROSSF7,
    },
    math::{self, horo, nil, product, solv, Curvature, Point, Transform},
};
use anyhow::bail;
use std::f64::consts::{LN_2, PI};

/// Sizes of things drawn on cells, relative to the standard geometry
#[derive(Debug)]
pub struct ScaleStep;

impl Derive for ScaleStep {
    fn derive(&self, builder: &mut ParameterBuilder) -> anyhow::Result<()> {
        let config = builder.config;
        let d = builder.distances()?;
        let cs = config.creature_scale;
        let view_3d = config.is_3d_view();

        let scalefactor = d.crossf / HCROSSF7 * cs;
        let mut orbsize = d.crossf * cs;
        let mut zhexf =
            if builder.bitruncated { d.hexf } else { d.crossf * 0.55 } * cs;
        if config.show_3d && !config.is_native_3d() {
            zhexf *= 1.5;
            orbsize *= 1.2;
        }

        let br = config.boundary_ratio;
        let (mut floorrad0, mut floorrad1) = if view_3d {
            (d.hexvdist, d.rhexf)
        } else {
            (d.hexvdist * (1.0 - 0.08 * br), d.rhexf * (1.0 - 0.06 * br))
        };
        // Square grids look better with fixed insets
        if let GeometryKind::Regular { face: 4, vertex: 4 } = config.geometry {
            let (sca0, sca1) = match (view_3d, builder.bitruncated) {
                (true, _) => (1.0, 1.0),
                (false, false) => (0.94, 0.94),
                (false, true) => (0.9, 0.8),
            };
            floorrad0 = d.hexvdist * sca0;
            floorrad1 = d.rhexf * sca1;
        }

        let plevel = match config.geometry {
            GeometryKind::Product {
                twisted: true,
                vertex,
                ..
            } => {
                let levels = twisted_levels(
                    builder.family.curvature(),
                    builder.sides,
                    vertex as usize,
                    builder.bitruncated,
                );
                let plevel = levels.plevel;
                builder.extension = Extension::ProductLevels(levels);
                plevel
            }
            GeometryKind::Product { plevel_factor, .. } => {
                let plevel = plevel_factor * scalefactor;
                builder.extension = Extension::ProductLevels(ProductLevels {
                    plevel,
                    twisted: false,
                    single_step: 0,
                    psl_steps: 0,
                    level_down: product::level_shift(-plevel),
                    level_up: product::level_shift(plevel),
                });
                plevel
            }
            _ => 0.0,
        };

        builder.set_scales(Scales {
            scalefactor,
            orbsize,
            zhexf,
            floorrad0,
            floorrad1,
            plevel,
        });
        Ok(())
    }
}

/// Fiber constants of a rotation space. Going once around a vertex turns
/// the fiber by the angle defect, so the level height is a fixed fraction
/// of a full turn rather than a free parameter.
fn twisted_levels(
    curv: Curvature,
    sides: usize,
    vertex: usize,
    bitruncated: bool,
) -> ProductLevels {
    let (s7, s3) = (sides as i32, vertex as i32);
    let single_step = (s3 * s7 - 2 * s7 - 2 * s3).abs();
    let psl_steps = 2 * s7 * if bitruncated { s3 } else { 1 };
    let plevel = match (curv, sides, bitruncated) {
        // No angle defect, so the fiber is scaled to the cell instead
        (Curvature::Euclidean, 6, false) => 3f64.sqrt() / 4.0,
        (Curvature::Euclidean, 6, true) => 3f64.sqrt() / 12.0,
        (Curvature::Euclidean, _, false) => 1.0,
        (Curvature::Euclidean, _, true) => 0.25,
        _ => PI * single_step as f64 / psl_steps as f64,
    };
    ProductLevels {
        plevel,
        twisted: true,
        single_step,
        psl_steps,
        level_down: product::level_shift(-plevel),
        level_up: product::level_shift(plevel),
    }
}

/// Per-direction move matrices and their inverses
#[derive(Debug)]
pub struct MoveStep;

impl Derive for MoveStep {
    fn derive(&self, builder: &mut ParameterBuilder) -> anyhow::Result<()> {
        let d = builder.distances()?;
        let family = builder.family;
        let curv = family.curvature();
        let alpha = builder.alpha;
        let mut hexmove = Vec::new();

        let heptmove: Vec<Transform> = match (&builder.config.geometry, family)
        {
            (GeometryKind::Honeycomb { .. }, _) => (0..6)
                .map(|dir| {
                    let sign = if dir < 3 { 1.0 } else { -1.0 };
                    curv.cpush(dir % 3, sign * d.tessf)
                })
                .collect(),
            (GeometryKind::BinaryTiling { width }, _) => {
                let moves = binary_moves(*width);
                builder.extension = Extension::BinaryTiling(BinaryTables {
                    width: *width,
                    level_step: LN_2,
                    moves: moves.clone(),
                });
                moves
            }
            (GeometryKind::Nil { width }, _) => {
                let moves = nil_moves(*width);
                builder.extension = Extension::Lattice(LatticeTables {
                    kind: LatticeKind::Nil,
                    width: *width,
                    moves: moves.clone(),
                });
                moves
            }
            (GeometryKind::Solv, _) => {
                let moves = solv_moves();
                builder.extension = Extension::Lattice(LatticeTables {
                    kind: LatticeKind::Solv,
                    width: 1.0,
                    moves: moves.clone(),
                });
                moves
            }
            (
                _,
                GeometryFamily::Product(_) | GeometryFamily::RotationSpace(_),
            ) => {
                let underlying = builder.underlying()?;
                let levels = match &builder.extension {
                    Extension::ProductLevels(levels) => levels,
                    other => bail!(
                        "product levels not initialized, found {:?}",
                        other
                    ),
                };
                hexmove = underlying
                    .moves
                    .hexmove
                    .iter()
                    .map(product::swap_layout)
                    .collect();
                underlying
                    .moves
                    .heptmove
                    .iter()
                    .map(product::swap_layout)
                    .chain([levels.level_down, levels.level_up])
                    .collect()
            }
            (GeometryKind::Archimedean { faces }, _) => {
                // Edges of the master alternate between the faces before and
                // after it in the vertex configuration
                let master = PolygonInradius::of(curv, faces[0], d.edgelen);
                let next = PolygonInradius::of(curv, faces[1], d.edgelen);
                let prev = PolygonInradius::of(
                    curv,
                    faces[faces.len() - 1],
                    d.edgelen,
                );
                (0..builder.sides)
                    .map(|dir| {
                        let across = if dir % 2 == 0 { next } else { prev };
                        math::spin(-(dir as f64) * alpha)
                            * curv.xpush(master.0 + across.0)
                            * math::spin(PI)
                    })
                    .collect()
            }
            _ => {
                if builder.bitruncated {
                    hexmove = (0..builder.sides)
                        .map(|dir| {
                            math::spin(builder.hexshift - dir as f64 * alpha)
                                * curv.xpush(-d.crossf)
                                * math::spin(PI)
                        })
                        .collect();
                }
                (0..builder.sides)
                    .map(|dir| {
                        math::spin(-(dir as f64) * alpha)
                            * curv.xpush(d.tessf)
                            * math::spin(PI)
                    })
                    .collect()
            }
        };

        let invert = |moves: &[Transform]| -> Vec<Transform> {
            moves.iter().map(|m| family.invert(m)).collect()
        };
        let invheptmove = invert(&heptmove);
        let invhexmove = invert(&hexmove);
        builder.set_moves(Moves {
            heptmove,
            invheptmove,
            hexmove,
            invhexmove,
        })
    }
}

/// Inradius of a regular polygon with the given edge length
#[derive(Copy, Clone)]
struct PolygonInradius(f64);

impl PolygonInradius {
    fn of(curv: Curvature, sides: u8, edge: f64) -> Self {
        Self(
            super::archimedean::PolygonMetrics::new(curv, sides as usize, edge)
                .inradius,
        )
    }
}

/// Moves of the binary tiling, indexed by [BinaryMove::index]. Parents sit
/// one `ln 2` higher on the horocyclic axis and are twice as wide.
pub fn binary_moves(width: f64) -> Vec<Transform> {
    let curv = Curvature::Hyperbolic;
    BinaryMove::ALL
        .iter()
        .map(|mv| match mv {
            BinaryMove::Right => horo::parabolic(width, 0.0),
            BinaryMove::Left => horo::parabolic(-width, 0.0),
            BinaryMove::ParentFromLeft => {
                horo::parabolic(width / 2.0, 0.0) * curv.xpush(LN_2)
            }
            BinaryMove::ParentFromRight => {
                horo::parabolic(-width / 2.0, 0.0) * curv.xpush(LN_2)
            }
            BinaryMove::LeftChild => {
                horo::parabolic(-width / 4.0, 0.0) * curv.xpush(-LN_2)
            }
            BinaryMove::RightChild => {
                horo::parabolic(width / 4.0, 0.0) * curv.xpush(-LN_2)
            }
        })
        .collect()
}

/// Translations to the six face neighbors of a Nil box: `-x, -y, -z, +x,
/// +y, +z`. The box is `width²` high so that the commutator of the x and y
/// moves is exactly one step up.
pub fn nil_moves(width: f64) -> Vec<Transform> {
    let steps = [
        Point::new(-width, 0.0, 0.0, 1.0),
        Point::new(0.0, -width, 0.0, 1.0),
        Point::new(0.0, 0.0, -width * width, 1.0),
        Point::new(width, 0.0, 0.0, 1.0),
        Point::new(0.0, width, 0.0, 1.0),
        Point::new(0.0, 0.0, width * width, 1.0),
    ];
    steps.iter().map(nil::translate).collect()
}

/// Translations of the Solv lattice: four horizontal moves, then two up and
/// two down. Going up halves the x period and doubles the y period.
pub fn solv_moves() -> Vec<Transform> {
    let steps = [
        Point::new(1.0, 0.0, 0.0, 1.0),
        Point::new(0.0, 1.0, 0.0, 1.0),
        Point::new(-1.0, 0.0, 0.0, 1.0),
        Point::new(0.0, -1.0, 0.0, 1.0),
        Point::new(0.0, 0.0, LN_2, 1.0),
        Point::new(0.5, 0.0, LN_2, 1.0),
        Point::new(0.0, 0.0, -LN_2, 1.0),
        Point::new(0.0, 0.5, -LN_2, 1.0),
    ];
    steps.iter().map(solv::translate).collect()
}

/// Render height thresholds
#[derive(Debug)]
pub struct HeightStep;

impl Derive for HeightStep {
    fn derive(&self, builder: &mut ParameterBuilder) -> anyhow::Result<()> {
        let config = builder.config;
        let scales = builder.scales()?;
        let mapping = builder.family.height_mapping(config);
        let plevel = if builder.family.is_hybrid() {
            Some(scales.plevel)
        } else {
            None
        };
        let inputs = HeightInputs {
            mapping,
            wall_height: plevel.unwrap_or(config.heights.wall_height),
            scalefactor: scales.scalefactor,
            orbsize: scales.orbsize,
            zhexf: scales.zhexf,
            plevel,
            native_3d: config.is_native_3d(),
            view_3d: config.is_3d_view(),
        };
        let (heights, invalid) = HeightLevels::compute(
            &config.heights,
            config.projection_alpha,
            inputs,
        );
        builder.set_heights(mapping, heights, invalid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{GeometryConfig, Variation},
        geometry::ParameterBuilder,
        math::{c0, eq_matrix},
    };
    use assert_approx_eq::assert_approx_eq;
    use std::rc::Rc;

    fn build(
        geometry: GeometryKind,
        variation: Variation,
    ) -> crate::geometry::GeometryParameterSet {
        let config = GeometryConfig {
            geometry,
            variation,
            ..Default::default()
        };
        let underlying = config.underlying_config().map(|u| {
            Rc::new(ParameterBuilder::build(&u, None).unwrap())
        });
        ParameterBuilder::build(&config, underlying).unwrap()
    }

    #[test]
    fn test_standard_scales() {
        let params = build(
            GeometryKind::Regular { face: 7, vertex: 3 },
            Variation::Bitruncated,
        );
        assert_approx_eq!(params.scales.scalefactor, 1.0, 1e-6);
        assert_approx_eq!(params.scales.orbsize, HCROSSF7, 1e-6);
        assert_approx_eq!(params.scales.zhexf, params.distances.hexf);
        assert_approx_eq!(
            params.scales.floorrad0,
            params.distances.hexvdist * 0.92
        );
        assert_eq!(params.invalid, None);
    }

    #[test]
    fn test_moves_reach_neighbors() {
        let params = build(
            GeometryKind::Regular { face: 7, vertex: 3 },
            Variation::Bitruncated,
        );
        let curv = Curvature::Hyperbolic;
        for dir in 0..7 {
            let center = params.heptmove(dir) * c0();
            let tessf = params.distances.tessf;
            assert_approx_eq!(curv.hdist0(&center), tessf, 1e-9);
            assert_approx_eq!(
                math::angle_of(&center).rem_euclid(2.0 * PI),
                (-(dir as f64) * params.alpha).rem_euclid(2.0 * PI),
                1e-9
            );
            // The neighbor's direction 0 points back at us
            let back = params.heptmove(dir) * curv.xpush0(tessf);
            assert_approx_eq!(curv.hdist0(&back), 0.0, 1e-9);

            let hex = params.hexmove(dir) * c0();
            assert_approx_eq!(curv.hdist0(&hex), params.distances.crossf, 1e-9);
            assert!(eq_matrix(
                &(params.heptmove(dir) * params.invheptmove(dir)),
                &Transform::identity(),
                1e-9
            ));
        }
    }

    #[test]
    fn test_euclidean_square_insets() {
        let params = build(
            GeometryKind::Regular { face: 4, vertex: 4 },
            Variation::Pure,
        );
        let (scales, distances) = (&params.scales, &params.distances);
        assert_approx_eq!(scales.floorrad0, distances.hexvdist * 0.94);
        assert_approx_eq!(scales.floorrad1, distances.rhexf * 0.94);
    }

    #[test]
    fn test_product_levels() {
        let params = build(
            GeometryKind::Product {
                face: 7,
                vertex: 3,
                plevel_factor: 0.5,
                twisted: false,
            },
            Variation::Bitruncated,
        );
        let levels = params.product_levels().unwrap();
        assert_approx_eq!(levels.plevel, 0.5 * params.scales.scalefactor);
        assert_eq!(params.moves.heptmove.len(), 9);
        let up = params.heptmove(8) * product::origin();
        assert_approx_eq!(
            product::zlevel(Curvature::Hyperbolic, &up),
            levels.plevel,
            1e-12
        );
        assert_approx_eq!(params.heights.human_height, levels.plevel * 0.9);
    }

    #[test]
    fn test_twisted_levels() {
        let levels = twisted_levels(Curvature::Hyperbolic, 7, 3, false);
        assert_eq!(levels.single_step, 1);
        assert_eq!(levels.psl_steps, 14);
        assert_approx_eq!(levels.plevel, PI / 14.0);

        let levels = twisted_levels(Curvature::Spherical, 5, 3, true);
        assert_eq!(levels.single_step, 1);
        assert_eq!(levels.psl_steps, 30);

        let levels = twisted_levels(Curvature::Euclidean, 4, 4, false);
        assert_eq!(levels.single_step, 0);
        assert_approx_eq!(levels.plevel, 1.0);
    }

    #[test]
    fn test_binary_moves() {
        let moves = binary_moves(1.0);
        let curv = Curvature::Hyperbolic;
        let parent = moves[BinaryMove::ParentFromLeft.index()];
        let child = moves[BinaryMove::LeftChild.index()];
        // Going to the parent from its left child and back down to its
        // left child is the identity
        assert!(eq_matrix(&(parent * child), &Transform::identity(), 1e-12));
        assert_approx_eq!(horo::level(&(parent * c0())), LN_2, 1e-12);
        let right = moves[BinaryMove::Right.index()];
        let left = moves[BinaryMove::Left.index()];
        assert!(eq_matrix(&(right * left), &Transform::identity(), 1e-12));
        assert_approx_eq!(horo::level(&(right * c0())), 0.0, 1e-12);
        assert!(curv.hdist0(&(right * c0())) > 0.0);
    }

    #[test]
    fn test_nil_moves_commutator() {
        let moves = nil_moves(1.0);
        // +x, +y, -x, -y is one step up
        let loop_ = moves[3] * moves[4] * moves[0] * moves[1];
        assert!(eq_matrix(&loop_, &moves[5], 1e-12));
    }

    #[test]
    fn test_honeycomb_moves() {
        let params =
            build(GeometryKind::Honeycomb { edge_order: 5 }, Variation::Pure);
        let curv = Curvature::Hyperbolic;
        for dir in 0..6 {
            let there = params.heptmove(dir) * c0();
            let tessf = params.distances.tessf;
            assert_approx_eq!(curv.hdist0(&there), tessf, 1e-9);
            let back = params.heptmove(dir) * params.heptmove((dir + 3) % 6);
            assert!(eq_matrix(&back, &Transform::identity(), 1e-9));
        }
    }
}
