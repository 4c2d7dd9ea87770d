//! Transforms between the local frames of two cells. Adjacent cells are
//! related by a move matrix and the spin of the link between them; distant
//! cells by composing those along a path through the graph. Which path is
//! walked depends on the [SearchHint] of the graph, see [search].

mod memo;
mod search;

pub use memo::{ReachabilityMap, TransformMemo};

use crate::{
    geometry::{GeometryFamily, GeometryParameterSet},
    graph::{CellGraph, SearchHint},
    math::{self, product, Point, Transform},
};

/// Hard cap on the steps of any path search. Well-formed graphs never get
/// close; hitting it means the graph or the geometry is broken.
pub const MAX_SEARCH_STEPS: usize = 10_000;

/// Rotation (and possibly reflection) that lines a neighbor's direction 0
/// up with the direction `spin` it is entered from
pub fn orient(alpha: f64, spin: usize, mirrored: bool) -> Transform {
    let rotation = math::spin(spin as f64 * alpha);
    if mirrored {
        math::mirror(1) * rotation
    } else {
        rotation
    }
}

/// Inverse of [orient]
pub fn orient_inverse(alpha: f64, spin: usize, mirrored: bool) -> Transform {
    let rotation = math::spin(-(spin as f64) * alpha);
    if mirrored {
        rotation * math::mirror(1)
    } else {
        rotation
    }
}

/// Resolves transforms between cells of a graph, for the geometry the
/// graph lives in. Cheap to construct; it only borrows its inputs.
#[derive(Debug)]
pub struct TransformResolver<'a, G> {
    params: &'a GeometryParameterSet,
    graph: &'a G,
}

impl<'a, G: CellGraph> TransformResolver<'a, G> {
    pub fn new(params: &'a GeometryParameterSet, graph: &'a G) -> Self {
        Self { params, graph }
    }

    pub fn params(&self) -> &'a GeometryParameterSet {
        self.params
    }

    pub fn graph(&self) -> &'a G {
        self.graph
    }

    pub fn family(&self) -> GeometryFamily {
        self.params.family
    }

    /// Transform from a master's frame to the frame of its neighbor in
    /// direction `dir`
    pub fn adj(&self, master: G::Cell, dir: usize) -> Transform {
        let params = self.params;
        let mv = params.heptmove(dir);
        let spin = self.graph.master_spin(master, dir);
        let mirrored = self.graph.master_mirrored(master, dir);
        match params.family {
            // Lattices have fixed translations, with no spins to apply
            GeometryFamily::Nil
            | GeometryFamily::Solv
            | GeometryFamily::BinaryTiling => *mv,
            GeometryFamily::Product(_) | GeometryFamily::RotationSpace(_) => {
                let flat = params.moves.heptmove.len().saturating_sub(2);
                if dir >= flat {
                    *mv
                } else {
                    mv * product::swap_layout(&orient(
                        params.alpha,
                        spin,
                        mirrored,
                    ))
                }
            }
            _ => mv * orient(params.alpha, spin, mirrored),
        }
    }

    /// Inverse of [Self::adj]: from the neighbor's frame back to the
    /// master's. Built from the precomputed inverse moves.
    pub fn iadj(&self, master: G::Cell, dir: usize) -> Transform {
        let params = self.params;
        let inv = params.invheptmove(dir);
        let spin = self.graph.master_spin(master, dir);
        let mirrored = self.graph.master_mirrored(master, dir);
        match params.family {
            GeometryFamily::Nil
            | GeometryFamily::Solv
            | GeometryFamily::BinaryTiling => *inv,
            GeometryFamily::Product(_) | GeometryFamily::RotationSpace(_) => {
                let flat = params.moves.heptmove.len().saturating_sub(2);
                if dir >= flat {
                    *inv
                } else {
                    product::swap_layout(&orient_inverse(
                        params.alpha,
                        spin,
                        mirrored,
                    )) * inv
                }
            }
            _ => orient_inverse(params.alpha, spin, mirrored) * inv,
        }
    }

    /// Transform carrying `h2`'s frame into `h1`'s frame, for two masters.
    /// `hint` is roughly where `h2` is, in `h1`'s frame; it only matters
    /// where several paths lead to `h2` with different results.
    pub fn relative_master(
        &self,
        h2: G::Cell,
        h1: G::Cell,
        hint: &Point,
    ) -> Transform {
        if h1 == h2 {
            return Transform::identity();
        }
        match self.graph.search_hint() {
            SearchHint::DistanceField => search::distance_field(self, h2, h1),
            SearchHint::Bounded => search::bounded(self, h2, h1, hint),
            SearchHint::Quotient => search::quotient(self, h2, h1, hint),
            SearchHint::Crystal => search::crystal(self, h2, h1),
        }
    }

    /// Frame of a cell relative to its master's frame
    pub fn master_relative(&self, cell: G::Cell) -> Transform {
        match self.graph.master_direction(cell) {
            Some(dir) => *self.params.hexmove(dir),
            None => Transform::identity(),
        }
    }

    /// Transform carrying `c2`'s frame into `c1`'s frame, for any two cells.
    /// See [Self::relative_master] for `hint`.
    pub fn relative_matrix(
        &self,
        c2: G::Cell,
        c1: G::Cell,
        hint: &Point,
    ) -> Transform {
        let family = self.params.family;
        let from = self.master_relative(c1);
        let to = self.master_relative(c2);
        let master_hint = from * hint;
        family.invert(&from)
            * self.relative_master(
                self.graph.master(c2),
                self.graph.master(c1),
                &master_hint,
            )
            * to
    }

    /// Transform from a cell's frame to the frame of its neighbor across
    /// side `dir`. `None` if there's no neighbor there.
    pub fn cell_adj(&self, cell: G::Cell, dir: usize) -> Option<Transform> {
        let neighbor = self.graph.neighbor(cell, dir)?;
        let step = self.params.shape_move(self.graph.shape(cell), dir)?;
        let hint = step * self.params.family.origin();
        Some(self.relative_matrix(neighbor, cell, &hint))
    }

    /// Inverse of [Self::cell_adj]
    pub fn cell_iadj(&self, cell: G::Cell, dir: usize) -> Option<Transform> {
        self.cell_adj(cell, dir)
            .map(|m| self.params.family.invert(&m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{GeometryConfig, GeometryKind, Variation},
        geometry::ParameterBuilder,
        graph::{
            BinaryCell, BinaryTilingGraph, NilCell, NilLattice, ProductGraph,
            TilingPatch, TorusGrid,
        },
        math::{eq_matrix, nil, tc0, Curvature},
    };
    use assert_approx_eq::assert_approx_eq;
    use std::rc::Rc;

    fn build(
        geometry: GeometryKind,
        variation: Variation,
    ) -> GeometryParameterSet {
        let config = GeometryConfig {
            geometry,
            variation,
            ..Default::default()
        };
        let underlying = config
            .underlying_config()
            .map(|u| Rc::new(ParameterBuilder::build(&u, None).unwrap()));
        ParameterBuilder::build(&config, underlying).unwrap()
    }

    /// Resolving every cell from the root reproduces where the patch put it
    fn assert_reproduces_frames(params: &GeometryParameterSet, radius: usize) {
        let patch = TilingPatch::new(params, radius).unwrap();
        let resolver = TransformResolver::new(params, &patch);
        for cell in patch.cells() {
            let frame = patch.frame(cell).unwrap();
            let hint = tc0(frame);
            let resolved = resolver.relative_matrix(cell, 0, &hint);
            assert!(
                eq_matrix(&resolved, frame, 1e-6),
                "cell {}: {} != {}",
                cell,
                resolved,
                frame
            );
        }
    }

    #[test]
    fn test_patch_frames() {
        assert_reproduces_frames(
            &build(
                GeometryKind::Regular { face: 7, vertex: 3 },
                Variation::Pure,
            ),
            2,
        );
        assert_reproduces_frames(
            &build(
                GeometryKind::Regular { face: 7, vertex: 3 },
                Variation::Bitruncated,
            ),
            2,
        );
        assert_reproduces_frames(
            &build(
                GeometryKind::Regular { face: 5, vertex: 3 },
                Variation::Bitruncated,
            ),
            3,
        );
        assert_reproduces_frames(
            &build(
                GeometryKind::Regular { face: 4, vertex: 4 },
                Variation::Pure,
            ),
            3,
        );
    }

    #[test]
    fn test_adjacent_inverse() {
        let params = build(
            GeometryKind::Regular { face: 7, vertex: 3 },
            Variation::Bitruncated,
        );
        let patch = TilingPatch::new(&params, 2).unwrap();
        let resolver = TransformResolver::new(&params, &patch);
        let curv = Curvature::Hyperbolic;
        for cell in patch.cells().take(40) {
            for dir in 0..patch.degree(cell) {
                let n = match patch.neighbor(cell, dir) {
                    Some(n) => n,
                    None => continue,
                };
                let hint = tc0(patch.frame(n).unwrap());
                let there = resolver.relative_matrix(n, cell, &hint);
                let back = resolver.relative_matrix(cell, n, &math::c0());
                assert!(
                    eq_matrix(&(there * back), &Transform::identity(), 1e-6),
                    "{} -> {}",
                    cell,
                    n
                );
                // And the neighbor is where the move says it is
                let adj = resolver.cell_adj(cell, dir).unwrap();
                let expected = params
                    .shape_move(patch.shape(cell), dir)
                    .unwrap();
                assert_approx_eq!(
                    curv.hdist(&tc0(&adj), &tc0(&expected)),
                    0.0,
                    1e-6
                );
            }
        }
    }

    #[test]
    fn test_torus_hint_picks_path() {
        let params = build(
            GeometryKind::Regular { face: 4, vertex: 4 },
            Variation::Pure,
        );
        let torus = TorusGrid::new(4, 4).unwrap();
        let resolver = TransformResolver::new(&params, &torus);
        let curv = Curvature::Euclidean;

        // Two steps either way around the torus
        let right = resolver.relative_matrix((2, 0), (0, 0), &curv.xpush0(2.0));
        assert_approx_eq!(tc0(&right).x, 2.0, 1e-9);
        let left = resolver.relative_matrix((2, 0), (0, 0), &curv.xpush0(-2.0));
        assert_approx_eq!(tc0(&left).x, -2.0, 1e-9);

        // Wrapping around is one step, whatever the hint says
        let wrapped =
            resolver.relative_matrix((3, 0), (0, 0), &curv.xpush0(3.0));
        assert_approx_eq!(tc0(&wrapped).x, -1.0, 1e-9);
    }

    #[test]
    fn test_nil_crystal() {
        let params = build(GeometryKind::Nil { width: 1.0 }, Variation::Pure);
        let lattice = NilLattice::new(1.0);
        let resolver = TransformResolver::new(&params, &lattice);
        let target = NilCell::new(2, -1, 3);
        let m = resolver.relative_master(target, NilCell::ORIGIN, &math::c0());
        assert!(eq_matrix(&m, &nil::translate(&lattice.center(target)), 1e-9));

        // Relative to a cell other than the origin
        let from = NilCell::new(-1, 2, 0);
        let m = resolver.relative_master(target, from, &math::c0());
        let expected = nil::itranslate(&lattice.center(from))
            * nil::translate(&lattice.center(target));
        assert!(eq_matrix(&m, &expected, 1e-9));
    }

    #[test]
    fn test_binary_crystal() {
        let params =
            build(GeometryKind::BinaryTiling { width: 1.0 }, Variation::Pure);
        let graph = BinaryTilingGraph::new(1.0);
        let resolver = TransformResolver::new(&params, &graph);
        let target = BinaryCell::new(-2, 3);
        let m =
            resolver.relative_master(target, BinaryCell::ORIGIN, &math::c0());
        assert!(eq_matrix(&m, &graph.frame(target), 1e-9));
    }

    #[test]
    fn test_product_levels() {
        let params = build(
            GeometryKind::Product {
                face: 4,
                vertex: 4,
                plevel_factor: 1.0,
                twisted: false,
            },
            Variation::Pure,
        );
        let plevel = params.plevel().unwrap();
        let graph = ProductGraph::new(TorusGrid::new(5, 5).unwrap());
        let resolver = TransformResolver::new(&params, &graph);
        let target = graph.cell((1, 0), 3);
        let m = resolver.relative_matrix(
            target,
            graph.root(),
            &params.family.origin(),
        );
        let (level, flat) = product::decompose(
            Curvature::Euclidean,
            &(m * product::origin()),
        );
        assert_approx_eq!(level, 3.0 * plevel, 1e-9);
        assert_approx_eq!(flat.x / flat.z, 1.0, 1e-9);
    }
}
