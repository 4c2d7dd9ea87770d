//! Re-anchoring tracked points to the nearest master cell. A point that
//! drifts far from its cell's center loses precision with every transform
//! applied to it; rebasing moves it into the frame of a closer cell without
//! changing the location it represents.
//!
//! This runs for every tracked object on every frame, so the steady state
//! allocates nothing: all loops walk the borrowed move tables directly.

mod distance;

pub use distance::HoroDistance;

use crate::{
    geometry::GeometryFamily,
    graph::CellGraph,
    math::{product, Point, Transform},
    transform::{TransformResolver, MAX_SEARCH_STEPS},
};
use log::error;

/// Nil box directions, in the order of the Nil move table
const NIL_MINUS_X: usize = 0;
const NIL_MINUS_Y: usize = 1;
const NIL_MINUS_Z: usize = 2;
const NIL_PLUS_X: usize = 3;
const NIL_PLUS_Y: usize = 4;
const NIL_PLUS_Z: usize = 5;

/// A point in the frame of a cell, plus the moves applied to get there
struct Tracked<C> {
    point: Point,
    cell: C,
    moves: Transform,
}

impl<C: Copy> Tracked<C> {
    fn apply(&mut self, step: &Transform, cell: C) {
        self.point = step * self.point;
        self.moves = step * self.moves;
        self.cell = cell;
    }
}

/// Moves points (or whole transforms) to the frame of the master cell that
/// is closest by the family's [HoroDistance], or that contains them, for
/// the Nil box lattice
#[derive(Debug)]
pub struct RebaseEngine<'a, G> {
    resolver: TransformResolver<'a, G>,
    /// Extra reflections tried after ordinary rebasing
    mirrors: Vec<Transform>,
}

impl<'a, G: CellGraph> RebaseEngine<'a, G> {
    pub fn new(resolver: TransformResolver<'a, G>) -> Self {
        Self {
            resolver,
            mirrors: Vec::new(),
        }
    }

    /// Also try these reflections once no neighbor is closer. Used for
    /// tilings with ultra-ideal vertices, where the cell adjacency alone
    /// doesn't reach every region of the plane.
    pub fn with_mirrors(mut self, mirrors: Vec<Transform>) -> Self {
        self.mirrors = mirrors;
        self
    }

    pub fn resolver(&self) -> &TransformResolver<'a, G> {
        &self.resolver
    }

    /// Re-express `point`, given in `cell`'s frame, in the frame of a
    /// closer master. Calling it again on the output changes nothing.
    pub fn rebase(&self, point: &Point, cell: G::Cell) -> (Point, G::Cell) {
        let tracked = self.run(*point, cell);
        (tracked.point, tracked.cell)
    }

    /// Like [Self::rebase], for a transform whose image of the origin is
    /// the tracked point
    pub fn rebase_transform(
        &self,
        m: &Transform,
        cell: G::Cell,
    ) -> (Transform, G::Cell) {
        let origin = self.resolver.family().origin();
        let tracked = self.run(m * origin, cell);
        (tracked.moves * m, tracked.cell)
    }

    fn run(&self, point: Point, cell: G::Cell) -> Tracked<G::Cell> {
        let mut tracked = Tracked {
            point,
            cell,
            moves: Transform::identity(),
        };
        let graph = self.resolver.graph();
        match self.resolver.family() {
            GeometryFamily::Nil => self.nil(&mut tracked),
            GeometryFamily::Product(_) | GeometryFamily::RotationSpace(_) => {
                self.fiber(&mut tracked);
                let flat = graph.master_degree(tracked.cell).saturating_sub(2);
                self.classic(&mut tracked, flat);
            }
            _ => {
                let degree = graph.master_degree(tracked.cell);
                self.classic(&mut tracked, degree);
            }
        }
        self.ultra_mirrors(&mut tracked);
        tracked
    }

    /// Step to whichever neighbor improves the distance the most, until
    /// none does. Only directions `0..directions` are considered.
    fn classic(&self, tracked: &mut Tracked<G::Cell>, directions: usize) {
        let family = self.resolver.family();
        let graph = self.resolver.graph();
        for _ in 0..MAX_SEARCH_STEPS {
            let mut best = HoroDistance::new(family, &tracked.point);
            let mut step = None;
            for dir in 0..directions {
                let next = match graph.master_neighbor(tracked.cell, dir) {
                    Some(next) => next,
                    None => continue,
                };
                let iadj = self.resolver.iadj(tracked.cell, dir);
                let candidate =
                    HoroDistance::new(family, &(iadj * tracked.point));
                if candidate.is_better(&best) {
                    best = candidate;
                    step = Some((iadj, next));
                }
            }
            match step {
                Some((iadj, next)) => tracked.apply(&iadj, next),
                None => return,
            }
        }
        error!(
            "rebase from {:?} exceeded {} steps",
            tracked.cell, MAX_SEARCH_STEPS
        );
    }

    /// Exact rebasing into the Nil box: y first, since moving along y
    /// doesn't disturb the other coordinates, then x, which shears z, then
    /// z. Points on the upper face move, points on the lower face stay.
    fn nil(&self, tracked: &mut Tracked<G::Cell>) {
        let width = self
            .resolver
            .params()
            .lattice_tables()
            .map_or(1.0, |tables| tables.width);
        let axes = [
            (1, width / 2.0, NIL_PLUS_Y, NIL_MINUS_Y),
            (0, width / 2.0, NIL_PLUS_X, NIL_MINUS_X),
            (2, width * width / 2.0, NIL_PLUS_Z, NIL_MINUS_Z),
        ];
        for &(axis, half, plus, minus) in &axes {
            self.step_while(tracked, plus, |p| p[axis] >= half);
            self.step_while(tracked, minus, |p| p[axis] < -half);
        }
    }

    /// Bring the fiber level within half a level of the cell center
    fn fiber(&self, tracked: &mut Tracked<G::Cell>) {
        let params = self.resolver.params();
        let (plevel, curv) = match params.plevel() {
            Some(plevel) => (plevel, params.family.curvature()),
            None => return,
        };
        let flat = self
            .resolver
            .graph()
            .master_degree(tracked.cell)
            .saturating_sub(2);
        let (down, up) = (flat, flat + 1);
        let level = |p: &Point| product::zlevel(curv, p);
        self.step_while(tracked, up, |p| level(p) > plevel / 2.0);
        self.step_while(tracked, down, |p| level(p) < -plevel / 2.0);
    }

    /// Keep stepping in one direction while the tracked point satisfies
    /// `cond`
    fn step_while(
        &self,
        tracked: &mut Tracked<G::Cell>,
        dir: usize,
        cond: impl Fn(&Point) -> bool,
    ) {
        for _ in 0..MAX_SEARCH_STEPS {
            if !cond(&tracked.point) || !self.step(tracked, dir) {
                return;
            }
        }
        error!(
            "rebase from {:?} in direction {} exceeded {} steps",
            tracked.cell, dir, MAX_SEARCH_STEPS
        );
    }

    fn step(&self, tracked: &mut Tracked<G::Cell>, dir: usize) -> bool {
        let graph = self.resolver.graph();
        match graph.master_neighbor(tracked.cell, dir) {
            Some(next) => {
                let iadj = self.resolver.iadj(tracked.cell, dir);
                tracked.apply(&iadj, next);
                true
            }
            None => {
                error!(
                    "rebase hit a missing neighbor at {:?} direction {}",
                    tracked.cell, dir
                );
                false
            }
        }
    }

    /// Apply the first mirror that improves the distance, until none does
    fn ultra_mirrors(&self, tracked: &mut Tracked<G::Cell>) {
        if self.mirrors.is_empty() {
            return;
        }
        let family = self.resolver.family();
        for _ in 0..MAX_SEARCH_STEPS {
            let here = HoroDistance::new(family, &tracked.point);
            let point = tracked.point;
            let better = self.mirrors.iter().find(|m| {
                HoroDistance::new(family, &(*m * point)).is_better(&here)
            });
            match better {
                Some(m) => {
                    let cell = tracked.cell;
                    tracked.apply(m, cell);
                }
                None => return,
            }
        }
        error!("ultra-mirror rebase exceeded {} steps", MAX_SEARCH_STEPS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{GeometryConfig, GeometryKind, Variation},
        geometry::{GeometryParameterSet, ParameterBuilder},
        graph::{NilCell, NilLattice, ProductGraph, TilingPatch, TorusGrid},
        math::{self, eq_matrix, tc0, Curvature},
    };
    use assert_approx_eq::assert_approx_eq;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;
    use std::{f64::consts::PI, rc::Rc};

    fn build(geometry: GeometryKind) -> GeometryParameterSet {
        let config = GeometryConfig {
            geometry,
            variation: Variation::Pure,
            ..Default::default()
        };
        let underlying = config
            .underlying_config()
            .map(|u| Rc::new(ParameterBuilder::build(&u, None).unwrap()));
        ParameterBuilder::build(&config, underlying).unwrap()
    }

    fn random_point(rng: &mut Pcg64, max_distance: f64) -> Point {
        Curvature::Hyperbolic.xspinpush0(
            rng.gen_range(0.0..2.0 * PI),
            rng.gen_range(0.0..max_distance),
        )
    }

    #[test]
    fn test_hyperbolic_idempotent() {
        let params = build(GeometryKind::Regular { face: 7, vertex: 3 });
        let patch = TilingPatch::new(&params, 4).unwrap();
        let resolver = TransformResolver::new(&params, &patch);
        let engine = RebaseEngine::new(resolver);
        let curv = Curvature::Hyperbolic;
        let mut rng = Pcg64::seed_from_u64(7);
        for _ in 0..50 {
            let p = random_point(&mut rng, 2.5);
            let (q, cell) = engine.rebase(&p, 0);
            // Same location, seen from the new cell
            let frame = patch.frame(cell).unwrap();
            assert_approx_eq!(curv.hdist(&(frame * q), &p), 0.0, 1e-6);
            assert!(curv.hdist0(&q) <= params.distances.hcrossf + 1e-6);
            let (q2, cell2) = engine.rebase(&q, cell);
            assert_eq!(cell2, cell);
            assert_eq!(q2, q);
        }
    }

    #[test]
    fn test_rebase_transform() {
        let params = build(GeometryKind::Regular { face: 4, vertex: 4 });
        let torus = TorusGrid::new(6, 6).unwrap();
        let resolver = TransformResolver::new(&params, &torus);
        let engine = RebaseEngine::new(resolver);
        let m = math::spin(0.1) * Curvature::Euclidean.xpush(2.2);
        let (rebased, cell) = engine.rebase_transform(&m, (0, 0));
        assert_eq!(cell, (2, 0));
        assert_approx_eq!(tc0(&rebased).x, 2.2 * 0.1f64.cos() - 2.0, 1e-9);
        assert_approx_eq!(tc0(&rebased).y, tc0(&m).y, 1e-9);
    }

    #[test]
    fn test_nil_boundary() {
        let params = build(GeometryKind::Nil { width: 1.0 });
        let lattice = NilLattice::new(1.0);
        let resolver = TransformResolver::new(&params, &lattice);
        let engine = RebaseEngine::new(resolver);

        // Exactly on the upper x face: moves once, lands on the lower face
        let p = Point::new(0.5, 0.0, 0.0, 1.0);
        let (q, cell) = engine.rebase(&p, NilCell::ORIGIN);
        assert_eq!(cell, NilCell::new(1, 0, 0));
        assert_approx_eq!(q.x, -0.5, 1e-12);
        assert_eq!(engine.rebase(&q, cell), (q, cell));

        // The lower faces stay put
        let p = Point::new(-0.5, 0.2, -0.5, 1.0);
        assert_eq!(engine.rebase(&p, NilCell::ORIGIN), (p, NilCell::ORIGIN));
    }

    #[test]
    fn test_nil_shear() {
        let params = build(GeometryKind::Nil { width: 1.0 });
        let lattice = NilLattice::new(1.0);
        let resolver = TransformResolver::new(&params, &lattice);
        let engine = RebaseEngine::new(resolver);
        let p = Point::new(2.3, -1.7, 4.1, 1.0);
        let (q, cell) = engine.rebase(&p, NilCell::ORIGIN);
        for i in 0..3 {
            assert!(q[i] >= -0.5 - 1e-9 && q[i] < 0.5 + 1e-9, "{}", q);
        }
        // Still the same point of Nil
        let back = math::nil::translate(&lattice.center(cell)) * q;
        assert_approx_eq!((back - p).norm(), 0.0, 1e-9);
    }

    #[test]
    fn test_product_fiber() {
        let params = build(GeometryKind::Product {
            face: 4,
            vertex: 4,
            plevel_factor: 1.0,
            twisted: false,
        });
        let plevel = params.plevel().unwrap();
        let graph = ProductGraph::new(TorusGrid::new(8, 8).unwrap());
        let resolver = TransformResolver::new(&params, &graph);
        let engine = RebaseEngine::new(resolver);
        let surface = product::swap_layout(&Curvature::Euclidean.xpush(1.2));
        let p =
            product::level_shift(2.6 * plevel) * surface * product::origin();
        let (q, cell) = engine.rebase(&p, graph.root());
        assert_eq!(cell, graph.cell((1, 0), 3));
        let (level, flat) = product::decompose(Curvature::Euclidean, &q);
        assert_approx_eq!(level, -0.4 * plevel, 1e-9);
        assert_approx_eq!(flat.x / flat.z, 0.2, 1e-9);
    }

    /// Reflections in lines a fixed distance from the origin, all around.
    /// Each one brings points beyond its line strictly closer to the origin,
    /// so the mirror loop has to stop.
    #[test]
    fn test_ultra_mirrors_terminate() {
        let params = build(GeometryKind::Regular { face: 7, vertex: 3 });
        let patch = TilingPatch::new(&params, 3).unwrap();
        let curv = Curvature::Hyperbolic;
        let r = 0.4;
        let mirrors: Vec<Transform> = (0..5)
            .map(|i| {
                let angle = i as f64 * 2.0 * PI / 5.0;
                math::spin(angle)
                    * curv.xpush(r)
                    * math::mirror(0)
                    * curv.xpush(-r)
                    * math::spin(-angle)
            })
            .collect();
        for m in &mirrors {
            assert!(eq_matrix(&(m * m), &Transform::identity(), 1e-9));
        }
        let plain = RebaseEngine::new(TransformResolver::new(&params, &patch));
        let engine = RebaseEngine::new(TransformResolver::new(&params, &patch))
            .with_mirrors(mirrors.clone());

        let mut rng = Pcg64::seed_from_u64(1);
        for _ in 0..100 {
            let p = random_point(&mut rng, 2.0);
            let (q, cell) = engine.rebase(&p, 0);
            let (unmirrored, plain_cell) = plain.rebase(&p, 0);
            // Mirrors never change the cell, only pull the point inwards
            assert_eq!(cell, plain_cell);
            assert!(curv.hdist0(&q) <= curv.hdist0(&unmirrored) + 1e-9);
            let here = HoroDistance::new(params.family, &q);
            for m in &mirrors {
                let there = HoroDistance::new(params.family, &(m * q));
                assert!(!there.is_better(&here));
            }
        }
    }
}
