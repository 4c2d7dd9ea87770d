use assert_approx_eq::assert_approx_eq;
use hypertile::{
    geometry::{GeometryHandle, HEXHEXDIST7, TESSF7},
    graph::{ProductGraph, TilingPatch, TorusGrid},
    math::{eq_matrix, product, tc0},
    CellGraph, Curvature, GeometryConfig, GeometryContext, GeometryKind,
    Point, RebaseEngine, Transform, TransformResolver, Variation,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::{f64::consts::PI, rc::Rc};

fn params(
    context: &mut GeometryContext,
    geometry: GeometryKind,
    variation: Variation,
) -> GeometryHandle {
    let config = GeometryConfig {
        geometry,
        variation,
        ..Default::default()
    };
    context.set_current(&config).unwrap()
}

#[test]
fn test_heptagonal_constants() {
    let mut context = GeometryContext::default();
    let params = params(
        &mut context,
        GeometryKind::Regular { face: 7, vertex: 3 },
        Variation::Pure,
    );
    let curv = Curvature::Hyperbolic;
    let distances = &params.distances;
    assert_approx_eq!(distances.tessf, TESSF7, 1e-5);
    assert_approx_eq!(distances.crossf, distances.tessf);
    assert_approx_eq!(
        distances.hexhexdist,
        curv.hdist(
            &curv.xpush0(distances.crossf),
            &curv.xspinpush0(2.0 * PI / 7.0, distances.crossf)
        ),
        1e-9
    );

    // The standard bitruncated tiling has its own reference value
    let bitruncated = GeometryConfig {
        geometry: GeometryKind::Regular { face: 7, vertex: 3 },
        variation: Variation::Bitruncated,
        ..Default::default()
    };
    let bitruncated = context.set_current(&bitruncated).unwrap();
    assert_approx_eq!(bitruncated.distances.hexhexdist, HEXHEXDIST7, 1e-5);
}

#[test]
fn test_adjacent_cells_invert() {
    let mut context = GeometryContext::default();
    let params = params(
        &mut context,
        GeometryKind::Regular { face: 5, vertex: 4 },
        Variation::Pure,
    );
    let family = params.family;
    let patch = TilingPatch::new(&params, 2).unwrap();
    let resolver = TransformResolver::new(&params, &patch);

    // Where `to` roughly is, seen from `from`
    let hint = |to: usize, from: usize| {
        let (to, from) = (patch.frame(to).unwrap(), patch.frame(from).unwrap());
        tc0(&(family.invert(from) * to))
    };
    for cell in patch.cells().take(30) {
        for dir in 0..patch.degree(cell) {
            let neighbor = match patch.neighbor(cell, dir) {
                Some(neighbor) => neighbor,
                None => continue,
            };
            let there =
                resolver.relative_matrix(neighbor, cell, &hint(neighbor, cell));
            let back =
                resolver.relative_matrix(cell, neighbor, &hint(cell, neighbor));
            assert!(
                eq_matrix(&(there * back), &Transform::identity(), 1e-6),
                "{} -> {} (direction {})",
                cell,
                neighbor,
                dir
            );
        }
    }
}

#[test]
fn test_closed_sphere() {
    let mut context = GeometryContext::default();
    let params = params(
        &mut context,
        GeometryKind::Regular { face: 5, vertex: 3 },
        Variation::Pure,
    );
    let patch = TilingPatch::new(&params, 10).unwrap();
    assert_eq!(patch.cells().len(), 12);

    // Every cell can be reached, and sits at its patch frame
    let resolver = TransformResolver::new(&params, &patch);
    for cell in patch.cells() {
        let frame = patch.frame(cell).unwrap();
        let m = resolver.relative_matrix(cell, patch.root(), &tc0(frame));
        assert!(eq_matrix(&m, frame, 1e-6), "cell {}", cell);
    }
}

#[test]
fn test_rebase_is_idempotent() {
    let mut context = GeometryContext::default();
    let params = params(
        &mut context,
        GeometryKind::Regular { face: 7, vertex: 3 },
        Variation::Bitruncated,
    );
    let curv = Curvature::Hyperbolic;
    let patch = TilingPatch::new(&params, 4).unwrap();
    let engine = RebaseEngine::new(TransformResolver::new(&params, &patch));
    let mut rng = Pcg64::seed_from_u64(1234);
    for _ in 0..100 {
        let p = curv.xspinpush0(
            rng.gen_range(0.0..2.0 * PI),
            rng.gen_range(0.0..2.0),
        );
        let (q, cell) = engine.rebase(&p, patch.root());
        assert_eq!(engine.rebase(&q, cell), (q, cell));
        // Still the same location
        let frame = patch.frame(cell).unwrap();
        assert_approx_eq!(curv.hdist(&(frame * q), &p), 0.0, 1e-6);
    }
}

#[test]
fn test_product_rebase() {
    let mut context = GeometryContext::default();
    let params = params(
        &mut context,
        GeometryKind::Product {
            face: 4,
            vertex: 4,
            plevel_factor: 1.0,
            twisted: false,
        },
        Variation::Pure,
    );
    // Building the product geometry pulls in the flat one underneath
    let underlying = params.underlying.as_ref().unwrap();
    assert!(context.cache().contains(&underlying.signature));
    assert!(Rc::ptr_eq(context.current().unwrap(), &params));

    let plevel = params.plevel().unwrap();
    let graph = ProductGraph::new(TorusGrid::new(5, 5).unwrap());
    let engine = RebaseEngine::new(TransformResolver::new(&params, &graph));
    let p = product::mscale(&Point::new(0.3, 0.0, 1.0, 0.0), 2.3 * plevel);
    let (q, cell) = engine.rebase(&p, graph.root());
    assert_eq!(cell, graph.cell((0, 0), 2));
    let (level, flat) = product::decompose(Curvature::Euclidean, &q);
    assert_approx_eq!(level, 0.3 * plevel, 1e-9);
    assert_approx_eq!(flat.x / flat.z, 0.3, 1e-9);
    assert_eq!(engine.rebase(&q, cell), (q, cell));
}
