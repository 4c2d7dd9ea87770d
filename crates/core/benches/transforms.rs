use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hypertile::{
    graph::TilingPatch,
    raycast::{settings_for, MapBuilder, OpenSpace, WallLayout, GMS_LIMIT},
    Curvature, GeometryConfig, GeometryContext, GeometryKind, RebaseEngine,
    TransformResolver, Variation,
};

fn criterion_benchmark(c: &mut Criterion) {
    let mut context = GeometryContext::default();
    let config = GeometryConfig {
        geometry: GeometryKind::Regular { face: 7, vertex: 3 },
        variation: Variation::Bitruncated,
        show_3d: true,
        ..Default::default()
    };
    let params = context.set_current(&config).unwrap();
    let patch = TilingPatch::new(&params, 4).unwrap();
    let curv = Curvature::Hyperbolic;

    let mut group = c.benchmark_group("transforms");
    group.bench_function("rebase", |b| {
        let engine = RebaseEngine::new(TransformResolver::new(&params, &patch));
        let p = curv.xspinpush0(0.7, 2.5);
        b.iter(|| engine.rebase(black_box(&p), 0))
    });
    group.bench_function("relative matrix", |b| {
        let resolver = TransformResolver::new(&params, &patch);
        let last = patch.cells().end - 1;
        let hint = curv.xpush0(2.0);
        b.iter(|| resolver.relative_matrix(black_box(last), 0, &hint))
    });
    group.finish();

    let mut group = c.benchmark_group("raycast");
    group.sample_size(10);
    let resolver = TransformResolver::new(&params, &patch);
    let layout = WallLayout::new(&params, false).unwrap();
    let settings = settings_for(&config.raycast, &params);
    group.bench_function("map build", |b| {
        let builder =
            MapBuilder::new(&resolver, &layout, &OpenSpace, settings.max_cells);
        b.iter(|| builder.build_with_growth(black_box(0), GMS_LIMIT))
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
