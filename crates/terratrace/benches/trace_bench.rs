use criterion::{criterion_group, criterion_main, Criterion};

use terratrace::path::{Path, TraceParams};
use terratrace::trace::Tracer;
use terratrace::Vec2;

fn straight_path() -> Path {
    let mut path = Path::new();
    let root = path.add_root(
        TraceParams::default(),
        Vec2::new(25.0, 100.0),
        0.0,
        6.0,
    );
    path.segment_mut(root).length = 150.0;
    path
}

fn split_path() -> Path {
    let mut path = Path::new();
    let root = path.add_root(TraceParams::default(), Vec2::new(20.0, 100.0), 0.0, 8.0);
    path.segment_mut(root).length = 40.0;
    for (shift, angle) in [(-0.5, -6.0), (0.5, 6.0)] {
        let id = path.attach_new(root);
        let seg = path.segment_mut(id);
        seg.rel_shift = shift;
        seg.rel_angle = angle;
        seg.rel_width = 0.5;
        seg.length = 80.0;
    }
    path
}

fn bench_trace(c: &mut Criterion) {
    c.bench_function("trace_straight_200", |b| {
        let path = straight_path();
        let mut tracer = Tracer::new(194, 194, 3, 3.0, 5.0);
        b.iter(|| {
            assert!(tracer.trace_once(&path));
        });
    });
    c.bench_function("trace_split_200", |b| {
        let path = split_path();
        let mut tracer = Tracer::new(194, 194, 3, 3.0, 5.0);
        b.iter(|| {
            assert!(tracer.trace_once(&path));
        });
    });
}

criterion_group!(benches, bench_trace);
criterion_main!(benches);
