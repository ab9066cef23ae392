use crate::geom::Vec2;
use crate::path::{Path, TraceParams};
use crate::trace::Tracer;

/// Outer grid 50x50: inner 44 plus margin 3 on each side.
fn tracer() -> Tracer {
    Tracer::new(44, 44, 3, 3.0, 5.0)
}

fn base_params() -> TraceParams {
    TraceParams {
        step_size: 1.0,
        ..TraceParams::default()
    }
}

/// Two opposing roots along z = 25; steerable sides get repaired with
/// diversion points and the trace converges.
#[test]
fn head_on_collision_is_diverted() {
    let mut tracer = tracer();
    let params = TraceParams {
        prevent_merge: true,
        arc_retrace_factor: 1.0,
        arc_retrace_range: 10.0,
        ..base_params()
    };
    let mut path = Path::new();
    let a = path.add_root(params.clone(), Vec2::new(10.0, 25.0), 0.0, 4.0);
    path.segment_mut(a).length = 30.0;
    let b = path.add_root(params, Vec2::new(40.0, 25.0), 180.0, 4.0);
    path.segment_mut(b).length = 30.0;

    assert!(tracer.trace(&mut path, 50), "repair loop must converge");
    assert!(
        path.segments()
            .any(|s| !s.trace_params.diversion_points.is_empty()),
        "at least one diversion point inserted"
    );
}

/// No merge allowed, no diversion budget: the weaker side is stubbed back
/// from the collision and fades to zero width; the other side completes.
#[test]
fn stub_fallback_shrinks_one_side() {
    let mut tracer = tracer();
    let params = TraceParams {
        prevent_merge: true,
        ..base_params()
    };
    let mut path = Path::new();
    let a = path.add_root(params.clone(), Vec2::new(5.0, 25.0), 0.0, 2.0);
    path.segment_mut(a).length = 25.0;
    let b = path.add_root(params, Vec2::new(45.0, 25.0), 180.0, 2.0);
    path.segment_mut(b).length = 25.0;

    assert!(tracer.trace(&mut path, 50));
    // The active (second) side was cut back by stub_backtrack_length from
    // the collision distance and fades out toward its head.
    let sb = path.segment(b);
    assert!(
        sb.length < 25.0,
        "stubbed side shortened, got {}",
        sb.length
    );
    assert!(sb.trace_params.width_loss > 0.0);
    // Width reaches zero at (or before) the stub head.
    assert!(sb.trace_params.width_loss * sb.length >= 2.0 - 1e-9);
    // The survivor is untouched.
    assert_eq!(path.segment(a).length, 25.0);
    assert_eq!(path.segment(a).trace_params.width_loss, 0.0);
    // The survivor still rendered its corridor.
    assert!(*tracer.grids().main.get(10, 25) > 0.0);
}

/// A split whose arms angle back toward each other: they cross, collide
/// and are merged into a single continuation with positive ducts.
#[test]
fn converging_split_is_merged() {
    let mut tracer = tracer();
    let mut path = Path::new();
    let root = path.add_root(base_params(), Vec2::new(8.0, 25.0), 0.0, 4.0);
    path.segment_mut(root).length = 4.0;
    for (shift, angle) in [(-0.25, 4.0), (0.25, -4.0)] {
        let id = path.attach_new(root);
        let seg = path.segment_mut(id);
        seg.rel_shift = shift;
        seg.rel_angle = angle;
        seg.rel_width = 0.5;
        seg.length = 30.0;
    }

    assert!(tracer.trace(&mut path, 50), "merge repair must converge");
    let merged: Vec<usize> = path
        .segments()
        .filter(|s| s.parents().len() >= 2)
        .map(|s| s.id())
        .collect();
    assert!(!merged.is_empty(), "a merged continuation segment exists");
    assert!(path.has_descendant_merge(root));
    // Both original arms were truncated before the collision point.
    let arms: Vec<&crate::path::Segment> = path
        .segments()
        .filter(|s| s.parents().len() == 1 && s.parents()[0] == root)
        .collect();
    assert_eq!(arms.len(), 2);
    for arm in arms {
        assert!(arm.length < 30.0, "arm {} still full length", arm.id());
    }
}

/// `result_unstable` upstream of a side vetoes merging even when the
/// geometry would allow it; the repair falls through to another strategy.
#[test]
fn result_unstable_prevents_merge() {
    let mut tracer = tracer();
    let mut path = Path::new();
    let root = path.add_root(base_params(), Vec2::new(8.0, 25.0), 0.0, 4.0);
    path.segment_mut(root).length = 4.0;
    path.segment_mut(root).trace_params.result_unstable = true;
    for (shift, angle) in [(-0.25, 4.0), (0.25, -4.0)] {
        let id = path.attach_new(root);
        let seg = path.segment_mut(id);
        seg.rel_shift = shift;
        seg.rel_angle = angle;
        seg.rel_width = 0.5;
        seg.length = 30.0;
        seg.trace_params.result_unstable = true;
    }
    assert!(tracer.trace(&mut path, 50));
    assert!(
        !path.segments().any(|s| s.parents().len() >= 2),
        "no merge may be created downstream of result_unstable"
    );
}

mod picking {
    use super::*;
    use crate::config::{HandlerCfg, TraceCfg};
    use crate::repair::CollisionHandler;
    use crate::trace::{TraceCollision, TraceFrame, TraceTask};

    fn collision(task_a: u32, task_b: u32, seg_a: usize, seg_b: usize, dist_b: f64) -> TraceCollision {
        let f = TraceFrame::at(Vec2::new(20.0, 20.0), 0.0, 2.0, 5.0);
        TraceCollision {
            task_a,
            task_b,
            segment_a: seg_a,
            segment_b: seg_b,
            position: Vec2::new(20.0, 20.0),
            progress_a: 0.0,
            progress_b: 0.0,
            shift_a: 0.0,
            shift_b: 0.0,
            dist_a: 5.0,
            dist_b,
            frames_a: vec![f],
            frames_b: Some(vec![f]),
            cyclic: false,
            has_merge_a: false,
            has_merge_b: false,
        }
    }

    #[test]
    fn upstream_passive_wins() {
        // root -> mid -> leaf; a collision into the root precedes one into
        // the leaf.
        let mut path = Path::new();
        let root = path.add_root(TraceParams::default(), Vec2::zeros(), 0.0, 2.0);
        path.segment_mut(root).length = 10.0;
        let mid = path.attach_new(root);
        path.segment_mut(mid).length = 10.0;
        let leaf = path.attach_new(mid);
        path.segment_mut(leaf).length = 10.0;
        let other = path.add_root(TraceParams::default(), Vec2::new(5.0, 5.0), 0.0, 2.0);
        path.segment_mut(other).length = 10.0;

        let mut tasks: Vec<TraceTask> = Vec::new();
        for (seg, dfr) in [(root, 0.0), (mid, 10.0), (leaf, 20.0), (other, 0.0)] {
            let mut t = TraceTask::new(seg, TraceFrame::at(Vec2::zeros(), 0.0, 2.0, 0.0));
            t.dist_from_root = dfr;
            tasks.push(t);
        }

        let into_leaf = collision(3, 2, other, leaf, 4.0);
        let into_root = collision(3, 0, other, root, 8.0);
        let handler = CollisionHandler::new(HandlerCfg::default());
        let tcfg = TraceCfg::default();
        let grids = super::tracer();
        // Both orders pick the upstream passive.
        for collisions in [
            vec![into_leaf.clone(), into_root.clone()],
            vec![into_root.clone(), into_leaf.clone()],
        ] {
            let mut p = path.clone();
            let repair = handler.handle_best_collision(
                &mut p,
                &tasks,
                grids.grids(),
                &tcfg,
                collisions,
            );
            assert!(repair.is_some());
            // The repair touched the arm colliding into the root: the
            // `other` root was altered (stub/divert family), while the leaf
            // side stayed full length.
            assert_eq!(p.segment(leaf).length, 10.0);
        }
    }
}
