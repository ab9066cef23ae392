use super::*;
use crate::grid::FnField;
use crate::path::{Param, Path, TraceParams};

use std::sync::Arc;

/// Outer grid 50x50: inner 44 plus margin 3 on each side.
fn tracer() -> Tracer {
    Tracer::new(44, 44, 3, 3.0, 5.0)
}

fn straight_params() -> TraceParams {
    TraceParams {
        step_size: 1.0,
        ..TraceParams::default()
    }
}

fn single_root(pos: Vec2, angle: f64, width: f64, length: f64, params: TraceParams) -> Path {
    let mut path = Path::new();
    let root = path.add_root(params, pos, angle, width);
    path.segment_mut(root).length = length;
    path
}

#[test]
fn straight_segment_renders_its_width() {
    // One root at (25, 25), heading +x, width 4, length 10.
    let mut tracer = tracer();
    let path = single_root(Vec2::new(25.0, 25.0), 0.0, 4.0, 10.0, straight_params());
    assert!(tracer.trace_once(&path));
    let g = tracer.grids();
    for x in 25..=35usize {
        assert!(
            (*g.main.get(x, 25) - 4.0).abs() < 1e-9,
            "main[{x},25] = {}",
            g.main.get(x, 25)
        );
        assert!(g.side.get(x, 25).abs() < 1e-9);
    }
    // Distance grows monotonically with perpendicular offset.
    for x in 27..=33usize {
        let mut prev = f64::NEG_INFINITY;
        for dz in 0..=7usize {
            let d = *g.distance.get(x, 25 + dz);
            assert!(d >= prev - 1e-9, "distance not monotone at ({x}, {})", 25 + dz);
            prev = d;
        }
    }
    // Centerline distance is negative (inside the body) and owned.
    assert!(*g.distance.get(30, 25) < 0.0);
    assert!(g.task.get(30, 25).is_some());
}

#[test]
fn distance_cells_below_zero_carry_main() {
    let mut tracer = tracer();
    let path = single_root(Vec2::new(25.0, 25.0), 0.0, 4.0, 10.0, straight_params());
    assert!(tracer.trace_once(&path));
    let g = tracer.grids();
    for x in 0..g.main.size_x() {
        for z in 0..g.main.size_z() {
            let d = *g.distance.get(x, z);
            if d < 0.0 {
                assert!(*g.main.get(x, z) > 0.0, "({x},{z}): d={d} but main=0");
            }
        }
    }
}

#[test]
fn tracing_twice_is_idempotent() {
    let mut tracer = tracer();
    let path = single_root(Vec2::new(25.0, 25.0), 0.0, 4.0, 10.0, straight_params());
    assert!(tracer.trace_once(&path));
    let first = tracer.grids().clone();
    assert!(tracer.trace_once(&path));
    let second = tracer.grids();
    assert_eq!(first.main, second.main);
    assert_eq!(first.side, second.side);
    assert_eq!(first.value, second.value);
    assert_eq!(first.offset, second.offset);
    assert_eq!(first.distance, second.distance);
    assert_eq!(first.task, second.task);
}

#[test]
fn fixed_swerve_arc_turns_the_advertised_amount() {
    // swerve = +1 against a 5 deg/unit absolute cap over 20 units: 100 deg.
    let mut tracer = tracer();
    let params = TraceParams {
        swerve: Some(Param::Const(1.0)),
        angle_limit_abs: 5.0,
        ..straight_params()
    };
    let path = single_root(Vec2::new(25.0, 25.0), 0.0, 4.0, 20.0, params);
    let attempt = tracer.try_trace(&path, None, false);
    assert!(attempt.collisions.is_empty());
    let result = attempt.tasks[0].result.as_ref().unwrap();
    assert!(!result.trace_end, "arc fits inside the grid");
    assert!(
        (result.final_frame.angle - 100.0).abs() < 1e-6,
        "total turn {}",
        result.final_frame.angle
    );
    // Clockwise turn curls toward -z.
    assert!(result.final_frame.pos.y < 25.0);
}

#[test]
fn zero_length_segment_writes_nothing() {
    let mut tracer = tracer();
    let path = single_root(Vec2::new(25.0, 25.0), 0.0, 4.0, 0.0, straight_params());
    assert!(tracer.trace_once(&path));
    let g = tracer.grids();
    for x in 0..g.main.size_x() {
        for z in 0..g.main.size_z() {
            assert_eq!(*g.main.get(x, z), 0.0);
            assert_eq!(*g.distance.get(x, z), 5.0);
            assert!(g.task.get(x, z).is_none());
        }
    }
}

#[test]
fn sub_unit_extent_ends_immediately() {
    let mut tracer = tracer();
    let path = single_root(Vec2::new(25.0, 25.0), 0.0, 0.8, 10.0, straight_params());
    let attempt = tracer.try_trace(&path, None, false);
    let result = attempt.tasks[0].result.as_ref().unwrap();
    assert!(result.trace_end);
    assert!(result.final_frame.dist <= 1.0 + 1e-9);
}

#[test]
fn leaving_the_outer_rectangle_ends_the_segment() {
    let mut tracer = tracer();
    let path = single_root(Vec2::new(45.0, 25.0), 0.0, 4.0, 40.0, straight_params());
    let attempt = tracer.try_trace(&path, None, false);
    let result = attempt.tasks[0].result.as_ref().unwrap();
    assert!(result.ever_in_bounds);
    assert!(result.trace_end);
    assert!(
        result.final_frame.dist < 10.0,
        "ended at {} instead of the boundary",
        result.final_frame.dist
    );
}

#[test]
fn cost_gradient_steers_around_an_obstacle() {
    // High cost in a band ahead; the root starts below it and must slide
    // past without ever entering the band's core.
    let mut tracer = tracer();
    let cost: Arc<dyn crate::grid::GridSampler> = Arc::new(FnField(|x: f64, z: f64| {
        if x > 25.0 && (z - 25.0).abs() < 3.0 {
            100.0
        } else {
            0.0
        }
    }));
    let params = TraceParams {
        cost: Some(Param::FromGrid(cost, 1.0)),
        angle_limit_abs: 6.0,
        ..straight_params()
    };
    let path = single_root(Vec2::new(5.0, 22.0), 0.0, 2.0, 40.0, params);
    let attempt = tracer.try_trace(&path, None, false);
    assert!(attempt.collisions.is_empty());
    let result = attempt.tasks[0].result.as_ref().unwrap();
    // The trace keeps moving forward, deflects downward and clears the core.
    assert!(result.final_frame.pos.x > 30.0, "stalled at {:?}", result.final_frame.pos);
    assert!(result.final_frame.pos.y < 22.0);
    let g = tracer.grids();
    for x in 30..=40usize {
        assert_eq!(*g.main.get(x, 25), 0.0, "centerline entered the core at x={x}");
    }
}

#[test]
fn merge_base_frame_averages_parents() {
    let mut fa = TraceFrame::at(Vec2::new(10.0, 24.0), 0.0, 2.0, 20.0);
    fa.value = 10.0;
    fa.offset = 1.0;
    let mut fb = TraceFrame::at(Vec2::new(12.0, 26.0), 0.0, 4.0, 20.0);
    fb.value = 14.0;
    fb.offset = -1.0;
    let m = merge_base_frame([fa, fb].into_iter());
    assert!((m.width - 3.0).abs() < 1e-12);
    assert!((m.value - 12.0).abs() < 1e-12);
    assert!((m.normal - Vec2::new(1.0, 0.0)).norm() < 1e-12);
    // Pulled back to the latest-arriving parent's projection.
    assert!(m.pos.x <= 10.0 + 1e-12);
    assert!((m.speed - 1.0).abs() < 1e-12);
}

#[test]
fn split_branches_inherit_shift_and_width() {
    let mut tracer = tracer();
    let mut path = Path::new();
    let root = path.add_root(straight_params(), Vec2::new(10.0, 25.0), 0.0, 4.0);
    path.segment_mut(root).length = 8.0;
    for shift in [-0.5, 0.5] {
        let b = path.attach_new(root);
        let seg = path.segment_mut(b);
        seg.rel_shift = shift;
        seg.rel_width = 0.5;
        seg.length = 6.0;
    }
    let attempt = tracer.try_trace(&path, None, false);
    assert!(attempt.collisions.is_empty());
    assert_eq!(attempt.tasks.len(), 3);
    // Branch tasks start at the split, laterally offset in shift order, at
    // half the parent width.
    let b1 = &attempt.tasks[1];
    let b2 = &attempt.tasks[2];
    assert!((b1.base_frame.width - 2.0).abs() < 1e-9);
    assert!((b2.base_frame.width - 2.0).abs() < 1e-9);
    let zs: Vec<f64> = vec![b1.base_frame.pos.y, b2.base_frame.pos.y];
    assert!((zs[0] - zs[1]).abs() > 3.0, "branches separated laterally: {zs:?}");
    assert!(b1.fork_width > 0.0 && b2.fork_width > 0.0);
}

#[test]
fn targeted_segment_follows_the_pathfinder() {
    let mut tracer = tracer();
    let params = TraceParams {
        target: Some(Vec2::new(35.0, 30.0)),
        ..straight_params()
    };
    let path = single_root(Vec2::new(10.0, 20.0), 0.0, 2.0, 30.0, params);
    assert!(tracer.trace_once(&path));
    // The centerline passes through the target cell.
    assert!(
        *tracer.grids().main.get(35, 30) > 0.0,
        "corridor never reached the target"
    );
}

#[test]
fn end_condition_mask_stops_the_segment() {
    let mut tracer = tracer();
    let mask: Arc<dyn crate::grid::GridSampler> = Arc::new(FnField(|x: f64, _z: f64| {
        if x > 30.0 {
            0.0
        } else {
            10.0
        }
    }));
    let params = TraceParams {
        end_condition: Some(mask),
        ..straight_params()
    };
    let path = single_root(Vec2::new(10.0, 25.0), 0.0, 4.0, 35.0, params);
    let attempt = tracer.try_trace(&path, None, false);
    let result = attempt.tasks[0].result.as_ref().unwrap();
    assert!(result.trace_end, "width mask must end the segment");
    assert!(
        result.final_frame.dist < 25.0,
        "ended at {}",
        result.final_frame.dist
    );
}

#[test]
fn ever_in_bounds_is_monotone_along_a_chain() {
    let mut tracer = tracer();
    let mut path = Path::new();
    let root = path.add_root(straight_params(), Vec2::new(20.0, 25.0), 0.0, 3.0);
    path.segment_mut(root).length = 5.0;
    let next = path.attach_new(root);
    path.segment_mut(next).length = 5.0;
    let attempt = tracer.try_trace(&path, None, false);
    let r0 = attempt.tasks[0].result.as_ref().unwrap();
    let r1 = attempt.tasks[1].result.as_ref().unwrap();
    assert!(r0.ever_in_bounds);
    assert!(r1.ever_in_bounds, "in-bounds state must persist down the chain");
}
