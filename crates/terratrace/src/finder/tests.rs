use super::*;
use crate::config::FinderCfg;
use crate::geom::Vec2;

struct TestWorld<F: Fn(Vec2) -> f64> {
    cost: F,
    limit: f64,
    bound: f64,
}

impl<F: Fn(Vec2) -> f64> FinderWorld for TestWorld<F> {
    fn cost(&self, pos: Vec2, _dist: f64) -> f64 {
        (self.cost)(pos)
    }

    fn angle_limit(&self, _dist: f64) -> AngleLimit {
        AngleLimit {
            cw: self.limit,
            ccw: self.limit,
        }
    }

    fn turn_bias(&self, _pos: Vec2, _dist: f64) -> f64 {
        0.0
    }

    fn in_bounds(&self, pos: Vec2) -> bool {
        pos.x.abs() <= self.bound && pos.y.abs() <= self.bound
    }
}

fn request(target: Vec2) -> FinderRequest {
    FinderRequest {
        start: Vec2::new(0.0, 0.0),
        start_dir: Vec2::new(1.0, 0.0),
        target,
        step: 1.0,
        h_weight: 1.0,
    }
}

#[test]
fn kernel_tables() {
    let k = ArcKernel::new(8, 3);
    assert_eq!(k.arc_count(), 8);
    assert_eq!(k.max_split_idx(), 2);
    assert_eq!(k.possible_dir_count(), 24);
    // angle_data[i] = 180 * (i + 1) / (split * arcs)
    assert!((k.angle(0) - 7.5).abs() < 1e-12);
    assert!((k.angle(7) - 60.0).abs() < 1e-12);
    assert!((k.split_fraction(2) - 1.0).abs() < 1e-12);
    let (s, c) = k.sin_cos(0, 2);
    assert!((s - 7.5f64.to_radians().sin()).abs() < 1e-12);
    assert!((c - 7.5f64.to_radians().cos()).abs() < 1e-12);
}

#[test]
fn finds_straight_line() {
    let kernel = ArcKernel::new(8, 3);
    let world = TestWorld {
        cost: |_| 0.0,
        limit: 30.0,
        bound: 100.0,
    };
    let cfg = FinderCfg::default();
    let steps = find_arc_path(&kernel, &world, &cfg, &request(Vec2::new(10.0, 0.0)))
        .expect("open field must be solvable");
    let end = steps.last().unwrap();
    assert!((end.pos - Vec2::new(10.0, 0.0)).norm() < 1e-6);
    let total: f64 = steps.iter().map(|s| s.advance).sum();
    assert!((total - 10.0).abs() < 0.5, "length {total}");
    for s in &steps {
        assert!(s.turn.abs() < 1e-6, "straight path should not turn");
    }
}

#[test]
fn detours_around_an_obstacle() {
    let kernel = ArcKernel::new(8, 3);
    let blocked = |p: Vec2| p.x >= 4.0 && p.x <= 6.0 && p.y.abs() < 3.0;
    let world = TestWorld {
        cost: move |p: Vec2| if blocked(p) { 1000.0 } else { 0.0 },
        limit: 45.0,
        bound: 100.0,
    };
    let cfg = FinderCfg::default();
    let steps = find_arc_path(&kernel, &world, &cfg, &request(Vec2::new(12.0, 0.0)))
        .expect("detour exists");
    let end = steps.last().unwrap();
    assert!((end.pos - Vec2::new(12.0, 0.0)).norm() < 1e-6);
    for s in &steps {
        assert!(!blocked(s.pos), "pose {:?} inside the obstacle", s.pos);
    }
    // The detour is longer than the straight chord.
    let total: f64 = steps.iter().map(|s| s.advance).sum();
    assert!(total > 12.0);
}

#[test]
fn walled_target_fails() {
    let kernel = ArcKernel::new(8, 3);
    let world = TestWorld {
        cost: |p: Vec2| if p.x > 2.0 { 1000.0 } else { 0.0 },
        limit: 45.0,
        bound: 20.0,
    };
    let cfg = FinderCfg::default();
    let res = find_arc_path(&kernel, &world, &cfg, &request(Vec2::new(10.0, 0.0)));
    assert!(res.is_err());
}

#[test]
fn result_starts_at_the_start_pose() {
    let kernel = ArcKernel::new(8, 3);
    let world = TestWorld {
        cost: |_| 0.0,
        limit: 30.0,
        bound: 100.0,
    };
    let cfg = FinderCfg::default();
    let steps = find_arc_path(&kernel, &world, &cfg, &request(Vec2::new(6.0, 0.0))).unwrap();
    assert!((steps[0].pos - Vec2::new(0.0, 0.0)).norm() < 1e-12);
    assert_eq!(steps[0].advance, 0.0);
}
