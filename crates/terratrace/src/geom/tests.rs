use super::*;

const EPS: f64 = 1e-12;

#[test]
fn normalize_deg_wraps_into_half_open_range() {
    assert_eq!(normalize_deg(0.0), 0.0);
    assert_eq!(normalize_deg(180.0), 180.0);
    assert_eq!(normalize_deg(-180.0), 180.0);
    assert!((normalize_deg(190.0) + 170.0).abs() < EPS);
    assert!((normalize_deg(-190.0) - 170.0).abs() < EPS);
    assert!((normalize_deg(720.0)).abs() < EPS);
    assert!((normalize_deg(-540.0) - 180.0).abs() < EPS);
}

#[test]
fn direction_is_cw_positive() {
    let d0 = direction(0.0);
    assert!((d0 - Vec2::new(1.0, 0.0)).norm() < EPS);
    // A positive (clockwise) quarter turn points toward -z.
    let d90 = direction(90.0);
    assert!((d90 - Vec2::new(0.0, -1.0)).norm() < 1e-9);
    let dm90 = direction(-90.0);
    assert!((dm90 - Vec2::new(0.0, 1.0)).norm() < 1e-9);
}

#[test]
fn signed_angle_matches_heading_difference() {
    for (from, to) in [(0.0, 90.0), (30.0, -45.0), (170.0, -170.0), (10.0, 10.0)] {
        let got = signed_angle(direction(from), direction(to));
        let want = normalize_deg(to - from);
        assert!(
            (got - want).abs() < 1e-9,
            "from {from} to {to}: got {got}, want {want}"
        );
    }
}

#[test]
fn perps_and_rotation_agree_with_direction() {
    let d = direction(30.0);
    assert!((d.perp_cw() - direction(120.0)).norm() < 1e-9);
    assert!((d.perp_ccw() - direction(-60.0)).norm() < 1e-9);
    let r = 25.0f64;
    let rot = d.rotate(r.to_radians().sin(), r.to_radians().cos());
    assert!((rot - direction(55.0)).norm() < 1e-9);
    assert!((d.rotate_deg(-30.0) - direction(0.0)).norm() < 1e-9);
}

#[test]
fn perp_dot_sign_is_clockwise() {
    // direction(10) lies clockwise of direction(0).
    assert!(direction(0.0).perp_dot(direction(10.0)) > 0.0);
    assert!(direction(0.0).perp_dot(direction(-10.0)) < 0.0);
}

#[test]
fn try_intersect_basic_and_parallel() {
    let (p, t) = try_intersect(
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(2.0, -1.0),
        Vec2::new(0.0, 1.0),
        1e-12,
    )
    .expect("perpendicular lines intersect");
    assert!((p - Vec2::new(2.0, 0.0)).norm() < EPS);
    assert!((t - 2.0).abs() < EPS);

    assert!(try_intersect(
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 5.0),
        Vec2::new(2.0, 2.0),
        1e-9,
    )
    .is_none());
}
