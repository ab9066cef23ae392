//! Degree angles, clockwise-positive.

use super::{Vec2, Vec2Ext};

/// Map an angle to `(-180, 180]`.
#[inline]
pub fn normalize_deg(deg: f64) -> f64 {
    let mut a = deg % 360.0;
    if a <= -180.0 {
        a += 360.0;
    } else if a > 180.0 {
        a -= 360.0;
    }
    a
}

/// Unit vector of a heading: `(cos(-a), sin(-a))`.
#[inline]
pub fn direction(deg: f64) -> Vec2 {
    let r = (-deg).to_radians();
    Vec2::new(r.cos(), r.sin())
}

/// Signed angle from `a` to `b` in degrees, clockwise-positive.
///
/// `signed_angle(direction(x), direction(y)) == normalize_deg(y - x)`.
#[inline]
pub fn signed_angle(a: Vec2, b: Vec2) -> f64 {
    a.perp_dot(b).atan2(a.dot(&b)).to_degrees()
}

