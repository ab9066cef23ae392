//! Vector helpers shared by the frame algebra, rasterizer and pathfinder.

use super::Vec2;

/// Extension ops on [`Vec2`] under the clockwise-positive convention.
pub trait Vec2Ext {
    /// Rotate clockwise by the angle whose sine/cosine are given.
    fn rotate(self, sin: f64, cos: f64) -> Vec2;
    /// Rotate clockwise by an angle in degrees.
    fn rotate_deg(self, deg: f64) -> Vec2;
    /// 90 deg clockwise perpendicular.
    fn perp_cw(self) -> Vec2;
    /// 90 deg counter-clockwise perpendicular.
    fn perp_ccw(self) -> Vec2;
    /// Clockwise-positive cross product: `dot(perp_cw(self), other)`.
    fn perp_dot(self, other: Vec2) -> f64;
}

impl Vec2Ext for Vec2 {
    #[inline]
    fn rotate(self, sin: f64, cos: f64) -> Vec2 {
        Vec2::new(self.x * cos + self.y * sin, self.y * cos - self.x * sin)
    }

    #[inline]
    fn rotate_deg(self, deg: f64) -> Vec2 {
        let r = deg.to_radians();
        self.rotate(r.sin(), r.cos())
    }

    #[inline]
    fn perp_cw(self) -> Vec2 {
        Vec2::new(self.y, -self.x)
    }

    #[inline]
    fn perp_ccw(self) -> Vec2 {
        Vec2::new(-self.y, self.x)
    }

    #[inline]
    fn perp_dot(self, other: Vec2) -> f64 {
        self.y * other.x - self.x * other.y
    }
}

/// Intersect the lines `p1 + t*d1` and `p2 + s*d2`.
///
/// Returns the intersection point and the scalar `t` along `d1`, or `None`
/// when the directions are parallel within `eps`.
pub fn try_intersect(p1: Vec2, d1: Vec2, p2: Vec2, d2: Vec2, eps: f64) -> Option<(Vec2, f64)> {
    let denom = d1.perp_dot(d2);
    if !denom.is_finite() || denom.abs() < eps {
        return None;
    }
    let t = (p2 - p1).perp_dot(d2) / denom;
    Some((p1 + d1 * t, t))
}
