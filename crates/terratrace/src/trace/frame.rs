//! Immutable pose values and the line/arc advance used by the integrator.

use crate::geom::{direction, normalize_deg, Vec2, Vec2Ext};

/// A pose along a segment.
///
/// Invariant: `normal == direction(angle)`, i.e. `(cos(-angle), sin(-angle))`
/// with clockwise-positive degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraceFrame {
    /// Absolute position in outer-grid coordinates.
    pub pos: Vec2,
    /// Unit heading.
    pub normal: Vec2,
    /// Heading in degrees, clockwise-positive.
    pub angle: f64,
    pub width: f64,
    pub speed: f64,
    pub value: f64,
    pub offset: f64,
    pub density: f64,
    /// Distance from the segment tail (negative inside the tail margin).
    pub dist: f64,
    /// Extent multiplier on the counter-clockwise side.
    pub em_left: f64,
    /// Extent multiplier on the clockwise side.
    pub em_right: f64,
}

impl TraceFrame {
    pub fn at(pos: Vec2, angle: f64, width: f64, dist: f64) -> Self {
        let angle = normalize_deg(angle);
        Self {
            pos,
            normal: direction(angle),
            angle,
            width,
            speed: 1.0,
            value: 0.0,
            offset: 0.0,
            density: 1.0,
            dist,
            em_left: 1.0,
            em_right: 1.0,
        }
    }

    #[inline]
    pub fn perp_cw(&self) -> Vec2 {
        self.normal.perp_cw()
    }

    #[inline]
    pub fn perp_ccw(&self) -> Vec2 {
        self.normal.perp_ccw()
    }

    /// Half-width on the counter-clockwise side.
    #[inline]
    pub fn extent_left(&self) -> f64 {
        self.width * 0.5 * self.em_left
    }

    /// Half-width on the clockwise side.
    #[inline]
    pub fn extent_right(&self) -> f64 {
        self.width * 0.5 * self.em_right
    }

    /// Whether either perpendicular edge point lies inside the rectangle
    /// `[min, max]` grown by `extra`.
    pub fn possibly_in_bounds(&self, min: Vec2, max: Vec2, extra: f64) -> bool {
        let l = self.pos + self.perp_ccw() * (self.extent_left() + extra);
        let r = self.pos + self.perp_cw() * (self.extent_right() + extra);
        point_in(l, min, max, extra) || point_in(r, min, max, extra)
    }

    /// Whether either perpendicular edge point lies outside the rectangle
    /// `[min, max]` grown by `extra`.
    pub fn possibly_out_of_bounds(&self, min: Vec2, max: Vec2, extra: f64) -> bool {
        let l = self.pos + self.perp_ccw() * (self.extent_left() + extra);
        let r = self.pos + self.perp_cw() * (self.extent_right() + extra);
        !point_in(l, min, max, extra) || !point_in(r, min, max, extra)
    }

    /// Advance the pose by `dist_delta` while turning `angle_delta` degrees.
    ///
    /// When `radial` and the turn is nonzero, the step follows a circular arc
    /// and the pivot (center, signed lateral offset) is returned for the
    /// rasterizer; otherwise the step is a straight chord.
    pub fn advance(
        &self,
        losses: &AdvanceLosses,
        dist_delta: f64,
        angle_delta: f64,
        extra_value: f64,
        extra_offset: f64,
        radial: bool,
    ) -> Advance {
        let angle = normalize_deg(self.angle + angle_delta);
        let normal = direction(angle);
        let mut pivot = None;
        let pos = if radial && angle_delta != 0.0 {
            let pivot_offset = 180.0 * dist_delta / (std::f64::consts::PI * -angle_delta);
            let pivot_point = self.pos + self.perp_ccw() * pivot_offset;
            pivot = Some(Pivot {
                point: pivot_point,
                offset: pivot_offset,
            });
            pivot_point - normal.perp_ccw() * pivot_offset
        } else {
            self.pos + self.normal * dist_delta
        };
        let speed_gain = if self.dist >= 0.0 {
            self.speed * losses.speed_mul
        } else {
            self.speed
        };
        let frame = TraceFrame {
            pos,
            normal,
            angle,
            width: (self.width - losses.width_loss * dist_delta).max(0.0),
            speed: (self.speed - losses.speed_loss * dist_delta).max(0.0),
            value: self.value + dist_delta * speed_gain + extra_value,
            offset: self.offset + extra_offset,
            density: (self.density - losses.density_loss * dist_delta).max(0.0),
            dist: self.dist + dist_delta,
            em_left: self.em_left,
            em_right: self.em_right,
        };
        Advance { frame, pivot }
    }

    /// Position-only advance, used for pattern sampling.
    pub fn advance_pos(&self, dist_delta: f64, angle_delta: f64, radial: bool) -> Vec2 {
        if radial && angle_delta != 0.0 {
            let pivot_offset = 180.0 * dist_delta / (std::f64::consts::PI * -angle_delta);
            let pivot_point = self.pos + self.perp_ccw() * pivot_offset;
            let normal = direction(normalize_deg(self.angle + angle_delta));
            pivot_point - normal.perp_ccw() * pivot_offset
        } else {
            self.pos + self.normal * dist_delta
        }
    }
}

#[inline]
fn point_in(p: Vec2, min: Vec2, max: Vec2, extra: f64) -> bool {
    p.x >= min.x - extra && p.x <= max.x + extra && p.y >= min.y - extra && p.y <= max.y + extra
}

/// Attenuations and multipliers applied across one advance.
#[derive(Clone, Copy, Debug)]
pub struct AdvanceLosses {
    pub width_loss: f64,
    pub speed_loss: f64,
    pub density_loss: f64,
    /// Speed multiplier from the `speed` parameter function (1 in margins).
    pub speed_mul: f64,
}

impl Default for AdvanceLosses {
    fn default() -> Self {
        Self {
            width_loss: 0.0,
            speed_loss: 0.0,
            density_loss: 0.0,
            speed_mul: 1.0,
        }
    }
}

/// Result of an advance: the new frame, plus the arc pivot when radial.
#[derive(Clone, Copy, Debug)]
pub struct Advance {
    pub frame: TraceFrame,
    pub pivot: Option<Pivot>,
}

/// Center and signed lateral offset of a radial step.
///
/// `offset > 0` puts the pivot on the counter-clockwise side of the heading.
#[derive(Clone, Copy, Debug)]
pub struct Pivot {
    pub point: Vec2,
    pub offset: f64,
}
