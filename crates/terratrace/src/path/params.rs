//! Per-segment trace parameters and the parameter-function abstraction.

use std::fmt;
use std::sync::Arc;

use crate::geom::Vec2;
use crate::grid::{CurveSampler, GridSampler};

/// Inputs to a parameter function at one pose.
#[derive(Clone, Copy, Debug)]
pub struct ParamArgs {
    /// Absolute position in outer-grid coordinates.
    pub pos: Vec2,
    /// Distance from the segment tail.
    pub dist: f64,
    /// Local stability coefficient in `[0, 1]`.
    pub stability: f64,
}

/// Caller-registered parameter function.
///
/// Equality between two custom parameters is pointer identity on the `Arc`;
/// the tracer only needs "same parameters" detection, not deep comparison.
pub trait CustomParam: fmt::Debug + Send + Sync {
    fn eval(&self, args: &ParamArgs) -> f64;
}

/// A lazy per-pose scalar parameter.
///
/// A sealed tagged variant set plus one extension point (`Custom`), rather
/// than an open trait hierarchy: the core only ever constructs `Const` and
/// `FromGrid`, and value equality must be decidable to detect in-place
/// segment extension.
#[derive(Clone, Debug)]
pub enum Param {
    Const(f64),
    /// Grid sample at the pose, times a scale factor.
    FromGrid(Arc<dyn GridSampler>, f64),
    /// Curve sample at the distance from the segment tail, times a scale.
    FromCurve(Arc<dyn CurveSampler>, f64),
    Custom(Arc<dyn CustomParam>),
}

impl Param {
    pub fn eval(&self, args: &ParamArgs) -> f64 {
        match self {
            Param::Const(v) => *v,
            Param::FromGrid(g, scale) => g.value_at(args.pos.x, args.pos.y) * scale,
            Param::FromCurve(c, scale) => c.value_at(args.dist) * scale,
            Param::Custom(f) => f.eval(args),
        }
    }
}

impl PartialEq for Param {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Param::Const(a), Param::Const(b)) => a == b,
            (Param::FromGrid(a, sa), Param::FromGrid(b, sb)) => Arc::ptr_eq(a, b) && sa == sb,
            (Param::FromCurve(a, sa), Param::FromCurve(b, sb)) => Arc::ptr_eq(a, b) && sa == sb,
            (Param::Custom(a), Param::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A value/offset delta distributed across an integer number of integration
/// steps spanning a linear run of segments.
///
/// Weights are triangular with `steps_padding` zero-weight steps at each end
/// of the run; the distributed per-step deltas sum exactly to `value_delta`
/// and `offset_delta`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothDelta {
    pub value_delta: f64,
    pub offset_delta: f64,
    /// Steps across the whole run.
    pub steps_total: u32,
    /// Offset of the carrying segment's first step within the run.
    pub steps_start: u32,
    /// Flat zero-weight steps at each end.
    pub steps_padding: u32,
}

impl SmoothDelta {
    fn weight(&self, step: u32) -> f64 {
        if self.steps_total == 0 {
            return 0.0;
        }
        let pad = self.steps_padding as f64;
        let total = self.steps_total as f64;
        let k = step as f64 + 0.5;
        if k < pad || k > total - pad {
            return 0.0;
        }
        let mid = total / 2.0;
        let half = (mid - pad).max(f64::MIN_POSITIVE);
        1.0 - ((k - mid).abs() / half).min(1.0)
    }

    fn weight_sum(&self) -> f64 {
        (0..self.steps_total).map(|k| self.weight(k)).sum()
    }

    /// `(value, offset)` contribution of one step, by its index within the
    /// run (`steps_start + local step`).
    pub fn deltas_at(&self, run_step: u32) -> (f64, f64) {
        let sum = self.weight_sum();
        if sum <= 0.0 {
            return (0.0, 0.0);
        }
        let w = self.weight(run_step) / sum;
        (self.value_delta * w, self.offset_delta * w)
    }
}

/// Additive steering influence within a radius.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiversionPoint {
    pub position: Vec2,
    pub diversion: Vec2,
    /// Influence radius, > 0.
    pub range: f64,
}

impl DiversionPoint {
    /// Influence vector at `pos`; zero outside the radius.
    pub fn influence(&self, pos: Vec2) -> Vec2 {
        let d = (pos - self.position).norm();
        if d >= self.range {
            Vec2::zeros()
        } else {
            self.diversion * (1.0 - d / self.range)
        }
    }
}

/// Local stability source: coefficient in `[0, 1]` inversely proportional to
/// normalized distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StabilityPoint {
    pub position: Vec2,
    /// Influence radius, > 0.
    pub range: f64,
}

impl StabilityPoint {
    pub fn stability_at(&self, pos: Vec2) -> f64 {
        let d = (pos - self.position).norm();
        (1.0 - d / self.range).clamp(0.0, 1.0)
    }
}

/// Tunable extension parameters of one segment.
#[derive(Clone, Debug)]
pub struct TraceParams {
    /// Nominal integration step, >= 1.
    pub step_size: f64,
    /// Per-unit-distance width attenuation.
    pub width_loss: f64,
    /// Per-unit-distance speed attenuation.
    pub speed_loss: f64,
    /// Per-unit-distance density attenuation.
    pub density_loss: f64,
    /// Raises the minimum turn radius; in `[0, 0.9]`.
    pub angle_tenacity: f64,
    /// Tenacity boost right after a split; in `[0, 1]`.
    pub split_tenacity: f64,
    /// Hard per-unit angle cap in degrees; 0 disables.
    pub angle_limit_abs: f64,
    /// Diversion strength scale applied by the divert repair.
    pub arc_retrace_factor: f64,
    /// Diversion influence radius used by the divert repair.
    pub arc_retrace_range: f64,
    /// Fork stability-smoothing range.
    pub arc_stable_range: f64,
    /// Positive: max retained length after a merge; negative: minimum
    /// distance from root before a merge is allowed.
    pub merge_result_trim: f64,
    /// Fraction of width imposed as a no-turn-toward-sibling distance.
    pub split_turn_lock: f64,
    /// Evaluate the width term of the angle limit at the base width.
    pub static_angle_tenacity: bool,
    /// Prefer this side when the collision handler picks a side to adjust.
    pub adjustment_priority: bool,
    /// Segments downstream of this one refuse to merge.
    pub result_unstable: bool,
    /// This side refuses to merge.
    pub prevent_merge: bool,
    /// When set, the segment is traced along a pathfinder solution.
    pub target: Option<Vec2>,
    pub cost: Option<Param>,
    pub swerve: Option<Param>,
    pub extent_left: Option<Param>,
    pub extent_right: Option<Param>,
    pub speed: Option<Param>,
    pub density_left: Option<Param>,
    pub density_right: Option<Param>,
    pub diversion_points: Vec<DiversionPoint>,
    pub stability_points: Vec<StabilityPoint>,
    /// Width mask ending the segment where the terrain stops supporting it.
    pub end_condition: Option<Arc<dyn GridSampler>>,
}

impl Default for TraceParams {
    fn default() -> Self {
        Self {
            step_size: 1.0,
            width_loss: 0.0,
            speed_loss: 0.0,
            density_loss: 0.0,
            angle_tenacity: 0.0,
            split_tenacity: 0.0,
            angle_limit_abs: 0.0,
            arc_retrace_factor: 0.0,
            arc_retrace_range: 0.0,
            arc_stable_range: 0.0,
            merge_result_trim: 0.0,
            split_turn_lock: 0.0,
            static_angle_tenacity: false,
            adjustment_priority: false,
            result_unstable: false,
            prevent_merge: false,
            target: None,
            cost: None,
            swerve: None,
            extent_left: None,
            extent_right: None,
            speed: None,
            density_left: None,
            density_right: None,
            diversion_points: Vec::new(),
            stability_points: Vec::new(),
            end_condition: None,
        }
    }
}

impl PartialEq for TraceParams {
    fn eq(&self, other: &Self) -> bool {
        let end_eq = match (&self.end_condition, &other.end_condition) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        self.step_size == other.step_size
            && self.width_loss == other.width_loss
            && self.speed_loss == other.speed_loss
            && self.density_loss == other.density_loss
            && self.angle_tenacity == other.angle_tenacity
            && self.split_tenacity == other.split_tenacity
            && self.angle_limit_abs == other.angle_limit_abs
            && self.arc_retrace_factor == other.arc_retrace_factor
            && self.arc_retrace_range == other.arc_retrace_range
            && self.arc_stable_range == other.arc_stable_range
            && self.merge_result_trim == other.merge_result_trim
            && self.split_turn_lock == other.split_turn_lock
            && self.static_angle_tenacity == other.static_angle_tenacity
            && self.adjustment_priority == other.adjustment_priority
            && self.result_unstable == other.result_unstable
            && self.prevent_merge == other.prevent_merge
            && self.target == other.target
            && self.cost == other.cost
            && self.swerve == other.swerve
            && self.extent_left == other.extent_left
            && self.extent_right == other.extent_right
            && self.speed == other.speed
            && self.density_left == other.density_left
            && self.density_right == other.density_right
            && self.diversion_points == other.diversion_points
            && self.stability_points == other.stability_points
            && end_eq
    }
}

impl TraceParams {
    /// Per-unit angle limit (deg) at a given width and effective tenacity.
    ///
    /// `limit = (180/pi) * (1 - tenacity) / max(width/2, 0.5)`, then capped
    /// by `angle_limit_abs` when enabled.
    pub fn angle_limit(&self, width: f64, tenacity: f64) -> f64 {
        let radius = (width * 0.5).max(0.5) / (1.0 - tenacity.clamp(0.0, 0.9));
        let mut limit = 180.0 / (std::f64::consts::PI * radius);
        if self.angle_limit_abs > 0.0 {
            limit = limit.min(self.angle_limit_abs);
        }
        limit
    }

    /// Copy with steering inputs cleared, used for fixed merge geometry.
    pub fn locked(&self) -> Self {
        let mut p = self.clone();
        p.target = None;
        p.cost = None;
        p.swerve = None;
        p.diversion_points.clear();
        p.stability_points.clear();
        p.end_condition = None;
        p
    }
}
