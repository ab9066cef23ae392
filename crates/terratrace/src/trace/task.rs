//! Scheduling bundles and per-segment trace outcomes.

use crate::geom::Vec2;

use super::frame::TraceFrame;

/// Index into the per-attempt task arena.
pub type TaskId = u32;

/// A scheduled traversal of one segment.
#[derive(Clone, Debug)]
pub struct TraceTask {
    /// Segment id in the path.
    pub segment: usize,
    /// Pose the integration starts from (at `-margin_tail`).
    pub base_frame: TraceFrame,
    /// Task of the first segment of the current linear branch.
    pub branch_parent: Option<TaskId>,
    /// Lead-out distance beyond the segment head.
    pub margin_head: f64,
    /// Lead-in distance before the segment tail.
    pub margin_tail: f64,
    /// Accumulated distance from the root along the heaviest chain.
    pub dist_from_root: f64,
    /// Excess width carried over from a merge, bleeding off over distance.
    pub width_buildup: f64,
    /// Whether the traversal has ever been fully inside the outer rectangle.
    pub ever_in_bounds: bool,
    /// Distance from the most recent fork along this branch.
    pub fork_dist: f64,
    /// Width of the fork base (parent at split, merged base at merge).
    pub fork_width: f64,
    /// Remaining no-turn-toward-sibling distance after a split.
    pub turn_lock_dist: f64,
    /// Sign of the locked turn direction (+ = clockwise locked).
    pub turn_lock_sign: f64,
    /// Lateral centerline offset at the fork, for smooth-fork blending.
    pub fork_shift: f64,
    /// Filled once the task has run.
    pub result: Option<TraceResult>,
}

impl TraceTask {
    pub fn new(segment: usize, base_frame: TraceFrame) -> Self {
        Self {
            segment,
            base_frame,
            branch_parent: None,
            margin_head: 0.0,
            margin_tail: 0.0,
            dist_from_root: 0.0,
            width_buildup: 0.0,
            ever_in_bounds: false,
            fork_dist: f64::INFINITY,
            fork_width: 0.0,
            turn_lock_dist: 0.0,
            turn_lock_sign: 0.0,
            fork_shift: 0.0,
            result: None,
        }
    }
}

/// Outcome of tracing one segment.
#[derive(Clone, Debug)]
pub struct TraceResult {
    pub initial_frame: TraceFrame,
    pub final_frame: TraceFrame,
    pub width_buildup: f64,
    pub ever_in_bounds: bool,
    /// The segment ended itself (faded out, left bounds, or hit its end
    /// condition) before covering its full length.
    pub trace_end: bool,
    pub collision: Option<TraceCollision>,
}

/// Two traversals writing incompatible data to the same cell.
///
/// Side `a` is the active traversal that detected the overlap; side `b` is
/// the passive owner of the cell. A collision is complete once both frame
/// histories are present; `frames_b` is captured on the simulated second
/// pass.
#[derive(Clone, Debug)]
pub struct TraceCollision {
    pub task_a: TaskId,
    pub task_b: TaskId,
    pub segment_a: usize,
    pub segment_b: usize,
    /// Cell position the overlap was detected at.
    pub position: Vec2,
    pub progress_a: f64,
    pub progress_b: f64,
    pub shift_a: f64,
    pub shift_b: f64,
    /// Active-side distance from its segment tail at detection.
    pub dist_a: f64,
    /// Passive-side distance, captured with `frames_b`.
    pub dist_b: f64,
    pub frames_a: Vec<TraceFrame>,
    pub frames_b: Option<Vec<TraceFrame>>,
    /// The two arms are connected through the graph (a same-path loop).
    pub cyclic: bool,
    /// Side `a` has downstream multi-parent merges.
    pub has_merge_a: bool,
    /// Side `b` has downstream multi-parent merges.
    pub has_merge_b: bool,
}

impl TraceCollision {
    /// Both frame histories present.
    pub fn is_complete(&self) -> bool {
        !self.frames_a.is_empty() && self.frames_b.is_some()
    }

    /// Cell key used to re-identify this collision on the simulated pass.
    pub fn cell(&self) -> (i64, i64) {
        (self.position.x.round() as i64, self.position.y.round() as i64)
    }
}
