//! Configuration structs for the tracer, collision handler and pathfinder.
//!
//! Plain value structs with `Default` impls carrying the documented defaults.
//! Everything is per-call configuration; nothing here is global state.

/// Convention used when accumulating the `offset` grid from a cell's lateral
/// shift.
///
/// The source history diverged on this: one revision computed the cell offset
/// as `shift * width * density`, a later one as `shift * extent * density * 2`
/// with per-side densities. Both are kept selectable; neither is silently
/// picked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetMode {
    /// `shift * extent * density * 2` with per-side extent and density.
    ExtentDensity,
    /// Legacy `shift * width * density`.
    WidthDensity,
}

/// Tracer configuration.
#[derive(Clone, Debug)]
pub struct TraceCfg {
    /// Per-step turn (deg) above which a step is rasterized as a circular arc.
    pub radial_threshold: f64,
    /// Value difference that triggers a collision inside the path body.
    pub collision_min_value_diff: f64,
    /// Offset difference that triggers a collision inside the path body.
    pub collision_min_offset_diff: f64,
    /// Distance band around the body in which collisions are still checked.
    pub collision_check_margin: f64,
    /// Looser value threshold inside the margin band.
    pub collision_min_value_diff_m: f64,
    /// Looser offset threshold inside the margin band.
    pub collision_min_offset_diff_m: f64,
    /// Below this distance from the segment tail, overlap with a direct
    /// parent is not a collision.
    pub collision_min_parent_dist: f64,
    /// Fork smooth-zone length as a multiple of the fork base width.
    pub main_grid_smooth_length: f64,
    /// Width/density pattern sub-samples per integration step.
    pub width_pattern_resolution: u32,
    /// Tolerance past the segment head within which collisions still count.
    pub trace_length_tolerance: f64,
    /// End a segment once it has been fully inside the outer rectangle and
    /// leaves it again.
    pub stop_when_out_of_bounds: bool,
    /// Offset accumulation convention (see [`OffsetMode`]).
    pub offset_mode: OffsetMode,
    /// Fail-safe budget on integration frames per attempt.
    pub max_trace_frames: u64,
    /// Extra steering cost on cells already owned by a non-ancestor task.
    pub overlap_avoidance: f64,
    /// Per-unit decay of merge width buildup.
    pub buildup_decay: f64,
    /// Gain translating the follow vector into a steering direction.
    pub follow_gain: f64,
}

impl Default for TraceCfg {
    fn default() -> Self {
        Self {
            radial_threshold: 0.5,
            collision_min_value_diff: 0.75,
            collision_min_offset_diff: 0.5,
            collision_check_margin: 0.5,
            collision_min_value_diff_m: 5.0,
            collision_min_offset_diff_m: 5.0,
            collision_min_parent_dist: 2.0,
            main_grid_smooth_length: 1.0,
            width_pattern_resolution: 1,
            trace_length_tolerance: 0.5,
            stop_when_out_of_bounds: true,
            offset_mode: OffsetMode::ExtentDensity,
            max_trace_frames: 1_000_000,
            overlap_avoidance: 2.0,
            buildup_decay: 0.25,
            follow_gain: 1.0,
        }
    }
}

/// Collision-handler configuration.
#[derive(Clone, Debug)]
pub struct HandlerCfg {
    /// Diversion points a single segment may accumulate.
    pub max_diversion_points: usize,
    /// Stability points a single segment may accumulate.
    pub max_stability_points: usize,
    /// Value gap above which two arms refuse to merge.
    pub merge_value_delta_limit: f64,
    /// Offset gap above which two arms refuse to merge.
    pub merge_offset_delta_limit: f64,
    /// Base length added to a pre-split anchor by the simplify strategy.
    pub simplification_length: f64,
    /// Minimum divertable chain length for the divert strategy.
    pub diversion_min_length: f64,
    /// Distance a stub is shrunk back from the collision position.
    pub stub_backtrack_length: f64,
    /// Tenacity increment applied by the tenacity strategy.
    pub tenacity_adj_step: f64,
    /// Tenacity ceiling for the tenacity strategy.
    pub tenacity_adj_max: f64,
    /// Duct length above which a merge candidate is rejected.
    pub merge_max_duct: f64,
}

impl Default for HandlerCfg {
    fn default() -> Self {
        Self {
            max_diversion_points: 5,
            max_stability_points: 3,
            merge_value_delta_limit: 0.45,
            merge_offset_delta_limit: 0.45,
            simplification_length: 10.0,
            diversion_min_length: 5.0,
            stub_backtrack_length: 10.0,
            tenacity_adj_step: 0.15,
            tenacity_adj_max: 0.9,
            merge_max_duct: 30.0,
        }
    }
}

/// Pathfinder configuration.
#[derive(Clone, Copy, Debug)]
pub struct FinderCfg {
    /// Distinct arc curvatures per turn direction (>= 2).
    pub arc_count: usize,
    /// Sub-step resolutions per kernel (>= 1).
    pub split_count: usize,
    /// Node budget before the search gives up.
    pub node_budget: usize,
    /// Ancestors at the same split before resolution re-inflates.
    pub steps_until_kernel_rollback: u32,
    /// Per-unit cost at or above which a sub-step is an obstacle.
    pub obstacle_cost: f64,
    /// Weight of the curvature penalty in the node priority.
    pub curvature_weight: f64,
}

impl Default for FinderCfg {
    fn default() -> Self {
        Self {
            arc_count: 8,
            split_count: 3,
            node_budget: 20_000,
            steps_until_kernel_rollback: 3,
            obstacle_cost: 100.0,
            curvature_weight: 0.1,
        }
    }
}
