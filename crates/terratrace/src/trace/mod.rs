//! Deterministic forward integrator over the path graph.
//!
//! One `trace` call owns the output grids exclusively. Inside an attempt the
//! graph is immutable; the collision handler only runs between attempts.
//! Iteration order is fixed everywhere (roots by id, branches by descending
//! `rel_width`, cells by ascending `x` then `z`), so results are bitwise
//! deterministic for a given input.

pub mod frame;
mod step;
mod task;

pub use frame::{Advance, AdvanceLosses, Pivot, TraceFrame};
pub use task::{TaskId, TraceCollision, TraceResult, TraceTask};

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::config::{FinderCfg, HandlerCfg, TraceCfg};
use crate::finder::ArcKernel;
use crate::geom::{direction, normalize_deg, Vec2, Vec2Ext};
use crate::grid::{Grid, GridLayout, GridView};
use crate::path::Path;
use crate::repair::CollisionHandler;

/// The six output rasters, all sized `outer_x x outer_z`.
#[derive(Clone, Debug)]
pub struct TraceGrids {
    /// Rendered width at the cell; 0 when untouched by any hot zone.
    pub main: Grid<f64>,
    /// Signed lateral offset from the centerline.
    pub side: Grid<f64>,
    /// Path value sampled at the nearest frame.
    pub value: Grid<f64>,
    /// Path offset sampled at the nearest frame.
    pub offset: Grid<f64>,
    /// Min signed distance to any centerline; initialized to the outer margin.
    pub distance: Grid<f64>,
    /// Task that most recently owned the cell.
    pub task: Grid<Option<TaskId>>,
}

impl TraceGrids {
    fn new(x: usize, z: usize, outer_margin: f64) -> Self {
        Self {
            main: Grid::new(x, z, 0.0),
            side: Grid::new(x, z, 0.0),
            value: Grid::new(x, z, 0.0),
            offset: Grid::new(x, z, 0.0),
            distance: Grid::new(x, z, outer_margin),
            task: Grid::new(x, z, None),
        }
    }

    fn clear(&mut self, outer_margin: f64) {
        self.main.fill(0.0);
        self.side.fill(0.0);
        self.value.fill(0.0);
        self.offset.fill(0.0);
        self.distance.fill(outer_margin);
        self.task.fill(None);
    }
}

/// Result of one trace attempt.
pub(crate) struct Attempt {
    pub tasks: Vec<TraceTask>,
    pub collisions: Vec<TraceCollision>,
}

/// Deterministic tracer over a bounded rectangular domain.
pub struct Tracer {
    pub cfg: TraceCfg,
    pub finder_cfg: FinderCfg,
    layout: GridLayout,
    trace_inner_margin: f64,
    trace_outer_margin: f64,
    kernel: ArcKernel,
    handler: CollisionHandler,
    grids: TraceGrids,
}

impl Tracer {
    pub fn new(
        inner_x: usize,
        inner_z: usize,
        grid_margin: usize,
        trace_inner_margin: f64,
        trace_outer_margin: f64,
    ) -> Self {
        Self::with_config(
            inner_x,
            inner_z,
            grid_margin,
            trace_inner_margin,
            trace_outer_margin,
            TraceCfg::default(),
            HandlerCfg::default(),
            FinderCfg::default(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_config(
        inner_x: usize,
        inner_z: usize,
        grid_margin: usize,
        trace_inner_margin: f64,
        trace_outer_margin: f64,
        cfg: TraceCfg,
        handler_cfg: HandlerCfg,
        finder_cfg: FinderCfg,
    ) -> Self {
        assert!(
            trace_outer_margin >= trace_inner_margin && trace_inner_margin >= 0.0,
            "margins must satisfy outer >= inner >= 0"
        );
        let layout = GridLayout::new(inner_x, inner_z, grid_margin);
        let grids = TraceGrids::new(layout.outer_x(), layout.outer_z(), trace_outer_margin);
        let kernel = ArcKernel::new(finder_cfg.arc_count, finder_cfg.split_count);
        Self {
            cfg,
            finder_cfg,
            layout,
            trace_inner_margin,
            trace_outer_margin,
            kernel,
            handler: CollisionHandler::new(handler_cfg),
            grids,
        }
    }

    #[inline]
    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    #[inline]
    pub fn inner_margin(&self) -> f64 {
        self.trace_inner_margin
    }

    #[inline]
    pub fn outer_margin(&self) -> f64 {
        self.trace_outer_margin
    }

    #[inline]
    pub fn grids(&self) -> &TraceGrids {
        &self.grids
    }

    /// Translated read-only view over the `main` grid.
    pub fn main_view(&self) -> GridView<'_> {
        GridView::new(&self.grids.main, self.layout.margin)
    }

    pub fn side_view(&self) -> GridView<'_> {
        GridView::new(&self.grids.side, self.layout.margin)
    }

    pub fn value_view(&self) -> GridView<'_> {
        GridView::new(&self.grids.value, self.layout.margin)
    }

    pub fn offset_view(&self) -> GridView<'_> {
        GridView::new(&self.grids.offset, self.layout.margin)
    }

    pub fn distance_view(&self) -> GridView<'_> {
        GridView::new(&self.grids.distance, self.layout.margin)
    }

    /// Task-ownership grid in outer coordinates.
    pub fn task_grid(&self) -> &Grid<Option<TaskId>> {
        &self.grids.task
    }

    fn clear_grids(&mut self) {
        self.grids.clear(self.trace_outer_margin);
    }

    /// Trace with collision repair: simulate, pick and repair the earliest
    /// collision, clear and retry, up to `max_attempts` times.
    ///
    /// Returns `true` when an attempt completes without collisions; on
    /// exhaustion the grids reflect the last attempt.
    pub fn trace(&mut self, path: &mut Path, max_attempts: u32) -> bool {
        for attempt in 0..max_attempts {
            self.clear_grids();
            let outcome = self.try_trace(path, None, false);
            if outcome.collisions.is_empty() {
                debug!(attempt, "trace completed without collisions");
                return true;
            }
            debug!(
                attempt,
                collisions = outcome.collisions.len(),
                "trace attempt collided"
            );
            // Re-run with the collected collisions to fill the passive-side
            // frame histories; debug output is suppressed.
            self.clear_grids();
            let mut simulated = outcome.collisions;
            let sim_outcome = self.try_trace(path, Some(&mut simulated), true);
            self.handler.handle_best_collision(
                path,
                &sim_outcome.tasks,
                &self.grids,
                &self.cfg,
                simulated,
            );
            self.clear_grids();
        }
        false
    }

    /// One attempt with no repair; `true` when it ran collision-free.
    pub fn trace_once(&mut self, path: &Path) -> bool {
        self.clear_grids();
        self.try_trace(path, None, false).collisions.is_empty()
    }

    /// Run one scheduling pass over the path DAG.
    ///
    /// A segment is enqueued exactly once, only after all of its parents
    /// completed without a collision. In simulated mode, detected collisions
    /// are matched against `simulated` (stopping the task as before) instead
    /// of being collected, and passive-side frame histories are captured.
    pub(crate) fn try_trace(
        &mut self,
        path: &Path,
        mut simulated: Option<&mut Vec<TraceCollision>>,
        quiet: bool,
    ) -> Attempt {
        let mut tasks: Vec<TraceTask> = Vec::new();
        let mut collisions: Vec<TraceCollision> = Vec::new();
        let mut queue: VecDeque<TaskId> = VecDeque::new();
        // Completed tasks by segment id.
        let mut done: HashMap<usize, TaskId> = HashMap::new();
        // Remaining unfinished parents per pending merge segment.
        let mut pending: HashMap<usize, usize> = HashMap::new();
        let mut frames_used: u64 = 0;

        for root in path.roots() {
            if path.segment(root).rel_width <= 0.0 {
                continue;
            }
            let tid = tasks.len() as TaskId;
            let mut task = self.make_root_task(path, root);
            task.branch_parent = Some(tid);
            tasks.push(task);
            queue.push_back(tid);
        }

        while let Some(tid) = queue.pop_front() {
            let result = self.trace_task(path, &mut tasks, tid, &mut simulated, &mut frames_used, quiet);
            let collided = result.collision.is_some();
            tasks[tid as usize].result = Some(result.clone());
            if collided {
                if simulated.is_none() {
                    collisions.push(result.collision.unwrap());
                }
                continue;
            }
            done.insert(tasks[tid as usize].segment, tid);

            let seg_id = tasks[tid as usize].segment;
            let seg = path.segment(seg_id);
            let mut branches: Vec<usize> = seg.branches().to_vec();
            branches.sort_by(|&x, &y| {
                path.segment(y)
                    .rel_width
                    .partial_cmp(&path.segment(x).rel_width)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for b in branches {
                let parent_count = path.segment(b).parents().len();
                let remaining = pending.entry(b).or_insert(parent_count);
                *remaining = remaining.saturating_sub(1);
                if *remaining > 0 {
                    continue;
                }
                if !path.segment(b).parents().iter().all(|p| done.contains_key(p)) {
                    // A parent collided; never schedule this branch.
                    continue;
                }
                let tid_b = tasks.len() as TaskId;
                let task = self.make_branch_task(path, &tasks, &done, b, tid_b);
                tasks.push(task);
                queue.push_back(tid_b);
            }
        }

        Attempt { tasks, collisions }
    }

    fn make_root_task(&self, path: &Path, root: usize) -> TraceTask {
        let seg = path.segment(root);
        let dir = direction(seg.rel_angle);
        let pos = seg.rel_position + dir.perp_cw() * seg.rel_shift;
        let mut frame = TraceFrame::at(pos, seg.rel_angle, seg.rel_width, 0.0);
        frame.speed = seg.rel_speed;
        frame.density = seg.rel_density;
        frame.value = seg.rel_value;
        frame.offset = seg.rel_offset;
        let mut task = TraceTask::new(root, frame);
        task.margin_tail = self.trace_inner_margin;
        task.margin_head = if seg.is_leaf() {
            self.trace_inner_margin
        } else {
            0.0
        };
        task
    }

    /// Base frame and bookkeeping for a branch whose parents all completed.
    fn make_branch_task(
        &self,
        path: &Path,
        tasks: &[TraceTask],
        done: &HashMap<usize, TaskId>,
        seg_id: usize,
        own_tid: TaskId,
    ) -> TraceTask {
        let seg = path.segment(seg_id);
        let parent_tasks: Vec<&TraceTask> = seg
            .parents()
            .iter()
            .map(|p| &tasks[done[p] as usize])
            .collect();
        debug_assert!(!parent_tasks.is_empty(), "branch task scheduled without parents");

        let (mut frame, buildup) = if parent_tasks.len() == 1 {
            let r = parent_tasks[0].result.as_ref().unwrap();
            (r.final_frame, 0.0)
        } else {
            let merged = merge_base_frame(
                parent_tasks
                    .iter()
                    .map(|t| t.result.as_ref().unwrap().final_frame),
            );
            let sum: f64 = parent_tasks
                .iter()
                .map(|t| t.result.as_ref().unwrap().final_frame.width)
                .sum();
            let excess = (sum - merged.width).max(0.0);
            (merged, excess)
        };

        let parent_width = frame.width;
        // Apply the child's relative deltas at the fork.
        frame.angle = normalize_deg(frame.angle + seg.rel_angle);
        frame.normal = direction(frame.angle);
        frame.pos += frame.perp_cw() * (seg.rel_shift * parent_width);
        frame.width *= seg.rel_width;
        frame.speed *= seg.rel_speed;
        frame.density *= seg.rel_density;
        frame.value += seg.rel_value;
        frame.offset += seg.rel_offset;
        frame.dist = 0.0;

        let mut task = TraceTask::new(seg_id, frame);
        task.margin_head = if seg.is_leaf() {
            self.trace_inner_margin
        } else {
            0.0
        };
        task.dist_from_root = parent_tasks
            .iter()
            .map(|t| t.dist_from_root + path.segment(t.segment).length)
            .fold(0.0, f64::max);
        task.ever_in_bounds = parent_tasks
            .iter()
            .any(|t| t.result.as_ref().unwrap().ever_in_bounds);

        let single_parent = parent_tasks.len() == 1;
        let parent_seg = path.segment(parent_tasks[0].segment);
        if single_parent && parent_seg.branches().len() == 1 {
            // Continuation of a linear branch.
            let pt = parent_tasks[0];
            let pr = pt.result.as_ref().unwrap();
            task.branch_parent = pt.branch_parent;
            task.fork_dist = pt.fork_dist + path.segment(pt.segment).length;
            task.fork_width = pt.fork_width;
            task.width_buildup = pr.width_buildup;
            task.turn_lock_dist = (pt.turn_lock_dist - path.segment(pt.segment).length).max(0.0);
            task.turn_lock_sign = pt.turn_lock_sign;
        } else {
            task.branch_parent = Some(own_tid);
            task.fork_dist = 0.0;
            task.fork_width = parent_width;
            task.width_buildup = buildup;
            if single_parent {
                // Split child: lock turns toward the mean sibling shift.
                let siblings: Vec<usize> = parent_seg
                    .branches()
                    .iter()
                    .copied()
                    .filter(|&b| b != seg_id)
                    .collect();
                if !siblings.is_empty() {
                    let mean: f64 = siblings
                        .iter()
                        .map(|&b| path.segment(b).rel_shift)
                        .sum::<f64>()
                        / siblings.len() as f64;
                    task.turn_lock_sign = (mean - seg.rel_shift).signum();
                    task.turn_lock_dist =
                        seg.trace_params.split_turn_lock * parent_width;
                    task.fork_shift = seg.rel_shift * parent_width;
                }
            }
        }
        task
    }
}

/// Width-weighted average of parent final frames for a merge base.
///
/// Normals, widths, speeds, values and densities are summed and divided by
/// the parent count; position and offset are weighted by `width/width_avg`.
/// The result is shifted backward along the averaged normal to the latest
/// arriving parent endpoint.
fn merge_base_frame(frames: impl Iterator<Item = TraceFrame>) -> TraceFrame {
    let frames: Vec<TraceFrame> = frames.collect();
    let n = frames.len() as f64;
    let width_avg: f64 = frames.iter().map(|f| f.width).sum::<f64>() / n;
    let mut normal_sum = Vec2::zeros();
    let mut pos_sum = Vec2::zeros();
    let mut offset_sum = 0.0;
    let mut speed_sum = 0.0;
    let mut value_sum = 0.0;
    let mut density_sum = 0.0;
    for f in &frames {
        let w = if width_avg > 0.0 { f.width / width_avg } else { 1.0 };
        normal_sum += f.normal;
        pos_sum += f.pos * w;
        offset_sum += f.offset * w;
        speed_sum += f.speed;
        value_sum += f.value;
        density_sum += f.density;
    }
    let normal = if normal_sum.norm() > 1e-9 {
        normal_sum / normal_sum.norm()
    } else {
        frames[0].normal
    };
    let mut pos = pos_sum / n;
    // No merge point forward of the latest-arriving parent.
    let back = frames
        .iter()
        .map(|f| (f.pos - pos).dot(&normal))
        .fold(f64::INFINITY, f64::min);
    if back.is_finite() && back < 0.0 {
        pos += normal * back;
    }
    let angle = normalize_deg(-normal.y.atan2(normal.x).to_degrees());
    TraceFrame {
        pos,
        normal,
        angle,
        width: width_avg,
        speed: speed_sum / n,
        value: value_sum / n,
        offset: offset_sum / n,
        density: density_sum / n,
        dist: 0.0,
        em_left: 1.0,
        em_right: 1.0,
    }
}

#[cfg(test)]
mod tests;
