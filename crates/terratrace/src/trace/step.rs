//! Per-segment integration: steering, pattern sampling and rasterization.

use std::collections::HashSet;

use tracing::debug;

use crate::config::OffsetMode;
use crate::finder::{find_arc_path, AngleLimit, FinderRequest, FinderStep, FinderWorld};
use crate::geom::{normalize_deg, signed_angle, Vec2, Vec2Ext};
use crate::path::{Param, ParamArgs, Path, Segment, TraceParams};

use super::frame::{AdvanceLosses, Pivot, TraceFrame};
use super::task::{TaskId, TraceCollision, TraceResult, TraceTask};
use super::Tracer;

/// Width/density profile at one pattern sub-sample.
#[derive(Clone, Copy, Debug)]
struct PatternStep {
    extent_left: f64,
    extent_right: f64,
    density_left: f64,
    density_right: f64,
}

/// Local stability coefficient in `[0, 1]` at a pose.
fn stability_at(params: &TraceParams, task: &TraceTask, pos: Vec2, dist: f64) -> f64 {
    let mut s: f64 = 0.0;
    if params.arc_stable_range > 0.0 && task.fork_width > 0.0 {
        let from_fork = task.fork_dist + dist.max(0.0);
        s = s.max(1.0 - from_fork / params.arc_stable_range);
    }
    for p in &params.stability_points {
        s = s.max(p.stability_at(pos));
    }
    s.clamp(0.0, 1.0)
}

fn eval_param(p: &Option<Param>, default: f64, pos: Vec2, dist: f64, stability: f64) -> f64 {
    match p {
        Some(p) => p.eval(&ParamArgs {
            pos,
            dist,
            stability,
        }),
        None => default,
    }
}

/// Pathfinder environment backed by the current grids and segment params.
struct SteeringWorld<'a> {
    tracer: &'a Tracer,
    tasks: &'a [TraceTask],
    task: &'a TraceTask,
    params: &'a TraceParams,
    ancestors: &'a HashSet<usize>,
    base_width: f64,
}

impl SteeringWorld<'_> {
    fn limit_at(&self, dist: f64) -> f64 {
        let width = if self.params.static_angle_tenacity {
            self.base_width
        } else {
            (self.base_width - self.params.width_loss * dist.max(0.0)).max(0.0)
        };
        self.params.angle_limit(width, self.params.angle_tenacity)
    }
}

impl FinderWorld for SteeringWorld<'_> {
    fn cost(&self, pos: Vec2, dist: f64) -> f64 {
        let stability = stability_at(self.params, self.task, pos, dist);
        self.tracer
            .cell_cost(self.tasks, self.params, self.ancestors, pos, dist, stability)
    }

    fn angle_limit(&self, dist: f64) -> AngleLimit {
        let limit = self.limit_at(dist);
        let mut caps = AngleLimit {
            cw: limit,
            ccw: limit,
        };
        if dist < self.task.turn_lock_dist {
            if self.task.turn_lock_sign > 0.0 {
                caps.cw = 0.0;
            } else if self.task.turn_lock_sign < 0.0 {
                caps.ccw = 0.0;
            }
        }
        caps
    }

    fn turn_bias(&self, pos: Vec2, dist: f64) -> f64 {
        let stability = stability_at(self.params, self.task, pos, dist);
        let swerve = eval_param(&self.params.swerve, 0.0, pos, dist, stability);
        swerve * self.limit_at(dist)
    }

    fn in_bounds(&self, pos: Vec2) -> bool {
        let m = self.tracer.trace_outer_margin;
        let max_x = (self.tracer.layout.outer_x() - 1) as f64;
        let max_z = (self.tracer.layout.outer_z() - 1) as f64;
        pos.x >= -m && pos.x <= max_x + m && pos.y >= -m && pos.y <= max_z + m
    }
}

impl Tracer {
    /// Per-unit steering cost at a pose: the cost parameter plus an overlap
    /// penalty on cells currently owned by a non-ancestor task.
    fn cell_cost(
        &self,
        tasks: &[TraceTask],
        params: &TraceParams,
        ancestors: &HashSet<usize>,
        pos: Vec2,
        dist: f64,
        stability: f64,
    ) -> f64 {
        let mut c = eval_param(&params.cost, 0.0, pos, dist, stability).max(0.0);
        let (x, z) = (pos.x.round() as i64, pos.y.round() as i64);
        if self.layout.contains(x, z) {
            let (xu, zu) = (x as usize, z as usize);
            if *self.grids.main.get(xu, zu) > 0.0 {
                if let Some(owner) = *self.grids.task.get(xu, zu) {
                    let owner_seg = tasks[owner as usize].segment;
                    if !ancestors.contains(&owner_seg) {
                        c += self.cfg.overlap_avoidance;
                    }
                }
            }
        }
        c
    }

    /// Steering turn (deg) for one step of `dist_delta`, from the follow
    /// vector (cost gradient + diversions), swerve and all clamps.
    #[allow(clippy::too_many_arguments)]
    fn steer_angle(
        &self,
        tasks: &[TraceTask],
        task: &TraceTask,
        params: &TraceParams,
        ancestors: &HashSet<usize>,
        a: &TraceFrame,
        dist_delta: f64,
        initial_bias: f64,
    ) -> f64 {
        let stability = stability_at(params, task, a.pos, a.dist);

        // Follow vector: central-difference gradient over the 3x3 kernel,
        // descending cost, plus diversion-point influences.
        let mut follow = Vec2::zeros();
        for (dir, offset) in follow_kernel() {
            let c = self.cell_cost(tasks, params, ancestors, a.pos + offset, a.dist, stability);
            follow -= dir * c;
        }
        follow /= 8.0;
        for dp in &params.diversion_points {
            follow += dp.influence(a.pos);
        }

        let mut angle = if follow.norm() > 1e-12 {
            let desired = a.normal + follow * self.cfg.follow_gain;
            if desired.norm() > 1e-9 {
                signed_angle(a.normal, desired)
            } else {
                0.0
            }
        } else {
            0.0
        };

        // Effective tenacity: interpolate from the split boost over the
        // first two steps after a fork.
        let mut tenacity = params.angle_tenacity;
        let from_fork = task.fork_dist + a.dist.max(0.0);
        let boost_zone = 2.0 * params.step_size;
        if task.fork_width > 0.0 && from_fork < boost_zone && params.split_tenacity > 0.0 {
            let t = from_fork / boost_zone;
            let boosted = params.angle_tenacity.max(params.split_tenacity);
            tenacity = boosted + (params.angle_tenacity - boosted) * t;
        }
        let width = if params.static_angle_tenacity {
            task.base_frame.width
        } else {
            a.width
        };
        let limit = params.angle_limit(width, tenacity);

        // Swerve adds a fraction of the limit, then everything is clamped.
        let swerve = eval_param(&params.swerve, 0.0, a.pos, a.dist, stability);
        angle += swerve * limit * dist_delta;
        let max_step = limit * dist_delta;
        angle = angle.clamp(-max_step, max_step);

        // Turn lock after a split: no turning toward the sibling.
        if a.dist < task.turn_lock_dist && angle * task.turn_lock_sign > 0.0 {
            angle = 0.0;
        }

        // First-step rotation bias for split branches.
        if initial_bias > 0.0 {
            angle = angle.max(initial_bias);
        } else if initial_bias < 0.0 {
            angle = angle.min(initial_bias);
        }
        normalize_deg(angle)
    }

    /// Sample the width/density profile across one step.
    #[allow(clippy::too_many_arguments)]
    fn build_pattern(
        &self,
        params: &TraceParams,
        task: &TraceTask,
        a: &TraceFrame,
        dist_delta: f64,
        angle_delta: f64,
        radial: bool,
        buildup: f64,
    ) -> Vec<PatternStep> {
        let res = self.cfg.width_pattern_resolution.max(1) as usize;
        let mut out = Vec::with_capacity(res + 1);
        for j in 0..=res {
            let t = j as f64 / res as f64;
            let pos = a.advance_pos(dist_delta * t, angle_delta * t, radial);
            let dist = a.dist + dist_delta * t;
            let width = (a.width - params.width_loss * dist_delta * t).max(0.0);
            let density = (a.density - params.density_loss * dist_delta * t).max(0.0);
            let stability = stability_at(params, task, pos, dist);
            let soften = 1.0 - stability;
            let em_l = 1.0 + (eval_param(&params.extent_left, 1.0, pos, dist, stability) - 1.0) * soften;
            let em_r = 1.0 + (eval_param(&params.extent_right, 1.0, pos, dist, stability) - 1.0) * soften;
            let base_l = width * 0.5 * em_l.max(0.0);
            let base_r = width * 0.5 * em_r.max(0.0);
            let extra = 0.5 * (buildup - self.cfg.buildup_decay * dist_delta * t).max(0.0) * soften;
            let extent_l = base_l + extra;
            let extent_r = base_r + extra;
            // Density compensation keeps mass constant while buildup bleeds.
            let comp_l = if extent_l > 0.0 { base_l / extent_l } else { 1.0 };
            let comp_r = if extent_r > 0.0 { base_r / extent_r } else { 1.0 };
            let dm_l = eval_param(&params.density_left, 1.0, pos, dist, stability).max(0.0);
            let dm_r = eval_param(&params.density_right, 1.0, pos, dist, stability).max(0.0);
            out.push(PatternStep {
                extent_left: extent_l,
                extent_right: extent_r,
                density_left: density * dm_l * comp_l,
                density_right: density * dm_r * comp_r,
            });
        }
        out
    }

    /// Trace one scheduled segment, rasterizing as it goes.
    pub(crate) fn trace_task(
        &mut self,
        path: &Path,
        tasks: &mut Vec<TraceTask>,
        tid: TaskId,
        simulated: &mut Option<&mut Vec<TraceCollision>>,
        frames_used: &mut u64,
        quiet: bool,
    ) -> TraceResult {
        let task = tasks[tid as usize].clone();
        let seg = path.segment(task.segment);
        let params = seg.trace_params.clone();
        let step_size = params.step_size.max(1.0);

        let mut ancestors: HashSet<usize> = path.ancestors(task.segment).into_iter().collect();
        ancestors.insert(task.segment);

        // Arms that rejoin downstream are allowed to touch: everything that
        // parents a shared merge is exempt from collision detection, while
        // true ancestors stay live so cyclic overlaps keep firing.
        let mut merge_scope: HashSet<usize> = HashSet::new();
        for d in path.descendants(task.segment) {
            if path.segment(d).parents().len() >= 2 {
                merge_scope.insert(d);
                merge_scope.extend(path.ancestors(d));
            }
        }
        for a in &ancestors {
            merge_scope.remove(a);
        }

        // Initial frame at -margin_tail.
        let mut a = task.base_frame;
        if task.margin_tail > 0.0 {
            a.pos -= a.normal * task.margin_tail;
            a.dist = -task.margin_tail;
        }
        let s0 = stability_at(&params, &task, a.pos, a.dist);
        set_frame_extents(&mut a, &params, s0);

        let mut result = TraceResult {
            initial_frame: a,
            final_frame: a,
            width_buildup: task.width_buildup,
            ever_in_bounds: task.ever_in_bounds,
            trace_end: false,
            collision: None,
        };
        if seg.length <= 0.0 {
            return result;
        }

        // Pathfinder plan for targeted segments; failure falls back to
        // local steering, after retries with escalating heuristic weights.
        let mut plan: Option<Vec<FinderStep>> = None;
        if let Some(target) = params.target {
            let world = SteeringWorld {
                tracer: &*self,
                tasks: &*tasks,
                task: &task,
                params: &params,
                ancestors: &ancestors,
                base_width: task.base_frame.width,
            };
            for h_weight in [1.0, 3.0, 5.0, 9.0] {
                let req = FinderRequest {
                    start: task.base_frame.pos,
                    start_dir: task.base_frame.normal,
                    target,
                    step: step_size,
                    h_weight,
                };
                match find_arc_path(&world.tracer.kernel, &world, &world.tracer.finder_cfg, &req) {
                    Ok(steps) => {
                        plan = Some(steps);
                        break;
                    }
                    Err(err) => {
                        if !quiet {
                            debug!(segment = task.segment, h_weight, %err, "pathfinder retry");
                        }
                    }
                }
            }
            if plan.is_none() && !quiet {
                debug!(segment = task.segment, "pathfinder exhausted, steering locally");
            }
        }
        let mut plan_idx = 1usize;

        let min = Vec2::zeros();
        let max = Vec2::new(
            (self.layout.outer_x() - 1) as f64,
            (self.layout.outer_z() - 1) as f64,
        );

        let mut frames: Vec<TraceFrame> = vec![a];
        let mut length_limit = seg.length;
        let mut buildup = task.width_buildup;
        let mut ever_in = task.ever_in_bounds;
        let mut step_index: u32 = 0;
        let mut final_captured = false;

        loop {
            let remaining = if a.dist < 0.0 {
                -a.dist
            } else if a.dist < length_limit {
                length_limit - a.dist
            } else {
                length_limit + task.margin_head - a.dist
            };
            if remaining <= 1e-9 {
                break;
            }
            let mut dist_delta = step_size.min(remaining);
            let first_step = a.dist >= 0.0 && a.dist < 0.5 * step_size && step_index == 0;

            // Turn for this step.
            let mut angle_delta = if a.dist < 0.0 || a.dist >= length_limit {
                0.0
            } else if let Some(plan) = plan.as_ref().filter(|p| plan_idx < p.len()) {
                let s = plan[plan_idx];
                if s.advance <= remaining + 1e-9 {
                    plan_idx += 1;
                    dist_delta = s.advance.max(1e-9);
                    s.turn
                } else {
                    // Clamp the final plan arc at the segment head; constant
                    // curvature keeps the scaled turn exact.
                    let scale = remaining / s.advance;
                    plan_idx += 1;
                    dist_delta = remaining;
                    s.turn * scale
                }
            } else {
                let initial_bias = if first_step {
                    seg.initial_angle_delta_min
                } else {
                    0.0
                };
                self.steer_angle(&*tasks, &task, &params, &ancestors, &a, dist_delta, initial_bias)
            };
            angle_delta = normalize_deg(angle_delta);

            // Smooth value/offset deltas across the linear run.
            let mut extra_value = 0.0;
            let mut extra_offset = 0.0;
            if a.dist >= 0.0 {
                for d in &seg.extra_delta {
                    let (v, o) = d.deltas_at(d.steps_start + step_index);
                    extra_value += v;
                    extra_offset += o;
                }
            }

            let stability = stability_at(&params, &task, a.pos, a.dist);
            let speed_mul = eval_param(&params.speed, 1.0, a.pos, a.dist, stability);
            let losses = AdvanceLosses {
                width_loss: params.width_loss,
                speed_loss: params.speed_loss,
                density_loss: params.density_loss,
                speed_mul,
            };
            let radial = angle_delta.abs() >= self.cfg.radial_threshold;
            let adv = a.advance(&losses, dist_delta, angle_delta, extra_value, extra_offset, radial);
            let mut b = adv.frame;
            let sb = stability_at(&params, &task, b.pos, b.dist);
            set_frame_extents(&mut b, &params, sb);

            *frames_used += 1;
            if *frames_used > self.cfg.max_trace_frames {
                panic!(
                    "trace frame budget exceeded ({} frames); runaway path graph",
                    self.cfg.max_trace_frames
                );
            }

            let pattern =
                self.build_pattern(&params, &task, &a, dist_delta, angle_delta, radial, buildup);

            let collision = self.raster_step(
                path,
                &*tasks,
                tid,
                &task,
                seg,
                &merge_scope,
                &a,
                &b,
                adv.pivot,
                &pattern,
                simulated,
                &frames,
                length_limit,
            );
            frames.push(b);
            if let Some(col) = collision {
                result.final_frame = b;
                result.width_buildup = buildup;
                result.ever_in_bounds = ever_in;
                result.collision = Some(col);
                return result;
            }

            if a.dist >= 0.0 {
                buildup = (buildup - self.cfg.buildup_decay * dist_delta).max(0.0);
                step_index += 1;
            }

            if !final_captured && b.dist >= length_limit - 1e-9 {
                result.final_frame = b;
                final_captured = true;
            }

            // Bounds bookkeeping and end conditions.
            if !b.possibly_out_of_bounds(min, max, 0.0) {
                ever_in = true;
            } else if ever_in
                && b.dist >= 0.0
                && self.cfg.stop_when_out_of_bounds
                && !b.possibly_in_bounds(min, max, 0.0)
            {
                length_limit = length_limit.min(b.dist);
                result.final_frame = b;
                final_captured = true;
                result.trace_end = true;
                if !quiet {
                    debug!(segment = task.segment, dist = b.dist, "segment left bounds");
                }
                break;
            }

            if b.dist >= 0.0 && b.extent_left() + b.extent_right() < 1.0 {
                length_limit = length_limit.min(b.dist);
                result.final_frame = b;
                final_captured = true;
                result.trace_end = true;
                if !quiet {
                    debug!(segment = task.segment, dist = b.dist, "segment faded out");
                }
                break;
            }

            if b.dist >= 0.0 && self.end_condition_met(path, &task, &params, &b) {
                length_limit = length_limit.min(b.dist);
                result.final_frame = b;
                final_captured = true;
                result.trace_end = true;
                if !quiet {
                    debug!(segment = task.segment, dist = b.dist, "end condition met");
                }
                break;
            }

            a = b;
        }

        if !final_captured {
            result.final_frame = a;
        }
        result.width_buildup = buildup;
        result.ever_in_bounds = ever_in;
        result
    }

    /// Width-mask end rule: five samples across the half-width must all lie
    /// below the frame width, outside any fork smooth zone, on a segment
    /// with no descendant merges.
    fn end_condition_met(
        &self,
        path: &Path,
        task: &TraceTask,
        params: &TraceParams,
        b: &TraceFrame,
    ) -> bool {
        let Some(mask) = &params.end_condition else {
            return false;
        };
        let extent = b.extent_left().max(b.extent_right()).max(0.5);
        let perp = b.perp_cw();
        let all_pass = [-1.0, -0.5, 0.0, 0.5, 1.0].iter().all(|k| {
            let p = b.pos + perp * (k * extent);
            mask.value_at(p.x, p.y) < b.width
        });
        if !all_pass {
            return false;
        }
        let zone = self.cfg.main_grid_smooth_length * task.fork_width;
        if task.fork_width > 0.0 && task.fork_dist + b.dist <= zone {
            return false;
        }
        !path.has_descendant_merge(task.segment)
    }

    /// Rasterize one step into the grids; returns a collision when the step
    /// writes into incompatible foreign data.
    #[allow(clippy::too_many_arguments)]
    fn raster_step(
        &mut self,
        path: &Path,
        tasks: &[TraceTask],
        tid: TaskId,
        task: &TraceTask,
        seg: &Segment,
        merge_scope: &HashSet<usize>,
        a: &TraceFrame,
        b: &TraceFrame,
        pivot: Option<Pivot>,
        pattern: &[PatternStep],
        simulated: &mut Option<&mut Vec<TraceCollision>>,
        frames: &[TraceFrame],
        length_limit: f64,
    ) -> Option<TraceCollision> {
        let extent_max = pattern
            .iter()
            .map(|p| p.extent_left.max(p.extent_right))
            .fold(0.0, f64::max);
        let reach = extent_max + self.trace_outer_margin;
        let corners = [
            a.pos + a.perp_ccw() * reach,
            a.pos + a.perp_cw() * reach,
            b.pos + b.perp_ccw() * reach,
            b.pos + b.perp_cw() * reach,
        ];
        let x0 = corners.iter().map(|c| c.x).fold(f64::INFINITY, f64::min);
        let x1 = corners.iter().map(|c| c.x).fold(f64::NEG_INFINITY, f64::max);
        let z0 = corners.iter().map(|c| c.y).fold(f64::INFINITY, f64::min);
        let z1 = corners.iter().map(|c| c.y).fold(f64::NEG_INFINITY, f64::max);
        let xi0 = (x0.floor() as i64).max(0);
        let xi1 = (x1.ceil() as i64).min(self.layout.outer_x() as i64 - 1);
        let zi0 = (z0.floor() as i64).max(0);
        let zi1 = (z1.ceil() as i64).min(self.layout.outer_z() as i64 - 1);

        let chord = b.pos - a.pos;
        let chord_len2 = chord.norm_squared();
        let zone = self.cfg.main_grid_smooth_length * task.fork_width;

        for x in xi0..=xi1 {
            for z in zi0..=zi1 {
                let p = Vec2::new(x as f64, z as f64);
                if a.normal.dot(&(p - a.pos)) < 0.0 {
                    continue;
                }
                if b.normal.dot(&(p - b.pos)) > 0.0 {
                    continue;
                }
                let (xu, zu) = (x as usize, z as usize);

                let (shift, progress) = match pivot {
                    Some(pv) => {
                        let r = pv.offset.abs();
                        let d = (p - pv.point).norm();
                        let shift = if pv.offset > 0.0 { d - r } else { r - d };
                        let total = signed_angle(a.pos - pv.point, b.pos - pv.point);
                        let here = signed_angle(a.pos - pv.point, p - pv.point);
                        let progress = if total.abs() > 1e-9 {
                            (here / total).clamp(0.0, 1.0)
                        } else {
                            0.0
                        };
                        (shift, progress)
                    }
                    None => {
                        if chord_len2 > 1e-18 {
                            let progress = ((p - a.pos).dot(&chord) / chord_len2).clamp(0.0, 1.0);
                            let dirn = chord / chord_len2.sqrt();
                            let shift = (p - a.pos).dot(&dirn.perp_cw());
                            (shift, progress)
                        } else {
                            ((p - a.pos).dot(&a.perp_cw()), 0.0)
                        }
                    }
                };

                let ps = sample_pattern(pattern, progress);
                let (extent, density) = if shift >= 0.0 {
                    (ps.extent_right, ps.density_right)
                } else {
                    (ps.extent_left, ps.density_left)
                };
                let dist_at = a.dist + (b.dist - a.dist) * progress;
                let in_span = dist_at >= 0.0 && dist_at <= length_limit;
                let mut now_dist = shift.abs() - extent;
                // Rounded caps: penalize beyond the segment span; the caps
                // shape the distance field but never dip into the body.
                now_dist += (-dist_at).max(0.0) + (dist_at - length_limit).max(0.0);
                if !in_span {
                    now_dist = now_dist.max(0.0);
                }

                // Smooth branching: bridge the wedge toward the fork center.
                if task.fork_width > 0.0
                    && task.fork_shift != 0.0
                    && task.fork_dist + dist_at < zone
                    && shift * task.fork_shift < 0.0
                {
                    let u = ((task.fork_dist + dist_at) / zone).clamp(0.0, 1.0);
                    now_dist -= task.fork_shift.abs() * (1.0 - u);
                }

                let prior = *self.grids.distance.get(xu, zu);
                if now_dist < prior {
                    self.grids.distance.set(xu, zu, now_dist);
                    self.grids.task.set(xu, zu, Some(tid));
                }
                if now_dist > self.trace_inner_margin {
                    continue;
                }

                let val = a.value + (b.value - a.value) * progress;
                let width_here = a.width + (b.width - a.width) * progress;
                let off_base = a.offset + (b.offset - a.offset) * progress;
                let off = off_base
                    + match self.cfg.offset_mode {
                        OffsetMode::ExtentDensity => shift * extent * density * 2.0,
                        OffsetMode::WidthDensity => shift * width_here * density,
                    };

                // Collision detection against foreign writes.
                if now_dist <= self.cfg.collision_check_margin
                    && dist_at >= 0.0
                    && dist_at <= length_limit + self.cfg.trace_length_tolerance
                {
                    let main_prior = *self.grids.main.get(xu, zu);
                    if main_prior > 0.0 {
                        if let Some(owner) = *self.grids.task.get(xu, zu) {
                            if owner != tid {
                                let vdiff = (val - self.grids.value.get(xu, zu)).abs();
                                let odiff = (off - self.grids.offset.get(xu, zu)).abs();
                                let (vthr, othr) = if now_dist <= 0.0 {
                                    (
                                        self.cfg.collision_min_value_diff,
                                        self.cfg.collision_min_offset_diff,
                                    )
                                } else {
                                    (
                                        self.cfg.collision_min_value_diff_m,
                                        self.cfg.collision_min_offset_diff_m,
                                    )
                                };
                                let owner_seg = tasks[owner as usize].segment;
                                // Parents and siblings legitimately overlap
                                // right at the fork.
                                let owner_is_kin = owner_seg == seg.id()
                                    || seg.parents().contains(&owner_seg)
                                    || seg.parents().iter().any(|&p| {
                                        path.segment(p).branches().contains(&owner_seg)
                                    });
                                if (vdiff > vthr || odiff > othr)
                                    && (!owner_is_kin
                                        || dist_at >= self.cfg.collision_min_parent_dist)
                                    && !merge_scope.contains(&owner_seg)
                                {
                                    let mut frames_a = frames.to_vec();
                                    frames_a.push(*b);
                                    if let Some(sims) = simulated {
                                        // Simulated pass: stop as before, do
                                        // not collect a duplicate.
                                        if let Some(c) = sims.iter().find(|c| {
                                            c.task_a == tid && c.cell() == (x, z)
                                        }) {
                                            return Some(c.clone());
                                        }
                                    }
                                    let cyclic = owner == tid
                                        || path.is_ancestor(owner_seg, seg.id())
                                        || path.is_ancestor(seg.id(), owner_seg);
                                    return Some(TraceCollision {
                                        task_a: tid,
                                        task_b: owner,
                                        segment_a: seg.id(),
                                        segment_b: owner_seg,
                                        position: p,
                                        progress_a: progress,
                                        progress_b: 0.0,
                                        shift_a: shift,
                                        shift_b: *self.grids.side.get(xu, zu),
                                        dist_a: dist_at,
                                        dist_b: 0.0,
                                        frames_a,
                                        frames_b: None,
                                        cyclic,
                                        has_merge_a: path.has_descendant_merge(seg.id()),
                                        has_merge_b: path.has_descendant_merge(owner_seg),
                                    });
                                }
                            }
                        }
                    }
                    // Capture the passive-side history for simulated
                    // collisions at this cell.
                    if let Some(sims) = simulated {
                        for c in sims.iter_mut() {
                            if c.frames_b.is_none()
                                && c.task_b == tid
                                && c.cell() == (x, z)
                            {
                                let mut fb = frames.to_vec();
                                fb.push(*b);
                                c.frames_b = Some(fb);
                                c.progress_b = progress;
                                c.shift_b = shift;
                                c.dist_b = dist_at;
                            }
                        }
                    }
                }

                if now_dist <= 0.0 && in_span {
                    self.grids.main.set(xu, zu, width_here);
                    self.grids.side.set(xu, zu, shift);
                }
                if now_dist < prior {
                    self.grids.value.set(xu, zu, val);
                    self.grids.offset.set(xu, zu, off);
                }
            }
        }
        None
    }
}

/// Unit directions and offsets of the 3x3 follow kernel (center excluded).
fn follow_kernel() -> [(Vec2, Vec2); 8] {
    const R: f64 = 1.5;
    let mut out = [(Vec2::zeros(), Vec2::zeros()); 8];
    let mut i = 0;
    for dx in -1i32..=1 {
        for dz in -1i32..=1 {
            if dx == 0 && dz == 0 {
                continue;
            }
            let v = Vec2::new(dx as f64, dz as f64);
            let dir = v / v.norm();
            out[i] = (dir, dir * R);
            i += 1;
        }
    }
    out
}

fn sample_pattern(pattern: &[PatternStep], progress: f64) -> PatternStep {
    if pattern.len() == 1 {
        return pattern[0];
    }
    let span = (pattern.len() - 1) as f64;
    let f = (progress * span).clamp(0.0, span);
    let i = (f.floor() as usize).min(pattern.len() - 2);
    let t = f - i as f64;
    let a = pattern[i];
    let b = pattern[i + 1];
    PatternStep {
        extent_left: a.extent_left + (b.extent_left - a.extent_left) * t,
        extent_right: a.extent_right + (b.extent_right - a.extent_right) * t,
        density_left: a.density_left + (b.density_left - a.density_left) * t,
        density_right: a.density_right + (b.density_right - a.density_right) * t,
    }
}

/// Resample a frame's extent multipliers at its pose.
fn set_frame_extents(frame: &mut TraceFrame, params: &TraceParams, stability: f64) {
    let soften = 1.0 - stability;
    let raw_l = eval_param(&params.extent_left, 1.0, frame.pos, frame.dist, stability);
    let raw_r = eval_param(&params.extent_right, 1.0, frame.pos, frame.dist, stability);
    frame.em_left = (1.0 + (raw_l - 1.0) * soften).max(0.0);
    frame.em_right = (1.0 + (raw_r - 1.0) * soften).max(0.0);
}
