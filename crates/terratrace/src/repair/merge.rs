//! Merge repair: join two colliding arms with tangent arcs and ducts.
//!
//! A balanced two-pointer walk backs through both frame histories looking
//! for a pair of frames from which both arms can turn onto a common merge
//! normal within their angle limits, leave non-negative straight ducts, and
//! land side by side without crossing. The walk terminates on the first
//! success or on exhaustion; `Obstructed` abandons the merge strategy
//! entirely (the geometry is fine, the terrain is not).

use tracing::debug;

use crate::config::TraceCfg;
use crate::geom::{signed_angle, try_intersect, Vec2, Vec2Ext};
use crate::path::{Param, Path, SmoothDelta};
use crate::trace::{TraceCollision, TraceFrame, TraceGrids, TraceTask};

use super::CollisionHandler;

/// Outcome of one merge-geometry evaluation.
///
/// Everything except `Obstructed` sends the two-pointer walk further back;
/// `Obstructed` abandons the merge attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArcCalcResult {
    Success,
    /// No feasible foot point: arc ends land too far apart.
    NoPointF,
    /// Passive-side history exhausted.
    ExcBoundB,
    /// Active-side history exhausted.
    ExcBoundF,
    DuctBelowZero,
    /// The arm lines do not converge ahead of both frames.
    NoPointK,
    ArcLengthNaN,
    ExcMaxAngle,
    /// The required turn violates a split turn lock.
    ExcAngleLock,
    /// The arcs cross or land in inverted order.
    ArcOverlap,
    ExcessiveDuct,
    Obstructed,
}

/// One side's arc onto the merge normal.
#[derive(Clone, Copy, Debug)]
struct ArcSpec {
    /// Signed total turn, degrees.
    turn: f64,
    /// Arc length; 0 for an already-aligned arm.
    len: f64,
    /// Per-unit angle along the arc.
    per_unit: f64,
    /// Arc end position.
    end: Vec2,
}

#[derive(Clone, Copy, Debug)]
struct MergePlan {
    ia: usize,
    ib: usize,
    arc_a: ArcSpec,
    arc_b: ArcSpec,
    duct_a: f64,
    duct_b: f64,
}

/// Attempt the merge strategy; `true` when the graph was rewritten.
pub(crate) fn try_merge(
    handler: &CollisionHandler,
    path: &mut Path,
    tasks: &[TraceTask],
    grids: &TraceGrids,
    _tcfg: &TraceCfg,
    col: &TraceCollision,
) -> bool {
    if !col.is_complete() || col.cyclic || col.has_merge_a || col.has_merge_b {
        return false;
    }
    if col.segment_a == col.segment_b {
        return false;
    }
    let pa = path.segment(col.segment_a).trace_params.clone();
    let pb = path.segment(col.segment_b).trace_params.clone();
    if pa.prevent_merge || pb.prevent_merge {
        return false;
    }
    if path.descends_from_unstable(col.segment_a) || path.descends_from_unstable(col.segment_b) {
        return false;
    }
    let frames_a = &col.frames_a;
    let frames_b = col.frames_b.as_ref().unwrap();
    let fa_end = frames_a.last().unwrap();
    let fb_end = frames_b.last().unwrap();
    if (fa_end.value - fb_end.value).abs() > handler.cfg.merge_value_delta_limit
        || (fa_end.offset - fb_end.offset).abs() > handler.cfg.merge_offset_delta_limit
    {
        return false;
    }
    // Negative trim: a merge may not happen closer to the root than |trim|.
    for (params, task, dist) in [
        (&pa, &tasks[col.task_a as usize], col.dist_a),
        (&pb, &tasks[col.task_b as usize], col.dist_b),
    ] {
        if params.merge_result_trim < 0.0
            && task.dist_from_root + dist.max(0.0) < -params.merge_result_trim
        {
            return false;
        }
    }

    // Balanced two-pointer walk through both histories.
    let mut ia = frames_a.len() - 1;
    let mut ib = frames_b.len() - 1;
    let plan = loop {
        let res = arc_calc(
            handler, path, tasks, grids, &frames_a[ia], &frames_b[ib], col, ia, ib,
        );
        match res {
            Ok(plan) => break Some(plan),
            Err(ArcCalcResult::Obstructed) => {
                debug!("merge obstructed; strategy abandoned");
                break None;
            }
            Err(reason) => {
                let consumed_a = fa_end.dist - frames_a[ia].dist;
                let consumed_b = fb_end.dist - frames_b[ib].dist;
                let step_a = consumed_a <= consumed_b;
                if step_a {
                    if ia > 0 {
                        ia -= 1;
                    } else if ib > 0 {
                        ib -= 1;
                    } else {
                        debug!(?reason, "merge walk exhausted");
                        break None;
                    }
                } else if ib > 0 {
                    ib -= 1;
                } else if ia > 0 {
                    ia -= 1;
                } else {
                    debug!(?reason, "merge walk exhausted");
                    break None;
                }
            }
        }
    };
    let Some(plan) = plan else {
        return false;
    };
    apply_merge(handler, path, col, frames_a, frames_b, &plan);
    true
}

/// Evaluate the merge geometry for one frame pair.
#[allow(clippy::too_many_arguments)]
fn arc_calc(
    handler: &CollisionHandler,
    path: &Path,
    tasks: &[TraceTask],
    grids: &TraceGrids,
    fa: &TraceFrame,
    fb: &TraceFrame,
    col: &TraceCollision,
    ia: usize,
    ib: usize,
) -> Result<MergePlan, ArcCalcResult> {
    if fa.dist < 0.0 {
        return Err(ArcCalcResult::ExcBoundF);
    }
    if fb.dist < 0.0 {
        return Err(ArcCalcResult::ExcBoundB);
    }
    let pa = &path.segment(col.segment_a).trace_params;
    let pb = &path.segment(col.segment_b).trace_params;

    // Merge normal: width-weighted average, perpendicular fallback when the
    // arms are near-antiparallel.
    let mut n = fa.normal * fa.width + fb.normal * fb.width;
    if n.norm() < 1e-6 {
        let perp = fa.normal.perp_cw();
        n = if perp.dot(&(fb.pos - fa.pos)) >= 0.0 {
            perp
        } else {
            fa.normal.perp_ccw()
        };
    }
    if !(n.norm().is_finite()) || n.norm() < 1e-9 {
        return Err(ArcCalcResult::NoPointF);
    }
    let n = n / n.norm();

    // Convergence point of the two arm lines, ahead of both frames.
    let Some((k, t_a)) = try_intersect(fa.pos, fa.normal, fb.pos, fb.normal, 1e-9) else {
        return Err(ArcCalcResult::NoPointK);
    };
    let t_b = (k - fb.pos).dot(&fb.normal);
    if t_a <= 0.0 || t_b <= 0.0 {
        return Err(ArcCalcResult::NoPointK);
    }

    let ta = &tasks[col.task_a as usize];
    let tb = &tasks[col.task_b as usize];
    let arc_a = side_arc(fa, n, pa, ta)?;
    let arc_b = side_arc(fb, n, pb, tb)?;

    // Arc ends must land side by side, in order, a merge-width apart.
    let v = n.perp_cw();
    let sep_target = (fa.width + fb.width) * 0.5;
    let lat_a = (arc_a.end - k).dot(&v);
    let lat_b = (arc_b.end - k).dot(&v);
    let dlat = lat_a - lat_b;
    if dlat.abs() > 1.5 * sep_target {
        return Err(ArcCalcResult::NoPointF);
    }
    if dlat.abs() < 0.5 * sep_target {
        return Err(ArcCalcResult::ArcOverlap);
    }
    let order_before = (fa.pos - fb.pos).dot(&v);
    if order_before != 0.0 && order_before.signum() != dlat.signum() {
        return Err(ArcCalcResult::ArcOverlap);
    }

    // Ducts run along the merge normal to the cross line through the
    // weighted midpoint plus convergence clearance.
    let wsum = fa.width + fb.width;
    let mid = (fa.pos * fa.width + fb.pos * fb.width) / wsum;
    let front = (mid - k).dot(&n) + sep_target;
    let duct_a = front - (arc_a.end - k).dot(&n);
    let duct_b = front - (arc_b.end - k).dot(&n);
    if duct_a < 0.0 || duct_b < 0.0 {
        return Err(ArcCalcResult::DuctBelowZero);
    }
    if duct_a > handler.cfg.merge_max_duct || duct_b > handler.cfg.merge_max_duct {
        return Err(ArcCalcResult::ExcessiveDuct);
    }

    // End caps and connecting geometry must be clear of foreign writes.
    if obstructed(path, tasks, grids, col, fa, fb, &arc_a, &arc_b, duct_a, duct_b, n) {
        return Err(ArcCalcResult::Obstructed);
    }

    Ok(MergePlan {
        ia,
        ib,
        arc_a,
        arc_b,
        duct_a,
        duct_b,
    })
}

/// Minimum-radius arc turning a frame onto the merge normal.
fn side_arc(
    f: &TraceFrame,
    n: Vec2,
    params: &crate::path::TraceParams,
    task: &TraceTask,
) -> Result<ArcSpec, ArcCalcResult> {
    let turn = signed_angle(f.normal, n);
    if f.dist < task.turn_lock_dist && turn * task.turn_lock_sign > 0.0 {
        return Err(ArcCalcResult::ExcAngleLock);
    }
    let limit = params.angle_limit(f.width, params.angle_tenacity);
    if !(limit.is_finite()) || limit <= 0.0 {
        return Err(ArcCalcResult::ArcLengthNaN);
    }
    if turn.abs() < 1e-9 {
        return Ok(ArcSpec {
            turn: 0.0,
            len: 0.0,
            per_unit: 0.0,
            end: f.pos,
        });
    }
    let radius = 180.0 / (std::f64::consts::PI * limit);
    let len = radius * turn.abs().to_radians();
    if !len.is_finite() || len.is_nan() {
        return Err(ArcCalcResult::ArcLengthNaN);
    }
    let per_unit = turn.abs() / len;
    if per_unit > limit + 1e-9 {
        return Err(ArcCalcResult::ExcMaxAngle);
    }
    let pivot = if turn > 0.0 {
        f.pos + f.normal.perp_cw() * radius
    } else {
        f.pos + f.normal.perp_ccw() * radius
    };
    let end = pivot + (f.pos - pivot).rotate_deg(turn);
    Ok(ArcSpec {
        turn,
        len,
        per_unit,
        end,
    })
}

/// Sample the merge geometry against the main grid; cells owned by tasks of
/// neither arm's ancestry block the merge.
#[allow(clippy::too_many_arguments)]
fn obstructed(
    path: &Path,
    tasks: &[TraceTask],
    grids: &TraceGrids,
    col: &TraceCollision,
    fa: &TraceFrame,
    fb: &TraceFrame,
    arc_a: &ArcSpec,
    arc_b: &ArcSpec,
    duct_a: f64,
    duct_b: f64,
    n: Vec2,
) -> bool {
    let mut allowed: Vec<usize> = Vec::new();
    for seg in [col.segment_a, col.segment_b] {
        allowed.push(seg);
        allowed.extend(path.ancestors(seg));
    }
    let mut probe = |pos: Vec2| -> bool {
        let (x, z) = (pos.x.round() as i64, pos.y.round() as i64);
        if x < 0 || z < 0 {
            return false;
        }
        let (xu, zu) = (x as usize, z as usize);
        if xu >= grids.main.size_x() || zu >= grids.main.size_z() {
            return false;
        }
        if *grids.main.get(xu, zu) <= 0.0 {
            return false;
        }
        match *grids.task.get(xu, zu) {
            Some(owner) => !allowed.contains(&tasks[owner as usize].segment),
            None => false,
        }
    };
    for (f, arc, duct) in [(fa, arc_a, duct_a), (fb, arc_b, duct_b)] {
        // Arc samples.
        let steps = (arc.len.ceil() as usize).max(1);
        for j in 0..=steps {
            let t = j as f64 / steps as f64;
            let d = f.normal.rotate_deg(arc.turn * t * 0.5);
            let pos = f.pos + d * (arc.len * t);
            if probe(pos) {
                return true;
            }
        }
        // Duct and end cap samples.
        let duct_steps = (duct.ceil() as usize).max(1);
        for j in 0..=duct_steps {
            let pos = arc.end + n * (duct * j as f64 / duct_steps as f64);
            if probe(pos) {
                return true;
            }
        }
    }
    false
}

/// Rewrite the graph: truncate both arms, insert arc and duct segments,
/// append the merged continuation and smooth out value/offset deltas.
fn apply_merge(
    handler: &CollisionHandler,
    path: &mut Path,
    col: &TraceCollision,
    frames_a: &[TraceFrame],
    frames_b: &[TraceFrame],
    plan: &MergePlan,
) {
    let fa = frames_a[plan.ia];
    let fb = frames_b[plan.ib];
    let orig_len_a = path.segment(col.segment_a).length;
    let orig_len_b = path.segment(col.segment_b).length;
    let mean_density = (fa.density + fb.density) * 0.5;

    let mut chain_end = [0usize; 2];
    for (slot, (seg_id, frame, arc, duct)) in [
        (col.segment_a, fa, plan.arc_a, plan.duct_a),
        (col.segment_b, fb, plan.arc_b, plan.duct_b),
    ]
    .into_iter()
    .enumerate()
    {
        // Truncate at the chosen frame and drop anything downstream.
        let branches = path.segment(seg_id).branches().to_vec();
        for b in branches {
            path.detach(seg_id, b);
            if path.segment(b).parents().is_empty() {
                path.discard(b);
            }
        }
        path.segment_mut(seg_id).length = frame.dist.max(0.0);

        // Fixed-angle arc: swerve at +-1 against an absolute cap reproduces
        // the constant per-unit angle exactly.
        let mut tail = seg_id;
        if arc.len > 1e-6 {
            let arc_id = path.attach_new(tail);
            let seg = path.segment_mut(arc_id);
            seg.length = arc.len;
            let params = &mut seg.trace_params;
            *params = params.locked();
            params.angle_limit_abs = arc.per_unit;
            params.swerve = Some(Param::Const(arc.turn.signum()));
            tail = arc_id;
        }
        if duct > 1e-6 {
            let duct_id = path.attach_new(tail);
            let seg = path.segment_mut(duct_id);
            seg.length = duct;
            let params = &mut seg.trace_params;
            *params = params.locked();
            params.angle_limit_abs = 0.0;
            params.swerve = None;
            // Densities meet at the mean across the duct.
            params.density_loss = (frame.density - mean_density) / duct;
            tail = duct_id;
        }
        chain_end[slot] = tail;
    }

    // Merged continuation inherits the heavier arm's parameters.
    let (heavy_seg, heavy_consumed) = if fa.width >= fb.width {
        (col.segment_a, fa.dist.max(0.0) + plan.arc_a.len + plan.duct_a)
    } else {
        (col.segment_b, fb.dist.max(0.0) + plan.arc_b.len + plan.duct_b)
    };
    let merged = path.attach_new(chain_end[0]);
    path.attach(chain_end[1], merged);
    let heavy_params = path.segment(heavy_seg).trace_params.clone();
    let trim = heavy_params.merge_result_trim;
    let mut merged_len = (orig_len_a.max(orig_len_b) - heavy_consumed).max(0.0);
    if trim > 0.0 {
        merged_len = merged_len.min(trim);
    }
    {
        let seg = path.segment_mut(merged);
        seg.length = merged_len;
        seg.trace_params = heavy_params;
        seg.trace_params.target = None;
    }

    // Smooth the value/offset gap out across both arms' linear runs.
    let dv = fa.value - fb.value;
    let doff = fa.offset - fb.offset;
    distribute_delta(handler, path, col.segment_a, -0.5 * dv, -0.5 * doff);
    distribute_delta(handler, path, col.segment_b, 0.5 * dv, 0.5 * doff);
}

/// Spread a value/offset delta across a linear run with a padded hat, or
/// fall back to the root's relative attributes when the run has no steps.
fn distribute_delta(
    _handler: &CollisionHandler,
    path: &mut Path,
    seg_id: usize,
    value_delta: f64,
    offset_delta: f64,
) {
    if value_delta == 0.0 && offset_delta == 0.0 {
        return;
    }
    let chain = path.linear_parents(seg_id);
    let steps_of = |path: &Path, id: usize| -> u32 {
        let seg = path.segment(id);
        (seg.length / seg.trace_params.step_size.max(1.0)).ceil() as u32
    };
    let total: u32 = chain.iter().map(|&id| steps_of(path, id)).sum();
    if total == 0 {
        let root = *chain.last().unwrap();
        let seg = path.segment_mut(root);
        seg.rel_value += value_delta;
        seg.rel_offset += offset_delta;
        return;
    }
    // Chain is ordered self -> root; steps count from the run's root end.
    let mut start = total;
    for &id in &chain {
        let steps = steps_of(path, id);
        start -= steps;
        path.segment_mut(id).extra_delta.push(SmoothDelta {
            value_delta,
            offset_delta,
            steps_total: total,
            steps_start: start,
            steps_padding: total / 8,
        });
    }
}
