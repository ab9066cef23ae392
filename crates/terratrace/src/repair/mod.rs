//! Collision repair: pick the earliest collision, rewrite the path graph.
//!
//! Strategies are tried in a fixed priority order — merge, divert,
//! stabilize, simplify, tenacity — and the stub fallback always applies, so
//! every handled collision changes the graph. The handler owns all graph
//! mutation between attempts; it never runs during one.

mod merge;

pub use merge::ArcCalcResult;

use tracing::debug;

use crate::config::{HandlerCfg, TraceCfg};
use crate::geom::{signed_angle, Vec2Ext};
use crate::path::{DiversionPoint, Path, StabilityPoint};
use crate::trace::{TraceCollision, TraceGrids, TraceTask};

/// Strategy that resolved a collision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Repair {
    Merged,
    Diverted,
    Stabilized,
    Simplified,
    Tenacity,
    Stubbed,
}

/// Repair engine; rewrites the path graph between trace attempts.
#[derive(Clone, Debug)]
pub struct CollisionHandler {
    pub cfg: HandlerCfg,
}

impl CollisionHandler {
    pub fn new(cfg: HandlerCfg) -> Self {
        Self { cfg }
    }

    /// Pick the earliest collision under the repair preorder and apply the
    /// first applicable strategy. Returns what was done, or `None` when
    /// there was nothing to handle.
    pub fn handle_best_collision(
        &self,
        path: &mut Path,
        tasks: &[TraceTask],
        grids: &TraceGrids,
        tcfg: &TraceCfg,
        collisions: Vec<TraceCollision>,
    ) -> Option<Repair> {
        if collisions.is_empty() {
            return None;
        }
        let mut best = 0usize;
        for i in 1..collisions.len() {
            if precedes(path, tasks, &collisions[i], &collisions[best]) {
                best = i;
            }
        }
        let chosen = &collisions[best];
        let enclosed = collisions
            .iter()
            .enumerate()
            .filter(|(i, c)| *i != best && is_enclosed(path, chosen, c))
            .count();
        if enclosed > 0 {
            debug!(enclosed, "collisions enclosed by the chosen one discarded");
        }

        // An incomplete collision can only be stubbed at the known distance.
        if !chosen.is_complete() {
            self.stub(path, tasks, chosen);
            debug!(
                segment = chosen.segment_a,
                "incomplete collision stubbed"
            );
            return Some(Repair::Stubbed);
        }

        let repair = if merge::try_merge(self, path, tasks, grids, tcfg, chosen) {
            Repair::Merged
        } else if self.try_divert(path, chosen) {
            Repair::Diverted
        } else if self.try_stabilize(path, chosen) {
            Repair::Stabilized
        } else if self.try_simplify(path, chosen) {
            Repair::Simplified
        } else if self.try_tenacity(path, chosen) {
            Repair::Tenacity
        } else {
            self.stub(path, tasks, chosen);
            Repair::Stubbed
        };
        debug!(
            segment_a = chosen.segment_a,
            segment_b = chosen.segment_b,
            ?repair,
            "collision repaired"
        );
        Some(repair)
    }

    /// Insert a diversion on the side that may still be steered.
    fn try_divert(&self, path: &mut Path, col: &TraceCollision) -> bool {
        let fa = *col.frames_a.last().unwrap();
        let fb = match col.frames_b.as_ref().and_then(|f| f.last()) {
            Some(f) => *f,
            None => return false,
        };
        // Side order: higher adjustment priority, then wider frame, then
        // fewer existing diversions.
        let sides = order_sides(path, col, &fa, &fb);
        for (seg_id, frame, other, shift) in sides {
            let params = &path.segment(seg_id).trace_params;
            if params.target.is_some()
                || params.arc_retrace_range <= 0.0
                || params.arc_retrace_factor <= 0.0
                || params.diversion_points.len() >= self.cfg.max_diversion_points
            {
                continue;
            }
            let range = params.arc_retrace_range;
            let factor = params.arc_retrace_factor;

            let rel = signed_angle(frame.normal, other.normal);
            let dir = if col.cyclic {
                // Bisector pointing back out of the loop.
                let bis = -(frame.normal + other.normal);
                if bis.norm() > 1e-9 {
                    bis / bis.norm()
                } else {
                    frame.normal.perp_cw()
                }
            } else if rel.abs() > 135.0 {
                // Head-on: push laterally away from the contact side.
                frame.normal.perp_cw() * -shift.signum()
            } else {
                // Grazing: deflect away from the other arm's heading.
                let d = frame.normal - other.normal;
                if d.norm() > 1e-9 {
                    d / d.norm()
                } else {
                    frame.normal.perp_cw() * -shift.signum()
                }
            };
            let point = DiversionPoint {
                position: col.position,
                diversion: dir * factor,
                range,
            };

            // Distribute over the divertable chain, splitting the last
            // segment at the range boundary if necessary.
            let dist_here = frame.dist.max(0.0);
            let chain = path.linear_parents(seg_id);
            let mut divertable = dist_here;
            let mut covered: Vec<usize> = vec![seg_id];
            for &up in chain.iter().skip(1) {
                if divertable >= range {
                    break;
                }
                let len = path.segment(up).length;
                let needed = range - divertable;
                if len > needed {
                    let head = path.split_segment(up, len - needed);
                    covered.push(head);
                    divertable += needed;
                } else {
                    covered.push(up);
                    divertable += len;
                }
            }
            if divertable < self.cfg.diversion_min_length {
                continue;
            }
            for id in covered {
                let points = &mut path.segment_mut(id).trace_params.diversion_points;
                if points.len() < self.cfg.max_diversion_points {
                    points.push(point);
                }
            }
            return true;
        }
        false
    }

    /// Dampen extent variation around the collision when the contact
    /// happened beyond the base extent.
    fn try_stabilize(&self, path: &mut Path, col: &TraceCollision) -> bool {
        let fa = *col.frames_a.last().unwrap();
        let fb = match col.frames_b.as_ref().and_then(|f| f.last()) {
            Some(f) => *f,
            None => return false,
        };
        let exceeded_a = col.shift_a.abs() > fa.width * 0.5;
        let exceeded_b = col.shift_b.abs() > fb.width * 0.5;
        if !exceeded_a && !exceeded_b {
            return false;
        }
        let mut changed = false;
        for (exceeded, seg_id, frame) in [
            (exceeded_a, col.segment_a, fa),
            (exceeded_b, col.segment_b, fb),
        ] {
            if !exceeded {
                continue;
            }
            let reachable = path.connected_segments(seg_id, true, true, |_| true, |_| false);
            for pos in [fa.pos, fb.pos] {
                for &id in &reachable {
                    let params = &mut path.segment_mut(id).trace_params;
                    if params.stability_points.len() >= self.cfg.max_stability_points {
                        continue;
                    }
                    let range = if params.arc_stable_range > 0.0 {
                        params.arc_stable_range
                    } else {
                        (frame.width * 2.0).max(1.0)
                    };
                    let point = StabilityPoint {
                        position: pos,
                        range,
                    };
                    if !params.stability_points.contains(&point) {
                        params.stability_points.push(point);
                        changed = true;
                    }
                }
            }
        }
        changed
    }

    /// Push the preceding split further upstream, doubling with every
    /// adjustment of the colliding segment.
    fn try_simplify(&self, path: &mut Path, col: &TraceCollision) -> bool {
        let chain = path.linear_parents(col.segment_a);
        let top = *chain.last().unwrap();
        let parents = path.segment(top).parents().to_vec();
        if parents.len() != 1 {
            return false;
        }
        let anchor = parents[0];
        if path.segment(anchor).branches().len() < 2 {
            return false;
        }
        let siblings: Vec<usize> = path
            .segment(anchor)
            .branches()
            .iter()
            .copied()
            .filter(|&b| b != top)
            .collect();
        for s in siblings {
            if path.segment(s).parents().len() >= 2 || path.has_descendant_merge(s) {
                return false;
            }
        }
        let n = path.segment(col.segment_a).adjustment_count;
        let grow = self.cfg.simplification_length * f64::powi(2.0, n as i32);
        path.segment_mut(anchor).length += grow;
        path.segment_mut(col.segment_a).adjustment_count = n + 1;
        true
    }

    /// Raise tenacity along both arms of a same-path loop.
    fn try_tenacity(&self, path: &mut Path, col: &TraceCollision) -> bool {
        if !col.cyclic {
            return false;
        }
        let mut changed = false;
        let mut seen = Vec::new();
        for seg_id in [col.segment_a, col.segment_b] {
            if seen.contains(&seg_id) {
                continue;
            }
            seen.push(seg_id);
            let connected = path.connected_segments(seg_id, false, true, |_| true, |_| false);
            for id in connected {
                let t = &mut path.segment_mut(id).trace_params.angle_tenacity;
                if *t < self.cfg.tenacity_adj_max {
                    *t = (*t + self.cfg.tenacity_adj_step).min(self.cfg.tenacity_adj_max);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Fallback: shrink the less-capable side back from the collision, with
    /// a width-loss profile reaching zero at the stub head; cascade across
    /// ancestors when the remainder is too short.
    fn stub(&self, path: &mut Path, tasks: &[TraceTask], col: &TraceCollision) {
        let fa = *col.frames_a.last().unwrap();
        let fb = col.frames_b.as_ref().and_then(|f| f.last()).copied();
        // Less capable: lower adjustment priority, then narrower frame,
        // then the active side.
        let stub_active = match fb {
            None => true,
            Some(fb) => {
                let pa = path.segment(col.segment_a).trace_params.adjustment_priority;
                let pb = path.segment(col.segment_b).trace_params.adjustment_priority;
                if pa != pb {
                    // The prioritized side survives.
                    !pb
                } else {
                    fa.width <= fb.width
                }
            }
        };
        let (mut seg_id, dist, tid) = if stub_active {
            (col.segment_a, col.dist_a, col.task_a)
        } else {
            (col.segment_b, col.dist_b, col.task_b)
        };
        let initial_width = tasks[tid as usize].base_frame.width.max(0.5);
        let min_stub = 2.0 * initial_width;
        let mut new_len = dist - self.cfg.stub_backtrack_length;
        loop {
            let seg = path.segment(seg_id);
            if new_len >= min_stub {
                let branches = seg.branches().to_vec();
                for b in branches {
                    path.detach(seg_id, b);
                    if path.segment(b).parents().is_empty() {
                        path.discard(b);
                    }
                }
                let seg = path.segment_mut(seg_id);
                seg.length = new_len;
                let loss = initial_width / new_len;
                let params = &mut seg.trace_params;
                params.width_loss = params.width_loss.max(loss);
                params.target = None;
                return;
            }
            let parents = seg.parents().to_vec();
            path.discard(seg_id);
            match parents.as_slice() {
                [p] => {
                    // The cut point moves into the parent; a non-negative
                    // remainder was merely too short and costs the parent
                    // nothing beyond its own head.
                    seg_id = *p;
                    new_len = path.segment(seg_id).length + new_len.min(0.0);
                }
                _ => return,
            }
        }
    }
}

/// Repair preorder: prefer the collision whose passive side sits further
/// upstream, then earlier by passive and active frame distance, then by
/// task ids.
fn precedes(path: &Path, tasks: &[TraceTask], a: &TraceCollision, b: &TraceCollision) -> bool {
    if a.segment_b != b.segment_b {
        if path.is_ancestor(a.segment_b, b.segment_b) {
            return true;
        }
        if path.is_ancestor(b.segment_b, a.segment_b) {
            return false;
        }
        if path.is_ancestor(a.segment_b, b.segment_a) {
            return true;
        }
        if path.is_ancestor(b.segment_b, a.segment_a) {
            return false;
        }
        let da = tasks[a.task_b as usize].dist_from_root;
        let db = tasks[b.task_b as usize].dist_from_root;
        if da != db {
            return da < db;
        }
    }
    if a.dist_b != b.dist_b {
        return a.dist_b < b.dist_b;
    }
    if a.dist_a != b.dist_a {
        return a.dist_a < b.dist_a;
    }
    (a.task_a, a.task_b) < (b.task_a, b.task_b)
}

/// A collision is enclosed when its active side lies strictly inside the
/// loop spanned by the chosen collision's two arms.
fn is_enclosed(path: &Path, chosen: &TraceCollision, c: &TraceCollision) -> bool {
    if c.segment_a == chosen.segment_a || c.segment_a == chosen.segment_b {
        return false;
    }
    path.is_ancestor(chosen.segment_a, c.segment_a)
        || path.is_ancestor(chosen.segment_b, c.segment_a)
}

type SideInfo = (usize, crate::trace::TraceFrame, crate::trace::TraceFrame, f64);

/// Divert side order: priority flag, wider frame, fewer diversions.
fn order_sides(
    path: &Path,
    col: &TraceCollision,
    fa: &crate::trace::TraceFrame,
    fb: &crate::trace::TraceFrame,
) -> Vec<SideInfo> {
    let a: SideInfo = (col.segment_a, *fa, *fb, col.shift_a);
    let b: SideInfo = (col.segment_b, *fb, *fa, col.shift_b);
    let score = |seg: usize, frame: &crate::trace::TraceFrame| {
        let p = &path.segment(seg).trace_params;
        (
            p.adjustment_priority as u8,
            frame.width,
            -(p.diversion_points.len() as f64),
        )
    };
    let sa = score(col.segment_a, fa);
    let sb = score(col.segment_b, fb);
    let a_first = (sa.0, sa.1, sa.2) >= (sb.0, sb.1, sb.2);
    if a_first {
        vec![a, b]
    } else {
        vec![b, a]
    }
}

#[cfg(test)]
mod tests;
