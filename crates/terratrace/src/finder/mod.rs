//! Bounded-angle A* over a continuous cost field.
//!
//! Expansions follow circular arcs from a precomputed kernel; node identity
//! is quantized position plus quantized heading, so revisits through a
//! different approach angle stay distinct. The kernel split of a node adapts
//! the commit distance: sustained fine stepping re-inflates it, an expansion
//! that produces nothing rolls it back down and retries in place.
//!
//! Failure is non-fatal: the tracer retries with escalating heuristic weight
//! and finally falls back to local steering.

mod kernel;

pub use kernel::ArcKernel;

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use crate::config::FinderCfg;
use crate::geom::{signed_angle, Vec2, Vec2Ext};
use crate::queue::OpenQueue;

/// Non-fatal pathfinder failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinderError {
    /// The open set drained without reaching the target.
    NoPath,
    /// The node budget was exhausted first.
    NodeBudgetExhausted,
}

impl fmt::Display for FinderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPath => write!(f, "no unobstructed path to the target"),
            Self::NodeBudgetExhausted => write!(f, "pathfinder node budget exhausted"),
        }
    }
}

impl std::error::Error for FinderError {}

/// Per-unit turn caps (deg) by direction; both non-negative.
#[derive(Clone, Copy, Debug)]
pub struct AngleLimit {
    /// Cap on clockwise turning.
    pub cw: f64,
    /// Cap on counter-clockwise turning.
    pub ccw: f64,
}

impl AngleLimit {
    #[inline]
    pub fn max(&self) -> f64 {
        self.cw.max(self.ccw)
    }

    #[inline]
    pub fn for_sign(&self, sign: f64) -> f64 {
        if sign >= 0.0 {
            self.cw
        } else {
            self.ccw
        }
    }
}

/// Environment the search runs in; implemented by the tracer.
pub trait FinderWorld {
    /// Per-unit traversal cost at a pose, >= 0.
    fn cost(&self, pos: Vec2, dist: f64) -> f64;
    /// Per-unit turn caps at a distance along the path.
    fn angle_limit(&self, dist: f64) -> AngleLimit;
    /// Preferred signed per-unit turn (deg) from the swerve parameter.
    fn turn_bias(&self, pos: Vec2, dist: f64) -> f64;
    fn in_bounds(&self, pos: Vec2) -> bool;
}

/// One pose of a found path.
#[derive(Clone, Copy, Debug)]
pub struct FinderStep {
    pub pos: Vec2,
    pub dir: Vec2,
    /// Distance advanced from the previous pose (0 for the first).
    pub advance: f64,
    /// Signed turn from the previous pose, degrees.
    pub turn: f64,
}

/// Search request; `start_dir` must be unit length.
#[derive(Clone, Copy, Debug)]
pub struct FinderRequest {
    pub start: Vec2,
    pub start_dir: Vec2,
    pub target: Vec2,
    /// Full kernel step distance.
    pub step: f64,
    /// Heuristic weight; 1 is admissible-ish, retries escalate it.
    pub h_weight: f64,
}

#[derive(Clone, Debug)]
struct Node {
    pos: Vec2,
    dir: Vec2,
    dir_idx: i32,
    kernel_split: usize,
    parent: Option<usize>,
    g: f64,
    dist: f64,
    advance: f64,
    turn: f64,
    split_run: u32,
    terminal: bool,
}

type NodeKey = (i64, i64, i32);

/// Run the bounded-angle search; returns poses from start to target.
pub fn find_arc_path(
    kernel: &ArcKernel,
    world: &dyn FinderWorld,
    cfg: &FinderCfg,
    req: &FinderRequest,
) -> Result<Vec<FinderStep>, FinderError> {
    let mut search = Search {
        kernel,
        world,
        cfg,
        req,
        nodes: Vec::new(),
        open: OpenQueue::new(),
        by_key: HashMap::new(),
    };
    search.run()
}

struct Search<'a> {
    kernel: &'a ArcKernel,
    world: &'a dyn FinderWorld,
    cfg: &'a FinderCfg,
    req: &'a FinderRequest,
    nodes: Vec<Node>,
    open: OpenQueue<usize>,
    by_key: HashMap<NodeKey, (usize, f64)>,
}

impl Search<'_> {
    fn quantum(&self) -> f64 {
        0.5 * self.req.step
    }

    fn key_of(&self, pos: Vec2, dir_idx: i32) -> NodeKey {
        let q = self.quantum();
        ((pos.x / q).round() as i64, (pos.y / q).round() as i64, dir_idx)
    }

    fn priority(&self, node: &Node) -> f64 {
        node.g + self.req.h_weight * (node.pos - self.req.target).norm()
    }

    fn run(&mut self) -> Result<Vec<FinderStep>, FinderError> {
        let start = Node {
            pos: self.req.start,
            dir: self.req.start_dir,
            dir_idx: 0,
            kernel_split: self.kernel.max_split_idx(),
            parent: None,
            g: 0.0,
            dist: 0.0,
            advance: 0.0,
            turn: 0.0,
            split_run: 1,
            terminal: false,
        };
        let p0 = self.priority(&start);
        self.nodes.push(start);
        self.open.enqueue(0, p0);
        self.by_key
            .insert(self.key_of(self.req.start, 0), (0, p0));

        while let Some((idx, _)) = self.open.dequeue() {
            if self.nodes[idx].terminal {
                trace!(nodes = self.nodes.len(), "pathfinder reached target");
                return Ok(self.reconstruct(idx));
            }
            if (self.nodes[idx].pos - self.req.target).norm() <= self.req.step {
                self.try_terminal_arc(idx);
            }
            // Dynamic kernel adjustment: a fruitless expansion rolls its own
            // split down and retries in place.
            let mut split = self.nodes[idx].kernel_split;
            loop {
                if self.expand(idx, split) > 0 || split == 0 {
                    break;
                }
                split -= 1;
            }
            if self.nodes.len() > self.cfg.node_budget {
                return Err(FinderError::NodeBudgetExhausted);
            }
        }
        Err(FinderError::NoPath)
    }

    fn expand(&mut self, idx: usize, split: usize) -> usize {
        let node = self.nodes[idx].clone();
        let sub_step = self.req.step / self.kernel.split_count() as f64;
        let n_sub = split + 1;
        let limit = self.world.angle_limit(node.dist);
        let bias = self.world.turn_bias(node.pos, node.dist);
        let mut produced = 0usize;

        for i in 0..=(2 * self.kernel.arc_count()) {
            let delta: i32 = if i == 0 {
                0
            } else if i % 2 == 1 {
                (i / 2 + 1) as i32
            } else {
                -((i / 2) as i32)
            };
            let sign = if delta >= 0 { 1.0 } else { -1.0 };
            let arc_idx: i32 = delta.abs() - 1;
            let per_unit = if arc_idx >= 0 {
                self.kernel.angle(arc_idx as usize) / self.req.step
            } else {
                0.0
            };
            if arc_idx >= 0 {
                if per_unit > limit.max() {
                    // Subsequent deltas only get larger.
                    break;
                }
                if per_unit > limit.for_sign(sign) {
                    continue;
                }
            }

            // Walk the sub-steps, accumulating cost and probing obstacles.
            let mut p = node.pos;
            let mut cost_acc = 0.0;
            let mut blocked = false;
            for j in 0..n_sub {
                let d = if arc_idx >= 0 {
                    let (s, c) = self.kernel.sin_cos(arc_idx as usize, j);
                    node.dir.rotate(sign * s, c)
                } else {
                    node.dir
                };
                p += d * sub_step;
                let dist_j = node.dist + (j + 1) as f64 * sub_step;
                let c = self.world.cost(p, dist_j);
                if c >= self.cfg.obstacle_cost || !self.world.in_bounds(p) {
                    blocked = true;
                    break;
                }
                cost_acc += sub_step * (1.0 + c);
            }
            if blocked {
                continue;
            }

            let advance = sub_step * n_sub as f64;
            let turn = if arc_idx >= 0 {
                sign * self.kernel.angle(arc_idx as usize) * self.kernel.split_fraction(split)
            } else {
                0.0
            };
            let dir = node.dir.rotate_deg(turn);
            let modulo = 2 * self.kernel.possible_dir_count() as i32;
            let dir_idx = (node.dir_idx + delta * n_sub as i32).rem_euclid(modulo);
            let curvature = self.cfg.curvature_weight * (sign * per_unit - bias).abs() * advance;

            let child_split = if split < self.kernel.max_split_idx()
                && node.split_run >= self.cfg.steps_until_kernel_rollback
            {
                split + 1
            } else {
                split
            };
            let split_run = if child_split == split {
                node.split_run + 1
            } else {
                1
            };

            let child = Node {
                pos: p,
                dir,
                dir_idx,
                kernel_split: child_split,
                parent: Some(idx),
                g: node.g + cost_acc + curvature,
                dist: node.dist + advance,
                advance,
                turn,
                split_run,
                terminal: false,
            };
            let pri = self.priority(&child);
            let key = self.key_of(p, dir_idx);
            if let Some(&(existing, existing_pri)) = self.by_key.get(&key) {
                if existing_pri <= pri {
                    continue;
                }
                self.open.remove(&existing);
            }
            let child_idx = self.nodes.len();
            self.nodes.push(child);
            self.by_key.insert(key, (child_idx, pri));
            self.open.enqueue(child_idx, pri);
            produced += 1;
        }
        produced
    }

    /// Attempt a closing arc that meets the target exactly: the circle
    /// through the current pose tangent to its heading and through the
    /// target.
    fn try_terminal_arc(&mut self, idx: usize) {
        let node = self.nodes[idx].clone();
        let chord = self.req.target - node.pos;
        let chord_len = chord.norm();
        if chord_len < 1e-9 {
            self.push_terminal(idx, node.g, node.dir, 0.0, 0.0);
            return;
        }
        let half = signed_angle(node.dir, chord);
        if half.abs() >= 90.0 {
            return;
        }
        let total_turn = 2.0 * half;
        let limit = self.world.angle_limit(node.dist);
        let (arc_len, per_unit) = if half.abs() < 1e-6 {
            (chord_len, 0.0)
        } else {
            let radius = chord_len / (2.0 * half.abs().to_radians().sin());
            let len = radius * total_turn.abs().to_radians();
            if !len.is_finite() || len <= 0.0 {
                return;
            }
            (len, total_turn.abs() / len)
        };
        if per_unit > limit.for_sign(total_turn) {
            return;
        }
        // Probe the arc for obstacles at sub-step resolution.
        let sub_step = self.req.step / self.kernel.split_count() as f64;
        let n = (arc_len / sub_step).ceil().max(1.0) as usize;
        let mut p = node.pos;
        let mut cost_acc = 0.0;
        for j in 0..n {
            let cum = total_turn * (j as f64 + 0.5) / n as f64;
            let d = node.dir.rotate_deg(cum);
            p += d * (arc_len / n as f64);
            let c = self.world.cost(p, node.dist + arc_len * (j + 1) as f64 / n as f64);
            if c >= self.cfg.obstacle_cost || !self.world.in_bounds(p) {
                return;
            }
            cost_acc += (arc_len / n as f64) * (1.0 + c);
        }
        let dir = node.dir.rotate_deg(total_turn);
        self.push_terminal(idx, node.g + cost_acc, dir, arc_len, total_turn);
    }

    fn push_terminal(&mut self, parent: usize, g: f64, dir: Vec2, advance: f64, turn: f64) {
        let parent_node = &self.nodes[parent];
        let child = Node {
            pos: self.req.target,
            dir,
            dir_idx: -1,
            kernel_split: parent_node.kernel_split,
            parent: Some(parent),
            g,
            dist: parent_node.dist + advance,
            advance,
            turn,
            split_run: 1,
            terminal: true,
        };
        let idx = self.nodes.len();
        let pri = child.g;
        self.nodes.push(child);
        self.open.enqueue(idx, pri);
    }

    fn reconstruct(&self, end: usize) -> Vec<FinderStep> {
        let mut rev = Vec::new();
        let mut cur = Some(end);
        while let Some(i) = cur {
            let n = &self.nodes[i];
            rev.push(FinderStep {
                pos: n.pos,
                dir: n.dir,
                advance: n.advance,
                turn: n.turn,
            });
            cur = n.parent;
        }
        rev.reverse();
        rev
    }
}

#[cfg(test)]
mod tests;
