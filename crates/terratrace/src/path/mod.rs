//! Path graph: an arena of segments addressed by id.
//!
//! Invariants
//! - Bidirectional adjacency: `parents.contains(p) <=> p.branches.contains(self)`.
//! - `branches` and `parents` are sorted by the referent's `rel_shift`
//!   ascending, so left-to-right ordering across a split is stable.
//! - Segment ids equal insertion position and never move; `discard` zeroes a
//!   segment instead of removing it.
//! - The distinguished empty path rejects all mutation.
//!
//! No owning pointers between segments: adjacency is id lists, traversals
//! keep a visited set, so the structure stays robust even against
//! pathological caller-built graphs.

mod params;

pub use params::{
    CustomParam, DiversionPoint, Param, ParamArgs, SmoothDelta, StabilityPoint, TraceParams,
};

use std::collections::{HashMap, HashSet, VecDeque};

use crate::geom::Vec2;

/// One atomic piece of a path; structural links plus trace parameters.
#[derive(Clone, Debug)]
pub struct Segment {
    id: usize,
    /// World units along the segment, >= 0.
    pub length: f64,
    parents: Vec<usize>,
    branches: Vec<usize>,
    /// Value delta applied at the start of the segment.
    pub rel_value: f64,
    /// Offset delta applied at the start of the segment.
    pub rel_offset: f64,
    /// Lateral shift at the start, in parent widths (absolute for roots).
    pub rel_shift: f64,
    /// Angle delta (deg) applied at the start.
    pub rel_angle: f64,
    /// Width multiplier (absolute width for roots).
    pub rel_width: f64,
    /// Speed multiplier.
    pub rel_speed: f64,
    /// Density multiplier.
    pub rel_density: f64,
    /// Positional delta, used only by root segments.
    pub rel_position: Vec2,
    /// Smooth value/offset deltas distributed across a linear run.
    pub extra_delta: Vec<SmoothDelta>,
    /// Signed bias forced onto the first-step rotation of a split branch.
    pub initial_angle_delta_min: f64,
    pub trace_params: TraceParams,
    /// Escalation counter for the simplify repair.
    pub adjustment_count: u32,
}

impl Segment {
    fn new(id: usize, trace_params: TraceParams) -> Self {
        Self {
            id,
            length: 0.0,
            parents: Vec::new(),
            branches: Vec::new(),
            rel_value: 0.0,
            rel_offset: 0.0,
            rel_shift: 0.0,
            rel_angle: 0.0,
            rel_width: 1.0,
            rel_speed: 1.0,
            rel_density: 1.0,
            rel_position: Vec2::zeros(),
            extra_delta: Vec::new(),
            initial_angle_delta_min: 0.0,
            trace_params,
            adjustment_count: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn parents(&self) -> &[usize] {
        &self.parents
    }

    #[inline]
    pub fn branches(&self) -> &[usize] {
        &self.branches
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.branches.is_empty()
    }

    /// Attribute and trace-parameter equality; structure excluded.
    pub fn self_equals(&self, other: &Segment) -> bool {
        self.length == other.length
            && self.rel_value == other.rel_value
            && self.rel_offset == other.rel_offset
            && self.rel_shift == other.rel_shift
            && self.rel_angle == other.rel_angle
            && self.rel_width == other.rel_width
            && self.rel_speed == other.rel_speed
            && self.rel_density == other.rel_density
            && self.rel_position == other.rel_position
            && self.extra_delta == other.extra_delta
            && self.initial_angle_delta_min == other.initial_angle_delta_min
            && self.adjustment_count == other.adjustment_count
            && self.trace_params == other.trace_params
    }
}

/// Container owning an ordered sequence of segments.
#[derive(Debug, Default)]
pub struct Path {
    segments: Vec<Segment>,
    frozen: bool,
}

impl Clone for Path {
    fn clone(&self) -> Self {
        Self {
            segments: self.segments.clone(),
            frozen: false,
        }
    }
}

impl Path {
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
            frozen: false,
        }
    }

    /// The distinguished immutable empty path; every mutation on it is a
    /// fatal invariant violation. A `clone` of it is an ordinary path.
    pub fn empty() -> Path {
        Path {
            segments: Vec::new(),
            frozen: true,
        }
    }

    /// Whether this is the immutable empty path.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[inline]
    fn assert_mutable(&self) {
        if self.frozen {
            panic!("attempted to mutate the immutable empty path");
        }
    }

    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn segment(&self, id: usize) -> &Segment {
        &self.segments[id]
    }

    #[inline]
    pub fn segment_mut(&mut self, id: usize) -> &mut Segment {
        self.assert_mutable();
        &mut self.segments[id]
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// Ids of all root segments, in id order.
    pub fn roots(&self) -> Vec<usize> {
        self.segments
            .iter()
            .filter(|s| s.is_root())
            .map(|s| s.id)
            .collect()
    }

    /// Create a detached root-less segment with the given parameters.
    pub fn add_segment(&mut self, trace_params: TraceParams) -> usize {
        self.assert_mutable();
        let id = self.segments.len();
        self.segments.push(Segment::new(id, trace_params));
        id
    }

    /// Create a root segment seeded at `pos` with heading `angle` and the
    /// given absolute width.
    pub fn add_root(&mut self, trace_params: TraceParams, pos: Vec2, angle: f64, width: f64) -> usize {
        let id = self.add_segment(trace_params);
        let s = &mut self.segments[id];
        s.rel_position = pos;
        s.rel_angle = angle;
        s.rel_width = width;
        id
    }

    fn check_id(&self, id: usize) {
        if id >= self.segments.len() {
            panic!(
                "segment id {id} does not belong to this path ({} segments)",
                self.segments.len()
            );
        }
    }

    /// Attach `child` as a branch of `parent`, keeping both adjacency lists
    /// sorted by the referent's `rel_shift`.
    pub fn attach(&mut self, parent: usize, child: usize) {
        self.assert_mutable();
        self.check_id(parent);
        self.check_id(child);
        if parent == child {
            panic!("segment {parent} cannot branch to itself");
        }
        if !self.segments[parent].branches.contains(&child) {
            self.segments[parent].branches.push(child);
            self.sort_adjacency(parent, true);
        }
        if !self.segments[child].parents.contains(&parent) {
            self.segments[child].parents.push(parent);
            self.sort_adjacency(child, false);
        }
    }

    /// Detach `child` from `parent`; both directions are removed.
    pub fn detach(&mut self, parent: usize, child: usize) {
        self.assert_mutable();
        self.check_id(parent);
        self.check_id(child);
        self.segments[parent].branches.retain(|&b| b != child);
        self.segments[child].parents.retain(|&p| p != parent);
    }

    fn sort_adjacency(&mut self, id: usize, branches: bool) {
        let keys: Vec<(usize, f64)> = {
            let list = if branches {
                &self.segments[id].branches
            } else {
                &self.segments[id].parents
            };
            list.iter().map(|&r| (r, self.segments[r].rel_shift)).collect()
        };
        let mut sorted = keys;
        sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let ids: Vec<usize> = sorted.into_iter().map(|(r, _)| r).collect();
        if branches {
            self.segments[id].branches = ids;
        } else {
            self.segments[id].parents = ids;
        }
    }

    /// Create an empty segment with a copy of `parent`'s trace params and
    /// attach it as a branch.
    pub fn attach_new(&mut self, parent: usize) -> usize {
        self.assert_mutable();
        self.check_id(parent);
        let params = self.segments[parent].trace_params.clone();
        let id = self.add_segment(params);
        self.attach(parent, id);
        id
    }

    /// Create a new segment that inherits all of `parent`'s current branches
    /// and becomes its sole child.
    pub fn insert_new(&mut self, parent: usize) -> usize {
        self.assert_mutable();
        self.check_id(parent);
        let params = self.segments[parent].trace_params.clone();
        let id = self.add_segment(params);
        let branches = self.segments[parent].branches.clone();
        for b in branches {
            self.detach(parent, b);
            self.attach(id, b);
        }
        self.attach(parent, id);
        id
    }

    /// Extend a segment; in place when `length == 0` or the params equal the
    /// current ones, otherwise through a new inserted segment.
    ///
    /// Returns the id of the segment carrying the extension.
    pub fn extend_with_params(&mut self, id: usize, params: TraceParams, length: f64) -> usize {
        self.assert_mutable();
        self.check_id(id);
        if length == 0.0 || self.segments[id].trace_params == params {
            self.segments[id].length += length;
            id
        } else {
            let new_id = self.insert_new(id);
            self.segments[new_id].trace_params = params;
            self.segments[new_id].length = length;
            new_id
        }
    }

    /// Split a segment at `at` world units from its tail; the head part
    /// moves to a newly inserted child. Returns the new child's id.
    pub fn split_segment(&mut self, id: usize, at: f64) -> usize {
        self.assert_mutable();
        self.check_id(id);
        let at = at.clamp(0.0, self.segments[id].length);
        let new_id = self.insert_new(id);
        let steps_before = (at / self.segments[id].trace_params.step_size).ceil() as u32;
        let tail_deltas = self.segments[id].extra_delta.clone();
        let head: Vec<SmoothDelta> = tail_deltas
            .iter()
            .map(|d| SmoothDelta {
                steps_start: d.steps_start + steps_before,
                ..*d
            })
            .collect();
        self.segments[new_id].extra_delta = head;
        self.segments[new_id].length = self.segments[id].length - at;
        self.segments[id].length = at;
        new_id
    }

    /// Zero a segment's width and length and recursively discard branches
    /// this orphans.
    pub fn discard(&mut self, id: usize) {
        self.assert_mutable();
        self.check_id(id);
        self.segments[id].rel_width = 0.0;
        self.segments[id].length = 0.0;
        let parents = self.segments[id].parents.clone();
        for p in parents {
            self.detach(p, id);
        }
        let branches = self.segments[id].branches.clone();
        for b in branches {
            self.detach(id, b);
            if self.segments[b].parents.is_empty() {
                self.discard(b);
            }
        }
    }

    /// Breadth-first traversal over parents and/or branches, with a cycle
    /// guard. `enter` gates whether a segment is visited (and expanded),
    /// `exit` stops expansion past a visited segment.
    pub fn connected_segments(
        &self,
        start: usize,
        fwd: bool,
        bwd: bool,
        mut enter: impl FnMut(&Segment) -> bool,
        mut exit: impl FnMut(&Segment) -> bool,
    ) -> Vec<usize> {
        self.check_id(start);
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        visited.insert(start);
        while let Some(id) = queue.pop_front() {
            let seg = &self.segments[id];
            if !enter(seg) {
                continue;
            }
            out.push(id);
            if exit(seg) {
                continue;
            }
            if fwd {
                for &b in &seg.branches {
                    if visited.insert(b) {
                        queue.push_back(b);
                    }
                }
            }
            if bwd {
                for &p in &seg.parents {
                    if visited.insert(p) {
                        queue.push_back(p);
                    }
                }
            }
        }
        out
    }

    /// All ancestors of `id` (excluding `id`), BFS order.
    pub fn ancestors(&self, id: usize) -> Vec<usize> {
        let mut v = self.connected_segments(id, false, true, |_| true, |_| false);
        v.retain(|&s| s != id);
        v
    }

    /// All descendants of `id` (excluding `id`), BFS order.
    pub fn descendants(&self, id: usize) -> Vec<usize> {
        let mut v = self.connected_segments(id, true, false, |_| true, |_| false);
        v.retain(|&s| s != id);
        v
    }

    /// Whether `a` is an ancestor of `b`.
    pub fn is_ancestor(&self, a: usize, b: usize) -> bool {
        self.ancestors(b).contains(&a)
    }

    /// Chain of single-parent/single-child ancestors, including `id`,
    /// ordered from `id` upward.
    pub fn linear_parents(&self, id: usize) -> Vec<usize> {
        self.check_id(id);
        let mut out = vec![id];
        let mut cur = id;
        loop {
            let seg = &self.segments[cur];
            if seg.parents.len() != 1 {
                break;
            }
            let p = seg.parents[0];
            if self.segments[p].branches.len() != 1 {
                break;
            }
            if out.contains(&p) {
                break;
            }
            out.push(p);
            cur = p;
        }
        out
    }

    /// Whether any descendant of `id` is a multi-parent merge.
    pub fn has_descendant_merge(&self, id: usize) -> bool {
        self.descendants(id)
            .iter()
            .any(|&d| self.segments[d].parents.len() >= 2)
    }

    /// Whether `id` or any of its ancestors carries `result_unstable`.
    pub fn descends_from_unstable(&self, id: usize) -> bool {
        if self.segments[id].trace_params.result_unstable {
            return true;
        }
        self.ancestors(id)
            .iter()
            .any(|&a| self.segments[a].trace_params.result_unstable)
    }

    /// Structural equality of the subtree rooted at `id` against `other_id`
    /// in `other`, up to `self_equals` on each matched pair.
    pub fn subtree_equals(&self, id: usize, other: &Path, other_id: usize) -> bool {
        let a = &self.segments[id];
        let b = &other.segments[other_id];
        if !a.self_equals(b) || a.branches.len() != b.branches.len() {
            return false;
        }
        a.branches
            .iter()
            .zip(&b.branches)
            .all(|(&ba, &bb)| self.subtree_equals(ba, other, bb))
    }

    /// Graft another path's roots into this one: roots (and recursively
    /// branches) that `self_equals` an existing segment are identified, the
    /// rest are cloned over.
    pub fn combine(&mut self, other: &Path) {
        self.assert_mutable();
        let mut memo: HashMap<usize, usize> = HashMap::new();
        for other_root in other.roots() {
            let own = self
                .roots()
                .into_iter()
                .find(|&r| self.segments[r].self_equals(&other.segments[other_root]));
            match own {
                Some(r) => {
                    memo.insert(other_root, r);
                    self.combine_branches(other, other_root, r, &mut memo);
                }
                None => {
                    let r = self.clone_segment_from(other, other_root);
                    memo.insert(other_root, r);
                    self.combine_branches(other, other_root, r, &mut memo);
                }
            }
        }
    }

    fn combine_branches(
        &mut self,
        other: &Path,
        other_id: usize,
        own_id: usize,
        memo: &mut HashMap<usize, usize>,
    ) {
        let other_branches = other.segments[other_id].branches.clone();
        for ob in other_branches {
            if let Some(&mapped) = memo.get(&ob) {
                self.attach(own_id, mapped);
                continue;
            }
            let own = self.segments[own_id]
                .branches
                .iter()
                .copied()
                .find(|&b| self.segments[b].self_equals(&other.segments[ob]));
            let target = match own {
                Some(b) => b,
                None => {
                    let b = self.clone_segment_from(other, ob);
                    self.attach(own_id, b);
                    b
                }
            };
            memo.insert(ob, target);
            self.combine_branches(other, ob, target, memo);
        }
    }

    fn clone_segment_from(&mut self, other: &Path, other_id: usize) -> usize {
        let id = self.segments.len();
        let mut seg = other.segments[other_id].clone();
        seg.id = id;
        seg.parents.clear();
        seg.branches.clear();
        self.segments.push(seg);
        id
    }
}

#[cfg(test)]
mod tests;
