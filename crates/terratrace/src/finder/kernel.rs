//! Precomputed arc tables for the bounded-angle search.

/// Arc expansion kernel.
///
/// `arc_count` distinct curvatures per turn direction, `split_count` sub-step
/// resolutions. An arc of index `a` always has per-unit angle
/// `angle_data[a] / step`; the kernel split of a node only modulates how far
/// one expansion commits (`split + 1` sub-steps of `step / split_count`
/// each).
#[derive(Clone, Debug)]
pub struct ArcKernel {
    arc_count: usize,
    split_count: usize,
    /// Turn of arc `a` across one full step, degrees.
    angle_data: Vec<f64>,
    /// `sin_cos_data[a][j]`: sine/cosine of the cumulative turn of arc `a`
    /// after `j + 1` sub-steps.
    sin_cos_data: Vec<Vec<(f64, f64)>>,
}

impl ArcKernel {
    pub fn new(arc_count: usize, split_count: usize) -> Self {
        assert!(arc_count >= 2, "arc_count must be >= 2");
        assert!(split_count >= 1, "split_count must be >= 1");
        let denom = (split_count * arc_count) as f64;
        let angle_data: Vec<f64> = (0..arc_count)
            .map(|i| 180.0 * (i + 1) as f64 / denom)
            .collect();
        let sin_cos_data = angle_data
            .iter()
            .map(|&a| {
                (0..split_count)
                    .map(|j| {
                        let cum = (a * (j + 1) as f64 / split_count as f64).to_radians();
                        (cum.sin(), cum.cos())
                    })
                    .collect()
            })
            .collect();
        Self {
            arc_count,
            split_count,
            angle_data,
            sin_cos_data,
        }
    }

    #[inline]
    pub fn arc_count(&self) -> usize {
        self.arc_count
    }

    #[inline]
    pub fn split_count(&self) -> usize {
        self.split_count
    }

    /// Full-step turn of arc `a`, degrees.
    #[inline]
    pub fn angle(&self, arc_idx: usize) -> f64 {
        self.angle_data[arc_idx]
    }

    /// Cumulative unsigned rotation of arc `a` after `substep + 1` sub-steps.
    #[inline]
    pub fn sin_cos(&self, arc_idx: usize, substep: usize) -> (f64, f64) {
        self.sin_cos_data[arc_idx][substep]
    }

    /// Fraction of a full step covered at kernel split `s`.
    #[inline]
    pub fn split_fraction(&self, s: usize) -> f64 {
        (s + 1) as f64 / self.split_count as f64
    }

    #[inline]
    pub fn max_split_idx(&self) -> usize {
        self.split_count - 1
    }

    /// Distinct quantized headings per half turn.
    #[inline]
    pub fn possible_dir_count(&self) -> usize {
        self.split_count * self.arc_count
    }
}
