//! Raster grids, margins and sampler contracts.
//!
//! The tracer works in outer-grid coordinates: an inner rectangle surrounded
//! by `margin` cells on each side. Output views translate back to map space
//! by subtracting nothing and adding the margin to incoming coordinates, so
//! callers address the inner rectangle at `(0, 0)`.

use std::fmt;
use std::sync::Arc;

/// Rectangular layout: `outer = inner + 2 * margin` on each axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridLayout {
    pub inner_x: usize,
    pub inner_z: usize,
    pub margin: usize,
}

impl GridLayout {
    pub fn new(inner_x: usize, inner_z: usize, margin: usize) -> Self {
        Self {
            inner_x,
            inner_z,
            margin,
        }
    }

    #[inline]
    pub fn outer_x(&self) -> usize {
        self.inner_x + 2 * self.margin
    }

    #[inline]
    pub fn outer_z(&self) -> usize {
        self.inner_z + 2 * self.margin
    }

    /// Whether an outer-grid cell index is inside the outer rectangle.
    #[inline]
    pub fn contains(&self, x: i64, z: i64) -> bool {
        x >= 0 && z >= 0 && (x as usize) < self.outer_x() && (z as usize) < self.outer_z()
    }
}

/// Dense row-major 2D array.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    size_x: usize,
    size_z: usize,
    data: Vec<T>,
}

impl<T: Clone> Grid<T> {
    pub fn new(size_x: usize, size_z: usize, fill: T) -> Self {
        Self {
            size_x,
            size_z,
            data: vec![fill; size_x * size_z],
        }
    }

    #[inline]
    pub fn size_x(&self) -> usize {
        self.size_x
    }

    #[inline]
    pub fn size_z(&self) -> usize {
        self.size_z
    }

    #[inline]
    fn idx(&self, x: usize, z: usize) -> usize {
        debug_assert!(x < self.size_x && z < self.size_z, "grid index out of range");
        z * self.size_x + x
    }

    #[inline]
    pub fn get(&self, x: usize, z: usize) -> &T {
        &self.data[self.idx(x, z)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, z: usize, v: T) {
        let i = self.idx(x, z);
        self.data[i] = v;
    }

    pub fn fill(&mut self, v: T) {
        self.data.fill(v);
    }
}

impl Grid<f64> {
    /// Bilinear sample at a fractional position; clamped at the borders.
    pub fn sample(&self, x: f64, z: f64) -> f64 {
        let cx = x.clamp(0.0, (self.size_x - 1) as f64);
        let cz = z.clamp(0.0, (self.size_z - 1) as f64);
        let x0 = cx.floor() as usize;
        let z0 = cz.floor() as usize;
        let x1 = (x0 + 1).min(self.size_x - 1);
        let z1 = (z0 + 1).min(self.size_z - 1);
        let fx = cx - x0 as f64;
        let fz = cz - z0 as f64;
        let a = self.get(x0, z0) * (1.0 - fx) + self.get(x1, z0) * fx;
        let b = self.get(x0, z1) * (1.0 - fx) + self.get(x1, z1) * fx;
        a * (1.0 - fz) + b * fz
    }
}

/// Pure, deterministic 2D scalar field.
pub trait GridSampler: fmt::Debug + Send + Sync {
    fn value_at(&self, x: f64, z: f64) -> f64;
}

impl GridSampler for Grid<f64> {
    fn value_at(&self, x: f64, z: f64) -> f64 {
        self.sample(x, z)
    }
}

/// Pure, deterministic 1D scalar function.
pub trait CurveSampler: fmt::Debug + Send + Sync {
    fn value_at(&self, x: f64) -> f64;
}

/// Constant field, handy as a sampler literal.
#[derive(Clone, Copy, Debug)]
pub struct ConstField(pub f64);

impl GridSampler for ConstField {
    fn value_at(&self, _x: f64, _z: f64) -> f64 {
        self.0
    }
}

impl CurveSampler for ConstField {
    fn value_at(&self, _x: f64) -> f64 {
        self.0
    }
}

/// Sampler backed by a closure; used by tests and callers with procedural
/// fields.
pub struct FnField<F>(pub F);

impl<F> fmt::Debug for FnField<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnField")
    }
}

impl<F: Fn(f64, f64) -> f64 + Send + Sync> GridSampler for FnField<F> {
    fn value_at(&self, x: f64, z: f64) -> f64 {
        (self.0)(x, z)
    }
}

/// A sampler scaled by a constant factor.
#[derive(Clone, Debug)]
pub struct ScaledSampler {
    pub inner: Arc<dyn GridSampler>,
    pub scale: f64,
}

impl GridSampler for ScaledSampler {
    fn value_at(&self, x: f64, z: f64) -> f64 {
        self.inner.value_at(x, z) * self.scale
    }
}

/// Read-only view over an output grid, translated to map space.
///
/// Map coordinate `(0, 0)` addresses the inner rectangle's origin, which sits
/// at `(margin, margin)` in the outer grid.
#[derive(Clone, Copy, Debug)]
pub struct GridView<'a> {
    grid: &'a Grid<f64>,
    margin: f64,
}

impl<'a> GridView<'a> {
    pub fn new(grid: &'a Grid<f64>, margin: usize) -> Self {
        Self {
            grid,
            margin: margin as f64,
        }
    }

    pub fn value_at(&self, x: f64, z: f64) -> f64 {
        self.grid.sample(x + self.margin, z + self.margin)
    }
}
