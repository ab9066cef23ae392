//! 2D geometry primitives on an `(x, z)` grid.
//!
//! Conventions
//! - All angles are degrees, clockwise-positive.
//! - `direction(a) = (cos(-a), sin(-a))`, so `direction(0)` points along +x
//!   and a positive turn rotates toward -z.
//! - `perp_cw(v)` is `v` rotated 90 deg clockwise; lateral shifts are
//!   positive on the clockwise side of a heading.

mod angle;
mod vec;

pub use angle::{direction, normalize_deg, signed_angle};
pub use vec::{try_intersect, Vec2Ext};

pub use nalgebra::Vector2;

/// The working 2D vector type.
pub type Vec2 = Vector2<f64>;

#[cfg(test)]
mod tests;
