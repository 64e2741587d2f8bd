//! Lumen math types.
//!
//! Thin layer over glam with the handful of ray tracing primitives the
//! rest of the workspace shares: parameter intervals, axis-aligned boxes
//! with a slab test, rays and orthonormal frames.

// Re-export glam for convenience
pub use glam::*;

mod aabb;
mod basis;
mod interval;
mod ray;

pub use aabb::Aabb;
pub use basis::{form_basis, Axis};
pub use interval::Interval;
pub use ray::Ray;
