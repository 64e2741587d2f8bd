//! Ray query results.

use lumen_core::barycentric_weights;
use lumen_math::Vec3;

/// Closest intersection found by a ray cast.
///
/// A miss is `None` at the call site; there is no sentinel `t`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    /// Index of the triangle in the scene
    pub triangle: usize,

    /// World-space intersection point
    pub point: Vec3,

    /// Ray parameter of the hit (in units of the unnormalized direction)
    pub t: f32,

    /// Barycentric weight of the triangle's second vertex
    pub u: f32,

    /// Barycentric weight of the triangle's third vertex
    pub v: f32,
}

impl Hit {
    /// Full barycentrics `(1 - u - v, u, v)`.
    #[inline]
    pub fn barycentrics(&self) -> Vec3 {
        barycentric_weights(self.u, self.v)
    }
}
