use crate::Vec3;

/// A ray (or segment) with origin and unnormalized direction.
///
/// The direction is never normalized here. Callers that trace a segment
/// encode its length in `direction` and bound the query to parameter 1;
/// callers that trace an open ray pass an unbounded maximum instead.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray.
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Create the segment running from `from` to `to`.
    #[inline]
    pub fn segment(from: Vec3, to: Vec3) -> Self {
        Self::new(from, to - from)
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: origin + t * direction
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Component-wise reciprocal of the direction.
    ///
    /// A zero component maps to a signed infinity; the slab test in
    /// [`crate::Aabb::hit`] treats such an axis as unconstrained.
    #[inline]
    pub fn inv_direction(&self) -> Vec3 {
        Vec3::ONE / self.direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_at() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);

        assert_eq!(ray.at(0.0), Vec3::ZERO);
        assert_eq!(ray.at(2.0), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(ray.at(-1.0), Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_segment_endpoints() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(-4.0, 0.5, 6.0);
        let ray = Ray::segment(a, b);

        assert_eq!(ray.at(0.0), a);
        assert!((ray.at(1.0) - b).length() < 1e-6);
    }

    #[test]
    fn test_inv_direction_signed_zero() {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, -0.0, 2.0));
        let inv = ray.inv_direction();

        assert_eq!(inv.x, f32::INFINITY);
        assert_eq!(inv.y, f32::NEG_INFINITY);
        assert_eq!(inv.z, 0.5);
    }
}
