use crate::{Axis, Interval, Ray, Vec3};

/// Axis-aligned bounding box stored as its two extreme corners.
///
/// Boxes are kept tight: a flat triangle yields a box with zero extent on
/// one axis, and the slab test accepts rays that touch such a box.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// An empty box (contains nothing, unions as identity).
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create a box from two corners, in any order.
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Smallest box containing all three points.
    pub fn from_triangle(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self {
            min: v0.min(v1).min(v2),
            max: v0.max(v1).max(v2),
        }
    }

    /// Create a box that surrounds two other boxes.
    pub fn surrounding(box0: &Aabb, box1: &Aabb) -> Self {
        Self {
            min: box0.min.min(box1.min),
            max: box0.max.max(box1.max),
        }
    }

    /// Grow the box to include a point.
    pub fn grow(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// True if no point has been added yet.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Get the interval for a specific axis.
    pub fn axis_interval(&self, axis: Axis) -> Interval {
        let i = axis.index();
        Interval::new(self.min[i], self.max[i])
    }

    /// Size of the box along each axis (zero for an empty box).
    pub fn extent(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Returns the center point of the bounding box.
    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Total surface area, `2 (wh + wd + hd)`.
    pub fn surface_area(&self) -> f32 {
        let e = self.extent();
        2.0 * (e.x * e.y + e.x * e.z + e.y * e.z)
    }

    /// Axis of largest extent.
    ///
    /// Extents within `f32::EPSILON` (relative) of each other tie, and the
    /// earlier axis in x, y, z order wins.
    pub fn longest_axis(&self) -> Axis {
        let e = self.extent();
        let mut best = Axis::X;
        for axis in [Axis::Y, Axis::Z] {
            let current = e[best.index()];
            let candidate = e[axis.index()];
            if candidate > current + f32::EPSILON * current.abs().max(1.0) {
                best = axis;
            }
        }
        best
    }

    /// True if `p` lies inside the box, allowing `tolerance` slack.
    pub fn contains_point(&self, p: Vec3, tolerance: f32) -> bool {
        p.cmpge(self.min - Vec3::splat(tolerance)).all()
            && p.cmple(self.max + Vec3::splat(tolerance)).all()
    }

    /// Slab test against a ray whose reciprocal direction is precomputed.
    ///
    /// An axis whose direction component is a signed zero (reciprocal of
    /// ±infinity) places no constraint on the parameter range; the ray only
    /// has to start between that axis' slabs. Rejects when the entry/exit
    /// range becomes empty, when the box lies behind the origin
    /// (`exit <= 0`), or when it starts at or beyond `max_param`.
    pub fn hit(&self, ray: &Ray, inv_dir: Vec3, max_param: f32) -> bool {
        let mut t_enter = f32::NEG_INFINITY;
        let mut t_exit = f32::INFINITY;

        for i in 0..3 {
            let origin = ray.origin[i];
            let inv = inv_dir[i];

            if inv.is_infinite() {
                if origin < self.min[i] || origin > self.max[i] {
                    return false;
                }
                continue;
            }

            let mut t0 = (self.min[i] - origin) * inv;
            let mut t1 = (self.max[i] - origin) * inv;
            if inv < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }

            t_enter = t_enter.max(t0);
            t_exit = t_exit.min(t1);
            if t_exit < t_enter {
                return false;
            }
        }

        t_exit > 0.0 && t_enter < max_param
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}
