//! Triangle records for ray tracing.
//!
//! A triangle stores the indices of its three vertices in the scene's
//! vertex buffer, never the positions themselves, plus values derived
//! once at construction: unit face normal, centroid, bounds and area.

use lumen_math::{Aabb, Interval, Ray, Vec3};

/// Triangles with less area than this are treated as degenerate.
pub const DEGENERATE_AREA: f32 = 1e-12;

/// Determinant threshold below which a ray counts as parallel.
const PARALLEL_EPSILON: f32 = 1e-10;

/// Back-reference into the mesh the triangle came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TriangleSource {
    /// Submesh (and so material) index
    pub submesh: u32,
    /// Triangle index within the submesh
    pub index: u32,
}

/// Result of a ray/triangle test: ray parameter and the barycentric
/// coordinates of vertices 1 and 2.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleHit {
    pub t: f32,
    pub u: f32,
    pub v: f32,
}

/// A triangle in the frozen scene.
#[derive(Clone, Debug, PartialEq)]
pub struct Triangle {
    vertices: [u32; 3],
    normal: Vec3,
    centroid: Vec3,
    bounds: Aabb,
    area: f32,
    source: TriangleSource,
}

impl Triangle {
    /// Create a triangle from vertex indices into `positions`.
    ///
    /// Indices must be in range; [`crate::Mesh::validate`] checks this
    /// before any triangle is built. A zero-area triangle gets a zero normal
    /// and reports itself through [`Triangle::is_degenerate`].
    pub fn new(positions: &[Vec3], vertices: [u32; 3], source: TriangleSource) -> Self {
        let [v0, v1, v2] = vertices.map(|i| positions[i as usize]);

        let cross = (v1 - v0).cross(v2 - v0);
        let double_area = cross.length();
        let area = 0.5 * double_area;
        let normal = if area > DEGENERATE_AREA {
            cross / double_area
        } else {
            Vec3::ZERO
        };

        Self {
            vertices,
            normal,
            centroid: (v0 + v1 + v2) / 3.0,
            bounds: Aabb::from_triangle(v0, v1, v2),
            area,
            source,
        }
    }

    /// Vertex indices into the scene's vertex buffer.
    #[inline]
    pub fn vertices(&self) -> [u32; 3] {
        self.vertices
    }

    /// Unit face normal (zero for degenerate triangles).
    #[inline]
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    #[inline]
    pub fn centroid(&self) -> Vec3 {
        self.centroid
    }

    #[inline]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.area
    }

    #[inline]
    pub fn source(&self) -> TriangleSource {
        self.source
    }

    /// True if the triangle has (numerically) no area.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.area <= DEGENERATE_AREA
    }

    /// Fetch the three corner positions.
    #[inline]
    pub fn corners(&self, positions: &[Vec3]) -> [Vec3; 3] {
        self.vertices.map(|i| positions[i as usize])
    }

    /// Möller-Trumbore ray-triangle intersection.
    ///
    /// Returns the hit when its parameter lies strictly inside `range`.
    /// Degenerate triangles never report a hit.
    pub fn intersect(&self, positions: &[Vec3], ray: &Ray, range: Interval) -> Option<TriangleHit> {
        if self.is_degenerate() {
            return None;
        }

        let [v0, v1, v2] = self.corners(positions);
        let edge1 = v1 - v0;
        let edge2 = v2 - v0;

        let h = ray.direction.cross(edge2);
        let a = edge1.dot(h);

        // Ray is parallel to triangle
        if a.abs() < PARALLEL_EPSILON {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - v0;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = f * ray.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(q);
        if !range.surrounds(t) {
            return None;
        }

        Some(TriangleHit { t, u, v })
    }
}

/// Full barycentric weights `(1 - u - v, u, v)` for vertices 0, 1, 2.
#[inline]
pub fn barycentric_weights(u: f32, v: f32) -> Vec3 {
    Vec3::new(1.0 - u - v, u, v)
}
