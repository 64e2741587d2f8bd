//! Ray query engine: nearest-hit and any-hit casts through the BVH.
//!
//! Directions are never normalized. A caller tracing a segment encodes its
//! length in `dir` and passes `max_param = 1.0`; a caller tracing an open
//! ray passes `f32::INFINITY`. Only hits with parameter in
//! `(T_MIN, max_param)` count.

use std::sync::Arc;

use lumen_core::Scene;
use lumen_math::{Interval, Ray, Vec3};

use crate::bvh::{Bvh, BvhConfig};
use crate::error::BvhError;
use crate::hit::Hit;

/// Smallest ray parameter accepted as a hit.
pub const T_MIN: f32 = 1e-6;

/// Scene plus the hierarchy built over it.
pub struct RayTracer {
    scene: Arc<Scene>,
    bvh: Bvh,
}

impl RayTracer {
    /// Build a hierarchy for `scene`.
    pub fn new(scene: Arc<Scene>, config: BvhConfig) -> Result<Self, BvhError> {
        let bvh = Bvh::build(scene.triangles(), config)?;
        Ok(Self { scene, bvh })
    }

    /// Use an existing hierarchy (e.g. one loaded from disk).
    ///
    /// The hierarchy must have been built over this scene's triangles.
    pub fn with_bvh(scene: Arc<Scene>, bvh: Bvh) -> Self {
        Self { scene, bvh }
    }

    #[inline]
    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    #[inline]
    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    /// Closest hit along `orig + t * dir` for `t` in `(T_MIN, max_param)`.
    ///
    /// Both children of every visited node are tested; the second one is
    /// only searched up to the closest hit so far, so on an exact tie the
    /// left subtree's hit is kept.
    pub fn ray_cast(&self, orig: Vec3, dir: Vec3, max_param: f32) -> Option<Hit> {
        let ray = Ray::new(orig, dir);
        let inv_dir = ray.inv_direction();
        let positions = self.scene.positions();
        let triangles = self.scene.triangles();
        let nodes = self.bvh.nodes();

        let mut range = Interval::new(T_MIN, max_param);
        let mut closest: Option<(usize, f32, f32, f32)> = None;
        let mut stack = Vec::with_capacity(64);
        stack.push(0usize);

        while let Some(idx) = stack.pop() {
            let node = &nodes[idx];
            if !node.bounds.hit(&ray, inv_dir, range.max) {
                continue;
            }

            match node.children {
                Some([left, right]) => {
                    // Left is popped first
                    stack.push(right);
                    stack.push(left);
                }
                None => {
                    for &tri in self.bvh.prims(node) {
                        let tri = tri as usize;
                        if let Some(h) = triangles[tri].intersect(positions, &ray, range) {
                            range = range.clip_max(h.t);
                            closest = Some((tri, h.t, h.u, h.v));
                        }
                    }
                }
            }
        }

        closest.map(|(triangle, t, u, v)| Hit {
            triangle,
            point: ray.at(t),
            t,
            u,
            v,
        })
    }

    /// True if anything blocks `orig + t * dir` for `t` in `(T_MIN, max_param)`.
    ///
    /// Returns on the first hit found in any subtree.
    pub fn ray_cast_shadow(&self, orig: Vec3, dir: Vec3, max_param: f32) -> bool {
        let ray = Ray::new(orig, dir);
        let inv_dir = ray.inv_direction();
        let positions = self.scene.positions();
        let triangles = self.scene.triangles();
        let nodes = self.bvh.nodes();
        let range = Interval::new(T_MIN, max_param);

        let mut stack = Vec::with_capacity(64);
        stack.push(0usize);

        while let Some(idx) = stack.pop() {
            let node = &nodes[idx];
            if !node.bounds.hit(&ray, inv_dir, max_param) {
                continue;
            }

            match node.children {
                Some([left, right]) => {
                    stack.push(right);
                    stack.push(left);
                }
                None => {
                    let blocked = self
                        .bvh
                        .prims(node)
                        .iter()
                        .any(|&tri| triangles[tri as usize].intersect(positions, &ray, range).is_some());
                    if blocked {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Brute-force closest hit over every triangle, without the hierarchy.
    pub fn ray_cast_linear(&self, orig: Vec3, dir: Vec3, max_param: f32) -> Option<Hit> {
        let ray = Ray::new(orig, dir);
        let positions = self.scene.positions();

        let mut range = Interval::new(T_MIN, max_param);
        let mut closest = None;
        for (tri, triangle) in self.scene.triangles().iter().enumerate() {
            if let Some(h) = triangle.intersect(positions, &ray, range) {
                range = range.clip_max(h.t);
                closest = Some(Hit {
                    triangle: tri,
                    point: ray.at(h.t),
                    t: h.t,
                    u: h.u,
                    v: h.v,
                });
            }
        }
        closest
    }
}
