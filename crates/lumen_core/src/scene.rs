//! The frozen scene the ray tracer works on.
//!
//! `SceneBuilder` appends geometry into a growing vertex buffer; `build`
//! validates it and produces a `Scene` whose buffers never change again.
//! Triangles refer to vertices by index, so the BVH and every integrator
//! can share the scene across threads behind an `Arc`.

use lumen_math::{Aabb, Axis, Vec2, Vec3};

use crate::error::{SceneError, SceneResult};
use crate::hash::SceneHash;
use crate::material::Material;
use crate::mesh::{Mesh, Submesh};
use crate::triangle::{barycentric_weights, Triangle, TriangleSource};

/// Immutable geometry store.
#[derive(Clone, Debug)]
pub struct Scene {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Option<Vec<Vec2>>,
    materials: Vec<Material>,
    submesh_materials: Vec<usize>,
    triangles: Vec<Triangle>,
    bounds: Aabb,
    hash: SceneHash,
    degenerate_count: usize,
}

impl Scene {
    /// Validate a mesh and freeze it.
    ///
    /// Missing normals are computed. Degenerate triangles are kept (so
    /// triangle ids still match the mesh) but never produce hits; their
    /// count is logged.
    pub fn new(mut mesh: Mesh, materials: Vec<Material>) -> SceneResult<Self> {
        mesh.validate()?;

        for (submesh, sm) in mesh.submeshes.iter().enumerate() {
            let material = materials
                .get(sm.material)
                .ok_or(SceneError::UnknownMaterial {
                    submesh,
                    material: sm.material,
                    material_count: materials.len(),
                })?;
            if material.is_textured() && mesh.uvs.is_none() {
                return Err(SceneError::MissingUvs(material.name.clone()));
            }
        }

        mesh.ensure_normals();

        let mut triangles = Vec::with_capacity(mesh.triangle_count());
        for (submesh, sm) in mesh.submeshes.iter().enumerate() {
            for (index, &verts) in sm.indices.iter().enumerate() {
                let source = TriangleSource {
                    submesh: submesh as u32,
                    index: index as u32,
                };
                triangles.push(Triangle::new(&mesh.positions, verts, source));
            }
        }

        if triangles.is_empty() {
            return Err(SceneError::Empty);
        }

        let degenerate_count = triangles.iter().filter(|t| t.is_degenerate()).count();
        if degenerate_count > 0 {
            log::warn!(
                "{} of {} triangles are degenerate and will be skipped",
                degenerate_count,
                triangles.len()
            );
        }

        let bounds = triangles
            .iter()
            .fold(Aabb::EMPTY, |acc, t| Aabb::surrounding(&acc, &t.bounds()));
        let hash = SceneHash::of_positions(&mesh.positions);

        log::info!(
            "Scene: {} vertices, {} triangles, {} materials, hash {}",
            mesh.positions.len(),
            triangles.len(),
            materials.len(),
            hash
        );

        let Mesh {
            positions,
            normals,
            uvs,
            submeshes,
        } = mesh;

        Ok(Self {
            positions,
            normals: normals.unwrap_or_default(),
            uvs,
            materials,
            submesh_materials: submeshes.iter().map(|s| s.material).collect(),
            triangles,
            bounds,
            hash,
            degenerate_count,
        })
    }

    #[inline]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    #[inline]
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    #[inline]
    pub fn uvs(&self) -> Option<&[Vec2]> {
        self.uvs.as_deref()
    }

    #[inline]
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    #[inline]
    pub fn triangle(&self, index: usize) -> &Triangle {
        &self.triangles[index]
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    /// Bounds of all triangles.
    #[inline]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Content hash of the vertex buffer.
    #[inline]
    pub fn fingerprint(&self) -> SceneHash {
        self.hash
    }

    #[inline]
    pub fn degenerate_count(&self) -> usize {
        self.degenerate_count
    }

    /// Material of a triangle.
    pub fn material_of(&self, triangle: usize) -> &Material {
        let submesh = self.triangles[triangle].source().submesh as usize;
        &self.materials[self.submesh_materials[submesh]]
    }

    /// Diffuse albedo at barycentric `(u, v)` on a triangle.
    ///
    /// Textured materials are point sampled at the interpolated UV.
    pub fn albedo(&self, triangle: usize, u: f32, v: f32) -> Vec3 {
        let material = self.material_of(triangle);
        match &self.uvs {
            Some(uvs) if material.is_textured() => {
                let w = barycentric_weights(u, v);
                let [a, b, c] = self.triangles[triangle].vertices().map(|i| uvs[i as usize]);
                material.albedo(a * w.x + b * w.y + c * w.z)
            }
            _ => material.diffuse,
        }
    }

    /// Smooth shading normal at barycentric `(u, v)` on a triangle.
    ///
    /// Falls back to the face normal when the interpolated normal vanishes.
    pub fn shading_normal(&self, triangle: usize, u: f32, v: f32) -> Vec3 {
        let tri = &self.triangles[triangle];
        let w = barycentric_weights(u, v);
        let [a, b, c] = tri.vertices().map(|i| self.normals[i as usize]);
        (a * w.x + b * w.y + c * w.z)
            .try_normalize()
            .unwrap_or(tri.normal())
    }

    /// Interpolate a per-vertex quantity at barycentric `(u, v)`.
    pub fn interpolate(&self, values: &[Vec3], triangle: usize, u: f32, v: f32) -> Vec3 {
        let w = barycentric_weights(u, v);
        let [a, b, c] = self.triangles[triangle].vertices().map(|i| values[i as usize]);
        a * w.x + b * w.y + c * w.z
    }
}

/// Append-only assembly of a scene.
#[derive(Debug, Default)]
pub struct SceneBuilder {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    submeshes: Vec<Submesh>,
    materials: Vec<Material>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a material and return its id.
    pub fn add_material(&mut self, material: Material) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Append a mesh, offsetting its indices past the existing vertices.
    ///
    /// Submesh material ids are taken as-is. Missing normals are computed
    /// and missing UVs are zero-filled.
    pub fn add_mesh(&mut self, mut mesh: Mesh) -> SceneResult<()> {
        mesh.validate()?;
        mesh.ensure_normals();

        let base = self.positions.len() as u32;
        let count = mesh.positions.len();

        self.positions.extend_from_slice(&mesh.positions);
        self.normals
            .extend(mesh.normals.unwrap_or_else(|| vec![Vec3::Y; count]));
        self.uvs
            .extend(mesh.uvs.unwrap_or_else(|| vec![Vec2::ZERO; count]));

        for sm in mesh.submeshes {
            let indices = sm.indices.iter().map(|t| t.map(|i| i + base)).collect();
            self.push_triangles(indices, sm.material);
        }
        Ok(())
    }

    /// Append a parallelogram centred at `center` spanned by `±u ± v`.
    ///
    /// Winding makes the face normal point along `u × v`.
    pub fn add_parallelogram(&mut self, center: Vec3, u: Vec3, v: Vec3, material: usize) {
        let normal = u.cross(v).try_normalize().unwrap_or(Vec3::Y);
        let base = self.positions.len() as u32;

        self.positions.extend_from_slice(&[
            center - u - v,
            center + u - v,
            center + u + v,
            center - u + v,
        ]);
        self.normals.extend_from_slice(&[normal; 4]);
        self.uvs.extend_from_slice(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ]);

        self.push_triangles(
            vec![[base, base + 1, base + 2], [base, base + 2, base + 3]],
            material,
        );
    }

    /// Append a rectangle facing `normal` with the given half extents.
    pub fn add_quad(&mut self, center: Vec3, normal: Vec3, half_extent: Vec2, material: usize) {
        let frame = lumen_math::form_basis(normal.normalize());
        self.add_parallelogram(
            center,
            frame.x_axis * half_extent.x,
            frame.y_axis * half_extent.y,
            material,
        );
    }

    /// Append an axis-aligned box made of six quads.
    ///
    /// With `inward` the faces point into the box (a closed room),
    /// otherwise out of it.
    pub fn add_box(&mut self, center: Vec3, half: Vec3, inward: bool, material: usize) {
        for axis in Axis::ALL {
            let i = axis.index();
            let j = (i + 1) % 3;
            let k = (i + 2) % 3;

            for sign in [1.0f32, -1.0] {
                let mut outward = Vec3::ZERO;
                outward[i] = sign;

                let mut u = Vec3::ZERO;
                u[j] = half[j];
                let mut v = Vec3::ZERO;
                v[k] = half[k] * sign * if inward { -1.0 } else { 1.0 };

                self.add_parallelogram(center + outward * half[i], u, v, material);
            }
        }
    }

    /// Freeze the accumulated geometry.
    pub fn build(self) -> SceneResult<Scene> {
        let mesh = Mesh::new(self.positions, self.submeshes)
            .with_normals(self.normals)
            .with_uvs(self.uvs);
        Scene::new(mesh, self.materials)
    }

    fn push_triangles(&mut self, indices: Vec<[u32; 3]>, material: usize) {
        match self.submeshes.iter_mut().find(|s| s.material == material) {
            Some(sm) => sm.indices.extend(indices),
            None => self.submeshes.push(Submesh::new(indices, material)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::texture::Texture;

    fn grey() -> Material {
        Material::new("grey", Vec3::splat(0.8))
    }

    #[test]
    fn test_quad_winding_matches_normal() {
        for normal in [Vec3::Y, Vec3::NEG_Y, Vec3::X, Vec3::new(1.0, 2.0, -3.0).normalize()] {
            let mut builder = SceneBuilder::new();
            let m = builder.add_material(grey());
            builder.add_quad(Vec3::ZERO, normal, Vec2::new(1.0, 2.0), m);
            let scene = builder.build().unwrap();

            assert_eq!(scene.triangle_count(), 2);
            for tri in scene.triangles() {
                assert!((tri.normal() - normal).length() < 1e-5);
            }
            let area: f32 = scene.triangles().iter().map(|t| t.area()).sum();
            assert!((area - 8.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_box_faces_point_inward() {
        let mut builder = SceneBuilder::new();
        let m = builder.add_material(grey());
        builder.add_box(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 2.0, 0.5), true, m);
        let scene = builder.build().unwrap();

        assert_eq!(scene.triangle_count(), 12);
        let center = Vec3::new(1.0, 2.0, 3.0);
        for tri in scene.triangles() {
            // Normal points from the face towards the box centre
            assert!(tri.normal().dot(center - tri.centroid()) > 0.0);
        }
    }

    #[test]
    fn test_box_faces_point_outward() {
        let mut builder = SceneBuilder::new();
        let m = builder.add_material(grey());
        builder.add_box(Vec3::ZERO, Vec3::ONE, false, m);
        let scene = builder.build().unwrap();

        for tri in scene.triangles() {
            assert!(tri.normal().dot(-tri.centroid()) < 0.0);
        }
        assert_eq!(scene.bounds().min, Vec3::splat(-1.0));
        assert_eq!(scene.bounds().max, Vec3::ONE);
    }

    #[test]
    fn test_empty_scene_rejected() {
        let builder = SceneBuilder::new();
        assert_eq!(builder.build().unwrap_err(), SceneError::Empty);
    }

    #[test]
    fn test_unknown_material_rejected() {
        let mesh = Mesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![Submesh::new(vec![[0, 1, 2]], 3)],
        );
        let err = Scene::new(mesh, vec![grey()]).unwrap_err();
        assert!(matches!(err, SceneError::UnknownMaterial { material: 3, .. }));
    }

    #[test]
    fn test_textured_material_needs_uvs() {
        let mesh = Mesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![Submesh::new(vec![[0, 1, 2]], 0)],
        );
        let tex = Arc::new(Texture::solid_color(Vec3::ONE));
        let err = Scene::new(mesh, vec![grey().with_texture(tex)]).unwrap_err();
        assert_eq!(err, SceneError::MissingUvs("grey".to_string()));
    }

    #[test]
    fn test_degenerate_triangles_are_counted() {
        let mesh = Mesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::X * 2.0],
            vec![Submesh::new(vec![[0, 1, 2], [0, 1, 3]], 0)],
        );
        let scene = Scene::new(mesh, vec![grey()]).unwrap();
        assert_eq!(scene.triangle_count(), 2);
        assert_eq!(scene.degenerate_count(), 1);
        for n in scene.normals() {
            assert!(n.is_finite());
        }
    }

    #[test]
    fn test_albedo_lookup() {
        let mut builder = SceneBuilder::new();
        let flat = builder.add_material(grey());
        let checker = Texture::new(
            2,
            1,
            vec![[1.0, 0.0, 0.0, 1.0], [0.0, 0.0, 1.0, 1.0]],
        )
        .unwrap();
        let textured =
            builder.add_material(Material::default().with_texture(Arc::new(checker)));

        builder.add_quad(Vec3::ZERO, Vec3::Y, Vec2::ONE, flat);
        builder.add_quad(Vec3::Y * 3.0, Vec3::NEG_Y, Vec2::ONE, textured);
        let scene = builder.build().unwrap();

        assert_eq!(scene.albedo(0, 0.3, 0.3), Vec3::splat(0.8));

        // Triangle 2 is (c0, c1, c2) of the textured quad with UVs
        // (0,0), (1,0), (1,1): u weights c1, v weights c2.
        assert_eq!(scene.albedo(2, 0.1, 0.1), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(scene.albedo(2, 0.8, 0.1), Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_fingerprint_tracks_positions() {
        let build = |offset: f32| {
            let mut builder = SceneBuilder::new();
            let m = builder.add_material(grey());
            builder.add_quad(Vec3::new(0.0, offset, 0.0), Vec3::Y, Vec2::ONE, m);
            builder.build().unwrap()
        };
        assert_eq!(build(0.0).fingerprint(), build(0.0).fingerprint());
        assert_ne!(build(0.0).fingerprint(), build(1.0).fingerprint());
    }

    #[test]
    fn test_supplied_normals_become_unit() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Z, Vec3::new(1.0, 0.0, 1.0)];
        let mesh = Mesh::new(positions, vec![Submesh::new(vec![[0, 2, 1], [1, 2, 3]], 0)])
            .with_normals(vec![Vec3::Y * 3.0, Vec3::Y * 0.5, Vec3::ZERO, Vec3::Y]);
        let scene = Scene::new(mesh, vec![grey()]).unwrap();

        for n in scene.normals() {
            assert!((*n - Vec3::Y).length() < 1e-6, "{n:?}");
        }
        assert!((scene.shading_normal(0, 0.3, 0.3).length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_add_mesh_offsets_indices() {
        let mut builder = SceneBuilder::new();
        let m = builder.add_material(grey());
        builder.add_quad(Vec3::ZERO, Vec3::Y, Vec2::ONE, m);

        let tri = Mesh::new(
            vec![Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 1.0, 0.0), Vec3::new(0.0, 1.0, 1.0)],
            vec![Submesh::new(vec![[0, 2, 1]], m)],
        );
        builder.add_mesh(tri).unwrap();
        let scene = builder.build().unwrap();

        assert_eq!(scene.vertex_count(), 7);
        assert_eq!(scene.triangle(2).vertices(), [4, 6, 5]);
        assert!((scene.triangle(2).normal() - Vec3::Y).length() < 1e-6);
        assert!((scene.shading_normal(2, 0.2, 0.2) - Vec3::Y).length() < 1e-6);
    }
}
