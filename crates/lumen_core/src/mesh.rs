//! Mesh data as handed over by the mesh import layer.
//!
//! A `Mesh` is a flat vertex buffer plus per-submesh triangle index
//! triples. It is mutable while being assembled; [`crate::Scene::new`]
//! validates it and freezes it for ray tracing.

use lumen_math::{Aabb, Vec2, Vec3};

use crate::error::{SceneError, SceneResult};

/// A group of triangles sharing one material.
#[derive(Clone, Debug, Default)]
pub struct Submesh {
    /// Vertex index triples into the mesh's vertex buffer
    pub indices: Vec<[u32; 3]>,

    /// Index into the scene's material list
    pub material: usize,
}

impl Submesh {
    /// Create a submesh from index triples and a material id.
    pub fn new(indices: Vec<[u32; 3]>, material: usize) -> Self {
        Self { indices, material }
    }
}

/// A mesh consisting of vertex positions, optional normals/UVs, and submeshes.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    /// Vertex positions (one Vec3 per vertex)
    pub positions: Vec<Vec3>,

    /// Vertex normals (optional - smooth normals are computed if absent)
    pub normals: Option<Vec<Vec3>>,

    /// UV coordinates (optional - one per vertex, needed for textures)
    pub uvs: Option<Vec<Vec2>>,

    /// Triangle groups
    pub submeshes: Vec<Submesh>,
}

impl Mesh {
    /// Create a new mesh from positions and submeshes.
    pub fn new(positions: Vec<Vec3>, submeshes: Vec<Submesh>) -> Self {
        Self {
            positions,
            normals: None,
            uvs: None,
            submeshes,
        }
    }

    /// Attach per-vertex normals.
    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = Some(normals);
        self
    }

    /// Attach per-vertex UV coordinates.
    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    /// Get the number of vertices in the mesh.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Get the number of triangles across all submeshes.
    pub fn triangle_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.indices.len()).sum()
    }

    /// Axis-aligned bounds of all vertex positions.
    pub fn bounds(&self) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        for p in &self.positions {
            bounds.grow(*p);
        }
        bounds
    }

    /// Check every index triple and attribute array against the vertex count.
    pub fn validate(&self) -> SceneResult<()> {
        let vertex_count = self.positions.len();

        for (submesh, sm) in self.submeshes.iter().enumerate() {
            for (triangle, tri) in sm.indices.iter().enumerate() {
                if let Some(&index) = tri.iter().find(|&&i| i as usize >= vertex_count) {
                    return Err(SceneError::VertexIndexOutOfRange {
                        submesh,
                        triangle,
                        index,
                        vertex_count,
                    });
                }
            }
        }

        if let Some(normals) = &self.normals {
            if normals.len() != vertex_count {
                return Err(SceneError::AttributeLength {
                    attribute: "normals",
                    len: normals.len(),
                    vertex_count,
                });
            }
        }
        if let Some(uvs) = &self.uvs {
            if uvs.len() != vertex_count {
                return Err(SceneError::AttributeLength {
                    attribute: "uvs",
                    len: uvs.len(),
                    vertex_count,
                });
            }
        }

        Ok(())
    }

    /// Compute smooth vertex normals by averaging area-weighted face normals.
    ///
    /// Replaces existing normals. Vertices touched only by degenerate
    /// triangles (or by none) get +Y. Assumes indices are in range.
    pub fn compute_normals(&mut self) {
        self.normals = Some(self.smooth_normals());
    }

    fn smooth_normals(&self) -> Vec<Vec3> {
        let vertex_count = self.positions.len();
        let mut normals = vec![Vec3::ZERO; vertex_count];

        for tri in self.submeshes.iter().flat_map(|s| s.indices.iter()) {
            let [i0, i1, i2] = tri.map(|i| i as usize);
            if i0 >= vertex_count || i1 >= vertex_count || i2 >= vertex_count {
                continue;
            }

            let p0 = self.positions[i0];
            let edge1 = self.positions[i1] - p0;
            let edge2 = self.positions[i2] - p0;
            let face_normal = edge1.cross(edge2);

            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }

        for normal in &mut normals {
            *normal = normal.try_normalize().unwrap_or(Vec3::Y);
        }
        normals
    }

    /// Ensure the mesh has unit normals, computing them if necessary.
    ///
    /// Supplied normals are normalized; a zero or non-finite one is replaced
    /// by the smooth normal of its vertex.
    pub fn ensure_normals(&mut self) {
        let should_compute = match &self.normals {
            None => true,
            Some(normals) => normals.len() != self.positions.len(),
        };

        if should_compute {
            if let Some(normals) = &self.normals {
                log::debug!(
                    "Normals array length ({}) doesn't match vertex count ({}), computing smooth normals",
                    normals.len(),
                    self.positions.len()
                );
            }
            self.compute_normals();
            return;
        }

        let mut smooth: Option<Vec<Vec3>> = None;
        let mut replaced = 0;
        let Some(normals) = self.normals.take() else {
            return;
        };
        let normals: Vec<Vec3> = normals
            .into_iter()
            .enumerate()
            .map(|(v, n)| {
                n.try_normalize().unwrap_or_else(|| {
                    replaced += 1;
                    smooth.get_or_insert_with(|| self.smooth_normals())[v]
                })
            })
            .collect();
        if replaced > 0 {
            log::warn!("Replaced {} unusable vertex normals with smooth normals", replaced);
        }
        self.normals = Some(normals);
    }
}
