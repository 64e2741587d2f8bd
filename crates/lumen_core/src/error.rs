//! Errors raised while ingesting scene data.

use thiserror::Error;

/// Errors that can occur while freezing a mesh into a [`crate::Scene`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("Scene contains no triangles")]
    Empty,

    #[error("Triangle {triangle} of submesh {submesh} references vertex {index}, but only {vertex_count} vertices exist")]
    VertexIndexOutOfRange {
        submesh: usize,
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("{attribute} array has {len} entries, expected one per vertex ({vertex_count})")]
    AttributeLength {
        attribute: &'static str,
        len: usize,
        vertex_count: usize,
    },

    #[error("Submesh {submesh} uses material {material}, but only {material_count} materials exist")]
    UnknownMaterial {
        submesh: usize,
        material: usize,
        material_count: usize,
    },

    #[error("Textured material '{0}' requires per-vertex UVs")]
    MissingUvs(String),

    #[error("Texture of {width}x{height} cannot hold {len} pixels")]
    TextureSize { width: u32, height: u32, len: usize },
}

pub type SceneResult<T> = Result<T, SceneError>;
