//! Lumen Core - scene data handed to the ray tracing kernel.
//!
//! This crate provides:
//!
//! - **Geometry store**: `Mesh` ingestion and the frozen `Scene` with its
//!   `Triangle` records referencing a shared vertex buffer by index
//! - **Shading inputs**: `Material` and point-sampled `Texture`
//! - **Emitters**: the quad `AreaLight`
//! - **Fingerprinting**: `SceneHash` used to key on-disk caches
//!
//! # Example
//!
//! ```ignore
//! use lumen_core::{Material, SceneBuilder};
//!
//! let mut builder = SceneBuilder::new();
//! let grey = builder.add_material(Material::new("grey", Vec3::splat(0.8)));
//! builder.add_quad(Vec3::ZERO, Vec3::Y, Vec2::splat(5.0), grey);
//! let scene = builder.build()?;
//! println!("{} triangles, hash {}", scene.triangle_count(), scene.fingerprint());
//! ```

pub mod error;
pub mod hash;
pub mod light;
pub mod material;
pub mod mesh;
pub mod scene;
pub mod texture;
pub mod triangle;

// Re-export commonly used types
pub use error::{SceneError, SceneResult};
pub use hash::SceneHash;
pub use light::{AreaLight, EmittedRay, LightSample};
pub use material::Material;
pub use mesh::{Mesh, Submesh};
pub use scene::{Scene, SceneBuilder};
pub use texture::Texture;
pub use triangle::{barycentric_weights, Triangle, TriangleHit, TriangleSource};
