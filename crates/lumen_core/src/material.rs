//! Diffuse surface descriptions.

use std::sync::Arc;

use lumen_math::{Vec2, Vec3};

use crate::texture::Texture;

/// Diffuse material attached to a submesh.
///
/// The kernel only needs reflectance: a flat colour, or a texture that is
/// point sampled at the interpolated UV of the hit.
#[derive(Clone, Debug)]
pub struct Material {
    /// Material name (for diagnostics)
    pub name: String,

    /// Diffuse albedo (RGB, 0-1)
    pub diffuse: Vec3,

    /// Optional diffuse map, replaces `diffuse` when present
    pub diffuse_texture: Option<Arc<Texture>>,
}

impl Material {
    /// Create an untextured material.
    pub fn new(name: impl Into<String>, diffuse: Vec3) -> Self {
        Self {
            name: name.into(),
            diffuse,
            diffuse_texture: None,
        }
    }

    /// Attach a diffuse texture.
    pub fn with_texture(mut self, texture: Arc<Texture>) -> Self {
        self.diffuse_texture = Some(texture);
        self
    }

    /// True if albedo comes from a texture.
    pub fn is_textured(&self) -> bool {
        self.diffuse_texture.is_some()
    }

    /// Diffuse reflectance at a texture coordinate.
    ///
    /// `uv` is ignored for untextured materials.
    pub fn albedo(&self, uv: Vec2) -> Vec3 {
        match &self.diffuse_texture {
            Some(texture) => texture.sample_nearest(uv),
            None => self.diffuse,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new("default", Vec3::splat(0.5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_albedo_ignores_uv() {
        let mat = Material::new("red", Vec3::new(0.8, 0.1, 0.1));
        assert!(!mat.is_textured());
        assert_eq!(mat.albedo(Vec2::ZERO), Vec3::new(0.8, 0.1, 0.1));
        assert_eq!(mat.albedo(Vec2::new(3.7, -2.0)), Vec3::new(0.8, 0.1, 0.1));
    }

    #[test]
    fn test_textured_albedo() {
        let tex = Arc::new(Texture::solid_color(Vec3::new(0.2, 0.4, 0.6)));
        let mat = Material::default().with_texture(tex);
        assert!(mat.is_textured());

        let albedo = mat.albedo(Vec2::new(0.5, 0.5));
        assert!((albedo - Vec3::new(0.2, 0.4, 0.6)).length() < 1e-6);
    }
}
