//! Point-sampled diffuse maps.
//!
//! Decoding image files is left to the caller; a texture is built from
//! already-decoded pixels and stored as linear float RGBA.

use lumen_math::{Vec2, Vec3};

use crate::error::{SceneError, SceneResult};

/// A texture with pixel data.
///
/// Stores pixels in linear RGBA float format, row-major.
#[derive(Clone, Debug)]
pub struct Texture {
    /// Texture width in pixels
    pub width: u32,

    /// Texture height in pixels
    pub height: u32,

    /// Pixel data as [R, G, B, A] per pixel
    pub pixels: Vec<[f32; 4]>,
}

impl Texture {
    /// Create a texture from linear pixel data.
    pub fn new(width: u32, height: u32, pixels: Vec<[f32; 4]>) -> SceneResult<Self> {
        let expected = width as usize * height as usize;
        if expected == 0 || pixels.len() != expected {
            return Err(SceneError::TextureSize {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Create a texture from 8-bit sRGB RGBA bytes (4 per pixel).
    pub fn from_srgba8(width: u32, height: u32, bytes: &[u8]) -> SceneResult<Self> {
        if bytes.len() % 4 != 0 {
            return Err(SceneError::TextureSize {
                width,
                height,
                len: bytes.len() / 4,
            });
        }

        let pixels = bytes
            .chunks_exact(4)
            .map(|p| {
                [
                    srgb_to_linear(p[0]),
                    srgb_to_linear(p[1]),
                    srgb_to_linear(p[2]),
                    p[3] as f32 / 255.0, // Alpha is linear
                ]
            })
            .collect();

        Self::new(width, height, pixels)
    }

    /// Create a solid color texture (1x1).
    pub fn solid_color(color: Vec3) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: vec![[color.x, color.y, color.z, 1.0]],
        }
    }

    /// Point sample at a texture coordinate.
    ///
    /// Coordinates wrap: only the fractional part selects the texel, with
    /// texel `(fract(u) * width, fract(v) * height)`.
    pub fn sample_nearest(&self, uv: Vec2) -> Vec3 {
        let u = uv.x.rem_euclid(1.0);
        let v = uv.y.rem_euclid(1.0);

        let x = ((u * self.width as f32) as u32).min(self.width - 1);
        let y = ((v * self.height as f32) as u32).min(self.height - 1);

        let [r, g, b, _] = self.get_pixel(x, y);
        Vec3::new(r, g, b)
    }

    /// Get pixel at integer coordinates.
    fn get_pixel(&self, x: u32, y: u32) -> [f32; 4] {
        let idx = y as usize * self.width as usize + x as usize;
        self.pixels
            .get(idx)
            .copied()
            .unwrap_or([0.0, 0.0, 0.0, 1.0])
    }
}

/// Convert sRGB byte value to linear float.
fn srgb_to_linear(value: u8) -> f32 {
    let v = value as f32 / 255.0;
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}
