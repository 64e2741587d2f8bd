//! Accumulation image for progressive rendering.

use lumen_math::{Vec3, Vec4};

use crate::error::{RenderError, RenderResult};

/// Allocate `len` copies of `value`, reporting failure instead of aborting.
pub(crate) fn try_filled<T: Clone>(len: usize, value: T, what: &'static str) -> RenderResult<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| RenderError::Allocation { what, count: len })?;
    buffer.resize(len, value);
    Ok(buffer)
}

/// Per-pixel radiance sums plus sample weights.
///
/// Each pixel is a `Vec4` of `(r, g, b, w)`; the displayed colour is the
/// sum divided by `w`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pixels: Vec<Vec4>,
}

impl ImageBuffer {
    /// Create a black image with zero weights.
    pub fn try_new(width: u32, height: u32) -> RenderResult<Self> {
        let count = width as usize * height as usize;
        Ok(Self {
            width,
            height,
            pixels: try_filled(count, Vec4::ZERO, "image")?,
        })
    }

    /// Raw accumulator at (x, y).
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Vec4 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Add one sample of radiance to every pixel of row `y`.
    pub fn accumulate_row(&mut self, y: u32, row: &[Vec3]) {
        let start = y as usize * self.width as usize;
        let end = start + self.width as usize;
        for (pixel, radiance) in self.pixels[start..end].iter_mut().zip(row) {
            *pixel += radiance.extend(1.0);
        }
    }

    /// Accumulated colour divided by weight; unsampled pixels are black.
    pub fn resolved(&self) -> Vec<Vec3> {
        self.pixels
            .iter()
            .map(|p| {
                if p.w > 0.0 {
                    p.truncate() / p.w
                } else {
                    Vec3::ZERO
                }
            })
            .collect()
    }

    /// Gamma-encoded 8-bit RGBA of the resolved image.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixels.len() * 4);
        for color in self.resolved() {
            bytes.extend_from_slice(&color_to_rgba(color));
        }
        bytes
    }
}

/// Apply gamma correction (gamma = 2.0).
#[inline]
pub fn linear_to_gamma(linear: f32) -> f32 {
    if linear > 0.0 {
        linear.sqrt()
    } else {
        0.0
    }
}

/// Convert a color to 8-bit RGBA.
pub fn color_to_rgba(color: Vec3) -> [u8; 4] {
    let r = (255.0 * linear_to_gamma(color.x).clamp(0.0, 1.0)) as u8;
    let g = (255.0 * linear_to_gamma(color.y).clamp(0.0, 1.0)) as u8;
    let b = (255.0 * linear_to_gamma(color.z).clamp(0.0, 1.0)) as u8;
    [r, g, b, 255]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_and_resolve() {
        let mut image = ImageBuffer::try_new(2, 2).unwrap();
        image.accumulate_row(1, &[Vec3::new(1.0, 2.0, 3.0), Vec3::ONE]);
        image.accumulate_row(1, &[Vec3::new(3.0, 2.0, 1.0), Vec3::ONE]);

        assert_eq!(image.get(0, 1), Vec4::new(4.0, 4.0, 4.0, 2.0));
        assert_eq!(image.get(0, 0), Vec4::ZERO);

        let resolved = image.resolved();
        assert_eq!(resolved[0], Vec3::ZERO);
        assert_eq!(resolved[2], Vec3::splat(2.0));
        assert_eq!(resolved[3], Vec3::ONE);
    }

    #[test]
    fn test_linear_to_gamma() {
        assert_eq!(linear_to_gamma(0.0), 0.0);
        assert_eq!(linear_to_gamma(-1.0), 0.0);
        assert!((linear_to_gamma(0.25) - 0.5).abs() < 1e-6);
        assert_eq!(color_to_rgba(Vec3::new(1.0, 4.0, 0.0)), [255, 255, 0, 255]);
    }

    #[test]
    fn test_allocation_failure_is_reported() {
        let err = try_filled(usize::MAX, 0u64, "test buffer").unwrap_err();
        assert!(matches!(err, RenderError::Allocation { what: "test buffer", .. }));
    }
}
