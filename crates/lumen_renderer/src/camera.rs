//! Pinhole camera producing primary segments.

use lumen_math::{Ray, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Pinhole camera.
///
/// Primary rays are segments from the eye to the far plane: the direction
/// carries the far distance, so they are cast with a maximum parameter of 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Camera {
    // Image settings
    pub image_width: u32,
    pub image_height: u32,

    // Camera positioning
    look_from: Vec3,
    look_at: Vec3,
    vup: Vec3,

    /// Vertical field of view in degrees
    vfov: f32,
    /// Length of primary segments
    far: f32,

    // Cached computed values (set by initialize())
    #[serde(skip)]
    pixel00_loc: Vec3,
    #[serde(skip)]
    pixel_delta_u: Vec3,
    #[serde(skip)]
    pixel_delta_v: Vec3,
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        let mut camera = Self {
            image_width: 320,
            image_height: 240,
            look_from: Vec3::new(0.0, 0.0, 1.0),
            look_at: Vec3::ZERO,
            vup: Vec3::Y,
            vfov: 60.0,
            far: 100.0,
            pixel00_loc: Vec3::ZERO,
            pixel_delta_u: Vec3::ZERO,
            pixel_delta_v: Vec3::ZERO,
        };
        camera.initialize();
        camera
    }

    /// Set image resolution.
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.image_width = width;
        self.image_height = height;
        self.initialize();
        self
    }

    /// Set camera position.
    pub fn with_position(mut self, look_from: Vec3, look_at: Vec3, vup: Vec3) -> Self {
        self.look_from = look_from;
        self.look_at = look_at;
        self.vup = vup;
        self.initialize();
        self
    }

    /// Set vertical field of view (degrees).
    pub fn with_fov(mut self, vfov: f32) -> Self {
        self.vfov = vfov;
        self.initialize();
        self
    }

    /// Set the length of primary segments.
    pub fn with_far(mut self, far: f32) -> Self {
        self.far = far;
        self.initialize();
        self
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.look_from
    }

    #[inline]
    pub fn far(&self) -> f32 {
        self.far
    }

    /// Recompute the cached viewport vectors.
    ///
    /// The builder methods call this; a camera read from JSON needs it once.
    pub fn initialize(&mut self) {
        let width = self.image_width.max(1) as f32;
        let height = self.image_height.max(1) as f32;

        // Viewport on the plane at unit distance
        let h = (self.vfov.to_radians() / 2.0).tan();
        let viewport_height = 2.0 * h;
        let viewport_width = viewport_height * (width / height);

        // Camera basis
        let w = (self.look_from - self.look_at).try_normalize().unwrap_or(Vec3::Z);
        let u = self.vup.cross(w).try_normalize().unwrap_or(Vec3::X);
        let v = w.cross(u);

        let viewport_u = viewport_width * u;
        let viewport_v = -viewport_height * v;

        self.pixel_delta_u = viewport_u / width;
        self.pixel_delta_v = viewport_v / height;
        self.pixel00_loc = self.look_from - w - viewport_u / 2.0 - viewport_v / 2.0;
    }

    /// Primary segment through image position `(x, y)` in pixel units.
    ///
    /// `(0, 0)` is the top-left corner of the image; `(i + 0.5, j + 0.5)`
    /// is the centre of pixel `(i, j)`.
    pub fn ray(&self, pixel: Vec2) -> Ray {
        let target = self.pixel00_loc + pixel.x * self.pixel_delta_u + pixel.y * self.pixel_delta_v;
        let dir = (target - self.look_from).try_normalize().unwrap_or(Vec3::NEG_Z);
        Ray::new(self.look_from, dir * self.far)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_ray_looks_at_target() {
        let camera = Camera::new()
            .with_resolution(100, 100)
            .with_position(Vec3::new(0.0, 1.0, 5.0), Vec3::new(0.0, 1.0, 0.0), Vec3::Y)
            .with_far(50.0);

        let ray = camera.ray(Vec2::new(50.0, 50.0));
        assert_eq!(ray.origin, Vec3::new(0.0, 1.0, 5.0));
        assert!((ray.direction.length() - 50.0).abs() < 1e-3);
        assert!((ray.direction.normalize() - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_image_orientation() {
        let camera = Camera::new()
            .with_resolution(100, 50)
            .with_position(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y)
            .with_fov(90.0);

        // Top-left looks up and to the left
        let tl = camera.ray(Vec2::ZERO).direction;
        assert!(tl.x < 0.0 && tl.y > 0.0);

        // Bottom-right looks down and to the right
        let br = camera.ray(Vec2::new(100.0, 50.0)).direction;
        assert!(br.x > 0.0 && br.y < 0.0);

        // 90 degree vertical fov: top edge at 45 degrees
        let top = camera.ray(Vec2::new(50.0, 0.0)).direction.normalize();
        assert!((top.y - top.z.abs()).abs() < 1e-5);
    }

    #[test]
    fn test_json_round_trip_needs_initialize() {
        let camera = Camera::new().with_resolution(64, 48).with_fov(40.0);
        let json = serde_json::to_string(&camera).unwrap();
        let mut back: Camera = serde_json::from_str(&json).unwrap();
        back.initialize();
        assert_eq!(back.ray(Vec2::new(3.0, 7.0)), camera.ray(Vec2::new(3.0, 7.0)));
    }
}
