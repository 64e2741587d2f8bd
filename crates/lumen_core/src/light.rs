//! Quad area light.
//!
//! The light is a rectangle centred at `position`, spanned by the first two
//! columns of `orientation` scaled by `half_extent`, and emitting from one
//! side only: towards the third column, which is the light normal.

use lumen_math::{form_basis, Mat3, Vec2, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A point drawn on the light surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightSample {
    /// World-space point on the light
    pub point: Vec3,
    /// Area density of the sample, `1 / area`
    pub pdf: f32,
}

/// A ray leaving the light, as used for placing secondary emitters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmittedRay {
    pub origin: Vec3,
    /// Direction scaled to the caller's far distance
    pub direction: Vec3,
    /// Emitted radiance multiplied by the probability of this ray
    pub e_times_pdf: Vec3,
}

/// Finite-area, one-sided emitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaLight {
    /// Centre of the quad
    pub position: Vec3,

    /// Columns: tangent, bitangent, normal
    pub orientation: Mat3,

    /// Half of the quad's side lengths along tangent and bitangent
    pub half_extent: Vec2,

    /// Emitted radiance (RGB)
    pub emission: Vec3,

    /// Opening angle of the emission cone in degrees (180 = full hemisphere)
    pub fov_degrees: f32,
}

impl AreaLight {
    pub fn new(position: Vec3, orientation: Mat3, half_extent: Vec2, emission: Vec3) -> Self {
        Self {
            position,
            orientation,
            half_extent,
            emission,
            fov_degrees: 180.0,
        }
    }

    /// Light at `position` emitting towards `normal`.
    pub fn facing(position: Vec3, normal: Vec3, half_extent: Vec2, emission: Vec3) -> Self {
        Self::new(position, form_basis(normal.normalize()), half_extent, emission)
    }

    /// Set the emission cone angle.
    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov_degrees = fov_degrees;
        self
    }

    /// Direction the light emits towards.
    #[inline]
    pub fn normal(&self) -> Vec3 {
        self.orientation.z_axis
    }

    /// Total emitting area, `4 * sx * sy`.
    #[inline]
    pub fn area(&self) -> f32 {
        4.0 * self.half_extent.x * self.half_extent.y
    }

    /// Uniform area density (zero for a degenerate light).
    #[inline]
    pub fn pdf(&self) -> f32 {
        let area = self.area();
        if area > 0.0 {
            1.0 / area
        } else {
            0.0
        }
    }

    #[inline]
    pub fn fov_radians(&self) -> f32 {
        self.fov_degrees.to_radians()
    }

    /// Map a point of the unit square onto the light surface.
    ///
    /// `u` in `[0,1)^2` is stretched to `[-1,1]^2`, scaled by the half
    /// extents and placed in the light's frame. Returns `None` for a light
    /// without area.
    pub fn sample(&self, u: Vec2) -> Option<LightSample> {
        let area = self.area();
        if !(area > 0.0) {
            return None;
        }

        let local = (u * 2.0 - Vec2::ONE) * self.half_extent;
        let point = self.position + self.orientation * Vec3::new(local.x, local.y, 0.0);

        Some(LightSample {
            point,
            pdf: 1.0 / area,
        })
    }

    /// Draw `count` rays leaving the light inside its emission cone.
    ///
    /// Directions come from rejection sampling the unit disk, scaling by
    /// `r = sin(fov / 2)` and lifting onto the hemisphere, which gives a
    /// cosine distribution restricted to the cone. Each ray carries
    /// `emission / count * r^2`.
    pub fn sample_emitted_rays<R: Rng + ?Sized>(
        &self,
        count: usize,
        far: f32,
        rng: &mut R,
    ) -> Vec<EmittedRay> {
        if count == 0 {
            return Vec::new();
        }

        let r = (self.fov_radians() * 0.5).sin().clamp(0.0, 1.0);
        let e_times_pdf = self.emission / count as f32 * (r * r);

        (0..count)
            .map(|_| {
                let disk = loop {
                    let d = Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
                    if d.length_squared() <= 1.0 {
                        break d * r;
                    }
                };
                let z = (1.0 - disk.length_squared()).max(0.0).sqrt();
                let local = Vec3::new(disk.x, disk.y, z);

                EmittedRay {
                    origin: self.position,
                    direction: self.orientation * local * far,
                    e_times_pdf,
                }
            })
            .collect()
    }
}

impl Default for AreaLight {
    /// A small white light one unit above the origin facing down.
    fn default() -> Self {
        Self::facing(
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::NEG_Y,
            Vec2::splat(0.25),
            Vec3::ONE,
        )
    }
}
