//! Instant radiosity: secondary point emitters along light paths.
//!
//! Rays leaving the primary light are traced once; each hit becomes a
//! spot-like indirect light carrying the emitted power times the surface
//! albedo. Shading then sums the indirect lights with shadow-ray
//! visibility.

use lumen_core::AreaLight;
use lumen_math::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::direct::{SHADOW_EPSILON, SHADOW_MAX_PARAM};
use crate::tracer::RayTracer;

/// Instant radiosity parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstantRadiositySettings {
    /// Rays shot from the primary light
    pub light_count: usize,

    /// Emission cone of every indirect light, in degrees
    pub indirect_fov: f32,

    /// Length of the emitted ray segments
    pub far: f32,

    pub seed: u64,
}

impl Default for InstantRadiositySettings {
    fn default() -> Self {
        Self {
            light_count: 64,
            indirect_fov: 170.0,
            far: 100.0,
            seed: 1234,
        }
    }
}

/// Indirect lights placed by the last `cast_indirect`.
#[derive(Clone, Debug, Default)]
pub struct InstantRadiosity {
    settings: InstantRadiositySettings,
    /// One slot per emitted ray; `None` where the ray left the scene
    lights: Vec<Option<AreaLight>>,
}

impl InstantRadiosity {
    pub fn new(settings: InstantRadiositySettings) -> Self {
        Self {
            settings,
            lights: Vec::new(),
        }
    }

    pub fn settings(&self) -> &InstantRadiositySettings {
        &self.settings
    }

    /// Shoot `light_count` rays from `light` and place an indirect light at
    /// every hit.
    pub fn cast_indirect(&mut self, tracer: &RayTracer, light: &AreaLight) {
        let scene = tracer.scene();
        let mut rng = StdRng::seed_from_u64(self.settings.seed);
        let rays = light.sample_emitted_rays(self.settings.light_count, self.settings.far, &mut rng);

        self.lights = rays
            .iter()
            .map(|ray| {
                let hit = tracer.ray_cast(ray.origin, ray.direction, 1.0)?;
                let mut normal = scene.shading_normal(hit.triangle, hit.u, hit.v);
                if normal.dot(ray.direction) > 0.0 {
                    normal = -normal;
                }
                let emission = ray.e_times_pdf * scene.albedo(hit.triangle, hit.u, hit.v);

                Some(
                    AreaLight::facing(hit.point, normal, Vec2::ZERO, emission)
                        .with_fov(self.settings.indirect_fov),
                )
            })
            .collect();

        log::debug!(
            "Placed {} of {} indirect lights",
            self.enabled_count(),
            self.lights.len()
        );
    }

    /// All slots, including disabled ones.
    pub fn lights(&self) -> &[Option<AreaLight>] {
        &self.lights
    }

    pub fn enabled_count(&self) -> usize {
        self.lights.iter().flatten().count()
    }

    /// Indirect irradiance at `p` with normal `n`.
    ///
    /// Each enabled light adds `E cos_l cos_v / d^2` when `p` lies inside
    /// its cone and the segment between them is clear.
    pub fn irradiance(&self, tracer: &RayTracer, p: Vec3, n: Vec3) -> Vec3 {
        let origin = p + n * SHADOW_EPSILON;
        let mut e = Vec3::ZERO;

        for light in self.lights.iter().flatten() {
            let to_light = light.position - p;
            let dist2 = to_light.length_squared();
            if dist2 <= f32::EPSILON {
                continue;
            }
            let dir = to_light / dist2.sqrt();

            let cos_l = light.normal().dot(-dir);
            if cos_l <= 0.0 || cos_l < (light.fov_radians() * 0.5).cos() {
                continue;
            }
            let cos_v = n.dot(dir);
            if cos_v <= 0.0 {
                continue;
            }
            if tracer.ray_cast_shadow(origin, light.position - origin, SHADOW_MAX_PARAM) {
                continue;
            }

            e += light.emission * (cos_l * cos_v / dist2);
        }
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use lumen_core::{Material, SceneBuilder};

    use crate::bvh::BvhConfig;

    fn room() -> Arc<RayTracer> {
        let mut builder = SceneBuilder::new();
        let m = builder.add_material(Material::new("grey", Vec3::splat(0.5)));
        builder.add_box(Vec3::ZERO, Vec3::ONE, true, m);
        let scene = Arc::new(builder.build().unwrap());
        Arc::new(RayTracer::new(scene, BvhConfig::default()).unwrap())
    }

    #[test]
    fn test_closed_room_places_every_light() {
        let tracer = room();
        let light = AreaLight::facing(Vec3::new(0.0, 0.9, 0.0), Vec3::NEG_Y, Vec2::splat(0.2), Vec3::ONE);
        let mut instant = InstantRadiosity::new(InstantRadiositySettings {
            light_count: 32,
            ..Default::default()
        });
        instant.cast_indirect(&tracer, &light);

        assert_eq!(instant.lights().len(), 32);
        assert_eq!(instant.enabled_count(), 32);
        for l in instant.lights().iter().flatten() {
            // Facing back into the room
            assert!(l.normal().dot(Vec3::ZERO - l.position) > 0.0);
            assert!(l.emission.max_element() > 0.0);
            assert!(l.position.abs().max_element() <= 1.0 + 1e-4);
        }
    }

    #[test]
    fn test_missed_rays_disable_slots() {
        let mut builder = SceneBuilder::new();
        let m = builder.add_material(Material::default());
        builder.add_quad(Vec3::ZERO, Vec3::Y, Vec2::splat(0.1), m);
        let scene = Arc::new(builder.build().unwrap());
        let tracer = Arc::new(RayTracer::new(scene, BvhConfig::default()).unwrap());

        // Facing away from the only geometry
        let light = AreaLight::facing(Vec3::new(0.0, 1.0, 0.0), Vec3::Y, Vec2::splat(0.1), Vec3::ONE);
        let mut instant = InstantRadiosity::new(InstantRadiositySettings::default());
        instant.cast_indirect(&tracer, &light);

        assert_eq!(instant.lights().len(), 64);
        assert_eq!(instant.enabled_count(), 0);
        assert_eq!(instant.irradiance(&tracer, Vec3::ZERO, Vec3::Y), Vec3::ZERO);
    }

    #[test]
    fn test_irradiance_is_non_negative() {
        let tracer = room();
        let light = AreaLight::facing(Vec3::new(0.0, 0.9, 0.0), Vec3::NEG_Y, Vec2::splat(0.2), Vec3::ONE);
        let mut instant = InstantRadiosity::new(InstantRadiositySettings::default());
        instant.cast_indirect(&tracer, &light);

        let e = instant.irradiance(&tracer, Vec3::new(0.0, -0.99, 0.0), Vec3::Y);
        assert!(e.is_finite());
        assert!(e.min_element() >= 0.0);
        assert!(e.max_element() > 0.0);
    }
}
