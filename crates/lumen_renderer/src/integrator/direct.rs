//! Direct lighting from the area light.

use lumen_core::AreaLight;
use lumen_math::Vec3;

use crate::sequence::SampleStream;
use crate::tracer::RayTracer;

/// Offset along the normal for shadow ray origins.
pub const SHADOW_EPSILON: f32 = 1e-4;

/// Shadow segments stop just short of the light sample.
pub const SHADOW_MAX_PARAM: f32 = 0.999;

/// Squared distances below this count as "on the light".
const MIN_DISTANCE_SQUARED: f32 = 1e-12;

/// Irradiance at `p` (normal `n`) from `samples` light samples.
///
/// Each sample contributes `E cos_l cos_v / d^2 / pdf` when the light faces
/// the point and the shadow segment is clear; the sum is averaged over
/// `samples`. There is no 1/pi here, the caller applies the BRDF.
pub fn direct_irradiance(
    tracer: &RayTracer,
    light: &AreaLight,
    p: Vec3,
    n: Vec3,
    samples: u32,
    stream: &mut SampleStream,
) -> Vec3 {
    if samples == 0 {
        return Vec3::ZERO;
    }

    let light_normal = light.normal();
    let origin = p + n * SHADOW_EPSILON;
    let mut e = Vec3::ZERO;

    for _ in 0..samples {
        let Some(sample) = light.sample(stream.next()) else {
            return Vec3::ZERO;
        };

        let to_light = sample.point - p;
        let dist2 = to_light.length_squared();
        if dist2 <= MIN_DISTANCE_SQUARED {
            continue;
        }
        let dir = to_light / dist2.sqrt();

        // Back of the lamp
        let cos_l = light_normal.dot(-dir);
        if cos_l <= 0.0 {
            continue;
        }
        let cos_v = n.dot(dir);
        if cos_v <= 0.0 {
            continue;
        }

        if tracer.ray_cast_shadow(origin, sample.point - origin, SHADOW_MAX_PARAM) {
            continue;
        }

        e += light.emission * (cos_l * cos_v / dist2 / sample.pdf);
    }

    e / samples as f32
}
