//! Warps from the unit square to the shapes the integrators sample.
//!
//! These are pure functions of a 2D sample; which sequence produced the
//! sample is the caller's business.

use std::f32::consts::{FRAC_1_PI, PI};

use lumen_math::{Vec2, Vec3};

/// Uniform point on the unit disk (polar mapping, `r = sqrt(u.x)`).
#[inline]
pub fn sample_disk(u: Vec2) -> Vec2 {
    let r = u.x.sqrt();
    let theta = 2.0 * PI * u.y;
    Vec2::new(r * theta.cos(), r * theta.sin())
}

/// Cosine-weighted direction about +Z (Malley's method).
///
/// A uniform disk point is lifted straight up onto the hemisphere, which
/// makes the density proportional to the cosine with +Z.
#[inline]
pub fn cosine_sample_hemisphere(u: Vec2) -> Vec3 {
    let d = sample_disk(u);
    let z = (1.0 - u.x).max(0.0).sqrt();
    Vec3::new(d.x, d.y, z)
}

/// Density of [`cosine_sample_hemisphere`] for a direction with `cos_theta`.
#[inline]
pub fn cosine_hemisphere_pdf(cos_theta: f32) -> f32 {
    cos_theta.max(0.0) * FRAC_1_PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_disk_inside_unit_circle() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let d = sample_disk(Vec2::new(rng.gen(), rng.gen()));
            assert!(d.length() <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn test_hemisphere_unit_and_upper() {
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..1000 {
            let w = cosine_sample_hemisphere(Vec2::new(rng.gen(), rng.gen()));
            assert!((w.length() - 1.0).abs() < 1e-5);
            assert!(w.z >= 0.0);
        }
        assert_eq!(cosine_sample_hemisphere(Vec2::ZERO), Vec3::Z);
    }

    #[test]
    fn test_cosine_distribution_mean() {
        // E[cos] under a cosine-weighted density is 2/3
        let mut rng = StdRng::seed_from_u64(13);
        let n = 20_000;
        let mean: f32 = (0..n)
            .map(|_| cosine_sample_hemisphere(Vec2::new(rng.gen(), rng.gen())).z)
            .sum::<f32>()
            / n as f32;
        assert!((mean - 2.0 / 3.0).abs() < 0.01);
    }

    #[test]
    fn test_pdf_integrates_to_one() {
        // Monte Carlo with uniform hemisphere directions: E[pdf * 2pi] = 1
        let mut rng = StdRng::seed_from_u64(14);
        let n = 20_000;
        let sum: f32 = (0..n)
            .map(|_| {
                let cos_theta: f32 = rng.gen();
                cosine_hemisphere_pdf(cos_theta) * 2.0 * PI
            })
            .sum();
        assert!((sum / n as f32 - 1.0).abs() < 0.02);
    }
}
