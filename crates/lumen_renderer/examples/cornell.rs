//! Headless Cornell box demo.
//!
//! Renders a few progressive path tracing passes to a PNG, solves vertex
//! radiosity and places instant radiosity lights. Settings can be given
//! as a JSON file:
//!
//! ```text
//! cargo run --release --example cornell -- settings.json
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use lumen_core::{AreaLight, Material, Scene, SceneBuilder};
use lumen_renderer::{
    load_or_build_hierarchy, load_radiosity, save_radiosity, BvhConfig, Camera, InstantRadiosity,
    InstantRadiositySettings, PathTraceSettings, PathTracer, Radiosity, RadiositySettings,
    RayTracer, Vec2, Vec3,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct DemoSettings {
    camera: Camera,
    light: AreaLight,
    bvh: BvhConfig,
    path: PathTraceSettings,
    radiosity: RadiositySettings,
    instant: InstantRadiositySettings,
    output: PathBuf,
    cache_dir: PathBuf,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            camera: Camera::new()
                .with_resolution(320, 240)
                .with_position(Vec3::new(0.0, 0.0, 3.4), Vec3::ZERO, Vec3::Y)
                .with_fov(45.0),
            light: AreaLight::facing(
                Vec3::new(0.0, 0.99, 0.0),
                Vec3::NEG_Y,
                Vec2::splat(0.25),
                Vec3::splat(8.0),
            ),
            bvh: BvhConfig::default(),
            path: PathTraceSettings {
                max_passes: Some(8),
                ..Default::default()
            },
            radiosity: RadiositySettings::default(),
            instant: InstantRadiositySettings::default(),
            output: PathBuf::from("cornell.png"),
            cache_dir: std::env::temp_dir(),
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut settings = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings {}", path))?;
            serde_json::from_str::<DemoSettings>(&text)
                .with_context(|| format!("Failed to parse settings {}", path))?
        }
        None => DemoSettings::default(),
    };
    settings.camera.initialize();

    let scene = Arc::new(build_scene()?);
    let bvh = load_or_build_hierarchy(&settings.cache_dir, &scene, settings.bvh)?;
    let tracer = Arc::new(RayTracer::with_bvh(scene.clone(), bvh));

    render_image(&tracer, &settings)?;
    solve_radiosity(&tracer, &settings)?;

    let mut instant = InstantRadiosity::new(settings.instant.clone());
    instant.cast_indirect(&tracer, &settings.light);
    let floor = instant.irradiance(&tracer, Vec3::new(0.0, -0.99, 0.0), Vec3::Y);
    log::info!(
        "{} indirect lights, floor centre receives {:?}",
        instant.enabled_count(),
        floor
    );

    Ok(())
}

/// Unit room with red and green side walls and a small block.
fn build_scene() -> Result<Scene> {
    let mut builder = SceneBuilder::new();
    let white = builder.add_material(Material::new("white", Vec3::splat(0.73)));
    let red = builder.add_material(Material::new("red", Vec3::new(0.65, 0.05, 0.05)));
    let green = builder.add_material(Material::new("green", Vec3::new(0.12, 0.45, 0.15)));

    let half = Vec2::ONE;
    builder.add_quad(Vec3::new(0.0, -1.0, 0.0), Vec3::Y, half, white);
    builder.add_quad(Vec3::new(0.0, 1.0, 0.0), Vec3::NEG_Y, half, white);
    builder.add_quad(Vec3::new(0.0, 0.0, -1.0), Vec3::Z, half, white);
    builder.add_quad(Vec3::new(-1.0, 0.0, 0.0), Vec3::X, half, red);
    builder.add_quad(Vec3::new(1.0, 0.0, 0.0), Vec3::NEG_X, half, green);
    builder.add_box(Vec3::new(0.3, -0.7, -0.2), Vec3::splat(0.3), false, white);

    Ok(builder.build()?)
}

fn render_image(tracer: &Arc<RayTracer>, settings: &DemoSettings) -> Result<()> {
    let mut renderer = PathTracer::new()?;
    let start = Instant::now();
    renderer.start(
        tracer.clone(),
        settings.light.clone(),
        settings.camera.clone(),
        settings.path.clone(),
    )?;

    while renderer.is_running() {
        if renderer.wait_pass() {
            log::info!("Pass {} ({:.2?})", renderer.pass(), start.elapsed());
        }
    }

    let accum = renderer.image();
    let buffer = image::RgbaImage::from_raw(accum.width, accum.height, accum.to_rgba8())
        .context("Image size does not match pixel data")?;
    buffer
        .save(&settings.output)
        .with_context(|| format!("Failed to write {}", settings.output.display()))?;
    log::info!("Saved {}", settings.output.display());
    Ok(())
}

fn solve_radiosity(tracer: &Arc<RayTracer>, settings: &DemoSettings) -> Result<()> {
    let scene = tracer.scene();
    let path = settings
        .cache_dir
        .join(format!("Radiosity-{}.bin", scene.fingerprint()));

    let mut radiosity = Radiosity::new()?;
    match load_radiosity(&path, scene) {
        Ok(solution) => {
            log::info!("Loaded radiosity from {}", path.display());
            radiosity.set_solution(solution);
        }
        Err(e) => {
            log::debug!("No usable radiosity cache: {}", e);
            radiosity.start(tracer.clone(), settings.light.clone(), settings.radiosity.clone())?;
            while radiosity.is_running() {
                if radiosity.wait_bounce()? {
                    log::info!("Radiosity bounce {} done", radiosity.current_bounce());
                }
            }
            if let Err(e) = save_radiosity(&path, scene, radiosity.vertex_irradiance()) {
                log::warn!("Could not write radiosity cache: {}", e);
            }
        }
    }

    let brightest = radiosity
        .vertex_radiosity()
        .into_iter()
        .fold(Vec3::ZERO, Vec3::max);
    log::info!("Brightest vertex radiosity {:?}", brightest);
    Ok(())
}
