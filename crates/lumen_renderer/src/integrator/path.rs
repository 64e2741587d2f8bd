//! Progressive path tracer.
//!
//! Every pass traces one path per pixel, one launcher task per scanline.
//! Finished scanlines are added to the accumulation image as they arrive;
//! the pass counter advances, and the next pass starts, only once every
//! scanline of the pass has finished.
//!
//! Each pixel walks its own slice of the sample sequence: a seeded offset
//! per pixel and per decision (pixel jitter, light sample, bounce
//! direction), stepped by the pass number. Low-discrepancy sequences thus
//! refine every pixel across passes instead of replaying fixed samples.

use std::f32::consts::FRAC_1_PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use lumen_core::AreaLight;
use lumen_math::{form_basis, Vec2, Vec3};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::direct::direct_irradiance;
use super::{INDIRECT_RAY_LENGTH, VERTEX_OFFSET};
use crate::camera::Camera;
use crate::error::{RenderError, RenderResult};
use crate::image::ImageBuffer;
use crate::launcher::TaskLauncher;
use crate::sampling::cosine_sample_hemisphere;
use crate::sequence::{SampleStream, SequenceFactory, SequenceKind, DEFAULT_HALTON_LEN};
use crate::tracer::RayTracer;

/// Path tracing parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathTraceSettings {
    /// Light samples per shading point
    pub light_samples: u32,

    /// Guaranteed bounces; negative means Russian roulette after
    /// `|bounces|` bounces
    pub bounces: i32,

    pub sequence: SequenceKind,

    /// Sample count hint for grid-based sequences
    pub sequence_samples: u32,

    /// Stop after this many passes (`None` runs until stopped)
    pub max_passes: Option<u32>,

    pub seed: u64,
}

impl Default for PathTraceSettings {
    fn default() -> Self {
        Self {
            light_samples: 1,
            bounces: 2,
            sequence: SequenceKind::default(),
            sequence_samples: 16,
            max_passes: None,
            seed: 0,
        }
    }
}

impl PathTraceSettings {
    /// Bounces traced unconditionally (plus the primary hit).
    pub fn iterations(&self) -> u32 {
        self.bounces.unsigned_abs() + 1
    }

    pub fn russian_roulette(&self) -> bool {
        self.bounces < 0
    }
}

/// Random decisions along a path, each with its own sample offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dimension {
    Jitter = 0,
    Light = 1,
    Bounce = 2,
}

const DIMENSIONS: usize = 3;

/// Index distance between the samples of consecutive path depths.
const DEPTH_STRIDE: u32 = 1_000_003;

/// Per-pixel offsets are drawn from `0..OFFSET_RANGE`.
const OFFSET_RANGE: u32 = DEFAULT_HALTON_LEN as u32;

/// Sample state owned by one scanline.
///
/// Sample `j` of a decision at path depth `d` for pixel `x` in pass `p`
/// is sequence index `offset[x][decision] + d * DEPTH_STRIDE + p * draws + j`,
/// where `draws` is the number of samples the decision takes per pass.
pub struct PathState {
    stream: SampleStream,
    /// Russian roulette coin
    pub rng: StdRng,
    offsets: Vec<[u32; DIMENSIONS]>,
    pixel: usize,
    pass: u32,
}

impl PathState {
    /// State for a scanline of `pixels` pixels.
    pub fn new(factory: &SequenceFactory, seed: u64, pixels: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let offsets = (0..pixels.max(1))
            .map(|_| [(); DIMENSIONS].map(|_| rng.gen_range(0..OFFSET_RANGE)))
            .collect();
        Self {
            stream: factory.stream(rng.gen(), 0),
            rng,
            offsets,
            pixel: 0,
            pass: 0,
        }
    }

    /// Select the pixel and pass that following samples belong to.
    pub fn begin(&mut self, pixel: usize, pass: u32) {
        self.pixel = pixel % self.offsets.len();
        self.pass = pass;
    }

    /// Sub-pixel offset of the primary ray.
    pub fn pixel_jitter(&mut self) -> Vec2 {
        self.seek(Dimension::Jitter, 0, 1).next()
    }

    /// Stream positioned on the `samples` light samples taken at `depth`.
    pub fn light_samples(&mut self, depth: u32, samples: u32) -> &mut SampleStream {
        self.seek(Dimension::Light, depth, samples)
    }

    /// Sample for the bounce direction leaving `depth`.
    pub fn bounce_sample(&mut self, depth: u32) -> Vec2 {
        self.seek(Dimension::Bounce, depth, 1).next()
    }

    fn seek(&mut self, dim: Dimension, depth: u32, draws: u32) -> &mut SampleStream {
        let index = self.offsets[self.pixel][dim as usize]
            .wrapping_add(depth.wrapping_mul(DEPTH_STRIDE))
            .wrapping_add(self.pass.wrapping_mul(draws));
        self.stream.seek(index);
        &mut self.stream
    }
}

/// Everything a scanline task reads, shared for the whole run.
struct PathContext {
    tracer: Arc<RayTracer>,
    light: AreaLight,
    camera: Camera,
    settings: PathTraceSettings,
    scanlines: Vec<Mutex<PathState>>,
}

/// Radiance arriving along the segment `origin + t * dir`, `t < max_param`.
///
/// Each hit multiplies the throughput by the surface albedo and adds
/// `throughput * E_direct`. With Russian roulette, extra bounces continue
/// with probability 1/2 and are weighted 2, 4, 8, ... The sum is
/// divided by pi once for the diffuse BRDF.
pub fn trace_path(
    tracer: &RayTracer,
    light: &AreaLight,
    settings: &PathTraceSettings,
    origin: Vec3,
    dir: Vec3,
    max_param: f32,
    state: &mut PathState,
) -> Vec3 {
    let mut segment = Some((origin, dir, max_param));
    let mut throughput = Vec3::ONE;
    let mut total = Vec3::ZERO;
    let mut depth = 0;

    for _ in 0..settings.iterations() {
        let Some(current) = segment else {
            break;
        };
        segment = bounce(tracer, light, settings, current, depth, state, &mut throughput, 1.0, &mut total);
        depth += 1;
    }

    if settings.russian_roulette() {
        let mut contribution = 2.0;
        while let Some(current) = segment {
            if !state.rng.gen::<bool>() {
                break;
            }
            segment = bounce(
                tracer,
                light,
                settings,
                current,
                depth,
                state,
                &mut throughput,
                contribution,
                &mut total,
            );
            contribution *= 2.0;
            depth += 1;
        }
    }

    total * FRAC_1_PI
}

/// One path vertex. Returns the next segment, or `None` on a miss.
#[allow(clippy::too_many_arguments)]
fn bounce(
    tracer: &RayTracer,
    light: &AreaLight,
    settings: &PathTraceSettings,
    (origin, dir, max_param): (Vec3, Vec3, f32),
    depth: u32,
    state: &mut PathState,
    throughput: &mut Vec3,
    weight: f32,
    total: &mut Vec3,
) -> Option<(Vec3, Vec3, f32)> {
    let hit = tracer.ray_cast(origin, dir, max_param)?;
    let scene = tracer.scene();

    let albedo = scene.albedo(hit.triangle, hit.u, hit.v);
    let mut normal = scene.shading_normal(hit.triangle, hit.u, hit.v);
    if dir.dot(normal) > 0.0 {
        normal = -normal;
    }

    let direct = direct_irradiance(
        tracer,
        light,
        hit.point,
        normal,
        settings.light_samples,
        state.light_samples(depth, settings.light_samples),
    );

    *throughput *= albedo;
    *total += weight * *throughput * direct;

    let next_origin = hit.point + normal * VERTEX_OFFSET;
    let next_dir =
        form_basis(normal) * cosine_sample_hemisphere(state.bounce_sample(depth)) * INDIRECT_RAY_LENGTH;
    Some((next_origin, next_dir, 1.0))
}

/// Drives progressive passes over the launcher.
pub struct PathTracer {
    launcher: TaskLauncher<Vec<Vec3>>,
    context: Option<Arc<PathContext>>,
    image: ImageBuffer,
    pass: u32,
    pass_started: Instant,
}

impl PathTracer {
    pub fn new() -> RenderResult<Self> {
        Ok(Self::with_launcher(TaskLauncher::new()?))
    }

    pub fn with_launcher(launcher: TaskLauncher<Vec<Vec3>>) -> Self {
        Self {
            launcher,
            context: None,
            image: ImageBuffer::default(),
            pass: 0,
            pass_started: Instant::now(),
        }
    }

    /// Begin a new run, superseding any run in progress.
    ///
    /// The previous image stays in place if the new one cannot be
    /// allocated.
    pub fn start(
        &mut self,
        tracer: Arc<RayTracer>,
        light: AreaLight,
        mut camera: Camera,
        settings: PathTraceSettings,
    ) -> RenderResult<()> {
        camera.initialize();
        if camera.image_width == 0 || camera.image_height == 0 {
            return Err(RenderError::InvalidSettings(format!(
                "image size {}x{}",
                camera.image_width, camera.image_height
            )));
        }
        if settings.max_passes == Some(0) {
            return Err(RenderError::InvalidSettings("max_passes must be positive".into()));
        }

        self.stop();
        let image = ImageBuffer::try_new(camera.image_width, camera.image_height)?;

        let factory = SequenceFactory::new(settings.sequence, settings.sequence_samples);
        let width = camera.image_width as usize;
        let scanlines = (0..camera.image_height)
            .map(|row| {
                let seed = settings.seed ^ (row as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                Mutex::new(PathState::new(&factory, seed, width))
            })
            .collect();

        log::info!(
            "Path tracing {}x{}, bounces {}{}, {} light samples, {:?} sequence",
            camera.image_width,
            camera.image_height,
            settings.bounces.unsigned_abs(),
            if settings.russian_roulette() { " + RR" } else { "" },
            settings.light_samples,
            settings.sequence
        );

        self.image = image;
        self.pass = 0;
        self.context = Some(Arc::new(PathContext {
            tracer,
            light,
            camera,
            settings,
            scanlines,
        }));
        self.launch_pass();
        Ok(())
    }

    fn launch_pass(&mut self) {
        let Some(ctx) = &self.context else {
            return;
        };
        let ctx = Arc::clone(ctx);
        let height = ctx.camera.image_height as usize;
        let pass = self.pass;
        self.pass_started = Instant::now();
        self.launcher
            .launch(0..height, move |row, cancel| trace_scanline(&ctx, row, pass, cancel));
    }

    /// Poll the current pass without blocking.
    ///
    /// Scanlines that have finished are added to the image right away.
    /// Once the whole pass is in, starts the next pass (unless the pass
    /// limit is reached) and returns true.
    pub fn check_finish(&mut self) -> bool {
        if self.context.is_none() {
            return false;
        }

        for (row, radiance) in self.launcher.pop_all() {
            self.image.accumulate_row(row as u32, &radiance);
        }
        // The wave is cleared only by the pop that took its last result
        if self.launcher.num_pending() > 0 {
            return false;
        }
        self.pass += 1;
        log::debug!("Pass {} finished in {:.2?}", self.pass, self.pass_started.elapsed());

        let limit = self.context.as_ref().and_then(|c| c.settings.max_passes);
        if limit.is_some_and(|max| self.pass >= max) {
            log::info!("Path tracing done after {} passes", self.pass);
            self.context = None;
        } else {
            self.launch_pass();
        }
        true
    }

    /// Block until the current pass finishes, then merge it.
    pub fn wait_pass(&mut self) -> bool {
        self.launcher.wait();
        self.check_finish()
    }

    /// Cancel the run and drain its tasks.
    ///
    /// Completed passes and scanlines already merged are kept.
    pub fn stop(&mut self) {
        self.launcher.stop();
        if self.context.take().is_some() {
            log::info!("Path tracing stopped after {} passes", self.pass);
        }
    }

    pub fn is_running(&self) -> bool {
        self.context.is_some()
    }

    /// Completed passes.
    pub fn pass(&self) -> u32 {
        self.pass
    }

    /// Accumulated radiance and weights.
    pub fn image(&self) -> &ImageBuffer {
        &self.image
    }

    /// Normalized picture (sum divided by weight) for display.
    pub fn update_picture(&self) -> Vec<Vec3> {
        self.image.resolved()
    }
}

fn trace_scanline(ctx: &PathContext, row: usize, pass: u32, cancel: &AtomicBool) -> Vec<Vec3> {
    let width = ctx.camera.image_width as usize;
    let mut radiance = Vec::with_capacity(width);
    let mut state = ctx.scanlines[row].lock();

    for x in 0..width {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        state.begin(x, pass);
        let jitter = state.pixel_jitter();
        let ray = ctx
            .camera
            .ray(Vec2::new(x as f32, row as f32) + jitter);
        let l = trace_path(
            &ctx.tracer,
            &ctx.light,
            &ctx.settings,
            ray.origin,
            ray.direction,
            1.0,
            &mut state,
        );
        radiance.push(l);
    }
    radiance
}
