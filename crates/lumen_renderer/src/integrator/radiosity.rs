//! Progressive per-vertex radiosity.
//!
//! Bounce 0 stores direct irradiance at every mesh vertex. Each later
//! bounce gathers cosine-distributed hemisphere rays, interpolates the
//! previous bounce's vertex values at the hit and weights them by the hit
//! albedo. Vertices are processed in batches, one launcher task per batch.
//! Finished batches are added to the running total as they arrive, but a
//! bounce only starts after every batch of the previous one has finished.

use std::f32::consts::{FRAC_1_PI, PI};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use lumen_core::AreaLight;
use lumen_math::{form_basis, Vec3};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::direct::direct_irradiance;
use super::{INDIRECT_RAY_LENGTH, VERTEX_OFFSET};
use crate::error::{RenderError, RenderResult};
use crate::image::try_filled;
use crate::launcher::TaskLauncher;
use crate::sampling::cosine_sample_hemisphere;
use crate::sequence::{SampleStream, SequenceFactory, SequenceKind};
use crate::tracer::RayTracer;

/// Radiosity parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadiositySettings {
    /// Indirect bounces after the direct pass
    pub bounces: u32,

    /// Light samples per vertex in the direct pass
    pub direct_rays: u32,

    /// Gather rays per vertex in each indirect bounce
    pub hemisphere_rays: u32,

    pub sequence: SequenceKind,

    /// Vertices per launcher task
    pub batch_size: usize,

    pub seed: u64,
}

impl Default for RadiositySettings {
    fn default() -> Self {
        Self {
            bounces: 3,
            direct_rays: 64,
            hemisphere_rays: 64,
            sequence: SequenceKind::default(),
            batch_size: 64,
            seed: 0,
        }
    }
}

/// Irradiance gathered at `p` from the previous bounce's vertex values.
///
/// Hits on the back of a triangle contribute nothing. The estimate is
/// `pi / rays * sum(prev(hit) * albedo(hit) / pi)`.
pub fn indirect_irradiance(
    tracer: &RayTracer,
    previous: &[Vec3],
    p: Vec3,
    n: Vec3,
    rays: u32,
    stream: &mut SampleStream,
) -> Vec3 {
    if rays == 0 {
        return Vec3::ZERO;
    }

    let scene = tracer.scene();
    let origin = p + n * VERTEX_OFFSET;
    let basis = form_basis(n);
    let mut e = Vec3::ZERO;

    for _ in 0..rays {
        let dir = basis * cosine_sample_hemisphere(stream.next()) * INDIRECT_RAY_LENGTH;
        let Some(hit) = tracer.ray_cast(origin, dir, 1.0) else {
            continue;
        };
        if scene.triangle(hit.triangle).normal().dot(-dir) < 0.0 {
            continue;
        }

        let radiance = scene.interpolate(previous, hit.triangle, hit.u, hit.v)
            * scene.albedo(hit.triangle, hit.u, hit.v)
            * FRAC_1_PI;
        e += radiance;
    }

    e * (PI / rays as f32)
}

struct RadiosityContext {
    tracer: Arc<RayTracer>,
    light: AreaLight,
    settings: RadiositySettings,
    batches: Vec<Mutex<SampleStream>>,
}

impl RadiosityContext {
    fn vertex_range(&self, batch: usize) -> std::ops::Range<usize> {
        let count = self.tracer.scene().vertex_count();
        let start = batch * self.settings.batch_size;
        start..(start + self.settings.batch_size).min(count)
    }

    /// One batch of one bounce. `previous` is `None` for the direct pass.
    fn gather(&self, batch: usize, previous: Option<&[Vec3]>, cancel: &AtomicBool) -> Vec<Vec3> {
        let scene = self.tracer.scene();
        let positions = scene.positions();
        let normals = scene.normals();
        let range = self.vertex_range(batch);

        let mut stream = self.batches[batch].lock();
        let mut values = Vec::with_capacity(range.len());
        for v in range {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let n = normals[v];
            let p = positions[v];
            let e = match previous {
                None => direct_irradiance(
                    &self.tracer,
                    &self.light,
                    p + n * VERTEX_OFFSET,
                    n,
                    self.settings.direct_rays,
                    &mut stream,
                ),
                Some(prev) => indirect_irradiance(
                    &self.tracer,
                    prev,
                    p,
                    n,
                    self.settings.hemisphere_rays,
                    &mut stream,
                ),
            };
            values.push(e);
        }
        values
    }
}

/// Drives radiosity bounces over the launcher.
pub struct Radiosity {
    launcher: TaskLauncher<Vec<Vec3>>,
    context: Option<Arc<RadiosityContext>>,
    /// Per-vertex irradiance of the last finished bounce
    previous: Arc<Vec<Vec3>>,
    /// Batches of the bounce in flight merged so far
    current: Vec<Vec3>,
    /// Sum over finished bounces and merged batches
    total: Vec<Vec3>,
    bounce: u32,
    bounce_started: Instant,
}

impl Radiosity {
    pub fn new() -> RenderResult<Self> {
        Ok(Self::with_launcher(TaskLauncher::new()?))
    }

    pub fn with_launcher(launcher: TaskLauncher<Vec<Vec3>>) -> Self {
        Self {
            launcher,
            context: None,
            previous: Arc::new(Vec::new()),
            current: Vec::new(),
            total: Vec::new(),
            bounce: 0,
            bounce_started: Instant::now(),
        }
    }

    /// Begin a new solution, superseding any run in progress.
    ///
    /// The previous solution stays in place if the new buffers cannot be
    /// allocated.
    pub fn start(
        &mut self,
        tracer: Arc<RayTracer>,
        light: AreaLight,
        settings: RadiositySettings,
    ) -> RenderResult<()> {
        if settings.batch_size == 0 {
            return Err(RenderError::InvalidSettings("batch_size must be positive".into()));
        }

        self.stop();
        let vertex_count = tracer.scene().vertex_count();
        let total = try_filled(vertex_count, Vec3::ZERO, "radiosity vertices")?;
        let current = try_filled(vertex_count, Vec3::ZERO, "radiosity bounce")?;

        let factory = SequenceFactory::new(
            settings.sequence,
            settings.hemisphere_rays.max(settings.direct_rays),
        );
        let mut rng = StdRng::seed_from_u64(settings.seed);
        let batches = (0..vertex_count.div_ceil(settings.batch_size))
            .map(|_| Mutex::new(factory.stream(rng.gen(), rng.gen_range(0..100_000))))
            .collect();

        log::info!(
            "Radiosity over {} vertices, {} bounces, {} direct / {} hemisphere rays",
            vertex_count,
            settings.bounces,
            settings.direct_rays,
            settings.hemisphere_rays
        );

        self.total = total;
        self.current = current;
        self.previous = Arc::new(Vec::new());
        self.bounce = 0;
        self.context = Some(Arc::new(RadiosityContext {
            tracer,
            light,
            settings,
            batches,
        }));
        self.launch_bounce();
        Ok(())
    }

    fn launch_bounce(&mut self) {
        let Some(ctx) = &self.context else {
            return;
        };
        let ctx = Arc::clone(ctx);
        let previous = (self.bounce > 0).then(|| Arc::clone(&self.previous));
        let batches = ctx.batches.len();
        self.bounce_started = Instant::now();
        self.launcher.launch(0..batches, move |batch, cancel| {
            ctx.gather(batch, previous.as_deref().map(Vec::as_slice), cancel)
        });
    }

    /// Poll the current bounce without blocking.
    ///
    /// Batches that have finished are added to the total right away. Once
    /// every batch is in, makes the bounce the input of the next one,
    /// launches that bounce (or finishes the run) and returns true.
    pub fn check_finish(&mut self) -> RenderResult<bool> {
        let Some(batch_size) = self.context.as_ref().map(|ctx| ctx.settings.batch_size) else {
            return Ok(false);
        };

        for (batch, values) in self.launcher.pop_all() {
            let start = batch * batch_size;
            let range = start..start + values.len();
            self.current[range.clone()].copy_from_slice(&values);
            for (sum, e) in self.total[range].iter_mut().zip(&values) {
                *sum += *e;
            }
        }
        // The wave is cleared only by the pop that took its last result
        if self.launcher.num_pending() > 0 {
            return Ok(false);
        }

        let next = try_filled(self.total.len(), Vec3::ZERO, "radiosity bounce")?;
        self.previous = Arc::new(std::mem::replace(&mut self.current, next));
        log::debug!(
            "Radiosity bounce {} finished in {:.2?}",
            self.bounce,
            self.bounce_started.elapsed()
        );
        self.bounce += 1;

        let bounces = self.context.as_ref().map_or(0, |ctx| ctx.settings.bounces);
        if self.bounce > bounces {
            log::info!("Radiosity done after {} bounces", self.bounce);
            self.context = None;
        } else {
            self.launch_bounce();
        }
        Ok(true)
    }

    /// Block until the current bounce finishes, then merge it.
    pub fn wait_bounce(&mut self) -> RenderResult<bool> {
        self.launcher.wait();
        self.check_finish()
    }

    /// Cancel the run and drain its tasks.
    ///
    /// Finished bounces and batches already merged stay in the total.
    pub fn stop(&mut self) {
        self.launcher.stop();
        if self.context.take().is_some() {
            log::info!("Radiosity stopped after {} bounces", self.bounce);
        }
    }

    pub fn is_running(&self) -> bool {
        self.context.is_some()
    }

    /// Finished bounces (the direct pass counts as one).
    pub fn current_bounce(&self) -> u32 {
        self.bounce
    }

    /// Accumulated irradiance per vertex, including merged batches of the
    /// bounce in flight.
    pub fn vertex_irradiance(&self) -> &[Vec3] {
        &self.total
    }

    /// Outgoing radiance per vertex for a white diffuse surface.
    pub fn vertex_radiosity(&self) -> Vec<Vec3> {
        self.total.iter().map(|e| *e * FRAC_1_PI).collect()
    }

    /// Replace the solution, e.g. with one loaded from a cache file.
    pub fn set_solution(&mut self, irradiance: Vec<Vec3>) {
        self.stop();
        self.previous = Arc::new(Vec::new());
        self.current = Vec::new();
        self.total = irradiance;
    }
}
