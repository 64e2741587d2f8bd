//! Light transport on top of the ray query engine.
//!
//! - `direct`: light-sampled irradiance with shadow rays
//! - `path`: progressive per-pixel path tracer with Russian roulette
//! - `radiosity`: per-vertex iterative gathering, one wave per bounce
//! - `instant`: secondary emitters placed along light paths

pub mod direct;
pub mod instant;
pub mod path;
pub mod radiosity;

pub use direct::{direct_irradiance, SHADOW_EPSILON, SHADOW_MAX_PARAM};
pub use instant::{InstantRadiosity, InstantRadiositySettings};
pub use path::{trace_path, PathState, PathTraceSettings, PathTracer};
pub use radiosity::{indirect_irradiance, Radiosity, RadiositySettings};

/// Length of hemisphere rays; they are cast as segments with max parameter 1.
pub const INDIRECT_RAY_LENGTH: f32 = 100.0;

/// Offset along the normal for rays leaving a mesh vertex.
pub const VERTEX_OFFSET: f32 = 0.01;
