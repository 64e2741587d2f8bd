//! Lumen Renderer - BVH ray casting and progressive light transport
//!
//! Builds a bounding volume hierarchy over a frozen `lumen_core::Scene`,
//! answers nearest-hit and shadow queries against it, and runs two
//! integrators on a worker pool:
//!
//! - a progressive path tracer producing an accumulation image
//! - an iterative per-vertex radiosity solver
//!
//! Hierarchies and radiosity solutions can be cached on disk, keyed by
//! the scene's content hash.

pub mod bvh;
pub mod cache;
pub mod camera;
pub mod error;
pub mod hit;
pub mod image;
pub mod integrator;
pub mod launcher;
pub mod sampling;
pub mod sequence;
pub mod tracer;

pub use bvh::{Bvh, BvhConfig, BvhNode, BvhStats, SplitMode, DEFAULT_LEAF_SIZE};
pub use cache::{
    hierarchy_file_name, load_hierarchy, load_or_build_hierarchy, load_radiosity, save_hierarchy,
    save_radiosity,
};
pub use camera::Camera;
pub use error::{BvhError, CacheError, CacheResult, RenderError, RenderResult};
pub use hit::Hit;
pub use image::{color_to_rgba, linear_to_gamma, ImageBuffer};
pub use integrator::{
    direct_irradiance, indirect_irradiance, InstantRadiosity, InstantRadiositySettings,
    PathTraceSettings, PathTracer, Radiosity, RadiositySettings,
};
pub use launcher::TaskLauncher;
pub use sequence::{HaltonTable, SampleSequence, SampleStream, SequenceFactory, SequenceKind};
pub use tracer::{RayTracer, T_MIN};

/// Re-export common math types from lumen_math
pub use lumen_math::{Aabb, Interval, Ray, Vec2, Vec3, Vec4};
