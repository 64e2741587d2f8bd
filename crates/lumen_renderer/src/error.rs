//! Error types for hierarchy construction, caches and render runs.

use lumen_core::SceneHash;
use thiserror::Error;

/// Errors raised while building a BVH.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BvhError {
    #[error("Cannot build a hierarchy over an empty triangle set")]
    EmptyScene,

    #[error("Inverted primitive range [{start}, {end}]")]
    InvertedRange { start: usize, end: usize },

    #[error("Primitive range [{start}, {end}] exceeds index array of length {len}")]
    RangeOutOfBounds { start: usize, end: usize, len: usize },

    #[error("Primitive index {index} out of range for {triangle_count} triangles")]
    IndexOutOfRange { index: u32, triangle_count: usize },

    #[error("Splitting [{start}, {end}] at {split} leaves an empty child")]
    EmptyChild { start: usize, end: usize, split: usize },

    #[error("Leaf size must be at least 1")]
    InvalidLeafSize,
}

/// Errors raised while reading or writing cache files.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a {expected} cache file")]
    BadMagic { expected: &'static str },

    #[error("Unsupported cache version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("Cache was written for scene {found}, current scene is {expected}")]
    HashMismatch {
        expected: SceneHash,
        found: SceneHash,
    },

    #[error("Corrupt cache: {0}")]
    Corrupt(String),
}

/// Errors that end a render or radiosity run before it starts.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to allocate {what} ({count} elements)")]
    Allocation { what: &'static str, count: usize },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Failed to start worker threads: {0}")]
    ThreadPool(String),

    #[error("Hierarchy build failed: {0}")]
    Bvh(#[from] BvhError),
}

pub type CacheResult<T> = Result<T, CacheError>;
pub type RenderResult<T> = Result<T, RenderError>;
