//! Error types for octoflock.
//!
//! The neighbor indices themselves never fail on well-formed input; the
//! errors here cover the fixed-capacity limits they enforce, GPU device
//! setup, and reading the environment file.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur during GPU initialization and dispatch.
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map buffer for reading.
    BufferMapping(String),
    /// A storage buffer would exceed the device binding limit.
    BufferTooLarge {
        label: &'static str,
        size: u64,
        limit: u64,
    },
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => write!(
                f,
                "No GPU adapter available (run with --cpu-fallback to simulate on the CPU)"
            ),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
            GpuError::BufferTooLarge { label, size, limit } => write!(
                f,
                "{} needs {} bytes but the device only allows {} per storage binding",
                label, size, limit
            ),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// A range query matched more boids than the octree scratch buffer holds.
///
/// Only returned under [`OverflowPolicy::Reject`](crate::octree::OverflowPolicy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOverflow {
    /// Scratch buffer capacity.
    pub capacity: usize,
    /// Matches found before the query was abandoned.
    pub found: usize,
}

impl fmt::Display for QueryOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Range query overflowed the result buffer ({} matches, capacity {})",
            self.found, self.capacity
        )
    }
}

impl std::error::Error for QueryOverflow {}

/// Errors raised while laying out or rebuilding the uniform grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// Bitonic sorting needs a power-of-two element count.
    NotPowerOfTwo(usize),
    /// The offset table would exceed the configured cell ceiling.
    TooManyCells { requested: u64, limit: u64 },
    /// Cells narrower than twice the flocking radius on some axis, so the
    /// 27-cell stencil could miss neighbors.
    CellsTooSmall { resolution: [u32; 3], max: [u32; 3] },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::NotPowerOfTwo(n) => {
                write!(f, "Grid sorting requires a power-of-two boid count, got {}", n)
            }
            GridError::TooManyCells { requested, limit } => write!(
                f,
                "Grid needs {} cells but at most {} are allowed; increase the flocking zone",
                requested, limit
            ),
            GridError::CellsTooSmall { resolution, max } => write!(
                f,
                "Grid resolution {:?} is finer than {:?}, \
                 cells must be at least twice the flocking zone",
                resolution, max
            ),
        }
    }
}

impl std::error::Error for GridError {}

/// Errors that can occur while loading an environment file.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the file from disk.
    Io { path: PathBuf, source: std::io::Error },
    /// `appType` is not one of the known strategies.
    InvalidAppType(i32),
    /// A setting holds a value the simulation cannot run with.
    Invalid { key: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read environment file {}: {}", path.display(), source)
            }
            ConfigError::InvalidAppType(value) => {
                write!(f, "Unknown app type {} (expected 0, 1, 2 or 3)", value)
            }
            ConfigError::Invalid { key, reason } => {
                write!(f, "Invalid setting {}: {}", key, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors that can occur when building or stepping an engine.
#[derive(Debug)]
pub enum EngineError {
    /// GPU initialization or dispatch failed.
    Gpu(GpuError),
    /// Grid layout or rebuild failed.
    Grid(GridError),
    /// Octree query rejected under the strict overflow policy.
    Query(QueryOverflow),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Gpu(e) => write!(f, "GPU error: {}", e),
            EngineError::Grid(e) => write!(f, "Grid error: {}", e),
            EngineError::Query(e) => write!(f, "Octree error: {}", e),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Gpu(e) => Some(e),
            EngineError::Grid(e) => Some(e),
            EngineError::Query(e) => Some(e),
        }
    }
}

impl From<GpuError> for EngineError {
    fn from(e: GpuError) -> Self {
        EngineError::Gpu(e)
    }
}

impl From<GridError> for EngineError {
    fn from(e: GridError) -> Self {
        EngineError::Grid(e)
    }
}

impl From<QueryOverflow> for EngineError {
    fn from(e: QueryOverflow) -> Self {
        EngineError::Query(e)
    }
}
