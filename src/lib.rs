//! # Octoflock
//!
//! Flocking simulation of large boid populations in a wrap-around 3D
//! volume, with interchangeable neighbor-search strategies.
//!
//! Each boid steers by four rules (alignment, cohesion, separation and view
//! obstruction) computed from the boids within its flocking zone. Finding
//! those neighbors is the expensive part, and the engine offers several ways
//! to do it that all produce the same neighbor sets.
//!
//! ## Quick Start
//!
//! ```ignore
//! use octoflock::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut env = Environment::new();
//!     env.apply_overrides(Some(1), Some(12));
//!     let config = SimConfig::from_environment(&env)?;
//!
//!     let mut engine = Engine::new(config, 42, EngineOptions::default())?;
//!     for _ in 0..100 {
//!         engine.update(&FrameInput::default())?;
//!     }
//!
//!     let view = engine.frame();
//!     println!(
//!         "{} boids, {:.1}..{:.1} neighbors",
//!         view.boids.len(),
//!         view.min_around,
//!         view.max_around
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Strategies
//!
//! The `appType` setting picks one of:
//!
//! - `0` naive CPU: every boid against every other boid
//! - `1` octree CPU: range queries on an [`Octree`] rebuilt every frame
//! - `2` naive GPU: the naive loop as a compute shader
//! - `3` grid GPU: boids bitonic-sorted into a uniform grid, 27-cell queries
//!
//! ## Octree
//!
//! The octree is a pooled point-region tree. Nodes hold up to
//! [`LEAF_CAPACITY`](octree::LEAF_CAPACITY) boids each and only route
//! further insertions into their children once full, so inner nodes keep
//! their boids. It is rebuilt from scratch every frame, reusing the pool.
//!
//! ## Grid
//!
//! Cells are at least twice the flocking radius wide, so the 27 cells
//! around a boid hold every neighbor it can have. The CPU version in
//! [`grid`] runs the same sort and offset scan as the shaders and serves as
//! a fallback when no GPU is present.
//!
//! ## Configuration
//!
//! Settings come from a plain text environment file, see [`config`].
//! Missing or malformed entries fall back to built-in defaults.

pub mod boid;
pub mod config;
pub mod engine;
pub mod error;
pub mod flock;
pub mod gpu;
pub mod grid;
pub mod input;
pub mod math;
pub mod octree;
pub mod stats;
pub mod time;

pub use bytemuck;
pub use glam::{UVec3, Vec3};

pub use boid::{Boid, BoidContainer, BoidGpu};
pub use config::{Environment, SimConfig};
pub use engine::{AppType, Engine, EngineOptions, FrameView};
pub use error::{ConfigError, EngineError, GpuError, GridError, QueryOverflow};
pub use flock::{Flock, FlockParams};
pub use grid::{GridIndex, GridLayout};
pub use math::BoundingBox;
pub use octree::{Octree, OctreeStats, OverflowPolicy};

pub mod prelude {
    pub use crate::boid::{spawn_boids, Boid, BoidContainer, BoidGpu};
    pub use crate::config::{Environment, SimConfig};
    pub use crate::engine::{AppType, Engine, EngineOptions, FrameView};
    pub use crate::error::{ConfigError, EngineError, GpuError, GridError, QueryOverflow};
    pub use crate::flock::{Flock, FlockParams};
    pub use crate::grid::{GridIndex, GridLayout};
    pub use crate::input::{Controls, FrameInput, KeyCode};
    pub use crate::math::BoundingBox;
    pub use crate::octree::{Octree, OverflowPolicy};
    pub use crate::time::FrameTimer;
    pub use crate::{UVec3, Vec3};
}
