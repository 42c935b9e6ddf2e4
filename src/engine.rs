//! Simulation engine: one population, one neighbor strategy.
//!
//! Every strategy runs the same frame:
//!
//! 1. integrate every boid (move, wrap, apply last frame's steering),
//! 2. rebuild the neighbor structure from the new positions,
//! 3. flock every boid against its neighbors,
//! 4. feed the frame's neighbor-count extremes into the rolling statistics.
//!
//! They differ only in step 2 and in where the work happens:
//!
//! | Strategy | Structure | Runs on |
//! |----------|-----------|---------|
//! | `CpuNaive` | none, O(n²) | CPU |
//! | `CpuOctree` | octree, rebuilt per frame | CPU |
//! | `CpuGrid` | sorted uniform grid | CPU |
//! | `GpuNaive` | none, O(n²) | GPU |
//! | `GpuGrid` | sorted uniform grid | GPU |
//!
//! `CpuGrid` is not selectable by app type. It only stands in for `GpuGrid`
//! when no GPU is available and fallback was requested.

use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::boid::{spawn_boids, Boid, BoidContainer, BoidGpu};
use crate::config::SimConfig;
use crate::error::{ConfigError, EngineError, GpuError, GridError};
use crate::flock::{apply, integrate, Flock, FlockParams};
use crate::gpu::{GpuContext, GpuFlock, GpuMode};
use crate::grid::{GridIndex, GridLayout};
use crate::input::FrameInput;
use crate::math::BoundingBox;
use crate::octree::{NodeGpu, Octree, OctreeStats};

/// Neighbor strategy selected by the `appType` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppType {
    CpuNaive = 0,
    CpuOctree = 1,
    GpuNaive = 2,
    GpuGrid = 3,
}

impl AppType {
    pub const ALL: [AppType; 4] = [
        AppType::CpuNaive,
        AppType::CpuOctree,
        AppType::GpuNaive,
        AppType::GpuGrid,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AppType::CpuNaive => "naive CPU",
            AppType::CpuOctree => "octree CPU",
            AppType::GpuNaive => "naive GPU",
            AppType::GpuGrid => "grid GPU",
        }
    }

    #[inline]
    pub fn uses_gpu(&self) -> bool {
        matches!(self, AppType::GpuNaive | AppType::GpuGrid)
    }
}

impl TryFrom<i32> for AppType {
    type Error = ConfigError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AppType::CpuNaive),
            1 => Ok(AppType::CpuOctree),
            2 => Ok(AppType::GpuNaive),
            3 => Ok(AppType::GpuGrid),
            other => Err(ConfigError::InvalidAppType(other)),
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", *self as i32, self.name())
    }
}

/// Engine construction switches that are not part of the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Run GPU app types on the CPU when no adapter can be opened.
    pub cpu_fallback: bool,
}

/// Neighbor structure plus whatever state it carries between frames.
pub enum Strategy {
    CpuNaive,
    CpuOctree(Octree),
    CpuGrid(GridIndex),
    GpuNaive(GpuFlock),
    GpuGrid(GpuFlock),
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::CpuNaive => "naive CPU",
            Strategy::CpuOctree(_) => "octree CPU",
            Strategy::CpuGrid(_) => "grid CPU",
            Strategy::GpuNaive(_) => "naive GPU",
            Strategy::GpuGrid(_) => "grid GPU",
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a renderer needs to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub boids: &'a [BoidGpu],
    /// Octree node boxes, empty for other strategies.
    pub node_boxes: &'a [NodeGpu],
    /// Rolling average of the smallest per-frame neighbor count.
    pub min_around: f32,
    /// Rolling average of the largest per-frame neighbor count.
    pub max_around: f32,
}

/// A boid population stepped by one neighbor strategy.
#[derive(Debug)]
pub struct Engine {
    config: SimConfig,
    boids: BoidContainer,
    strategy: Strategy,
    flock: Flock,
    candidates: Vec<usize>,
    render_boids: Vec<BoidGpu>,
    node_boxes: Vec<NodeGpu>,
    frames: u64,
}

impl Engine {
    /// Spawn `config.boid_count()` boids from `seed` and set up the strategy
    /// selected by `config.app_type`.
    pub fn new(config: SimConfig, seed: u64, options: EngineOptions) -> Result<Self, EngineError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let boids = spawn_boids(config.boid_count(), &config.bbox, &mut rng);
        Self::with_boids(config, boids, options)
    }

    /// Like [`Engine::new`] with a caller-supplied population.
    pub fn with_boids(
        config: SimConfig,
        boids: Vec<Boid>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let strategy = create_strategy(&config, &boids, options)?;
        tracing::info!(
            strategy = strategy.name(),
            boids = boids.len(),
            zone = config.flock.range,
            "engine ready"
        );

        let render_boids = boids.iter().map(Boid::to_gpu).collect();
        Ok(Self {
            config,
            boids: BoidContainer::new(boids),
            strategy,
            flock: Flock::new(),
            candidates: Vec::new(),
            render_boids,
            node_boxes: Vec::new(),
            frames: 0,
        })
    }

    #[inline]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    #[inline]
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    #[inline]
    pub fn boids(&self) -> &[Boid] {
        self.boids.boids()
    }

    #[inline]
    pub fn container(&self) -> &BoidContainer {
        &self.boids
    }

    /// Frames actually simulated, paused frames excluded.
    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Octree traversal counters of the last frame.
    pub fn octree_stats(&self) -> Option<OctreeStats> {
        match &self.strategy {
            Strategy::CpuOctree(tree) => Some(tree.stats()),
            _ => None,
        }
    }

    /// Advance one frame unless `input.run` is false.
    pub fn update(&mut self, input: &FrameInput) -> Result<(), EngineError> {
        if !input.run {
            return Ok(());
        }

        let params = self.config.flock;
        let bbox = self.config.bbox;
        let boids = self.boids.boids_mut();

        match &mut self.strategy {
            Strategy::CpuNaive => {
                integrate_all(boids, &bbox);
                flock_naive(boids, &mut self.flock, &params);
            }
            Strategy::CpuOctree(tree) => {
                integrate_all(boids, &bbox);
                tree.reset();
                tree.insert_all(boids);
                flock_octree(boids, tree, &mut self.flock, &params)?;

                let limit = self.config.tree_memory_limit;
                self.node_boxes = tree.node_boxes(limit);

                let stats = tree.stats();
                if stats.truncated > 0 {
                    tracing::warn!(
                        frame = self.frames,
                        dropped = stats.truncated,
                        capacity = tree.max_found(),
                        "octree range queries saturated"
                    );
                }
                tracing::debug!(frame = self.frames, "octree stats\n{}", stats);
            }
            Strategy::CpuGrid(grid) => {
                integrate_all(boids, &bbox);
                grid.rebuild(boids)?;
                flock_grid(boids, grid, &mut self.flock, &mut self.candidates, &params);
            }
            Strategy::GpuNaive(gpu) | Strategy::GpuGrid(gpu) => {
                let stepped = gpu.step()?;
                self.boids.load_gpu(&stepped);
                self.render_boids = stepped;
            }
        }

        if !matches!(self.strategy, Strategy::GpuNaive(_) | Strategy::GpuGrid(_)) {
            self.render_boids.clear();
            self.render_boids.extend(self.boids.boids().iter().map(Boid::to_gpu));
        }

        if let Some((min, max)) = self.boids.record_frame() {
            tracing::trace!(frame = self.frames, min, max, "neighbor counts");
        }
        self.frames += 1;
        Ok(())
    }

    /// Render hand-off for the current state.
    pub fn frame(&self) -> FrameView<'_> {
        let stats = self.boids.stats();
        FrameView {
            boids: &self.render_boids,
            node_boxes: &self.node_boxes,
            min_around: stats.average_min(),
            max_around: stats.average_max(),
        }
    }
}

fn create_strategy(
    config: &SimConfig,
    boids: &[Boid],
    options: EngineOptions,
) -> Result<Strategy, EngineError> {
    match config.app_type {
        AppType::CpuNaive => Ok(Strategy::CpuNaive),
        AppType::CpuOctree => Ok(Strategy::CpuOctree(Octree::new(config.bbox))),
        AppType::GpuNaive => match open_gpu(config, options)? {
            Some(context) => {
                let gpu = gpu_flock(context, config, boids, GpuMode::Naive)?;
                Ok(Strategy::GpuNaive(gpu))
            }
            None => Ok(Strategy::CpuNaive),
        },
        AppType::GpuGrid => {
            // validated up front so the CPU fallback obeys the same limits
            if boids.len() > 1 && !boids.len().is_power_of_two() {
                return Err(GridError::NotPowerOfTwo(boids.len()).into());
            }
            let layout =
                GridLayout::for_zone(config.bbox, config.grid_resolution, config.flock.range)?;

            match open_gpu(config, options)? {
                Some(context) => {
                    let gpu = gpu_flock(context, config, boids, GpuMode::Grid)?;
                    Ok(Strategy::GpuGrid(gpu))
                }
                None => Ok(Strategy::CpuGrid(GridIndex::new(layout))),
            }
        }
    }
}

/// Open the GPU, or `None` when there is no adapter and fallback is allowed.
fn open_gpu(config: &SimConfig, options: EngineOptions) -> Result<Option<GpuContext>, EngineError> {
    match GpuContext::new() {
        Ok(context) => Ok(Some(context)),
        Err(GpuError::NoAdapter) if options.cpu_fallback => {
            tracing::warn!(app_type = %config.app_type, "no GPU adapter, falling back to the CPU");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn gpu_flock(
    context: GpuContext,
    config: &SimConfig,
    boids: &[Boid],
    mode: GpuMode,
) -> Result<GpuFlock, EngineError> {
    let raw: Vec<BoidGpu> = boids.iter().map(Boid::to_gpu).collect();
    GpuFlock::new(context, &raw, config.bbox, config.flock, mode, config.grid_resolution)
}

/// Integrate every boid.
pub fn integrate_all(boids: &mut [Boid], bbox: &BoundingBox) {
    for boid in boids.iter_mut() {
        integrate(boid, bbox);
    }
}

/// Flock every boid against every other boid.
pub fn flock_naive(boids: &mut [Boid], flock: &mut Flock, params: &FlockParams) {
    let n = boids.len();
    for i in 0..n {
        let me = boids[i];
        let steering = flock.run(&me, boids, 0..n, params);
        apply(&mut boids[i], steering);
    }
}

/// Flock every boid against the octree's range query result.
///
/// `tree` must hold the current positions of `boids`.
pub fn flock_octree(
    boids: &mut [Boid],
    tree: &mut Octree,
    flock: &mut Flock,
    params: &FlockParams,
) -> Result<(), EngineError> {
    for i in 0..boids.len() {
        let me = boids[i];
        let found = tree.find_range(boids, me.position, params.range)?;
        let steering = flock.run(&me, boids, found.iter().map(|&slot| slot as usize), params);
        apply(&mut boids[i], steering);
    }
    Ok(())
}

/// Flock every boid against the 27 grid cells around it.
///
/// `grid` must have been rebuilt from `boids`.
pub fn flock_grid(
    boids: &mut [Boid],
    grid: &GridIndex,
    flock: &mut Flock,
    candidates: &mut Vec<usize>,
    params: &FlockParams,
) {
    for i in 0..boids.len() {
        let me = boids[i];
        candidates.clear();
        grid.for_each_candidate(me.position, |idx| candidates.push(idx));
        let steering = flock.run(&me, boids, candidates.iter().copied(), params);
        apply(&mut boids[i], steering);
    }
}
