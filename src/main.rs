use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing::{debug, info, warn};

use octoflock::input::Controls;
use octoflock::time::FrameTimer;
use octoflock::{ConfigError, Engine, EngineOptions, Environment, SimConfig};

const DEFAULT_ENV_FILE: &str = "env.txt";

/// Headless flocking simulation.
#[derive(Debug, Parser)]
#[command(name = "octoflock", version, about)]
struct Cli {
    /// Neighbor strategy: 0 naive CPU, 1 octree CPU, 2 naive GPU, 3 grid GPU.
    #[arg(allow_negative_numbers = true)]
    app_type: Option<i32>,

    /// Population is 2^BOID_EXP boids.
    #[arg(allow_negative_numbers = true)]
    boid_exp: Option<i32>,

    /// Environment file. Defaults to env.txt next to the executable.
    #[arg(long, value_name = "FILE")]
    env: Option<PathBuf>,

    /// Number of frames to simulate.
    #[arg(long, default_value_t = 600)]
    frames: u64,

    /// Seed for the initial boid positions and headings.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Run GPU strategies on the CPU when no GPU adapter is available.
    #[arg(long)]
    cpu_fallback: bool,

    /// Log timing and neighbor statistics every K frames, 0 to disable.
    #[arg(long, value_name = "K", default_value_t = 60)]
    stats_every: u64,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut env = load_environment(cli.env.clone());
    env.apply_overrides(cli.app_type, cli.boid_exp);

    let config = match SimConfig::from_environment(&env) {
        Ok(config) => config,
        Err(ConfigError::InvalidAppType(value)) => Cli::command()
            .error(
                ErrorKind::InvalidValue,
                format!(
                    "unknown app type {}, expected 0 (naive CPU), 1 (octree CPU), \
                     2 (naive GPU) or 3 (grid GPU)",
                    value
                ),
            )
            .exit(),
        Err(e) => return Err(e).context("invalid environment"),
    };

    info!(
        app_type = %config.app_type,
        boids = config.boid_count(),
        zone = config.flock.range,
        grid = ?config.grid_resolution,
        "starting simulation"
    );

    let options = EngineOptions {
        cpu_fallback: cli.cpu_fallback,
    };
    let mut engine = Engine::new(config, cli.seed, options).context("failed to start engine")?;
    run(&mut engine, &cli)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Read the environment file, falling back to defaults if it is missing.
fn load_environment(explicit: Option<PathBuf>) -> Environment {
    let path = match explicit {
        Some(path) => path,
        None => {
            let beside_exe = std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_ENV_FILE)));
            match beside_exe {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("no environment file, using defaults");
                    return Environment::new();
                }
            }
        }
    };

    match Environment::from_file(&path) {
        Ok(env) => env,
        Err(e) => {
            warn!("{}, using defaults", e);
            Environment::new()
        }
    }
}

fn run(engine: &mut Engine, cli: &Cli) -> Result<()> {
    // headless: nothing presses keys, so the simulation always runs
    let controls = Controls::new();
    let mut timer = FrameTimer::new();

    for frame in 1..=cli.frames {
        if controls.exit_requested() {
            break;
        }

        timer.start();
        engine
            .update(&controls.frame_input())
            .with_context(|| format!("frame {} failed", frame))?;
        let spent = timer.stop();

        if cli.stats_every > 0 && frame % cli.stats_every == 0 {
            let view = engine.frame();
            info!(
                frame,
                update_ms = spent.as_secs_f64() * 1e3,
                fps = timer.fps(),
                min_around = view.min_around,
                max_around = view.max_around,
                "frame"
            );
            if let Some(stats) = engine.octree_stats() {
                info!("octree\n{}", stats);
            }
        }
    }

    info!(
        frames = timer.frame(),
        avg_ms = timer.average().as_secs_f64() * 1e3,
        worst_ms = timer.worst().as_secs_f64() * 1e3,
        "simulation finished"
    );
    Ok(())
}
