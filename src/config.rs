//! Environment file and typed simulation settings.
//!
//! The environment is a plain text file with one record per line:
//!
//! ```text
//! # comment
//! flockingZone float 40
//! boidCount    int   14
//! spaceLow     vec3  -1000 -1000 -1000
//! ```
//!
//! Records land in one of three typed maps. Lookups of a missing key return
//! zero, so a record written with the wrong type silently falls back to
//! zero rather than failing. Bad lines are logged and skipped.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use glam::{UVec3, Vec3};

use crate::engine::AppType;
use crate::error::ConfigError;
use crate::flock::FlockParams;
use crate::grid::GridLayout;
use crate::math::BoundingBox;

/// Largest accepted `boidCount` exponent. One boid per invocation must
/// still fit in a single dispatch of 256-wide workgroups.
pub const MAX_BOID_EXPONENT: i32 = 23;

/// Typed key/value store read from an environment file.
#[derive(Clone, Debug, PartialEq)]
pub struct Environment {
    ints: HashMap<String, i32>,
    floats: HashMap<String, f32>,
    vecs: HashMap<String, Vec3>,
}

impl Environment {
    /// Environment holding only the built-in defaults, with `grid` derived.
    pub fn new() -> Self {
        let mut env = Self {
            ints: HashMap::new(),
            floats: HashMap::new(),
            vecs: HashMap::new(),
        };

        env.set_int("appType", 0);
        env.set_int("boidCount", 10);
        env.set_vec("spaceLow", Vec3::splat(-1000.0));
        env.set_vec("spaceHigh", Vec3::splat(1000.0));
        env.set_int("dark", 1);

        env.set_float("flockingZone", 40.0);
        env.set_float("speedFactor", 2.0);
        env.set_float("forceLimit", 0.1);

        env.set_int("treeMemoryLimit", 4096);
        env.set_float("boidSize", 2.0);

        env.derive_grid();
        env
    }

    /// Defaults overlaid with the records in `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "reading environment");

        let mut env = Self::new();
        env.parse_str(&text);
        Ok(env)
    }

    /// Apply every well-formed record in `text` and re-derive `grid`.
    ///
    /// Returns the number of records applied.
    pub fn parse_str(&mut self, text: &str) -> usize {
        let mut applied = 0;

        for (number, line) in text.lines().enumerate() {
            let mut tokens = line.split_whitespace();
            let Some(name) = tokens.next() else {
                continue;
            };
            if name.starts_with('#') {
                continue;
            }
            let Some(kind) = tokens.next() else {
                tracing::warn!(
                    line = number + 1,
                    key = name,
                    "environment record has no type, skipping"
                );
                continue;
            };
            let values: Vec<&str> = tokens.collect();

            if self.apply_record(name, kind, &values) {
                tracing::debug!(key = name, kind, values = ?values, "environment record");
                applied += 1;
            } else {
                tracing::warn!(
                    line = number + 1,
                    key = name,
                    kind,
                    values = ?values,
                    "malformed environment record, skipping"
                );
            }
        }

        self.derive_grid();
        applied
    }

    fn apply_record(&mut self, name: &str, kind: &str, values: &[&str]) -> bool {
        match (kind, values) {
            ("int", [v, ..]) => match v.parse() {
                Ok(v) => {
                    self.set_int(name, v);
                    true
                }
                Err(_) => false,
            },
            ("float", [v, ..]) => match v.parse() {
                Ok(v) => {
                    self.set_float(name, v);
                    true
                }
                Err(_) => false,
            },
            ("vec3", [x, y, z, ..]) => match (x.parse(), y.parse(), z.parse()) {
                (Ok(x), Ok(y), Ok(z)) => {
                    self.set_vec(name, Vec3::new(x, y, z));
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Command line overrides for `appType` and the `boidCount` exponent.
    ///
    /// The exponent is raised to at least 1.
    pub fn apply_overrides(&mut self, app_type: Option<i32>, boid_exponent: Option<i32>) {
        if let Some(app_type) = app_type {
            self.set_int("appType", app_type);
        }
        if let Some(exponent) = boid_exponent {
            self.set_int("boidCount", exponent.max(1));
        }
        self.derive_grid();
    }

    /// Recompute the `grid` record from the domain and flocking zone.
    fn derive_grid(&mut self) {
        let bbox = BoundingBox::new(self.get_vec("spaceLow"), self.get_vec("spaceHigh"));
        let zone = self.get_float("flockingZone");
        let grid = if zone > 0.0 {
            GridLayout::resolution_for_zone(&bbox, zone)
        } else {
            UVec3::ONE
        };
        self.set_vec("grid", grid.as_vec3());
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        self.ints.insert(name.to_string(), value);
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.floats.insert(name.to_string(), value);
    }

    pub fn set_vec(&mut self, name: &str, value: Vec3) {
        self.vecs.insert(name.to_string(), value);
    }

    pub fn get_int(&self, name: &str) -> i32 {
        self.ints.get(name).copied().unwrap_or(0)
    }

    pub fn get_float(&self, name: &str) -> f32 {
        self.floats.get(name).copied().unwrap_or(0.0)
    }

    pub fn get_vec(&self, name: &str) -> Vec3 {
        self.vecs.get(name).copied().unwrap_or(Vec3::ZERO)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings that only affect rendering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSettings {
    pub dark: bool,
    pub boid_size: f32,
}

/// Validated, typed simulation settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimConfig {
    pub app_type: AppType,
    /// Population is `2^boid_exponent`.
    pub boid_exponent: u32,
    pub bbox: BoundingBox,
    pub flock: FlockParams,
    pub grid_resolution: UVec3,
    /// Cap on octree nodes handed to the renderer per frame.
    pub tree_memory_limit: usize,
    pub render: RenderSettings,
}

impl SimConfig {
    pub fn from_environment(env: &Environment) -> Result<Self, ConfigError> {
        let app_type = AppType::try_from(env.get_int("appType"))?;

        let mut exponent = env.get_int("boidCount").max(1);
        if exponent > MAX_BOID_EXPONENT {
            tracing::warn!(
                requested = exponent,
                max = MAX_BOID_EXPONENT,
                "boid count exponent too large, clamping"
            );
            exponent = MAX_BOID_EXPONENT;
        }

        let bbox = BoundingBox::new(env.get_vec("spaceLow"), env.get_vec("spaceHigh"));
        if !bbox.diagonal().cmpgt(Vec3::ZERO).all() {
            return Err(ConfigError::Invalid {
                key: "spaceHigh",
                reason: format!("{} must exceed spaceLow {} on every axis", bbox.high, bbox.low),
            });
        }

        let flock = FlockParams::new(
            env.get_float("flockingZone"),
            env.get_float("speedFactor"),
            env.get_float("forceLimit"),
        );
        if !(flock.range > 0.0) {
            return Err(ConfigError::Invalid {
                key: "flockingZone",
                reason: format!("{} is not a positive radius", flock.range),
            });
        }

        Ok(Self {
            app_type,
            boid_exponent: exponent as u32,
            bbox,
            flock,
            grid_resolution: env.get_vec("grid").as_uvec3().max(UVec3::ONE),
            tree_memory_limit: env.get_int("treeMemoryLimit").max(0) as usize,
            render: RenderSettings {
                dark: env.get_int("dark") != 0,
                boid_size: env.get_float("boidSize"),
            },
        })
    }

    #[inline]
    pub fn boid_count(&self) -> usize {
        1usize << self.boid_exponent
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            app_type: AppType::CpuNaive,
            boid_exponent: 10,
            bbox: BoundingBox::cube(1000.0),
            flock: FlockParams::default(),
            grid_resolution: UVec3::splat(25),
            tree_memory_limit: 4096,
            render: RenderSettings {
                dark: true,
                boid_size: 2.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let env = Environment::new();
        assert_eq!(env.get_int("appType"), 0);
        assert_eq!(env.get_int("boidCount"), 10);
        assert_eq!(env.get_float("flockingZone"), 40.0);
        assert_eq!(env.get_vec("spaceLow"), Vec3::splat(-1000.0));
        assert_eq!(env.get_vec("grid"), Vec3::splat(25.0));
        assert_eq!(SimConfig::from_environment(&env).unwrap(), SimConfig::default());
    }

    #[test]
    fn test_parse_records() {
        let mut env = Environment::new();
        let applied = env.parse_str(
            "# header comment\n\
             \n\
             flockingZone float 100\n\
             appType int 1\n\
             spaceHigh vec3 500 1000 2000\n",
        );
        assert_eq!(applied, 3);
        assert_eq!(env.get_float("flockingZone"), 100.0);
        assert_eq!(env.get_int("appType"), 1);
        assert_eq!(env.get_vec("spaceHigh"), Vec3::new(500.0, 1000.0, 2000.0));
        // (1500, 2000, 3000) / 200
        assert_eq!(env.get_vec("grid"), Vec3::new(7.0, 10.0, 15.0));
    }

    #[test]
    fn test_bad_records_are_skipped() {
        let mut env = Environment::new();
        let applied = env.parse_str(
            "speedFactor float fast\n\
             boidCount string 12\n\
             spaceLow vec3 1 2\n\
             orphan\n\
             forceLimit float 0.5\n",
        );
        assert_eq!(applied, 1);
        assert_eq!(env.get_float("speedFactor"), 2.0);
        assert_eq!(env.get_int("boidCount"), 10);
        assert_eq!(env.get_float("forceLimit"), 0.5);
    }

    #[test]
    fn test_missing_keys_are_zero() {
        let env = Environment::new();
        assert_eq!(env.get_int("nope"), 0);
        assert_eq!(env.get_float("appType"), 0.0);
        assert_eq!(env.get_vec("nope"), Vec3::ZERO);
    }

    #[test]
    fn test_overrides() {
        let mut env = Environment::new();
        env.apply_overrides(Some(3), Some(-4));
        assert_eq!(env.get_int("appType"), 3);
        assert_eq!(env.get_int("boidCount"), 1);

        let config = SimConfig::from_environment(&env).unwrap();
        assert_eq!(config.app_type, AppType::GpuGrid);
        assert_eq!(config.boid_count(), 2);
    }

    #[test]
    fn test_invalid_settings() {
        let mut env = Environment::new();
        env.set_int("appType", 7);
        assert!(matches!(
            SimConfig::from_environment(&env),
            Err(ConfigError::InvalidAppType(7))
        ));

        let mut env = Environment::new();
        env.set_vec("spaceHigh", Vec3::new(1000.0, -1000.0, 1000.0));
        assert!(matches!(
            SimConfig::from_environment(&env),
            Err(ConfigError::Invalid { key: "spaceHigh", .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = Environment::from_file("/definitely/not/here/env.txt").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
