//! Flocking rules and per-frame integration.
//!
//! Four steering rules act on each boid, all driven by the neighbors inside
//! its flocking zone:
//!
//! | Rule | Accumulates | Desired heading |
//! |------|-------------|-----------------|
//! | Alignment | neighbor velocities | their average |
//! | Cohesion | neighbor positions | towards their centroid |
//! | Separation | unit vectors away from each neighbor | their average |
//! | View | small rotations away from neighbors ahead | own velocity, rotated |
//!
//! Each desired heading is scaled to `speed_factor`, turned into a steering
//! force by subtracting the current velocity and clamped to `force_limit`.

use glam::{Mat3, Vec3};

use crate::boid::Boid;
use crate::math::{angle, dist2, limit, wrap, BoundingBox};

/// Neighbors closer than this angle to the heading obstruct the view (radians).
pub const VIEW_ANGLE: f32 = 1.0;
/// Rotation applied per obstructing neighbor, as a fraction of its angle.
pub const ANGLE_DELTA: f32 = 0.01;

/// Global flocking constants, fixed for a run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlockParams {
    /// Flocking zone radius.
    pub range: f32,
    /// Length of every desired heading.
    pub speed_factor: f32,
    /// Maximum length of each steering contribution.
    pub force_limit: f32,
}

impl FlockParams {
    pub fn new(range: f32, speed_factor: f32, force_limit: f32) -> Self {
        Self {
            range,
            speed_factor,
            force_limit,
        }
    }

    #[inline]
    pub fn range_sqr(&self) -> f32 {
        self.range * self.range
    }
}

impl Default for FlockParams {
    fn default() -> Self {
        Self::new(40.0, 2.0, 0.1)
    }
}

/// Result of flocking one boid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Steering {
    /// Sum of the four clamped rule contributions.
    pub acceleration: Vec3,
    /// Neighbors inside the flocking zone, self excluded.
    pub neighbors: u32,
}

/// Per-boid rule accumulator, reset before each boid.
#[derive(Clone, Debug)]
pub struct Flock {
    align: Vec3,
    cohesion: Vec3,
    separation: Vec3,
    view: Mat3,
    align_count: u32,
    cohesion_count: u32,
    separation_count: u32,
    view_count: u32,
}

impl Flock {
    pub fn new() -> Self {
        Self {
            align: Vec3::ZERO,
            cohesion: Vec3::ZERO,
            separation: Vec3::ZERO,
            view: Mat3::IDENTITY,
            align_count: 0,
            cohesion_count: 0,
            separation_count: 0,
            view_count: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Add one in-range neighbor's contribution to every rule.
    pub fn accumulate(&mut self, me: &Boid, other: &Boid) {
        let away = me.position - other.position;
        let dist = away.length();

        self.align += other.velocity;
        self.align_count += 1;

        self.cohesion += other.position;
        self.cohesion_count += 1;

        // coincident boids have no direction to separate along
        if dist > 0.0 {
            self.separation += away / dist;
            self.separation_count += 1;
        }

        let towards = -away;
        let ang = angle(me.velocity, towards);
        if ang < VIEW_ANGLE {
            if let Some(axis) = me.velocity.cross(towards).try_normalize() {
                self.view *= Mat3::from_axis_angle(axis, -ang * ANGLE_DELTA);
            }
            self.view_count += 1;
        }
    }

    /// Combine the accumulated rules into one acceleration for `me`.
    pub fn steering(&self, me: &Boid, params: &FlockParams) -> Vec3 {
        let mut acceleration = Vec3::ZERO;

        if self.align_count > 0 {
            acceleration += steer(self.align / self.align_count as f32, me, params);
        }
        if self.cohesion_count > 0 {
            let centroid = self.cohesion / self.cohesion_count as f32;
            acceleration += steer(centroid - me.position, me, params);
        }
        if self.separation_count > 0 {
            acceleration += steer(self.separation / self.separation_count as f32, me, params);
        }
        if self.view_count > 0 {
            acceleration += steer(self.view * me.velocity, me, params);
        }
        acceleration
    }

    /// Neighbors accumulated since the last reset.
    #[inline]
    pub fn neighbors(&self) -> u32 {
        self.align_count
    }

    /// Neighbors that obstruct the view.
    #[inline]
    pub fn view_count(&self) -> u32 {
        self.view_count
    }

    /// Reset, accumulate every in-range candidate other than `me` itself and
    /// return the resulting steering.
    ///
    /// Candidates are indices into `boids`; out-of-range candidates are
    /// skipped, so any superset of the true neighbors gives the same result.
    pub fn run<I>(
        &mut self,
        me: &Boid,
        boids: &[Boid],
        candidates: I,
        params: &FlockParams,
    ) -> Steering
    where
        I: IntoIterator<Item = usize>,
    {
        self.reset();
        let range_sqr = params.range_sqr();

        for idx in candidates {
            let other = &boids[idx];
            if other.id == me.id || dist2(me.position, other.position) > range_sqr {
                continue;
            }
            self.accumulate(me, other);
        }

        Steering {
            acceleration: self.steering(me, params),
            neighbors: self.neighbors(),
        }
    }
}

impl Default for Flock {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamped steering towards `desired`; a heading that cannot be normalized
/// contributes nothing.
fn steer(desired: Vec3, me: &Boid, params: &FlockParams) -> Vec3 {
    match desired.try_normalize() {
        Some(heading) => limit(heading * params.speed_factor - me.velocity, params.force_limit),
        None => Vec3::ZERO,
    }
}

/// Move one boid: wrap its position, apply last frame's acceleration and
/// clear it.
#[inline]
pub fn integrate(boid: &mut Boid, bbox: &BoundingBox) {
    boid.position = wrap(boid.position + boid.velocity, bbox);
    boid.velocity += boid.acceleration;
    boid.acceleration = Vec3::ZERO;
}

/// Store a steering result on its boid.
#[inline]
pub fn apply(boid: &mut Boid, steering: Steering) {
    boid.acceleration += steering.acceleration;
    boid.count_around = steering.neighbors as f32;
}
