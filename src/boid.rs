//! Boid agents and the container that owns them.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use rand::Rng;

use crate::math::BoundingBox;
use crate::stats::NeighborStats;

/// A single flocking agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Boid {
    /// Position inside the simulation domain.
    pub position: Vec3,
    /// Displacement applied per frame.
    pub velocity: Vec3,
    /// Steering accumulated this frame, applied and cleared on the next.
    pub acceleration: Vec3,
    /// Stable identity, `0..count`.
    pub id: u32,
    /// Number of boids within the flocking zone during the last update.
    pub count_around: f32,
    /// Linear grid cell, only meaningful on the grid path.
    pub cell: u32,
}

impl Boid {
    pub fn new(id: u32, position: Vec3, velocity: Vec3) -> Self {
        Self {
            position,
            velocity,
            acceleration: Vec3::ZERO,
            id,
            count_around: 0.0,
            cell: 0,
        }
    }

    /// Convert this boid to its GPU representation.
    pub fn to_gpu(&self) -> BoidGpu {
        BoidGpu {
            position: self.position.to_array(),
            _pad0: 0,
            velocity: self.velocity.to_array(),
            _pad1: 0,
            acceleration: self.acceleration.to_array(),
            id: self.id,
            count_around: self.count_around,
            cell: self.cell,
            _pad2: [0; 2],
        }
    }

    /// Convert from GPU representation back to a boid.
    pub fn from_gpu(gpu: &BoidGpu) -> Self {
        Self {
            position: Vec3::from_array(gpu.position),
            velocity: Vec3::from_array(gpu.velocity),
            acceleration: Vec3::from_array(gpu.acceleration),
            id: gpu.id,
            count_around: gpu.count_around,
            cell: gpu.cell,
        }
    }
}

/// GPU-compatible boid layout, 64 bytes.
///
/// Mirrors [`BoidGpu::WGSL_STRUCT`] exactly: every `vec3<f32>` is 16-byte
/// aligned, and `id` packs into the tail of `acceleration`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct BoidGpu {
    pub position: [f32; 3],
    pub _pad0: u32,
    pub velocity: [f32; 3],
    pub _pad1: u32,
    pub acceleration: [f32; 3],
    pub id: u32,
    pub count_around: f32,
    pub cell: u32,
    pub _pad2: [u32; 2],
}

impl BoidGpu {
    /// WGSL struct definition matching this layout.
    pub const WGSL_STRUCT: &'static str = r#"
struct Boid {
    position: vec3<f32>,
    velocity: vec3<f32>,
    acceleration: vec3<f32>,
    id: u32,
    count_around: f32,
    cell: u32,
};
"#;
}

/// Spawn `count` boids uniformly inside `bbox` with unit-length headings.
pub fn spawn_boids<R: Rng>(count: usize, bbox: &BoundingBox, rng: &mut R) -> Vec<Boid> {
    let sample = |rng: &mut R| {
        Vec3::new(
            rng.gen_range(bbox.low.x..bbox.high.x),
            rng.gen_range(bbox.low.y..bbox.high.y),
            rng.gen_range(bbox.low.z..bbox.high.z),
        )
    };

    (0..count)
        .map(|i| {
            let position = sample(&mut *rng);
            let velocity = sample(&mut *rng).try_normalize().unwrap_or(Vec3::X);
            Boid::new(i as u32, position, velocity)
        })
        .collect()
}

/// Fixed-size boid population plus its rolling neighbor statistics.
#[derive(Clone, Debug)]
pub struct BoidContainer {
    boids: Vec<Boid>,
    stats: NeighborStats,
}

impl BoidContainer {
    pub fn new(boids: Vec<Boid>) -> Self {
        Self {
            boids,
            stats: NeighborStats::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.boids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.boids.is_empty()
    }

    #[inline]
    pub fn boids(&self) -> &[Boid] {
        &self.boids
    }

    /// Mutable access to the boids. The population size cannot change.
    #[inline]
    pub fn boids_mut(&mut self) -> &mut [Boid] {
        &mut self.boids
    }

    #[inline]
    pub fn stats(&self) -> &NeighborStats {
        &self.stats
    }

    /// Overwrite every boid from a GPU read-back.
    pub fn load_gpu(&mut self, gpu: &[BoidGpu]) {
        debug_assert_eq!(gpu.len(), self.boids.len());
        for (boid, raw) in self.boids.iter_mut().zip(gpu) {
            *boid = Boid::from_gpu(raw);
        }
    }

    /// Feed this frame's smallest and largest `count_around` into the
    /// rolling statistics. Returns the raw `(min, max)`.
    pub fn record_frame(&mut self) -> Option<(f32, f32)> {
        let (min, max) = frame_extremes(&self.boids)?;
        self.stats.update(min, max);
        Some((min, max))
    }
}

fn frame_extremes(boids: &[Boid]) -> Option<(f32, f32)> {
    if boids.is_empty() {
        return None;
    }
    let init = (f32::INFINITY, f32::NEG_INFINITY);
    Some(boids.iter().fold(init, |(min, max), b| {
        (min.min(b.count_around), max.max(b.count_around))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_gpu_layout_size() {
        assert_eq!(std::mem::size_of::<BoidGpu>(), 64);
        assert_eq!(std::mem::offset_of!(BoidGpu, velocity), 16);
        assert_eq!(std::mem::offset_of!(BoidGpu, acceleration), 32);
        assert_eq!(std::mem::offset_of!(BoidGpu, id), 44);
        assert_eq!(std::mem::offset_of!(BoidGpu, count_around), 48);
        assert_eq!(std::mem::offset_of!(BoidGpu, cell), 52);
    }

    #[test]
    fn test_gpu_conversion_keeps_fields() {
        let mut boid = Boid::new(7, Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 1.0, 0.0));
        boid.acceleration = Vec3::new(0.1, 0.2, 0.3);
        boid.count_around = 12.0;
        boid.cell = 99;
        assert_eq!(Boid::from_gpu(&boid.to_gpu()), boid);
    }

    #[test]
    fn test_spawn_inside_box() {
        let bbox = BoundingBox::cube(50.0);
        let mut rng = StdRng::seed_from_u64(3);
        let boids = spawn_boids(256, &bbox, &mut rng);

        assert_eq!(boids.len(), 256);
        for (i, b) in boids.iter().enumerate() {
            assert_eq!(b.id, i as u32);
            assert!(bbox.contains(b.position));
            assert!((b.velocity.length() - 1.0).abs() < 1e-5);
            assert_eq!(b.acceleration, Vec3::ZERO);
        }
    }

    #[test]
    fn test_record_frame() {
        let mut boids = vec![Boid::new(0, Vec3::ZERO, Vec3::X); 3];
        boids[0].count_around = 4.0;
        boids[1].count_around = 1.0;
        boids[2].count_around = 9.0;
        let mut container = BoidContainer::new(boids);

        assert_eq!(container.record_frame(), Some((1.0, 9.0)));
        assert_eq!(container.stats().updates(), 1);
        assert!(BoidContainer::new(Vec::new()).record_frame().is_none());
    }
}
