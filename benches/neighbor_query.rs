//! Benchmarks for the CPU neighbor searches and a full flocking frame.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use octoflock::boid::spawn_boids;
use octoflock::engine::{flock_grid, flock_naive, flock_octree, integrate_all};
use octoflock::grid::bitonic_sort_by_key;
use octoflock::{Boid, BoundingBox, Flock, FlockParams, GridIndex, GridLayout, Octree};

const ZONE: f32 = 40.0;

fn population(count: usize) -> (BoundingBox, Vec<Boid>) {
    let bbox = BoundingBox::cube(1000.0);
    let mut rng = StdRng::seed_from_u64(0);
    let boids = spawn_boids(count, &bbox, &mut rng);
    (bbox, boids)
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");

    for exp in [10, 12, 14] {
        let (bbox, boids) = population(1 << exp);

        group.bench_with_input(BenchmarkId::new("octree", 1 << exp), &boids, |b, boids| {
            let mut tree = Octree::new(bbox);
            b.iter(|| {
                tree.reset();
                tree.insert_all(black_box(boids));
            })
        });

        group.bench_with_input(BenchmarkId::new("grid", 1 << exp), &boids, |b, boids| {
            let mut grid = GridIndex::new(GridLayout::from_zone(bbox, ZONE).unwrap());
            let mut scratch = boids.clone();
            b.iter(|| grid.rebuild(black_box(&mut scratch)).unwrap())
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_query");
    let (bbox, mut boids) = population(1 << 14);

    let mut tree = Octree::new(bbox);
    tree.insert_all(&boids);
    group.bench_function("octree", |b| {
        let mut i = 0;
        b.iter(|| {
            let p = boids[i % boids.len()].position;
            i += 97;
            black_box(tree.find_range(&boids, p, ZONE).unwrap().len())
        })
    });

    let mut grid = GridIndex::new(GridLayout::from_zone(bbox, ZONE).unwrap());
    grid.rebuild(&mut boids).unwrap();
    let mut found = Vec::new();
    group.bench_function("grid", |b| {
        let mut i = 0;
        b.iter(|| {
            let p = boids[i % boids.len()].position;
            i += 97;
            grid.find_range(&boids, p, ZONE, &mut found);
            black_box(found.len())
        })
    });

    group.finish();
}

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("flock_frame");
    group.sample_size(10);
    let params = FlockParams::default();
    let (bbox, start) = population(1 << 12);

    group.bench_function("naive", |b| {
        let mut boids = start.clone();
        let mut flock = Flock::new();
        b.iter(|| {
            integrate_all(&mut boids, &bbox);
            flock_naive(&mut boids, &mut flock, &params);
        })
    });

    group.bench_function("octree", |b| {
        let mut boids = start.clone();
        let mut flock = Flock::new();
        let mut tree = Octree::new(bbox);
        b.iter(|| {
            integrate_all(&mut boids, &bbox);
            tree.reset();
            tree.insert_all(&boids);
            flock_octree(&mut boids, &mut tree, &mut flock, &params).unwrap();
        })
    });

    group.bench_function("grid", |b| {
        let mut boids = start.clone();
        let mut flock = Flock::new();
        let mut grid = GridIndex::new(GridLayout::from_zone(bbox, params.range).unwrap());
        let mut candidates = Vec::new();
        b.iter(|| {
            integrate_all(&mut boids, &bbox);
            grid.rebuild(&mut boids).unwrap();
            flock_grid(&mut boids, &grid, &mut flock, &mut candidates, &params);
        })
    });

    group.finish();
}

fn bench_sort(c: &mut Criterion) {
    let (_, boids) = population(1 << 14);
    let keys: Vec<u32> = boids.iter().map(|b| (b.position.x.to_bits() >> 8) & 0xffff).collect();

    c.bench_function("bitonic_sort_16k", |b| {
        b.iter(|| {
            let mut data = keys.clone();
            bitonic_sort_by_key(&mut data, |&k| k).unwrap();
            black_box(data)
        })
    });
}

criterion_group!(benches, bench_build, bench_query, bench_frame, bench_sort);
criterion_main!(benches);
