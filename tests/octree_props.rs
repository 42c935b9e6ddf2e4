//! Octree range queries checked against brute force.

use octoflock::boid::spawn_boids;
use octoflock::math::dist2;
use octoflock::octree::{LEAF_CAPACITY, MAX_FOUND};
use octoflock::{Boid, BoundingBox, Octree, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn brute_force(boids: &[Boid], point: Vec3, radius: f32) -> Vec<u32> {
    boids
        .iter()
        .enumerate()
        .filter(|(_, b)| dist2(b.position, point) <= radius * radius)
        .map(|(i, _)| i as u32)
        .collect()
}

fn sorted(mut v: Vec<u32>) -> Vec<u32> {
    v.sort_unstable();
    v
}

#[test]
fn test_range_query_matches_brute_force() {
    let bbox = BoundingBox::cube(200.0);
    let mut rng = StdRng::seed_from_u64(21);
    let boids = spawn_boids(2048, &bbox, &mut rng);

    let mut tree = Octree::new(bbox);
    tree.insert_all(&boids);

    for _ in 0..200 {
        let point = Vec3::new(
            rng.gen_range(-200.0..200.0),
            rng.gen_range(-200.0..200.0),
            rng.gen_range(-200.0..200.0),
        );
        let radius = rng.gen_range(1.0..40.0);

        let found = tree.find_range(&boids, point, radius).unwrap().to_vec();
        let expected = brute_force(&boids, point, radius);
        assert!(expected.len() <= MAX_FOUND);
        assert_eq!(sorted(found), expected);
    }
}

#[test]
fn test_query_at_boid_includes_itself() {
    let bbox = BoundingBox::cube(100.0);
    let mut rng = StdRng::seed_from_u64(4);
    let boids = spawn_boids(512, &bbox, &mut rng);

    let mut tree = Octree::new(bbox);
    tree.insert_all(&boids);

    for (slot, boid) in boids.iter().enumerate().step_by(17) {
        let found = tree.find_range(&boids, boid.position, 5.0).unwrap();
        assert!(found.contains(&(slot as u32)));
    }
}

#[test]
fn test_rebuild_is_idempotent() {
    let bbox = BoundingBox::cube(100.0);
    let mut rng = StdRng::seed_from_u64(8);
    let boids = spawn_boids(1024, &bbox, &mut rng);
    let queries: Vec<(Vec3, f32)> = (0..100)
        .map(|_| {
            let point = Vec3::new(
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
            );
            (point, rng.gen_range(1.0..30.0))
        })
        .collect();

    let mut tree = Octree::new(bbox);
    tree.insert_all(&boids);
    let first_nodes = tree.nodes().len();
    let capacity = tree.capacity();
    let first: Vec<Vec<u32>> = queries
        .iter()
        .map(|&(p, r)| sorted(tree.find_range(&boids, p, r).unwrap().to_vec()))
        .collect();

    tree.reset();
    tree.insert_all(&boids);
    assert_eq!(tree.nodes().len(), first_nodes);
    assert_eq!(tree.capacity(), capacity);
    for (&(p, r), expected) in queries.iter().zip(&first) {
        let found = sorted(tree.find_range(&boids, p, r).unwrap().to_vec());
        assert_eq!(&found, expected);
        assert_eq!(found, brute_force(&boids, p, r));
    }
}

#[test]
fn test_inner_nodes_keep_their_boids() {
    let bbox = BoundingBox::cube(10.0);
    let boids: Vec<Boid> = (0..LEAF_CAPACITY as u32 + 1)
        .map(|i| Boid::new(i, Vec3::new(1.0 + i as f32 * 0.1, 1.0, 1.0), Vec3::X))
        .collect();

    let mut tree = Octree::new(bbox);
    tree.insert_all(&boids);

    let root = &tree.nodes()[0];
    assert_eq!(root.stored().len(), LEAF_CAPACITY);
    assert_eq!(tree.nodes().len(), 2);
    // the overflow went to the (+x, +y, +z) octant
    let (octant, child) = root.children().next().unwrap();
    assert_eq!(octant, 7);
    assert_eq!(tree.nodes()[child].stored(), &[LEAF_CAPACITY as u32]);

    // a query that only reaches the root's box still sees the root's boids
    let found = tree.find_range(&boids, Vec3::new(1.0, 1.0, 1.0), 0.05).unwrap();
    assert_eq!(found, &[0]);
}

#[test]
fn test_three_boid_scenario() {
    let bbox = BoundingBox::cube(100.0);
    let boids = vec![
        Boid::new(0, Vec3::ZERO, Vec3::X),
        Boid::new(1, Vec3::new(1.0, 0.0, 0.0), Vec3::X),
        Boid::new(2, Vec3::splat(10.0), Vec3::X),
    ];

    let mut tree = Octree::new(bbox);
    tree.insert_all(&boids);

    let mut around = |i: usize| {
        let found = tree.find_range(&boids, boids[i].position, 2.0).unwrap();
        sorted(found.to_vec())
    };
    assert_eq!(around(0), vec![0, 1]);
    assert_eq!(around(1), vec![0, 1]);
    assert_eq!(tree.find_range(&boids, boids[2].position, 2.0).unwrap(), &[2]);

    let stats = tree.stats();
    assert_eq!(stats.queries, 3);
    assert_eq!(stats.nodes, 1);
}

#[test]
fn test_boundary_distance_is_inclusive() {
    let bbox = BoundingBox::cube(100.0);
    let boids = vec![
        Boid::new(0, Vec3::ZERO, Vec3::X),
        Boid::new(1, Vec3::new(4.0, 0.0, 0.0), Vec3::X),
    ];

    let mut tree = Octree::new(bbox);
    tree.insert_all(&boids);
    assert_eq!(sorted(tree.find_range(&boids, Vec3::ZERO, 4.0).unwrap().to_vec()), vec![0, 1]);
}
