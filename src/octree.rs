//! Point-region octree rebuilt from scratch every frame.
//!
//! Nodes live in a single pool and reference their children by index, so
//! the pool can grow by reallocation without invalidating any link. Every
//! node stores up to [`LEAF_CAPACITY`] boids directly. Once a node is full it
//! routes further insertions into one of its eight octants, but the boids
//! it already holds stay where they are: they are never pushed down. A range
//! query therefore has to scan the stored boids of *every* node it visits
//! as well as descend into the children.
//!
//! ```ignore
//! let mut tree = Octree::new(bbox);
//! tree.reset();
//! for (slot, boid) in boids.iter().enumerate() {
//!     tree.insert(slot as u32, boid.position);
//! }
//! let neighbors = tree.find_range(&boids, me.position, radius)?;
//! ```

use std::fmt;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::boid::Boid;
use crate::error::QueryOverflow;
use crate::math::{dist2, BoundingBox};

/// Children per node.
pub const SUBTREES: usize = 8;
/// Boids stored directly in each node.
pub const LEAF_CAPACITY: usize = 16;
/// Default capacity of the query result buffer.
pub const MAX_FOUND: usize = 1024;
/// Marker for an absent child.
pub const NONE: i32 = -1;

const INIT_SIZE: usize = 32;

/// One node of the pool.
#[derive(Clone, Copy, Debug)]
pub struct OctreeNode {
    pub bbox: BoundingBox,
    /// Pool index of each octant's child, or [`NONE`].
    pub subtree: [i32; SUBTREES],
    /// Slots of the boids stored in this node; the first `filled` are valid.
    pub boids: [u32; LEAF_CAPACITY],
    pub filled: u32,
}

impl OctreeNode {
    fn empty(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            subtree: [NONE; SUBTREES],
            boids: [0; LEAF_CAPACITY],
            filled: 0,
        }
    }

    /// Stored boid slots.
    #[inline]
    pub fn stored(&self) -> &[u32] {
        &self.boids[..self.filled as usize]
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.filled as usize == LEAF_CAPACITY
    }

    /// Existing children as `(octant, pool index)`.
    pub fn children(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.subtree
            .iter()
            .enumerate()
            .filter(|(_, &child)| child != NONE)
            .map(|(octant, &child)| (octant, child as usize))
    }
}

/// Node box in the layout the box renderer consumes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct NodeGpu {
    pub low: [f32; 3],
    pub _pad0: f32,
    pub high: [f32; 3],
    pub _pad1: f32,
}

impl From<&BoundingBox> for NodeGpu {
    fn from(bbox: &BoundingBox) -> Self {
        Self {
            low: bbox.low.to_array(),
            _pad0: 0.0,
            high: bbox.high.to_array(),
            _pad1: 0.0,
        }
    }
}

/// What a range query does once its result buffer is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Keep the first matches in traversal order and count the rest as
    /// truncated.
    #[default]
    Saturate,
    /// Abandon the query with [`QueryOverflow`].
    Reject,
}

/// Traversal counters, cleared by [`Octree::reset`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OctreeStats {
    /// Range queries since the last reset.
    pub queries: u64,
    /// Nodes visited over all queries.
    pub traversed: u64,
    /// Nodes visited by the most recent query.
    pub last_traversed: u32,
    /// Most nodes visited by a single query.
    pub max_traversed: u32,
    /// Matches dropped because the result buffer was full.
    pub truncated: u64,
    /// Live nodes in the pool.
    pub nodes: usize,
}

impl OctreeStats {
    pub fn average_traversed(&self) -> f32 {
        if self.queries == 0 {
            0.0
        } else {
            self.traversed as f32 / self.queries as f32
        }
    }
}

impl fmt::Display for OctreeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Nodes:         {}", self.nodes)?;
        writeln!(f, "Traversed:     {}", self.traversed)?;
        writeln!(f, "Queries:       {}", self.queries)?;
        writeln!(f, "Max Traversed: {}", self.max_traversed)?;
        write!(f, "Avg Traversed: {:.2}", self.average_traversed())
    }
}

/// Octree over boid positions with a reusable node pool.
#[derive(Clone, Debug)]
pub struct Octree {
    nodes: Vec<OctreeNode>,
    filled: usize,
    bbox: BoundingBox,
    found: Vec<u32>,
    max_found: usize,
    policy: OverflowPolicy,
    stack: Vec<usize>,
    stats: OctreeStats,
}

impl Octree {
    /// Create a tree covering `bbox`. The pool starts with the root only.
    pub fn new(bbox: BoundingBox) -> Self {
        let mut tree = Self {
            nodes: vec![OctreeNode::empty(bbox); INIT_SIZE],
            filled: 1,
            bbox,
            found: Vec::with_capacity(MAX_FOUND),
            max_found: MAX_FOUND,
            policy: OverflowPolicy::default(),
            stack: Vec::new(),
            stats: OctreeStats::default(),
        };
        tree.reset();
        tree
    }

    /// Set the result buffer capacity.
    pub fn with_max_found(mut self, max_found: usize) -> Self {
        self.max_found = max_found;
        self.found = Vec::with_capacity(max_found);
        self
    }

    /// Set the result buffer overflow policy.
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Drop every node except a fresh root covering the whole domain.
    ///
    /// Pool capacity is kept for the next frame.
    pub fn reset(&mut self) {
        self.nodes[0] = OctreeNode::empty(self.bbox);
        self.filled = 1;
        self.found.clear();
        self.stats = OctreeStats {
            nodes: 1,
            ..OctreeStats::default()
        };
    }

    /// Insert the boid stored at `slot` with the given position.
    pub fn insert(&mut self, slot: u32, position: Vec3) {
        let mut idx = 0;
        loop {
            let node = &mut self.nodes[idx];
            if !node.is_full() {
                node.boids[node.filled as usize] = slot;
                node.filled += 1;
                return;
            }

            let octant = node.bbox.octant_of(position);
            let parent_box = node.bbox;
            let next = node.subtree[octant];
            idx = match next {
                NONE => {
                    let child = self.new_node(parent_box.octant(octant));
                    self.nodes[idx].subtree[octant] = child as i32;
                    child
                }
                child => child as usize,
            };
        }
    }

    /// Insert every boid of `boids`, using its index as the slot.
    pub fn insert_all(&mut self, boids: &[Boid]) {
        for (slot, boid) in boids.iter().enumerate() {
            self.insert(slot as u32, boid.position);
        }
    }

    /// Slots of all boids within `radius` of `point`, including a boid at
    /// `point` itself.
    ///
    /// The returned slice is overwritten by the next query.
    pub fn find_range(
        &mut self,
        boids: &[Boid],
        point: Vec3,
        radius: f32,
    ) -> Result<&[u32], QueryOverflow> {
        let range_sqr = radius * radius;
        self.found.clear();
        self.stack.clear();
        self.stack.push(0);

        let mut traversed = 0u32;
        let mut truncated = 0u64;

        'visit: while let Some(idx) = self.stack.pop() {
            traversed += 1;
            let node = &self.nodes[idx];

            for &slot in node.stored() {
                if dist2(boids[slot as usize].position, point) > range_sqr {
                    continue;
                }
                if self.found.len() < self.max_found {
                    self.found.push(slot);
                    continue;
                }
                truncated += 1;
                if self.policy == OverflowPolicy::Reject {
                    break 'visit;
                }
            }

            // reversed so octant 0 is visited first
            for &child in node.subtree.iter().rev() {
                if child != NONE
                    && self.nodes[child as usize].bbox.intersects_sphere(point, range_sqr)
                {
                    self.stack.push(child as usize);
                }
            }
        }

        if truncated > 0 && self.policy == OverflowPolicy::Reject {
            self.record_query(traversed, 0);
            return Err(QueryOverflow {
                capacity: self.max_found,
                found: self.found.len() + 1,
            });
        }
        if truncated > 0 {
            tracing::debug!(
                capacity = self.max_found,
                dropped = truncated,
                "octree range query saturated"
            );
        }
        self.record_query(traversed, truncated);
        Ok(&self.found)
    }

    fn record_query(&mut self, traversed: u32, truncated: u64) {
        self.stats.queries += 1;
        self.stats.traversed += u64::from(traversed);
        self.stats.last_traversed = traversed;
        self.stats.max_traversed = self.stats.max_traversed.max(traversed);
        self.stats.truncated += truncated;
    }

    /// Result of the most recent successful query.
    #[inline]
    pub fn last_found(&self) -> &[u32] {
        &self.found
    }

    /// Live nodes, root first.
    #[inline]
    pub fn nodes(&self) -> &[OctreeNode] {
        &self.nodes[..self.filled]
    }

    /// Allocated pool size.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    #[inline]
    pub fn max_found(&self) -> usize {
        self.max_found
    }

    #[inline]
    pub fn stats(&self) -> OctreeStats {
        self.stats
    }

    /// Boxes of the first `limit` live nodes for the box renderer.
    pub fn node_boxes(&self, limit: usize) -> Vec<NodeGpu> {
        self.nodes()
            .iter()
            .take(limit)
            .map(|node| NodeGpu::from(&node.bbox))
            .collect()
    }

    fn new_node(&mut self, bbox: BoundingBox) -> usize {
        if self.filled == self.nodes.len() {
            let grown = self.nodes.len() * 2;
            let mut pool = Vec::with_capacity(grown);
            pool.extend_from_slice(&self.nodes[..self.filled]);
            pool.resize(grown, OctreeNode::empty(self.bbox));
            self.nodes = pool;
        }
        let idx = self.filled;
        self.nodes[idx] = OctreeNode::empty(bbox);
        self.filled += 1;
        self.stats.nodes = self.filled;
        idx
    }
}
