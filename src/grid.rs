//! Uniform grid neighbor index.
//!
//! This is the CPU rendition of the GPU grid pipeline and runs the same
//! steps in the same order:
//!
//! 1. every boid stores the linear index of the cell containing it,
//! 2. the boid array itself is bitonic-sorted by that index,
//! 3. a boundary scan fills an offset table so that cell `c` occupies
//!    `offsets[c]..offsets[c + 1]` of the sorted array,
//! 4. queries visit the 27 toroidally wrapped cells around a point.
//!
//! Cells are at least twice the flocking radius wide, so every boid within
//! range of a point lies in one of those 27 cells.

use glam::{UVec3, Vec3};

use crate::boid::Boid;
use crate::error::GridError;
use crate::math::{dist2, BoundingBox};

/// Default ceiling on the number of grid cells.
pub const DEFAULT_MAX_CELLS: u64 = 1 << 24;

/// Mapping from positions to linear cell indices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLayout {
    bbox: BoundingBox,
    resolution: UVec3,
    cell_size: Vec3,
}

impl GridLayout {
    /// Layout with `resolution` cells per axis, each axis at least one cell.
    pub fn new(bbox: BoundingBox, resolution: UVec3) -> Result<Self, GridError> {
        Self::with_max_cells(bbox, resolution, DEFAULT_MAX_CELLS)
    }

    pub fn with_max_cells(
        bbox: BoundingBox,
        resolution: UVec3,
        max_cells: u64,
    ) -> Result<Self, GridError> {
        let resolution = resolution.max(UVec3::ONE);
        let requested = resolution.x as u64 * resolution.y as u64 * resolution.z as u64;
        if requested > max_cells {
            return Err(GridError::TooManyCells {
                requested,
                limit: max_cells,
            });
        }

        Ok(Self {
            bbox,
            resolution,
            cell_size: bbox.diagonal() / resolution.as_vec3(),
        })
    }

    /// Largest resolution whose cells are at least `2 * zone` wide.
    pub fn resolution_for_zone(bbox: &BoundingBox, zone: f32) -> UVec3 {
        (bbox.diagonal() / (2.0 * zone)).floor().max(Vec3::ONE).as_uvec3()
    }

    pub fn from_zone(bbox: BoundingBox, zone: f32) -> Result<Self, GridError> {
        Self::new(bbox, Self::resolution_for_zone(&bbox, zone))
    }

    /// Layout with `resolution` cells per axis for flocking radius `zone`.
    ///
    /// Fails with [`GridError::CellsTooSmall`] if any axis is finer than
    /// [`GridLayout::resolution_for_zone`] allows.
    pub fn for_zone(bbox: BoundingBox, resolution: UVec3, zone: f32) -> Result<Self, GridError> {
        let resolution = resolution.max(UVec3::ONE);
        let max = Self::resolution_for_zone(&bbox, zone);
        if resolution.cmpgt(max).any() {
            return Err(GridError::CellsTooSmall {
                resolution: resolution.to_array(),
                max: max.to_array(),
            });
        }
        Self::new(bbox, resolution)
    }

    #[inline]
    pub fn resolution(&self) -> UVec3 {
        self.resolution
    }

    #[inline]
    pub fn cell_size(&self) -> Vec3 {
        self.cell_size
    }

    #[inline]
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        (self.resolution.x * self.resolution.y * self.resolution.z) as usize
    }

    /// Cell coordinates of `p`, clamped into the grid.
    pub fn cell_coords(&self, p: Vec3) -> UVec3 {
        let scaled = ((p - self.bbox.low) / self.cell_size).floor();
        let max = (self.resolution - UVec3::ONE).as_vec3();
        scaled.clamp(Vec3::ZERO, max).as_uvec3()
    }

    #[inline]
    pub fn cell_index(&self, coords: UVec3) -> u32 {
        coords.x + coords.y * self.resolution.x + coords.z * self.resolution.x * self.resolution.y
    }

    #[inline]
    pub fn cell_of(&self, p: Vec3) -> u32 {
        self.cell_index(self.cell_coords(p))
    }

    pub fn coords_of(&self, cell: u32) -> UVec3 {
        let plane = self.resolution.x * self.resolution.y;
        let z = cell / plane;
        let rest = cell - z * plane;
        let y = rest / self.resolution.x;
        UVec3::new(rest - y * self.resolution.x, y, z)
    }

    /// The cell itself and its 26 wrapped neighbors.
    ///
    /// Axes with fewer than three cells would list the same cell more than
    /// once; duplicates are removed so no boid is visited twice.
    pub fn neighbor_cells(&self, cell: u32) -> NeighborCells {
        let center = self.coords_of(cell);
        let mut out = NeighborCells::default();

        for dz in 0..3 {
            let z = wrap_axis(center.z, dz, self.resolution.z);
            for dy in 0..3 {
                let y = wrap_axis(center.y, dy, self.resolution.y);
                for dx in 0..3 {
                    let x = wrap_axis(center.x, dx, self.resolution.x);
                    out.push_unique(self.cell_index(UVec3::new(x, y, z)));
                }
            }
        }
        out
    }
}

/// `c - 1`, `c` or `c + 1` for `step` 0, 1, 2, wrapped into `0..res`.
#[inline]
fn wrap_axis(c: u32, step: u32, res: u32) -> u32 {
    (c + res + step - 1) % res
}

/// Up to 27 distinct cell indices.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeighborCells {
    cells: [u32; 27],
    len: usize,
}

impl NeighborCells {
    fn push_unique(&mut self, cell: u32) {
        if !self.as_slice().contains(&cell) {
            self.cells[self.len] = cell;
            self.len += 1;
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.cells[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Sort `data` ascending by `key` with a bitonic network.
///
/// The sequence of compare/exchange steps depends only on the length, never
/// on the data, which is what lets the GPU run each sub-pass in parallel.
/// The same `(k, j)` schedule is used here. The sort is not stable.
pub fn bitonic_sort_by_key<T, K, F>(data: &mut [T], mut key: F) -> Result<(), GridError>
where
    K: PartialOrd,
    F: FnMut(&T) -> K,
{
    let n = data.len();
    if n <= 1 {
        return Ok(());
    }
    if !n.is_power_of_two() {
        return Err(GridError::NotPowerOfTwo(n));
    }

    let mut k = 2;
    while k <= n {
        let mut j = k / 2;
        while j > 0 {
            for i in 0..n {
                let l = i ^ j;
                if l <= i {
                    continue;
                }
                let ascending = i & k == 0;
                let out_of_order = if ascending {
                    key(&data[i]) > key(&data[l])
                } else {
                    key(&data[i]) < key(&data[l])
                };
                if out_of_order {
                    data.swap(i, l);
                }
            }
            j /= 2;
        }
        k *= 2;
    }
    Ok(())
}

/// Fill `offsets` from cell indices sorted ascending.
///
/// `offsets` is resized to `cell_count + 1`. Empty cells get the offset of
/// the next non-empty one, so their range is empty.
pub fn build_offsets(sorted_cells: &[u32], cell_count: usize, offsets: &mut Vec<u32>) {
    let n = sorted_cells.len() as u32;
    offsets.clear();
    offsets.resize(cell_count + 1, n);

    // every cell up to and including the first one present starts at 0
    let mut next = 0usize;
    for (i, &cell) in sorted_cells.iter().enumerate() {
        let cell = cell as usize;
        while next <= cell && next < cell_count {
            offsets[next] = i as u32;
            next += 1;
        }
    }
}

/// Grid index over a boid population, rebuilt every frame.
#[derive(Clone, Debug)]
pub struct GridIndex {
    layout: GridLayout,
    offsets: Vec<u32>,
    cells: Vec<u32>,
}

impl GridIndex {
    pub fn new(layout: GridLayout) -> Self {
        let mut offsets = Vec::new();
        build_offsets(&[], layout.cell_count(), &mut offsets);
        Self {
            layout,
            offsets,
            cells: Vec::new(),
        }
    }

    #[inline]
    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Offset table, `cell_count + 1` entries.
    #[inline]
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Sorted-array range of one cell.
    #[inline]
    pub fn cell_range(&self, cell: u32) -> std::ops::Range<usize> {
        let c = cell as usize;
        self.offsets[c] as usize..self.offsets[c + 1] as usize
    }

    /// Assign cells, sort `boids` in place by cell and rebuild the offsets.
    pub fn rebuild(&mut self, boids: &mut [Boid]) -> Result<(), GridError> {
        for boid in boids.iter_mut() {
            boid.cell = self.layout.cell_of(boid.position);
        }
        bitonic_sort_by_key(boids, |b| b.cell)?;

        self.cells.clear();
        self.cells.extend(boids.iter().map(|b| b.cell));
        build_offsets(&self.cells, self.layout.cell_count(), &mut self.offsets);
        Ok(())
    }

    /// Call `f` with the sorted index of every boid in the 27 cells around
    /// `point`. Candidates may lie outside any particular radius.
    pub fn for_each_candidate<F: FnMut(usize)>(&self, point: Vec3, mut f: F) {
        let home = self.layout.cell_of(point);
        for &cell in self.layout.neighbor_cells(home).as_slice() {
            for idx in self.cell_range(cell) {
                f(idx);
            }
        }
    }

    /// Sorted indices of every boid within `radius` of `point`.
    ///
    /// `boids` must be the array passed to the last [`GridIndex::rebuild`].
    pub fn find_range(&self, boids: &[Boid], point: Vec3, radius: f32, out: &mut Vec<usize>) {
        out.clear();
        let range_sqr = radius * radius;
        self.for_each_candidate(point, |idx| {
            if dist2(point, boids[idx].position) <= range_sqr {
                out.push(idx);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_resolution_for_zone() {
        let bbox = BoundingBox::cube(1000.0);
        assert_eq!(GridLayout::resolution_for_zone(&bbox, 40.0), UVec3::splat(25));

        let thin = BoundingBox::new(Vec3::ZERO, Vec3::new(100.0, 10.0, 50.0));
        assert_eq!(GridLayout::resolution_for_zone(&thin, 20.0), UVec3::new(2, 1, 1));
    }

    #[test]
    fn test_too_many_cells() {
        let bbox = BoundingBox::cube(1.0);
        let err = GridLayout::with_max_cells(bbox, UVec3::splat(10), 999).unwrap_err();
        assert!(matches!(err, GridError::TooManyCells { requested: 1000, limit: 999 }));
    }

    #[test]
    fn test_for_zone_rejects_fine_cells() {
        let bbox = BoundingBox::cube(50.0);
        // 100 / (2 * 10) allows at most 5 cells per axis
        let err = GridLayout::for_zone(bbox, UVec3::new(5, 6, 5), 10.0).unwrap_err();
        assert_eq!(
            err,
            GridError::CellsTooSmall {
                resolution: [5, 6, 5],
                max: [5, 5, 5],
            }
        );

        let layout = GridLayout::for_zone(bbox, UVec3::new(5, 2, 0), 10.0).unwrap();
        assert_eq!(layout.resolution(), UVec3::new(5, 2, 1));
        assert!(layout.cell_size().x >= 20.0);
    }

    #[test]
    fn test_cell_index_round_trip() {
        let layout = GridLayout::new(BoundingBox::cube(10.0), UVec3::new(4, 3, 5)).unwrap();
        assert_eq!(layout.cell_count(), 60);
        for cell in 0..60 {
            assert_eq!(layout.cell_index(layout.coords_of(cell)), cell);
        }
    }

    #[test]
    fn test_cell_of_clamps() {
        let layout = GridLayout::new(BoundingBox::cube(10.0), UVec3::splat(4)).unwrap();
        assert_eq!(layout.cell_coords(Vec3::splat(-10.0)), UVec3::ZERO);
        assert_eq!(layout.cell_coords(Vec3::splat(10.0)), UVec3::splat(3));
        assert_eq!(layout.cell_coords(Vec3::splat(50.0)), UVec3::splat(3));
        assert_eq!(layout.cell_coords(Vec3::new(-4.9, 0.1, 9.9)), UVec3::new(1, 2, 3));
    }

    #[test]
    fn test_neighbor_cells_wrap() {
        let layout = GridLayout::new(BoundingBox::cube(10.0), UVec3::splat(4)).unwrap();
        let cells = layout.neighbor_cells(0);
        assert_eq!(cells.len(), 27);
        // x = 3 wraps around to the left of x = 0
        assert!(cells.as_slice().contains(&layout.cell_index(UVec3::new(3, 0, 0))));
        assert!(cells.as_slice().contains(&layout.cell_index(UVec3::new(3, 3, 3))));
    }

    #[test]
    fn test_neighbor_cells_dedup() {
        let layout = GridLayout::new(BoundingBox::cube(10.0), UVec3::new(1, 2, 5)).unwrap();
        // 1 * 2 * 3 distinct cells
        assert_eq!(layout.neighbor_cells(0).len(), 6);

        let single = GridLayout::new(BoundingBox::cube(10.0), UVec3::ONE).unwrap();
        assert_eq!(single.neighbor_cells(0).as_slice(), &[0]);
    }

    #[test]
    fn test_bitonic_sorts() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut values: Vec<u32> = (0..256).map(|_| rng.gen_range(0..40)).collect();
        let mut expected = values.clone();
        expected.sort_unstable();

        bitonic_sort_by_key(&mut values, |&v| v).unwrap();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_bitonic_rejects_odd_length() {
        let mut values = vec![3u32, 1, 2];
        assert!(matches!(
            bitonic_sort_by_key(&mut values, |&v| v),
            Err(GridError::NotPowerOfTwo(3))
        ));
        let mut one = vec![5u32];
        assert!(bitonic_sort_by_key(&mut one, |&v| v).is_ok());
    }

    #[test]
    fn test_build_offsets() {
        let sorted = [1u32, 1, 3, 3, 3, 5];
        let mut offsets = Vec::new();
        build_offsets(&sorted, 7, &mut offsets);
        assert_eq!(offsets, vec![0, 0, 2, 2, 5, 5, 6, 6]);
    }

    #[test]
    fn test_rebuild_partitions_boids() {
        let bbox = BoundingBox::cube(100.0);
        let layout = GridLayout::from_zone(bbox, 10.0).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mut boids = crate::boid::spawn_boids(512, &bbox, &mut rng);

        let mut grid = GridIndex::new(layout);
        grid.rebuild(&mut boids).unwrap();

        assert_eq!(grid.offsets().len(), layout.cell_count() + 1);
        assert_eq!(*grid.offsets().last().unwrap(), 512);
        for cell in 0..layout.cell_count() as u32 {
            for idx in grid.cell_range(cell) {
                assert_eq!(boids[idx].cell, cell);
                assert_eq!(layout.cell_of(boids[idx].position), cell);
            }
        }
    }
}
