//! GPU-resident flock.
//!
//! Per frame, each stage is its own compute pass so every dispatch sees the
//! previous one's writes:
//!
//! ```text
//! integrate ─┬─────────────────────────────────────────▶ naive flock
//!            └▶ bitonic sub-passes ▶ reindex ───────────▶ grid flock
//! ```
//!
//! The boid array itself is sorted, so neighbor loops index it directly.
//! Each bitonic `(k, j)` sub-pass reads its own uniform slot; the slots are
//! written once at creation because the schedule depends only on the
//! population size.

use bytemuck::{Pod, Zeroable};
use glam::UVec3;
use wgpu::util::DeviceExt;

use super::{compute_pipeline, read_staging, shaders, GpuContext, WORKGROUP_SIZE};
use crate::boid::BoidGpu;
use crate::error::{EngineError, GpuError, GridError};
use crate::flock::FlockParams;
use crate::grid::GridLayout;
use crate::math::BoundingBox;

/// Neighbor search used by the flock pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuMode {
    /// Every boid scans every other boid.
    Naive,
    /// Boids are sorted into grid cells and scan the 27 cells around them.
    Grid,
}

/// Frame-constant parameters, mirrors `Params` in the shaders.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct FlockUniforms {
    pub space_low: [f32; 3],
    pub boid_count: u32,
    pub space_high: [f32; 3],
    pub range: f32,
    pub grid_res: [u32; 3],
    pub speed_factor: f32,
    pub force_limit: f32,
    pub cell_count: u32,
    pub _pad: [u32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct SortStage {
    k: u32,
    j: u32,
    count: u32,
    _pad: u32,
}

/// `(k, j)` pairs of the bitonic network for `n` elements, in dispatch order.
pub(crate) fn bitonic_schedule(n: u32) -> Vec<(u32, u32)> {
    let mut stages = Vec::new();
    let mut k = 2;
    while k <= n {
        let mut j = k / 2;
        while j > 0 {
            stages.push((k, j));
            j /= 2;
        }
        k *= 2;
    }
    stages
}

/// Boid state, pipelines and bind groups for one population on the GPU.
pub struct GpuFlock {
    context: GpuContext,
    boid_count: u32,
    layout: GridLayout,

    boid_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
    offsets_buffer: wgpu::Buffer,
    offsets_staging: wgpu::Buffer,

    integrate_pipeline: wgpu::ComputePipeline,
    integrate_bind_group: wgpu::BindGroup,
    flock_pipeline: wgpu::ComputePipeline,
    flock_bind_group: wgpu::BindGroup,
    /// Sort and reindex passes, present in [`GpuMode::Grid`] only.
    grid: Option<GridPasses>,
}

struct GridPasses {
    sort_pipeline: wgpu::ComputePipeline,
    sort_bind_groups: Vec<wgpu::BindGroup>,
    reindex_pipeline: wgpu::ComputePipeline,
    reindex_bind_group: wgpu::BindGroup,
}

impl GpuFlock {
    /// Upload `boids` and build everything needed to step them.
    ///
    /// In [`GpuMode::Naive`] the grid is a single cell and `grid_resolution`
    /// is ignored. In [`GpuMode::Grid`] the population must be a power of
    /// two and every cell at least `2 * params.range` wide.
    pub fn new(
        context: GpuContext,
        boids: &[BoidGpu],
        bbox: BoundingBox,
        params: FlockParams,
        mode: GpuMode,
        grid_resolution: UVec3,
    ) -> Result<Self, EngineError> {
        let n = boids.len();
        if mode == GpuMode::Grid && n > 1 && !n.is_power_of_two() {
            return Err(GridError::NotPowerOfTwo(n).into());
        }
        let boid_count = n as u32;
        let layout = match mode {
            GpuMode::Naive => GridLayout::new(bbox, UVec3::ONE)?,
            GpuMode::Grid => GridLayout::for_zone(bbox, grid_resolution, params.range)?,
        };
        let cell_count = layout.cell_count() as u32;

        let device = &context.device;
        let boid_bytes = (n.max(1) * std::mem::size_of::<BoidGpu>()) as u64;
        let offsets_bytes = (u64::from(cell_count) + 1) * std::mem::size_of::<u32>() as u64;
        context.check_storage_size("boid buffer", boid_bytes)?;
        context.check_storage_size("cell offset table", offsets_bytes)?;

        let mut initial = boids.to_vec();
        if initial.is_empty() {
            initial.push(BoidGpu::default());
        }
        let boid_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Boid Buffer"),
            contents: bytemuck::cast_slice(&initial),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
        });

        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Boid Staging"),
            size: boid_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let offsets_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cell Offsets"),
            size: offsets_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let offsets_staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cell Offsets Staging"),
            size: offsets_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniforms = FlockUniforms {
            space_low: bbox.low.to_array(),
            boid_count,
            space_high: bbox.high.to_array(),
            range: params.range,
            grid_res: layout.resolution().to_array(),
            speed_factor: params.speed_factor,
            force_limit: params.force_limit,
            cell_count,
            _pad: [0; 2],
        };
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Flock Params"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let integrate_pipeline =
            compute_pipeline(device, "Integrate", &shaders::integrate_shader());
        let integrate_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Integrate Bind Group"),
            layout: &integrate_pipeline.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: boid_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        let flock_pipeline = match mode {
            GpuMode::Naive => {
                compute_pipeline(device, "Naive Flock", &shaders::flock_naive_shader())
            }
            GpuMode::Grid => compute_pipeline(device, "Grid Flock", &shaders::flock_grid_shader()),
        };
        let mut flock_entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: boid_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: params_buffer.as_entire_binding(),
            },
        ];
        if mode == GpuMode::Grid {
            flock_entries.push(wgpu::BindGroupEntry {
                binding: 2,
                resource: offsets_buffer.as_entire_binding(),
            });
        }
        let flock_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Flock Bind Group"),
            layout: &flock_pipeline.get_bind_group_layout(0),
            entries: &flock_entries,
        });

        let grid = match mode {
            GpuMode::Naive => None,
            GpuMode::Grid => Some(create_grid_passes(
                &context,
                &boid_buffer,
                &params_buffer,
                &offsets_buffer,
                boid_count,
            )),
        };

        tracing::debug!(
            boids = boid_count,
            cells = cell_count,
            sort_passes = grid.as_ref().map_or(0, |g| g.sort_bind_groups.len()),
            ?mode,
            "GPU flock created"
        );

        Ok(Self {
            context,
            boid_count,
            layout,
            boid_buffer,
            staging_buffer,
            offsets_buffer,
            offsets_staging,
            integrate_pipeline,
            integrate_bind_group,
            flock_pipeline,
            flock_bind_group,
            grid,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.boid_count as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.boid_count == 0
    }

    #[inline]
    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Run one frame and block until the new boid state is read back.
    pub fn step(&self) -> Result<Vec<BoidGpu>, GpuError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let device = &self.context.device;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Flock Step"),
        });
        self.encode_step(&mut encoder);
        let size = self.staging_buffer.size();
        encoder.copy_buffer_to_buffer(&self.boid_buffer, 0, &self.staging_buffer, 0, size);
        self.context.queue.submit(Some(encoder.finish()));

        let mut boids = read_staging::<BoidGpu>(device, &self.staging_buffer)?;
        boids.truncate(self.len());
        Ok(boids)
    }

    /// Read the cell offset table written by the last grid step.
    ///
    /// Only meaningful in [`GpuMode::Grid`].
    pub fn read_offsets(&self) -> Result<Vec<u32>, GpuError> {
        let device = &self.context.device;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Offsets Readback"),
        });
        let size = self.offsets_staging.size();
        encoder.copy_buffer_to_buffer(&self.offsets_buffer, 0, &self.offsets_staging, 0, size);
        self.context.queue.submit(Some(encoder.finish()));
        read_staging::<u32>(device, &self.offsets_staging)
    }

    fn encode_step(&self, encoder: &mut wgpu::CommandEncoder) {
        let workgroups = self.boid_count.div_ceil(WORKGROUP_SIZE);

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Integrate"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.integrate_pipeline);
            pass.set_bind_group(0, &self.integrate_bind_group, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }

        if let Some(grid) = &self.grid {
            for bind_group in &grid.sort_bind_groups {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Bitonic Sort"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&grid.sort_pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.dispatch_workgroups(workgroups, 1, 1);
            }

            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Reindex Cells"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&grid.reindex_pipeline);
            pass.set_bind_group(0, &grid.reindex_bind_group, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Flock"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.flock_pipeline);
            pass.set_bind_group(0, &self.flock_bind_group, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
    }
}

fn create_grid_passes(
    context: &GpuContext,
    boid_buffer: &wgpu::Buffer,
    params_buffer: &wgpu::Buffer,
    offsets_buffer: &wgpu::Buffer,
    boid_count: u32,
) -> GridPasses {
    let device = &context.device;

    let sort_pipeline = compute_pipeline(device, "Bitonic Sort", &shaders::bitonic_shader());
    let sort_bind_groups =
        create_sort_bind_groups(context, &sort_pipeline, boid_buffer, boid_count);

    let reindex_pipeline = compute_pipeline(device, "Reindex Cells", &shaders::reindex_shader());
    let reindex_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Reindex Bind Group"),
        layout: &reindex_pipeline.get_bind_group_layout(0),
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: boid_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: params_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: offsets_buffer.as_entire_binding(),
            },
        ],
    });

    GridPasses {
        sort_pipeline,
        sort_bind_groups,
        reindex_pipeline,
        reindex_bind_group,
    }
}

/// One bind group per bitonic sub-pass, each pointing at its own aligned
/// slot of a shared uniform buffer.
fn create_sort_bind_groups(
    context: &GpuContext,
    pipeline: &wgpu::ComputePipeline,
    boid_buffer: &wgpu::Buffer,
    boid_count: u32,
) -> Vec<wgpu::BindGroup> {
    let schedule = bitonic_schedule(boid_count);
    if schedule.is_empty() {
        return Vec::new();
    }

    let stride = u64::from(context.limits.min_uniform_buffer_offset_alignment)
        .max(std::mem::size_of::<SortStage>() as u64);
    let mut contents = vec![0u8; (stride * schedule.len() as u64) as usize];
    for (slot, &(k, j)) in schedule.iter().enumerate() {
        let stage = SortStage {
            k,
            j,
            count: boid_count,
            _pad: 0,
        };
        let start = slot * stride as usize;
        let slot_bytes = &mut contents[start..start + std::mem::size_of::<SortStage>()];
        slot_bytes.copy_from_slice(bytemuck::bytes_of(&stage));
    }

    let device = &context.device;
    let stages_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Sort Stages"),
        contents: &contents,
        usage: wgpu::BufferUsages::UNIFORM,
    });

    let layout = pipeline.get_bind_group_layout(0);
    (0..schedule.len() as u64)
        .map(|slot| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Sort Stage Bind Group"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: boid_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &stages_buffer,
                            offset: slot * stride,
                            size: wgpu::BufferSize::new(std::mem::size_of::<SortStage>() as u64),
                        }),
                    },
                ],
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<FlockUniforms>(), 64);
        assert_eq!(std::mem::offset_of!(FlockUniforms, space_high), 16);
        assert_eq!(std::mem::offset_of!(FlockUniforms, grid_res), 32);
        assert_eq!(std::mem::offset_of!(FlockUniforms, force_limit), 48);
        assert_eq!(std::mem::size_of::<SortStage>(), 16);
    }

    #[test]
    fn test_bitonic_schedule() {
        assert!(bitonic_schedule(1).is_empty());
        assert_eq!(bitonic_schedule(4), vec![(2, 1), (4, 2), (4, 1)]);
        // log2(n) * (log2(n) + 1) / 2 sub-passes
        assert_eq!(bitonic_schedule(1024).len(), 55);
    }
}
