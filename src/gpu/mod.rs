//! Headless GPU compute for the naive and grid flocking strategies.
//!
//! Nothing here needs a window: the device is created without a surface and
//! results come back through a staging buffer.

mod flock_gpu;
pub mod shaders;

use std::sync::mpsc;

use bytemuck::Pod;

pub use flock_gpu::{FlockUniforms, GpuFlock, GpuMode};

use crate::error::GpuError;

/// Invocations per workgroup in every flocking shader.
pub const WORKGROUP_SIZE: u32 = 256;

/// Device and queue plus what the adapter reported about itself.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub info: wgpu::AdapterInfo,
    pub limits: wgpu::Limits,
}

impl GpuContext {
    /// Pick the high-performance adapter and open a device on it, blocking
    /// until both are ready.
    pub fn new() -> Result<Self, GpuError> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let info = adapter.get_info();
        let available = adapter.limits();

        // Large populations need more than the default storage binding size
        let required_limits = wgpu::Limits {
            max_storage_buffer_binding_size: available.max_storage_buffer_binding_size,
            max_buffer_size: available.max_buffer_size,
            ..wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Flock Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: required_limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        tracing::info!(
            adapter = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "GPU device ready"
        );

        Ok(Self {
            device,
            queue,
            info,
            limits: required_limits,
        })
    }

    /// Fail with [`GpuError::BufferTooLarge`] if a storage binding of `size`
    /// bytes would not fit.
    pub fn check_storage_size(&self, label: &'static str, size: u64) -> Result<(), GpuError> {
        let limit = u64::from(self.limits.max_storage_buffer_binding_size);
        if size > limit {
            return Err(GpuError::BufferTooLarge { label, size, limit });
        }
        Ok(())
    }
}

/// Build a compute pipeline from WGSL with an automatic layout and a `main`
/// entry point.
pub(crate) fn compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: None,
        module: &module,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Map a `MAP_READ` staging buffer, copy its contents out and unmap it.
pub(crate) fn read_staging<T: Pod>(
    device: &wgpu::Device,
    staging: &wgpu::Buffer,
) -> Result<Vec<T>, GpuError> {
    let buffer_slice = staging.slice(..);
    let (tx, rx) = mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);

    rx.recv()
        .map_err(|e| GpuError::BufferMapping(e.to_string()))?
        .map_err(|e| GpuError::BufferMapping(e.to_string()))?;

    let data = {
        let mapped = buffer_slice.get_mapped_range();
        bytemuck::cast_slice::<u8, T>(&mapped).to_vec()
    };
    staging.unmap();
    Ok(data)
}
