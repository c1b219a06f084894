//! GPU-based field backend
//!
//! This module provides a GPU implementation of the `FieldBackend` trait using
//! wgpu compute shaders and storage buffers. This backend is only available when the
//! `gpu` feature is enabled.
//!
//! # Shader Files
//!
//! All kernels live in `shaders/kernels.wgsl`, one compute entry point per
//! [`KernelKind`]. Every pipeline shares one bind group layout:
//!
//! | binding | resource                                   |
//! |---------|--------------------------------------------|
//! | 0       | pass parameters (uniform)                  |
//! | 1..=3   | input fields, authoritative half (read)    |
//! | 4       | destination field, scratch half (write)    |
//!
//! # Implementation
//!
//! Every field is a pair of `array<vec4<f32>>` storage buffers with a ping flag
//! selecting the authoritative half. Each pass is submitted on its own so the
//! shared parameter buffer written before it is the one the pass observes; queue
//! order guarantees a pass sees every earlier pass's writes. Unused input slots
//! are bound to a small dummy buffer so a destination is never bound twice.

use super::context::{GpuContext, DEVICE_BYTES_PER_CELL};
use super::fields::FieldHandle;
use super::kernel::{KernelKind, KernelPass, PassParams};
use super::FieldBackend;
use crate::error::FluidError;
use crate::grid::Grid;
use bytemuck::{Pod, Zeroable};
use std::borrow::Cow;
use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

/// Workgroup edge length (must match `@workgroup_size` in the shaders)
const WORKGROUP_SIZE: u32 = 8;

/// Default device memory budget for field storage (both halves of every pair)
pub const DEFAULT_DEVICE_BUDGET_BYTES: u64 = 1024 * 1024 * 1024;

/// Pass parameters (must match WGSL `Params` layout, 64 bytes)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct GpuPassParams {
    size: [u32; 2],
    texel: [f32; 2],
    point: [f32; 2],
    dt: f32,
    k0: f32,
    value: [f32; 4],
    k1: f32,
    k2: f32,
    k3: f32,
    k4: f32,
}

impl GpuPassParams {
    fn new(grid: Grid, params: &PassParams) -> Self {
        let (tx, ty) = grid.texel_size();
        Self {
            size: [grid.width(), grid.height()],
            texel: [tx, ty],
            point: params.point,
            dt: params.dt,
            k0: params.k[0],
            value: params.value,
            k1: params.k[1],
            k2: params.k[2],
            k3: params.k[3],
            k4: params.k[4],
        }
    }
}

/// Device-side read/write pair
struct GpuFieldPair {
    label: &'static str,
    channels: u32,
    a: wgpu::Buffer,
    b: wgpu::Buffer,
    /// `true` when `a` is authoritative
    ping: bool,
}

impl GpuFieldPair {
    fn read_buffer(&self) -> &wgpu::Buffer {
        if self.ping {
            &self.a
        } else {
            &self.b
        }
    }

    fn write_buffer(&self) -> &wgpu::Buffer {
        if self.ping {
            &self.b
        } else {
            &self.a
        }
    }

    fn swap(&mut self) {
        self.ping = !self.ping;
    }
}

/// GPU-based field backend using wgpu compute shaders
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    grid: Grid,

    fields: Vec<GpuFieldPair>,
    allocated_bytes: u64,
    budget_bytes: u64,

    params_buffer: wgpu::Buffer,
    placeholder: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    /// Indexed by `KernelKind as usize`
    pipelines: Vec<wgpu::ComputePipeline>,

    released: bool,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuBackend {
    /// Create a new GPU backend
    ///
    /// Loads the kernel module and builds one compute pipeline per kernel.
    ///
    /// # Errors
    ///
    /// Returns `FluidError::ResourceExhausted` if a single field buffer at this
    /// resolution exceeds the device limits.
    pub fn new(context: GpuContext, grid: Grid) -> Result<Self, FluidError> {
        Self::with_budget(context, grid, DEFAULT_DEVICE_BUDGET_BYTES)
    }

    /// Create a backend that refuses field allocations beyond `budget_bytes`
    ///
    /// # Errors
    ///
    /// Same as [`GpuBackend::new`].
    pub fn with_budget(
        context: GpuContext,
        grid: Grid,
        budget_bytes: u64,
    ) -> Result<Self, FluidError> {
        if !context.can_allocate(grid.width(), grid.height()) {
            return Err(FluidError::ResourceExhausted {
                backend: "gpu",
                requested_bytes: DEVICE_BYTES_PER_CELL * grid.cell_count() as u64,
            });
        }
        let (device, queue, adapter_info) = context.into_parts();

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Pass Params"),
            contents: bytemuck::bytes_of(&GpuPassParams::new(grid, &PassParams::default())),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let placeholder = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Unused Input"),
            contents: bytemuck::cast_slice(&[0.0_f32; 4]),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let shader = device.create_shader_module(wgpu::include_wgsl!("shaders/kernels.wgsl"));

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Kernel Bind Group Layout"),
            entries: &[
                // params (binding 0)
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Kernel Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipelines = KernelKind::ALL
            .iter()
            .map(|kind| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(kind.entry_point()),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: Some(kind.entry_point()),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                })
            })
            .collect();

        info!(
            "GPU backend ready on '{}' ({}x{} grid)",
            adapter_info.name,
            grid.width(),
            grid.height()
        );

        Ok(Self {
            device,
            queue,
            adapter_name: adapter_info.name,
            grid,
            fields: Vec::new(),
            allocated_bytes: 0,
            budget_bytes,
            params_buffer,
            placeholder,
            bind_group_layout,
            pipelines,
            released: false,
        })
    }

    /// Adapter the backend runs on
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn buffer_size(&self) -> u64 {
        DEVICE_BYTES_PER_CELL * self.grid.cell_count() as u64
    }

    fn field(&self, handle: FieldHandle) -> Result<&GpuFieldPair, FluidError> {
        self.fields
            .get(handle.index())
            .ok_or(FluidError::UnknownField(handle.index()))
    }

    fn live(&self) -> Result<(), FluidError> {
        if self.released {
            Err(FluidError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Calculate workgroup count for dispatch
    fn workgroup_count(&self) -> (u32, u32) {
        (
            self.grid.width().div_ceil(WORKGROUP_SIZE),
            self.grid.height().div_ceil(WORKGROUP_SIZE),
        )
    }

    fn create_field_buffer(&self, label: &'static str) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: self.buffer_size(),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }
}

impl FieldBackend for GpuBackend {
    fn allocate(&mut self, label: &'static str, channels: u32) -> Result<FieldHandle, FluidError> {
        self.live()?;
        let pair_bytes = 2 * self.buffer_size();
        let requested_bytes = self.allocated_bytes + pair_bytes;
        if requested_bytes > self.budget_bytes {
            return Err(FluidError::ResourceExhausted {
                backend: self.name(),
                requested_bytes,
            });
        }

        let handle = FieldHandle(self.fields.len());
        // New buffers are zero-initialized by wgpu
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let a = self.create_field_buffer(label);
        let b = self.create_field_buffer(label);
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            warn!("Device refused field '{}': {}", label, error);
            a.destroy();
            b.destroy();
            return Err(FluidError::ResourceExhausted {
                backend: self.name(),
                requested_bytes,
            });
        }
        self.allocated_bytes = requested_bytes;
        self.fields.push(GpuFieldPair {
            label,
            channels: channels.clamp(1, 4),
            a,
            b,
            ping: true,
        });
        debug!("Allocated GPU field '{}' ({} channels)", label, channels);
        Ok(handle)
    }

    fn dispatch(&mut self, pass: &KernelPass) -> Result<(), FluidError> {
        self.live()?;
        let kind = pass.kernel.kind();
        let output = self.field(pass.output)?;

        let mut sources = [&self.placeholder; 3];
        for (slot, input) in sources.iter_mut().zip(pass.kernel.inputs()) {
            if let Some(handle) = input {
                *slot = self.field(handle)?.read_buffer();
            }
        }

        let params = GpuPassParams::new(self.grid, &pass.kernel.params());
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(output.label),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: sources[0].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: sources[1].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: sources[2].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: output.write_buffer().as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(kind.entry_point()),
            });

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kind.entry_point()),
                timestamp_writes: None,
            });

            compute_pass.set_pipeline(&self.pipelines[kind as usize]);
            compute_pass.set_bind_group(0, &bind_group, &[]);

            let (wg_x, wg_y) = self.workgroup_count();
            compute_pass.dispatch_workgroups(wg_x, wg_y, 1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));

        // Flip ping-pong
        self.fields[pass.output.index()].swap();
        Ok(())
    }

    fn clear(&mut self, field: FieldHandle) -> Result<(), FluidError> {
        self.live()?;
        let pair = self.field(field)?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Clear Field Encoder"),
            });
        encoder.clear_buffer(&pair.a, 0, None);
        encoder.clear_buffer(&pair.b, 0, None);
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn upload(&mut self, field: FieldHandle, data: &[f32]) -> Result<(), FluidError> {
        self.live()?;
        let pair = self.field(field)?;
        let channels = pair.channels as usize;
        let expected = self.grid.cell_count() * channels;
        if data.len() != expected {
            return Err(FluidError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }

        // Expand to the device's vec4-per-cell layout
        let mut padded = vec![0.0_f32; self.grid.cell_count() * 4];
        for (cell, values) in padded.chunks_exact_mut(4).zip(data.chunks_exact(channels)) {
            cell[..channels].copy_from_slice(values);
        }
        self.queue
            .write_buffer(pair.read_buffer(), 0, bytemuck::cast_slice(&padded));
        Ok(())
    }

    fn read(&self, field: FieldHandle) -> Result<Cow<'_, [f32]>, FluidError> {
        self.live()?;
        let pair = self.field(field)?;
        let size = self.buffer_size();

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(pair.read_buffer(), 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        // Map and read
        let buffer_slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| FluidError::Readback(e.to_string()))?
            .map_err(|e| FluidError::Readback(e.to_string()))?;

        let channels = pair.channels as usize;
        let result: Vec<f32> = {
            let data = buffer_slice.get_mapped_range();
            let cells: &[f32] = bytemuck::cast_slice(&data);
            cells
                .chunks_exact(4)
                .flat_map(|cell| cell[..channels].iter().copied())
                .collect()
        };
        staging.unmap();

        Ok(Cow::Owned(result))
    }

    fn channels(&self, field: FieldHandle) -> Option<u32> {
        self.fields.get(field.index()).map(|p| p.channels)
    }

    fn flush(&mut self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    fn release(&mut self) {
        for pair in self.fields.drain(..) {
            pair.a.destroy();
            pair.b.destroy();
        }
        self.allocated_bytes = 0;
        self.released = true;
        info!("GPU backend released");
    }

    fn grid(&self) -> Grid {
        self.grid
    }

    fn name(&self) -> &'static str {
        "gpu"
    }

    fn is_gpu_accelerated(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::context::GpuInitResult;
    use crate::solver::cpu::CpuBackend;
    use crate::solver::kernel::Kernel;

    #[test]
    fn test_params_block_is_64_bytes() {
        assert_eq!(std::mem::size_of::<GpuPassParams>(), 64);
    }

    #[test]
    fn test_gpu_backend_creation() {
        // Only run if GPU is available
        if let GpuInitResult::Success(context) = GpuContext::new() {
            let backend = GpuBackend::new(context, Grid::new(64, 32).unwrap()).unwrap();
            assert_eq!(backend.grid().width(), 64);
            assert!(backend.is_gpu_accelerated());
        }
    }

    #[test]
    fn test_allocation_beyond_budget_is_refused() {
        // Only run if GPU is available
        if let GpuInitResult::Success(context) = GpuContext::new() {
            let grid = Grid::new(16, 16).unwrap();
            let one_pair = 2 * DEVICE_BYTES_PER_CELL * grid.cell_count() as u64;
            let mut gpu = GpuBackend::with_budget(context, grid, one_pair).unwrap();

            let velocity = gpu.allocate("velocity", 2).unwrap();
            match gpu.allocate("density", 3) {
                Err(FluidError::ResourceExhausted {
                    backend,
                    requested_bytes,
                }) => {
                    assert_eq!(backend, "gpu");
                    assert_eq!(requested_bytes, 2 * one_pair);
                }
                other => panic!("expected ResourceExhausted, got {other:?}"),
            }
            // The field that fit is still usable
            assert_eq!(gpu.read(velocity).unwrap().len(), 16 * 16 * 2);
        }
    }

    #[test]
    fn test_gpu_matches_cpu_splat() {
        // Only run if GPU is available
        if let GpuInitResult::Success(context) = GpuContext::new() {
            let grid = Grid::new(16, 16).unwrap();
            let mut gpu = GpuBackend::new(context, grid).unwrap();
            let mut cpu = CpuBackend::new(grid);

            let gf = gpu.allocate("density", 3).unwrap();
            let cf = cpu.allocate("density", 3).unwrap();
            let kernel = |target| Kernel::Splat {
                target,
                point: [0.5, 0.5],
                value: [1.0, 0.5, 0.25, 0.0],
                radius: 0.1,
                aspect: 1.0,
            };
            gpu.dispatch(&KernelPass::new(kernel(gf), gf)).unwrap();
            cpu.dispatch(&KernelPass::new(kernel(cf), cf)).unwrap();

            let g = gpu.read(gf).unwrap();
            let c = cpu.read(cf).unwrap();
            assert_eq!(g.len(), c.len());
            for (a, b) in g.iter().zip(c.iter()) {
                assert!((a - b).abs() < 1e-4);
            }
        }
    }
}
