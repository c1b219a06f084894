//! Device acquisition for the compute backend
//!
//! Acquiring a device has three outcomes the engine treats differently: no
//! adapter at all (quietly use the host backend), an adapter that cannot run
//! the stencil kernels or refuses a device (warn, then use the host backend),
//! and a usable device.

/// Outcome of trying to acquire a compute device
#[derive(Debug)]
pub enum GpuInitResult {
    /// Device and queue ready for kernel dispatch
    #[cfg(feature = "gpu")]
    Success(GpuContext),
    /// No adapter was offered
    NoGpuFound,
    /// An adapter exists but cannot be used for the field kernels
    InitFailed {
        adapter_name: String,
        error: String,
    },
}

#[cfg(feature = "gpu")]
mod gpu_impl {
    use super::GpuInitResult;
    use tracing::{debug, info};

    /// Bytes per cell on the device; every field is stored as `vec4<f32>`
    pub const DEVICE_BYTES_PER_CELL: u64 = 16;

    /// Storage bindings a single kernel uses: three sources and one destination
    const STORAGE_BINDINGS_PER_KERNEL: u32 = 4;

    /// Device, queue and the adapter they came from
    #[derive(Debug)]
    pub struct GpuContext {
        device: wgpu::Device,
        queue: wgpu::Queue,
        adapter_info: wgpu::AdapterInfo,
    }

    impl GpuContext {
        /// Acquire a high-performance adapter able to run the field kernels
        ///
        /// The device is requested with the adapter's own limits so large grids
        /// are bounded by the hardware rather than by the portable defaults.
        #[allow(clippy::new_ret_no_self)]
        pub fn new() -> GpuInitResult {
            let instance = wgpu::Instance::default();

            let Some(adapter) =
                pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                }))
            else {
                debug!("No compute adapter offered");
                return GpuInitResult::NoGpuFound;
            };

            let adapter_info = adapter.get_info();
            let adapter_name = adapter_info.name.clone();
            debug!("Adapter {} ({:?})", adapter_name, adapter_info.backend);

            let downlevel = adapter.get_downlevel_capabilities();
            if !downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
                return GpuInitResult::InitFailed {
                    adapter_name,
                    error: "adapter does not support compute shaders".to_string(),
                };
            }

            let limits = adapter.limits();
            if limits.max_storage_buffers_per_shader_stage < STORAGE_BINDINGS_PER_KERNEL {
                return GpuInitResult::InitFailed {
                    adapter_name,
                    error: format!(
                        "adapter allows {} storage buffers per stage, kernels need {}",
                        limits.max_storage_buffers_per_shader_stage, STORAGE_BINDINGS_PER_KERNEL
                    ),
                };
            }

            match pollster::block_on(adapter.request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("fluid-sim device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )) {
                Ok((device, queue)) => {
                    info!("Compute device ready on {}", adapter_name);
                    GpuInitResult::Success(Self {
                        device,
                        queue,
                        adapter_info,
                    })
                }
                Err(e) => GpuInitResult::InitFailed {
                    adapter_name,
                    error: e.to_string(),
                },
            }
        }

        #[must_use]
        pub fn adapter_name(&self) -> &str {
            &self.adapter_info.name
        }

        /// Whether one field half at `width` x `height` fits a single storage binding
        #[must_use]
        pub fn can_allocate(&self, width: u32, height: u32) -> bool {
            let buffer_bytes = DEVICE_BYTES_PER_CELL * u64::from(width) * u64::from(height);
            let limits = self.device.limits();

            buffer_bytes <= u64::from(limits.max_storage_buffer_binding_size)
                && buffer_bytes <= limits.max_buffer_size
        }

        #[must_use]
        pub fn device(&self) -> &wgpu::Device {
            &self.device
        }

        /// Hand the device and queue over to a backend
        #[must_use]
        pub fn into_parts(self) -> (wgpu::Device, wgpu::Queue, wgpu::AdapterInfo) {
            (self.device, self.queue, self.adapter_info)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_init_outcome_is_consistent() {
            match GpuContext::new() {
                GpuInitResult::Success(ctx) => {
                    assert!(ctx.device().limits().max_storage_buffers_per_shader_stage >= 4);
                }
                GpuInitResult::NoGpuFound => {}
                GpuInitResult::InitFailed { error, .. } => {
                    assert!(!error.is_empty());
                }
            }
        }

        #[test]
        fn test_can_allocate_respects_binding_limit() {
            if let GpuInitResult::Success(ctx) = GpuContext::new() {
                assert!(ctx.can_allocate(256, 256));
                assert!(!ctx.can_allocate(65536, 65536));
            }
        }
    }
}

#[cfg(feature = "gpu")]
pub use gpu_impl::{GpuContext, DEVICE_BYTES_PER_CELL};
