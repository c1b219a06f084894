//! Field storage and kernel execution
//!
//! This module provides a unified GPU/CPU abstraction layer for double-buffered
//! grid fields. The core abstraction is the `FieldBackend` trait, which has both
//! CPU and GPU implementations.
//!
//! # Feature Flags
//!
//! - `gpu` (default): Enables GPU acceleration via wgpu. Disable with `--no-default-features`
//!   for environments without GPU access.
//!
//! # Backend Selection
//!
//! The system automatically selects the best available backend:
//! 1. Try GPU (if `gpu` feature enabled and hardware available)
//! 2. Fall back to CPU (always available)
//!
//! # Example
//!
//! ```rust,ignore
//! use fluid_sim_core::solver::{create_backend, BackendPreference};
//! use fluid_sim_core::Grid;
//!
//! let grid = Grid::new(256, 256)?;
//! let backend = create_backend(grid, BackendPreference::Auto)?;
//! ```

mod context;
mod cpu;
mod fields;
mod kernel;
pub mod profiler;
#[allow(clippy::module_name_repetitions)]
mod r#trait;

#[cfg(feature = "gpu")]
mod gpu;

// Re-exports
pub use context::GpuInitResult;
pub use cpu::{CpuBackend, DEFAULT_HOST_BUDGET_BYTES};
pub use fields::{FieldData, FieldHandle, FieldPair};
pub use kernel::{Kernel, KernelKind, KernelPass, PassParams, VORTICITY_EPSILON};
pub use profiler::{FrameTimer, ProfilerScope};
pub use r#trait::FieldBackend;

#[cfg(feature = "gpu")]
pub use context::{GpuContext, DEVICE_BYTES_PER_CELL};
#[cfg(feature = "gpu")]
pub use gpu::{GpuBackend, DEFAULT_DEVICE_BUDGET_BYTES};

use crate::error::FluidError;
use crate::grid::Grid;
use serde::{Deserialize, Serialize};
use tracing::info;

#[cfg(feature = "gpu")]
use tracing::warn;

/// Which backend [`create_backend`] should construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendPreference {
    /// GPU when available, CPU otherwise
    #[default]
    Auto,
    /// Always use the host backend
    Cpu,
    /// Require a GPU; fails instead of falling back
    Gpu,
}

/// Create a field backend with automatic backend selection
///
/// This function tries to use GPU acceleration if available, falling back to CPU otherwise.
/// The selection process is:
/// 1. If `gpu` feature is enabled, try to initialize GPU
/// 2. If GPU initialization fails or feature is disabled, use CPU
///
/// # Arguments
///
/// * `grid` - Simulation domain every field is sized to
/// * `preference` - Force a backend instead of automatic selection
///
/// # Errors
///
/// Returns `FluidError::ResourceExhausted` when `BackendPreference::Gpu` is
/// requested and no usable device can hold the grid.
pub fn create_backend(
    grid: Grid,
    preference: BackendPreference,
) -> Result<Box<dyn FieldBackend>, FluidError> {
    if preference == BackendPreference::Cpu {
        info!("CPU backend requested ({}x{} grid)", grid.width(), grid.height());
        return Ok(Box::new(CpuBackend::new(grid)));
    }

    #[cfg(feature = "gpu")]
    {
        match GpuContext::new() {
            GpuInitResult::Success(gpu_context) => {
                if gpu_context.can_allocate(grid.width(), grid.height()) {
                    info!(
                        "Using GPU backend: {} ({}x{} grid)",
                        gpu_context.adapter_name(),
                        grid.width(),
                        grid.height()
                    );
                    return Ok(Box::new(GpuBackend::new(gpu_context, grid)?));
                }
                warn!(
                    "GPU has insufficient memory for {}x{} grid, falling back to CPU",
                    grid.width(),
                    grid.height()
                );
            }
            GpuInitResult::NoGpuFound => {
                info!("No GPU found, using CPU backend");
            }
            GpuInitResult::InitFailed {
                adapter_name,
                error,
            } => {
                warn!(
                    "GPU '{}' found but failed to initialize: {}. Falling back to CPU.",
                    adapter_name, error
                );
            }
        }
    }

    #[cfg(not(feature = "gpu"))]
    info!("GPU feature disabled, using CPU backend");

    if preference == BackendPreference::Gpu {
        return Err(FluidError::ResourceExhausted {
            backend: "gpu",
            requested_bytes: 16 * grid.cell_count() as u64,
        });
    }

    Ok(Box::new(CpuBackend::new(grid)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_preference_is_honoured() {
        let grid = Grid::new(8, 8).unwrap();
        let backend = create_backend(grid, BackendPreference::Cpu).unwrap();
        assert_eq!(backend.name(), "cpu");
        assert!(!backend.is_gpu_accelerated());
        assert_eq!(backend.grid(), grid);
    }

    #[test]
    fn test_auto_always_yields_a_backend() {
        let grid = Grid::new(16, 16).unwrap();
        let backend = create_backend(grid, BackendPreference::Auto).unwrap();
        assert_eq!(backend.grid(), grid);
    }
}
