use fluid_sim_core::{to_rgba8, FieldKind, SimulationStats};
use std::slice;

use crate::error::{DefaultFluidSimError, FluidSimErrorCode};
use crate::helpers::{handle_ffi_result_error, instance_from_ptr, track_error, with_sim};
use crate::instance::FluidSimInstance;

/// FFI-friendly snapshot of the engine counters and diagnostics.
/// Keep this layout stable for C/C++/C# consumers.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FluidSimStats {
    /// Completed frames since creation or the last reset.
    pub frame: u64,
    /// Simulated seconds since creation or the last reset.
    pub time: f32,
    /// Whether the fields live on the GPU.
    pub gpu_accelerated: bool,
    pub pending_splats: usize,
    pub active_sources: usize,
    /// Sum of every dye channel over the grid (0 when the variant has no dye).
    pub total_density: f32,
    /// Largest velocity magnitude in grid units per second.
    pub peak_velocity: f32,
    /// Mean absolute velocity divergence after the last projection.
    pub mean_abs_divergence: f32,
    /// Wall-clock time of the last frame in milliseconds.
    pub last_frame_ms: f64,
    /// Smoothed wall-clock frame time in milliseconds.
    pub average_frame_ms: f64,
}

impl From<&SimulationStats> for FluidSimStats {
    fn from(stats: &SimulationStats) -> Self {
        Self {
            frame: stats.frame,
            time: stats.time,
            gpu_accelerated: stats.gpu_accelerated,
            pending_splats: stats.pending_splats,
            active_sources: stats.active_sources,
            total_density: stats.total_density,
            peak_velocity: stats.peak_velocity,
            mean_abs_divergence: stats.mean_abs_divergence,
            last_frame_ms: stats.last_frame_ms,
            average_frame_ms: stats.average_frame_ms,
        }
    }
}

fn field_kind(kind: u32) -> Result<FieldKind, DefaultFluidSimError> {
    FieldKind::from_index(kind).ok_or_else(|| {
        DefaultFluidSimError::invalid_parameter(format!(
            "Unknown field kind {kind} (expected 0..{})",
            FieldKind::ALL.len()
        ))
    })
}

/// Grid resolution in cells.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by `fluid_sim_new`.
/// `out_width` and `out_height` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_get_grid_size(
    ptr: *const FluidSimInstance,
    out_width: *mut u32,
    out_height: *mut u32,
) -> FluidSimErrorCode {
    if out_width.is_null() {
        return track_error(&DefaultFluidSimError::null_pointer("out_width"));
    }
    if out_height.is_null() {
        return track_error(&DefaultFluidSimError::null_pointer("out_height"));
    }

    handle_ffi_result_error(|| {
        let instance = unsafe { instance_from_ptr(ptr)? };
        let grid = with_sim(instance, fluid_sim_core::Simulation::grid)?;
        unsafe {
            *out_width = grid.width();
            *out_height = grid.height();
        }
        Ok(())
    })
}

/// Copy the display image as 8-bit RGBA into a caller buffer.
///
/// `out_pixels` must hold `width * height * 4` bytes. Rows are stored
/// bottom-to-top, matching the grid's origin.
///
/// Returns `BufferTooSmall` if `len` is short, or `MissingField` if the
/// variant renders no display field.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by `fluid_sim_new`.
/// `out_pixels` must be valid for `len` bytes of writes.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_read_display_rgba8(
    ptr: *const FluidSimInstance,
    out_pixels: *mut u8,
    len: usize,
) -> FluidSimErrorCode {
    if out_pixels.is_null() {
        return track_error(&DefaultFluidSimError::null_pointer("out_pixels"));
    }

    handle_ffi_result_error(|| {
        let instance = unsafe { instance_from_ptr(ptr)? };
        let pixels = with_sim(instance, |sim| {
            sim.display_field().map(|display| to_rgba8(&display))
        })??;
        if pixels.len() > len {
            return Err(DefaultFluidSimError::buffer_too_small(
                "out_pixels",
                pixels.len(),
                len,
            ));
        }
        let out = unsafe { slice::from_raw_parts_mut(out_pixels, pixels.len()) };
        out.copy_from_slice(&pixels);
        Ok(())
    })
}

/// Copy a raw field (interleaved channels, row-major) into a caller buffer.
///
/// `kind` indexes the quantities: 0 velocity, 1 density, 2 temperature,
/// 3 pressure, 4 divergence, 5 curl, 6 height, 7 normals, 8 foam, 9 display.
/// The number of floats written is returned through `out_written`.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by `fluid_sim_new`.
/// `out_values` must be valid for `len` floats of writes; `out_written` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_read_field(
    ptr: *const FluidSimInstance,
    kind: u32,
    out_values: *mut f32,
    len: usize,
    out_written: *mut usize,
) -> FluidSimErrorCode {
    if out_values.is_null() {
        return track_error(&DefaultFluidSimError::null_pointer("out_values"));
    }
    if out_written.is_null() {
        return track_error(&DefaultFluidSimError::null_pointer("out_written"));
    }

    handle_ffi_result_error(|| {
        let instance = unsafe { instance_from_ptr(ptr)? };
        let kind = field_kind(kind)?;
        with_sim(instance, |sim| -> Result<(), DefaultFluidSimError> {
            let data = sim.read_field(kind)?;
            if data.len() > len {
                return Err(DefaultFluidSimError::buffer_too_small(
                    "out_values",
                    data.len(),
                    len,
                ));
            }
            let out = unsafe { slice::from_raw_parts_mut(out_values, data.len()) };
            out.copy_from_slice(&data);
            unsafe {
                *out_written = data.len();
            }
            Ok(())
        })?
    })
}

/// Channel count of an allocated field, or 0 if the variant does not use it.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by `fluid_sim_new`.
/// `out_channels` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_get_field_channels(
    ptr: *const FluidSimInstance,
    kind: u32,
    out_channels: *mut u32,
) -> FluidSimErrorCode {
    if out_channels.is_null() {
        return track_error(&DefaultFluidSimError::null_pointer("out_channels"));
    }

    handle_ffi_result_error(|| {
        let instance = unsafe { instance_from_ptr(ptr)? };
        let kind = field_kind(kind)?;
        let channels = with_sim(instance, |sim| sim.field_channels(kind))?;
        unsafe {
            *out_channels = channels.unwrap_or(0);
        }
        Ok(())
    })
}

/// Fill `out_stats` with the current counters and diagnostics.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by `fluid_sim_new`.
/// `out_stats` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_get_stats(
    ptr: *const FluidSimInstance,
    out_stats: *mut FluidSimStats,
) -> FluidSimErrorCode {
    if out_stats.is_null() {
        return track_error(&DefaultFluidSimError::null_pointer("out_stats"));
    }

    handle_ffi_result_error(|| {
        let instance = unsafe { instance_from_ptr(ptr)? };
        let stats = with_sim(instance, fluid_sim_core::Simulation::stats)??;
        unsafe {
            *out_stats = FluidSimStats::from(&stats);
        }
        Ok(())
    })
}
