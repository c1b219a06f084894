use fluid_sim_core::{PointerInput, Source, SourceId, Splat};
use nalgebra::Vector2;

use crate::error::{DefaultFluidSimError, FluidSimErrorCode};
use crate::helpers::{handle_ffi_result_error, instance_from_ptr, track_error, with_sim_mut};
use crate::instance::FluidSimInstance;

/// Advance the simulation by `dt` seconds.
///
/// Thread-safe: acquires the `RwLock` write lock for the whole frame.
///
/// Returns
/// - `Ok` on success (a `dt` of 0 is a no-op frame)
/// - `InvalidTimestep` for negative or non-finite `dt`
/// - `NeedsReset` if an earlier frame failed part-way
///
/// # Safety
/// `ptr` must be null or a live pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_update(ptr: *const FluidSimInstance, dt: f32) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = unsafe { instance_from_ptr(ptr)? };
        with_sim_mut(instance, |sim| sim.update(dt))??;
        Ok(())
    })
}

/// Queue a one-shot splat.
///
/// Position is normalized to [0, 1]² with the origin at the bottom-left.
/// `radius` is clamped to a small positive minimum.
///
/// Returns `SplatQueueFull` when the pending queue is at capacity.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by `fluid_sim_new`.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn fluid_sim_add_splat(
    ptr: *const FluidSimInstance,
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
    r: f32,
    g: f32,
    b: f32,
    radius: f32,
) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = unsafe { instance_from_ptr(ptr)? };
        let splat = Splat::new(Vector2::new(x, y), Vector2::new(dx, dy), [r, g, b], radius);
        with_sim_mut(instance, |sim| sim.add_splat(splat))??;
        Ok(())
    })
}

/// Queue `count` random splats.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_random_splats(
    ptr: *const FluidSimInstance,
    count: u32,
) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = unsafe { instance_from_ptr(ptr)? };
        with_sim_mut(instance, |sim| sim.random_splats(count as usize))??;
        Ok(())
    })
}

/// Feed normalized pointer state; a pressed, moving pointer queues a splat.
///
/// `out_emitted` may be null. When non-null it receives whether a splat was queued.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by `fluid_sim_new`.
/// `out_emitted` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_pointer_input(
    ptr: *const FluidSimInstance,
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
    down: bool,
    out_emitted: *mut bool,
) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = unsafe { instance_from_ptr(ptr)? };
        let input = PointerInput {
            position: Vector2::new(x, y),
            delta: Vector2::new(dx, dy),
            down,
        };
        let emitted = with_sim_mut(instance, |sim| sim.pointer_input(&input))??;
        if let Some(out) = unsafe { out_emitted.as_mut() } {
            *out = emitted;
        }
        Ok(())
    })
}

/// Register a continuous emitter and return its id via `out_id`.
///
/// The emitter injects `(vx, vy)` velocity, `(r, g, b)` dye and `temperature`
/// heat each frame until removed.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by `fluid_sim_new`.
/// `out_id` must be valid for writes.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn fluid_sim_add_source(
    ptr: *const FluidSimInstance,
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    r: f32,
    g: f32,
    b: f32,
    temperature: f32,
    radius: f32,
    out_id: *mut u64,
) -> FluidSimErrorCode {
    if out_id.is_null() {
        return track_error(&DefaultFluidSimError::null_pointer("out_id"));
    }

    handle_ffi_result_error(|| {
        let instance = unsafe { instance_from_ptr(ptr)? };
        let source = Source::new(Vector2::new(x, y), [r, g, b], radius)
            .with_velocity(Vector2::new(vx, vy))
            .with_temperature(temperature);
        let id = with_sim_mut(instance, |sim| sim.add_source(source))??;
        unsafe {
            *out_id = id.0;
        }
        Ok(())
    })
}

/// Remove an emitter registered by `fluid_sim_add_source`.
///
/// Returns `InvalidParameter` if `id` is not registered.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_remove_source(
    ptr: *const FluidSimInstance,
    id: u64,
) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = unsafe { instance_from_ptr(ptr)? };
        if with_sim_mut(instance, |sim| sim.remove_source(SourceId(id)))?? {
            Ok(())
        } else {
            Err(DefaultFluidSimError::invalid_parameter(format!(
                "Source {id} is not registered"
            )))
        }
    })
}

/// Zero every field and drop pending splats and sources.
///
/// This is also the only way out of `NeedsReset`.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by `fluid_sim_new`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_reset(ptr: *const FluidSimInstance) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = unsafe { instance_from_ptr(ptr)? };
        with_sim_mut(instance, fluid_sim_core::Simulation::reset)??;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{fluid_sim_destroy, fluid_sim_new};
    use std::ptr;

    fn new_sim() -> *mut FluidSimInstance {
        let mut sim = ptr::null_mut();
        let code = unsafe { fluid_sim_new(32, 32, 0, true, &mut sim) };
        assert_eq!(code, FluidSimErrorCode::Ok);
        sim
    }

    #[test]
    fn test_update_reports_invalid_timestep() {
        let sim = new_sim();
        unsafe {
            assert_eq!(fluid_sim_update(sim, 0.016), FluidSimErrorCode::Ok);
            assert_eq!(fluid_sim_update(sim, -1.0), FluidSimErrorCode::InvalidTimestep);
            assert_eq!(fluid_sim_update(sim, 0.0), FluidSimErrorCode::Ok);
            fluid_sim_destroy(sim);
        }
    }

    #[test]
    fn test_null_instance_is_reported() {
        unsafe {
            assert_eq!(
                fluid_sim_update(ptr::null(), 0.016),
                FluidSimErrorCode::NullPointer
            );
            assert_eq!(fluid_sim_reset(ptr::null()), FluidSimErrorCode::NullPointer);
        }
    }

    #[test]
    fn test_source_lifecycle() {
        let sim = new_sim();
        let mut id = u64::MAX;
        unsafe {
            let code = fluid_sim_add_source(
                sim, 0.5, 0.1, 0.0, 1.0, 1.0, 0.5, 0.2, 0.0, 0.05, &mut id,
            );
            assert_eq!(code, FluidSimErrorCode::Ok);
            assert_ne!(id, u64::MAX);
            assert_eq!(fluid_sim_remove_source(sim, id), FluidSimErrorCode::Ok);
            assert_eq!(
                fluid_sim_remove_source(sim, id),
                FluidSimErrorCode::InvalidParameter
            );
            fluid_sim_destroy(sim);
        }
    }

    #[test]
    fn test_pointer_drag_emits_splat() {
        let sim = new_sim();
        let mut emitted = false;
        unsafe {
            let code = fluid_sim_pointer_input(sim, 0.5, 0.5, 0.01, 0.0, true, &mut emitted);
            assert_eq!(code, FluidSimErrorCode::Ok);
            assert!(emitted);

            let code = fluid_sim_pointer_input(sim, 0.5, 0.5, 0.01, 0.0, false, &mut emitted);
            assert_eq!(code, FluidSimErrorCode::Ok);
            assert!(!emitted);
            fluid_sim_destroy(sim);
        }
    }

    #[test]
    fn test_splat_then_update_then_reset() {
        let sim = new_sim();
        unsafe {
            let code = fluid_sim_add_splat(sim, 0.5, 0.5, 10.0, 0.0, 1.0, 0.0, 0.0, 0.05);
            assert_eq!(code, FluidSimErrorCode::Ok);
            assert_eq!(fluid_sim_random_splats(sim, 3), FluidSimErrorCode::Ok);
            assert_eq!(fluid_sim_update(sim, 0.016), FluidSimErrorCode::Ok);
            assert_eq!(fluid_sim_reset(sim), FluidSimErrorCode::Ok);
            fluid_sim_destroy(sim);
        }
    }
}
