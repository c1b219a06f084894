use fluid_sim_core::{BackendPreference, Grid, SimConfig, Simulation, Variant};
use std::ptr;
use std::sync::RwLock;

use crate::error::{DefaultFluidSimError, FluidSimErrorCode};
use crate::helpers::{track_error, track_result};

/// The main fluid simulation context.
///
/// # Thread Safety
/// `FluidSimInstance` can be shared across the threads of a host engine.
/// The simulation is protected by an `RwLock`:
/// - **Multiple concurrent readers** (display readback, stats): `.read()` lock
/// - **Exclusive writer** (update, splats, reset): `.write()` lock
///
/// # Usage
///
/// ```cpp
/// FluidSimInstance* sim = nullptr;
/// if (fluid_sim_new(512, 512, 0, false, &sim) != Ok) {
///     return;
/// }
///
/// void Tick(float dt) {
///     fluid_sim_update(sim, dt);
///     fluid_sim_read_display_rgba8(sim, pixels, pixel_len);
/// }
///
/// fluid_sim_destroy(sim);
/// ```
pub struct FluidSimInstance {
    pub(crate) sim: RwLock<Simulation>,
}

impl FluidSimInstance {
    /// Creates a new instance for one of the preset variants.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for an unknown variant index, and the
    /// converted engine error if grid validation or field allocation fails.
    pub(crate) fn new(
        width: u32,
        height: u32,
        variant: u32,
        prefer_cpu: bool,
    ) -> Result<Box<Self>, DefaultFluidSimError> {
        let variant = Variant::from_index(variant).ok_or_else(|| {
            DefaultFluidSimError::invalid_parameter(format!(
                "Unknown variant index {variant} (expected 0..{})",
                Variant::ALL.len()
            ))
        })?;
        let grid = Grid::new(width, height)?;
        let preference = if prefer_cpu {
            BackendPreference::Cpu
        } else {
            BackendPreference::Auto
        };
        let sim = Simulation::new(grid, variant, SimConfig::default(), preference)?;

        Ok(Box::new(Self {
            sim: RwLock::new(sim),
        }))
    }
}

/// Create a new fluid simulation and return it via out-parameter.
///
/// Parameters
/// - `width`, `height`: grid resolution in cells.
/// - `variant`: 0 = fluid, 1 = smoke, 2 = ocean, 3 = test rig.
/// - `prefer_cpu`: skip GPU detection and use the host backend.
/// - `out_instance`: receives the instance on success, null on failure.
///
/// Returns
/// - `Ok` (0) on success
/// - `NullPointer` if `out_instance` is null
/// - `InvalidGrid` if a dimension is zero or too large
/// - `InvalidParameter` if `variant` is unknown
/// - `ResourceExhausted` if the backend cannot hold the fields
///
/// # Safety
///
/// - `out_instance` must be a valid pointer to writable memory.
/// - The caller owns the returned instance and MUST call `fluid_sim_destroy` exactly once.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_new(
    width: u32,
    height: u32,
    variant: u32,
    prefer_cpu: bool,
    out_instance: *mut *mut FluidSimInstance,
) -> FluidSimErrorCode {
    if out_instance.is_null() {
        return track_error(&DefaultFluidSimError::null_pointer("out_instance"));
    }

    match track_result(FluidSimInstance::new(width, height, variant, prefer_cpu)) {
        Ok(instance) => {
            unsafe {
                *out_instance = Box::into_raw(instance);
            }
            FluidSimErrorCode::Ok
        }
        Err(code) => {
            unsafe {
                *out_instance = ptr::null_mut();
            }
            code
        }
    }
}

/// Destroys an instance previously created by `fluid_sim_new`.
///
/// Takes the write lock first, so a concurrent `fluid_sim_update` finishes
/// before the device buffers are released. A null `ptr` is a no-op.
///
/// # Safety
/// - The pointer MUST have been created by `fluid_sim_new` and not destroyed already.
/// - No other thread may start a new call on the pointer once this function is entered.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_destroy(ptr: *mut FluidSimInstance) {
    if ptr.is_null() {
        return;
    }

    // SAFETY: `ptr` came from `Box::into_raw` in `fluid_sim_new`
    let instance = unsafe { Box::from_raw(ptr) };
    match instance.sim.write() {
        Ok(mut sim) => sim.dispose(),
        Err(poisoned) => poisoned.into_inner().dispose(),
    }
    drop(instance);
}
