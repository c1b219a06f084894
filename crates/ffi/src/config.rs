use fluid_sim_core::SimConfig;

use crate::error::{DefaultFluidSimError, FluidSimErrorCode};
use crate::helpers::{handle_ffi_result_error, instance_from_ptr, track_error, with_sim};
use crate::instance::FluidSimInstance;

/// C mirror of the engine configuration.
///
/// Decay factors are per 1/60 s reference frame. Out-of-range values are
/// clamped when applied, never rejected.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FluidSimConfig {
    pub velocity_dissipation: f32,
    pub density_dissipation: f32,
    pub temperature_dissipation: f32,
    pub pressure_iterations: u32,
    pub vorticity: f32,
    pub buoyancy_kappa: f32,
    pub buoyancy_sigma: f32,
    pub ambient_temperature: f32,
    pub splats_per_frame: usize,
    pub splat_queue_capacity: usize,
    pub splat_radius: f32,
    pub splat_force: f32,
    pub max_dt: f32,
    pub wave_damping: f32,
    pub wave_ambient_amplitude: f32,
    pub wave_ambient_wavenumber: f32,
    pub wave_ambient_frequency: f32,
    pub normal_strength: f32,
    pub foam_decay: f32,
    pub foam_threshold: f32,
    pub foam_growth: f32,
    pub brightness: f32,
    pub contrast: f32,
    pub gamma: f32,
}

impl From<&SimConfig> for FluidSimConfig {
    fn from(config: &SimConfig) -> Self {
        Self {
            velocity_dissipation: config.velocity_dissipation,
            density_dissipation: config.density_dissipation,
            temperature_dissipation: config.temperature_dissipation,
            pressure_iterations: config.pressure_iterations,
            vorticity: config.vorticity,
            buoyancy_kappa: config.buoyancy_kappa,
            buoyancy_sigma: config.buoyancy_sigma,
            ambient_temperature: config.ambient_temperature,
            splats_per_frame: config.splats_per_frame,
            splat_queue_capacity: config.splat_queue_capacity,
            splat_radius: config.splat_radius,
            splat_force: config.splat_force,
            max_dt: config.max_dt,
            wave_damping: config.wave_damping,
            wave_ambient_amplitude: config.wave_ambient_amplitude,
            wave_ambient_wavenumber: config.wave_ambient_wavenumber,
            wave_ambient_frequency: config.wave_ambient_frequency,
            normal_strength: config.normal_strength,
            foam_decay: config.foam_decay,
            foam_threshold: config.foam_threshold,
            foam_growth: config.foam_growth,
            brightness: config.brightness,
            contrast: config.contrast,
            gamma: config.gamma,
        }
    }
}

impl From<&FluidSimConfig> for SimConfig {
    fn from(config: &FluidSimConfig) -> Self {
        Self {
            velocity_dissipation: config.velocity_dissipation,
            density_dissipation: config.density_dissipation,
            temperature_dissipation: config.temperature_dissipation,
            pressure_iterations: config.pressure_iterations,
            vorticity: config.vorticity,
            buoyancy_kappa: config.buoyancy_kappa,
            buoyancy_sigma: config.buoyancy_sigma,
            ambient_temperature: config.ambient_temperature,
            splats_per_frame: config.splats_per_frame,
            splat_queue_capacity: config.splat_queue_capacity,
            splat_radius: config.splat_radius,
            splat_force: config.splat_force,
            max_dt: config.max_dt,
            wave_damping: config.wave_damping,
            wave_ambient_amplitude: config.wave_ambient_amplitude,
            wave_ambient_wavenumber: config.wave_ambient_wavenumber,
            wave_ambient_frequency: config.wave_ambient_frequency,
            normal_strength: config.normal_strength,
            foam_decay: config.foam_decay,
            foam_threshold: config.foam_threshold,
            foam_growth: config.foam_growth,
            brightness: config.brightness,
            contrast: config.contrast,
            gamma: config.gamma,
        }
    }
}

/// Write the default configuration into `out_config`.
///
/// # Safety
/// `out_config` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_default_config(out_config: *mut FluidSimConfig) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let out = unsafe { out_config.as_mut() }
            .ok_or_else(|| DefaultFluidSimError::null_pointer("out_config"))?;
        *out = FluidSimConfig::from(&SimConfig::default());
        Ok(())
    })
}

/// Read the active (clamped) configuration.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by `fluid_sim_new`.
/// `out_config` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_get_config(
    ptr: *const FluidSimInstance,
    out_config: *mut FluidSimConfig,
) -> FluidSimErrorCode {
    if out_config.is_null() {
        return track_error(&DefaultFluidSimError::null_pointer("out_config"));
    }

    handle_ffi_result_error(|| {
        let instance = unsafe { instance_from_ptr(ptr)? };
        let config = with_sim(instance, fluid_sim_core::Simulation::config)??;
        unsafe {
            *out_config = FluidSimConfig::from(&config);
        }
        Ok(())
    })
}

/// Replace the configuration; takes effect at the next `fluid_sim_update`.
///
/// Only takes the read lock, so it never waits for a frame in progress.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by `fluid_sim_new`.
/// `config` must point to a readable `FluidSimConfig`.
#[no_mangle]
pub unsafe extern "C" fn fluid_sim_set_config(
    ptr: *const FluidSimInstance,
    config: *const FluidSimConfig,
) -> FluidSimErrorCode {
    handle_ffi_result_error(|| {
        let instance = unsafe { instance_from_ptr(ptr)? };
        let config = unsafe { config.as_ref() }
            .ok_or_else(|| DefaultFluidSimError::null_pointer("config"))?;
        with_sim(instance, |sim| sim.set_config(SimConfig::from(config)))??;
        Ok(())
    })
}
