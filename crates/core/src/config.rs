//! Simulation configuration
//!
//! `SimConfig` holds every tunable knob. Control collaborators (UI panels, FFI hosts)
//! mutate it through a [`SharedConfig`] handle; the engine snapshots it once at the
//! top of each frame so every stage in that frame sees the same values.

use crate::error::FluidError;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Frames per second the per-frame decay factors are expressed against
pub const REFERENCE_FPS: f32 = 60.0;

/// Smallest splat radius in normalized units
pub const MIN_SPLAT_RADIUS: f32 = 1e-4;

/// Lower bound for the `*_dissipation` factors
pub const MIN_DISSIPATION: f32 = 1e-3;

/// Upper bound on Jacobi iterations per frame
pub const MAX_PRESSURE_ITERATIONS: u32 = 200;

/// Upper bound on splats consumed per frame
pub const MAX_SPLATS_PER_FRAME: usize = 64;

/// Tunable simulation parameters
///
/// Decay factors (`*_dissipation`, `wave_damping`, `foam_decay`) are multiplicative
/// factors per 1/60 s reference frame; see [`decay_factor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Velocity dissipation (viscosity), in (0, 1]
    pub velocity_dissipation: f32,
    /// Dye density dissipation (diffusion), in (0, 1]
    pub density_dissipation: f32,
    /// Temperature dissipation, in (0, 1]
    pub temperature_dissipation: f32,
    /// Jacobi iterations for the pressure solve
    pub pressure_iterations: u32,
    /// Vorticity confinement strength; 0 disables the stage
    pub vorticity: f32,
    /// Buoyant lift per unit temperature above ambient
    pub buoyancy_kappa: f32,
    /// Downward pull per unit smoke density
    pub buoyancy_sigma: f32,
    /// Temperature that produces no lift
    pub ambient_temperature: f32,
    /// Pending splats consumed per frame
    pub splats_per_frame: usize,
    /// Maximum pending splats before `add_splat` is rejected
    pub splat_queue_capacity: usize,
    /// Radius used for pointer-driven splats, normalized units
    pub splat_radius: f32,
    /// Multiplier from pointer delta to velocity impulse
    pub splat_force: f32,
    /// Largest timestep a single frame may advance
    pub max_dt: f32,
    /// Ocean: velocity damping per step, in (0, 1]
    pub wave_damping: f32,
    /// Ocean: amplitude of the ambient swell forcing; 0 disables it
    pub wave_ambient_amplitude: f32,
    /// Ocean: spatial frequency of the swell, radians per unit length
    pub wave_ambient_wavenumber: f32,
    /// Ocean: temporal frequency of the swell, radians per second
    pub wave_ambient_frequency: f32,
    /// Ocean: height-gradient scale used when rebuilding normals
    pub normal_strength: f32,
    /// Foam decay per reference frame, in [0, 1]
    pub foam_decay: f32,
    /// Local energy above which foam starts accumulating
    pub foam_threshold: f32,
    /// Foam growth rate per unit of excess energy
    pub foam_growth: f32,
    /// Display brightness multiplier
    pub brightness: f32,
    /// Display contrast around mid-grey
    pub contrast: f32,
    /// Display gamma
    pub gamma: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            velocity_dissipation: 0.98,
            density_dissipation: 0.97,
            temperature_dissipation: 0.96,
            pressure_iterations: 20,
            vorticity: 30.0,
            buoyancy_kappa: 1.0,
            buoyancy_sigma: 0.05,
            ambient_temperature: 0.0,
            splats_per_frame: 5,
            splat_queue_capacity: 1024,
            splat_radius: 0.025,
            splat_force: 6000.0,
            max_dt: 0.016,
            wave_damping: 0.995,
            wave_ambient_amplitude: 0.0,
            wave_ambient_wavenumber: 12.0,
            wave_ambient_frequency: 1.5,
            normal_strength: 8.0,
            foam_decay: 0.96,
            foam_threshold: 0.05,
            foam_growth: 0.5,
            brightness: 1.0,
            contrast: 1.0,
            gamma: 2.2,
        }
    }
}

fn clamp_logged(name: &'static str, value: f32, min: f32, max: f32) -> f32 {
    // NaN falls back to the lower bound
    let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
    if clamped != value {
        warn!("Config {} = {} out of range, clamped to {}", name, value, clamped);
    }
    clamped
}

fn clamp_count_logged<T>(name: &'static str, value: T, min: T, max: T) -> T
where
    T: Ord + Copy + std::fmt::Display,
{
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!("Config {} = {} out of range, clamped to {}", name, value, clamped);
    }
    clamped
}

impl SimConfig {
    /// Return a copy with every knob clamped into its valid range
    ///
    /// Out-of-range values are clamped silently from the caller's point of view
    /// (a `warn!` is logged), never rejected.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let splats_per_frame =
            clamp_count_logged("splats_per_frame", self.splats_per_frame, 1, MAX_SPLATS_PER_FRAME);
        Self {
            velocity_dissipation: clamp_logged(
                "velocity_dissipation",
                self.velocity_dissipation,
                MIN_DISSIPATION,
                1.0,
            ),
            density_dissipation: clamp_logged(
                "density_dissipation",
                self.density_dissipation,
                MIN_DISSIPATION,
                1.0,
            ),
            temperature_dissipation: clamp_logged(
                "temperature_dissipation",
                self.temperature_dissipation,
                MIN_DISSIPATION,
                1.0,
            ),
            pressure_iterations: clamp_count_logged(
                "pressure_iterations",
                self.pressure_iterations,
                0,
                MAX_PRESSURE_ITERATIONS,
            ),
            vorticity: clamp_logged("vorticity", self.vorticity, 0.0, 1000.0),
            buoyancy_kappa: clamp_logged("buoyancy_kappa", self.buoyancy_kappa, -100.0, 100.0),
            buoyancy_sigma: clamp_logged("buoyancy_sigma", self.buoyancy_sigma, -100.0, 100.0),
            ambient_temperature: clamp_logged(
                "ambient_temperature",
                self.ambient_temperature,
                -1000.0,
                1000.0,
            ),
            splats_per_frame,
            splat_queue_capacity: self.splat_queue_capacity.max(splats_per_frame),
            splat_radius: clamp_logged("splat_radius", self.splat_radius, MIN_SPLAT_RADIUS, 1.0),
            splat_force: clamp_logged("splat_force", self.splat_force, 0.0, 1.0e6),
            max_dt: clamp_logged("max_dt", self.max_dt, 1.0e-4, 0.1),
            wave_damping: clamp_logged("wave_damping", self.wave_damping, 0.0, 1.0),
            wave_ambient_amplitude: clamp_logged(
                "wave_ambient_amplitude",
                self.wave_ambient_amplitude,
                0.0,
                1.0,
            ),
            wave_ambient_wavenumber: clamp_logged(
                "wave_ambient_wavenumber",
                self.wave_ambient_wavenumber,
                0.0,
                1000.0,
            ),
            wave_ambient_frequency: clamp_logged(
                "wave_ambient_frequency",
                self.wave_ambient_frequency,
                0.0,
                1000.0,
            ),
            normal_strength: clamp_logged("normal_strength", self.normal_strength, 0.0, 1000.0),
            foam_decay: clamp_logged("foam_decay", self.foam_decay, 0.0, 1.0),
            foam_threshold: clamp_logged("foam_threshold", self.foam_threshold, 0.0, 1000.0),
            foam_growth: clamp_logged("foam_growth", self.foam_growth, 0.0, 1000.0),
            brightness: clamp_logged("brightness", self.brightness, 0.0, 100.0),
            contrast: clamp_logged("contrast", self.contrast, 0.0, 10.0),
            gamma: clamp_logged("gamma", self.gamma, 0.1, 10.0),
        }
    }
}

/// Convert a per-reference-frame decay factor into the factor for `dt` seconds
///
/// `decay_factor(f, 1/60) == f` and `decay_factor(f, 0) == 1`.
#[must_use]
pub fn decay_factor(per_frame: f32, dt: f32) -> f32 {
    per_frame.max(0.0).powf(dt * REFERENCE_FPS)
}

/// Shared, last-write-wins configuration handle
///
/// Writers (input handling, control panels) replace or edit the configuration at
/// any time; the engine only ever observes complete values through [`snapshot`].
///
/// [`snapshot`]: SharedConfig::snapshot
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<SimConfig>>,
}

impl SharedConfig {
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Replace the whole configuration
    ///
    /// # Errors
    ///
    /// Returns `FluidError::ConfigLockPoisoned` if a writer panicked while holding the lock.
    pub fn set(&self, config: SimConfig) -> Result<(), FluidError> {
        let mut guard = self.inner.write().map_err(|_| FluidError::ConfigLockPoisoned)?;
        *guard = config;
        Ok(())
    }

    /// Edit the configuration in place; the edit is applied atomically
    ///
    /// # Errors
    ///
    /// Returns `FluidError::ConfigLockPoisoned` if a writer panicked while holding the lock.
    pub fn update<F>(&self, edit: F) -> Result<(), FluidError>
    where
        F: FnOnce(&mut SimConfig),
    {
        let mut guard = self.inner.write().map_err(|_| FluidError::ConfigLockPoisoned)?;
        edit(&mut guard);
        Ok(())
    }

    /// Capture a sanitized copy for one frame
    ///
    /// # Errors
    ///
    /// Returns `FluidError::ConfigLockPoisoned` if a writer panicked while holding the lock.
    pub fn snapshot(&self) -> Result<SimConfig, FluidError> {
        let guard = self.inner.read().map_err(|_| FluidError::ConfigLockPoisoned)?;
        Ok(guard.sanitized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_within_observed_ranges() {
        let config = SimConfig::default();
        assert!((3..=5).contains(&config.splats_per_frame));
        assert!((20..=30).contains(&config.pressure_iterations));
        assert_eq!(config.sanitized(), config);
    }

    #[test]
    fn test_sanitize_clamps_known_ranges() {
        let config = SimConfig {
            splat_radius: -1.0,
            velocity_dissipation: 1.5,
            pressure_iterations: 10_000,
            splats_per_frame: 0,
            gamma: f32::NAN,
            ..SimConfig::default()
        }
        .sanitized();

        assert_eq!(config.splat_radius, MIN_SPLAT_RADIUS);
        assert_eq!(config.velocity_dissipation, 1.0);
        assert_eq!(config.pressure_iterations, MAX_PRESSURE_ITERATIONS);
        assert_eq!(config.splats_per_frame, 1);
        assert_eq!(config.gamma, 0.1);
    }

    #[test]
    fn test_dissipation_never_clamps_to_zero() {
        let config = SimConfig {
            velocity_dissipation: 0.0,
            density_dissipation: -3.0,
            temperature_dissipation: f32::NAN,
            ..SimConfig::default()
        }
        .sanitized();

        assert_eq!(config.velocity_dissipation, MIN_DISSIPATION);
        assert_eq!(config.density_dissipation, MIN_DISSIPATION);
        assert_eq!(config.temperature_dissipation, MIN_DISSIPATION);
        assert!(decay_factor(config.velocity_dissipation, 0.016) > 0.0);
    }

    #[test]
    fn test_count_knobs_clamp_like_float_knobs() {
        assert_eq!(clamp_count_logged("pressure_iterations", 500_u32, 0, 200), 200);
        assert_eq!(clamp_count_logged("pressure_iterations", 0_u32, 0, 200), 0);
        assert_eq!(clamp_count_logged("splats_per_frame", 0_usize, 1, 64), 1);
        assert_eq!(clamp_count_logged("splats_per_frame", 7_usize, 1, 64), 7);
    }

    #[test]
    fn test_decay_factor_reference_frame() {
        assert_relative_eq!(decay_factor(0.9, 1.0 / 60.0), 0.9, epsilon = 1e-6);
        assert_eq!(decay_factor(0.9, 0.0), 1.0);
        assert_relative_eq!(decay_factor(0.9, 2.0 / 60.0), 0.81, epsilon = 1e-5);
    }

    #[test]
    fn test_shared_config_last_write_wins() {
        let shared = SharedConfig::new(SimConfig::default());
        let handle = shared.clone();

        handle.update(|c| c.vorticity = 5.0).unwrap();
        handle.update(|c| c.vorticity = 12.0).unwrap();

        assert_eq!(shared.snapshot().unwrap().vorticity, 12.0);
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: SimConfig = serde_json::from_str(r#"{ "pressure_iterations": 25 }"#).unwrap();
        assert_eq!(config.pressure_iterations, 25);
        assert_eq!(config.vorticity, SimConfig::default().vorticity);
    }
}
