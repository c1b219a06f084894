//! Ocean surface stages
//!
//! The ocean replaces advection and projection with an explicit wave equation on
//! a two-channel field holding (height, vertical velocity). Normals and foam are
//! derived from it every frame for display.

use super::{FieldKind, FieldSpec, FrameContext, SolverStage};
use crate::config::decay_factor;
use crate::error::FluidError;
use crate::solver::Kernel;

/// Vertical velocity imparted by an impact with unit strength
pub const IMPACT_DEPTH: f32 = 0.1;

/// Damped wave equation with an optional travelling swell
pub struct WaveEquation;

impl SolverStage for WaveEquation {
    fn name(&self) -> &'static str {
        "wave"
    }

    fn reads(&self) -> Vec<FieldSpec> {
        vec![FieldSpec::of(FieldKind::Height)]
    }

    fn writes(&self) -> Vec<FieldSpec> {
        vec![FieldSpec::of(FieldKind::Height)]
    }

    fn apply(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), FluidError> {
        let height = ctx.field(self.name(), FieldKind::Height)?;
        let config = ctx.config;
        ctx.run(
            Kernel::Wave {
                height,
                dt: ctx.dt,
                damping: decay_factor(config.wave_damping, ctx.dt),
                amplitude: config.wave_ambient_amplitude,
                wavenumber: config.wave_ambient_wavenumber,
                frequency: config.wave_ambient_frequency,
                time: ctx.time,
            },
            height,
        )
    }
}

/// Surface normals from central differences of height
pub struct NormalReconstruction;

impl SolverStage for NormalReconstruction {
    fn name(&self) -> &'static str {
        "normals"
    }

    fn reads(&self) -> Vec<FieldSpec> {
        vec![FieldSpec::of(FieldKind::Height)]
    }

    fn writes(&self) -> Vec<FieldSpec> {
        vec![FieldSpec::of(FieldKind::Normals)]
    }

    fn apply(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), FluidError> {
        let height = ctx.field(self.name(), FieldKind::Height)?;
        let normals = ctx.field(self.name(), FieldKind::Normals)?;
        let strength = ctx.config.normal_strength;
        ctx.run(Kernel::Normals { height, strength }, normals)
    }
}

/// Foam that decays exponentially and grows where the source field is energetic
///
/// A `Height` source grows foam from vertical speed and slope; any other source
/// from the magnitude of its first two channels, (u, v) for smoke. Foam never
/// feeds back into physics.
pub struct FoamAccumulation {
    source: FieldKind,
}

impl FoamAccumulation {
    #[must_use]
    pub fn new(source: FieldKind) -> Self {
        Self { source }
    }
}

impl SolverStage for FoamAccumulation {
    fn name(&self) -> &'static str {
        "foam"
    }

    fn reads(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::of(FieldKind::Foam),
            FieldSpec::of(self.source),
        ]
    }

    fn writes(&self) -> Vec<FieldSpec> {
        vec![FieldSpec::of(FieldKind::Foam)]
    }

    fn apply(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), FluidError> {
        let foam = ctx.field(self.name(), FieldKind::Foam)?;
        let source = ctx.field(self.name(), self.source)?;
        let config = ctx.config;
        ctx.run(
            Kernel::Foam {
                foam,
                source,
                decay: decay_factor(config.foam_decay, ctx.dt),
                threshold: config.foam_threshold,
                growth: config.foam_growth,
                surface: self.source == FieldKind::Height,
            },
            foam,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::solver::FieldBackend;
    use crate::stages::test_support::setup;
    use approx::assert_relative_eq;

    #[test]
    fn test_flat_calm_surface_stays_flat() {
        let mut stage = WaveEquation;
        let (mut backend, fields) = setup(8, 8, &[&stage]);
        let height = fields.get(FieldKind::Height).unwrap();
        let config = SimConfig::default();
        let mut ctx = FrameContext::new(&mut backend, &fields, &config, 0.016, 3.0, &[], &[]);
        stage.apply(&mut ctx).unwrap();
        assert!(backend.read(height).unwrap().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_bump_spreads_to_neighbours() {
        let mut stage = WaveEquation;
        let (mut backend, fields) = setup(9, 9, &[&stage]);
        let height = fields.get(FieldKind::Height).unwrap();
        let mut surface = vec![0.0; 81 * 2];
        surface[(4 * 9 + 4) * 2] = 1.0;
        backend.upload(height, &surface).unwrap();

        let config = SimConfig {
            wave_damping: 1.0,
            ..SimConfig::default()
        };
        // One reference frame, so the stencil runs unscaled
        let mut ctx = FrameContext::new(&mut backend, &fields, &config, 1.0 / 60.0, 0.0, &[], &[]);
        stage.apply(&mut ctx).unwrap();

        let out = backend.read(height).unwrap();
        // Laplacian at the peak is -4, so it falls by 2; each neighbour rises by 0.5
        assert_relative_eq!(out[(4 * 9 + 4) * 2], -1.0, epsilon = 1e-6);
        assert_relative_eq!(out[(4 * 9 + 5) * 2], 0.5, epsilon = 1e-6);
        assert_relative_eq!(out[(3 * 9 + 4) * 2 + 1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_ambient_swell_moves_a_calm_surface() {
        let mut stage = WaveEquation;
        let (mut backend, fields) = setup(8, 8, &[&stage]);
        let height = fields.get(FieldKind::Height).unwrap();
        let config = SimConfig {
            wave_ambient_amplitude: 1.0,
            ..SimConfig::default()
        };
        let mut ctx = FrameContext::new(&mut backend, &fields, &config, 0.016, 0.4, &[], &[]);
        stage.apply(&mut ctx).unwrap();
        assert!(backend.read(height).unwrap().iter().any(|v| v.abs() > 1e-4));
    }

    #[test]
    fn test_flat_surface_normals_point_up() {
        let mut stage = NormalReconstruction;
        let (mut backend, fields) = setup(4, 4, &[&stage]);
        let normals = fields.get(FieldKind::Normals).unwrap();
        let config = SimConfig::default();
        let mut ctx = FrameContext::new(&mut backend, &fields, &config, 0.016, 0.0, &[], &[]);
        stage.apply(&mut ctx).unwrap();
        for n in backend.read(normals).unwrap().chunks_exact(3) {
            assert_eq!(n, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn test_foam_grows_above_threshold_and_stays_clamped() {
        let mut stage = FoamAccumulation::new(FieldKind::Height);
        let (mut backend, fields) = setup(2, 1, &[&stage]);
        let height = fields.get(FieldKind::Height).unwrap();
        let foam = fields.get(FieldKind::Foam).unwrap();
        // Left cell calm, right cell rising fast
        backend.upload(height, &[0.0, 0.0, 0.0, 5.0]).unwrap();

        let config = SimConfig::default();
        for _ in 0..3 {
            let mut ctx = FrameContext::new(&mut backend, &fields, &config, 0.016, 0.0, &[], &[]);
            stage.apply(&mut ctx).unwrap();
        }
        let out = backend.read(foam).unwrap();
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 1.0);
    }

    #[test]
    fn test_displaced_still_surface_grows_no_foam() {
        let mut stage = FoamAccumulation::new(FieldKind::Height);
        let (mut backend, fields) = setup(3, 1, &[&stage]);
        let height = fields.get(FieldKind::Height).unwrap();
        let foam = fields.get(FieldKind::Foam).unwrap();
        backend
            .upload(height, &[-0.4, 0.0, -0.4, 0.0, -0.4, 0.0])
            .unwrap();

        let config = SimConfig::default();
        let mut ctx = FrameContext::new(&mut backend, &fields, &config, 0.016, 0.0, &[], &[]);
        stage.apply(&mut ctx).unwrap();
        assert!(backend.read(foam).unwrap().iter().all(|f| *f == 0.0));
    }

    #[test]
    fn test_step_size_scales_with_dt() {
        let mut stage = WaveEquation;
        let (mut backend, fields) = setup(9, 9, &[&stage]);
        let height = fields.get(FieldKind::Height).unwrap();
        let mut surface = vec![0.0; 81 * 2];
        surface[(4 * 9 + 4) * 2] = 1.0;
        backend.upload(height, &surface).unwrap();

        let config = SimConfig {
            wave_damping: 1.0,
            ..SimConfig::default()
        };
        // Half a reference frame moves the neighbour a quarter as far
        let mut ctx = FrameContext::new(&mut backend, &fields, &config, 0.5 / 60.0, 0.0, &[], &[]);
        stage.apply(&mut ctx).unwrap();

        let out = backend.read(height).unwrap();
        assert_relative_eq!(out[(4 * 9 + 5) * 2], 0.125, epsilon = 1e-6);
        assert_relative_eq!(out[(4 * 9 + 5) * 2 + 1], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_damping_pulls_a_level_surface_back_to_rest() {
        let mut stage = WaveEquation;
        let (mut backend, fields) = setup(4, 4, &[&stage]);
        let height = fields.get(FieldKind::Height).unwrap();
        // Uniformly lowered and still sinking, as after an impact spreads out
        let surface: Vec<f32> = (0..16).flat_map(|_| [-0.5, -0.01]).collect();
        backend.upload(height, &surface).unwrap();

        let config = SimConfig::default();
        for _ in 0..4000 {
            let mut ctx = FrameContext::new(&mut backend, &fields, &config, 0.016, 0.0, &[], &[]);
            stage.apply(&mut ctx).unwrap();
        }
        let peak = backend
            .read(height)
            .unwrap()
            .iter()
            .fold(0.0_f32, |m, v| m.max(v.abs()));
        assert!(peak < 1e-3, "surface still displaced by {peak}");
    }
}
