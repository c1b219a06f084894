//! Vorticity confinement

use super::{FieldKind, FieldSpec, FrameContext, SolverStage};
use crate::error::FluidError;
use crate::solver::Kernel;

/// Re-injects small-scale rotation lost to numerical diffusion
///
/// Computes the curl of velocity, then pushes velocity along the rotated,
/// normalized gradient of `|curl|`. Does nothing when the configured strength
/// is not positive.
pub struct VorticityConfinement;

impl SolverStage for VorticityConfinement {
    fn name(&self) -> &'static str {
        "vorticity"
    }

    fn reads(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::of(FieldKind::Velocity),
            FieldSpec::of(FieldKind::Curl),
        ]
    }

    fn writes(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::of(FieldKind::Curl),
            FieldSpec::of(FieldKind::Velocity),
        ]
    }

    fn apply(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), FluidError> {
        let strength = ctx.config.vorticity;
        if strength <= 0.0 {
            return Ok(());
        }
        let velocity = ctx.field(self.name(), FieldKind::Velocity)?;
        let curl = ctx.field(self.name(), FieldKind::Curl)?;

        ctx.run(Kernel::Curl { velocity }, curl)?;
        ctx.run(
            Kernel::Vorticity {
                velocity,
                curl,
                strength,
                dt: ctx.dt,
            },
            velocity,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::solver::FieldBackend;
    use crate::stages::test_support::setup;

    fn swirl(width: usize, height: usize) -> Vec<f32> {
        let mut data = vec![0.0; width * height * 2];
        for y in 0..height {
            for x in 0..width {
                let dx = x as f32 - width as f32 / 2.0;
                let dy = y as f32 - height as f32 / 2.0;
                let falloff = (-(dx * dx + dy * dy) / 8.0).exp();
                let i = (y * width + x) * 2;
                data[i] = -dy * falloff;
                data[i + 1] = dx * falloff;
            }
        }
        data
    }

    #[test]
    fn test_disabled_when_strength_is_zero() {
        let mut stage = VorticityConfinement;
        let (mut backend, fields) = setup(8, 8, &[&stage]);
        let config = SimConfig {
            vorticity: 0.0,
            ..SimConfig::default()
        };
        let mut ctx = FrameContext::new(&mut backend, &fields, &config, 0.016, 0.0, &[], &[]);
        stage.apply(&mut ctx).unwrap();
        assert_eq!(ctx.passes(), 0);
    }

    #[test]
    fn test_uniform_flow_gets_no_force() {
        let mut stage = VorticityConfinement;
        let (mut backend, fields) = setup(8, 8, &[&stage]);
        let velocity = fields.get(FieldKind::Velocity).unwrap();
        let flow: Vec<f32> = std::iter::repeat([0.3, -0.2]).take(64).flatten().collect();
        backend.upload(velocity, &flow).unwrap();

        let config = SimConfig::default();
        let mut ctx = FrameContext::new(&mut backend, &fields, &config, 0.016, 0.0, &[], &[]);
        stage.apply(&mut ctx).unwrap();

        // Zero curl everywhere: the epsilon keeps the force finite and zero
        let out = backend.read(velocity).unwrap();
        for (a, b) in out.iter().zip(flow.iter()) {
            assert!(a.is_finite());
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_swirl_is_modified_and_stays_finite() {
        let mut stage = VorticityConfinement;
        let (mut backend, fields) = setup(16, 16, &[&stage]);
        let velocity = fields.get(FieldKind::Velocity).unwrap();
        let curl = fields.get(FieldKind::Curl).unwrap();
        let flow = swirl(16, 16);
        backend.upload(velocity, &flow).unwrap();

        let config = SimConfig::default();
        let mut ctx = FrameContext::new(&mut backend, &fields, &config, 0.016, 0.0, &[], &[]);
        stage.apply(&mut ctx).unwrap();

        // Counter-clockwise swirl has positive curl at the centre
        let c = backend.read(curl).unwrap()[8 * 16 + 8];
        assert!(c > 0.0);

        let out = backend.read(velocity).unwrap();
        assert!(out.iter().all(|v| v.is_finite()));
        let changed = out
            .iter()
            .zip(flow.iter())
            .any(|(a, b)| (a - b).abs() > 1e-4);
        assert!(changed);
    }
}
