//! Semi-Lagrangian advection

use super::{FieldKind, FieldSpec, FrameContext, SolverStage};
use crate::config::{decay_factor, SimConfig};
use crate::error::FluidError;
use crate::solver::Kernel;

/// Which configuration knob scales an advected field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dissipation {
    Velocity,
    Density,
    Temperature,
    /// Per reference frame, independent of configuration
    Fixed(f32),
}

impl Dissipation {
    fn per_frame(self, config: &SimConfig) -> f32 {
        match self {
            Self::Velocity => config.velocity_dissipation,
            Self::Density => config.density_dissipation,
            Self::Temperature => config.temperature_dissipation,
            Self::Fixed(value) => value,
        }
    }
}

/// Transports fields along the velocity field
///
/// Targets are advected in list order. When velocity is a target it is usually
/// listed first, so scalars are carried by the freshly self-advected velocity.
pub struct Advection {
    targets: Vec<(FieldKind, Dissipation)>,
}

impl Advection {
    #[must_use]
    pub fn new(targets: Vec<(FieldKind, Dissipation)>) -> Self {
        Self { targets }
    }

    /// Velocity and dye, as in the plain fluid pipeline
    #[must_use]
    pub fn velocity_and_dye() -> Self {
        Self::new(vec![
            (FieldKind::Velocity, Dissipation::Velocity),
            (FieldKind::Density, Dissipation::Density),
        ])
    }

    /// Velocity, dye and temperature
    #[must_use]
    pub fn smoke() -> Self {
        Self::new(vec![
            (FieldKind::Velocity, Dissipation::Velocity),
            (FieldKind::Density, Dissipation::Density),
            (FieldKind::Temperature, Dissipation::Temperature),
        ])
    }
}

impl SolverStage for Advection {
    fn name(&self) -> &'static str {
        "advection"
    }

    fn reads(&self) -> Vec<FieldSpec> {
        std::iter::once(FieldSpec::of(FieldKind::Velocity))
            .chain(self.targets.iter().map(|(kind, _)| FieldSpec::of(*kind)))
            .collect()
    }

    fn writes(&self) -> Vec<FieldSpec> {
        self.targets
            .iter()
            .map(|(kind, _)| FieldSpec::of(*kind))
            .collect()
    }

    fn apply(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), FluidError> {
        let velocity = ctx.field(self.name(), FieldKind::Velocity)?;
        for &(kind, dissipation) in &self.targets {
            let source = ctx.field(self.name(), kind)?;
            let factor = decay_factor(dissipation.per_frame(ctx.config), ctx.dt);
            ctx.run(
                Kernel::Advect {
                    velocity,
                    source,
                    dt: ctx.dt,
                    dissipation: factor,
                },
                source,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::FieldBackend;
    use crate::stages::test_support::setup;
    use approx::assert_relative_eq;

    #[test]
    fn test_still_fluid_only_dissipates() {
        let mut stage = Advection::velocity_and_dye();
        let (mut backend, fields) = setup(8, 8, &[&stage]);
        let density = fields.get(FieldKind::Density).unwrap();
        backend.upload(density, &vec![1.0; 8 * 8 * 3]).unwrap();

        let config = SimConfig::default();
        let dt = 1.0 / 60.0;
        let mut ctx = FrameContext::new(&mut backend, &fields, &config, dt, 0.0, &[], &[]);
        stage.apply(&mut ctx).unwrap();
        assert_eq!(ctx.passes(), 2);

        for value in backend.read(density).unwrap().iter() {
            assert_relative_eq!(*value, config.density_dissipation, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_uniform_flow_shifts_scalar_downstream() {
        let mut stage = Advection::new(vec![(FieldKind::Temperature, Dissipation::Fixed(1.0))]);
        let (mut backend, fields) = setup(8, 1, &[&stage]);
        let velocity = fields.get(FieldKind::Velocity).unwrap();
        let temperature = fields.get(FieldKind::Temperature).unwrap();

        // One cell per unit time to the right
        let mut flow = vec![0.0; 8 * 2];
        for cell in flow.chunks_exact_mut(2) {
            cell[0] = 1.0;
        }
        backend.upload(velocity, &flow).unwrap();
        let mut heat = vec![0.0; 8];
        heat[3] = 1.0;
        backend.upload(temperature, &heat).unwrap();

        let config = SimConfig::default();
        let mut ctx = FrameContext::new(&mut backend, &fields, &config, 1.0, 0.0, &[], &[]);
        stage.apply(&mut ctx).unwrap();

        let out = backend.read(temperature).unwrap();
        assert_relative_eq!(out[4], 1.0, epsilon = 1e-5);
        assert_relative_eq!(out[3], 0.0, epsilon = 1e-5);
    }
}
