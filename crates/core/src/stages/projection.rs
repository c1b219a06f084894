//! Pressure projection
//!
//! Divergence, then a fixed number of Jacobi sweeps of the pressure Poisson
//! equation starting from zero pressure, then gradient subtraction. Each sweep
//! swaps the pressure pair, so gradient subtraction sees the last sweep.

use super::{FieldKind, FieldSpec, FrameContext, SolverStage};
use crate::error::FluidError;
use crate::solver::Kernel;

/// Makes velocity approximately divergence-free
pub struct Projection {
    /// Overrides the configured iteration count when set
    iterations: Option<u32>,
}

impl Projection {
    #[must_use]
    pub fn new() -> Self {
        Self { iterations: None }
    }

    /// Fixed iteration count, ignoring configuration
    #[must_use]
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: Some(iterations),
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::new()
    }
}

impl SolverStage for Projection {
    fn name(&self) -> &'static str {
        "projection"
    }

    fn reads(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::of(FieldKind::Velocity),
            FieldSpec::of(FieldKind::Divergence),
            FieldSpec::of(FieldKind::Pressure),
        ]
    }

    fn writes(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::of(FieldKind::Divergence),
            FieldSpec::of(FieldKind::Pressure),
            FieldSpec::of(FieldKind::Velocity),
        ]
    }

    fn apply(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), FluidError> {
        let velocity = ctx.field(self.name(), FieldKind::Velocity)?;
        let divergence = ctx.field(self.name(), FieldKind::Divergence)?;
        let pressure = ctx.field(self.name(), FieldKind::Pressure)?;
        let iterations = self.iterations.unwrap_or(ctx.config.pressure_iterations);

        ctx.run(Kernel::Divergence { velocity }, divergence)?;
        ctx.clear(pressure)?;
        for _ in 0..iterations {
            ctx.run(
                Kernel::Jacobi {
                    pressure,
                    divergence,
                },
                pressure,
            )?;
        }
        ctx.run(Kernel::GradientSubtract { pressure, velocity }, velocity)
    }
}
