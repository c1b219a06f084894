//! Forcing terms: one-shot splats, continuous sources and smoke buoyancy

use super::ocean::IMPACT_DEPTH;
use super::{FieldKind, FieldSpec, FrameContext, SolverStage};
use crate::config::REFERENCE_FPS;
use crate::error::FluidError;
use crate::solver::Kernel;
use nalgebra::Vector2;

/// How a forcing event contributes to one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplatTarget {
    /// Adds the impulse vector
    Impulse(FieldKind),
    /// Adds the RGB colour
    Color(FieldKind),
    /// Adds the scalar payload to the first channel
    Scalar(FieldKind),
    /// Pushes the wave surface down in its vertical-velocity channel
    Impact(FieldKind),
}

impl SplatTarget {
    const fn kind(self) -> FieldKind {
        match self {
            Self::Impulse(kind) | Self::Color(kind) | Self::Scalar(kind) | Self::Impact(kind) => {
                kind
            }
        }
    }

    fn value(self, impulse: Vector2<f32>, color: [f32; 3], scalar: f32) -> [f32; 4] {
        match self {
            Self::Impulse(_) => [impulse.x, impulse.y, 0.0, 0.0],
            Self::Color(_) => [color[0], color[1], color[2], 0.0],
            Self::Scalar(_) => [scalar, 0.0, 0.0, 0.0],
            Self::Impact(_) => [0.0, -IMPACT_DEPTH * scalar, 0.0, 0.0],
        }
    }
}

fn target_specs(targets: &[SplatTarget]) -> Vec<FieldSpec> {
    targets.iter().map(|t| FieldSpec::of(t.kind())).collect()
}

/// Issue one Gaussian splat per target
fn inject(
    ctx: &mut FrameContext<'_>,
    stage: &'static str,
    targets: &[SplatTarget],
    position: Vector2<f32>,
    radius: f32,
    payload: impl Fn(SplatTarget) -> [f32; 4],
) -> Result<(), FluidError> {
    let aspect = ctx.grid.aspect_ratio();
    for &target in targets {
        let field = ctx.field(stage, target.kind())?;
        ctx.run(
            Kernel::Splat {
                target: field,
                point: [position.x, position.y],
                value: payload(target),
                radius,
                aspect,
            },
            field,
        )?;
    }
    Ok(())
}

/// Applies the splats dequeued for this frame, in arrival order
pub struct SplatForcing {
    targets: Vec<SplatTarget>,
}

impl SplatForcing {
    #[must_use]
    pub fn new(targets: Vec<SplatTarget>) -> Self {
        Self { targets }
    }

    /// Impulse into velocity and colour into dye
    #[must_use]
    pub fn dye() -> Self {
        Self::new(vec![
            SplatTarget::Impulse(FieldKind::Velocity),
            SplatTarget::Color(FieldKind::Density),
        ])
    }

    /// Dye plus heat into temperature
    #[must_use]
    pub fn smoke() -> Self {
        Self::new(vec![
            SplatTarget::Impulse(FieldKind::Velocity),
            SplatTarget::Color(FieldKind::Density),
            SplatTarget::Scalar(FieldKind::Temperature),
        ])
    }

    /// Impacts on the wave surface
    #[must_use]
    pub fn ocean() -> Self {
        Self::new(vec![SplatTarget::Impact(FieldKind::Height)])
    }
}

impl SolverStage for SplatForcing {
    fn name(&self) -> &'static str {
        "splat_forcing"
    }

    fn reads(&self) -> Vec<FieldSpec> {
        target_specs(&self.targets)
    }

    fn writes(&self) -> Vec<FieldSpec> {
        target_specs(&self.targets)
    }

    fn apply(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), FluidError> {
        let splats = ctx.splats;
        for splat in splats {
            inject(ctx, self.name(), &self.targets, splat.position, splat.radius, |t| {
                t.value(splat.impulse, splat.color, splat.scalar)
            })?;
        }
        Ok(())
    }
}

/// Re-applies every registered source each frame
///
/// A source's velocity, colour and temperature are injected per reference frame
/// and scaled by the frame length, so emission rate does not depend on frame rate.
pub struct SourceForcing {
    targets: Vec<SplatTarget>,
}

impl SourceForcing {
    #[must_use]
    pub fn new(targets: Vec<SplatTarget>) -> Self {
        Self { targets }
    }

    #[must_use]
    pub fn dye() -> Self {
        Self::new(SplatForcing::dye().targets)
    }

    #[must_use]
    pub fn smoke() -> Self {
        Self::new(SplatForcing::smoke().targets)
    }
}

impl SolverStage for SourceForcing {
    fn name(&self) -> &'static str {
        "source_forcing"
    }

    fn reads(&self) -> Vec<FieldSpec> {
        target_specs(&self.targets)
    }

    fn writes(&self) -> Vec<FieldSpec> {
        target_specs(&self.targets)
    }

    fn apply(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), FluidError> {
        let scale = ctx.dt * REFERENCE_FPS;
        let sources = ctx.sources;
        for source in sources {
            inject(ctx, self.name(), &self.targets, source.position, source.radius, |t| {
                t.value(source.velocity, source.color, source.temperature)
                    .map(|v| v * scale)
            })?;
        }
        Ok(())
    }
}

/// Smoke lift: hot cells rise, dense cells sink
pub struct Buoyancy;

impl SolverStage for Buoyancy {
    fn name(&self) -> &'static str {
        "buoyancy"
    }

    fn reads(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::of(FieldKind::Velocity),
            FieldSpec::of(FieldKind::Temperature),
            FieldSpec::of(FieldKind::Density),
        ]
    }

    fn writes(&self) -> Vec<FieldSpec> {
        vec![FieldSpec::of(FieldKind::Velocity)]
    }

    fn apply(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), FluidError> {
        let velocity = ctx.field(self.name(), FieldKind::Velocity)?;
        let temperature = ctx.field(self.name(), FieldKind::Temperature)?;
        let density = ctx.field(self.name(), FieldKind::Density)?;
        let config = ctx.config;
        ctx.run(
            Kernel::Buoyancy {
                velocity,
                temperature,
                density,
                dt: ctx.dt,
                kappa: config.buoyancy_kappa,
                sigma: config.buoyancy_sigma,
                ambient: config.ambient_temperature,
            },
            velocity,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::simulation::{Source, Splat};
    use crate::solver::FieldBackend;
    use crate::stages::test_support::setup;
    use approx::assert_relative_eq;

    #[test]
    fn test_splat_adds_to_existing_values() {
        let mut stage = SplatForcing::dye();
        let (mut backend, fields) = setup(16, 16, &[&stage]);
        let density = fields.get(FieldKind::Density).unwrap();
        backend.upload(density, &vec![0.5; 16 * 16 * 3]).unwrap();

        let splat = Splat::new(
            Vector2::new(0.5, 0.5),
            Vector2::new(1.0, 0.0),
            [1.0, 0.0, 0.0],
            0.2,
        );
        let config = SimConfig::default();
        let splats = [splat];
        let mut ctx = FrameContext::new(&mut backend, &fields, &config, 0.016, 0.0, &splats, &[]);
        stage.apply(&mut ctx).unwrap();

        let out = backend.read(density).unwrap();
        // Corner keeps its base value, centre gains nearly the full colour
        assert_relative_eq!(out[0], 0.5, epsilon = 1e-3);
        let centre = (8 * 16 + 8) * 3;
        assert!(out[centre] > 1.4);
        assert_relative_eq!(out[centre + 1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_sources_scale_with_frame_length() {
        let mut stage = SourceForcing::dye();
        let (mut backend, fields) = setup(8, 8, &[&stage]);
        let density = fields.get(FieldKind::Density).unwrap();

        let source = Source::new(Vector2::new(0.5, 0.5), [1.0, 1.0, 1.0], 0.2);
        let sources = [source];
        let config = SimConfig::default();
        let mut ctx = FrameContext::new(
            &mut backend,
            &fields,
            &config,
            0.5 / REFERENCE_FPS,
            0.0,
            &[],
            &sources,
        );
        stage.apply(&mut ctx).unwrap();
        let half: f32 = backend.read(density).unwrap().iter().sum();

        backend.clear(density).unwrap();
        let mut ctx = FrameContext::new(
            &mut backend,
            &fields,
            &config,
            1.0 / REFERENCE_FPS,
            0.0,
            &[],
            &sources,
        );
        stage.apply(&mut ctx).unwrap();
        let full: f32 = backend.read(density).unwrap().iter().sum();

        assert!(half > 0.0);
        assert_relative_eq!(full, 2.0 * half, epsilon = 1e-3);
    }

    #[test]
    fn test_buoyancy_lifts_hot_cells() {
        let mut stage = Buoyancy;
        let (mut backend, fields) = setup(4, 4, &[&stage]);
        let velocity = fields.get(FieldKind::Velocity).unwrap();
        let temperature = fields.get(FieldKind::Temperature).unwrap();
        backend.upload(temperature, &[2.0; 16]).unwrap();

        let config = SimConfig {
            buoyancy_kappa: 1.5,
            ambient_temperature: 0.5,
            ..SimConfig::default()
        };
        let mut ctx = FrameContext::new(&mut backend, &fields, &config, 0.1, 0.0, &[], &[]);
        stage.apply(&mut ctx).unwrap();

        let out = backend.read(velocity).unwrap();
        for cell in out.chunks_exact(2) {
            assert_relative_eq!(cell[0], 0.0);
            assert_relative_eq!(cell[1], 0.1 * 1.5 * 1.5, epsilon = 1e-6);
        }
    }
}
