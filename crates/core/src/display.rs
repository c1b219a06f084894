//! Display mapping
//!
//! The terminal transform of every pipeline. [`DisplayStage`] tone-maps the
//! chosen field(s) into the four-channel `Display` field; [`to_rgba8`] converts a
//! read-back display field into bytes for presentation. Nothing here feeds back
//! into the simulation.

use crate::error::FluidError;
use crate::solver::Kernel;
use crate::stages::{FieldKind, FieldSpec, FrameContext, SolverStage};
use serde::{Deserialize, Serialize};

/// What the display stage renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplayMode {
    /// RGB dye density
    #[default]
    Dye,
    /// Smoke dye brightened by foam
    Smoke,
    /// Shaded water from height, normals and foam
    Ocean,
}

/// Writes the `Display` field from the current simulation state
pub struct DisplayStage {
    mode: DisplayMode,
}

impl DisplayStage {
    #[must_use]
    pub fn new(mode: DisplayMode) -> Self {
        Self { mode }
    }

    #[must_use]
    pub fn mode(&self) -> DisplayMode {
        self.mode
    }
}

impl SolverStage for DisplayStage {
    fn name(&self) -> &'static str {
        "display"
    }

    fn reads(&self) -> Vec<FieldSpec> {
        match self.mode {
            DisplayMode::Dye => vec![FieldSpec::of(FieldKind::Density)],
            DisplayMode::Smoke => vec![
                FieldSpec::of(FieldKind::Density),
                FieldSpec::of(FieldKind::Foam),
            ],
            DisplayMode::Ocean => vec![
                FieldSpec::of(FieldKind::Height),
                FieldSpec::of(FieldKind::Normals),
                FieldSpec::of(FieldKind::Foam),
            ],
        }
    }

    fn writes(&self) -> Vec<FieldSpec> {
        vec![FieldSpec::of(FieldKind::Display)]
    }

    fn apply(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), FluidError> {
        let display = ctx.field(self.name(), FieldKind::Display)?;
        let config = ctx.config;
        let kernel = match self.mode {
            DisplayMode::Dye => Kernel::DisplayDye {
                dye: ctx.field(self.name(), FieldKind::Density)?,
                brightness: config.brightness,
                contrast: config.contrast,
                gamma: config.gamma,
            },
            DisplayMode::Smoke => Kernel::DisplaySmoke {
                dye: ctx.field(self.name(), FieldKind::Density)?,
                foam: ctx.field(self.name(), FieldKind::Foam)?,
                brightness: config.brightness,
                contrast: config.contrast,
                gamma: config.gamma,
            },
            DisplayMode::Ocean => Kernel::DisplayOcean {
                height: ctx.field(self.name(), FieldKind::Height)?,
                normals: ctx.field(self.name(), FieldKind::Normals)?,
                foam: ctx.field(self.name(), FieldKind::Foam)?,
                brightness: config.brightness,
                contrast: config.contrast,
                gamma: config.gamma,
            },
        };
        ctx.run(kernel, display)
    }
}

/// Quantize a display field (RGBA floats in [0, 1]) to bytes
#[must_use]
pub fn to_rgba8(display: &[f32]) -> Vec<u8> {
    display
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect()
}
