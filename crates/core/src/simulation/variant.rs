//! Scene presets
//!
//! Every variant is only a list of stages over the shared field machinery.

use crate::display::{DisplayMode, DisplayStage};
use crate::stages::{
    Advection, Buoyancy, FieldKind, FoamAccumulation, NormalReconstruction, Projection,
    SolverStage, SourceForcing, SplatForcing, VorticityConfinement, WaveEquation,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Variant {
    /// Dye in an incompressible fluid with vorticity confinement
    #[default]
    Fluid,
    /// Coloured smoke with buoyancy and velocity-driven foam
    Smoke,
    /// Wave-equation water surface with normals and foam
    Ocean,
    /// Advection, splats and projection only
    TestRig,
}

impl Variant {
    pub const ALL: [Self; 4] = [Self::Fluid, Self::Smoke, Self::Ocean, Self::TestRig];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fluid => "fluid",
            Self::Smoke => "smoke",
            Self::Ocean => "ocean",
            Self::TestRig => "test-rig",
        }
    }

    /// Stable numeric id used across the C ABI
    #[must_use]
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Stage order for one frame
    #[must_use]
    pub fn stages(self) -> Vec<Box<dyn SolverStage>> {
        match self {
            Self::Fluid => vec![
                Box::new(Advection::velocity_and_dye()),
                Box::new(SplatForcing::dye()),
                Box::new(SourceForcing::dye()),
                Box::new(VorticityConfinement),
                Box::new(Projection::new()),
                Box::new(DisplayStage::new(DisplayMode::Dye)),
            ],
            Self::Smoke => vec![
                Box::new(Buoyancy),
                Box::new(Advection::smoke()),
                Box::new(SplatForcing::smoke()),
                Box::new(SourceForcing::smoke()),
                Box::new(VorticityConfinement),
                Box::new(Projection::new()),
                Box::new(FoamAccumulation::new(FieldKind::Velocity)),
                Box::new(DisplayStage::new(DisplayMode::Smoke)),
            ],
            Self::Ocean => vec![
                Box::new(SplatForcing::ocean()),
                Box::new(WaveEquation),
                Box::new(NormalReconstruction),
                Box::new(FoamAccumulation::new(FieldKind::Height)),
                Box::new(DisplayStage::new(DisplayMode::Ocean)),
            ],
            Self::TestRig => vec![
                Box::new(Advection::velocity_and_dye()),
                Box::new(SplatForcing::dye()),
                Box::new(Projection::new()),
                Box::new(DisplayStage::new(DisplayMode::Dye)),
            ],
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|variant| variant.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown variant '{s}'"))
    }
}
