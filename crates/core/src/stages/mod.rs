//! Solver stages
//!
//! A stage is one step of the per-frame pipeline (advection, forcing, projection,
//! ...). Stages never touch buffers directly: they look up the fields they need in
//! a [`FieldSet`] and issue [`Kernel`] passes through the [`FrameContext`]. The
//! engine derives field allocation from the stages' declared reads and writes, so
//! a new variant is just a new list of stages.

mod advection;
mod forcing;
mod ocean;
mod projection;
mod vorticity;

pub use advection::{Advection, Dissipation};
pub use forcing::{Buoyancy, SourceForcing, SplatForcing, SplatTarget};
pub use ocean::{FoamAccumulation, NormalReconstruction, WaveEquation, IMPACT_DEPTH};
pub use projection::Projection;
pub use vorticity::VorticityConfinement;

use crate::config::SimConfig;
use crate::error::FluidError;
use crate::grid::Grid;
use crate::simulation::{Source, Splat};
use crate::solver::{FieldBackend, FieldHandle, Kernel, KernelPass};
use rustc_hash::FxHashMap;

/// Named simulation quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKind {
    /// 2D velocity (u, v)
    Velocity,
    /// RGB dye density
    Density,
    Temperature,
    Pressure,
    Divergence,
    /// Scalar vorticity
    Curl,
    /// Wave surface: (height, vertical velocity)
    Height,
    /// Surface normal (x, y, z)
    Normals,
    Foam,
    /// Tone-mapped RGBA image
    Display,
}

impl FieldKind {
    pub const ALL: [Self; 10] = [
        Self::Velocity,
        Self::Density,
        Self::Temperature,
        Self::Pressure,
        Self::Divergence,
        Self::Curl,
        Self::Height,
        Self::Normals,
        Self::Foam,
        Self::Display,
    ];

    /// Channel count the built-in stages use for this quantity
    #[must_use]
    pub const fn channels(self) -> u32 {
        match self {
            Self::Velocity | Self::Height => 2,
            Self::Density | Self::Normals => 3,
            Self::Display => 4,
            Self::Temperature | Self::Pressure | Self::Divergence | Self::Curl | Self::Foam => 1,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Velocity => "velocity",
            Self::Density => "density",
            Self::Temperature => "temperature",
            Self::Pressure => "pressure",
            Self::Divergence => "divergence",
            Self::Curl => "curl",
            Self::Height => "height",
            Self::Normals => "normals",
            Self::Foam => "foam",
            Self::Display => "display",
        }
    }

    /// Stable numeric id used across the C ABI
    #[must_use]
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

/// A field a stage reads or writes, with its per-cell layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub channels: u32,
}

impl FieldSpec {
    /// The default layout for `kind`
    #[must_use]
    pub const fn of(kind: FieldKind) -> Self {
        Self {
            kind,
            channels: kind.channels(),
        }
    }
}

/// Registry of allocated fields by quantity
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    handles: FxHashMap<FieldKind, (FieldHandle, u32)>,
}

impl FieldSet {
    /// Build the union of `specs`, rejecting the same quantity at two layouts
    ///
    /// # Errors
    ///
    /// Returns `FluidError::FieldLayoutConflict` when two specs disagree on the
    /// channel count of one quantity.
    pub fn resolve_layout<I>(specs: I) -> Result<Vec<FieldSpec>, FluidError>
    where
        I: IntoIterator<Item = FieldSpec>,
    {
        let mut layout: FxHashMap<FieldKind, u32> = FxHashMap::default();
        for spec in specs {
            match layout.get(&spec.kind) {
                Some(&existing) if existing != spec.channels => {
                    return Err(FluidError::FieldLayoutConflict {
                        field: spec.kind.name(),
                        existing,
                        requested: spec.channels,
                    });
                }
                Some(_) => {}
                None => {
                    layout.insert(spec.kind, spec.channels);
                }
            }
        }
        let mut specs: Vec<FieldSpec> = layout
            .into_iter()
            .map(|(kind, channels)| FieldSpec { kind, channels })
            .collect();
        specs.sort_by_key(|spec| spec.kind);
        Ok(specs)
    }

    /// Allocate every spec on `backend`
    ///
    /// # Errors
    ///
    /// Propagates allocation failures from the backend.
    pub fn allocate(backend: &mut dyn FieldBackend, specs: &[FieldSpec]) -> Result<Self, FluidError> {
        let mut set = Self::default();
        for spec in specs {
            let handle = backend.allocate(spec.kind.name(), spec.channels)?;
            set.handles.insert(spec.kind, (handle, spec.channels));
        }
        Ok(set)
    }

    #[must_use]
    pub fn get(&self, kind: FieldKind) -> Option<FieldHandle> {
        self.handles.get(&kind).map(|&(handle, _)| handle)
    }

    #[must_use]
    pub fn channels(&self, kind: FieldKind) -> Option<u32> {
        self.handles.get(&kind).map(|&(_, channels)| channels)
    }

    #[must_use]
    pub fn contains(&self, kind: FieldKind) -> bool {
        self.handles.contains_key(&kind)
    }

    /// Allocated quantities in a stable order
    pub fn kinds(&self) -> impl Iterator<Item = FieldKind> + '_ {
        FieldKind::ALL.into_iter().filter(|kind| self.contains(*kind))
    }

    pub fn handles(&self) -> impl Iterator<Item = FieldHandle> + '_ {
        self.handles.values().map(|&(handle, _)| handle)
    }
}

/// Everything a stage may touch during one frame
///
/// The configuration is the frame's snapshot; it cannot change while stages run.
pub struct FrameContext<'a> {
    pub backend: &'a mut dyn FieldBackend,
    pub fields: &'a FieldSet,
    pub config: &'a SimConfig,
    pub grid: Grid,
    /// Clamped frame delta in seconds
    pub dt: f32,
    /// Simulated time at the start of the frame
    pub time: f32,
    /// Splats dequeued for this frame, in arrival order
    pub splats: &'a [Splat],
    pub sources: &'a [Source],
    passes: usize,
}

impl<'a> FrameContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: &'a mut dyn FieldBackend,
        fields: &'a FieldSet,
        config: &'a SimConfig,
        dt: f32,
        time: f32,
        splats: &'a [Splat],
        sources: &'a [Source],
    ) -> Self {
        let grid = backend.grid();
        Self {
            backend,
            fields,
            config,
            grid,
            dt,
            time,
            splats,
            sources,
            passes: 0,
        }
    }

    /// Handle for `kind`, or `MissingField` naming the asking stage
    ///
    /// # Errors
    ///
    /// Returns `FluidError::MissingField` if `kind` was never allocated.
    pub fn field(&self, stage: &'static str, kind: FieldKind) -> Result<FieldHandle, FluidError> {
        self.fields.get(kind).ok_or(FluidError::MissingField {
            stage,
            field: kind.name(),
        })
    }

    /// Dispatch one pass writing `output`
    ///
    /// # Errors
    ///
    /// Propagates backend dispatch failures.
    pub fn run(&mut self, kernel: Kernel, output: FieldHandle) -> Result<(), FluidError> {
        self.backend.dispatch(&KernelPass::new(kernel, output))?;
        self.passes += 1;
        Ok(())
    }

    /// Zero both halves of a field
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn clear(&mut self, field: FieldHandle) -> Result<(), FluidError> {
        self.backend.clear(field)
    }

    /// Passes dispatched so far this frame
    #[must_use]
    pub fn passes(&self) -> usize {
        self.passes
    }
}

/// One step of the frame pipeline
pub trait SolverStage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fields read by [`apply`](Self::apply)
    fn reads(&self) -> Vec<FieldSpec>;

    /// Fields written by [`apply`](Self::apply)
    fn writes(&self) -> Vec<FieldSpec>;

    /// Issue this stage's passes for the current frame
    ///
    /// # Errors
    ///
    /// Returns `FluidError::MissingField` when a declared field is absent, or any
    /// backend error raised by a pass.
    fn apply(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), FluidError>;
}
