//! Simulation engine
//!
//! [`Simulation`] owns the backend, every field pair, the stage list and the
//! forcing state. One [`update`](Simulation::update) runs the whole stage list
//! synchronously against a single configuration snapshot.

pub mod diagnostics;
mod splat;
mod variant;

pub use splat::{
    random_color, random_splat, PointerInput, Source, SourceId, SourceRegistry, Splat, SplatQueue,
};
pub use variant::Variant;

use crate::config::{SharedConfig, SimConfig};
use crate::error::FluidError;
use crate::grid::Grid;
use crate::solver::{create_backend, BackendPreference, FieldBackend, FrameTimer, ProfilerScope};
use crate::stages::{FieldKind, FieldSet, FrameContext, SolverStage};
use std::borrow::Cow;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Live,
    /// A frame failed after at least one buffer swap; only `reset()` recovers
    NeedsReset,
    /// Resources released; every call fails
    Disposed,
}

/// Snapshot of engine counters and field diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationStats {
    pub frame: u64,
    /// Simulated seconds since construction or the last reset
    pub time: f32,
    pub backend: &'static str,
    pub gpu_accelerated: bool,
    pub pending_splats: usize,
    pub active_sources: usize,
    /// Sum of all dye channels, zero without a dye field
    pub total_density: f32,
    /// Largest velocity magnitude, zero without a velocity field
    pub peak_velocity: f32,
    pub mean_abs_divergence: f32,
    pub last_frame_ms: f64,
    /// Exponentially smoothed frame cost
    pub average_frame_ms: f64,
}

/// Real-time 2D fluid simulation
pub struct Simulation {
    backend: Box<dyn FieldBackend>,
    fields: FieldSet,
    stages: Vec<Box<dyn SolverStage>>,
    config: SharedConfig,
    splats: SplatQueue,
    sources: SourceRegistry,
    grid: Grid,
    variant: Option<Variant>,
    frame: u64,
    time: f32,
    state: EngineState,
    timer: FrameTimer,
}

impl Simulation {
    /// Create a simulation for one of the preset variants
    ///
    /// # Errors
    ///
    /// Returns `FluidError::ResourceExhausted` if the backend cannot hold every
    /// field the variant needs. No partially constructed engine is returned.
    pub fn new(
        grid: Grid,
        variant: Variant,
        config: SimConfig,
        preference: BackendPreference,
    ) -> Result<Self, FluidError> {
        let mut sim = Self::with_stages(grid, variant.stages(), config, preference)?;
        sim.variant = Some(variant);
        info!("Simulation variant: {}", variant);
        Ok(sim)
    }

    /// Create a simulation running a custom stage list
    ///
    /// Fields are allocated from the union of the stages' declared reads and writes.
    ///
    /// # Errors
    ///
    /// Returns `FluidError::FieldLayoutConflict` if two stages disagree on a
    /// field's layout, or any backend creation/allocation error.
    pub fn with_stages(
        grid: Grid,
        stages: Vec<Box<dyn SolverStage>>,
        config: SimConfig,
        preference: BackendPreference,
    ) -> Result<Self, FluidError> {
        let backend = create_backend(grid, preference)?;
        Self::with_backend(backend, stages, config)
    }

    /// Create a simulation on an existing backend
    ///
    /// # Errors
    ///
    /// As [`with_stages`](Self::with_stages).
    pub fn with_backend(
        mut backend: Box<dyn FieldBackend>,
        stages: Vec<Box<dyn SolverStage>>,
        config: SimConfig,
    ) -> Result<Self, FluidError> {
        let grid = backend.grid();
        let config = config.sanitized();

        let specs = FieldSet::resolve_layout(
            stages
                .iter()
                .flat_map(|stage| stage.reads().into_iter().chain(stage.writes())),
        )?;
        let fields = FieldSet::allocate(backend.as_mut(), &specs)?;

        info!(
            "Simulation initialized: {}x{} grid, {} fields, {} stages, backend={}",
            grid.width(),
            grid.height(),
            specs.len(),
            stages.len(),
            backend.name()
        );

        Ok(Self {
            backend,
            fields,
            stages,
            splats: SplatQueue::new(config.splat_queue_capacity),
            config: SharedConfig::new(config),
            sources: SourceRegistry::default(),
            grid,
            variant: None,
            frame: 0,
            time: 0.0,
            state: EngineState::Live,
            timer: FrameTimer::new(),
        })
    }

    fn ensure_live(&self) -> Result<(), FluidError> {
        match self.state {
            EngineState::Live => Ok(()),
            EngineState::NeedsReset => Err(FluidError::NeedsReset),
            EngineState::Disposed => Err(FluidError::Disposed),
        }
    }

    fn ensure_not_disposed(&self) -> Result<(), FluidError> {
        if self.state == EngineState::Disposed {
            Err(FluidError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Advance the simulation by one frame
    ///
    /// `dt` is clamped to the configured `max_dt`. A zero `dt` is a no-op frame:
    /// fields are unchanged and queued splats stay queued.
    ///
    /// # Errors
    ///
    /// - `FluidError::InvalidTimestep` for negative or non-finite `dt` (nothing changes)
    /// - `FluidError::NeedsReset` / `FluidError::Disposed` for an unusable engine
    /// - any stage error; if it happened after a buffer swap the engine enters
    ///   [`EngineState::NeedsReset`]
    pub fn update(&mut self, dt: f32) -> Result<(), FluidError> {
        self.ensure_live()?;
        if !dt.is_finite() || dt < 0.0 {
            return Err(FluidError::InvalidTimestep(dt));
        }
        if dt == 0.0 {
            return Ok(());
        }

        let start = Instant::now();
        let config = self.config.snapshot()?;
        let dt = dt.min(config.max_dt);
        self.splats.set_capacity(config.splat_queue_capacity);
        let splats = self.splats.drain_front(config.splats_per_frame);

        let mut ctx = FrameContext::new(
            self.backend.as_mut(),
            &self.fields,
            &config,
            dt,
            self.time,
            &splats,
            self.sources.as_slice(),
        );

        for stage in &mut self.stages {
            let _scope = ProfilerScope::new(stage.name());
            if let Err(err) = stage.apply(&mut ctx) {
                if ctx.passes() > 0 {
                    warn!(
                        "Stage '{}' failed after {} passes: {}. Simulation needs reset.",
                        stage.name(),
                        ctx.passes(),
                        err
                    );
                    self.state = EngineState::NeedsReset;
                } else {
                    warn!("Stage '{}' failed before any pass: {}", stage.name(), err);
                    self.splats.requeue_front(splats);
                }
                return Err(err);
            }
        }
        let passes = ctx.passes();

        self.frame += 1;
        self.time += dt;
        self.timer.record(start.elapsed().as_secs_f64() * 1000.0);

        debug!(
            "Frame {}: t={:.3}s, dt={:.4}s, {} splats, {} sources, {} passes, {:.2}ms",
            self.frame,
            self.time,
            dt,
            splats.len(),
            self.sources.len(),
            passes,
            self.timer.last_frame_time_ms()
        );
        Ok(())
    }

    /// Enqueue a one-shot forcing event
    ///
    /// # Errors
    ///
    /// Returns `FluidError::SplatQueueFull` when the queue is at capacity, or
    /// `FluidError::Disposed`.
    pub fn add_splat(&mut self, splat: Splat) -> Result<(), FluidError> {
        self.ensure_not_disposed()?;
        self.splats.push(splat)
    }

    /// Enqueue `count` random splats
    ///
    /// # Errors
    ///
    /// As [`add_splat`](Self::add_splat); splats queued before the failure stay queued.
    pub fn random_splats(&mut self, count: usize) -> Result<(), FluidError> {
        let config = self.config.snapshot()?;
        let mut rng = rand::rng();
        for _ in 0..count {
            self.add_splat(random_splat(&mut rng, &config))?;
        }
        Ok(())
    }

    /// Translate pointer state into a splat; returns whether one was queued
    ///
    /// # Errors
    ///
    /// As [`add_splat`](Self::add_splat).
    pub fn pointer_input(&mut self, input: &PointerInput) -> Result<bool, FluidError> {
        let config = self.config.snapshot()?;
        match input.to_splat(&config) {
            Some(splat) => self.add_splat(splat).map(|()| true),
            None => Ok(false),
        }
    }

    /// Register a continuous emitter
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Disposed` after disposal.
    pub fn add_source(&mut self, source: Source) -> Result<SourceId, FluidError> {
        self.ensure_not_disposed()?;
        let id = self.sources.add(source);
        debug!("Added source {:?} at ({:.2}, {:.2})", id, source.position.x, source.position.y);
        Ok(id)
    }

    /// Remove an emitter; returns whether it was registered
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Disposed` after disposal.
    pub fn remove_source(&mut self, id: SourceId) -> Result<bool, FluidError> {
        self.ensure_not_disposed()?;
        Ok(self.sources.remove(id).is_some())
    }

    /// Zero every field and drop pending splats and sources
    ///
    /// Also the recovery path from [`EngineState::NeedsReset`].
    ///
    /// # Errors
    ///
    /// Returns `FluidError::Disposed` after disposal, or a backend error.
    pub fn reset(&mut self) -> Result<(), FluidError> {
        self.ensure_not_disposed()?;
        let handles: Vec<_> = self.fields.handles().collect();
        for handle in handles {
            self.backend.clear(handle)?;
        }
        self.splats.clear();
        self.sources.clear();
        self.frame = 0;
        self.time = 0.0;
        self.timer.reset();
        self.state = EngineState::Live;
        info!("Simulation reset");
        Ok(())
    }

    /// Release every buffer pair; later calls fail with `Disposed`
    ///
    /// Disposing twice is a no-op.
    pub fn dispose(&mut self) {
        if self.state == EngineState::Disposed {
            return;
        }
        self.backend.release();
        self.splats.clear();
        self.sources.clear();
        self.state = EngineState::Disposed;
        info!("Simulation disposed after {} frames", self.frame);
    }

    /// The tone-mapped RGBA image, valid until the next `update`
    ///
    /// # Errors
    ///
    /// Returns `FluidError::MissingField` if no stage writes a display field.
    pub fn display_field(&self) -> Result<Cow<'_, [f32]>, FluidError> {
        self.read_field(FieldKind::Display)
    }

    /// Read back any allocated field
    ///
    /// # Errors
    ///
    /// Returns `FluidError::MissingField` for a field the stages never declared,
    /// `FluidError::NeedsReset`/`FluidError::Disposed` for an unusable engine.
    pub fn read_field(&self, kind: FieldKind) -> Result<Cow<'_, [f32]>, FluidError> {
        self.ensure_live()?;
        let handle = self.fields.get(kind).ok_or(FluidError::MissingField {
            stage: "simulation",
            field: kind.name(),
        })?;
        self.backend.read(handle)
    }

    /// Replace the configuration; takes effect at the next frame
    ///
    /// # Errors
    ///
    /// Returns `FluidError::ConfigLockPoisoned` if a writer panicked.
    pub fn set_config(&self, config: SimConfig) -> Result<(), FluidError> {
        self.config.set(config)
    }

    /// Current configuration (sanitized)
    ///
    /// # Errors
    ///
    /// Returns `FluidError::ConfigLockPoisoned` if a writer panicked.
    pub fn config(&self) -> Result<SimConfig, FluidError> {
        self.config.snapshot()
    }

    /// Handle for collaborators that edit configuration from elsewhere
    #[must_use]
    pub fn config_handle(&self) -> SharedConfig {
        self.config.clone()
    }

    /// Counters plus diagnostics computed from read-back fields
    ///
    /// # Errors
    ///
    /// Propagates readback failures.
    pub fn stats(&self) -> Result<SimulationStats, FluidError> {
        self.ensure_live()?;
        let mut stats = SimulationStats {
            frame: self.frame,
            time: self.time,
            backend: self.backend.name(),
            gpu_accelerated: self.backend.is_gpu_accelerated(),
            pending_splats: self.splats.len(),
            active_sources: self.sources.len(),
            total_density: 0.0,
            peak_velocity: 0.0,
            mean_abs_divergence: 0.0,
            last_frame_ms: self.timer.last_frame_time_ms(),
            average_frame_ms: self.timer.average_frame_time_ms(),
        };
        if let Some(density) = self.fields.get(FieldKind::Density) {
            stats.total_density = diagnostics::total_mass(&self.backend.read(density)?);
        }
        if let Some(velocity) = self.fields.get(FieldKind::Velocity) {
            let data = self.backend.read(velocity)?;
            stats.peak_velocity = diagnostics::peak_magnitude(&data, 2, self.grid).0;
            stats.mean_abs_divergence = diagnostics::mean_abs_divergence(&data, self.grid);
        }
        Ok(stats)
    }

    #[must_use]
    pub fn grid(&self) -> Grid {
        self.grid
    }

    /// Preset this engine was built from, `None` for custom stage lists
    #[must_use]
    pub fn variant(&self) -> Option<Variant> {
        self.variant
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state
    }

    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[must_use]
    pub fn simulation_time(&self) -> f32 {
        self.time
    }

    #[must_use]
    pub fn pending_splats(&self) -> usize {
        self.splats.len()
    }

    #[must_use]
    pub fn sources(&self) -> &[Source] {
        self.sources.as_slice()
    }

    #[must_use]
    pub fn is_gpu_accelerated(&self) -> bool {
        self.backend.is_gpu_accelerated()
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Allocated quantities in a stable order
    pub fn field_kinds(&self) -> impl Iterator<Item = FieldKind> + '_ {
        self.fields.kinds()
    }

    /// Channel count of an allocated field
    #[must_use]
    pub fn field_channels(&self, kind: FieldKind) -> Option<u32> {
        self.fields.channels(kind)
    }

    /// Stage names in frame order
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::CpuBackend;
    use crate::stages::{FieldSpec, SplatForcing};
    use nalgebra::Vector2;

    fn cpu_sim(variant: Variant, size: u32) -> Simulation {
        Simulation::new(
            Grid::new(size, size).unwrap(),
            variant,
            SimConfig::default(),
            BackendPreference::Cpu,
        )
        .unwrap()
    }

    /// Fails on its first call after issuing one pass
    struct FailAfterPass;

    impl SolverStage for FailAfterPass {
        fn name(&self) -> &'static str {
            "fail_after_pass"
        }

        fn reads(&self) -> Vec<FieldSpec> {
            vec![FieldSpec::of(FieldKind::Curl)]
        }

        fn writes(&self) -> Vec<FieldSpec> {
            vec![FieldSpec::of(FieldKind::Curl)]
        }

        fn apply(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), FluidError> {
            let curl = ctx.field(self.name(), FieldKind::Curl)?;
            ctx.run(crate::solver::Kernel::Curl { velocity: curl }, curl)?;
            ctx.field(self.name(), FieldKind::Temperature).map(|_| ())
        }
    }

    /// Asks for a field nobody declared
    struct Undeclared;

    impl SolverStage for Undeclared {
        fn name(&self) -> &'static str {
            "undeclared"
        }

        fn reads(&self) -> Vec<FieldSpec> {
            Vec::new()
        }

        fn writes(&self) -> Vec<FieldSpec> {
            Vec::new()
        }

        fn apply(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), FluidError> {
            ctx.field(self.name(), FieldKind::Pressure).map(|_| ())
        }
    }

    #[test]
    fn test_fields_follow_variant_stages() {
        let sim = cpu_sim(Variant::Ocean, 8);
        let kinds: Vec<_> = sim.field_kinds().collect();
        assert_eq!(
            kinds,
            vec![
                FieldKind::Height,
                FieldKind::Normals,
                FieldKind::Foam,
                FieldKind::Display
            ]
        );
        assert_eq!(sim.field_channels(FieldKind::Height), Some(2));
    }

    #[test]
    fn test_invalid_timestep_is_rejected() {
        let mut sim = cpu_sim(Variant::TestRig, 4);
        assert!(matches!(
            sim.update(-0.1),
            Err(FluidError::InvalidTimestep(_))
        ));
        assert!(matches!(
            sim.update(f32::NAN),
            Err(FluidError::InvalidTimestep(_))
        ));
        assert_eq!(sim.state(), EngineState::Live);
        assert_eq!(sim.frame(), 0);
    }

    #[test]
    fn test_dt_is_clamped_to_max() {
        let mut sim = cpu_sim(Variant::TestRig, 4);
        sim.update(10.0).unwrap();
        assert!((sim.simulation_time() - SimConfig::default().max_dt).abs() < 1e-6);
    }

    #[test]
    fn test_zero_dt_keeps_splats_queued() {
        let mut sim = cpu_sim(Variant::Fluid, 4);
        sim.add_splat(Splat::new(
            Vector2::new(0.5, 0.5),
            Vector2::new(1.0, 0.0),
            [1.0, 0.0, 0.0],
            0.1,
        ))
        .unwrap();
        sim.update(0.0).unwrap();
        assert_eq!(sim.pending_splats(), 1);
        assert_eq!(sim.frame(), 0);
    }

    #[test]
    fn test_failure_after_swap_requires_reset() {
        let backend = Box::new(CpuBackend::new(Grid::new(4, 4).unwrap()));
        let mut sim = Simulation::with_backend(
            backend,
            vec![Box::new(FailAfterPass)],
            SimConfig::default(),
        )
        .unwrap();

        assert!(matches!(
            sim.update(0.016),
            Err(FluidError::MissingField { .. })
        ));
        assert_eq!(sim.state(), EngineState::NeedsReset);
        assert_eq!(sim.update(0.016), Err(FluidError::NeedsReset));

        sim.reset().unwrap();
        assert_eq!(sim.state(), EngineState::Live);
    }

    #[test]
    fn test_failure_before_swap_keeps_state() {
        let backend = Box::new(CpuBackend::new(Grid::new(4, 4).unwrap()));
        let mut sim = Simulation::with_backend(
            backend,
            vec![Box::new(Undeclared), Box::new(SplatForcing::dye())],
            SimConfig::default(),
        )
        .unwrap();
        sim.add_splat(Splat::new(Vector2::new(0.5, 0.5), Vector2::zeros(), [1.0; 3], 0.1))
            .unwrap();

        assert!(sim.update(0.016).is_err());
        assert_eq!(sim.state(), EngineState::Live);
        assert_eq!(sim.pending_splats(), 1);
    }

    #[test]
    fn test_dispose_blocks_everything() {
        let mut sim = cpu_sim(Variant::Fluid, 4);
        sim.dispose();
        assert_eq!(sim.update(0.016), Err(FluidError::Disposed));
        assert_eq!(sim.reset(), Err(FluidError::Disposed));
        assert!(matches!(sim.display_field(), Err(FluidError::Disposed)));
        assert_eq!(
            sim.add_source(Source::new(Vector2::zeros(), [1.0; 3], 0.1)),
            Err(FluidError::Disposed)
        );
        sim.dispose();
    }

    #[test]
    fn test_display_requires_display_stage() {
        let backend = Box::new(CpuBackend::new(Grid::new(4, 4).unwrap()));
        let sim = Simulation::with_backend(
            backend,
            vec![Box::new(SplatForcing::dye())],
            SimConfig::default(),
        )
        .unwrap();
        assert!(sim.variant().is_none());
        assert!(matches!(
            sim.display_field(),
            Err(FluidError::MissingField {
                field: "display",
                ..
            })
        ));
    }

    #[test]
    fn test_construction_fails_when_memory_is_short() {
        // TestRig needs five fields; two halves each
        let backend = Box::new(CpuBackend::with_budget(Grid::new(16, 16).unwrap(), 4096));
        let result = Simulation::with_backend(backend, Variant::TestRig.stages(), SimConfig::default());
        assert!(matches!(
            result,
            Err(FluidError::ResourceExhausted { .. })
        ));
    }
}
