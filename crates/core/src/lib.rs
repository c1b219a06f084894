//! Fluid Simulation Core Library
//!
//! A real-time 2D Eulerian fluid solver built from composable full-screen stencil
//! passes over double-buffered grid fields. A velocity field and one or more scalar
//! fields (dye density, temperature, wave height) evolve under a simplified
//! incompressible Navier-Stokes model, driven by user-injected splats and
//! continuous sources.
//!
//! ## Architecture
//!
//! - [`solver`]: grid fields, kernel passes and the CPU/GPU backends that run them
//! - [`stages`]: advection, forcing, vorticity confinement, pressure projection,
//!   buoyancy and the ocean wave stages, all behind the `SolverStage` trait
//! - [`display`]: tone mapping of the terminal field into a presentable image
//! - [`simulation`]: the engine that owns the fields and orders the stages per frame
//!
//! ## Example
//!
//! ```rust,no_run
//! use fluid_sim_core::{BackendPreference, Grid, SimConfig, Simulation, Splat, Variant};
//! use nalgebra::Vector2;
//!
//! let grid = Grid::new(128, 128)?;
//! let mut sim = Simulation::new(grid, Variant::Fluid, SimConfig::default(), BackendPreference::Auto)?;
//! sim.add_splat(Splat::new(Vector2::new(0.5, 0.5), Vector2::new(40.0, 0.0), [0.9, 0.3, 0.1], 0.05))?;
//! sim.update(0.016)?;
//! let image = sim.display_field()?;
//! assert_eq!(image.len(), 128 * 128 * 4);
//! # Ok::<(), fluid_sim_core::FluidError>(())
//! ```

pub mod config;
pub mod display;
pub mod error;
pub mod grid;
pub mod simulation;
pub mod solver;
pub mod stages;

pub use config::{SharedConfig, SimConfig};
pub use display::{to_rgba8, DisplayMode, DisplayStage};
pub use error::FluidError;
pub use grid::Grid;
pub use simulation::{
    EngineState, PointerInput, Simulation, SimulationStats, Source, SourceId, Splat, SplatQueue,
    Variant,
};
pub use solver::{create_backend, BackendPreference, FieldBackend, FieldHandle};
pub use stages::{FieldKind, FieldSet, FieldSpec, FrameContext, SolverStage};
