//! Engine-level properties
//!
//! Boundedness, divergence reduction, splat ordering, reset and the timestep
//! scenarios, all on the deterministic CPU backend.

use approx::assert_relative_eq;
use fluid_sim_core::simulation::diagnostics::{mean_abs_divergence, peak_magnitude, total_mass};
use fluid_sim_core::{
    BackendPreference, FieldKind, Grid, SimConfig, Simulation, Source, Splat, Variant,
};
use nalgebra::Vector2;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn cpu_sim(variant: Variant, size: u32, config: SimConfig) -> Simulation {
    Simulation::new(
        Grid::new(size, size).unwrap(),
        variant,
        config,
        BackendPreference::Cpu,
    )
    .unwrap()
}

fn dye_splat(x: f32, y: f32, impulse: Vector2<f32>, radius: f32) -> Splat {
    Splat::new(Vector2::new(x, y), impulse, [1.0, 1.0, 1.0], radius)
}

/// Dye density (first channel) in the cell containing (u, v)
fn dye_at(sim: &Simulation, u: f32, v: f32) -> f32 {
    let grid = sim.grid();
    let (x, y) = grid.cell_at(u, v);
    sim.read_field(FieldKind::Density).unwrap()[grid.index(x, y) * 3]
}

#[test]
fn test_dye_and_velocity_decay_without_forcing() {
    let mut sim = cpu_sim(Variant::TestRig, 32, SimConfig::default());
    sim.add_splat(dye_splat(0.5, 0.5, Vector2::new(20.0, 5.0), 0.1))
        .unwrap();
    sim.update(0.016).unwrap();

    let grid = sim.grid();
    let initial_dye = sim.read_field(FieldKind::Density).unwrap().iter().fold(0.0_f32, |m, v| m.max(*v));
    let initial_speed = peak_magnitude(&sim.read_field(FieldKind::Velocity).unwrap(), 2, grid).0;
    assert!(initial_dye > 0.5);
    assert!(initial_speed > 1.0);

    let mut previous_dye = initial_dye;
    for _ in 0..300 {
        sim.update(0.016).unwrap();
        let dye = sim.read_field(FieldKind::Density).unwrap().iter().fold(0.0_f32, |m, v| m.max(*v));
        // Bilinear resampling never exceeds its inputs, and dissipation is < 1
        assert!(dye < previous_dye);
        previous_dye = dye;
    }

    let speed = peak_magnitude(&sim.read_field(FieldKind::Velocity).unwrap(), 2, grid).0;
    assert!(previous_dye < 0.01 * initial_dye);
    assert!(speed < 0.1 * initial_speed, "{speed} vs {initial_speed}");
}

#[test]
fn test_fluid_with_vorticity_stays_bounded() {
    let mut sim = cpu_sim(Variant::Fluid, 32, SimConfig::default());
    sim.random_splats(5).unwrap();
    for _ in 0..5 {
        sim.update(0.016).unwrap();
    }
    let early = sim.stats().unwrap();
    for _ in 0..400 {
        sim.update(0.016).unwrap();
    }
    let late = sim.stats().unwrap();
    assert!(late.peak_velocity.is_finite());
    assert!(late.total_density < early.total_density);
    assert!(late.peak_velocity < early.peak_velocity);
}

#[test]
fn test_more_jacobi_iterations_leave_less_divergence() {
    let run = |iterations: u32| {
        let config = SimConfig {
            pressure_iterations: iterations,
            ..SimConfig::default()
        };
        let mut sim = cpu_sim(Variant::TestRig, 32, config);
        sim.add_splat(dye_splat(0.5, 0.5, Vector2::new(30.0, 0.0), 0.1))
            .unwrap();
        sim.update(0.016).unwrap();
        let velocity = sim.read_field(FieldKind::Velocity).unwrap().into_owned();
        mean_abs_divergence(&velocity, sim.grid())
    };

    let unprojected = run(0);
    let projected = run(30);
    assert!(unprojected > 0.0);
    assert!(projected < unprojected, "{projected} !< {unprojected}");
}

#[test]
fn test_splats_beyond_the_cap_apply_in_arrival_order() {
    let config = SimConfig {
        splats_per_frame: 1,
        ..SimConfig::default()
    };
    let mut sim = cpu_sim(Variant::TestRig, 32, config);
    let xs = [0.2, 0.5, 0.8];
    for x in xs {
        sim.add_splat(dye_splat(x, 0.5, Vector2::zeros(), 0.04)).unwrap();
    }
    assert_eq!(sim.pending_splats(), 3);

    for (frame, x) in xs.iter().enumerate() {
        sim.update(0.016).unwrap();
        assert_eq!(sim.pending_splats(), 2 - frame);
        assert!(dye_at(&sim, *x, 0.5) > 0.5, "splat {frame} not applied");
        if let Some(next) = xs.get(frame + 1) {
            assert!(dye_at(&sim, *next, 0.5) < 1e-3, "splat {} applied early", frame + 1);
        }
    }
}

#[test]
fn test_reset_restores_the_initial_display() {
    let mut sim = cpu_sim(Variant::Fluid, 16, SimConfig::default());
    let initial = sim.display_field().unwrap().into_owned();

    sim.random_splats(4).unwrap();
    sim.add_source(Source::new(Vector2::new(0.5, 0.2), [0.3, 0.1, 0.0], 0.05))
        .unwrap();
    for _ in 0..20 {
        sim.update(0.016).unwrap();
    }
    assert_ne!(sim.display_field().unwrap().into_owned(), initial);

    sim.reset().unwrap();
    let after = sim.display_field().unwrap();
    assert_eq!(after.len(), initial.len());
    for (a, b) in after.iter().zip(initial.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-6);
    }
    assert_eq!(sim.pending_splats(), 0);
    assert!(sim.sources().is_empty());
    assert_eq!(sim.frame(), 0);
}

#[test]
fn test_zero_dt_on_4x4_changes_nothing() {
    let mut sim = cpu_sim(Variant::Fluid, 4, SimConfig::default());
    sim.add_splat(dye_splat(0.5, 0.5, Vector2::new(3.0, 1.0), 0.3))
        .unwrap();
    sim.update(0.016).unwrap();

    let kinds: Vec<_> = sim.field_kinds().collect();
    let before: Vec<Vec<f32>> = kinds
        .iter()
        .map(|k| sim.read_field(*k).unwrap().into_owned())
        .collect();

    sim.update(0.0).unwrap();

    for (kind, snapshot) in kinds.iter().zip(before.iter()) {
        assert_eq!(&sim.read_field(*kind).unwrap().into_owned(), snapshot, "{kind:?} changed");
    }
}

#[test]
fn test_single_splat_peaks_at_its_centre() {
    let mut sim = cpu_sim(Variant::Fluid, 32, SimConfig::default());
    sim.add_splat(dye_splat(0.5, 0.5, Vector2::new(1.0, 0.0), 0.1))
        .unwrap();
    sim.update(0.016).unwrap();

    let grid = sim.grid();
    let velocity = sim.read_field(FieldKind::Velocity).unwrap();
    let (peak, (x, y)) = peak_magnitude(&velocity, 2, grid);
    assert!(peak > 0.0);
    // The splat centre falls between cells 15 and 16
    assert!((14..=17).contains(&x), "peak at x={x}");
    assert!((14..=17).contains(&y), "peak at y={y}");

    for (cx, cy) in [(0, 0), (31, 0), (0, 31), (31, 31)] {
        let i = grid.index(cx, cy) * 2;
        let corner = velocity[i].hypot(velocity[i + 1]);
        assert!(corner < 1e-3 * peak, "corner ({cx}, {cy}) = {corner}");
    }
}

#[test]
fn test_removed_source_stops_adding_mass() {
    let mut sim = cpu_sim(Variant::Fluid, 16, SimConfig::default());
    let id = sim
        .add_source(Source::new(Vector2::new(0.5, 0.5), [1.0, 1.0, 1.0], 0.1))
        .unwrap();

    let mut mass = 0.0;
    for _ in 0..10 {
        sim.update(0.016).unwrap();
        let next = total_mass(&sim.read_field(FieldKind::Density).unwrap());
        assert!(next > mass);
        mass = next;
    }

    assert!(sim.remove_source(id).unwrap());
    assert!(!sim.remove_source(id).unwrap());
    for _ in 0..10 {
        sim.update(0.016).unwrap();
        let next = total_mass(&sim.read_field(FieldKind::Density).unwrap());
        assert!(next < mass, "mass grew after removal: {next} >= {mass}");
        mass = next;
    }
}

#[test]
fn test_config_changes_apply_from_the_next_frame() {
    let mut sim = cpu_sim(Variant::TestRig, 8, SimConfig::default());
    let handle = sim.config_handle();
    handle
        .update(|config| config.density_dissipation = 0.5)
        .unwrap();
    assert_relative_eq!(sim.config().unwrap().density_dissipation, 0.5);

    sim.add_splat(dye_splat(0.5, 0.5, Vector2::zeros(), 0.2)).unwrap();
    sim.update(0.016).unwrap();
    let first = total_mass(&sim.read_field(FieldKind::Density).unwrap());
    sim.update(0.016).unwrap();
    let second = total_mass(&sim.read_field(FieldKind::Density).unwrap());
    // Dissipation is per 1/60 s, so a 16 ms frame applies 0.5^0.96
    assert_relative_eq!(second / first, 0.5_f32.powf(0.96), epsilon = 1e-3);
}
