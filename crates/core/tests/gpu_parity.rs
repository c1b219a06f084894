//! GPU backend agrees with the CPU reference
//!
//! Passes trivially on machines without a usable adapter.

use fluid_sim_core::{
    BackendPreference, FieldKind, Grid, SimConfig, Simulation, Splat, Variant,
};
use nalgebra::Vector2;

/// Max difference between backends after several frames, relative to the
/// field's largest magnitude (at least 1)
const TOLERANCE: f32 = 2e-3;

fn run(variant: Variant, preference: BackendPreference) -> Option<Simulation> {
    let mut sim = Simulation::new(
        Grid::new(48, 32).unwrap(),
        variant,
        SimConfig::default(),
        preference,
    )
    .ok()?;
    let splats = [
        Splat::new(Vector2::new(0.3, 0.4), Vector2::new(40.0, 10.0), [0.8, 0.2, 0.1], 0.08),
        Splat::new(Vector2::new(0.7, 0.6), Vector2::new(-30.0, 5.0), [0.1, 0.3, 0.9], 0.06),
    ];
    for splat in splats {
        sim.add_splat(splat).unwrap();
    }
    for _ in 0..5 {
        sim.update(0.016).unwrap();
    }
    Some(sim)
}

#[test]
fn test_gpu_matches_cpu_for_every_variant() {
    for variant in Variant::ALL {
        let Some(gpu) = run(variant, BackendPreference::Gpu) else {
            // No GPU available, skip
            return;
        };
        assert!(gpu.is_gpu_accelerated());
        let cpu = run(variant, BackendPreference::Cpu).unwrap();

        for kind in cpu.field_kinds() {
            let a = cpu.read_field(kind).unwrap();
            let b = gpu.read_field(kind).unwrap();
            assert_eq!(a.len(), b.len());
            let worst = a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).abs())
                .fold(0.0_f32, f32::max);
            let scale = a.iter().fold(1.0_f32, |m, v| m.max(v.abs()));
            assert!(
                worst <= TOLERANCE * scale,
                "{variant} {kind:?} differs by {worst} (scale {scale})"
            );
        }
        assert_eq!(
            gpu.read_field(FieldKind::Display).unwrap().len(),
            48 * 32 * 4
        );
    }
}
