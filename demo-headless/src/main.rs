use clap::Parser;
use fluid_sim_core::{
    to_rgba8, BackendPreference, Grid, SimConfig, Simulation, Source, Splat, Variant,
};
use nalgebra::Vector2;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Headless fluid simulation runner
#[derive(Parser, Debug)]
#[command(name = "fluid-sim-demo")]
#[command(about = "Runs a fluid simulation variant without a window", long_about = None)]
struct Args {
    /// Grid width in cells
    #[arg(long, default_value_t = 256)]
    width: u32,

    /// Grid height in cells
    #[arg(long, default_value_t = 256)]
    height: u32,

    /// Scene variant (fluid, smoke, ocean, test-rig)
    #[arg(short, long, default_value = "fluid")]
    variant: Variant,

    /// Number of frames to simulate
    #[arg(short, long, default_value_t = 300)]
    frames: u32,

    /// Timestep per frame in seconds
    #[arg(long, default_value_t = 0.016)]
    dt: f32,

    /// Random splats queued before the first frame
    #[arg(short, long, default_value_t = 8)]
    splats: u32,

    /// Queue another random burst every N frames (0 = never)
    #[arg(long, default_value_t = 120)]
    burst_interval: u32,

    /// Pressure solve iterations per frame
    #[arg(long, default_value_t = 20)]
    pressure_iterations: u32,

    /// Vorticity confinement strength
    #[arg(long, default_value_t = 30.0)]
    vorticity: f32,

    /// Force the CPU backend
    #[arg(long)]
    cpu: bool,

    /// Report interval in frames
    #[arg(short, long, default_value_t = 60)]
    report_interval: u32,

    /// Write the final display image as a binary PPM
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    println!("=== Fluid Simulation Demo ===\n");

    let grid = Grid::new(args.width, args.height)?;
    let config = SimConfig {
        pressure_iterations: args.pressure_iterations,
        vorticity: args.vorticity,
        ..SimConfig::default()
    };
    let preference = if args.cpu {
        BackendPreference::Cpu
    } else {
        BackendPreference::Auto
    };

    let mut sim = Simulation::new(grid, args.variant, config, preference)?;
    println!(
        "Created {} simulation on {}x{} grid ({} backend)",
        args.variant,
        grid.width(),
        grid.height(),
        sim.backend_name()
    );
    println!("Stages: {}\n", sim.stage_names().join(" -> "));

    if args.variant == Variant::Smoke {
        for vent in Source::smoke_vents() {
            sim.add_source(vent)?;
        }
        println!("Added {} smoke vents", Source::smoke_vents().len());
    }

    if args.variant == Variant::Ocean {
        // A single drop in the middle so the ripple is visible from frame one
        sim.add_splat(Splat::new(
            Vector2::new(0.5, 0.5),
            Vector2::zeros(),
            [0.0; 3],
            0.04,
        ))?;
    }
    sim.random_splats(args.splats as usize)?;

    println!("Frame  | Time(s) | Density   | Peak vel | Mean |div| | ms/frame");
    println!("-------|---------|-----------|----------|-----------|---------");

    for frame in 1..=args.frames {
        if args.burst_interval > 0 && frame % args.burst_interval == 0 {
            if let Err(err) = sim.random_splats(args.splats as usize) {
                warn!("Dropped burst at frame {}: {}", frame, err);
            }
        }

        sim.update(args.dt)?;

        if args.report_interval > 0 && (frame % args.report_interval == 0 || frame == args.frames) {
            let stats = sim.stats()?;
            println!(
                "{:6} | {:7.2} | {:9.2} | {:8.2} | {:9.5} | {:8.2}",
                stats.frame,
                stats.time,
                stats.total_density,
                stats.peak_velocity,
                stats.mean_abs_divergence,
                stats.average_frame_ms
            );
        }
    }

    if let Some(path) = &args.output {
        let display = sim.display_field()?;
        write_ppm(path, grid, &to_rgba8(&display))?;
        info!("Wrote {}", path.display());
        println!("\nWrote final frame to {}", path.display());
    }

    Ok(())
}

/// Binary P6 image; grid rows are bottom-up, image rows top-down
fn write_ppm(path: &Path, grid: Grid, rgba: &[u8]) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "P6\n{} {}\n255\n", grid.width(), grid.height())?;

    let row_bytes = grid.width() as usize * 4;
    for row in rgba.chunks_exact(row_bytes).rev() {
        for px in row.chunks_exact(4) {
            out.write_all(&px[..3])?;
        }
    }
    out.flush()
}
