use particlebox::{bench_phases, bench_tick_curve};
use particlebox::{Scheduler, SimConfig, World};

use anyhow::Result;
use clap::Parser;
use log::info;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, default_value = "config.yaml")]
    file_name: String,

    /// Run headless for this many seconds, then stop.
    #[arg(long, default_value_t = 10.0)]
    seconds: f64,

    /// Run the benchmarks instead of the simulation.
    #[arg(long)]
    bench: bool,
}

// load here to keep main clean; a missing file falls back to defaults
fn load_config(file_name: &str) -> Result<SimConfig> {
    let config_path = PathBuf::from(file_name);
    if !config_path.exists() {
        info!("no config at {}, using defaults", config_path.display());
        return Ok(SimConfig::default());
    }
    let file = File::open(&config_path)?;
    let reader = BufReader::new(file);
    let config: SimConfig = serde_yaml::from_reader(reader)?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.bench {
        bench_phases();
        bench_tick_curve();
        return Ok(());
    }

    let config = load_config(&args.file_name)?;

    let world = Arc::new(World::new(&config));
    world.scatter_particles(
        config.initial_particles,
        config.initial_diameter_class,
        config.initial_density_class,
    );

    let scheduler = Scheduler::start(Arc::clone(&world), config.threads, config.max_time_scale);

    // Stand-in for the render/input loop: poll stats and run compaction
    // at frame rate until the deadline.
    let deadline = Instant::now() + Duration::from_secs_f64(args.seconds);
    let mut last_report = Instant::now();
    while Instant::now() < deadline {
        world.maybe_clean();

        if last_report.elapsed() >= Duration::from_secs(1) {
            info!(
                "{} particles, {} holes, {:.0} ticks/s, scale {:.2}",
                world.live_particle_count(),
                world.active_black_hole_count(),
                scheduler.frame_rate(),
                scheduler.time_scale(),
            );
            last_report = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(16));
    }

    scheduler.stop();
    Ok(())
}
