use std::time::Instant;

use crate::configuration::config::SimConfig;
use crate::simulation::world::World;

/// Helper to build a populated world of `n` particles, seeded so runs
/// are comparable.
fn make_world(n: usize) -> World {
    let config = SimConfig {
        initial_particles: n,
        seed: Some(42),
        ..SimConfig::default()
    };
    let world = World::new(&config);
    world.scatter_particles(n, config.initial_diameter_class, config.initial_density_class);
    world
}

/// Time each pipeline phase in isolation over a range of particle counts.
pub fn bench_phases() {
    let ns = [200, 400, 800, 1600, 3200, 6400];
    let dt = 0.001;

    for n in ns {
        let world = make_world(n);

        // Warm up: settle the tree before timing.
        world.resort_range(0, n);

        let t0 = Instant::now();
        world.resort_range(0, n);
        let resort = t0.elapsed().as_secs_f64();

        let t1 = Instant::now();
        world.collide_range(0, n, dt);
        let collide = t1.elapsed().as_secs_f64();

        let t2 = Instant::now();
        world.integrate_range(0, n, dt);
        let integrate = t2.elapsed().as_secs_f64();

        println!(
            "N = {n:5}, resort = {resort:8.6} s, collide = {collide:8.6} s, integrate = {integrate:8.6} s"
        );
    }
}

/// Benchmark full single-threaded ticks for a range of n
/// Paste output directly into excel to graph
pub fn bench_tick_curve() {
    println!("N,tick_ms");

    for n in (200..=6400).step_by(200) {
        // Small n: average over more ticks to smooth noise
        let ticks = if n <= 800 { 50 } else { 10 };
        let dt = 0.001;

        let world = make_world(n);
        world.resort_range(0, n); // warm-up

        let t0 = Instant::now();
        for _ in 0..ticks {
            world.resort_range(0, n);
            world.collide_range(0, n, dt);
            world.integrate_range(0, n, dt);
        }
        let ms = t0.elapsed().as_secs_f64() * 1000.0 / ticks as f64;

        println!("{},{:.6}", n, ms);
    }
}
