//! # Barrier-synchronized physics scheduler
//!
//! A small fixed pool of worker threads advances the world through three
//! phases per tick: resort the spatial index, resolve collisions,
//! integrate forces and positions. Every worker finishes a phase for its
//! slice before any worker starts the next, enforced by a shared
//! [`SpinBarrier`]; that ordering is what makes disjoint-slice mutation
//! race-free without per-particle locks.
//!
//! Slices come from per-phase split points over the particle collection.
//! After its work in a phase, each worker except the first looks at
//! whether its left-hand neighbor had already finished and nudges the
//! shared split by one index in the loser's favor. The rule is additive
//! and slow on purpose: it converges toward wall-clock-balanced phase
//! durations even when collision cost is spatially lopsided, without ever
//! oscillating hard.
//!
//! The nudge is computed during the phase but only published after the
//! next barrier, so within any phase every worker reads an identical set
//! of split points. Range starts take the running maximum of the
//! preceding splits: a split that has drifted below its left neighbor
//! gives its worker an empty slice for the tick, never an overlap, so no
//! two workers can touch the same particle in the same phase.
//!
//! Worker 0 is the designated worker: once per tick it advances black
//! holes, recomputes the adaptive time-step, and samples the control
//! flags so that all workers make the same halt/pause decision after the
//! final barrier. A worker that misses a barrier stalls the pipeline;
//! there is no timeout.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, info};
use parking_lot::{Condvar, Mutex};

use crate::simulation::params::{BALANCE_STEP, INITIAL_TICK, SCALE_RECOVERY, TICK_SMOOTHING};
use crate::simulation::sync::{AtomicF64, SpinBarrier};
use crate::simulation::world::World;

const PHASES: usize = 3;

/// Rebalancing rule for one shared split point: if the left-hand
/// neighbor had already finished it can take one more particle,
/// otherwise it gives one back. Clamped to the collection.
pub fn balance_split(current: usize, neighbor_finished: bool, live: usize) -> usize {
    let next = if neighbor_finished {
        current + BALANCE_STEP
    } else {
        current.saturating_sub(BALANCE_STEP)
    };
    next.min(live)
}

/// Disjoint, covering per-worker ranges over `live` slots from the
/// interior split points.
///
/// Each range starts where the previous one stopped, and a stop is its
/// split clamped between the running start and `live`. A split below its
/// left neighbor therefore yields an empty range rather than an overlap.
pub fn partition_ranges(splits: &[usize], live: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::with_capacity(splits.len() + 1);
    let mut start = 0;
    for &split in splits {
        let stop = split.max(start).min(live);
        ranges.push((start, stop));
        start = stop;
    }
    ranges.push((start, live));
    ranges
}

/// Adaptive simulated time-step.
///
/// The wall-clock tick duration is exponentially smoothed; the effective
/// `dt` handed to the force model is that duration times a scale factor.
/// The scale is capped so that the fastest particle cannot travel more
/// than half the thinnest particle's diameter per tick (the tunneling
/// bound), and it recovers asymmetrically: drops are taken immediately,
/// recovery is gradual.
pub struct TimeStep {
    dt: AtomicF64,
    tick_actual: AtomicF64,
    scale: AtomicF64,
    max_scale: AtomicF64, // user-settable ceiling
    frame_rate: AtomicF64,
}

impl TimeStep {
    pub fn new(max_scale: f64) -> Self {
        Self {
            dt: AtomicF64::new(INITIAL_TICK),
            // jump-started so the first ticks are not degenerate
            tick_actual: AtomicF64::new(INITIAL_TICK),
            scale: AtomicF64::new(1.0),
            max_scale: AtomicF64::new(max_scale),
            frame_rate: AtomicF64::new(1.0 / INITIAL_TICK),
        }
    }

    pub fn dt(&self) -> f64 {
        self.dt.load()
    }

    pub fn scale(&self) -> f64 {
        self.scale.load()
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate.load()
    }

    pub fn set_max_scale(&self, max_scale: f64) {
        self.max_scale.store(max_scale);
    }

    /// Fold one measured tick into the smoothed duration and recompute
    /// the effective `dt`. Called by the designated worker once per tick.
    pub fn update(&self, elapsed: f64, min_diameter: f64, max_speed: f64) {
        let tick_actual =
            TICK_SMOOTHING * elapsed + (1.0 - TICK_SMOOTHING) * self.tick_actual.load();
        self.tick_actual.store(tick_actual);
        self.frame_rate.store(1.0 / tick_actual);

        let mut desired = self.max_scale.load();
        if max_speed > 0.0 && min_diameter.is_finite() {
            let tick_cap = min_diameter / (2.0 * max_speed);
            desired = desired.min(tick_cap / tick_actual);
        }

        let scale = self.scale.load();
        let scale = if desired < scale {
            desired
        } else {
            scale + SCALE_RECOVERY * (desired - scale)
        };
        self.scale.store(scale);
        self.dt.store(tick_actual * scale);
    }
}

struct Shared {
    world: Arc<World>,
    workers: usize,
    running: AtomicBool,
    paused: Mutex<bool>,
    resume: Condvar,
    barrier: SpinBarrier,
    // one split point per interior worker boundary, per phase
    splits: [Vec<AtomicUsize>; PHASES],
    finished: [Vec<AtomicBool>; PHASES],
    // control flags sampled by worker 0 before the last barrier so every
    // worker takes the same exit/pause path after it
    halt_sampled: AtomicBool,
    pause_sampled: AtomicBool,
    timestep: TimeStep,
}

impl Shared {
    fn range(&self, phase: usize, index: usize, live: usize) -> (usize, usize) {
        let splits: Vec<usize> = self.splits[phase]
            .iter()
            .map(|s| s.load(Ordering::Relaxed))
            .collect();
        partition_ranges(&splits, live)[index]
    }

    /// Run one phase slice, then compute the boundary nudge against the
    /// left-hand neighbor: if it finished first it can take one more
    /// particle, otherwise give one back. The new value is returned, not
    /// stored; the caller publishes it through [`Self::commit_split`]
    /// after the next barrier, once no worker can still be reading this
    /// phase's partition.
    fn run_phase(
        &self,
        phase: usize,
        index: usize,
        live: usize,
        work: impl FnOnce(usize, usize),
    ) -> Option<usize> {
        self.finished[phase][index].store(false, Ordering::Relaxed);
        let (start, stop) = self.range(phase, index, live);
        work(start, stop);
        self.finished[phase][index].store(true, Ordering::Relaxed);
        if index > 0 {
            let current = self.splits[phase][index - 1].load(Ordering::Relaxed);
            let finished = self.finished[phase][index - 1].load(Ordering::Relaxed);
            Some(balance_split(current, finished, live))
        } else {
            None
        }
    }

    /// Publish a deferred split adjustment. Only worker `index` writes
    /// split `index - 1`, and a phase's splits are only read between the
    /// barriers that bracket that phase, so the store never races a
    /// reader.
    fn commit_split(&self, phase: usize, index: usize, next: Option<usize>) {
        if let Some(next) = next {
            self.splits[phase][index - 1].store(next, Ordering::Relaxed);
        }
    }
}

/// Handle to the running worker pool.
pub struct Scheduler {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn `workers` threads over `world` and start ticking immediately.
    pub fn start(world: Arc<World>, workers: usize, max_scale: f64) -> Self {
        let workers = workers.max(1);
        let live = world.particle_slot_count();

        let even_splits = || {
            (1..workers)
                .map(|i| AtomicUsize::new(live * i / workers))
                .collect::<Vec<_>>()
        };
        let flags = || (0..workers).map(|_| AtomicBool::new(false)).collect::<Vec<_>>();

        let shared = Arc::new(Shared {
            world,
            workers,
            running: AtomicBool::new(true),
            paused: Mutex::new(false),
            resume: Condvar::new(),
            barrier: SpinBarrier::new(workers),
            splits: [even_splits(), even_splits(), even_splits()],
            finished: [flags(), flags(), flags()],
            halt_sampled: AtomicBool::new(false),
            pause_sampled: AtomicBool::new(false),
            timestep: TimeStep::new(max_scale),
        });

        let handles = (0..workers)
            .map(|index| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("physics-{index}"))
                    .spawn(move || worker_loop(shared, index))
                    .unwrap_or_else(|e| panic!("failed to spawn physics worker: {e}"))
            })
            .collect();

        info!("scheduler started with {workers} workers");
        Scheduler { shared, handles }
    }

    pub fn dt(&self) -> f64 {
        self.shared.timestep.dt()
    }

    pub fn frame_rate(&self) -> f64 {
        self.shared.timestep.frame_rate()
    }

    pub fn time_scale(&self) -> f64 {
        self.shared.timestep.scale()
    }

    pub fn set_max_time_scale(&self, max_scale: f64) {
        self.shared.timestep.set_max_scale(max_scale);
    }

    /// Current split points for one phase, outermost boundaries excluded.
    pub fn splits(&self, phase: usize) -> Vec<usize> {
        self.shared.splits[phase]
            .iter()
            .map(|s| s.load(Ordering::Relaxed))
            .collect()
    }

    /// Request a pause; workers block on the next tick boundary.
    pub fn pause(&self) {
        *self.shared.paused.lock() = true;
    }

    pub fn resume(&self) {
        let mut paused = self.shared.paused.lock();
        *paused = false;
        self.shared.resume.notify_all();
    }

    /// Stop the pipeline and join all workers. Workers observe the flag
    /// at the end of the current tick.
    pub fn stop(self) {
        self.shared.running.store(false, Ordering::Relaxed);
        {
            let mut paused = self.shared.paused.lock();
            *paused = false;
            self.shared.resume.notify_all();
        }
        for handle in self.handles {
            let _ = handle.join();
        }
        debug!("scheduler stopped");
    }
}

fn worker_loop(shared: Arc<Shared>, index: usize) {
    let mut last_tick = Instant::now();

    loop {
        if index == 0 {
            // Last tick's extrema were consumed before the final barrier.
            shared.world.reset_tick_extrema();
        }

        let live = shared.world.particle_slot_count();
        let dt = shared.timestep.dt();

        let resort_split = shared.run_phase(0, index, live, |start, stop| {
            shared.world.resort_range(start, stop);
        });
        shared.barrier.wait();
        shared.commit_split(0, index, resort_split);

        let collide_split = shared.run_phase(1, index, live, |start, stop| {
            shared.world.collide_range(start, stop, dt);
        });
        shared.barrier.wait();
        shared.commit_split(1, index, collide_split);

        let integrate_split = shared.run_phase(2, index, live, |start, stop| {
            shared.world.integrate_range(start, stop, dt);
        });
        if index == 0 {
            shared.world.update_black_holes(dt);

            let elapsed = last_tick.elapsed().as_secs_f64();
            last_tick = Instant::now();
            shared.timestep.update(
                elapsed,
                shared.world.min_diameter(),
                shared.world.max_speed(),
            );

            shared
                .halt_sampled
                .store(!shared.running.load(Ordering::Relaxed), Ordering::Relaxed);
            shared
                .pause_sampled
                .store(*shared.paused.lock(), Ordering::Relaxed);
        }
        shared.barrier.wait();
        shared.commit_split(2, index, integrate_split);

        // The barrier published worker 0's samples; every worker now takes
        // the same path.
        if shared.halt_sampled.load(Ordering::Relaxed) {
            break;
        }
        if shared.pause_sampled.load(Ordering::Relaxed) {
            let mut paused = shared.paused.lock();
            while *paused {
                shared.resume.wait(&mut paused);
            }
            if index == 0 {
                // Don't fold the pause into the smoothed tick duration.
                last_tick = Instant::now();
            }
        }
    }
}
