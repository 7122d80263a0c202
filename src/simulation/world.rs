//! # Simulation world
//!
//! [`World`] owns the entity collections and the quad-tree and exposes the
//! entry points the input/render side calls: creation (single, scattered,
//! hex-packed clouds), destruction, drag manipulation, and the global
//! physics toggles. It also provides the per-slice phase routines the
//! scheduler's workers run each tick.
//!
//! Lock order, where more than one is held: particles, then black holes,
//! then tree resident lists. Phase routines take the entity read locks for
//! the duration of one phase and release them at the barrier, which is
//! where the control thread's compaction pass gets its write access.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::configuration::config::SimConfig;
use crate::simulation::black_hole::{BlackHole, InteractionMode};
use crate::simulation::forces;
use crate::simulation::params::{
    BLACK_HOLE_CLEAN, DIAMETER_TABLE, MAX_BLACK_HOLES, MAX_PARTICLES, PARTICLE_CLEAN,
    PERMANENT_HOLE_DIAMETER, PLACEMENT_TRIES, POOL_FLOOR, TREE_DEPTH,
};
use crate::simulation::particle::{NVec2, Particle};
use crate::simulation::quad::{QuadTree, ROOT};
use crate::simulation::sync::AtomicF64;

/// Global physics toggles, flipped by the input side and read by the
/// workers once per phase.
pub struct Toggles {
    pub collisions: AtomicBool,
    pub stickiness: AtomicBool,
    pub walls: AtomicBool,
    pub ceiling: AtomicBool,
    pub floor: AtomicBool,
    gravity: AtomicF64,
}

impl Toggles {
    fn new(config: &SimConfig) -> Self {
        Self {
            collisions: AtomicBool::new(config.collisions),
            stickiness: AtomicBool::new(config.stickiness),
            walls: AtomicBool::new(config.walls),
            ceiling: AtomicBool::new(config.ceiling),
            floor: AtomicBool::new(config.floor),
            gravity: AtomicF64::new(config.gravity),
        }
    }

    pub fn gravity(&self) -> f64 {
        self.gravity.load()
    }

    pub fn set_gravity(&self, gravity: f64) {
        self.gravity.store(gravity);
    }
}

/// Entities captured by `immobilize_cloud`, dragged as a unit until
/// released. Holds `Arc`s rather than indices so pool compaction cannot
/// invalidate the selection mid-drag.
struct DragSelection {
    particles: Vec<Arc<Particle>>,
    black_holes: Vec<Arc<BlackHole>>,
    prev: NVec2,
}

pub struct World {
    width: f64,
    height: f64,
    tree: QuadTree,
    particles: RwLock<Vec<Arc<Particle>>>,
    black_holes: RwLock<Vec<Arc<BlackHole>>>,
    pub toggles: Toggles,
    rng: Mutex<StdRng>,
    drag: Mutex<DragSelection>,
    // per-tick extrema fed to the adaptive time-step
    max_speed: AtomicF64,
    min_diameter: AtomicF64,
}

impl World {
    pub fn new(config: &SimConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        // Slot 0 is the permanent black hole: always present, never
        // compacted, inactive until the input side toggles it.
        let permanent = Arc::new(BlackHole::new(
            config.width / 2.0,
            config.height / 2.0,
            0.0,
            PERMANENT_HOLE_DIAMETER,
            InteractionMode::Collision,
        ));

        let world = Self {
            width: config.width,
            height: config.height,
            tree: QuadTree::new(config.width, config.height, TREE_DEPTH),
            particles: RwLock::new(Vec::with_capacity(MAX_PARTICLES.min(4096))),
            black_holes: RwLock::new(vec![permanent]),
            toggles: Toggles::new(config),
            rng: Mutex::new(rng),
            drag: Mutex::new(DragSelection {
                particles: Vec::new(),
                black_holes: Vec::new(),
                prev: NVec2::zeros(),
            }),
            max_speed: AtomicF64::new(0.0),
            min_diameter: AtomicF64::new(f64::MAX),
        };
        info!(
            "world {}x{}, tree depth {} ({} nodes)",
            config.width,
            config.height,
            TREE_DEPTH,
            world.tree.node_count()
        );
        world
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn tree(&self) -> &QuadTree {
        &self.tree
    }

    // ==================================================================
    // Creation
    // ==================================================================

    /// Scatter `count` particles at random non-overlapping positions.
    /// Positions that still collide after the bounded number of tries are
    /// placed anyway; startup overlap resolves itself through the springs.
    pub fn scatter_particles(&self, count: usize, diameter_class: usize, density_class: usize) {
        let mut rng = self.rng.lock();
        let mut placed = Vec::with_capacity(count);

        for _ in 0..count {
            let particle = Arc::new(Particle::new(diameter_class, density_class));
            let radius = particle.radius();
            let spacing = 2.0 * particle.diameter();

            let mut x = 0.0;
            let mut y = 0.0;
            for _ in 0..=PLACEMENT_TRIES {
                x = rng.gen_range(radius..self.width - radius);
                y = rng.gen_range(radius..self.height - radius);
                let collides = placed.iter().any(|other: &Arc<Particle>| {
                    let d: NVec2 = other.position() - NVec2::new(x, y);
                    d.norm() <= spacing
                });
                if !collides {
                    break;
                }
            }

            particle.set_position(x, y);
            placed.push(particle);
        }

        let mut particles = self.particles.write();
        for particle in placed {
            particle.update_bounds(self.toggles.stickiness.load(Ordering::Relaxed));
            self.tree.add_particle(ROOT, &particle, true);
            particles.push(particle);
        }
        debug!("scattered {} particles ({} total)", count, particles.len());
    }

    /// Collision-checked single-particle creation. Returns the slot index,
    /// or `None` if the position is rejected or the pool is full.
    ///
    /// A reused slot keeps its tree residency and migrates on the next
    /// resort phase; a fresh slot is inserted into the tree immediately.
    #[allow(clippy::too_many_arguments)]
    pub fn create_particle(
        &self,
        x: f64,
        y: f64,
        vel: f64,
        dir: f64,
        diameter_class: usize,
        density_class: usize,
        stationary: bool,
        force: bool,
    ) -> Option<usize> {
        let radius = DIAMETER_TABLE[diameter_class.min(DIAMETER_TABLE.len() - 1)] / 2.0;

        if x > self.width - radius || x < radius || y > self.height - radius || y < radius {
            return None;
        }

        let mut particles = self.particles.write();

        if !force {
            let candidate = NVec2::new(x, y);
            let particle_hit = particles.iter().any(|p| {
                p.alive() && (candidate - p.position()).norm() + 0.001 < radius + p.radius()
            });
            let hole_hit = self.black_holes.read().iter().any(|h| {
                h.active() && (candidate - h.position()).norm() + 0.001 < radius + h.radius()
            });
            if particle_hit || hole_hit {
                return None;
            }
        }

        if particles.len() >= MAX_PARTICLES {
            return None;
        }

        let velocity = NVec2::new(vel * dir.cos(), vel * dir.sin());

        if let Some(index) = particles.iter().position(|p| !p.alive()) {
            let particle = &particles[index];
            particle.reinitialize(diameter_class, density_class);
            particle.set_position(x, y);
            particle.set_stationary(stationary);
            particle.set_velocity(velocity);
            return Some(index);
        }

        let particle = Arc::new(Particle::new(diameter_class, density_class));
        particle.set_position(x, y);
        particle.set_stationary(stationary);
        particle.set_velocity(velocity);
        particle.update_bounds(self.toggles.stickiness.load(Ordering::Relaxed));
        self.tree.add_particle(ROOT, &particle, true);
        particles.push(particle);
        Some(particles.len() - 1)
    }

    /// Hex-packed cloud creation inside `radius` around (x, y).
    ///
    /// Rows step by `diameter·sin 60°`, alternating rows shift by
    /// `diameter·cos 60°`, giving close packing with centers at least one
    /// diameter apart. Cells are placed through the collision-checked
    /// single creation, then released with the shared velocity.
    #[allow(clippy::too_many_arguments)]
    pub fn create_cloud(
        &self,
        x: f64,
        y: f64,
        radius: f64,
        vel: f64,
        dir: f64,
        diameter_class: usize,
        density_class: usize,
        stationary: bool,
        force: bool,
    ) {
        let diameter = DIAMETER_TABLE[diameter_class.min(DIAMETER_TABLE.len() - 1)];
        let sin60 = (PI / 3.0).sin();
        let cos60 = (PI / 3.0).cos();

        let mut created = Vec::new();
        let place = |cx: f64, cy: f64, created: &mut Vec<usize>| {
            if let Some(index) =
                self.create_particle(cx, cy, 0.0, 0.0, diameter_class, density_class, true, force)
            {
                created.push(index);
            }
        };

        let rows = (radius / (diameter * sin60)) as i64;
        let mut y_it = y - rows as f64 * diameter * sin60;
        let mut row = 0u64;
        while (y_it - y).abs() < radius {
            // Rightward from center, then leftward, covering the row.
            let row_shift = if row % 2 == 1 { diameter * cos60 } else { 0.0 };
            let mut x_it = x + row_shift;
            while NVec2::new(x_it - x, y_it - y).norm() < radius {
                place(x_it, y_it, &mut created);
                x_it += diameter;
            }
            x_it = if row % 2 == 1 { x - diameter * cos60 } else { x - diameter };
            while NVec2::new(x_it - x, y_it - y).norm() < radius {
                place(x_it, y_it, &mut created);
                x_it -= diameter;
            }
            y_it += diameter * sin60;
            row += 1;
        }

        let velocity = NVec2::new(vel * dir.cos(), vel * dir.sin());
        let particles = self.particles.read();
        for &index in &created {
            if !stationary {
                particles[index].set_stationary(false);
            }
            particles[index].set_velocity(velocity);
        }
        debug!("cloud of {} particles at ({x:.0}, {y:.0})", created.len());
    }

    /// Create (or reactivate a pooled) black hole. Slot 0 is reserved for
    /// the permanent hole and never handed out. Returns the slot index or
    /// `None` when the pool is full.
    pub fn create_black_hole(
        &self,
        x: f64,
        y: f64,
        surface_accel: f64,
        diameter: f64,
        interact: InteractionMode,
    ) -> Option<usize> {
        let mut black_holes = self.black_holes.write();
        if let Some(index) = black_holes.iter().skip(1).position(|h| !h.active()) {
            let index = index + 1;
            let hole = &black_holes[index];
            hole.set_size(diameter);
            hole.set_attraction(surface_accel);
            hole.set_position(x, y);
            hole.set_interaction(interact);
            hole.set_active(true);
            return Some(index);
        }
        if black_holes.len() >= MAX_BLACK_HOLES {
            return None;
        }
        let hole = Arc::new(BlackHole::new(x, y, surface_accel, diameter, interact));
        hole.set_active(true);
        black_holes.push(hole);
        Some(black_holes.len() - 1)
    }

    // ==================================================================
    // Destruction and bulk manipulation
    // ==================================================================

    /// Kill everything within `radius` of (x, y). The permanent black hole
    /// is spared. Optional class filters restrict which particles die.
    pub fn deactivate_cloud(
        &self,
        x: f64,
        y: f64,
        radius: f64,
        diameter_class: Option<usize>,
        density_class: Option<usize>,
    ) {
        let center = NVec2::new(x, y);
        for particle in self.particles.read().iter() {
            let class_match = diameter_class.map_or(true, |c| particle.diameter_class() == c)
                && density_class.map_or(true, |c| particle.density_class() == c);
            if class_match && particle.alive() && (particle.position() - center).norm() <= radius {
                particle.kill();
            }
        }
        for hole in self.black_holes.read().iter().skip(1) {
            if hole.active() && (hole.position() - center).norm() <= radius {
                hole.set_active(false);
            }
        }
    }

    /// Kill all particles and deactivate all black holes except the
    /// permanent one. Slots stay pooled until compaction.
    pub fn clear_all_particles(&self) {
        for particle in self.particles.read().iter() {
            particle.kill();
        }
        for hole in self.black_holes.read().iter().skip(1) {
            hole.set_active(false);
        }
        info!("cleared all particles");
    }

    pub fn zero_all_velocities(&self) {
        for particle in self.particles.read().iter() {
            if particle.alive() {
                particle.set_velocity(NVec2::zeros());
            }
        }
    }

    // ==================================================================
    // Drag (immobilize / move / mobilize)
    // ==================================================================

    /// Capture everything within `radius` of (x, y) as the drag selection;
    /// captured particles go stationary and ease toward their targets.
    pub fn immobilize_cloud(&self, x: f64, y: f64, radius: f64) {
        let center = NVec2::new(x, y);
        let mut drag = self.drag.lock();
        drag.prev = center;

        for particle in self.particles.read().iter() {
            if particle.alive() && (particle.position() - center).norm() <= radius {
                particle.set_stationary(true);
                drag.particles.push(Arc::clone(particle));
            }
        }
        for hole in self.black_holes.read().iter() {
            if hole.active() && (hole.position() - center).norm() <= radius {
                drag.black_holes.push(Arc::clone(hole));
            }
        }
    }

    /// Shift the drag selection's targets by the cursor delta since the
    /// last call.
    pub fn move_cloud(&self, x: f64, y: f64) {
        let mut drag = self.drag.lock();
        let delta = NVec2::new(x, y) - drag.prev;
        if delta != NVec2::zeros() {
            for particle in &drag.particles {
                particle.shift_target(delta.x, delta.y);
            }
            for hole in &drag.black_holes {
                hole.shift_target(delta.x, delta.y);
            }
        }
        drag.prev = NVec2::new(x, y);
    }

    /// Release the drag selection back into free motion.
    pub fn mobilize_cloud(&self) {
        let mut drag = self.drag.lock();
        for particle in drag.particles.drain(..) {
            particle.set_stationary(false);
        }
        drag.black_holes.clear();
    }

    // ==================================================================
    // Read-only state for the render side
    // ==================================================================

    pub fn live_particle_count(&self) -> usize {
        self.particles.read().iter().filter(|p| p.alive()).count()
    }

    pub fn active_black_hole_count(&self) -> usize {
        self.black_holes.read().iter().filter(|h| h.active()).count()
    }

    pub fn particle_slot_count(&self) -> usize {
        self.particles.read().len()
    }

    /// Clone of the particle `Arc`s, for render/test inspection.
    pub fn particle_snapshot(&self) -> Vec<Arc<Particle>> {
        self.particles.read().clone()
    }

    pub fn black_hole_snapshot(&self) -> Vec<Arc<BlackHole>> {
        self.black_holes.read().clone()
    }

    pub fn particle(&self, index: usize) -> Option<Arc<Particle>> {
        self.particles.read().get(index).cloned()
    }

    pub fn black_hole(&self, index: usize) -> Option<Arc<BlackHole>> {
        self.black_holes.read().get(index).cloned()
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed.load()
    }

    pub fn min_diameter(&self) -> f64 {
        self.min_diameter.load()
    }

    // ==================================================================
    // Pool compaction
    // ==================================================================

    /// Run compaction passes when enough dead slots have accumulated.
    /// Called from the control thread between ticks; takes write locks, so
    /// it synchronizes with workers at phase boundaries.
    pub fn maybe_clean(&self) {
        let (slots, live) = {
            let particles = self.particles.read();
            (particles.len(), particles.iter().filter(|p| p.alive()).count())
        };
        if slots - live >= PARTICLE_CLEAN && slots.saturating_sub(PARTICLE_CLEAN) > POOL_FLOOR {
            self.clean_particles();
        }

        let (hole_slots, hole_live) = {
            let black_holes = self.black_holes.read();
            (black_holes.len(), black_holes.iter().filter(|h| h.active()).count())
        };
        if hole_slots - hole_live >= BLACK_HOLE_CLEAN && hole_slots.saturating_sub(BLACK_HOLE_CLEAN) > 1 {
            self.clean_black_holes();
        }

        self.tree.clean_resident_lists();
    }

    /// Swap dead slots to the tail and truncate, keeping a pooling floor
    /// of dead slots for cheap reuse. Truncated particles are tombstoned
    /// out of the tree before the `Arc`s drop.
    fn clean_particles(&self) {
        let mut particles = self.particles.write();
        let before = particles.len();

        let mut front = 0;
        let mut back = particles.len().saturating_sub(1);
        while front < back {
            while front < particles.len() && particles[front].alive() {
                front += 1;
            }
            while back > 0 && !particles[back].alive() {
                back -= 1;
            }
            if front < back {
                particles.swap(front, back);
            }
        }

        let mut live_end = particles.len();
        while live_end > 0 && !particles[live_end - 1].alive() {
            live_end -= 1;
        }
        let keep = live_end.max(POOL_FLOOR);
        if keep < particles.len() {
            for particle in &particles[keep..] {
                self.tree.remove_particle(particle);
            }
            particles.truncate(keep);
        }
        debug!("particle pool compacted {} -> {}", before, particles.len());
    }

    fn clean_black_holes(&self) {
        let mut black_holes = self.black_holes.write();

        // Slot 0 never moves.
        let mut front = 1;
        let mut back = black_holes.len().saturating_sub(1);
        while front < back {
            while front < black_holes.len() && black_holes[front].active() {
                front += 1;
            }
            while back > 1 && !black_holes[back].active() {
                back -= 1;
            }
            if front < back {
                black_holes.swap(front, back);
            }
        }

        let mut active_end = black_holes.len();
        while active_end > 1 && !black_holes[active_end - 1].active() {
            active_end -= 1;
        }
        black_holes.truncate(active_end);
    }

    // ==================================================================
    // Phase routines (run by scheduler workers)
    // ==================================================================

    /// Reset the per-tick extrema; done by the designated worker at tick
    /// start, before any integration runs.
    pub fn reset_tick_extrema(&self) {
        self.max_speed.store(0.0);
        self.min_diameter.store(f64::MAX);
    }

    /// Phase 1: refresh bounding boxes and re-sort `[start, stop)` into
    /// the tree.
    pub fn resort_range(&self, start: usize, stop: usize) {
        let sticky = self.toggles.stickiness.load(Ordering::Relaxed);
        let particles = self.particles.read();
        let stop = stop.min(particles.len());
        for particle in &particles[start.min(stop)..stop] {
            if particle.alive() {
                particle.update_bounds(sticky);
                self.tree.sort_particle(particle);
            }
        }
    }

    /// Phase 2: enumerate and resolve pairwise collisions for `[start,
    /// stop)` through the tree. No-op while collisions are toggled off.
    pub fn collide_range(&self, start: usize, stop: usize, dt: f64) {
        if !self.toggles.collisions.load(Ordering::Relaxed) {
            return;
        }
        let sticky = self.toggles.stickiness.load(Ordering::Relaxed);
        let particles = self.particles.read();
        let stop = stop.min(particles.len());
        for particle in &particles[start.min(stop)..stop] {
            if particle.alive() {
                self.tree.collide_from(particle, &mut |a, b| {
                    forces::collision_update(a, b, dt, sticky);
                });
            }
        }
    }

    /// Phase 3: boundary/gravity/black-hole terms plus position
    /// integration for `[start, stop)`; also feeds the tick extrema used
    /// by the adaptive time-step.
    pub fn integrate_range(&self, start: usize, stop: usize, dt: f64) {
        let walls = self.toggles.walls.load(Ordering::Relaxed);
        let ceiling = self.toggles.ceiling.load(Ordering::Relaxed);
        let floor = self.toggles.floor.load(Ordering::Relaxed);
        let gravity = self.toggles.gravity();

        let particles = self.particles.read();
        let black_holes = self.black_holes.read();
        let stop = stop.min(particles.len());

        for particle in &particles[start.min(stop)..stop] {
            if particle.alive() && !particle.stationary() {
                forces::apply_boundaries(
                    particle, dt, self.width, self.height, walls, ceiling, floor, gravity,
                );
                for hole in black_holes.iter() {
                    if hole.active() {
                        forces::apply_black_hole(particle, hole, dt);
                    }
                }
            }

            particle.integrate(dt, self.width, self.height, walls, ceiling, floor);

            if particle.alive() {
                self.max_speed.fetch_max(particle.velocity().norm());
                self.min_diameter.fetch_min(particle.diameter());
            }
        }
    }

    /// Advance active black holes toward their drag targets; done by the
    /// designated worker once per tick.
    pub fn update_black_holes(&self, dt: f64) {
        for hole in self.black_holes.read().iter() {
            hole.update(dt);
        }
    }
}
