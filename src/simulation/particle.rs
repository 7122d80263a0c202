//! Particle entity state
//!
//! A [`Particle`] is shared as `Arc<Particle>` between the worker threads,
//! the quad-tree resident lists, and the control thread, so every mutable
//! field uses relaxed atomics. Cross-field consistency comes from the phase
//! barriers: positions are only written during the integrate phase, bounding
//! boxes only during the resort phase.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use nalgebra::Vector2;

use crate::simulation::params::{
    BASE_ATTR_RATE, BASE_SPRING_RATE, DEFAULT_ATTR_RADIUS, DEFAULT_REBOUND, DENSITY_TABLE,
    DIAMETER_TABLE, DRAG_FILTER,
};
use crate::simulation::quad::ROOT;
use crate::simulation::sync::AtomicF64;

pub type NVec2 = Vector2<f64>;

// Ids are unique for a particle's lifetime; a pooled slot gets a fresh id
// when it is reinitialized.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn fresh_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Axis-aligned bounding box, inflated by the attraction radius while
/// stickiness is enabled.
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

pub struct Particle {
    id: AtomicU64,
    x: AtomicF64,
    y: AtomicF64,
    target_x: AtomicF64, // drag target, follows the position while free
    target_y: AtomicF64,
    vel_x: AtomicF64,
    vel_y: AtomicF64,
    diameter: AtomicF64,
    radius: AtomicF64,
    mass: AtomicF64,
    spring_rate: AtomicF64,
    rebound_efficiency: AtomicF64,
    attr_radius: AtomicF64,
    attr_rate: AtomicF64, // center rate, surface rate × r²
    // cached inflated bounding box, refreshed once per resort phase
    bb_x_min: AtomicF64,
    bb_x_max: AtomicF64,
    bb_y_min: AtomicF64,
    bb_y_max: AtomicF64,
    alive: AtomicBool,
    stationary: AtomicBool,
    node: AtomicUsize, // index of the quad-tree node holding this particle
    color: AtomicU32,  // packed 0xRRGGBB
    diameter_class: AtomicUsize,
    density_class: AtomicUsize,
}

impl Particle {
    pub fn new(diameter_class: usize, density_class: usize) -> Self {
        let particle = Self {
            id: AtomicU64::new(fresh_id()),
            x: AtomicF64::new(0.0),
            y: AtomicF64::new(0.0),
            target_x: AtomicF64::new(0.0),
            target_y: AtomicF64::new(0.0),
            vel_x: AtomicF64::new(0.0),
            vel_y: AtomicF64::new(0.0),
            diameter: AtomicF64::new(0.0),
            radius: AtomicF64::new(0.0),
            mass: AtomicF64::new(1.0),
            spring_rate: AtomicF64::new(BASE_SPRING_RATE),
            rebound_efficiency: AtomicF64::new(DEFAULT_REBOUND),
            attr_radius: AtomicF64::new(DEFAULT_ATTR_RADIUS),
            attr_rate: AtomicF64::new(0.0),
            bb_x_min: AtomicF64::new(0.0),
            bb_x_max: AtomicF64::new(0.0),
            bb_y_min: AtomicF64::new(0.0),
            bb_y_max: AtomicF64::new(0.0),
            alive: AtomicBool::new(true),
            stationary: AtomicBool::new(false),
            node: AtomicUsize::new(ROOT),
            color: AtomicU32::new(0xff_ff_ff),
            diameter_class: AtomicUsize::new(0),
            density_class: AtomicUsize::new(0),
        };
        particle.set_classes(diameter_class, density_class);
        particle
    }

    /// Reinitialize a pooled slot. A new id is assigned; the particle keeps
    /// its tree residency and migrates on the next resort.
    pub fn reinitialize(&self, diameter_class: usize, density_class: usize) {
        self.id.store(fresh_id(), Ordering::Relaxed);
        self.set_classes(diameter_class, density_class);
        self.vel_x.store(0.0);
        self.vel_y.store(0.0);
        self.set_color(255, 255, 255);
        self.alive.store(true, Ordering::Relaxed);
        self.stationary.store(false, Ordering::Relaxed);
    }

    fn set_classes(&self, diameter_class: usize, density_class: usize) {
        let diameter_class = diameter_class.min(DIAMETER_TABLE.len() - 1);
        let density_class = density_class.min(DENSITY_TABLE.len() - 1);
        self.diameter_class.store(diameter_class, Ordering::Relaxed);
        self.density_class.store(density_class, Ordering::Relaxed);
        self.set_size(DIAMETER_TABLE[diameter_class]);
        self.set_mass(DENSITY_TABLE[density_class]);
        self.set_sticky(DEFAULT_ATTR_RADIUS, BASE_ATTR_RATE);
    }

    pub fn id(&self) -> u64 {
        self.id.load(Ordering::Relaxed)
    }

    // ==================================================================
    // Geometry and force-response parameters
    // ==================================================================

    pub fn set_size(&self, diameter: f64) {
        self.diameter.store(diameter);
        self.radius.store(diameter / 2.0);
    }

    /// Mass from the current radius and an area density.
    pub fn set_mass(&self, density: f64) {
        let radius = self.radius.load();
        self.mass.store(std::f64::consts::PI * radius * radius * density);
    }

    /// Convert a surface attraction rate to the stored center rate.
    pub fn set_sticky(&self, attr_radius: f64, surface_rate: f64) {
        let radius = self.radius.load();
        self.attr_rate.store(surface_rate * radius * radius);
        self.attr_radius.store(attr_radius);
    }

    pub fn set_spring_rate(&self, spring_rate: f64) {
        self.spring_rate.store(spring_rate);
    }

    pub fn set_rebound_efficiency(&self, rebound: f64) {
        self.rebound_efficiency.store(rebound);
    }

    pub fn diameter(&self) -> f64 {
        self.diameter.load()
    }

    pub fn radius(&self) -> f64 {
        self.radius.load()
    }

    pub fn mass(&self) -> f64 {
        self.mass.load()
    }

    pub fn spring_rate(&self) -> f64 {
        self.spring_rate.load()
    }

    pub fn rebound_efficiency(&self) -> f64 {
        self.rebound_efficiency.load()
    }

    pub fn attr_radius(&self) -> f64 {
        self.attr_radius.load()
    }

    pub fn attr_rate(&self) -> f64 {
        self.attr_rate.load()
    }

    pub fn diameter_class(&self) -> usize {
        self.diameter_class.load(Ordering::Relaxed)
    }

    pub fn density_class(&self) -> usize {
        self.density_class.load(Ordering::Relaxed)
    }

    // ==================================================================
    // Kinematic state
    // ==================================================================

    pub fn position(&self) -> NVec2 {
        NVec2::new(self.x.load(), self.y.load())
    }

    /// Place the particle and reset its drag target to match.
    pub fn set_position(&self, x: f64, y: f64) {
        self.x.store(x);
        self.y.store(y);
        self.target_x.store(x);
        self.target_y.store(y);
    }

    pub fn velocity(&self) -> NVec2 {
        NVec2::new(self.vel_x.load(), self.vel_y.load())
    }

    pub fn set_velocity(&self, velocity: NVec2) {
        self.vel_x.store(velocity.x);
        self.vel_y.store(velocity.y);
    }

    pub fn set_velocity_x(&self, x: f64) {
        self.vel_x.store(x);
    }

    pub fn set_velocity_y(&self, y: f64) {
        self.vel_y.store(y);
    }

    pub fn add_velocity_x(&self, delta: f64) {
        self.vel_x.fetch_add(delta);
    }

    pub fn add_velocity_y(&self, delta: f64) {
        self.vel_y.fetch_add(delta);
    }

    pub fn target(&self) -> NVec2 {
        NVec2::new(self.target_x.load(), self.target_y.load())
    }

    /// Shift the drag target (used while a cloud is being dragged).
    pub fn shift_target(&self, dx: f64, dy: f64) {
        self.target_x.fetch_add(dx);
        self.target_y.fetch_add(dy);
    }

    // ==================================================================
    // Flags, residency, color
    // ==================================================================

    pub fn alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::Relaxed);
    }

    pub fn stationary(&self) -> bool {
        self.stationary.load(Ordering::Relaxed)
    }

    pub fn set_stationary(&self, stationary: bool) {
        self.stationary.store(stationary, Ordering::Relaxed);
    }

    pub fn node(&self) -> usize {
        self.node.load(Ordering::Relaxed)
    }

    pub fn set_node(&self, node: usize) {
        self.node.store(node, Ordering::Relaxed);
    }

    pub fn set_color(&self, r: u8, g: u8, b: u8) {
        let packed = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
        self.color.store(packed, Ordering::Relaxed);
    }

    pub fn color(&self) -> (u8, u8, u8) {
        let packed = self.color.load(Ordering::Relaxed);
        ((packed >> 16) as u8, (packed >> 8) as u8, packed as u8)
    }

    // ==================================================================
    // Per-tick updates
    // ==================================================================

    /// Refresh the cached bounding box, inflating by the attraction radius
    /// while stickiness is enabled. Called once per resort phase.
    pub fn update_bounds(&self, sticky: bool) {
        let reach = self.radius.load() + if sticky { self.attr_radius.load() } else { 0.0 };
        let x = self.x.load();
        let y = self.y.load();
        self.bb_x_min.store(x - reach);
        self.bb_x_max.store(x + reach);
        self.bb_y_min.store(y - reach);
        self.bb_y_max.store(y + reach);
    }

    pub fn bounds(&self) -> Aabb {
        Aabb {
            x_min: self.bb_x_min.load(),
            x_max: self.bb_x_max.load(),
            y_min: self.bb_y_min.load(),
            y_max: self.bb_y_max.load(),
        }
    }

    /// Advance the position by one tick.
    ///
    /// Free particles integrate velocity and die when they drift a radius
    /// past a disabled boundary edge. Stationary particles ease toward the
    /// drag target instead and show zero velocity.
    pub fn integrate(&self, dt: f64, width: f64, height: f64, walls: bool, ceiling: bool, floor: bool) {
        if !self.alive() {
            return;
        }

        if self.stationary() {
            let position = self.position();
            let eased = position + DRAG_FILTER * (self.target() - position) * dt;
            self.x.store(eased.x);
            self.y.store(eased.y);
            self.vel_x.store(0.0);
            self.vel_y.store(0.0);
        } else {
            let x = self.x.load() + self.vel_x.load() * dt;
            let y = self.y.load() + self.vel_y.load() * dt;
            self.x.store(x);
            self.y.store(y);
            self.target_x.store(x);
            self.target_y.store(y);

            // Gone a radius past an open edge: remove from play.
            let radius = self.radius.load();
            if (!walls && (x < -radius || x > width + radius))
                || (!ceiling && y < -radius)
                || (!floor && y > height + radius)
            {
                self.kill();
            }
        }
    }
}
