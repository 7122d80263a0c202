//! Black-hole force sources
//!
//! A black hole attracts (or repels) particles with an inverse-square field
//! and optionally collides with or destroys them. Like particles, black
//! holes are shared as `Arc<BlackHole>` and use atomic fields throughout.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::simulation::params::MOUSE_FILTER;
use crate::simulation::particle::NVec2;
use crate::simulation::sync::AtomicF64;

/// How a black hole treats particles inside its radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionMode {
    /// Particles pass through and keep feeling the surface acceleration.
    NoCollision,
    /// Particles entering the radius are destroyed.
    Destruction,
    /// The surface acts as a spring boundary, like particle contact.
    Collision,
}

impl InteractionMode {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => InteractionMode::NoCollision,
            1 => InteractionMode::Destruction,
            _ => InteractionMode::Collision,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            InteractionMode::NoCollision => 0,
            InteractionMode::Destruction => 1,
            InteractionMode::Collision => 2,
        }
    }
}

pub struct BlackHole {
    x: AtomicF64,
    y: AtomicF64,
    target_x: AtomicF64, // drag target, smoothed toward each tick
    target_y: AtomicF64,
    surface_accel: AtomicF64,
    center_accel: AtomicF64, // surface_accel × radius²
    diameter: AtomicF64,
    radius: AtomicF64,
    active: AtomicBool,
    interact: AtomicU8,
    color: std::sync::atomic::AtomicU32,
}

impl BlackHole {
    pub fn new(x: f64, y: f64, surface_accel: f64, diameter: f64, interact: InteractionMode) -> Self {
        let hole = Self {
            x: AtomicF64::new(0.0),
            y: AtomicF64::new(0.0),
            target_x: AtomicF64::new(0.0),
            target_y: AtomicF64::new(0.0),
            surface_accel: AtomicF64::new(surface_accel),
            center_accel: AtomicF64::new(0.0),
            diameter: AtomicF64::new(0.0),
            radius: AtomicF64::new(0.0),
            active: AtomicBool::new(false),
            interact: AtomicU8::new(interact.as_u8()),
            color: std::sync::atomic::AtomicU32::new(0),
        };
        hole.set_size(diameter);
        hole.set_attraction(surface_accel);
        hole.set_position(x, y);
        hole
    }

    pub fn position(&self) -> NVec2 {
        NVec2::new(self.x.load(), self.y.load())
    }

    pub fn set_position(&self, x: f64, y: f64) {
        self.x.store(x);
        self.y.store(y);
        self.target_x.store(x);
        self.target_y.store(y);
    }

    /// Retarget the smoothed drag without teleporting the hole.
    pub fn filtered_move(&self, x: f64, y: f64) {
        self.target_x.store(x);
        self.target_y.store(y);
    }

    pub fn shift_target(&self, dx: f64, dy: f64) {
        self.target_x.fetch_add(dx);
        self.target_y.fetch_add(dy);
    }

    pub fn set_size(&self, diameter: f64) {
        self.diameter.store(diameter);
        self.radius.store(diameter / 2.0);
        let radius = diameter / 2.0;
        self.center_accel.store(self.surface_accel.load() * radius * radius);
    }

    pub fn set_attraction(&self, surface_accel: f64) {
        self.surface_accel.store(surface_accel);
        let radius = self.radius.load();
        self.center_accel.store(surface_accel * radius * radius);
        // Attracting holes draw black, repelling ones white.
        if surface_accel < 0.0 {
            self.set_color(255, 255, 255);
        } else if surface_accel == 0.0 {
            self.set_color(127, 127, 127);
        } else {
            self.set_color(0, 0, 0);
        }
    }

    pub fn set_interaction(&self, interact: InteractionMode) {
        self.interact.store(interact.as_u8(), Ordering::Relaxed);
    }

    pub fn interaction(&self) -> InteractionMode {
        InteractionMode::from_u8(self.interact.load(Ordering::Relaxed))
    }

    pub fn surface_accel(&self) -> f64 {
        self.surface_accel.load()
    }

    pub fn center_accel(&self) -> f64 {
        self.center_accel.load()
    }

    pub fn diameter(&self) -> f64 {
        self.diameter.load()
    }

    pub fn radius(&self) -> f64 {
        self.radius.load()
    }

    pub fn active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    pub fn set_color(&self, r: u8, g: u8, b: u8) {
        let packed = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
        self.color.store(packed, Ordering::Relaxed);
    }

    pub fn color(&self) -> (u8, u8, u8) {
        let packed = self.color.load(Ordering::Relaxed);
        ((packed >> 16) as u8, (packed >> 8) as u8, packed as u8)
    }

    /// Ease toward the drag target. Advanced by the designated worker once
    /// per tick.
    pub fn update(&self, dt: f64) {
        if self.active() {
            let x = self.x.load();
            let y = self.y.load();
            self.x.store(x + MOUSE_FILTER * dt * (self.target_x.load() - x));
            self.y.store(y + MOUSE_FILTER * dt * (self.target_y.load() - y));
        }
    }
}
