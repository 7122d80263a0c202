//! Tuning constants for the simulation
//!
//! Capacities, cleanup thresholds, default force parameters, and the
//! size/density class tables used by the creation entry points.

/// Hard cap on pooled particle slots.
pub const MAX_PARTICLES: usize = 10_000;
/// Hard cap on pooled black-hole slots.
pub const MAX_BLACK_HOLES: usize = 1_000;

/// Dead-slot count that triggers particle pool compaction.
pub const PARTICLE_CLEAN: usize = 500;
/// Inactive-slot count that triggers black-hole pool compaction.
pub const BLACK_HOLE_CLEAN: usize = 10;
/// Compaction keeps at least this many slots around for pooling.
pub const POOL_FLOOR: usize = 50;

/// Fixed quad-tree depth. The tree topology is never resized at runtime.
pub const TREE_DEPTH: u32 = 4;
/// Tombstone count that lets a node's resident list be compacted.
pub const QUAD_CLEAN: usize = 8;

/// Placement attempts before random scatter gives up on rejection.
pub const PLACEMENT_TRIES: usize = 25;

/// Default linear spring rate for particle contact.
pub const BASE_SPRING_RATE: f64 = 50_000.0;
/// Default rebound efficiency (fraction of impulse kept on exit).
pub const DEFAULT_REBOUND: f64 = 0.9;
/// Default surface attraction rate; converted to a center rate by r².
pub const BASE_ATTR_RATE: f64 = 25_000.0;
/// Default attraction radius beyond contact distance.
pub const DEFAULT_ATTR_RADIUS: f64 = 5.0;

/// Easing rate toward the drag target for stationary particles.
pub const DRAG_FILTER: f64 = 10.0;
/// Easing rate toward the drag target for black holes.
pub const MOUSE_FILTER: f64 = 30.0;

/// Floor on center distance before any division.
pub const DIST_EPSILON: f64 = 0.01;
/// Overlap fraction below which contact becomes an inelastic merge.
pub const DEEP_OVERLAP: f64 = 0.2;

/// Particle diameters by size class.
pub const DIAMETER_TABLE: [f64; 3] = [5.0, 10.0, 20.0];
/// Area densities by density class; mass = π·r²·density.
pub const DENSITY_TABLE: [f64; 3] = [0.5, 1.0, 2.0];

/// Exponential smoothing weight for the measured tick duration.
pub const TICK_SMOOTHING: f64 = 0.01;
/// Recovery rate of the time-scale factor (drop is immediate).
pub const SCALE_RECOVERY: f64 = 0.05;
/// Initial tick duration, jump-started to avoid startup glitches.
pub const INITIAL_TICK: f64 = 0.002;

/// Per-tick step of the additive load-rebalancing rule.
pub const BALANCE_STEP: usize = 1;

/// Diameter of the permanent black hole at slot 0.
pub const PERMANENT_HOLE_DIAMETER: f64 = 20.0;
