//! Configuration types for loading a simulation setup from YAML.
//!
//! Every field has a default, so a partial (or empty) file is valid and
//! only overrides what it names.
//!
//! # YAML format
//! An example setup YAML matching these types:
//!
//! ```yaml
//! width: 1500.0            # simulation rectangle, pixels
//! height: 900.0
//! threads: 2               # physics worker threads
//!
//! initial_particles: 500   # scattered at startup
//! initial_diameter_class: 1   # 0=small, 1=medium, 2=large
//! initial_density_class: 1    # 0=light, 1=normal, 2=heavy
//!
//! gravity: 1000.0          # linear gravity, +y is down
//! collisions: true
//! stickiness: true
//! walls: true              # boundary springs per edge
//! ceiling: true
//! floor: true
//!
//! max_time_scale: 1.0      # ceiling on the adaptive time-scale factor
//! seed: 42                 # omit for entropy-seeded placement
//! ```

use serde::Deserialize;

/// Top-level simulation setup loaded from YAML.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SimConfig {
    pub width: f64,  // simulation rectangle width
    pub height: f64, // simulation rectangle height
    pub threads: usize, // physics worker threads (small fixed pool)

    pub initial_particles: usize, // scattered at startup
    pub initial_diameter_class: usize, // index into the diameter table
    pub initial_density_class: usize,  // index into the density table

    pub gravity: f64,     // linear gravity magnitude, +y is down
    pub collisions: bool, // pairwise particle collisions
    pub stickiness: bool, // short-range attraction outside contact
    pub walls: bool,      // left/right boundary springs
    pub ceiling: bool,    // top boundary spring
    pub floor: bool,      // bottom boundary spring

    pub max_time_scale: f64, // user ceiling on the adaptive time scale
    pub seed: Option<u64>,   // deterministic placement seed
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 1500.0,
            height: 900.0,
            threads: 2,
            initial_particles: 500,
            initial_diameter_class: 1,
            initial_density_class: 1,
            gravity: 1000.0,
            collisions: true,
            stickiness: true,
            walls: true,
            ceiling: true,
            floor: true,
            max_time_scale: 1.0,
            seed: None,
        }
    }
}
