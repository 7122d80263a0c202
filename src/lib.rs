pub mod simulation;
pub mod configuration;
pub mod benchmark;

pub use simulation::particle::{Aabb, NVec2, Particle};
pub use simulation::black_hole::{BlackHole, InteractionMode};
pub use simulation::quad::{QuadNode, QuadTree, ROOT};
pub use simulation::world::{Toggles, World};
pub use simulation::scheduler::{balance_split, partition_ranges, Scheduler, TimeStep};
pub use simulation::sync::{AtomicF64, SpinBarrier};

pub use configuration::config::SimConfig;

pub use benchmark::benchmark::{bench_phases, bench_tick_curve};
