pub mod black_hole;
pub mod forces;
pub mod params;
pub mod particle;
pub mod quad;
pub mod scheduler;
pub mod sync;
pub mod world;
