mod arena;
mod errors;
mod nblist;
mod particle;
mod properties;
mod species;
mod units;
mod world;
mod world_manager;

pub use arena::*;
pub use errors::*;
pub use nblist::*;
pub use particle::*;
pub use properties::*;
pub use species::*;
pub use units::*;
pub use world::*;
pub use world_manager::*;
