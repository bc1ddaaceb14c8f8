mod dos_simulation;
mod multi_walker;
mod observers;
mod standard_simulation;
mod trait_observer;

pub use dos_simulation::*;
pub use multi_walker::*;
pub use observers::*;
pub use standard_simulation::*;
pub use trait_observer::*;
