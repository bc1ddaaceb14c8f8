mod cbmc;
mod charge;
mod gibbs;
mod grand_canonical;
mod move_manager;
mod rotate;
mod species;
mod trait_move;
mod translate;
mod volume;

pub use cbmc::*;
pub use charge::*;
pub use gibbs::*;
pub use grand_canonical::*;
pub use move_manager::*;
pub use rotate::*;
pub use species::*;
pub use trait_move::*;
pub use translate::*;
pub use volume::*;
