mod bonded;
mod constraint;
mod electrostatic;
mod interaction;
mod manager;
mod nonbonded;

pub use bonded::*;
pub use constraint::*;
pub use electrostatic::*;
pub use interaction::*;
pub use manager::*;
pub use nonbonded::*;
