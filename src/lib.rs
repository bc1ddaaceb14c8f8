//! mcshell: a Monte Carlo engine for classical statistical mechanics.
//!
//! The workspace crates provide the engine core (worlds, forcefields,
//! moves, order parameters, drivers); this crate adds the JSON
//! configuration layer and the command-line driver that ties them
//! together.

pub mod builder;
pub mod config;

pub use builder::{build_engine, BuildError, Engine};
pub use config::Config;
