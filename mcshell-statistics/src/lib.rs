mod histogram;

pub use histogram::*;
