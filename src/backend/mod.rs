//! Metadata access abstraction shared by the live runtime and tests

pub mod traits;

#[cfg(test)]
pub mod fixture;

pub use traits::*;
