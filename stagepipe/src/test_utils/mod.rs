//! Helpers shared by the unit and integration tests of this crate.

pub mod failpoints;
pub mod pipeline;
