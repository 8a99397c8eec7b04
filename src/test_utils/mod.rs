//! Helpers shared by unit tests: simulated clusters, sample entries,
//! recording callbacks and push connections.
mod common;
mod recorders;

pub use common::*;
pub use recorders::*;
