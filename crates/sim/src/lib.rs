//! # Clonal Population Simulator
//!
//! The `sim` crate simulates the stochastic dynamics of an asexually
//! reproducing cell population. Cells are grouped into clones (cells that
//! share a type and an exact birth rate) and clones into types linked by
//! mutation into a lineage tree. Births, deaths and mutations follow a
//! branching, Moran, synchronous or two-sex process.

pub mod base;
pub mod cells;
pub mod errors;
pub mod evolution;
pub mod prelude;
pub mod simulation;

pub use base::TypeId;
pub use errors::{ConfigError, SimulationError};
