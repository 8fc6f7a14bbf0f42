//! Base types shared by the rest of the crate.
//!
//! This module provides the handle types used to address cell types and
//! clones, the slot arena that stores clones, and the rate distributions
//! used to draw new birth rates.

mod arena;
pub mod rate;

pub use arena::{Arena, ArenaId};
pub use rate::{Combine, EmpiricalSource, EmpiricalTable, RateDistribution};

/// Identifier of a cell type, unique within a population's type space
/// (`0 <= id < max_types`).
pub type TypeId = usize;
