//! Commonly used imports for convenience.
//!
//! # Example
//!
//! ```
//! use clonevo_sim::prelude::*;
//!
//! let config = PopulationBuilder::new(2)
//!     .clone_of(0, 5, 1.0, 0.0)
//!     .max_time(1.0)
//!     .build_config()
//!     .unwrap();
//! assert_eq!(config.clones.len(), 1);
//! ```

pub use crate::base::{Combine, EmpiricalSource, EmpiricalTable, RateDistribution, TypeId};
pub use crate::cells::{CellClone, CellType, TypeRegistry};
pub use crate::errors::{ConfigError, SimulationError};
pub use crate::evolution::{FitnessModel, MutationHandler};
pub use crate::simulation::{
    BirthRateMode, Configuration, Event, Population, PopulationBuilder, Process,
    ReplicateRunner, ReplicateSummary, Simulation, StopCondition, StopReason,
};
