//! Population state, event loops and run drivers.
//!
//! - `Population`: clone arena, type registry and aggregates.
//! - `Process`: which event loop `Population::advance` runs.
//! - `Configuration` / `PopulationBuilder`: the two ways to set a run up.
//! - `Simulation`: one replicate driven to a `StopCondition`.
//! - `ReplicateRunner`: many replicates on a worker pool.

pub mod builder;
pub mod configs;
pub mod engine;
pub mod lineage;
pub mod population;
pub mod process;
pub mod replicates;

pub use builder::PopulationBuilder;
pub use configs::{CloneConfig, Configuration, ExecutionConfig, PopulationConfig, TypeConfig};
pub use engine::{Simulation, StopCondition, StopReason, TypeThreshold};
pub use lineage::LineageEntry;
pub use population::{BirthRateMode, Population, Weight};
pub use process::{BirthRecord, DeathRecord, Event, Process};
pub use replicates::{ReplicateRunner, ReplicateSummary};
