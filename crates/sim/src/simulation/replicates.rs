//! Independent replicates on a worker pool.
//!
//! Replicate `i` draws from the base generator advanced by `i` jumps, so
//! every replicate has its own non-overlapping stream and the outcome of a
//! seeded run does not depend on the thread count.

use crate::errors::{ConfigError, SimulationError};
use crate::simulation::{Configuration, LineageEntry, Simulation, StopReason};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Final state of one replicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateSummary {
    pub index: usize,
    /// Base seed of the run this replicate belongs to.
    pub seed: u64,
    pub stop_reason: StopReason,
    pub time: f64,
    pub cells: u64,
    pub steps: u64,
    pub lineage: Vec<LineageEntry>,
}

/// Runs `execution.replicates` simulations of one configuration.
#[derive(Debug, Clone)]
pub struct ReplicateRunner {
    config: Configuration,
    seed: u64,
}

impl ReplicateRunner {
    /// Validate `config` and fix the base seed. Unseeded configurations get
    /// a seed from the thread generator, reported in every summary.
    pub fn new(config: Configuration) -> Result<Self, ConfigError> {
        config.validate()?;
        let seed = config.execution.seed.unwrap_or_else(|| rand::rng().random());
        Ok(Self { config, seed })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Generator for replicate `index`.
    pub fn replicate_rng(&self, index: usize) -> Xoshiro256PlusPlus {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed);
        for _ in 0..index {
            rng.jump();
        }
        rng
    }

    /// Run one replicate to completion.
    pub fn run_one(&self, index: usize) -> Result<ReplicateSummary, SimulationError> {
        let name = &self.config.execution.name;
        info!(%name, index, seed = self.seed, "replicate started");
        let mut sim = Simulation::from_config_with_rng(&self.config, self.replicate_rng(index))?;
        let stop_reason = sim.run()?;
        let population = sim.population();
        info!(
            %name,
            index,
            ?stop_reason,
            time = population.time(),
            cells = population.total_cells(),
            "replicate finished"
        );
        Ok(ReplicateSummary {
            index,
            seed: self.seed,
            stop_reason,
            time: population.time(),
            cells: population.total_cells(),
            steps: population.steps(),
            lineage: population.lineage(),
        })
    }

    /// Run every replicate on a dedicated pool of `execution.threads`
    /// workers. Outcomes are ordered by replicate index; a failed replicate
    /// does not stop the others.
    pub fn run(&self) -> Result<Vec<Result<ReplicateSummary, SimulationError>>, SimulationError> {
        let exec = &self.config.execution;
        let pool = ThreadPoolBuilder::new()
            .num_threads(exec.threads)
            .build()
            .map_err(|e| SimulationError::WorkerPool(e.to_string()))?;

        let outcomes = pool.install(|| {
            (0..exec.replicates)
                .into_par_iter()
                .map(|index| {
                    let outcome = self.run_one(index);
                    if let Err(e) = &outcome {
                        warn!(name = %exec.name, index, error = %e, "replicate aborted");
                    }
                    outcome
                })
                .collect::<Vec<_>>()
        });
        Ok(outcomes)
    }
}
