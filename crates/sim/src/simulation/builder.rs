//! Builder pattern for creating populations and simulations.
//!
//! Provides a fluent API over [`Configuration`], with the same validation
//! the JSON path applies.

use crate::base::{EmpiricalSource, TypeId};
use crate::errors::ConfigError;
use crate::evolution::{FitnessModel, MutationHandler};
use crate::simulation::{
    BirthRateMode, CloneConfig, Configuration, ExecutionConfig, Population, PopulationConfig,
    Process, Simulation, StopCondition, TypeConfig,
};
use rand::Rng;

/// Builder for constructing populations and simulations with a fluent API.
///
/// # Examples
///
/// ```
/// use clonevo_sim::prelude::*;
/// use rand::SeedableRng;
/// use rand_xoshiro::Xoshiro256PlusPlus;
///
/// // A bare population for stepping by hand
/// let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
/// let population = PopulationBuilder::new(3)
///     .mutation(MutationHandler::ThreeTypes {
///         mu2: 0.0,
///         fit1: 0.5,
///         fit2: 1.0,
///         combine: Combine::Additive,
///     })
///     .clone_of(0, 10, 1.0, 0.01)
///     .build(&mut rng)
///     .unwrap();
/// assert_eq!(population.total_cells(), 10);
///
/// // A full simulation with a stop condition
/// let mut sim = PopulationBuilder::new(4)
///     .process(Process::Moran)
///     .clone_of(0, 10, 1.0, 0.0)
///     .clone_of(1, 10, 1.2, 0.0)
///     .max_steps(500)
///     .seed(42)
///     .build_simulation()
///     .unwrap();
/// sim.run().unwrap();
/// assert_eq!(sim.population().total_cells(), 20);
/// ```
#[derive(Debug, Clone)]
pub struct PopulationBuilder {
    config: Configuration,
}

impl PopulationBuilder {
    /// Start a branching population with a type space of `max_types` ids,
    /// no death, no mutation and fixed rates.
    pub fn new(max_types: usize) -> Self {
        Self {
            config: Configuration {
                execution: ExecutionConfig::new(StopCondition::default(), None),
                population: PopulationConfig::new(max_types, Process::Branching),
                mutation: MutationHandler::None,
                clones: Vec::new(),
            },
        }
    }

    pub fn process(mut self, process: Process) -> Self {
        self.config.population.process = process;
        self
    }

    /// Set the uniform death rate.
    pub fn death_rate(mut self, rate: f64) -> Self {
        self.config.population.death_rate = rate;
        self
    }

    /// Give one founder type its own death rate.
    pub fn type_death_rate(mut self, type_id: TypeId, rate: f64) -> Self {
        self.type_entry(type_id).death_rate = Some(rate);
        self
    }

    /// Attach an empirical table to a founder type.
    pub fn empirical(mut self, type_id: TypeId, source: EmpiricalSource) -> Self {
        self.type_entry(type_id).empirical = Some(source);
        self
    }

    pub fn birth_rate_mode(mut self, mode: BirthRateMode) -> Self {
        self.config.population.birth_rate_mode = mode;
        self
    }

    pub fn fitness(mut self, fitness: FitnessModel) -> Self {
        self.config.population.fitness = fitness;
        self
    }

    pub fn mutation(mut self, mutation: MutationHandler) -> Self {
        self.config.mutation = mutation;
        self
    }

    /// Add founder cells of one type.
    pub fn clone_of(
        mut self,
        type_id: TypeId,
        cells: u64,
        birth_rate: f64,
        mutation_probability: f64,
    ) -> Self {
        self.config.clones.push(CloneConfig {
            type_id,
            cells,
            birth_rate,
            mutation_probability,
        });
        self
    }

    pub fn stop(mut self, stop: StopCondition) -> Self {
        self.config.execution.stop = stop;
        self
    }

    pub fn max_time(mut self, max_time: f64) -> Self {
        self.config.execution.stop.max_time = Some(max_time);
        self
    }

    pub fn max_cells(mut self, max_cells: u64) -> Self {
        self.config.execution.stop.max_cells = Some(max_cells);
        self
    }

    pub fn max_steps(mut self, max_steps: u64) -> Self {
        self.config.execution.stop.max_steps = Some(max_steps);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.execution.seed = Some(seed);
        self
    }

    pub fn replicates(mut self, replicates: usize) -> Self {
        self.config.execution.replicates = replicates;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.config.execution.threads = threads;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.execution.name = name.into();
        self
    }

    fn type_entry(&mut self, type_id: TypeId) -> &mut TypeConfig {
        let types = &mut self.config.population.types;
        let index = match types.iter().position(|t| t.id == type_id) {
            Some(index) => index,
            None => {
                types.push(TypeConfig {
                    id: type_id,
                    death_rate: None,
                    empirical: None,
                });
                types.len() - 1
            }
        };
        &mut types[index]
    }

    /// Validate and return the full configuration.
    pub fn build_config(self) -> Result<Configuration, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build the initial population only. No stop condition is needed.
    pub fn build<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Population, ConfigError> {
        self.config.validate_population()?;
        self.config.build_population(rng)
    }

    /// Build a ready-to-run simulation.
    pub fn build_simulation(self) -> Result<Simulation, ConfigError> {
        let config = self.build_config()?;
        Simulation::from_config(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Combine;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_build_population() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let pop = PopulationBuilder::new(4)
            .death_rate(0.2)
            .type_death_rate(1, 0.7)
            .clone_of(0, 3, 1.0, 0.0)
            .clone_of(1, 2, 1.5, 0.0)
            .build(&mut rng)
            .unwrap();
        assert_eq!(pop.total_cells(), 5);
        assert!((pop.total_birth_rate() - 6.0).abs() < 1e-12);
        assert!((pop.total_death_rate() - (3.0 * 0.2 + 2.0 * 0.7)).abs() < 1e-12);
    }

    #[test]
    fn test_build_config_requires_stop() {
        let builder = PopulationBuilder::new(2).clone_of(0, 1, 1.0, 0.0);
        assert!(builder.clone().build_config().is_err());
        assert!(builder.max_time(1.0).build_config().is_ok());
    }

    #[test]
    fn test_type_entry_is_shared() {
        let config = PopulationBuilder::new(3)
            .type_death_rate(2, 0.5)
            .empirical(2, EmpiricalSource::Values(vec![1.0, 2.0]))
            .clone_of(2, 1, 1.0, 0.0)
            .max_steps(1)
            .build_config()
            .unwrap();
        assert_eq!(config.population.types.len(), 1);
        assert_eq!(config.population.types[0].death_rate, Some(0.5));
    }

    #[test]
    fn test_invalid_mutation_is_rejected() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let result = PopulationBuilder::new(2)
            .mutation(MutationHandler::ThreeTypes {
                mu2: 0.0,
                fit1: 0.1,
                fit2: 0.2,
                combine: Combine::Additive,
            })
            .clone_of(0, 1, 1.0, 0.1)
            .build(&mut rng);
        assert!(result.is_err());
    }
}
