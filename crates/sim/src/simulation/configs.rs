//! Scenario configuration.
//!
//! A [`Configuration`] fully describes a run: how it is executed, the
//! population's process and rate models, the mutation strategy and the
//! founder clones. It round-trips through JSON, so a saved configuration
//! plus its seed reproduces a run.

use crate::base::{EmpiricalSource, TypeId};
use crate::errors::ConfigError;
use crate::evolution::{FitnessModel, MutationHandler};
use crate::simulation::{BirthRateMode, Population, Process, StopCondition};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

fn default_replicates() -> usize {
    1
}

fn default_threads() -> usize {
    1
}

fn default_name() -> String {
    "clonevo".to_string()
}

/// The master configuration struct.
/// Can be deserialized from a file to fully reproduce a simulation setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub execution: ExecutionConfig,
    pub population: PopulationConfig,
    #[serde(default)]
    pub mutation: MutationHandler,
    pub clones: Vec<CloneConfig>,
}

/// How the run is executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Label used in log output
    #[serde(default = "default_name")]
    pub name: String,
    /// Number of independent replicates
    #[serde(default = "default_replicates")]
    pub replicates: usize,
    /// Optional RNG seed for reproducibility
    #[serde(default)]
    pub seed: Option<u64>,
    /// Worker threads for replicates
    #[serde(default = "default_threads")]
    pub threads: usize,
    pub stop: StopCondition,
}

/// Population-wide models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Size of the type id space
    pub max_types: usize,
    #[serde(default)]
    pub process: Process,
    /// Uniform per-cell death rate
    #[serde(default)]
    pub death_rate: f64,
    #[serde(default)]
    pub birth_rate_mode: BirthRateMode,
    #[serde(default)]
    pub fitness: FitnessModel,
    /// Per-type settings. Types listed here are registered even without
    /// founder clones.
    #[serde(default)]
    pub types: Vec<TypeConfig>,
}

/// Settings for one founder type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeConfig {
    pub id: TypeId,
    /// Overrides the uniform death rate for this type and its descendants
    #[serde(default)]
    pub death_rate: Option<f64>,
    #[serde(default)]
    pub empirical: Option<EmpiricalSource>,
}

/// A founder clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneConfig {
    pub type_id: TypeId,
    pub cells: u64,
    pub birth_rate: f64,
    #[serde(default)]
    pub mutation_probability: f64,
}

impl ExecutionConfig {
    pub fn new(stop: StopCondition, seed: Option<u64>) -> Self {
        Self {
            name: default_name(),
            replicates: default_replicates(),
            seed,
            threads: default_threads(),
            stop,
        }
    }
}

impl PopulationConfig {
    pub fn new(max_types: usize, process: Process) -> Self {
        Self {
            max_types,
            process,
            death_rate: 0.0,
            birth_rate_mode: BirthRateMode::default(),
            fitness: FitnessModel::default(),
            types: Vec::new(),
        }
    }
}

impl Configuration {
    /// Parse and validate a JSON scenario.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON scenario file.
    ///
    /// Relative empirical table paths are resolved against the directory
    /// holding the scenario.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&json)?;
        if let Some(dir) = path.parent() {
            for ty in &mut config.population.types {
                if let Some(EmpiricalSource::Path(table)) = &mut ty.empirical {
                    if table.is_relative() {
                        *table = dir.join(&*table);
                    }
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every range and cross-reference before anything is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let exec = &self.execution;
        if exec.replicates == 0 {
            return Err(ConfigError::invalid("execution.replicates", "must be at least 1"));
        }
        if exec.threads == 0 {
            return Err(ConfigError::invalid("execution.threads", "must be at least 1"));
        }
        exec.stop.validate()?;
        self.validate_population()
    }

    /// Check the population, mutation and founder sections only.
    pub fn validate_population(&self) -> Result<(), ConfigError> {
        let pop = &self.population;
        let max_types = pop.max_types;
        if max_types == 0 {
            return Err(ConfigError::invalid("population.max_types", "must be at least 1"));
        }
        if !(pop.death_rate.is_finite() && pop.death_rate >= 0.0) {
            return Err(ConfigError::invalid(
                "population.death_rate",
                format!("{} must be finite and non-negative", pop.death_rate),
            ));
        }
        pop.process.validate(max_types)?;
        pop.fitness.validate()?;
        self.mutation.validate(max_types)?;

        let mut seen = BTreeSet::new();
        for ty in &pop.types {
            if ty.id >= max_types {
                return Err(ConfigError::TypeOutOfRange { id: ty.id, max_types });
            }
            if !seen.insert(ty.id) {
                return Err(ConfigError::DuplicateType(ty.id));
            }
            if let Some(rate) = ty.death_rate {
                if !(rate.is_finite() && rate >= 0.0) {
                    return Err(ConfigError::invalid(
                        format!("types[{}].death_rate", ty.id),
                        format!("{rate} must be finite and non-negative"),
                    ));
                }
            }
        }

        if self.clones.is_empty() {
            return Err(ConfigError::EmptyPopulation);
        }
        for clone in &self.clones {
            let field = format!("clones[type {}]", clone.type_id);
            if clone.type_id >= max_types {
                return Err(ConfigError::TypeOutOfRange {
                    id: clone.type_id,
                    max_types,
                });
            }
            if clone.cells == 0 {
                return Err(ConfigError::invalid(field, "a clone needs at least one cell"));
            }
            if !(clone.birth_rate.is_finite() && clone.birth_rate >= 0.0) {
                return Err(ConfigError::invalid(
                    format!("{field}.birth_rate"),
                    format!("{} must be finite and non-negative", clone.birth_rate),
                ));
            }
            if !(0.0..=1.0).contains(&clone.mutation_probability) {
                return Err(ConfigError::invalid(
                    format!("{field}.mutation_probability"),
                    format!("{} is not a probability", clone.mutation_probability),
                ));
            }
            if clone.mutation_probability > 0.0 && self.mutation == MutationHandler::None {
                return Err(ConfigError::invalid(
                    format!("{field}.mutation_probability"),
                    "mutation is disabled but the clone can mutate",
                ));
            }
            pop.fitness
                .validate_founder_rate(clone.birth_rate, &format!("{field}.birth_rate"))?;
            if clone.mutation_probability > 0.0 {
                for (to, rate) in self.mutation.reachable_rates(clone.type_id, clone.birth_rate) {
                    pop.fitness.validate_founder_rate(
                        rate,
                        &format!("{field}.birth_rate (mutant type {to})"),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Build the initial population. Founder rates under per-draw and
    /// heritable models are drawn from `rng`.
    pub fn build_population<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Population, ConfigError> {
        let pop = &self.population;
        let mut population = Population::new(
            pop.max_types,
            pop.process.clone(),
            self.mutation.clone(),
            pop.fitness.clone(),
        );
        population.set_death_rate(pop.death_rate)?;
        population.set_birth_rate_mode(pop.birth_rate_mode);

        for ty in &pop.types {
            population.register_type(ty.id)?;
            if let Some(rate) = ty.death_rate {
                population.set_type_death_rate(ty.id, rate)?;
            }
            if let Some(source) = &ty.empirical {
                population.set_empirical_source(ty.id, source.clone())?;
            }
        }
        for clone in &self.clones {
            population.add_clone(
                clone.type_id,
                clone.cells,
                clone.birth_rate,
                clone.mutation_probability,
                rng,
            )?;
        }
        population.load_pending_tables()?;
        Ok(population)
    }
}
