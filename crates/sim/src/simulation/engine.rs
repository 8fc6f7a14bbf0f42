//! Single-replicate driver.
//!
//! A [`Simulation`] owns one population, the generator every draw comes
//! from, and the [`StopCondition`] evaluated before each event.

use crate::base::TypeId;
use crate::errors::{ConfigError, SimulationError};
use crate::simulation::{Configuration, Event, Population};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Steps between two checks of the cached birth mass.
const DRIFT_CHECK_INTERVAL: u64 = 10_000;

/// Relative drift above which the cached birth mass is rebuilt.
const DRIFT_TOLERANCE: f64 = 1e-9;

/// A type reaching a cell count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeThreshold {
    pub type_id: TypeId,
    pub cells: u64,
}

/// When to stop a replicate. Every populated criterion is checked before
/// each event; the first one met ends the run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StopCondition {
    pub max_time: Option<f64>,
    pub max_cells: Option<u64>,
    pub max_steps: Option<u64>,
    /// Stop once every type id is taken.
    pub stop_when_types_exhausted: bool,
    pub type_threshold: Option<TypeThreshold>,
    /// Stop when a single type is left alive after more than one existed.
    pub stop_when_single_type: bool,
}

/// Why a replicate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Extinct,
    /// The combined event rate dropped to zero.
    Stalled,
    MaxTime,
    MaxCells,
    MaxSteps,
    TypesExhausted,
    TypeThresholdReached,
    SingleType,
}

impl StopCondition {
    /// Stop after `max_time` units of simulated time.
    pub fn time(max_time: f64) -> Self {
        Self {
            max_time: Some(max_time),
            ..Self::default()
        }
    }

    /// Stop after `max_steps` events.
    pub fn steps(max_steps: u64) -> Self {
        Self {
            max_steps: Some(max_steps),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_time.is_none() && self.max_cells.is_none() && self.max_steps.is_none() {
            return Err(ConfigError::invalid(
                "stop",
                "at least one of max_time, max_cells or max_steps is required",
            ));
        }
        if let Some(t) = self.max_time {
            if !(t.is_finite() && t >= 0.0) {
                return Err(ConfigError::invalid(
                    "stop.max_time",
                    format!("{t} must be finite and non-negative"),
                ));
            }
        }
        Ok(())
    }

    /// The first criterion `population` meets, if any.
    pub fn check(&self, population: &Population) -> Option<StopReason> {
        if population.is_extinct() {
            return Some(StopReason::Extinct);
        }
        if self.max_time.is_some_and(|t| population.time() >= t) {
            return Some(StopReason::MaxTime);
        }
        if self.max_cells.is_some_and(|n| population.total_cells() >= n) {
            return Some(StopReason::MaxCells);
        }
        if self.max_steps.is_some_and(|n| population.steps() >= n) {
            return Some(StopReason::MaxSteps);
        }
        if self.stop_when_types_exhausted && population.no_types_left() {
            return Some(StopReason::TypesExhausted);
        }
        if let Some(threshold) = self.type_threshold {
            if population
                .cell_count(threshold.type_id)
                .is_some_and(|n| n >= threshold.cells)
            {
                return Some(StopReason::TypeThresholdReached);
            }
        }
        if self.stop_when_single_type
            && population.types().len() > 1
            && population.live_type_count() == 1
        {
            return Some(StopReason::SingleType);
        }
        None
    }
}

/// One replicate: a population, its generator and its stop condition.
#[derive(Debug, Clone)]
pub struct Simulation {
    population: Population,
    rng: Xoshiro256PlusPlus,
    stop: StopCondition,
}

impl Simulation {
    pub fn new(population: Population, rng: Xoshiro256PlusPlus, stop: StopCondition) -> Self {
        Self {
            population,
            rng,
            stop,
        }
    }

    /// Build a replicate from a validated configuration.
    ///
    /// The generator is seeded from `execution.seed`, or from the thread
    /// generator when no seed is given.
    pub fn from_config(config: &Configuration) -> Result<Self, ConfigError> {
        let rng = match config.execution.seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_seed(rand::rng().random()),
        };
        Self::from_config_with_rng(config, rng)
    }

    /// Build a replicate that draws from `rng`, founders included.
    pub fn from_config_with_rng(
        config: &Configuration,
        mut rng: Xoshiro256PlusPlus,
    ) -> Result<Self, ConfigError> {
        let population = config.build_population(&mut rng)?;
        Ok(Self::new(population, rng, config.execution.stop.clone()))
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn population_mut(&mut self) -> &mut Population {
        &mut self.population
    }

    pub fn stop_condition(&self) -> &StopCondition {
        &self.stop
    }

    pub fn into_population(self) -> Population {
        self.population
    }

    /// Advance the population by one event.
    pub fn step(&mut self) -> Result<Event, SimulationError> {
        let event = self.population.advance(&mut self.rng)?;
        let steps = self.population.steps();
        if steps > 0 && steps % DRIFT_CHECK_INTERVAL == 0 {
            self.check_drift();
        }
        Ok(event)
    }

    fn check_drift(&mut self) {
        let drift = self.population.birth_rate_drift();
        let scale = self.population.total_birth_rate().abs().max(1.0);
        if drift.abs() > DRIFT_TOLERANCE * scale {
            warn!(
                drift,
                steps = self.population.steps(),
                "cached birth mass drifted, rebuilding"
            );
            self.population.resync_birth_rate();
        }
    }

    /// Run until a stop criterion is met.
    pub fn run(&mut self) -> Result<StopReason, SimulationError> {
        self.run_with(|_, _| {})
    }

    /// Run until a stop criterion is met, calling `observer` after every
    /// event.
    pub fn run_with<F>(&mut self, mut observer: F) -> Result<StopReason, SimulationError>
    where
        F: FnMut(&Population, &Event),
    {
        loop {
            if let Some(reason) = self.stop.check(&self.population) {
                return Ok(reason);
            }
            let event = self.step()?;
            if event == Event::Stalled {
                return Ok(StopReason::Stalled);
            }
            observer(&self.population, &event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::{FitnessModel, MutationHandler};
    use crate::simulation::Process;

    fn simulation(
        stop: StopCondition,
        birth_rate: f64,
        death_rate: f64,
        mutation_probability: f64,
    ) -> Simulation {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
        let mut pop = Population::new(
            8,
            Process::Branching,
            MutationHandler::Neutral,
            FitnessModel::Fixed,
        );
        pop.set_death_rate(death_rate).unwrap();
        pop.add_clone(0, 10, birth_rate, mutation_probability, &mut rng).unwrap();
        Simulation::new(pop, rng, stop)
    }

    #[test]
    fn test_run_until_max_cells() {
        let stop = StopCondition {
            max_cells: Some(100),
            ..StopCondition::default()
        };
        let mut sim = simulation(stop, 1.0, 0.0, 0.0);
        assert_eq!(sim.run().unwrap(), StopReason::MaxCells);
        assert_eq!(sim.population().total_cells(), 100);
    }

    #[test]
    fn test_run_until_max_steps_with_observer() {
        let mut sim = simulation(StopCondition::steps(25), 1.0, 0.5, 0.05);
        let mut seen = 0;
        let reason = sim.run_with(|_, _| seen += 1).unwrap();
        match reason {
            StopReason::MaxSteps => assert_eq!(seen, 25),
            StopReason::Extinct => assert!(seen < 25),
            other => panic!("unexpected stop: {other:?}"),
        }
    }

    #[test]
    fn test_pure_death_goes_extinct() {
        let mut sim = simulation(StopCondition::time(1e9), 0.0, 1.0, 0.0);
        assert_eq!(sim.run().unwrap(), StopReason::Extinct);
    }

    #[test]
    fn test_zero_rates_stall() {
        let mut sim = simulation(StopCondition::time(10.0), 0.0, 0.0, 0.0);
        assert_eq!(sim.run().unwrap(), StopReason::Stalled);
        assert_eq!(sim.population().time(), 0.0);
    }

    #[test]
    fn test_types_exhausted() {
        let stop = StopCondition {
            max_steps: Some(1_000_000),
            stop_when_types_exhausted: true,
            ..StopCondition::default()
        };
        let mut sim = simulation(stop, 1.0, 0.0, 0.5);
        assert_eq!(sim.run().unwrap(), StopReason::TypesExhausted);
        assert!(sim.population().no_types_left());
    }

    #[test]
    fn test_type_threshold() {
        let stop = StopCondition {
            max_steps: Some(1_000_000),
            type_threshold: Some(TypeThreshold {
                type_id: 0,
                cells: 30,
            }),
            ..StopCondition::default()
        };
        let mut sim = simulation(stop, 1.0, 0.0, 0.0);
        assert_eq!(sim.run().unwrap(), StopReason::TypeThresholdReached);
        assert_eq!(sim.population().cell_count(0), Some(30));
    }

    #[test]
    fn test_validate_requires_a_bound() {
        assert!(StopCondition::default().validate().is_err());
        assert!(StopCondition::time(5.0).validate().is_ok());
        assert!(StopCondition::time(f64::NAN).validate().is_err());
    }
}
