//! Event loop variants.
//!
//! [`Population::advance`] performs exactly one state transition of the
//! configured [`Process`]:
//!
//! - **Branching**: the exact continuous-time birth–death process. The
//!   waiting time is exponential with rate `total_birth + total_death` and a
//!   single birth or death is chosen in proportion to its rate.
//! - **Moran**: one death (uniform over cells) and one birth (weighted by
//!   birth rate) per step, so the population size never changes.
//! - **Synchronous**: every clone advances a shared random walk and loses a
//!   binomial number of cells in one tick. When the walk crosses the
//!   threshold every surviving cell reproduces. Births and deaths are
//!   applied after the full pass.
//! - **Two-sex**: the population is rebuilt each generation from offspring of
//!   mother/father pairs drawn from the female and male types.

use crate::base::{ArenaId, TypeId};
use crate::cells::{CellClone, Offspring, TypeClones};
use crate::errors::{ConfigError, SimulationError};
use crate::simulation::{Population, Weight};
use rand::Rng;
use rand_distr::{Binomial, Distribution, Exp, StandardNormal};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::trace;

fn default_threshold() -> f64 {
    1.0
}

/// The stochastic process driving a population.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Process {
    #[default]
    Branching,
    Moran,
    Synchronous {
        /// Length of one tick.
        timestep: f64,
        /// Scale of the Gaussian noise in the reproduction walk.
        #[serde(default)]
        noise: f64,
        /// Walk level at which a clone reproduces.
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    TwoSex {
        female_types: BTreeSet<TypeId>,
        male_types: BTreeSet<TypeId>,
    },
}

impl Process {
    pub fn name(&self) -> &'static str {
        match self {
            Process::Branching => "branching",
            Process::Moran => "moran",
            Process::Synchronous { .. } => "synchronous",
            Process::TwoSex { .. } => "two_sex",
        }
    }

    pub fn validate(&self, max_types: usize) -> Result<(), ConfigError> {
        match self {
            Process::Branching | Process::Moran => Ok(()),
            Process::Synchronous {
                timestep,
                noise,
                threshold,
            } => {
                if !(timestep.is_finite() && *timestep > 0.0) {
                    return Err(ConfigError::invalid(
                        "synchronous.timestep",
                        format!("{timestep} must be positive"),
                    ));
                }
                if !(noise.is_finite() && *noise >= 0.0) {
                    return Err(ConfigError::invalid(
                        "synchronous.noise",
                        format!("{noise} must be non-negative"),
                    ));
                }
                if !(threshold.is_finite() && *threshold > 0.0) {
                    return Err(ConfigError::invalid(
                        "synchronous.threshold",
                        format!("{threshold} must be positive"),
                    ));
                }
                Ok(())
            }
            Process::TwoSex {
                female_types,
                male_types,
            } => {
                if female_types.is_empty() || male_types.is_empty() {
                    return Err(ConfigError::invalid(
                        "two_sex",
                        "both sexes need at least one type",
                    ));
                }
                if let Some(id) = female_types.intersection(male_types).next() {
                    return Err(ConfigError::invalid(
                        "two_sex",
                        format!("type {id} is listed as both female and male"),
                    ));
                }
                if let Some(&id) = female_types.iter().chain(male_types).find(|&&id| id >= max_types) {
                    return Err(ConfigError::TypeOutOfRange { id, max_types });
                }
                Ok(())
            }
        }
    }
}

/// A reproduction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BirthRecord {
    pub mother_type: TypeId,
    pub daughter_type: TypeId,
    pub mother_rate: f64,
    pub daughter_rate: f64,
    /// The daughter was produced by the mutation handler.
    pub mutant: bool,
    /// The mutation registered a new type.
    pub new_type: bool,
}

/// A death.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeathRecord {
    pub type_id: TypeId,
    /// The dying cell was the last of its clone.
    pub clone_removed: bool,
}

/// What one call to [`Population::advance`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Birth(BirthRecord),
    Death(DeathRecord),
    /// A Moran step.
    Exchange {
        death: DeathRecord,
        birth: BirthRecord,
    },
    /// A synchronous tick.
    Tick { births: u64, deaths: u64 },
    /// A two-sex generation.
    Generation { offspring: u64 },
    /// No event can happen: the combined rate is zero. Time is not advanced.
    Stalled,
}

impl Population {
    /// Perform exactly one transition of the configured process.
    ///
    /// Fails on an extinct population or when an event hits a precondition
    /// violation; the population must then be discarded.
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Event, SimulationError> {
        if self.is_extinct() {
            return Err(SimulationError::EmptyPopulation);
        }
        let event = match self.process {
            Process::Branching => self.advance_branching(rng)?,
            Process::Moran => self.advance_moran(rng)?,
            Process::Synchronous {
                timestep,
                noise,
                threshold,
            } => self.advance_synchronous(timestep, noise, threshold, rng)?,
            Process::TwoSex { .. } => self.advance_two_sex(rng)?,
        };
        trace!(time = self.time, cells = self.total_cells, ?event, "advance");
        Ok(event)
    }

    fn advance_branching<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Event, SimulationError> {
        let total_death = self.total_death_rate();
        let total_birth = self.current_birth_rate();
        let total = total_birth + total_death;
        if !(total > 0.0) {
            return Ok(Event::Stalled);
        }

        let wait = Exp::new(total).map_err(|e| SimulationError::Distribution {
            kind: "exponential",
            reason: e.to_string(),
        })?;
        self.time += wait.sample(rng);
        self.steps += 1;

        // The totals only split birth from death. Selection recomputes the
        // per-type weights and draws its own threshold; it must not reuse
        // these totals.
        if rng.random::<f64>() * total < total_death {
            let dead = self.select(self.death_weight(), rng)?;
            Ok(Event::Death(self.remove_cell(dead)?))
        } else {
            let mother = self.select(Weight::Birth, rng)?;
            Ok(Event::Birth(self.reproduce(mother, rng)?))
        }
    }

    fn advance_moran<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Event, SimulationError> {
        if !(self.current_birth_rate() > 0.0) {
            return Ok(Event::Stalled);
        }
        let dead = self.select(Weight::Cells, rng)?;
        let mother = self.select(Weight::Birth, rng)?;

        let (offspring, birth) = self.plan_birth(mother, rng)?;
        let death = self.remove_cell(dead)?;
        self.place_offspring(mother, offspring, &birth)?;

        self.time += 1.0;
        self.steps += 1;
        Ok(Event::Exchange { death, birth })
    }

    fn advance_synchronous<R: Rng + ?Sized>(
        &mut self,
        dt: f64,
        noise: f64,
        threshold: f64,
        rng: &mut R,
    ) -> Result<Event, SimulationError> {
        let live: Vec<ArenaId> = self
            .types
            .iter()
            .filter(|t| !t.is_extinct())
            .flat_map(|t| TypeClones::new(&self.clones, t.head).map(|(id, _)| id))
            .collect();

        let mut reproducers: Vec<(ArenaId, u64)> = Vec::new();
        let mut dying: Vec<(ArenaId, u64)> = Vec::new();
        for id in live {
            let death_rate = {
                let clone = self.clones.get(id).ok_or(SimulationError::EmptyClone)?;
                let cell_type = self
                    .types
                    .get(clone.type_id)
                    .ok_or(SimulationError::UnknownType(clone.type_id))?;
                self.death_rate_of(cell_type)
            };
            let clone = self.clones.get_mut(id).ok_or(SimulationError::EmptyClone)?;

            // Cells of a clone share one walk, so a crossing makes every
            // surviving cell reproduce.
            let z: f64 = StandardNormal.sample(rng);
            clone.walk = (clone.walk + clone.birth_rate * dt + noise * dt.sqrt() * z).abs();
            let reproduces = clone.walk >= threshold;
            if reproduces {
                clone.walk -= threshold;
            }

            let p_death = 1.0 - (-death_rate * dt).exp();
            let deaths = if p_death > 0.0 {
                Binomial::new(clone.cell_count, p_death)
                    .map_err(|e| SimulationError::Distribution {
                        kind: "binomial",
                        reason: e.to_string(),
                    })?
                    .sample(rng)
            } else {
                0
            };
            let survivors = clone.cell_count - deaths;
            if deaths > 0 {
                dying.push((id, deaths));
            }
            if reproduces && survivors > 0 {
                reproducers.push((id, survivors));
            }
        }

        let births: u64 = reproducers.iter().map(|&(_, n)| n).sum();
        let deaths: u64 = dying.iter().map(|&(_, n)| n).sum();
        for &(mother, count) in &reproducers {
            for _ in 0..count {
                self.reproduce(mother, rng)?;
            }
        }
        for &(dead, count) in &dying {
            for _ in 0..count {
                self.remove_cell(dead)?;
            }
        }

        self.time += dt;
        self.steps += 1;
        Ok(Event::Tick { births, deaths })
    }

    fn advance_two_sex<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Event, SimulationError> {
        let Process::TwoSex {
            female_types,
            male_types,
        } = &self.process
        else {
            return Ok(Event::Stalled);
        };
        let mut females = female_types.clone();
        let mut males = male_types.clone();

        let birth_mass = |pop: &Population, ids: &BTreeSet<TypeId>| -> f64 {
            ids.iter().filter_map(|&id| pop.birth_mass(id)).sum()
        };
        if !(birth_mass(self, &females) > 0.0 && birth_mass(self, &males) > 0.0) {
            return Ok(Event::Stalled);
        }

        let draws = self.total_cells;
        let mut offspring: Vec<Offspring> = Vec::with_capacity(draws as usize);
        for _ in 0..draws {
            let mother = self.select_where(Weight::Birth, |id| females.contains(&id), rng)?;
            let father = self.select_where(Weight::Birth, |id| males.contains(&id), rng)?;
            let daughter = rng.random_bool(0.5);
            let parent = if daughter { mother } else { father };

            let (child, record) = self.plan_birth(parent, rng)?;
            if record.mutant {
                if daughter {
                    females.insert(child.type_id);
                } else {
                    males.insert(child.type_id);
                }
            }
            offspring.push(child);
        }

        self.clear_clones();
        let mut merged: Vec<(Offspring, u64)> = Vec::new();
        let mut index: HashMap<_, usize> = HashMap::new();
        for child in offspring {
            match index.get(&child.merge_key()) {
                Some(&i) => merged[i].1 += 1,
                None => {
                    index.insert(child.merge_key(), merged.len());
                    merged.push((child, 1));
                }
            }
        }
        for (child, count) in merged {
            let mut clone = CellClone::from_offspring(child);
            clone.cell_count = count;
            self.insert_clone(clone)?;
        }

        if let Process::TwoSex {
            female_types,
            male_types,
        } = &mut self.process
        {
            *female_types = females;
            *male_types = males;
        }
        self.time += 1.0;
        self.steps += 1;
        Ok(Event::Generation { offspring: draws })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Combine, RateDistribution};
    use crate::evolution::{FitnessModel, MutationHandler};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn rng(seed: u64) -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(seed)
    }

    fn population(process: Process, mutation: MutationHandler, max_types: usize) -> Population {
        Population::new(max_types, process, mutation, FitnessModel::Fixed)
    }

    #[test]
    fn test_advance_extinct_population_fails() {
        let mut rng = rng(1);
        let mut pop = population(Process::Branching, MutationHandler::None, 1);
        assert!(matches!(
            pop.advance(&mut rng),
            Err(SimulationError::EmptyPopulation)
        ));
    }

    #[test]
    fn test_branching_pure_birth() {
        let mut rng = rng(2);
        let mut pop = population(Process::Branching, MutationHandler::None, 1);
        pop.add_clone(0, 1, 1.0, 0.0, &mut rng).unwrap();
        let mut last_time = 0.0;
        for i in 0..50 {
            let event = pop.advance(&mut rng).unwrap();
            assert!(matches!(event, Event::Birth(_)));
            assert!(pop.time() > last_time);
            last_time = pop.time();
            assert_eq!(pop.total_cells(), i + 2);
        }
        assert_eq!(pop.clone_count(), 1);
    }

    #[test]
    fn test_branching_stalls_at_zero_rate() {
        let mut rng = rng(3);
        let mut pop = population(Process::Branching, MutationHandler::None, 1);
        pop.add_clone(0, 3, 0.0, 0.0, &mut rng).unwrap();
        assert_eq!(pop.advance(&mut rng).unwrap(), Event::Stalled);
        assert_eq!(pop.time(), 0.0);
        assert_eq!(pop.steps(), 0);
    }

    #[test]
    fn test_branching_pure_death() {
        let mut rng = rng(4);
        let mut pop = population(Process::Branching, MutationHandler::None, 1);
        pop.set_death_rate(1.0).unwrap();
        pop.add_clone(0, 5, 0.0, 0.0, &mut rng).unwrap();
        for _ in 0..5 {
            assert!(matches!(pop.advance(&mut rng).unwrap(), Event::Death(_)));
        }
        assert!(pop.is_extinct());
        assert!(pop.advance(&mut rng).is_err());
    }

    #[test]
    fn test_moran_keeps_size() {
        let mut rng = rng(5);
        let mut pop = population(Process::Moran, MutationHandler::None, 2);
        pop.add_clone(0, 5, 1.0, 0.0, &mut rng).unwrap();
        pop.add_clone(1, 5, 2.0, 0.0, &mut rng).unwrap();
        for step in 1..=500 {
            if pop.is_extinct() {
                break;
            }
            let event = pop.advance(&mut rng).unwrap();
            assert!(matches!(event, Event::Exchange { .. }));
            assert_eq!(pop.total_cells(), 10);
            assert_eq!(pop.time(), step as f64);
        }
    }

    #[test]
    fn test_synchronous_tick() {
        let mut rng = rng(6);
        let process = Process::Synchronous {
            timestep: 0.5,
            noise: 0.0,
            threshold: 1.0,
        };
        let mut pop = population(process, MutationHandler::None, 1);
        pop.add_clone(0, 1, 1.0, 0.0, &mut rng).unwrap();

        let event = pop.advance(&mut rng).unwrap();
        assert_eq!(event, Event::Tick { births: 0, deaths: 0 });
        let event = pop.advance(&mut rng).unwrap();
        assert_eq!(event, Event::Tick { births: 1, deaths: 0 });
        assert_eq!(pop.total_cells(), 2);
        assert_eq!(pop.time(), 1.0);
    }

    #[test]
    fn test_synchronous_death_wins_over_birth() {
        let mut rng = rng(7);
        let process = Process::Synchronous {
            timestep: 1.0,
            noise: 0.0,
            threshold: 0.5,
        };
        let mut pop = population(process, MutationHandler::None, 1);
        pop.set_death_rate(1e6).unwrap();
        pop.add_clone(0, 1, 1.0, 0.0, &mut rng).unwrap();
        let event = pop.advance(&mut rng).unwrap();
        assert_eq!(event, Event::Tick { births: 0, deaths: 1 });
        assert!(pop.is_extinct());
    }

    #[test]
    fn test_synchronous_births_scale_with_clone_size() {
        let mut rng = rng(12);
        let process = Process::Synchronous {
            timestep: 1.0,
            noise: 0.0,
            threshold: 1.0,
        };
        let mut pop = population(process, MutationHandler::None, 1);
        pop.add_clone(0, 100, 1.0, 0.0, &mut rng).unwrap();

        let event = pop.advance(&mut rng).unwrap();
        assert_eq!(event, Event::Tick { births: 100, deaths: 0 });
        assert_eq!(pop.total_cells(), 200);
        assert_eq!(pop.clone_count(), 1);
        let event = pop.advance(&mut rng).unwrap();
        assert_eq!(event, Event::Tick { births: 200, deaths: 0 });
        assert_eq!(pop.total_cells(), 400);
        assert!((pop.total_birth_rate() - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_synchronous_deaths_scale_with_clone_size() {
        let mut rng = rng(13);
        let process = Process::Synchronous {
            timestep: 1.0,
            noise: 0.0,
            threshold: 1.0,
        };
        let mut pop = population(process, MutationHandler::None, 1);
        // Each cell dies with probability one half per tick.
        pop.set_death_rate(std::f64::consts::LN_2).unwrap();
        pop.add_clone(0, 1_000, 0.0, 0.0, &mut rng).unwrap();

        let Event::Tick { births, deaths } = pop.advance(&mut rng).unwrap() else {
            panic!("expected a tick");
        };
        assert_eq!(births, 0);
        assert!((400..=600).contains(&deaths), "{deaths} deaths");
        assert_eq!(pop.total_cells(), 1_000 - deaths);
    }

    #[test]
    fn test_two_sex_generation() {
        let mut rng = rng(8);
        let process = Process::TwoSex {
            female_types: BTreeSet::from([0]),
            male_types: BTreeSet::from([1]),
        };
        let mut pop = population(process, MutationHandler::None, 2);
        pop.add_clone(0, 10, 1.0, 0.0, &mut rng).unwrap();
        pop.add_clone(1, 10, 1.0, 0.0, &mut rng).unwrap();

        let event = pop.advance(&mut rng).unwrap();
        assert_eq!(event, Event::Generation { offspring: 20 });
        assert_eq!(pop.total_cells(), 20);
        assert_eq!(
            pop.cell_count(0).unwrap() + pop.cell_count(1).unwrap(),
            20
        );
        // identical offspring merge back into one clone per type
        assert!(pop.clone_count() <= 2);
        assert_eq!(pop.types().len(), 2);
    }

    #[test]
    fn test_two_sex_mutant_joins_parent_sex() {
        let mut rng = rng(9);
        let process = Process::TwoSex {
            female_types: BTreeSet::from([0]),
            male_types: BTreeSet::from([1]),
        };
        let mut pop = population(process, MutationHandler::Neutral, 64);
        pop.add_clone(0, 4, 1.0, 0.5, &mut rng).unwrap();
        pop.add_clone(1, 4, 1.0, 0.0, &mut rng).unwrap();
        for _ in 0..3 {
            if pop.is_extinct() {
                break;
            }
            pop.advance(&mut rng).unwrap();
        }
        if let Process::TwoSex {
            female_types,
            male_types,
        } = pop.process()
        {
            assert!(female_types.is_disjoint(male_types));
            assert!(male_types.contains(&1));
        }
    }

    #[test]
    fn test_heritable_branching_keeps_aggregates() {
        let mut rng = rng(10);
        let mut pop = Population::new(
            1,
            Process::Branching,
            MutationHandler::None,
            FitnessModel::Heritable {
                distribution: RateDistribution::LogNormal { variance: 0.05 },
                combine: Combine::Multiplicative,
            },
        );
        pop.set_death_rate(0.5).unwrap();
        pop.add_clone(0, 20, 1.0, 0.0, &mut rng).unwrap();
        for _ in 0..2_000 {
            if pop.is_extinct() {
                break;
            }
            pop.advance(&mut rng).unwrap();
            assert!(pop.birth_rate_drift().abs() < 1e-6);
            let cells: u64 = pop.clones().map(|(_, c)| c.cell_count()).sum();
            assert_eq!(cells, pop.total_cells());
        }
    }

    #[test]
    fn test_validate_two_sex() {
        let overlap = Process::TwoSex {
            female_types: BTreeSet::from([0, 1]),
            male_types: BTreeSet::from([1]),
        };
        assert!(overlap.validate(4).is_err());
        let out_of_range = Process::TwoSex {
            female_types: BTreeSet::from([0]),
            male_types: BTreeSet::from([9]),
        };
        assert!(matches!(
            out_of_range.validate(4),
            Err(ConfigError::TypeOutOfRange { id: 9, .. })
        ));
        let bad_step = Process::Synchronous {
            timestep: 0.0,
            noise: 0.0,
            threshold: 1.0,
        };
        assert!(bad_step.validate(1).is_err());
    }
}
