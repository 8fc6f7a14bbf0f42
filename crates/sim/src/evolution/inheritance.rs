//! Fitness inheritance.
//!
//! A [`FitnessModel`] decides how a daughter's birth rate relates to her
//! mother's. It is population-wide and consulted on every reproduction:
//!
//! - **fixed**: the daughter copies the mother's rate.
//! - **per draw**: every daughter draws an independent rate around the
//!   type-level mean. Nothing is inherited beyond the mean.
//! - **heritable**: the daughter draws around the mother's current rate and
//!   that draw becomes the baseline for her own descendants.
//! - **reset, fixed generations**: a clone carries exactly `N` active
//!   alterations. Each reproduction evicts the oldest and appends a new one.
//! - **reset, memoryless**: each active alteration is lost with probability
//!   `decay` per generation and a Poisson number of new ones is added.
//!
//! Removing an alteration undoes it with the same combination rule that
//! applied it.

use crate::base::{Combine, EmpiricalTable, RateDistribution, TypeId};
use crate::cells::{CellClone, Offspring, TypeRegistry};
use crate::errors::{ConfigError, SimulationError};
use crate::evolution::MutationHandler;
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How birth rates are passed from mother to daughter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum FitnessModel {
    #[default]
    Fixed,
    PerDraw {
        distribution: RateDistribution,
        #[serde(default)]
        combine: Combine,
    },
    Heritable {
        distribution: RateDistribution,
        #[serde(default)]
        combine: Combine,
    },
    ResetFixed {
        distribution: RateDistribution,
        #[serde(default)]
        combine: Combine,
        /// Number of alterations each clone carries.
        generations: usize,
    },
    ResetMemoryless {
        distribution: RateDistribution,
        #[serde(default)]
        combine: Combine,
        /// Per-generation probability that an alteration is lost.
        decay: f64,
        /// Mean number of new alterations per generation.
        mean_new: f64,
    },
}

impl FitnessModel {
    pub fn name(&self) -> &'static str {
        match self {
            FitnessModel::Fixed => "fixed",
            FitnessModel::PerDraw { .. } => "per_draw",
            FitnessModel::Heritable { .. } => "heritable",
            FitnessModel::ResetFixed { .. } => "reset_fixed",
            FitnessModel::ResetMemoryless { .. } => "reset_memoryless",
        }
    }

    pub fn distribution(&self) -> Option<&RateDistribution> {
        match self {
            FitnessModel::Fixed => None,
            FitnessModel::PerDraw { distribution, .. }
            | FitnessModel::Heritable { distribution, .. }
            | FitnessModel::ResetFixed { distribution, .. }
            | FitnessModel::ResetMemoryless { distribution, .. } => Some(distribution),
        }
    }

    pub fn combine(&self) -> Combine {
        match self {
            FitnessModel::Fixed => Combine::Additive,
            FitnessModel::PerDraw { combine, .. }
            | FitnessModel::Heritable { combine, .. }
            | FitnessModel::ResetFixed { combine, .. }
            | FitnessModel::ResetMemoryless { combine, .. } => *combine,
        }
    }

    /// Whether clones of this model need an empirical table on their type.
    pub fn needs_table(&self) -> bool {
        self.distribution().is_some_and(RateDistribution::needs_table)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(distribution) = self.distribution() {
            distribution.validate()?;
        }
        match *self {
            FitnessModel::ResetFixed { generations, .. } if generations == 0 => Err(
                ConfigError::invalid("reset_fixed.generations", "must be at least 1"),
            ),
            FitnessModel::ResetMemoryless {
                decay, mean_new, ..
            } => {
                if !(0.0..=1.0).contains(&decay) {
                    return Err(ConfigError::invalid(
                        "reset_memoryless.decay",
                        format!("{decay} is not a probability"),
                    ));
                }
                if !mean_new.is_finite() || mean_new < 0.0 {
                    return Err(ConfigError::invalid(
                        "reset_memoryless.mean_new",
                        format!("{mean_new} must be finite and non-negative"),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Check a founder rate against the distribution's requirements.
    pub fn validate_founder_rate(&self, birth_rate: f64, field: &str) -> Result<(), ConfigError> {
        match self.distribution() {
            Some(distribution) => distribution.validate_mean(birth_rate, field),
            None => Ok(()),
        }
    }

    /// Founder clones are expanded into single cells with drawn rates.
    pub fn expands_founders(&self) -> bool {
        matches!(
            self,
            FitnessModel::PerDraw { .. } | FitnessModel::Heritable { .. }
        )
    }

    /// Rate handed to the mutation handler for a mutating clone.
    ///
    /// Per-draw and reset clones mutate their baseline; the others mutate
    /// their current rate.
    pub fn mutation_input(&self, clone: &CellClone) -> f64 {
        match self {
            FitnessModel::Fixed | FitnessModel::Heritable { .. } => clone.birth_rate,
            FitnessModel::PerDraw { .. }
            | FitnessModel::ResetFixed { .. }
            | FitnessModel::ResetMemoryless { .. } => clone.base_rate,
        }
    }

    /// Build the founder clones for `cells` cells of `type_id`.
    pub fn founder_clones<R: Rng + ?Sized>(
        &self,
        type_id: TypeId,
        cells: u64,
        birth_rate: f64,
        mutation_probability: f64,
        table: Option<&EmpiricalTable>,
        rng: &mut R,
    ) -> Result<Vec<CellClone>, SimulationError> {
        let single = |rate: f64| {
            let mut clone = CellClone::new(type_id, 1, rate, mutation_probability);
            clone.raw_rate = rate;
            clone
        };
        match self {
            FitnessModel::Fixed => Ok(vec![CellClone::new(
                type_id,
                cells,
                birth_rate,
                mutation_probability,
            )]),
            FitnessModel::PerDraw {
                distribution,
                combine,
            } => (0..cells)
                .map(|_| -> Result<CellClone, SimulationError> {
                    let rate = perturb(distribution, *combine, birth_rate, table, rng)?;
                    let mut clone = single(rate);
                    clone.base_rate = birth_rate;
                    Ok(clone)
                })
                .collect(),
            FitnessModel::Heritable {
                distribution,
                combine,
            } => (0..cells)
                .map(|_| perturb(distribution, *combine, birth_rate, table, rng).map(&single))
                .collect(),
            FitnessModel::ResetFixed {
                combine,
                generations,
                ..
            } => {
                let mut clone = CellClone::new(type_id, cells, birth_rate, mutation_probability);
                clone.alterations = std::iter::repeat(combine.identity())
                    .take(*generations)
                    .collect();
                Ok(vec![clone])
            }
            FitnessModel::ResetMemoryless { .. } => Ok(vec![CellClone::new(
                type_id,
                cells,
                birth_rate,
                mutation_probability,
            )]),
        }
    }

    /// Plan the daughter of one reproduction of `mother`.
    ///
    /// The mother is not modified. If she mutates, `mutation` resolves the
    /// daughter's type, which may register a new type in `types`.
    pub fn plan_offspring<R: Rng + ?Sized>(
        &self,
        mother: &CellClone,
        mutation: &MutationHandler,
        types: &mut TypeRegistry,
        rng: &mut R,
    ) -> Result<Offspring, SimulationError> {
        let mutates =
            mother.mutation_probability > 0.0 && rng.random::<f64>() < mother.mutation_probability;

        let mut offspring = mother.copy_offspring();
        let input = self.mutation_input(mother);
        let mut baseline = input;
        if mutates {
            let mutant = mutation.generate_mutant(
                types,
                mother.type_id,
                input,
                mother.mutation_probability,
                rng,
            )?;
            offspring.type_id = mutant.type_id;
            offspring.mutation_probability = mutant.mutation_probability;
            offspring.mutant = true;
            offspring.identical = false;
            baseline = mutant.birth_rate;
        }

        let table = types.get(offspring.type_id).and_then(|t| t.empirical());

        match self {
            FitnessModel::Fixed => {
                if mutates {
                    set_rate(&mut offspring, baseline, baseline);
                }
            }
            FitnessModel::PerDraw {
                distribution,
                combine,
            } => {
                let rate = perturb(distribution, *combine, baseline, table, rng)?;
                set_rate(&mut offspring, baseline, rate);
                offspring.identical = false;
            }
            FitnessModel::Heritable {
                distribution,
                combine,
            } => {
                let rate = perturb(distribution, *combine, baseline, table, rng)?;
                set_rate(&mut offspring, rate, rate);
                offspring.identical = false;
            }
            FitnessModel::ResetFixed {
                distribution,
                combine,
                ..
            } => {
                if mutates {
                    let raw = combine.fold(baseline, &offspring.alterations);
                    set_rate(&mut offspring, baseline, raw);
                }
                let mut raw = offspring.raw_rate;
                if let Some(oldest) = offspring.alterations.pop_front() {
                    raw = combine.remove(raw, oldest);
                }
                let fresh = distribution.draw_alteration(*combine, raw.max(0.0), table, rng)?;
                offspring.alterations.push_back(fresh);
                offspring.raw_rate = combine.apply(raw, fresh);
                offspring.birth_rate = offspring.raw_rate.max(0.0);
                offspring.identical = false;
            }
            FitnessModel::ResetMemoryless {
                distribution,
                combine,
                decay,
                mean_new,
            } => {
                if mutates {
                    let raw = combine.fold(baseline, &offspring.alterations);
                    set_rate(&mut offspring, baseline, raw);
                }
                let mut raw = offspring.raw_rate;
                let mut kept = VecDeque::with_capacity(offspring.alterations.len());
                for alteration in offspring.alterations.drain(..) {
                    if rng.random::<f64>() < *decay {
                        raw = combine.remove(raw, alteration);
                    } else {
                        kept.push_back(alteration);
                    }
                }
                if *mean_new > 0.0 {
                    let poisson =
                        Poisson::new(*mean_new).map_err(|e| SimulationError::Distribution {
                            kind: "poisson",
                            reason: e.to_string(),
                        })?;
                    let count: f64 = poisson.sample(rng);
                    for _ in 0..count as usize {
                        let fresh =
                            distribution.draw_alteration(*combine, raw.max(0.0), table, rng)?;
                        raw = combine.apply(raw, fresh);
                        kept.push_back(fresh);
                    }
                }
                offspring.alterations = kept;
                offspring.raw_rate = raw;
                offspring.birth_rate = raw.max(0.0);
                offspring.identical = false;
            }
        }
        Ok(offspring)
    }
}

/// Draw one rate around `mean` using the model's combination rule.
fn perturb<R: Rng + ?Sized>(
    distribution: &RateDistribution,
    combine: Combine,
    mean: f64,
    table: Option<&EmpiricalTable>,
    rng: &mut R,
) -> Result<f64, SimulationError> {
    let alteration = distribution.draw_alteration(combine, mean, table, rng)?;
    Ok(combine.apply(mean, alteration).max(0.0))
}

fn set_rate(offspring: &mut Offspring, base: f64, raw: f64) {
    offspring.base_rate = base;
    offspring.raw_rate = raw;
    offspring.birth_rate = raw.max(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn registry() -> TypeRegistry {
        let mut reg = TypeRegistry::new(8);
        reg.insert_root(0).unwrap();
        reg
    }

    fn lognormal() -> RateDistribution {
        RateDistribution::LogNormal { variance: 0.1 }
    }

    #[test]
    fn test_fixed_copies_mother() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut reg = registry();
        let mother = CellClone::new(0, 5, 1.2, 0.0);
        let child = FitnessModel::Fixed
            .plan_offspring(&mother, &MutationHandler::None, &mut reg, &mut rng)
            .unwrap();
        assert!(child.identical);
        assert!(!child.mutant);
        assert_eq!(child.birth_rate, 1.2);
    }

    #[test]
    fn test_fixed_mutant_takes_handler_rate() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut reg = registry();
        let mother = CellClone::new(0, 5, 1.0, 1.0);
        let handler = MutationHandler::ThreeTypes {
            mu2: 0.0,
            fit1: 0.5,
            fit2: 0.5,
            combine: Combine::Additive,
        };
        let child = FitnessModel::Fixed
            .plan_offspring(&mother, &handler, &mut reg, &mut rng)
            .unwrap();
        assert!(child.mutant);
        assert!(!child.identical);
        assert_eq!(child.type_id, 1);
        assert_eq!(child.birth_rate, 1.5);
        assert_eq!(child.mutation_probability, 0.0);
    }

    #[test]
    fn test_per_draw_keeps_type_mean() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        let mut reg = registry();
        let model = FitnessModel::PerDraw {
            distribution: lognormal(),
            combine: Combine::Additive,
        };
        let founders = model
            .founder_clones(0, 4, 2.0, 0.0, None, &mut rng)
            .unwrap();
        assert_eq!(founders.len(), 4);
        let mother = &founders[0];
        assert_eq!(mother.base_rate(), 2.0);
        let child = model
            .plan_offspring(mother, &MutationHandler::None, &mut reg, &mut rng)
            .unwrap();
        assert_eq!(child.base_rate, 2.0);
        assert!(!child.identical);
    }

    #[test]
    fn test_heritable_baseline_moves() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let mut reg = registry();
        let model = FitnessModel::Heritable {
            distribution: RateDistribution::Gamma { variance: 0.5 },
            combine: Combine::Additive,
        };
        let mother = CellClone::new(0, 1, 1.0, 0.0);
        let child = model
            .plan_offspring(&mother, &MutationHandler::None, &mut reg, &mut rng)
            .unwrap();
        assert_eq!(child.base_rate, child.birth_rate);
        assert_ne!(child.birth_rate, 1.0);
        assert!(child.birth_rate >= 0.0);
    }

    #[test]
    fn test_reset_fixed_queue_length() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);
        let mut reg = registry();
        for generations in 1..5 {
            let model = FitnessModel::ResetFixed {
                distribution: lognormal(),
                combine: Combine::Multiplicative,
                generations,
            };
            let founders = model
                .founder_clones(0, 10, 1.0, 0.0, None, &mut rng)
                .unwrap();
            assert_eq!(founders.len(), 1);
            assert_eq!(founders[0].birth_rate(), 1.0);
            assert_eq!(founders[0].alterations().len(), generations);

            let mut clone = founders[0].clone();
            for _ in 0..20 {
                let child = model
                    .plan_offspring(&clone, &MutationHandler::None, &mut reg, &mut rng)
                    .unwrap();
                assert_eq!(child.alterations.len(), generations);
                let expected = Combine::Multiplicative.fold(1.0, &child.alterations);
                assert!((child.raw_rate - expected).abs() < 1e-9);
                clone = CellClone::from_offspring(child);
            }
        }
    }

    #[test]
    fn test_reset_memoryless_full_decay() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let mut reg = registry();
        let model = FitnessModel::ResetMemoryless {
            distribution: RateDistribution::DoubleExponential { variance: 0.2 },
            combine: Combine::Additive,
            decay: 1.0,
            mean_new: 0.0,
        };
        let mut mother = CellClone::new(0, 1, 1.0, 0.0);
        mother.alterations = VecDeque::from(vec![0.1, 0.2]);
        mother.raw_rate = 1.3;
        mother.birth_rate = 1.3;
        let child = model
            .plan_offspring(&mother, &MutationHandler::None, &mut reg, &mut rng)
            .unwrap();
        assert!(child.alterations.is_empty());
        assert!((child.birth_rate - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_reset_memoryless_adds_alterations() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(6);
        let mut reg = registry();
        let model = FitnessModel::ResetMemoryless {
            distribution: lognormal(),
            combine: Combine::Additive,
            decay: 0.0,
            mean_new: 3.0,
        };
        let mut clone = CellClone::new(0, 1, 1.0, 0.0);
        for _ in 0..50 {
            let before = clone.alterations().len();
            let child = model
                .plan_offspring(&clone, &MutationHandler::None, &mut reg, &mut rng)
                .unwrap();
            assert!(child.alterations.len() >= before);
            clone = CellClone::from_offspring(child);
        }
        assert!(clone.alterations().len() > 50);
    }

    #[test]
    fn test_empirical_without_table_is_an_error() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let mut reg = registry();
        let model = FitnessModel::Heritable {
            distribution: RateDistribution::Empirical {
                location: 0.0,
                scale: 1.0,
            },
            combine: Combine::Additive,
        };
        let mother = CellClone::new(0, 1, 1.0, 0.0);
        assert!(matches!(
            model.plan_offspring(&mother, &MutationHandler::None, &mut reg, &mut rng),
            Err(SimulationError::Distribution { .. })
        ));
    }

    #[test]
    fn test_validate() {
        assert!(FitnessModel::ResetFixed {
            distribution: lognormal(),
            combine: Combine::Additive,
            generations: 0,
        }
        .validate()
        .is_err());
        assert!(FitnessModel::ResetMemoryless {
            distribution: lognormal(),
            combine: Combine::Additive,
            decay: 1.5,
            mean_new: 1.0,
        }
        .validate()
        .is_err());
        assert!(FitnessModel::Fixed.validate().is_ok());
    }

    #[test]
    fn test_deserialize_nested_distribution() {
        let model: FitnessModel = serde_json::from_str(
            r#"{"model": "reset_fixed", "generations": 3,
                "distribution": {"kind": "gamma", "variance": 0.2},
                "combine": "multiplicative"}"#,
        )
        .unwrap();
        assert_eq!(
            model,
            FitnessModel::ResetFixed {
                distribution: RateDistribution::Gamma { variance: 0.2 },
                combine: Combine::Multiplicative,
                generations: 3,
            }
        );
    }
}
