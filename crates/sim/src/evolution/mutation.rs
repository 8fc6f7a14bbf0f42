//! Mutation strategies.
//!
//! A mutation handler is consulted when a reproducing cell mutates. Given the
//! mother's type, birth rate and mutation probability, it decides the
//! daughter's type and the daughter's starting rate and mutation probability.
//!
//! Strategies are deterministic in the type they resolve: asking twice for
//! the same transition from the same parent yields the same type id, and the
//! type is only created the first time. The available strategies are:
//!
//! - `none`: mutation is disabled and any call is an error.
//! - `three_types`: the forward chain `0 → 1 → 2` with fixed fitness effects.
//!   Type 2 is absorbing.
//! - `three_types_flex`: `k` parallel copies of the chain. Type 0 picks a
//!   block, then either steps to the block's intermediate type or jumps
//!   straight to its absorbing type.
//! - `neutral`: every mutation opens a new type with unchanged parameters.
//! - `graph`: an explicit transition graph with a per-type fitness table.

use crate::base::{Combine, TypeId};
use crate::cells::TypeRegistry;
use crate::errors::{ConfigError, SimulationError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

fn one_block() -> usize {
    1
}

/// Strategy deciding the type and parameters of a mutant daughter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MutationHandler {
    /// Mutation never happens.
    #[default]
    None,
    /// `0 → 1 → 2` with fitness effects `fit1` and `fit2`.
    ThreeTypes {
        /// Mutation probability given to type 1 cells.
        mu2: f64,
        fit1: f64,
        fit2: f64,
        #[serde(default)]
        combine: Combine,
    },
    /// `blocks` parallel three-type chains sharing type 0.
    ThreeTypesFlex {
        mu2: f64,
        fit1: f64,
        fit2: f64,
        /// Probability that type 0 skips the intermediate type.
        p_direct: f64,
        #[serde(default = "one_block")]
        blocks: usize,
        #[serde(default)]
        combine: Combine,
    },
    /// Each mutation opens the lowest free type id.
    Neutral,
    /// Uniform choice among the outgoing edges of the mother's type.
    Graph {
        /// Fitness of each type, indexed by type id.
        fitness: Vec<f64>,
        /// Outgoing edges of each type, indexed by type id.
        edges: Vec<Vec<TypeId>>,
        #[serde(default)]
        combine: Combine,
    },
}

/// Result of one mutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mutant {
    pub type_id: TypeId,
    /// Daughter birth rate before clamping.
    pub birth_rate: f64,
    pub mutation_probability: f64,
    /// The type was registered by this call.
    pub created: bool,
}

impl MutationHandler {
    pub fn name(&self) -> &'static str {
        match self {
            MutationHandler::None => "none",
            MutationHandler::ThreeTypes { .. } => "three_types",
            MutationHandler::ThreeTypesFlex { .. } => "three_types_flex",
            MutationHandler::Neutral => "neutral",
            MutationHandler::Graph { .. } => "graph",
        }
    }

    /// Build a strategy from its name and `key → value` parameters.
    ///
    /// Only strategies with scalar parameters can be built this way; `graph`
    /// needs its tables and must come from a configuration document.
    pub fn from_named(name: &str, params: &BTreeMap<String, f64>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            params
                .get(key)
                .copied()
                .ok_or_else(|| ConfigError::MissingParameter {
                    strategy: name.to_string(),
                    name: key.to_string(),
                })
        };
        let combine = match params.get("multiplicative") {
            Some(v) if *v != 0.0 => Combine::Multiplicative,
            _ => Combine::Additive,
        };

        let handler = match name {
            "none" => MutationHandler::None,
            "neutral" => MutationHandler::Neutral,
            "three_types" => MutationHandler::ThreeTypes {
                mu2: get("mu2")?,
                fit1: get("fit1")?,
                fit2: get("fit2")?,
                combine,
            },
            "three_types_mult" => MutationHandler::ThreeTypes {
                mu2: get("mu2")?,
                fit1: get("fit1")?,
                fit2: get("fit2")?,
                combine: Combine::Multiplicative,
            },
            "three_types_flex" => {
                let blocks = params.get("blocks").copied().unwrap_or(1.0);
                if blocks < 1.0 || blocks.fract() != 0.0 {
                    return Err(ConfigError::invalid(
                        "three_types_flex.blocks",
                        format!("{blocks} is not a positive integer"),
                    ));
                }
                MutationHandler::ThreeTypesFlex {
                    mu2: get("mu2")?,
                    fit1: get("fit1")?,
                    fit2: get("fit2")?,
                    p_direct: get("p_direct")?,
                    blocks: blocks as usize,
                    combine,
                }
            }
            "graph" => {
                return Err(ConfigError::invalid(
                    "graph",
                    "the graph strategy needs fitness and edge tables",
                ))
            }
            other => return Err(ConfigError::UnknownStrategy(other.to_string())),
        };
        Ok(handler)
    }

    /// Smallest type space the strategy can work in.
    pub fn required_types(&self) -> usize {
        match self {
            MutationHandler::None | MutationHandler::Neutral => 0,
            MutationHandler::ThreeTypes { .. } => 3,
            MutationHandler::ThreeTypesFlex { blocks, .. } => 2 * blocks + 1,
            MutationHandler::Graph { fitness, edges, .. } => fitness.len().max(edges.len()),
        }
    }

    /// Check parameter ranges against a type space of `max_types`.
    pub fn validate(&self, max_types: usize) -> Result<(), ConfigError> {
        let probability = |field: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::invalid(
                    format!("{}.{field}", self.name()),
                    format!("{value} is not a probability"),
                ))
            }
        };
        let finite = |field: &str, value: f64| {
            if value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::invalid(
                    format!("{}.{field}", self.name()),
                    format!("{value} is not finite"),
                ))
            }
        };

        match self {
            MutationHandler::None | MutationHandler::Neutral => {}
            MutationHandler::ThreeTypes {
                mu2,
                fit1,
                fit2,
                combine,
            } => {
                probability("mu2", *mu2)?;
                finite("fit1", *fit1)?;
                finite("fit2", *fit2)?;
                if *combine == Combine::Multiplicative && (*fit1 <= 0.0 || *fit2 <= 0.0) {
                    return Err(ConfigError::invalid(
                        "three_types",
                        "multiplicative fitness factors must be positive",
                    ));
                }
            }
            MutationHandler::ThreeTypesFlex {
                mu2,
                fit1,
                fit2,
                p_direct,
                blocks,
                combine,
            } => {
                probability("mu2", *mu2)?;
                probability("p_direct", *p_direct)?;
                finite("fit1", *fit1)?;
                finite("fit2", *fit2)?;
                if *blocks == 0 {
                    return Err(ConfigError::invalid(
                        "three_types_flex.blocks",
                        "at least one block is required",
                    ));
                }
                if *combine == Combine::Multiplicative && (*fit1 <= 0.0 || *fit2 <= 0.0) {
                    return Err(ConfigError::invalid(
                        "three_types_flex",
                        "multiplicative fitness factors must be positive",
                    ));
                }
            }
            MutationHandler::Graph {
                fitness,
                edges,
                combine,
            } => {
                if fitness.len() != edges.len() {
                    return Err(ConfigError::invalid(
                        "graph",
                        format!(
                            "fitness table has {} entries but edge table has {}",
                            fitness.len(),
                            edges.len()
                        ),
                    ));
                }
                for (from, targets) in edges.iter().enumerate() {
                    if let Some(&to) = targets.iter().find(|&&to| to >= fitness.len()) {
                        return Err(ConfigError::invalid(
                            "graph.edges",
                            format!("edge {from} → {to} leaves the graph"),
                        ));
                    }
                }
                for (i, f) in fitness.iter().enumerate() {
                    finite(&format!("fitness[{i}]"), *f)?;
                    if *combine == Combine::Multiplicative && *f <= 0.0 {
                        return Err(ConfigError::invalid(
                            format!("graph.fitness[{i}]"),
                            "multiplicative fitness must be positive",
                        ));
                    }
                }
            }
        }

        let required = self.required_types();
        if required > max_types {
            return Err(ConfigError::invalid(
                "max_types",
                format!(
                    "{} needs {required} types but only {max_types} are available",
                    self.name()
                ),
            ));
        }
        Ok(())
    }

    /// Rates the strategy assigns to the types reachable from a founder of
    /// `type_id` with rate `birth_rate`.
    ///
    /// For every strategy with fitness effects the rate of a type relative
    /// to the founder does not depend on the path taken, so each reachable
    /// type appears once. `neutral` keeps the founder's rate and reports
    /// nothing.
    pub fn reachable_rates(&self, type_id: TypeId, birth_rate: f64) -> Vec<(TypeId, f64)> {
        match self {
            MutationHandler::None | MutationHandler::Neutral => Vec::new(),

            MutationHandler::ThreeTypes {
                mu2,
                fit1,
                fit2,
                combine,
            } => match type_id {
                0 => {
                    let intermediate = combine.apply(birth_rate, *fit1);
                    let mut rates = vec![(1, intermediate)];
                    if *mu2 > 0.0 {
                        rates.push((2, step_to_final(*combine, intermediate, *fit1, *fit2)));
                    }
                    rates
                }
                1 => vec![(2, step_to_final(*combine, birth_rate, *fit1, *fit2))],
                _ => Vec::new(),
            },

            MutationHandler::ThreeTypesFlex {
                mu2,
                fit1,
                fit2,
                p_direct,
                blocks,
                combine,
            } => {
                if type_id == 0 {
                    // Blocks only differ in their ids; block 0 stands for all.
                    let mut rates = Vec::new();
                    if *p_direct < 1.0 {
                        let intermediate = combine.apply(birth_rate, *fit1);
                        rates.push((1, intermediate));
                        if *mu2 > 0.0 {
                            rates.push((2, step_to_final(*combine, intermediate, *fit1, *fit2)));
                        }
                    }
                    if *p_direct > 0.0 {
                        rates.push((2, combine.apply(birth_rate, *fit2)));
                    }
                    rates
                } else if type_id % 2 == 1 && type_id < 2 * blocks + 1 {
                    vec![(
                        type_id + 1,
                        step_to_final(*combine, birth_rate, *fit1, *fit2),
                    )]
                } else {
                    Vec::new()
                }
            }

            MutationHandler::Graph {
                fitness,
                edges,
                combine,
            } => {
                let Some(&origin) = fitness.get(type_id) else {
                    return Vec::new();
                };
                let mut seen = vec![false; fitness.len()];
                seen[type_id] = true;
                let mut queue = VecDeque::from([type_id]);
                let mut rates = Vec::new();
                while let Some(from) = queue.pop_front() {
                    for &to in edges.get(from).into_iter().flatten() {
                        if seen.get(to) != Some(&false) {
                            continue;
                        }
                        seen[to] = true;
                        queue.push_back(to);
                        let rate = match combine {
                            Combine::Additive => birth_rate + fitness[to] - origin,
                            Combine::Multiplicative => birth_rate * fitness[to] / origin,
                        };
                        rates.push((to, rate));
                    }
                }
                rates
            }
        }
    }

    /// Decide the daughter of a mutating cell of type `parent`.
    ///
    /// The resulting type is registered under `parent` if it does not exist
    /// yet.
    pub fn generate_mutant<R: Rng + ?Sized>(
        &self,
        types: &mut TypeRegistry,
        parent: TypeId,
        birth_rate: f64,
        mutation_probability: f64,
        rng: &mut R,
    ) -> Result<Mutant, SimulationError> {
        let (target, birth_rate, mutation_probability) = match self {
            MutationHandler::None => return Err(SimulationError::MutationDisabled),

            MutationHandler::ThreeTypes {
                mu2,
                fit1,
                fit2,
                combine,
            } => match parent {
                0 => (1, combine.apply(birth_rate, *fit1), *mu2),
                1 => (2, step_to_final(*combine, birth_rate, *fit1, *fit2), 0.0),
                _ => {
                    return Err(SimulationError::AbsorbingType {
                        strategy: "three_types",
                        type_id: parent,
                    })
                }
            },

            MutationHandler::ThreeTypesFlex {
                mu2,
                fit1,
                fit2,
                p_direct,
                blocks,
                combine,
            } => {
                if parent == 0 {
                    let block = rng.random_range(0..*blocks);
                    if rng.random::<f64>() < *p_direct {
                        (2 * block + 2, combine.apply(birth_rate, *fit2), 0.0)
                    } else {
                        (2 * block + 1, combine.apply(birth_rate, *fit1), *mu2)
                    }
                } else if parent % 2 == 1 && parent < 2 * blocks + 1 {
                    (
                        parent + 1,
                        step_to_final(*combine, birth_rate, *fit1, *fit2),
                        0.0,
                    )
                } else {
                    return Err(SimulationError::AbsorbingType {
                        strategy: "three_types_flex",
                        type_id: parent,
                    });
                }
            }

            MutationHandler::Neutral => {
                let next = types.next_free().ok_or(SimulationError::TypeSpaceExhausted {
                    max_types: types.max_types(),
                })?;
                (next, birth_rate, mutation_probability)
            }

            MutationHandler::Graph {
                fitness,
                edges,
                combine,
            } => {
                let targets = edges.get(parent).filter(|t| !t.is_empty()).ok_or(
                    SimulationError::AbsorbingType {
                        strategy: "graph",
                        type_id: parent,
                    },
                )?;
                let target = targets[rng.random_range(0..targets.len())];
                let rate = match combine {
                    Combine::Additive => birth_rate + fitness[target] - fitness[parent],
                    Combine::Multiplicative => birth_rate * fitness[target] / fitness[parent],
                };
                (target, rate, mutation_probability)
            }
        };

        let (type_id, created) = types.get_or_insert_child(target, parent)?;
        if created {
            debug!(
                strategy = self.name(),
                parent, type_id, birth_rate, "registered mutant type"
            );
        }
        Ok(Mutant {
            type_id,
            birth_rate,
            mutation_probability,
            created,
        })
    }
}

/// Rate after the intermediate → absorbing step. A multiplicative chain
/// ends at `fit2` relative to the founder, so the step divides out `fit1`.
fn step_to_final(combine: Combine, birth_rate: f64, fit1: f64, fit2: f64) -> f64 {
    match combine {
        Combine::Additive => birth_rate + fit2,
        Combine::Multiplicative => birth_rate * fit2 / fit1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn registry(max_types: usize, roots: &[TypeId]) -> TypeRegistry {
        let mut reg = TypeRegistry::new(max_types);
        for &id in roots {
            reg.insert_root(id).unwrap();
        }
        reg
    }

    fn three_types(combine: Combine) -> MutationHandler {
        MutationHandler::ThreeTypes {
            mu2: 0.01,
            fit1: 0.5,
            fit2: 1.0,
            combine,
        }
    }

    #[test]
    fn test_three_types_additive_chain() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut reg = registry(3, &[0]);
        let handler = three_types(Combine::Additive);

        let m = handler
            .generate_mutant(&mut reg, 0, 1.0, 1.0, &mut rng)
            .unwrap();
        assert_eq!(m.type_id, 1);
        assert_eq!(m.birth_rate, 1.5);
        assert_eq!(m.mutation_probability, 0.01);
        assert!(m.created);

        let m = handler
            .generate_mutant(&mut reg, 1, 1.5, 0.01, &mut rng)
            .unwrap();
        assert_eq!(m.type_id, 2);
        assert_eq!(m.birth_rate, 2.5);
        assert_eq!(m.mutation_probability, 0.0);
        assert_eq!(reg.get(2).unwrap().parent(), Some(1));
    }

    #[test]
    fn test_three_types_multiplicative_chain() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut reg = registry(3, &[0]);
        let handler = MutationHandler::ThreeTypes {
            mu2: 0.0,
            fit1: 2.0,
            fit2: 3.0,
            combine: Combine::Multiplicative,
        };
        let m1 = handler
            .generate_mutant(&mut reg, 0, 1.0, 1.0, &mut rng)
            .unwrap();
        assert_eq!(m1.birth_rate, 2.0);
        let m2 = handler
            .generate_mutant(&mut reg, 1, m1.birth_rate, 0.0, &mut rng)
            .unwrap();
        assert!((m2.birth_rate - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_three_types_absorbing() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut reg = registry(3, &[0, 2]);
        let handler = three_types(Combine::Additive);
        assert!(matches!(
            handler.generate_mutant(&mut reg, 2, 1.0, 1.0, &mut rng),
            Err(SimulationError::AbsorbingType { type_id: 2, .. })
        ));
    }

    #[test]
    fn test_three_types_reuses_type() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut reg = registry(3, &[0]);
        let handler = three_types(Combine::Additive);
        let a = handler
            .generate_mutant(&mut reg, 0, 1.0, 1.0, &mut rng)
            .unwrap();
        let b = handler
            .generate_mutant(&mut reg, 0, 1.0, 1.0, &mut rng)
            .unwrap();
        assert_eq!(a.type_id, b.type_id);
        assert!(!b.created);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(0).unwrap().children(), &[1]);
    }

    #[test]
    fn test_flex_direct_and_indirect() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let mut reg = registry(5, &[0]);
        let direct = MutationHandler::ThreeTypesFlex {
            mu2: 0.2,
            fit1: 0.1,
            fit2: 0.4,
            p_direct: 1.0,
            blocks: 2,
            combine: Combine::Additive,
        };
        for _ in 0..20 {
            let m = direct
                .generate_mutant(&mut reg, 0, 1.0, 0.5, &mut rng)
                .unwrap();
            assert!(m.type_id == 2 || m.type_id == 4);
            assert_eq!(m.birth_rate, 1.4);
            assert_eq!(m.mutation_probability, 0.0);
        }

        let indirect = MutationHandler::ThreeTypesFlex {
            mu2: 0.2,
            fit1: 0.1,
            fit2: 0.4,
            p_direct: 0.0,
            blocks: 2,
            combine: Combine::Additive,
        };
        let m = indirect
            .generate_mutant(&mut reg, 0, 1.0, 0.5, &mut rng)
            .unwrap();
        assert!(m.type_id == 1 || m.type_id == 3);
        assert_eq!(m.mutation_probability, 0.2);

        let next = indirect
            .generate_mutant(&mut reg, m.type_id, m.birth_rate, 0.2, &mut rng)
            .unwrap();
        assert_eq!(next.type_id, m.type_id + 1);
        assert!(matches!(
            indirect.generate_mutant(&mut reg, next.type_id, 1.0, 0.0, &mut rng),
            Err(SimulationError::AbsorbingType { .. })
        ));
    }

    #[test]
    fn test_flex_multiplicative_routes_agree() {
        let flex = |p_direct: f64| MutationHandler::ThreeTypesFlex {
            mu2: 0.2,
            fit1: 1.5,
            fit2: 3.0,
            p_direct,
            blocks: 3,
            combine: Combine::Multiplicative,
        };
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);

        let mut reg = registry(7, &[0]);
        for _ in 0..10 {
            let m = flex(1.0)
                .generate_mutant(&mut reg, 0, 2.0, 0.5, &mut rng)
                .unwrap();
            assert_eq!(m.type_id % 2, 0);
            assert_eq!(m.birth_rate, 6.0);
        }

        let mut reg = registry(7, &[0]);
        for _ in 0..10 {
            let first = flex(0.0)
                .generate_mutant(&mut reg, 0, 2.0, 0.5, &mut rng)
                .unwrap();
            assert_eq!(first.type_id % 2, 1);
            assert_eq!(first.birth_rate, 3.0);
            let last = flex(0.0)
                .generate_mutant(&mut reg, first.type_id, first.birth_rate, 0.2, &mut rng)
                .unwrap();
            assert_eq!(last.type_id, first.type_id + 1);
            assert_eq!(last.birth_rate, 6.0);
        }
    }

    #[test]
    fn test_named_multiplicative_chain() {
        let params = BTreeMap::from([
            ("mu2".to_string(), 0.1),
            ("fit1".to_string(), 0.5),
            ("fit2".to_string(), 2.0),
        ]);
        let handler = MutationHandler::from_named("three_types_mult", &params).unwrap();
        assert_eq!(
            handler,
            MutationHandler::ThreeTypes {
                mu2: 0.1,
                fit1: 0.5,
                fit2: 2.0,
                combine: Combine::Multiplicative,
            }
        );

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let mut reg = registry(3, &[0]);
        let first = handler
            .generate_mutant(&mut reg, 0, 1.0, 1.0, &mut rng)
            .unwrap();
        assert_eq!(first.birth_rate, 0.5);
        let last = handler
            .generate_mutant(&mut reg, 1, first.birth_rate, 0.1, &mut rng)
            .unwrap();
        assert_eq!(last.type_id, 2);
        assert_eq!(last.birth_rate, 2.0);
    }

    #[test]
    fn test_reachable_rates() {
        assert_eq!(
            three_types(Combine::Additive).reachable_rates(0, 1.0),
            vec![(1, 1.5), (2, 2.5)]
        );
        assert_eq!(
            three_types(Combine::Additive).reachable_rates(2, 1.0),
            Vec::new()
        );
        let graph = MutationHandler::Graph {
            fitness: vec![1.0, 1.5, 2.0],
            edges: vec![vec![2], vec![], vec![1]],
            combine: Combine::Additive,
        };
        assert_eq!(graph.reachable_rates(0, 1.0), vec![(2, 2.0), (1, 1.5)]);
        assert!(MutationHandler::Neutral.reachable_rates(0, 1.0).is_empty());
    }

    #[test]
    fn test_neutral_exhausts_type_space() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut reg = registry(2, &[0]);
        let m = MutationHandler::Neutral
            .generate_mutant(&mut reg, 0, 1.2, 0.3, &mut rng)
            .unwrap();
        assert_eq!((m.type_id, m.birth_rate, m.mutation_probability), (1, 1.2, 0.3));
        assert!(matches!(
            MutationHandler::Neutral.generate_mutant(&mut reg, 1, 1.2, 0.3, &mut rng),
            Err(SimulationError::TypeSpaceExhausted { max_types: 2 })
        ));
    }

    #[test]
    fn test_none_is_an_error() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut reg = registry(2, &[0]);
        assert!(matches!(
            MutationHandler::None.generate_mutant(&mut reg, 0, 1.0, 0.0, &mut rng),
            Err(SimulationError::MutationDisabled)
        ));
    }

    #[test]
    fn test_graph_single_edge_is_idempotent() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut reg = registry(3, &[0]);
        let handler = MutationHandler::Graph {
            fitness: vec![1.0, 1.5, 2.0],
            edges: vec![vec![2], vec![], vec![1]],
            combine: Combine::Additive,
        };
        let a = handler
            .generate_mutant(&mut reg, 0, 1.0, 0.1, &mut rng)
            .unwrap();
        let b = handler
            .generate_mutant(&mut reg, 0, 1.0, 0.1, &mut rng)
            .unwrap();
        assert_eq!(a.type_id, 2);
        assert_eq!(b.type_id, 2);
        assert_eq!(a.birth_rate, 2.0);
        assert!(a.created && !b.created);
        assert!(matches!(
            handler.generate_mutant(&mut reg, 1, 1.0, 0.1, &mut rng),
            Err(SimulationError::AbsorbingType { type_id: 1, .. })
        ));
    }

    #[test]
    fn test_from_named() {
        let mut params = BTreeMap::new();
        params.insert("mu2".to_string(), 0.1);
        params.insert("fit1".to_string(), 0.2);
        assert!(matches!(
            MutationHandler::from_named("three_types", &params),
            Err(ConfigError::MissingParameter { .. })
        ));
        params.insert("fit2".to_string(), 0.3);
        assert_eq!(
            MutationHandler::from_named("three_types", &params).unwrap(),
            three_types_with(0.1, 0.2, 0.3)
        );
        assert!(matches!(
            MutationHandler::from_named("bogus", &params),
            Err(ConfigError::UnknownStrategy(_))
        ));
        assert_eq!(
            MutationHandler::from_named("neutral", &BTreeMap::new()).unwrap(),
            MutationHandler::Neutral
        );
    }

    fn three_types_with(mu2: f64, fit1: f64, fit2: f64) -> MutationHandler {
        MutationHandler::ThreeTypes {
            mu2,
            fit1,
            fit2,
            combine: Combine::Additive,
        }
    }

    #[test]
    fn test_validate() {
        assert!(three_types(Combine::Additive).validate(2).is_err());
        assert!(three_types(Combine::Additive).validate(3).is_ok());
        let bad = MutationHandler::ThreeTypes {
            mu2: 1.5,
            fit1: 0.1,
            fit2: 0.1,
            combine: Combine::Additive,
        };
        assert!(bad.validate(3).is_err());
        let graph = MutationHandler::Graph {
            fitness: vec![1.0, 2.0],
            edges: vec![vec![5], vec![]],
            combine: Combine::Additive,
        };
        assert!(graph.validate(2).is_err());
    }

    #[test]
    fn test_deserialize_strategy() {
        let handler: MutationHandler = serde_json::from_str(
            r#"{"strategy": "three_types", "mu2": 0.0, "fit1": 0.5, "fit2": 1.0}"#,
        )
        .unwrap();
        assert_eq!(handler, three_types_with(0.0, 0.5, 1.0));
        assert!(serde_json::from_str::<MutationHandler>(r#"{"strategy": "psychic"}"#).is_err());
    }
}
