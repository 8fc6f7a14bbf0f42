use crate::base::{ArenaId, TypeId};
use std::collections::VecDeque;

/// A group of identical cells sharing one birth rate and one mutation
/// probability.
///
/// Clones of the same type are chained through `prev`/`next` handles into
/// the owning [`CellType`](super::CellType)'s membership list.
#[derive(Debug, Clone, PartialEq)]
pub struct CellClone {
    pub(crate) type_id: TypeId,
    pub(crate) cell_count: u64,
    /// Effective per-cell birth rate, never negative.
    pub(crate) birth_rate: f64,
    pub(crate) mutation_probability: f64,
    /// Rate the perturbations are applied to. For per-draw models this is
    /// the type-level mean; for reset models the rate before alterations.
    pub(crate) base_rate: f64,
    /// `base_rate` with every active alteration applied, before clamping.
    pub(crate) raw_rate: f64,
    /// Active rate alterations, oldest first.
    pub(crate) alterations: VecDeque<f64>,
    /// Random-walk state used by the synchronous process.
    pub(crate) walk: f64,
    pub(crate) prev: Option<ArenaId>,
    pub(crate) next: Option<ArenaId>,
}

impl CellClone {
    /// Create an unlinked clone with a fixed rate.
    pub fn new(type_id: TypeId, cell_count: u64, birth_rate: f64, mutation_probability: f64) -> Self {
        Self {
            type_id,
            cell_count,
            birth_rate: birth_rate.max(0.0),
            mutation_probability,
            base_rate: birth_rate,
            raw_rate: birth_rate,
            alterations: VecDeque::new(),
            walk: 0.0,
            prev: None,
            next: None,
        }
    }

    /// Materialise an offspring as a new single-cell clone.
    pub fn from_offspring(offspring: Offspring) -> Self {
        Self {
            type_id: offspring.type_id,
            cell_count: 1,
            birth_rate: offspring.birth_rate,
            mutation_probability: offspring.mutation_probability,
            base_rate: offspring.base_rate,
            raw_rate: offspring.raw_rate,
            alterations: offspring.alterations,
            walk: 0.0,
            prev: None,
            next: None,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn cell_count(&self) -> u64 {
        self.cell_count
    }

    pub fn birth_rate(&self) -> f64 {
        self.birth_rate
    }

    pub fn mutation_probability(&self) -> f64 {
        self.mutation_probability
    }

    pub fn base_rate(&self) -> f64 {
        self.base_rate
    }

    pub fn raw_rate(&self) -> f64 {
        self.raw_rate
    }

    pub fn alterations(&self) -> &VecDeque<f64> {
        &self.alterations
    }

    pub fn walk(&self) -> f64 {
        self.walk
    }

    /// Total birth mass, `birth_rate * cell_count`.
    #[inline]
    pub fn birth_mass(&self) -> f64 {
        self.birth_rate * self.cell_count as f64
    }

    /// Next clone of the same type.
    pub fn next(&self) -> Option<ArenaId> {
        self.next
    }

    /// Previous clone of the same type.
    pub fn prev(&self) -> Option<ArenaId> {
        self.prev
    }

    /// An offspring that is an exact copy of one of this clone's cells.
    pub fn copy_offspring(&self) -> Offspring {
        Offspring {
            type_id: self.type_id,
            birth_rate: self.birth_rate,
            raw_rate: self.raw_rate,
            base_rate: self.base_rate,
            mutation_probability: self.mutation_probability,
            alterations: self.alterations.clone(),
            mutant: false,
            identical: true,
        }
    }
}

/// The daughter cell planned by a reproduction, before it is placed.
///
/// Planning never touches the mother, so a Moran step can plan the birth,
/// apply the death (which may remove the mother) and only then place the
/// daughter.
#[derive(Debug, Clone, PartialEq)]
pub struct Offspring {
    pub type_id: TypeId,
    pub birth_rate: f64,
    pub raw_rate: f64,
    pub base_rate: f64,
    pub mutation_probability: f64,
    pub alterations: VecDeque<f64>,
    /// Produced by the mutation handler.
    pub mutant: bool,
    /// Indistinguishable from the mother, so it can join her clone.
    pub identical: bool,
}

impl Offspring {
    /// Bit-exact key used to merge identical offspring into one clone.
    pub(crate) fn merge_key(&self) -> (TypeId, u64, u64, u64, Vec<u64>) {
        (
            self.type_id,
            self.birth_rate.to_bits(),
            self.mutation_probability.to_bits(),
            self.base_rate.to_bits(),
            self.alterations.iter().map(|a| a.to_bits()).collect(),
        )
    }
}
