//! Population state and bookkeeping.
//!
//! A [`Population`] owns the type registry, the arena of clones and the
//! population-wide aggregates (cell count, birth mass, elapsed time). Every
//! structural change goes through a small set of methods here so that
//!
//! ```text
//! total_cells == Σ type.num_cells == Σ clone.cell_count
//! total_birth ≈ Σ clone.birth_rate * clone.cell_count
//! ```
//!
//! holds after every event. The event loop itself lives in
//! [`process`](super::process).
//!
//! Weighted selection is a linear scan: first over types in registration
//! order, skipping extinct ones, then over the chosen type's clones. It costs
//! O(live types + clones of one type) per draw.

use crate::base::{Arena, ArenaId, EmpiricalSource, EmpiricalTable, TypeId};
use crate::cells::{CellClone, CellType, Offspring, TypeClones, TypeRegistry};
use crate::errors::{ConfigError, SimulationError};
use crate::evolution::{FitnessModel, MutationHandler};
use crate::simulation::process::{BirthRecord, DeathRecord, Process};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the total birth mass is obtained on each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BirthRateMode {
    /// Use the incrementally maintained aggregate.
    #[default]
    Cached,
    /// Rescan every clone on every step.
    Recalculate,
}

/// What a weighted selection is proportional to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weight {
    /// Cell count.
    Cells,
    /// `death_rate * cell_count`, with per-type death rates.
    Death,
    /// `birth_rate * cell_count`.
    Birth,
}

impl Weight {
    /// Label used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Weight::Cells => "cell",
            Weight::Death => "death",
            Weight::Birth => "birth",
        }
    }
}

/// Cells of all types, grouped into clones, plus the simulation clock.
#[derive(Debug, Clone)]
pub struct Population {
    pub(crate) types: TypeRegistry,
    pub(crate) clones: Arena<CellClone>,
    pub(crate) mutation: MutationHandler,
    pub(crate) fitness: FitnessModel,
    pub(crate) process: Process,
    death_rate: f64,
    per_type_death: bool,
    birth_mode: BirthRateMode,
    pub(crate) total_cells: u64,
    pub(crate) total_birth: f64,
    pub(crate) time: f64,
    pub(crate) steps: u64,
    last_birth: Option<(f64, f64)>,
}

impl Population {
    /// Create an empty population with a type space of `max_types` ids.
    pub fn new(
        max_types: usize,
        process: Process,
        mutation: MutationHandler,
        fitness: FitnessModel,
    ) -> Self {
        Self {
            types: TypeRegistry::new(max_types),
            clones: Arena::new(),
            mutation,
            fitness,
            process,
            death_rate: 0.0,
            per_type_death: false,
            birth_mode: BirthRateMode::Cached,
            total_cells: 0,
            total_birth: 0.0,
            time: 0.0,
            steps: 0,
            last_birth: None,
        }
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    /// Set the uniform death rate.
    pub fn set_death_rate(&mut self, rate: f64) -> Result<(), ConfigError> {
        check_rate("death_rate", rate)?;
        self.death_rate = rate;
        Ok(())
    }

    /// Give `type_id` its own death rate. From then on deaths are weighted
    /// per type; types without an override use the uniform rate.
    pub fn set_type_death_rate(&mut self, type_id: TypeId, rate: f64) -> Result<(), ConfigError> {
        check_rate("type death_rate", rate)?;
        let cell_type = self
            .types
            .get_mut(type_id)
            .ok_or_else(|| ConfigError::invalid("death_rate", format!("type {type_id} is not registered")))?;
        cell_type.set_death_rate(Some(rate));
        self.per_type_death = true;
        Ok(())
    }

    /// Choose how the total birth mass is obtained on each step.
    pub fn set_birth_rate_mode(&mut self, mode: BirthRateMode) {
        self.birth_mode = mode;
    }

    /// Register a founder type with no clones yet.
    pub fn register_type(&mut self, type_id: TypeId) -> Result<(), ConfigError> {
        self.types.insert_root(type_id)?;
        Ok(())
    }

    /// Attach an empirical table source to a registered type.
    pub fn set_empirical_source(
        &mut self,
        type_id: TypeId,
        source: EmpiricalSource,
    ) -> Result<(), ConfigError> {
        let cell_type = self
            .types
            .get_mut(type_id)
            .ok_or_else(|| ConfigError::invalid("empirical", format!("type {type_id} is not registered")))?;
        cell_type.set_empirical_source(source);
        Ok(())
    }

    /// Append samples to the empirical table of `type_id`.
    ///
    /// Only later draws for this type see the new samples; mutant types
    /// created earlier keep the table they were given.
    pub fn extend_empirical(&mut self, type_id: TypeId, samples: &[f64]) -> Result<(), ConfigError> {
        let combine = self.fitness.combine();
        let distribution = self.fitness.distribution().copied();
        let cell_type = self
            .types
            .get_mut(type_id)
            .ok_or_else(|| ConfigError::invalid("empirical", format!("type {type_id} is not registered")))?;
        if let Some(distribution) = distribution {
            distribution.validate_table(combine, &EmpiricalTable::from_values(samples.to_vec())?)?;
        }
        cell_type.extend_empirical(samples)
    }

    /// Add founder cells of `type_id`, registering the type if needed.
    ///
    /// Under per-draw and heritable fitness models the cells are split into
    /// single-cell clones with drawn rates.
    pub fn add_clone<R: Rng + ?Sized>(
        &mut self,
        type_id: TypeId,
        cells: u64,
        birth_rate: f64,
        mutation_probability: f64,
        rng: &mut R,
    ) -> Result<(), ConfigError> {
        let field = format!("clones[type {type_id}]");
        if cells == 0 {
            return Err(ConfigError::invalid(&field, "a clone needs at least one cell"));
        }
        check_rate(&format!("{field}.birth_rate"), birth_rate)?;
        if !(0.0..=1.0).contains(&mutation_probability) {
            return Err(ConfigError::invalid(
                format!("{field}.mutation_probability"),
                format!("{mutation_probability} is not a probability"),
            ));
        }
        self.fitness
            .validate_founder_rate(birth_rate, &format!("{field}.birth_rate"))?;

        if !self.types.contains(type_id) {
            self.types.insert_root(type_id)?;
        }
        let table = if self.fitness.needs_table() {
            Some(self.load_table(type_id)?)
        } else {
            None
        };

        let founders = self
            .fitness
            .founder_clones(
                type_id,
                cells,
                birth_rate,
                mutation_probability,
                table.as_ref(),
                rng,
            )
            .map_err(|e| ConfigError::invalid(&field, e.to_string()))?;
        for clone in founders {
            self.insert_clone(clone)
                .map_err(|e| ConfigError::invalid(&field, e.to_string()))?;
        }
        Ok(())
    }

    /// Load the empirical tables of every registered type that has a source.
    ///
    /// Types that received founder clones are already loaded; this covers
    /// types that only appear later as mutation targets.
    pub fn load_pending_tables(&mut self) -> Result<(), ConfigError> {
        if !self.fitness.needs_table() {
            return Ok(());
        }
        let ids: Vec<TypeId> = self.types.order().to_vec();
        for id in ids {
            if let Some(cell_type) = self.types.get_mut(id) {
                cell_type.ensure_empirical()?;
            }
        }
        Ok(())
    }

    fn load_table(&mut self, type_id: TypeId) -> Result<EmpiricalTable, ConfigError> {
        let distribution = self.fitness.distribution().cloned();
        let combine = self.fitness.combine();
        let cell_type = self
            .types
            .get_mut(type_id)
            .ok_or_else(|| ConfigError::invalid("empirical", format!("type {type_id} is not registered")))?;
        let table = cell_type.ensure_empirical()?.cloned().ok_or_else(|| {
            ConfigError::invalid(
                "empirical",
                format!("type {type_id} has no empirical table"),
            )
        })?;
        if let Some(distribution) = distribution {
            distribution.validate_table(combine, &table)?;
        }
        Ok(table)
    }

    // ------------------------------------------------------------------
    // Structural changes
    // ------------------------------------------------------------------

    /// Link a clone at the tail of its type and add its cells to the
    /// aggregates.
    pub(crate) fn insert_clone(&mut self, mut clone: CellClone) -> Result<ArenaId, SimulationError> {
        let type_id = clone.type_id;
        let tail = self
            .types
            .get(type_id)
            .ok_or(SimulationError::UnknownType(type_id))?
            .tail;
        let cells = clone.cell_count;
        let mass = clone.birth_mass();

        clone.prev = tail;
        clone.next = None;
        let id = self.clones.insert(clone);
        if let Some(prev) = tail.and_then(|t| self.clones.get_mut(t)) {
            prev.next = Some(id);
        }

        let cell_type = self
            .types
            .get_mut(type_id)
            .ok_or(SimulationError::UnknownType(type_id))?;
        if cell_type.head.is_none() {
            cell_type.head = Some(id);
        }
        cell_type.tail = Some(id);
        cell_type.clone_linked();
        cell_type.record_gain(cells, mass);

        self.total_cells += cells;
        self.total_birth += mass;
        Ok(id)
    }

    /// Add one cell to an existing clone.
    pub(crate) fn add_cell(&mut self, id: ArenaId) -> Result<(), SimulationError> {
        let clone = self.clones.get_mut(id).ok_or(SimulationError::EmptyClone)?;
        clone.cell_count += 1;
        let (type_id, rate) = (clone.type_id, clone.birth_rate);
        self.types
            .get_mut(type_id)
            .ok_or(SimulationError::UnknownType(type_id))?
            .record_gain(1, rate);
        self.total_cells += 1;
        self.total_birth += rate;
        Ok(())
    }

    /// Remove one cell from a clone, deleting the clone if it was its last.
    pub(crate) fn remove_cell(&mut self, id: ArenaId) -> Result<DeathRecord, SimulationError> {
        let clone = self.clones.get_mut(id).ok_or(SimulationError::EmptyClone)?;
        if clone.cell_count == 0 {
            return Err(SimulationError::EmptyClone);
        }
        let (type_id, rate) = (clone.type_id, clone.birth_rate);
        let clone_removed = clone.cell_count == 1;
        if clone_removed {
            self.unlink(id)?;
        } else {
            clone.cell_count -= 1;
        }

        self.types
            .get_mut(type_id)
            .ok_or(SimulationError::UnknownType(type_id))?
            .record_loss(1, rate);
        self.total_cells -= 1;
        if self.total_cells == 0 {
            self.total_birth = 0.0;
        } else {
            self.total_birth -= rate;
        }
        Ok(DeathRecord {
            type_id,
            clone_removed,
        })
    }

    /// Detach a clone from its type's list and drop it from the arena.
    fn unlink(&mut self, id: ArenaId) -> Result<CellClone, SimulationError> {
        let clone = self.clones.remove(id).ok_or(SimulationError::EmptyClone)?;
        match clone.prev.and_then(|p| self.clones.get_mut(p)) {
            Some(prev) => prev.next = clone.next,
            None => {
                if let Some(t) = self.types.get_mut(clone.type_id) {
                    t.head = clone.next;
                }
            }
        }
        match clone.next.and_then(|n| self.clones.get_mut(n)) {
            Some(next) => next.prev = clone.prev,
            None => {
                if let Some(t) = self.types.get_mut(clone.type_id) {
                    t.tail = clone.prev;
                }
            }
        }
        if let Some(t) = self.types.get_mut(clone.type_id) {
            t.clone_unlinked();
        }
        Ok(clone)
    }

    /// Drop every clone, keeping the registered types and the clock.
    pub(crate) fn clear_clones(&mut self) {
        self.clones.clear();
        self.types.reset_membership();
        self.total_cells = 0;
        self.total_birth = 0.0;
    }

    // ------------------------------------------------------------------
    // Reproduction
    // ------------------------------------------------------------------

    /// Plan one reproduction of `mother` without placing the daughter.
    pub(crate) fn plan_birth<R: Rng + ?Sized>(
        &mut self,
        mother: ArenaId,
        rng: &mut R,
    ) -> Result<(Offspring, BirthRecord), SimulationError> {
        let Population {
            clones,
            types,
            fitness,
            mutation,
            ..
        } = self;
        let clone = clones.get(mother).ok_or(SimulationError::EmptyClone)?;
        let registered = types.len();
        let offspring = fitness.plan_offspring(clone, mutation, types, rng)?;
        let record = BirthRecord {
            mother_type: clone.type_id,
            daughter_type: offspring.type_id,
            mother_rate: clone.birth_rate,
            daughter_rate: offspring.birth_rate,
            mutant: offspring.mutant,
            new_type: types.len() > registered,
        };
        Ok((offspring, record))
    }

    /// Place a planned daughter.
    ///
    /// An identical daughter joins her mother's clone if it still exists;
    /// any other daughter starts a new single-cell clone.
    pub(crate) fn place_offspring(
        &mut self,
        mother: ArenaId,
        offspring: Offspring,
        record: &BirthRecord,
    ) -> Result<ArenaId, SimulationError> {
        self.last_birth = Some((record.mother_rate, record.daughter_rate));
        if offspring.identical && self.clones.contains(mother) {
            self.add_cell(mother)?;
            Ok(mother)
        } else {
            self.insert_clone(CellClone::from_offspring(offspring))
        }
    }

    /// Plan and place one reproduction of `mother`.
    pub(crate) fn reproduce<R: Rng + ?Sized>(
        &mut self,
        mother: ArenaId,
        rng: &mut R,
    ) -> Result<BirthRecord, SimulationError> {
        let (offspring, record) = self.plan_birth(mother, rng)?;
        self.place_offspring(mother, offspring, &record)?;
        Ok(record)
    }

    // ------------------------------------------------------------------
    // Rates and selection
    // ------------------------------------------------------------------

    /// Death rate that applies to cells of `cell_type`.
    pub fn death_rate_of(&self, cell_type: &CellType) -> f64 {
        cell_type.death_rate().unwrap_or(self.death_rate)
    }

    /// Total death propensity of the population.
    pub fn total_death_rate(&self) -> f64 {
        if self.per_type_death {
            self.types
                .iter()
                .map(|t| self.death_rate_of(t) * t.num_cells() as f64)
                .sum()
        } else {
            self.death_rate * self.total_cells as f64
        }
    }

    /// Weight used to pick the dying clone in a death event.
    pub fn death_weight(&self) -> Weight {
        if self.per_type_death {
            Weight::Death
        } else {
            Weight::Cells
        }
    }

    /// Birth mass summed over every clone.
    pub fn recompute_birth_rate(&self) -> f64 {
        self.clones.iter().map(|(_, c)| c.birth_mass()).sum()
    }

    /// Difference between the cached birth mass and a full rescan.
    pub fn birth_rate_drift(&self) -> f64 {
        self.total_birth - self.recompute_birth_rate()
    }

    /// Replace the cached birth mass, population-wide and per type, by
    /// exact sums.
    pub fn resync_birth_rate(&mut self) {
        let mut total = 0.0;
        for id in self.types.order().to_vec() {
            let Some(head) = self.types.get(id).map(|t| t.head) else {
                continue;
            };
            let (cells, mass) = TypeClones::new(&self.clones, head)
                .fold((0u64, 0.0), |(n, m), (_, c)| (n + c.cell_count, m + c.birth_mass()));
            if let Some(t) = self.types.get_mut(id) {
                t.set_totals(cells, mass);
            }
            total += mass;
        }
        self.total_birth = total;
    }

    /// Total birth mass according to the configured [`BirthRateMode`].
    pub(crate) fn current_birth_rate(&mut self) -> f64 {
        if self.birth_mode == BirthRateMode::Recalculate {
            self.resync_birth_rate();
        }
        self.total_birth
    }

    fn type_weight(&self, cell_type: &CellType, weight: Weight) -> f64 {
        match weight {
            Weight::Cells => cell_type.num_cells() as f64,
            Weight::Death => self.death_rate_of(cell_type) * cell_type.num_cells() as f64,
            Weight::Birth => cell_type.total_birth_rate(),
        }
    }

    fn clone_weight(clone: &CellClone, weight: Weight) -> f64 {
        match weight {
            Weight::Cells | Weight::Death => clone.cell_count as f64,
            Weight::Birth => clone.birth_mass(),
        }
    }

    /// Pick a clone with probability proportional to `weight`.
    pub fn select<R: Rng + ?Sized>(
        &self,
        weight: Weight,
        rng: &mut R,
    ) -> Result<ArenaId, SimulationError> {
        self.select_where(weight, |_| true, rng)
    }

    /// Pick a clone among the types accepted by `filter`, with probability
    /// proportional to `weight`.
    ///
    /// Extinct types are never visited. Fails if the total weight is zero.
    pub fn select_where<R: Rng + ?Sized>(
        &self,
        weight: Weight,
        filter: impl Fn(TypeId) -> bool,
        rng: &mut R,
    ) -> Result<ArenaId, SimulationError> {
        let filter = &filter;
        let candidates = move || {
            self.types
                .iter()
                .filter(move |t| !t.is_extinct() && filter(t.id()))
                .map(move |t| (t, self.type_weight(t, weight)))
                .filter(|(_, w)| *w > 0.0)
        };
        let total: f64 = candidates().map(|(_, w)| w).sum();
        if !(total > 0.0) {
            return Err(SimulationError::ZeroWeight(weight.name()));
        }

        let threshold = rng.random::<f64>() * total;
        let mut running = 0.0;
        let mut chosen = None;
        for (cell_type, w) in candidates() {
            chosen = Some((cell_type, threshold - running));
            running += w;
            if running >= threshold {
                break;
            }
        }
        let (cell_type, local) = chosen.ok_or(SimulationError::ZeroWeight(weight.name()))?;

        // Within the type, the death rate is shared by every clone, so
        // death weight reduces to cell count. Rescale the threshold to
        // the clone-level unit.
        let local = match weight {
            Weight::Death => local / self.death_rate_of(cell_type),
            _ => local,
        };
        let mut running = 0.0;
        let mut fallback = None;
        for (id, clone) in TypeClones::new(&self.clones, cell_type.head) {
            let w = Self::clone_weight(clone, weight);
            if w <= 0.0 {
                continue;
            }
            running += w;
            fallback = Some(id);
            if running >= local {
                return Ok(id);
            }
        }
        fallback.ok_or(SimulationError::ZeroWeight(weight.name()))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Elapsed simulated time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of `advance()` calls that changed the population.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn total_cells(&self) -> u64 {
        self.total_cells
    }

    /// Cached total birth mass.
    pub fn total_birth_rate(&self) -> f64 {
        self.total_birth
    }

    /// The population has no cells left. Under two-sex reproduction it is
    /// also extinct once either sex has no cells.
    pub fn is_extinct(&self) -> bool {
        if self.total_cells == 0 {
            return true;
        }
        match &self.process {
            Process::TwoSex {
                female_types,
                male_types,
            } => {
                self.cells_in(female_types.iter().copied()) == 0
                    || self.cells_in(male_types.iter().copied()) == 0
            }
            _ => false,
        }
    }

    pub(crate) fn cells_in(&self, ids: impl Iterator<Item = TypeId>) -> u64 {
        ids.filter_map(|id| self.types.get(id))
            .map(CellType::num_cells)
            .sum()
    }

    /// Every type id is taken, so a new type cannot be created.
    pub fn no_types_left(&self) -> bool {
        self.types.is_full()
    }

    /// Size of the type id space.
    pub fn max_types(&self) -> usize {
        self.types.max_types()
    }

    /// Every registered type, extinct ones included.
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// The type with id `id`, if registered.
    pub fn cell_type(&self, id: TypeId) -> Option<&CellType> {
        self.types.get(id)
    }

    /// Cells of type `id`.
    pub fn cell_count(&self, id: TypeId) -> Option<u64> {
        self.types.get(id).map(CellType::num_cells)
    }

    /// Birth mass of type `id`.
    pub fn birth_mass(&self, id: TypeId) -> Option<f64> {
        self.types.get(id).map(CellType::total_birth_rate)
    }

    /// The live clone behind handle `id`.
    pub fn cell_clone(&self, id: ArenaId) -> Option<&CellClone> {
        self.clones.get(id)
    }

    /// Member clones of type `id`, in insertion order.
    pub fn clones_of(&self, id: TypeId) -> TypeClones<'_> {
        TypeClones::new(&self.clones, self.types.get(id).and_then(|t| t.head))
    }

    /// Every live clone, in arena order.
    pub fn clones(&self) -> impl Iterator<Item = (ArenaId, &CellClone)> {
        self.clones.iter()
    }

    /// Number of live clones.
    pub fn clone_count(&self) -> usize {
        self.clones.len()
    }

    /// Most recently registered type.
    pub fn newest_type(&self) -> Option<TypeId> {
        self.types.newest()
    }

    /// Types present at the start of the simulation.
    pub fn root_types(&self) -> &[TypeId] {
        self.types.roots()
    }

    /// Mother and daughter rates of the most recent birth.
    pub fn last_birth_rates(&self) -> Option<(f64, f64)> {
        self.last_birth
    }

    /// Uniform death rate, used by types without an override.
    pub fn death_rate(&self) -> f64 {
        self.death_rate
    }

    /// Some type has its own death rate.
    pub fn per_type_death(&self) -> bool {
        self.per_type_death
    }

    pub fn birth_rate_mode(&self) -> BirthRateMode {
        self.birth_mode
    }

    pub fn mutation(&self) -> &MutationHandler {
        &self.mutation
    }

    pub fn fitness(&self) -> &FitnessModel {
        &self.fitness
    }

    pub fn process(&self) -> &Process {
        &self.process
    }
}

fn check_rate(field: &str, rate: f64) -> Result<(), ConfigError> {
    if rate.is_finite() && rate >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("{rate} must be finite and non-negative"),
        ))
    }
}
