use crate::base::{ArenaId, EmpiricalSource, EmpiricalTable, TypeId};
use crate::errors::ConfigError;

/// A lineage node grouping every clone currently classified under one id.
///
/// A type keeps two independent structures: its place in the lineage tree
/// (`parent`/`children`) and the linked list of its member clones
/// (`head`/`tail`). `num_cells` and `total_birth_rate` always equal the sums
/// over the member clones.
#[derive(Debug, Clone)]
pub struct CellType {
    id: TypeId,
    parent: Option<TypeId>,
    children: Vec<TypeId>,
    num_cells: u64,
    total_birth_rate: f64,
    clone_count: usize,
    death_rate: Option<f64>,
    empirical: Option<EmpiricalTable>,
    empirical_source: Option<EmpiricalSource>,
    pub(crate) head: Option<ArenaId>,
    pub(crate) tail: Option<ArenaId>,
}

impl CellType {
    /// A founder type with no parent.
    pub fn new(id: TypeId) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            num_cells: 0,
            total_birth_rate: 0.0,
            clone_count: 0,
            death_rate: None,
            empirical: None,
            empirical_source: None,
            head: None,
            tail: None,
        }
    }

    /// A mutant type under `parent`.
    ///
    /// The death-rate override and the empirical table are copied from the
    /// parent as they are now.
    pub fn child_of(id: TypeId, parent: &CellType) -> Self {
        Self {
            parent: Some(parent.id),
            death_rate: parent.death_rate,
            empirical: parent.empirical.clone(),
            empirical_source: parent.empirical_source.clone(),
            ..Self::new(id)
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn parent(&self) -> Option<TypeId> {
        self.parent
    }

    pub fn children(&self) -> &[TypeId] {
        &self.children
    }

    pub fn num_cells(&self) -> u64 {
        self.num_cells
    }

    /// Sum of `birth_rate * cell_count` over member clones.
    pub fn total_birth_rate(&self) -> f64 {
        self.total_birth_rate
    }

    /// Number of member clones.
    pub fn clone_count(&self) -> usize {
        self.clone_count
    }

    pub fn is_extinct(&self) -> bool {
        self.num_cells == 0
    }

    /// Per-type death rate override.
    pub fn death_rate(&self) -> Option<f64> {
        self.death_rate
    }

    pub fn set_death_rate(&mut self, rate: Option<f64>) {
        self.death_rate = rate;
    }

    /// First member clone.
    pub fn head(&self) -> Option<ArenaId> {
        self.head
    }

    pub fn empirical(&self) -> Option<&EmpiricalTable> {
        self.empirical.as_ref()
    }

    /// Attach a table source, loaded the first time a clone needs it.
    pub fn set_empirical_source(&mut self, source: EmpiricalSource) {
        self.empirical_source = Some(source);
        self.empirical = None;
    }

    /// Load the table from its source if that has not happened yet.
    pub fn ensure_empirical(&mut self) -> Result<Option<&EmpiricalTable>, ConfigError> {
        if self.empirical.is_none() {
            if let Some(source) = &self.empirical_source {
                self.empirical = Some(source.load()?);
            }
        }
        Ok(self.empirical.as_ref())
    }

    /// Append samples to this type's table.
    ///
    /// Children created earlier hold their own copy and do not see the new
    /// samples.
    pub fn extend_empirical(&mut self, samples: &[f64]) -> Result<(), ConfigError> {
        let table = match self.ensure_empirical()? {
            Some(table) => table.extended(samples)?,
            None => EmpiricalTable::from_values(samples.to_vec())?,
        };
        self.empirical = Some(table);
        Ok(())
    }

    pub(crate) fn add_child(&mut self, child: TypeId) {
        self.children.push(child);
    }

    pub(crate) fn record_gain(&mut self, cells: u64, mass: f64) {
        self.num_cells += cells;
        self.total_birth_rate += mass;
    }

    /// Remove `cells` cells carrying `mass` birth mass.
    ///
    /// The mass snaps to zero when the type goes extinct.
    pub(crate) fn record_loss(&mut self, cells: u64, mass: f64) {
        self.num_cells -= cells;
        if self.num_cells == 0 {
            self.total_birth_rate = 0.0;
        } else {
            self.total_birth_rate -= mass;
        }
    }

    pub(crate) fn set_totals(&mut self, cells: u64, mass: f64) {
        self.num_cells = cells;
        self.total_birth_rate = mass;
    }

    pub(crate) fn clone_linked(&mut self) {
        self.clone_count += 1;
    }

    pub(crate) fn clone_unlinked(&mut self) {
        self.clone_count -= 1;
    }

    /// Forget every member clone.
    pub(crate) fn reset_membership(&mut self) {
        self.head = None;
        self.tail = None;
        self.clone_count = 0;
        self.num_cells = 0;
        self.total_birth_rate = 0.0;
    }
}
