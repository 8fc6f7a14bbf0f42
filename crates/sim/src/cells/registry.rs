use super::CellType;
use crate::base::TypeId;
use crate::errors::{ConfigError, SimulationError};

/// Dense registry of cell types indexed by id.
///
/// Ids live in `[0, max_types)`. Once an id is taken it stays reserved, even
/// after the type goes extinct, so it can never be handed to an unrelated
/// lineage.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    slots: Vec<Option<CellType>>,
    /// Registration order, used for every weighted scan.
    order: Vec<TypeId>,
    roots: Vec<TypeId>,
    newest: Option<TypeId>,
}

impl TypeRegistry {
    pub fn new(max_types: usize) -> Self {
        Self {
            slots: (0..max_types).map(|_| None).collect(),
            order: Vec::new(),
            roots: Vec::new(),
            newest: None,
        }
    }

    pub fn max_types(&self) -> usize {
        self.slots.len()
    }

    /// Number of registered types, extinct ones included.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Every id is taken.
    pub fn is_full(&self) -> bool {
        self.order.len() == self.slots.len()
    }

    pub fn contains(&self, id: TypeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: TypeId) -> Option<&CellType> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: TypeId) -> Option<&mut CellType> {
        self.slots.get_mut(id).and_then(Option::as_mut)
    }

    /// Registered ids in registration order.
    pub fn order(&self) -> &[TypeId] {
        &self.order
    }

    /// Types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &CellType> {
        self.order.iter().filter_map(move |&id| self.get(id))
    }

    /// Founder types.
    pub fn roots(&self) -> &[TypeId] {
        &self.roots
    }

    /// Most recently registered type.
    pub fn newest(&self) -> Option<TypeId> {
        self.newest
    }

    /// Lowest id not yet taken.
    pub fn next_free(&self) -> Option<TypeId> {
        self.slots.iter().position(Option::is_none)
    }

    fn register(&mut self, cell_type: CellType) {
        let id = cell_type.id();
        self.slots[id] = Some(cell_type);
        self.order.push(id);
        self.newest = Some(id);
    }

    /// Register a founder type.
    pub fn insert_root(&mut self, id: TypeId) -> Result<&mut CellType, ConfigError> {
        if id >= self.slots.len() {
            return Err(ConfigError::TypeOutOfRange {
                id,
                max_types: self.slots.len(),
            });
        }
        if self.slots[id].is_some() {
            return Err(ConfigError::DuplicateType(id));
        }
        self.register(CellType::new(id));
        self.roots.push(id);
        Ok(self.slots[id].get_or_insert_with(|| CellType::new(id)))
    }

    /// Resolve the mutant type `id` of `parent`.
    ///
    /// An existing type is reused as is. Otherwise a new type is created and
    /// linked into the lineage tree under `parent`. Returns the id and
    /// whether it was created.
    pub fn get_or_insert_child(
        &mut self,
        id: TypeId,
        parent: TypeId,
    ) -> Result<(TypeId, bool), SimulationError> {
        if id >= self.slots.len() {
            return Err(SimulationError::TypeOutOfRange {
                id,
                max_types: self.slots.len(),
            });
        }
        if self.slots[id].is_some() {
            return Ok((id, false));
        }
        let parent_type = self
            .get_mut(parent)
            .ok_or(SimulationError::UnknownType(parent))?;
        parent_type.add_child(id);
        let child = CellType::child_of(id, parent_type);
        self.register(child);
        Ok((id, true))
    }

    /// Forget all member clones of every type, keeping ids reserved.
    pub(crate) fn reset_membership(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.reset_membership();
        }
    }
}
