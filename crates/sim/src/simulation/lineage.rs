//! Lineage and fitness snapshots for reporting.

use crate::base::TypeId;
use crate::simulation::Population;
use serde::{Deserialize, Serialize};

/// One type in a lineage listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEntry {
    pub type_id: TypeId,
    pub parent: Option<TypeId>,
    pub cells: u64,
    pub extinct: bool,
    /// Distance from the founder type; founders have depth 0.
    pub depth: usize,
}

impl Population {
    /// Every registered type, depth-first from the founders. Founders come
    /// in registration order and children in creation order.
    pub fn lineage(&self) -> Vec<LineageEntry> {
        let mut entries = Vec::with_capacity(self.types.len());
        let mut stack: Vec<(TypeId, usize)> =
            self.types.roots().iter().rev().map(|&id| (id, 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            let Some(cell_type) = self.types.get(id) else {
                continue;
            };
            entries.push(LineageEntry {
                type_id: id,
                parent: cell_type.parent(),
                cells: cell_type.num_cells(),
                extinct: cell_type.is_extinct(),
                depth,
            });
            stack.extend(cell_type.children().iter().rev().map(|&child| (child, depth + 1)));
        }
        entries
    }

    /// `(parent, child)` pairs for every type created by mutation.
    pub fn lineage_edges(&self) -> Vec<(TypeId, TypeId)> {
        self.types
            .iter()
            .filter_map(|t| t.parent().map(|parent| (parent, t.id())))
            .collect()
    }

    /// Per-clone `(birth_rate, cell_count)` of a type, in clone order.
    pub fn fitness_distribution(&self, id: TypeId) -> Vec<(f64, u64)> {
        self.clones_of(id)
            .map(|(_, clone)| (clone.birth_rate(), clone.cell_count()))
            .collect()
    }

    /// Cell-weighted mean birth rate of a type, or `None` when it is extinct
    /// or unknown.
    pub fn mean_birth_rate(&self, id: TypeId) -> Option<f64> {
        let cell_type = self.types.get(id)?;
        if cell_type.is_extinct() {
            return None;
        }
        Some(cell_type.total_birth_rate() / cell_type.num_cells() as f64)
    }

    /// The type holds every cell of a non-empty population.
    pub fn is_fixed(&self, id: TypeId) -> bool {
        self.total_cells > 0 && self.cell_count(id) == Some(self.total_cells)
    }

    pub fn live_type_count(&self) -> usize {
        self.types.iter().filter(|t| !t.is_extinct()).count()
    }
}
