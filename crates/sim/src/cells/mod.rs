//! Cell-level structures: clones, the types that group them, and the type
//! registry.
//!
//! Clones are stored in an [`Arena`] owned by the population and chained per
//! type through stable handles, so inserting or removing a clone never moves
//! another one.

mod cell_type;
mod clone;
mod registry;

pub use cell_type::CellType;
pub use clone::{CellClone, Offspring};
pub use registry::TypeRegistry;

use crate::base::{Arena, ArenaId};

/// Iterator over the member clones of one type, in insertion order.
pub struct TypeClones<'a> {
    arena: &'a Arena<CellClone>,
    cursor: Option<ArenaId>,
}

impl<'a> TypeClones<'a> {
    pub fn new(arena: &'a Arena<CellClone>, head: Option<ArenaId>) -> Self {
        Self {
            arena,
            cursor: head,
        }
    }
}

impl<'a> Iterator for TypeClones<'a> {
    type Item = (ArenaId, &'a CellClone);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let clone = self.arena.get(id)?;
        self.cursor = clone.next;
        Some((id, clone))
    }
}
