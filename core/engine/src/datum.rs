//! FILENAME: core/engine/src/datum.rs
//! PURPOSE: Input records and their externally managed state flags.
//! CONTEXT: A datum holds one atom per schema dimension and never changes
//! after it is loaded. Visibility, selection and the is-null flag live in
//! `DatumStates` side sets keyed by datum id.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::atom::{AtomId, RawValue, ATOM_ID_NULL};

/// Position of a datum in its owner's datum list.
pub type DatumId = u32;

/// One source row ready to be loaded: (dimension index, raw value) pairs.
/// Dimensions without an entry get the null atom.
pub type AtomRow = Vec<(usize, RawValue)>;

#[derive(Debug, Clone, PartialEq)]
pub struct Datum {
    pub id: DatumId,
    /// Atom keys of every dimension joined by the schema key separator.
    pub key: String,
    /// One atom per dimension, indexed by dimension index.
    pub atoms: SmallVec<[AtomId; 8]>,
}

impl Datum {
    pub fn new(id: DatumId, key: String, atoms: SmallVec<[AtomId; 8]>) -> Self {
        Datum { id, key, atoms }
    }

    /// The atom of a dimension. Dimensions past the end are null.
    pub fn atom(&self, dimension: usize) -> AtomId {
        self.atoms.get(dimension).copied().unwrap_or(ATOM_ID_NULL)
    }
}

// ============================================================================
// DATUM STATES
// ============================================================================

/// Which flag a state change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatumFlag {
    Visible,
    Selected,
    Null,
}

/// Side sets for the mutable per-datum flags.
/// Datums are visible, unselected and not null unless recorded here.
#[derive(Debug, Clone, Default)]
pub struct DatumStates {
    hidden: FxHashSet<DatumId>,
    selected: FxHashSet<DatumId>,
    null: FxHashSet<DatumId>,
}

impl DatumStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self, id: DatumId) -> bool {
        !self.hidden.contains(&id)
    }

    pub fn is_selected(&self, id: DatumId) -> bool {
        self.selected.contains(&id)
    }

    pub fn is_null(&self, id: DatumId) -> bool {
        self.null.contains(&id)
    }

    /// Reads one flag.
    pub fn get(&self, flag: DatumFlag, id: DatumId) -> bool {
        match flag {
            DatumFlag::Visible => self.is_visible(id),
            DatumFlag::Selected => self.is_selected(id),
            DatumFlag::Null => self.is_null(id),
        }
    }

    /// Sets one flag. Returns whether the state changed.
    pub fn set(&mut self, flag: DatumFlag, id: DatumId, value: bool) -> bool {
        let (set, present) = match flag {
            // visibility is stored inverted
            DatumFlag::Visible => (&mut self.hidden, !value),
            DatumFlag::Selected => (&mut self.selected, value),
            DatumFlag::Null => (&mut self.null, value),
        };
        if present {
            set.insert(id)
        } else {
            set.remove(&id)
        }
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Unselects everything. Returns whether anything was selected.
    pub fn clear_selected(&mut self) -> bool {
        let changed = !self.selected.is_empty();
        self.selected.clear();
        changed
    }

    pub fn clear(&mut self) {
        self.hidden.clear();
        self.selected.clear();
        self.null.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_missing_dimensions_are_null() {
        let datum = Datum::new(0, "a".to_string(), smallvec![3]);
        assert_eq!(datum.atom(0), 3);
        assert_eq!(datum.atom(5), ATOM_ID_NULL);
    }

    #[test]
    fn test_flags_report_changes() {
        let mut states = DatumStates::new();
        assert!(states.is_visible(1));
        assert!(states.set(DatumFlag::Visible, 1, false));
        assert!(!states.set(DatumFlag::Visible, 1, false));
        assert!(!states.is_visible(1));

        assert!(states.set(DatumFlag::Selected, 2, true));
        assert!(states.get(DatumFlag::Selected, 2));
        assert_eq!(states.selected_count(), 1);
        assert!(states.clear_selected());
        assert!(!states.clear_selected());
    }
}
