//! FILENAME: core/engine/src/dimension.rs
//! PURPOSE: Dimension descriptors and their atom interning tables.
//! CONTEXT: A `DimensionType` says what a column holds and how its values are
//! converted, keyed, labelled and compared (through an `AtomCodec`). A
//! `Dimension` is the per-schema instance that owns the interned atoms.
//! Interning is append-only: new values add atoms, existing atoms never change.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use log::warn;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::atom::{compare_atom_values, format_number, Atom, AtomId, AtomValue, OrderedFloat, RawValue, ATOM_ID_NULL};
use crate::date::CalendarDate;

// ============================================================================
// VALUE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Keeps raw values as they come.
    #[default]
    Any,
    String,
    Number,
    Boolean,
    Date,
}

// ============================================================================
// ATOM CODEC
// ============================================================================

/// The overridable behavior of a dimension type.
///
/// Every method except `value_type` has a default derived from the value type,
/// so a custom codec only overrides what it changes (for example a label
/// format, or a comparer that makes text dimensions sortable).
pub trait AtomCodec: fmt::Debug {
    fn value_type(&self) -> ValueType;

    /// Discrete dimensions group into separate categories. Continuous ones
    /// (numbers and dates by default) describe a range.
    fn is_discrete(&self) -> bool {
        !matches!(self.value_type(), ValueType::Number | ValueType::Date)
    }

    /// Whether atoms order by value. Non-comparable dimensions keep the order
    /// in which values were first seen.
    fn is_comparable(&self) -> bool {
        matches!(self.value_type(), ValueType::Number | ValueType::Date)
    }

    /// Converts a raw value. `None` means the value cannot be represented.
    fn convert(&self, raw: &RawValue) -> Option<AtomValue> {
        convert_raw(self.value_type(), raw)
    }

    fn key(&self, value: &AtomValue) -> String {
        value.to_key()
    }

    fn format(&self, value: &AtomValue) -> String {
        value.to_key()
    }

    fn compare(&self, a: &AtomValue, b: &AtomValue) -> Ordering {
        compare_atom_values(a, b)
    }
}

impl AtomCodec for ValueType {
    fn value_type(&self) -> ValueType {
        *self
    }
}

/// Lenient conversion of a raw value into a value type.
pub fn convert_raw(value_type: ValueType, raw: &RawValue) -> Option<AtomValue> {
    if raw.is_null() {
        return Some(AtomValue::Null);
    }

    match value_type {
        ValueType::Any => Some(match raw {
            RawValue::Null => AtomValue::Null,
            RawValue::Boolean(b) => AtomValue::Boolean(*b),
            RawValue::Number(n) => AtomValue::Number(OrderedFloat(*n)),
            RawValue::Text(s) => AtomValue::Text(s.clone()),
        }),
        ValueType::String => Some(match raw {
            RawValue::Null => AtomValue::Null,
            RawValue::Boolean(b) => AtomValue::Text(b.to_string()),
            RawValue::Number(n) => AtomValue::Text(format_number(*n)),
            RawValue::Text(s) => AtomValue::Text(s.clone()),
        }),
        ValueType::Number => match raw {
            RawValue::Number(n) => Some(AtomValue::Number(OrderedFloat(*n))),
            RawValue::Boolean(b) => Some(AtomValue::Number(OrderedFloat(if *b { 1.0 } else { 0.0 }))),
            RawValue::Text(s) if s.trim().is_empty() => Some(AtomValue::Null),
            RawValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .map(|n| AtomValue::Number(OrderedFloat(n))),
            RawValue::Null => Some(AtomValue::Null),
        },
        ValueType::Boolean => match raw {
            RawValue::Boolean(b) => Some(AtomValue::Boolean(*b)),
            RawValue::Number(n) => Some(AtomValue::Boolean(*n != 0.0)),
            RawValue::Text(s) if s.trim().is_empty() => Some(AtomValue::Null),
            RawValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(AtomValue::Boolean(true)),
                "false" => Some(AtomValue::Boolean(false)),
                _ => None,
            },
            RawValue::Null => Some(AtomValue::Null),
        },
        ValueType::Date => match raw {
            RawValue::Text(s) if s.trim().is_empty() => Some(AtomValue::Null),
            RawValue::Text(s) => CalendarDate::parse(s).map(AtomValue::Date),
            RawValue::Null => Some(AtomValue::Null),
            _ => None,
        },
    }
}

// ============================================================================
// DIMENSION TYPE
// ============================================================================

/// Describes one named column of a schema.
#[derive(Debug, Clone)]
pub struct DimensionType {
    pub name: String,
    pub label: String,
    pub codec: Arc<dyn AtomCodec>,
    /// Synthesized dimensions (such as `dataPart`) are hidden.
    pub is_hidden: bool,
    /// Name of the repeated group this dimension belongs to, if any.
    pub group: Option<String>,
    /// Position within the group.
    pub group_level: usize,
}

impl DimensionType {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::with_codec(name, Arc::new(value_type))
    }

    pub fn with_codec(name: impl Into<String>, codec: Arc<dyn AtomCodec>) -> Self {
        let name = name.into();
        DimensionType {
            label: name.clone(),
            name,
            codec,
            is_hidden: false,
            group: None,
            group_level: 0,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }

    pub fn in_group(mut self, group: impl Into<String>, level: usize) -> Self {
        self.group = Some(group.into());
        self.group_level = level;
        self
    }

    pub fn value_type(&self) -> ValueType {
        self.codec.value_type()
    }

    pub fn is_discrete(&self) -> bool {
        self.codec.is_discrete()
    }

    pub fn is_comparable(&self) -> bool {
        self.codec.is_comparable()
    }
}

// ============================================================================
// DIMENSION
// ============================================================================

/// A dimension of one schema instance, owning the interned atoms.
#[derive(Debug, Clone)]
pub struct Dimension {
    /// Position of this dimension in its schema.
    pub index: usize,
    pub ty: DimensionType,
    /// Interned atoms, indexed by `AtomId`.
    atoms: Vec<Atom>,
    /// Map from atom key to id, for deduplication.
    by_key: FxHashMap<String, AtomId>,
    null_atom: Atom,
}

impl Dimension {
    pub fn new(index: usize, ty: DimensionType) -> Self {
        Dimension {
            index,
            ty,
            atoms: Vec::new(),
            by_key: FxHashMap::default(),
            null_atom: Atom::null(),
        }
    }

    pub fn name(&self) -> &str {
        &self.ty.name
    }

    /// Converts and interns a raw value, returning the atom for it.
    /// Values the codec cannot convert become the null atom.
    pub fn intern(&mut self, raw: &RawValue) -> AtomId {
        match self.ty.codec.convert(raw) {
            Some(value) => self.intern_value(value),
            None => {
                warn!(
                    "Value {:?} cannot be converted to {:?} for dimension '{}'; using null",
                    raw,
                    self.ty.value_type(),
                    self.ty.name
                );
                ATOM_ID_NULL
            }
        }
    }

    /// Interns an already-typed value.
    pub fn intern_value(&mut self, value: AtomValue) -> AtomId {
        if value.is_null() {
            return ATOM_ID_NULL;
        }

        let key = self.ty.codec.key(&value);
        if let Some(&id) = self.by_key.get(&key) {
            return id;
        }

        let id = self.atoms.len() as AtomId;
        let label = self.ty.codec.format(&value);
        self.atoms.push(Atom {
            id,
            value,
            key: key.clone(),
            label,
        });
        self.by_key.insert(key, id);
        id
    }

    /// Looks up an atom. The null id always resolves to the null atom.
    pub fn atom(&self, id: AtomId) -> Option<&Atom> {
        if id == ATOM_ID_NULL {
            return Some(&self.null_atom);
        }
        self.atoms.get(id as usize)
    }

    pub fn null_atom(&self) -> &Atom {
        &self.null_atom
    }

    /// Finds an interned atom by its key.
    pub fn find(&self, key: &str) -> Option<AtomId> {
        self.by_key.get(key).copied()
    }

    /// Interned atoms (excluding null), in interning order.
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Orders two atoms of this dimension: null first, then by value for
    /// comparable dimensions, otherwise by first-seen order.
    pub fn compare_atoms(&self, a: AtomId, b: AtomId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        match (a == ATOM_ID_NULL, b == ATOM_ID_NULL) {
            (true, _) => return Ordering::Less,
            (_, true) => return Ordering::Greater,
            _ => {}
        }

        if self.ty.is_comparable() {
            if let (Some(va), Some(vb)) = (self.atom(a), self.atom(b)) {
                let ord = self.ty.codec.compare(&va.value, &vb.value);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
        a.cmp(&b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_returns_same_atom() {
        let mut dim = Dimension::new(0, DimensionType::new("city", ValueType::String));
        let london = dim.intern(&RawValue::from("London"));
        let paris = dim.intern(&RawValue::from("Paris"));
        assert_eq!(dim.intern(&RawValue::from("London")), london);
        assert_ne!(london, paris);
        assert_eq!(dim.atom_count(), 2);
        assert_eq!(dim.atom(paris).unwrap().label, "Paris");
        assert_eq!(dim.find("London"), Some(london));
    }

    #[test]
    fn test_null_is_shared() {
        let mut dim = Dimension::new(0, DimensionType::new("qty", ValueType::Number));
        assert_eq!(dim.intern(&RawValue::Null), ATOM_ID_NULL);
        assert_eq!(dim.intern(&RawValue::from("")), ATOM_ID_NULL);
        assert!(dim.atom(ATOM_ID_NULL).unwrap().is_null());
        assert_eq!(dim.atom_count(), 0);
    }

    #[test]
    fn test_unconvertible_values_become_null() {
        let mut dim = Dimension::new(0, DimensionType::new("qty", ValueType::Number));
        assert_eq!(dim.intern(&RawValue::from("many")), ATOM_ID_NULL);
        let id = dim.intern(&RawValue::from(" 72 "));
        assert_eq!(dim.atom(id).unwrap().value.as_number(), Some(72.0));
        // text and number forms of the same value are one atom
        assert_eq!(dim.intern(&RawValue::Number(72.0)), id);
    }

    #[test]
    fn test_comparable_dimensions_order_by_value() {
        let mut dim = Dimension::new(0, DimensionType::new("qty", ValueType::Number));
        let big = dim.intern(&RawValue::Number(80.0));
        let small = dim.intern(&RawValue::Number(27.0));
        assert_eq!(dim.compare_atoms(small, big), Ordering::Less);
        assert_eq!(dim.compare_atoms(ATOM_ID_NULL, small), Ordering::Less);
    }

    #[test]
    fn test_discrete_dimensions_order_by_first_seen() {
        let mut dim = Dimension::new(0, DimensionType::new("city", ValueType::String));
        let paris = dim.intern(&RawValue::from("Paris"));
        let london = dim.intern(&RawValue::from("London"));
        assert_eq!(dim.compare_atoms(paris, london), Ordering::Less);
    }

    #[test]
    fn test_dates_are_comparable_and_continuous() {
        let ty = DimensionType::new("date", ValueType::Date);
        assert!(ty.is_comparable());
        assert!(!ty.is_discrete());

        let mut dim = Dimension::new(0, ty);
        let later = dim.intern(&RawValue::from("2011-06-12"));
        let earlier = dim.intern(&RawValue::from("2011-06-05"));
        assert_eq!(dim.compare_atoms(earlier, later), Ordering::Less);
        assert_eq!(dim.atom(earlier).unwrap().key, "2011-06-05");
    }

    #[derive(Debug)]
    struct SortedText;

    impl AtomCodec for SortedText {
        fn value_type(&self) -> ValueType {
            ValueType::String
        }

        fn is_comparable(&self) -> bool {
            true
        }

        fn format(&self, value: &AtomValue) -> String {
            value.to_key().to_uppercase()
        }
    }

    #[test]
    fn test_custom_codec_overrides_defaults() {
        let ty = DimensionType::with_codec("city", Arc::new(SortedText));
        let mut dim = Dimension::new(0, ty);
        let paris = dim.intern(&RawValue::from("Paris"));
        let london = dim.intern(&RawValue::from("London"));
        assert_eq!(dim.compare_atoms(london, paris), Ordering::Less);
        assert_eq!(dim.atom(london).unwrap().label, "LONDON");
    }
}
