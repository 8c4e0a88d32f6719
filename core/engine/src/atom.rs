//! FILENAME: core/engine/src/atom.rs
//! PURPOSE: Raw input values, typed atom values and interned atoms.
//! CONTEXT: Every distinct value of a dimension is stored once as an `Atom`
//! and referenced everywhere else by its `AtomId`. Two datums sharing a value
//! share the id, so equality checks during grouping are integer compares.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::date::CalendarDate;

// ============================================================================
// ATOM IDS
// ============================================================================

/// Reference to an interned atom within one dimension.
/// u32 keeps datum rows compact (up to 4B distinct values per dimension).
pub type AtomId = u32;

/// The null atom. Every dimension has exactly one.
pub const ATOM_ID_NULL: AtomId = u32::MAX;

// ============================================================================
// RAW VALUES
// ============================================================================

/// A value as it arrives from a source row, before conversion to the
/// dimension's type. Deserializes from any JSON scalar.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    #[default]
    Null,
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Boolean(value)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(RawValue::Null, Into::into)
    }
}

// ============================================================================
// ORDERED FLOAT
// ============================================================================

/// Wrapper around f64 that implements Eq and Hash so numbers can be interned.
/// NaN values are treated as equal to each other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        if self.0.is_nan() && other.0.is_nan() {
            true
        } else {
            self.0 == other.0
        }
    }
}

impl Eq for OrderedFloat {}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        if self.0.is_nan() {
            u64::MAX.hash(state);
        } else if self.0 == 0.0 {
            // 0.0 and -0.0 are equal, so they must hash alike
            0u64.hash(state);
        } else {
            self.0.to_bits().hash(state);
        }
    }
}

impl OrderedFloat {
    pub fn as_f64(&self) -> f64 {
        self.0
    }
}

// ============================================================================
// ATOM VALUES
// ============================================================================

/// A raw value after conversion to a dimension's value type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomValue {
    Null,
    Number(OrderedFloat),
    Text(String),
    Boolean(bool),
    Date(CalendarDate),
}

impl AtomValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AtomValue::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AtomValue::Number(n) => Some(n.0),
            _ => None,
        }
    }

    /// Canonical key text. Equal values always produce equal keys.
    pub fn to_key(&self) -> String {
        match self {
            AtomValue::Null => String::new(),
            AtomValue::Number(n) => format_number(n.0),
            AtomValue::Text(s) => s.clone(),
            AtomValue::Boolean(b) => b.to_string(),
            AtomValue::Date(d) => d.to_string(),
        }
    }
}

impl fmt::Display for AtomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key())
    }
}

/// Formats a number without a trailing `.0` for integral values.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        // collapses -0 into 0
        return "0".to_string();
    }
    format!("{}", n)
}

/// Default ordering of atom values: null, numbers, text, booleans, dates.
pub fn compare_atom_values(a: &AtomValue, b: &AtomValue) -> Ordering {
    match (a, b) {
        (AtomValue::Null, AtomValue::Null) => Ordering::Equal,
        (AtomValue::Null, _) => Ordering::Less,
        (_, AtomValue::Null) => Ordering::Greater,

        (AtomValue::Number(na), AtomValue::Number(nb)) => {
            na.0.partial_cmp(&nb.0).unwrap_or(Ordering::Equal)
        }
        (AtomValue::Number(_), _) => Ordering::Less,
        (_, AtomValue::Number(_)) => Ordering::Greater,

        (AtomValue::Text(ta), AtomValue::Text(tb)) => ta.cmp(tb),
        (AtomValue::Text(_), _) => Ordering::Less,
        (_, AtomValue::Text(_)) => Ordering::Greater,

        (AtomValue::Boolean(ba), AtomValue::Boolean(bb)) => ba.cmp(bb),
        (AtomValue::Boolean(_), _) => Ordering::Less,
        (_, AtomValue::Boolean(_)) => Ordering::Greater,

        (AtomValue::Date(da), AtomValue::Date(db)) => da.cmp(db),
    }
}

// ============================================================================
// ATOM
// ============================================================================

/// An interned value of one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub id: AtomId,
    pub value: AtomValue,
    /// Canonical key, unique within the dimension.
    pub key: String,
    /// Display text.
    pub label: String,
}

impl Atom {
    pub fn null() -> Self {
        Atom {
            id: ATOM_ID_NULL,
            value: AtomValue::Null,
            key: String::new(),
            label: String::new(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.id == ATOM_ID_NULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_values_from_json_scalars() {
        let values: Vec<RawValue> =
            serde_json::from_str(r#"[null, true, 72, 2.5, "London"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                RawValue::Null,
                RawValue::Boolean(true),
                RawValue::Number(72.0),
                RawValue::Number(2.5),
                RawValue::Text("London".to_string()),
            ]
        );
    }

    #[test]
    fn test_number_keys() {
        assert_eq!(AtomValue::Number(OrderedFloat(72.0)).to_key(), "72");
        assert_eq!(AtomValue::Number(OrderedFloat(2.5)).to_key(), "2.5");
        assert_eq!(AtomValue::Number(OrderedFloat(-0.0)).to_key(), "0");
        assert_eq!(AtomValue::Null.to_key(), "");
    }

    #[test]
    fn test_nan_is_equal_to_itself() {
        assert_eq!(OrderedFloat(f64::NAN), OrderedFloat(f64::NAN));
        assert_ne!(OrderedFloat(1.0), OrderedFloat(f64::NAN));
    }

    #[test]
    fn test_value_ordering_by_kind() {
        let null = AtomValue::Null;
        let one = AtomValue::Number(OrderedFloat(1.0));
        let text = AtomValue::Text("a".to_string());
        assert_eq!(compare_atom_values(&null, &one), Ordering::Less);
        assert_eq!(compare_atom_values(&one, &text), Ordering::Less);
        assert_eq!(compare_atom_values(&text, &text), Ordering::Equal);
    }

    #[test]
    fn test_option_into_raw() {
        let none: Option<f64> = None;
        assert_eq!(RawValue::from(none), RawValue::Null);
        assert_eq!(RawValue::from(Some("x")), RawValue::Text("x".to_string()));
    }
}
