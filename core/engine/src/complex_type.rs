//! FILENAME: core/engine/src/complex_type.rs
//! PURPOSE: The schema: an ordered, named set of dimensions.
//! CONTEXT: Dimensions can be declared until the schema is sealed. Sealing
//! happens when the first datums are loaded; from then on the set of
//! dimensions is fixed (their interning tables keep growing).

use std::borrow::Cow;

use log::debug;
use rustc_hash::FxHashMap;

use crate::atom::AtomId;
use crate::dimension::{Dimension, DimensionType};
use crate::error::{CubeError, CubeResult};

/// Default separator between atom keys in composite keys.
pub const DEFAULT_KEY_SEPARATOR: &str = ",";

/// Default separator between atom labels in composite labels.
pub const DEFAULT_LABEL_SEPARATOR: &str = ", ";

/// Prefixes backslashes and separator characters in `part` with a backslash,
/// so no escaped part can contain an unescaped separator.
pub fn escape_key_part<'a>(part: &'a str, separator: &str) -> Cow<'a, str> {
    let special = |c: char| c == '\\' || separator.contains(c);
    if !part.contains(special) {
        return Cow::Borrowed(part);
    }
    let mut escaped = String::with_capacity(part.len() + 2);
    for c in part.chars() {
        if special(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

/// Joins key parts with `separator`. A lone part is kept as is; parts of a
/// composite key are escaped, so distinct part lists give distinct keys.
pub fn join_key_parts<'a, I>(parts: I, separator: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut parts = parts.into_iter();
    let Some(first) = parts.next() else {
        return String::new();
    };
    let Some(second) = parts.next() else {
        return first.to_string();
    };
    let mut key = escape_key_part(first, separator).into_owned();
    for part in std::iter::once(second).chain(parts) {
        key.push_str(separator);
        key.push_str(&escape_key_part(part, separator));
    }
    key
}

#[derive(Debug, Clone)]
pub struct ComplexType {
    dimensions: Vec<Dimension>,
    by_name: FxHashMap<String, usize>,
    pub key_separator: String,
    pub label_separator: String,
    sealed: bool,
}

impl ComplexType {
    pub fn new() -> Self {
        ComplexType {
            dimensions: Vec::new(),
            by_name: FxHashMap::default(),
            key_separator: DEFAULT_KEY_SEPARATOR.to_string(),
            label_separator: DEFAULT_LABEL_SEPARATOR.to_string(),
            sealed: false,
        }
    }

    /// Builds a schema from a list of dimension types.
    pub fn from_types(types: impl IntoIterator<Item = DimensionType>) -> CubeResult<Self> {
        let mut schema = ComplexType::new();
        for ty in types {
            schema.add_dimension(ty)?;
        }
        Ok(schema)
    }

    /// Declares a new dimension and returns its index.
    pub fn add_dimension(&mut self, ty: DimensionType) -> CubeResult<usize> {
        if self.sealed {
            return Err(CubeError::operation_invalid(format!(
                "Cannot add dimension '{}': the schema is sealed",
                ty.name
            )));
        }
        if ty.name.is_empty() {
            return Err(CubeError::argument_required("name"));
        }
        if self.by_name.contains_key(&ty.name) {
            return Err(CubeError::argument_invalid(
                "name",
                format!("dimension '{}' is already defined", ty.name),
            ));
        }

        let index = self.dimensions.len();
        debug!("Declared dimension '{}' ({:?}) at {}", ty.name, ty.value_type(), index);
        self.by_name.insert(ty.name.clone(), index);
        self.dimensions.push(Dimension::new(index, ty));
        Ok(index)
    }

    /// Returns the index of an existing dimension, or declares it.
    pub fn ensure_dimension(&mut self, ty: DimensionType) -> CubeResult<usize> {
        match self.by_name.get(&ty.name) {
            Some(&index) => Ok(index),
            None => self.add_dimension(ty),
        }
    }

    pub fn dimension(&self, name: &str) -> CubeResult<&Dimension> {
        self.dimension_index(name)
            .map(|index| &self.dimensions[index])
            .ok_or_else(|| CubeError::schema_mismatch(name))
    }

    pub fn dimension_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn has_dimension(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn dimension_at(&self, index: usize) -> Option<&Dimension> {
        self.dimensions.get(index)
    }

    pub fn dimension_at_mut(&mut self, index: usize) -> Option<&mut Dimension> {
        self.dimensions.get_mut(index)
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn dimension_count(&self) -> usize {
        self.dimensions.len()
    }

    /// Names of every dimension, in declaration order.
    pub fn dimension_names(&self) -> Vec<&str> {
        self.dimensions.iter().map(|d| d.name()).collect()
    }

    /// Names of the dimensions of a repeated group, in level order.
    pub fn group_dimension_names(&self, group: &str) -> Vec<&str> {
        let mut members: Vec<&Dimension> = self
            .dimensions
            .iter()
            .filter(|d| d.ty.group.as_deref() == Some(group))
            .collect();
        members.sort_by_key(|d| d.ty.group_level);
        members.into_iter().map(|d| d.name()).collect()
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Joins the keys of one atom per dimension into a datum key.
    pub fn datum_key(&self, atoms: &[AtomId]) -> String {
        let keys = atoms.iter().enumerate().map(|(index, &atom)| {
            self.dimensions
                .get(index)
                .and_then(|d| d.atom(atom))
                .map_or("", |atom| atom.key.as_str())
        });
        join_key_parts(keys, &self.key_separator)
    }
}

impl Default for ComplexType {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{RawValue, ATOM_ID_NULL};
    use crate::dimension::ValueType;

    fn city_schema() -> ComplexType {
        ComplexType::from_types([
            DimensionType::new("city", ValueType::String),
            DimensionType::new("date", ValueType::Date),
            DimensionType::new("qty", ValueType::Number),
        ])
        .unwrap()
    }

    #[test]
    fn test_dimensions_are_ordered_and_named() {
        let schema = city_schema();
        assert_eq!(schema.dimension_names(), vec!["city", "date", "qty"]);
        assert_eq!(schema.dimension_index("qty"), Some(2));
        assert!(matches!(
            schema.dimension("country"),
            Err(CubeError::SchemaMismatch(name)) if name == "country"
        ));
    }

    #[test]
    fn test_duplicate_dimension_is_rejected() {
        let mut schema = city_schema();
        let err = schema
            .add_dimension(DimensionType::new("city", ValueType::String))
            .unwrap_err();
        assert!(matches!(err, CubeError::ArgumentInvalid { .. }));
        assert_eq!(
            schema.ensure_dimension(DimensionType::new("city", ValueType::String)),
            Ok(0)
        );
    }

    #[test]
    fn test_sealed_schema_rejects_new_dimensions() {
        let mut schema = city_schema();
        schema.seal();
        let err = schema
            .add_dimension(DimensionType::new("country", ValueType::String))
            .unwrap_err();
        assert!(matches!(err, CubeError::OperationInvalid(_)));
    }

    #[test]
    fn test_datum_key_joins_atom_keys() {
        let mut schema = city_schema();
        let city = schema.dimension_at_mut(0).unwrap().intern(&RawValue::from("London"));
        let date = schema.dimension_at_mut(1).unwrap().intern(&RawValue::from("2011-06-05"));
        let key = schema.datum_key(&[city, date, ATOM_ID_NULL]);
        assert_eq!(key, "London,2011-06-05,");
    }

    #[test]
    fn test_separators_inside_values_are_escaped() {
        assert_eq!(join_key_parts(["a,b", "c"], ","), "a\\,b,c");
        assert_eq!(join_key_parts(["a", "b,c"], ","), "a,b\\,c");
        assert_eq!(join_key_parts(["a\\", ",c"], ","), "a\\\\,\\,c");
        assert_eq!(join_key_parts(["a,b"], ","), "a,b");
        assert_eq!(join_key_parts(std::iter::empty(), ","), "");
        assert_eq!(escape_key_part("x/y", "/"), "x\\/y");

        let mut schema = ComplexType::from_types([
            DimensionType::new("category", ValueType::String),
            DimensionType::new("series", ValueType::String),
        ])
        .unwrap();
        let first = [
            schema.dimension_at_mut(0).unwrap().intern(&RawValue::from("a,b")),
            schema.dimension_at_mut(1).unwrap().intern(&RawValue::from("c")),
        ];
        let second = [
            schema.dimension_at_mut(0).unwrap().intern(&RawValue::from("a")),
            schema.dimension_at_mut(1).unwrap().intern(&RawValue::from("b,c")),
        ];
        assert_ne!(schema.datum_key(&first), schema.datum_key(&second));
    }

    #[test]
    fn test_group_members_in_level_order() {
        let mut schema = ComplexType::new();
        schema
            .add_dimension(DimensionType::new("value2", ValueType::Number).in_group("value", 1))
            .unwrap();
        schema
            .add_dimension(DimensionType::new("series", ValueType::String))
            .unwrap();
        schema
            .add_dimension(DimensionType::new("value", ValueType::Number).in_group("value", 0))
            .unwrap();
        assert_eq!(schema.group_dimension_names("value"), vec!["value", "value2"]);
    }
}
