//! FILENAME: core/translation/src/relational.rs
//! PURPOSE: Relational sources: one row per fact.
//! CONTEXT: Rows are physical cell arrays; column metadata maps them to
//! logical columns. Columns user readers leave free are read by default as
//! `series` (first of two or more text columns), the `category` group (the
//! other text columns) and the `value` group (numeric columns).

use cube_engine::{CubeError, CubeResult, RawValue};

use crate::metadata::{physical_positions, to_logical_row, ColumnMetadata};
use crate::reader::ReaderSpec;
use crate::registry::ReaderRegistry;
use crate::translation::SourceTranslation;

#[derive(Debug, Clone)]
pub struct RelationalSource {
    metadata: Vec<ColumnMetadata>,
    positions: Vec<usize>,
    rows: Vec<Vec<RawValue>>,
}

impl RelationalSource {
    pub fn new(metadata: Vec<ColumnMetadata>, rows: Vec<Vec<RawValue>>) -> Self {
        let positions = physical_positions(&metadata);
        RelationalSource {
            metadata,
            positions,
            rows,
        }
    }

    /// Reads metadata (`[{"name", "type", "index"?}]`) and rows (array of
    /// arrays of JSON scalars).
    pub fn from_json(metadata: &str, rows: &str) -> CubeResult<Self> {
        let metadata: Vec<ColumnMetadata> = serde_json::from_str(metadata)
            .map_err(|e| CubeError::argument_invalid("metadata", e.to_string()))?;
        let rows: Vec<Vec<RawValue>> = serde_json::from_str(rows)
            .map_err(|e| CubeError::argument_invalid("rows", e.to_string()))?;
        Ok(Self::new(metadata, rows))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

impl SourceTranslation for RelationalSource {
    fn metadata(&self) -> &[ColumnMetadata] {
        &self.metadata
    }

    fn virtual_item_count(&self) -> usize {
        self.rows.len()
    }

    fn virtual_item(&self, index: usize, out: &mut Vec<RawValue>) {
        match self.rows.get(index) {
            Some(row) => to_logical_row(row, &self.positions, out),
            None => out.clear(),
        }
    }

    fn configure_default_readers(&self, registry: &mut ReaderRegistry) -> CubeResult<()> {
        let (numeric, mut text): (Vec<usize>, Vec<usize>) = registry
            .free_columns()
            .into_iter()
            .partition(|&c| self.metadata[c].column_type.is_numeric());

        if text.len() >= 2 && !registry.is_bound("series") {
            let series = text.remove(0);
            registry.register(&ReaderSpec::new("series").at(&[series as i64]))?;
        }
        if !text.is_empty() && !registry.is_bound("category") {
            registry.register(&ReaderSpec::new("category").at(&to_indexes(&text)))?;
        }
        if !numeric.is_empty() && !registry.is_bound("value") {
            registry.register(&ReaderSpec::new("value").at(&to_indexes(&numeric)))?;
        }
        Ok(())
    }
}

fn to_indexes(columns: &[usize]) -> Vec<i64> {
    columns.iter().map(|&c| c as i64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ColumnType;

    fn names(registry: &ReaderRegistry) -> Vec<String> {
        registry
            .readers()
            .iter()
            .flat_map(|r| r.bindings.iter().map(|b| b.name.clone()))
            .collect()
    }

    #[test]
    fn test_default_layout() {
        let source = RelationalSource::new(
            vec![
                ColumnMetadata::new("Region", ColumnType::String),
                ColumnMetadata::new("Product", ColumnType::String),
                ColumnMetadata::new("Sales", ColumnType::Numeric),
                ColumnMetadata::new("Quarter", ColumnType::String),
                ColumnMetadata::new("Units", ColumnType::Numeric),
            ],
            Vec::new(),
        );
        let mut registry = ReaderRegistry::new(5);
        source.configure_default_readers(&mut registry).unwrap();
        assert_eq!(
            names(&registry),
            vec!["series", "category", "category2", "value", "value2"]
        );
        assert!(registry.free_columns().is_empty());
    }

    #[test]
    fn test_single_text_column_is_category() {
        let source = RelationalSource::new(
            vec![
                ColumnMetadata::new("City", ColumnType::String),
                ColumnMetadata::new("Qty", ColumnType::Numeric),
            ],
            Vec::new(),
        );
        let mut registry = ReaderRegistry::new(2);
        source.configure_default_readers(&mut registry).unwrap();
        assert_eq!(names(&registry), vec!["category", "value"]);
    }

    #[test]
    fn test_bound_names_are_skipped() {
        let source = RelationalSource::new(
            vec![
                ColumnMetadata::new("A", ColumnType::String),
                ColumnMetadata::new("B", ColumnType::String),
                ColumnMetadata::new("C", ColumnType::Numeric),
            ],
            Vec::new(),
        );
        let mut registry = ReaderRegistry::new(3);
        registry.register(&ReaderSpec::new("value").at(&[0])).unwrap();
        source.configure_default_readers(&mut registry).unwrap();
        // one text column left: no series; value is taken, so C stays free
        assert_eq!(names(&registry), vec!["value", "category"]);
        assert_eq!(registry.free_columns(), vec![2]);
    }

    #[test]
    fn test_from_json_and_reorder() {
        let source = RelationalSource::from_json(
            r#"[{"name": "Qty", "type": "Numeric", "index": 1}, {"name": "City", "type": "String", "index": 0}]"#,
            r#"[["London", 72], ["Paris", 27.5]]"#,
        )
        .unwrap();
        assert_eq!(source.row_count(), 2);

        let mut out = Vec::new();
        source.virtual_item(1, &mut out);
        assert_eq!(out, vec![RawValue::Number(27.5), RawValue::from("Paris")]);
    }

    #[test]
    fn test_from_json_rejects_bad_rows() {
        let err = RelationalSource::from_json("[]", r#"{"not": "rows"}"#).unwrap_err();
        assert!(matches!(err, CubeError::ArgumentInvalid { ref name, .. } if name == "rows"));
    }
}
