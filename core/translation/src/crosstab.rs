//! FILENAME: core/translation/src/crosstab.rs
//! PURPOSE: Cross-tabulated sources: one row per category, one column per series.
//! CONTEXT: The matrix is remapped to virtual `[series, category, value]`
//! items so the relational reader machinery applies unchanged.
//!
//! ```text
//!            | North | South        first row:    series labels
//!   Apples   |   3   |   5          first column: category labels
//!   Pears    |   4   |   1          cells:        values
//! ```
//!
//! Items come category-major: (North, Apples), (South, Apples), (North, Pears)...
//! With `series_in_rows` the header row holds categories and the first
//! column holds series.

use cube_engine::{CubeError, CubeResult, RawValue};

use crate::metadata::{ColumnMetadata, ColumnType};
use crate::reader::ReaderSpec;
use crate::registry::ReaderRegistry;
use crate::translation::SourceTranslation;

const SERIES_COLUMN: usize = 0;
const CATEGORY_COLUMN: usize = 1;
const VALUE_COLUMN: usize = 2;

#[derive(Debug, Clone)]
pub struct CrosstabSource {
    matrix: Vec<Vec<RawValue>>,
    series_in_rows: bool,
    metadata: Vec<ColumnMetadata>,
}

impl CrosstabSource {
    pub fn new(matrix: Vec<Vec<RawValue>>, series_in_rows: bool) -> Self {
        Self::with_category_type(matrix, series_in_rows, ColumnType::String)
    }

    /// Category labels typed as `category_type` (dates, numbers...).
    pub fn with_category_type(
        matrix: Vec<Vec<RawValue>>,
        series_in_rows: bool,
        category_type: ColumnType,
    ) -> Self {
        let metadata = vec![
            ColumnMetadata::new("series", ColumnType::String),
            ColumnMetadata::new("category", category_type),
            ColumnMetadata::new("value", ColumnType::Numeric),
        ];
        CrosstabSource {
            matrix,
            series_in_rows,
            metadata,
        }
    }

    pub fn from_json(matrix: &str, series_in_rows: bool) -> CubeResult<Self> {
        let matrix: Vec<Vec<RawValue>> = serde_json::from_str(matrix)
            .map_err(|e| CubeError::argument_invalid("matrix", e.to_string()))?;
        Ok(Self::new(matrix, series_in_rows))
    }

    fn body_rows(&self) -> usize {
        self.matrix.len().saturating_sub(1)
    }

    fn body_columns(&self) -> usize {
        self.matrix.first().map_or(0, |header| header.len().saturating_sub(1))
    }

    pub fn series_count(&self) -> usize {
        if self.series_in_rows {
            self.body_rows()
        } else {
            self.body_columns()
        }
    }

    pub fn category_count(&self) -> usize {
        if self.series_in_rows {
            self.body_columns()
        } else {
            self.body_rows()
        }
    }

    fn cell(&self, row: usize, column: usize) -> RawValue {
        self.matrix
            .get(row)
            .and_then(|r| r.get(column))
            .cloned()
            .unwrap_or_default()
    }
}

impl SourceTranslation for CrosstabSource {
    fn metadata(&self) -> &[ColumnMetadata] {
        &self.metadata
    }

    fn virtual_item_count(&self) -> usize {
        self.series_count() * self.category_count()
    }

    fn virtual_item(&self, index: usize, out: &mut Vec<RawValue>) {
        out.clear();
        let series_count = self.series_count();
        if series_count == 0 || index >= self.virtual_item_count() {
            return;
        }
        let category = index / series_count + 1;
        let series = index % series_count + 1;

        let (series_label, category_label, value) = if self.series_in_rows {
            (self.cell(series, 0), self.cell(0, category), self.cell(series, category))
        } else {
            (self.cell(0, series), self.cell(category, 0), self.cell(category, series))
        };
        out.push(series_label);
        out.push(category_label);
        out.push(value);
    }

    fn configure_default_readers(&self, registry: &mut ReaderRegistry) -> CubeResult<()> {
        for (name, column) in [
            ("series", SERIES_COLUMN),
            ("category", CATEGORY_COLUMN),
            ("value", VALUE_COLUMN),
        ] {
            if !registry.is_bound(name) && !registry.is_claimed(column) {
                registry.register(&ReaderSpec::new(name).at(&[column as i64]))?;
            }
        }
        Ok(())
    }
}
