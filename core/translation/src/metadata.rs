//! FILENAME: core/translation/src/metadata.rs
//! PURPOSE: Column descriptors of a tabular source.
//! CONTEXT: Metadata arrives from the configuration layer as JSON
//! (`{"name": "Sales", "type": "Numeric", "index": 2}`). The `index` names
//! the physical cell of a logical column; readers address logical columns.

use cube_engine::{RawValue, ValueType};
use serde::{Deserialize, Serialize};

/// Declared type of a source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColumnType {
    #[default]
    String,
    Numeric,
    Date,
    Boolean,
    /// Any type name this crate does not know; read as text.
    #[serde(other)]
    Other,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Numeric)
    }

    /// Value type of a dimension declared for a column of this type.
    pub fn value_type(&self) -> ValueType {
        match self {
            ColumnType::Numeric => ValueType::Number,
            ColumnType::Date => ValueType::Date,
            ColumnType::Boolean => ValueType::Boolean,
            ColumnType::String | ColumnType::Other => ValueType::String,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,

    #[serde(rename = "type", default)]
    pub column_type: ColumnType,

    /// Physical cell position; defaults to the column's own position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        ColumnMetadata {
            name: name.into(),
            column_type,
            index: None,
        }
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

/// Physical cell positions of the logical columns, in logical order.
pub fn physical_positions(metadata: &[ColumnMetadata]) -> Vec<usize> {
    metadata
        .iter()
        .enumerate()
        .map(|(position, column)| column.index.unwrap_or(position))
        .collect()
}

/// Copies the cells of a physical row into logical column order.
/// Cells missing from the row read as null.
pub fn to_logical_row(row: &[RawValue], positions: &[usize], out: &mut Vec<RawValue>) {
    out.clear();
    out.extend(
        positions
            .iter()
            .map(|&p| row.get(p).cloned().unwrap_or(RawValue::Null)),
    );
}
