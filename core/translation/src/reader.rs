//! FILENAME: core/translation/src/reader.rs
//! PURPOSE: Reader specifications: which dimensions read which columns.
//! CONTEXT: A reader spec names one or more dimensions and optionally the
//! logical columns they read (`{"names": "series, category", "indexes": [0]}`).
//! Names without indexes are placed on free columns by the registry. A spec
//! may instead carry a row function computing the values itself.

use std::fmt;
use std::rc::Rc;

use cube_engine::RawValue;
use serde::{Deserialize, Deserializer, Serialize};

/// Computes dimension values from a logical row, one per reader name.
#[derive(Clone)]
pub struct RowReader(Rc<dyn Fn(&[RawValue]) -> Vec<RawValue>>);

impl RowReader {
    pub fn new(read: impl Fn(&[RawValue]) -> Vec<RawValue> + 'static) -> Self {
        RowReader(Rc::new(read))
    }

    pub fn read(&self, row: &[RawValue]) -> Vec<RawValue> {
        (self.0)(row)
    }
}

impl fmt::Debug for RowReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RowReader")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReaderSpec {
    /// Dimension names. JSON accepts a list or one comma-separated string.
    #[serde(deserialize_with = "names_from_json")]
    pub names: Vec<String>,

    /// Logical column indexes. Signed so that negative input can be rejected
    /// with a precise error instead of a parse failure.
    #[serde(default)]
    pub indexes: Vec<i64>,

    #[serde(skip)]
    pub reader: Option<RowReader>,
}

impl ReaderSpec {
    /// A spec from a comma-separated name list.
    pub fn new(names: &str) -> Self {
        ReaderSpec {
            names: split_names(names),
            indexes: Vec::new(),
            reader: None,
        }
    }

    pub fn at(mut self, indexes: &[i64]) -> Self {
        self.indexes = indexes.to_vec();
        self
    }

    pub fn with_reader(mut self, reader: RowReader) -> Self {
        self.reader = Some(reader);
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NamesInput {
    One(String),
    Many(Vec<String>),
}

fn names_from_json<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match NamesInput::deserialize(deserializer)? {
        NamesInput::One(text) => split_names(&text),
        NamesInput::Many(names) => names.iter().map(|n| n.trim().to_string()).collect(),
    })
}

fn split_names(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// DIMENSION GROUPS
// ============================================================================

/// A name ending in `*` declares a repeatable group (`value*`).
pub fn group_base(name: &str) -> Option<&str> {
    name.strip_suffix('*')
}

/// Name of the dimension at `level` of a group.
///
/// `value*` groups number every level from zero (`value0`, `value1`, ...).
/// A plain name that absorbs extra columns keeps its own name for the first
/// level and continues from two (`value`, `value2`, `value3`).
pub fn group_dimension_name(base: &str, level: usize, starred: bool) -> String {
    match (starred, level) {
        (true, _) => format!("{}{}", base, level),
        (false, 0) => base.to_string(),
        (false, _) => format!("{}{}", base, level + 1),
    }
}
