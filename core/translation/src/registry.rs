//! FILENAME: core/translation/src/registry.rs
//! PURPOSE: Reader registry and column index allocator.
//! CONTEXT: One registry lives for one translation. Every reader spec is
//! validated and placed when it is registered, so conflicts surface before
//! any row is read:
//!
//!   - explicit indexes go to names left to right
//!   - names left over are padded onto free columns, walking forward from
//!     the last index used by the spec
//!   - indexes left over are absorbed by the last name as a dimension group
//!     (`value*` over three columns reads `value0`, `value1`, `value2`)
//!
//! Claiming a column twice, a negative index, or binding a dimension name
//! twice fails with `ArgumentInvalid`.

use cube_engine::{CubeError, CubeResult};
use log::{debug, warn};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::reader::{group_base, group_dimension_name, ReaderSpec, RowReader};

/// One dimension fed by a registered reader.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderBinding {
    pub name: String,
    /// Logical column read; `None` for row-function readers.
    pub column: Option<usize>,
    /// (group base name, level) for dimensions of a repeated group.
    pub group: Option<(String, usize)>,
}

#[derive(Debug, Clone)]
pub struct RegisteredReader {
    pub bindings: SmallVec<[ReaderBinding; 4]>,
    pub reader: Option<RowReader>,
}

#[derive(Debug, Default)]
pub struct ReaderRegistry {
    column_count: usize,
    claimed: FxHashSet<usize>,
    bound: FxHashSet<String>,
    readers: Vec<RegisteredReader>,
}

impl ReaderRegistry {
    pub fn new(column_count: usize) -> Self {
        ReaderRegistry {
            column_count,
            ..ReaderRegistry::default()
        }
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn is_claimed(&self, column: usize) -> bool {
        self.claimed.contains(&column)
    }

    pub fn claimed_count(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.bound.contains(name)
    }

    /// Columns no reader reads yet, in order.
    pub fn free_columns(&self) -> Vec<usize> {
        (0..self.column_count)
            .filter(|c| !self.claimed.contains(c))
            .collect()
    }

    pub fn readers(&self) -> &[RegisteredReader] {
        &self.readers
    }

    pub fn into_readers(self) -> Vec<RegisteredReader> {
        self.readers
    }

    /// Validates, places and records a reader spec.
    pub fn register(&mut self, spec: &ReaderSpec) -> CubeResult<()> {
        if spec.names.is_empty() {
            return Err(CubeError::argument_required("names"));
        }
        let explicit = self.validate_indexes(&spec.indexes)?;

        let bindings = match &spec.reader {
            Some(_) => self.function_bindings(&spec.names)?,
            None => self.column_bindings(&spec.names, explicit.clone())?,
        };

        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for binding in &bindings {
            if self.bound.contains(&binding.name) || !seen.insert(binding.name.as_str()) {
                return Err(CubeError::argument_invalid(
                    "names",
                    format!("dimension '{}' already has a reader", binding.name),
                ));
            }
        }

        self.claimed.extend(explicit);
        for binding in &bindings {
            if let Some(column) = binding.column {
                if column >= self.column_count {
                    warn!(
                        "Reader for '{}' reads column {} of a {}-column source",
                        binding.name, column, self.column_count
                    );
                }
                self.claimed.insert(column);
            }
            self.bound.insert(binding.name.clone());
        }
        debug!(
            "Registered reader: {}",
            bindings
                .iter()
                .map(|b| match b.column {
                    Some(c) => format!("{}@{}", b.name, c),
                    None => format!("{}@fn", b.name),
                })
                .collect::<Vec<_>>()
                .join(", ")
        );

        self.readers.push(RegisteredReader {
            bindings,
            reader: spec.reader.clone(),
        });
        Ok(())
    }

    /// Rejects negative, repeated and already claimed indexes.
    fn validate_indexes(&self, indexes: &[i64]) -> CubeResult<Vec<usize>> {
        let mut columns = Vec::with_capacity(indexes.len());
        for &index in indexes {
            let column = usize::try_from(index).map_err(|_| {
                CubeError::argument_invalid("indexes", format!("negative index {}", index))
            })?;
            if self.claimed.contains(&column) || columns.contains(&column) {
                return Err(CubeError::argument_invalid(
                    "indexes",
                    format!("column {} is already read by another reader", column),
                ));
            }
            columns.push(column);
        }
        Ok(columns)
    }

    fn function_bindings(&self, names: &[String]) -> CubeResult<SmallVec<[ReaderBinding; 4]>> {
        names
            .iter()
            .map(|name| {
                if group_base(name).is_some() {
                    return Err(CubeError::argument_invalid(
                        "names",
                        format!("'{}': a row function cannot feed a dimension group", name),
                    ));
                }
                Ok(ReaderBinding {
                    name: name.clone(),
                    column: None,
                    group: None,
                })
            })
            .collect()
    }

    fn column_bindings(
        &self,
        names: &[String],
        mut columns: Vec<usize>,
    ) -> CubeResult<SmallVec<[ReaderBinding; 4]>> {
        if let Some(name) = names[..names.len() - 1].iter().find(|n| group_base(n).is_some()) {
            return Err(CubeError::argument_invalid(
                "names",
                format!("group name '{}' must be the last name", name),
            ));
        }

        // Padding
        let mut next = columns.last().map_or(0, |&c| c + 1);
        while columns.len() < names.len() {
            while self.claimed.contains(&next) || columns.contains(&next) {
                next += 1;
            }
            columns.push(next);
            next += 1;
        }

        let last = names.len() - 1;
        let mut bindings: SmallVec<[ReaderBinding; 4]> = names[..last]
            .iter()
            .zip(&columns)
            .map(|(name, &column)| ReaderBinding {
                name: name.clone(),
                column: Some(column),
                group: None,
            })
            .collect();

        let group_columns = &columns[last..];
        let (base, starred) = match group_base(&names[last]) {
            Some(base) => (base, true),
            None => (names[last].as_str(), false),
        };
        if base.is_empty() {
            return Err(CubeError::argument_required("group name"));
        }

        if !starred && group_columns.len() == 1 {
            bindings.push(ReaderBinding {
                name: base.to_string(),
                column: Some(group_columns[0]),
                group: None,
            });
        } else {
            for (level, &column) in group_columns.iter().enumerate() {
                bindings.push(ReaderBinding {
                    name: group_dimension_name(base, level, starred),
                    column: Some(column),
                    group: Some((base.to_string(), level)),
                });
            }
        }
        Ok(bindings)
    }
}
