//! FILENAME: core/translation/src/translation.rs
//! PURPOSE: Turns a tabular source into atom rows bound to schema dimensions.
//! CONTEXT: Translation runs in two steps. `Translation::prepare` registers
//! the user readers and the source's default readers, then resolves (and if
//! allowed declares) every dimension they feed on the schema. The returned
//! plan reads items lazily; each item becomes one `AtomRow` ready for
//! `Data::load`.

use cube_engine::query::{from_iter, Query};
use cube_engine::{
    AtomRow, ComplexType, CubeError, CubeResult, DimensionType, RawValue, ValueType,
};
use log::debug;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::metadata::ColumnMetadata;
use crate::reader::{ReaderSpec, RowReader};
use crate::registry::{ReaderBinding, ReaderRegistry};

/// Hidden dimension receiving `TranslationOptions::data_part`.
pub const DATA_PART_DIMENSION: &str = "dataPart";

// ============================================================================
// SOURCE
// ============================================================================

/// A tabular source seen as a list of virtual items (logical rows).
pub trait SourceTranslation {
    /// Descriptors of the logical columns of every item.
    fn metadata(&self) -> &[ColumnMetadata];

    fn virtual_item_count(&self) -> usize;

    /// Writes item `index` into `out` in logical column order.
    fn virtual_item(&self, index: usize, out: &mut Vec<RawValue>);

    /// Registers readers for the columns user readers left free.
    fn configure_default_readers(&self, _registry: &mut ReaderRegistry) -> CubeResult<()> {
        Err(CubeError::not_implemented("default readers for this source"))
    }
}

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationOptions {
    /// User readers, registered before the source's defaults.
    #[serde(default)]
    pub readers: Vec<ReaderSpec>,

    /// Declare dimensions missing from the schema. When false a missing
    /// dimension is a `SchemaMismatch`.
    #[serde(default = "default_true")]
    pub define_dimensions: bool,

    /// Constant written to the hidden `dataPart` dimension of every datum.
    #[serde(default)]
    pub data_part: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for TranslationOptions {
    fn default() -> Self {
        TranslationOptions {
            readers: Vec::new(),
            define_dimensions: true,
            data_part: None,
        }
    }
}

// ============================================================================
// TRANSLATION
// ============================================================================

pub struct Translation<'s, S: SourceTranslation + ?Sized> {
    source: &'s S,
    options: TranslationOptions,
}

impl<'s, S: SourceTranslation + ?Sized> Translation<'s, S> {
    pub fn new(source: &'s S, options: TranslationOptions) -> Self {
        Translation { source, options }
    }

    /// Registers readers and binds them to `schema`.
    pub fn prepare(&self, schema: &mut ComplexType) -> CubeResult<TranslationPlan<'s, S>> {
        let metadata = self.source.metadata();
        let mut registry = ReaderRegistry::new(metadata.len());
        for spec in &self.options.readers {
            registry.register(spec)?;
        }
        self.source.configure_default_readers(&mut registry)?;

        if self.options.data_part.is_some() && registry.is_bound(DATA_PART_DIMENSION) {
            return Err(CubeError::argument_invalid(
                "data_part",
                format!("'{}' is already read from the source", DATA_PART_DIMENSION),
            ));
        }

        // Everything is checked before the first dimension is declared, so a
        // failed prepare leaves the schema as it was.
        let registered = registry.into_readers();
        let mut staged = Vec::with_capacity(registered.len());
        for reader in registered {
            let mut types: SmallVec<[(DimensionType, Option<usize>); 4]> = SmallVec::new();
            for binding in &reader.bindings {
                let ty = self.dimension_type(binding);
                self.check_declarable(schema, &ty)?;
                types.push((ty, binding.column));
            }
            staged.push((reader.reader, types));
        }
        let data_part = match &self.options.data_part {
            Some(part) => {
                let ty = DimensionType::new(DATA_PART_DIMENSION, ValueType::String).hidden();
                self.check_declarable(schema, &ty)?;
                Some((ty, RawValue::from(part.as_str())))
            }
            None => None,
        };

        let mut readers = Vec::with_capacity(staged.len());
        for (reader, types) in staged {
            let mut targets: SmallVec<[(usize, Option<usize>); 4]> = SmallVec::new();
            for (ty, column) in types {
                targets.push((schema.ensure_dimension(ty)?, column));
            }
            readers.push(match reader {
                Some(reader) => PlannedReader::Function {
                    reader,
                    dimensions: targets.iter().map(|&(d, _)| d).collect(),
                },
                None => PlannedReader::Columns(
                    targets
                        .iter()
                        .filter_map(|&(d, c)| c.map(|c| (d, c)))
                        .collect(),
                ),
            });
        }
        let data_part = match data_part {
            Some((ty, part)) => Some((schema.ensure_dimension(ty)?, part)),
            None => None,
        };

        debug!(
            "Prepared translation of {} items: {} readers over {} columns",
            self.source.virtual_item_count(),
            readers.len(),
            metadata.len()
        );
        Ok(TranslationPlan {
            source: self.source,
            assembler: RowAssembler { readers, data_part },
        })
    }

    /// The dimension a binding feeds, typed and labelled from its column.
    fn dimension_type(&self, binding: &ReaderBinding) -> DimensionType {
        let column = binding
            .column
            .and_then(|c| self.source.metadata().get(c));
        let value_type = match (binding.column, column) {
            (Some(_), Some(meta)) => meta.column_type.value_type(),
            (Some(_), None) => ValueType::String,
            (None, _) => ValueType::Any,
        };

        let mut ty = DimensionType::new(binding.name.clone(), value_type);
        if let Some(meta) = column {
            ty = ty.with_label(meta.name.clone());
        }
        if let Some((group, level)) = &binding.group {
            ty = ty.in_group(group.clone(), *level);
        }
        ty
    }

    /// Fails the way declaring `ty` would, without declaring it.
    fn check_declarable(&self, schema: &ComplexType, ty: &DimensionType) -> CubeResult<()> {
        if schema.has_dimension(&ty.name) {
            return Ok(());
        }
        if !self.options.define_dimensions {
            return Err(CubeError::schema_mismatch(ty.name.clone()));
        }
        if schema.is_sealed() {
            return Err(CubeError::operation_invalid(format!(
                "Cannot add dimension '{}': the schema is sealed",
                ty.name
            )));
        }
        if ty.name.is_empty() {
            return Err(CubeError::argument_required("name"));
        }
        Ok(())
    }
}

// ============================================================================
// PLAN
// ============================================================================

#[derive(Debug, Clone)]
enum PlannedReader {
    /// (dimension index, logical column) pairs.
    Columns(SmallVec<[(usize, usize); 4]>),
    Function {
        reader: RowReader,
        dimensions: SmallVec<[usize; 4]>,
    },
}

/// Readers bound to dimension indexes, ready to read a source.
pub struct TranslationPlan<'s, S: SourceTranslation + ?Sized> {
    source: &'s S,
    assembler: RowAssembler,
}

impl<'s, S: SourceTranslation + ?Sized> TranslationPlan<'s, S> {
    pub fn item_count(&self) -> usize {
        self.source.virtual_item_count()
    }

    /// Dimension indexes written by every row, in reader order.
    pub fn dimension_indexes(&self) -> Vec<usize> {
        let mut indexes = Vec::new();
        for reader in &self.assembler.readers {
            match reader {
                PlannedReader::Columns(pairs) => indexes.extend(pairs.iter().map(|&(d, _)| d)),
                PlannedReader::Function { dimensions, .. } => indexes.extend_from_slice(dimensions),
            }
        }
        if let Some((index, _)) = &self.assembler.data_part {
            indexes.push(*index);
        }
        indexes
    }

    /// Reads every item, on demand.
    pub fn rows(&self) -> impl Query<Item = AtomRow> + '_ {
        let source: &S = self.source;
        let assembler = &self.assembler;
        let mut buffer = Vec::new();
        from_iter(
            (0..source.virtual_item_count())
                .map(move |index| assembler.read_item(source, index, &mut buffer)),
        )
    }
}

#[derive(Debug, Clone)]
struct RowAssembler {
    readers: Vec<PlannedReader>,
    data_part: Option<(usize, RawValue)>,
}

impl RowAssembler {
    fn read_item<S: SourceTranslation + ?Sized>(
        &self,
        source: &S,
        index: usize,
        buffer: &mut Vec<RawValue>,
    ) -> AtomRow {
        source.virtual_item(index, buffer);
        let mut row = AtomRow::new();
        for reader in &self.readers {
            match reader {
                PlannedReader::Columns(pairs) => {
                    for &(dimension, column) in pairs {
                        row.push((dimension, buffer.get(column).cloned().unwrap_or_default()));
                    }
                }
                PlannedReader::Function { reader, dimensions } => {
                    let values = reader.read(buffer);
                    for (i, &dimension) in dimensions.iter().enumerate() {
                        row.push((dimension, values.get(i).cloned().unwrap_or_default()));
                    }
                }
            }
        }
        if let Some((dimension, part)) = &self.data_part {
            row.push((*dimension, part.clone()));
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ColumnType;

    /// Two columns, no default readers.
    struct Pairs {
        metadata: Vec<ColumnMetadata>,
        items: Vec<Vec<RawValue>>,
    }

    impl Pairs {
        fn new() -> Self {
            Pairs {
                metadata: vec![
                    ColumnMetadata::new("Name", ColumnType::String),
                    ColumnMetadata::new("Score", ColumnType::Numeric),
                ],
                items: vec![
                    vec![RawValue::from("ann"), RawValue::from(3.0)],
                    vec![RawValue::from("bob"), RawValue::from(5.0)],
                ],
            }
        }
    }

    impl SourceTranslation for Pairs {
        fn metadata(&self) -> &[ColumnMetadata] {
            &self.metadata
        }

        fn virtual_item_count(&self) -> usize {
            self.items.len()
        }

        fn virtual_item(&self, index: usize, out: &mut Vec<RawValue>) {
            out.clear();
            out.extend_from_slice(&self.items[index]);
        }
    }

    /// `Pairs` whose default layout reads nothing.
    struct WithDefaults(Pairs);

    impl SourceTranslation for WithDefaults {
        fn metadata(&self) -> &[ColumnMetadata] {
            self.0.metadata()
        }
        fn virtual_item_count(&self) -> usize {
            self.0.virtual_item_count()
        }
        fn virtual_item(&self, index: usize, out: &mut Vec<RawValue>) {
            self.0.virtual_item(index, out)
        }
        fn configure_default_readers(&self, _: &mut ReaderRegistry) -> CubeResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_missing_default_readers_not_implemented() {
        let source = Pairs::new();
        let mut schema = ComplexType::new();
        let err = Translation::new(&source, TranslationOptions::default())
            .prepare(&mut schema)
            .err()
            .unwrap();
        assert!(matches!(err, CubeError::NotImplemented(_)));
    }

    #[test]
    fn test_options_from_json() {
        let options: TranslationOptions = serde_json::from_str(
            r#"{"readers": [{"names": "who", "indexes": [0]}], "data_part": "0"}"#,
        )
        .unwrap();
        assert!(options.define_dimensions);
        assert_eq!(options.readers[0].names, vec!["who"]);
        assert_eq!(options.data_part.as_deref(), Some("0"));
    }

    #[test]
    fn test_failed_prepare_declares_nothing() {
        let source = WithDefaults(Pairs::new());
        let options: TranslationOptions = serde_json::from_str(
            r#"{"readers": [{"names": "who", "indexes": [0]}, {"names": ["", "score"], "indexes": [1]}]}"#,
        )
        .unwrap();
        let mut schema = ComplexType::new();
        let err = Translation::new(&source, options).prepare(&mut schema).err().unwrap();
        assert_eq!(err, CubeError::ArgumentRequired("name".to_string()));
        assert_eq!(schema.dimension_count(), 0);
    }

    #[test]
    fn test_function_reader_values() {
        let source = WithDefaults(Pairs::new());
        let options = TranslationOptions {
            readers: vec![ReaderSpec::new("double").with_reader(RowReader::new(|row| {
                vec![RawValue::from(row[1].as_number().unwrap_or(0.0) * 2.0)]
            }))],
            ..TranslationOptions::default()
        };
        let mut schema = ComplexType::new();
        let plan = Translation::new(&source, options).prepare(&mut schema).unwrap();
        let rows = plan.rows().to_array();
        assert_eq!(rows[1], vec![(0, RawValue::from(10.0))]);
        assert_eq!(schema.dimension("double").unwrap().ty.value_type(), ValueType::Any);
    }
}
