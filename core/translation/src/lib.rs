//! FILENAME: core/translation/src/lib.rs
//! Source translation for the cube engine.
//!
//! Converts raw tabular input plus column metadata into atom rows bound to
//! schema dimensions. Relational (one row per fact) and cross-tabulated
//! (one row per category) sources share the same reader machinery: reader
//! specs are placed on columns by the `ReaderRegistry`, then a
//! `TranslationPlan` reads every virtual item into one `AtomRow`.

pub mod crosstab;
pub mod metadata;
pub mod reader;
pub mod registry;
pub mod relational;
pub mod translation;

pub use crosstab::CrosstabSource;
pub use metadata::{ColumnMetadata, ColumnType};
pub use reader::{ReaderSpec, RowReader};
pub use registry::{ReaderBinding, ReaderRegistry, RegisteredReader};
pub use relational::RelationalSource;
pub use translation::{
    SourceTranslation, Translation, TranslationOptions, TranslationPlan, DATA_PART_DIMENSION,
};
