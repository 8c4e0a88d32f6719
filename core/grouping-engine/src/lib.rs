//! FILENAME: core/grouping-engine/src/lib.rs
//! Grouping subsystem for the cube engine.
//!
//! This crate turns a loaded set of datums into hierarchical data trees.
//! It depends on `cube-engine` for the atom/dimension model and the lazy
//! query sequences, and on `grouping-parser` for grouping text.
//!
//! Layers:
//! - `definition`: compiled grouping specs and per-call options (what a grouping IS)
//! - `tree`: arena nodes with overlaid atoms (WHAT a grouping produces)
//! - `data`: the datum store, flags, node arena and grouping cache
//! - `engine`: the partitioning and flattening pass (HOW a tree is built)

pub mod data;
pub mod definition;
mod engine;
pub mod tree;

pub use data::Data;
pub use definition::{
    BoundGrouping, DatumPredicate, DerivedSpec, DimensionSpec, FlatteningMode, GroupingOptions,
    GroupingSpec, GroupingSpecOptions, LevelSpec, SpecId, DEFAULT_ABSOLUTE_KEY_SEPARATOR,
    DEFAULT_ABSOLUTE_LABEL_SEPARATOR,
};
pub use tree::{AtomOverlay, DataNode, NodeId};
