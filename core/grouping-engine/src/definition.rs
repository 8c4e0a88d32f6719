//! FILENAME: core/grouping-engine/src/definition.rs
//! Grouping Definition - what a grouping IS.
//!
//! This module contains the types that DESCRIBE how datums are partitioned:
//! - `GroupingSpec`: compiled, immutable list of levels, shared through `Rc`
//! - `GroupingSpecOptions`: compile-time options (flattening, root label)
//! - `GroupingOptions`: per-call datum filters and absolute key separators
//!
//! A spec's identity (`id`) is part of the data tree's cache key, so derived
//! variants are memoized and handed out as the same `Rc` on every request.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use cube_engine::{ComplexType, CubeError, CubeResult, Datum};
use grouping_parser::{DimensionAst, Direction, GroupingAst, LevelAst};
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Unique identity of a compiled grouping specification.
pub type SpecId = u64;

static NEXT_SPEC_ID: AtomicU64 = AtomicU64::new(1);

fn next_spec_id() -> SpecId {
    NEXT_SPEC_ID.fetch_add(1, Ordering::Relaxed)
}

// ============================================================================
// FLATTENING
// ============================================================================

/// How a grouped tree is projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FlatteningMode {
    /// The tree as built, one depth per level.
    #[default]
    None,
    /// Every node surfaced under a synthetic root, parents before children.
    DfsPre,
    /// Every node surfaced under a synthetic root, children before parents.
    DfsPost,
}

// ============================================================================
// LEVEL DEFINITIONS
// ============================================================================

/// One dimension of a level, with its sort direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub name: String,
    #[serde(default)]
    pub reverse: bool,
}

impl DimensionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        DimensionSpec {
            name: name.into(),
            reverse: false,
        }
    }

    pub fn reversed(name: impl Into<String>) -> Self {
        DimensionSpec {
            name: name.into(),
            reverse: true,
        }
    }
}

/// One level of a grouping: dimensions compared together.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSpec {
    pub dimensions: SmallVec<[DimensionSpec; 4]>,
    /// Names of every dimension up to and including this level.
    pub accumulated_names: Vec<String>,
    /// Position of the level (0 = outermost).
    pub depth: usize,
}

impl LevelSpec {
    pub fn is_composite(&self) -> bool {
        self.dimensions.len() > 1
    }

    /// The level's datum tie-break direction: that of its first dimension.
    pub fn is_reversed(&self) -> bool {
        self.dimensions.first().is_some_and(|d| d.reverse)
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.iter().map(|d| d.name.as_str())
    }
}

/// Compile-time options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupingSpecOptions {
    #[serde(default)]
    pub flattening_mode: FlatteningMode,

    /// Label of the root node of trees built from the spec.
    #[serde(default)]
    pub root_label: String,

    /// Flips the direction of every dimension.
    #[serde(default)]
    pub reverse: bool,
}

impl Default for GroupingSpecOptions {
    fn default() -> Self {
        GroupingSpecOptions {
            flattening_mode: FlatteningMode::None,
            root_label: String::new(),
            reverse: false,
        }
    }
}

/// A request for a variant of an existing spec.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DerivedSpec {
    /// Collapse all levels into one, keeping dimension order.
    pub single_level: bool,
    /// Flip the direction of every dimension.
    pub reverse: bool,
    pub flattening_mode: Option<FlatteningMode>,
    pub root_label: Option<String>,
}

/// Derived variants kept per spec; past this the cache starts over.
const DERIVED_CACHE_LIMIT: usize = 32;

// ============================================================================
// GROUPING SPEC
// ============================================================================

/// A compiled grouping specification.
#[derive(Debug)]
pub struct GroupingSpec {
    id: SpecId,
    levels: Rc<Vec<LevelSpec>>,
    pub flattening_mode: FlatteningMode,
    pub root_label: String,
    depth: usize,
    is_single_level: bool,
    is_single_dimension: bool,
    has_composite_levels: bool,
    dimension_names: Vec<String>,
    /// Set when the only dimension is continuous in the schema used to compile.
    continuous_single_dimension: bool,
    derived: RefCell<FxHashMap<String, Rc<GroupingSpec>>>,
}

/// Dimension indexes of a spec resolved against a schema:
/// per level, (dimension index, reverse) pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundGrouping {
    pub levels: Vec<SmallVec<[(usize, bool); 4]>>,
    /// Discreteness against the bound schema.
    pub is_discrete: bool,
}

impl GroupingSpec {
    /// Compiles levels of dimension specs.
    ///
    /// Empty levels are dropped. When a schema is given every name must be
    /// one of its dimensions.
    pub fn compile(
        levels: &[Vec<DimensionSpec>],
        schema: Option<&ComplexType>,
        options: GroupingSpecOptions,
    ) -> CubeResult<Rc<GroupingSpec>> {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut compiled: Vec<LevelSpec> = Vec::new();
        let mut accumulated: Vec<String> = Vec::new();

        for level in levels.iter().filter(|l| !l.is_empty()) {
            let mut dimensions: SmallVec<[DimensionSpec; 4]> = SmallVec::new();
            for dim in level {
                if dim.name.is_empty() {
                    return Err(CubeError::argument_required("dimension name"));
                }
                if !seen.insert(dim.name.as_str()) {
                    return Err(CubeError::argument_invalid(
                        "grouping",
                        format!("dimension '{}' is used more than once", dim.name),
                    ));
                }
                if let Some(schema) = schema {
                    if !schema.has_dimension(&dim.name) {
                        return Err(CubeError::schema_mismatch(dim.name.clone()));
                    }
                }
                accumulated.push(dim.name.clone());
                dimensions.push(DimensionSpec {
                    name: dim.name.clone(),
                    reverse: dim.reverse != options.reverse,
                });
            }
            compiled.push(LevelSpec {
                dimensions,
                accumulated_names: accumulated.clone(),
                depth: compiled.len(),
            });
        }

        let mut spec = Self::from_levels(Rc::new(compiled), options.flattening_mode, options.root_label);
        if let (Some(schema), true) = (schema, spec.is_single_dimension) {
            spec.continuous_single_dimension = schema
                .dimension(&spec.dimension_names[0])
                .map(|d| !d.ty.is_discrete())
                .unwrap_or(false);
        }
        Ok(Rc::new(spec))
    }

    /// Parses grouping text (`city, date desc`) and compiles it.
    pub fn parse(
        text: &str,
        schema: Option<&ComplexType>,
        options: GroupingSpecOptions,
    ) -> CubeResult<Rc<GroupingSpec>> {
        let ast = grouping_parser::parse(text)
            .map_err(|e| CubeError::argument_invalid("grouping", e.to_string()))?;
        Self::compile_ast(&ast, schema, options)
    }

    pub fn compile_ast(
        ast: &GroupingAst,
        schema: Option<&ComplexType>,
        options: GroupingSpecOptions,
    ) -> CubeResult<Rc<GroupingSpec>> {
        let levels: Vec<Vec<DimensionSpec>> = ast
            .levels
            .iter()
            .map(|level| {
                level
                    .dimensions
                    .iter()
                    .map(|d| DimensionSpec {
                        name: d.name.clone(),
                        reverse: d.direction.is_descending(),
                    })
                    .collect()
            })
            .collect();
        Self::compile(&levels, schema, options)
    }

    /// The zero-level grouping.
    pub fn null() -> Rc<GroupingSpec> {
        Rc::new(Self::from_levels(
            Rc::new(Vec::new()),
            FlatteningMode::None,
            String::new(),
        ))
    }

    fn from_levels(levels: Rc<Vec<LevelSpec>>, flattening_mode: FlatteningMode, root_label: String) -> Self {
        let dimension_names: Vec<String> = levels
            .last()
            .map(|l| l.accumulated_names.clone())
            .unwrap_or_default();
        GroupingSpec {
            id: next_spec_id(),
            depth: levels.len(),
            is_single_level: levels.len() == 1,
            is_single_dimension: dimension_names.len() == 1,
            has_composite_levels: levels.iter().any(|l| l.is_composite()),
            dimension_names,
            continuous_single_dimension: false,
            flattening_mode,
            root_label,
            levels,
            derived: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn id(&self) -> SpecId {
        self.id
    }

    pub fn levels(&self) -> &[LevelSpec] {
        &self.levels
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_null(&self) -> bool {
        self.depth == 0
    }

    pub fn is_single_level(&self) -> bool {
        self.is_single_level
    }

    pub fn is_single_dimension(&self) -> bool {
        self.is_single_dimension
    }

    pub fn has_composite_levels(&self) -> bool {
        self.has_composite_levels
    }

    /// Every dimension name, in level order.
    pub fn dimension_names(&self) -> &[String] {
        &self.dimension_names
    }

    /// True unless the spec is a single continuous dimension.
    ///
    /// Dimension types are only known through a schema: a spec compiled
    /// without one reports discrete. Use `is_discrete_in` (or the bound
    /// grouping) to decide against a schema.
    pub fn is_discrete(&self) -> bool {
        !(self.is_single_dimension && self.continuous_single_dimension)
    }

    pub fn is_discrete_in(&self, schema: &ComplexType) -> bool {
        if !self.is_single_dimension {
            return true;
        }
        schema
            .dimension(&self.dimension_names[0])
            .map_or(true, |d| d.ty.is_discrete())
    }

    /// Returns the requested variant, building it at most once.
    /// A request that changes nothing returns this spec itself.
    pub fn ensure(self: &Rc<Self>, request: &DerivedSpec) -> Rc<GroupingSpec> {
        let collapse = request.single_level && self.depth > 1;
        let mode = request.flattening_mode.unwrap_or(self.flattening_mode);
        let root_label = request.root_label.as_deref().unwrap_or(&self.root_label);

        if !collapse && !request.reverse && mode == self.flattening_mode && root_label == self.root_label {
            return Rc::clone(self);
        }

        // keyed by what the variant is, not by how it was asked for
        let key = format!("{}|{}|{:?}|{}", collapse, request.reverse, mode, root_label);
        if let Some(existing) = self.derived.borrow().get(&key) {
            return Rc::clone(existing);
        }

        let levels = if collapse || request.reverse {
            Rc::new(self.derive_levels(collapse, request.reverse))
        } else {
            Rc::clone(&self.levels)
        };

        let mut spec = Self::from_levels(levels, mode, root_label.to_string());
        spec.continuous_single_dimension = self.continuous_single_dimension;
        let spec = Rc::new(spec);
        let mut derived = self.derived.borrow_mut();
        if derived.len() >= DERIVED_CACHE_LIMIT {
            debug!("Derived spec cache of '{}' is full; clearing {} entries", self, derived.len());
            derived.clear();
        }
        derived.insert(key, Rc::clone(&spec));
        spec
    }

    fn derive_levels(&self, collapse: bool, reverse: bool) -> Vec<LevelSpec> {
        let flip = |d: &DimensionSpec| DimensionSpec {
            name: d.name.clone(),
            reverse: d.reverse != reverse,
        };

        if collapse {
            let dimensions: SmallVec<[DimensionSpec; 4]> =
                self.levels.iter().flat_map(|l| l.dimensions.iter()).map(flip).collect();
            return vec![LevelSpec {
                dimensions,
                accumulated_names: self.dimension_names.clone(),
                depth: 0,
            }];
        }

        self.levels
            .iter()
            .map(|l| LevelSpec {
                dimensions: l.dimensions.iter().map(flip).collect(),
                accumulated_names: l.accumulated_names.clone(),
                depth: l.depth,
            })
            .collect()
    }

    /// Resolves dimension names to schema indexes.
    pub fn bind(&self, schema: &ComplexType) -> CubeResult<BoundGrouping> {
        let mut levels = Vec::with_capacity(self.levels.len());
        for level in self.levels.iter() {
            let mut dims = SmallVec::new();
            for dim in &level.dimensions {
                let index = schema
                    .dimension_index(&dim.name)
                    .ok_or_else(|| CubeError::schema_mismatch(dim.name.clone()))?;
                dims.push((index, dim.reverse));
            }
            levels.push(dims);
        }
        Ok(BoundGrouping {
            levels,
            is_discrete: self.is_discrete_in(schema),
        })
    }

    /// The spec as a parser tree; its text form parses back to this spec.
    pub fn to_ast(&self) -> GroupingAst {
        GroupingAst {
            levels: self
                .levels
                .iter()
                .map(|l| LevelAst {
                    dimensions: l
                        .dimensions
                        .iter()
                        .map(|d| {
                            let direction = if d.reverse {
                                Direction::Descending
                            } else {
                                Direction::Ascending
                            };
                            DimensionAst::new(d.name.clone(), direction)
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl fmt::Display for GroupingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ast())
    }
}

// ============================================================================
// GROUPING OPTIONS
// ============================================================================

/// Default separator between ancestor keys in absolute keys.
pub const DEFAULT_ABSOLUTE_KEY_SEPARATOR: &str = "/";

/// Default separator between ancestor labels in absolute labels.
pub const DEFAULT_ABSOLUTE_LABEL_SEPARATOR: &str = " ~ ";

/// A datum filter. The key identifies the predicate in cache keys: two
/// predicates with the same key are assumed to select the same datums.
#[derive(Clone)]
pub struct DatumPredicate {
    pub key: String,
    pub test: Rc<dyn Fn(&Datum) -> bool>,
}

impl DatumPredicate {
    pub fn new(key: impl Into<String>, test: impl Fn(&Datum) -> bool + 'static) -> Self {
        DatumPredicate {
            key: key.into(),
            test: Rc::new(test),
        }
    }
}

impl fmt::Debug for DatumPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatumPredicate").field("key", &self.key).finish()
    }
}

/// Per-call grouping options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingOptions {
    /// Keep only datums whose visible flag equals this.
    #[serde(default)]
    pub visible: Option<bool>,

    /// Keep only datums whose selected flag equals this.
    #[serde(default)]
    pub selected: Option<bool>,

    /// Keep only datums whose is-null flag equals this.
    #[serde(default)]
    pub is_null: Option<bool>,

    #[serde(default = "default_absolute_key_separator")]
    pub absolute_key_separator: String,

    #[serde(default = "default_absolute_label_separator")]
    pub absolute_label_separator: String,

    #[serde(skip)]
    pub predicate: Option<DatumPredicate>,
}

fn default_absolute_key_separator() -> String {
    DEFAULT_ABSOLUTE_KEY_SEPARATOR.to_string()
}

fn default_absolute_label_separator() -> String {
    DEFAULT_ABSOLUTE_LABEL_SEPARATOR.to_string()
}

impl Default for GroupingOptions {
    fn default() -> Self {
        GroupingOptions {
            visible: None,
            selected: None,
            is_null: None,
            absolute_key_separator: default_absolute_key_separator(),
            absolute_label_separator: default_absolute_label_separator(),
            predicate: None,
        }
    }
}

impl GroupingOptions {
    /// Combines defaults with overrides. A flag set in `overrides` wins;
    /// separators win when they differ from the built-in defaults.
    pub fn merge(defaults: &GroupingOptions, overrides: &GroupingOptions) -> GroupingOptions {
        let pick = |over: &String, def: &String, builtin: &str| {
            if over != builtin {
                over.clone()
            } else {
                def.clone()
            }
        };
        GroupingOptions {
            visible: overrides.visible.or(defaults.visible),
            selected: overrides.selected.or(defaults.selected),
            is_null: overrides.is_null.or(defaults.is_null),
            absolute_key_separator: pick(
                &overrides.absolute_key_separator,
                &defaults.absolute_key_separator,
                DEFAULT_ABSOLUTE_KEY_SEPARATOR,
            ),
            absolute_label_separator: pick(
                &overrides.absolute_label_separator,
                &defaults.absolute_label_separator,
                DEFAULT_ABSOLUTE_LABEL_SEPARATOR,
            ),
            predicate: overrides.predicate.clone().or_else(|| defaults.predicate.clone()),
        }
    }

    /// Whether the selected datums depend on the mutable datum flags.
    pub fn depends_on_flags(&self) -> bool {
        self.visible.is_some() || self.selected.is_some() || self.is_null.is_some()
    }

    /// Content key used by the node grouping cache.
    pub fn cache_key(&self) -> String {
        format!(
            "{:?}|{:?}|{:?}|{}|{}|{}",
            self.visible,
            self.selected,
            self.is_null,
            self.absolute_key_separator,
            self.absolute_label_separator,
            self.predicate.as_ref().map_or("", |p| p.key.as_str())
        )
    }
}
