//! FILENAME: core/grouping-engine/src/data.rs
//! Data - owner of the schema, the datums and the node arena.
//!
//! The owner root (created with the `Data`) holds every loaded datum. Calling
//! `group_by` on any node builds a separate tree whose root links back to
//! that node; the result is cached on the node and reused until the node's
//! membership, the result tree, or (for flag-filtered groupings) the datum
//! flags change.

use std::rc::Rc;

use cube_engine::query::{from_iter, from_slice, from_vec, Query, SliceQuery};
use cube_engine::{
    Atom, AtomId, AtomRow, ComplexType, CubeError, CubeResult, Datum, DatumFlag, DatumId,
    DatumStates, Dimension, RawValue, ATOM_ID_NULL,
};
use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::{smallvec, SmallVec};

use crate::definition::{GroupingOptions, GroupingSpec, GroupingSpecOptions};
use crate::engine::GroupingOperation;
use crate::tree::{CachedGrouping, DataNode, NodeId};

pub struct Data {
    pub(crate) schema: ComplexType,
    pub(crate) datums: Vec<Datum>,
    datum_by_key: FxHashMap<String, DatumId>,
    pub(crate) states: DatumStates,
    /// Node arena. Disposed slots are `None` and never reused.
    pub(crate) nodes: Vec<Option<DataNode>>,
    root: NodeId,
    defaults: GroupingOptions,
    /// Specs compiled from text, so equal text maps to the same spec.
    text_specs: FxHashMap<String, Rc<GroupingSpec>>,
    /// Bumped on every datum flag change.
    pub(crate) flags_version: u64,
}

impl Data {
    pub fn new(schema: ComplexType) -> Self {
        let root = NodeId(0);
        Data {
            schema,
            datums: Vec::new(),
            datum_by_key: FxHashMap::default(),
            states: DatumStates::new(),
            nodes: vec![Some(DataNode::new(root))],
            root,
            defaults: GroupingOptions::default(),
            text_specs: FxHashMap::default(),
            flags_version: 0,
        }
    }

    /// The owner root: holds every datum and cannot be disposed.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn schema(&self) -> &ComplexType {
        &self.schema
    }

    /// Declaring dimensions fails once datums have been loaded.
    pub fn schema_mut(&mut self) -> &mut ComplexType {
        &mut self.schema
    }

    pub fn defaults(&self) -> &GroupingOptions {
        &self.defaults
    }

    pub fn set_defaults(&mut self, defaults: GroupingOptions) {
        self.defaults = defaults;
    }

    // ========================================================================
    // LOADING
    // ========================================================================

    /// Loads rows into the owner root. Seals the schema.
    ///
    /// Rows whose datum key already exists are skipped. Returns the number of
    /// datums added. A row naming a dimension index outside the schema stops
    /// the load with `ArgumentInvalid`; rows before it stay loaded.
    pub fn load<Q>(&mut self, rows: Q) -> CubeResult<usize>
    where
        Q: Query<Item = AtomRow>,
    {
        self.schema.seal();

        let mut loaded = 0;
        let mut skipped = 0;
        let result = self.load_rows(rows, &mut loaded, &mut skipped);

        if loaded > 0 {
            self.invalidate(self.root);
        }
        debug!("Loaded {} datums ({} duplicates skipped)", loaded, skipped);
        result.map(|_| loaded)
    }

    fn load_rows<Q>(&mut self, rows: Q, loaded: &mut usize, skipped: &mut usize) -> CubeResult<()>
    where
        Q: Query<Item = AtomRow>,
    {
        let dimension_count = self.schema.dimension_count();
        for row in rows.into_iter() {
            if let Some((dim, _)) = row.iter().find(|(dim, _)| *dim >= dimension_count) {
                return Err(CubeError::argument_invalid(
                    "row",
                    format!("dimension index {} is out of range", dim),
                ));
            }

            let mut atoms: SmallVec<[AtomId; 8]> = smallvec![ATOM_ID_NULL; dimension_count];
            for (dim, raw) in &row {
                if let Some(dimension) = self.schema.dimension_at_mut(*dim) {
                    atoms[*dim] = dimension.intern(raw);
                }
            }

            if self.insert_datum(atoms) {
                *loaded += 1;
            } else {
                *skipped += 1;
            }
        }
        Ok(())
    }

    fn insert_datum(&mut self, atoms: SmallVec<[AtomId; 8]>) -> bool {
        let key = self.schema.datum_key(&atoms);
        if self.datum_by_key.contains_key(&key) {
            warn!("Skipping datum with duplicate key '{}'", key);
            return false;
        }

        let id = self.datums.len() as DatumId;
        self.datum_by_key.insert(key.clone(), id);
        self.datums.push(Datum::new(id, key, atoms));
        if let Some(Some(root)) = self.nodes.get_mut(self.root.index()) {
            root.datums.push(id);
        }
        true
    }

    /// Adds one datum given by dimension name. Returns `None` when a datum
    /// with the same key already exists.
    pub fn add_datum(&mut self, values: &[(&str, RawValue)]) -> CubeResult<Option<DatumId>> {
        let mut row: AtomRow = Vec::with_capacity(values.len());
        for (name, raw) in values {
            let index = self
                .schema
                .dimension_index(name)
                .ok_or_else(|| CubeError::schema_mismatch(*name))?;
            row.push((index, raw.clone()));
        }

        let before = self.datums.len();
        self.load(from_vec(vec![row]))?;
        Ok((self.datums.len() > before).then(|| before as DatumId))
    }

    pub fn datum(&self, id: DatumId) -> Option<&Datum> {
        self.datums.get(id as usize)
    }

    pub fn datum_by_key(&self, key: &str) -> Option<&Datum> {
        self.datum_by_key.get(key).and_then(|&id| self.datum(id))
    }

    pub fn datum_count(&self) -> usize {
        self.datums.len()
    }

    // ========================================================================
    // DATUM FLAGS
    // ========================================================================

    fn set_flag(&mut self, flag: DatumFlag, id: DatumId, value: bool) -> CubeResult<bool> {
        if self.datum(id).is_none() {
            return Err(CubeError::argument_invalid("datum", format!("no datum with id {}", id)));
        }
        let changed = self.states.set(flag, id, value);
        if changed {
            self.flags_version += 1;
        }
        Ok(changed)
    }

    /// Returns whether the flag changed.
    pub fn set_visible(&mut self, id: DatumId, visible: bool) -> CubeResult<bool> {
        self.set_flag(DatumFlag::Visible, id, visible)
    }

    pub fn set_selected(&mut self, id: DatumId, selected: bool) -> CubeResult<bool> {
        self.set_flag(DatumFlag::Selected, id, selected)
    }

    pub fn set_null(&mut self, id: DatumId, is_null: bool) -> CubeResult<bool> {
        self.set_flag(DatumFlag::Null, id, is_null)
    }

    pub fn clear_selected(&mut self) -> bool {
        let changed = self.states.clear_selected();
        if changed {
            self.flags_version += 1;
        }
        changed
    }

    pub fn is_visible(&self, id: DatumId) -> bool {
        self.states.is_visible(id)
    }

    pub fn is_selected(&self, id: DatumId) -> bool {
        self.states.is_selected(id)
    }

    pub fn is_null(&self, id: DatumId) -> bool {
        self.states.is_null(id)
    }

    /// Whether a datum passes the flag filters and predicate of `options`.
    pub(crate) fn datum_passes(&self, id: DatumId, options: &GroupingOptions) -> bool {
        let flag_ok = |wanted: Option<bool>, flag: DatumFlag| {
            wanted.map_or(true, |w| self.states.get(flag, id) == w)
        };
        if !flag_ok(options.visible, DatumFlag::Visible)
            || !flag_ok(options.selected, DatumFlag::Selected)
            || !flag_ok(options.is_null, DatumFlag::Null)
        {
            return false;
        }
        match (&options.predicate, self.datum(id)) {
            (Some(predicate), Some(datum)) => (predicate.test)(datum),
            (None, Some(_)) => true,
            (_, None) => false,
        }
    }

    // ========================================================================
    // NODE ACCESS
    // ========================================================================

    /// Fails with `OperationInvalid` for disposed nodes.
    pub fn node(&self, id: NodeId) -> CubeResult<&DataNode> {
        self.nodes
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| CubeError::operation_invalid(format!("node {} has been disposed", id.0)))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> CubeResult<&mut DataNode> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| CubeError::operation_invalid(format!("node {} has been disposed", id.0)))
    }

    pub fn is_disposed(&self, id: NodeId) -> bool {
        self.node(id).is_err()
    }

    pub(crate) fn alloc_node(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(DataNode::new(id)));
        id
    }

    /// Number of live nodes in the arena.
    pub fn live_node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn children(&self, node: NodeId) -> CubeResult<SliceQuery<'_, NodeId>> {
        Ok(from_slice(&self.node(node)?.children))
    }

    /// Leaf descendants in tree order. A childless node is its own leaf.
    pub fn leafs(&self, node: NodeId) -> CubeResult<SliceQuery<'_, NodeId>> {
        let n = self.node(node)?;
        let ids: &[NodeId] = if !n.children.is_empty() {
            &n.leafs
        } else if n.is_flatten_group {
            &[]
        } else {
            std::slice::from_ref(&n.id)
        };
        Ok(from_slice(ids))
    }

    pub fn child(&self, node: NodeId, key: &str) -> CubeResult<Option<NodeId>> {
        Ok(self.node(node)?.child_index.get(key).copied())
    }

    pub fn child_count(&self, node: NodeId) -> CubeResult<usize> {
        Ok(self.node(node)?.children.len())
    }

    pub(crate) fn collect_leafs(&self, node: NodeId) -> CubeResult<Vec<NodeId>> {
        let mut leafs = Vec::new();
        for &child in &self.node(node)?.children {
            self.node(child)?.leaf_contribution().extend_into(&mut leafs);
        }
        Ok(leafs)
    }

    // ========================================================================
    // NODE DATUMS AND ATOMS
    // ========================================================================

    pub fn datum_ids(&self, node: NodeId) -> CubeResult<&[DatumId]> {
        Ok(&self.node(node)?.datums)
    }

    /// The node's datums, in load order.
    pub fn datums(&self, node: NodeId) -> CubeResult<impl Query<Item = &Datum> + '_> {
        let ids = &self.node(node)?.datums;
        Ok(from_slice(ids).flat_map(move |id| from_iter(self.datum(id))))
    }

    pub fn where_datums<'a, F>(
        &'a self,
        node: NodeId,
        mut filter: F,
    ) -> CubeResult<impl Query<Item = &'a Datum> + 'a>
    where
        F: FnMut(&Datum) -> bool + 'a,
    {
        Ok(self.datums(node)?.filter(move |datum| filter(*datum)))
    }

    pub fn first_datum(&self, node: NodeId) -> CubeResult<Option<&Datum>> {
        Ok(self.datums(node)?.first())
    }

    /// The node's datum when it has exactly one.
    pub fn single_datum(&self, node: NodeId) -> CubeResult<Option<&Datum>> {
        let n = self.node(node)?;
        if n.datums.len() != 1 {
            return Ok(None);
        }
        Ok(self.datum(n.datums[0]))
    }

    pub fn dimension(&self, name: &str) -> CubeResult<&Dimension> {
        self.schema.dimension(name)
    }

    /// Distinct atoms of one dimension among the node's datums, in datum order.
    pub fn dimension_atoms(&self, node: NodeId, name: &str) -> CubeResult<Vec<&Atom>> {
        let dimension = self.schema.dimension(name)?;
        let index = dimension.index;
        Ok(self
            .datums(node)?
            .map(|datum| datum.atom(index))
            .distinct()
            .flat_map(|atom| from_iter(dimension.atom(atom)))
            .to_array())
    }

    /// The node's atom for a dimension: its own, else inherited through its
    /// atom base chain, else null.
    pub fn atom(&self, node: NodeId, name: &str) -> CubeResult<&Atom> {
        let dimension = self.schema.dimension(name)?;
        let mut current = Some(self.node(node)?);
        while let Some(n) = current {
            if let Some(atom) = n.atoms.get_local(dimension.index) {
                return Ok(dimension.atom(atom).unwrap_or(dimension.null_atom()));
            }
            current = n.atoms.base.and_then(|base| self.node(base).ok());
        }
        Ok(dimension.null_atom())
    }

    // ========================================================================
    // GROUPING
    // ========================================================================

    /// Groups a node's datums. Equal requests return the cached tree.
    pub fn group_by(
        &mut self,
        node: NodeId,
        spec: &Rc<GroupingSpec>,
        options: &GroupingOptions,
    ) -> CubeResult<NodeId> {
        self.node(node)?;
        let options = GroupingOptions::merge(&self.defaults, options);
        let key = format!("{}#{}", spec.id(), options.cache_key());

        if let Some(root) = self.cached_grouping(node, &key) {
            debug!("Grouping cache hit on node {} for '{}'", node.0, spec);
            return Ok(root);
        }

        let root = GroupingOperation::new(self, node, Rc::clone(spec), options.clone()).execute()?;

        let cached = CachedGrouping {
            root,
            source_version: self.node(node)?.version,
            result_version: self.node(root)?.version,
            flags_version: options.depends_on_flags().then_some(self.flags_version),
        };
        self.node_mut(node)?.group_cache.insert(key, cached);
        Ok(root)
    }

    /// Parses grouping text against this schema, then groups.
    pub fn group_by_text(
        &mut self,
        node: NodeId,
        text: &str,
        options: &GroupingOptions,
    ) -> CubeResult<NodeId> {
        let spec = match self.text_specs.get(text) {
            Some(spec) => Rc::clone(spec),
            None => {
                let spec = GroupingSpec::parse(text, Some(&self.schema), GroupingSpecOptions::default())?;
                self.text_specs.insert(text.to_string(), Rc::clone(&spec));
                spec
            }
        };
        self.group_by(node, &spec, options)
    }

    /// Returns a fresh cached grouping, releasing it if it went stale.
    fn cached_grouping(&mut self, node: NodeId, key: &str) -> Option<NodeId> {
        let source = self.node(node).ok()?;
        let cached = source.group_cache.get(key)?.clone();

        let fresh = match self.node(cached.root) {
            Ok(root) => {
                root.version == cached.result_version
                    && source.version == cached.source_version
                    && cached.flags_version.map_or(true, |v| v == self.flags_version)
            }
            Err(_) => false,
        };
        if fresh {
            return Some(cached.root);
        }

        debug!("Grouping cache entry on node {} is stale; rebuilding", node.0);
        if let Ok(n) = self.node_mut(node) {
            n.group_cache.remove(key);
        }
        self.release_tree(cached.root);
        None
    }

    // ========================================================================
    // DISPOSAL
    // ========================================================================

    /// Disposes a node and everything below it.
    ///
    /// The node is detached from its parent; every ancestor drops the node's
    /// datums and leafs, bumps its version and releases its cached groupings.
    pub fn dispose(&mut self, node: NodeId) -> CubeResult<()> {
        if node == self.root {
            return Err(CubeError::operation_invalid("the owner root cannot be disposed"));
        }
        let n = self.node(node)?;
        let parent = n.parent;
        let link_parent = n.link_parent;
        let removed: FxHashSet<DatumId> = n.datums.iter().copied().collect();

        if let Some(parent) = parent {
            let p = self.node_mut(parent)?;
            p.children.retain(|&c| c != node);
            p.child_index.retain(|_, c| *c != node);

            let mut ancestor = Some(parent);
            while let Some(a) = ancestor {
                let leafs = self.collect_leafs(a)?;
                let n = self.node_mut(a)?;
                n.datums.retain(|d| !removed.contains(d));
                n.leafs = leafs;
                ancestor = n.parent;
                self.invalidate(a);
            }
        }

        if let Some(link_parent) = link_parent {
            if let Ok(lp) = self.node_mut(link_parent) {
                lp.group_cache.retain(|_, c| c.root != node);
            }
        }

        self.release_tree(node);
        Ok(())
    }

    pub fn dispose_children(&mut self, node: NodeId) -> CubeResult<()> {
        let children = self.node(node)?.children.clone();
        for child in children {
            self.dispose(child)?;
        }
        Ok(())
    }

    /// Bumps a node's version and releases its cached groupings.
    fn invalidate(&mut self, node: NodeId) {
        let cached: Vec<NodeId> = match self.node_mut(node) {
            Ok(n) => {
                n.version += 1;
                n.group_cache.drain().map(|(_, c)| c.root).collect()
            }
            Err(_) => return,
        };
        for root in cached {
            self.release_tree(root);
        }
    }

    /// Frees a node, its descendants, its owned trees and cached groupings.
    pub(crate) fn release_tree(&mut self, node: NodeId) {
        let mut stack = vec![node];
        let mut released = 0;
        while let Some(id) = stack.pop() {
            if id == self.root {
                continue;
            }
            let Some(n) = self.nodes.get_mut(id.index()).and_then(Option::take) else {
                continue;
            };
            released += 1;
            stack.extend(n.children);
            stack.extend(n.owned_trees);
            stack.extend(n.group_cache.into_values().map(|c| c.root));
        }
        debug!("Released {} nodes from node {}", released, node.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cube_engine::{DimensionType, ValueType};

    fn data() -> Data {
        let schema = ComplexType::from_types([
            DimensionType::new("city", ValueType::String),
            DimensionType::new("qty", ValueType::Number),
        ])
        .unwrap();
        let mut data = Data::new(schema);
        let rows: Vec<AtomRow> = vec![
            vec![(0, RawValue::from("London")), (1, RawValue::Number(72.0))],
            vec![(0, RawValue::from("Paris")), (1, RawValue::Number(27.0))],
            vec![(0, RawValue::from("London")), (1, RawValue::Number(50.0))],
        ];
        data.load(from_vec(rows)).unwrap();
        data
    }

    #[test]
    fn test_load_seals_schema_and_fills_root() {
        let mut data = data();
        assert_eq!(data.datum_count(), 3);
        assert_eq!(data.datum_ids(data.root()).unwrap(), &[0, 1, 2]);
        assert!(data.schema().is_sealed());
        let err = data
            .schema_mut()
            .add_dimension(DimensionType::new("date", ValueType::Date))
            .unwrap_err();
        assert!(matches!(err, CubeError::OperationInvalid(_)));
    }

    #[test]
    fn test_duplicate_datums_are_skipped() {
        let mut data = data();
        let added = data
            .add_datum(&[("city", RawValue::from("Paris")), ("qty", RawValue::Number(27.0))])
            .unwrap();
        assert_eq!(added, None);
        let added = data.add_datum(&[("city", RawValue::from("Rome"))]).unwrap();
        assert_eq!(added, Some(3));
        assert_eq!(data.datum(3).unwrap().key, "Rome,");
        assert!(data.datum_by_key("Rome,").is_some());
    }

    #[test]
    fn test_add_datum_unknown_dimension() {
        let mut data = data();
        let err = data.add_datum(&[("country", RawValue::from("UK"))]).unwrap_err();
        assert_eq!(err, CubeError::SchemaMismatch("country".to_string()));
    }

    #[test]
    fn test_out_of_range_dimension_index() {
        let mut data = data();
        let rows: Vec<AtomRow> = vec![vec![(7, RawValue::from("x"))]];
        assert!(matches!(data.load(from_vec(rows)), Err(CubeError::ArgumentInvalid { .. })));
    }

    #[test]
    fn test_dimension_atoms_in_datum_order() {
        let data = data();
        let cities: Vec<&str> = data
            .dimension_atoms(data.root(), "city")
            .unwrap()
            .iter()
            .map(|a| a.label.as_str())
            .collect();
        assert_eq!(cities, vec!["London", "Paris"]);
    }

    #[test]
    fn test_where_and_single_datum() {
        let data = data();
        let root = data.root();
        let big = data
            .where_datums(root, |d| d.atom(1) != ATOM_ID_NULL)
            .unwrap()
            .count();
        assert_eq!(big, 3);
        assert_eq!(data.first_datum(root).unwrap().map(|d| d.id), Some(0));
        assert!(data.single_datum(root).unwrap().is_none());
    }

    #[test]
    fn test_flags_bump_version_only_on_change() {
        let mut data = data();
        assert_eq!(data.set_visible(0, false), Ok(true));
        assert_eq!(data.set_visible(0, false), Ok(false));
        assert_eq!(data.flags_version, 1);
        assert!(!data.is_visible(0));
        assert!(data.set_selected(99, true).is_err());
        assert!(!data.clear_selected());
    }

    #[test]
    fn test_owner_root_cannot_be_disposed() {
        let mut data = data();
        let root = data.root();
        assert!(matches!(data.dispose(root), Err(CubeError::OperationInvalid(_))));
        assert!(data.leafs(root).unwrap().count() == 1);
    }
}
