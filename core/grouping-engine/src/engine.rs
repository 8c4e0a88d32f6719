//! FILENAME: core/grouping-engine/src/engine.rs
//! Grouping Operation - builds a data tree from a node's datums.
//!
//! The operation:
//! 1. Binds the spec to the schema (unknown dimensions fail here, before any
//!    datum is looked at)
//! 2. Selects the source node's datums that pass the options' filters
//! 3. Partitions them level by level: stable sort by the level's dimensions,
//!    then one scan grouping consecutive runs of equal atoms
//! 4. For flattened specs, re-projects the built tree under a synthetic root
//!
//! Nodes are only reachable once the whole tree is built; on failure every
//! node created by the operation is released.

use std::cmp::Ordering;
use std::rc::Rc;

use cube_engine::query::{from_slice, from_vec, Query};
use cube_engine::{escape_key_part, join_key_parts, CubeError, CubeResult, DatumId};
use log::{debug, trace, warn};
use smallvec::SmallVec;

use crate::data::Data;
use crate::definition::{BoundGrouping, FlatteningMode, GroupingOptions, GroupingSpec};
use crate::tree::{AtomOverlay, NodeId};

// ============================================================================
// GROUPING OPERATION
// ============================================================================

pub(crate) struct GroupingOperation<'a> {
    data: &'a mut Data,
    /// The node whose datums are grouped.
    source: NodeId,
    spec: Rc<GroupingSpec>,
    options: GroupingOptions,
    /// Every node allocated so far, for rollback.
    created: Vec<NodeId>,
}

impl<'a> GroupingOperation<'a> {
    pub(crate) fn new(
        data: &'a mut Data,
        source: NodeId,
        spec: Rc<GroupingSpec>,
        options: GroupingOptions,
    ) -> Self {
        GroupingOperation {
            data,
            source,
            spec,
            options,
            created: Vec::new(),
        }
    }

    /// Runs the operation and returns the root of the new tree.
    pub(crate) fn execute(mut self) -> CubeResult<NodeId> {
        let bound = self.spec.bind(&self.data.schema)?;
        let datums = self.select_datums()?;
        let datum_count = datums.len();

        match self.build(&bound, datums) {
            Ok(root) => {
                debug!(
                    "Grouped node {} by '{}' ({:?}): {} datums, {} nodes",
                    self.source.0,
                    self.spec,
                    self.spec.flattening_mode,
                    datum_count,
                    self.created.len()
                );
                Ok(root)
            }
            Err(err) => {
                for id in self.created.drain(..) {
                    if let Some(slot) = self.data.nodes.get_mut(id.index()) {
                        *slot = None;
                    }
                }
                Err(err)
            }
        }
    }

    fn build(&mut self, bound: &BoundGrouping, datums: Vec<DatumId>) -> CubeResult<NodeId> {
        let root = self.build_tree(bound, datums)?;
        match self.spec.flattening_mode {
            FlatteningMode::None => Ok(root),
            mode => self.flatten(root, mode),
        }
    }

    fn alloc(&mut self) -> NodeId {
        let id = self.data.alloc_node();
        self.created.push(id);
        id
    }

    /// The source node's datums that pass the filters, in source order.
    fn select_datums(&self) -> CubeResult<Vec<DatumId>> {
        let data = &*self.data;
        let options = &self.options;
        let source = data.node(self.source)?;
        Ok(from_slice(&source.datums)
            .filter(|&id| data.datum_passes(id, options))
            .to_array())
    }

    // ========================================================================
    // TREE CONSTRUCTION
    // ========================================================================

    fn build_tree(&mut self, bound: &BoundGrouping, datums: Vec<DatumId>) -> CubeResult<NodeId> {
        let root = self.alloc();
        {
            let source = self.source;
            let spec = Rc::clone(&self.spec);
            let n = self.data.node_mut(root)?;
            n.link_parent = Some(source);
            n.label = spec.root_label.clone();
            n.absolute_label = spec.root_label.clone();
            n.atoms = AtomOverlay::new(SmallVec::new(), Some(source));
            n.datums = datums.clone();
            n.grouping = Some(spec);
        }

        if self.spec.is_null() {
            self.add_datum_leaves(root, &datums)?;
        } else {
            self.partition(root, bound, 0, datums)?;
        }
        Ok(root)
    }

    /// Null grouping: one leaf per datum, keyed by the datum key.
    fn add_datum_leaves(&mut self, root: NodeId, datums: &[DatumId]) -> CubeResult<()> {
        for &id in datums {
            let (key, label, local) = {
                let data = &*self.data;
                let Some(datum) = data.datum(id) else {
                    continue;
                };
                let labels: Vec<&str> = data
                    .schema
                    .dimensions()
                    .iter()
                    .map(|d| d.atom(datum.atom(d.index)).map_or("", |a| a.label.as_str()))
                    .collect();
                let local: SmallVec<[(usize, cube_engine::AtomId); 4]> =
                    datum.atoms.iter().copied().enumerate().collect();
                (datum.key.clone(), labels.join(data.schema.label_separator.as_str()), local)
            };

            let child = self.alloc();
            let n = self.data.node_mut(child)?;
            n.parent = Some(root);
            n.depth = 1;
            n.absolute_key = key.clone();
            n.absolute_label = label.clone();
            n.key = key.clone();
            n.label = label;
            n.datums = vec![id];
            n.atoms = AtomOverlay::new(local, Some(root));
            n.grouping = Some(Rc::clone(&self.spec));
            self.attach(root, child, key)?;
        }

        let leafs = self.data.collect_leafs(root)?;
        self.data.node_mut(root)?.leafs = leafs;
        Ok(())
    }

    /// Splits `datums` by the dimensions of `level` into children of `parent`,
    /// then recurses into the next level.
    fn partition(
        &mut self,
        parent: NodeId,
        bound: &BoundGrouping,
        level: usize,
        datums: Vec<DatumId>,
    ) -> CubeResult<()> {
        let Some(dims) = bound.levels.get(level) else {
            return Ok(());
        };
        let runs = self.partition_runs(dims, datums);
        trace!(
            "Level {} of node {}: {} groups",
            level,
            parent.0,
            runs.len()
        );

        for run in runs {
            let child = self.create_group(parent, dims, level, &run)?;
            if level + 1 < bound.levels.len() {
                self.partition(child, bound, level + 1, run)?;
            }
        }

        let leafs = self.data.collect_leafs(parent)?;
        self.data.node_mut(parent)?.leafs = leafs;
        Ok(())
    }

    /// Stable-sorts datums by the level's dimensions and returns the runs of
    /// datums sharing the same atoms.
    fn partition_runs(&self, dims: &[(usize, bool)], datums: Vec<DatumId>) -> Vec<Vec<DatumId>> {
        let data = &*self.data;
        let schema = &data.schema;
        let level_reversed = dims.first().is_some_and(|&(_, reverse)| reverse);
        let atom = |id: DatumId, dim: usize| {
            data.datum(id)
                .map_or(cube_engine::ATOM_ID_NULL, |d| d.atom(dim))
        };

        let sorted = from_vec(datums)
            .sort_by(|&a, &b| {
                for &(dim, reverse) in dims {
                    let ord = schema
                        .dimension_at(dim)
                        .map_or(Ordering::Equal, |d| d.compare_atoms(atom(a, dim), atom(b, dim)));
                    let ord = if reverse { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                if level_reversed {
                    b.cmp(&a)
                } else {
                    a.cmp(&b)
                }
            })
            .to_array();

        let mut runs: Vec<Vec<DatumId>> = Vec::new();
        let mut previous: Option<DatumId> = None;
        for id in sorted {
            let same = previous
                .is_some_and(|p| dims.iter().all(|&(dim, _)| atom(p, dim) == atom(id, dim)));
            match runs.last_mut() {
                Some(run) if same => run.push(id),
                _ => runs.push(vec![id]),
            }
            previous = Some(id);
        }
        runs
    }

    /// Creates the child node for one run of datums.
    fn create_group(
        &mut self,
        parent: NodeId,
        dims: &[(usize, bool)],
        level: usize,
        run: &[DatumId],
    ) -> CubeResult<NodeId> {
        let first = run
            .first()
            .copied()
            .ok_or_else(|| CubeError::operation_invalid("cannot create a group without datums"))?;

        // Representative atoms come from the first datum of the run.
        let (local, key, label) = {
            let data = &*self.data;
            let schema = &data.schema;
            let datum = data
                .datum(first)
                .ok_or_else(|| CubeError::operation_invalid(format!("no datum with id {}", first)))?;

            let mut local: SmallVec<[(usize, cube_engine::AtomId); 4]> = SmallVec::new();
            let mut keys: SmallVec<[&str; 4]> = SmallVec::new();
            let mut labels: SmallVec<[&str; 4]> = SmallVec::new();
            for &(dim, _) in dims {
                let atom_id = datum.atom(dim);
                local.push((dim, atom_id));
                if let Some(atom) = schema.dimension_at(dim).and_then(|d| d.atom(atom_id)) {
                    keys.push(&atom.key);
                    labels.push(&atom.label);
                }
            }
            (
                local,
                join_key_parts(keys, &schema.key_separator),
                labels.join(schema.label_separator.as_str()),
            )
        };

        let (depth, absolute_key, absolute_label) = {
            let p = self.data.node(parent)?;
            let separator = self.options.absolute_key_separator.as_str();
            let own = escape_key_part(&key, separator);
            if p.depth == 0 {
                (1, own.into_owned(), label.clone())
            } else {
                (
                    p.depth + 1,
                    format!("{}{}{}", p.absolute_key, separator, own),
                    format!("{}{}{}", p.absolute_label, self.options.absolute_label_separator, label),
                )
            }
        };

        let child = self.alloc();
        let spec = Rc::clone(&self.spec);
        let n = self.data.node_mut(child)?;
        n.parent = Some(parent);
        n.depth = depth;
        n.key = key.clone();
        n.label = label;
        n.absolute_key = absolute_key;
        n.absolute_label = absolute_label;
        n.datums = run.to_vec();
        n.atoms = AtomOverlay::new(local, Some(parent));
        n.grouping = Some(spec);
        n.grouping_level = level + 1;

        self.attach(parent, child, key)?;
        Ok(child)
    }

    fn attach(&mut self, parent: NodeId, child: NodeId, key: String) -> CubeResult<()> {
        let p = self.data.node_mut(parent)?;
        if p.child_index.contains_key(&key) {
            warn!("Node {} already has a child keyed '{}'", parent.0, key);
            return Err(CubeError::operation_invalid(format!(
                "node {} already has a child keyed '{}'",
                parent.0, key
            )));
        }
        p.child_index.insert(key, child);
        p.children.push(child);
        Ok(())
    }

    // ========================================================================
    // FLATTENING
    // ========================================================================

    /// Surfaces every node of `tree` (except its root) under a new root.
    /// The built tree is kept as a hidden tree owned by the new root; the
    /// flattened nodes inherit their atoms from it.
    fn flatten(&mut self, tree: NodeId, mode: FlatteningMode) -> CubeResult<NodeId> {
        let mut order = Vec::new();
        let children = self.data.node(tree)?.children.clone();
        for child in children {
            self.collect_dfs(child, mode, &mut order)?;
        }

        let root = self.alloc();
        {
            let source = self.source;
            let spec = Rc::clone(&self.spec);
            let datums = self.data.node(tree)?.datums.clone();
            let n = self.data.node_mut(root)?;
            n.link_parent = Some(source);
            n.label = spec.root_label.clone();
            n.absolute_label = spec.root_label.clone();
            n.atoms = AtomOverlay::new(SmallVec::new(), Some(source));
            n.datums = datums;
            n.grouping = Some(spec);
            n.owned_trees.push(tree);
        }

        for original in order {
            let (key, label, absolute_label, datums, level, has_children) = {
                let o = self.data.node(original)?;
                (
                    o.absolute_key.clone(),
                    o.label.clone(),
                    o.absolute_label.clone(),
                    o.datums.clone(),
                    o.grouping_level,
                    !o.children.is_empty(),
                )
            };

            let child = self.alloc();
            let spec = Rc::clone(&self.spec);
            let n = self.data.node_mut(child)?;
            n.parent = Some(root);
            n.depth = 1;
            n.key = key.clone();
            n.label = label;
            n.absolute_key = key.clone();
            n.absolute_label = absolute_label;
            n.datums = datums;
            n.atoms = AtomOverlay::new(SmallVec::new(), Some(original));
            n.grouping = Some(spec);
            n.grouping_level = level;
            n.is_flatten_group = has_children;
            n.derived_from = Some(original);
            self.attach(root, child, key)?;
        }

        let leafs = self.data.collect_leafs(root)?;
        self.data.node_mut(root)?.leafs = leafs;
        Ok(root)
    }

    fn collect_dfs(&self, node: NodeId, mode: FlatteningMode, order: &mut Vec<NodeId>) -> CubeResult<()> {
        if mode == FlatteningMode::DfsPre {
            order.push(node);
        }
        for &child in &self.data.node(node)?.children {
            self.collect_dfs(child, mode, order)?;
        }
        if mode == FlatteningMode::DfsPost {
            order.push(node);
        }
        Ok(())
    }
}
