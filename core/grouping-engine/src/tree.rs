//! FILENAME: core/grouping-engine/src/tree.rs
//! Data Nodes - the arena-allocated grouping tree.
//!
//! Nodes live in an arena owned by `Data` and refer to each other by `NodeId`.
//! A node never owns another node directly: parent, children, leafs, the
//! atom base and cached groupings are all ids. Disposing a node frees its
//! arena slot; ids are never reused, so a stale id reports the node as
//! disposed instead of aliasing a newer node.

use std::rc::Rc;

use cube_engine::{AtomId, DatumId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::definition::GroupingSpec;

/// Index of a node in the `Data` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

// ============================================================================
// ATOM OVERLAY
// ============================================================================

/// A node's own atoms plus the node whose atoms it inherits.
/// Lookup checks the local entries first, then walks the base chain.
#[derive(Debug, Clone, Default)]
pub struct AtomOverlay {
    /// (dimension index, atom) pairs set by this node.
    pub local: SmallVec<[(usize, AtomId); 4]>,
    pub base: Option<NodeId>,
}

impl AtomOverlay {
    pub fn new(local: SmallVec<[(usize, AtomId); 4]>, base: Option<NodeId>) -> Self {
        AtomOverlay { local, base }
    }

    /// The local atom of a dimension, if this node sets one.
    pub fn get_local(&self, dimension: usize) -> Option<AtomId> {
        self.local
            .iter()
            .find(|(dim, _)| *dim == dimension)
            .map(|(_, atom)| *atom)
    }
}

// ============================================================================
// GROUPING CACHE
// ============================================================================

/// A grouping built from a node, remembered with the versions it was built at.
#[derive(Debug, Clone)]
pub(crate) struct CachedGrouping {
    pub root: NodeId,
    /// Version of the source node when the grouping was built.
    pub source_version: u64,
    /// Version of the result root right after it was built.
    pub result_version: u64,
    /// Datum flags version, checked only when the options filter on flags.
    pub flags_version: Option<u64>,
}

// ============================================================================
// DATA NODE
// ============================================================================

#[derive(Debug, Clone)]
pub struct DataNode {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    /// The node this tree was grouped from (set on grouping roots).
    pub(crate) link_parent: Option<NodeId>,
    pub(crate) depth: usize,

    pub(crate) key: String,
    pub(crate) label: String,
    pub(crate) absolute_key: String,
    pub(crate) absolute_label: String,

    pub(crate) children: Vec<NodeId>,
    pub(crate) child_index: FxHashMap<String, NodeId>,
    /// Transitive leaf descendants, in tree order. Empty for childless nodes.
    pub(crate) leafs: Vec<NodeId>,
    pub(crate) datums: Vec<DatumId>,
    pub(crate) atoms: AtomOverlay,

    pub(crate) grouping: Option<Rc<GroupingSpec>>,
    /// Number of grouping levels applied above and at this node.
    pub(crate) grouping_level: usize,
    /// In a flattened projection: this node stands for an inner node.
    pub(crate) is_flatten_group: bool,
    /// In a flattened projection: the original node.
    pub(crate) derived_from: Option<NodeId>,
    /// Hidden trees released together with this node.
    pub(crate) owned_trees: Vec<NodeId>,

    pub(crate) group_cache: FxHashMap<String, CachedGrouping>,
    /// Bumped whenever children or datum membership change.
    pub(crate) version: u64,
}

impl DataNode {
    pub(crate) fn new(id: NodeId) -> Self {
        DataNode {
            id,
            parent: None,
            link_parent: None,
            depth: 0,
            key: String::new(),
            label: String::new(),
            absolute_key: String::new(),
            absolute_label: String::new(),
            children: Vec::new(),
            child_index: FxHashMap::default(),
            leafs: Vec::new(),
            datums: Vec::new(),
            atoms: AtomOverlay::default(),
            grouping: None,
            grouping_level: 0,
            is_flatten_group: false,
            derived_from: None,
            owned_trees: Vec::new(),
            group_cache: FxHashMap::default(),
            version: 0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn link_parent(&self) -> Option<NodeId> {
        self.link_parent
    }

    /// Root = 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn absolute_key(&self) -> &str {
        &self.absolute_key
    }

    pub fn absolute_label(&self) -> &str {
        &self.absolute_label
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn datum_count(&self) -> usize {
        self.datums.len()
    }

    pub fn grouping(&self) -> Option<&Rc<GroupingSpec>> {
        self.grouping.as_ref()
    }

    pub fn grouping_level(&self) -> usize {
        self.grouping_level
    }

    pub fn is_flatten_group(&self) -> bool {
        self.is_flatten_group
    }

    pub fn derived_from(&self) -> Option<NodeId> {
        self.derived_from
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn atoms(&self) -> &AtomOverlay {
        &self.atoms
    }

    /// What this node contributes to its ancestors' leaf lists.
    pub(crate) fn leaf_contribution(&self) -> LeafContribution<'_> {
        if !self.children.is_empty() {
            LeafContribution::Leafs(&self.leafs)
        } else if self.is_flatten_group {
            LeafContribution::Nothing
        } else {
            LeafContribution::Itself(self.id)
        }
    }
}

pub(crate) enum LeafContribution<'a> {
    Itself(NodeId),
    Leafs(&'a [NodeId]),
    Nothing,
}

impl LeafContribution<'_> {
    pub(crate) fn extend_into(&self, leafs: &mut Vec<NodeId>) {
        match self {
            LeafContribution::Itself(id) => leafs.push(*id),
            LeafContribution::Leafs(ids) => leafs.extend_from_slice(ids),
            LeafContribution::Nothing => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_overlay_local_lookup() {
        let overlay = AtomOverlay::new(smallvec![(0, 5), (2, 7)], Some(NodeId(3)));
        assert_eq!(overlay.get_local(2), Some(7));
        assert_eq!(overlay.get_local(1), None);
        assert_eq!(overlay.base, Some(NodeId(3)));
    }

    #[test]
    fn test_leaf_contribution() {
        let mut leaf = DataNode::new(NodeId(1));
        let mut leafs = Vec::new();
        leaf.leaf_contribution().extend_into(&mut leafs);
        assert_eq!(leafs, vec![NodeId(1)]);

        leaf.is_flatten_group = true;
        leafs.clear();
        leaf.leaf_contribution().extend_into(&mut leafs);
        assert!(leafs.is_empty());

        let mut inner = DataNode::new(NodeId(2));
        inner.children = vec![NodeId(4), NodeId(5)];
        inner.leafs = vec![NodeId(4), NodeId(6)];
        inner.leaf_contribution().extend_into(&mut leafs);
        assert_eq!(leafs, vec![NodeId(4), NodeId(6)]);
    }
}
