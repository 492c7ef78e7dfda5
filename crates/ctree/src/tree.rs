use crate::nodestore::NodeStore;
use crate::items::ItemStore;
use crate::{node_height, Node, Result, TreeError, Version, ZeroTable, MAX_LEVELS};

/// Fixed-depth append-only tree over an item sequence, backed by a versioned node store.
///
/// Leaf for item `i` lives at node index `2^depth + i`; node `n` has children
/// `2n` and `2n + 1`; the root is node `1`. Nodes that were never written are
/// read as the zero subtree of their height.
pub struct CompressedTree<N, I> {
    depth: u32,
    pub(crate) zeros: ZeroTable,
    pub(crate) nodes: N,
    pub(crate) items: I,
}

impl<N: NodeStore, I: ItemStore> CompressedTree<N, I> {
    pub fn new(depth: u32, nodes: N, items: I) -> Result<Self> {
        if depth == 0 || depth as usize >= MAX_LEVELS {
            return Err(TreeError::InvalidDepth(depth));
        }
        Ok(Self {
            depth,
            zeros: ZeroTable::new(),
            nodes,
            items,
        })
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of leaves
    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    pub fn zeros(&self) -> &ZeroTable {
        &self.zeros
    }

    pub fn nodes(&self) -> &N {
        &self.nodes
    }

    pub fn items(&self) -> &I {
        &self.items
    }

    /// Root of a tree with no items
    pub fn empty_root(&self) -> Node {
        self.zeros.at(self.depth)
    }

    /// Node `index` as of `version`, falling back to the zero subtree of its height
    pub async fn node_or_zero(&self, index: u64, version: Version) -> Result<Node> {
        Ok(self
            .nodes
            .get_node(index, version)
            .await?
            .unwrap_or_else(|| self.zeros.at(node_height(self.depth, index))))
    }

    pub async fn root(&self, version: Version) -> Result<Node> {
        self.node_or_zero(1, version).await
    }
}
