use serde::{Deserialize, Serialize};

use crate::items::ItemStore;
use crate::nodestore::NodeStore;
use crate::tree::CompressedTree;
use crate::{crypto, leaf_node_index, ItemMetadata, Node, Result, State, TreeError};

/// Merkle path from one item's leaf to the root, siblings ordered leaf first.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub index: u64,
    pub leaf: Node,
    pub siblings: Vec<Node>,
}

impl InclusionProof {
    /// Root implied by the path. Even positions are left children.
    ///
    /// Parity comes from the item index itself: it shares its low bits with
    /// the leaf's node index `2^depth + index`.
    pub fn compute_root(&self) -> Node {
        let mut position = self.index;
        let mut current = self.leaf;
        for sibling in &self.siblings {
            current = if position & 1 == 0 {
                crypto::combine(&current, sibling)
            } else {
                crypto::combine(sibling, &current)
            };
            position >>= 1;
        }
        current
    }

    pub fn verify(&self, root: &Node) -> bool {
        let depth = self.siblings.len() as u32;
        depth < u64::BITS && self.index < (1u64 << depth) && self.compute_root() == *root
    }

    /// Opaque serialized form handed to clients
    pub fn to_envelope(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| TreeError::Serialization(e.to_string()))
    }

    pub fn from_envelope(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| TreeError::Serialization(e.to_string()))
    }
}

impl<N: NodeStore, I: ItemStore> CompressedTree<N, I> {
    /// Item `index` and its inclusion proof against `state`.
    pub async fn prove(&self, state: &State, index: u64) -> Result<(ItemMetadata, InclusionProof)> {
        if state.is_empty() || index > state.last_index {
            return Err(TreeError::NotFound(index));
        }

        let item = self
            .items
            .get_item(index)
            .await?
            .ok_or(TreeError::MissingItem(index))?;

        let mut node_index = leaf_node_index(self.depth(), index);
        let mut siblings = Vec::with_capacity(self.depth() as usize);
        for height in 0..self.depth() {
            let sibling = self
                .nodes
                .get_node(node_index ^ 1, state.version)
                .await?
                .unwrap_or_else(|| self.zeros.at(height));
            siblings.push(sibling);
            node_index >>= 1;
        }

        let proof = InclusionProof {
            index,
            leaf: item.to_node(),
            siblings,
        };

        let computed = proof.compute_root();
        if computed != state.root {
            return Err(TreeError::RootMismatch {
                expected: state.root.hash_hex(),
                actual: computed.hash_hex(),
            });
        }

        Ok((item, proof))
    }
}
