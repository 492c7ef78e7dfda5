//! Core types for the compressed item tree

use serde::{Deserialize, Serialize};

use crate::{crypto, Address};

/// 32-byte hash
pub type Hash32 = [u8; 32];

/// Logical snapshot of the whole tree. Version 0 means nothing is populated yet.
pub type Version = u64;

/// Number of precomputed zero-subtree heights
pub const MAX_LEVELS: usize = 30;

pub const NODE_LENGTH: usize = 32;

/// A node hash together with the serialization depth of the encoding it commits to.
///
/// The depth is not the position in the tree: the ledger's hashing primitive
/// takes it as input, so it travels with every hash.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(with = "hex::serde")]
    pub hash: Hash32,
    pub depth: u16,
}

impl Node {
    pub const fn new(hash: Hash32, depth: u16) -> Self {
        Self { hash, depth }
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Node index of the leaf holding item `index`.
pub fn leaf_node_index(depth: u32, index: u64) -> u64 {
    (1u64 << depth) + index
}

/// Distance of node `index` from the root (root = 0).
pub fn node_level(index: u64) -> u32 {
    63 - index.leading_zeros()
}

/// Height of the subtree rooted at node `index` (leaf = 0).
pub fn node_height(depth: u32, index: u64) -> u32 {
    depth - node_level(index)
}

/// Payload of one item
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub owner: Address,
    #[serde(with = "hex::serde")]
    pub content: Vec<u8>,
}

impl ItemMetadata {
    pub fn new(owner: Address, content: impl Into<Vec<u8>>) -> Self {
        Self {
            owner,
            content: content.into(),
        }
    }

    /// Leaf node committing to this item
    pub fn to_node(&self) -> Node {
        crypto::hash_item(self)
    }
}

/// Tree state as published to (and confirmed by) the ledger
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub last_index: u64,
    pub version: Version,
    pub root: Node,
    #[serde(default)]
    pub address: Option<Address>,
}

impl State {
    /// Version-0 state of a tree with no items
    pub fn empty(root: Node) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.version == 0
    }

    pub fn item_count(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.last_index + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addressing() {
        assert_eq!(leaf_node_index(2, 0), 4);
        assert_eq!(leaf_node_index(2, 3), 7);
        assert_eq!(node_level(1), 0);
        assert_eq!(node_level(3), 1);
        assert_eq!(node_level(4), 2);
        assert_eq!(node_height(2, 1), 2);
        assert_eq!(node_height(2, 6), 0);
    }

    #[test]
    fn empty_state_has_no_items() {
        let state = State::empty(Node::default());
        assert!(state.is_empty());
        assert_eq!(state.item_count(), 0);

        let state = State {
            last_index: 4,
            version: 2,
            ..State::default()
        };
        assert_eq!(state.item_count(), 5);
    }
}
