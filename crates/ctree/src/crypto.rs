//! Domain-separated hashing for tree nodes

use crate::{Hash32, ItemMetadata, Node, NODE_LENGTH};

const DOMAIN_ITEM: u8 = 0x00;
const DOMAIN_INTERNAL: u8 = 0x01;

/// Serialization depth of an item leaf; the content blob is a referenced child.
pub const ITEM_DEPTH: u16 = 1;

pub fn hash_content(content: &[u8]) -> Hash32 {
    blake3::hash(content).into()
}

/// Leaf of an unpopulated slot: H(zero32), depth 0
pub fn zero_leaf() -> Node {
    Node::new(blake3::hash(&[0u8; NODE_LENGTH]).into(), 0)
}

/// leaf = H(0x00 || workchain || account || H(content))
pub fn hash_item(item: &ItemMetadata) -> Node {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[DOMAIN_ITEM, item.owner.workchain as u8]);
    hasher.update(&item.owner.account);
    hasher.update(&hash_content(&item.content));
    Node::new(hasher.finalize().into(), ITEM_DEPTH)
}

/// Parent of two children
/// node = H(0x01 || left.depth || right.depth || left.hash || right.hash),
/// depth = max(left.depth, right.depth) + 1
pub fn combine(left: &Node, right: &Node) -> Node {
    let mut data = [0u8; 1 + 2 + 2 + 32 + 32];
    data[0] = DOMAIN_INTERNAL;
    data[1..3].copy_from_slice(&left.depth.to_be_bytes());
    data[3..5].copy_from_slice(&right.depth.to_be_bytes());
    data[5..37].copy_from_slice(&left.hash);
    data[37..].copy_from_slice(&right.hash);
    Node::new(
        blake3::hash(&data).into(),
        left.depth.max(right.depth) + 1,
    )
}
