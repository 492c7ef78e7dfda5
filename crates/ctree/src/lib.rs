//! Compressed item tree
//!
//! An append-only sequence of items stored as leaves of a fixed-depth binary
//! hash tree, with versioned node storage, minimal update sets for publishing
//! a new root, and per-item inclusion proofs.

mod address;
mod builder;
mod crypto;
mod diff;
mod items;
mod nodestore;
mod proof;
mod tree;
mod types;
mod zero;

pub use address::Address;
pub use builder::compute_root;
pub use crypto::{combine, hash_content, ITEM_DEPTH};
pub use diff::{plan_update, NodeDiff, UpdateSet};
pub use items::{InMemoryItemStore, ItemStore};
pub use nodestore::{InMemoryNodeStore, NodeStore};
pub use proof::InclusionProof;
pub use tree::CompressedTree;
pub use types::{
    leaf_node_index, node_height, node_level, Hash32, ItemMetadata, Node, State, Version,
    MAX_LEVELS, NODE_LENGTH,
};
pub use zero::ZeroTable;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Item {0} is missing from the item store")]
    MissingItem(u64),

    #[error("Item {0} not found")]
    NotFound(u64),

    #[error("Invalid range {from}..={to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("{count} items exceed tree capacity {capacity}")]
    CapacityExceeded { count: u64, capacity: u64 },

    #[error("Invalid tree depth {0}")]
    InvalidDepth(u32),

    #[error("Nothing to update")]
    NothingToUpdate,

    #[error("Update data cannot derive node {0}")]
    IncompleteUpdate(u64),

    #[error("Root mismatch: expected {expected}, computed {actual}")]
    RootMismatch { expected: String, actual: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, TreeError>;
