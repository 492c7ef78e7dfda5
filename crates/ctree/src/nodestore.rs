use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::{Node, Result, TreeError, Version};

/// Versioned node storage. Writes never remove older versions.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Value of node `index` at the highest stored version not exceeding `version`.
    /// `None` means the node was never written and stands for a zero subtree.
    async fn get_node(&self, index: u64, version: Version) -> Result<Option<Node>>;

    /// Stores `node` at (`index`, `version`), replacing a value at exactly that version.
    async fn set_node(&self, index: u64, version: Version, node: Node) -> Result<()>;
}

#[async_trait]
impl<T: NodeStore + ?Sized> NodeStore for Arc<T> {
    async fn get_node(&self, index: u64, version: Version) -> Result<Option<Node>> {
        (**self).get_node(index, version).await
    }

    async fn set_node(&self, index: u64, version: Version, node: Node) -> Result<()> {
        (**self).set_node(index, version, node).await
    }
}

/// Simple in-memory store
#[derive(Default)]
pub struct InMemoryNodeStore {
    nodes: RwLock<HashMap<u64, BTreeMap<Version, Node>>>,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored (index, version) entries. Only for tests / debugging
    pub fn len(&self) -> usize {
        self.nodes
            .read()
            .map(|nodes| nodes.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E>(_: E) -> TreeError {
    TreeError::Storage("node store lock poisoned".to_string())
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn get_node(&self, index: u64, version: Version) -> Result<Option<Node>> {
        let nodes = self.nodes.read().map_err(poisoned)?;
        Ok(nodes
            .get(&index)
            .and_then(|versions| versions.range(..=version).next_back())
            .map(|(_, node)| *node))
    }

    async fn set_node(&self, index: u64, version: Version, node: Node) -> Result<()> {
        let mut nodes = self.nodes.write().map_err(poisoned)?;
        nodes.entry(index).or_default().insert(version, node);
        Ok(())
    }
}
