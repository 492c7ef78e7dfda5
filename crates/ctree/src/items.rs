//! Append-only item storage

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::{ItemMetadata, Result, TreeError};

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn get_item(&self, index: u64) -> Result<Option<ItemMetadata>>;

    /// Exactly `count` slots starting at `from`, in index order; holes are `None`.
    async fn get_items(&self, from: u64, count: u64) -> Result<Vec<Option<ItemMetadata>>>;

    /// Number of assigned items (last index + 1)
    async fn count(&self) -> Result<u64>;
}

#[async_trait]
impl<T: ItemStore + ?Sized> ItemStore for Arc<T> {
    async fn get_item(&self, index: u64) -> Result<Option<ItemMetadata>> {
        (**self).get_item(index).await
    }

    async fn get_items(&self, from: u64, count: u64) -> Result<Vec<Option<ItemMetadata>>> {
        (**self).get_items(from, count).await
    }

    async fn count(&self) -> Result<u64> {
        (**self).count().await
    }
}

/// In-memory item sequence (for testing and demos)
#[derive(Default)]
pub struct InMemoryItemStore {
    items: RwLock<Vec<ItemMetadata>>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item and returns its index
    pub fn push(&self, item: ItemMetadata) -> Result<u64> {
        let mut items = self.items.write().map_err(poisoned)?;
        items.push(item);
        Ok(items.len() as u64 - 1)
    }
}

fn poisoned<E>(_: E) -> TreeError {
    TreeError::Storage("item store lock poisoned".to_string())
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn get_item(&self, index: u64) -> Result<Option<ItemMetadata>> {
        let items = self.items.read().map_err(poisoned)?;
        Ok(usize::try_from(index)
            .ok()
            .and_then(|i| items.get(i))
            .cloned())
    }

    async fn get_items(&self, from: u64, count: u64) -> Result<Vec<Option<ItemMetadata>>> {
        let items = self.items.read().map_err(poisoned)?;
        Ok((from..from.saturating_add(count))
            .map(|i| usize::try_from(i).ok().and_then(|i| items.get(i)).cloned())
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.items.read().map_err(poisoned)?.len() as u64)
    }
}
