//! Builds the next tree version from newly appended items and proposes it

use std::sync::Arc;

use ctree::{ItemStore, State, TreeError, Version};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::info;

use crate::state::{StateHolder, Tree};
use crate::updates::{UpdateEnvelope, UpdateRecorder};

#[derive(Debug, Error)]
pub enum RediscoverError {
    /// Benign: no items were appended since the confirmed state
    #[error("nothing to rediscover")]
    NothingToRediscover,

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("could not record update: {0:#}")]
    Record(anyhow::Error),

    #[error("reconciliation loop is not running")]
    LoopClosed,
}

pub struct Rediscoverer {
    tree: Arc<Tree>,
    holder: Arc<StateHolder>,
    recorder: Arc<dyn UpdateRecorder>,
    proposals: mpsc::Sender<State>,
    /// Highest version built so far. Held for the whole rediscovery.
    last_built: Mutex<Version>,
}

impl Rediscoverer {
    pub fn new(
        tree: Arc<Tree>,
        holder: Arc<StateHolder>,
        recorder: Arc<dyn UpdateRecorder>,
        proposals: mpsc::Sender<State>,
    ) -> Self {
        Self {
            tree,
            holder,
            recorder,
            proposals,
            last_built: Mutex::new(0),
        }
    }

    /// Builds, records and proposes the next state. Returns the proposal.
    ///
    /// Every attempt gets a version above both the confirmed one and any
    /// earlier proposal, so a pending candidate is never overwritten while
    /// the reconciliation loop may still commit it.
    pub async fn rediscover(&self) -> Result<State, RediscoverError> {
        let mut last_built = self.last_built.lock().await;

        let confirmed = self.holder.confirmed();
        let version = confirmed.version.max(*last_built) + 1;
        let proposed = if confirmed.is_empty() {
            self.discover_first(version, &mut last_built).await?
        } else {
            self.discover_from(&confirmed, version, &mut last_built).await?
        };

        self.proposals
            .send(proposed.clone())
            .await
            .map_err(|_| RediscoverError::LoopClosed)?;

        info!(
            version = proposed.version,
            last_index = proposed.last_index,
            root = %proposed.root.hash_hex(),
            "rediscover: proposed state"
        );
        Ok(proposed)
    }

    async fn discover_first(
        &self,
        version: Version,
        last_built: &mut Version,
    ) -> Result<State, RediscoverError> {
        let count = self.tree.items().count().await?;
        if count == 0 {
            return Err(RediscoverError::NothingToRediscover);
        }
        self.check_capacity(count)?;

        let last_index = count - 1;
        // claimed before any write: a failed build leaves partial nodes behind
        *last_built = version;
        let root = self.tree.build_range(0, last_index, version).await?;

        let envelope = UpdateEnvelope::create(&root, self.tree.depth(), last_index);
        self.recorder
            .record(&envelope, version)
            .await
            .map_err(RediscoverError::Record)?;

        Ok(State {
            last_index,
            version,
            root,
            address: None,
        })
    }

    async fn discover_from(
        &self,
        confirmed: &State,
        version: Version,
        last_built: &mut Version,
    ) -> Result<State, RediscoverError> {
        let count = self.tree.items().count().await?;
        let new_last = count.checked_sub(1).ok_or_else(|| {
            RediscoverError::Invariant("item store is empty but a state is confirmed".into())
        })?;

        if new_last == confirmed.last_index {
            return Err(RediscoverError::NothingToRediscover);
        }
        if new_last < confirmed.last_index {
            return Err(RediscoverError::Invariant(format!(
                "item store shrank from {} to {} items",
                confirmed.item_count(),
                count
            )));
        }
        self.check_capacity(count)?;

        *last_built = version;
        let root = self
            .tree
            .build_range(confirmed.last_index + 1, new_last, version)
            .await?;

        let set = self
            .tree
            .update_between(confirmed.last_index, new_last, confirmed.version, version)
            .await?;

        let (old_root, new_root) = set.replay(self.tree.depth(), self.tree.zeros())?;
        if old_root != confirmed.root {
            return Err(RediscoverError::Invariant(format!(
                "update replays to old root {}, confirmed root is {}",
                old_root.hash_hex(),
                confirmed.root.hash_hex()
            )));
        }
        if new_root != root {
            return Err(RediscoverError::Invariant(format!(
                "update replays to new root {}, built root is {}",
                new_root.hash_hex(),
                root.hash_hex()
            )));
        }

        let envelope = UpdateEnvelope::update(&root, set, new_last);
        self.recorder
            .record(&envelope, version)
            .await
            .map_err(RediscoverError::Record)?;

        Ok(State {
            last_index: new_last,
            version,
            root,
            address: None,
        })
    }

    fn check_capacity(&self, count: u64) -> Result<(), RediscoverError> {
        if count > self.tree.capacity() {
            return Err(TreeError::CapacityExceeded {
                count,
                capacity: self.tree.capacity(),
            }
            .into());
        }
        Ok(())
    }
}
