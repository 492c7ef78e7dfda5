use std::sync::{Arc, PoisonError, RwLock};

use ctree::{Address, CompressedTree, ItemStore, NodeStore, State, Version};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::rediscover::Rediscoverer;

pub type Tree = CompressedTree<Arc<dyn NodeStore>, Arc<dyn ItemStore>>;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: AppConfig,
    pub tree: Arc<Tree>,
    pub holder: Arc<StateHolder>,
    pub rediscoverer: Rediscoverer,
    /// Feeds the reconciliation loop with ledger addresses to watch
    pub addresses: mpsc::Sender<Address>,
}

/// The currently confirmed tree state.
///
/// Only the reconciliation loop writes; every other component takes snapshots.
pub struct StateHolder {
    confirmed: RwLock<Arc<State>>,
}

#[derive(Debug, Error)]
#[error("refusing to move confirmed state from version {current} back to {proposed}")]
pub struct StaleState {
    pub current: Version,
    pub proposed: Version,
}

impl StateHolder {
    pub fn new(state: State) -> Self {
        Self {
            confirmed: RwLock::new(Arc::new(state)),
        }
    }

    pub fn confirmed(&self) -> Arc<State> {
        self.confirmed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the confirmed state. Versions never go backwards.
    pub fn set_confirmed(&self, state: State) -> Result<(), StaleState> {
        let mut guard = self
            .confirmed
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if state.version < guard.version {
            return Err(StaleState {
                current: guard.version,
                proposed: state.version,
            });
        }
        *guard = Arc::new(state);
        Ok(())
    }
}
