//! Durable storage of the confirmed state

use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ctree::State;

#[async_trait]
pub trait StateProvider: Send + Sync {
    /// Persisted state, or the empty version-0 state when nothing was saved yet.
    async fn load(&self) -> Result<State>;
    async fn save(&self, state: &State) -> Result<()>;
}

/// JSON file holding the last confirmed state
pub struct FileStateProvider {
    path: PathBuf,
}

impl FileStateProvider {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl StateProvider for FileStateProvider {
    async fn load(&self) -> Result<State> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(State::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()))
            }
        };
        serde_json::from_slice(&bytes)
            .with_context(|| format!("malformed state file {}", self.path.display()))
    }

    async fn save(&self, state: &State) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let bytes = serde_json::to_vec_pretty(state)?;

        // readers only ever see a complete file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
