//! Update envelopes recorded for off-system transaction assembly

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ctree::{Node, UpdateSet, Version};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateEnvelope {
    /// First population of the tree
    Create {
        root: String,
        depth: u32,
        last_index: u64,
        generated_at: DateTime<Utc>,
    },
    /// Append from the previous confirmed version
    Update {
        root: String,
        updates: BTreeMap<u64, Node>,
        hashes: BTreeMap<u64, Node>,
        new_last_index: u64,
        generated_at: DateTime<Utc>,
    },
}

impl UpdateEnvelope {
    pub fn create(root: &Node, depth: u32, last_index: u64) -> Self {
        Self::Create {
            root: root.hash_hex(),
            depth,
            last_index,
            generated_at: Utc::now(),
        }
    }

    pub fn update(root: &Node, set: UpdateSet, new_last_index: u64) -> Self {
        Self::Update {
            root: root.hash_hex(),
            updates: set.updated,
            hashes: set.provided,
            new_last_index,
            generated_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait UpdateRecorder: Send + Sync {
    /// Stores the envelope for `version`, replacing any earlier one for that version.
    async fn record(&self, envelope: &UpdateEnvelope, version: Version) -> Result<()>;
}

/// Writes `<base>/<version>.json`
pub struct FileUpdateRecorder {
    base: PathBuf,
}

impl FileUpdateRecorder {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn path_for(&self, version: Version) -> PathBuf {
        self.base.join(format!("{version}.json"))
    }
}

#[async_trait]
impl UpdateRecorder for FileUpdateRecorder {
    async fn record(&self, envelope: &UpdateEnvelope, version: Version) -> Result<()> {
        tokio::fs::create_dir_all(&self.base)
            .await
            .with_context(|| format!("creating {}", self.base.display()))?;
        let bytes = serde_json::to_vec_pretty(envelope)?;
        let path = self.path_for(version);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rerecording_a_version_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = FileUpdateRecorder::new(dir.path().join("upd"));

        let first = UpdateEnvelope::create(&Node::new([1; 32], 3), 3, 4);
        let second = UpdateEnvelope::create(&Node::new([2; 32], 3), 3, 5);
        recorder.record(&first, 1).await.unwrap();
        recorder.record(&second, 1).await.unwrap();

        let bytes = tokio::fs::read(recorder.path_for(1)).await.unwrap();
        let stored: UpdateEnvelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(stored, second);
    }

    #[test]
    fn update_json_shape() {
        let mut set = UpdateSet::default();
        set.updated.insert(6, Node::new([0xaa; 32], 1));
        set.provided.insert(7, Node::new([0xbb; 32], 0));
        let envelope = UpdateEnvelope::update(&Node::new([0xcc; 32], 3), set, 2);

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "update");
        assert_eq!(json["root"], "cc".repeat(32));
        assert_eq!(json["updates"]["6"]["hash"], "aa".repeat(32));
        assert_eq!(json["updates"]["6"]["depth"], 1);
        assert_eq!(json["hashes"]["7"]["depth"], 0);
        assert_eq!(json["new_last_index"], 2);
    }
}
