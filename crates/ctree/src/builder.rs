//! Leaf and internal node construction

use tracing::debug;

use crate::items::ItemStore;
use crate::nodestore::NodeStore;
use crate::tree::CompressedTree;
use crate::{crypto, leaf_node_index, Node, Result, TreeError, Version, ZeroTable};

impl<N: NodeStore, I: ItemStore> CompressedTree<N, I> {
    /// Writes the leaf of every item in `from..=to` at `version`.
    ///
    /// A missing item is an error: a version must never be created with holes
    /// where items were expected.
    pub async fn extend_leaves(&self, from: u64, to: u64, version: Version) -> Result<()> {
        self.check_range(from, to)?;

        for index in from..=to {
            let item = self
                .items
                .get_item(index)
                .await?
                .ok_or(TreeError::MissingItem(index))?;

            self.nodes
                .set_node(leaf_node_index(self.depth(), index), version, item.to_node())
                .await?;
        }

        debug!(from, to, version, "leaves written");
        Ok(())
    }

    /// Rehashes every ancestor of the leaf nodes `from_node..=to_node` at `version`.
    ///
    /// Levels are processed strictly deepest first, so each parent reads
    /// children that were already written for this version.
    pub async fn extend_internal(
        &self,
        mut from_node: u64,
        mut to_node: u64,
        version: Version,
    ) -> Result<()> {
        for height in 1..=self.depth() {
            from_node >>= 1;
            to_node >>= 1;

            let child_zero = self.zeros.at(height - 1);
            for index in from_node..=to_node {
                let left = self
                    .nodes
                    .get_node(2 * index, version)
                    .await?
                    .unwrap_or(child_zero);
                let right = self
                    .nodes
                    .get_node(2 * index + 1, version)
                    .await?
                    .unwrap_or(child_zero);

                self.nodes
                    .set_node(index, version, crypto::combine(&left, &right))
                    .await?;
            }

            debug!(height, from_node, to_node, version, "level rehashed");
        }

        Ok(())
    }

    /// Writes leaves and ancestors for items `from..=to` and returns the new root.
    pub async fn build_range(&self, from: u64, to: u64, version: Version) -> Result<Node> {
        self.extend_leaves(from, to, version).await?;
        self.extend_internal(
            leaf_node_index(self.depth(), from),
            leaf_node_index(self.depth(), to),
            version,
        )
        .await?;
        self.root(version).await
    }

    fn check_range(&self, from: u64, to: u64) -> Result<()> {
        if from > to {
            return Err(TreeError::InvalidRange { from, to });
        }
        if to >= self.capacity() {
            return Err(TreeError::CapacityExceeded {
                count: to + 1,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }
}

/// Root of a tree holding `leaves` at indices `0..` and zero leaves elsewhere,
/// recomputed from scratch without a store.
pub fn compute_root(depth: u32, zeros: &ZeroTable, leaves: &[Node]) -> Result<Node> {
    let capacity = 1u64 << depth;
    if leaves.len() as u64 > capacity {
        return Err(TreeError::CapacityExceeded {
            count: leaves.len() as u64,
            capacity,
        });
    }

    let mut level = leaves.to_vec();
    for height in 0..depth {
        let zero = zeros.at(height);
        level = level
            .chunks(2)
            .map(|pair| crypto::combine(&pair[0], pair.get(1).unwrap_or(&zero)))
            .collect();
    }

    Ok(level.first().copied().unwrap_or_else(|| zeros.at(depth)))
}
