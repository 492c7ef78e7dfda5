//! Minimal change sets between two tree versions
//!
//! An update is shipped to the ledger as the values of the maximal subtrees
//! that changed (the canonical cover of the new leaf range) plus the sibling
//! hashes needed to walk from those subtrees up to the root. A verifier
//! places zero subtrees at the updated positions to recompute the old root,
//! then the new values to recompute the new root.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::items::ItemStore;
use crate::nodestore::NodeStore;
use crate::tree::CompressedTree;
use crate::{crypto, leaf_node_index, Node, Result, TreeError, Version, ZeroTable};

/// Node positions involved in one update, each list sorted ascending.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NodeDiff {
    /// Roots of the maximal subtrees lying entirely inside the new leaf range
    pub updated: Vec<u64>,
    /// Siblings a verifier needs and cannot derive
    pub provided: Vec<u64>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Role {
    Update,
    Provide,
    Implied,
}

/// Plans the update from a tree holding items `0..=old_last` to one holding `0..=new_last`.
pub fn plan_update(depth: u32, old_last: u64, new_last: u64) -> Result<NodeDiff> {
    if new_last == old_last {
        return Err(TreeError::NothingToUpdate);
    }
    if new_last < old_last {
        return Err(TreeError::InvalidRange {
            from: old_last,
            to: new_last,
        });
    }
    let capacity = 1u64 << depth;
    if new_last >= capacity {
        return Err(TreeError::CapacityExceeded {
            count: new_last + 1,
            capacity,
        });
    }

    let start = leaf_node_index(depth, old_last + 1);
    let end = leaf_node_index(depth, new_last);

    let mut updated = Vec::new();
    canonical_cover(start, end, depth, 1, 0, &mut updated);
    updated.sort_unstable();

    let provided = sibling_closure(&updated);

    debug!(
        old_last,
        new_last,
        updated = updated.len(),
        provided = provided.len(),
        "update planned"
    );
    Ok(NodeDiff { updated, provided })
}

/// Collects the largest subtrees under `node` whose leaves all lie in `start..=end`.
fn canonical_cover(start: u64, end: u64, depth: u32, node: u64, level: u32, out: &mut Vec<u64>) {
    let first = node << (depth - level);
    let last = first + (1u64 << (depth - level)) - 1;

    if first > end || last < start {
        return;
    }

    if first >= start && last <= end {
        out.push(node);
        return;
    }

    canonical_cover(start, end, depth, 2 * node, level + 1, out);
    canonical_cover(start, end, depth, 2 * node + 1, level + 1, out);
}

/// Siblings of updated nodes and of their ancestors that are neither updated
/// nor recomputable. Ancestors are implied and override an earlier mark.
fn sibling_closure(updated: &[u64]) -> Vec<u64> {
    let mut roles: HashMap<u64, Role> = HashMap::new();

    for &node in updated {
        roles.insert(node, Role::Update);
        if node > 1 {
            roles.entry(node ^ 1).or_insert(Role::Provide);
        }
    }

    for &node in updated {
        let mut ancestor = node >> 1;
        while ancestor > 1 {
            roles.insert(ancestor, Role::Implied);
            roles.entry(ancestor ^ 1).or_insert(Role::Provide);
            ancestor >>= 1;
        }
    }

    let mut provided: Vec<u64> = roles
        .into_iter()
        .filter(|(_, role)| *role == Role::Provide)
        .map(|(node, _)| node)
        .collect();
    provided.sort_unstable();
    provided
}

/// Node values for a [`NodeDiff`]: updated values at the new version,
/// provided siblings at the old one.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct UpdateSet {
    pub updated: BTreeMap<u64, Node>,
    pub provided: BTreeMap<u64, Node>,
}

impl UpdateSet {
    /// Recomputes `(old_root, new_root)` from this set alone, the way a verifier would.
    pub fn replay(&self, depth: u32, zeros: &ZeroTable) -> Result<(Node, Node)> {
        self.replay_node(1, depth, zeros)
    }

    fn replay_node(&self, index: u64, height: u32, zeros: &ZeroTable) -> Result<(Node, Node)> {
        if let Some(node) = self.updated.get(&index) {
            return Ok((zeros.at(height), *node));
        }
        if let Some(node) = self.provided.get(&index) {
            return Ok((*node, *node));
        }
        if height == 0 {
            return Err(TreeError::IncompleteUpdate(index));
        }

        let (old_left, new_left) = self.replay_node(2 * index, height - 1, zeros)?;
        let (old_right, new_right) = self.replay_node(2 * index + 1, height - 1, zeros)?;

        Ok((
            crypto::combine(&old_left, &old_right),
            crypto::combine(&new_left, &new_right),
        ))
    }
}

impl<N: NodeStore, I: ItemStore> CompressedTree<N, I> {
    /// Fetches the values for `diff`.
    pub async fn collect_update(
        &self,
        diff: &NodeDiff,
        old_version: Version,
        new_version: Version,
    ) -> Result<UpdateSet> {
        let mut set = UpdateSet::default();
        for &index in &diff.updated {
            set.updated
                .insert(index, self.node_or_zero(index, new_version).await?);
        }
        for &index in &diff.provided {
            set.provided
                .insert(index, self.node_or_zero(index, old_version).await?);
        }
        Ok(set)
    }

    /// Plans and collects the update between two built versions.
    pub async fn update_between(
        &self,
        old_last: u64,
        new_last: u64,
        old_version: Version,
        new_version: Version,
    ) -> Result<UpdateSet> {
        let diff = plan_update(self.depth(), old_last, new_last)?;
        self.collect_update(&diff, old_version, new_version).await
    }
}
