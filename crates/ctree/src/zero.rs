use crate::{crypto, Node, MAX_LEVELS};

/// Canonical nodes of all-zero perfect subtrees, indexed by subtree height.
#[derive(Clone, Debug)]
pub struct ZeroTable {
    nodes: Vec<Node>,
}

impl ZeroTable {
    pub fn new() -> Self {
        let mut nodes = Vec::with_capacity(MAX_LEVELS);
        nodes.push(crypto::zero_leaf());
        for h in 1..MAX_LEVELS {
            let prev = nodes[h - 1];
            nodes.push(crypto::combine(&prev, &prev));
        }
        Self { nodes }
    }

    /// Zero subtree of the given height. Heights at or above `MAX_LEVELS` panic.
    pub fn at(&self, height: u32) -> Node {
        self.nodes[height as usize]
    }

    pub fn as_slice(&self) -> &[Node] {
        &self.nodes
    }
}

impl Default for ZeroTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_level_combines_the_previous() {
        let zeros = ZeroTable::new();
        assert_eq!(zeros.as_slice().len(), MAX_LEVELS);
        assert_eq!(zeros.at(0), crypto::zero_leaf());
        for h in 1..MAX_LEVELS as u32 {
            let prev = zeros.at(h - 1);
            assert_eq!(zeros.at(h), crypto::combine(&prev, &prev));
            assert_eq!(zeros.at(h).depth, h as u16);
        }
    }
}
