//! Merkle commitments over a node's execution trace.
//!
//! A node commits to its whole trace with one root. A challenger who holds
//! a single leaf and its sibling path can prove that leaf is part of what
//! the node committed to, without the rest of the trace.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What a trace leaf records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeafKind {
    Input,
    Step,
    /// The final output. Its `data` is the output digest.
    Output,
}

impl LeafKind {
    fn tag(self) -> u8 {
        match self {
            Self::Input => 0,
            Self::Step => 1,
            Self::Output => 2,
        }
    }
}

/// One entry of an execution trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceLeaf {
    pub kind: LeafKind,
    /// Position in the trace.
    pub index: u32,
    pub data: [u8; 32],
}

impl TraceLeaf {
    #[must_use]
    pub fn new(kind: LeafKind, index: u32, data: [u8; 32]) -> Self {
        Self { kind, index, data }
    }

    /// Leaf hash: `H("computesettle:trace_leaf:v1:" || kind || index || data)`.
    #[must_use]
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"computesettle:trace_leaf:v1:");
        hasher.update([self.kind.tag()]);
        hasher.update(self.index.to_le_bytes());
        hasher.update(self.data);
        hasher.finalize().into()
    }
}

/// Side of a sibling in a proof path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// Binary Merkle tree over leaf hashes.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Level 0 = leaves, last level = `[root]`.
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    /// Build a tree from leaf hashes.
    ///
    /// An empty list produces an all-zero root. A single leaf is its own
    /// root. An odd node at any level is paired with itself.
    #[must_use]
    pub fn from_leaves(leaves: Vec<[u8; 32]>) -> Self {
        if leaves.is_empty() {
            return Self { levels: vec![] };
        }

        let mut levels = vec![leaves];
        while let Some(current) = levels.last().filter(|level| level.len() > 1) {
            let next: Vec<[u8; 32]> = current
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
                .collect();
            levels.push(next);
        }
        Self { levels }
    }

    /// Build a tree from a typed trace.
    #[must_use]
    pub fn from_trace(trace: &[TraceLeaf]) -> Self {
        Self::from_leaves(trace.iter().map(TraceLeaf::hash).collect())
    }

    #[must_use]
    pub fn root(&self) -> [u8; 32] {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or([0u8; 32])
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Inclusion proof for the leaf at `index`.
    #[must_use]
    pub fn proof(&self, index: usize) -> Option<InclusionProof> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut path = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = idx ^ 1;
            let sibling = level.get(sibling_idx).copied().unwrap_or(level[idx]);
            let side = if idx % 2 == 0 { Side::Right } else { Side::Left };
            path.push((sibling, side));
            idx /= 2;
        }
        Some(InclusionProof { path })
    }
}

/// Sibling path from a leaf to the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub path: Vec<([u8; 32], Side)>,
}

impl InclusionProof {
    /// Whether `leaf_hash` folds up to `root` along this path.
    #[must_use]
    pub fn verify(&self, leaf_hash: [u8; 32], root: &[u8; 32]) -> bool {
        let computed = self
            .path
            .iter()
            .fold(leaf_hash, |current, (sibling, side)| match side {
                Side::Left => hash_pair(sibling, &current),
                Side::Right => hash_pair(&current, sibling),
            });
        computed == *root
    }
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"computesettle:merkle_node:v1:");
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(len: u32) -> Vec<TraceLeaf> {
        (0..len)
            .map(|i| {
                let kind = if i + 1 == len {
                    LeafKind::Output
                } else {
                    LeafKind::Step
                };
                TraceLeaf::new(kind, i, [u8::try_from(i).unwrap_or(0xFF); 32])
            })
            .collect()
    }

    #[test]
    fn empty_tree_has_zero_root() {
        let tree = MerkleTree::from_leaves(vec![]);
        assert_eq!(tree.root(), [0u8; 32]);
        assert_eq!(tree.leaf_count(), 0);
        assert!(tree.proof(0).is_none());
    }

    #[test]
    fn single_leaf_is_root() {
        let leaves = trace(1);
        let tree = MerkleTree::from_trace(&leaves);
        assert_eq!(tree.root(), leaves[0].hash());
        let proof = tree.proof(0).unwrap();
        assert!(proof.path.is_empty());
        assert!(proof.verify(leaves[0].hash(), &tree.root()));
    }

    #[test]
    fn proof_verifies_for_all_leaves() {
        for len in [2, 3, 5, 7, 8] {
            let leaves = trace(len);
            let tree = MerkleTree::from_trace(&leaves);
            for (i, leaf) in leaves.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert!(
                    proof.verify(leaf.hash(), &tree.root()),
                    "leaf {i} of {len} should verify"
                );
            }
        }
    }

    #[test]
    fn wrong_leaf_fails() {
        let leaves = trace(4);
        let tree = MerkleTree::from_trace(&leaves);
        let proof = tree.proof(3).unwrap();
        let mut forged = leaves[3];
        forged.data[0] ^= 1;
        assert!(!proof.verify(forged.hash(), &tree.root()));
    }

    #[test]
    fn wrong_root_fails() {
        let leaves = trace(4);
        let tree = MerkleTree::from_trace(&leaves);
        let proof = tree.proof(1).unwrap();
        assert!(!proof.verify(leaves[1].hash(), &[9u8; 32]));
    }

    #[test]
    fn leaf_kind_and_index_feed_hash() {
        let a = TraceLeaf::new(LeafKind::Output, 3, [1; 32]);
        let b = TraceLeaf::new(LeafKind::Step, 3, [1; 32]);
        let c = TraceLeaf::new(LeafKind::Output, 4, [1; 32]);
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn proof_serde_roundtrip() {
        let tree = MerkleTree::from_trace(&trace(5));
        let proof = tree.proof(4).unwrap();
        let json = serde_json::to_string(&proof).unwrap();
        let back: InclusionProof = serde_json::from_str(&json).unwrap();
        assert_eq!(proof, back);
    }
}
