//! Sparse Merkle tree of fixed depth 256 over keccak-256.
//!
//! Empty subtrees hash to zero, so only paths that hold leaves are ever
//! materialized. The root of a tree depends only on its set of (key, value)
//! pairs, never on insertion order.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::primitives::keccak_concat;

pub const TREE_DEPTH: usize = 256;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SmtError {
    #[error("Key {0} is already present in the tree")]
    DuplicateKey(B256),

    #[error("Key {0} is not present in the tree")]
    KeyNotFound(B256),
}

pub type SmtResult<T> = Result<T, SmtError>;

fn bit(key: &B256, depth: usize) -> bool {
    (key[depth / 8] >> (7 - depth % 8)) & 1 == 1
}

fn set_bit(mask: &mut B256, depth: usize) {
    mask[depth / 8] |= 1 << (7 - depth % 8);
}

pub fn leaf_hash(key: &B256, value: &B256) -> B256 {
    keccak_concat(&[LEAF_PREFIX], &[key.as_slice(), value.as_slice()].concat())
}

pub fn node_hash(left: &B256, right: &B256) -> B256 {
    if left.is_zero() && right.is_zero() {
        return B256::ZERO;
    }
    keccak_concat(&[NODE_PREFIX], &[left.as_slice(), right.as_slice()].concat())
}

/// `leaves` are sorted by key and share their first `depth` bits.
fn subtree_root(leaves: &[(B256, B256)], depth: usize) -> B256 {
    match leaves {
        [] => B256::ZERO,
        [(key, value)] if depth == TREE_DEPTH => leaf_hash(key, value),
        _ => {
            let split = leaves.partition_point(|(key, _)| !bit(key, depth));
            let (left, right) = leaves.split_at(split);
            node_hash(
                &subtree_root(left, depth + 1),
                &subtree_root(right, depth + 1),
            )
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SparseMerkleTree {
    leaves: BTreeMap<B256, B256>,
    root: Option<B256>,
}

impl SparseMerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: B256, value: B256) -> SmtResult<()> {
        if self.leaves.contains_key(&key) {
            return Err(SmtError::DuplicateKey(key));
        }
        self.leaves.insert(key, value);
        self.root = None;
        Ok(())
    }

    pub fn get(&self, key: &B256) -> Option<&B256> {
        self.leaves.get(key)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Computes the root and caches it until the next insert.
    pub fn commit(&mut self) -> B256 {
        if let Some(root) = self.root {
            return root;
        }
        let leaves: Vec<_> = self.leaves.iter().map(|(k, v)| (*k, *v)).collect();
        let root = subtree_root(&leaves, 0);
        self.root = Some(root);
        root
    }

    /// Root of the last commit, if the tree has not changed since.
    pub fn root(&self) -> Option<B256> {
        self.root
    }

    pub fn prove(&self, key: &B256) -> SmtResult<SmtProof> {
        if !self.leaves.contains_key(key) {
            return Err(SmtError::KeyNotFound(*key));
        }

        let leaves: Vec<_> = self.leaves.iter().map(|(k, v)| (*k, *v)).collect();
        let mut current: &[(B256, B256)] = &leaves;
        let mut mask = B256::ZERO;
        let mut siblings = Vec::new();

        for depth in 0..TREE_DEPTH {
            let split = current.partition_point(|(k, _)| !bit(k, depth));
            let (left, right) = current.split_at(split);
            let (path, other) = if bit(key, depth) {
                (right, left)
            } else {
                (left, right)
            };
            let sibling = subtree_root(other, depth + 1);
            if !sibling.is_zero() {
                set_bit(&mut mask, depth);
                siblings.push(sibling);
            }
            current = path;
        }

        Ok(SmtProof { mask, siblings })
    }
}

/// Compact membership proof. Bit `d` of `mask` (most significant first) is set
/// when the sibling at depth `d` is non-empty; `siblings` holds those hashes
/// ordered from the root down.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtProof {
    pub mask: B256,
    pub siblings: Vec<B256>,
}

impl SmtProof {
    pub fn compute_root(&self, key: &B256, value: &B256) -> Option<B256> {
        let mut siblings = self.siblings.iter().rev();
        let mut node = leaf_hash(key, value);
        for depth in (0..TREE_DEPTH).rev() {
            let sibling = if bit(&self.mask, depth) {
                *siblings.next()?
            } else {
                B256::ZERO
            };
            node = if bit(key, depth) {
                node_hash(&sibling, &node)
            } else {
                node_hash(&node, &sibling)
            };
        }
        match siblings.next() {
            Some(_) => None,
            None => Some(node),
        }
    }

    pub fn verify(&self, root: &B256, key: &B256, value: &B256) -> bool {
        self.compute_root(key, value).as_ref() == Some(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;

    fn key(i: u64) -> B256 {
        keccak256(i.to_be_bytes())
    }

    #[test]
    fn test_empty_tree_commits_to_zero() {
        assert_eq!(SparseMerkleTree::new().commit(), B256::ZERO);
    }

    #[test]
    fn test_single_leaf_root() {
        let (k, v) = (key(1), B256::repeat_byte(9));
        let mut tree = SparseMerkleTree::new();
        tree.insert(k, v).unwrap();

        let mut expected = leaf_hash(&k, &v);
        for depth in (0..TREE_DEPTH).rev() {
            expected = if bit(&k, depth) {
                node_hash(&B256::ZERO, &expected)
            } else {
                node_hash(&expected, &B256::ZERO)
            };
        }
        assert_eq!(tree.commit(), expected);
    }

    #[test]
    fn test_duplicate_key() {
        let mut tree = SparseMerkleTree::new();
        tree.insert(key(1), B256::ZERO).unwrap();
        assert_eq!(
            tree.insert(key(1), B256::repeat_byte(1)),
            Err(SmtError::DuplicateKey(key(1)))
        );
    }

    #[test]
    fn test_commit_is_cached_and_invalidated() {
        let mut tree = SparseMerkleTree::new();
        tree.insert(key(1), B256::repeat_byte(1)).unwrap();
        assert_eq!(tree.root(), None);
        let first = tree.commit();
        assert_eq!(tree.root(), Some(first));
        tree.insert(key(2), B256::repeat_byte(2)).unwrap();
        assert_eq!(tree.root(), None);
        assert_ne!(tree.commit(), first);
    }

    #[test]
    fn test_proof_rejects_tampering() {
        let mut tree = SparseMerkleTree::new();
        for i in 0..8 {
            tree.insert(key(i), B256::repeat_byte(i as u8)).unwrap();
        }
        let root = tree.commit();
        let proof = tree.prove(&key(3)).unwrap();
        assert!(proof.verify(&root, &key(3), &B256::repeat_byte(3)));
        assert!(!proof.verify(&root, &key(3), &B256::repeat_byte(4)));
        assert!(!proof.verify(&root, &key(4), &B256::repeat_byte(3)));

        let mut truncated = proof.clone();
        truncated.siblings.pop();
        assert!(!truncated.verify(&root, &key(3), &B256::repeat_byte(3)));

        assert_eq!(tree.prove(&key(99)), Err(SmtError::KeyNotFound(key(99))));
    }
}
