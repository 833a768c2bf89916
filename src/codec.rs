//! Snapshot encoding for trees.
//!
//! Snapshots are `bincode` records of the node arena. A Merkle snapshot also records the digest
//! algorithm and length, and every internal hash is checked on import, so a snapshot that
//! loads is guaranteed to reproduce the exported root hash and leaf order.

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::bst::{BinaryTree, Direction, NodeId, TraversalOrder};
use crate::error::{Result, TreeError};
use crate::hash::{DigestName, HashOf, digest_len};
use crate::merkle::{MerkleNode, MerkleTree};

#[derive(Serialize, Deserialize)]
struct MerkleSnapshot {
    algorithm: String,
    digest_len: u32,
    nodes: Vec<MerkleRecord>,
    leaves: Vec<u64>,
    root: u64,
}

#[derive(Serialize, Deserialize)]
struct MerkleRecord {
    hash: Vec<u8>,
    payload: Option<Vec<u8>>,
    left: Option<u64>,
    right: Option<u64>,
}

#[derive(Serialize)]
struct BinarySnapshotRef<'a, K, V> {
    nodes: Vec<BinaryRecordRef<'a, K, V>>,
}

#[derive(Serialize)]
struct BinaryRecordRef<'a, K, V> {
    key: &'a K,
    value: Option<&'a V>,
    left: Option<u64>,
    right: Option<u64>,
}

#[derive(Deserialize)]
struct BinarySnapshot<K, V> {
    nodes: Vec<BinaryRecord<K, V>>,
}

#[derive(Deserialize)]
struct BinaryRecord<K, V> {
    key: K,
    value: Option<V>,
    left: Option<u64>,
    right: Option<u64>,
}

impl<H> MerkleTree<H>
where
    H: Digest + Clone + DigestName,
{
    /// Serializes the tree into an opaque byte blob.
    ///
    /// ```
    /// use bmtree::MerkleTree;
    /// use sha2::Sha256;
    ///
    /// let tree = MerkleTree::<Sha256>::from_data(["a", "b", "c"]).unwrap();
    /// let blob = tree.export().unwrap();
    /// let restored = MerkleTree::<Sha256>::import(&blob).unwrap();
    /// assert_eq!(restored.root_hash(), tree.root_hash());
    /// ```
    pub fn export(&self) -> Result<Vec<u8>> {
        let snapshot = MerkleSnapshot {
            algorithm: H::NAME.to_string(),
            digest_len: digest_len::<H>() as u32,
            nodes: self
                .nodes()
                .iter()
                .map(|node| MerkleRecord {
                    hash: node.hash().to_vec(),
                    payload: node.payload().map(|payload| payload.to_vec()),
                    left: node.left().map(|idx| idx as u64),
                    right: node.right().map(|idx| idx as u64),
                })
                .collect(),
            leaves: self.leaf_ids().iter().map(|&idx| idx as u64).collect(),
            root: self.root() as u64,
        };
        let blob = bincode::serialize(&snapshot)?;
        debug!(
            "exported merkle snapshot: {} nodes, {} bytes",
            snapshot.nodes.len(),
            blob.len()
        );
        Ok(blob)
    }

    /// Rebuilds a tree from a blob produced by [`MerkleTree::export`].
    ///
    /// Fails with [`TreeError::AlgorithmMismatch`] for a snapshot written under another digest
    /// and with [`TreeError::InvalidStructure`] when links or hashes do not validate.
    pub fn import(blob: &[u8]) -> Result<Self> {
        let snapshot: MerkleSnapshot = bincode::deserialize(blob)?;
        if snapshot.algorithm != H::NAME {
            return Err(TreeError::AlgorithmMismatch {
                expected: H::NAME.to_string(),
                found: snapshot.algorithm,
            });
        }
        if snapshot.digest_len as usize != digest_len::<H>() {
            return Err(TreeError::InvalidStructure(format!(
                "digest length {} does not match {}",
                snapshot.digest_len,
                H::NAME
            )));
        }

        let nodes = snapshot
            .nodes
            .into_iter()
            .map(|record| -> Result<MerkleNode<H>> {
                Ok(MerkleNode {
                    hash: to_digest::<H>(&record.hash)?,
                    payload: record
                        .payload
                        .as_deref()
                        .map(to_digest::<H>)
                        .transpose()?,
                    left: record.left.map(to_index).transpose()?,
                    right: record.right.map(to_index).transpose()?,
                    parent: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let leaves = snapshot
            .leaves
            .into_iter()
            .map(to_index)
            .collect::<Result<Vec<_>>>()?;
        let root = to_index(snapshot.root)?;

        let tree = Self::from_parts(nodes, leaves, root).map_err(TreeError::InvalidStructure)?;
        debug!(
            "imported merkle snapshot: {} leaves, {} nodes",
            tree.leaf_count(),
            tree.nodes().len()
        );
        Ok(tree)
    }
}

impl<K, V> BinaryTree<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    /// Serializes the tree shape, keys and values into an opaque byte blob.
    ///
    /// Node ids are compacted, so the imported tree has the same shape but may hand out
    /// different [`NodeId`]s.
    pub fn export(&self) -> Result<Vec<u8>> {
        let order: Vec<NodeId> = self.ids(TraversalOrder::PreOrder).collect();
        let mut positions: Vec<u64> = vec![0; self.arena_len()];
        for (position, id) in order.iter().enumerate() {
            positions[id.index()] = position as u64;
        }

        let nodes = order
            .iter()
            .map(|&id| {
                let node = self.node_ref(id);
                BinaryRecordRef {
                    key: node.key(),
                    value: node.value(),
                    left: node.left().map(|child| positions[child.index()]),
                    right: node.right().map(|child| positions[child.index()]),
                }
            })
            .collect();
        Ok(bincode::serialize(&BinarySnapshotRef { nodes })?)
    }

    /// Rebuilds a tree from a blob produced by [`BinaryTree::export`].
    ///
    /// The ordering invariant is not re-checked, so shape-only trees (see
    /// [`crate::interop::merkle_to_binary`]) survive a round trip. Use
    /// [`BinaryTree::verify_invariant`] when the source is untrusted.
    pub fn import(blob: &[u8]) -> Result<Self> {
        let snapshot: BinarySnapshot<K, V> = bincode::deserialize(blob)?;
        let total = snapshot.nodes.len();
        let mut records: Vec<Option<BinaryRecord<K, V>>> =
            snapshot.nodes.into_iter().map(Some).collect();

        let mut tree = BinaryTree::new();
        if total == 0 {
            return Ok(tree);
        }

        // record 0 is the root in pre-order
        let mut stack: Vec<(usize, Option<(NodeId, Direction)>)> = vec![(0, None)];
        while let Some((position, parent)) = stack.pop() {
            let record = records
                .get_mut(position)
                .ok_or_else(|| {
                    TreeError::InvalidStructure(format!("child {position} outside snapshot"))
                })?
                .take()
                .ok_or_else(|| {
                    TreeError::InvalidStructure(format!("node {position} referenced twice"))
                })?;
            let id = tree.attach(parent, record.key, record.value);
            if let Some(right) = record.right {
                stack.push((to_index(right)?, Some((id, Direction::Right))));
            }
            if let Some(left) = record.left {
                stack.push((to_index(left)?, Some((id, Direction::Left))));
            }
        }
        if tree.len() != total {
            return Err(TreeError::InvalidStructure(format!(
                "{} of {total} nodes unreachable from the root",
                total - tree.len()
            )));
        }
        Ok(tree)
    }
}

fn to_digest<H: Digest>(bytes: &[u8]) -> Result<HashOf<H>> {
    if bytes.len() != digest_len::<H>() {
        return Err(TreeError::InvalidStructure(format!(
            "digest of {} bytes, expected {}",
            bytes.len(),
            digest_len::<H>()
        )));
    }
    Ok(<HashOf<H>>::clone_from_slice(bytes))
}

fn to_index(raw: u64) -> Result<usize> {
    usize::try_from(raw)
        .map_err(|_| TreeError::InvalidStructure(format!("index {raw} does not fit in memory")))
}
