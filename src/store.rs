//! Storage port for tree snapshots.

use std::collections::BTreeMap;

use sha2::Digest;

use crate::error::{Result, TreeError};
use crate::hash::DigestName;
use crate::merkle::MerkleTree;

/// Key/value sink for snapshot blobs produced by [`MerkleTree::export`].
///
/// Implementations report their own failures as [`TreeError::Store`].
pub trait SnapshotStore {
    /// Stores `blob` under `key`, replacing any previous blob.
    fn put(&mut self, key: &str, blob: Vec<u8>) -> Result<()>;

    /// Returns the blob stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// In-memory [`SnapshotStore`].
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    blobs: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub const fn new() -> Self {
        Self {
            blobs: BTreeMap::new(),
        }
    }

    /// Number of stored blobs.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Returns `true` when nothing is stored.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl SnapshotStore for MemoryStore {
    fn put(&mut self, key: &str, blob: Vec<u8>) -> Result<()> {
        self.blobs.insert(key.to_string(), blob);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(key).cloned())
    }
}

impl<H> MerkleTree<H>
where
    H: Digest + Clone + DigestName,
{
    /// Exports the tree and writes the snapshot to `store` under `key`.
    ///
    /// ```
    /// use bmtree::{MemoryStore, MerkleTree};
    /// use sha2::Sha256;
    ///
    /// let mut store = MemoryStore::new();
    /// let tree = MerkleTree::<Sha256>::from_data(["a", "b"]).unwrap();
    /// tree.persist(&mut store, "blocks/1").unwrap();
    ///
    /// let restored = MerkleTree::<Sha256>::restore(&store, "blocks/1").unwrap();
    /// assert_eq!(restored.root_hash(), tree.root_hash());
    /// ```
    pub fn persist<S>(&self, store: &mut S, key: &str) -> Result<()>
    where
        S: SnapshotStore + ?Sized,
    {
        store.put(key, self.export()?)
    }

    /// Reads the snapshot stored under `key` and imports it.
    ///
    /// Fails with [`TreeError::NotFound`] when the key is absent.
    pub fn restore<S>(store: &S, key: &str) -> Result<Self>
    where
        S: SnapshotStore + ?Sized,
    {
        let blob = store.get(key)?.ok_or(TreeError::NotFound)?;
        Self::import(&blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Sha256, Sha384};

    struct ReadOnly;

    impl SnapshotStore for ReadOnly {
        fn put(&mut self, key: &str, _blob: Vec<u8>) -> Result<()> {
            Err(TreeError::Store(format!("cannot write {key}")))
        }

        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
    }

    #[test]
    fn persist_and_restore() {
        let mut store = MemoryStore::new();
        let mut tree = MerkleTree::<Sha256>::from_data(["a", "b", "c"]).unwrap();
        tree.persist(&mut store, "v1").unwrap();
        tree.add_leaf("d");
        tree.persist(&mut store, "v2").unwrap();
        assert_eq!(store.len(), 2);

        let v1 = MerkleTree::<Sha256>::restore(&store, "v1").unwrap();
        let v2 = MerkleTree::<Sha256>::restore(&store, "v2").unwrap();
        assert_eq!(v1.leaf_count(), 3);
        assert_eq!(v2.root_hash(), tree.root_hash());
    }

    #[test]
    fn restore_missing_key() {
        let store = MemoryStore::default();
        assert!(store.is_empty());
        assert!(matches!(
            MerkleTree::<Sha256>::restore(&store, "nope"),
            Err(TreeError::NotFound)
        ));
    }

    #[test]
    fn restore_under_other_algorithm() {
        let mut store = MemoryStore::new();
        MerkleTree::<Sha384>::from_data(["a"])
            .unwrap()
            .persist(&mut store, "k")
            .unwrap();
        assert!(matches!(
            MerkleTree::<Sha256>::restore(&store, "k"),
            Err(TreeError::AlgorithmMismatch { .. })
        ));
    }

    #[test]
    fn store_errors_propagate() {
        let tree = MerkleTree::<Sha256>::from_data(["a"]).unwrap();
        let mut store: Box<dyn SnapshotStore> = Box::new(ReadOnly);
        assert!(matches!(
            tree.persist(store.as_mut(), "k"),
            Err(TreeError::Store(_))
        ));
    }
}
