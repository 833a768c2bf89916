//! Independent Merkle trees kept side by side, one per dataset.

use sha2::{Digest, Sha256};

use crate::error::{Result, TreeError};
use crate::hash::HashOf;
use crate::merkle::MerkleTree;
use crate::proof::MerkleProof;

/// Ordered collection of independent Merkle trees, one per dataset.
///
/// Levels are not chained: a level's root hash is not an input to any other level.
///
/// ```
/// use bmtree::MultiLevelMerkleTree;
/// use bmtree::hash::hash;
/// use sha2::Sha256;
///
/// let mut levels = MultiLevelMerkleTree::<Sha256>::new();
/// levels.add_level(["tx-1", "tx-2", "tx-3"]).unwrap();
/// levels.add_level(["block-header"]).unwrap();
///
/// let proof = levels.generate_proof(0, 1).unwrap();
/// assert!(levels.verify_proof(0, &hash::<Sha256>(b"tx-2"), &proof).unwrap());
/// ```
#[derive(Clone, Debug)]
pub struct MultiLevelMerkleTree<H = Sha256>
where
    H: Digest + Clone,
{
    levels: Vec<MerkleTree<H>>,
}

impl<H> MultiLevelMerkleTree<H>
where
    H: Digest + Clone,
{
    /// Creates an empty collection.
    #[inline(always)]
    pub const fn new() -> Self {
        Self { levels: Vec::new() }
    }

    /// Number of levels.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Returns `true` when there are no levels.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Builds a tree over `items` and appends it as a new level, returning its index.
    pub fn add_level<I, D>(&mut self, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = D>,
        D: AsRef<[u8]>,
    {
        let tree = MerkleTree::from_data(items)?;
        Ok(self.push_level(tree))
    }

    /// Appends an existing tree as a new level, returning its index.
    pub fn push_level(&mut self, tree: MerkleTree<H>) -> usize {
        self.levels.push(tree);
        self.levels.len() - 1
    }

    /// Removes and returns the level at `index`; later levels shift down by one.
    pub fn remove_level(&mut self, index: usize) -> Result<MerkleTree<H>> {
        if index >= self.levels.len() {
            return Err(TreeError::NotFound);
        }
        Ok(self.levels.remove(index))
    }

    /// Level at `index`.
    pub fn level(&self, index: usize) -> Result<&MerkleTree<H>> {
        self.levels.get(index).ok_or(TreeError::NotFound)
    }

    /// Mutable access to a level, for leaf edits that rebuild only that level.
    pub fn level_mut(&mut self, index: usize) -> Result<&mut MerkleTree<H>> {
        self.levels.get_mut(index).ok_or(TreeError::NotFound)
    }

    /// All levels, in insertion order.
    #[inline(always)]
    pub fn levels(&self) -> &[MerkleTree<H>] {
        &self.levels
    }

    /// Root hash of every level, in level order.
    pub fn root_hashes(&self) -> Vec<HashOf<H>> {
        self.levels.iter().map(MerkleTree::root_hash).collect()
    }

    /// Proof for leaf `leaf` of level `level`.
    pub fn generate_proof(&self, level: usize, leaf: usize) -> Result<MerkleProof<H>> {
        self.level(level)?.generate_proof(leaf)
    }

    /// Verifies `proof` against the current root of level `level`.
    pub fn verify_proof(
        &self,
        level: usize,
        leaf_hash: &HashOf<H>,
        proof: &MerkleProof<H>,
    ) -> Result<bool> {
        Ok(proof.verify(leaf_hash, &self.level(level)?.root_hash()))
    }
}

impl<H> Default for MultiLevelMerkleTree<H>
where
    H: Digest + Clone,
{
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash;

    fn h(data: &str) -> HashOf<Sha256> {
        hash::<Sha256>(data.as_bytes())
    }

    fn sample() -> MultiLevelMerkleTree {
        let mut levels = MultiLevelMerkleTree::new();
        levels.add_level(["a", "b", "c", "d"]).unwrap();
        levels.add_level(["x", "y"]).unwrap();
        levels
    }

    #[test]
    fn levels_are_independent() {
        let mut levels = sample();
        let before = levels.root_hashes();
        levels.level_mut(1).unwrap().add_leaf("z");
        let after = levels.root_hashes();
        assert_eq!(before[0], after[0]);
        assert_ne!(before[1], after[1]);
    }

    #[test]
    fn proofs_are_scoped_to_their_level() {
        let levels = sample();
        let proof = levels.generate_proof(1, 0).unwrap();
        assert!(levels.verify_proof(1, &h("x"), &proof).unwrap());
        assert!(!levels.verify_proof(0, &h("x"), &proof).unwrap());
    }

    #[test]
    fn missing_levels_and_leaves() {
        let mut levels = sample();
        assert!(matches!(levels.level(2), Err(TreeError::NotFound)));
        assert!(matches!(
            levels.generate_proof(0, 9),
            Err(TreeError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            levels.add_level(Vec::<&str>::new()),
            Err(TreeError::EmptyInput)
        ));
        assert_eq!(levels.len(), 2);

        let removed = levels.remove_level(0).unwrap();
        assert_eq!(removed.leaf_count(), 4);
        assert_eq!(levels.level(0).unwrap().leaf_count(), 2);
        assert!(matches!(levels.remove_level(5), Err(TreeError::NotFound)));
    }
}
