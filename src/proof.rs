//! Leaf-to-root inclusion proofs with a recorded sibling side per step.

use core::fmt;
use sha2::Digest;

use crate::hash::{HashOf, hash_pair, hash_with_payload};

/// Position of a proof step's sibling relative to the hash being carried up the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// The sibling is the left child; the running hash is the right child.
    Left,
    /// The sibling is the right child; the running hash is the left child.
    Right,
}

/// One level of a [`MerkleProof`].
#[derive(Clone)]
pub struct ProofStep<H>
where
    H: Digest + Clone,
{
    /// Hash of the sibling subtree, or `None` when the parent has a single child.
    pub sibling: Option<HashOf<H>>,
    /// Which side the sibling occupies.
    pub side: Side,
    /// Data digest carried by the parent itself, for trees converted from a binary tree.
    pub payload: Option<HashOf<H>>,
}

impl<H> ProofStep<H>
where
    H: Digest + Clone,
{
    /// Recomputes the parent hash from the child hash carried so far.
    ///
    /// Returns `None` for a step that cannot describe any parent (no sibling and no payload).
    pub fn apply(&self, running: &HashOf<H>) -> Option<HashOf<H>> {
        match (&self.payload, &self.sibling, self.side) {
            (None, Some(sibling), Side::Right) => Some(hash_pair::<H>(running, sibling)),
            (None, Some(sibling), Side::Left) => Some(hash_pair::<H>(sibling, running)),
            (None, None, _) => None,
            (Some(payload), sibling, Side::Right) => Some(hash_with_payload::<H>(
                payload,
                Some(running),
                sibling.as_ref(),
            )),
            (Some(payload), sibling, Side::Left) => Some(hash_with_payload::<H>(
                payload,
                sibling.as_ref(),
                Some(running),
            )),
        }
    }
}

impl<H> PartialEq for ProofStep<H>
where
    H: Digest + Clone,
{
    fn eq(&self, other: &Self) -> bool {
        self.sibling == other.sibling && self.side == other.side && self.payload == other.payload
    }
}

impl<H> Eq for ProofStep<H> where H: Digest + Clone {}

impl<H> fmt::Debug for ProofStep<H>
where
    H: Digest + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofStep")
            .field("sibling", &self.sibling.as_ref().map(hex::encode))
            .field("side", &self.side)
            .field("payload", &self.payload.as_ref().map(hex::encode))
            .finish()
    }
}

/// Inclusion proof for a single Merkle leaf.
///
/// Steps are ordered leaf-to-root and each one records which side its sibling sits on, so
/// verification is unambiguous for unbalanced and composed trees.
#[derive(Clone, Debug)]
pub struct MerkleProof<H>
where
    H: Digest + Clone,
{
    /// Position of the proven leaf in the tree's leaf sequence.
    pub leaf_index: usize,
    /// Path from the leaf's parent up to the root.
    pub steps: Vec<ProofStep<H>>,
}

impl<H> PartialEq for MerkleProof<H>
where
    H: Digest + Clone,
{
    fn eq(&self, other: &Self) -> bool {
        self.leaf_index == other.leaf_index && self.steps == other.steps
    }
}

impl<H> Eq for MerkleProof<H> where H: Digest + Clone {}

impl<H> MerkleProof<H>
where
    H: Digest + Clone,
{
    /// Number of levels between the leaf and the root.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` for the proof of a single-leaf tree.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Folds the proof from `leaf_hash` upwards and compares the result with `expected_root`.
    ///
    /// ```
    /// use bmtree::MerkleTree;
    /// use bmtree::hash::hash;
    /// use sha2::Sha256;
    ///
    /// let tree = MerkleTree::<Sha256>::from_data(["a", "b", "c", "d"]).unwrap();
    /// let proof = tree.generate_proof(2).unwrap();
    /// assert!(proof.verify(&hash::<Sha256>(b"c"), &tree.root_hash()));
    /// assert!(!proof.verify(&hash::<Sha256>(b"x"), &tree.root_hash()));
    /// ```
    pub fn verify(&self, leaf_hash: &HashOf<H>, expected_root: &HashOf<H>) -> bool {
        let mut acc = leaf_hash.clone();
        for step in &self.steps {
            match step.apply(&acc) {
                Some(next) => acc = next,
                None => return false,
            }
        }
        &acc == expected_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash;
    use sha2::Sha256;

    #[test]
    fn side_controls_concatenation_order() {
        let running = hash::<Sha256>(b"running");
        let sibling = hash::<Sha256>(b"sibling");
        let right = ProofStep::<Sha256> {
            sibling: Some(sibling.clone()),
            side: Side::Right,
            payload: None,
        };
        let left = ProofStep::<Sha256> {
            side: Side::Left,
            ..right.clone()
        };
        assert_eq!(
            right.apply(&running),
            Some(hash_pair::<Sha256>(&running, &sibling))
        );
        assert_eq!(
            left.apply(&running),
            Some(hash_pair::<Sha256>(&sibling, &running))
        );
    }

    #[test]
    fn empty_step_fails_verification() {
        let leaf = hash::<Sha256>(b"leaf");
        let proof = MerkleProof::<Sha256> {
            leaf_index: 0,
            steps: vec![ProofStep {
                sibling: None,
                side: Side::Right,
                payload: None,
            }],
        };
        assert!(!proof.verify(&leaf, &leaf));
    }

    #[test]
    fn empty_proof_verifies_single_leaf_root() {
        let leaf = hash::<Sha256>(b"only");
        let proof = MerkleProof::<Sha256> {
            leaf_index: 0,
            steps: Vec::new(),
        };
        assert!(proof.is_empty());
        assert!(proof.verify(&leaf, &leaf));
    }
}
