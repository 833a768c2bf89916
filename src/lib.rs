#![cfg_attr(not(test), deny(missing_docs))]

//! Binary search trees and Merkle trees with verifiable inclusion proofs.
//!
//! The crate offers two arena-backed tree families and the glue between them:
//!
//! * [`BinaryTree`] is an unbalanced binary search tree with explicit rebalancing, three
//!   depth-first traversal orders and an ordering self-check.
//! * [`MerkleTree`] commits to an ordered leaf sequence. Odd levels pair their last node with
//!   itself, so the root hash is a pure function of the leaves. Proofs record which side every
//!   sibling sits on and verify with [`MerkleProof::verify`].
//! * [`MultiLevelMerkleTree`] keeps one independent Merkle tree per dataset.
//! * [`interop`] mirrors the shape of one tree family in the other and compares binary trees
//!   structurally.
//!
//! Every tree is generic over its digest `H: Digest + Clone` and defaults to [`sha2::Sha256`].
//! Merkle trees can be exported to compact `bincode` snapshots and moved through any
//! [`SnapshotStore`].
//!
//! ```
//! use bmtree::{BinaryTree, MerkleTree, TreeError};
//! use bmtree::hash::hash;
//! use sha2::Sha256;
//!
//! let mut bst = BinaryTree::<u32>::new();
//! for key in [50, 30, 70] {
//!     bst.insert(key).unwrap();
//! }
//! assert!(matches!(bst.insert(30), Err(TreeError::DuplicateKey)));
//!
//! let tree = MerkleTree::<Sha256>::from_data(["a", "b", "c"]).unwrap();
//! let proof = tree.generate_proof(2).unwrap();
//! assert!(proof.verify(&hash::<Sha256>(b"c"), &tree.root_hash()));
//! ```
//!
//! # Complexity
//!
//! * [`BinaryTree::insert`], [`BinaryTree::find`], [`BinaryTree::remove`] – `O(height)`.
//! * [`BinaryTree::balance`] – `O(n)` and leaves the tree at minimal height.
//! * [`MerkleTree::generate_proof`] – `O(log n)` time and proof size.
//! * [`MerkleTree::root_hash`] – `O(1)`; hashes are cached per node.
//! * Leaf mutations rebuild the Merkle tree in `O(n)`.

pub mod bst;
mod codec;
mod error;
pub mod hash;
pub mod interop;
pub mod merkle;
mod multilevel;
mod proof;
mod store;

pub use bst::{BinaryTree, BinaryTreeNode, NodeId, TraversalOrder};
pub use error::{Result, TreeError};
pub use hash::{DigestName, HashOf, Sha256Hash};
pub use merkle::{MerkleNode, MerkleTree};
pub use multilevel::MultiLevelMerkleTree;
pub use proof::{MerkleProof, ProofStep, Side};
pub use store::{MemoryStore, SnapshotStore};
