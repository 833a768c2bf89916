//! Conversions and structural checks spanning [`BinaryTree`] and [`MerkleTree`].
//!
//! Both conversions preserve tree *shape* only. A Merkle tree converted into a binary tree is
//! keyed by hex digests that carry no ordering meaning, so the result is not a searchable BST.

use core::hash::Hash;
use sha2::Digest;

use crate::bst::{BinaryTree, Direction, NodeId, TraversalOrder};
use crate::error::{Result, TreeError};
use crate::hash::{HashOf, hash_value, hash_with_payload};
use crate::merkle::{MerkleNode, MerkleTree};

/// Mirrors a binary tree as a Merkle tree with the same shape.
///
/// Each node's data digest `d` is `hash_value(value)`, or `hash_value(key)` for nodes stored
/// without a value. Childless nodes become Merkle leaves with hash `d`; every other node keeps
/// `d` as its payload and hashes to `H(d || left || right)`, omitting an absent child. The
/// leaf sequence of the result is the binary tree's childless nodes from left to right.
///
/// Fails with [`TreeError::EmptyInput`] when the binary tree is empty.
///
/// ```
/// use bmtree::BinaryTree;
/// use bmtree::interop::binary_to_merkle;
/// use sha2::Sha256;
///
/// let mut bst = BinaryTree::<u32>::new();
/// for key in [5, 3, 8] {
///     bst.insert(key).unwrap();
/// }
/// let tree = binary_to_merkle::<_, _, Sha256>(&bst).unwrap();
/// assert_eq!(tree.leaf_count(), 2);
///
/// let proof = tree.generate_proof(1).unwrap();
/// assert!(proof.verify(tree.leaf(1).unwrap(), &tree.root_hash()));
/// ```
pub fn binary_to_merkle<K, V, H>(bst: &BinaryTree<K, V>) -> Result<MerkleTree<H>>
where
    K: Hash,
    V: Hash,
    H: Digest + Clone,
{
    let root = bst.root().ok_or(TreeError::EmptyInput)?;
    let mut slots: Vec<Option<usize>> = vec![None; bst.arena_len()];
    let mut nodes: Vec<MerkleNode<H>> = Vec::with_capacity(bst.len());
    let mut leaves = Vec::new();

    // children are always emitted before their parent
    for id in bst.ids(TraversalOrder::PostOrder) {
        let node = bst.node_ref(id);
        let digest: HashOf<H> = match node.value() {
            Some(value) => hash_value::<V, H>(value),
            None => hash_value::<K, H>(node.key()),
        };
        let left = node.left().map(|child| converted(&slots, child));
        let right = node.right().map(|child| converted(&slots, child));

        let merkle_node = if left.is_none() && right.is_none() {
            leaves.push(nodes.len());
            MerkleNode::leaf(digest)
        } else {
            let hash = hash_with_payload::<H>(
                &digest,
                left.map(|idx| &nodes[idx].hash),
                right.map(|idx| &nodes[idx].hash),
            );
            MerkleNode {
                hash,
                payload: Some(digest),
                left,
                right,
                parent: None,
            }
        };
        slots[id.index()] = Some(nodes.len());
        nodes.push(merkle_node);
    }

    MerkleTree::from_parts(nodes, leaves, converted(&slots, root))
        .map_err(TreeError::InvalidStructure)
}

#[inline(always)]
fn converted(slots: &[Option<usize>], id: NodeId) -> usize {
    slots[id.index()].expect("post-order emits children first")
}

/// Mirrors a Merkle tree as a binary tree keyed by hex-encoded node hashes.
///
/// Each binary node stores the raw digest as its value. A node paired with itself during
/// construction shows up as two identical children. The result keeps the Merkle shape and is
/// not ordered: [`BinaryTree::verify_invariant`] will generally return `false` and key lookups
/// are meaningless.
pub fn merkle_to_binary<H>(tree: &MerkleTree<H>) -> BinaryTree<String, HashOf<H>>
where
    H: Digest + Clone,
{
    let mut bst = BinaryTree::new();
    let mut stack: Vec<(usize, Option<(NodeId, Direction)>)> = vec![(tree.root(), None)];
    let nodes = tree.nodes();
    while let Some((idx, parent)) = stack.pop() {
        let node = &nodes[idx];
        let id = bst.attach(parent, hex::encode(&node.hash), Some(node.hash.clone()));
        if let Some(right) = node.right {
            stack.push((right, Some((id, Direction::Right))));
        }
        if let Some(left) = node.left {
            stack.push((left, Some((id, Direction::Left))));
        }
    }
    bst
}

/// Returns `true` when the root's left and right subtrees are mirror images in shape.
///
/// Keys are not compared. An empty tree is symmetric.
pub fn check_symmetry<K, V>(bst: &BinaryTree<K, V>) -> bool {
    let Some(root) = bst.root() else {
        return true;
    };
    let root = bst.node_ref(root);
    let mut stack = vec![(root.left(), root.right())];
    while let Some(pair) = stack.pop() {
        match pair {
            (None, None) => {}
            (Some(a), Some(b)) => {
                let (a, b) = (bst.node_ref(a), bst.node_ref(b));
                stack.push((a.left(), b.right()));
                stack.push((a.right(), b.left()));
            }
            _ => return false,
        }
    }
    true
}

/// Returns `true` when `candidate` occurs somewhere in `main` with identical shape, keys and
/// values.
///
/// Every node of `main` is tried as an anchor, so the cost is `O(n * m)`. An empty candidate is
/// present in every tree.
pub fn check_subtree_presence<K, V>(main: &BinaryTree<K, V>, candidate: &BinaryTree<K, V>) -> bool
where
    K: PartialEq,
    V: PartialEq,
{
    let Some(candidate_root) = candidate.root() else {
        return true;
    };
    main.ids(TraversalOrder::PreOrder)
        .any(|anchor| same_subtree(main, anchor, candidate, candidate_root))
}

fn same_subtree<K, V>(
    a: &BinaryTree<K, V>,
    a_root: NodeId,
    b: &BinaryTree<K, V>,
    b_root: NodeId,
) -> bool
where
    K: PartialEq,
    V: PartialEq,
{
    let mut stack = vec![(Some(a_root), Some(b_root))];
    while let Some(pair) = stack.pop() {
        match pair {
            (None, None) => {}
            (Some(x), Some(y)) => {
                let (x, y) = (a.node_ref(x), b.node_ref(y));
                if x.key() != y.key() || x.value() != y.value() {
                    return false;
                }
                stack.push((x.left(), y.left()));
                stack.push((x.right(), y.right()));
            }
            _ => return false,
        }
    }
    true
}
