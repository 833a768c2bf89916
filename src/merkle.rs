//! Arena-backed Merkle tree built bottom-up from an ordered leaf sequence.

use core::fmt;
use log::{debug, trace};
use sha2::{Digest, Sha256};

use crate::error::{Result, TreeError};
use crate::hash::{HashOf, hash, hash_pair, hash_with_payload, zero_hash};
use crate::proof::{MerkleProof, ProofStep, Side};
use std::collections::BTreeSet;

/// A node of a [`MerkleTree`].
///
/// Internal nodes built from leaves satisfy `hash == H(left.hash || right.hash)`. Nodes that
/// carry a [`payload`](MerkleNode::payload) (trees converted from a binary tree) satisfy
/// `hash == H(payload || left.hash || right.hash)` with absent children omitted.
#[derive(Clone)]
pub struct MerkleNode<H>
where
    H: Digest + Clone,
{
    pub(crate) hash: HashOf<H>,
    pub(crate) payload: Option<HashOf<H>>,
    pub(crate) left: Option<usize>,
    pub(crate) right: Option<usize>,
    pub(crate) parent: Option<usize>,
}

impl<H> MerkleNode<H>
where
    H: Digest + Clone,
{
    #[inline(always)]
    pub(crate) fn leaf(hash: HashOf<H>) -> Self {
        Self {
            hash,
            payload: None,
            left: None,
            right: None,
            parent: None,
        }
    }

    /// Digest stored at this node.
    #[inline(always)]
    pub fn hash(&self) -> &HashOf<H> {
        &self.hash
    }

    /// Data digest committed by the node itself, if any.
    #[inline(always)]
    pub fn payload(&self) -> Option<&HashOf<H>> {
        self.payload.as_ref()
    }

    /// Arena index of the left child.
    #[inline(always)]
    pub fn left(&self) -> Option<usize> {
        self.left
    }

    /// Arena index of the right child.
    #[inline(always)]
    pub fn right(&self) -> Option<usize> {
        self.right
    }

    /// Arena index of the parent; `None` for the root.
    #[inline(always)]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Returns `true` when the node has no children.
    #[inline(always)]
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// Recomputes what this node's hash must be from its children and payload.
    ///
    /// Returns `None` for leaves, whose hash comes straight from input data.
    pub(crate) fn expected_hash(&self, nodes: &[MerkleNode<H>]) -> Option<HashOf<H>> {
        let left = self.left.map(|idx| &nodes[idx].hash);
        let right = self.right.map(|idx| &nodes[idx].hash);
        match (&self.payload, left, right) {
            (Some(payload), left, right) => Some(hash_with_payload::<H>(payload, left, right)),
            (None, Some(left), Some(right)) => Some(hash_pair::<H>(left, right)),
            (None, None, None) => None,
            // a bare node with one child has no defined hash; force a mismatch
            (None, _, _) => Some(zero_hash::<H>()),
        }
    }
}

impl<H> fmt::Debug for MerkleNode<H>
where
    H: Digest + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerkleNode")
            .field("hash", &hex::encode(&self.hash))
            .field("payload", &self.payload.as_ref().map(hex::encode))
            .field("left", &self.left)
            .field("right", &self.right)
            .field("parent", &self.parent)
            .finish()
    }
}

/// Merkle tree over an ordered sequence of leaf hashes.
///
/// Construction pairs adjacent nodes level by level with `H(left || right)`. When a level has
/// an odd number of nodes, the last node is paired with itself. Every mutation rebuilds the
/// tree from its leaf sequence and either completes or leaves the tree untouched.
///
/// ```text
///         root = H(h12 || h34)
///        /                    \
///  h12 = H(h1 || h2)     h34 = H(h3 || h4)
///   /         \            /         \
/// h1=H(a)  h2=H(b)      h3=H(c)   h4=H(d)
/// ```
///
/// # Examples
///
/// ```
/// use bmtree::MerkleTree;
/// use bmtree::hash::{hash, hash_pair};
/// use sha2::Sha256;
///
/// let tree = MerkleTree::<Sha256>::from_data(["a", "b", "c", "d"]).unwrap();
/// let h = |s: &str| hash::<Sha256>(s.as_bytes());
/// let expected = hash_pair::<Sha256>(
///     &hash_pair::<Sha256>(&h("a"), &h("b")),
///     &hash_pair::<Sha256>(&h("c"), &h("d")),
/// );
/// assert_eq!(tree.root_hash(), expected);
///
/// let proof = tree.generate_proof(2).unwrap();
/// assert!(MerkleTree::<Sha256>::verify_proof(&tree.root_hash(), &h("c"), &proof));
/// ```
#[derive(Clone)]
pub struct MerkleTree<H = Sha256>
where
    H: Digest + Clone,
{
    nodes: Vec<MerkleNode<H>>,
    leaves: Vec<usize>,
    root: usize,
}

impl<H> MerkleTree<H>
where
    H: Digest + Clone,
{
    /// Builds a tree whose leaves are `H(item)` for each input item.
    ///
    /// Fails with [`TreeError::EmptyInput`] when `items` is empty.
    pub fn from_data<I, D>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = D>,
        D: AsRef<[u8]>,
    {
        Self::from_leaf_hashes(
            items
                .into_iter()
                .map(|item| hash::<H>(item.as_ref()))
                .collect(),
        )
    }

    /// Builds a tree over already-hashed leaves.
    pub fn from_leaf_hashes(leaf_hashes: Vec<HashOf<H>>) -> Result<Self> {
        if leaf_hashes.is_empty() {
            return Err(TreeError::EmptyInput);
        }

        let leaf_count = leaf_hashes.len();
        let mut nodes: Vec<MerkleNode<H>> = Vec::with_capacity(2 * leaf_count);
        nodes.extend(leaf_hashes.into_iter().map(MerkleNode::leaf));
        let leaves: Vec<usize> = (0..leaf_count).collect();

        let mut level = leaves.clone();
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(left);
                let hash = hash_pair::<H>(&nodes[left].hash, &nodes[right].hash);
                let parent = nodes.len();
                nodes.push(MerkleNode {
                    hash,
                    payload: None,
                    left: Some(left),
                    right: Some(right),
                    parent: None,
                });
                nodes[left].parent = Some(parent);
                nodes[right].parent = Some(parent);
                next.push(parent);
            }
            level = next;
        }

        let root = level[0];
        debug!(
            "built merkle tree: {} leaves, {} nodes",
            leaf_count,
            nodes.len()
        );
        Ok(Self {
            nodes,
            leaves,
            root,
        })
    }

    /// Assembles a tree from an explicit arena, deriving parent links from child links.
    ///
    /// Rejects out-of-range indices, shared children, unreachable nodes, a leaf list that is not
    /// exactly the tree's leaves from left to right, and any internal node whose stored hash
    /// disagrees with its children.
    pub(crate) fn from_parts(
        mut nodes: Vec<MerkleNode<H>>,
        leaves: Vec<usize>,
        root: usize,
    ) -> core::result::Result<Self, String> {
        if leaves.is_empty() {
            return Err("no leaves".into());
        }
        if root >= nodes.len() {
            return Err(format!("root {root} outside arena of {}", nodes.len()));
        }
        for node in nodes.iter_mut() {
            node.parent = None;
        }
        for idx in 0..nodes.len() {
            let (left, right) = (nodes[idx].left, nodes[idx].right);
            for child in [left, right].into_iter().flatten() {
                if child >= nodes.len() || child == idx {
                    return Err(format!("node {idx} has invalid child {child}"));
                }
                match nodes[child].parent {
                    Some(parent) if parent != idx => {
                        return Err(format!("node {child} has two parents"));
                    }
                    _ => nodes[child].parent = Some(idx),
                }
            }
        }
        if nodes[root].parent.is_some() {
            return Err("root has a parent".into());
        }
        let (reachable, ordered) = Self::walk_leaves(&nodes, root);
        if reachable != nodes.len() {
            return Err(format!(
                "{} of {} nodes unreachable from the root",
                nodes.len() - reachable,
                nodes.len()
            ));
        }
        if leaves != ordered {
            return Err("leaf ids do not match the tree's leaves in order".into());
        }
        for (idx, node) in nodes.iter().enumerate() {
            if let Some(expected) = node.expected_hash(&nodes) {
                if expected != node.hash {
                    return Err(format!("hash mismatch at node {idx}"));
                }
            }
        }
        Ok(Self {
            nodes,
            leaves,
            root,
        })
    }

    /// Counts nodes reachable from `root` and lists its leaves left to right.
    ///
    /// A self-paired child is visited once. Expects parent links to already form a tree.
    fn walk_leaves(nodes: &[MerkleNode<H>], root: usize) -> (usize, Vec<usize>) {
        let mut reachable = 0;
        let mut ordered = Vec::new();
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            reachable += 1;
            let node = &nodes[idx];
            if node.is_leaf() {
                ordered.push(idx);
                continue;
            }
            if node.right != node.left {
                stack.extend(node.right);
            }
            stack.extend(node.left);
        }
        (reachable, ordered)
    }

    /// Current root digest. A pure function of the leaf sequence for trees built from leaves.
    #[inline(always)]
    pub fn root_hash(&self) -> HashOf<H> {
        self.nodes[self.root].hash.clone()
    }

    /// Arena index of the root node.
    #[inline(always)]
    pub fn root(&self) -> usize {
        self.root
    }

    /// Returns the node at arena index `idx`.
    #[inline]
    pub fn node(&self, idx: usize) -> Option<&MerkleNode<H>> {
        self.nodes.get(idx)
    }

    /// All nodes in arena order.
    #[inline(always)]
    pub fn nodes(&self) -> &[MerkleNode<H>] {
        &self.nodes
    }

    /// Arena indices of the leaves, in leaf order.
    #[inline(always)]
    pub(crate) fn leaf_ids(&self) -> &[usize] {
        &self.leaves
    }

    /// Number of leaves.
    #[inline(always)]
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Leaf hashes in order.
    pub fn leaves(&self) -> impl ExactSizeIterator<Item = &HashOf<H>> + '_ {
        self.leaves.iter().map(|&idx| &self.nodes[idx].hash)
    }

    /// Hash of the leaf at `index`.
    pub fn leaf(&self, index: usize) -> Result<&HashOf<H>> {
        self.leaves
            .get(index)
            .map(|&idx| &self.nodes[idx].hash)
            .ok_or(TreeError::IndexOutOfRange {
                index,
                len: self.leaves.len(),
            })
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(self.root, 1usize)];
        while let Some((idx, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            let node = &self.nodes[idx];
            if node.left == node.right {
                // self-paired node: one subtree is enough
                stack.extend(node.left.map(|child| (child, depth + 1)));
                continue;
            }
            for child in [node.left, node.right].into_iter().flatten() {
                stack.push((child, depth + 1));
            }
        }
        max_depth
    }

    /// Appends `H(data)` as a new leaf and rebuilds.
    #[inline]
    pub fn add_leaf<D: AsRef<[u8]>>(&mut self, data: D) {
        self.add_leaf_hash(hash::<H>(data.as_ref()));
    }

    /// Appends an already-hashed leaf and rebuilds.
    pub fn add_leaf_hash(&mut self, leaf_hash: HashOf<H>) {
        let mut hashes = self.leaf_hashes();
        hashes.push(leaf_hash);
        *self = Self::from_non_empty(hashes);
    }

    /// Removes the leaf at `index`, rebuilds, and returns the removed leaf hash.
    ///
    /// Removing the only leaf fails with [`TreeError::EmptyInput`].
    pub fn remove_leaf(&mut self, index: usize) -> Result<HashOf<H>> {
        self.check_index(index)?;
        let mut hashes = self.leaf_hashes();
        let removed = hashes.remove(index);
        *self = Self::from_leaf_hashes(hashes)?;
        Ok(removed)
    }

    /// Replaces the leaf at `index` with `H(data)` and rebuilds.
    #[inline]
    pub fn update_leaf<D: AsRef<[u8]>>(&mut self, index: usize, data: D) -> Result<()> {
        self.update_leaf_hash(index, hash::<H>(data.as_ref()))
    }

    /// Replaces the leaf at `index` with an already-hashed value and rebuilds.
    pub fn update_leaf_hash(&mut self, index: usize, leaf_hash: HashOf<H>) -> Result<()> {
        self.check_index(index)?;
        let mut hashes = self.leaf_hashes();
        hashes[index] = leaf_hash;
        *self = Self::from_non_empty(hashes);
        Ok(())
    }

    /// Generates an inclusion proof for the leaf at `index`.
    pub fn generate_proof(&self, index: usize) -> Result<MerkleProof<H>> {
        self.check_index(index)?;
        let mut steps = Vec::new();
        let mut current = self.leaves[index];
        while let Some(parent) = self.nodes[current].parent {
            let node = &self.nodes[parent];
            let step = if node.left == Some(current) {
                ProofStep {
                    sibling: node.right.map(|idx| self.nodes[idx].hash.clone()),
                    side: Side::Right,
                    payload: node.payload.clone(),
                }
            } else {
                ProofStep {
                    sibling: node.left.map(|idx| self.nodes[idx].hash.clone()),
                    side: Side::Left,
                    payload: node.payload.clone(),
                }
            };
            steps.push(step);
            current = parent;
        }
        trace!("generated proof for leaf {index}: {} steps", steps.len());
        Ok(MerkleProof {
            leaf_index: index,
            steps,
        })
    }

    /// Generates an inclusion proof for the first leaf whose hash equals `leaf_hash`.
    ///
    /// Fails with [`TreeError::NotFound`] when no leaf matches.
    pub fn generate_proof_for_hash(&self, leaf_hash: &HashOf<H>) -> Result<MerkleProof<H>> {
        let index = self
            .leaves()
            .position(|candidate| candidate == leaf_hash)
            .ok_or(TreeError::NotFound)?;
        self.generate_proof(index)
    }

    /// Checks that `proof` links `leaf_hash` to `root_hash`.
    #[inline]
    pub fn verify_proof(
        root_hash: &HashOf<H>,
        leaf_hash: &HashOf<H>,
        proof: &MerkleProof<H>,
    ) -> bool {
        proof.verify(leaf_hash, root_hash)
    }

    /// Pads the leaf sequence with a zero-hash placeholder leaf until its length is even, then
    /// rebuilds.
    ///
    /// The placeholder becomes an ordinary leaf, so it is counted by [`leaf_count`] and can be
    /// proven like any other leaf. Applying `balance` twice is the same as applying it once.
    ///
    /// [`leaf_count`]: MerkleTree::leaf_count
    pub fn balance(&mut self) {
        let mut hashes = self.leaf_hashes();
        if hashes.len() % 2 == 1 {
            hashes.push(zero_hash::<H>());
        }
        debug!("balancing merkle tree to {} leaves", hashes.len());
        *self = Self::from_non_empty(hashes);
    }

    /// Joins two trees under a new root `H(a.root || b.root)`.
    ///
    /// Both trees keep their shape, so the result is generally unbalanced. Its leaf sequence is
    /// `a`'s leaves followed by `b`'s; a later mutation rebuilds it over that sequence.
    pub fn merge(a: &Self, b: &Self) -> Self {
        let offset = a.nodes.len();
        let mut nodes = Vec::with_capacity(a.nodes.len() + b.nodes.len() + 1);
        nodes.extend(a.nodes.iter().cloned());
        nodes.extend(b.nodes.iter().map(|node| MerkleNode {
            hash: node.hash.clone(),
            payload: node.payload.clone(),
            left: node.left.map(|idx| idx + offset),
            right: node.right.map(|idx| idx + offset),
            parent: node.parent.map(|idx| idx + offset),
        }));

        let (left, right) = (a.root, b.root + offset);
        let root = nodes.len();
        nodes.push(MerkleNode {
            hash: hash_pair::<H>(&nodes[left].hash, &nodes[right].hash),
            payload: None,
            left: Some(left),
            right: Some(right),
            parent: None,
        });
        nodes[left].parent = Some(root);
        nodes[right].parent = Some(root);

        let leaves = a
            .leaves
            .iter()
            .copied()
            .chain(b.leaves.iter().map(|idx| idx + offset))
            .collect::<Vec<_>>();
        debug!(
            "merged merkle trees: {} + {} leaves",
            a.leaf_count(),
            b.leaf_count()
        );
        Self {
            nodes,
            leaves,
            root,
        }
    }

    /// Structural equality: same shape and same hash at every position.
    ///
    /// Stops at the first mismatch.
    pub fn compare(a: &Self, b: &Self) -> bool {
        let mut stack = vec![(a.root, b.root)];
        while let Some((x, y)) = stack.pop() {
            let (nx, ny) = (&a.nodes[x], &b.nodes[y]);
            if nx.hash != ny.hash || nx.payload != ny.payload {
                return false;
            }
            for pair in [(nx.left, ny.left), (nx.right, ny.right)] {
                match pair {
                    (Some(cx), Some(cy)) => stack.push((cx, cy)),
                    (None, None) => {}
                    _ => return false,
                }
            }
        }
        true
    }

    /// Hashes that appear at the same position in both trees.
    ///
    /// Both trees are walked in lockstep from the root, so a hash shared at different positions
    /// is not reported.
    pub fn intersect(a: &Self, b: &Self) -> BTreeSet<HashOf<H>> {
        let mut shared = BTreeSet::new();
        let mut stack = vec![(a.root, b.root)];
        while let Some((x, y)) = stack.pop() {
            let (nx, ny) = (&a.nodes[x], &b.nodes[y]);
            if nx.hash == ny.hash {
                shared.insert(nx.hash.clone());
            }
            if let (Some(cx), Some(cy)) = (nx.left, ny.left) {
                stack.push((cx, cy));
            }
            if nx.left == nx.right && ny.left == ny.right {
                continue;
            }
            if let (Some(cx), Some(cy)) = (nx.right, ny.right) {
                stack.push((cx, cy));
            }
        }
        shared
    }

    /// Leaf positions whose hashes differ between `a` and `b`.
    ///
    /// Positions present in only one tree are reported as differing.
    pub fn diff(a: &Self, b: &Self) -> Vec<usize> {
        let len = a.leaf_count().max(b.leaf_count());
        let mut left = a.leaves();
        let mut right = b.leaves();
        (0..len)
            .filter(|_| match (left.next(), right.next()) {
                (Some(x), Some(y)) => x != y,
                _ => true,
            })
            .collect()
    }

    #[inline]
    fn leaf_hashes(&self) -> Vec<HashOf<H>> {
        self.leaves().cloned().collect()
    }

    #[inline]
    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.leaves.len() {
            Ok(())
        } else {
            Err(TreeError::IndexOutOfRange {
                index,
                len: self.leaves.len(),
            })
        }
    }

    fn from_non_empty(hashes: Vec<HashOf<H>>) -> Self {
        Self::from_leaf_hashes(hashes).expect("leaf sequence is non-empty")
    }
}

impl<H> fmt::Debug for MerkleTree<H>
where
    H: Digest + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerkleTree")
            .field("root", &hex::encode(self.root_hash()))
            .field("leaves", &self.leaf_count())
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
