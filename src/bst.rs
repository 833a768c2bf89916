//! Arena-backed binary search tree.
//!
//! Nodes live in a single `Vec` and refer to each other through [`NodeId`] indices, so parent
//! links never form ownership cycles. Removed slots are recycled through a free list.

use core::cmp::Ordering;
use core::mem;
use log::debug;

use crate::error::{Result, TreeError};

/// Index of a node inside a [`BinaryTree`] arena.
///
/// Ids stay valid until the node is removed or the tree is rebalanced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in the arena.
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Depth-first visiting order for [`BinaryTree::traverse`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraversalOrder {
    /// Left subtree, node, right subtree. Yields keys in ascending order on a valid tree.
    InOrder,
    /// Node, left subtree, right subtree.
    PreOrder,
    /// Left subtree, right subtree, node.
    PostOrder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Direction {
    Left,
    Right,
}

/// A node of a [`BinaryTree`].
#[derive(Clone, Debug)]
pub struct BinaryTreeNode<K, V> {
    key: K,
    value: Option<V>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    parent: Option<NodeId>,
}

impl<K, V> BinaryTreeNode<K, V> {
    /// Ordering key of the node.
    #[inline(always)]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Satellite value, if one was stored with the key.
    #[inline(always)]
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Left child id.
    #[inline(always)]
    pub fn left(&self) -> Option<NodeId> {
        self.left
    }

    /// Right child id.
    #[inline(always)]
    pub fn right(&self) -> Option<NodeId> {
        self.right
    }

    /// Parent id; `None` for the root.
    #[inline(always)]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Returns `true` when the node has no children.
    #[inline(always)]
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Binary search tree keyed by `K` with optional satellite values `V`.
///
/// Every key in a node's left subtree compares less than the node's key and every key in its
/// right subtree compares greater; duplicates are rejected.
///
/// # Examples
///
/// ```
/// use bmtree::{BinaryTree, TreeError};
///
/// let mut tree = BinaryTree::<u32>::new();
/// for key in [5, 3, 8, 1, 4] {
///     tree.insert(key).unwrap();
/// }
///
/// assert_eq!(*tree.find(&4).unwrap().key(), 4);
/// assert!(matches!(tree.find(&9), Err(TreeError::NotFound)));
/// assert!(matches!(tree.insert(3), Err(TreeError::DuplicateKey)));
/// ```
#[derive(Clone, Debug)]
pub struct BinaryTree<K, V = ()> {
    nodes: Vec<Option<BinaryTreeNode<K, V>>>,
    free: Vec<usize>,
    root: Option<NodeId>,
    size: usize,
}

impl<K, V> BinaryTree<K, V> {
    /// Creates an empty tree.
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            size: 0,
        }
    }

    /// Returns the number of keys stored in the tree.
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.size
    }

    /// Returns whether the tree contains no keys.
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Id of the root node.
    #[inline(always)]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Returns the node stored under `id`, if it is still live.
    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&BinaryTreeNode<K, V>> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Lazily walks the tree depth-first in the requested order.
    ///
    /// The iterator borrows the tree, so the walk always observes a fixed snapshot. Calling
    /// `traverse` again restarts from the root.
    pub fn traverse(&self, order: TraversalOrder) -> Traverse<'_, K, V> {
        Traverse {
            tree: self,
            walk: IdWalk::new(self.root, order),
        }
    }

    /// Keys in ascending order (for a tree that satisfies the ordering invariant).
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.traverse(TraversalOrder::InOrder).map(BinaryTreeNode::key)
    }

    /// Number of nodes on the longest root-to-leaf path; zero for an empty tree.
    pub fn height(&self) -> usize {
        let mut max_depth = 0;
        let mut stack: Vec<(NodeId, usize)> = self.root.map(|id| (id, 1)).into_iter().collect();
        while let Some((id, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            let node = self.node_ref(id);
            for child in [node.left, node.right].into_iter().flatten() {
                stack.push((child, depth + 1));
            }
        }
        max_depth
    }

    /// Rebuilds the tree into a height-balanced shape.
    ///
    /// Keys are flattened in order, then re-attached by repeatedly choosing the middle element
    /// of each range as the subtree root. This is a full rebuild; previously handed out
    /// [`NodeId`]s are invalidated.
    pub fn balance(&mut self) {
        let order: Vec<NodeId> = self.ids(TraversalOrder::InOrder).collect();
        let mut entries: Vec<Option<(K, Option<V>)>> = order
            .into_iter()
            .map(|id| {
                let node = self.nodes[id.0]
                    .take()
                    .expect("in-order walk yields live nodes");
                Some((node.key, node.value))
            })
            .collect();
        self.clear();
        self.nodes.reserve(entries.len());

        let mut work: Vec<(usize, usize, Option<(NodeId, Direction)>)> =
            vec![(0, entries.len(), None)];
        while let Some((lo, hi, parent)) = work.pop() {
            if lo >= hi {
                continue;
            }
            let mid = lo + (hi - lo) / 2;
            let (key, value) = entries[mid]
                .take()
                .expect("each entry is attached exactly once");
            let id = self.attach(parent, key, value);
            work.push((mid + 1, hi, Some((id, Direction::Right))));
            work.push((lo, mid, Some((id, Direction::Left))));
        }
        debug!(
            "balanced binary tree: {} nodes, height {}",
            self.size,
            self.height()
        );
    }

    /// Removes every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
        self.size = 0;
    }

    /// Attaches a new node without comparing keys.
    ///
    /// With `parent == None` the node becomes the root. The caller is responsible for the
    /// chosen slot being empty.
    pub(crate) fn attach(
        &mut self,
        parent: Option<(NodeId, Direction)>,
        key: K,
        value: Option<V>,
    ) -> NodeId {
        let node = BinaryTreeNode {
            key,
            value,
            left: None,
            right: None,
            parent: parent.map(|(id, _)| id),
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };
        match parent {
            Some((parent_id, Direction::Left)) => self.node_mut(parent_id).left = Some(id),
            Some((parent_id, Direction::Right)) => self.node_mut(parent_id).right = Some(id),
            None => self.root = Some(id),
        }
        self.size += 1;
        id
    }

    /// Node ids in the requested depth-first order.
    pub(crate) fn ids(&self, order: TraversalOrder) -> impl Iterator<Item = NodeId> + '_ {
        let mut walk = IdWalk::new(self.root, order);
        core::iter::from_fn(move || walk.next_id(self))
    }

    /// Number of arena slots, live or free.
    #[inline(always)]
    pub(crate) fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    #[inline(always)]
    pub(crate) fn node_ref(&self, id: NodeId) -> &BinaryTreeNode<K, V> {
        self.nodes[id.0].as_ref().expect("node id refers to a live slot")
    }

    #[inline(always)]
    fn node_mut(&mut self, id: NodeId) -> &mut BinaryTreeNode<K, V> {
        self.nodes[id.0].as_mut().expect("node id refers to a live slot")
    }

    /// Unlinks a node that has at most one child, splicing the child into its place.
    fn detach(&mut self, id: NodeId) -> BinaryTreeNode<K, V> {
        let (child, parent) = {
            let node = self.node_ref(id);
            debug_assert!(node.left.is_none() || node.right.is_none());
            (node.left.or(node.right), node.parent)
        };
        if let Some(child) = child {
            self.node_mut(child).parent = parent;
        }
        match parent {
            Some(parent_id) => {
                let parent_node = self.node_mut(parent_id);
                if parent_node.left == Some(id) {
                    parent_node.left = child;
                } else {
                    parent_node.right = child;
                }
            }
            None => self.root = child,
        }
        self.size -= 1;
        self.free.push(id.0);
        self.nodes[id.0].take().expect("detached node was live")
    }
}

impl<K: Ord, V> BinaryTree<K, V> {
    /// Inserts a key without a satellite value.
    ///
    /// Fails with [`TreeError::DuplicateKey`] when the key is already present.
    #[inline]
    pub fn insert(&mut self, key: K) -> Result<NodeId> {
        self.insert_entry(key, None)
    }

    /// Inserts a key together with an optional satellite value.
    pub fn insert_entry(&mut self, key: K, value: Option<V>) -> Result<NodeId> {
        let mut parent = None;
        let mut current = self.root;
        while let Some(id) = current {
            let node = self.node_ref(id);
            match key.cmp(&node.key) {
                Ordering::Less => {
                    parent = Some((id, Direction::Left));
                    current = node.left;
                }
                Ordering::Greater => {
                    parent = Some((id, Direction::Right));
                    current = node.right;
                }
                Ordering::Equal => return Err(TreeError::DuplicateKey),
            }
        }
        Ok(self.attach(parent, key, value))
    }

    /// Looks up the node holding `key`.
    pub fn find(&self, key: &K) -> Result<&BinaryTreeNode<K, V>> {
        self.locate(key)
            .map(|id| self.node_ref(id))
            .ok_or(TreeError::NotFound)
    }

    /// Returns `true` if the key exists in the tree.
    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.locate(key).is_some()
    }

    /// Removes `key` and returns the satellite value that was stored with it.
    ///
    /// A node with two children takes over the key and value of its in-order successor, which
    /// is then unlinked from the right subtree.
    pub fn remove(&mut self, key: &K) -> Result<Option<V>> {
        let id = self.locate(key).ok_or(TreeError::NotFound)?;
        let (left, right) = {
            let node = self.node_ref(id);
            (node.left, node.right)
        };
        match (left, right) {
            (Some(_), Some(right)) => {
                let successor = self.leftmost(right);
                let successor = self.detach(successor);
                let node = self.node_mut(id);
                node.key = successor.key;
                Ok(mem::replace(&mut node.value, successor.value))
            }
            _ => Ok(self.detach(id).value),
        }
    }

    /// Checks the ordering invariant and parent links of every reachable node.
    pub fn verify_invariant(&self) -> bool {
        let Some(root) = self.root else {
            return self.size == 0;
        };
        if self.node_ref(root).parent.is_some() {
            return false;
        }

        let mut visited = 0usize;
        let mut stack: Vec<(NodeId, Option<&K>, Option<&K>)> = vec![(root, None, None)];
        while let Some((id, lower, upper)) = stack.pop() {
            visited += 1;
            let node = self.node_ref(id);
            if lower.is_some_and(|min| node.key <= *min) || upper.is_some_and(|max| node.key >= *max)
            {
                return false;
            }
            if let Some(left) = node.left {
                if self.node_ref(left).parent != Some(id) {
                    return false;
                }
                stack.push((left, lower, Some(&node.key)));
            }
            if let Some(right) = node.right {
                if self.node_ref(right).parent != Some(id) {
                    return false;
                }
                stack.push((right, Some(&node.key), upper));
            }
        }
        visited == self.size
    }

    fn locate(&self, key: &K) -> Option<NodeId> {
        let mut current = self.root;
        while let Some(id) = current {
            let node = self.node_ref(id);
            match key.cmp(&node.key) {
                Ordering::Less => current = node.left,
                Ordering::Greater => current = node.right,
                Ordering::Equal => return Some(id),
            }
        }
        None
    }

    fn leftmost(&self, mut id: NodeId) -> NodeId {
        while let Some(left) = self.node_ref(id).left {
            id = left;
        }
        id
    }
}

impl<K, V> Default for BinaryTree<K, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy depth-first iterator returned by [`BinaryTree::traverse`].
pub struct Traverse<'a, K, V> {
    tree: &'a BinaryTree<K, V>,
    walk: IdWalk,
}

impl<'a, K, V> Iterator for Traverse<'a, K, V> {
    type Item = &'a BinaryTreeNode<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        self.walk.next_id(tree).map(|id| tree.node_ref(id))
    }
}

struct IdWalk {
    order: TraversalOrder,
    // (node, children already scheduled)
    stack: Vec<(NodeId, bool)>,
}

impl IdWalk {
    fn new(root: Option<NodeId>, order: TraversalOrder) -> Self {
        Self {
            order,
            stack: root.map(|id| (id, false)).into_iter().collect(),
        }
    }

    fn next_id<K, V>(&mut self, tree: &BinaryTree<K, V>) -> Option<NodeId> {
        while let Some((id, expanded)) = self.stack.pop() {
            if expanded {
                return Some(id);
            }
            let node = tree.node_ref(id);
            match self.order {
                TraversalOrder::PreOrder => {
                    self.push_child(node.right);
                    self.push_child(node.left);
                    return Some(id);
                }
                TraversalOrder::InOrder => {
                    self.push_child(node.right);
                    self.stack.push((id, true));
                    self.push_child(node.left);
                }
                TraversalOrder::PostOrder => {
                    self.stack.push((id, true));
                    self.push_child(node.right);
                    self.push_child(node.left);
                }
            }
        }
        None
    }

    #[inline(always)]
    fn push_child(&mut self, child: Option<NodeId>) {
        if let Some(child) = child {
            self.stack.push((child, false));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(keys: &[u32]) -> BinaryTree<u32> {
        let mut tree = BinaryTree::new();
        for key in keys {
            tree.insert(*key).unwrap();
        }
        tree
    }

    fn collect(tree: &BinaryTree<u32>, order: TraversalOrder) -> Vec<u32> {
        tree.traverse(order).map(|node| *node.key()).collect()
    }

    #[test]
    fn insert_and_find() {
        let tree = tree_of(&[5, 3, 8, 1, 4]);
        assert_eq!(tree.len(), 5);
        assert_eq!(*tree.find(&4).unwrap().key(), 4);
        assert!(matches!(tree.find(&9), Err(TreeError::NotFound)));
        assert!(tree.verify_invariant());
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut tree = tree_of(&[5, 3]);
        assert!(matches!(tree.insert(5), Err(TreeError::DuplicateKey)));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn insert_then_find_returns_the_inserted_node() {
        let mut tree = BinaryTree::<String, u64>::new();
        for (i, word) in ["pear", "apple", "quince", "fig"].iter().enumerate() {
            tree.insert_entry(word.to_string(), Some(i as u64)).unwrap();
            let node = tree.find(&word.to_string()).unwrap();
            assert_eq!(node.key().as_str(), *word);
            assert_eq!(node.value(), Some(&(i as u64)));
        }
    }

    #[test]
    fn remove_node_with_two_children_keeps_invariant() {
        let mut tree = tree_of(&[5, 3, 8, 1, 4]);
        assert_eq!(tree.remove(&3).unwrap(), None);
        assert!(tree.verify_invariant());
        assert!(!tree.contains(&3));
        assert_eq!(collect(&tree, TraversalOrder::InOrder), vec![1, 4, 5, 8]);
    }

    #[test]
    fn remove_leaf_and_single_child() {
        let mut tree = tree_of(&[5, 3, 8, 1, 9]);
        tree.remove(&1).unwrap();
        assert_eq!(collect(&tree, TraversalOrder::PreOrder), vec![5, 3, 8, 9]);
        tree.remove(&8).unwrap();
        assert_eq!(collect(&tree, TraversalOrder::PreOrder), vec![5, 3, 9]);
        assert_eq!(tree.node(tree.find_id(&9)).unwrap().parent(), tree.root());
        assert!(tree.verify_invariant());
    }

    #[test]
    fn remove_root_until_empty() {
        let mut tree = tree_of(&[5, 3, 8, 1, 4, 7, 9]);
        while let Some(root) = tree.root() {
            let key = *tree.node(root).unwrap().key();
            tree.remove(&key).unwrap();
            assert!(tree.verify_invariant());
        }
        assert!(tree.is_empty());
        assert!(matches!(tree.remove(&5), Err(TreeError::NotFound)));
    }

    #[test]
    fn remove_returns_value_of_removed_key() {
        let mut tree = BinaryTree::<u32, &str>::new();
        for (key, value) in [(5, "five"), (3, "three"), (8, "eight"), (7, "seven")] {
            tree.insert_entry(key, Some(value)).unwrap();
        }
        assert_eq!(tree.remove(&5).unwrap(), Some("five"));
        assert_eq!(tree.find(&7).unwrap().value(), Some(&"seven"));
        assert!(tree.verify_invariant());
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut tree = tree_of(&[5, 3, 8]);
        tree.remove(&3).unwrap();
        let id = tree.insert(2).unwrap();
        assert_eq!(id.index(), 1);
        assert!(tree.verify_invariant());
    }

    #[test]
    fn traversal_orders() {
        let tree = tree_of(&[5, 3, 8, 1, 4]);
        assert_eq!(collect(&tree, TraversalOrder::InOrder), vec![1, 3, 4, 5, 8]);
        assert_eq!(collect(&tree, TraversalOrder::PreOrder), vec![5, 3, 1, 4, 8]);
        assert_eq!(collect(&tree, TraversalOrder::PostOrder), vec![1, 4, 3, 8, 5]);
        // restartable
        assert_eq!(collect(&tree, TraversalOrder::InOrder), vec![1, 3, 4, 5, 8]);
        assert_eq!(BinaryTree::<u32>::new().traverse(TraversalOrder::InOrder).count(), 0);
    }

    #[test]
    fn balance_degenerate_chain() {
        let keys: Vec<u32> = (0..127).collect();
        let mut tree = tree_of(&keys);
        assert_eq!(tree.height(), 127);
        tree.balance();
        assert_eq!(tree.height(), 7);
        assert_eq!(tree.len(), 127);
        assert!(tree.verify_invariant());
        assert_eq!(tree.keys().copied().collect::<Vec<_>>(), keys);
    }

    #[test]
    fn balance_is_idempotent() {
        let mut tree = tree_of(&[10, 9, 8, 7, 6, 5, 4, 3, 2, 1]);
        tree.balance();
        let first = collect(&tree, TraversalOrder::PreOrder);
        tree.balance();
        assert_eq!(collect(&tree, TraversalOrder::PreOrder), first);
    }

    #[test]
    fn invariant_holds_under_mixed_workload() {
        let mut tree = BinaryTree::<u64>::new();
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let mut present = Vec::new();
        for step in 0..2_000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let key = state % 512;
            if step % 3 == 2 && !present.is_empty() {
                let victim = present.swap_remove((state as usize) % present.len());
                tree.remove(&victim).unwrap();
            } else if tree.insert(key).is_ok() {
                present.push(key);
            }
            assert_eq!(tree.len(), present.len());
        }
        assert!(tree.verify_invariant());
    }

    #[test]
    fn verify_invariant_detects_broken_order() {
        let mut tree = BinaryTree::<u32>::new();
        let root = tree.attach(None, 5, None);
        tree.attach(Some((root, Direction::Left)), 9, None);
        assert!(!tree.verify_invariant());
    }

    impl BinaryTree<u32> {
        fn find_id(&self, key: &u32) -> NodeId {
            self.locate(key).unwrap()
        }
    }
}
