use std::cmp::Ordering;
use std::fmt::Debug;

use crate::error::TreeError;

/// Index into the tree's node arena.
type NodeId = usize;

/// Internal (non-leaf) node: separator keys plus one more child than key.
#[derive(Debug)]
struct InternalNode<K> {
    keys: Vec<K>,
    children: Vec<NodeId>,
}

impl<K> InternalNode<K> {
    fn new() -> Self {
        Self {
            keys: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Leaf node: parallel key/value sequences, chained to the next leaf.
#[derive(Debug)]
struct LeafNode<K, V> {
    keys: Vec<K>,
    values: Vec<V>,
    next: Option<NodeId>,
}

impl<K, V> LeafNode<K, V> {
    fn new() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            next: None,
        }
    }
}

#[derive(Debug)]
enum Node<K, V> {
    Internal(InternalNode<K>),
    Leaf(LeafNode<K, V>),
}

/// In-memory B+ tree.
///
/// All values live in leaf nodes, which are chained left-to-right so that
/// `range_query` can walk them without re-descending the tree for every
/// key. Nodes live in a flat arena (`nodes`); splits allocate a slot (reusing
/// one from `free` if available) and merges/root-collapse return one.
pub struct BPlusTree<K, V> {
    degree: usize,
    min_keys: usize,
    max_keys: usize,
    root: NodeId,
    first_leaf: NodeId,
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<NodeId>,
    len: usize,
}

impl<K: Ord + Clone + Debug, V> BPlusTree<K, V> {
    /// Construct an empty tree with the given branching degree.
    ///
    /// `degree` must be at least 3: a node may hold up to `degree - 1` keys
    /// before it splits, and a degree below 3 can't produce a node with a
    /// well-formed minimum key count.
    pub fn new(degree: usize) -> Result<Self, TreeError> {
        if degree < 3 {
            return Err(TreeError::DegreeTooSmall(degree));
        }
        Ok(Self {
            degree,
            min_keys: degree.div_ceil(2) - 1,
            max_keys: degree - 1,
            root: 0,
            first_leaf: 0,
            nodes: vec![Some(Node::Leaf(LeafNode::new()))],
            free: Vec::new(),
            len: 0,
        })
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // ---- arena plumbing ----------------------------------------------

    fn node(&self, id: NodeId) -> &Node<K, V> {
        self.nodes[id].as_ref().expect("live node id")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<K, V> {
        self.nodes[id].as_mut().expect("live node id")
    }

    fn take_node(&mut self, id: NodeId) -> Node<K, V> {
        self.nodes[id].take().expect("live node id")
    }

    fn put_node(&mut self, id: NodeId, node: Node<K, V>) {
        self.nodes[id] = Some(node);
    }

    fn alloc_node(&mut self, node: Node<K, V>) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id] = Some(node);
            id
        } else {
            let id = self.nodes.len();
            self.nodes.push(Some(node));
            id
        }
    }

    fn free_node(&mut self, id: NodeId) {
        self.nodes[id] = None;
        self.free.push(id);
    }

    fn child_at(&self, id: NodeId, idx: usize) -> NodeId {
        match self.node(id) {
            Node::Internal(n) => n.children[idx],
            Node::Leaf(_) => unreachable!("child_at on a leaf"),
        }
    }

    fn children_len(&self, id: NodeId) -> usize {
        match self.node(id) {
            Node::Internal(n) => n.children.len(),
            Node::Leaf(_) => unreachable!("children_len on a leaf"),
        }
    }

    fn keys_len(&self, id: NodeId) -> usize {
        match self.node(id) {
            Node::Internal(n) => n.keys.len(),
            Node::Leaf(l) => l.keys.len(),
        }
    }

    fn key_at(&self, id: NodeId, idx: usize) -> &K {
        match self.node(id) {
            Node::Internal(n) => &n.keys[idx],
            Node::Leaf(_) => unreachable!("key_at on a leaf"),
        }
    }

    fn set_key(&mut self, id: NodeId, idx: usize, key: K) {
        match self.node_mut(id) {
            Node::Internal(n) => n.keys[idx] = key,
            Node::Leaf(_) => unreachable!("set_key on a leaf"),
        }
    }

    fn remove_key(&mut self, id: NodeId, idx: usize) {
        match self.node_mut(id) {
            Node::Internal(n) => {
                n.keys.remove(idx);
            }
            Node::Leaf(_) => unreachable!("remove_key on a leaf"),
        }
    }

    fn set_child(&mut self, id: NodeId, idx: usize, child: NodeId) {
        match self.node_mut(id) {
            Node::Internal(n) => n.children[idx] = child,
            Node::Leaf(_) => unreachable!("set_child on a leaf"),
        }
    }

    fn remove_child(&mut self, id: NodeId, idx: usize) {
        match self.node_mut(id) {
            Node::Internal(n) => {
                n.children.remove(idx);
            }
            Node::Leaf(_) => unreachable!("remove_child on a leaf"),
        }
    }

    /// Smallest key in the subtree rooted at `id`. Undefined (panics) on an
    /// empty leaf, as it must never be consulted there.
    fn min_key(&self, id: NodeId) -> &K {
        match self.node(id) {
            Node::Leaf(l) => l.keys.first().expect("min_key on an empty leaf"),
            Node::Internal(n) => self.min_key(n.children[0]),
        }
    }

    fn rightmost_leaf(&self, mut id: NodeId) -> NodeId {
        loop {
            match self.node(id) {
                Node::Leaf(_) => return id,
                Node::Internal(n) => id = *n.children.last().expect("internal has a child"),
            }
        }
    }

    // ---- search ---------------------------------------------------------

    /// Ordered insertion index for `key` at an internal node: the number of
    /// separators strictly less than `key`, descending to the right child on
    /// an exact match (separators equal the minimum of their right subtree).
    fn descend_index(keys: &[K], key: &K) -> usize {
        match keys.binary_search(key) {
            Ok(pos) => pos + 1,
            Err(pos) => pos,
        }
    }

    pub fn search(&self, key: &K) -> Option<&V> {
        let mut node_id = self.root;
        loop {
            match self.node(node_id) {
                Node::Internal(n) => {
                    node_id = n.children[Self::descend_index(&n.keys, key)];
                }
                Node::Leaf(l) => {
                    return l.keys.binary_search(key).ok().map(|pos| &l.values[pos]);
                }
            }
        }
    }

    /// Values whose keys fall in the closed interval `[lo, hi]`, in
    /// ascending key order. Descends to the first leaf that could hold `lo`
    /// and walks the leaf chain, stopping as soon as a key exceeds `hi`.
    pub fn range_query(&self, lo: &K, hi: &K) -> Vec<&V> {
        if lo > hi {
            return Vec::new();
        }
        let mut node_id = self.root;
        loop {
            match self.node(node_id) {
                Node::Internal(n) => {
                    node_id = n.children[Self::descend_index(&n.keys, lo)];
                }
                Node::Leaf(_) => break,
            }
        }
        let mut results = Vec::new();
        let mut current = Some(node_id);
        while let Some(id) = current {
            let l = match self.node(id) {
                Node::Leaf(l) => l,
                Node::Internal(_) => unreachable!("leaf chain contains an internal node"),
            };
            let mut exhausted = false;
            for (k, v) in l.keys.iter().zip(l.values.iter()) {
                if k > hi {
                    exhausted = true;
                    break;
                }
                if k >= lo {
                    results.push(v);
                }
            }
            if exhausted {
                break;
            }
            current = l.next;
        }
        results
    }

    // ---- insertion --------------------------------------------------------

    /// Insert `key`/`value`. Fails with `KeyConflict` if `key` already
    /// appears anywhere in the tree, leaving the tree unmodified.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), TreeError> {
        if let Some(new_id) = self.insert_rec(self.root, key, value)? {
            let sep = self.min_key(new_id).clone();
            let mut new_root = InternalNode::new();
            new_root.keys.push(sep);
            new_root.children.push(self.root);
            new_root.children.push(new_id);
            self.root = self.alloc_node(Node::Internal(new_root));
        }
        self.len += 1;
        Ok(())
    }

    /// Returns the id of a newly allocated right sibling if `node_id` split.
    fn insert_rec(
        &mut self,
        node_id: NodeId,
        key: K,
        value: V,
    ) -> Result<Option<NodeId>, TreeError> {
        match self.node(node_id) {
            Node::Leaf(_) => self.insert_leaf(node_id, key, value),
            Node::Internal(_) => self.insert_internal(node_id, key, value),
        }
    }

    fn insert_leaf(
        &mut self,
        node_id: NodeId,
        key: K,
        value: V,
    ) -> Result<Option<NodeId>, TreeError> {
        let pos = match self.node(node_id) {
            Node::Leaf(l) => l.keys.binary_search(&key),
            Node::Internal(_) => unreachable!(),
        };
        let pos = match pos {
            Ok(_) => return Err(TreeError::KeyConflict(format!("{:?}", key))),
            Err(pos) => pos,
        };
        if let Node::Leaf(l) = self.node_mut(node_id) {
            l.keys.insert(pos, key);
            l.values.insert(pos, value);
        }
        if self.keys_len(node_id) > self.max_keys {
            Ok(Some(self.split_leaf(node_id)))
        } else {
            Ok(None)
        }
    }

    fn insert_internal(
        &mut self,
        node_id: NodeId,
        key: K,
        value: V,
    ) -> Result<Option<NodeId>, TreeError> {
        let child_idx = match self.node(node_id) {
            Node::Internal(n) => match n.keys.binary_search(&key) {
                Ok(_) => return Err(TreeError::KeyConflict(format!("{:?}", key))),
                Err(pos) => pos,
            },
            Node::Leaf(_) => unreachable!(),
        };
        let child_id = self.child_at(node_id, child_idx);
        match self.insert_rec(child_id, key, value)? {
            None => Ok(None),
            Some(new_sibling_id) => {
                let sep = self.min_key(new_sibling_id).clone();
                if let Node::Internal(n) = self.node_mut(node_id) {
                    n.keys.insert(child_idx, sep);
                    n.children.insert(child_idx + 1, new_sibling_id);
                }
                if self.keys_len(node_id) > self.max_keys {
                    Ok(Some(self.split_internal(node_id)))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Split an overflowing leaf; `m = degree / 2` keys stay behind.
    fn split_leaf(&mut self, node_id: NodeId) -> NodeId {
        let m = self.degree / 2;
        let (right_keys, right_values, old_next) = match self.node_mut(node_id) {
            Node::Leaf(l) => {
                let right_keys = l.keys.split_off(m);
                let right_values = l.values.split_off(m);
                (right_keys, right_values, l.next)
            }
            Node::Internal(_) => unreachable!(),
        };
        let new_leaf = LeafNode {
            keys: right_keys,
            values: right_values,
            next: old_next,
        };
        let new_id = self.alloc_node(Node::Leaf(new_leaf));
        if let Node::Leaf(l) = self.node_mut(node_id) {
            l.next = Some(new_id);
        }
        new_id
    }

    /// Split an overflowing internal node; the separator at the midpoint is
    /// discarded rather than promoted, since the parent uses the new
    /// sibling's `min_key()` instead (which equals it, by invariant 4).
    fn split_internal(&mut self, node_id: NodeId) -> NodeId {
        let m = self.degree / 2 + 1;
        let (right_keys, right_children) = match self.node_mut(node_id) {
            Node::Internal(n) => {
                let right_keys = n.keys.split_off(m);
                let right_children = n.children.split_off(m);
                n.keys.truncate(m - 1);
                (right_keys, right_children)
            }
            Node::Leaf(_) => unreachable!(),
        };
        let new_node = InternalNode {
            keys: right_keys,
            children: right_children,
        };
        self.alloc_node(Node::Internal(new_node))
    }

    // ---- deletion ---------------------------------------------------------

    /// Remove `key` if present. Absence is not an error.
    pub fn delete(&mut self, key: &K) {
        let found = self.delete_rec(self.root, key);
        if found {
            self.len -= 1;
        }
        self.check_root_collapse();
    }

    fn delete_rec(&mut self, node_id: NodeId, key: &K) -> bool {
        match self.node(node_id) {
            Node::Leaf(_) => self.delete_leaf(node_id, key),
            Node::Internal(_) => self.delete_internal(node_id, key),
        }
    }

    fn delete_leaf(&mut self, node_id: NodeId, key: &K) -> bool {
        match self.node_mut(node_id) {
            Node::Leaf(l) => match l.keys.binary_search(key) {
                Ok(pos) => {
                    l.keys.remove(pos);
                    l.values.remove(pos);
                    true
                }
                Err(_) => false,
            },
            Node::Internal(_) => unreachable!(),
        }
    }

    fn delete_internal(&mut self, node_id: NodeId, key: &K) -> bool {
        let search = match self.node(node_id) {
            Node::Internal(n) => n.keys.binary_search(key),
            Node::Leaf(_) => unreachable!(),
        };
        let found = match search {
            Ok(sep_pos) => {
                // The separator's right subtree holds the actual record.
                let child_pos = sep_pos + 1;
                let child_id = self.child_at(node_id, child_pos);
                let found = self.delete_rec(child_id, key);
                let child_is_empty_leaf =
                    matches!(self.node(child_id), Node::Leaf(l) if l.keys.is_empty());
                if child_is_empty_leaf {
                    if child_pos + 1 < self.children_len(node_id) {
                        self.splice_empty_leaf(node_id, sep_pos);
                    } else {
                        self.fixup(node_id, child_pos);
                    }
                } else {
                    let new_min = self.min_key(child_id).clone();
                    self.set_key(node_id, sep_pos, new_min);
                    if self.keys_len(child_id) < self.min_keys {
                        self.fixup(node_id, child_pos);
                    }
                }
                found
            }
            Err(child_pos) => {
                let child_id = self.child_at(node_id, child_pos);
                let found = self.delete_rec(child_id, key);
                if found && self.keys_len(child_id) < self.min_keys {
                    self.fixup(node_id, child_pos);
                }
                found
            }
        };
        self.check_root_collapse();
        found
    }

    /// `key_pos = child_pos.saturating_sub(1)` is the spec's clamped index:
    /// the separator to the left of `child` when one exists, otherwise the
    /// separator immediately to its right (`child_pos` is then 0, so the two
    /// coincide).
    fn fixup(&mut self, parent_id: NodeId, child_pos: usize) {
        let key_pos = child_pos.saturating_sub(1);
        let has_left = child_pos > 0;
        let has_right = child_pos + 1 < self.children_len(parent_id);

        if has_left {
            let left_id = self.child_at(parent_id, child_pos - 1);
            if self.keys_len(left_id) > self.min_keys {
                self.borrow_from_left(parent_id, child_pos, key_pos);
                return;
            }
        }
        if has_right {
            let right_id = self.child_at(parent_id, child_pos + 1);
            if self.keys_len(right_id) > self.min_keys {
                self.borrow_from_right(parent_id, child_pos, key_pos);
                return;
            }
        }
        if has_left {
            self.merge_left(parent_id, child_pos, key_pos);
        } else if has_right {
            // Only reachable when child_pos == 0: merge-with-left is always
            // tried first and only skipped when there's no left sibling.
            self.merge_right(parent_id, child_pos, key_pos);
        }
    }

    fn borrow_from_left(&mut self, parent_id: NodeId, child_pos: usize, key_pos: usize) {
        let left_id = self.child_at(parent_id, child_pos - 1);
        let child_id = self.child_at(parent_id, child_pos);
        let left = self.take_node(left_id);
        let child = self.take_node(child_id);
        match (left, child) {
            (Node::Leaf(mut l), Node::Leaf(mut c)) => {
                let k = l.keys.pop().expect("left sibling can lend a key");
                let v = l.values.pop().expect("left sibling can lend a value");
                c.keys.insert(0, k);
                c.values.insert(0, v);
                let new_sep = c.keys[0].clone();
                self.put_node(left_id, Node::Leaf(l));
                self.put_node(child_id, Node::Leaf(c));
                self.set_key(parent_id, key_pos, new_sep);
            }
            (Node::Internal(mut l), Node::Internal(mut c)) => {
                let parent_key = self.key_at(parent_id, key_pos).clone();
                c.keys.insert(0, parent_key);
                let left_last_key = l.keys.pop().expect("left sibling can lend a key");
                let left_last_child = l.children.pop().expect("left sibling has a child");
                c.children.insert(0, left_last_child);
                self.put_node(left_id, Node::Internal(l));
                self.put_node(child_id, Node::Internal(c));
                self.set_key(parent_id, key_pos, left_last_key);
            }
            _ => unreachable!("sibling variant mismatch"),
        }
    }

    fn borrow_from_right(&mut self, parent_id: NodeId, child_pos: usize, key_pos: usize) {
        let child_id = self.child_at(parent_id, child_pos);
        let right_id = self.child_at(parent_id, child_pos + 1);
        let child = self.take_node(child_id);
        let right = self.take_node(right_id);
        match (child, right) {
            (Node::Leaf(mut c), Node::Leaf(mut r)) => {
                let borrowed_key = r.keys.remove(0);
                let borrowed_val = r.values.remove(0);
                let matches_sep = borrowed_key == *self.key_at(parent_id, key_pos);
                c.keys.push(borrowed_key);
                c.values.push(borrowed_val);
                let new_first = r.keys.first().expect("right sibling can lend a key").clone();
                self.put_node(child_id, Node::Leaf(c));
                self.put_node(right_id, Node::Leaf(r));
                if matches_sep {
                    self.set_key(parent_id, key_pos, new_first);
                } else {
                    self.set_key(parent_id, key_pos + 1, new_first);
                }
            }
            (Node::Internal(mut c), Node::Internal(mut r)) => {
                let borrowed = r.keys[0].clone();
                let single_separator = key_pos + 1 >= self.keys_len(parent_id);
                let structural_error = if single_separator {
                    let sep = self.key_at(parent_id, key_pos).clone();
                    c.keys.push(sep);
                    self.set_key(parent_id, key_pos, borrowed.clone());
                    false
                } else {
                    let next_sep = self.key_at(parent_id, key_pos + 1).clone();
                    match borrowed.cmp(&next_sep) {
                        Ordering::Greater => {
                            c.keys.push(next_sep);
                            self.set_key(parent_id, key_pos + 1, borrowed.clone());
                            false
                        }
                        Ordering::Less => {
                            let sep = self.key_at(parent_id, key_pos).clone();
                            c.keys.push(sep);
                            self.set_key(parent_id, key_pos, borrowed.clone());
                            false
                        }
                        Ordering::Equal => true,
                    }
                };
                r.keys.remove(0);
                let moved_child = r.children.remove(0);
                c.children.push(moved_child);
                self.put_node(child_id, Node::Internal(c));
                self.put_node(right_id, Node::Internal(r));
                if structural_error {
                    panic!(
                        "{}",
                        TreeError::StructuralError(format!(
                            "borrow-from-right: borrowed key equals separator at {}",
                            key_pos + 1
                        ))
                    );
                }
            }
            _ => unreachable!("sibling variant mismatch"),
        }
    }

    fn merge_left(&mut self, parent_id: NodeId, child_pos: usize, key_pos: usize) {
        let left_id = self.child_at(parent_id, child_pos - 1);
        let child_id = self.child_at(parent_id, child_pos);
        let child = self.take_node(child_id);
        match child {
            Node::Leaf(c) => {
                let next = c.next;
                match self.node_mut(left_id) {
                    Node::Leaf(l) => {
                        l.keys.extend(c.keys);
                        l.values.extend(c.values);
                        l.next = next;
                    }
                    Node::Internal(_) => unreachable!(),
                }
                if self.first_leaf == child_id {
                    self.first_leaf = left_id;
                }
            }
            Node::Internal(c) => {
                let sep = self.key_at(parent_id, key_pos).clone();
                match self.node_mut(left_id) {
                    Node::Internal(l) => {
                        l.keys.push(sep);
                        l.keys.extend(c.keys);
                        l.children.extend(c.children);
                    }
                    Node::Leaf(_) => unreachable!(),
                }
            }
        }
        self.free_node(child_id);
        self.remove_key(parent_id, key_pos);
        self.remove_child(parent_id, child_pos);
        self.check_root_collapse();
    }

    fn merge_right(&mut self, parent_id: NodeId, child_pos: usize, key_pos: usize) {
        let child_id = self.child_at(parent_id, child_pos);
        let right_id = self.child_at(parent_id, child_pos + 1);
        let right = self.take_node(right_id);
        match right {
            Node::Leaf(r) => {
                let next = r.next;
                match self.node_mut(child_id) {
                    Node::Leaf(c) => {
                        c.keys.extend(r.keys);
                        c.values.extend(r.values);
                        c.next = next;
                    }
                    Node::Internal(_) => unreachable!(),
                }
            }
            Node::Internal(r) => {
                let sep = self.key_at(parent_id, key_pos).clone();
                match self.node_mut(child_id) {
                    Node::Internal(c) => {
                        c.keys.push(sep);
                        c.keys.extend(r.keys);
                        c.children.extend(r.children);
                    }
                    Node::Leaf(_) => unreachable!(),
                }
            }
        }
        if self.first_leaf == right_id {
            self.first_leaf = child_id;
        }
        self.free_node(right_id);
        self.remove_key(parent_id, key_pos);
        self.remove_child(parent_id, child_pos + 1);
        self.check_root_collapse();
    }

    /// The deleted key matched a separator, and its right-subtree leaf
    /// became empty with a right sibling under the same parent: splice the
    /// sibling into the emptied leaf's slot rather than going through the
    /// general borrow/merge fix-up.
    fn splice_empty_leaf(&mut self, parent_id: NodeId, sep_pos: usize) {
        let empty_id = self.child_at(parent_id, sep_pos + 1);
        let right_id = self.child_at(parent_id, sep_pos + 2);
        let left_subtree = self.child_at(parent_id, sep_pos);
        let pred_leaf = self.rightmost_leaf(left_subtree);

        let empty_next = match self.node(empty_id) {
            Node::Leaf(l) => l.next,
            Node::Internal(_) => unreachable!(),
        };
        match self.node_mut(pred_leaf) {
            Node::Leaf(pred) => pred.next = empty_next,
            Node::Internal(_) => unreachable!(),
        }
        if self.first_leaf == empty_id {
            self.first_leaf = empty_next.expect("emptied leaf had a right sibling");
        }
        self.free_node(empty_id);

        let right_min = self.min_key(right_id).clone();
        self.set_key(parent_id, sep_pos, right_min);
        self.remove_key(parent_id, sep_pos + 1);
        self.set_child(parent_id, sep_pos + 1, right_id);
        self.remove_child(parent_id, sep_pos + 2);
        self.check_root_collapse();
    }

    /// If the root is an internal node with no separators left, replace it
    /// with its sole remaining child.
    fn check_root_collapse(&mut self) {
        if let Node::Internal(n) = self.node(self.root) {
            if n.keys.is_empty() {
                let only_child = n.children[0];
                self.free_node(self.root);
                self.root = only_child;
            }
        }
    }

    // ---- validation ---------------------------------------------------------

    /// Offline structural audit: checks invariants 1-7 of the data model,
    /// used by tests rather than on the hot path.
    pub fn validate(&self) -> bool {
        let mut ok = true;
        let mut leaves_inorder = Vec::new();
        self.validate_node(self.root, true, &mut leaves_inorder, &mut ok);

        let mut chain = Vec::new();
        let mut current = Some(self.first_leaf);
        while let Some(id) = current {
            chain.push(id);
            current = match self.nodes.get(id).and_then(|n| n.as_ref()) {
                Some(Node::Leaf(l)) => l.next,
                _ => {
                    ok = false;
                    None
                }
            };
        }
        if chain != leaves_inorder {
            ok = false;
        }
        ok
    }

    fn validate_node<'a>(
        &'a self,
        node_id: NodeId,
        is_root: bool,
        leaves: &mut Vec<NodeId>,
        ok: &mut bool,
    ) -> (usize, Option<&'a K>, Option<&'a K>) {
        match self.node(node_id) {
            Node::Leaf(l) => {
                let len = l.keys.len();
                if is_root {
                    if len > self.max_keys {
                        *ok = false;
                    }
                } else if len < self.min_keys || len > self.max_keys {
                    *ok = false;
                }
                if l.values.len() != l.keys.len() {
                    *ok = false;
                }
                if !l.keys.windows(2).all(|w| w[0] < w[1]) {
                    *ok = false;
                }
                leaves.push(node_id);
                (0, l.keys.first(), l.keys.last())
            }
            Node::Internal(n) => {
                let len = n.keys.len();
                if is_root {
                    if len == 0 || len > self.max_keys {
                        *ok = false;
                    }
                } else if len < self.min_keys || len > self.max_keys {
                    *ok = false;
                }
                if n.children.len() != n.keys.len() + 1 {
                    *ok = false;
                }
                if !n.keys.windows(2).all(|w| w[0] < w[1]) {
                    *ok = false;
                }

                let mut depth = None;
                let mut subtree_min = None;
                let mut subtree_max = None;
                let last = n.children.len() - 1;
                for (i, &child_id) in n.children.iter().enumerate() {
                    let (d, cmin, cmax) = self.validate_node(child_id, false, leaves, ok);
                    match depth {
                        None => depth = Some(d),
                        Some(prev) if prev != d => *ok = false,
                        _ => {}
                    }
                    if i == 0 {
                        subtree_min = cmin;
                    }
                    if i == last {
                        subtree_max = cmax;
                    }
                    if i < n.keys.len() {
                        if let Some(m) = cmax {
                            if m >= &n.keys[i] {
                                *ok = false;
                            }
                        }
                    }
                    if i > 0 {
                        let sep = &n.keys[i - 1];
                        if let Some(m) = cmin {
                            if m < sep {
                                *ok = false;
                            }
                        }
                    }
                }
                (depth.unwrap_or(0) + 1, subtree_min, subtree_max)
            }
        }
    }
}

/// Structural introspection used only by this module's tests; the public
/// API never needs to distinguish leaf roots from internal ones.
#[cfg(test)]
impl<K: Ord + Clone + Debug, V> BPlusTree<K, V> {
    pub(crate) fn root_is_leaf(&self) -> bool {
        matches!(self.node(self.root), Node::Leaf(_))
    }

    pub(crate) fn root_keys(&self) -> Vec<K> {
        match self.node(self.root) {
            Node::Internal(n) => n.keys.clone(),
            Node::Leaf(l) => l.keys.clone(),
        }
    }

    pub(crate) fn first_leaf_is_root(&self) -> bool {
        self.first_leaf == self.root
    }

    pub(crate) fn leaf_chain_keys(&self) -> Vec<K> {
        let mut out = Vec::new();
        let mut current = Some(self.first_leaf);
        while let Some(id) = current {
            match self.node(id) {
                Node::Leaf(l) => {
                    out.extend(l.keys.iter().cloned());
                    current = l.next;
                }
                Node::Internal(_) => unreachable!("leaf chain contains an internal node"),
            }
        }
        out
    }
}
