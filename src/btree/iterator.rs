use super::node::{BTreeNode, LEAF_SLOTS};
use super::tree::{BTree, LeafEntry, split_focus};
use crate::datastore::EntryRef;
use std::cmp::Ordering;
use std::sync::Arc;

/// Writer cursor over a [`BTree`].
///
/// Holds the path from the root to the current leaf entry. Only one cursor
/// may mutate a tree at a time, and a cursor is stale once any other cursor
/// has mutated the tree.
pub struct BTreeIterator<'a, K, V> {
    tree: &'a BTree<K, V>,
    /// (node, index) pairs, root first; empty once exhausted
    path: Vec<(EntryRef, usize)>,
}

impl<'a, K, V> BTreeIterator<'a, K, V>
where
    K: Copy + Send + Sync,
    V: Clone + Send + Sync,
{
    pub(crate) fn new(tree: &'a BTree<K, V>) -> Self {
        Self {
            tree,
            path: Vec::new(),
        }
    }

    /// Reposition at the first entry
    pub fn begin(&mut self) {
        self.path.clear();
        let root = self.tree.root();
        if root.valid() {
            self.descend_leftmost(root);
        }
    }

    #[inline]
    pub fn valid(&self) -> bool {
        !self.path.is_empty()
    }

    fn leaf(&self) -> (Arc<BTreeNode<K, V>>, usize) {
        match self.path.last() {
            Some(&(leaf_ref, idx)) => (self.tree.node(leaf_ref), idx),
            None => panic!("access through an exhausted tree cursor"),
        }
    }

    pub fn key(&self) -> K {
        let (leaf, idx) = self.leaf();
        leaf.keys()[idx]
    }

    /// Entry at the cursor. Atomic value slots may be updated in place.
    pub fn entry(&self) -> LeafEntry<K, V> {
        match self.path.last() {
            Some(&(leaf_ref, idx)) => self.tree.leaf_entry(leaf_ref, idx),
            None => panic!("access through an exhausted tree cursor"),
        }
    }

    pub fn next(&mut self) {
        let Some(last) = self.path.last_mut() else {
            return;
        };
        last.1 += 1;
        if last.1 < self.tree.node(last.0).len() {
            return;
        }
        self.path.pop();
        while let Some(top) = self.path.last_mut() {
            top.1 += 1;
            let node = self.tree.node(top.0);
            if top.1 < node.len() {
                let child = node.children()[top.1];
                self.descend_leftmost(child);
                return;
            }
            self.path.pop();
        }
    }

    /// Move forward to the first entry whose key is not less than the target.
    ///
    /// Climbs only as far as the current subtree's largest key is below the
    /// target and never moves backwards, so a sequence of seeks with
    /// increasing targets visits each node at most once.
    pub fn seek(&mut self, cmp: impl Fn(&K) -> Ordering) {
        let mut level = match self.path.len() {
            0 => return,
            depth => depth - 1,
        };
        loop {
            let (node_ref, idx) = self.path[level];
            let node = self.tree.node(node_ref);
            if let Some(found) = node.lower_bound_from(idx, &cmp) {
                self.path.truncate(level + 1);
                self.path[level].1 = found;
                break;
            }
            if level == 0 {
                self.path.clear();
                return;
            }
            level -= 1;
        }
        // every child below holds a key >= target, since its max key does
        loop {
            let (node_ref, idx) = self.path[self.path.len() - 1];
            let node = self.tree.node(node_ref);
            if node.is_leaf() {
                return;
            }
            let child_ref = node.children()[idx];
            let child = self.tree.node(child_ref);
            let found = child.lower_bound_from(0, &cmp).unwrap_or(0);
            self.path.push((child_ref, found));
        }
    }

    /// Insert before the cursor position (at the end if exhausted) and leave
    /// the cursor on the new entry. The caller keeps keys ordered.
    pub fn insert(&mut self, key: K, value: V) {
        if self.path.is_empty() {
            self.to_end();
        }
        let (leaves, focus) = match self.path.last() {
            None => (vec![BTreeNode::leaf(vec![key], vec![value])], Some((0, 0))),
            Some(&(leaf_ref, idx)) => {
                let leaf = self.tree.node(leaf_ref);
                let mut keys = leaf.keys().to_vec();
                let mut values = leaf.values().to_vec();
                keys.insert(idx, key);
                values.insert(idx, value);
                if keys.len() <= LEAF_SLOTS {
                    (vec![BTreeNode::leaf(keys, values)], Some((0, idx)))
                } else {
                    let mid = keys.len() / 2;
                    let right_keys = keys.split_off(mid);
                    let right_values = values.split_off(mid);
                    (
                        vec![
                            BTreeNode::leaf(keys, values),
                            BTreeNode::leaf(right_keys, right_values),
                        ],
                        Some(split_focus(idx, mid)),
                    )
                }
            }
        };
        self.path = self.tree.replace_leaf(&self.path, leaves, focus);
        self.tree.adjust_len(true);
    }

    /// Remove the entry at the cursor. Nodes are not rebalanced; emptied
    /// nodes are dropped. The cursor is exhausted afterwards.
    pub fn remove(&mut self) {
        let (leaf, idx) = self.leaf();
        let mut keys = leaf.keys().to_vec();
        let mut values = leaf.values().to_vec();
        keys.remove(idx);
        values.remove(idx);
        let leaves = if keys.is_empty() {
            Vec::new()
        } else {
            vec![BTreeNode::leaf(keys, values)]
        };
        self.tree.replace_leaf(&self.path, leaves, None);
        self.tree.adjust_len(false);
        self.path.clear();
    }

    fn descend_leftmost(&mut self, mut node_ref: EntryRef) {
        loop {
            self.path.push((node_ref, 0));
            match &*self.tree.node(node_ref) {
                BTreeNode::Leaf { .. } => return,
                BTreeNode::Internal { children, .. } => node_ref = children[0],
            }
        }
    }

    /// Position one past the last entry of the rightmost leaf
    fn to_end(&mut self) {
        self.path.clear();
        let mut node_ref = self.tree.root();
        while node_ref.valid() {
            let node = self.tree.node(node_ref);
            match &*node {
                BTreeNode::Leaf { .. } => {
                    self.path.push((node_ref, node.len()));
                    return;
                }
                BTreeNode::Internal { children, .. } => {
                    self.path.push((node_ref, node.len() - 1));
                    node_ref = children[children.len() - 1];
                }
            }
        }
    }
}

/// Read-only in-order iterator over one published snapshot
pub struct Iter<'a, K, V> {
    tree: &'a BTree<K, V>,
    stack: Vec<(Arc<BTreeNode<K, V>>, usize)>,
}

impl<'a, K, V> Iter<'a, K, V>
where
    K: Copy + Send + Sync,
    V: Clone + Send + Sync,
{
    pub(crate) fn new(tree: &'a BTree<K, V>, root: EntryRef) -> Self {
        let mut stack = Vec::new();
        if root.valid() {
            stack.push((tree.node(root), 0));
        }
        Self { tree, stack }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Copy + Send + Sync,
    V: Clone + Send + Sync,
{
    type Item = LeafEntry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            let idx = top.1;
            if idx >= top.0.len() {
                self.stack.pop();
                continue;
            }
            top.1 += 1;
            if top.0.is_leaf() {
                return Some(LeafEntry::new(top.0.clone(), idx));
            }
            let child = self.tree.node(top.0.children()[idx]);
            self.stack.push((child, 0));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::btree::BTree;
    use crate::datastore::RefLayout;

    fn filled(n: u32) -> BTree<u32, u32> {
        let tree = BTree::new(RefLayout::new(20), 64, 1024);
        tree.build((0..n).map(|i| (i * 10, i)));
        tree
    }

    #[test]
    fn test_cursor_walks_all_entries() {
        let tree = filled(300);
        let mut itr = tree.begin();
        let mut seen = Vec::new();
        while itr.valid() {
            seen.push(itr.key());
            itr.next();
        }
        assert_eq!(seen, (0..300).map(|i| i * 10).collect::<Vec<_>>());
    }

    #[test]
    fn test_seek_is_forward_only() {
        let tree = filled(300);
        let mut itr = tree.begin();
        itr.seek(|k| k.cmp(&55));
        assert_eq!(itr.key(), 60);
        itr.seek(|k| k.cmp(&60));
        assert_eq!(itr.key(), 60);
        itr.seek(|k| k.cmp(&2345));
        assert_eq!(itr.key(), 2350);
        // targets behind the cursor do not move it
        itr.seek(|k| k.cmp(&10));
        assert_eq!(itr.key(), 2350);
        itr.seek(|k| k.cmp(&5000));
        assert!(!itr.valid());
    }

    #[test]
    fn test_insert_leaves_cursor_on_new_entry() {
        let tree = filled(100);
        let mut itr = tree.lower_bound(|k| k.cmp(&505));
        assert_eq!(itr.key(), 510);
        itr.insert(505, 7);
        assert_eq!(itr.key(), 505);
        assert_eq!(*itr.entry().value(), 7);
        itr.next();
        assert_eq!(itr.key(), 510);
    }

    #[test]
    fn test_insert_at_end_and_into_empty() {
        let tree = BTree::new(RefLayout::new(20), 64, 1024);
        let mut itr = tree.begin();
        for key in 0..40u32 {
            itr.insert(key, key);
            itr.next();
            assert!(!itr.valid());
        }
        assert_eq!(tree.iter().map(|e| e.key()).collect::<Vec<_>>(), (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn test_remove_drops_entry() {
        let tree = filled(40);
        for key in (0..40).map(|i| i * 10).filter(|k| k % 20 == 0) {
            let mut itr = tree.lower_bound(|k| k.cmp(&key));
            assert_eq!(itr.key(), key);
            itr.remove();
            assert!(!itr.valid());
        }
        assert_eq!(tree.len(), 20);
        let keys: Vec<u32> = tree.iter().map(|e| e.key()).collect();
        assert!(keys.iter().all(|k| k % 20 == 10));
        for key in keys {
            tree.lower_bound(|k| k.cmp(&key)).remove();
        }
        assert!(tree.is_empty());
        assert!(!tree.root().valid());
    }
}
