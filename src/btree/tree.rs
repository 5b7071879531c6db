use super::iterator::{BTreeIterator, Iter};
use super::node::{BTreeNode, INTERNAL_SLOTS, LEAF_SLOTS};
use crate::datastore::{AtomicEntryRef, DataStore, EntryRef, Generation, RefLayout};
use crate::index::stats::MemoryUsage;
use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

/// Cursor target after rewriting one tree level: (replacement node, index in it)
pub(crate) type Focus = Option<(usize, usize)>;

/// One entry of a published leaf. Keeps the leaf alive while it is held.
pub struct LeafEntry<K, V> {
    leaf: Arc<BTreeNode<K, V>>,
    idx: usize,
}

impl<K: Copy, V> LeafEntry<K, V> {
    pub(crate) fn new(leaf: Arc<BTreeNode<K, V>>, idx: usize) -> Self {
        Self { leaf, idx }
    }

    #[inline]
    pub fn key(&self) -> K {
        self.leaf.keys()[self.idx]
    }

    /// Value of the entry. Atomic value slots may be updated in place.
    #[inline]
    pub fn value(&self) -> &V {
        &self.leaf.values()[self.idx]
    }
}

/// Ordered map with a single writer and lock-free readers.
///
/// Nodes are immutable once published. A mutation copies the path from the
/// touched leaf up to the root, holds the replaced nodes and publishes the
/// new root with a release store. Readers load the root once and see a
/// consistent snapshot for as long as their generation guard lives.
///
/// Keys are compared through caller-supplied closures, so a key may be a
/// reference into another store (an interned word, a unique value).
pub struct BTree<K, V> {
    nodes: DataStore<BTreeNode<K, V>>,
    root: AtomicEntryRef,
    len: AtomicUsize,
}

impl<K, V> BTree<K, V>
where
    K: Copy + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(layout: RefLayout, initial_nodes: usize, max_nodes: usize) -> Self {
        Self {
            nodes: DataStore::new(layout, initial_nodes, max_nodes),
            root: AtomicEntryRef::default(),
            len: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn root(&self) -> EntryRef {
        self.root.load_acquire()
    }

    pub fn len(&self) -> usize {
        self.len.load(AtomicOrdering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub(crate) fn node(&self, node_ref: EntryRef) -> Arc<BTreeNode<K, V>> {
        self.nodes.get(node_ref)
    }

    pub(crate) fn leaf_entry(&self, leaf_ref: EntryRef, idx: usize) -> LeafEntry<K, V> {
        LeafEntry::new(self.node(leaf_ref), idx)
    }

    /// Look up the entry whose key compares equal. `cmp` orders a stored key
    /// against the target.
    pub fn find(&self, cmp: impl Fn(&K) -> Ordering) -> Option<LeafEntry<K, V>> {
        let mut node_ref = self.root();
        if !node_ref.valid() {
            return None;
        }
        loop {
            let node = self.node(node_ref);
            let idx = node.lower_bound_from(0, &cmp)?;
            if node.is_leaf() {
                let found = cmp(&node.keys()[idx]).is_eq();
                return found.then(|| LeafEntry::new(node, idx));
            }
            node_ref = node.children()[idx];
        }
    }

    /// Reader iteration over the snapshot published at call time
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self, self.root())
    }

    /// Writer cursor positioned at the first entry
    pub fn begin(&self) -> BTreeIterator<'_, K, V> {
        let mut itr = BTreeIterator::new(self);
        itr.begin();
        itr
    }

    /// Writer cursor positioned at the first key not less than the target
    pub fn lower_bound(&self, cmp: impl Fn(&K) -> Ordering) -> BTreeIterator<'_, K, V> {
        let mut itr = self.begin();
        itr.seek(cmp);
        itr
    }

    /// Bulk-load an empty tree from pairs already sorted by key
    pub fn build(&self, pairs: impl IntoIterator<Item = (K, V)>) {
        assert!(
            !self.root.load_relaxed().valid(),
            "bulk build into a non-empty tree"
        );
        let (root, count) = self.build_nodes(pairs);
        self.len.store(count, AtomicOrdering::Relaxed);
        self.root.store_release(root);
    }

    /// Replace every entry with `pairs`, sorted by key. The new nodes are
    /// published with a single root store and the old ones are held, so a
    /// reader sees either the old or the new content, never a mix.
    pub fn rebuild(&self, pairs: impl IntoIterator<Item = (K, V)>) {
        let old_root = self.root.load_relaxed();
        let (root, count) = self.build_nodes(pairs);
        self.len.store(count, AtomicOrdering::Relaxed);
        self.root.store_release(root);
        if old_root.valid() {
            self.hold_subtree(old_root);
        }
    }

    /// Store unpublished nodes for sorted `pairs`; returns root and count
    fn build_nodes(&self, pairs: impl IntoIterator<Item = (K, V)>) -> (EntryRef, usize) {
        let mut level: Vec<(K, EntryRef)> = Vec::new();
        let mut keys = Vec::with_capacity(LEAF_SLOTS);
        let mut values = Vec::with_capacity(LEAF_SLOTS);
        let mut count = 0;
        for (key, value) in pairs {
            keys.push(key);
            values.push(value);
            count += 1;
            if keys.len() == LEAF_SLOTS {
                let leaf = BTreeNode::leaf(std::mem::take(&mut keys), std::mem::take(&mut values));
                level.push((key, self.nodes.allocate(leaf)));
            }
        }
        if let Some(&max) = keys.last() {
            level.push((max, self.nodes.allocate(BTreeNode::leaf(keys, values))));
        }
        while level.len() > 1 {
            level = level
                .chunks(INTERNAL_SLOTS)
                .map(|chunk| {
                    let keys = chunk.iter().map(|&(k, _)| k).collect();
                    let children = chunk.iter().map(|&(_, r)| r).collect();
                    let max = chunk[chunk.len() - 1].0;
                    (max, self.nodes.allocate(BTreeNode::internal(keys, children)))
                })
                .collect();
        }
        let root = level.first().map_or(EntryRef::invalid(), |&(_, r)| r);
        (root, count)
    }

    fn hold_subtree(&self, node_ref: EntryRef) {
        if let BTreeNode::Internal { children, .. } = &*self.node(node_ref) {
            for &child in children.iter() {
                self.hold_subtree(child);
            }
        }
        self.nodes.hold(node_ref);
    }

    pub(crate) fn adjust_len(&self, inserted: bool) {
        if inserted {
            self.len.fetch_add(1, AtomicOrdering::Relaxed);
        } else {
            self.len.fetch_sub(1, AtomicOrdering::Relaxed);
        }
    }

    /// Replace the leaf at the end of `path` (root first) with `leaves`,
    /// path-copy every ancestor and publish the new root. Returns the cursor
    /// path leading to `focus`, or an empty path if there is none.
    pub(crate) fn replace_leaf(
        &self,
        path: &[(EntryRef, usize)],
        leaves: Vec<BTreeNode<K, V>>,
        mut focus: Focus,
    ) -> Vec<(EntryRef, usize)> {
        let mut repl: Vec<(K, EntryRef)> = leaves
            .into_iter()
            .map(|leaf| (leaf.max_key(), self.nodes.allocate(leaf)))
            .collect();
        // built leaf first, reversed at the end
        let mut new_path = Vec::with_capacity(path.len() + 1);
        if path.is_empty() {
            if let Some((which, idx)) = focus {
                new_path.push((repl[which].1, idx));
            }
        }
        for level in (0..path.len()).rev() {
            if let Some((which, idx)) = focus {
                new_path.push((repl[which].1, idx));
            }
            self.nodes.hold(path[level].0);
            if level == 0 {
                break;
            }
            let (parent_ref, child_idx) = path[level - 1];
            let parent = self.node(parent_ref);
            let mut keys = Vec::with_capacity(parent.len() + 1);
            let mut children = Vec::with_capacity(parent.len() + 1);
            keys.extend_from_slice(&parent.keys()[..child_idx]);
            children.extend_from_slice(&parent.children()[..child_idx]);
            for &(key, child) in &repl {
                keys.push(key);
                children.push(child);
            }
            keys.extend_from_slice(&parent.keys()[child_idx + 1..]);
            children.extend_from_slice(&parent.children()[child_idx + 1..]);
            focus = focus.map(|(which, _)| (0, child_idx + which));
            repl = self.split_internal(keys, children, &mut focus);
        }

        let root = match repl.len() {
            0 => EntryRef::invalid(),
            1 => repl[0].1,
            _ => {
                let keys = repl.iter().map(|&(k, _)| k).collect();
                let children = repl.iter().map(|&(_, r)| r).collect();
                let root = self.nodes.allocate(BTreeNode::internal(keys, children));
                if let Some((which, _)) = focus {
                    new_path.push((root, which));
                }
                root
            }
        };
        self.root.store_release(root);

        if focus.is_none() {
            return Vec::new();
        }
        new_path.reverse();
        new_path
    }

    fn split_internal(
        &self,
        mut keys: Vec<K>,
        mut children: Vec<EntryRef>,
        focus: &mut Focus,
    ) -> Vec<(K, EntryRef)> {
        if keys.is_empty() {
            *focus = None;
            return Vec::new();
        }
        if keys.len() <= INTERNAL_SLOTS {
            let max = keys[keys.len() - 1];
            return vec![(max, self.nodes.allocate(BTreeNode::internal(keys, children)))];
        }
        let mid = keys.len() / 2;
        let right_keys = keys.split_off(mid);
        let right_children = children.split_off(mid);
        *focus = focus.map(|(_, idx)| split_focus(idx, mid));
        let left_max = keys[keys.len() - 1];
        let right_max = right_keys[right_keys.len() - 1];
        vec![
            (left_max, self.nodes.allocate(BTreeNode::internal(keys, children))),
            (
                right_max,
                self.nodes.allocate(BTreeNode::internal(right_keys, right_children)),
            ),
        ]
    }

    pub fn assign_generation(&self, generation: Generation) {
        self.nodes.assign_generation(generation);
    }

    /// Returns the number of node buffers freed
    pub fn reclaim_memory(&self, oldest_used: Generation) -> usize {
        self.nodes.reclaim_memory(oldest_used)
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        self.nodes.memory_usage()
    }
}

/// Cursor target after splitting a node at `mid`
#[inline]
pub(crate) fn split_focus(idx: usize, mid: usize) -> (usize, usize) {
    if idx < mid { (0, idx) } else { (1, idx - mid) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tree() -> BTree<u32, u32> {
        BTree::new(RefLayout::new(20), 64, 1024)
    }

    fn insert(tree: &BTree<u32, u32>, key: u32) {
        let mut itr = tree.lower_bound(|k| k.cmp(&key));
        if itr.valid() && itr.key() == key {
            return;
        }
        itr.insert(key, key * 10);
    }

    #[test]
    fn test_insert_out_of_order_iterates_sorted() {
        let tree = tree();
        for i in 0..1000u32 {
            insert(&tree, (i * 7919) % 1000);
        }
        assert_eq!(tree.len(), 1000);
        let keys: Vec<u32> = tree.iter().map(|e| e.key()).collect();
        assert_eq!(keys, (0..1000).collect::<Vec<_>>());
        for key in [0u32, 17, 500, 999] {
            assert_eq!(tree.find(|k| k.cmp(&key)).map(|e| *e.value()), Some(key * 10));
        }
        assert!(tree.find(|k| k.cmp(&1000)).is_none());
    }

    #[test]
    fn test_empty_tree() {
        let tree = tree();
        assert!(tree.is_empty());
        assert!(!tree.begin().valid());
        assert!(tree.find(|k| k.cmp(&1)).is_none());
        assert_eq!(tree.iter().count(), 0);
    }

    #[test]
    fn test_build_matches_inserts() {
        let tree = tree();
        tree.build((0..500u32).map(|i| (i * 2, i)));
        assert_eq!(tree.len(), 500);
        assert_eq!(tree.find(|k| k.cmp(&998)).map(|e| *e.value()), Some(499));
        assert!(tree.find(|k| k.cmp(&3)).is_none());
        // cursor insert into a bulk-built tree keeps the order
        insert(&tree, 3);
        insert(&tree, 1001);
        let keys: Vec<u32> = tree.iter().map(|e| e.key()).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(keys.len(), 502);
    }

    #[test]
    fn test_old_snapshot_survives_mutation() {
        let tree = tree();
        for key in 0..100 {
            insert(&tree, key);
        }
        let snapshot = tree.iter();
        for key in 100..200 {
            insert(&tree, key);
        }
        assert_eq!(snapshot.count(), 100);
        assert_eq!(tree.iter().count(), 200);
    }

    #[test]
    fn test_rebuild_swaps_content_atomically() {
        let tree = tree();
        for key in 0..50 {
            insert(&tree, key);
        }
        let snapshot = tree.iter();
        tree.rebuild((100..400u32).map(|k| (k, k)));
        assert_eq!(tree.len(), 300);
        assert_eq!(snapshot.map(|e| e.key()).collect::<Vec<_>>(), (0..50).collect::<Vec<_>>());
        assert_eq!(tree.iter().next().map(|e| e.key()), Some(100));
        tree.rebuild(std::iter::empty());
        assert!(tree.is_empty());
        assert!(!tree.root().valid());
    }

    #[test]
    fn test_rebuild_never_hides_entries_from_readers() {
        let tree = tree();
        tree.build((0..2000u32).map(|k| (k, k)));
        let done = std::sync::atomic::AtomicBool::new(false);
        std::thread::scope(|s| {
            s.spawn(|| {
                while !done.load(AtomicOrdering::Acquire) {
                    assert!(tree.find(|k| k.cmp(&0)).is_some());
                    assert!(tree.find(|k| k.cmp(&1999)).is_some());
                }
            });
            for _ in 0..50 {
                tree.rebuild((0..2000u32).map(|k| (k, k + 1)));
            }
            done.store(true, AtomicOrdering::Release);
        });
    }

    #[test]
    fn test_concurrent_readers_see_sorted_snapshots() {
        let tree = Arc::new(tree());
        std::thread::scope(|s| {
            for _ in 0..3 {
                let tree = &tree;
                s.spawn(move || {
                    for _ in 0..50 {
                        let keys: Vec<u32> = tree.iter().map(|e| e.key()).collect();
                        assert!(keys.windows(2).all(|w| w[0] < w[1]));
                    }
                });
            }
            for i in 0..2000u32 {
                insert(&tree, (i * 4099) % 2000);
            }
        });
        assert_eq!(tree.len(), 2000);
    }
}
