use super::entry_ref::{EntryRef, RefLayout};
use super::generation::Generation;
use super::unique_store::{AddResult, CompactionRemap};
use crate::btree::BTree;
use crate::index::stats::MemoryUsage;
use std::cmp::Ordering;

/// Ordered set of unique-value references, ordered by the values they
/// denote. Comparison closures order a stored reference against a target.
pub struct UniqueStoreDictionary {
    tree: BTree<EntryRef, ()>,
}

impl UniqueStoreDictionary {
    pub fn new(layout: RefLayout, initial_nodes: usize, max_nodes: usize) -> Self {
        Self {
            tree: BTree::new(layout, initial_nodes, max_nodes),
        }
    }

    pub fn find(&self, cmp: impl Fn(EntryRef) -> Ordering) -> Option<EntryRef> {
        self.tree.find(|&r| cmp(r)).map(|entry| entry.key())
    }

    /// Return the equal entry, or insert the reference made by `insert_entry`
    pub fn add(
        &self,
        cmp: impl Fn(EntryRef) -> Ordering,
        insert_entry: impl FnOnce() -> EntryRef,
    ) -> AddResult {
        let mut itr = self.tree.lower_bound(|&r| cmp(r));
        if itr.valid() && cmp(itr.key()).is_eq() {
            return AddResult {
                entry_ref: itr.key(),
                inserted: false,
            };
        }
        let entry_ref = insert_entry();
        itr.insert(entry_ref, ());
        AddResult {
            entry_ref,
            inserted: true,
        }
    }

    pub fn remove(&self, cmp: impl Fn(EntryRef) -> Ordering, entry_ref: EntryRef) {
        let mut itr = self.tree.lower_bound(|&r| cmp(r));
        assert!(
            itr.valid() && itr.key() == entry_ref,
            "{:?} is not in the unique store dictionary",
            entry_ref
        );
        itr.remove();
    }

    /// Bulk-load from references in value order. Index 0 is the null
    /// sentinel and is skipped; references with a zero count are handed to
    /// `hold` instead of being kept.
    pub fn build(&self, refs: &[EntryRef], ref_counts: &[u32], mut hold: impl FnMut(EntryRef)) {
        assert_eq!(refs.len(), ref_counts.len(), "one count per reference");
        let mut kept = Vec::with_capacity(refs.len().saturating_sub(1));
        for (&entry_ref, &count) in refs.iter().zip(ref_counts).skip(1) {
            if count != 0 {
                kept.push((entry_ref, ()));
            } else {
                hold(entry_ref);
            }
        }
        self.tree.build(kept);
    }

    /// Replace moved references. Values are unchanged, so the order is too.
    /// Readers see the old or the new dictionary, each complete.
    pub fn remap(&self, remap: &CompactionRemap) {
        if remap.is_empty() {
            return;
        }
        let refs: Vec<_> = self.iter().map(|r| (remap.remap(r), ())).collect();
        self.tree.rebuild(refs);
    }

    pub fn iter(&self) -> impl Iterator<Item = EntryRef> + '_ {
        self.tree.iter().map(|entry| entry.key())
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn assign_generation(&self, generation: Generation) {
        self.tree.assign_generation(generation);
    }

    pub fn reclaim_memory(&self, oldest_used: Generation) -> usize {
        self.tree.reclaim_memory(oldest_used)
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        self.tree.memory_usage()
    }
}
