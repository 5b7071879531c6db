use crate::datastore::{DataStore, EntryRef, Generation, RefLayout};
use crate::index::stats::MemoryUsage;
use crate::index::types::{DocId, PostingListKeyData};
use log::trace;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Records of one posting list, sorted by document id
pub type PostingList = Box<[PostingListKeyData]>;

fn list_bytes(records: &[PostingListKeyData]) -> usize {
    std::mem::size_of_val(records)
}

/// Store of immutable posting lists, each a sorted array of records.
///
/// A change never touches a published list: the merged result is stored as
/// a new list and the old one is held, so readers that loaded the old root
/// keep a complete view. A held list is dropped as soon as its generation is
/// reclaimed.
pub struct PostingListStore {
    lists: DataStore<PostingList>,
    empty: Arc<PostingList>,
    /// Record bytes of stored lists, live or held
    record_bytes: AtomicUsize,
    held_record_bytes: AtomicUsize,
}

impl PostingListStore {
    pub fn new(layout: RefLayout, initial_lists: usize, max_lists: usize) -> Self {
        Self {
            lists: DataStore::new(layout, initial_lists, max_lists),
            empty: Arc::new(PostingList::default()),
            record_bytes: AtomicUsize::new(0),
            held_record_bytes: AtomicUsize::new(0),
        }
    }

    /// Records of the list at `root`; empty for the null root
    #[inline]
    pub fn get(&self, root: EntryRef) -> Arc<PostingList> {
        if root.valid() {
            self.lists.get(root)
        } else {
            self.empty.clone()
        }
    }

    fn store_list(&self, records: Vec<PostingListKeyData>) -> EntryRef {
        if records.is_empty() {
            return EntryRef::invalid();
        }
        self.record_bytes.fetch_add(list_bytes(&records), Ordering::Relaxed);
        self.lists.allocate(records.into_boxed_slice())
    }

    fn hold_list(&self, root: EntryRef) {
        if !root.valid() {
            return;
        }
        self.held_record_bytes
            .fetch_add(list_bytes(&self.lists.get(root)), Ordering::Relaxed);
        self.lists.hold(root);
    }

    /// Merge a batch into the list at `root` and point `root` at the result.
    ///
    /// `adds` must be sorted by document id and `removes` ascending. A
    /// document both removed and added keeps the add. Records that are
    /// replaced or removed are passed to `on_dropped`. An empty result leaves
    /// `root` null; an unchanged list leaves it untouched.
    pub fn apply(
        &self,
        root: &mut EntryRef,
        adds: &[PostingListKeyData],
        removes: &[DocId],
        mut on_dropped: impl FnMut(&PostingListKeyData),
    ) {
        debug_assert!(adds.windows(2).all(|w| w[0].doc_id < w[1].doc_id));
        debug_assert!(removes.windows(2).all(|w| w[0] < w[1]));
        let old_list = self.get(*root);
        let old: &[PostingListKeyData] = &old_list;
        let mut merged = Vec::with_capacity(old.len() + adds.len());
        let mut changed = false;
        let (mut i, mut j, mut k) = (0, 0, 0);
        while i < old.len() || j < adds.len() {
            let doc_id = match (old.get(i), adds.get(j)) {
                (Some(o), Some(a)) => o.doc_id.min(a.doc_id),
                (Some(o), None) => o.doc_id,
                (None, Some(a)) => a.doc_id,
                (None, None) => break,
            };
            while k < removes.len() && removes[k] < doc_id {
                k += 1;
            }
            let existing = old.get(i).filter(|o| o.doc_id == doc_id);
            let added = adds.get(j).filter(|a| a.doc_id == doc_id);
            let removed = removes.get(k).is_some_and(|&r| r == doc_id);
            match (existing, added) {
                (existing, Some(add)) => {
                    if let Some(old_entry) = existing {
                        on_dropped(old_entry);
                    }
                    merged.push(*add);
                    changed = true;
                }
                (Some(old_entry), None) if removed => {
                    on_dropped(old_entry);
                    changed = true;
                }
                (Some(old_entry), None) => merged.push(*old_entry),
                (None, None) => unreachable!("merge head matched neither input"),
            }
            if existing.is_some() {
                i += 1;
            }
            if added.is_some() {
                j += 1;
            }
        }
        trace!(
            "posting list merge: {} old, {} adds, {} removes -> {}",
            old.len(),
            adds.len(),
            removes.len(),
            merged.len()
        );
        if !changed {
            return;
        }
        let new_root = self.store_list(merged);
        self.hold_list(*root);
        *root = new_root;
    }

    /// Store `records` as a new list replacing `root`, which is held
    pub fn replace(&self, root: EntryRef, records: Vec<PostingListKeyData>) -> EntryRef {
        let new_root = self.store_list(records);
        self.hold_list(root);
        new_root
    }

    pub fn assign_generation(&self, generation: Generation) {
        self.lists.assign_generation(generation);
    }

    /// Drop held lists no reader can observe. Returns the number of slot
    /// buffers freed.
    pub fn reclaim_memory(&self, oldest_used: Generation) -> usize {
        self.lists.reclaim_memory_with(oldest_used, |records| {
            let bytes = list_bytes(records);
            self.record_bytes.fetch_sub(bytes, Ordering::Relaxed);
            self.held_record_bytes.fetch_sub(bytes, Ordering::Relaxed);
        })
    }

    /// Usage of the list slots plus the record arrays they own
    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = self.lists.memory_usage();
        let records = self.record_bytes.load(Ordering::Relaxed);
        usage.allocated_bytes += records;
        usage.used_bytes += records;
        usage.allocated_bytes_on_hold += self.held_record_bytes.load(Ordering::Relaxed);
        usage
    }
}
