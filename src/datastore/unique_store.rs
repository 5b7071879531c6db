use super::builder::UniqueStoreBuilder;
use super::entry_ref::{EntryRef, RefLayout};
use super::generation::Generation;
use super::store::DataStore;
use super::unique_dictionary::UniqueStoreDictionary;
use crate::index::stats::MemoryUsage;
use log::debug;
use rustc_hash::FxHashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Stored value plus the number of owners sharing it.
///
/// The count is only touched by the writer (dictionary build, add, remove).
#[derive(Debug)]
pub struct UniqueStoreEntry<T> {
    ref_count: AtomicU32,
    value: T,
}

impl<T> UniqueStoreEntry<T> {
    pub fn new(value: T) -> Self {
        Self {
            ref_count: AtomicU32::new(0),
            value,
        }
    }

    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Relaxed)
    }

    pub fn set_ref_count(&self, count: u32) {
        self.ref_count.store(count, Ordering::Relaxed);
    }

    pub(crate) fn inc_ref_count(&self) -> u32 {
        self.ref_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn dec_ref_count(&self) -> u32 {
        let prev = self.ref_count.fetch_sub(1, Ordering::Relaxed);
        assert!(prev > 0, "reference count underflow");
        prev - 1
    }
}

/// Shared handle to a stored value. The value stays alive while the handle
/// does, even after its entry is reclaimed.
pub struct ValueRef<T>(Arc<UniqueStoreEntry<T>>);

impl<T> Deref for ValueRef<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.0.value()
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.value().fmt(f)
    }
}

/// Allocator for unique values of type `T`, accessed through [`EntryRef`].
///
/// Never deduplicates by itself; that is the dictionary's job.
pub struct UniqueStoreAllocator<T> {
    store: DataStore<UniqueStoreEntry<T>>,
}

impl<T: Clone + Send + Sync> UniqueStoreAllocator<T> {
    pub fn new(layout: RefLayout, initial_entries: usize, max_entries: usize) -> Self {
        Self {
            store: DataStore::new(layout, initial_entries, max_entries),
        }
    }

    /// Store `value` with a zero reference count
    pub fn allocate(&self, value: T) -> EntryRef {
        self.store.allocate(UniqueStoreEntry::new(value))
    }

    #[inline]
    pub fn get(&self, entry_ref: EntryRef) -> ValueRef<T> {
        ValueRef(self.get_wrapped(entry_ref))
    }

    #[inline]
    pub fn get_wrapped(&self, entry_ref: EntryRef) -> Arc<UniqueStoreEntry<T>> {
        self.store.get(entry_ref)
    }

    pub fn hold(&self, entry_ref: EntryRef) {
        self.store.hold(entry_ref);
    }

    /// Copy an entry (value and count) to the active buffer. Every stored
    /// copy of the old reference must be rewritten by the caller.
    pub fn move_entry(&self, entry_ref: EntryRef) -> EntryRef {
        let old = self.get_wrapped(entry_ref);
        let new_ref = self.allocate(old.value().clone());
        self.get_wrapped(new_ref).set_ref_count(old.ref_count());
        new_ref
    }

    pub fn data_store(&self) -> &DataStore<UniqueStoreEntry<T>> {
        &self.store
    }
}

/// Outcome of [`UniqueStore::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddResult {
    pub entry_ref: EntryRef,
    /// False if an equal value was already stored
    pub inserted: bool,
}

/// Old -> new references produced by a compaction pass
#[derive(Debug, Default)]
pub struct CompactionRemap {
    moved: FxHashMap<EntryRef, EntryRef>,
}

impl CompactionRemap {
    pub(crate) fn insert(&mut self, old: EntryRef, new: EntryRef) {
        self.moved.insert(old, new);
    }

    /// New reference for `old`, if it was moved
    pub fn get(&self, old: EntryRef) -> Option<EntryRef> {
        self.moved.get(&old).copied()
    }

    /// `entry_ref` after the pass (unchanged if it was not moved)
    pub fn remap(&self, entry_ref: EntryRef) -> EntryRef {
        self.get(entry_ref).unwrap_or(entry_ref)
    }

    pub fn len(&self) -> usize {
        self.moved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moved.is_empty()
    }
}

/// Deduplicating, reference-counted store of values ordered by `T: Ord`
pub struct UniqueStore<T> {
    allocator: UniqueStoreAllocator<T>,
    dict: UniqueStoreDictionary,
}

impl<T: Ord + Clone + Send + Sync> UniqueStore<T> {
    pub fn new(layout: RefLayout, initial_entries: usize, max_entries: usize) -> Self {
        Self {
            allocator: UniqueStoreAllocator::new(layout, initial_entries, max_entries),
            dict: UniqueStoreDictionary::new(layout, initial_entries, max_entries),
        }
    }

    /// Add one owner of `value`, storing it if no equal value exists
    pub fn add(&self, value: &T) -> AddResult {
        let allocator = &self.allocator;
        let result = self.dict.add(
            |r| allocator.get(r).cmp(value),
            || allocator.allocate(value.clone()),
        );
        allocator.get_wrapped(result.entry_ref).inc_ref_count();
        result
    }

    pub fn find(&self, value: &T) -> Option<EntryRef> {
        self.dict.find(|r| self.allocator.get(r).cmp(value))
    }

    #[inline]
    pub fn get(&self, entry_ref: EntryRef) -> ValueRef<T> {
        self.allocator.get(entry_ref)
    }

    pub fn ref_count(&self, entry_ref: EntryRef) -> u32 {
        self.allocator.get_wrapped(entry_ref).ref_count()
    }

    /// Drop one owner. The last owner takes the value out of the dictionary
    /// and puts it on hold.
    pub fn remove(&self, entry_ref: EntryRef) {
        let allocator = &self.allocator;
        if allocator.get_wrapped(entry_ref).dec_ref_count() == 0 {
            let value = allocator.get(entry_ref);
            self.dict.remove(|r| allocator.get(r).cmp(&*value), entry_ref);
            allocator.hold(entry_ref);
        }
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.len() == 0
    }

    /// References of all stored values in value order
    pub fn refs(&self) -> impl Iterator<Item = EntryRef> + '_ {
        self.dict.iter()
    }

    /// Bulk loader for an empty store
    pub fn builder(&self, unique_values_hint: usize) -> UniqueStoreBuilder<'_, T> {
        assert!(self.is_empty(), "bulk build into a non-empty unique store");
        UniqueStoreBuilder::new(&self.allocator, &self.dict, unique_values_hint)
    }

    /// Move every live value out of buffers whose dead share exceeds `ratio`
    /// and rewrite the dictionary. Other holders of references must apply the
    /// returned remap before the next generation commit.
    pub fn compact_worst(&self, ratio: f64) -> CompactionRemap {
        let store = self.allocator.data_store();
        let compacting = store.start_compact(ratio);
        let mut remap = CompactionRemap::default();
        if compacting.is_empty() {
            return remap;
        }
        for entry_ref in self.dict.iter() {
            if compacting.contains(entry_ref) {
                remap.insert(entry_ref, self.allocator.move_entry(entry_ref));
            }
        }
        self.dict.remap(&remap);
        debug!(
            "unique store compaction moved {} values out of buffers {:?}",
            remap.len(),
            compacting.buffer_ids()
        );
        store.finish_compact(compacting);
        remap
    }

    pub fn assign_generation(&self, generation: Generation) {
        self.allocator.data_store().assign_generation(generation);
        self.dict.assign_generation(generation);
    }

    /// Returns the number of buffers freed
    pub fn reclaim_memory(&self, oldest_used: Generation) -> usize {
        self.allocator.data_store().reclaim_memory(oldest_used) + self.dict.reclaim_memory(oldest_used)
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = self.allocator.data_store().memory_usage();
        usage.merge(&self.dict.memory_usage());
        usage
    }
}

impl<T: Ord + Clone + Send + Sync> Default for UniqueStore<T> {
    fn default() -> Self {
        Self::new(RefLayout::default(), 1024, 65536)
    }
}
