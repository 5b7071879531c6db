use super::buffer::{BufferBook, BufferState, CompactingBuffers};
use super::entry_ref::{EntryRef, RefLayout};
use super::generation::Generation;
use crate::index::stats::MemoryUsage;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::Arc;

/// Fixed-capacity array of slots, each written once per buffer lifetime
struct Buffer<T> {
    slots: Box<[ArcSwapOption<T>]>,
}

impl<T> Buffer<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| ArcSwapOption::empty()).collect(),
        }
    }
}

/// Append-only store of values of one type, addressed by [`EntryRef`].
///
/// Values are immutable once stored and handed out as shared [`Arc`]s, so
/// [`get`](Self::get) is lock-free and safe to call from any thread while the
/// single writer allocates. Allocation, holds and compaction bookkeeping are
/// serialized behind a writer lock that readers never take.
///
/// Reclaiming a generation drops the values held in it and the memory of
/// every buffer that turned dead; the buffer ids are reused. A reader must
/// hold a generation guard while it follows references, otherwise a
/// reference it loaded may be reclaimed under it.
pub struct DataStore<T> {
    layout: RefLayout,
    buffers: Box<[ArcSwapOption<Buffer<T>>]>,
    book: Mutex<BufferBook>,
}

impl<T: Send + Sync> DataStore<T> {
    pub fn new(layout: RefLayout, initial_entries: usize, max_entries: usize) -> Self {
        Self {
            layout,
            buffers: (0..layout.num_buffers()).map(|_| ArcSwapOption::empty()).collect(),
            book: Mutex::new(BufferBook::new(layout, initial_entries, max_entries)),
        }
    }

    pub fn layout(&self) -> RefLayout {
        self.layout
    }

    pub fn allocate(&self, value: T) -> EntryRef {
        let mut book = self.book.lock();
        let buffer_id = match book.active_with_room(1, 0) {
            Some(id) => id,
            None => self.open_buffer(&mut book),
        };
        let offset = book.bump(buffer_id, 1);
        let loaded = self.buffers[buffer_id as usize].load();
        let Some(buffer) = (*loaded).as_ref() else {
            unreachable!("active buffer {} has no memory", buffer_id)
        };
        let slot = &buffer.slots[offset];
        if slot.load().is_some() {
            panic!("slot {} in buffer {} written twice", offset, buffer_id);
        }
        slot.store(Some(Arc::new(value)));
        self.layout.make(buffer_id, offset)
    }

    fn open_buffer(&self, book: &mut BufferBook) -> u32 {
        let buffer_id = book.pick_free().unwrap_or_else(|| {
            panic!(
                "data store exhausted: all {} buffers in use",
                self.layout.num_buffers()
            )
        });
        let capacity = book.next_capacity(1);
        self.buffers[buffer_id as usize].store(Some(Arc::new(Buffer::with_capacity(capacity))));
        book.activate(buffer_id, capacity);
        buffer_id
    }

    /// Value behind `entry_ref`. Panics if the reference does not denote a
    /// stored value.
    #[inline]
    pub fn get(&self, entry_ref: EntryRef) -> Arc<T> {
        match self.try_get(entry_ref) {
            Some(value) => value,
            None => panic!("dereferenced invalid or stale {:?}", entry_ref),
        }
    }

    #[inline]
    pub fn try_get(&self, entry_ref: EntryRef) -> Option<Arc<T>> {
        if !entry_ref.valid() {
            return None;
        }
        let buffer = self
            .buffers
            .get(self.layout.buffer_id(entry_ref) as usize)?
            .load();
        (*buffer)
            .as_ref()?
            .slots
            .get(self.layout.offset(entry_ref))?
            .load_full()
    }

    /// Put an entry on hold. It stays readable until the generation it is
    /// assigned to is no longer in use.
    pub fn hold(&self, entry_ref: EntryRef) {
        self.book.lock().hold(entry_ref, 1);
    }

    pub fn assign_generation(&self, generation: Generation) {
        self.book.lock().assign_generation(generation);
    }

    /// Drop held values no reader can observe and free dead buffers.
    /// Returns the number of buffers freed.
    pub fn reclaim_memory(&self, oldest_used: Generation) -> usize {
        self.reclaim_memory_with(oldest_used, |_| {})
    }

    /// [`reclaim_memory`](Self::reclaim_memory), passing each dropped value
    /// to `on_drop` first
    pub fn reclaim_memory_with(&self, oldest_used: Generation, mut on_drop: impl FnMut(&T)) -> usize {
        let mut book = self.book.lock();
        book.reclaim(oldest_used, |entry_ref| {
            if let Some(value) = self.take_slot(entry_ref) {
                on_drop(&value);
            }
        });
        let dead = book.take_dead();
        for &id in &dead {
            self.buffers[id as usize].store(None);
        }
        dead.len()
    }

    fn take_slot(&self, entry_ref: EntryRef) -> Option<Arc<T>> {
        let buffer = self.buffers[self.layout.buffer_id(entry_ref) as usize].load();
        (*buffer).as_ref()?.slots[self.layout.offset(entry_ref)].swap(None)
    }

    pub fn start_compact(&self, ratio: f64) -> CompactingBuffers {
        self.book.lock().start_compact(ratio)
    }

    pub fn finish_compact(&self, compacting: CompactingBuffers) {
        self.book.lock().finish_compact(compacting);
    }

    pub fn buffer_state(&self, buffer_id: u32) -> BufferState {
        self.book.lock().meta(buffer_id).state
    }

    /// Usage of the slot arrays. Values live behind their own allocations.
    pub fn memory_usage(&self) -> MemoryUsage {
        MemoryUsage::from_units(
            self.book.lock().usage(),
            std::mem::size_of::<ArcSwapOption<T>>(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DataStore<String> {
        DataStore::new(RefLayout::new(20), 2, 8)
    }

    #[test]
    fn test_allocate_and_get() {
        let store = store();
        let refs: Vec<_> = (0..20).map(|i| store.allocate(format!("v{}", i))).collect();
        for (i, r) in refs.iter().enumerate() {
            assert!(r.valid());
            assert_eq!(*store.get(*r), format!("v{}", i));
        }
        assert!(store.try_get(EntryRef::invalid()).is_none());
    }

    #[test]
    #[should_panic(expected = "invalid or stale")]
    fn test_get_null_is_fatal() {
        store().get(EntryRef::invalid());
    }

    #[test]
    fn test_buffer_growth_keeps_refs_stable() {
        let store = store();
        let first = store.allocate("first".to_string());
        for i in 0..100 {
            store.allocate(i.to_string());
        }
        assert_eq!(*store.get(first), "first");
        let usage = store.memory_usage();
        assert!(usage.allocated_bytes >= usage.used_bytes);
    }

    #[test]
    fn test_reclaim_frees_dead_buffers() {
        let store = store();
        let refs: Vec<_> = (0..12).map(|i| store.allocate(i.to_string())).collect();
        for r in &refs {
            store.hold(*r);
        }
        store.assign_generation(0);
        // a reader still holding a value keeps it alive
        let kept = store.get(refs[3]);
        assert_eq!(store.reclaim_memory(0), 0);
        assert_eq!(store.buffer_state(0), BufferState::Active);

        let mut dropped = Vec::new();
        // every buffer except the current active one is fully dead
        assert!(store.reclaim_memory_with(1, |v| dropped.push(v.clone())) >= 1);
        assert_eq!(dropped.len(), 12);
        assert_eq!(store.buffer_state(0), BufferState::Free);
        assert!(store.try_get(refs[0]).is_none());
        assert_eq!(*kept, "3");

        let again = store.allocate("again".to_string());
        assert_eq!(*store.get(again), "again");
    }

    #[test]
    fn test_buffer_ids_recycled_under_churn() {
        // 16 buffers of 8 slots: far fewer than the values allocated below
        let store = DataStore::<u64>::new(RefLayout::new(28), 8, 8);
        let mut live = store.allocate(0);
        for i in 1..1000u64 {
            let next = store.allocate(i);
            store.hold(live);
            store.assign_generation(i);
            store.reclaim_memory(i + 1);
            live = next;
        }
        assert_eq!(*store.get(live), 999);
    }

    #[test]
    fn test_reads_from_other_threads() {
        let store = std::sync::Arc::new(DataStore::<u64>::new(RefLayout::new(20), 4, 64));
        let refs: Vec<_> = (0..200u64).map(|i| store.allocate(i * 3)).collect();
        std::thread::scope(|s| {
            for _ in 0..4 {
                let store = &store;
                let refs = &refs;
                s.spawn(move || {
                    for (i, r) in refs.iter().enumerate() {
                        assert_eq!(*store.get(*r), i as u64 * 3);
                    }
                });
            }
            store.allocate(7);
        });
    }
}
