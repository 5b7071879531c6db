use crate::datastore::{ByteStore, EntryRef, Generation, RefLayout};
use crate::index::stats::MemoryUsage;
use std::cmp::Ordering;

/// Interned word bytes. Words are never removed; the dictionary orders its
/// keys by comparing against these bytes.
pub struct WordStore {
    bytes: ByteStore,
}

impl WordStore {
    pub fn new(layout: RefLayout, initial_bytes: usize) -> Self {
        Self {
            bytes: ByteStore::new(layout, initial_bytes),
        }
    }

    pub fn add_word(&self, word: &str) -> EntryRef {
        self.bytes.allocate(word.as_bytes())
    }

    pub fn get_word(&self, word_ref: EntryRef) -> String {
        String::from_utf8_lossy(&self.bytes.read(word_ref)).into_owned()
    }

    /// Order the stored word against `target`
    #[inline]
    pub fn compare(&self, word_ref: EntryRef, target: &[u8]) -> Ordering {
        self.bytes.compare(word_ref, target)
    }

    pub fn assign_generation(&self, generation: Generation) {
        self.bytes.assign_generation(generation);
    }

    pub fn reclaim_memory(&self, oldest_used: Generation) -> usize {
        self.bytes.reclaim_memory(oldest_used)
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        self.bytes.memory_usage()
    }
}
