use crate::datastore::{ByteStore, CompactingBuffers, EntryRef, Generation, RefLayout};
use crate::index::features::{DocIdAndFeatures, WordDocElementFeatures, decode_features, encode_features};
use crate::index::stats::MemoryUsage;

/// Append-only store of serialized per-document features
pub struct FeatureStore {
    bytes: ByteStore,
}

impl FeatureStore {
    pub fn new(layout: RefLayout, initial_bytes: usize) -> Self {
        Self {
            bytes: ByteStore::new(layout, initial_bytes),
        }
    }

    pub fn add_features(&self, features: &DocIdAndFeatures) -> EntryRef {
        let mut buf = Vec::with_capacity(16);
        encode_features(features, &mut buf);
        self.bytes.allocate(&buf)
    }

    pub fn get_features(&self, features_ref: EntryRef) -> Vec<WordDocElementFeatures> {
        let buf = self.bytes.read(features_ref);
        match decode_features(&buf) {
            Some(elements) => elements,
            None => panic!("corrupt feature blob at {:?}", features_ref),
        }
    }

    /// Raw blob bytes, as stored
    pub fn get_raw(&self, features_ref: EntryRef) -> Vec<u8> {
        self.bytes.read(features_ref)
    }

    pub fn add_guard_bytes(&self) {
        self.bytes.add_guard_bytes();
    }

    pub fn hold(&self, features_ref: EntryRef) {
        self.bytes.hold(features_ref);
    }

    pub fn move_entry(&self, features_ref: EntryRef) -> EntryRef {
        self.bytes.move_entry(features_ref)
    }

    pub fn start_compact(&self, ratio: f64) -> CompactingBuffers {
        self.bytes.start_compact(ratio)
    }

    pub fn finish_compact(&self, compacting: CompactingBuffers) {
        self.bytes.finish_compact(compacting);
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
