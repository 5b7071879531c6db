use super::entry_ref::EntryRef;
use super::unique_dictionary::UniqueStoreDictionary;
use super::unique_store::UniqueStoreAllocator;

/// Builder for a unique store dictionary, for bulk loads.
///
/// Runs in three phases, each exactly once and in order:
/// 1. [`add`](Self::add) every value, deduplicated and in dictionary order
/// 2. [`setup_ref_counts`](Self::setup_ref_counts), then count owners through
///    [`inc_ref_count`](Self::inc_ref_count)
/// 3. [`make_dictionary`](Self::make_dictionary), which consumes the builder
pub struct UniqueStoreBuilder<'a, T> {
    allocator: &'a UniqueStoreAllocator<T>,
    dict: &'a UniqueStoreDictionary,
    /// Index 0 is the null sentinel
    refs: Vec<EntryRef>,
    ref_counts: Vec<u32>,
}

impl<'a, T: Clone + Send + Sync> UniqueStoreBuilder<'a, T> {
    pub fn new(
        allocator: &'a UniqueStoreAllocator<T>,
        dict: &'a UniqueStoreDictionary,
        unique_values_hint: usize,
    ) -> Self {
        let mut refs = Vec::with_capacity(unique_values_hint + 1);
        refs.push(EntryRef::invalid());
        Self {
            allocator,
            dict,
            refs,
            ref_counts: Vec::new(),
        }
    }

    /// Allocate the next value and return its index (1-based)
    pub fn add(&mut self, value: T) -> usize {
        assert!(
            self.ref_counts.is_empty(),
            "add after setup_ref_counts"
        );
        self.refs.push(self.allocator.allocate(value));
        self.refs.len() - 1
    }

    pub fn setup_ref_counts(&mut self) {
        assert!(self.ref_counts.is_empty(), "setup_ref_counts called twice");
        self.ref_counts.resize(self.refs.len(), 0);
    }

    pub fn inc_ref_count(&mut self, idx: usize) {
        assert!(
            !self.ref_counts.is_empty(),
            "inc_ref_count before setup_ref_counts"
        );
        assert!(idx != 0, "the null sentinel has no owners");
        self.ref_counts[idx] += 1;
    }

    /// Reference of the value added at `idx`
    pub fn entry_ref(&self, idx: usize) -> EntryRef {
        self.refs[idx]
    }

    pub fn len(&self) -> usize {
        self.refs.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.refs.len() == 1
    }

    /// Write the counts into the stored entries and bulk-build the
    /// dictionary. Values nobody owns are put on hold.
    pub fn make_dictionary(self) {
        assert_eq!(
            self.ref_counts.len(),
            self.refs.len(),
            "make_dictionary before setup_ref_counts"
        );
        for (&entry_ref, &count) in self.refs.iter().zip(&self.ref_counts).skip(1) {
            self.allocator.get_wrapped(entry_ref).set_ref_count(count);
        }
        let allocator = self.allocator;
        self.dict
            .build(&self.refs, &self.ref_counts, |r| allocator.hold(r));
    }
}

#[cfg(test)]
mod tests {
    use crate::datastore::{RefLayout, UniqueStore};

    fn store() -> UniqueStore<u32> {
        UniqueStore::new(RefLayout::new(20), 16, 256)
    }

    #[test]
    fn test_three_phase_build() {
        let store = store();
        let mut builder = store.builder(4);
        let idx: Vec<usize> = [10u32, 20, 30, 40].iter().map(|&v| builder.add(v)).collect();
        assert_eq!(idx, vec![1, 2, 3, 4]);
        builder.setup_ref_counts();
        builder.inc_ref_count(1);
        builder.inc_ref_count(1);
        builder.inc_ref_count(3);
        builder.inc_ref_count(4);
        let twenty = builder.entry_ref(2);
        builder.make_dictionary();

        assert_eq!(store.len(), 3);
        let r10 = store.find(&10).unwrap();
        assert_eq!(store.ref_count(r10), 2);
        assert_eq!(store.find(&20), None);
        // unowned values are held, not dropped, until their generation passes
        assert_eq!(*store.get(twenty), 20);
        assert!(!store.add(&30).inserted);
    }

    #[test]
    #[should_panic(expected = "add after setup_ref_counts")]
    fn test_add_after_setup_is_fatal() {
        let store = store();
        let mut builder = store.builder(1);
        builder.setup_ref_counts();
        builder.add(1);
    }

    #[test]
    #[should_panic(expected = "before setup_ref_counts")]
    fn test_make_dictionary_requires_counts() {
        let store = store();
        let mut builder = store.builder(1);
        builder.add(1);
        builder.make_dictionary();
    }

    #[test]
    fn test_empty_build() {
        let store = store();
        let mut builder = store.builder(0);
        builder.setup_ref_counts();
        builder.make_dictionary();
        assert!(store.is_empty());
    }
}
