use crate::btree::BTreeIterator;
use crate::datastore::{AtomicEntryRef, EntryRef};
use crate::index::features::DocIdAndFeatures;
use crate::index::field_index::FieldIndex;
use crate::index::remover::{DocumentRemover, FieldIndexInsertListener};
use crate::index::types::{DocId, NO_DOC_ID, PostingListEntry, PostingListKeyData};
use log::debug;
use parking_lot::Mutex;

/// Sorted operation stream into a field index.
///
/// Callers present words in strictly increasing order and, within a word,
/// documents in increasing order. The only repeated document allowed is a
/// remove followed by an add, which updates the document.
pub trait IndexInserter {
    /// Close the current word and open `word`, which must sort after it
    fn set_next_word(&mut self, word: &str);

    fn add(&mut self, doc_id: DocId, features: &DocIdAndFeatures);

    /// Remove a document currently indexed under the open word
    fn remove(&mut self, doc_id: DocId);

    /// Apply every pending batch to the dictionary and posting lists
    fn flush(&mut self);

    /// Make flushed changes visible as a new generation
    fn commit(&mut self);

    /// Start over from the first word; nothing may be pending
    fn rewind(&mut self);

    /// Interned reference of the word at the dictionary cursor
    fn word_ref(&self) -> EntryRef;
}

/// Forwards drain notifications to the field index's document remover
struct RemoverListener<'a>(&'a Mutex<DocumentRemover>);

impl FieldIndexInsertListener for RemoverListener<'_> {
    fn insert(&mut self, word_ref: EntryRef, doc_id: DocId) {
        self.0.lock().insert(word_ref, doc_id);
    }

    fn flush(&mut self) {
        self.0.lock().flush();
    }
}

/// Batches sorted operations per word and merges them into the field index
/// on [`flush`](IndexInserter::flush).
///
/// Adds and removes accumulate across words; each finished word leaves a
/// (word, adds, removes) entry describing its slice of the batches. The
/// drain walks those entries in order with a dictionary cursor that only
/// ever seeks forward.
pub struct OrderedFieldIndexInserter<'a> {
    index: &'a FieldIndex,
    listener: Box<dyn FieldIndexInsertListener + 'a>,
    dict_itr: BTreeIterator<'a, EntryRef, AtomicEntryRef>,
    word: String,
    prev_doc_id: DocId,
    prev_add: bool,
    word_entries: Vec<(String, usize, usize)>,
    adds: Vec<PostingListKeyData>,
    removes: Vec<DocId>,
    adds_offset: usize,
    removes_offset: usize,
}

impl<'a> OrderedFieldIndexInserter<'a> {
    pub fn new(index: &'a FieldIndex) -> Self {
        Self::with_listener(index, Box::new(RemoverListener(index.remover_lock())))
    }

    pub fn with_listener(
        index: &'a FieldIndex,
        listener: Box<dyn FieldIndexInsertListener + 'a>,
    ) -> Self {
        Self {
            index,
            listener,
            dict_itr: index.dictionary().begin(),
            word: String::new(),
            prev_doc_id: NO_DOC_ID,
            prev_add: false,
            word_entries: Vec::new(),
            adds: Vec::new(),
            removes: Vec::new(),
            adds_offset: 0,
            removes_offset: 0,
        }
    }

    /// Current open word ("" before the first word)
    pub fn word(&self) -> &str {
        &self.word
    }

    fn flush_word(&mut self) {
        if self.adds.len() == self.adds_offset && self.removes.len() == self.removes_offset {
            return;
        }
        self.word_entries.push((
            self.word.clone(),
            self.adds.len() - self.adds_offset,
            self.removes.len() - self.removes_offset,
        ));
        self.adds_offset = self.adds.len();
        self.removes_offset = self.removes.len();
    }

    fn drain(&mut self) {
        let index = self.index;
        if !self.adds.is_empty() {
            index.add_features_guard_bytes();
        }
        let postings = index.posting_store();
        let features = index.feature_store();
        let mut adds_offset = 0;
        let mut removes_offset = 0;
        let mut new_words = 0;
        let word_entries = std::mem::take(&mut self.word_entries);
        for (word, num_adds, num_removes) in &word_entries {
            let adds = &self.adds[adds_offset..adds_offset + num_adds];
            let removes = &self.removes[removes_offset..removes_offset + num_removes];
            let cmp = index.word_cmp(word.as_bytes());
            if self.dict_itr.valid() && cmp(&self.dict_itr.key()).is_lt() {
                self.dict_itr.seek(&cmp);
            }
            if !self.dict_itr.valid() || cmp(&self.dict_itr.key()).is_gt() {
                let word_ref = index.add_word(word);
                self.dict_itr.insert(word_ref, AtomicEntryRef::default());
                new_words += 1;
            }
            debug_assert!(
                cmp(&self.dict_itr.key()).is_eq(),
                "dictionary cursor not on {:?}",
                word
            );
            let word_ref = self.dict_itr.key();
            for add in adds {
                self.listener.insert(word_ref, add.doc_id);
            }
            let entry = self.dict_itr.entry();
            let slot = entry.value();
            let old_root = slot.load_relaxed();
            let mut root = old_root;
            postings.apply(&mut root, adds, removes, |dropped| {
                features.hold(dropped.data.features())
            });
            if root != old_root {
                slot.store_release(root);
            }
            adds_offset += num_adds;
            removes_offset += num_removes;
        }
        assert_eq!(adds_offset, self.adds.len(), "unaccounted adds in drain");
        assert_eq!(removes_offset, self.removes.len(), "unaccounted removes in drain");
        debug!(
            "flushed {} words ({} new): {} adds, {} removes",
            word_entries.len(),
            new_words,
            self.adds.len(),
            self.removes.len()
        );
        self.word_entries = word_entries;
        self.word_entries.clear();
        self.adds.clear();
        self.removes.clear();
        self.adds_offset = 0;
        self.removes_offset = 0;
        self.listener.flush();
    }
}

impl IndexInserter for OrderedFieldIndexInserter<'_> {
    fn set_next_word(&mut self, word: &str) {
        self.flush_word();
        assert!(
            self.word.as_str() < word,
            "word {:?} does not sort after {:?}",
            word,
            self.word
        );
        self.word.clear();
        self.word.push_str(word);
        self.prev_doc_id = NO_DOC_ID;
        self.prev_add = false;
    }

    fn add(&mut self, doc_id: DocId, features: &DocIdAndFeatures) {
        assert!(!self.word.is_empty(), "add without an open word");
        assert!(doc_id != NO_DOC_ID, "add of reserved doc id");
        assert!(
            self.prev_doc_id == NO_DOC_ID
                || self.prev_doc_id < doc_id
                || (self.prev_doc_id == doc_id && !self.prev_add),
            "add of doc {} after doc {} in word {:?}",
            doc_id,
            self.prev_doc_id,
            self.word
        );
        assert!(
            features.num_occs <= features.field_length,
            "num_occs {} exceeds field_length {}",
            features.num_occs,
            features.field_length
        );
        let features_ref = self.index.add_features(features);
        self.adds.push(PostingListKeyData::new(
            doc_id,
            PostingListEntry::new(features_ref, features.num_occs, features.field_length),
        ));
        self.prev_doc_id = doc_id;
        self.prev_add = true;
    }

    fn remove(&mut self, doc_id: DocId) {
        assert!(!self.word.is_empty(), "remove without an open word");
        assert!(doc_id != NO_DOC_ID, "remove of reserved doc id");
        assert!(
            self.prev_doc_id == NO_DOC_ID || self.prev_doc_id < doc_id,
            "remove of doc {} after doc {} in word {:?}",
            doc_id,
            self.prev_doc_id,
            self.word
        );
        // full dictionary search per remove; checked in debug builds only
        debug_assert!(
            self.index
                .find(&self.word)
                .is_some_and(|view| view.get(doc_id).is_some()),
            "remove of doc {} not indexed under {:?}",
            doc_id,
            self.word
        );
        self.removes.push(doc_id);
        self.prev_doc_id = doc_id;
        self.prev_add = false;
    }

    fn flush(&mut self) {
        self.flush_word();
        if self.word_entries.is_empty() {
            return;
        }
        self.drain();
    }

    fn commit(&mut self) {
        self.index.commit();
    }

    fn rewind(&mut self) {
        assert!(
            self.adds.is_empty() && self.removes.is_empty(),
            "rewind with a pending batch"
        );
        self.word.clear();
        self.prev_doc_id = NO_DOC_ID;
        self.prev_add = false;
        self.dict_itr.begin();
    }

    fn word_ref(&self) -> EntryRef {
        self.dict_itr.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::FieldIndexConfig;

    fn index() -> FieldIndex {
        FieldIndex::new(FieldIndexConfig::default()).unwrap()
    }

    fn features(doc_id: DocId) -> DocIdAndFeatures {
        DocIdAndFeatures::with_positions(doc_id, vec![0], 4)
    }

    #[test]
    #[should_panic(expected = "does not sort after")]
    fn test_words_must_increase() {
        let index = index();
        let mut inserter = index.inserter();
        inserter.set_next_word("banana");
        inserter.set_next_word("apple");
    }

    #[test]
    #[should_panic(expected = "does not sort after")]
    fn test_empty_word_rejected() {
        let index = index();
        index.inserter().set_next_word("");
    }

    #[test]
    #[should_panic(expected = "add without an open word")]
    fn test_add_requires_open_word() {
        let index = index();
        index.inserter().add(1, &features(1));
    }

    #[test]
    #[should_panic(expected = "after doc 9")]
    fn test_docs_must_increase() {
        let index = index();
        let mut inserter = index.inserter();
        inserter.set_next_word("apple");
        inserter.add(9, &features(9));
        inserter.add(5, &features(5));
    }

    #[test]
    #[should_panic(expected = "add of doc 5 after doc 5")]
    fn test_add_twice_rejected() {
        let index = index();
        let mut inserter = index.inserter();
        inserter.set_next_word("apple");
        inserter.add(5, &features(5));
        inserter.add(5, &features(5));
    }

    #[test]
    #[should_panic(expected = "remove of doc 5 after doc 5")]
    fn test_add_then_remove_same_doc_rejected() {
        let index = index();
        let mut inserter = index.inserter();
        inserter.set_next_word("apple");
        inserter.add(5, &features(5));
        inserter.remove(5);
    }

    #[test]
    #[should_panic(expected = "reserved doc id")]
    fn test_reserved_doc_id_rejected() {
        let index = index();
        let mut inserter = index.inserter();
        inserter.set_next_word("apple");
        inserter.remove(NO_DOC_ID);
    }

    #[test]
    #[should_panic(expected = "exceeds field_length")]
    fn test_occurrences_bounded_by_field_length() {
        let index = index();
        let mut inserter = index.inserter();
        inserter.set_next_word("apple");
        let mut f = features(1);
        f.num_occs = 5;
        inserter.add(1, &f);
    }

    #[test]
    #[should_panic(expected = "pending batch")]
    fn test_rewind_with_pending_batch() {
        let index = index();
        let mut inserter = index.inserter();
        inserter.set_next_word("apple");
        inserter.add(1, &features(1));
        inserter.rewind();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "not indexed under")]
    fn test_remove_without_prior_add_rejected() {
        let index = index();
        let mut inserter = index.inserter();
        inserter.set_next_word("apple");
        inserter.add(9, &features(9));
        inserter.flush();
        inserter.set_next_word("banana");
        inserter.remove(9);
    }

    #[test]
    fn test_remove_then_add_same_doc_accepted() {
        let index = index();
        let mut inserter = index.inserter();
        inserter.set_next_word("apple");
        inserter.add(5, &features(5));
        inserter.flush();
        inserter.rewind();
        inserter.set_next_word("apple");
        inserter.remove(5);
        inserter.add(5, &features(5));
        inserter.flush();
        assert_eq!(index.doc_freq("apple"), 1);
    }

    #[test]
    fn test_word_ref_tracks_cursor() {
        let index = index();
        let mut inserter = index.inserter();
        inserter.set_next_word("apple");
        inserter.add(1, &features(1));
        inserter.flush();
        let word_ref = inserter.word_ref();
        assert_eq!(index.word_store().get_word(word_ref), "apple");
    }
}
