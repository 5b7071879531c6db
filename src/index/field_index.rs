use crate::btree::{BTree, LeafEntry};
use crate::datastore::{AtomicEntryRef, EntryRef, GenerationGuard, GenerationHandler};
use crate::index::feature_store::FeatureStore;
use crate::index::features::DocIdAndFeatures;
use crate::index::posting_store::PostingListStore;
use crate::index::remover::DocumentRemover;
use crate::index::stats::{FieldIndexStats, MemoryUsage};
use crate::index::types::FieldIndexConfig;
use crate::index::word_store::WordStore;
use crate::index::writer::OrderedFieldIndexInserter;
use anyhow::Result;
use log::debug;
use parking_lot::{Mutex, MutexGuard};
use std::cmp::Ordering;

/// Dictionary from interned word to the root of its posting list
pub type DictionaryTree = BTree<EntryRef, AtomicEntryRef>;

/// One dictionary entry: interned word and posting-list root slot
pub type DictionaryEntry = LeafEntry<EntryRef, AtomicEntryRef>;

/// In-memory inverted index for one field.
///
/// One thread writes (through an [`OrderedFieldIndexInserter`] and
/// [`commit`](Self::commit)); any number of threads read concurrently
/// through the lookup methods. Every lookup holds a [`GenerationGuard`] while
/// it follows references, since a commit frees memory no guard protects.
pub struct FieldIndex {
    config: FieldIndexConfig,
    words: WordStore,
    features: FeatureStore,
    dictionary: DictionaryTree,
    postings: PostingListStore,
    remover: Mutex<DocumentRemover>,
    generations: GenerationHandler,
}

impl FieldIndex {
    pub fn new(config: FieldIndexConfig) -> Result<Self> {
        config.validate()?;
        let layout = config.layout();
        let initial = config.initial_buffer_entries;
        let max = config.max_buffer_entries;
        Ok(Self {
            words: WordStore::new(layout, initial),
            features: FeatureStore::new(layout, initial),
            dictionary: DictionaryTree::new(layout, initial, max),
            postings: PostingListStore::new(layout, initial, max),
            remover: Mutex::new(DocumentRemover::new()),
            generations: GenerationHandler::new(),
            config,
        })
    }

    pub fn config(&self) -> &FieldIndexConfig {
        &self.config
    }

    pub fn word_store(&self) -> &WordStore {
        &self.words
    }

    pub fn feature_store(&self) -> &FeatureStore {
        &self.features
    }

    pub fn dictionary(&self) -> &DictionaryTree {
        &self.dictionary
    }

    pub fn posting_store(&self) -> &PostingListStore {
        &self.postings
    }

    /// Writer-side access to the word lists of indexed documents
    pub fn document_remover(&self) -> MutexGuard<'_, DocumentRemover> {
        self.remover.lock()
    }

    pub(crate) fn remover_lock(&self) -> &Mutex<DocumentRemover> {
        &self.remover
    }

    pub fn generation_handler(&self) -> &GenerationHandler {
        &self.generations
    }

    pub fn add_word(&self, word: &str) -> EntryRef {
        self.words.add_word(word)
    }

    pub fn add_features(&self, features: &DocIdAndFeatures) -> EntryRef {
        self.features.add_features(features)
    }

    pub fn add_features_guard_bytes(&self) {
        self.features.add_guard_bytes();
    }

    /// Inserter notifying this index's document remover
    pub fn inserter(&self) -> OrderedFieldIndexInserter<'_> {
        OrderedFieldIndexInserter::new(self)
    }

    /// Orders a stored word against `target`
    pub(crate) fn word_cmp<'a>(&'a self, target: &'a [u8]) -> impl Fn(&EntryRef) -> Ordering + 'a {
        move |word_ref| self.words.compare(*word_ref, target)
    }

    /// Dictionary entry for `word`. The slot stays readable after the guard
    /// taken for the search is dropped; the root it holds does not.
    pub fn find_word(&self, word: &str) -> Option<DictionaryEntry> {
        let _guard = self.generations.take_guard();
        self.dictionary.find(self.word_cmp(word.as_bytes()))
    }

    /// Tag everything held since the last commit with the current generation,
    /// start a new generation and reclaim what no reader can still observe
    pub fn commit(&self) {
        let generation = self.generations.current_generation();
        self.words.assign_generation(generation);
        self.features.assign_generation(generation);
        self.dictionary.assign_generation(generation);
        self.postings.assign_generation(generation);
        self.generations.increment_generation();
        let oldest_used = self.generations.oldest_used_generation();
        let freed = self.words.reclaim_memory(oldest_used)
            + self.features.reclaim_memory(oldest_used)
            + self.dictionary.reclaim_memory(oldest_used)
            + self.postings.reclaim_memory(oldest_used);
        debug!(
            "committed generation {}, oldest used generation {}, {} buffers freed",
            generation, oldest_used, freed
        );
    }

    pub fn take_generation_guard(&self) -> GenerationGuard {
        self.generations.take_guard()
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        self.stats().memory()
    }

    pub fn stats(&self) -> FieldIndexStats {
        FieldIndexStats {
            num_words: self.dictionary.len(),
            num_documents: self.remover.lock().num_documents(),
            words: self.words.memory_usage(),
            features: self.features.memory_usage(),
            dictionary: self.dictionary.memory_usage(),
            posting_lists: self.postings.memory_usage(),
        }
    }
}
