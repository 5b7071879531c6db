use crate::datastore::GenerationGuard;
use crate::index::feature_store::FeatureStore;
use crate::index::features::WordDocElementFeatures;
use crate::index::field_index::FieldIndex;
use crate::index::posting_store::PostingList;
use crate::index::types::{DocId, PostingListKeyData};
use roaring::RoaringBitmap;
use std::sync::Arc;

/// Snapshot of one word's posting list.
///
/// The records are immutable; a concurrent flush publishes a new list
/// instead of changing this one. The view holds a generation guard, so the
/// feature blobs it references stay readable until it is dropped.
#[derive(Clone)]
pub struct PostingListView<'a> {
    records: Arc<PostingList>,
    features: &'a FeatureStore,
    _guard: GenerationGuard,
}

impl PostingListView<'_> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PostingListKeyData] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PostingListKeyData> {
        self.records.iter()
    }

    pub fn doc_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.records.iter().map(|r| r.doc_id)
    }

    pub fn get(&self, doc_id: DocId) -> Option<&PostingListKeyData> {
        self.records
            .binary_search_by_key(&doc_id, |r| r.doc_id)
            .ok()
            .map(|i| &self.records[i])
    }

    /// Decoded features of a document in this list
    pub fn features(&self, doc_id: DocId) -> Option<Vec<WordDocElementFeatures>> {
        self.get(doc_id)
            .map(|r| self.features.get_features(r.data.features()))
    }
}

impl<'v> IntoIterator for &'v PostingListView<'_> {
    type Item = &'v PostingListKeyData;
    type IntoIter = std::slice::Iter<'v, PostingListKeyData>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Lookups, safe from any thread while the writer flushes and commits.
impl FieldIndex {
    /// Posting list of `term`, or `None` if the word was never indexed.
    /// A word whose documents were all removed yields an empty view.
    pub fn find(&self, term: &str) -> Option<PostingListView<'_>> {
        // the guard must be in place before the root is loaded
        let guard = self.take_generation_guard();
        let entry = self.find_word(term)?;
        Some(PostingListView {
            records: self.posting_store().get(entry.value().load_acquire()),
            features: self.feature_store(),
            _guard: guard,
        })
    }

    pub fn get_docs(&self, term: &str) -> RoaringBitmap {
        match self.find(term) {
            Some(view) => view.doc_ids().collect(),
            None => RoaringBitmap::new(),
        }
    }

    pub fn doc_freq(&self, term: &str) -> usize {
        self.find(term).map_or(0, |view| view.len())
    }

    pub fn contains(&self, term: &str) -> bool {
        self.find_word(term).is_some()
    }

    /// Every word in the dictionary, in sorted order
    pub fn words(&self) -> Vec<String> {
        let _guard = self.take_generation_guard();
        let words = self.word_store();
        self.dictionary()
            .iter()
            .map(|entry| words.get_word(entry.key()))
            .collect()
    }

    pub fn num_words(&self) -> usize {
        self.dictionary().len()
    }
}

#[cfg(test)]
mod tests {
    use crate::index::features::DocIdAndFeatures;
    use crate::index::field_index::FieldIndex;
    use crate::index::types::FieldIndexConfig;
    use crate::index::writer::IndexInserter;

    #[test]
    fn test_view_lookups() {
        let index = FieldIndex::new(FieldIndexConfig::default()).unwrap();
        let mut inserter = index.inserter();
        inserter.set_next_word("fox");
        inserter.add(2, &DocIdAndFeatures::with_positions(2, vec![1], 3));
        inserter.add(7, &DocIdAndFeatures::with_positions(7, vec![0, 4], 6));
        inserter.flush();

        let view = index.find("fox").unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.doc_ids().collect::<Vec<_>>(), vec![2, 7]);
        assert_eq!(view.get(7).unwrap().data.num_occs(), 2);
        assert!(view.get(3).is_none());
        let features = view.features(7).unwrap();
        assert_eq!(features[0].positions, vec![0, 4]);

        assert!(index.find("dog").is_none());
        assert!(index.get_docs("dog").is_empty());
        assert_eq!(index.get_docs("fox").len(), 2);
        assert_eq!(index.words(), vec!["fox".to_string()]);
        let borrowed: Vec<_> = (&view).into_iter().map(|r| r.doc_id).collect();
        assert_eq!(borrowed, vec![2, 7]);
    }

    #[test]
    fn test_view_survives_commits() {
        let index = FieldIndex::new(FieldIndexConfig::default()).unwrap();
        let mut inserter = index.inserter();
        inserter.set_next_word("fox");
        inserter.add(2, &DocIdAndFeatures::with_positions(2, vec![1], 3));
        inserter.flush();
        inserter.commit();

        let view = index.find("fox").unwrap();
        inserter.rewind();
        inserter.set_next_word("fox");
        inserter.remove(2);
        inserter.add(2, &DocIdAndFeatures::with_positions(2, vec![0], 3));
        inserter.flush();
        inserter.commit();
        inserter.commit();

        assert_eq!(view.features(2).unwrap()[0].positions, vec![1]);
        assert_eq!(index.find("fox").unwrap().features(2).unwrap()[0].positions, vec![0]);
    }
}
