use crate::datastore::EntryRef;
use crate::index::types::DocId;
use rustc_hash::FxHashMap;

/// Receives (word, document) pairs as the inserter publishes them
pub trait FieldIndexInsertListener {
    fn insert(&mut self, word_ref: EntryRef, doc_id: DocId);

    /// All notifications of one drain have been delivered
    fn flush(&mut self);
}

/// Remembers which words each document was indexed under, so removing a
/// document does not need to scan the dictionary.
#[derive(Debug, Default)]
pub struct DocumentRemover {
    pending: Vec<(DocId, EntryRef)>,
    words: FxHashMap<DocId, Vec<EntryRef>>,
}

impl DocumentRemover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget a document and return the words it was indexed under
    pub fn remove_document(&mut self, doc_id: DocId) -> Vec<EntryRef> {
        self.words.remove(&doc_id).unwrap_or_default()
    }

    /// Words recorded for a document
    pub fn words_of(&self, doc_id: DocId) -> &[EntryRef] {
        self.words.get(&doc_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn num_documents(&self) -> usize {
        self.words.len()
    }
}

impl FieldIndexInsertListener for DocumentRemover {
    fn insert(&mut self, word_ref: EntryRef, doc_id: DocId) {
        self.pending.push((doc_id, word_ref));
    }

    fn flush(&mut self) {
        self.pending.sort_unstable();
        self.pending.dedup();
        for (doc_id, word_ref) in self.pending.drain(..) {
            let words = self.words.entry(doc_id).or_default();
            // an update re-adds words the document already had
            if !words.contains(&word_ref) {
                words.push(word_ref);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_filed_on_flush() {
        let mut remover = DocumentRemover::new();
        remover.insert(EntryRef::new(10), 1);
        remover.insert(EntryRef::new(20), 1);
        remover.insert(EntryRef::new(20), 2);
        assert_eq!(remover.num_documents(), 0);
        remover.flush();
        assert_eq!(remover.words_of(1), &[EntryRef::new(10), EntryRef::new(20)]);
        assert_eq!(remover.num_documents(), 2);
    }

    #[test]
    fn test_readding_word_is_not_duplicated() {
        let mut remover = DocumentRemover::new();
        remover.insert(EntryRef::new(10), 1);
        remover.flush();
        remover.insert(EntryRef::new(10), 1);
        remover.flush();
        assert_eq!(remover.remove_document(1), vec![EntryRef::new(10)]);
        assert!(remover.remove_document(1).is_empty());
        assert_eq!(remover.num_documents(), 0);
    }
}
