use crate::index::features::DocIdAndFeatures;
use crate::index::field_index::FieldIndex;
use crate::index::types::DocId;
use crate::index::writer::IndexInserter;
use crate::utils::tokenize;
use ahash::AHashMap;
use log::debug;
use rayon::prelude::*;

/// A document waiting for the next push
enum PendingDocument {
    Removed,
    Inverted(Vec<(String, DocIdAndFeatures)>),
}

/// Invert a field's text into per-word features
fn invert_text(doc_id: DocId, text: &str, max_word_length: usize) -> Vec<(String, DocIdAndFeatures)> {
    let field = tokenize(text, max_word_length);
    let mut positions: AHashMap<String, Vec<u32>> = AHashMap::new();
    for token in field.tokens {
        positions.entry(token.text).or_default().push(token.position);
    }
    positions
        .into_iter()
        .map(|(word, positions)| {
            let features = DocIdAndFeatures::with_positions(doc_id, positions, field.field_length);
            (word, features)
        })
        .collect()
}

/// Turns documents into the sorted operation stream an [`IndexInserter`]
/// expects.
///
/// Documents are collected until [`push_documents`](Self::push_documents).
/// Re-inverting a document that is already indexed replaces it: the words it
/// was indexed under are looked up through the index's document remover and
/// removed before the new words are added.
pub struct FieldInverter<'a> {
    index: &'a FieldIndex,
    max_word_length: usize,
    pending: AHashMap<DocId, PendingDocument>,
}

impl<'a> FieldInverter<'a> {
    pub fn new(index: &'a FieldIndex) -> Self {
        Self {
            index,
            max_word_length: index.config().max_word_length,
            pending: AHashMap::new(),
        }
    }

    pub fn invert_document(&mut self, doc_id: DocId, text: &str) {
        let words = invert_text(doc_id, text, self.max_word_length);
        self.pending.insert(doc_id, PendingDocument::Inverted(words));
    }

    /// Invert a batch of documents, tokenizing in parallel
    pub fn invert_documents(&mut self, docs: &[(DocId, &str)]) {
        let max_word_length = self.max_word_length;
        let inverted: Vec<(DocId, Vec<(String, DocIdAndFeatures)>)> = docs
            .par_iter()
            .map(|&(doc_id, text)| (doc_id, invert_text(doc_id, text, max_word_length)))
            .collect();
        for (doc_id, words) in inverted {
            self.pending.insert(doc_id, PendingDocument::Inverted(words));
        }
    }

    pub fn remove_document(&mut self, doc_id: DocId) {
        self.pending.insert(doc_id, PendingDocument::Removed);
    }

    /// Documents waiting for the next push
    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    /// Replay every pending document into `inserter` in word order, then
    /// flush. Returns the number of operations pushed.
    pub fn push_documents(&mut self, inserter: &mut impl IndexInserter) -> usize {
        let index = self.index;
        let words = index.word_store();
        let mut ops: Vec<(String, DocId, Option<DocIdAndFeatures>)> = Vec::new();
        {
            let mut remover = index.document_remover();
            for (doc_id, pending) in self.pending.drain() {
                for word_ref in remover.remove_document(doc_id) {
                    ops.push((words.get_word(word_ref), doc_id, None));
                }
                if let PendingDocument::Inverted(inverted) = pending {
                    for (word, features) in inverted {
                        ops.push((word, doc_id, Some(features)));
                    }
                }
            }
        }
        // removes sort before adds of the same (word, doc)
        ops.sort_unstable_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.is_some().cmp(&b.2.is_some()))
        });

        inserter.rewind();
        let mut current: Option<&str> = None;
        for (word, doc_id, features) in &ops {
            if current != Some(word.as_str()) {
                inserter.set_next_word(word);
                current = Some(word.as_str());
            }
            match features {
                Some(features) => inserter.add(*doc_id, features),
                None => inserter.remove(*doc_id),
            }
        }
        inserter.flush();
        debug!("pushed {} word operations", ops.len());
        ops.len()
    }
}
