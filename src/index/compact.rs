use crate::index::field_index::FieldIndex;
use crate::index::types::PostingListKeyData;
use log::debug;
use serde::Serialize;

/// Outcome of one feature compaction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompactionStats {
    pub buffers_compacted: usize,
    pub blobs_moved: usize,
    pub lists_rewritten: usize,
}

impl FieldIndex {
    /// Compact feature buffers using the configured ratio
    pub fn compact(&self) -> CompactionStats {
        self.compact_features(self.config().compaction_ratio)
    }

    /// Move live feature blobs out of buffers whose dead share exceeds
    /// `ratio`, republishing every posting list that referenced them.
    ///
    /// Writer-side: must not run concurrently with an inserter flush.
    /// Readers keep seeing the old lists, and the old blobs stay readable,
    /// until the generation of this pass is reclaimed.
    pub fn compact_features(&self, ratio: f64) -> CompactionStats {
        let features = self.feature_store();
        let compacting = features.start_compact(ratio);
        if compacting.is_empty() {
            debug!("no feature buffer above compaction ratio {}", ratio);
            return CompactionStats::default();
        }
        let postings = self.posting_store();
        let mut stats = CompactionStats {
            buffers_compacted: compacting.buffer_ids().len(),
            ..Default::default()
        };
        for entry in self.dictionary().iter() {
            let slot = entry.value();
            let root = slot.load_relaxed();
            let records = postings.get(root);
            if !records.iter().any(|r| compacting.contains(r.data.features())) {
                continue;
            }
            let moved: Vec<PostingListKeyData> = records
                .iter()
                .map(|r| {
                    let features_ref = r.data.features();
                    if !compacting.contains(features_ref) {
                        return *r;
                    }
                    stats.blobs_moved += 1;
                    let data = r.data.with_features(features.move_entry(features_ref));
                    PostingListKeyData::new(r.doc_id, data)
                })
                .collect();
            slot.store_release(postings.replace(root, moved));
            stats.lists_rewritten += 1;
        }
        if stats.blobs_moved > 0 {
            features.add_guard_bytes();
        }
        debug!(
            "compacted {:?} feature buffers: {} blobs moved, {} posting lists rewritten",
            compacting.buffer_ids(),
            stats.blobs_moved,
            stats.lists_rewritten
        );
        features.finish_compact(compacting);
        stats
    }
}

#[cfg(test)]
mod tests {
    use crate::index::features::DocIdAndFeatures;
    use crate::index::field_index::FieldIndex;
    use crate::index::types::FieldIndexConfig;
    use crate::index::writer::IndexInserter;

    fn small_index() -> FieldIndex {
        FieldIndex::new(FieldIndexConfig {
            offset_bits: 20,
            initial_buffer_entries: 64,
            max_buffer_entries: 64,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_nothing_to_compact() {
        let index = small_index();
        assert_eq!(index.compact(), Default::default());
    }

    #[test]
    fn test_compaction_is_transparent() {
        let index = small_index();
        {
            let mut inserter = index.inserter();
            inserter.set_next_word("w");
            for doc_id in 1..=20 {
                inserter.add(doc_id, &DocIdAndFeatures::with_positions(doc_id, vec![0], 1));
            }
            inserter.flush();
            inserter.commit();

            inserter.rewind();
            inserter.set_next_word("w");
            for doc_id in (2..=20).step_by(2) {
                inserter.remove(doc_id);
                inserter.add(doc_id, &DocIdAndFeatures::with_positions(doc_id, vec![0, 1], 2));
            }
            inserter.flush();
            inserter.commit();
            inserter.commit();
        }
        let before: Vec<_> = index
            .find("w")
            .unwrap()
            .doc_ids()
            .map(|d| (d, index.find("w").unwrap().features(d)))
            .collect();

        let stats = index.compact_features(0.3);
        assert!(stats.buffers_compacted > 0);
        assert!(stats.blobs_moved > 0);
        assert_eq!(stats.lists_rewritten, 1);

        let after: Vec<_> = index
            .find("w")
            .unwrap()
            .doc_ids()
            .map(|d| (d, index.find("w").unwrap().features(d)))
            .collect();
        assert_eq!(before, after);

        let on_hold = index.stats().features.allocated_bytes_on_hold;
        assert!(on_hold > 0);
        index.commit();
        index.commit();
        let usage = index.stats().features;
        assert_eq!(usage.allocated_bytes_on_hold, 0);
        assert_eq!(index.get_docs("w").len(), 20);
        assert_eq!(index.find("w").unwrap().features(4).unwrap()[0].positions, vec![0, 1]);
    }
}
