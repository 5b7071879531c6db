//! Field index: dictionary, posting lists and the ordered inserter.
//!
//! Writes flow through [`OrderedFieldIndexInserter`] (usually fed by a
//! [`FieldInverter`]); reads go through [`FieldIndex::find`] and friends and
//! may run on any thread while the writer flushes.

pub mod build;
pub mod compact;
pub mod feature_store;
pub mod features;
pub mod field_index;
pub mod posting_store;
pub mod reader;
pub mod remover;
pub mod stats;
pub mod types;
pub mod word_store;
pub mod writer;

pub use build::FieldInverter;
pub use compact::CompactionStats;
pub use feature_store::FeatureStore;
pub use features::{DocIdAndFeatures, WordDocElementFeatures};
pub use field_index::{DictionaryEntry, DictionaryTree, FieldIndex};
pub use posting_store::{PostingList, PostingListStore};
pub use reader::PostingListView;
pub use remover::{DocumentRemover, FieldIndexInsertListener};
pub use stats::{FieldIndexStats, MemoryUsage};
pub use types::*;
pub use word_store::WordStore;
pub use writer::{IndexInserter, OrderedFieldIndexInserter};
