//! # memindex - In-Memory Inverted Index Core
//!
//! memindex keeps a searchable inverted index entirely in memory and lets
//! any number of reader threads query it while a single writer keeps
//! updating it. Readers never take a lock and never observe a half-applied
//! change.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`datastore`] - Buffer-backed arenas addressed by 32-bit references,
//!   generation-based reclamation and the deduplicating unique store
//! - [`btree`] - Copy-on-write B+tree with a forward-seeking writer cursor
//! - [`index`] - Term dictionary, posting lists, the ordered inserter and the
//!   document inverter
//! - [`utils`] - Varint/delta encoding and the tokenizer
//!
//! ## Quick Start
//!
//! ```
//! use memindex::index::{FieldIndex, FieldIndexConfig, FieldInverter};
//!
//! let index = FieldIndex::new(FieldIndexConfig::default()).unwrap();
//! let mut inserter = index.inserter();
//! let mut inverter = FieldInverter::new(&index);
//!
//! inverter.invert_document(1, "the quick brown fox");
//! inverter.invert_document(2, "the lazy dog");
//! inverter.push_documents(&mut inserter);
//! index.commit();
//!
//! assert_eq!(index.get_docs("the").len(), 2);
//! assert_eq!(index.doc_freq("fox"), 1);
//! ```
//!
//! ## Memory
//!
//! Nothing a reader may still see is freed in place. Replaced entries are
//! put on hold, tagged with the generation of the next
//! [`commit`](index::FieldIndex::commit) and reclaimed once every
//! [`GenerationGuard`](datastore::GenerationGuard) older than that
//! generation has been dropped. Reclaiming happens inside `commit`: held
//! entries are dropped and buffers left without live entries are freed and
//! their ids reused, so a long-lived inserter never exhausts a store.
//! Lookups take a guard on their own; a
//! [`PostingListView`](index::PostingListView) keeps its guard until dropped.

pub mod btree;
pub mod datastore;
pub mod index;
pub mod utils;
