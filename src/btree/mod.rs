//! Copy-on-write B+tree used for the term dictionary and the unique-value
//! dictionary.
//!
//! - [`BTree`] - node storage, reader lookups and bulk build
//! - [`BTreeIterator`] - single-writer cursor with forward seek, insert and remove
//! - [`Iter`] - reader iteration over one snapshot

mod iterator;
mod node;
mod tree;

pub use iterator::{BTreeIterator, Iter};
pub use node::{BTreeNode, INTERNAL_SLOTS, LEAF_SLOTS};
pub use tree::{BTree, LeafEntry};
