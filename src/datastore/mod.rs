//! Arena storage addressed by compact 32-bit references.
//!
//! ## Modules
//!
//! - [`entry_ref`] - `EntryRef` handles and their buffer/offset layout
//! - [`store`] - typed slot store with lock-free reads
//! - [`byte_store`] - length-prefixed byte blobs with guard bytes
//! - [`generation`] - reader guards for deferred reclamation
//! - [`unique_store`] - deduplicating, reference-counted value store
//! - [`builder`] - bulk loader for unique stores
//!
//! Every store follows the same lifecycle: entries are allocated into the
//! active buffer, put on hold when their last holder drops them, tagged with
//! a generation on commit and reclaimed once no reader guard can observe
//! that generation. Reclaiming drops the held entries and frees buffers that
//! hold nothing live, so buffer ids are reused. Compaction moves live entries
//! out of fragmented buffers; the caller rewrites every holder of a moved
//! reference.

pub(crate) mod buffer;
pub mod builder;
pub mod byte_store;
pub mod entry_ref;
pub mod generation;
pub mod store;
pub mod unique_dictionary;
pub mod unique_store;

pub use buffer::{BufferState, CompactingBuffers};
pub use builder::UniqueStoreBuilder;
pub use byte_store::{ByteStore, GUARD_BYTES};
pub use entry_ref::{AtomicEntryRef, EntryRef, RefLayout};
pub use generation::{Generation, GenerationGuard, GenerationHandler};
pub use store::DataStore;
pub use unique_dictionary::UniqueStoreDictionary;
pub use unique_store::{
    AddResult, CompactionRemap, UniqueStore, UniqueStoreAllocator, UniqueStoreEntry, ValueRef,
};
