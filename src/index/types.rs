use crate::datastore::{EntryRef, RefLayout};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unique identifier for a document in the index
pub type DocId = u32;

/// Reserved document id; never names a document
pub const NO_DOC_ID: DocId = DocId::MAX;

/// Clamp a count to the 16-bit range stored in posting records
#[inline]
pub fn cap_u16(value: u32) -> u16 {
    value.min(u16::MAX as u32) as u16
}

/// Per-document posting record: serialized features plus capped counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostingListEntry {
    features: EntryRef,
    num_occs: u16,
    field_length: u16,
}

impl PostingListEntry {
    pub fn new(features: EntryRef, num_occs: u32, field_length: u32) -> Self {
        Self {
            features,
            num_occs: cap_u16(num_occs),
            field_length: cap_u16(field_length),
        }
    }

    #[inline]
    pub fn features(&self) -> EntryRef {
        self.features
    }

    #[inline]
    pub fn num_occs(&self) -> u16 {
        self.num_occs
    }

    #[inline]
    pub fn field_length(&self) -> u16 {
        self.field_length
    }

    /// Same record pointing at relocated features
    pub fn with_features(self, features: EntryRef) -> Self {
        Self { features, ..self }
    }
}

/// Posting list element, ordered by document id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingListKeyData {
    pub doc_id: DocId,
    pub data: PostingListEntry,
}

impl PostingListKeyData {
    pub fn new(doc_id: DocId, data: PostingListEntry) -> Self {
        Self { doc_id, data }
    }
}

/// Configuration for a field index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldIndexConfig {
    /// Low bits of an entry reference used for the offset in a buffer
    pub offset_bits: u32,
    /// Entries (bytes for byte stores) in the first buffer of each store
    pub initial_buffer_entries: usize,
    /// Upper bound on one buffer's entries; buffers double up to this.
    /// Byte stores grow up to the offset range instead, so one blob may take
    /// up to `1 << offset_bits` bytes.
    pub max_buffer_entries: usize,
    /// Dead share of a buffer above which compaction moves its entries
    pub compaction_ratio: f64,
    /// Longest word (in bytes) the inverter indexes
    pub max_word_length: usize,
}

impl Default for FieldIndexConfig {
    fn default() -> Self {
        Self {
            offset_bits: 22,
            initial_buffer_entries: 1024,
            max_buffer_entries: 65536,
            compaction_ratio: 0.5,
            max_word_length: 255,
        }
    }
}

impl FieldIndexConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("invalid field index config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if !(RefLayout::MIN_OFFSET_BITS..=RefLayout::MAX_OFFSET_BITS).contains(&self.offset_bits) {
            bail!(
                "offset_bits must be in {}..={}, got {}",
                RefLayout::MIN_OFFSET_BITS,
                RefLayout::MAX_OFFSET_BITS,
                self.offset_bits
            );
        }
        if self.initial_buffer_entries == 0 || self.max_buffer_entries == 0 {
            bail!("buffer sizes must be non-zero");
        }
        if self.initial_buffer_entries > self.max_buffer_entries {
            bail!(
                "initial_buffer_entries ({}) exceeds max_buffer_entries ({})",
                self.initial_buffer_entries,
                self.max_buffer_entries
            );
        }
        if !(self.compaction_ratio > 0.0 && self.compaction_ratio <= 1.0) {
            bail!("compaction_ratio must be in (0, 1], got {}", self.compaction_ratio);
        }
        if self.max_word_length == 0 {
            bail!("max_word_length must be non-zero");
        }
        Ok(())
    }

    pub fn layout(&self) -> RefLayout {
        RefLayout::new(self.offset_bits)
    }
}
