use crate::datastore::buffer::UnitUsage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Memory accounting for one store or a sum of stores
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Capacity of all buffers that currently own memory
    pub allocated_bytes: usize,
    /// Bytes handed out to entries, live or not
    pub used_bytes: usize,
    /// Bytes of reclaimed entries and padding
    pub dead_bytes: usize,
    /// Bytes of entries waiting for readers of their generation to finish
    pub allocated_bytes_on_hold: usize,
}

impl MemoryUsage {
    pub(crate) fn from_units(units: UnitUsage, unit_size: usize) -> Self {
        Self {
            allocated_bytes: units.allocated * unit_size,
            used_bytes: units.used * unit_size,
            dead_bytes: units.dead * unit_size,
            allocated_bytes_on_hold: units.hold * unit_size,
        }
    }

    pub fn merge(&mut self, other: &MemoryUsage) {
        self.allocated_bytes += other.allocated_bytes;
        self.used_bytes += other.used_bytes;
        self.dead_bytes += other.dead_bytes;
        self.allocated_bytes_on_hold += other.allocated_bytes_on_hold;
    }

    /// Bytes still reachable by the current index state
    pub fn live_bytes(&self) -> usize {
        self.used_bytes
            .saturating_sub(self.dead_bytes + self.allocated_bytes_on_hold)
    }
}

impl fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allocated {}, used {}, dead {}, on hold {}",
            format_size(self.allocated_bytes as u64),
            format_size(self.used_bytes as u64),
            format_size(self.dead_bytes as u64),
            format_size(self.allocated_bytes_on_hold as u64)
        )
    }
}

/// Snapshot of a field index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIndexStats {
    pub num_words: usize,
    /// Documents known to the document remover
    pub num_documents: usize,
    pub words: MemoryUsage,
    pub features: MemoryUsage,
    pub dictionary: MemoryUsage,
    pub posting_lists: MemoryUsage,
}

impl FieldIndexStats {
    /// Usage summed over all stores
    pub fn memory(&self) -> MemoryUsage {
        let mut total = self.words;
        total.merge(&self.features);
        total.merge(&self.dictionary);
        total.merge(&self.posting_lists);
        total
    }
}

impl fmt::Display for FieldIndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Field Index Statistics")?;
        writeln!(f, "======================")?;
        writeln!(f, "Words:            {}", self.num_words)?;
        writeln!(f, "Documents:        {}", self.num_documents)?;
        writeln!(f, "Word store:       {}", self.words)?;
        writeln!(f, "Feature store:    {}", self.features)?;
        writeln!(f, "Dictionary:       {}", self.dictionary)?;
        writeln!(f, "Posting lists:    {}", self.posting_lists)?;
        write!(f, "Total:            {}", self.memory())
    }
}

/// Format byte size to human readable
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
