use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Compact 32-bit handle to a value stored in a data store.
///
/// The raw value packs a buffer id and an offset (see [`RefLayout`]).
/// Raw 0 is the null reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EntryRef(u32);

impl EntryRef {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The null reference
    pub const fn invalid() -> Self {
        Self(0)
    }

    #[inline]
    pub fn valid(&self) -> bool {
        self.0 != 0
    }

    #[inline]
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid() {
            write!(f, "EntryRef({:#x})", self.0)
        } else {
            write!(f, "EntryRef(null)")
        }
    }
}

/// Bit layout of an [`EntryRef`]: buffer id in the high bits, offset in the
/// low `offset_bits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefLayout {
    offset_bits: u32,
}

impl RefLayout {
    pub const MIN_OFFSET_BITS: u32 = 10;
    pub const MAX_OFFSET_BITS: u32 = 28;

    pub fn new(offset_bits: u32) -> Self {
        assert!(
            (Self::MIN_OFFSET_BITS..=Self::MAX_OFFSET_BITS).contains(&offset_bits),
            "offset_bits {} outside {}..={}",
            offset_bits,
            Self::MIN_OFFSET_BITS,
            Self::MAX_OFFSET_BITS
        );
        Self { offset_bits }
    }

    #[inline]
    pub fn offset_bits(&self) -> u32 {
        self.offset_bits
    }

    /// Number of addressable entries (or bytes) per buffer
    #[inline]
    pub fn offset_size(&self) -> usize {
        1usize << self.offset_bits
    }

    /// Number of buffers a store with this layout can address
    #[inline]
    pub fn num_buffers(&self) -> usize {
        1usize << (32 - self.offset_bits)
    }

    #[inline]
    pub fn make(&self, buffer_id: u32, offset: usize) -> EntryRef {
        debug_assert!((buffer_id as usize) < self.num_buffers());
        debug_assert!(offset < self.offset_size());
        EntryRef((buffer_id << self.offset_bits) | offset as u32)
    }

    #[inline]
    pub fn buffer_id(&self, entry_ref: EntryRef) -> u32 {
        entry_ref.0 >> self.offset_bits
    }

    #[inline]
    pub fn offset(&self, entry_ref: EntryRef) -> usize {
        (entry_ref.0 & ((1u32 << self.offset_bits) - 1)) as usize
    }
}

impl Default for RefLayout {
    fn default() -> Self {
        Self::new(22)
    }
}

/// Atomic slot holding an [`EntryRef`].
///
/// Writers publish with [`store_release`](Self::store_release); readers pair
/// that with [`load_acquire`](Self::load_acquire) and then observe a fully
/// built structure behind the reference.
#[derive(Default)]
pub struct AtomicEntryRef(AtomicU32);

impl AtomicEntryRef {
    pub fn new(entry_ref: EntryRef) -> Self {
        Self(AtomicU32::new(entry_ref.raw()))
    }

    #[inline]
    pub fn load_acquire(&self) -> EntryRef {
        EntryRef(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn load_relaxed(&self) -> EntryRef {
        EntryRef(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store_release(&self, entry_ref: EntryRef) {
        self.0.store(entry_ref.raw(), Ordering::Release);
    }

    #[inline]
    pub fn store_relaxed(&self, entry_ref: EntryRef) {
        self.0.store(entry_ref.raw(), Ordering::Relaxed);
    }
}

// Only the single writer copies slots (when a node is path-copied), so a
// relaxed load sees its own latest store.
impl Clone for AtomicEntryRef {
    fn clone(&self) -> Self {
        Self::new(self.load_relaxed())
    }
}

impl fmt::Debug for AtomicEntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicEntryRef")
            .field(&self.load_relaxed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_roundtrip() {
        let layout = RefLayout::new(22);
        assert_eq!(layout.num_buffers(), 1024);
        let r = layout.make(1023, (1 << 22) - 1);
        assert_eq!(layout.buffer_id(r), 1023);
        assert_eq!(layout.offset(r), (1 << 22) - 1);
        assert_eq!(r.raw(), u32::MAX);
    }

    #[test]
    fn test_null_ref() {
        let layout = RefLayout::default();
        assert!(!EntryRef::default().valid());
        assert_eq!(layout.make(0, 0), EntryRef::invalid());
        assert!(layout.make(0, 1).valid());
        assert!(layout.make(1, 0).valid());
    }

    #[test]
    #[should_panic(expected = "offset_bits")]
    fn test_layout_rejects_small_offsets() {
        RefLayout::new(4);
    }

    #[test]
    fn test_atomic_entry_ref_publish() {
        let slot = AtomicEntryRef::default();
        assert_eq!(slot.load_acquire(), EntryRef::invalid());
        slot.store_release(EntryRef::new(42));
        assert_eq!(slot.load_acquire(), EntryRef::new(42));
        let copy = slot.clone();
        slot.store_relaxed(EntryRef::new(7));
        assert_eq!(copy.load_relaxed(), EntryRef::new(42));
    }
}
