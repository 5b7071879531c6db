use super::buffer::{BufferBook, CompactingBuffers};
use super::entry_ref::{EntryRef, RefLayout};
use super::generation::Generation;
use crate::index::stats::MemoryUsage;
use crate::utils::{decode_varint, encode_varint};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Zeroed bytes kept after the last blob of every buffer, so decoders that
/// read ahead of the data they need never leave allocated memory.
pub const GUARD_BYTES: usize = 16;

/// Longest varint length prefix for a u32
const MAX_PREFIX: usize = 5;

struct ByteBuffer {
    bytes: Box<[AtomicU8]>,
}

impl ByteBuffer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
        }
    }

    #[inline]
    fn byte(&self, pos: usize) -> u8 {
        self.bytes[pos].load(Ordering::Relaxed)
    }
}

/// Append-only store of length-prefixed byte blobs.
///
/// Bytes are written with relaxed stores before the blob's reference is
/// handed out; whoever publishes that reference does so with a release store,
/// which makes the bytes visible to readers that acquire it.
///
/// Buffers start at `initial_bytes` and double up to the whole offset range
/// of the layout, so a single blob may take up to one offset range. Reads
/// copy bytes out, which lets reclamation free dead buffers right away.
pub struct ByteStore {
    layout: RefLayout,
    buffers: Box<[ArcSwapOption<ByteBuffer>]>,
    book: Mutex<BufferBook>,
}

impl ByteStore {
    pub fn new(layout: RefLayout, initial_bytes: usize) -> Self {
        Self {
            layout,
            buffers: (0..layout.num_buffers()).map(|_| ArcSwapOption::empty()).collect(),
            book: Mutex::new(BufferBook::new(layout, initial_bytes, layout.offset_size())),
        }
    }

    pub fn allocate(&self, data: &[u8]) -> EntryRef {
        let mut prefix = Vec::with_capacity(MAX_PREFIX);
        encode_varint(data.len() as u32, &mut prefix);
        let units = prefix.len() + data.len();

        let mut book = self.book.lock();
        let buffer_id = match book.active_with_room(units, GUARD_BYTES) {
            Some(id) => id,
            None => self.open_buffer(&mut book, units),
        };
        let offset = book.bump(buffer_id, units);
        let buffer = self.buffer(buffer_id);
        for (i, &b) in prefix.iter().chain(data).enumerate() {
            buffer.bytes[offset + i].store(b, Ordering::Relaxed);
        }
        self.layout.make(buffer_id, offset)
    }

    fn open_buffer(&self, book: &mut BufferBook, units: usize) -> u32 {
        let buffer_id = book.pick_free().unwrap_or_else(|| {
            panic!(
                "byte store exhausted: all {} buffers in use",
                self.layout.num_buffers()
            )
        });
        let capacity = book.next_capacity(units + GUARD_BYTES + 1);
        self.buffers[buffer_id as usize].store(Some(Arc::new(ByteBuffer::with_capacity(capacity))));
        book.activate(buffer_id, capacity);
        buffer_id
    }

    #[inline]
    fn buffer(&self, buffer_id: u32) -> Arc<ByteBuffer> {
        match self.buffers.get(buffer_id as usize).and_then(|b| b.load_full()) {
            Some(buffer) => buffer,
            None => panic!("byte buffer {} has no memory", buffer_id),
        }
    }

    /// Buffer, payload start and payload length of a blob
    fn locate(&self, entry_ref: EntryRef) -> (Arc<ByteBuffer>, usize, usize) {
        assert!(entry_ref.valid(), "read of null byte store reference");
        let buffer = self.buffer(self.layout.buffer_id(entry_ref));
        let offset = self.layout.offset(entry_ref);
        let mut prefix = [0u8; MAX_PREFIX];
        for (i, b) in prefix.iter_mut().enumerate() {
            *b = buffer.byte(offset + i);
        }
        match decode_varint(&prefix) {
            Some((len, consumed)) => (buffer, offset + consumed, len as usize),
            None => panic!("corrupt length prefix at {:?}", entry_ref),
        }
    }

    pub fn read(&self, entry_ref: EntryRef) -> Vec<u8> {
        let mut out = Vec::new();
        self.read_into(entry_ref, &mut out);
        out
    }

    pub fn read_into(&self, entry_ref: EntryRef, out: &mut Vec<u8>) {
        let (buffer, start, len) = self.locate(entry_ref);
        out.clear();
        out.extend((start..start + len).map(|pos| buffer.byte(pos)));
    }

    /// Payload length of a blob
    pub fn len_of(&self, entry_ref: EntryRef) -> usize {
        self.locate(entry_ref).2
    }

    /// Compare the blob at `entry_ref` with `target` without copying it
    pub fn compare(&self, entry_ref: EntryRef, target: &[u8]) -> CmpOrdering {
        let (buffer, start, len) = self.locate(entry_ref);
        for (i, &p) in target.iter().take(len).enumerate() {
            match buffer.byte(start + i).cmp(&p) {
                CmpOrdering::Equal => {}
                other => return other,
            }
        }
        len.cmp(&target.len())
    }

    pub fn compare_refs(&self, lhs: EntryRef, rhs: EntryRef) -> CmpOrdering {
        let (lbuf, lstart, llen) = self.locate(lhs);
        let (rbuf, rstart, rlen) = self.locate(rhs);
        for i in 0..llen.min(rlen) {
            match lbuf.byte(lstart + i).cmp(&rbuf.byte(rstart + i)) {
                CmpOrdering::Equal => {}
                other => return other,
            }
        }
        llen.cmp(&rlen)
    }

    /// Pad the active buffer with zeroed guard bytes after its last blob
    pub fn add_guard_bytes(&self) {
        let mut book = self.book.lock();
        // room for the guard is reserved whenever a blob is placed, so the
        // active buffer (if any) can always take it
        if let Some(buffer_id) = book.active_with_room(GUARD_BYTES, 0) {
            book.bump_dead(buffer_id, GUARD_BYTES);
        }
    }

    pub fn hold(&self, entry_ref: EntryRef) {
        let (_, start, len) = self.locate(entry_ref);
        let units = start - self.layout.offset(entry_ref) + len;
        self.book.lock().hold(entry_ref, units);
    }

    /// Copy a blob to the active buffer and return its new reference. The old
    /// copy is left in place; the caller rewrites every holder.
    pub fn move_entry(&self, entry_ref: EntryRef) -> EntryRef {
        let data = self.read(entry_ref);
        self.allocate(&data)
    }

    pub fn assign_generation(&self, generation: Generation) {
        self.book.lock().assign_generation(generation);
    }

    /// Reclaim holds no reader can observe and free dead buffers. Returns the
    /// number of buffers freed.
    pub fn reclaim_memory(&self, oldest_used: Generation) -> usize {
        let mut book = self.book.lock();
        book.reclaim(oldest_used, |_| {});
        let dead = book.take_dead();
        for &id in &dead {
            self.buffers[id as usize].store(None);
        }
        dead.len()
    }

    pub fn start_compact(&self, ratio: f64) -> CompactingBuffers {
        self.book.lock().start_compact(ratio)
    }

    pub fn finish_compact(&self, compacting: CompactingBuffers) {
        self.book.lock().finish_compact(compacting);
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        MemoryUsage::from_units(self.book.lock().usage(), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ByteStore {
        ByteStore::new(RefLayout::new(20), 64)
    }

    #[test]
    fn test_blobs_survive_buffer_switches() {
        let store = store();
        let refs: Vec<_> = (0..200)
            .map(|i| store.allocate(format!("blob-{}", i).as_bytes()))
            .collect();
        for (i, r) in refs.iter().enumerate() {
            assert_eq!(store.read(*r), format!("blob-{}", i).into_bytes());
        }
    }

    #[test]
    fn test_empty_blob() {
        let store = store();
        let r = store.allocate(b"");
        assert!(r.valid());
        assert_eq!(store.len_of(r), 0);
        assert!(store.read(r).is_empty());
    }

    #[test]
    fn test_compare_orders_like_slices() {
        let store = store();
        let apple = store.allocate(b"apple");
        let app = store.allocate(b"app");
        assert_eq!(store.compare(apple, b"apple"), CmpOrdering::Equal);
        assert_eq!(store.compare(apple, b"apples"), CmpOrdering::Less);
        assert_eq!(store.compare(apple, b"app"), CmpOrdering::Greater);
        assert_eq!(store.compare(apple, b"banana"), CmpOrdering::Less);
        assert_eq!(store.compare_refs(app, apple), CmpOrdering::Less);
        assert_eq!(store.compare_refs(apple, apple), CmpOrdering::Equal);
    }

    #[test]
    fn test_guard_bytes_are_zero_and_in_bounds() {
        let store = store();
        let r = store.allocate(b"xyz");
        store.add_guard_bytes();
        let (buffer, start, len) = store.locate(r);
        for pos in start + len..start + len + GUARD_BYTES {
            assert_eq!(buffer.byte(pos), 0);
        }
        let usage = store.memory_usage();
        assert!(usage.dead_bytes >= GUARD_BYTES);
    }

    #[test]
    fn test_move_entry_copies_blob() {
        let store = store();
        let r = store.allocate(b"moved");
        let moved = store.move_entry(r);
        assert_ne!(r, moved);
        assert_eq!(store.read(moved), b"moved");
    }

    #[test]
    fn test_blob_larger_than_initial_buffer() {
        let store = store();
        let big: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let small = store.allocate(b"small");
        let r = store.allocate(&big);
        assert_eq!(store.len_of(r), big.len());
        assert_eq!(store.read(r), big);
        assert_eq!(store.read(small), b"small");
    }

    #[test]
    #[should_panic(expected = "exceeds buffer limit")]
    fn test_blob_beyond_offset_range_is_fatal() {
        let store = ByteStore::new(RefLayout::new(12), 64);
        store.allocate(&[7u8; 5000]);
    }

    #[test]
    fn test_reclaimed_buffers_are_reused() {
        let store = ByteStore::new(RefLayout::new(28), 64);
        let blob = [9u8; 1000];
        let mut live = store.allocate(&blob);
        let mut ids = vec![store.layout.buffer_id(live)];
        let mut freed = 0;
        for generation in 0..500u64 {
            let next = store.allocate(&blob);
            ids.push(store.layout.buffer_id(next));
            store.hold(live);
            store.assign_generation(generation);
            freed += store.reclaim_memory(generation + 1);
            live = next;
        }
        assert_eq!(store.read(live), blob);
        // each switch frees the previous buffer, so ids alternate
        assert!(freed >= 5);
        assert!(ids.iter().all(|&id| id < 3));
        assert!(store.memory_usage().allocated_bytes < 64 * 1024 * 1024);
    }
}
