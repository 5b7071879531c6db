//! Writer-side buffer bookkeeping shared by [`DataStore`](super::DataStore)
//! and [`ByteStore`](super::ByteStore).
//!
//! Sizes are counted in units: slots for typed stores, bytes for byte stores.
//! Readers never touch this state; it lives behind the store's writer lock.

use super::entry_ref::{EntryRef, RefLayout};
use super::generation::Generation;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// No memory, id available
    Free,
    /// Accepting entries (only the current active buffer takes new ones)
    Active,
    /// Compacted away, waiting for readers of its generation to finish
    Hold,
    /// Fully reclaimed; the store drops its memory before `reclaim` returns
    Dead,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BufferMeta {
    pub state: BufferState,
    pub capacity: usize,
    pub used: usize,
    pub dead: usize,
    pub hold: usize,
    pub compacting: bool,
}

impl BufferMeta {
    fn free() -> Self {
        Self {
            state: BufferState::Free,
            capacity: 0,
            used: 0,
            dead: 0,
            hold: 0,
            compacting: false,
        }
    }
}

/// Buffers selected by a compaction pass
#[derive(Debug, Clone)]
pub struct CompactingBuffers {
    layout: RefLayout,
    ids: Vec<u32>,
}

impl CompactingBuffers {
    /// True if `entry_ref` points into one of the compacted buffers
    #[inline]
    pub fn contains(&self, entry_ref: EntryRef) -> bool {
        entry_ref.valid() && self.ids.contains(&self.layout.buffer_id(entry_ref))
    }

    pub fn buffer_ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Unit counts summed over all buffers of a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct UnitUsage {
    pub allocated: usize,
    pub used: usize,
    pub dead: usize,
    pub hold: usize,
}

pub(crate) struct BufferBook {
    layout: RefLayout,
    max_units: usize,
    next_units: usize,
    metas: Vec<BufferMeta>,
    active: Option<u32>,
    pending_holds: Vec<(EntryRef, usize)>,
    hold_list: VecDeque<(Generation, EntryRef, usize)>,
    pending_buffer_holds: Vec<u32>,
    buffer_hold_list: VecDeque<(Generation, u32)>,
}

impl BufferBook {
    pub fn new(layout: RefLayout, initial_units: usize, max_units: usize) -> Self {
        let max_units = max_units.min(layout.offset_size()).max(1);
        let initial_units = initial_units.clamp(1, max_units);
        Self {
            layout,
            max_units,
            next_units: initial_units,
            metas: vec![BufferMeta::free(); layout.num_buffers()],
            active: None,
            pending_holds: Vec::new(),
            hold_list: VecDeque::new(),
            pending_buffer_holds: Vec::new(),
            buffer_hold_list: VecDeque::new(),
        }
    }

    pub fn meta(&self, buffer_id: u32) -> &BufferMeta {
        &self.metas[buffer_id as usize]
    }

    /// Current active buffer if it can take `units` more and still keep
    /// `tail` units free after them
    pub fn active_with_room(&self, units: usize, tail: usize) -> Option<u32> {
        let id = self.active?;
        let meta = &self.metas[id as usize];
        (meta.used + units + tail <= meta.capacity).then_some(id)
    }

    /// Lowest buffer id without memory
    pub fn pick_free(&self) -> Option<u32> {
        (0..self.metas.len() as u32).find(|&id| self.metas[id as usize].state == BufferState::Free)
    }

    /// Capacity for the next buffer; doubles up to the per-buffer maximum
    pub fn next_capacity(&mut self, min_units: usize) -> usize {
        assert!(
            min_units <= self.max_units,
            "entry of {} units exceeds buffer limit of {} units",
            min_units,
            self.max_units
        );
        let capacity = self.next_units.max(min_units);
        self.next_units = (self.next_units * 2).min(self.max_units);
        capacity
    }

    /// Mark `buffer_id` active and current. Offset 0 of buffer 0 is reserved so
    /// that the null reference is never handed out.
    pub fn activate(&mut self, buffer_id: u32, capacity: usize) {
        let reserved = usize::from(buffer_id == 0);
        self.metas[buffer_id as usize] = BufferMeta {
            state: BufferState::Active,
            capacity,
            used: reserved,
            dead: reserved,
            hold: 0,
            compacting: false,
        };
        self.active = Some(buffer_id);
    }

    /// Claim `units` in `buffer_id`, returning the offset of the claim
    pub fn bump(&mut self, buffer_id: u32, units: usize) -> usize {
        let meta = &mut self.metas[buffer_id as usize];
        let offset = meta.used;
        meta.used += units;
        debug_assert!(meta.used <= meta.capacity);
        offset
    }

    /// Claim `units` as dead space (guard bytes, padding)
    pub fn bump_dead(&mut self, buffer_id: u32, units: usize) -> usize {
        let offset = self.bump(buffer_id, units);
        self.metas[buffer_id as usize].dead += units;
        offset
    }

    pub fn hold(&mut self, entry_ref: EntryRef, units: usize) {
        assert!(entry_ref.valid(), "hold of null reference");
        let id = self.layout.buffer_id(entry_ref);
        let meta = &mut self.metas[id as usize];
        assert!(
            meta.state == BufferState::Active,
            "hold of {:?} in buffer {} with state {:?}",
            entry_ref,
            id,
            meta.state
        );
        meta.hold += units;
        self.pending_holds.push((entry_ref, units));
    }

    /// Select buffers whose dead share exceeds `ratio`. If the current active
    /// buffer is selected, new allocations move to a fresh buffer.
    pub fn start_compact(&mut self, ratio: f64) -> CompactingBuffers {
        let mut ids = Vec::new();
        for (id, meta) in self.metas.iter_mut().enumerate() {
            if meta.state != BufferState::Active || meta.compacting || meta.used == 0 {
                continue;
            }
            let dead = (meta.dead + meta.hold) as f64;
            if dead > meta.used as f64 * ratio {
                meta.compacting = true;
                ids.push(id as u32);
            }
        }
        if self.active.is_some_and(|a| ids.contains(&a)) {
            self.active = None;
        }
        CompactingBuffers {
            layout: self.layout,
            ids,
        }
    }

    pub fn finish_compact(&mut self, compacting: CompactingBuffers) {
        for id in compacting.ids {
            let meta = &mut self.metas[id as usize];
            debug_assert!(meta.compacting);
            meta.state = BufferState::Hold;
            self.pending_buffer_holds.push(id);
        }
    }

    /// Tag everything held since the last call with `generation`
    pub fn assign_generation(&mut self, generation: Generation) {
        for (entry_ref, units) in self.pending_holds.drain(..) {
            self.hold_list.push_back((generation, entry_ref, units));
        }
        for id in self.pending_buffer_holds.drain(..) {
            self.buffer_hold_list.push_back((generation, id));
        }
    }

    /// Reclaim holds tagged with a generation older than `oldest_used`.
    /// `on_entry` sees every reclaimed entry before its buffer can turn dead.
    pub fn reclaim(&mut self, oldest_used: Generation, mut on_entry: impl FnMut(EntryRef)) -> usize {
        let mut reclaimed = 0;
        while let Some(&(generation, entry_ref, units)) = self.hold_list.front() {
            if generation >= oldest_used {
                break;
            }
            self.hold_list.pop_front();
            on_entry(entry_ref);
            let meta = &mut self.metas[self.layout.buffer_id(entry_ref) as usize];
            if meta.state == BufferState::Active {
                meta.hold -= units;
                meta.dead += units;
            }
            reclaimed += units;
        }
        while let Some(&(generation, id)) = self.buffer_hold_list.front() {
            if generation >= oldest_used {
                break;
            }
            self.buffer_hold_list.pop_front();
            self.metas[id as usize].state = BufferState::Dead;
        }
        for (id, meta) in self.metas.iter_mut().enumerate() {
            if meta.state == BufferState::Active
                && self.active != Some(id as u32)
                && !meta.compacting
                && meta.dead == meta.used
            {
                meta.state = BufferState::Dead;
            }
        }
        reclaimed
    }

    /// Ids of dead buffers, now free for reuse. The caller drops their memory.
    pub fn take_dead(&mut self) -> Vec<u32> {
        let mut ids = Vec::new();
        for (id, meta) in self.metas.iter_mut().enumerate() {
            if meta.state == BufferState::Dead {
                *meta = BufferMeta::free();
                ids.push(id as u32);
            }
        }
        ids
    }

    pub fn usage(&self) -> UnitUsage {
        let mut usage = UnitUsage::default();
        for meta in &self.metas {
            match meta.state {
                BufferState::Free => {}
                BufferState::Active => {
                    usage.allocated += meta.capacity;
                    usage.used += meta.used;
                    usage.dead += meta.dead;
                    usage.hold += meta.hold;
                }
                BufferState::Hold | BufferState::Dead => {
                    usage.allocated += meta.capacity;
                    usage.used += meta.used;
                    usage.hold += meta.used;
                }
            }
        }
        usage
    }
}
