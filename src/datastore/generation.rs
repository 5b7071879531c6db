//! Generation (epoch) tracking for deferred reclamation.
//!
//! Readers take a [`GenerationGuard`] before traversing shared structures and
//! drop it when done. The writer tags everything it puts on hold with the
//! current generation, bumps the generation, and only reclaims entries whose
//! generation is older than [`GenerationHandler::oldest_used_generation`].
//! Taking a guard never locks: readers attach to the current generation
//! through an atomically swapped pointer.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub type Generation = u64;

struct GenerationHold {
    generation: Generation,
    readers: AtomicUsize,
}

/// Guard held by a reader for the duration of a traversal
pub struct GenerationGuard {
    hold: Arc<GenerationHold>,
}

impl GenerationGuard {
    pub fn generation(&self) -> Generation {
        self.hold.generation
    }
}

impl Clone for GenerationGuard {
    /// Another guard on the same generation. The hold cannot be trimmed while
    /// this guard keeps its reader count above zero.
    fn clone(&self) -> Self {
        self.hold.readers.fetch_add(1, Ordering::SeqCst);
        Self {
            hold: self.hold.clone(),
        }
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.hold.readers.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct GenerationHandler {
    current: AtomicU64,
    oldest_used: AtomicU64,
    /// Hold of the current generation
    current_hold: ArcSwap<GenerationHold>,
    /// Oldest hold first; the last hold is always `current_hold`
    holds: Mutex<VecDeque<Arc<GenerationHold>>>,
}

impl GenerationHandler {
    pub fn new() -> Self {
        let first = Arc::new(GenerationHold {
            generation: 0,
            readers: AtomicUsize::new(0),
        });
        Self {
            current: AtomicU64::new(0),
            oldest_used: AtomicU64::new(0),
            current_hold: ArcSwap::new(first.clone()),
            holds: Mutex::new(VecDeque::from([first])),
        }
    }

    pub fn take_guard(&self) -> GenerationGuard {
        loop {
            let hold = self.current_hold.load_full();
            hold.readers.fetch_add(1, Ordering::SeqCst);
            let current = self.current_hold.load();
            if Arc::ptr_eq(&hold, &*current) {
                return GenerationGuard { hold };
            }
            // the writer moved on and may already have trimmed this hold
            hold.readers.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn current_generation(&self) -> Generation {
        self.current.load(Ordering::Acquire)
    }

    /// Oldest generation a live reader may still observe
    pub fn oldest_used_generation(&self) -> Generation {
        self.update_oldest_used();
        self.oldest_used.load(Ordering::Acquire)
    }

    pub fn increment_generation(&self) {
        let mut holds = self.holds.lock();
        let next = self.current.load(Ordering::Relaxed) + 1;
        let hold = Arc::new(GenerationHold {
            generation: next,
            readers: AtomicUsize::new(0),
        });
        holds.push_back(hold.clone());
        self.current_hold.store(hold);
        self.current.store(next, Ordering::Release);
        Self::trim(&mut holds);
        let oldest = holds.front().map_or(next, |h| h.generation);
        self.oldest_used.store(oldest, Ordering::Release);
    }

    /// Number of readers currently holding a guard
    pub fn reader_count(&self) -> usize {
        self.holds
            .lock()
            .iter()
            .map(|h| h.readers.load(Ordering::Acquire))
            .sum()
    }

    fn update_oldest_used(&self) {
        let mut holds = self.holds.lock();
        Self::trim(&mut holds);
        let oldest = holds
            .front()
            .map_or(self.current.load(Ordering::Relaxed), |h| h.generation);
        self.oldest_used.store(oldest, Ordering::Release);
    }

    fn trim(holds: &mut VecDeque<Arc<GenerationHold>>) {
        while holds.len() > 1
            && holds
                .front()
                .is_some_and(|h| h.readers.load(Ordering::SeqCst) == 0)
        {
            holds.pop_front();
        }
    }
}

impl Default for GenerationHandler {
    fn default() -> Self {
        Self::new()
    }
}
