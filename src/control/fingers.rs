//! Finger slot allocator
//!
//! Hands out [`TouchId`]s in `0..MAX_FINGERS`, always the lowest free one.
//! Gesture tasks acquire and release directly from their own tasks, so the
//! slot table is a single atomic bitmask updated with compare-and-swap.
//!
//! Releasing an id that is already free is a caller bug: debug builds panic,
//! release builds log a warning and ignore the call.

use super::intent::{TouchId, MAX_FINGERS};
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct FingerSlots {
    used: AtomicU8,
}

impl FingerSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lowest free id.
    ///
    /// # Panics
    ///
    /// When all slots are taken. Callers never start more than
    /// `MAX_FINGERS` gestures at once, so this is a protocol bug.
    pub fn acquire(&self) -> TouchId {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let free = (!current).trailing_zeros() as usize;
            if free >= MAX_FINGERS {
                panic!("finger number over {}", MAX_FINGERS);
            }
            let next = current | (1 << free);
            match self
                .used
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    debug!("Acquired finger #{}", free);
                    return TouchId::new(free as u8);
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn release(&self, id: TouchId) {
        let bit = 1u8 << id.get();
        let previous = self.used.fetch_and(!bit, Ordering::AcqRel);
        if previous & bit == 0 {
            if cfg!(debug_assertions) {
                panic!("finger {} released twice", id);
            }
            warn!("Ignoring release of free finger {}", id);
            return;
        }
        debug!("Released finger {}", id);
    }

    pub fn is_held(&self, id: TouchId) -> bool {
        self.used.load(Ordering::Acquire) & (1 << id.get()) != 0
    }

    pub fn in_use(&self) -> usize {
        self.used.load(Ordering::Acquire).count_ones() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn eight_distinct_ids() {
        let slots = FingerSlots::new();
        let ids: HashSet<u8> = (0..MAX_FINGERS).map(|_| slots.acquire().get()).collect();
        assert_eq!(ids.len(), MAX_FINGERS);
        assert!(ids.iter().all(|id| (*id as usize) < MAX_FINGERS));
        assert_eq!(slots.in_use(), MAX_FINGERS);
    }

    #[test]
    #[should_panic(expected = "finger number over 8")]
    fn ninth_acquire_panics() {
        let slots = FingerSlots::new();
        for _ in 0..=MAX_FINGERS {
            slots.acquire();
        }
    }

    #[test]
    fn reuses_lowest_free_id() {
        let slots = FingerSlots::new();
        let a = slots.acquire();
        let b = slots.acquire();
        let c = slots.acquire();
        assert_eq!((a.get(), b.get(), c.get()), (0, 1, 2));

        slots.release(b);
        slots.release(a);
        assert_eq!(slots.acquire().get(), 0);
        assert_eq!(slots.acquire().get(), 1);
        assert_eq!(slots.acquire().get(), 3);
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn double_release_panics_in_debug() {
        let slots = FingerSlots::new();
        let id = slots.acquire();
        slots.release(id);
        slots.release(id);
    }

    #[test]
    fn concurrent_acquire_never_shares_an_id() {
        let slots = Arc::new(FingerSlots::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let slots = slots.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let a = slots.acquire();
                        let b = slots.acquire();
                        assert_ne!(a, b);
                        assert!(slots.is_held(a) && slots.is_held(b));
                        slots.release(a);
                        slots.release(b);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(slots.in_use(), 0);
    }
}
