//! State shared between the fusion loop and radio-stack callback contexts.
//!
//! Only single-word flags are shared as bare atomics. Anything wider goes
//! through [`LatestSlot`], which copies under a critical section.

use core::cell::Cell;
use core::ptr;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex as RawMutex, Mutex};
use portable_atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};

use crate::links::peer::PeerReceiver;

#[derive(Clone, Copy)]
struct SlotState<T> {
    value: T,
    fresh: bool,
}

/// Single retained value plus a "new data" flag. Writes overwrite, there is
/// no queue; reading clears the flag in the same critical section that copies
/// the value out.
pub struct LatestSlot<T: Copy> {
    state: Mutex<RawMutex, Cell<SlotState<T>>>,
}

impl<T: Copy> LatestSlot<T> {
    pub const fn new(initial: T) -> Self {
        Self {
            state: Mutex::new(Cell::new(SlotState {
                value: initial,
                fresh: false,
            })),
        }
    }

    /// Stores `value` and raises the flag. Returns `true` when an unread
    /// value was overwritten.
    pub fn publish(&self, value: T) -> bool {
        self.state.lock(|cell| {
            let overwritten = cell.get().fresh;
            cell.set(SlotState { value, fresh: true });
            overwritten
        })
    }

    pub fn has_new(&self) -> bool {
        self.state.lock(|cell| cell.get().fresh)
    }

    /// Copies out the retained value and clears the flag, fresh or not.
    pub fn latest(&self) -> T {
        self.state.lock(|cell| {
            let mut state = cell.get();
            state.fresh = false;
            cell.set(state);
            state.value
        })
    }

    /// Like [`latest`](Self::latest) but only yields unread values.
    pub fn take(&self) -> Option<T> {
        self.state.lock(|cell| {
            let mut state = cell.get();
            if !state.fresh {
                return None;
            }
            state.fresh = false;
            cell.set(state);
            Some(state.value)
        })
    }
}

/* ───── peer stack ─────────────────────────────────────────────────────── */

/// The datagram layer is brought up once per device, whichever role asks first.
static PEER_STACK_READY: AtomicBool = AtomicBool::new(false);

pub fn peer_stack_ready() -> bool {
    PEER_STACK_READY.load(Ordering::Acquire)
}

pub fn mark_peer_stack_ready() {
    PEER_STACK_READY.store(true, Ordering::Release);
}

/// Receiver the fixed-signature receive callback forwards to. One per
/// process: activating a receiver replaces the previous one.
static ACTIVE_PEER_RECEIVER: AtomicPtr<PeerReceiver> = AtomicPtr::new(ptr::null_mut());

/// Returns `true` if a different receiver was active before.
pub fn activate_peer_receiver(receiver: &'static PeerReceiver) -> bool {
    let new = receiver as *const PeerReceiver as *mut PeerReceiver;
    let old = ACTIVE_PEER_RECEIVER.swap(new, Ordering::AcqRel);
    !old.is_null() && old != new
}

pub fn active_peer_receiver() -> Option<&'static PeerReceiver> {
    let ptr = ACTIVE_PEER_RECEIVER.load(Ordering::Acquire);
    // SAFETY: only `&'static PeerReceiver`s are ever stored, and the receiver
    // is only accessed through shared references.
    unsafe { ptr.as_ref() }
}

/* ───── send completions ───────────────────────────────────────────────── */

static SEND_DELIVERED: AtomicU32 = AtomicU32::new(0);
static SEND_FAILED: AtomicU32 = AtomicU32::new(0);

pub fn record_send_completion(delivered: bool) {
    if delivered {
        SEND_DELIVERED.fetch_add(1, Ordering::Relaxed);
    } else {
        SEND_FAILED.fetch_add(1, Ordering::Relaxed);
    }
}

/// `(delivered, failed)` as reported by the stack's completion callback.
pub fn send_completions() -> (u32, u32) {
    (
        SEND_DELIVERED.load(Ordering::Relaxed),
        SEND_FAILED.load(Ordering::Relaxed),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins_and_reads_once() {
        let slot = LatestSlot::new(0u32);
        assert!(!slot.publish(1));
        assert!(slot.publish(2));
        assert!(slot.has_new());
        assert_eq!(slot.take(), Some(2));
        assert!(!slot.has_new());
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn latest_returns_stale_value_and_clears() {
        let slot = LatestSlot::new(7i8);
        assert_eq!(slot.latest(), 7);
        slot.publish(-3);
        assert_eq!(slot.latest(), -3);
        assert!(!slot.has_new());
        assert_eq!(slot.latest(), -3);
    }
}
