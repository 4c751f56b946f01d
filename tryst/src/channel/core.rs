//! Channel state machine shared by both ends.
//!
//! State lives under a `std::sync::Mutex` and is never held across an await;
//! blocked operations park on one of two `Notify` lines (one per direction)
//! and re-check state on every wakeup. `notify_one` stores a permit when no
//! task is parked, so a wakeup that races the park is consumed on the next
//! `notified().await` rather than lost. Stale permits surface as spurious
//! wakeups, which the re-check loops tolerate.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::alt::AltSignal;
use crate::buffer::{BufferPolicy, Store};
use crate::error::{ChannelResult, PoisonError};

/// Where a value sits between the two ends.
enum Slot<T> {
    /// Rendezvous: at most one value in flight, and the writer stays blocked
    /// until the reader has taken it.
    Rendezvous(Option<T>),
    /// Buffered: values queue up under the store's policy.
    Buffered(Store<T>),
}

struct State<T> {
    slot: Slot<T>,
    /// Poison strength; 0 = alive, monotonically non-decreasing.
    poison: u32,
    /// True while the reader is parked in `read` (used by `try_write`).
    reader_committed: bool,
    /// Alternation signal registered by an alt-enabled reader, if any.
    alt: Option<Arc<AltSignal>>,
}

pub(crate) struct ChannelCore<T> {
    state: Mutex<State<T>>,
    /// Wakes a parked reader.
    read_notify: Notify,
    /// Wakes a parked writer.
    write_notify: Notify,
}

impl<T> ChannelCore<T> {
    pub(crate) fn new(policy: Option<BufferPolicy>) -> Arc<Self> {
        let slot = match policy {
            None => Slot::Rendezvous(None),
            Some(policy) => Slot::Buffered(Store::new(policy)),
        };
        Arc::new(Self {
            state: Mutex::new(State {
                slot,
                poison: 0,
                reader_committed: false,
                alt: None,
            }),
            read_notify: Notify::new(),
            write_notify: Notify::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().expect("channel state mutex poisoned")
    }

    /// Wake whoever is waiting to read: a parked reader, an alt-enabled one,
    /// or both permits if the reader is between the two.
    fn wake_reader(&self, state: &State<T>) {
        self.read_notify.notify_one();
        if let Some(signal) = &state.alt {
            signal.notify();
        }
    }

    // =========================================================================
    // Write path
    // =========================================================================

    pub(crate) async fn write(&self, immunity: u32, value: T) -> ChannelResult<()> {
        let mut value = Some(value);

        // Deposit phase: place the value in the slot or the store.
        loop {
            {
                let mut state = self.lock();
                if state.poison > immunity {
                    return Err(PoisonError::new(state.poison));
                }
                match &mut state.slot {
                    Slot::Buffered(store) => {
                        if store.has_room() {
                            store.push(value.take().expect("value still pending"));
                            self.wake_reader(&state);
                            return Ok(());
                        }
                        // Bounded store full: park until a read frees a slot.
                    }
                    Slot::Rendezvous(slot) => {
                        if slot.is_none() {
                            *slot = Some(value.take().expect("value still pending"));
                            self.wake_reader(&state);
                            break;
                        }
                        // A previous offer has not drained yet: park.
                    }
                }
            }
            self.write_notify.notified().await;
        }

        // Rendezvous phase: stay blocked until the reader takes the value.
        loop {
            self.write_notify.notified().await;
            let mut state = self.lock();
            let poison = state.poison;
            if let Slot::Rendezvous(slot) = &mut state.slot {
                if slot.is_none() {
                    // The reader accepted the value; the rendezvous completed
                    // even if poison landed afterwards.
                    return Ok(());
                }
                if poison > immunity {
                    // Retract the undelivered value so it is not reported
                    // both failed and delivered.
                    *slot = None;
                    return Err(PoisonError::new(poison));
                }
            }
        }
    }

    /// Non-blocking offer. Accepted only if a reader is currently committed
    /// to receive (parked in `read` or alt-enabled) or the store has room.
    /// Returns the value back on refusal.
    pub(crate) fn try_write(&self, immunity: u32, value: T) -> ChannelResult<Option<T>> {
        let mut state = self.lock();
        if state.poison > immunity {
            return Err(PoisonError::new(state.poison));
        }
        let receiver_ready = state.reader_committed || state.alt.is_some();
        match &mut state.slot {
            Slot::Buffered(store) => {
                if store.has_room() {
                    store.push(value);
                    self.wake_reader(&state);
                    Ok(None)
                } else {
                    Ok(Some(value))
                }
            }
            Slot::Rendezvous(slot) => {
                if slot.is_none() && receiver_ready {
                    *slot = Some(value);
                    self.wake_reader(&state);
                    Ok(None)
                } else {
                    Ok(Some(value))
                }
            }
        }
    }

    // =========================================================================
    // Read path
    // =========================================================================

    pub(crate) async fn read(&self, immunity: u32) -> ChannelResult<T> {
        loop {
            {
                let mut state = self.lock();
                state.reader_committed = false;
                if state.poison > immunity {
                    return Err(PoisonError::new(state.poison));
                }
                if let Some(value) = Self::take(&mut state.slot) {
                    self.write_notify.notify_one();
                    return Ok(value);
                }
                state.reader_committed = true;
            }
            self.read_notify.notified().await;
        }
    }

    fn take(slot: &mut Slot<T>) -> Option<T> {
        match slot {
            Slot::Rendezvous(slot) => slot.take(),
            Slot::Buffered(store) => store.pop(),
        }
    }

    // =========================================================================
    // Poison
    // =========================================================================

    /// Store `max(current, strength)` and wake every parked operation on both
    /// ends. Idempotent; the immunity gate is at the end, not here.
    pub(crate) fn poison(&self, strength: u32) {
        let mut state = self.lock();
        if strength > state.poison {
            state.poison = strength;
        }
        self.read_notify.notify_one();
        self.write_notify.notify_one();
        if let Some(signal) = &state.alt {
            signal.notify();
        }
    }

    /// Current poison strength (0 = alive).
    pub(crate) fn poison_strength(&self) -> u32 {
        self.lock().poison
    }

    // =========================================================================
    // Alternation hooks (called only by the owning reader)
    // =========================================================================

    /// Returns true if the guard is already ready (value pending, or poison
    /// above the reader's immunity); otherwise registers the alternation
    /// signal and returns false.
    pub(crate) fn alt_enable(&self, immunity: u32, signal: &Arc<AltSignal>) -> bool {
        let mut state = self.lock();
        if state.poison > immunity || !Self::slot_empty(&state.slot) {
            return true;
        }
        state.alt = Some(Arc::clone(signal));
        false
    }

    /// Deregister the alternation signal; returns whether the guard is ready.
    pub(crate) fn alt_disable(&self, immunity: u32) -> bool {
        let mut state = self.lock();
        state.alt = None;
        state.poison > immunity || !Self::slot_empty(&state.slot)
    }

    /// Commit the selected guard's rendezvous. `None` means readiness
    /// evaporated and the selection must go around again.
    pub(crate) fn alt_commit(&self, immunity: u32) -> Option<ChannelResult<T>> {
        let mut state = self.lock();
        if state.poison > immunity {
            return Some(Err(PoisonError::new(state.poison)));
        }
        match Self::take(&mut state.slot) {
            Some(value) => {
                self.write_notify.notify_one();
                Some(Ok(value))
            }
            None => None,
        }
    }

    fn slot_empty(slot: &Slot<T>) -> bool {
        match slot {
            Slot::Rendezvous(slot) => slot.is_none(),
            Slot::Buffered(store) => store.is_empty(),
        }
    }
}
