//! Guarded choice over multiple channel ends.
//!
//! An [`Alternation`] lets a process offer several input guards at once and
//! commit to exactly one ready rendezvous. Selection is all-or-nothing: the
//! non-selected guards are left untouched, with no value consumed and no
//! partial hand-off observable from the other end.
//!
//! Selection runs the classic enable/wait/disable cycle: guards are enabled
//! in priority order; if none is ready the process parks on a shared signal
//! that every enabled channel can trip; on wakeup the guards are disabled in
//! reverse order and the highest-priority ready one is committed. Priority
//! rotates past the selected guard on every call, so two permanently-ready
//! guards alternate instead of the first starving the second.
//!
//! A poisoned guard counts as ready; committing it yields the poison fault
//! instead of a value.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tryst::{Alternation, Guard, Selected, channel};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (mut tx, mut rx) = channel::<u32>();
//! let (_idle_tx, mut idle_rx) = channel::<u32>();
//!
//! tokio::spawn(async move { tx.write(10).await.expect("write") });
//!
//! let mut alt = Alternation::new(vec![
//!     Guard::input(&mut idle_rx),
//!     Guard::input(&mut rx),
//!     Guard::timeout(Duration::from_secs(5)),
//! ]);
//! match alt.select().await.expect("not poisoned") {
//!     Selected::Value { index, value } => {
//!         assert_eq!((index, value), (1, 10));
//!     }
//!     other => panic!("unexpected selection: {other:?}"),
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::channel::ChannelReader;
use crate::error::ChannelResult;

/// Wakeup line shared between an alternation and its enabled channels.
pub(crate) struct AltSignal {
    notify: Notify,
}

impl AltSignal {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            notify: Notify::new(),
        })
    }

    /// Trip the signal. Stores a permit if the alternation is not parked yet,
    /// so a wakeup racing the park is never lost.
    pub(crate) fn notify(&self) {
        self.notify.notify_one();
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// One branch of an alternation.
pub struct Guard<'a, T> {
    kind: GuardKind<'a, T>,
}

enum GuardKind<'a, T> {
    Input(&'a mut ChannelReader<T>),
    Timeout(Duration),
    Skip,
}

impl<'a, T> Guard<'a, T> {
    /// A channel guard: ready when a rendezvous partner is present or the
    /// channel is poisoned above the reader's immunity.
    pub fn input(reader: &'a mut ChannelReader<T>) -> Self {
        Self {
            kind: GuardKind::Input(reader),
        }
    }

    /// A timeout guard: fires once `after` has elapsed since the selection
    /// call started, if no other guard became ready first.
    pub fn timeout(after: Duration) -> Self {
        Self {
            kind: GuardKind::Timeout(after),
        }
    }

    /// A guard that is always ready and performs no rendezvous.
    pub fn skip() -> Self {
        Self {
            kind: GuardKind::Skip,
        }
    }
}

/// Outcome of a selection.
#[derive(Debug, PartialEq, Eq)]
pub enum Selected<T> {
    /// The channel guard at `index` committed its rendezvous.
    Value {
        /// Position of the guard in the alternation's guard list.
        index: usize,
        /// The value received from that channel.
        value: T,
    },
    /// The timeout guard at `index` fired before any other guard was ready.
    Timeout {
        /// Position of the guard in the alternation's guard list.
        index: usize,
    },
    /// The skip guard at `index` was chosen.
    Skip {
        /// Position of the guard in the alternation's guard list.
        index: usize,
    },
}

/// Guarded choice over an ordered list of guards, with rotating fairness.
///
/// The fairness cursor lives on the `Alternation` value: keep it alive and
/// call [`Alternation::select`] repeatedly to get fair selection across
/// calls.
pub struct Alternation<'a, T> {
    guards: Vec<Guard<'a, T>>,
    favourite: usize,
    signal: Arc<AltSignal>,
    enabled: Vec<bool>,
}

impl<'a, T> Alternation<'a, T> {
    /// Build an alternation over the given guards.
    ///
    /// # Panics
    ///
    /// Panics if `guards` is empty.
    pub fn new(guards: Vec<Guard<'a, T>>) -> Self {
        assert!(!guards.is_empty(), "alternation requires at least one guard");
        let enabled = vec![false; guards.len()];
        Self {
            guards,
            favourite: 0,
            signal: AltSignal::new(),
            enabled,
        }
    }

    /// Number of guards.
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Whether the guard list is empty (never true for a constructed value).
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Block until a guard is ready, commit exactly one, and report it.
    ///
    /// # Errors
    ///
    /// Returns the poison fault if the committed guard's channel is poisoned
    /// above its reader's immunity.
    pub async fn select(&mut self) -> ChannelResult<Selected<T>> {
        let preconditions = vec![true; self.guards.len()];
        self.select_where(&preconditions).await
    }

    /// Like [`Alternation::select`], but a guard whose precondition is
    /// `false` is neither enabled nor selectable on this call.
    ///
    /// # Panics
    ///
    /// Panics if `preconditions` has the wrong length or disables every
    /// guard.
    pub async fn select_where(&mut self, preconditions: &[bool]) -> ChannelResult<Selected<T>> {
        let n = self.guards.len();
        assert_eq!(
            preconditions.len(),
            n,
            "one precondition per guard required"
        );
        assert!(
            preconditions.iter().any(|&p| p),
            "alternation requires at least one active guard"
        );

        // Timeout deadlines are fixed once per selection call; retries after
        // spurious wakeups must not extend them.
        let mut armed: Option<(usize, tokio::time::Instant)> = None;
        for (i, guard) in self.guards.iter().enumerate() {
            if !preconditions[i] {
                continue;
            }
            if let GuardKind::Timeout(after) = guard.kind {
                let deadline = tokio::time::Instant::now() + after;
                let earlier = match armed {
                    None => true,
                    Some((_, best)) => deadline < best,
                };
                if earlier {
                    armed = Some((i, deadline));
                }
            }
        }

        let signal = Arc::clone(&self.signal);
        loop {
            // Enable phase: walk guards in rotated priority order, stopping
            // at the first one that is already ready.
            self.enabled.iter_mut().for_each(|e| *e = false);
            let mut found = None;
            for k in 0..n {
                let i = (self.favourite + k) % n;
                if !preconditions[i] {
                    continue;
                }
                match &mut self.guards[i].kind {
                    GuardKind::Input(reader) => {
                        if reader.alt_enable(&signal) {
                            found = Some(i);
                            break;
                        }
                        self.enabled[i] = true;
                    }
                    GuardKind::Skip => {
                        found = Some(i);
                        break;
                    }
                    GuardKind::Timeout(_) => {}
                }
            }

            // Wait phase: park until an enabled channel trips the signal or
            // the armed timeout expires.
            let mut timeout_fired = None;
            if found.is_none() {
                match armed {
                    Some((index, deadline)) => {
                        if tokio::time::timeout_at(deadline, signal.wait())
                            .await
                            .is_err()
                        {
                            timeout_fired = Some(index);
                        }
                    }
                    None => signal.wait().await,
                }
            }

            // Disable phase: reverse rotation order; the last ready guard
            // seen is the highest-priority one. A channel that became ready
            // while the timeout raced it wins over the timeout.
            let mut selected = found;
            for k in (0..n).rev() {
                let i = (self.favourite + k) % n;
                if !self.enabled[i] {
                    continue;
                }
                self.enabled[i] = false;
                if let GuardKind::Input(reader) = &mut self.guards[i].kind {
                    if reader.alt_disable() {
                        selected = Some(i);
                    }
                }
            }

            match selected {
                Some(index) => match &mut self.guards[index].kind {
                    GuardKind::Input(reader) => match reader.alt_commit() {
                        Some(Ok(value)) => {
                            self.favourite = (index + 1) % n;
                            return Ok(Selected::Value { index, value });
                        }
                        Some(Err(fault)) => {
                            self.favourite = (index + 1) % n;
                            return Err(fault);
                        }
                        // Readiness evaporated; go around.
                        None => {}
                    },
                    GuardKind::Skip => {
                        self.favourite = (index + 1) % n;
                        return Ok(Selected::Skip { index });
                    }
                    GuardKind::Timeout(_) => unreachable!("timeout guards are never enabled"),
                },
                None => {
                    if let Some(index) = timeout_fired {
                        self.favourite = (index + 1) % n;
                        return Ok(Selected::Timeout { index });
                    }
                    // Spurious wakeup from a stale permit; go around.
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPolicy;
    use crate::channel::{Poisonable, buffered, channel};
    use crate::error::PoisonError;

    #[tokio::test]
    async fn test_commits_to_single_ready_guard() {
        let (mut tx_a, mut rx_a) = buffered::<u32>(BufferPolicy::Unbounded);
        let (_tx_b, mut rx_b) = channel::<u32>();

        tx_a.write(5).await.expect("write");

        let mut alt = Alternation::new(vec![Guard::input(&mut rx_b), Guard::input(&mut rx_a)]);
        let selected = alt.select().await.expect("select");
        assert_eq!(selected, Selected::Value { index: 1, value: 5 });
    }

    #[tokio::test]
    async fn test_non_selected_guards_unaffected() {
        let (mut tx_a, mut rx_a) = buffered::<u32>(BufferPolicy::Unbounded);
        let (mut tx_b, mut rx_b) = buffered::<u32>(BufferPolicy::Unbounded);
        tx_a.write(1).await.expect("write");
        tx_b.write(2).await.expect("write");

        {
            let mut alt = Alternation::new(vec![Guard::input(&mut rx_a), Guard::input(&mut rx_b)]);
            let selected = alt.select().await.expect("select");
            assert_eq!(selected, Selected::Value { index: 0, value: 1 });
        }

        // The non-selected channel still holds its value.
        assert_eq!(rx_b.read().await, Ok(2));
    }

    #[tokio::test]
    async fn test_blocks_until_a_guard_is_ready() {
        let (mut tx, mut rx) = channel::<u32>();
        let (_idle_tx, mut idle_rx) = channel::<u32>();

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.write(9).await.expect("write");
        });

        let mut alt = Alternation::new(vec![Guard::input(&mut idle_rx), Guard::input(&mut rx)]);
        let selected = alt.select().await.expect("select");
        assert_eq!(selected, Selected::Value { index: 1, value: 9 });
        writer.await.expect("join");
    }

    #[tokio::test]
    async fn test_timeout_guard_fires_when_idle() {
        let (_tx, mut rx) = channel::<u32>();

        let mut alt = Alternation::new(vec![
            Guard::input(&mut rx),
            Guard::timeout(Duration::from_millis(30)),
        ]);
        let started = std::time::Instant::now();
        let selected = alt.select().await.expect("select");
        assert_eq!(selected, Selected::Timeout { index: 1 });
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_ready_channel_beats_timeout() {
        let (mut tx, mut rx) = buffered::<u32>(BufferPolicy::Unbounded);
        tx.write(3).await.expect("write");

        let mut alt = Alternation::new(vec![
            Guard::timeout(Duration::from_millis(30)),
            Guard::input(&mut rx),
        ]);
        let selected = alt.select().await.expect("select");
        assert_eq!(selected, Selected::Value { index: 1, value: 3 });
    }

    #[tokio::test]
    async fn test_skip_guard_when_nothing_ready() {
        let (_tx, mut rx) = channel::<u32>();

        let mut alt = Alternation::new(vec![Guard::input(&mut rx), Guard::skip()]);
        let selected = alt.select().await.expect("select");
        assert_eq!(selected, Selected::Skip { index: 1 });
    }

    #[tokio::test]
    async fn test_poisoned_guard_counts_as_ready() {
        let (tx, mut rx) = channel::<u32>();
        let (_idle_tx, mut idle_rx) = channel::<u32>();
        tx.poison(7);

        let mut alt = Alternation::new(vec![Guard::input(&mut idle_rx), Guard::input(&mut rx)]);
        assert_eq!(alt.select().await, Err(PoisonError::new(7)));
    }

    #[tokio::test]
    async fn test_fairness_over_two_ready_guards() {
        let (mut tx_a, mut rx_a) = buffered::<u32>(BufferPolicy::Unbounded);
        let (mut tx_b, mut rx_b) = buffered::<u32>(BufferPolicy::Unbounded);
        for i in 0..50 {
            tx_a.write(i).await.expect("write");
            tx_b.write(i).await.expect("write");
        }

        let mut counts = [0u32; 2];
        let mut alt = Alternation::new(vec![Guard::input(&mut rx_a), Guard::input(&mut rx_b)]);
        for _ in 0..100 {
            match alt.select().await.expect("select") {
                Selected::Value { index, .. } => counts[index] += 1,
                other => panic!("unexpected selection: {other:?}"),
            }
        }

        // Both permanently-ready guards are selected a comparable number of
        // times; neither is starved.
        assert_eq!(counts[0] + counts[1], 100);
        assert!(counts[0] >= 30, "guard 0 starved: {counts:?}");
        assert!(counts[1] >= 30, "guard 1 starved: {counts:?}");
    }

    #[tokio::test]
    async fn test_precondition_disables_guard() {
        let (mut tx_a, mut rx_a) = buffered::<u32>(BufferPolicy::Unbounded);
        let (mut tx_b, mut rx_b) = buffered::<u32>(BufferPolicy::Unbounded);
        tx_a.write(1).await.expect("write");
        tx_b.write(2).await.expect("write");

        let mut alt = Alternation::new(vec![Guard::input(&mut rx_a), Guard::input(&mut rx_b)]);
        let selected = alt.select_where(&[false, true]).await.expect("select");
        assert_eq!(selected, Selected::Value { index: 1, value: 2 });
    }
}
