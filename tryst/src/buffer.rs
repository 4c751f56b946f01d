//! Buffering policies for buffered channels.
//!
//! A buffered channel decouples writer and reader: `write` returns as soon as
//! the store accepts the value, and `read` returns as soon as the store is
//! non-empty. The policy is stated at construction and is part of the
//! channel's observable behavior. In particular, [`BufferPolicy::OverwriteOldest`]
//! silently discards the oldest unread value on overflow, so callers that
//! need lossless delivery must pick a different policy.

use std::collections::VecDeque;

/// Buffering contract of a buffered channel. FIFO order in all cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPolicy {
    /// The store grows without bound; `write` never blocks.
    Unbounded,
    /// The store holds at most `n` values; `write` blocks while it is full.
    /// A capacity of zero is treated as one.
    Bounded(usize),
    /// The store holds at most `n` values; on overflow the oldest unread
    /// value is dropped and `write` returns immediately. Lossy by design.
    /// A capacity of zero is treated as one.
    OverwriteOldest(usize),
}

impl BufferPolicy {
    fn capacity(self) -> Option<usize> {
        match self {
            BufferPolicy::Unbounded => None,
            BufferPolicy::Bounded(n) | BufferPolicy::OverwriteOldest(n) => Some(n.max(1)),
        }
    }
}

/// FIFO store driven by a [`BufferPolicy`].
pub(crate) struct Store<T> {
    queue: VecDeque<T>,
    policy: BufferPolicy,
}

impl<T> Store<T> {
    pub(crate) fn new(policy: BufferPolicy) -> Self {
        Self {
            queue: VecDeque::new(),
            policy,
        }
    }

    /// Whether a `write` would be accepted without blocking.
    pub(crate) fn has_room(&self) -> bool {
        match self.policy {
            BufferPolicy::Unbounded | BufferPolicy::OverwriteOldest(_) => true,
            BufferPolicy::Bounded(_) => {
                let cap = self.policy.capacity().unwrap_or(usize::MAX);
                self.queue.len() < cap
            }
        }
    }

    /// Accept a value, applying the overflow rule of the policy.
    ///
    /// Callers must check [`Store::has_room`] first for the bounded-blocking
    /// policy; this only drops the oldest value for `OverwriteOldest`.
    pub(crate) fn push(&mut self, value: T) {
        if let BufferPolicy::OverwriteOldest(_) = self.policy {
            let cap = self.policy.capacity().unwrap_or(usize::MAX);
            if self.queue.len() >= cap {
                let _ = self.queue.pop_front();
            }
        }
        self.queue.push_back(value);
    }

    pub(crate) fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
