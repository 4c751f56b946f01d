//! Error types for channel operations.
//!
//! Poisoning is the only way a channel-end operation fails. A process whose
//! peer has gone away observes an immediate, typed error on every subsequent
//! call instead of blocking forever; that is the entire point of the poison
//! protocol.

use thiserror::Error;

/// A channel operation failed because the channel is poisoned at a strength
/// above the calling end's immunity.
///
/// Poison strength on a channel is monotonic: it only ever increases, via
/// `max(current, requested)`. An end with immunity `i` keeps operating
/// normally while the channel strength is at most `i`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("channel poisoned at strength {strength}")]
pub struct PoisonError {
    /// Effective poison strength stored on the channel when the operation
    /// failed.
    pub strength: u32,
}

impl PoisonError {
    /// Create a poison error for the given effective strength.
    pub const fn new(strength: u32) -> Self {
        Self { strength }
    }
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, PoisonError>;
