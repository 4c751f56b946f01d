//! # Tryst
//!
//! Process-oriented concurrency in the CSP style: independent sequential
//! processes that share nothing and interact only through synchronous, typed
//! channels.
//!
//! This crate provides:
//! - **Channels**: one-to-one rendezvous channels where `write` and `read`
//!   unblock together, plus buffered variants with explicit policies
//! - **Poison**: a graded, propagating shutdown signal; every end carries an
//!   immunity level that decides whether a signal is absorbed or observed
//! - **Alternation**: guarded choice over several channel ends, committing to
//!   exactly one ready rendezvous with rotating fairness
//! - **Shared ends**: fair arbitration wrappers for many-writer or
//!   many-reader use of a single channel
//! - **Process composition**: `parallel` for running a batch of processes to
//!   completion, plus the collaborator interfaces at the library boundary

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

/// Guarded choice over multiple channel ends.
pub mod alt;

/// Buffering policies for buffered channels.
pub mod buffer;

/// Channel primitives and channel ends.
pub mod channel;

/// Error types for channel operations.
pub mod error;

/// Process composition and boundary collaborator interfaces.
pub mod process;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use alt::{Alternation, Guard, Selected};
pub use buffer::BufferPolicy;
pub use channel::{
    ChannelInput, ChannelOutput, ChannelReader, ChannelWriter, PoisonHandle, Poisonable,
    SharedChannelReader, SharedChannelWriter, buffered, buffered_with_immunity, channel,
    channel_with_immunity,
};
pub use error::{ChannelResult, PoisonError};
pub use process::{EventSender, Process, Service, parallel, proc};
