//! Error types for the network bridge.
//!
//! The taxonomy mirrors how faults behave, not where they occur:
//!
//! - [`tryst::PoisonError`]: expected, propagating, non-fatal to the network
//!   as a whole; the only failure surfaced by channel-end operations.
//! - [`ProtocolError`]: malformed frame, unknown tag, oversized payload.
//!   Always fatal to the owning link, never silently absorbed.
//! - [`LinkError`]: transport-level failure. Closes the link and poisons the
//!   ends bound to it.
//! - [`NameError`]: returned to the caller of a name-service operation and
//!   never propagated further; retry and alternate-name policy belong to the
//!   caller.
//!
//! No operation is retried internally: CSP semantics require predictable,
//! bounded blocking, not hidden backoff loops.

use thiserror::Error;

/// A violation of the framing or multiplexing protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame payload exceeds the configured maximum.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Declared payload size in bytes.
        size: usize,
        /// Configured maximum payload size.
        max: usize,
    },

    /// A frame arrived for a tag with no bound end.
    #[error("no end bound for tag {tag}")]
    UnknownTag {
        /// The unrecognized tag.
        tag: u32,
    },

    /// A tag is already bound on this table.
    #[error("tag {tag} already bound")]
    TagBound {
        /// The occupied tag.
        tag: u32,
    },

    /// A payload could not be decoded for its bound end.
    #[error("malformed payload for tag {tag}: {detail}")]
    MalformedPayload {
        /// Tag the payload was addressed to.
        tag: u32,
        /// Decoder diagnostic.
        detail: String,
    },

    /// The byte stream ended in the middle of a frame.
    #[error("connection closed mid-frame with {have} bytes pending")]
    Truncated {
        /// Bytes left undecoded when the stream ended.
        have: usize,
    },
}

/// A transport-level failure on a link.
#[derive(Error, Debug, Clone)]
pub enum LinkError {
    /// The link is closed; every further operation fails fast.
    #[error("link closed")]
    Closed,

    /// The underlying transport reported an I/O fault.
    #[error("link i/o failure: {0}")]
    Io(String),

    /// The peer violated the framing protocol.
    #[error("link protocol fault: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection establishment did not complete in time.
    #[error("connect timeout to {addr}")]
    ConnectTimeout {
        /// Address being dialed.
        addr: String,
    },
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io(err.to_string())
    }
}

/// Result type for link operations.
pub type LinkResult<T> = Result<T, LinkError>;

/// A name-service fault, returned to the caller and never propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// The name is registered to a different owner.
    #[error("name in use: {name}")]
    NameInUse {
        /// The contested name.
        name: String,
    },

    /// No binding exists for the name.
    #[error("name not found: {name}")]
    NotFound {
        /// The unresolved name.
        name: String,
    },

    /// The caller's identity does not match the binding's owner.
    #[error("not the owner of name: {name}")]
    NotOwner {
        /// The protected name.
        name: String,
    },

    /// The name-service link itself failed.
    #[error("name service transport failure: {0}")]
    Transport(String),
}

/// Umbrella error for the composition layer, where opening a network channel
/// end can fail at the name-service, link, or channel level.
#[derive(Error, Debug)]
pub enum NetError {
    /// Link-level failure.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Name-service failure.
    #[error(transparent)]
    Name(#[from] NameError),

    /// Channel-level poison fault.
    #[error(transparent)]
    Poison(#[from] tryst::PoisonError),
}

/// Result type for composition-layer operations.
pub type NetResult<T> = Result<T, NetError>;
