//! Link-control messages, carried on [`crate::wire::TAG_CONTROL`].
//!
//! Control frames ride the same multiplexed stream as data, so they are
//! ordered with respect to the data frames of every tag on the link.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::wire::{Frame, TAG_CONTROL};

/// A control message exchanged between the two ends of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkControl {
    /// Poison the end bound to `tag` on the receiving side at `strength`.
    ///
    /// Sent by a writer end when it is poisoned locally, and bounced back by
    /// a demultiplexer when a data frame arrives for a tag whose local
    /// channel is already poisoned.
    Poison {
        /// Tag of the logical channel being poisoned.
        tag: u32,
        /// Poison strength to apply.
        strength: u32,
    },
}

/// Encode a control message as a frame on the control tag.
pub(crate) fn control_frame(message: &LinkControl) -> Result<Frame, ProtocolError> {
    let payload = serde_json::to_vec(message).map_err(|e| ProtocolError::MalformedPayload {
        tag: TAG_CONTROL,
        detail: e.to_string(),
    })?;
    Ok(Frame::new(TAG_CONTROL, payload))
}

/// Decode a control message from a control-tag payload.
pub(crate) fn decode_control(payload: &[u8]) -> Result<LinkControl, ProtocolError> {
    serde_json::from_slice(payload).map_err(|e| ProtocolError::MalformedPayload {
        tag: TAG_CONTROL,
        detail: e.to_string(),
    })
}
