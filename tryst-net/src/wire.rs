//! Wire format for multiplexed frames.
//!
//! Frame format: `[tag:4][length:4][payload:N]`
//!
//! - **tag**: logical channel identifier (little-endian u32)
//! - **length**: payload size in bytes (little-endian u32)
//! - **payload**: serialized value, `length` bytes
//!
//! Frames are written back to back with no end marker; the message boundary
//! comes from the length prefix and the stream boundary from connection
//! close. Tags are unique per link for the lifetime of its session, and the
//! physical stream preserves frame order.

use crate::error::ProtocolError;

/// Header size: 4 (tag) + 4 (length) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Tags below this value are reserved for the bridge itself.
pub const FIRST_DYNAMIC_TAG: u32 = 8;

/// Reserved tag carrying link-control messages (poison propagation).
pub const TAG_CONTROL: u32 = 0;

/// Reserved tag carrying name-service requests and responses.
pub const TAG_NAME: u32 = 1;

/// One multiplexed wire unit: a logical-channel tag and an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Logical channel this frame belongs to.
    pub tag: u32,
    /// Serialized value.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame.
    pub fn new(tag: u32, payload: Vec<u8>) -> Self {
        Self { tag, payload }
    }

    /// Total encoded size including the header.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into bytes.
///
/// # Errors
///
/// Returns `PayloadTooLarge` if the payload exceeds `max_payload`.
pub fn encode_frame(frame: &Frame, max_payload: usize) -> Result<Vec<u8>, ProtocolError> {
    if frame.payload.len() > max_payload {
        return Err(ProtocolError::PayloadTooLarge {
            size: frame.payload.len(),
            max: max_payload,
        });
    }

    let mut data = Vec::with_capacity(frame.encoded_len());
    data.extend_from_slice(&frame.tag.to_le_bytes());
    data.extend_from_slice(&(frame.payload.len() as u32).to_le_bytes());
    data.extend_from_slice(&frame.payload);
    Ok(data)
}

/// Try to decode one frame from a buffer that may hold partial data.
///
/// # Returns
///
/// - `Ok(Some((frame, consumed)))` if a complete frame was parsed
/// - `Ok(None)` if more data is needed (not an error condition)
/// - `Err` if the declared payload size violates the limit
pub fn try_decode_frame(
    data: &[u8],
    max_payload: usize,
) -> Result<Option<(Frame, usize)>, ProtocolError> {
    if data.len() < HEADER_SIZE {
        return Ok(None); // Need more data for the header
    }

    let tag = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let length = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;

    if length > max_payload {
        return Err(ProtocolError::PayloadTooLarge {
            size: length,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + length;
    if data.len() < total {
        return Ok(None); // Need more data for the payload
    }

    let payload = data[HEADER_SIZE..total].to_vec();
    Ok(Some((Frame::new(tag, payload), total)))
}
