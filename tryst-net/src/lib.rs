//! # Tryst Net
//!
//! Network-transparent channel bridging for [`tryst`]: two processes on
//! different nodes communicate through channel ends that look and behave
//! like local ones (blocking reads, poison propagation, alternation) while
//! the bridge handles framing, multiplexing and name resolution underneath.
//!
//! This crate provides:
//! - **Wire framing**: `[tag][length][payload]` frames over an ordered byte
//!   stream, with a reserved tag space for bridge traffic
//! - **Link**: the physical transport abstraction with fail-fast fault
//!   semantics and no hidden retry
//! - **Tagged multiplexing**: any number of logical channels share one link;
//!   a demultiplexer routes inbound frames back to per-tag ends
//! - **Name service**: a registry mapping symbolic channel names to network
//!   locations, with exclusive-ownership rules, served over the wire
//! - **NetNode**: the composition point for creating, advertising,
//!   resolving and opening network channel ends
//!
//! Synchronous rendezvous cannot cross a store-and-forward boundary
//! transparently, so every network input states its buffering policy
//! explicitly at creation; everything else about the channel contract
//! carries over unchanged.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

/// Channel name service: registry, wire protocol, server and client.
pub mod cns;

/// Link configuration.
pub mod config;

/// Link-control messages.
pub mod control;

/// Error types for the network bridge.
pub mod error;

/// The physical transport abstraction.
pub mod link;

/// Network channel ends and locations.
pub mod endpoint;

/// A node bridging local channels over links.
pub mod node;

/// Wire format for multiplexed frames.
pub mod wire;

mod demux;
mod mux;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use cns::{NameBinding, NameClient, NameRegistry, NameServer, OwnerId, protocol};
pub use config::LinkConfig;
pub use control::LinkControl;
pub use endpoint::{ChannelLocation, NetChannelReader, NetChannelWriter};
pub use error::{LinkError, LinkResult, NameError, NetError, NetResult, ProtocolError};
pub use link::{Link, LinkReceiver, LinkSender};
pub use mux::MuxHandle;
pub use node::NetNode;
pub use wire::{FIRST_DYNAMIC_TAG, Frame, HEADER_SIZE, TAG_CONTROL, TAG_NAME};
