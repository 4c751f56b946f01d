//! Channel name service: a registry mapping symbolic channel names to
//! network locations, with exclusive-ownership rules over names.
//!
//! A name is registered by exactly one owner, identified by an opaque token
//! captured at registration time; only that owner may retract the binding.
//! Lookups by anyone else yield the location, never ownership: guessing a
//! name is not enough to destroy another process's advertised channel.
//!
//! The service is available in-process as [`NameRegistry`] and over the
//! wire as [`NameServer`] / [`NameClient`], speaking the request/response
//! protocol in [`protocol`].

mod client;
mod registry;
/// Wire protocol of the name service.
pub mod protocol;
mod server;

pub use client::NameClient;
pub use registry::{NameBinding, NameRegistry, OwnerId};
pub use server::NameServer;
