//! Tagged demultiplexer: routes inbound frames to per-tag local ends.
//!
//! A background task reads frames off the link receiver and dispatches each
//! payload through the [`BindingTable`] to the sink bound to its tag. Sinks
//! deserialize on receive, so a bad payload fails fast at the boundary, and
//! deliver into a policy-buffered local channel whose reader is the
//! application-facing network end.
//!
//! An unrecognized tag or an undecodable payload is a protocol fault: it is
//! fatal to the owning link (the session fails and its bound writer ends are
//! poisoned), surfaced through `tracing::error`, and the task exits cleanly:
//! never a panic, never a silent drop. Inbound bindings live on the node, not
//! the link, so they survive the fault and other links can still feed them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

use tryst::{ChannelWriter, PoisonHandle, Poisonable};

use crate::control::{LinkControl, control_frame, decode_control};
use crate::error::ProtocolError;
use crate::link::LinkReceiver;
use crate::mux::{MuxHandle, SessionShared};
use crate::wire::TAG_CONTROL;

/// Why a delivery into a local channel did not complete.
pub(crate) enum DeliverError {
    /// The local channel is poisoned at this strength; the poison is bounced
    /// back to the sending side.
    Poisoned(u32),
    /// The payload did not decode for the bound end's type.
    Decode(String),
}

/// Inbound delivery surface of one bound tag.
#[async_trait]
pub(crate) trait InboundSink: Send + Sync {
    /// Decode the payload and deliver it into the local channel, honoring
    /// the channel's buffering policy (a bounded-blocking store exerts
    /// backpressure on the link here).
    async fn deliver(&self, payload: Vec<u8>) -> Result<(), DeliverError>;

    /// Apply a poison signal from the remote writer to the local channel.
    fn poison(&self, strength: u32);
}

/// Feeds one typed local channel from the wire.
pub(crate) struct TypedSink<T> {
    writer: tokio::sync::Mutex<ChannelWriter<T>>,
    poisoner: PoisonHandle<T>,
}

impl<T> TypedSink<T> {
    pub(crate) fn new(writer: ChannelWriter<T>) -> Self {
        let poisoner = writer.poison_handle();
        Self {
            writer: tokio::sync::Mutex::new(writer),
            poisoner,
        }
    }
}

#[async_trait]
impl<T> InboundSink for TypedSink<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn deliver(&self, payload: Vec<u8>) -> Result<(), DeliverError> {
        let value: T =
            serde_json::from_slice(&payload).map_err(|e| DeliverError::Decode(e.to_string()))?;
        let mut writer = self.writer.lock().await;
        writer
            .write(value)
            .await
            .map_err(|fault| DeliverError::Poisoned(fault.strength))
    }

    fn poison(&self, strength: u32) {
        self.poisoner.poison(strength);
    }
}

/// Tag → inbound sink routing table. Shared by every link a node accepts or
/// opens; mutations take an exclusive section and hold no waits.
#[derive(Default)]
pub(crate) struct BindingTable {
    entries: Mutex<HashMap<u32, Arc<dyn InboundSink>>>,
}

impl BindingTable {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bind a sink to a tag. Rebinding while a previous binding exists is
    /// refused; unbind first (migratable ends rebind only with no rendezvous
    /// in flight for the tag).
    pub(crate) fn bind(&self, tag: u32, sink: Arc<dyn InboundSink>) -> Result<(), ProtocolError> {
        let mut entries = self.entries.lock().expect("binding table mutex poisoned");
        if entries.contains_key(&tag) {
            return Err(ProtocolError::TagBound { tag });
        }
        entries.insert(tag, sink);
        Ok(())
    }

    /// Remove the binding for a tag, if any.
    pub(crate) fn unbind(&self, tag: u32) -> Option<Arc<dyn InboundSink>> {
        let mut entries = self.entries.lock().expect("binding table mutex poisoned");
        entries.remove(&tag)
    }

    pub(crate) fn get(&self, tag: u32) -> Option<Arc<dyn InboundSink>> {
        let entries = self.entries.lock().expect("binding table mutex poisoned");
        entries.get(&tag).cloned()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().expect("binding table mutex poisoned").len()
    }
}

/// Spawn the demultiplexer task for one link session.
///
/// `control` is the same link's multiplexer handle, used to bounce poison
/// back to the sending side.
pub(crate) fn spawn_demux<S>(
    mut receiver: LinkReceiver<S>,
    table: Arc<BindingTable>,
    shared: Arc<SessionShared>,
    control: MuxHandle,
) -> JoinHandle<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let frame = match receiver.recv().await {
                Ok(frame) => frame,
                Err(err) => {
                    shared.fail(err);
                    break;
                }
            };

            if frame.tag == TAG_CONTROL {
                match decode_control(&frame.payload) {
                    Ok(LinkControl::Poison { tag, strength }) => {
                        tracing::debug!(peer = %shared.peer(), tag, strength, "poison control");
                        // The tag may be bound on either side of this node:
                        // an inbound end we host, or an outbound end whose
                        // reader poisoned it remotely.
                        if let Some(sink) = table.get(tag) {
                            sink.poison(strength);
                        }
                        shared.poison_outbound(tag, strength);
                    }
                    Err(err) => {
                        tracing::error!(peer = %shared.peer(), error = %err, "protocol fault");
                        shared.fail(err.into());
                        break;
                    }
                }
                continue;
            }

            match table.get(frame.tag) {
                Some(sink) => match sink.deliver(frame.payload).await {
                    Ok(()) => {}
                    Err(DeliverError::Poisoned(strength)) => {
                        // The local channel is already poisoned; tell the
                        // writer on its next arriving frame's link.
                        let message = LinkControl::Poison {
                            tag: frame.tag,
                            strength,
                        };
                        if let Ok(reply) = control_frame(&message) {
                            let _ = control.submit(reply);
                        }
                    }
                    Err(DeliverError::Decode(detail)) => {
                        let err = ProtocolError::MalformedPayload {
                            tag: frame.tag,
                            detail,
                        };
                        tracing::error!(peer = %shared.peer(), error = %err, "protocol fault");
                        shared.fail(err.into());
                        break;
                    }
                },
                None => {
                    let err = ProtocolError::UnknownTag { tag: frame.tag };
                    tracing::error!(peer = %shared.peer(), error = %err, "protocol fault");
                    shared.fail(err.into());
                    break;
                }
            }
        }
        tracing::debug!(peer = %shared.peer(), "demux task finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use crate::link::Link;
    use crate::mux::{PoisonCell, spawn_mux};
    use crate::wire::Frame;
    use tryst::{BufferPolicy, Poisonable, buffered};

    fn session_over_duplex() -> (
        Link<tokio::io::DuplexStream>,
        Arc<BindingTable>,
        Arc<SessionShared>,
        MuxHandle,
    ) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let remote = Link::from_stream(a, "remote".to_string(), LinkConfig::default());
        let local = Link::from_stream(b, "local".to_string(), LinkConfig::default());

        let table = BindingTable::new();
        let shared = SessionShared::new("remote".to_string());
        let (sender, receiver) = local.split();
        let mux = spawn_mux(sender, Arc::clone(&shared));
        spawn_demux(receiver, Arc::clone(&table), Arc::clone(&shared), mux.clone());
        (remote, table, shared, mux)
    }

    #[tokio::test]
    async fn test_routes_frames_to_bound_tag_in_order() {
        let (mut remote, table, _shared, _mux) = session_over_duplex();

        let (writer, mut reader) = buffered::<u32>(BufferPolicy::Unbounded);
        table
            .bind(8, Arc::new(TypedSink::new(writer)))
            .expect("bind");

        for i in 0..5u32 {
            let payload = serde_json::to_vec(&i).expect("encode");
            remote.send(&Frame::new(8, payload)).await.expect("send");
        }
        for i in 0..5u32 {
            assert_eq!(reader.read().await, Ok(i));
        }
    }

    #[tokio::test]
    async fn test_two_tags_demultiplex_independently() {
        let (mut remote, table, _shared, _mux) = session_over_duplex();

        let (writer_a, mut reader_a) = buffered::<String>(BufferPolicy::Unbounded);
        let (writer_b, mut reader_b) = buffered::<String>(BufferPolicy::Unbounded);
        table.bind(8, Arc::new(TypedSink::new(writer_a))).expect("bind");
        table.bind(9, Arc::new(TypedSink::new(writer_b))).expect("bind");

        for (tag, text) in [(8, "a1"), (9, "b1"), (8, "a2"), (9, "b2")] {
            let payload = serde_json::to_vec(text).expect("encode");
            remote.send(&Frame::new(tag, payload)).await.expect("send");
        }

        assert_eq!(reader_a.read().await.expect("read"), "a1");
        assert_eq!(reader_a.read().await.expect("read"), "a2");
        assert_eq!(reader_b.read().await.expect("read"), "b1");
        assert_eq!(reader_b.read().await.expect("read"), "b2");
    }

    #[tokio::test]
    async fn test_unknown_tag_is_fatal_to_link_not_process() {
        let (mut remote, table, shared, _mux) = session_over_duplex();

        let (writer, mut reader) = buffered::<u32>(BufferPolicy::Unbounded);
        table.bind(8, Arc::new(TypedSink::new(writer))).expect("bind");

        let payload = serde_json::to_vec(&1u32).expect("encode");
        remote.send(&Frame::new(77, payload)).await.expect("send");

        // The session records the protocol fault...
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(shared.check_open().is_err());

        // ...but the node-level binding survives for other links, the local
        // reader is not poisoned, and nothing panicked.
        assert_eq!(table.len(), 1);
        let probe =
            tokio::time::timeout(std::time::Duration::from_millis(20), reader.read()).await;
        assert!(probe.is_err(), "reader must stay alive and empty");
    }

    #[tokio::test]
    async fn test_poison_control_poisons_inbound_end() {
        let (mut remote, table, _shared, _mux) = session_over_duplex();

        let (writer, mut reader) = buffered::<u32>(BufferPolicy::Unbounded);
        table.bind(8, Arc::new(TypedSink::new(writer))).expect("bind");

        let frame = control_frame(&LinkControl::Poison { tag: 8, strength: 4 }).expect("encode");
        remote.send(&frame).await.expect("send");

        assert_eq!(reader.read().await.expect_err("poisoned").strength, 4);
    }

    #[tokio::test]
    async fn test_poisoned_inbound_end_bounces_poison_back() {
        let (mut remote, table, _shared, _mux) = session_over_duplex();

        let (writer, reader) = buffered::<u32>(BufferPolicy::Unbounded);
        table.bind(8, Arc::new(TypedSink::new(writer))).expect("bind");
        reader.poison(6);

        let payload = serde_json::to_vec(&1u32).expect("encode");
        remote.send(&Frame::new(8, payload)).await.expect("send");

        // The sending side hears about the poison on the control tag.
        let reply = remote.recv().await.expect("recv");
        assert_eq!(reply.tag, TAG_CONTROL);
        assert_eq!(
            decode_control(&reply.payload).expect("decode"),
            LinkControl::Poison { tag: 8, strength: 6 }
        );
    }

    #[tokio::test]
    async fn test_bind_occupied_tag_is_refused() {
        let table = BindingTable::new();
        let (writer_a, _reader_a) = buffered::<u32>(BufferPolicy::Unbounded);
        let (writer_b, _reader_b) = buffered::<u32>(BufferPolicy::Unbounded);

        table.bind(8, Arc::new(TypedSink::new(writer_a))).expect("bind");
        let result = table.bind(8, Arc::new(TypedSink::new(writer_b)));
        assert_eq!(result, Err(ProtocolError::TagBound { tag: 8 }));

        // After unbinding, the tag is free again (migratable ends).
        table.unbind(8);
        let (writer_c, _reader_c) = buffered::<u32>(BufferPolicy::Unbounded);
        table.bind(8, Arc::new(TypedSink::new(writer_c))).expect("rebind");
    }

    #[tokio::test]
    async fn test_link_fault_poisons_outbound_cell() {
        let (remote, _table, shared, _mux) = session_over_duplex();

        let cell = Arc::new(PoisonCell::new());
        shared.register_outbound(12, Arc::clone(&cell));

        // Remote hangs up; the demux observes the close and fails the session.
        drop(remote);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(cell.strength(), u32::MAX);
    }
}
