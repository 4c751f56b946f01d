//! Network channel ends.
//!
//! From the application's point of view these behave exactly like local
//! poisonable channel ends: `read`/`write` block per the channel contract,
//! fail with a poison fault once poisoned above the end's immunity, and a
//! [`NetChannelReader`] participates in an alternation like any local
//! reader.
//!
//! What differs is stated explicitly: synchronous one-to-one rendezvous
//! cannot be preserved across a store-and-forward link, so every network
//! input channel carries a [`tryst::BufferPolicy`] chosen at creation, and a
//! network `write` completes when the link accepts the frame, not when the
//! remote reader takes the value.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tryst::{
    ChannelInput, ChannelOutput, ChannelReader, ChannelResult, Guard, PoisonError, Poisonable,
};

use crate::control::{LinkControl, control_frame};
use crate::demux::BindingTable;
use crate::mux::{MuxHandle, PoisonCell};
use crate::wire::Frame;

/// Network location of a channel input: the address of the node hosting it
/// and the tag it is bound to there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelLocation {
    /// Listening address of the hosting node.
    pub addr: String,
    /// Tag of the logical channel on that node.
    pub tag: u32,
}

impl fmt::Display for ChannelLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.addr, self.tag)
    }
}

/// The reading end of a network channel.
///
/// This *is* a local policy-buffered reader, fed by the demultiplexer of
/// whichever links deliver frames for its tag. Dropping it unbinds the tag.
pub struct NetChannelReader<T> {
    inner: ChannelReader<T>,
    location: ChannelLocation,
    table: Arc<BindingTable>,
}

impl<T> NetChannelReader<T> {
    pub(crate) fn new(
        inner: ChannelReader<T>,
        location: ChannelLocation,
        table: Arc<BindingTable>,
    ) -> Self {
        Self {
            inner,
            location,
            table,
        }
    }

    /// Read one value in arrival order for this tag.
    ///
    /// # Errors
    ///
    /// Fails with [`PoisonError`] once the channel is poisoned above this
    /// end's immunity: locally, by a remote writer, or synthetically by a
    /// link fault.
    pub async fn read(&mut self) -> ChannelResult<T> {
        self.inner.read().await
    }

    /// Use this end as an alternation guard, like any local reader.
    pub fn guard(&mut self) -> Guard<'_, T> {
        Guard::input(&mut self.inner)
    }

    /// Where remote writers reach this end.
    pub fn location(&self) -> &ChannelLocation {
        &self.location
    }
}

impl<T> Poisonable for NetChannelReader<T> {
    fn poison(&self, strength: u32) {
        // Poison lands locally at once; remote writers hear about it when
        // their next frame for this tag is bounced by the demultiplexer.
        self.inner.poison(strength);
    }
}

impl<T> Drop for NetChannelReader<T> {
    fn drop(&mut self) {
        self.table.unbind(self.location.tag);
    }
}

#[async_trait]
impl<T: Send + 'static> ChannelInput<T> for NetChannelReader<T> {
    async fn read(&mut self) -> ChannelResult<T> {
        NetChannelReader::read(self).await
    }
}

/// The writing end of a network channel.
///
/// Serializes each value and submits it to the link's multiplexer;
/// store-and-forward, so `write` completes on acceptance by the link.
pub struct NetChannelWriter<T> {
    tag: u32,
    mux: MuxHandle,
    cell: Arc<PoisonCell>,
    immunity: u32,
    _values: PhantomData<fn(T)>,
}

impl<T: Serialize + Send> NetChannelWriter<T> {
    pub(crate) fn new(tag: u32, mux: MuxHandle, cell: Arc<PoisonCell>, immunity: u32) -> Self {
        Self {
            tag,
            mux,
            cell,
            immunity,
            _values: PhantomData,
        }
    }

    /// Write one value toward the remote input end.
    ///
    /// # Errors
    ///
    /// Fails with [`PoisonError`] once this end is poisoned above its
    /// immunity: by a local `poison` call, by the remote reader (bounced
    /// back over the link), or synthetically when the link dies.
    pub async fn write(&mut self, value: T) -> ChannelResult<()> {
        let strength = self.cell.strength();
        if strength > self.immunity {
            return Err(PoisonError::new(strength));
        }
        let payload = match serde_json::to_vec(&value) {
            Ok(payload) => payload,
            Err(err) => {
                // An unserializable value is a protocol fault at the source;
                // the end is taken down rather than the fault hidden.
                tracing::error!(tag = self.tag, error = %err, "payload serialization failed");
                self.cell.poison(u32::MAX);
                return Err(PoisonError::new(u32::MAX));
            }
        };
        match self.mux.submit(Frame::new(self.tag, payload)) {
            Ok(()) => Ok(()),
            Err(_) => {
                // The link is gone: surface the bounded, well-defined fault.
                self.cell.poison(u32::MAX);
                Err(PoisonError::new(u32::MAX))
            }
        }
    }

    /// This end's immunity level.
    pub fn immunity(&self) -> u32 {
        self.immunity
    }
}

impl<T> Poisonable for NetChannelWriter<T> {
    fn poison(&self, strength: u32) {
        if strength <= self.immunity {
            return;
        }
        self.cell.poison(strength);
        let message = LinkControl::Poison {
            tag: self.tag,
            strength,
        };
        if let Ok(frame) = control_frame(&message) {
            let _ = self.mux.submit(frame);
        }
    }
}

#[async_trait]
impl<T: Serialize + Send + 'static> ChannelOutput<T> for NetChannelWriter<T> {
    async fn write(&mut self, value: T) -> ChannelResult<()> {
        NetChannelWriter::write(self, value).await
    }
}
