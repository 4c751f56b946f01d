//! Tagged multiplexer: many logical output ends, one physical link.
//!
//! Submissions from any number of logical ends are accepted into a single
//! queue and drained to the link by a background writer task, so the
//! acceptance order is the one global frame order on the wire. Per-tag order
//! follows from the global order.
//!
//! The multiplexer owns the writer-side bookkeeping of a link session: the
//! set of outbound ends bound to tags, each with a poison cell that turns a
//! link fault into a synthetic poison signal on every bound end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::error::{LinkError, LinkResult};
use crate::link::LinkSender;
use crate::wire::Frame;

/// Writer-side poison state of one outbound logical end.
///
/// Monotonic like channel poison; a strength of `u32::MAX` is the synthetic
/// signal applied when the link itself dies.
pub(crate) struct PoisonCell {
    strength: AtomicU32,
}

impl PoisonCell {
    pub(crate) fn new() -> Self {
        Self {
            strength: AtomicU32::new(0),
        }
    }

    pub(crate) fn poison(&self, strength: u32) {
        self.strength.fetch_max(strength, Ordering::SeqCst);
    }

    pub(crate) fn strength(&self) -> u32 {
        self.strength.load(Ordering::SeqCst)
    }
}

/// State shared by a link session's mux handle, demux task and writer task.
pub(crate) struct SessionShared {
    peer: String,
    fault: Mutex<Option<LinkError>>,
    outbound: Mutex<HashMap<u32, Arc<PoisonCell>>>,
}

impl SessionShared {
    pub(crate) fn new(peer: String) -> Arc<Self> {
        Arc::new(Self {
            peer,
            fault: Mutex::new(None),
            outbound: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn peer(&self) -> &str {
        &self.peer
    }

    pub(crate) fn check_open(&self) -> LinkResult<()> {
        match &*self.fault.lock().expect("session fault mutex poisoned") {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Record the session fault and poison every outbound end bound to this
    /// link. All bound ends receive the synthetic signal exactly once.
    pub(crate) fn fail(&self, err: LinkError) {
        {
            let mut fault = self.fault.lock().expect("session fault mutex poisoned");
            if fault.is_some() {
                return;
            }
            tracing::warn!(peer = %self.peer, error = %err, "link session failed");
            *fault = Some(err);
        }
        let cells: Vec<Arc<PoisonCell>> = {
            let outbound = self.outbound.lock().expect("session outbound mutex poisoned");
            outbound.values().cloned().collect()
        };
        for cell in cells {
            cell.poison(u32::MAX);
        }
    }

    /// Bind a writer end's poison cell to a tag on this link.
    pub(crate) fn register_outbound(&self, tag: u32, cell: Arc<PoisonCell>) {
        let mut outbound = self.outbound.lock().expect("session outbound mutex poisoned");
        outbound.insert(tag, cell);
    }

    /// Apply an inbound poison control to the writer end bound to `tag`.
    pub(crate) fn poison_outbound(&self, tag: u32, strength: u32) {
        let outbound = self.outbound.lock().expect("session outbound mutex poisoned");
        if let Some(cell) = outbound.get(&tag) {
            cell.poison(strength);
        }
    }
}

/// Clonable submission handle onto one link's multiplexer.
#[derive(Clone)]
pub struct MuxHandle {
    tx: mpsc::UnboundedSender<Frame>,
    shared: Arc<SessionShared>,
}

impl MuxHandle {
    /// Submit a frame for transmission. Acceptance order is the global frame
    /// order on the link.
    ///
    /// # Errors
    ///
    /// Fails fast once the link session has faulted or shut down.
    pub fn submit(&self, frame: Frame) -> LinkResult<()> {
        self.shared.check_open()?;
        self.tx.send(frame).map_err(|_| LinkError::Closed)
    }

    pub(crate) fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }
}

/// Spawn the writer task draining submissions onto the link, and hand back
/// the submission side.
pub(crate) fn spawn_mux<S>(mut sender: LinkSender<S>, shared: Arc<SessionShared>) -> MuxHandle
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    let task_shared = Arc::clone(&shared);
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if task_shared.check_open().is_err() {
                break;
            }
            if let Err(err) = sender.send(&frame).await {
                task_shared.fail(err);
                break;
            }
        }
        tracing::debug!(peer = %task_shared.peer(), "mux writer task finished");
    });
    MuxHandle { tx, shared }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use crate::link::Link;

    #[tokio::test]
    async fn test_submission_order_is_wire_order() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let left = Link::from_stream(a, "a".to_string(), LinkConfig::default());
        let mut right = Link::from_stream(b, "b".to_string(), LinkConfig::default());

        let shared = SessionShared::new("a".to_string());
        let (sender, _receiver) = left.split();
        let mux = spawn_mux(sender, shared);

        // Interleave submissions across tags; the wire keeps the global order.
        for i in 0..10u32 {
            mux.submit(Frame::new(8 + (i % 2), vec![i as u8])).expect("submit");
        }
        for i in 0..10u32 {
            let frame = right.recv().await.expect("recv");
            assert_eq!(frame.tag, 8 + (i % 2));
            assert_eq!(frame.payload, vec![i as u8]);
        }
    }

    #[tokio::test]
    async fn test_fault_poisons_outbound_cells() {
        let shared = SessionShared::new("peer".to_string());
        let cell = Arc::new(PoisonCell::new());
        shared.register_outbound(8, Arc::clone(&cell));

        assert_eq!(cell.strength(), 0);
        shared.fail(LinkError::Io("broken pipe".to_string()));
        assert_eq!(cell.strength(), u32::MAX);

        // Cells bound after the fault are not retroactively poisoned here;
        // their writes fail through check_open instead.
        assert!(shared.check_open().is_err());
    }

    #[tokio::test]
    async fn test_submit_fails_after_fault() {
        let (a, _b) = tokio::io::duplex(1024);
        let left = Link::from_stream(a, "a".to_string(), LinkConfig::default());
        let shared = SessionShared::new("a".to_string());
        let (sender, _receiver) = left.split();
        let mux = spawn_mux(sender, Arc::clone(&shared));

        shared.fail(LinkError::Closed);
        assert!(mux.submit(Frame::new(8, Vec::new())).is_err());
    }

    #[test]
    fn test_poison_cell_is_monotonic() {
        let cell = PoisonCell::new();
        cell.poison(3);
        cell.poison(1);
        assert_eq!(cell.strength(), 3);
        cell.poison(7);
        assert_eq!(cell.strength(), 7);
    }
}
