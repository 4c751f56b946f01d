//! The physical transport abstraction: an ordered, reliable frame stream
//! over any byte-stream connection.
//!
//! A [`Link`] owns the connection lifecycle and failure detection. The first
//! I/O or protocol fault transitions it to closed and every subsequent
//! operation fails fast: no silent retry happens at this layer, since CSP
//! semantics require predictable, bounded blocking rather than hidden
//! backoff loops. Retry policy, if any, belongs to the caller.
//!
//! Links are generic over the stream so tests can run them over
//! `tokio::io::duplex`; production links use `tokio::net::TcpStream`.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use crate::config::LinkConfig;
use crate::error::{LinkError, LinkResult, ProtocolError};
use crate::wire::{Frame, encode_frame, try_decode_frame};

/// Read chunk size for the receive buffer.
const READ_CHUNK: usize = 4096;

/// Fault state shared by both halves of a link.
struct LinkState {
    peer: String,
    config: LinkConfig,
    fault: Mutex<Option<LinkError>>,
}

impl LinkState {
    fn check_open(&self) -> LinkResult<()> {
        match &*self.fault.lock().expect("link state mutex poisoned") {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Record the first fault; later faults keep the original cause.
    fn fail(&self, err: LinkError) -> LinkError {
        let mut fault = self.fault.lock().expect("link state mutex poisoned");
        match &*fault {
            Some(first) => first.clone(),
            None => {
                tracing::debug!(peer = %self.peer, error = %err, "link fault");
                *fault = Some(err.clone());
                err
            }
        }
    }

    fn close(&self) {
        let mut fault = self.fault.lock().expect("link state mutex poisoned");
        if fault.is_none() {
            *fault = Some(LinkError::Closed);
        }
    }
}

/// The sending half of a link.
pub struct LinkSender<S> {
    half: WriteHalf<S>,
    state: Arc<LinkState>,
}

impl<S: AsyncRead + AsyncWrite> LinkSender<S> {
    /// Send one frame, preserving submission order.
    ///
    /// # Errors
    ///
    /// Fails fast with the link's first fault once it is closed; an
    /// oversized payload is a protocol fault that closes the link.
    pub async fn send(&mut self, frame: &Frame) -> LinkResult<()> {
        self.state.check_open()?;
        let bytes = encode_frame(frame, self.state.config.max_payload_size)
            .map_err(|e| self.state.fail(LinkError::Protocol(e)))?;
        self.half
            .write_all(&bytes)
            .await
            .map_err(|e| self.state.fail(e.into()))?;
        Ok(())
    }

    /// Close the link. Idempotent; the peer observes end of stream.
    pub async fn close(&mut self) {
        self.state.close();
        let _ = self.half.shutdown().await;
    }

    /// Whether the link has faulted or been closed.
    pub fn is_closed(&self) -> bool {
        self.state.check_open().is_err()
    }
}

/// The receiving half of a link.
pub struct LinkReceiver<S> {
    half: ReadHalf<S>,
    buffer: Vec<u8>,
    state: Arc<LinkState>,
}

impl<S: AsyncRead + AsyncWrite> LinkReceiver<S> {
    /// Receive the next frame in delivery order.
    ///
    /// # Errors
    ///
    /// `LinkError::Closed` on a clean end of stream; the recorded fault once
    /// the link has failed; a protocol fault if the peer ends the stream
    /// mid-frame or declares an oversized payload.
    pub async fn recv(&mut self) -> LinkResult<Frame> {
        loop {
            self.state.check_open()?;

            match try_decode_frame(&self.buffer, self.state.config.max_payload_size) {
                Ok(Some((frame, consumed))) => {
                    self.buffer.drain(..consumed);
                    return Ok(frame);
                }
                Ok(None) => {}
                Err(e) => return Err(self.state.fail(LinkError::Protocol(e))),
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self
                .half
                .read(&mut chunk)
                .await
                .map_err(|e| self.state.fail(e.into()))?;
            if n == 0 {
                if self.buffer.is_empty() {
                    self.state.close();
                    return Err(LinkError::Closed);
                }
                let err = ProtocolError::Truncated {
                    have: self.buffer.len(),
                };
                return Err(self.state.fail(LinkError::Protocol(err)));
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Whether the link has faulted or been closed.
    pub fn is_closed(&self) -> bool {
        self.state.check_open().is_err()
    }
}

/// A connected transport endpoint pair carrying ordered frames.
pub struct Link<S> {
    sender: LinkSender<S>,
    receiver: LinkReceiver<S>,
}

impl Link<TcpStream> {
    /// Establish a TCP link to `addr`.
    ///
    /// # Errors
    ///
    /// `ConnectTimeout` if the dial exceeds the configured timeout, or the
    /// underlying I/O error.
    pub async fn connect(addr: &str, config: LinkConfig) -> LinkResult<Self> {
        let dial = TcpStream::connect(addr);
        match tokio::time::timeout(config.connect_timeout, dial).await {
            Ok(Ok(stream)) => {
                tracing::debug!(peer = %addr, "link connected");
                Ok(Self::from_stream(stream, addr.to_string(), config))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(LinkError::ConnectTimeout {
                addr: addr.to_string(),
            }),
        }
    }
}

impl<S: AsyncRead + AsyncWrite> Link<S> {
    /// Wrap an already-connected stream (e.g. an accepted connection).
    pub fn from_stream(stream: S, peer: String, config: LinkConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let state = Arc::new(LinkState {
            peer,
            config,
            fault: Mutex::new(None),
        });
        Self {
            sender: LinkSender {
                half: write_half,
                state: Arc::clone(&state),
            },
            receiver: LinkReceiver {
                half: read_half,
                buffer: Vec::with_capacity(READ_CHUNK),
                state,
            },
        }
    }

    /// Send one frame. See [`LinkSender::send`].
    ///
    /// # Errors
    ///
    /// Fails fast once the link is closed or faulted.
    pub async fn send(&mut self, frame: &Frame) -> LinkResult<()> {
        self.sender.send(frame).await
    }

    /// Receive the next frame. See [`LinkReceiver::recv`].
    ///
    /// # Errors
    ///
    /// Fails fast once the link is closed or faulted.
    pub async fn recv(&mut self) -> LinkResult<Frame> {
        self.receiver.recv().await
    }

    /// Close the link. Idempotent.
    pub async fn close(&mut self) {
        self.sender.close().await;
    }

    /// Whether the link has faulted or been closed.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Split into independently-owned halves sharing the fault state, so a
    /// writer task and a reader task can drive them concurrently.
    pub fn split(self) -> (LinkSender<S>, LinkReceiver<S>) {
        (self.sender, self.receiver)
    }
}
