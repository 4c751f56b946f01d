//! Name server: serves a [`NameRegistry`] over links.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::protocol::{NameRequest, apply};
use super::registry::NameRegistry;
use crate::config::LinkConfig;
use crate::error::{LinkError, LinkResult};
use crate::link::Link;
use crate::wire::{Frame, TAG_NAME};

/// A running name server.
///
/// Accepts connections and answers one request per frame, in order. The
/// accept loop stops when the server is dropped. Bindings live for the
/// server's lifetime; there is no persistence.
pub struct NameServer {
    addr: String,
    registry: Arc<NameRegistry>,
    accept_task: JoinHandle<()>,
}

impl NameServer {
    /// Bind the server on `addr` and start serving.
    ///
    /// # Errors
    ///
    /// Surfaces the listener's I/O error.
    pub async fn bind(addr: &str) -> LinkResult<Self> {
        Self::bind_with_config(addr, LinkConfig::default()).await
    }

    /// Like [`NameServer::bind`] with explicit link configuration.
    ///
    /// # Errors
    ///
    /// Surfaces the listener's I/O error.
    pub async fn bind_with_config(addr: &str, config: LinkConfig) -> LinkResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?.to_string();
        let registry = Arc::new(NameRegistry::new());
        tracing::debug!(%addr, "name server listening");

        let accept_registry = Arc::clone(&registry);
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let link =
                            Link::from_stream(stream, peer.to_string(), config.clone());
                        tokio::spawn(serve_connection(link, Arc::clone(&accept_registry)));
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "name server accept failed");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        });

        Ok(Self {
            addr,
            registry,
            accept_task,
        })
    }

    /// The address the server actually bound (useful with port 0).
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Direct access to the registry backing this server.
    pub fn registry(&self) -> &Arc<NameRegistry> {
        &self.registry
    }
}

impl Drop for NameServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Serve one client connection until it closes or misbehaves.
async fn serve_connection<S>(mut link: Link<S>, registry: Arc<NameRegistry>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    loop {
        let frame = match link.recv().await {
            Ok(frame) => frame,
            Err(LinkError::Closed) => break,
            Err(err) => {
                tracing::debug!(error = %err, "name link failed");
                break;
            }
        };

        // Only name-service traffic is legal on this link.
        if frame.tag != TAG_NAME {
            tracing::warn!(tag = frame.tag, "unexpected tag on name link");
            break;
        }

        let request: NameRequest = match serde_json::from_slice(&frame.payload) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "malformed name request");
                break;
            }
        };

        tracing::debug!(?request, "name request");
        let response = apply(&registry, request);
        let payload = match serde_json::to_vec(&response) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "response serialization failed");
                break;
            }
        };
        if link.send(&Frame::new(TAG_NAME, payload)).await.is_err() {
            break;
        }
    }
}
