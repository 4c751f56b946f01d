//! Process composition and boundary collaborator interfaces.
//!
//! A process is any future that owns its channel ends and runs to
//! completion. [`parallel`] is the CSP `PAR`: run a batch of processes
//! concurrently and return once every one of them has finished.
//!
//! The two collaborator interfaces at the library boundary live here too:
//! [`Service`] for platform service lifecycles and [`EventSender`] for
//! turning externally generated events into best-effort channel writes.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::channel::ChannelWriter;

/// A boxed process future, as accepted by [`parallel`].
pub type Process = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Box a future into a [`Process`].
pub fn proc<F>(future: F) -> Process
where
    F: Future<Output = ()> + Send + 'static,
{
    Box::pin(future)
}

/// Run a batch of processes in parallel and wait for all of them.
///
/// Panics from child processes are resurfaced on the caller once the batch
/// has been joined.
///
/// # Example
///
/// ```
/// use tryst::{channel, parallel, proc};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (mut tx, mut rx) = channel::<u32>();
///
/// parallel([
///     proc(async move { tx.write(1).await.expect("write") }),
///     proc(async move { assert_eq!(rx.read().await.expect("read"), 1) }),
/// ])
/// .await;
/// # }
/// ```
pub async fn parallel<I>(processes: I)
where
    I: IntoIterator<Item = Process>,
{
    let mut set = JoinSet::new();
    for process in processes {
        set.spawn(process);
    }
    while let Some(result) = set.join_next().await {
        if let Err(err) = result {
            if err.is_panic() {
                std::panic::resume_unwind(err.into_panic());
            }
        }
    }
}

/// Lifecycle interface of a platform service collaborator.
///
/// The core contains no platform code; implementations dispatch to whatever
/// service machinery the host provides.
#[async_trait]
pub trait Service: Send {
    /// Run the service. Returns only after [`Service::stop`] was requested.
    async fn start(&mut self);

    /// Request shutdown. Must return promptly; slow teardown happens
    /// asynchronously inside [`Service::start`] before it returns.
    fn stop(&self);
}

/// Adapter that forwards externally generated events onto a channel.
///
/// The adapter owns only the output end and performs non-blocking,
/// best-effort writes: an event posted while no reader is ready is dropped.
/// Delivery is at-most-once and lossy by contract: event sources (UI
/// callbacks and the like) must never block, and occasional loss is
/// explicitly tolerated at that boundary.
pub struct EventSender<T> {
    writer: ChannelWriter<T>,
}

impl<T> EventSender<T> {
    /// Wrap the output end of the event channel.
    pub fn new(writer: ChannelWriter<T>) -> Self {
        Self { writer }
    }

    /// Post one event. Returns `true` if a reader accepted it, `false` if it
    /// was dropped (no reader ready, buffer full, or channel poisoned).
    pub fn post(&mut self, event: T) -> bool {
        matches!(self.writer.try_write(event), Ok(None))
    }
}
