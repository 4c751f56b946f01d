//! Channel primitives and channel ends.
//!
//! A channel is created as a pair of ends: a [`ChannelWriter`] and a
//! [`ChannelReader`]. Ends are capabilities: each one is restricted to a
//! single direction, is `Send` but not `Clone`, and takes `&mut self` for its
//! blocking operations, so exactly one writer and one reader can be active on
//! a channel at a time by construction. Concurrent same-direction use goes
//! through the arbitration wrappers [`SharedChannelWriter`] /
//! [`SharedChannelReader`].
//!
//! The default channel is an unbuffered rendezvous channel: `write(v)` blocks
//! the calling process until a concurrent `read()` accepts `v`, and both
//! unblock together. No value is lost, duplicated, or handed over out of
//! order. Buffered variants are created with an explicit [`BufferPolicy`].
//!
//! # Poison
//!
//! Every end carries an immunity level fixed at construction. `poison(s)` on
//! an end with immunity `< s` stores `max(current, s)` on the channel and
//! immediately fails all parked and future operations on any end whose
//! immunity is below the stored strength. Ends with immunity `>= s` keep
//! operating and do not forward the signal, which bounds shutdown to the
//! sub-network that opted in.
//!
//! # Example
//!
//! ```
//! use tryst::channel;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (mut tx, mut rx) = channel::<u32>();
//!
//! let writer = tokio::spawn(async move {
//!     tx.write(42).await.expect("not poisoned");
//! });
//!
//! assert_eq!(rx.read().await.expect("not poisoned"), 42);
//! writer.await.expect("writer finished");
//! # }
//! ```

mod core;

use std::sync::Arc;

use async_trait::async_trait;

use self::core::ChannelCore;
use crate::alt::AltSignal;
use crate::buffer::BufferPolicy;
use crate::error::ChannelResult;

// =============================================================================
// Constructors
// =============================================================================

/// Create an unbuffered one-to-one rendezvous channel.
pub fn channel<T>() -> (ChannelWriter<T>, ChannelReader<T>) {
    channel_with_immunity(0, 0)
}

/// Create a rendezvous channel whose ends carry the given immunity levels.
pub fn channel_with_immunity<T>(
    writer_immunity: u32,
    reader_immunity: u32,
) -> (ChannelWriter<T>, ChannelReader<T>) {
    make_ends(ChannelCore::new(None), writer_immunity, reader_immunity)
}

/// Create a buffered one-to-one channel with the given policy.
pub fn buffered<T>(policy: BufferPolicy) -> (ChannelWriter<T>, ChannelReader<T>) {
    buffered_with_immunity(policy, 0, 0)
}

/// Create a buffered channel whose ends carry the given immunity levels.
pub fn buffered_with_immunity<T>(
    policy: BufferPolicy,
    writer_immunity: u32,
    reader_immunity: u32,
) -> (ChannelWriter<T>, ChannelReader<T>) {
    make_ends(ChannelCore::new(Some(policy)), writer_immunity, reader_immunity)
}

fn make_ends<T>(
    core: Arc<ChannelCore<T>>,
    writer_immunity: u32,
    reader_immunity: u32,
) -> (ChannelWriter<T>, ChannelReader<T>) {
    (
        ChannelWriter {
            core: Arc::clone(&core),
            immunity: writer_immunity,
        },
        ChannelReader {
            core,
            immunity: reader_immunity,
        },
    )
}

// =============================================================================
// Capability traits
// =============================================================================

/// Writing capability over a channel, local or network-bridged.
#[async_trait]
pub trait ChannelOutput<T: Send + 'static>: Send {
    /// Write one value; blocks per the channel's contract.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::PoisonError`] once the channel is poisoned above
    /// this end's immunity.
    async fn write(&mut self, value: T) -> ChannelResult<()>;
}

/// Reading capability over a channel, local or network-bridged.
#[async_trait]
pub trait ChannelInput<T: Send + 'static>: Send {
    /// Read one value; blocks until a value is available.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::PoisonError`] once the channel is poisoned above
    /// this end's immunity.
    async fn read(&mut self) -> ChannelResult<T>;
}

/// Capability to poison the underlying channel.
pub trait Poisonable {
    /// Poison the channel at the given strength. A no-op if `strength` does
    /// not exceed this end's immunity; otherwise idempotent and monotonic.
    fn poison(&self, strength: u32);
}

// =============================================================================
// Exclusive ends
// =============================================================================

/// The writing end of a channel. Exclusive: not `Clone`.
pub struct ChannelWriter<T> {
    core: Arc<ChannelCore<T>>,
    immunity: u32,
}

impl<T> ChannelWriter<T> {
    /// Write one value, blocking until the reader accepts it (rendezvous) or
    /// the store accepts it (buffered).
    ///
    /// # Errors
    ///
    /// Fails immediately, without blocking, once the channel is poisoned
    /// above this end's immunity. A value that was already accepted by the
    /// reader is never reported failed.
    pub async fn write(&mut self, value: T) -> ChannelResult<()> {
        self.core.write(self.immunity, value).await
    }

    /// Non-blocking best-effort offer.
    ///
    /// The value is accepted only if a reader is currently committed to
    /// receive it (parked in `read` or alternation-enabled on this channel)
    /// or a buffered store has room under its policy. On refusal the value is
    /// handed back as `Ok(Some(value))`.
    ///
    /// # Errors
    ///
    /// Fails once the channel is poisoned above this end's immunity.
    pub fn try_write(&mut self, value: T) -> ChannelResult<Option<T>> {
        self.core.try_write(self.immunity, value)
    }

    /// This end's immunity level.
    pub fn immunity(&self) -> u32 {
        self.immunity
    }

    /// A detached handle that can poison this channel while the end itself
    /// is borrowed or parked elsewhere.
    pub fn poison_handle(&self) -> PoisonHandle<T> {
        PoisonHandle {
            core: Arc::clone(&self.core),
            immunity: self.immunity,
        }
    }

    /// Wrap this end for concurrent use by multiple writer processes.
    pub fn into_shared(self) -> SharedChannelWriter<T> {
        SharedChannelWriter::new(self)
    }
}

impl<T> Poisonable for ChannelWriter<T> {
    fn poison(&self, strength: u32) {
        if strength > self.immunity {
            self.core.poison(strength);
        }
    }
}

#[async_trait]
impl<T: Send + 'static> ChannelOutput<T> for ChannelWriter<T> {
    async fn write(&mut self, value: T) -> ChannelResult<()> {
        ChannelWriter::write(self, value).await
    }
}

/// The reading end of a channel. Exclusive: not `Clone`.
pub struct ChannelReader<T> {
    core: Arc<ChannelCore<T>>,
    immunity: u32,
}

impl<T> ChannelReader<T> {
    /// Read one value, blocking until a writer provides it.
    ///
    /// # Errors
    ///
    /// Fails immediately, without blocking, once the channel is poisoned
    /// above this end's immunity.
    pub async fn read(&mut self) -> ChannelResult<T> {
        self.core.read(self.immunity).await
    }

    /// This end's immunity level.
    pub fn immunity(&self) -> u32 {
        self.immunity
    }

    /// A detached handle that can poison this channel while the end itself
    /// is borrowed or parked elsewhere.
    pub fn poison_handle(&self) -> PoisonHandle<T> {
        PoisonHandle {
            core: Arc::clone(&self.core),
            immunity: self.immunity,
        }
    }

    /// Wrap this end for concurrent use by multiple reader processes.
    pub fn into_shared(self) -> SharedChannelReader<T> {
        SharedChannelReader::new(self)
    }

    /// Force any current writer to abort.
    #[deprecated(note = "superseded by the poison mechanism; use `poison`")]
    pub fn reject(&self) {
        self.poison(u32::MAX);
    }

    pub(crate) fn alt_enable(&mut self, signal: &Arc<AltSignal>) -> bool {
        self.core.alt_enable(self.immunity, signal)
    }

    pub(crate) fn alt_disable(&mut self) -> bool {
        self.core.alt_disable(self.immunity)
    }

    pub(crate) fn alt_commit(&mut self) -> Option<ChannelResult<T>> {
        self.core.alt_commit(self.immunity)
    }
}

impl<T> Poisonable for ChannelReader<T> {
    fn poison(&self, strength: u32) {
        if strength > self.immunity {
            self.core.poison(strength);
        }
    }
}

#[async_trait]
impl<T: Send + 'static> ChannelInput<T> for ChannelReader<T> {
    async fn read(&mut self) -> ChannelResult<T> {
        ChannelReader::read(self).await
    }
}

// =============================================================================
// Poison handle
// =============================================================================

/// A cheap, clonable capability to poison one channel.
///
/// Carries the immunity of the end it was taken from, so it cannot inject a
/// signal that end could not have sent itself.
pub struct PoisonHandle<T> {
    core: Arc<ChannelCore<T>>,
    immunity: u32,
}

impl<T> Clone for PoisonHandle<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            immunity: self.immunity,
        }
    }
}

impl<T> PoisonHandle<T> {
    /// Current poison strength of the channel (0 = alive).
    pub fn strength(&self) -> u32 {
        self.core.poison_strength()
    }
}

impl<T> Poisonable for PoisonHandle<T> {
    fn poison(&self, strength: u32) {
        if strength > self.immunity {
            self.core.poison(strength);
        }
    }
}

// =============================================================================
// Shared (arbitrated) ends
// =============================================================================

/// A `Clone` writing end arbitrating several writer processes over one
/// channel with FIFO-fair mutual exclusion.
///
/// The base channel never sees concurrency: writers queue on the arbitration
/// lock and perform their rendezvous one at a time. Poisoning bypasses the
/// arbitration lock, so a supervisor can shut the channel down even while a
/// writer is parked mid-rendezvous.
pub struct SharedChannelWriter<T> {
    inner: Arc<tokio::sync::Mutex<ChannelWriter<T>>>,
    handle: PoisonHandle<T>,
}

impl<T> Clone for SharedChannelWriter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            handle: self.handle.clone(),
        }
    }
}

impl<T> SharedChannelWriter<T> {
    /// Wrap an exclusive writer for shared use.
    pub fn new(writer: ChannelWriter<T>) -> Self {
        let handle = writer.poison_handle();
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(writer)),
            handle,
        }
    }

    /// Write one value after winning the arbitration.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::PoisonError`] once the channel is poisoned above
    /// the wrapped end's immunity.
    pub async fn write(&self, value: T) -> ChannelResult<()> {
        self.inner.lock().await.write(value).await
    }
}

impl<T> Poisonable for SharedChannelWriter<T> {
    fn poison(&self, strength: u32) {
        self.handle.poison(strength);
    }
}

#[async_trait]
impl<T: Send + 'static> ChannelOutput<T> for SharedChannelWriter<T> {
    async fn write(&mut self, value: T) -> ChannelResult<()> {
        SharedChannelWriter::write(self, value).await
    }
}

/// A `Clone` reading end arbitrating several reader processes over one
/// channel with FIFO-fair mutual exclusion.
pub struct SharedChannelReader<T> {
    inner: Arc<tokio::sync::Mutex<ChannelReader<T>>>,
    handle: PoisonHandle<T>,
}

impl<T> Clone for SharedChannelReader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            handle: self.handle.clone(),
        }
    }
}

impl<T> SharedChannelReader<T> {
    /// Wrap an exclusive reader for shared use.
    pub fn new(reader: ChannelReader<T>) -> Self {
        let handle = reader.poison_handle();
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(reader)),
            handle,
        }
    }

    /// Read one value after winning the arbitration.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::PoisonError`] once the channel is poisoned above
    /// the wrapped end's immunity.
    pub async fn read(&self) -> ChannelResult<T> {
        self.inner.lock().await.read().await
    }
}

impl<T> Poisonable for SharedChannelReader<T> {
    fn poison(&self, strength: u32) {
        self.handle.poison(strength);
    }
}

#[async_trait]
impl<T: Send + 'static> ChannelInput<T> for SharedChannelReader<T> {
    async fn read(&mut self) -> ChannelResult<T> {
        SharedChannelReader::read(self).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::PoisonError;

    #[tokio::test]
    async fn test_rendezvous_delivers_in_order() {
        let (mut tx, mut rx) = channel::<u32>();

        let writer = tokio::spawn(async move {
            for i in 1..=3 {
                tx.write(i).await.expect("write");
            }
        });

        assert_eq!(rx.read().await.expect("read"), 1);
        assert_eq!(rx.read().await.expect("read"), 2);
        assert_eq!(rx.read().await.expect("read"), 3);
        writer.await.expect("join");
    }

    #[tokio::test]
    async fn test_write_blocks_until_read() {
        let (mut tx, mut rx) = channel::<&'static str>();

        let writer = tokio::spawn(async move {
            tx.write("hello").await.expect("write");
            "written"
        });

        // The writer cannot complete before the read happens.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished());

        assert_eq!(rx.read().await.expect("read"), "hello");
        assert_eq!(writer.await.expect("join"), "written");
    }

    #[tokio::test]
    async fn test_poison_fails_parked_reader() {
        let (tx, mut rx) = channel::<u32>();

        let reader = tokio::spawn(async move { rx.read().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.poison(3);

        assert_eq!(reader.await.expect("join"), Err(PoisonError::new(3)));
    }

    #[tokio::test]
    async fn test_poison_fails_parked_writer() {
        let (mut tx, rx) = channel::<u32>();
        let handle = rx.poison_handle();

        let writer = tokio::spawn(async move { tx.write(9).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.poison(1);

        assert_eq!(writer.await.expect("join"), Err(PoisonError::new(1)));
    }

    #[tokio::test]
    async fn test_poison_is_monotonic_and_idempotent() {
        let (tx, mut rx) = channel::<u32>();
        tx.poison(5);
        tx.poison(2);
        tx.poison(5);

        assert_eq!(rx.read().await, Err(PoisonError::new(5)));
        assert_eq!(rx.read().await, Err(PoisonError::new(5)));
    }

    #[tokio::test]
    async fn test_immunity_absorbs_weak_poison() {
        let (mut tx, mut rx) = buffered_with_immunity::<u32>(BufferPolicy::Unbounded, 0, 4);
        tx.write(7).await.expect("write");
        tx.write(8).await.expect("write");

        let handle = tx.poison_handle();
        handle.poison(4);

        // The zero-immunity writer end is dead.
        assert_eq!(tx.write(9).await, Err(PoisonError::new(4)));

        // The immune reader keeps draining pending values normally.
        assert_eq!(rx.read().await, Ok(7));
        assert_eq!(rx.read().await, Ok(8));

        // Strength above its immunity fails it like any other end.
        handle.poison(5);
        assert_eq!(rx.read().await, Err(PoisonError::new(5)));
    }

    #[tokio::test]
    async fn test_poison_below_own_immunity_is_refused() {
        let (tx, mut rx) = channel_with_immunity::<u32>(3, 0);

        // The writer's own immunity gates its poison calls.
        tx.poison(3);
        let probe = tokio::time::timeout(Duration::from_millis(10), rx.read()).await;
        assert!(probe.is_err(), "channel must still be alive");

        tx.poison(4);
        assert_eq!(rx.read().await, Err(PoisonError::new(4)));
    }

    #[tokio::test]
    async fn test_scenario_three_values_then_poison() {
        let (mut tx, mut rx) = channel::<i64>();

        let producer = tokio::spawn(async move {
            for i in 1..=3 {
                tx.write(i).await.expect("write");
            }
            tx.poison(5);
        });

        for expected in 1..=3 {
            assert_eq!(rx.read().await.expect("read"), expected);
        }
        producer.await.expect("join");

        // The fourth read fails immediately, no block.
        let started = std::time::Instant::now();
        assert_eq!(rx.read().await, Err(PoisonError::new(5)));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_buffered_unbounded_write_never_blocks() {
        let (mut tx, mut rx) = buffered::<u32>(BufferPolicy::Unbounded);
        for i in 0..100 {
            tx.write(i).await.expect("write");
        }
        for i in 0..100 {
            assert_eq!(rx.read().await.expect("read"), i);
        }
    }

    #[tokio::test]
    async fn test_buffered_bounded_blocks_at_capacity() {
        let (mut tx, mut rx) = buffered::<u32>(BufferPolicy::Bounded(2));
        tx.write(1).await.expect("write");
        tx.write(2).await.expect("write");

        let writer = tokio::spawn(async move {
            tx.write(3).await.expect("write");
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished());

        assert_eq!(rx.read().await.expect("read"), 1);
        writer.await.expect("join");
        assert_eq!(rx.read().await.expect("read"), 2);
        assert_eq!(rx.read().await.expect("read"), 3);
    }

    #[tokio::test]
    async fn test_buffered_overwrite_oldest_drops_head() {
        let (mut tx, mut rx) = buffered::<u32>(BufferPolicy::OverwriteOldest(2));
        tx.write(1).await.expect("write");
        tx.write(2).await.expect("write");
        tx.write(3).await.expect("write");

        assert_eq!(rx.read().await.expect("read"), 2);
        assert_eq!(rx.read().await.expect("read"), 3);
    }

    #[tokio::test]
    async fn test_try_write_refused_without_reader() {
        let (mut tx, mut rx) = channel::<u32>();
        assert_eq!(tx.try_write(1).expect("alive"), Some(1));

        let reader = tokio::spawn(async move { rx.read().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(tx.try_write(2).expect("alive"), None);
        assert_eq!(reader.await.expect("join"), Ok(2));
    }

    #[tokio::test]
    async fn test_shared_writers_interleave_fairly() {
        let (tx, mut rx) = channel::<u32>();
        let shared = tx.into_shared();

        let mut writers = Vec::new();
        for id in 0..4u32 {
            let tx = shared.clone();
            writers.push(tokio::spawn(async move {
                for _ in 0..5 {
                    tx.write(id).await.expect("write");
                }
            }));
        }

        let mut counts = [0u32; 4];
        for _ in 0..20 {
            let id = rx.read().await.expect("read");
            counts[id as usize] += 1;
        }
        for w in writers {
            w.await.expect("join");
        }
        assert_eq!(counts, [5, 5, 5, 5]);
    }

    #[tokio::test]
    async fn test_shared_poison_bypasses_arbitration() {
        let (tx, rx) = channel::<u32>();
        let shared = tx.into_shared();
        let blocked = shared.clone();

        // This writer parks mid-rendezvous while holding the arbitration lock.
        let writer = tokio::spawn(async move { blocked.write(1).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Poison must not need the lock.
        shared.poison(2);
        assert_eq!(writer.await.expect("join"), Err(PoisonError::new(2)));
        drop(rx);
    }

    #[tokio::test]
    #[allow(deprecated)]
    async fn test_reject_is_poison_at_max() {
        let (mut tx, rx) = channel::<u32>();
        rx.reject();
        assert_eq!(tx.write(1).await, Err(PoisonError::new(u32::MAX)));
    }
}
