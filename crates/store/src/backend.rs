//! The backing-store contract.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use thiserror::Error;

/// Error surfaced by a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The store rejected or failed a command.
    #[error("store command error: {0}")]
    Command(String),

    /// The connection handle was closed by `close`.
    #[error("store connection closed")]
    Closed,
}

/// A live subscription to one publish/subscribe channel.
///
/// Messages published while the subscription is alive are buffered and
/// delivered in publish order; messages published before `subscribe`
/// returned are never delivered. Dropping the subscription ends delivery
/// and releases the underlying store resources.
#[derive(Debug)]
pub struct Subscription {
    receiver: Receiver<String>,
    closed: Option<Arc<AtomicBool>>,
}

impl Subscription {
    pub fn new(receiver: Receiver<String>) -> Self {
        Self {
            receiver,
            closed: None,
        }
    }

    /// Build a subscription whose drop raises `closed`, signalling the
    /// forwarding thread to exit.
    pub fn with_close_flag(receiver: Receiver<String>, closed: Arc<AtomicBool>) -> Self {
        Self {
            receiver,
            closed: Some(closed),
        }
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<String, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<String, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(closed) = &self.closed {
            closed.store(true, Ordering::SeqCst);
        }
    }
}

/// Store operations the job queue depends on.
///
/// Implementations must be safe to share across threads; the manager calls
/// into one shared handle from its monitor, consumer, and caller threads
/// concurrently. Atomicity expectations: `put` replaces one key, `push`/
/// `blocking_pop` hand each list entry to exactly one popper, and
/// `publish` delivers to every subscription alive at publish time.
pub trait Backend: Send + Sync {
    /// Lightweight liveness probe.
    fn ping(&self) -> Result<(), StoreError>;

    /// Write a document under `key`, preserving any existing expiry.
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Expire `key` after `ttl`. A missing key is not an error.
    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Read the document under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Append `value` to the tail of the list at `key`.
    fn push(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Pop the head of the list at `key`, blocking up to `timeout`.
    /// Returns `None` when the bound elapses with the list still empty.
    fn blocking_pop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError>;

    /// Publish `payload` to every current subscriber of `channel`.
    fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError>;

    /// Open a subscription to `channel`.
    fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError>;

    /// Append `record` to the stream at `key`; returns the stream length
    /// after the append.
    fn append(&self, key: &str, record: &str) -> Result<u64, StoreError>;

    /// Read every record at offsets `>= offset`, oldest first.
    fn read_from(&self, key: &str, offset: u64) -> Result<Vec<String>, StoreError>;

    /// Close the connection. Blocked and subsequent operations fail with
    /// [`StoreError::Closed`].
    fn close(&self);
}
