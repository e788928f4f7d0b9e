//! Redis adapter for the [`Backend`] contract.
//!
//! Key/document operations map onto plain Redis commands (SET/GET/EXPIRE/
//! RPUSH/BLPOP/PUBLISH/LRANGE). Subscriptions follow the usual sync-client
//! shape: a dedicated connection on a background thread forwards pub/sub
//! messages into an mpsc channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::backend::{Backend, StoreError, Subscription};

/// How often a subscriber thread wakes to check for closure.
const SUBSCRIBER_READ_TIMEOUT: Duration = Duration::from_millis(250);

/// Redis-backed store.
///
/// Holds a [`redis::Client`] and opens a connection per operation: the
/// client handle is cheap, and a blocking pop or subscription must not
/// starve concurrent document reads on a shared connection.
#[derive(Debug, Clone)]
pub struct RedisBackend {
    client: redis::Client,
    closed: Arc<AtomicBool>,
}

impl RedisBackend {
    /// Build a backend for `url` (e.g. `redis://localhost:6379`).
    ///
    /// Opening the client does not touch the network; connectivity is
    /// observed through `ping` by the readiness monitor.
    pub fn connect(url: impl AsRef<str>) -> Result<Self, StoreError> {
        let client = redis::Client::open(url.as_ref())
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn conn(&self) -> Result<redis::Connection, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        self.client
            .get_connection()
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

fn command_err(cmd: &str, err: redis::RedisError) -> StoreError {
    StoreError::Command(format!("{} failed: {}", cmd, err))
}

impl Backend for RedisBackend {
    fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let _: String = redis::cmd("PING")
            .query(&mut conn)
            .map_err(|e| command_err("PING", e))?;
        Ok(())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        // KEEPTTL so the enqueue-time expiry survives worker persists.
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("KEEPTTL")
            .query(&mut conn)
            .map_err(|e| command_err("SET", e))?;
        Ok(())
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let _: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .query(&mut conn)
            .map_err(|e| command_err("EXPIRE", e))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn()?;
        redis::cmd("GET")
            .arg(key)
            .query(&mut conn)
            .map_err(|e| command_err("GET", e))
    }

    fn push(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let _: i64 = redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query(&mut conn)
            .map_err(|e| command_err("RPUSH", e))?;
        Ok(())
    }

    fn blocking_pop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn()?;
        // BLPOP with timeout 0 blocks forever; keep the bound at >= 1s so
        // the caller's loop can observe shutdown between pops.
        let reply: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(key)
            .arg(timeout.as_secs().max(1))
            .query(&mut conn)
            .map_err(|e| command_err("BLPOP", e))?;
        Ok(reply.map(|(_list, value)| value))
    }

    fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let _: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query(&mut conn)
            .map_err(|e| command_err("PUBLISH", e))?;
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        // Dedicated connection: a subscribed connection cannot issue other
        // commands.
        let mut conn = self.conn()?;
        let closed = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), StoreError>>();

        let channel = channel.to_string();
        let sub_closed = closed.clone();
        let backend_closed = self.closed.clone();

        thread::Builder::new()
            .name("jobq-subscriber".to_string())
            .spawn(move || {
                let mut pubsub = conn.as_pubsub();
                let setup = pubsub
                    .subscribe(&channel)
                    .and_then(|()| pubsub.set_read_timeout(Some(SUBSCRIBER_READ_TIMEOUT)));
                match setup {
                    Ok(()) => {
                        if ready_tx.send(Ok(())).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(command_err("SUBSCRIBE", e)));
                        return;
                    }
                }

                loop {
                    if sub_closed.load(Ordering::SeqCst) || backend_closed.load(Ordering::SeqCst) {
                        break;
                    }
                    match pubsub.get_message() {
                        Ok(msg) => {
                            let payload: String = match msg.get_payload() {
                                Ok(p) => p,
                                Err(_) => continue,
                            };
                            if tx.send(payload).is_err() {
                                // Receiver dropped.
                                break;
                            }
                        }
                        Err(e) if e.is_timeout() => continue,
                        Err(e) => {
                            warn!(channel = %channel, error = %e, "subscription connection lost");
                            break;
                        }
                    }
                }
            })
            .map_err(|e| StoreError::Command(format!("failed to spawn subscriber thread: {}", e)))?;

        // SUBSCRIBE must complete before this call returns, so a publish
        // issued right after cannot slip past an in-flight registration.
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Subscription::with_close_flag(rx, closed)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(StoreError::Connection(
                "subscriber thread exited during setup".to_string(),
            )),
        }
    }

    fn append(&self, key: &str, record: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn()?;
        let len: i64 = redis::cmd("RPUSH")
            .arg(key)
            .arg(record)
            .query(&mut conn)
            .map_err(|e| command_err("RPUSH", e))?;
        Ok(len.max(0) as u64)
    }

    fn read_from(&self, key: &str, offset: u64) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn()?;
        redis::cmd("LRANGE")
            .arg(key)
            .arg(offset as i64)
            .arg(-1)
            .query(&mut conn)
            .map_err(|e| command_err("LRANGE", e))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
