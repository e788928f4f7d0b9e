//! In-memory store for tests and local development.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::backend::{Backend, StoreError, Subscription};

#[derive(Debug, Clone)]
struct Document {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Shared {
    documents: HashMap<String, Document>,
    lists: HashMap<String, VecDeque<String>>,
    subscribers: HashMap<String, Vec<Sender<String>>>,
    publish_counts: HashMap<String, u64>,
}

/// In-memory [`Backend`] implementing the full contract, including blocking
/// pops and pub/sub fan-out.
///
/// `set_healthy(false)` makes every operation fail the way a dropped
/// connection would, which drives readiness-monitor tests without a real
/// store. `publish_count` exposes how many times a channel was published
/// to, for asserting at-most-once completion signaling.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    shared: Mutex<Shared>,
    list_signal: Condvar,
    unhealthy: AtomicBool,
    closed: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::new())
    }

    /// Simulate losing (or regaining) the store connection.
    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    /// How many times `channel` has been published to.
    pub fn publish_count(&self, channel: &str) -> u64 {
        self.shared
            .lock()
            .unwrap()
            .publish_counts
            .get(channel)
            .copied()
            .unwrap_or(0)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("store unreachable".to_string()));
        }
        Ok(())
    }

    fn purge_expired(shared: &mut Shared) {
        let now = Instant::now();
        shared
            .documents
            .retain(|_, doc| doc.expires_at.is_none_or(|at| at > now));
    }
}

impl Backend for InMemoryBackend {
    fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        let mut shared = self.shared.lock().unwrap();
        Self::purge_expired(&mut shared);
        let expires_at = shared.documents.get(key).and_then(|d| d.expires_at);
        shared.documents.insert(
            key.to_string(),
            Document {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check()?;
        let mut shared = self.shared.lock().unwrap();
        if let Some(doc) = shared.documents.get_mut(key) {
            doc.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        let mut shared = self.shared.lock().unwrap();
        Self::purge_expired(&mut shared);
        Ok(shared.documents.get(key).map(|d| d.value.clone()))
    }

    fn push(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        let mut shared = self.shared.lock().unwrap();
        shared
            .lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        self.list_signal.notify_all();
        Ok(())
    }

    fn blocking_pop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        self.check()?;
        let deadline = Instant::now() + timeout;
        let mut shared = self.shared.lock().unwrap();
        loop {
            if let Some(value) = shared.lists.get_mut(key).and_then(VecDeque::pop_front) {
                return Ok(Some(value));
            }
            if self.closed.load(Ordering::SeqCst) {
                return Err(StoreError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _timed_out) = self
                .list_signal
                .wait_timeout(shared, deadline - now)
                .unwrap();
            shared = guard;
        }
    }

    fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        self.check()?;
        let mut shared = self.shared.lock().unwrap();
        *shared
            .publish_counts
            .entry(channel.to_string())
            .or_default() += 1;
        if let Some(senders) = shared.subscribers.get_mut(channel) {
            // Dead senders mean dropped subscriptions; prune as we go.
            senders.retain(|tx| tx.send(payload.to_string()).is_ok());
        }
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        self.check()?;
        let (tx, rx) = mpsc::channel();
        self.shared
            .lock()
            .unwrap()
            .subscribers
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(Subscription::new(rx))
    }

    fn append(&self, key: &str, record: &str) -> Result<u64, StoreError> {
        self.check()?;
        let mut shared = self.shared.lock().unwrap();
        let list = shared.lists.entry(key.to_string()).or_default();
        list.push_back(record.to_string());
        Ok(list.len() as u64)
    }

    fn read_from(&self, key: &str, offset: u64) -> Result<Vec<String>, StoreError> {
        self.check()?;
        let shared = self.shared.lock().unwrap();
        Ok(shared
            .lists
            .get(key)
            .map(|list| list.iter().skip(offset as usize).cloned().collect())
            .unwrap_or_default())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Wake blocked poppers so they observe the closure.
        let _guard = self.shared.lock().unwrap();
        self.list_signal.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn put_get_overwrite() {
        let backend = InMemoryBackend::new();
        backend.put("k", "v1").unwrap();
        backend.put("k", "v2").unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("v2"));
        assert_eq!(backend.get("missing").unwrap(), None);
    }

    #[test]
    fn expired_documents_disappear() {
        let backend = InMemoryBackend::new();
        backend.put("k", "v").unwrap();
        backend.expire("k", Duration::from_millis(20)).unwrap();
        assert!(backend.get("k").unwrap().is_some());

        thread::sleep(Duration::from_millis(40));
        assert_eq!(backend.get("k").unwrap(), None);
    }

    #[test]
    fn put_preserves_existing_expiry() {
        let backend = InMemoryBackend::new();
        backend.put("k", "v1").unwrap();
        backend.expire("k", Duration::from_millis(30)).unwrap();
        backend.put("k", "v2").unwrap();

        thread::sleep(Duration::from_millis(60));
        assert_eq!(backend.get("k").unwrap(), None);
    }

    #[test]
    fn queue_is_fifo() {
        let backend = InMemoryBackend::new();
        backend.push("q", "a").unwrap();
        backend.push("q", "b").unwrap();

        let tick = Duration::from_millis(10);
        assert_eq!(backend.blocking_pop("q", tick).unwrap().as_deref(), Some("a"));
        assert_eq!(backend.blocking_pop("q", tick).unwrap().as_deref(), Some("b"));
        assert_eq!(backend.blocking_pop("q", tick).unwrap(), None);
    }

    #[test]
    fn blocking_pop_wakes_on_push() {
        let backend = InMemoryBackend::arc();
        let popper = {
            let backend = backend.clone();
            thread::spawn(move || backend.blocking_pop("q", Duration::from_secs(2)).unwrap())
        };

        thread::sleep(Duration::from_millis(20));
        backend.push("q", "x").unwrap();
        assert_eq!(popper.join().unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn blocking_pop_unblocks_on_close() {
        let backend = InMemoryBackend::arc();
        let popper = {
            let backend = backend.clone();
            thread::spawn(move || backend.blocking_pop("q", Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        backend.close();
        assert!(matches!(popper.join().unwrap(), Err(StoreError::Closed)));
    }

    #[test]
    fn subscribers_receive_messages_published_after_subscribe() {
        let backend = InMemoryBackend::new();
        backend.publish("c", "lost").unwrap();

        let sub = backend.subscribe("c").unwrap();
        backend.publish("c", "seen").unwrap();

        assert_eq!(sub.recv_timeout(Duration::from_millis(100)).unwrap(), "seen");
        assert!(sub.try_recv().is_err());
        assert_eq!(backend.publish_count("c"), 2);
    }

    #[test]
    fn publish_only_reaches_the_matching_channel() {
        let backend = InMemoryBackend::new();
        let sub_a = backend.subscribe("a").unwrap();
        let sub_b = backend.subscribe("b").unwrap();

        backend.publish("a", "msg").unwrap();
        assert_eq!(sub_a.recv_timeout(Duration::from_millis(100)).unwrap(), "msg");
        assert!(sub_b.recv_timeout(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn append_returns_stream_length() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.append("s", "r0").unwrap(), 1);
        assert_eq!(backend.append("s", "r1").unwrap(), 2);

        assert_eq!(backend.read_from("s", 0).unwrap(), vec!["r0", "r1"]);
        assert_eq!(backend.read_from("s", 1).unwrap(), vec!["r1"]);
        assert!(backend.read_from("s", 2).unwrap().is_empty());
    }

    #[test]
    fn unhealthy_backend_fails_every_operation() {
        let backend = InMemoryBackend::new();
        backend.set_healthy(false);
        assert!(matches!(backend.ping(), Err(StoreError::Connection(_))));
        assert!(matches!(backend.put("k", "v"), Err(StoreError::Connection(_))));

        backend.set_healthy(true);
        assert!(backend.ping().is_ok());
    }

    #[test]
    fn operations_are_shared_across_threads() {
        let backend = Arc::new(InMemoryBackend::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let backend = backend.clone();
                thread::spawn(move || backend.push("q", &i.to_string()).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut popped = Vec::new();
        while let Some(v) = backend.blocking_pop("q", Duration::from_millis(5)).unwrap() {
            popped.push(v);
        }
        popped.sort();
        assert_eq!(popped, vec!["0", "1", "2", "3"]);
    }

    proptest! {
        // Cursor monotonicity: reading one record at a time, advancing the
        // offset by one, sees every appended record exactly once in order.
        #[test]
        fn cursor_reads_see_every_record_once(records in proptest::collection::vec("[a-z]{1,8}", 0..32)) {
            let backend = InMemoryBackend::new();
            for record in &records {
                backend.append("stream", record).unwrap();
            }

            let mut seen = Vec::new();
            let mut offset = 0u64;
            loop {
                let batch = backend.read_from("stream", offset).unwrap();
                match batch.first() {
                    Some(first) => {
                        seen.push(first.clone());
                        offset += 1;
                    }
                    None => break,
                }
            }
            prop_assert_eq!(seen, records);
        }
    }
}
