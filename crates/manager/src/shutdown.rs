//! Cooperative cancellation token.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Cloneable cancellation token shared by the manager's background threads
/// and any embedding code that wants to trigger a shutdown externally.
///
/// All clones observe the same state; `cancel` wakes every blocked `wait`.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token, waking all blocked waiters. Idempotent.
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock().unwrap();
        if !*cancelled {
            *cancelled = true;
            self.inner.signal.notify_all();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock().unwrap()
    }

    /// Block until the token is cancelled.
    pub fn wait(&self) {
        let mut cancelled = self.inner.cancelled.lock().unwrap();
        while !*cancelled {
            cancelled = self.inner.signal.wait(cancelled).unwrap();
        }
    }

    /// Block until cancelled or until `timeout` elapses. Returns whether
    /// the token was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.inner.cancelled.lock().unwrap();
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _timed_out) = self
                .inner
                .signal
                .wait_timeout(cancelled, deadline - now)
                .unwrap();
            cancelled = guard;
        }
        true
    }
}
