//! Store readiness gating.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use jobq_store::Backend;

use crate::shutdown::Shutdown;

#[derive(Debug, Default)]
struct Flags {
    ready: bool,
    closed: bool,
}

/// Mutex/condvar pair guarding the process-wide readiness flag.
///
/// Only the readiness monitor mutates the flag; every transition wakes all
/// blocked waiters. The flag starts false and the gate stays usable until
/// `close` marks the manager as shut down, which releases every waiter.
#[derive(Debug, Default)]
pub struct Readiness {
    flags: Mutex<Flags>,
    signal: Condvar,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking snapshot of the flag.
    pub fn is_ready(&self) -> bool {
        self.flags.lock().unwrap().ready
    }

    /// Flip the flag; a transition wakes all blocked waiters.
    pub fn set_ready(&self, ready: bool) {
        let mut flags = self.flags.lock().unwrap();
        if flags.ready != ready {
            flags.ready = ready;
            self.signal.notify_all();
        }
    }

    /// Mark the gate closed and release every waiter. Used on shutdown so
    /// nothing blocks forever against a stopped manager.
    pub fn close(&self) {
        let mut flags = self.flags.lock().unwrap();
        flags.closed = true;
        self.signal.notify_all();
    }

    /// Block until the store is ready (returns true) or the gate is closed
    /// (returns false). Returns immediately if either already holds.
    pub fn wait_until_ready(&self) -> bool {
        let mut flags = self.flags.lock().unwrap();
        loop {
            if flags.closed {
                return false;
            }
            if flags.ready {
                return true;
            }
            flags = self.signal.wait(flags).unwrap();
        }
    }
}

/// Spawn the monitor loop: probe the store every `interval`, flip the flag
/// on each result, and exit when `shutdown` is cancelled.
pub(crate) fn spawn_monitor(
    backend: Arc<dyn Backend>,
    readiness: Arc<Readiness>,
    shutdown: Shutdown,
    interval: Duration,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("jobq-readiness".to_string())
        .spawn(move || {
            loop {
                if shutdown.is_cancelled() {
                    break;
                }
                match backend.ping() {
                    Ok(()) => {
                        if !readiness.is_ready() {
                            info!("store connection ready");
                        }
                        readiness.set_ready(true);
                    }
                    Err(err) => {
                        if readiness.is_ready() {
                            warn!(error = %err, "store probe failed; gating operations");
                        }
                        readiness.set_ready(false);
                    }
                }
                if shutdown.wait_timeout(interval) {
                    break;
                }
            }
        })
        .expect("failed to spawn readiness monitor thread")
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn starts_not_ready() {
        let readiness = Readiness::new();
        assert!(!readiness.is_ready());
    }

    #[test]
    fn wait_returns_immediately_when_already_ready() {
        let readiness = Readiness::new();
        readiness.set_ready(true);
        assert!(readiness.wait_until_ready());
    }

    #[test]
    fn transition_wakes_blocked_waiters() {
        let readiness = Arc::new(Readiness::new());
        let waiter = {
            let readiness = readiness.clone();
            thread::spawn(move || readiness.wait_until_ready())
        };

        thread::sleep(Duration::from_millis(20));
        readiness.set_ready(true);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn close_releases_waiters_with_false() {
        let readiness = Arc::new(Readiness::new());
        let waiter = {
            let readiness = readiness.clone();
            thread::spawn(move || readiness.wait_until_ready())
        };

        thread::sleep(Duration::from_millis(20));
        readiness.close();
        assert!(!waiter.join().unwrap());
    }
}
