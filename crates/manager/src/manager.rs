//! The job-queue manager: producer path, worker loop, synchronous wait
//! path, and progress reads.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use jobq_core::{
    Artefact, HookContext, Job, JobDocument, JobId, JobState, ProgressRecord, ProgressUpdate,
};
use jobq_store::{Backend, Keyspace, RedisBackend, StoreError};

use crate::config::Config;
use crate::error::ManagerError;
use crate::readiness::{self, Readiness};
use crate::shutdown::Shutdown;

/// Tick for bounded waits that must observe cancellation.
const WAIT_TICK: Duration = Duration::from_millis(50);
/// Bound on each blocking queue pop in the consumer loop.
const POP_TICK: Duration = Duration::from_secs(1);
/// Poll interval of the progress reader.
const PROGRESS_TICK: Duration = Duration::from_millis(25);

type DoneCallback = Box<dyn FnOnce() + Send>;

/// Shared stop-work state: everything the shutdown watcher and explicit
/// `stop` callers race over.
struct Lifecycle {
    backend: Arc<dyn Backend>,
    readiness: Arc<Readiness>,
    shutdown: Shutdown,
    stopped: AtomicBool,
    done: Mutex<Option<DoneCallback>>,
}

impl Lifecycle {
    /// Idempotent stop-work: close the store, release every blocked
    /// waiter, and fire the `done` callback exactly once.
    fn finish(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        self.backend.close();
        self.readiness.close();
        if let Some(done) = self.done.lock().unwrap().take() {
            done();
        }
        info!("job manager stopped");
    }
}

/// Job-queue manager bound to one backing store.
///
/// Generic over the job type it produces and consumes; a worker process
/// instantiates it with the same `J` as its producers. All methods take
/// `&self` and are safe to call from arbitrary threads.
pub struct Manager<J: Job> {
    config: Config,
    keys: Keyspace,
    lifecycle: Arc<Lifecycle>,
    hooks: HookContext,
    started: AtomicBool,
    worker_started: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
    _job: PhantomData<fn() -> J>,
}

impl<J: Job> Manager<J> {
    /// Validate `config` and construct a manager bound to the configured
    /// backend.
    pub fn new(config: Config) -> Result<Self, ManagerError> {
        config.validate()?;
        // validate() pinned the selector to redis.
        let backend = RedisBackend::connect(config.redis_url())?;
        Ok(Self::assemble(config, Arc::new(backend)))
    }

    /// Construct with an injected backend (tests, alternate stores).
    pub fn with_backend(config: Config, backend: Arc<dyn Backend>) -> Result<Self, ManagerError> {
        config.validate()?;
        Ok(Self::assemble(config, backend))
    }

    fn assemble(config: Config, backend: Arc<dyn Backend>) -> Self {
        let keys = Keyspace::new(config.namespace.clone());
        Self {
            config,
            keys,
            lifecycle: Arc::new(Lifecycle {
                backend,
                readiness: Arc::new(Readiness::new()),
                shutdown: Shutdown::new(),
                stopped: AtomicBool::new(false),
                done: Mutex::new(None),
            }),
            hooks: HookContext::new(),
            started: AtomicBool::new(false),
            worker_started: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
            _job: PhantomData,
        }
    }

    /// Start client mode: the readiness monitor plus a watcher that
    /// performs stop-work when the shutdown token is cancelled.
    ///
    /// `done` runs exactly once when the manager stops, whether through
    /// [`Manager::stop`] or through [`Manager::shutdown_handle`]. Calling
    /// `start` again is a no-op.
    pub fn start(&self, done: impl FnOnce() + Send + 'static) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.lifecycle.done.lock().unwrap() = Some(Box::new(done));

        let monitor = readiness::spawn_monitor(
            self.lifecycle.backend.clone(),
            self.lifecycle.readiness.clone(),
            self.lifecycle.shutdown.clone(),
            self.config.probe_interval,
        );

        let watcher = {
            let lifecycle = self.lifecycle.clone();
            thread::Builder::new()
                .name("jobq-watcher".to_string())
                .spawn(move || {
                    lifecycle.shutdown.wait();
                    lifecycle.finish();
                })
                .expect("failed to spawn shutdown watcher thread")
        };

        let mut threads = self.threads.lock().unwrap();
        threads.push(monitor);
        threads.push(watcher);
        info!(worker = %self.config.worker_name, "job manager started");
    }

    /// Start worker mode: everything [`Manager::start`] does plus the
    /// consumer loop pulling jobs off the queue.
    pub fn start_worker(&self, done: impl FnOnce() + Send + 'static) {
        self.start(done);
        if self.worker_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let ctx = WorkerContext {
            backend: self.lifecycle.backend.clone(),
            readiness: self.lifecycle.readiness.clone(),
            shutdown: self.lifecycle.shutdown.clone(),
            keys: self.keys.clone(),
            hooks: self.hooks.clone(),
            document_ttl: self.config.document_ttl,
            worker: self.config.worker_name.clone(),
        };
        let consumer = thread::Builder::new()
            .name(format!("jobq-consumer-{}", self.config.worker_name))
            .spawn(move || consumer_loop::<J>(ctx))
            .expect("failed to spawn consumer thread");
        self.threads.lock().unwrap().push(consumer);
    }

    /// Stop the manager and join its background threads. Idempotent; both
    /// the shutdown watcher and explicit callers may race here and the
    /// `done` callback still runs exactly once.
    pub fn stop(&self) {
        self.lifecycle.shutdown.cancel();
        self.lifecycle.finish();
        let handles: Vec<_> = self.threads.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }

    /// Cancellation token for external shutdown wiring: cancelling it has
    /// the same effect as calling [`Manager::stop`] from another thread.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.lifecycle.shutdown.clone()
    }

    /// Non-blocking readiness snapshot.
    pub fn is_ready(&self) -> bool {
        self.lifecycle.readiness.is_ready()
    }

    /// Block until the store is ready; returns immediately if it already
    /// is. Returns false when the manager shut down instead.
    pub fn wait_until_ready(&self) -> bool {
        self.lifecycle.readiness.wait_until_ready()
    }

    /// Set a value in the hook context passed to job lifecycle hooks.
    pub fn set_hook_context(&self, key: impl Into<String>, value: serde_json::Value) {
        self.hooks.set(key, value);
    }

    /// Handle to the live hook context.
    pub fn hook_context(&self) -> HookContext {
        self.hooks.clone()
    }

    fn gate(&self) -> Result<(), ManagerError> {
        if self.lifecycle.readiness.wait_until_ready() {
            Ok(())
        } else {
            Err(ManagerError::Terminated)
        }
    }

    fn backend(&self) -> &dyn Backend {
        self.lifecycle.backend.as_ref()
    }

    /// Write the document, set its TTL, and push the ID onto the queue.
    /// Each write fails independently; a partial failure leaves an
    /// orphaned document for store garbage collection.
    fn enqueue_with_id(&self, id: JobId, job: &J) -> Result<(), ManagerError> {
        let doc = JobDocument::new(id, job);
        let payload = serde_json::to_string(&doc)?;
        let key = self.keys.document(id);
        self.backend().put(&key, &payload)?;
        self.backend().expire(&key, self.config.document_ttl)?;
        self.backend().push(&self.keys.queue(), &id.to_string())?;
        debug!(job_id = %id, "job enqueued");
        Ok(())
    }

    /// Enqueue `job` for asynchronous execution and return its ID.
    ///
    /// Blocks until the store is ready. Store failures are returned
    /// immediately without retry.
    pub fn add_job(&self, job: &J) -> Result<JobId, ManagerError> {
        let id = JobId::new();
        self.gate()?;
        self.enqueue_with_id(id, job)?;
        Ok(id)
    }

    /// Enqueue `job` and block until a worker finishes it, the configured
    /// timeout elapses, or the manager shuts down.
    ///
    /// The completion subscription is opened before the document is
    /// written, so a worker finishing instantly cannot publish before the
    /// subscription exists. On completion the terminal document (success
    /// or failure) is deserialized back into `job`. On timeout the job
    /// keeps running in the store and remains retrievable via `get_job`.
    pub fn add_job_and_wait(&self, job: &mut J) -> Result<(), ManagerError> {
        let id = JobId::new();
        self.gate()?;

        let subscription = self.backend().subscribe(&self.keys.completion(id))?;
        self.enqueue_with_id(id, job)?;

        let deadline = Instant::now() + self.config.timeout;
        loop {
            if self.lifecycle.shutdown.is_cancelled() {
                return Err(ManagerError::Terminated);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ManagerError::Timeout {
                    id,
                    timeout: self.config.timeout,
                });
            }
            match subscription.recv_timeout(WAIT_TICK.min(deadline - now)) {
                Ok(payload) => {
                    let doc: JobDocument<J> = serde_json::from_str(&payload)?;
                    *job = doc.job;
                    return Ok(());
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(ManagerError::Terminated),
            }
        }
    }

    /// Fetch the current document for `id` and deserialize it into `job`.
    pub fn get_job(&self, id: JobId, job: &mut J) -> Result<(), ManagerError> {
        self.gate()?;
        let payload = self
            .backend()
            .get(&self.keys.document(id))?
            .ok_or(ManagerError::NotFound(id))?;
        let doc: JobDocument<J> = serde_json::from_str(&payload)?;
        *job = doc.job;
        Ok(())
    }

    /// Overwrite the job fields of `id`'s document, preserving manager
    /// metadata (and TTL) when the document still exists. Used to inject
    /// results out-of-band.
    pub fn set_job(&self, id: JobId, job: &J) -> Result<(), ManagerError> {
        self.gate()?;
        let key = self.keys.document(id);
        match self.backend().get(&key)? {
            Some(existing) => {
                let meta: JobDocument<serde_json::Value> = serde_json::from_str(&existing)?;
                let mut doc = JobDocument::new(id, job);
                doc.state = meta.state;
                doc.progress = meta.progress;
                doc.error = meta.error;
                doc.created_at = meta.created_at;
                self.backend().put(&key, &serde_json::to_string(&doc)?)?;
            }
            None => {
                let doc = JobDocument::new(id, job);
                self.backend().put(&key, &serde_json::to_string(&doc)?)?;
                self.backend().expire(&key, self.config.document_ttl)?;
            }
        }
        Ok(())
    }

    /// Read the next progress record after `artefact`, blocking up to
    /// `timeout` for one to appear.
    ///
    /// Passing each returned artefact into the next call delivers every
    /// record exactly once, in order. When no new record appears within
    /// the bound, the document's current state and progress are returned
    /// with the artefact unchanged.
    pub fn get_job_progress(
        &self,
        id: JobId,
        artefact: Artefact,
        timeout: Duration,
    ) -> Result<ProgressUpdate, ManagerError> {
        self.gate()?;
        let key = self.keys.progress(id);
        let deadline = Instant::now() + timeout;
        loop {
            let records = self.backend().read_from(&key, artefact.offset())?;
            if let Some(first) = records.first() {
                let record: ProgressRecord = serde_json::from_str(first)?;
                return Ok(ProgressUpdate {
                    state: record.state,
                    progress: record.progress,
                    artefact: artefact.advanced(),
                });
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if self
                .lifecycle
                .shutdown
                .wait_timeout(PROGRESS_TICK.min(deadline - now))
            {
                return Err(ManagerError::Terminated);
            }
        }

        // No new record within the bound: fall back to the document.
        let payload = self
            .backend()
            .get(&self.keys.document(id))?
            .ok_or(ManagerError::NotFound(id))?;
        let doc: JobDocument<serde_json::Value> = serde_json::from_str(&payload)?;
        Ok(ProgressUpdate {
            state: doc.state,
            progress: doc.progress,
            artefact,
        })
    }

    /// Append a progress record for `id`, observable through
    /// [`Manager::get_job_progress`]. Does not touch the job document and
    /// never terminates the job.
    pub fn set_job_progress(
        &self,
        id: JobId,
        state: JobState,
        progress: u32,
    ) -> Result<(), ManagerError> {
        self.gate()?;
        let record = ProgressRecord::new(state, progress);
        let key = self.keys.progress(id);
        self.backend().append(&key, &serde_json::to_string(&record)?)?;
        self.backend().expire(&key, self.config.document_ttl)?;
        Ok(())
    }
}

/// Everything the consumer loop needs, detached from the manager so the
/// thread owns its own handles.
struct WorkerContext {
    backend: Arc<dyn Backend>,
    readiness: Arc<Readiness>,
    shutdown: Shutdown,
    keys: Keyspace,
    hooks: HookContext,
    document_ttl: Duration,
    worker: String,
}

fn consumer_loop<J: Job>(ctx: WorkerContext) {
    info!(worker = %ctx.worker, "consumer loop started");
    loop {
        if ctx.shutdown.is_cancelled() {
            break;
        }
        if !ctx.readiness.wait_until_ready() {
            break;
        }

        let raw = match ctx.backend.blocking_pop(&ctx.keys.queue(), POP_TICK) {
            Ok(Some(raw)) => raw,
            Ok(None) => continue,
            Err(StoreError::Closed) => break,
            Err(err) => {
                warn!(worker = %ctx.worker, error = %err, "queue pop failed");
                // Back off one tick; the readiness monitor gates the next
                // iteration if the store stays down.
                if ctx.shutdown.wait_timeout(POP_TICK) {
                    break;
                }
                continue;
            }
        };

        let id = match raw.parse::<JobId>() {
            Ok(id) => id,
            Err(err) => {
                warn!(worker = %ctx.worker, entry = %raw, error = %err, "discarding malformed queue entry");
                continue;
            }
        };

        if let Err(err) = run_job::<J>(&ctx, id) {
            // One bad job must never stall the queue.
            warn!(worker = %ctx.worker, job_id = %id, error = %err, "job processing failed");
        }
    }
    info!(worker = %ctx.worker, "consumer loop stopped");
}

fn run_job<J: Job>(ctx: &WorkerContext, id: JobId) -> Result<(), ManagerError> {
    let key = ctx.keys.document(id);
    let payload = ctx
        .backend
        .get(&key)?
        .ok_or(ManagerError::NotFound(id))?;
    let mut doc: JobDocument<J> = serde_json::from_str(&payload)?;

    doc.job.on_creation(&ctx.hooks);

    doc.mark_running();
    persist(ctx, &key, &doc)?;
    record_progress(ctx, id, doc.state, doc.progress);

    debug!(worker = %ctx.worker, job_id = %id, "executing job");
    match doc.job.execute() {
        Ok(()) => doc.mark_completed(),
        Err(err) => doc.mark_failed(format!("{:#}", err)),
    }

    // Terminal persistence failures must not prevent the completion
    // publish; waiters are released on success and failure alike.
    if let Err(err) = persist(ctx, &key, &doc) {
        warn!(worker = %ctx.worker, job_id = %id, error = %err, "failed to persist terminal document");
    }
    record_progress(ctx, id, doc.state, doc.progress);

    doc.job.on_completion(&ctx.hooks);

    match serde_json::to_string(&doc) {
        Ok(terminal) => {
            if let Err(err) = ctx.backend.publish(&ctx.keys.completion(id), &terminal) {
                warn!(worker = %ctx.worker, job_id = %id, error = %err, "failed to publish completion");
            }
        }
        Err(err) => {
            warn!(worker = %ctx.worker, job_id = %id, error = %err, "failed to encode terminal document");
        }
    }

    match doc.state {
        JobState::Failed => {
            info!(worker = %ctx.worker, job_id = %id, error = doc.error.as_deref().unwrap_or(""), "job failed")
        }
        _ => debug!(worker = %ctx.worker, job_id = %id, "job completed"),
    }
    Ok(())
}

/// Persist `doc` under `key`. The enqueue-time TTL is preserved by the
/// store's put semantics, so the expiry stays counted from creation.
fn persist<J: Job>(ctx: &WorkerContext, key: &str, doc: &JobDocument<J>) -> Result<(), ManagerError> {
    let payload = serde_json::to_string(doc)?;
    ctx.backend.put(key, &payload)?;
    Ok(())
}

fn record_progress(ctx: &WorkerContext, id: JobId, state: JobState, progress: u32) {
    let record = ProgressRecord::new(state, progress);
    let key = ctx.keys.progress(id);
    let result = serde_json::to_string(&record)
        .map_err(ManagerError::from)
        .and_then(|payload| {
            ctx.backend.append(&key, &payload)?;
            ctx.backend.expire(&key, ctx.document_ttl)?;
            Ok(())
        });
    if let Err(err) = result {
        warn!(job_id = %id, error = %err, "failed to record progress");
    }
}
