//! `jobq-store` — backing-store adapters for the job queue.
//!
//! The queue needs six things from a store: document put (with a TTL set
//! separately), document get, list push, blocking list pop, publish/
//! subscribe, and append/read-with-cursor. [`Backend`] expresses that
//! contract; any store satisfying it can sit behind the manager. The Redis
//! adapter is the production backend (behind the `redis` feature); the
//! in-memory backend serves tests and local development.

pub mod backend;
pub mod keys;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_backend;

pub use backend::{Backend, StoreError, Subscription};
pub use keys::Keyspace;
pub use memory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;
