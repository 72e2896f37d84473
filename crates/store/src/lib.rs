//! Shared-store plumbing for muster.
//!
//! A thin [`Store`] trait covers the handful of commands the daemon needs,
//! with a Redis implementation for production and an in-memory double for
//! tests. The [`Cache`] engine layers the fleet semantics on top: host
//! registration, container records, heartbeats, and expiry.

/// The cache engine.
pub mod cache;
/// The sync clock.
pub mod clock;
/// Key namespace and event vocabulary.
pub mod keys;
/// In-memory store double.
pub mod memory;
/// Redis-backed store client.
pub mod redis;
/// The store trait and its batch type.
pub mod store;
/// Store URL parsing.
pub mod url;

pub use self::cache::Cache;
pub use self::clock::sync_now;
pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;
pub use self::store::{Batch, BatchOp, Store};
pub use self::url::StoreUrl;
