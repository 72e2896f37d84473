//! In-memory store double.
//!
//! Implements [`Store`] over plain maps behind a mutex. TTLs and published
//! messages are recorded rather than enforced, so tests can assert on them
//! after the fact.

use crate::store::{Batch, BatchOp, Store};
use async_trait::async_trait;
use muster_core::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Inner {
    strings: HashMap<String, String>,
    hashes: HashMap<String, BTreeMap<String, String>>,
    sets: HashMap<String, BTreeSet<String>>,
    ttls: HashMap<String, i64>,
    published: Vec<(String, String)>,
    server_time: Option<i64>,
}

impl Inner {
    fn del(&mut self, key: &str) {
        self.strings.remove(key);
        self.hashes.remove(key);
        self.sets.remove(key);
        self.ttls.remove(key);
    }

    fn hincr(&mut self, key: String, field: String, delta: i64) -> i64 {
        let entry = self
            .hashes
            .entry(key)
            .or_default()
            .entry(field)
            .or_insert_with(|| "0".to_string());
        // A real server errors on non-numeric fields; the double just
        // restarts the counter, which no test relies on.
        let next = entry.parse::<i64>().unwrap_or(0) + delta;
        *entry = next.to_string();
        next
    }

    fn apply_op(&mut self, op: BatchOp) {
        match op {
            BatchOp::Del(key) => self.del(&key),
            BatchOp::Set(key, value) => {
                self.strings.insert(key, value);
            }
            BatchOp::HSet(key, field, value) => {
                self.hashes.entry(key).or_default().insert(field, value);
            }
            BatchOp::SAdd(key, member) => {
                self.sets.entry(key).or_default().insert(member);
            }
            BatchOp::SRem(key, member) => {
                if let Some(set) = self.sets.get_mut(&key) {
                    set.remove(&member);
                }
            }
            BatchOp::HIncrBy(key, field, delta) => {
                self.hincr(key, field, delta);
            }
            BatchOp::Expire(key, seconds) => {
                self.ttls.insert(key, seconds);
            }
        }
    }
}

/// Mutex-guarded in-memory [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// An empty store with no server clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or clear) the instant [`Store::server_time`] reports.
    pub fn set_server_time(&self, seconds: Option<i64>) {
        self.lock().server_time = seconds;
    }

    /// Every `(channel, message)` pair published so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<(String, String)> {
        self.lock().published.clone()
    }

    /// The TTL most recently recorded for a key, if any write expired it.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<i64> {
        self.lock().ttls.get(key).copied()
    }

    /// Snapshot of a hash, bypassing the trait.
    #[must_use]
    pub fn hash(&self, key: &str) -> BTreeMap<String, String> {
        self.lock().hashes.get(key).cloned().unwrap_or_default()
    }

    /// Snapshot of a set, bypassing the trait.
    #[must_use]
    pub fn members(&self, key: &str) -> BTreeSet<String> {
        self.lock().sets.get(key).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .lock()
            .hashes
            .get(key)
            .and_then(|hash| hash.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.hash(key))
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        Ok(self.lock().hincr(key.to_string(), field.to_string(), delta))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        if let Some(set) = self.lock().sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.members(key).into_iter().collect())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.lock().del(key);
        Ok(())
    }

    async fn expire(&self, key: &str, seconds: i64) -> Result<()> {
        self.lock().ttls.insert(key.to_string(), seconds);
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        self.lock()
            .published
            .push((channel.to_string(), message.to_string()));
        Ok(())
    }

    async fn server_time(&self) -> Result<Option<i64>> {
        Ok(self.lock().server_time)
    }

    async fn apply(&self, batch: Batch) -> Result<()> {
        let mut inner = self.lock();
        for op in batch.into_ops() {
            inner.apply_op(op);
        }
        Ok(())
    }
}
