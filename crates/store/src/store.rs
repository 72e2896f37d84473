//! The narrow surface muster needs from a shared key-value store.

use async_trait::async_trait;
use muster_core::Result;
use std::collections::BTreeMap;

/// One queued write inside an atomic [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Delete a key outright.
    Del(String),
    /// Set a string key.
    Set(String, String),
    /// Set one hash field.
    HSet(String, String, String),
    /// Add a member to a set.
    SAdd(String, String),
    /// Remove a member from a set.
    SRem(String, String),
    /// Add a signed delta to a numeric hash field.
    HIncrBy(String, String, i64),
    /// Expire a key after this many seconds.
    Expire(String, i64),
}

/// An ordered batch of writes applied as a single transaction.
///
/// Readers observe none of the batch or all of it. The sync and GC paths
/// lean on this to swap whole sets and multi-key footprints without ever
/// exposing a half-written state.
#[derive(Debug, Default, Clone)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    /// Start an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a key deletion.
    pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::Del(key.into()));
        self
    }

    /// Queue a string write.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::Set(key.into(), value.into()));
        self
    }

    /// Queue a hash-field write.
    pub fn hset(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.ops
            .push(BatchOp::HSet(key.into(), field.into(), value.into()));
        self
    }

    /// Queue a set-member addition.
    pub fn sadd(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::SAdd(key.into(), member.into()));
        self
    }

    /// Queue a set-member removal.
    pub fn srem(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::SRem(key.into(), member.into()));
        self
    }

    /// Queue a hash-field increment.
    pub fn hincr_by(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        delta: i64,
    ) -> &mut Self {
        self.ops
            .push(BatchOp::HIncrBy(key.into(), field.into(), delta));
        self
    }

    /// Queue an expiry.
    pub fn expire(&mut self, key: impl Into<String>, seconds: i64) -> &mut Self {
        self.ops.push(BatchOp::Expire(key.into(), seconds));
        self
    }

    /// The queued operations, in order.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Consume the batch, yielding its operations.
    #[must_use]
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    /// Whether nothing has been queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Client surface over the shared key-value store.
///
/// One implementation speaks to a real Redis server and one is an in-memory
/// double, so everything layered on top stays testable without a server. The
/// trait stays deliberately close to the store's own command set; cache
/// semantics live a level up in [`crate::cache::Cache`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a string key.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string key.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Read one hash field.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Write one hash field.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Read a whole hash. A missing key reads as an empty hash.
    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>>;

    /// Atomically add a signed delta to a hash field, returning the new
    /// value. A missing field counts from zero.
    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64>;

    /// Add a member to a set.
    async fn sadd(&self, key: &str, member: &str) -> Result<()>;

    /// Remove a member from a set.
    async fn srem(&self, key: &str, member: &str) -> Result<()>;

    /// List a set's members. A missing key reads as an empty set.
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Delete a key.
    async fn del(&self, key: &str) -> Result<()>;

    /// Expire a key after `seconds`.
    async fn expire(&self, key: &str, seconds: i64) -> Result<()>;

    /// Publish a message on a pub/sub channel.
    async fn publish(&self, channel: &str, message: &str) -> Result<()>;

    /// The server's wall clock in Unix seconds, when it exposes one.
    async fn server_time(&self) -> Result<Option<i64>>;

    /// Apply a batch as one atomic transaction.
    async fn apply(&self, batch: Batch) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_preserves_order() {
        let mut batch = Batch::new();
        batch
            .del("k")
            .sadd("k", "a")
            .sadd("k", "b")
            .expire("k", 30);

        assert_eq!(
            batch.ops(),
            &[
                BatchOp::Del("k".into()),
                BatchOp::SAdd("k".into(), "a".into()),
                BatchOp::SAdd("k".into(), "b".into()),
                BatchOp::Expire("k".into(), 30),
            ]
        );
    }

    #[test]
    fn test_empty_batch() {
        assert!(Batch::new().is_empty());
        assert!(Batch::new().into_ops().is_empty());
    }
}
