//! Redis-backed store client.

use crate::store::{Batch, BatchOp, Store};
use crate::url::StoreUrl;
use async_trait::async_trait;
use muster_core::{Error, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use secrecy::ExposeSecret;
use std::collections::BTreeMap;
use std::time::Duration;

/// Upper bound on connection establishment.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Store client speaking to a single Redis server.
///
/// The connection manager multiplexes every caller onto one connection and
/// reconnects transparently after transport drops, so this handle clones
/// cheaply and is shared across the daemon's loops.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to the store described by `url`, selecting its database and
    /// authenticating when the URL carries a password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when the target is unreachable, rejects
    /// the credential, or does not answer within 30 seconds. Callers treat
    /// these as fatal.
    pub async fn connect(url: &StoreUrl) -> Result<Self> {
        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(url.host.clone(), url.port),
            redis: redis::RedisConnectionInfo {
                db: url.db,
                password: url
                    .password
                    .as_ref()
                    .map(|password| password.expose_secret().to_string()),
                ..redis::RedisConnectionInfo::default()
            },
        };
        let client =
            Client::open(info).map_err(|err| Error::connection(format!("invalid target: {err}")))?;
        let manager = tokio::time::timeout(CONNECT_TIMEOUT, client.get_connection_manager())
            .await
            .map_err(|_| {
                Error::connection(format!(
                    "store did not answer within {}s",
                    CONNECT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|err| Error::connection(err.to_string()))?;
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn store_err(operation: &'static str) -> impl FnOnce(redis::RedisError) -> Error {
    move |err| Error::store(operation, err.to_string())
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).await.map_err(store_err("get"))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.set(key, value).await.map_err(store_err("set"))?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn.hget(key, field).await.map_err(store_err("hget"))?;
        Ok(value)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn
            .hset(key, field, value)
            .await
            .map_err(store_err("hset"))?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>> {
        let mut conn = self.conn();
        let fields: BTreeMap<String, String> =
            conn.hgetall(key).await.map_err(store_err("hgetall"))?;
        Ok(fields)
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn();
        let value: i64 = conn
            .hincr(key, field, delta)
            .await
            .map_err(store_err("hincrby"))?;
        Ok(value)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.sadd(key, member).await.map_err(store_err("sadd"))?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.srem(key, member).await.map_err(store_err("srem"))?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.smembers(key).await.map_err(store_err("smembers"))?;
        Ok(members)
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.del(key).await.map_err(store_err("del"))?;
        Ok(())
    }

    async fn expire(&self, key: &str, seconds: i64) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn
            .expire(key, seconds)
            .await
            .map_err(store_err("expire"))?;
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn
            .publish(channel, message)
            .await
            .map_err(store_err("publish"))?;
        Ok(())
    }

    async fn server_time(&self) -> Result<Option<i64>> {
        let mut conn = self.conn();
        // TIME replies [seconds, microseconds]; only the seconds matter here.
        let (seconds, _micros): (String, String) = redis::cmd("TIME")
            .query_async(&mut conn)
            .await
            .map_err(store_err("time"))?;
        let seconds = seconds
            .parse::<i64>()
            .map_err(|_| Error::store("time", format!("unparsable TIME reply `{seconds}`")))?;
        Ok(Some(seconds))
    }

    async fn apply(&self, batch: Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch.ops() {
            match op {
                BatchOp::Del(key) => {
                    pipe.del(key).ignore();
                }
                BatchOp::Set(key, value) => {
                    pipe.set(key, value).ignore();
                }
                BatchOp::HSet(key, field, value) => {
                    pipe.hset(key, field, value).ignore();
                }
                BatchOp::SAdd(key, member) => {
                    pipe.sadd(key, member).ignore();
                }
                BatchOp::SRem(key, member) => {
                    pipe.srem(key, member).ignore();
                }
                BatchOp::HIncrBy(key, field, delta) => {
                    pipe.hincr(key, field, *delta).ignore();
                }
                BatchOp::Expire(key, seconds) => {
                    pipe.expire(key, *seconds).ignore();
                }
            }
        }
        let mut conn = self.conn();
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(store_err("exec"))
    }
}
