//! The cache engine: one host's view of the fleet, written into the shared
//! store.
//!
//! Every write is idempotent and every key carries a TTL, so the event path,
//! the full sweep, and the garbage collector can interleave freely without
//! coordination. Nothing here retries; the next sweep converges on whatever a
//! failed write left behind.

use crate::clock::sync_now;
use crate::keys;
use crate::redis::RedisStore;
use crate::store::{Batch, Store};
use crate::url::StoreUrl;
use muster_core::{ContainerRecord, Error, Flatten, HostRecord, Result};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, warn};

/// A host is expired once its heartbeat is at least this many declared
/// update intervals old.
const EXPIRY_FACTOR: i64 = 2;

/// One host's handle on the shared fleet cache.
///
/// Wraps a [`Store`] client together with this process's host id and the TTL
/// stamped on every key it writes. The TTL is chosen by the caller as one and
/// a half sweep intervals, so a single missed sweep leaves the host visible
/// and two missed sweeps erase it.
pub struct Cache<S> {
    store: S,
    host_id: String,
    ttl: Duration,
}

impl Cache<RedisStore> {
    /// Parse `url`, connect to the store it names, and announce this host on
    /// the events channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] for a malformed URL or an unreachable
    /// server. The announcement itself is best-effort and never fails the
    /// connect.
    pub async fn connect(url: &str, host_id: impl Into<String>, ttl: Duration) -> Result<Self> {
        let location = StoreUrl::parse(url)?;
        let store = RedisStore::connect(&location).await?;
        let cache = Self::new(store, host_id, ttl);
        cache.announce_host().await;
        Ok(cache)
    }
}

impl<S: Store> Cache<S> {
    /// Wrap an already-connected store client.
    pub fn new(store: S, host_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            host_id: host_id.into(),
            ttl,
        }
    }

    /// The id this cache writes under.
    #[must_use]
    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    /// Announce this host on the events channel.
    ///
    /// A missed announcement only delays discovery until the first sweep, so
    /// failure is logged and swallowed.
    pub async fn announce_host(&self) {
        if let Err(err) = self
            .publish_event(&[keys::EVENT_NEW_HOST, &self.host_id])
            .await
        {
            warn!(host = %self.host_id, "failed to announce host: {err}");
        }
    }

    /// Store server time in Unix seconds, falling back to the local clock.
    pub async fn now(&self) -> i64 {
        sync_now(&self.store).await
    }

    /// Write one field of a host's record hash.
    ///
    /// Visible to readers immediately; the hash's expiry is refreshed by the
    /// sweep, not here.
    pub async fn set_host_param(&self, host_id: &str, field: &str, value: &str) -> Result<()> {
        self.store.hset(&keys::host(host_id), field, value).await
    }

    /// Stamp this host's `last_update` with the current sync time.
    pub async fn refresh_heartbeat(&self) -> Result<()> {
        let now = self.now().await;
        self.set_host_param(&self.host_id, "last_update", &now.to_string())
            .await
    }

    /// Replace this host's container-id set with `ids` and re-register the
    /// host, refreshing every related expiry.
    ///
    /// The set swap is one transaction, so readers see the old list or the
    /// new one and never a mix. The host-record writes that follow ride
    /// outside it; if one fails the set is already replaced, and the next
    /// sweep repairs the rest.
    pub async fn set_containers_list(&self, ids: &[String]) -> Result<()> {
        let ttl = self.ttl_seconds();
        let set_key = keys::host_containers(&self.host_id);

        let mut batch = Batch::new();
        batch.del(set_key.as_str());
        for id in ids {
            batch.sadd(set_key.as_str(), id.as_str());
        }
        batch.expire(set_key.as_str(), ttl);
        self.store.apply(batch).await?;

        self.set_host_param(&self.host_id, "containers_running", &ids.len().to_string())
            .await?;
        self.set_host_param(&self.host_id, "update_interval", &ttl.to_string())
            .await?;
        self.refresh_heartbeat().await?;
        self.store.expire(&keys::host(&self.host_id), ttl).await?;
        self.store.sadd(&keys::hosts(), &self.host_id).await?;
        self.store.expire(&keys::hosts(), ttl).await?;
        self.publish_event(&[keys::EVENT_REFRESH_CONTAINERS, &self.host_id])
            .await
    }

    /// Write one container's flattened field hash and serialized blob.
    ///
    /// Each representation swaps atomically as delete-then-write, so stale
    /// fields from a previous shape never linger. The two swaps are separate
    /// transactions: a failure between them leaves the old blob readable next
    /// to the new fields until a later write converges them.
    pub async fn set_container_info(&self, record: &ContainerRecord) -> Result<()> {
        let ttl = self.ttl_seconds();

        let fields_key = keys::container(&record.id);
        let mut fields = Batch::new();
        fields.del(fields_key.as_str());
        for (field, value) in record.flatten() {
            fields.hset(fields_key.as_str(), field, value);
        }
        fields.expire(fields_key.as_str(), ttl);
        self.store.apply(fields).await?;

        let blob_key = keys::container_blob(&record.id);
        let blob = record.to_blob()?;
        let mut batch = Batch::new();
        batch.del(blob_key.as_str());
        batch.set(blob_key.as_str(), blob);
        batch.expire(blob_key.as_str(), ttl);
        self.store.apply(batch).await
    }

    /// Register a newly started container: write its record, bump this
    /// host's running count, refresh the heartbeat, and announce it.
    ///
    /// The count moves by a server-side increment, so concurrent event
    /// callbacks never lose updates. The container id joins the host's set
    /// only on the next sweep. A failing step aborts the rest; nothing rolls
    /// back.
    pub async fn add_container(&self, record: &ContainerRecord) -> Result<()> {
        self.set_container_info(record).await?;
        self.store
            .hincr_by(&keys::host(&self.host_id), "containers_running", 1)
            .await?;
        self.refresh_heartbeat().await?;
        self.publish_event(&[keys::EVENT_NEW_CONTAINER, &self.host_id, &record.id])
            .await
    }

    /// Remove a dead container: one transaction deletes its field hash,
    /// drops it from this host's set, and decrements the running count; then
    /// the heartbeat refreshes and the removal is announced.
    ///
    /// The serialized blob is left to its TTL so late readers can still
    /// resolve the final state.
    pub async fn delete_container(&self, container_id: &str) -> Result<()> {
        let mut batch = Batch::new();
        batch.del(keys::container(container_id));
        batch.srem(keys::host_containers(&self.host_id), container_id);
        batch.hincr_by(keys::host(&self.host_id), "containers_running", -1);
        self.store.apply(batch).await?;

        self.refresh_heartbeat().await?;
        self.publish_event(&[keys::EVENT_DELETE_CONTAINER, &self.host_id, container_id])
            .await
    }

    /// Remove a host's presence: membership, record hash, and container set
    /// go in one transaction. Its containers' records are left to their TTLs.
    pub async fn delete_host(&self, host_id: &str) -> Result<()> {
        let mut batch = Batch::new();
        batch.srem(keys::hosts(), host_id);
        batch.del(keys::host(host_id));
        batch.del(keys::host_containers(host_id));
        self.store.apply(batch).await
    }

    /// Drop every foreign host whose heartbeat has gone silent, returning
    /// the ids that were removed.
    ///
    /// This host's own id is never touched. A host whose heartbeat fields
    /// cannot be read or parsed is skipped this pass: a stale entry that
    /// lingers one more cycle beats wrongly deleting a live host.
    pub async fn clear_expired_hosts(&self) -> Result<Vec<String>> {
        let mut expired = Vec::new();
        for host_id in self.store.smembers(&keys::hosts()).await? {
            if host_id == self.host_id {
                continue;
            }
            match self.host_is_expired(&host_id).await {
                Ok(true) => {
                    self.delete_host(&host_id).await?;
                    if let Err(err) = self
                        .publish_event(&[keys::EVENT_EXPIRED_HOST, &host_id])
                        .await
                    {
                        warn!(host = %host_id, "failed to announce expiry: {err}");
                    }
                    expired.push(host_id);
                }
                Ok(false) => {}
                Err(err) => {
                    debug!(host = %host_id, "skipping host this pass: {err}");
                }
            }
        }
        Ok(expired)
    }

    /// Publish one colon-joined event on the shared channel.
    ///
    /// Fire-and-forget: the error surfaces to the caller, nothing retries
    /// and nothing is queued.
    pub async fn publish_event(&self, parts: &[&str]) -> Result<()> {
        self.store
            .publish(keys::EVENTS_CHANNEL, &parts.join(":"))
            .await
    }

    /// Every live host whose record hash is still present, as lenient views.
    pub async fn list_hosts(&self) -> Result<Vec<HostRecord>> {
        let mut hosts = Vec::new();
        for host_id in self.store.smembers(&keys::hosts()).await? {
            let fields = self.store.hgetall(&keys::host(&host_id)).await?;
            if fields.is_empty() {
                // The hash aged out ahead of the membership set.
                continue;
            }
            hosts.push(HostRecord::from_fields(host_id, fields));
        }
        Ok(hosts)
    }

    /// Container ids on one host, or the deduplicated union across all live
    /// hosts.
    pub async fn list_containers(&self, host_id: Option<&str>) -> Result<Vec<String>> {
        match host_id {
            Some(host_id) => self.store.smembers(&keys::host_containers(host_id)).await,
            None => {
                let mut ids = BTreeSet::new();
                for host_id in self.store.smembers(&keys::hosts()).await? {
                    ids.extend(
                        self.store
                            .smembers(&keys::host_containers(&host_id))
                            .await?,
                    );
                }
                Ok(ids.into_iter().collect())
            }
        }
    }

    /// One container's full record, parsed from its stored blob.
    pub async fn get_container(&self, container_id: &str) -> Result<Option<ContainerRecord>> {
        let Some(blob) = self.store.get(&keys::container_blob(container_id)).await? else {
            return Ok(None);
        };
        let record = ContainerRecord::from_blob(&blob)
            .map_err(|_| Error::malformed(keys::container_blob(container_id), "json"))?;
        Ok(Some(record))
    }

    /// Expiry verdict for one foreign host. Reads a fresh `now` so a slow
    /// scan does not age every host against one stale clock sample.
    async fn host_is_expired(&self, host_id: &str) -> Result<bool> {
        let key = keys::host(host_id);
        let last_update = self.read_host_field(&key, "last_update").await?;
        let update_interval = self.read_host_field(&key, "update_interval").await?;
        let now = self.now().await;
        Ok(is_expired(now, last_update, update_interval))
    }

    async fn read_host_field(&self, key: &str, field: &str) -> Result<i64> {
        let raw = self
            .store
            .hget(key, field)
            .await?
            .ok_or_else(|| Error::malformed(key, field))?;
        raw.parse().map_err(|_| Error::malformed(key, field))
    }

    fn ttl_seconds(&self) -> i64 {
        i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)
    }
}

/// A heartbeat is expired once `now - last_update` meets or exceeds twice
/// the host's declared update interval.
fn is_expired(now: i64, last_update: i64, update_interval: i64) -> bool {
    now - last_update >= EXPIRY_FACTOR * update_interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use muster_core::{ContainerConfig, ContainerState};

    const TTL: Duration = Duration::from_secs(180);

    fn cache() -> Cache<MemoryStore> {
        Cache::new(MemoryStore::new(), "self-host", TTL)
    }

    fn record(id: &str) -> ContainerRecord {
        ContainerRecord {
            id: id.to_string(),
            name: format!("name-{id}"),
            image: "redis:7".to_string(),
            config: ContainerConfig {
                hostname: id.to_string(),
                ..ContainerConfig::default()
            },
            state: ContainerState {
                status: "running".to_string(),
                running: true,
                ..ContainerState::default()
            },
            ..ContainerRecord::default()
        }
    }

    /// Seed a foreign host as the GC would find it.
    async fn seed_host(cache: &Cache<MemoryStore>, id: &str, last_update: i64, interval: i64) {
        cache.store.sadd(&keys::hosts(), id).await.unwrap();
        let key = keys::host(id);
        cache
            .store
            .hset(&key, "last_update", &last_update.to_string())
            .await
            .unwrap();
        cache
            .store
            .hset(&key, "update_interval", &interval.to_string())
            .await
            .unwrap();
        cache
            .store
            .sadd(&keys::host_containers(id), "some-container")
            .await
            .unwrap();
    }

    #[test]
    fn test_is_expired_boundary() {
        // Exactly twice the interval counts as expired.
        assert!(is_expired(1000, 1000 - 2 * 180, 180));
        assert!(is_expired(1000, 1000 - 2 * 180 - 1, 180));
        assert!(!is_expired(1000, 1000 - 2 * 180 + 1, 180));
        assert!(!is_expired(1000, 1000, 180));
    }

    #[tokio::test]
    async fn test_set_containers_list_replaces_exactly() {
        let cache = cache();
        cache.store.sadd(&keys::host_containers("self-host"), "stale").await.unwrap();

        let ids = vec!["c1".to_string(), "c2".to_string()];
        cache.set_containers_list(&ids).await.unwrap();

        let members = cache.store.members(&keys::host_containers("self-host"));
        assert_eq!(
            members.into_iter().collect::<Vec<_>>(),
            vec!["c1".to_string(), "c2".to_string()]
        );

        let host = cache.store.hash(&keys::host("self-host"));
        assert_eq!(host.get("containers_running").unwrap(), "2");
        assert_eq!(host.get("update_interval").unwrap(), "180");
        assert!(host.contains_key("last_update"));

        assert!(cache.store.members(&keys::hosts()).contains("self-host"));
        assert_eq!(cache.store.ttl(&keys::host_containers("self-host")), Some(180));
        assert_eq!(cache.store.ttl(&keys::host("self-host")), Some(180));
        assert_eq!(cache.store.ttl(&keys::hosts()), Some(180));

        let (channel, message) = cache.store.published().pop().unwrap();
        assert_eq!(channel, keys::EVENTS_CHANNEL);
        assert_eq!(message, "refresh_containers:self-host");
    }

    #[tokio::test]
    async fn test_set_containers_list_accepts_empty() {
        let cache = cache();
        cache.set_containers_list(&["c1".to_string()]).await.unwrap();
        cache.set_containers_list(&[]).await.unwrap();

        assert!(cache.store.members(&keys::host_containers("self-host")).is_empty());
        let host = cache.store.hash(&keys::host("self-host"));
        assert_eq!(host.get("containers_running").unwrap(), "0");
    }

    #[tokio::test]
    async fn test_set_container_info_writes_both_representations() {
        let cache = cache();
        let record = record("c1");
        cache.set_container_info(&record).await.unwrap();

        let fields = cache.store.hash(&keys::container("c1"));
        assert_eq!(fields.get("id").unwrap(), "c1");
        assert_eq!(fields.get("state_running").unwrap(), "true");
        assert_eq!(fields.get("config_hostname").unwrap(), "c1");

        let blob = cache.store.get(&keys::container_blob("c1")).await.unwrap().unwrap();
        assert_eq!(ContainerRecord::from_blob(&blob).unwrap(), record);

        assert_eq!(cache.store.ttl(&keys::container("c1")), Some(180));
        assert_eq!(cache.store.ttl(&keys::container_blob("c1")), Some(180));
    }

    #[tokio::test]
    async fn test_set_container_info_drops_stale_fields() {
        let cache = cache();
        cache
            .store
            .hset(&keys::container("c1"), "obsolete_field", "x")
            .await
            .unwrap();

        cache.set_container_info(&record("c1")).await.unwrap();
        let fields = cache.store.hash(&keys::container("c1"));
        assert!(!fields.contains_key("obsolete_field"));
    }

    #[tokio::test]
    async fn test_set_container_info_is_idempotent() {
        let cache = cache();
        let record = record("c1");
        cache.set_container_info(&record).await.unwrap();
        let first = cache.store.hash(&keys::container("c1"));

        cache.set_container_info(&record).await.unwrap();
        assert_eq!(cache.store.hash(&keys::container("c1")), first);
    }

    #[tokio::test]
    async fn test_add_container_counts_and_announces() {
        let cache = cache();
        cache.add_container(&record("c1")).await.unwrap();
        cache.add_container(&record("c2")).await.unwrap();

        let host = cache.store.hash(&keys::host("self-host"));
        assert_eq!(host.get("containers_running").unwrap(), "2");
        assert!(host.contains_key("last_update"));

        // The membership set converges on the next sweep, not here.
        assert!(cache.store.members(&keys::host_containers("self-host")).is_empty());

        let messages: Vec<String> = cache
            .store
            .published()
            .into_iter()
            .map(|(_, message)| message)
            .collect();
        assert!(messages.contains(&"new_container:self-host:c1".to_string()));
        assert!(messages.contains(&"new_container:self-host:c2".to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_adds_net_out() {
        let cache = cache();
        let r1 = record("c1");
        let r2 = record("c2");
        let (a, b) = tokio::join!(cache.add_container(&r1), cache.add_container(&r2));
        a.unwrap();
        b.unwrap();

        let host = cache.store.hash(&keys::host("self-host"));
        assert_eq!(host.get("containers_running").unwrap(), "2");
    }

    #[tokio::test]
    async fn test_delete_container_removes_fields_keeps_blob() {
        let cache = cache();
        cache.add_container(&record("c1")).await.unwrap();
        cache
            .set_containers_list(&["c1".to_string(), "c2".to_string()])
            .await
            .unwrap();

        cache.delete_container("c1").await.unwrap();

        assert!(cache.store.hash(&keys::container("c1")).is_empty());
        let members = cache.store.members(&keys::host_containers("self-host"));
        assert!(!members.contains("c1"));
        assert!(members.contains("c2"));

        let host = cache.store.hash(&keys::host("self-host"));
        assert_eq!(host.get("containers_running").unwrap(), "1");

        // The blob outlives the delete and ages out on its own.
        assert!(cache.store.get(&keys::container_blob("c1")).await.unwrap().is_some());

        let (_, message) = cache.store.published().pop().unwrap();
        assert_eq!(message, "delete_container:self-host:c1");
    }

    #[tokio::test]
    async fn test_delete_host_clears_presence() {
        let cache = cache();
        seed_host(&cache, "other", 1000, 60).await;

        cache.delete_host("other").await.unwrap();

        assert!(!cache.store.members(&keys::hosts()).contains("other"));
        assert!(cache.store.hash(&keys::host("other")).is_empty());
        assert!(cache.store.members(&keys::host_containers("other")).is_empty());
    }

    #[tokio::test]
    async fn test_clear_expired_hosts_drops_silent_only() {
        let cache = cache();
        cache.store.set_server_time(Some(10_000));
        // Silent for exactly two intervals: expired.
        seed_host(&cache, "silent", 10_000 - 120, 60).await;
        // One second inside the window: alive.
        seed_host(&cache, "alive", 10_000 - 119, 60).await;

        let expired = cache.clear_expired_hosts().await.unwrap();
        assert_eq!(expired, vec!["silent".to_string()]);

        assert!(!cache.store.members(&keys::hosts()).contains("silent"));
        assert!(cache.store.hash(&keys::host("silent")).is_empty());
        assert!(cache.store.members(&keys::hosts()).contains("alive"));

        let (_, message) = cache.store.published().pop().unwrap();
        assert_eq!(message, "expired_host:silent");
    }

    #[tokio::test]
    async fn test_clear_expired_hosts_never_touches_self() {
        let cache = cache();
        cache.store.set_server_time(Some(10_000));
        seed_host(&cache, "self-host", 0, 1).await;

        let expired = cache.clear_expired_hosts().await.unwrap();
        assert!(expired.is_empty());
        assert!(cache.store.members(&keys::hosts()).contains("self-host"));
    }

    #[tokio::test]
    async fn test_clear_expired_hosts_skips_malformed_records() {
        let cache = cache();
        cache.store.set_server_time(Some(10_000));

        cache.store.sadd(&keys::hosts(), "garbled").await.unwrap();
        cache
            .store
            .hset(&keys::host("garbled"), "last_update", "not-a-number")
            .await
            .unwrap();
        cache
            .store
            .hset(&keys::host("garbled"), "update_interval", "60")
            .await
            .unwrap();

        cache.store.sadd(&keys::hosts(), "hollow").await.unwrap();

        let expired = cache.clear_expired_hosts().await.unwrap();
        assert!(expired.is_empty());
        assert!(cache.store.members(&keys::hosts()).contains("garbled"));
        assert!(cache.store.members(&keys::hosts()).contains("hollow"));
    }

    #[tokio::test]
    async fn test_refresh_heartbeat_uses_sync_time() {
        let cache = cache();
        cache.store.set_server_time(Some(123_456));
        cache.refresh_heartbeat().await.unwrap();

        let host = cache.store.hash(&keys::host("self-host"));
        assert_eq!(host.get("last_update").unwrap(), "123456");
    }

    #[tokio::test]
    async fn test_publish_event_joins_with_colons() {
        let cache = cache();
        cache.publish_event(&["a", "b", "c"]).await.unwrap();

        let (channel, message) = cache.store.published().pop().unwrap();
        assert_eq!(channel, "docker_events");
        assert_eq!(message, "a:b:c");
    }

    #[tokio::test]
    async fn test_announce_host_publishes_new_host() {
        let cache = cache();
        cache.announce_host().await;

        let (_, message) = cache.store.published().pop().unwrap();
        assert_eq!(message, "new_host:self-host");
    }

    #[tokio::test]
    async fn test_list_hosts_skips_hollow_members() {
        let cache = cache();
        seed_host(&cache, "full", 1000, 60).await;
        cache.store.sadd(&keys::hosts(), "hollow").await.unwrap();

        let hosts = cache.list_hosts().await.unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].id, "full");
        assert_eq!(hosts[0].last_update, Some(1000));
        assert_eq!(hosts[0].update_interval, Some(60));
    }

    #[tokio::test]
    async fn test_list_containers_filters_and_unions() {
        let cache = cache();
        seed_host(&cache, "h1", 1000, 60).await;
        let h1 = keys::host_containers("h1");
        cache.store.sadd(&h1, "a").await.unwrap();
        cache.store.sadd(&h1, "b").await.unwrap();
        seed_host(&cache, "h2", 1000, 60).await;
        cache.store.sadd(&keys::host_containers("h2"), "b").await.unwrap();

        let only_h2 = cache.list_containers(Some("h2")).await.unwrap();
        assert_eq!(only_h2, vec!["b".to_string(), "some-container".to_string()]);

        let all = cache.list_containers(None).await.unwrap();
        assert_eq!(
            all,
            vec![
                "a".to_string(),
                "b".to_string(),
                "some-container".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_get_container_round_trips_and_misses() {
        let cache = cache();
        let record = record("c1");
        cache.set_container_info(&record).await.unwrap();

        assert_eq!(cache.get_container("c1").await.unwrap(), Some(record));
        assert_eq!(cache.get_container("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_container_rejects_garbled_blob() {
        let cache = cache();
        cache
            .store
            .set(&keys::container_blob("c1"), "{not json")
            .await
            .unwrap();

        assert!(cache.get_container("c1").await.is_err());
    }
}
