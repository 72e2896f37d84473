//! Full reconciliation sweep.
//!
//! The sweep is the source of truth the event path converges toward: it
//! rewrites every running container's record and replaces the host's
//! membership set wholesale, repairing whatever missed events or partial
//! writes left behind.

use muster_runtime::ContainerRuntime;
use muster_store::{Cache, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sweep immediately, then on every tick of `interval`, until shutdown.
pub async fn run<S, R>(
    cache: Arc<Cache<S>>,
    runtime: Arc<R>,
    interval: Duration,
    shutdown: CancellationToken,
) where
    S: Store,
    R: ContainerRuntime,
{
    loop {
        sweep_once(&cache, runtime.as_ref()).await;
        tokio::select! {
            biased;
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(interval) => {}
        }
    }
}

/// One reconciliation cycle.
///
/// Lists the running containers, writes a record for each one that can
/// still be inspected, then replaces the host's set with exactly the ids
/// written. Containers that vanish between list and inspect are left out;
/// that race is routine, not an error. Any store write failure abandons the
/// rest of the cycle, and the next scheduled sweep starts from scratch.
pub async fn sweep_once<S, R>(cache: &Cache<S>, runtime: &R)
where
    S: Store,
    R: ContainerRuntime,
{
    let listed = match runtime.list_containers().await {
        Ok(listed) => listed,
        Err(err) => {
            warn!("skipping sweep, container listing failed: {err}");
            return;
        }
    };

    let mut processed = Vec::with_capacity(listed.len());
    for summary in listed {
        match runtime.inspect_container(&summary.id).await {
            Ok(Some(record)) => {
                if let Err(err) = cache.set_container_info(&record).await {
                    warn!(container = %summary.id, "abandoning sweep, container write failed: {err}");
                    return;
                }
                processed.push(record.id);
            }
            Ok(None) => {
                debug!(container = %summary.id, "container vanished between list and inspect");
            }
            Err(err) => {
                debug!(container = %summary.id, "leaving container out of this sweep, inspect failed: {err}");
            }
        }
    }

    let count = processed.len();
    if let Err(err) = cache.set_containers_list(&processed).await {
        warn!("abandoning sweep, list write failed: {err}");
        return;
    }
    info!(containers = count, "sweep complete");

    match runtime.version().await {
        Ok(version) => {
            if let Err(err) = cache
                .set_host_param(cache.host_id(), "docker_version", &version.to_string())
                .await
            {
                warn!("failed to record runtime version: {err}");
            }
        }
        Err(err) => debug!("runtime version query failed: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_core::{ContainerRecord, RuntimeVersion};
    use muster_runtime::testing::StubRuntime;
    use muster_store::MemoryStore;

    fn record(id: &str) -> ContainerRecord {
        ContainerRecord {
            id: id.to_string(),
            name: format!("name-{id}"),
            ..ContainerRecord::default()
        }
    }

    fn cache() -> Cache<MemoryStore> {
        Cache::new(MemoryStore::new(), "self-host", Duration::from_secs(180))
    }

    #[tokio::test]
    async fn test_sweep_mirrors_the_listing_exactly() {
        let cache = cache();
        let runtime = StubRuntime::new();
        runtime.add_container(record("c1"));
        runtime.add_container(record("c2"));

        // A leftover from a previous shape of the world.
        cache
            .set_containers_list(&["stale".to_string()])
            .await
            .unwrap();

        sweep_once(&cache, &runtime).await;

        let members = cache.list_containers(Some("self-host")).await.unwrap();
        assert_eq!(members, vec!["c1".to_string(), "c2".to_string()]);
        assert!(cache.get_container("c1").await.unwrap().is_some());
        assert!(cache.get_container("c2").await.unwrap().is_some());

        let hosts = cache.list_hosts().await.unwrap();
        assert_eq!(hosts[0].containers_running, Some(2));
    }

    #[tokio::test]
    async fn test_sweep_excludes_containers_that_vanish_mid_cycle() {
        let cache = cache();
        let runtime = StubRuntime::new();
        runtime.add_container(record("c1"));
        runtime.add_container(record("c2"));
        runtime.vanish_after_listing("c2");

        sweep_once(&cache, &runtime).await;

        let members = cache.list_containers(Some("self-host")).await.unwrap();
        assert_eq!(members, vec!["c1".to_string()]);
        assert!(cache.get_container("c2").await.unwrap().is_none());

        let hosts = cache.list_hosts().await.unwrap();
        assert_eq!(hosts[0].containers_running, Some(1));
    }

    #[tokio::test]
    async fn test_sweep_excludes_containers_whose_inspect_fails() {
        let cache = cache();
        let runtime = StubRuntime::new();
        runtime.add_container(record("c1"));
        runtime.add_container(record("c2"));
        runtime.fail_inspect("c1");

        sweep_once(&cache, &runtime).await;

        let members = cache.list_containers(Some("self-host")).await.unwrap();
        assert_eq!(members, vec!["c2".to_string()]);
    }

    #[tokio::test]
    async fn test_sweep_writes_nothing_when_listing_fails() {
        let cache = cache();
        let runtime = StubRuntime::new();
        runtime.add_container(record("c1"));
        runtime.fail_listing(true);

        sweep_once(&cache, &runtime).await;

        assert!(cache.list_hosts().await.unwrap().is_empty());
        assert!(cache.get_container("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_records_the_runtime_version() {
        let cache = cache();
        let runtime = StubRuntime::new();
        runtime.set_version(RuntimeVersion {
            version: "27.0.3".to_string(),
            git_commit: "abc1234".to_string(),
            platform: "go1.22.4".to_string(),
        });

        sweep_once(&cache, &runtime).await;

        let hosts = cache.list_hosts().await.unwrap();
        assert_eq!(
            hosts[0].docker_version.as_deref(),
            Some("27.0.3;git-abc1234;go1.22.4")
        );
    }

    #[tokio::test]
    async fn test_successive_sweeps_converge_after_changes() {
        let cache = cache();
        let runtime = StubRuntime::new();
        runtime.add_container(record("c1"));
        sweep_once(&cache, &runtime).await;

        runtime.remove_container("c1");
        runtime.add_container(record("c2"));
        sweep_once(&cache, &runtime).await;

        let members = cache.list_containers(Some("self-host")).await.unwrap();
        assert_eq!(members, vec!["c2".to_string()]);
        let hosts = cache.list_hosts().await.unwrap();
        assert_eq!(hosts[0].containers_running, Some(1));
    }
}
