//! The daemon's three loops: event path, full sweep, and garbage collection.
//!
//! The loops never coordinate. Each one writes idempotently through the
//! cache, so any interleaving converges by the end of the next sweep, and a
//! loop that hits an error simply waits for its own next cycle.

/// Event-driven incremental writes.
pub mod events;
/// Expired-host garbage collection.
pub mod gc;
/// Periodic full reconciliation.
pub mod sweep;

pub use gc::GcSchedule;

use muster_runtime::ContainerRuntime;
use muster_store::{Cache, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One host's sync agent: the cache, the runtime client, and the schedule.
pub struct Agent<S, R> {
    cache: Arc<Cache<S>>,
    runtime: Arc<R>,
    interval: Duration,
    gc: GcSchedule,
}

impl<S, R> Agent<S, R>
where
    S: Store + 'static,
    R: ContainerRuntime + 'static,
{
    /// Bundle the collaborators. `interval` is the sweep period; the GC runs
    /// on its own [`GcSchedule`].
    pub fn new(cache: Cache<S>, runtime: R, interval: Duration, gc: GcSchedule) -> Self {
        Self {
            cache: Arc::new(cache),
            runtime: Arc::new(runtime),
            interval,
            gc,
        }
    }

    /// Run all three loops concurrently until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(host = %self.cache.host_id(), "agent starting");
        let events = events::run(
            Arc::clone(&self.cache),
            Arc::clone(&self.runtime),
            shutdown.clone(),
        );
        let sweeps = sweep::run(
            Arc::clone(&self.cache),
            Arc::clone(&self.runtime),
            self.interval,
            shutdown.clone(),
        );
        let gc = gc::run(Arc::clone(&self.cache), self.gc, shutdown);
        tokio::join!(events, sweeps, gc);
        info!("agent stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_core::ContainerRecord;
    use muster_runtime::testing::StubRuntime;
    use muster_store::MemoryStore;

    #[tokio::test]
    async fn test_agent_runs_one_cycle_of_each_loop_then_stops() {
        let store = MemoryStore::new();
        store.set_server_time(Some(50_000));

        let runtime = StubRuntime::new();
        runtime.add_container(ContainerRecord {
            id: "c1".to_string(),
            name: "api".to_string(),
            ..ContainerRecord::default()
        });

        let cache = Cache::new(store, "self-host", Duration::from_secs(180));
        let agent = Agent::new(
            cache,
            runtime,
            Duration::from_secs(120),
            GcSchedule::with_offset(Duration::from_secs(120), || Duration::ZERO),
        );

        // A pre-cancelled token still lets every loop complete one pass.
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let store_view = Arc::clone(&agent.cache);
        agent.run(shutdown).await;

        let members = store_view.list_containers(Some("self-host")).await.unwrap();
        assert_eq!(members, vec!["c1".to_string()]);
        assert!(store_view.get_container("c1").await.unwrap().is_some());

        let hosts = store_view.list_hosts().await.unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].containers_running, Some(1));
    }
}
