//! Expired-host garbage collection.

use muster_store::{Cache, Store};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// When the next GC pass runs: a fixed base plus a fresh offset per cycle.
///
/// Every host runs GC against the same store, so the offset spreads their
/// passes out instead of letting the whole fleet scan at the same moment.
/// The offset source is injected; production draws it at random, tests pin
/// it to a constant.
pub struct GcSchedule {
    base: Duration,
    offset: Box<dyn Fn() -> Duration + Send + Sync>,
}

impl GcSchedule {
    /// Base period plus a uniform random offset in `[0, base)` seconds.
    #[must_use]
    pub fn jittered(base: Duration) -> Self {
        let span = base.as_secs().max(1);
        Self::with_offset(base, move || {
            Duration::from_secs(rand::thread_rng().gen_range(0..span))
        })
    }

    /// Base period plus whatever `offset` yields each cycle.
    #[must_use]
    pub fn with_offset(base: Duration, offset: impl Fn() -> Duration + Send + Sync + 'static) -> Self {
        Self {
            base,
            offset: Box::new(offset),
        }
    }

    /// The delay before the next pass.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        self.base + (self.offset)()
    }
}

/// Run one GC pass immediately, then one per scheduled delay, until
/// shutdown.
///
/// A failed pass is logged and waits for the next delay like any other; the
/// TTLs on every key bound how stale the store can get in the meantime.
pub async fn run<S: Store>(cache: Arc<Cache<S>>, schedule: GcSchedule, shutdown: CancellationToken) {
    loop {
        match cache.clear_expired_hosts().await {
            Ok(expired) if expired.is_empty() => {}
            Ok(expired) => info!(hosts = expired.len(), "garbage collected expired hosts"),
            Err(err) => warn!("garbage collection pass failed: {err}"),
        }
        tokio::select! {
            biased;
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(schedule.next_delay()) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_store::{keys, MemoryStore, Store};

    #[test]
    fn test_next_delay_adds_the_offset() {
        let schedule =
            GcSchedule::with_offset(Duration::from_secs(10), || Duration::from_secs(7));
        assert_eq!(schedule.next_delay(), Duration::from_secs(17));
    }

    #[test]
    fn test_jittered_delay_stays_within_one_extra_period() {
        let base = Duration::from_secs(30);
        let schedule = GcSchedule::jittered(base);
        for _ in 0..100 {
            let delay = schedule.next_delay();
            assert!(delay >= base);
            assert!(delay < base * 2);
        }
    }

    #[tokio::test]
    async fn test_gc_loop_runs_one_pass_before_shutdown() {
        let store = MemoryStore::new();
        store.set_server_time(Some(10_000));
        store.sadd(&keys::hosts(), "silent").await.unwrap();
        store
            .hset(&keys::host("silent"), "last_update", "9000")
            .await
            .unwrap();
        store
            .hset(&keys::host("silent"), "update_interval", "60")
            .await
            .unwrap();

        let cache = Arc::new(Cache::new(store, "self-host", Duration::from_secs(180)));
        let schedule = GcSchedule::with_offset(Duration::from_secs(60), || Duration::ZERO);

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        run(Arc::clone(&cache), schedule, shutdown).await;

        assert!(cache.list_hosts().await.unwrap().is_empty());
    }
}
