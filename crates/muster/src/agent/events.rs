//! Event path: incremental cache writes driven by runtime lifecycle events.

use futures::StreamExt;
use muster_core::{ContainerEvent, EventKind};
use muster_runtime::ContainerRuntime;
use muster_store::{Cache, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause before resubscribing after the stream ends or fails.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// Consume runtime events until shutdown, resubscribing whenever the stream
/// ends.
///
/// Events are handled one at a time: a slow cache write delays the next
/// event rather than racing it.
pub async fn run<S, R>(cache: Arc<Cache<S>>, runtime: Arc<R>, shutdown: CancellationToken)
where
    S: Store,
    R: ContainerRuntime,
{
    loop {
        let mut stream = match runtime.subscribe_events().await {
            Ok(stream) => stream,
            Err(err) => {
                warn!("event subscription failed: {err}");
                if wait_or_shutdown(&shutdown, RESUBSCRIBE_DELAY).await {
                    return;
                }
                continue;
            }
        };
        info!("subscribed to runtime events");

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return,
                event = stream.next() => match event {
                    Some(event) => handle_event(&cache, runtime.as_ref(), event).await,
                    None => {
                        warn!("event stream ended, resubscribing");
                        break;
                    }
                },
            }
        }

        if wait_or_shutdown(&shutdown, RESUBSCRIBE_DELAY).await {
            return;
        }
    }
}

/// React to one lifecycle event.
///
/// Start and restart inspect first and only then write; an event for a
/// container that is already gone writes nothing. Death always removes the
/// record, whether or not the dying container can still be inspected.
pub async fn handle_event<S, R>(cache: &Cache<S>, runtime: &R, event: ContainerEvent)
where
    S: Store,
    R: ContainerRuntime,
{
    match event.kind {
        EventKind::Start | EventKind::Restart => {
            match runtime.inspect_container(&event.container_id).await {
                Ok(Some(record)) => {
                    if let Err(err) = cache.add_container(&record).await {
                        warn!(container = %event.container_id, "failed to cache started container: {err}");
                    } else {
                        info!(container = %event.container_id, name = %record.name, "container started");
                    }
                }
                Ok(None) => {
                    debug!(container = %event.container_id, "container vanished before inspection");
                }
                Err(err) => {
                    warn!(container = %event.container_id, "dropping start event, inspect failed: {err}");
                }
            }
        }
        EventKind::Die => {
            // Best-effort lookup for the log line; the runtime has usually
            // pruned the container already and the delete only needs the id.
            match runtime.inspect_container(&event.container_id).await {
                Ok(Some(record)) => {
                    info!(container = %event.container_id, name = %record.name, "container died");
                }
                Ok(None) | Err(_) => {
                    info!(container = %event.container_id, "container died");
                }
            }
            if let Err(err) = cache.delete_container(&event.container_id).await {
                warn!(container = %event.container_id, "failed to remove dead container: {err}");
            }
        }
        EventKind::Other(action) => {
            debug!(container = %event.container_id, action = %action, "ignoring event");
        }
    }
}

/// True when shutdown fired during the wait.
async fn wait_or_shutdown(shutdown: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        () = shutdown.cancelled() => true,
        () = tokio::time::sleep(delay) => false,
    }
}
