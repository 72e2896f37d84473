//! The key namespace and event vocabulary shared with every fleet consumer.
//!
//! Everything muster writes lives under one prefix so that a single `SCAN`
//! pattern (or an unrelated application sharing the server) can tell muster's
//! keys apart. Consumers build the same keys from the same host and container
//! ids, so the layout here is a wire contract: changing it strands every
//! reader in the fleet.

/// Prefix under which every muster key lives.
pub const CACHE_PREFIX: &str = "docker";

/// Pub/sub channel carrying every lifecycle event.
pub const EVENTS_CHANNEL: &str = "docker_events";

/// Event published when a host announces itself after connecting.
pub const EVENT_NEW_HOST: &str = "new_host";
/// Event published when the event path registers a started container.
pub const EVENT_NEW_CONTAINER: &str = "new_container";
/// Event published when the event path removes a dead container.
pub const EVENT_DELETE_CONTAINER: &str = "delete_container";
/// Event published when a full sweep replaces a host's container list.
pub const EVENT_REFRESH_CONTAINERS: &str = "refresh_containers";
/// Event published when garbage collection drops a silent host.
pub const EVENT_EXPIRED_HOST: &str = "expired_host";

/// Key of the set holding every live host id.
#[must_use]
pub fn hosts() -> String {
    format!("{CACHE_PREFIX}:hosts")
}

/// Key of one host's record hash.
#[must_use]
pub fn host(host_id: &str) -> String {
    format!("{CACHE_PREFIX}:hosts:{host_id}")
}

/// Key of the set of container ids one host is running.
#[must_use]
pub fn host_containers(host_id: &str) -> String {
    format!("{CACHE_PREFIX}:hosts:{host_id}:containers")
}

/// Key of one container's flattened field hash.
#[must_use]
pub fn container(container_id: &str) -> String {
    format!("{CACHE_PREFIX}:containers:{container_id}")
}

/// Key of one container's serialized record blob.
#[must_use]
pub fn container_blob(container_id: &str) -> String {
    format!("{CACHE_PREFIX}:containers:{container_id}:json")
}
