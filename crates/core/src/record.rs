//! Container and host records as they are mirrored into the store.
//!
//! `ContainerRecord` is the full inspection result a host writes for each of
//! its containers; it lands in the store twice, once flattened into hash
//! fields and once as a JSON blob. The remaining types are the listing entry,
//! the host-hash view read back by consumers, the runtime version triple, and
//! the lifecycle events the sync loop reacts to.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One entry from the runtime's container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Container id as reported by the runtime.
    pub id: String,
    /// Primary name, if one was assigned.
    pub name: Option<String>,
    /// Image the container was created from.
    pub image: Option<String>,
    /// Coarse lifecycle state, e.g. `running`.
    pub state: Option<String>,
}

/// Full inspection record for one container.
///
/// Absent runtime values surface as their zero values rather than options so
/// every declared field always reaches the store, the same way the original
/// wire format behaved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Container id.
    pub id: String,
    /// Container name without the runtime's leading slash.
    pub name: String,
    /// Image reference the container runs.
    pub image: String,
    /// Creation timestamp as reported by the runtime (RFC 3339).
    pub created: String,
    /// Binary the container was started with.
    pub path: String,
    /// Arguments passed to that binary.
    pub args: Vec<String>,
    /// How many times the runtime restarted this container.
    pub restart_count: i64,
    /// Storage driver backing the container.
    pub driver: String,
    /// Creation-time configuration.
    pub config: ContainerConfig,
    /// Current lifecycle state.
    pub state: ContainerState,
    /// Network attachment details.
    pub network: ContainerNetwork,
}

impl ContainerRecord {
    /// Serialize the full record for the `:json` blob key.
    pub fn to_blob(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|err| Error::codec(err.to_string()))
    }

    /// Parse a record back out of a stored blob.
    pub fn from_blob(blob: &str) -> Result<Self> {
        serde_json::from_str(blob).map_err(|err| Error::codec(err.to_string()))
    }
}

/// Creation-time configuration of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Hostname inside the container.
    pub hostname: String,
    /// User the main process runs as.
    pub user: String,
    /// Image reference from the container's config.
    pub image: String,
    /// Working directory of the main process.
    pub working_dir: String,
    /// Whether a TTY is allocated.
    pub tty: bool,
    /// Environment in `KEY=value` form.
    pub env: Vec<String>,
    /// Command the container runs.
    pub cmd: Vec<String>,
    /// Entrypoint, when overridden.
    pub entrypoint: Vec<String>,
    /// Labels attached to the container.
    pub labels: BTreeMap<String, String>,
}

/// Lifecycle state of a container at inspection time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    /// Runtime status string, e.g. `running` or `exited`.
    pub status: String,
    /// Whether the main process is currently running.
    pub running: bool,
    /// Whether the container is paused.
    pub paused: bool,
    /// Whether the container is mid-restart.
    pub restarting: bool,
    /// Whether the kernel OOM-killed the main process.
    pub oom_killed: bool,
    /// Host pid of the main process, 0 when stopped.
    pub pid: i64,
    /// Exit code of the last run.
    pub exit_code: i64,
    /// When the container last started (RFC 3339).
    pub started_at: String,
    /// When the container last stopped (RFC 3339).
    pub finished_at: String,
}

/// Network attachment details of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerNetwork {
    /// Address on the default bridge network.
    pub ip_address: String,
    /// Prefix length of that address.
    pub ip_prefix_len: i64,
    /// Gateway address.
    pub gateway: String,
    /// Bridge interface name.
    pub bridge: String,
    /// MAC address.
    pub mac_address: String,
    /// Published ports, container port spec to host bindings.
    pub ports: BTreeMap<String, Vec<String>>,
}

/// Lenient view of a host hash read back from the store.
///
/// Consumers tolerate records written by other versions: missing or garbled
/// numeric fields parse to `None` instead of failing the whole listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostRecord {
    /// Host id, unique per fleet.
    pub id: String,
    /// Heartbeat timestamp in Unix seconds.
    pub last_update: Option<i64>,
    /// Declared refresh window in seconds.
    pub update_interval: Option<i64>,
    /// Containers the host believes it is running.
    pub containers_running: Option<i64>,
    /// Runtime version string the host reported.
    pub docker_version: Option<String>,
    /// Ad-hoc fields written alongside the well-known ones.
    pub extra: BTreeMap<String, String>,
}

impl HostRecord {
    /// Build a view from raw hash fields, parsing the well-known ones.
    #[must_use]
    pub fn from_fields(id: impl Into<String>, mut fields: BTreeMap<String, String>) -> Self {
        let last_update = fields.remove("last_update").and_then(|v| v.parse().ok());
        let update_interval = fields.remove("update_interval").and_then(|v| v.parse().ok());
        let containers_running = fields
            .remove("containers_running")
            .and_then(|v| v.parse().ok());
        let docker_version = fields.remove("docker_version");
        Self {
            id: id.into(),
            last_update,
            update_interval,
            containers_running,
            docker_version,
            extra: fields,
        }
    }
}

/// Version triple reported by the container runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeVersion {
    /// Runtime release version.
    pub version: String,
    /// Git commit the runtime was built from.
    pub git_commit: String,
    /// Toolchain or platform the runtime was built with.
    pub platform: String,
}

impl fmt::Display for RuntimeVersion {
    /// Renders the host-field form, `<version>;git-<commit>;<platform>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};git-{};{}", self.version, self.git_commit, self.platform)
    }
}

/// Lifecycle event emitted by the container runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    /// What happened.
    pub kind: EventKind,
    /// Which container it happened to.
    pub container_id: String,
}

/// Classification of runtime lifecycle actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Container started.
    Start,
    /// Container restarted.
    Restart,
    /// Container stopped or was killed.
    Die,
    /// Any other action; the sync loop ignores these.
    Other(String),
}

impl EventKind {
    /// Classify a runtime action string.
    #[must_use]
    pub fn from_action(action: &str) -> Self {
        match action {
            "start" => Self::Start,
            "restart" => Self::Restart,
            "die" => Self::Die,
            other => Self::Other(other.to_string()),
        }
    }
}
