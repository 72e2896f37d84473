//! Command-line surface of the muster daemon.

use clap::Parser;
use std::time::Duration;

/// Default store location.
pub const DEFAULT_STORE_URL: &str = "redis://localhost:6379";
/// Default container-runtime socket.
pub const DEFAULT_DOCKER_URL: &str = "unix:///var/run/docker.sock";
/// Default seconds between full sweeps.
pub const DEFAULT_UPDATE_INTERVAL: u64 = 120;

/// Mirror live Docker-container state into a shared Redis.
#[derive(Debug, Parser)]
#[command(name = "muster", version, about, long_about = None)]
pub struct Cli {
    /// Id this host registers under; must be unique across the fleet.
    #[arg(long, env = "MUSTER_ID", default_value_t = default_host_id())]
    pub id: String,

    /// Store URL, `redis://[:password@]host[:port][/db]`.
    #[arg(long, env = "MUSTER_STORE_URL", default_value = DEFAULT_STORE_URL)]
    pub store_url: String,

    /// Container-runtime URL, a `unix://` socket or `tcp://` address.
    #[arg(long, env = "MUSTER_DOCKER_URL", default_value = DEFAULT_DOCKER_URL)]
    pub docker_url: String,

    /// Seconds between full sweeps of the runtime's container list.
    #[arg(long, env = "MUSTER_UPDATE_INTERVAL", default_value_t = DEFAULT_UPDATE_INTERVAL)]
    pub update_interval: u64,

    /// Log level, overridden by `RUST_LOG` when that is set.
    #[arg(long, env = "MUSTER_LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
    pub level: LogLevel,

    /// Emit logs as newline-delimited JSON.
    #[arg(long, env = "MUSTER_LOG_JSON", default_value_t = false)]
    pub json: bool,
}

impl Cli {
    /// The sweep interval as a duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    /// TTL stamped on every store key: one and a half sweep intervals, so
    /// one missed sweep leaves the host visible and two erase it.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.update_interval.saturating_mul(3) / 2)
    }
}

/// Log verbosity choices for `--level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Everything, including per-event chatter.
    Trace,
    /// Per-container decisions.
    Debug,
    /// Loop progress and lifecycle changes.
    Info,
    /// Degraded but running.
    Warn,
    /// Failures only.
    Error,
}

impl LogLevel {
    /// The filter directive this level maps to.
    #[must_use]
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// This machine's identity: `HOSTNAME`, then `/etc/hostname`, then a fixed
/// fallback. Operators running several daemons against one store override it
/// with `--id`.
#[must_use]
pub fn default_host_id() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        let name = name.trim().to_string();
        if !name.is_empty() {
            return name;
        }
    }
    if let Ok(contents) = std::fs::read_to_string("/etc/hostname") {
        let name = contents.trim().to_string();
        if !name.is_empty() {
            return name;
        }
    }
    "localhost".to_string()
}
