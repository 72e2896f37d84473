//! Flattening codec: one store hash field per declared record field.
//!
//! Consumers that cannot afford to parse the full JSON blob read individual
//! hash fields instead, so every record shape spells out its schema here.
//! Scalars render as plain strings (bools as `true`/`false`), nested
//! sub-records contribute their fields under a `<name>_` prefix, and list- or
//! map-valued fields collapse into a single JSON-encoded value. Output is a
//! `BTreeMap`, which keeps field order deterministic and rewrites idempotent.

use crate::record::{ContainerConfig, ContainerNetwork, ContainerRecord, ContainerState};
use serde::Serialize;
use std::collections::BTreeMap;

/// Types that can spread themselves into flat string fields.
pub trait Flatten {
    /// Write this record's fields into `out`, each key prefixed with `prefix`.
    fn flatten_into(&self, prefix: &str, out: &mut BTreeMap<String, String>);

    /// Flatten into a fresh map with no prefix.
    #[must_use]
    fn flatten(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        self.flatten_into("", &mut out);
        out
    }
}

fn put(out: &mut BTreeMap<String, String>, prefix: &str, key: &str, value: String) {
    out.insert(format!("{prefix}{key}"), value);
}

/// JSON-encode a list or mapping field. An encoding failure drops that field
/// only; the rest of the record still flattens.
fn put_json<T: Serialize>(out: &mut BTreeMap<String, String>, prefix: &str, key: &str, value: &T) {
    if let Ok(encoded) = serde_json::to_string(value) {
        put(out, prefix, key, encoded);
    }
}

impl Flatten for ContainerRecord {
    fn flatten_into(&self, prefix: &str, out: &mut BTreeMap<String, String>) {
        put(out, prefix, "id", self.id.clone());
        put(out, prefix, "name", self.name.clone());
        put(out, prefix, "image", self.image.clone());
        put(out, prefix, "created", self.created.clone());
        put(out, prefix, "path", self.path.clone());
        put_json(out, prefix, "args", &self.args);
        put(out, prefix, "restart_count", self.restart_count.to_string());
        put(out, prefix, "driver", self.driver.clone());
        self.config.flatten_into(&format!("{prefix}config_"), out);
        self.state.flatten_into(&format!("{prefix}state_"), out);
        self.network.flatten_into(&format!("{prefix}network_"), out);
    }
}

impl Flatten for ContainerConfig {
    fn flatten_into(&self, prefix: &str, out: &mut BTreeMap<String, String>) {
        put(out, prefix, "hostname", self.hostname.clone());
        put(out, prefix, "user", self.user.clone());
        put(out, prefix, "image", self.image.clone());
        put(out, prefix, "working_dir", self.working_dir.clone());
        put(out, prefix, "tty", self.tty.to_string());
        put_json(out, prefix, "env", &self.env);
        put_json(out, prefix, "cmd", &self.cmd);
        put_json(out, prefix, "entrypoint", &self.entrypoint);
        put_json(out, prefix, "labels", &self.labels);
    }
}

impl Flatten for ContainerState {
    fn flatten_into(&self, prefix: &str, out: &mut BTreeMap<String, String>) {
        put(out, prefix, "status", self.status.clone());
        put(out, prefix, "running", self.running.to_string());
        put(out, prefix, "paused", self.paused.to_string());
        put(out, prefix, "restarting", self.restarting.to_string());
        put(out, prefix, "oom_killed", self.oom_killed.to_string());
        put(out, prefix, "pid", self.pid.to_string());
        put(out, prefix, "exit_code", self.exit_code.to_string());
        put(out, prefix, "started_at", self.started_at.clone());
        put(out, prefix, "finished_at", self.finished_at.clone());
    }
}

impl Flatten for ContainerNetwork {
    fn flatten_into(&self, prefix: &str, out: &mut BTreeMap<String, String>) {
        put(out, prefix, "ip_address", self.ip_address.clone());
        put(out, prefix, "ip_prefix_len", self.ip_prefix_len.to_string());
        put(out, prefix, "gateway", self.gateway.clone());
        put(out, prefix, "bridge", self.bridge.clone());
        put(out, prefix, "mac_address", self.mac_address.clone());
        put_json(out, prefix, "ports", &self.ports);
    }
}
