//! Docker Engine client behind the [`ContainerRuntime`] trait.
//!
//! The Engine API models arrive with every field optional; the mapping here
//! collapses them onto muster's records, where absent values surface as
//! their zero values so every written record carries the full field set.

use crate::ContainerRuntime;
use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::system::EventsOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::stream::BoxStream;
use futures::StreamExt;
use muster_core::{
    ContainerConfig, ContainerEvent, ContainerNetwork, ContainerRecord, ContainerState,
    ContainerSummary, Error, EventKind, Result, RuntimeVersion,
};
use std::collections::{BTreeMap, HashMap};
use std::pin::pin;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Seconds bollard waits on any one Engine API call.
const API_TIMEOUT_SECS: u64 = 120;
/// Events buffered between the Engine stream and a slow consumer.
const EVENT_BUFFER: usize = 64;

/// Client for the local Docker Engine.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the Engine at `url`: a `unix://` socket path or a
    /// `tcp://` / `http://` address.
    ///
    /// Construction only validates the target; the first API call surfaces
    /// an unreachable daemon.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] when the URL is not a usable target.
    pub fn connect(url: &str) -> Result<Self> {
        let docker = if url.starts_with("unix://") {
            Docker::connect_with_socket(url, API_TIMEOUT_SECS, API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_http(url, API_TIMEOUT_SECS, API_DEFAULT_VERSION)
        }
        .map_err(|err| Error::runtime("connect", err.to_string()))?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..ListContainersOptions::default()
        };
        let listed = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|err| Error::runtime("list_containers", err.to_string()))?;
        Ok(listed.into_iter().filter_map(summary_from).collect())
    }

    async fn inspect_container(&self, container_id: &str) -> Result<Option<ContainerRecord>> {
        match self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(response) => Ok(Some(record_from(response))),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(err) => Err(Error::runtime("inspect_container", err.to_string())),
        }
    }

    async fn version(&self) -> Result<RuntimeVersion> {
        let version = self
            .docker
            .version()
            .await
            .map_err(|err| Error::runtime("version", err.to_string()))?;
        Ok(RuntimeVersion {
            version: version.version.unwrap_or_default(),
            git_commit: version.git_commit.unwrap_or_default(),
            platform: version.go_version.unwrap_or_default(),
        })
    }

    async fn subscribe_events(&self) -> Result<BoxStream<'static, ContainerEvent>> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        let options = EventsOptions::<String> {
            since: None,
            until: None,
            filters,
        };

        let docker = self.docker.clone();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(async move {
            let mut events = pin!(docker.events(Some(options)));
            while let Some(message) = events.next().await {
                match message {
                    Ok(message) => {
                        if let Some(event) = event_from(message) {
                            if tx.send(event).await.is_err() {
                                // Subscriber went away.
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        warn!("event stream failed: {err}");
                        return;
                    }
                }
            }
            debug!("event stream closed by the runtime");
        });

        // Ends when the forwarder drops its sender.
        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })))
    }
}

fn summary_from(entry: bollard::models::ContainerSummary) -> Option<ContainerSummary> {
    let id = entry.id?;
    let name = entry
        .names
        .and_then(|names| names.into_iter().next())
        .map(|name| name.trim_start_matches('/').to_string());
    Some(ContainerSummary {
        id,
        name,
        image: entry.image,
        state: entry.state,
    })
}

fn record_from(response: bollard::models::ContainerInspectResponse) -> ContainerRecord {
    ContainerRecord {
        id: response.id.unwrap_or_default(),
        // The Engine reports names with a leading slash.
        name: response
            .name
            .map(|name| name.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        image: response.image.unwrap_or_default(),
        created: response.created.unwrap_or_default(),
        path: response.path.unwrap_or_default(),
        args: response.args.unwrap_or_default(),
        restart_count: response.restart_count.unwrap_or_default(),
        driver: response.driver.unwrap_or_default(),
        config: response.config.map(config_from).unwrap_or_default(),
        state: response.state.map(state_from).unwrap_or_default(),
        network: response
            .network_settings
            .map(network_from)
            .unwrap_or_default(),
    }
}

fn config_from(config: bollard::models::ContainerConfig) -> ContainerConfig {
    ContainerConfig {
        hostname: config.hostname.unwrap_or_default(),
        user: config.user.unwrap_or_default(),
        image: config.image.unwrap_or_default(),
        working_dir: config.working_dir.unwrap_or_default(),
        tty: config.tty.unwrap_or_default(),
        env: config.env.unwrap_or_default(),
        cmd: config.cmd.unwrap_or_default(),
        entrypoint: config.entrypoint.unwrap_or_default(),
        labels: config
            .labels
            .map(|labels| labels.into_iter().collect())
            .unwrap_or_default(),
    }
}

fn state_from(state: bollard::models::ContainerState) -> ContainerState {
    ContainerState {
        status: state
            .status
            .map(|status| status.to_string())
            .unwrap_or_default(),
        running: state.running.unwrap_or_default(),
        paused: state.paused.unwrap_or_default(),
        restarting: state.restarting.unwrap_or_default(),
        oom_killed: state.oom_killed.unwrap_or_default(),
        pid: state.pid.unwrap_or_default(),
        exit_code: state.exit_code.unwrap_or_default(),
        started_at: state.started_at.unwrap_or_default(),
        finished_at: state.finished_at.unwrap_or_default(),
    }
}

fn network_from(settings: bollard::models::NetworkSettings) -> ContainerNetwork {
    ContainerNetwork {
        ip_address: settings.ip_address.unwrap_or_default(),
        ip_prefix_len: settings.ip_prefix_len.unwrap_or_default(),
        gateway: settings.gateway.unwrap_or_default(),
        bridge: settings.bridge.unwrap_or_default(),
        mac_address: settings.mac_address.unwrap_or_default(),
        ports: settings.ports.map(ports_from).unwrap_or_default(),
    }
}

/// Render a port map as `spec -> ["host_ip:host_port", ..]`, with unbound
/// specs mapping to an empty list.
fn ports_from(ports: bollard::models::PortMap) -> BTreeMap<String, Vec<String>> {
    ports
        .into_iter()
        .map(|(spec, bindings)| {
            let mut rendered: Vec<String> = bindings
                .unwrap_or_default()
                .into_iter()
                .map(|binding| {
                    format!(
                        "{}:{}",
                        binding.host_ip.unwrap_or_default(),
                        binding.host_port.unwrap_or_default()
                    )
                })
                .collect();
            rendered.sort();
            (spec, rendered)
        })
        .collect()
}

fn event_from(message: bollard::models::EventMessage) -> Option<ContainerEvent> {
    let action = message.action?;
    let container_id = message.actor.and_then(|actor| actor.id)?;
    Some(ContainerEvent {
        kind: EventKind::from_action(&action),
        container_id,
    })
}
