//! Scripted runtime double for sync-loop tests.

use crate::ContainerRuntime;
use async_trait::async_trait;
use futures::stream::BoxStream;
use muster_core::{
    ContainerEvent, ContainerRecord, ContainerSummary, Error, Result, RuntimeVersion,
};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct Script {
    containers: Vec<ContainerRecord>,
    version: RuntimeVersion,
    fail_listing: bool,
    vanished: HashSet<String>,
    fail_inspect: HashSet<String>,
    events_tx: Option<mpsc::Sender<ContainerEvent>>,
}

/// A runtime whose answers are scripted by the test.
///
/// Registered containers back both `list_containers` and
/// `inspect_container`; ids marked vanished still show up in listings but
/// inspect as gone, which is how the real Engine races look. Events pushed
/// through [`StubRuntime::push_event`] arrive on the subscribed stream.
#[derive(Debug, Default)]
pub struct StubRuntime {
    script: Mutex<Script>,
}

impl StubRuntime {
    /// An empty script: no containers, a zero version, no failures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a container as present.
    pub fn add_container(&self, record: ContainerRecord) {
        self.lock().containers.push(record);
    }

    /// Drop a container from the script entirely.
    pub fn remove_container(&self, container_id: &str) {
        self.lock()
            .containers
            .retain(|record| record.id != container_id);
    }

    /// Keep a container in listings but make inspection miss it.
    pub fn vanish_after_listing(&self, container_id: &str) {
        self.lock().vanished.insert(container_id.to_string());
    }

    /// Make inspection of one container fail with a transport error.
    pub fn fail_inspect(&self, container_id: &str) {
        self.lock().fail_inspect.insert(container_id.to_string());
    }

    /// Make every listing fail with a transport error.
    pub fn fail_listing(&self, fail: bool) {
        self.lock().fail_listing = fail;
    }

    /// Script the version answer.
    pub fn set_version(&self, version: RuntimeVersion) {
        self.lock().version = version;
    }

    /// Deliver an event to the active subscriber, if any.
    pub async fn push_event(&self, event: ContainerEvent) {
        let tx = self.lock().events_tx.clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    /// End the active event stream, as the Engine does on restart.
    pub fn close_events(&self) {
        self.lock().events_tx = None;
    }

    /// Whether anything currently holds an event subscription.
    #[must_use]
    pub fn has_subscriber(&self) -> bool {
        self.lock().events_tx.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ContainerRuntime for StubRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let script = self.lock();
        if script.fail_listing {
            return Err(Error::runtime("list_containers", "scripted failure"));
        }
        Ok(script
            .containers
            .iter()
            .map(|record| ContainerSummary {
                id: record.id.clone(),
                name: Some(record.name.clone()),
                image: Some(record.image.clone()),
                state: Some(record.state.status.clone()),
            })
            .collect())
    }

    async fn inspect_container(&self, container_id: &str) -> Result<Option<ContainerRecord>> {
        let script = self.lock();
        if script.fail_inspect.contains(container_id) {
            return Err(Error::runtime("inspect_container", "scripted failure"));
        }
        if script.vanished.contains(container_id) {
            return Ok(None);
        }
        Ok(script
            .containers
            .iter()
            .find(|record| record.id == container_id)
            .cloned())
    }

    async fn version(&self) -> Result<RuntimeVersion> {
        Ok(self.lock().version.clone())
    }

    async fn subscribe_events(&self) -> Result<BoxStream<'static, ContainerEvent>> {
        let (tx, rx) = mpsc::channel(16);
        self.lock().events_tx = Some(tx);
        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })))
    }
}
