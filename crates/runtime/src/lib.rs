//! Container-runtime clients for muster.
//!
//! The sync loops talk to whatever runs the containers through one narrow
//! trait; [`DockerRuntime`] implements it against the local Docker Engine
//! and [`testing::StubRuntime`] scripts it for tests.

/// Docker Engine implementation.
pub mod docker;
/// Scripted runtime double.
pub mod testing;

use async_trait::async_trait;
use futures::stream::BoxStream;
use muster_core::{ContainerEvent, ContainerRecord, ContainerSummary, Result, RuntimeVersion};

pub use docker::DockerRuntime;

/// What the sync loops need from a container runtime.
///
/// `inspect_container` distinguishes "gone" (`Ok(None)`) from transport
/// failure: listed containers routinely vanish before they can be inspected,
/// and that race is not an error.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List the containers currently running.
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;

    /// Inspect one container. `None` means the runtime no longer knows it.
    async fn inspect_container(&self, container_id: &str) -> Result<Option<ContainerRecord>>;

    /// The runtime's version.
    async fn version(&self) -> Result<RuntimeVersion>;

    /// Subscribe to container lifecycle events.
    ///
    /// The stream ends when the runtime closes it; callers resubscribe.
    async fn subscribe_events(&self) -> Result<BoxStream<'static, ContainerEvent>>;
}
