//! Core building blocks shared by every muster crate.
//!
//! This crate is deliberately I/O-free: it defines the records a host mirrors
//! into the shared store, the flattening codec that turns them into hash
//! fields, and the error taxonomy the rest of the workspace maps its failures
//! onto.

/// Error taxonomy and the shared `Result` alias.
pub mod error;
/// Flattening codec for store hash fields.
pub mod flatten;
/// Container, host, version, and event records.
pub mod record;

pub use error::{Error, Result};
pub use flatten::Flatten;
pub use record::{
    ContainerConfig, ContainerEvent, ContainerNetwork, ContainerRecord, ContainerState,
    ContainerSummary, EventKind, HostRecord, RuntimeVersion,
};
