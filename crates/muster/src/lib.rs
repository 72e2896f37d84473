//! muster keeps a live mirror of every container running across a fleet of
//! Docker hosts in one shared Redis, where each key expires unless the
//! owning host keeps refreshing it.
//!
//! Each host runs one daemon with three loops: an event path applying
//! container starts and deaths as they happen, a full sweep reconciling the
//! mirror against the runtime's own list, and a jittered garbage collector
//! dropping hosts that went silent.

/// The daemon's loops.
pub mod agent;
/// Command-line surface.
pub mod cli;
/// Log subscriber setup.
pub mod logging;
