//! Log subscriber setup.

use crate::cli::LogLevel;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` becomes the default filter.
/// With `json` set, events render as newline-delimited JSON for collectors.
/// Call once, before any loop starts.
pub fn init(level: LogLevel, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
