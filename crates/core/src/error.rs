//! Error taxonomy for the muster crates.
//!
//! The classes map one-to-one onto how the daemon reacts: `Connection` is
//! fatal during startup, `Store` abandons the operation that was in flight,
//! `Runtime` skips the current cycle or event, and `MalformedRecord` skips a
//! single host during garbage collection.

use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced by the muster crates.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The store could not be reached, selected, or authenticated at startup.
    #[error("store connection failed: {message}")]
    #[diagnostic(
        code(muster::store::connection),
        help("check the store URL, credentials, and that the server is reachable")
    )]
    Connection {
        /// What went wrong while establishing the connection.
        message: String,
    },

    /// A store command failed after the connection was established.
    #[error("store operation `{operation}` failed: {message}")]
    #[diagnostic(code(muster::store::command))]
    Store {
        /// The store command or transaction that failed.
        operation: &'static str,
        /// The backend's description of the failure.
        message: String,
    },

    /// A container-runtime query failed.
    #[error("runtime query `{operation}` failed: {message}")]
    #[diagnostic(code(muster::runtime::query))]
    Runtime {
        /// The runtime call that failed.
        operation: &'static str,
        /// The client's description of the failure.
        message: String,
    },

    /// A stored record carried a field this version cannot read.
    #[error("malformed record `{key}`: field `{field}` is unreadable")]
    #[diagnostic(
        code(muster::record::malformed),
        help("another writer may be running an incompatible version")
    )]
    MalformedRecord {
        /// Store key of the offending record.
        key: String,
        /// Field that failed to parse.
        field: String,
    },

    /// JSON encoding or decoding of a record failed.
    #[error("record serialization failed: {message}")]
    #[diagnostic(code(muster::record::codec))]
    Codec {
        /// The serializer's description of the failure.
        message: String,
    },
}

impl Error {
    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a transient store error for a named operation.
    #[must_use]
    pub fn store(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Store {
            operation,
            message: message.into(),
        }
    }

    /// Create a runtime query error for a named call.
    #[must_use]
    pub fn runtime(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Runtime {
            operation,
            message: message.into(),
        }
    }

    /// Create a malformed-record error for one field of one key.
    #[must_use]
    pub fn malformed(key: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MalformedRecord {
            key: key.into(),
            field: field.into(),
        }
    }

    /// Create a codec error.
    #[must_use]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }
}

/// Result type alias for muster operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_operation() {
        let err = Error::store("hset", "connection reset");
        assert_eq!(
            err.to_string(),
            "store operation `hset` failed: connection reset"
        );
    }

    #[test]
    fn test_malformed_record_names_key_and_field() {
        let err = Error::malformed("docker:hosts:web-1", "last_update");
        let rendered = err.to_string();
        assert!(rendered.contains("docker:hosts:web-1"));
        assert!(rendered.contains("last_update"));
    }
}
