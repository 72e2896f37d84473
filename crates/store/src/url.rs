//! Store URL parsing.

use muster_core::{Error, Result};
use secrecy::SecretString;
use url::Url;

/// Port assumed when the URL does not name one.
pub const DEFAULT_PORT: u16 = 6379;

/// Validated location of the shared store.
///
/// Parsed from `redis://[:password@]host[:port][/db]`. The database index
/// rides in the path; a path that is present but not a number is rejected
/// here rather than silently landing every write in database 0.
#[derive(Debug, Clone)]
pub struct StoreUrl {
    /// Host the store listens on.
    pub host: String,
    /// Port the store listens on.
    pub port: u16,
    /// Database index selected after connecting.
    pub db: i64,
    /// `AUTH` credential taken from the URL's password slot.
    pub password: Option<SecretString>,
}

impl StoreUrl {
    /// Parse and validate a store URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when the string is not a URL, the scheme
    /// is not `redis`, the host is missing, or the database path segment is
    /// not an integer.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)
            .map_err(|err| Error::connection(format!("invalid store URL `{raw}`: {err}")))?;

        if url.scheme() != "redis" {
            return Err(Error::connection(format!(
                "unsupported store scheme `{}`, expected `redis`",
                url.scheme()
            )));
        }

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(Error::connection("store URL is missing a host")),
        };
        let port = url.port().unwrap_or(DEFAULT_PORT);

        let db = match url.path().trim_start_matches('/') {
            "" => 0,
            segment => segment.parse::<i64>().map_err(|_| {
                Error::connection(format!(
                    "store URL database index `{segment}` is not a number"
                ))
            })?,
        };

        let password = url
            .password()
            .filter(|password| !password.is_empty())
            .map(|password| SecretString::from(password.to_string()));

        Ok(Self {
            host,
            port,
            db,
            password,
        })
    }
}
