//! The sync clock.

use crate::store::Store;
use chrono::Utc;

/// Current time in Unix seconds, preferring the store's clock.
///
/// Heartbeat math compares timestamps written by different machines, so the
/// store's `TIME` answer is the one clock everyone agrees on. Any failure to
/// obtain it (an unreachable server, an unparsable reply) silently falls back
/// to local UTC; a brief skew is better than a failed write path.
pub async fn sync_now<S: Store + ?Sized>(store: &S) -> i64 {
    match store.server_time().await {
        Ok(Some(seconds)) => seconds,
        Ok(None) | Err(_) => Utc::now().timestamp(),
    }
}
