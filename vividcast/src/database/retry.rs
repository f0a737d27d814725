//! SQLITE_BUSY handling for write-path operations.
//!
//! The serialized write pool keeps lock contention rare, but WAL
//! checkpoints and external readers can still surface SQLITE_BUSY (code 5)
//! or SQLITE_LOCKED (code 6). Writes wrap themselves in `with_busy_retry`,
//! which backs off exponentially with jitter instead of bubbling the error
//! straight up.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::{Error, Result};

const MAX_ATTEMPTS: u32 = 12;
const BASE_DELAY: Duration = Duration::from_millis(10);
const DELAY_CEILING: Duration = Duration::from_millis(2000);

fn is_busy(err: &Error) -> bool {
    let Error::DatabaseSqlx(source) = err else {
        return false;
    };
    if let sqlx::Error::Database(db_err) = source {
        if matches!(db_err.code().as_deref(), Some("5") | Some("6")) {
            return true;
        }
        let message = db_err.message().to_ascii_lowercase();
        return message.contains("database is locked") || message.contains("database is busy");
    }
    source.to_string().to_ascii_lowercase().contains("database is locked")
}

/// Run `op`, retrying while it fails with a busy/locked SQLite error.
///
/// The delay doubles per attempt up to a ceiling, with up to 25% random
/// jitter added so contending writers do not reawaken in lockstep.
pub async fn with_busy_retry<T, F, Fut>(op_name: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = BASE_DELAY;
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= MAX_ATTEMPTS || !is_busy(&err) {
                    return Err(err);
                }
                let jitter_cap = (delay.as_millis() as u64 / 4).max(1);
                let backoff = delay + Duration::from_millis(rand::random_range(0..=jitter_cap));
                debug!(
                    op_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "write contended, backing off"
                );
                tokio::time::sleep(backoff).await;
                delay = (delay * 2).min(DELAY_CEILING);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_non_busy_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_busy_retry("test_op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Database("corrupt page".to_string()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_passes_straight_through() {
        let value = with_busy_retry("test_op", || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
