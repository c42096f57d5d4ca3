use std::future::Future;
use std::time::Duration;

use dbarchiver_errors::TransientDbError;
use exponential_backoff::Backoff;
use mysql_async::Error as MysqlError;
use tracing::warn;

/// 3 attempts, doubling from 1s, per spec.md §7
/// ("bounded exponential backoff (e.g., 3 attempts doubling from 1s)").
const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(8);

/// Run `op` up to [`MAX_ATTEMPTS`] times, retrying only on errors that look
/// transient (connection-level failures). The last error is returned as a
/// [`TransientDbError`] once attempts are exhausted.
pub async fn with_retry<T, F, Fut>(op_name: &str, mut op: F) -> Result<T, TransientDbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MysqlError>>,
{
    let backoff = Backoff::new(MAX_ATTEMPTS, BASE_DELAY, MAX_DELAY);
    let mut attempt = 0u32;
    let mut last_err: Option<MysqlError> = None;

    for delay in backoff.into_iter().take(MAX_ATTEMPTS as usize) {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if !is_transient(&e) => {
                return Err(TransientDbError {
                    attempts: attempt,
                    message: e.to_string(),
                })
            }
            Err(e) => {
                warn!(attempt, %op_name, error = %e, "transient database error, retrying");
                last_err = Some(e);
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(TransientDbError {
        attempts: attempt,
        message: last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "exhausted retries".to_string()),
    })
}

/// Heuristic for which `mysql_async::Error`s are worth retrying: anything
/// below the SQL-server level (connection drops, IO errors, driver-level
/// timeouts). A server-reported SQL error (bad syntax, constraint
/// violation) is never transient.
fn is_transient(err: &MysqlError) -> bool {
    !matches!(err, MysqlError::Server(_) | MysqlError::Driver(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_op_succeeds_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, TransientDbError> = with_retry("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7u32)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_on_io_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TransientDbError> = with_retry("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(MysqlError::Io(mysql_async::IoError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "boom",
            ))))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
