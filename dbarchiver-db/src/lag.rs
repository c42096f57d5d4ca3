use std::time::Duration;

use mysql_async::prelude::*;
use mysql_async::{Pool, Row};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often to re-poll the replica while waiting for lag to drop, and how
/// long to wait in total before giving up and letting the batch proceed
/// anyway — this throttle is a best-effort courtesy to the replica, not a
/// correctness gate, so it never blocks a run forever.
const POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_WAIT: Duration = Duration::from_secs(300);

/// Polls a replica's replication lag before each batch and blocks (subject
/// to cancellation) until it drops at or below a configured threshold, per
/// spec.md §4/§5's optional lag throttle.
///
/// The exact lag metric is implementation-defined (spec.md §9): this reads
/// `Seconds_Behind_Master` from `SHOW SLAVE STATUS`, the classic MySQL
/// replication metric. A `NULL` value (replication stopped, or the server
/// isn't a replica) is treated as "lag unknown" and does not block.
pub struct LagMonitor {
    pool: Pool,
    threshold: Duration,
}

impl LagMonitor {
    pub fn new(pool: Pool, threshold_seconds: f64) -> Self {
        LagMonitor {
            pool,
            threshold: Duration::from_secs_f64(threshold_seconds.max(0.0)),
        }
    }

    /// Returns `None` if the replica reports no lag value (not replicating,
    /// or `Seconds_Behind_Master` is `NULL`).
    pub async fn current_lag(&self) -> Result<Option<Duration>, mysql_async::Error> {
        let mut conn = self.pool.get_conn().await?;
        let row: Option<Row> = conn.query_first("SHOW SLAVE STATUS").await?;
        let Some(row) = row else { return Ok(None) };
        let seconds: Option<i64> = row.get("Seconds_Behind_Master").unwrap_or(None);
        Ok(seconds.map(|s| Duration::from_secs(s.max(0) as u64)))
    }

    /// Block until lag is within threshold, cancellation fires, or
    /// [`MAX_WAIT`] elapses (in which case the batch proceeds anyway with a
    /// warning logged).
    pub async fn wait_until_caught_up(&self, cancel: &CancellationToken) {
        let deadline = tokio::time::Instant::now() + MAX_WAIT;

        loop {
            if cancel.is_cancelled() {
                return;
            }

            match self.current_lag().await {
                Ok(Some(lag)) if lag <= self.threshold => return,
                Ok(Some(lag)) => {
                    info!(?lag, threshold = ?self.threshold, "replica lag above threshold, waiting");
                }
                Ok(None) => return,
                Err(e) => {
                    warn!(error = %e, "could not read replica lag, proceeding without waiting");
                    return;
                }
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(max_wait = ?MAX_WAIT, "gave up waiting for replica lag to drop, proceeding anyway");
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_seconds_is_floored_at_zero() {
        let pool = Pool::new("mysql://root@localhost:3306/test");
        let monitor = LagMonitor::new(pool, -5.0);
        assert_eq!(monitor.threshold, Duration::from_secs(0));
    }

    #[tokio::test]
    async fn cancelled_token_returns_immediately() {
        let pool = Pool::new("mysql://root@localhost:3306/test");
        let monitor = LagMonitor::new(pool, 10.0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        // Must not attempt to connect: a cancelled token short-circuits
        // before the first `current_lag` call.
        tokio::time::timeout(Duration::from_millis(200), monitor.wait_until_caught_up(&cancel))
            .await
            .expect("wait_until_caught_up should return promptly when already cancelled");
    }
}
