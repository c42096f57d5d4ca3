use std::time::Duration;

use dbarchiver_errors::LockError;
use mysql_async::prelude::*;
use mysql_async::{Conn, Pool};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").unwrap());

/// How long `release()` is allowed to take even if the caller's own
/// cancellation signal has already fired, per spec.md §4.9 ("release uses a
/// fresh, bounded-timeout context").
const RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

fn lock_name(job: &str) -> String {
    format!("archiver:job:{}", UNSAFE_CHARS.replace_all(job, "_"))
}

/// A named MySQL advisory lock (`GET_LOCK`/`RELEASE_LOCK`/`IS_USED_LOCK`),
/// scoped to the connection that acquired it. Dropping or losing the
/// connection releases the lock server-side even if `release()` is never
/// called, which is what makes lock-holder crashes safe.
pub struct AdvisoryLock {
    job: String,
    name: String,
    conn: Option<Conn>,
}

impl AdvisoryLock {
    pub fn new(job: impl Into<String>) -> Self {
        let job = job.into();
        let name = lock_name(&job);
        AdvisoryLock { job, name, conn: None }
    }

    pub fn is_held(&self) -> bool {
        self.conn.is_some()
    }

    /// Non-blocking attempt: `GET_LOCK(name, 0)`.
    pub async fn try_acquire(&mut self, pool: &Pool) -> Result<bool, LockError> {
        self.acquire_with_timeout(pool, 0).await
    }

    /// Block up to `timeout_seconds`, return `false` on timeout rather than
    /// erroring.
    pub async fn acquire(&mut self, pool: &Pool, timeout_seconds: u64) -> Result<bool, LockError> {
        self.acquire_with_timeout(pool, timeout_seconds as i64).await
    }

    /// Like [`Self::acquire`] but fails with [`LockError::Timeout`] instead
    /// of returning `false`.
    pub async fn acquire_or_fail(&mut self, pool: &Pool, short_timeout_seconds: u64) -> Result<(), LockError> {
        let waited = Duration::from_secs(short_timeout_seconds);
        if self.acquire(pool, short_timeout_seconds).await? {
            Ok(())
        } else {
            Err(LockError::Timeout {
                job: self.job.clone(),
                waited,
            })
        }
    }

    async fn acquire_with_timeout(&mut self, pool: &Pool, timeout_seconds: i64) -> Result<bool, LockError> {
        let mut conn = pool.get_conn().await.map_err(|e| LockError::Backend {
            job: self.job.clone(),
            message: e.to_string(),
        })?;

        let got: Option<i8> = conn
            .exec_first("SELECT GET_LOCK(?, ?)", (self.name.as_str(), timeout_seconds))
            .await
            .map_err(|e| LockError::Backend {
                job: self.job.clone(),
                message: e.to_string(),
            })?;

        match got {
            Some(1) => {
                info!(job = %self.job, lock = %self.name, "acquired advisory lock");
                self.conn = Some(conn);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Idempotent: a no-op if the lock isn't held by this instance. Always
    /// drops the held connection even if `RELEASE_LOCK` itself errors, since
    /// the connection-bound lock still goes away when the connection does.
    pub async fn release(&mut self) -> bool {
        let Some(mut conn) = self.conn.take() else {
            return true;
        };
        let result = tokio::time::timeout(
            RELEASE_TIMEOUT,
            conn.exec_first::<Option<i8>, _, _>("SELECT RELEASE_LOCK(?)", (self.name.as_str(),)),
        )
        .await;

        match result {
            Ok(Ok(Some(1))) => true,
            Ok(Ok(_)) => {
                warn!(job = %self.job, "RELEASE_LOCK reported lock not held by this connection");
                false
            }
            Ok(Err(e)) => {
                warn!(job = %self.job, error = %e, "RELEASE_LOCK failed, relying on connection drop");
                false
            }
            Err(_) => {
                warn!(job = %self.job, "RELEASE_LOCK timed out, relying on connection drop");
                false
            }
        }
    }

    /// Run `f` while the lock is held, releasing on every exit path
    /// (success, error, or panic unwinding through `f`).
    pub async fn with_lock<T, E, F, Fut>(
        &mut self,
        pool: &Pool,
        timeout_seconds: u64,
        f: F,
    ) -> Result<Result<T, E>, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.acquire_or_fail(pool, timeout_seconds).await?;
        let result = f().await;
        self.release().await;
        Ok(result)
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        if self.conn.is_some() {
            warn!(job = %self.job, "advisory lock dropped without explicit release; connection teardown will release it server-side");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_unsafe_characters_in_lock_name() {
        assert_eq!(lock_name("nightly cleanup!"), "archiver:job:nightly_cleanup_");
        assert_eq!(lock_name("a-b_c9"), "archiver:job:a-b_c9");
    }
}
