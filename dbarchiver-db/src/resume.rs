use mysql_async::prelude::*;
use mysql_async::{Pool, Row};

use crate::value::PkValue;

/// Status of a job's last-known run, persisted in the `dbarchiver_jobs`
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> JobStatus {
        match s {
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }
}

/// Persisted checkpoint and status for one job.
#[derive(Debug, Clone)]
pub struct JobState {
    pub job_name: String,
    pub root_table: String,
    pub last_processed_root_pk: Option<PkValue>,
    pub status: JobStatus,
    pub last_error: Option<String>,
}

/// Maintains the `dbarchiver_jobs` (cursor + status) and
/// `dbarchiver_completed` (audit log) tables under the source schema, per
/// spec.md §4.7.
pub struct ResumeStore {
    pool: Pool,
}

impl ResumeStore {
    pub fn new(pool: Pool) -> Self {
        ResumeStore { pool }
    }

    /// Create the two auxiliary tables if absent. Safe to call on every
    /// startup.
    pub async fn initialize(&self) -> Result<(), mysql_async::Error> {
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(
            r"CREATE TABLE IF NOT EXISTS dbarchiver_jobs (
                job_name VARCHAR(255) NOT NULL PRIMARY KEY,
                root_table VARCHAR(255) NOT NULL,
                last_processed_root_pk VARCHAR(255) NULL,
                status VARCHAR(32) NOT NULL DEFAULT 'pending',
                last_error TEXT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            )",
        )
        .await?;
        conn.query_drop(
            r"CREATE TABLE IF NOT EXISTS dbarchiver_completed (
                id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
                job_name VARCHAR(255) NOT NULL,
                root_pk VARCHAR(255) NOT NULL,
                completed_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                INDEX idx_job_name (job_name)
            )",
        )
        .await?;
        Ok(())
    }

    /// Fetch the persisted state for `job`, inserting a fresh `pending` row
    /// if none exists yet.
    pub async fn get_or_create(&self, job: &str, root_table: &str) -> Result<JobState, mysql_async::Error> {
        let mut conn = self.pool.get_conn().await?;
        let row: Option<Row> = conn
            .exec_first(
                "SELECT root_table, last_processed_root_pk, status, last_error FROM dbarchiver_jobs WHERE job_name = ?",
                (job,),
            )
            .await?;

        if let Some(row) = row {
            let root_table: String = row.get("root_table").unwrap_or_default();
            let cursor: Option<String> = row.get("last_processed_root_pk").unwrap_or(None);
            let status: String = row.get("status").unwrap_or_default();
            let last_error: Option<String> = row.get("last_error").unwrap_or(None);
            return Ok(JobState {
                job_name: job.to_string(),
                root_table,
                last_processed_root_pk: cursor.map(PkValue::from_text),
                status: JobStatus::parse(&status),
                last_error,
            });
        }

        conn.exec_drop(
            "INSERT INTO dbarchiver_jobs (job_name, root_table, status) VALUES (?, ?, ?)",
            (job, root_table, JobStatus::Pending.as_str()),
        )
        .await?;

        Ok(JobState {
            job_name: job.to_string(),
            root_table: root_table.to_string(),
            last_processed_root_pk: None,
            status: JobStatus::Pending,
            last_error: None,
        })
    }

    /// Advance the checkpoint. Monotonic by construction: `RootFetcher`
    /// only ever yields root PKs in strictly ascending order within and
    /// across batches, and the orchestrator calls this once per
    /// successfully committed root PK, so callers never move the cursor
    /// backward.
    pub async fn update_checkpoint(&self, job: &str, root_pk: &PkValue) -> Result<(), mysql_async::Error> {
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(
            "UPDATE dbarchiver_jobs SET last_processed_root_pk = ?, status = ? WHERE job_name = ?",
            (root_pk.display(), JobStatus::Running.as_str(), job),
        )
        .await?;
        Ok(())
    }

    pub async fn mark_completed(&self, job: &str, root_pk: &PkValue) -> Result<(), mysql_async::Error> {
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(
            "INSERT INTO dbarchiver_completed (job_name, root_pk) VALUES (?, ?)",
            (job, root_pk.display()),
        )
        .await?;
        conn.exec_drop(
            "UPDATE dbarchiver_jobs SET status = ? WHERE job_name = ?",
            (JobStatus::Completed.as_str(), job),
        )
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, job: &str, err: &str) -> Result<(), mysql_async::Error> {
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(
            "UPDATE dbarchiver_jobs SET status = ?, last_error = ? WHERE job_name = ?",
            (JobStatus::Failed.as_str(), err, job),
        )
        .await?;
        Ok(())
    }

    /// Read-only view used by `dry-run` and status reporting; does not
    /// create a row.
    pub async fn current_state(&self, job: &str) -> Result<Option<JobState>, mysql_async::Error> {
        let mut conn = self.pool.get_conn().await?;
        let row: Option<Row> = conn
            .exec_first(
                "SELECT root_table, last_processed_root_pk, status, last_error FROM dbarchiver_jobs WHERE job_name = ?",
                (job,),
            )
            .await?;
        Ok(row.map(|row| {
            let root_table: String = row.get("root_table").unwrap_or_default();
            let cursor: Option<String> = row.get("last_processed_root_pk").unwrap_or(None);
            let status: String = row.get("status").unwrap_or_default();
            let last_error: Option<String> = row.get("last_error").unwrap_or(None);
            JobState {
                job_name: job.to_string(),
                root_table,
                last_processed_root_pk: cursor.map(PkValue::from_text),
                status: JobStatus::parse(&status),
                last_error,
            }
        }))
    }
}
