use std::collections::HashSet;
use std::time::{Duration, Instant};

use dbarchiver_config::{JobConfig, VerificationMethodConfig};
use dbarchiver_errors::{ArchiverError, VerificationMethod};
use dbarchiver_graph::Graph;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::copy::CopyPhase;
use crate::delete::DeletePhase;
use crate::discovery::{Discovery, RecordSet};
use crate::lag::LagMonitor;
use crate::pool::Pools;
use crate::resume::ResumeStore;
use crate::root_fetcher::RootFetcher;
use crate::verify::Verifier;

/// Whether a run copies rows to the destination before deleting them from
/// the source, or only discovers-and-deletes, per spec.md §6's `archive`
/// and `purge` subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Archive,
    Purge,
}

/// The outcome of one `Orchestrator::execute` call, per spec.md §3's "Run
/// result".
#[derive(Debug, Clone)]
pub struct RunResult {
    pub job: String,
    pub duration: Duration,
    pub tables_copied: usize,
    pub tables_deleted: usize,
    pub records_copied: usize,
    pub records_deleted: usize,
    pub success: bool,
    pub cancelled: bool,
    pub errors: Vec<String>,
}

impl RunResult {
    /// The final summary line spec.md §7 requires every run to emit:
    /// duration, counts, success, and on failure every error.
    pub fn summary_line(&self) -> String {
        if self.cancelled {
            return format!("job `{}` cancelled after {:?}", self.job, self.duration);
        }
        if self.success {
            format!(
                "job `{}` succeeded in {:?}: {} table(s)/{} record(s) copied, {} table(s)/{} record(s) deleted",
                self.job,
                self.duration,
                self.tables_copied,
                self.records_copied,
                self.tables_deleted,
                self.records_deleted
            )
        } else {
            format!(
                "job `{}` failed after {:?}: {}",
                self.job,
                self.duration,
                self.errors.join("; ")
            )
        }
    }
}

/// Drives the batch loop and sequences Discovery -> Copy -> Verify ->
/// Delete -> Checkpoint for each root PK, per spec.md §4.2.
///
/// Preconditions (enforced by the caller, not here): the graph has been
/// validated, both database pools are connected, the job's advisory lock is
/// held unless `--force` was passed, and `ResumeStore::initialize` has run.
pub struct Orchestrator {
    graph: Graph,
    job: JobConfig,
    mode: RunMode,
    pools: Pools,
    resume: ResumeStore,
    lag_monitor: Option<LagMonitor>,
}

impl Orchestrator {
    pub fn new(
        graph: Graph,
        job: JobConfig,
        mode: RunMode,
        pools: Pools,
        resume: ResumeStore,
        lag_monitor: Option<LagMonitor>,
    ) -> Self {
        Orchestrator {
            graph,
            job,
            mode,
            pools,
            resume,
            lag_monitor,
        }
    }

    pub async fn execute(&self, cancel: CancellationToken) -> Result<RunResult, ArchiverError> {
        let started = Instant::now();
        let job_name = self.job.name.clone();

        let job_state = self
            .resume
            .get_or_create(&job_name, &self.job.root_table)
            .await?;

        let mut fetcher = RootFetcher::new(
            self.pools.source.clone(),
            self.job.root_table.clone(),
            self.job.primary_key.clone(),
            self.job.predicate.clone(),
            self.job.batch_size,
            job_state.last_processed_root_pk,
        );

        let discovery = Discovery::new(self.pools.source.clone(), self.job.discovery_chunk_size);
        let copy_phase = CopyPhase::new(
            self.pools.source.clone(),
            self.pools.destination.clone(),
            self.job.batch_size,
        );
        let verifier = Verifier::new(
            self.pools.source.clone(),
            self.pools.destination.clone(),
            self.job.verification_chunk_size,
        );
        let delete_phase = DeletePhase::new(self.pools.source.clone(), self.job.batch_delete_size);
        let verification_method = verification_method(self.job.verification_method);

        let mut tables_copied = HashSet::new();
        let mut tables_deleted = HashSet::new();
        let mut records_copied = 0usize;
        let mut records_deleted = 0usize;

        'batches: loop {
            if cancel.is_cancelled() {
                return Ok(self.cancelled_result(&job_name, started, tables_copied, tables_deleted, records_copied, records_deleted));
            }

            let batch = fetcher.next_batch().await?;
            if batch.is_empty() {
                break;
            }

            for root_pk in batch {
                if cancel.is_cancelled() {
                    break 'batches;
                }

                if self.mode == RunMode::Archive {
                    if let Some(lag) = &self.lag_monitor {
                        lag.wait_until_caught_up(&cancel).await;
                    }
                }

                let record_set = match discovery.discover(&self.graph, vec![root_pk.clone()]).await {
                    Ok(rs) => rs,
                    Err(e) => return self.fail(&job_name, e.into()).await,
                };

                if self.mode == RunMode::Archive {
                    match copy_phase.copy(&self.graph, &record_set).await {
                        Ok(stats) => {
                            records_copied += stats.records_copied;
                            tables_copied.extend(touched_tables(&record_set));
                        }
                        Err(e) => return self.fail(&job_name, e.into()).await,
                    }

                    if !matches!(verification_method, VerificationMethod::Skip) {
                        if let Err(mismatch) = verifier.verify(&self.graph, &record_set, verification_method).await {
                            return self.fail(&job_name, mismatch.into()).await;
                        }
                    }
                }

                match delete_phase.delete(&self.graph, &record_set).await {
                    Ok(stats) => {
                        records_deleted += stats.records_deleted;
                        tables_deleted.extend(touched_tables(&record_set));
                    }
                    Err(e) => return self.fail(&job_name, e.into()).await,
                }

                self.resume.update_checkpoint(&job_name, &root_pk).await?;
                self.resume.mark_completed(&job_name, &root_pk).await?;
                info!(job = %job_name, root_pk = %root_pk, "root PK committed");

                if self.job.sleep_seconds > 0.0 {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs_f64(self.job.sleep_seconds)) => {}
                        _ = cancel.cancelled() => break 'batches,
                    }
                }
            }
        }

        Ok(RunResult {
            job: job_name,
            duration: started.elapsed(),
            tables_copied: tables_copied.len(),
            tables_deleted: tables_deleted.len(),
            records_copied,
            records_deleted,
            success: true,
            cancelled: cancel.is_cancelled(),
            errors: Vec::new(),
        })
    }

    fn cancelled_result(
        &self,
        job_name: &str,
        started: Instant,
        tables_copied: HashSet<String>,
        tables_deleted: HashSet<String>,
        records_copied: usize,
        records_deleted: usize,
    ) -> RunResult {
        RunResult {
            job: job_name.to_string(),
            duration: started.elapsed(),
            tables_copied: tables_copied.len(),
            tables_deleted: tables_deleted.len(),
            records_copied,
            records_deleted,
            success: true,
            cancelled: true,
            errors: Vec::new(),
        }
    }

    /// Persist the failure against the job's resume row (best effort — the
    /// checkpoint itself is left untouched so a restart reprocesses this
    /// root PK) and propagate the error.
    async fn fail(&self, job_name: &str, err: ArchiverError) -> Result<RunResult, ArchiverError> {
        let message = err.to_string();
        if let Err(mark_err) = self.resume.mark_failed(job_name, &message).await {
            warn!(job = %job_name, error = %mark_err, "could not persist failure status");
        }
        Err(err)
    }
}

fn verification_method(method: VerificationMethodConfig) -> VerificationMethod {
    match method {
        VerificationMethodConfig::Count => VerificationMethod::Count,
        VerificationMethodConfig::Sha256 => VerificationMethod::Sha256,
        VerificationMethodConfig::Skip => VerificationMethod::Skip,
    }
}

fn touched_tables(record_set: &RecordSet) -> impl Iterator<Item = String> + '_ {
    record_set
        .by_table
        .iter()
        .filter(|(_, pks)| !pks.is_empty())
        .map(|(table, _)| table.clone())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::discovery::DiscoveryStats;
    use crate::value::PkValue;

    use super::*;

    fn result(cancelled: bool, success: bool, errors: Vec<String>) -> RunResult {
        RunResult {
            job: "nightly_cleanup".to_string(),
            duration: Duration::from_secs(3),
            tables_copied: 2,
            tables_deleted: 2,
            records_copied: 10,
            records_deleted: 10,
            success,
            cancelled,
            errors,
        }
    }

    #[test]
    fn summary_line_reports_cancellation_first() {
        let line = result(true, true, Vec::new()).summary_line();
        assert!(line.contains("cancelled"));
    }

    #[test]
    fn summary_line_reports_success_counts() {
        let line = result(false, true, Vec::new()).summary_line();
        assert!(line.contains("succeeded"));
        assert!(line.contains("2 table(s)/10 record(s) copied"));
    }

    #[test]
    fn summary_line_reports_failure_errors() {
        let line = result(false, false, vec!["boom".to_string()]).summary_line();
        assert!(line.contains("failed"));
        assert!(line.contains("boom"));
    }

    #[test]
    fn verification_method_maps_every_config_variant() {
        assert_eq!(verification_method(VerificationMethodConfig::Count), VerificationMethod::Count);
        assert_eq!(verification_method(VerificationMethodConfig::Sha256), VerificationMethod::Sha256);
        assert_eq!(verification_method(VerificationMethodConfig::Skip), VerificationMethod::Skip);
    }

    #[test]
    fn touched_tables_skips_empty_tables() {
        let mut by_table = HashMap::new();
        by_table.insert("orders".to_string(), vec![PkValue::Int(1)]);
        by_table.insert("empty_table".to_string(), Vec::new());
        let record_set = RecordSet {
            root_pks: vec![PkValue::Int(1)],
            by_table,
            stats: DiscoveryStats::default(),
        };

        let touched: Vec<String> = touched_tables(&record_set).collect();
        assert_eq!(touched, vec!["orders".to_string()]);
    }
}
