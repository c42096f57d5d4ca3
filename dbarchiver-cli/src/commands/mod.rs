pub mod archive;
pub mod dry_run;
pub mod list_jobs;
pub mod plan;
pub mod purge;
pub mod validate;

use dbarchiver_config::{Config, JobConfig};
use dbarchiver_errors::ArchiverError;
use dbarchiver_graph::{Graph, GraphBuilder};

/// How long `acquire_or_fail` waits for the job lock before reporting
/// `LockTimeout`, per spec.md §4.9's "short timeout".
pub const LOCK_ACQUIRE_TIMEOUT_SECS: u64 = 5;

/// Every command that touches a specific job needs its validated
/// [`JobConfig`] and the [`Graph`] built from its relation tree; this is
/// the one place that pairing happens.
pub fn job_and_graph(config: &Config, job_name: &str) -> anyhow::Result<(JobConfig, Graph)> {
    let job = config.job(job_name)?.clone();
    let graph = GraphBuilder::from_relation_spec(job.root_table.clone(), job.primary_key.clone(), &job.relations)?;
    Ok((job, graph))
}

/// Print the run's final summary line and translate its outcome into the
/// process exit behavior spec.md §7 requires: cancellation is reported but
/// exits 0 (`Ok`), any other failure exits non-zero (`Err`).
pub fn report_result(result: Result<dbarchiver_db::RunResult, ArchiverError>) -> anyhow::Result<()> {
    match result {
        Ok(run) => {
            println!("{}", run.summary_line());
            if run.success {
                Ok(())
            } else {
                anyhow::bail!("{}", run.errors.join("; "))
            }
        }
        Err(e) if e.is_cancelled() => {
            println!("job cancelled");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
