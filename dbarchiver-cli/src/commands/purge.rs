use dbarchiver_config::Config;
use dbarchiver_db::{AdvisoryLock, LagMonitor, Orchestrator, PreflightChecker, Pools, ResumeStore, RunMode};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::commands::{job_and_graph, report_result, LOCK_ACQUIRE_TIMEOUT_SECS};

pub async fn run(config: &Config, job_name: &str, force: bool) -> anyhow::Result<()> {
    let (job, graph) = job_and_graph(config, job_name)?;
    let pools = Pools::connect(config);

    let resume = ResumeStore::new(pools.source.clone());
    resume.initialize().await?;

    let checker = PreflightChecker::new(pools.source.clone(), config.safety.allow_delete_triggers);
    checker.check(&config.source.database, &graph).await?;

    // Purge never copies, so the lag monitor (which exists to protect a
    // replica from the archive-phase write load) has nothing to throttle.
    let lag_monitor: Option<LagMonitor> = None;

    let cancel = CancellationToken::new();
    crate::signal::install(cancel.clone());

    let orchestrator = Orchestrator::new(graph, job, RunMode::Purge, pools.clone(), resume, lag_monitor);

    let outcome = if force {
        warn!(job = %job_name, "--force: running without acquiring the advisory lock");
        orchestrator.execute(cancel).await
    } else {
        let mut lock = AdvisoryLock::new(job_name);
        lock.with_lock(&pools.source, LOCK_ACQUIRE_TIMEOUT_SECS, || orchestrator.execute(cancel))
            .await?
    };

    pools.disconnect().await;
    report_result(outcome)
}
