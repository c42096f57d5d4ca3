use dbarchiver_config::{Config, VerificationMethodConfig};
use dbarchiver_db::{AdvisoryLock, LagMonitor, Orchestrator, PreflightChecker, Pools, ResumeStore, RunMode};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::commands::{job_and_graph, report_result, LOCK_ACQUIRE_TIMEOUT_SECS};
use crate::signal;

pub async fn run(config: &Config, job_name: &str, force: bool, skip_verify: bool) -> anyhow::Result<()> {
    let (mut job, graph) = job_and_graph(config, job_name)?;
    if skip_verify {
        job.verification_method = VerificationMethodConfig::Skip;
    }

    let pools = Pools::connect(config);

    let resume = ResumeStore::new(pools.source.clone());
    resume.initialize().await?;

    let checker = PreflightChecker::new(pools.source.clone(), config.safety.allow_delete_triggers);
    checker.check(&config.source.database, &graph).await?;

    let lag_monitor = match (&config.replica, &pools.replica) {
        (Some(replica_cfg), Some(replica_pool)) => {
            Some(LagMonitor::new(replica_pool.clone(), replica_cfg.lag_threshold_seconds))
        }
        _ => None,
    };

    let cancel = CancellationToken::new();
    signal::install(cancel.clone());

    let orchestrator = Orchestrator::new(graph, job, RunMode::Archive, pools.clone(), resume, lag_monitor);

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
