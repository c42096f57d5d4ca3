use dbarchiver_config::Config;
use dbarchiver_db::{PreflightChecker, Pools};
use tracing::info;

use crate::commands::job_and_graph;

/// Run `PreflightChecker` for every defined job, collecting failures across
/// all of them rather than stopping at the first, per spec.md §6's
/// `validate` subcommand.
pub async fn run(config: &Config, force_triggers: bool) -> anyhow::Result<()> {
    let pools = Pools::connect(config);
    let allow_delete_triggers = config.safety.allow_delete_triggers || force_triggers;
    let checker = PreflightChecker::new(pools.source.clone(), allow_delete_triggers);

    let mut names: Vec<&String> = config.jobs.keys().collect();
    names.sort();

    let mut failures = Vec::new();
    for name in names {
        let (_, graph) = job_and_graph(config, name)?;
        match checker.check(&config.source.database, &graph).await {
            Ok(()) => info!(job = %name, "preflight passed"),
            Err(e) => failures.push(format!("{name}: {e}")),
        }
    }

    pools.disconnect().await;

    if failures.is_empty() {
        println!("all jobs passed preflight");
        Ok(())
    } else {
        for failure in &failures {
            eprintln!("{failure}");
        }
        anyhow::bail!("{} job(s) failed preflight", failures.len());
    }
}
