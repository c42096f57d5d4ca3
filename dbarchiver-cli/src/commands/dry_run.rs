use dbarchiver_config::Config;
use dbarchiver_db::{Estimator, Pools};

use crate::commands::job_and_graph;

pub async fn run(config: &Config, job_name: &str) -> anyhow::Result<()> {
    let (job, graph) = job_and_graph(config, job_name)?;
    let pools = Pools::connect(config);
    let estimator = Estimator::new(pools.source.clone());

    let estimate = estimator
        .estimate(&graph, job.predicate.as_deref(), job.batch_size)
        .await?;

    println!("job: {job_name}");
    println!("root ({}): ~{} row(s), ~{} batch(es)", job.root_table, estimate.root_rows, estimate.batch_count);
    for table in &estimate.tables {
        println!("{}: ~{} row(s)", table.table, table.estimated_rows);
    }

    pools.disconnect().await;
    Ok(())
}
