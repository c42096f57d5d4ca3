use dbarchiver_config::Config;

use crate::commands::job_and_graph;
use crate::render::render_plan;

pub fn run(config: &Config, job_name: &str) -> anyhow::Result<()> {
    let (job, graph) = job_and_graph(config, job_name)?;
    println!("{}", render_plan(&job, &graph));
    Ok(())
}
