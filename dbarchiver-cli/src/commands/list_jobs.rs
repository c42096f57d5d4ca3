use dbarchiver_config::Config;

pub fn run(config: &Config) -> anyhow::Result<()> {
    let mut names: Vec<&String> = config.jobs.keys().collect();
    names.sort();
    for name in names {
        let job = config.job(name)?;
        println!("{name}\troot={}\tbatch_size={}", job.root_table, job.batch_size);
    }
    Ok(())
}
