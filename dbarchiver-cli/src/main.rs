//! `dbarchiver` — archives or purges large, referentially-connected subsets
//! of rows from a live MySQL-family database, per spec.md.

mod commands;
mod logging;
mod render;
mod signal;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dbarchiver_config::CliOverrides;

/// Batched archive/purge tool preserving referential integrity end-to-end.
#[derive(Parser)]
#[command(name = "dbarchiver", version = dbarchiver_version::VERSION)]
pub struct Cli {
    /// Path to the YAML job configuration file.
    #[arg(long, global = true, env = "DBARCHIVER_CONFIG", default_value = "dbarchiver.yaml")]
    pub config: PathBuf,

    /// Log verbosity (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "DBARCHIVER_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log rendering (pretty, json).
    #[arg(long, global = true, env = "DBARCHIVER_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Override the configured root-PK batch size.
    #[arg(long, global = true)]
    pub batch_size: Option<u64>,

    /// Override the configured per-statement delete batch size.
    #[arg(long, global = true)]
    pub batch_delete_size: Option<u64>,

    /// Override the configured inter-root sleep, in seconds.
    #[arg(long, global = true)]
    pub sleep: Option<f64>,

    /// Skip the verify phase entirely, as if `verification.skip_verification: true`.
    #[arg(long, global = true)]
    pub skip_verify: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a full archive: discover, copy, verify, then delete from source.
    Archive {
        #[arg(long)]
        job: String,
        /// Proceed even if another process appears to hold the job lock.
        #[arg(long)]
        force: bool,
        #[arg(long)]
        skip_verify: bool,
    },
    /// Discover and delete from source only; no copy, no verify.
    Purge {
        #[arg(long)]
        job: String,
        #[arg(long)]
        force: bool,
    },
    /// Estimate row counts and batch counts for a job without writing anything.
    DryRun {
        #[arg(long)]
        job: String,
    },
    /// Render the copy order, delete order, edge list and configuration summary for a job.
    Plan {
        #[arg(long)]
        job: String,
    },
    /// Run preflight checks for every defined job.
    Validate {
        /// Allow tables with DELETE triggers to pass preflight.
        #[arg(long)]
        force_triggers: bool,
    },
    /// List every job defined in the configuration.
    ListJobs,
    /// Print the tool's version.
    Version,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            batch_size: self.batch_size,
            batch_delete_size: self.batch_delete_size,
            sleep_seconds: self.sleep,
            skip_verify: self.skip_verify,
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if matches!(cli.command, Command::Version) {
        println!("{}", dbarchiver_version::version_string());
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = cli.overrides();
    let mut config = dbarchiver_config::Config::load(&cli.config)?;
    config.apply_cli_overrides(&overrides);

    logging::init(&config.logging);

    match cli.command {
        Command::Archive { job, force, skip_verify } => {
            commands::archive::run(&config, &job, force, skip_verify).await
        }
        Command::Purge { job, force } => commands::purge::run(&config, &job, force).await,
        Command::DryRun { job } => commands::dry_run::run(&config, &job).await,
        Command::Plan { job } => commands::plan::run(&config, &job),
        Command::Validate { force_triggers } => commands::validate::run(&config, force_triggers).await,
        Command::ListJobs => commands::list_jobs::run(&config),
        Command::Version => unreachable!("handled above main()"),
    }
}
