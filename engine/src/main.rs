//! Stampede CLI

use clap::{Arg, ArgAction, ArgMatches, Command};
use stampede_client::{parser::Console, process::Process};
use stampede_engine::{
    config::Config,
    coordinator::{self, Coordinator},
    manager::ManagerResult,
    Error,
};
use stampede_store::Store;
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info};

/// Returns the version of the crate.
pub const fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Flag for verbose output
const VERBOSE_FLAG: &str = "verbose";

/// Flag to stop a worker at its first failed task
const FAIL_FAST_FLAG: &str = "fail-fast";

fn path(matches: &ArgMatches, id: &str) -> Result<PathBuf, Error> {
    matches
        .get_one::<PathBuf>(id)
        .cloned()
        .ok_or_else(|| Error::Config(format!("missing --{id}")))
}

async fn run(matches: &ArgMatches) -> Result<Vec<ManagerResult>, Error> {
    let config = Config::load(&path(matches, "config")?)?;
    let seeds: Vec<u64> = match matches.get_many::<u64>("seeds") {
        Some(seeds) => seeds.copied().collect(),
        None => config.settings.seeds.clone(),
    };
    let base_directory = path(matches, "base-directory")?;
    let base_binary = matches
        .get_one::<String>("base-binary")
        .cloned()
        .ok_or_else(|| Error::Config("missing --base-binary".into()))?;
    let logs = std::path::absolute(path(matches, "logs")?)?;
    let database = path(matches, "database")?;
    info!(?database, ?logs, seeds = ?seeds, "starting run");

    let store = Arc::new(Store::open_fresh(&database)?);
    let executor = Process::new(base_binary, base_directory).with_timeout(config.settings.timeout());
    let artifacts = logs.join("artifacts");
    let results = Coordinator::new(
        executor,
        Console,
        store,
        config,
        matches.get_flag(FAIL_FAST_FLAG),
        Some(logs),
        artifacts,
    )
    .run(&seeds)
    .await?;

    let output = matches.get_one::<PathBuf>("output").map(|p| p.as_path());
    coordinator::publish(&results, output)?;
    Ok(results)
}

/// Entrypoint for the Stampede CLI
#[tokio::main]
async fn main() -> std::process::ExitCode {
    // Define application
    let matches = Command::new("stampede")
        .version(crate_version())
        .about("Generate synthetic transaction load against a ledger network.")
        .arg(
            Arg::new(VERBOSE_FLAG)
                .short('v')
                .long(VERBOSE_FLAG)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .alias("config-path")
                .required(true)
                .help("Path to YAML config file")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("seeds")
                .long("seeds")
                .num_args(1..)
                .help("Seeds of the populations to run (overrides settings.seeds)")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("base-directory")
                .long("base-directory")
                .default_value(".")
                .help("Working directory of the node client")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("base-binary")
                .long("base-binary")
                .default_value("namada")
                .help("Node client binary")
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            Arg::new(FAIL_FAST_FLAG)
                .long(FAIL_FAST_FLAG)
                .help("Stop a worker at its first failed task")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("database")
                .long("database")
                .default_value("stampede.db")
                .help("Path of the shadow store (recreated on every run)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("logs")
                .long("logs")
                .default_value("logs")
                .help("Directory for per-task records")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .help("Directory for per-seed result files (results are printed if not provided)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .get_matches();

    // Create logger
    let level = if matches.get_flag(VERBOSE_FLAG) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    // Run workers
    match run(&matches).await {
        Ok(results) if results.iter().any(ManagerResult::is_halted) => {
            error!("at least one worker halted");
        }
        Ok(_) => return std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(error=?e, "run failed");
        }
    }
    std::process::ExitCode::FAILURE
}
