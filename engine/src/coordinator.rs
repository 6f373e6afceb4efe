//! Run one [Manager] per seed.
//!
//! Every manager is bootstrapped in turn before any scheduling loop starts, so the bulk queries
//! issued by init never compete with generated load. The loops then run concurrently (one tokio
//! task per seed) and share nothing but the store, where every row is scoped by seed.

use crate::{
    config::Config,
    manager::{Manager, ManagerResult},
    report,
    task::Context,
    Error,
};
use futures::future::join_all;
use stampede_client::{parser::Parser, Executor};
use stampede_store::Store;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{error, info};

/// Owns the workers of a run.
pub struct Coordinator<E, P> {
    executor: E,
    parser: P,
    store: Arc<Store>,
    config: Config,
    fail_fast: bool,
    logs: Option<PathBuf>,
    artifacts: PathBuf,
}

impl<E: Executor, P: Parser + Clone> Coordinator<E, P> {
    /// Create a coordinator.
    ///
    /// Task records are written beneath `logs` (when set) and files handed to the client
    /// beneath `artifacts`.
    pub fn new(
        executor: E,
        parser: P,
        store: Arc<Store>,
        config: Config,
        fail_fast: bool,
        logs: Option<PathBuf>,
        artifacts: PathBuf,
    ) -> Self {
        Self {
            executor,
            parser,
            store,
            config,
            fail_fast,
            logs,
            artifacts,
        }
    }

    /// Run a worker for every distinct seed, returning their results ordered by seed.
    ///
    /// Clears the store first. Fails if any worker cannot be bootstrapped (no load is
    /// generated in that case) or does not complete.
    pub async fn run(self, seeds: &[u64]) -> Result<Vec<ManagerResult>, Error> {
        let seeds: BTreeSet<u64> = seeds.iter().copied().collect();
        if seeds.is_empty() {
            return Err(Error::Config("at least one seed is required".into()));
        }
        self.store.clear()?;

        let mut managers = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let ctx = Context::new(
                self.executor.clone(),
                self.parser.clone(),
                self.store.clone(),
                seed,
                self.config.policy.clone(),
                self.config.settings.dry_run,
                self.artifacts.clone(),
            );
            let mut manager = Manager::new(ctx, &self.config, self.fail_fast, self.logs.clone())?;
            if let Err(err) = manager.init().await {
                error!(seed, error = ?err, "init failed");
                return Err(err);
            }
            managers.push(manager);
        }
        info!(workers = managers.len(), "starting workers");

        let handles = managers.into_iter().map(|manager| {
            let seed = manager.seed();
            (seed, tokio::spawn(manager.run()))
        });
        let (seeds, handles): (Vec<_>, Vec<_>) = handles.unzip();
        let mut results = Vec::with_capacity(seeds.len());
        for (seed, joined) in seeds.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => {
                    error!(seed, error = ?err, "worker panicked");
                    return Err(Error::Join(seed));
                }
            }
        }
        Ok(results)
    }
}

/// Write one result artifact per seed beneath `output`, or print every result when unset.
pub fn publish(results: &[ManagerResult], output: Option<&Path>) -> Result<(), Error> {
    match output {
        Some(output) => {
            for result in results {
                let path = report::dump_result(output, result)?;
                info!(seed = result.seed, ?path, "wrote result");
            }
        }
        None => {
            for result in results {
                print!("{result}");
            }
        }
    }
    Ok(())
}
