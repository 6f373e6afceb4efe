//! Generate synthetic transaction load against a ledger network.
//!
//! A run is made of one [manager::Manager] per seed. Each manager owns an independent actor
//! population and a generator seeded from its seed: it bootstraps a shadow of the population's
//! on-chain state ([stampede_store::Store]) with [task::TaskKind::Init], then repeatedly draws a
//! weighted-random [task::TaskKind] and a node, and runs that task. Tasks only issue
//! transactions the shadow state says will execute, and only update the shadow once the node
//! confirms them.
//!
//! The [coordinator] runs every population's bootstrap in turn, then all scheduling loops
//! concurrently, and collects one [manager::ManagerResult] per seed.

use stampede_store::Id;
use thiserror::Error;

pub mod config;
pub mod coordinator;
pub mod manager;
pub mod report;
pub mod task;

/// Errors that abort a worker (or the whole run).
///
/// Failed transactions are not errors: they are recorded in a [task::TaskResult].
#[derive(Debug, Error)]
pub enum Error {
    #[error("store error: {0}")]
    Store(#[from] stampede_store::Error),
    #[error("client error: {0}")]
    Client(#[from] stampede_client::Error),
    #[error("{operation} affected {actual} rows, expected {expected}")]
    Invariant {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{entity} {id} referenced but not found")]
    Dangling { entity: &'static str, id: Id },
    #[error("init failed: {0}")]
    Init(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("worker for seed {0} did not complete")]
    Join(u64),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
