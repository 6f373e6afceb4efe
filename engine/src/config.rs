//! Run configuration, loaded from YAML.

use crate::{task::TaskKind, Error};
use serde::{Deserialize, Serialize};
use std::{fs::File, path::Path, time::Duration};

/// Sentinel for `settings.total_tx` that never exhausts the budget.
pub const UNBOUNDED: i64 = -1;

fn default_timeout_secs() -> u64 {
    130
}

/// How much work each worker performs, and how.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Settings {
    /// Transactions per worker, or [UNBOUNDED].
    pub total_tx: i64,
    #[serde(default)]
    pub seeds: Vec<u64>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Settings {
    /// Number of scheduled steps, or `None` when unbounded.
    pub fn budget(&self) -> Option<u64> {
        u64::try_from(self.total_tx).ok()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Relative likelihood of scheduling `kind`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Weight {
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub probability: u32,
}

/// Tunables that shape the generated transactions.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Policy {
    /// Token used for bonds, proposal deposits, and withdrawals.
    pub native_token: String,
    /// Every account holds one balance per token.
    pub tokens: Vec<String>,
    pub account_prefix: String,
    /// Init tops each population up to this many accounts.
    pub min_accounts: usize,
    pub faucet_limit: u64,
    pub bond_min: u64,
    pub bond_max: u64,
    /// Largest delegation an unbond may release at once.
    pub unbond_ceiling: u64,
    /// Deposit locked by a proposal submission.
    pub proposal_min_funds: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            native_token: "XAN".to_string(),
            tokens: vec!["XAN".to_string(), "BTC".to_string(), "ETH".to_string()],
            account_prefix: "load-tester".to_string(),
            min_accounts: 5,
            faucet_limit: 1000,
            bond_min: 10,
            bond_max: 100,
            unbond_ceiling: 100_000,
            proposal_min_funds: 500,
        }
    }
}

/// Everything needed to run a set of workers.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub settings: Settings,
    pub nodes: Vec<String>,
    pub tasks: Vec<Weight>,
    #[serde(default)]
    pub policy: Policy,
}

impl Config {
    /// Read and validate the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let config: Config = {
            let file = File::open(path)?;
            serde_yaml::from_reader(file)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |reason: String| Err(Error::Config(reason));
        if self.settings.total_tx < UNBOUNDED {
            return invalid(format!("total_tx must be >= {UNBOUNDED}"));
        }
        if self.nodes.is_empty() {
            return invalid("at least one node is required".into());
        }
        if let Some(weight) = self.tasks.iter().find(|w| w.kind == TaskKind::Init) {
            return invalid(format!("{} runs once per worker and cannot be scheduled", weight.kind));
        }
        if !self.tasks.iter().any(|w| w.probability > 0) {
            return invalid("at least one task must have a positive probability".into());
        }
        let policy = &self.policy;
        if policy.bond_min == 0 || policy.bond_min > policy.bond_max {
            return invalid(format!(
                "bond range {}..={} is empty",
                policy.bond_min, policy.bond_max
            ));
        }
        if policy.faucet_limit == 0 {
            return invalid("faucet_limit must be positive".into());
        }
        if !policy.tokens.contains(&policy.native_token) {
            return invalid(format!(
                "native token {} is not in the token list",
                policy.native_token
            ));
        }
        Ok(())
    }
}
