//! Units of work issued by a worker.
//!
//! Every [TaskKind] follows the same shape:
//!
//! 1. Select a subject (account, delegation, proposal, ...) from the shadow store. When nothing
//!    qualifies, the task is skipped: this is a normal steady state (no funded accounts yet, no
//!    mature withdrawals, ...) and not a failure.
//! 2. Issue one or more commands against the chosen node. Later commands may depend on the
//!    output of earlier ones (for example, querying the epoch before selecting a delegation).
//! 3. If a command fails, report it and leave the shadow store untouched.
//! 4. Otherwise, update the shadow store, checking that every update touched exactly the rows
//!    it was expected to. A mismatch means the shadow has drifted and aborts the worker.
//!
//! Dry-run transactions are simulated by the node and never update the shadow store.

use crate::{config::Policy, Error};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize, Serializer};
use stampede_client::{parser::Parser, Command, Executor, Output, INSUFFICIENT_BALANCE_MARKER};
use stampede_store::Store;
use std::{
    fmt,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::debug;

/// Run a query, returning early from the handler with a failed result if it fails.
macro_rules! query {
    ($ctx:expr, $command:expr) => {{
        let command = $command;
        let output = $ctx.execute(&command).await?;
        if !output.success {
            return Ok(Handled::ran(&command, output));
        }
        output.stdout
    }};
}

mod delegate;
mod faucet;
mod init;
mod proposal;
mod transfer;
mod unbond;
mod vote;
mod withdraw;

pub use delegate::ACTIVE_EPOCH_WAIT;
pub use proposal::Payload;

/// Every kind of task a worker can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum TaskKind {
    Init,
    Faucet,
    Transfer,
    Delegate,
    Unbond,
    Withdraw,
    InitProposal,
    VoteProposal,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Faucet => "Faucet",
            Self::Transfer => "Transfer",
            Self::Delegate => "Delegate",
            Self::Unbond => "Unbond",
            Self::Withdraw => "Withdraw",
            Self::InitProposal => "InitProposal",
            Self::VoteProposal => "VoteProposal",
        }
    }

    /// Run the task against `node`.
    ///
    /// Returns `Err` only for conditions that must stop the worker: the shadow store drifted,
    /// the store itself failed, or the client could not be run (or printed something that could
    /// not be parsed). A rejected transaction is an `Ok` result with [Outcome::Failed].
    pub async fn run<E: Executor, P: Parser>(
        self,
        ctx: &mut Context<E, P>,
        step: u64,
        node: &str,
    ) -> Result<TaskResult, Error> {
        let start = Instant::now();
        let handled = match self {
            Self::Init => init::handle(ctx, node).await?,
            Self::Faucet => faucet::handle(ctx, node).await?,
            Self::Transfer => transfer::handle(ctx, node).await?,
            Self::Delegate => delegate::handle(ctx, node).await?,
            Self::Unbond => unbond::handle(ctx, node).await?,
            Self::Withdraw => withdraw::handle(ctx, node).await?,
            Self::InitProposal => proposal::handle(ctx, node).await?,
            Self::VoteProposal => vote::handle(ctx, node).await?,
        };
        let (command, output, outcome) = match handled {
            Handled::Skipped => (String::new(), Output::default(), Outcome::Skipped),
            Handled::Ran { command, output } => {
                let outcome = if output.success {
                    Outcome::Succeeded
                } else {
                    Outcome::Failed
                };
                (command, output, outcome)
            }
        };
        Ok(TaskResult {
            task: self,
            command,
            stdout: output.stdout,
            stderr: output.stderr,
            step,
            seed: ctx.seed,
            elapsed: start.elapsed(),
            outcome,
        })
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What came of running a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Succeeded,
    Failed,
    /// Nothing qualified, so nothing was issued.
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

fn as_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((elapsed.as_secs_f64() * 100.0).round() / 100.0)
}

/// Record of one task execution.
#[derive(Clone, Debug, Serialize)]
pub struct TaskResult {
    pub task: TaskKind,
    /// Command line of the last command issued (empty when skipped).
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub step: u64,
    pub seed: u64,
    #[serde(serialize_with = "as_secs")]
    pub elapsed: Duration,
    pub outcome: Outcome,
}

impl TaskResult {
    pub fn is_error(&self) -> bool {
        self.outcome == Outcome::Failed
    }
}

/// Result of a task handler, before it is stamped with step, seed, and timing.
pub(crate) enum Handled {
    Skipped,
    Ran { command: String, output: Output },
}

impl Handled {
    fn ran(command: &Command, output: Output) -> Self {
        Self::Ran {
            command: command.to_string(),
            output,
        }
    }
}

/// Everything a task needs, owned by one worker.
pub struct Context<E, P> {
    pub(crate) executor: E,
    pub(crate) parser: P,
    pub(crate) store: Arc<Store>,
    pub(crate) rng: StdRng,
    pub(crate) seed: u64,
    pub(crate) policy: Policy,
    pub(crate) dry_run: bool,
    /// Directory for files handed to the client (proposal payloads).
    pub(crate) artifacts: PathBuf,
}

impl<E: Executor, P: Parser> Context<E, P> {
    pub fn new(
        executor: E,
        parser: P,
        store: Arc<Store>,
        seed: u64,
        policy: Policy,
        dry_run: bool,
        artifacts: PathBuf,
    ) -> Self {
        Self {
            executor,
            parser,
            store,
            rng: StdRng::seed_from_u64(seed),
            seed,
            policy,
            dry_run,
            artifacts,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub(crate) async fn execute(&self, command: &Command) -> Result<Output, Error> {
        let output = self.executor.execute(command).await?;
        debug!(seed = self.seed, %command, success = output.success, "executed");
        Ok(output)
    }

    /// Attach the dry-run flag (if enabled) and the target node to a transaction.
    pub(crate) fn transaction(&self, command: Command, node: &str) -> Command {
        command.dry_run(self.dry_run).at(node)
    }

    /// Whether `output` confirms a transaction that changed ledger state.
    pub(crate) fn commit(&self, output: &Output) -> bool {
        output.success && !self.dry_run && !output.stderr.contains(INSUFFICIENT_BALANCE_MARKER)
    }

    /// Key alias that signs for account `alias`.
    pub(crate) fn signer<'a>(&self, alias: &'a str) -> &'a str {
        alias
            .strip_prefix(self.policy.account_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .unwrap_or(alias)
    }
}

/// Fail unless an update touched exactly `expected` rows.
pub(crate) fn affected(operation: &'static str, expected: usize, actual: usize) -> Result<(), Error> {
    if expected != actual {
        return Err(Error::Invariant {
            operation,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Signed balance change for `amount`.
pub(crate) fn delta(amount: u64) -> Result<i64, Error> {
    i64::try_from(amount).map_err(|_| Error::from(stampede_store::Error::OutOfRange(amount)))
}
