//! Drive one actor population through a weighted-random sequence of tasks.

use crate::{
    config::Config,
    report,
    task::{Context, Outcome, TaskKind, TaskResult},
    Error,
};
use rand::{
    distributions::{Distribution, WeightedIndex},
    seq::SliceRandom,
};
use serde::{ser::SerializeStruct, Serialize, Serializer};
use stampede_client::{parser::Parser, Executor};
use std::{collections::BTreeMap, fmt, path::PathBuf};
use tracing::{error, info, warn};

/// Outcome counts of one kind of task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub succeeded: u64,
    pub failed: u64,
}

/// Summary of one worker's run.
#[derive(Clone, Debug, PartialEq)]
pub struct ManagerResult {
    pub seed: u64,
    /// Scheduled steps that ran, skipped ones included.
    pub steps: u64,
    /// Succeeded and failed tasks per kind. Skipped tasks are not counted.
    pub stats: BTreeMap<TaskKind, Stats>,
    /// Why the worker stopped before exhausting its budget.
    pub halted: Option<String>,
}

impl ManagerResult {
    pub fn succeeded(&self) -> u64 {
        self.stats.values().map(|s| s.succeeded).sum()
    }

    pub fn failed(&self) -> u64 {
        self.stats.values().map(|s| s.failed).sum()
    }

    /// Percentage of counted tasks that succeeded (zero when none were counted).
    pub fn success_rate(&self) -> f64 {
        let (succeeded, failed) = (self.succeeded(), self.failed());
        if succeeded + failed == 0 {
            return 0.0;
        }
        succeeded as f64 * 100.0 / (succeeded + failed) as f64
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }
}

impl Serialize for ManagerResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ManagerResult", 7)?;
        state.serialize_field("seed", &self.seed)?;
        state.serialize_field("steps", &self.steps)?;
        state.serialize_field("succeeded", &self.succeeded())?;
        state.serialize_field("failed", &self.failed())?;
        state.serialize_field("success_rate", &self.success_rate())?;
        state.serialize_field("stats", &self.stats)?;
        state.serialize_field("halted", &self.halted)?;
        state.end()
    }
}

impl fmt::Display for ManagerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "seed {}: {} steps, {} succeeded, {} failed ({:.2}%)",
            self.seed,
            self.steps,
            self.succeeded(),
            self.failed(),
            self.success_rate()
        )?;
        for (kind, stats) in &self.stats {
            writeln!(f, "  {kind} - {} / {}", stats.succeeded, stats.failed)?;
        }
        if let Some(reason) = &self.halted {
            writeln!(f, "  halted: {reason}")?;
        }
        Ok(())
    }
}

/// Runs the tasks of a single seed.
pub struct Manager<E, P> {
    ctx: Context<E, P>,
    nodes: Vec<String>,
    kinds: Vec<TaskKind>,
    weights: WeightedIndex<u32>,
    budget: Option<u64>,
    fail_fast: bool,
    logs: Option<PathBuf>,

    steps: u64,
    stats: BTreeMap<TaskKind, Stats>,
}

impl<E: Executor, P: Parser> Manager<E, P> {
    /// Create a worker for `ctx`'s seed.
    ///
    /// When `logs` is set, every task record is written beneath it (see [report::dump_task]).
    pub fn new(
        ctx: Context<E, P>,
        config: &Config,
        fail_fast: bool,
        logs: Option<PathBuf>,
    ) -> Result<Self, Error> {
        if config.nodes.is_empty() {
            return Err(Error::Config("at least one node is required".into()));
        }
        let kinds: Vec<_> = config.tasks.iter().map(|w| w.kind).collect();
        let weights = WeightedIndex::new(config.tasks.iter().map(|w| w.probability))
            .map_err(|err| Error::Config(format!("invalid task weights: {err}")))?;
        let stats = kinds.iter().map(|kind| (*kind, Stats::default())).collect();
        Ok(Self {
            ctx,
            nodes: config.nodes.clone(),
            kinds,
            weights,
            budget: config.settings.budget(),
            fail_fast,
            logs,
            steps: 0,
            stats,
        })
    }

    pub fn seed(&self) -> u64 {
        self.ctx.seed()
    }

    fn node(&mut self) -> String {
        // Nodes are checked to be non-empty on construction
        self.nodes
            .choose(&mut self.ctx.rng)
            .cloned()
            .unwrap_or_default()
    }

    fn dump(&self, result: &TaskResult) -> Result<(), Error> {
        if let Some(logs) = &self.logs {
            report::dump_task(logs, result)?;
        }
        Ok(())
    }

    /// Bootstrap the shadow store against a random node.
    ///
    /// Clears the task records of a previous run of this seed first.
    pub async fn init(&mut self) -> Result<TaskResult, Error> {
        if let Some(logs) = &self.logs {
            report::reset(logs, self.seed())?;
        }
        let node = self.node();
        info!(seed = self.seed(), %node, "initializing");
        let result = TaskKind::Init.run(&mut self.ctx, 0, &node).await?;
        self.dump(&result)?;
        Ok(result)
    }

    /// Execute one scheduled step, returning a reason to halt (if any).
    async fn step(&mut self) -> Result<Option<String>, Error> {
        self.steps += 1;
        let step = self.steps;
        let node = self.node();
        let index = self.weights.sample(&mut self.ctx.rng);
        let kind = self.kinds[index];

        let result = kind.run(&mut self.ctx, step, &node).await?;
        self.dump(&result)?;
        info!(
            seed = self.seed(),
            step,
            task = %kind,
            %node,
            outcome = result.outcome.as_str(),
            elapsed = ?result.elapsed,
            "task completed"
        );
        let stats = self.stats.entry(kind).or_default();
        match result.outcome {
            Outcome::Succeeded => stats.succeeded += 1,
            Outcome::Failed => stats.failed += 1,
            Outcome::Skipped => {}
        }
        if self.fail_fast && result.is_error() {
            warn!(seed = self.seed(), step, task = %kind, stderr = %result.stderr.trim(), "task failed");
            return Ok(Some(format!("{kind} failed at step {step}")));
        }
        Ok(None)
    }

    /// Run scheduled steps until the budget is exhausted or the worker halts.
    ///
    /// A shadow store inconsistency (or any other [Error]) halts the worker, as does a failed
    /// task when running fail-fast. The counts gathered so far are returned either way.
    pub async fn run(mut self) -> ManagerResult {
        let mut halted = None;
        while self.budget.map_or(true, |budget| self.steps < budget) {
            match self.step().await {
                Ok(None) => {}
                Ok(Some(reason)) => {
                    halted = Some(reason);
                    break;
                }
                Err(err) => {
                    error!(seed = self.seed(), step = self.steps, error = ?err, "worker halted");
                    halted = Some(err.to_string());
                    break;
                }
            }
        }
        info!(seed = self.seed(), steps = self.steps, halted = halted.is_some(), "worker finished");
        ManagerResult {
            seed: self.seed(),
            steps: self.steps,
            stats: self.stats,
            halted,
        }
    }
}
