//! Drive a ledger node's command-line client and decode what it prints.
//!
//! A load generator never talks to the network directly. Instead, it builds a [Command]
//! (which sub-binary, which operation, which flags, which node), hands it to an [Executor],
//! and receives an [Output] whose `success` flag has already been classified from the text
//! the client printed. Any structured data needed from that text (epochs, balances, bond
//! listings, ...) is extracted by a [parser::Parser].
//!
//! Both seams are traits so the engine can run against [process::Process] in production and
//! against [mocks::Executor] in tests.

use std::future::Future;
use thiserror::Error;

mod command;
pub use command::{Binary, Command, Vote};
pub mod mocks;
pub mod parser;
pub mod process;

/// Printed by the client when a transaction was accepted.
pub const VALID_MARKER: &str = "Transaction is valid.";

/// Printed by the client when a transaction failed validation.
pub const INVALID_MARKER: &str = "Transaction is invalid.";

/// Printed by the client when a transaction was rejected during execution.
pub const REJECTED_MARKER: &str = "Transaction was rejected";

/// Diagnostic printed when a transfer exceeds the source balance.
pub const INSUFFICIENT_BALANCE_MARKER: &str = "is lower than the amount to be transferred";

/// Diagnostic printed by some client versions while loading the wallet (harmless).
pub const SKIPPING_KEY_MARKER: &str = "Skipping key";

/// Errors that can occur when running a [Command].
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },
}

/// Whether `stderr` only carries diagnostics that do not indicate a failed transaction.
pub fn is_benign(stderr: &str) -> bool {
    stderr.contains(INSUFFICIENT_BALANCE_MARKER) || stderr.contains(SKIPPING_KEY_MARKER)
}

/// Captured output of one client invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Output {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    /// Classify raw client output.
    ///
    /// Any non-benign diagnostic is a failure. Otherwise the valid marker wins, either invalid
    /// marker loses, and output carrying no marker at all (queries) succeeds.
    pub fn classify(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        let (stdout, stderr) = (stdout.into(), stderr.into());
        let success = if !stderr.is_empty() && !is_benign(&stderr) {
            false
        } else if stdout.contains(VALID_MARKER) {
            true
        } else {
            ![INVALID_MARKER, REJECTED_MARKER]
                .iter()
                .any(|marker| stdout.contains(marker) || stderr.contains(marker))
        };
        Self {
            success,
            stdout,
            stderr,
        }
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs [Command]s against a node client.
pub trait Executor: Clone + Send + Sync + 'static {
    /// Run `command` to completion and classify what it printed.
    ///
    /// A command that ran but failed (or timed out) is reported as an unsuccessful [Output].
    /// An `Err` means the command could not be run at all.
    fn execute(&self, command: &Command) -> impl Future<Output = Result<Output, Error>> + Send;
}
