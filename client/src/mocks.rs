//! A scripted [crate::Executor] for exercising code that drives the node client.

use crate::{Command, Error, Output};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

#[derive(Default)]
struct State {
    queued: HashMap<&'static str, VecDeque<Output>>,
    fallback: HashMap<&'static str, Output>,
    calls: Vec<Command>,
}

/// Replays canned [Output]s by operation and records every [Command] it receives.
///
/// Queued outputs (see [Executor::push]) are consumed first, in order. Once an operation's
/// queue is empty, its fallback (see [Executor::set]) is returned on every call. An operation
/// with neither fails as if the node were unreachable.
#[derive(Clone, Default)]
pub struct Executor {
    state: Arc<Mutex<State>>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return `output` the next time `operation` is executed.
    pub fn push(&self, operation: &'static str, output: Output) -> &Self {
        self.state()
            .queued
            .entry(operation)
            .or_default()
            .push_back(output);
        self
    }

    /// Return `output` whenever `operation` has nothing queued.
    pub fn set(&self, operation: &'static str, output: Output) -> &Self {
        self.state().fallback.insert(operation, output);
        self
    }

    /// Every command executed so far, in order.
    pub fn calls(&self) -> Vec<Command> {
        self.state().calls.clone()
    }

    /// Number of times `operation` was executed.
    pub fn count(&self, operation: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|command| command.operation() == operation)
            .count()
    }
}

impl crate::Executor for Executor {
    async fn execute(&self, command: &Command) -> Result<Output, Error> {
        let mut state = self.state();
        state.calls.push(command.clone());
        let operation = command.operation();
        let queued = state
            .queued
            .get_mut(operation)
            .and_then(|queue| queue.pop_front());
        let output = queued
            .or_else(|| state.fallback.get(operation).cloned())
            .unwrap_or_else(|| Output::failed(format!("unscripted operation: {operation}")));
        Ok(output)
    }
}

/// Render canned output in the format understood by [crate::parser::Console].
pub mod console {
    use crate::{
        parser::{Bond, Maturity, ProposalInfo, ProposalStatus, Unbond},
        VALID_MARKER,
    };

    pub fn addresses(entries: &[(&str, &str)]) -> String {
        let mut out = String::from("Known transparent addresses:\n");
        for (alias, address) in entries {
            out.push_str(&format!("  \"{alias}\": Established: {address}\n"));
        }
        out
    }

    pub fn generated_key(alias: &str) -> String {
        format!("Successfully added a key and an address with alias: \"{alias}\"\n")
    }

    pub fn initialized_account(alias: &str, address: &str) -> String {
        format!(
            "{VALID_MARKER}\nThe address {address} has been added to the wallet with alias \"{alias}\".\n"
        )
    }

    pub fn epoch(epoch: u64) -> String {
        format!("Last committed epoch: {epoch}\n")
    }

    pub fn validators(addresses: &[&str]) -> String {
        let mut out = String::from("Consensus validators:\n");
        for address in addresses {
            out.push_str(&format!("  {address}: 1000\n"));
        }
        out.push_str(&format!("Total voting power: {}\n", addresses.len() * 1000));
        out
    }

    pub fn balances(owner: &str, amounts: &[(&str, u64)]) -> String {
        if amounts.is_empty() {
            return format!("No balances owned by {owner}\n");
        }
        let mut out = String::new();
        for (token, amount) in amounts {
            out.push_str(&format!("Token {token}:\n  {owner}: {amount}.000000\n"));
        }
        out
    }

    pub fn bonds(delegations: &[Bond], withdrawals: &[Unbond]) -> String {
        let mut out = String::new();
        for bond in delegations {
            out.push_str(&format!(
                "Delegations from {} to {}:\n  Active from epoch {}: Δ {}\n",
                bond.delegator, bond.validator, bond.epoch, bond.amount
            ));
        }
        for unbond in withdrawals {
            out.push_str(&format!(
                "Unbonded delegations from {} to {}:\n  Withdrawable from epoch {} (active from {}): Δ {}\n",
                unbond.delegator,
                unbond.validator,
                unbond.withdrawable_epoch,
                unbond.active_epoch,
                unbond.amount
            ));
        }
        out.push_str("Self-bonds from validator:\n  Active from epoch 0: Δ 1000\n");
        out
    }

    pub fn proposals(proposals: &[ProposalInfo]) -> String {
        if proposals.is_empty() {
            return "No proposals found.\n".to_string();
        }
        let mut out = String::new();
        for proposal in proposals {
            let status = match &proposal.status {
                ProposalStatus::Pending => "pending",
                ProposalStatus::OnGoing => "on-going",
                ProposalStatus::Ended => "ended",
                ProposalStatus::Other(other) => other.as_str(),
            };
            out.push_str(&format!(
                "Proposal Id: {}\n  Author: {}\n  Start Epoch: {}\n  End Epoch: {}\n  Status: {status}\n",
                proposal.id, proposal.author, proposal.start_epoch, proposal.end_epoch
            ));
        }
        out
    }

    /// An accepted transaction, optionally reporting the epoch it executed in.
    pub fn transaction(epoch: Option<u64>) -> String {
        match epoch {
            Some(epoch) => format!("{VALID_MARKER}\n{}", self::epoch(epoch)),
            None => format!("{VALID_MARKER}\n"),
        }
    }

    /// An accepted unbond transaction and the withdrawals it scheduled.
    pub fn unbond(schedule: &[Maturity]) -> String {
        let mut out = transaction(None);
        for maturity in schedule {
            out.push_str(&format!(
                "Amount {} withdrawable starting from epoch {}.\n",
                maturity.amount, maturity.epoch
            ));
        }
        out
    }
}
