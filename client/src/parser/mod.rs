//! Decode structured data from text printed by the node client.
//!
//! The [Parser] trait is the only place that knows how the client formats its output, so a
//! client release that changes a format only requires a new implementation. [Console] decodes
//! the console format of the current client.

use crate::Error;
use std::collections::BTreeMap;

mod console;
pub use console::Console;

/// An active (or pending) bond listed by the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bond {
    pub delegator: String,
    pub validator: String,
    /// Epoch from which the bond counts towards the validator's stake.
    pub epoch: u64,
    pub amount: u64,
}

/// An unbonded amount waiting to become withdrawable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unbond {
    pub delegator: String,
    pub validator: String,
    pub withdrawable_epoch: u64,
    pub active_epoch: u64,
    pub amount: u64,
}

/// Every bond and unbond listed by the node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bonds {
    pub delegations: Vec<Bond>,
    pub withdrawals: Vec<Unbond>,
}

/// Status of a governance proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProposalStatus {
    Pending,
    OnGoing,
    Ended,
    Other(String),
}

impl ProposalStatus {
    pub fn parse(status: &str) -> Self {
        match status.trim() {
            "pending" => Self::Pending,
            "on-going" => Self::OnGoing,
            "ended" => Self::Ended,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether votes may still be cast (now or in the future).
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::OnGoing)
    }
}

/// A governance proposal listed by the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalInfo {
    pub id: u64,
    pub author: String,
    pub start_epoch: u64,
    pub end_epoch: u64,
    pub status: ProposalStatus,
}

/// An amount that becomes withdrawable at `epoch`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Maturity {
    pub amount: u64,
    pub epoch: u64,
}

/// Decodes the output of each query and transaction issued by a load generator.
pub trait Parser: Send + Sync + 'static {
    /// `(alias, address)` of every address known to the wallet.
    fn wallet_addresses(&self, output: &str) -> Result<Vec<(String, String)>, Error>;

    /// Alias under which a freshly generated key was stored.
    fn generated_key(&self, output: &str) -> Result<String, Error>;

    /// `(alias, address)` of a freshly initialized account.
    fn initialized_account(&self, output: &str) -> Result<(String, String), Error>;

    /// Last committed epoch.
    fn epoch(&self, output: &str) -> Result<u64, Error>;

    /// Addresses of every validator with voting power.
    fn validators(&self, output: &str) -> Result<Vec<String>, Error>;

    /// Balance of one owner, by token.
    fn balances(&self, output: &str) -> Result<BTreeMap<String, u64>, Error>;

    fn bonds(&self, output: &str) -> Result<Bonds, Error>;

    fn proposals(&self, output: &str) -> Result<Vec<ProposalInfo>, Error>;

    /// Epoch a transaction executed in, when the client reported it.
    fn execution_epoch(&self, output: &str) -> Option<u64>;

    /// Amounts (and when they mature) released by an unbond transaction.
    fn withdrawal_schedule(&self, output: &str) -> Vec<Maturity>;
}
