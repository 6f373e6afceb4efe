//! Structured invocations of the node client.

use std::fmt;

/// Sub-binary of the node client a [Command] is addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binary {
    Wallet,
    Client,
}

impl Binary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A governance vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Vote {
    Yay,
    Nay,
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yay => f.write_str("yay"),
            Self::Nay => f.write_str("nay"),
        }
    }
}

/// One invocation of the node client, minus the base binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    binary: Binary,
    operation: &'static str,
    params: Vec<(&'static str, Option<String>)>,
    node: Option<String>,
}

impl Command {
    pub fn new(binary: Binary, operation: &'static str) -> Self {
        Self {
            binary,
            operation,
            params: Vec::new(),
            node: None,
        }
    }

    /// Append `flag value`.
    pub fn arg(mut self, flag: &'static str, value: impl ToString) -> Self {
        self.params.push((flag, Some(value.to_string())));
        self
    }

    /// Append a flag that takes no value.
    pub fn flag(mut self, flag: &'static str) -> Self {
        self.params.push((flag, None));
        self
    }

    /// Target the node listening at `node`.
    pub fn at(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Ask the node to simulate (rather than apply) a transaction.
    pub fn dry_run(self, enabled: bool) -> Self {
        if enabled {
            self.flag("--dry-run")
        } else {
            self
        }
    }

    pub fn binary(&self) -> Binary {
        self.binary
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// Value passed to `flag`, if any.
    pub fn value(&self, flag: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| *name == flag)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn has(&self, flag: &str) -> bool {
        self.params.iter().any(|(name, _)| *name == flag)
    }

    /// Arguments to pass to the base binary.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![self.binary.as_str().to_string()];
        args.extend(self.operation.split_whitespace().map(str::to_string));
        for (flag, value) in &self.params {
            args.push(flag.to_string());
            if let Some(value) = value {
                args.push(value.clone());
            }
        }
        if let Some(node) = &self.node {
            args.push("--ledger-address".to_string());
            args.push(node.clone());
        }
        args
    }

    pub fn address_list() -> Self {
        Self::new(Binary::Wallet, "address list")
    }

    pub fn generate_key(alias: &str) -> Self {
        Self::new(Binary::Wallet, "key gen")
            .arg("--alias", alias)
            .flag("--unsafe-dont-encrypt")
    }

    pub fn epoch() -> Self {
        Self::new(Binary::Client, "epoch")
    }

    pub fn validators() -> Self {
        Self::new(Binary::Client, "voting-power")
    }

    pub fn balance(owner: &str) -> Self {
        Self::new(Binary::Client, "balance").arg("--owner", owner)
    }

    pub fn bonds() -> Self {
        Self::new(Binary::Client, "bonds")
    }

    pub fn proposals() -> Self {
        Self::new(Binary::Client, "query-proposal")
    }

    /// Initialize an established account `alias` controlled by `key`.
    pub fn init_account(alias: &str, key: &str) -> Self {
        Self::new(Binary::Client, "init-account")
            .arg("--alias", alias)
            .arg("--public-key", key)
            .arg("--source", key)
    }

    pub fn faucet(target: &str, signer: &str, token: &str, amount: u64) -> Self {
        Self::new(Binary::Client, "transfer")
            .arg("--source", "faucet")
            .arg("--target", target)
            .arg("--signer", signer)
            .arg("--token", token)
            .arg("--amount", amount)
    }

    pub fn transfer(source: &str, target: &str, signer: &str, token: &str, amount: u64) -> Self {
        Self::new(Binary::Client, "transfer")
            .arg("--source", source)
            .arg("--target", target)
            .arg("--signer", signer)
            .arg("--token", token)
            .arg("--amount", amount)
    }

    pub fn bond(source: &str, validator: &str, amount: u64) -> Self {
        Self::new(Binary::Client, "bond")
            .arg("--source", source)
            .arg("--validator", validator)
            .arg("--amount", amount)
    }

    pub fn unbond(source: &str, validator: &str, amount: u64) -> Self {
        Self::new(Binary::Client, "unbond")
            .arg("--source", source)
            .arg("--validator", validator)
            .arg("--amount", amount)
    }

    pub fn withdraw(source: &str, validator: &str) -> Self {
        Self::new(Binary::Client, "withdraw")
            .arg("--source", source)
            .arg("--validator", validator)
    }

    pub fn init_proposal(data_path: &str) -> Self {
        Self::new(Binary::Client, "init-proposal").arg("--data-path", data_path)
    }

    pub fn vote_proposal(proposal_id: u64, vote: Vote, signer: &str) -> Self {
        Self::new(Binary::Client, "vote-proposal")
            .arg("--proposal-id", proposal_id)
            .arg("--vote", vote)
            .arg("--signer", signer)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args().join(" "))
    }
}
