use super::{Context, Handled};
use crate::Error;
use rand::Rng;
use stampede_client::{parser::Parser, Command, Executor, Output};
use std::collections::BTreeMap;
use tracing::info;

/// Generate a wallet key alias (`xxx-xxx-xxx-xxx-<seed>`).
fn key_alias<R: Rng + ?Sized>(rng: &mut R, seed: u64) -> String {
    let mut alias = String::new();
    for _ in 0..4 {
        for _ in 0..3 {
            alias.push(rng.gen_range(b'a'..=b'z') as char);
        }
        alias.push('-');
    }
    alias.push_str(&seed.to_string());
    alias
}

/// Run a bootstrap query, failing the bootstrap if the node cannot answer it.
async fn require<E: Executor, P: Parser>(
    ctx: &Context<E, P>,
    command: Command,
    what: &str,
) -> Result<String, Error> {
    let output = ctx.execute(&command).await?;
    if !output.success {
        return Err(Error::Init(format!("unable to {what}: {}", output.stderr.trim())));
    }
    Ok(output.stdout)
}

/// Import this population's existing ledger state and top it up to the configured size.
///
/// Safe to run against an already populated store: accounts, validators, and proposals are
/// updated in place, and this population's bonds are replaced by those currently listed.
pub(super) async fn handle<E: Executor, P: Parser>(
    ctx: &mut Context<E, P>,
    node: &str,
) -> Result<Handled, Error> {
    let prefix = format!("{}-", ctx.policy.account_prefix);
    let suffix = format!("-{}", ctx.seed);
    let listed = require(ctx, Command::address_list(), "list wallet addresses").await?;
    let mut accounts: Vec<(String, String)> = ctx
        .parser
        .wallet_addresses(&listed)?
        .into_iter()
        .filter(|(alias, _)| alias.starts_with(&prefix) && alias.ends_with(&suffix))
        .collect();
    info!(seed = ctx.seed, accounts = accounts.len(), "found accounts");

    let validators = require(ctx, Command::validators().at(node), "list validators").await?;
    let validators = ctx.parser.validators(&validators)?;
    let bonds = require(ctx, Command::bonds().at(node), "list bonds").await?;
    let bonds = ctx.parser.bonds(&bonds)?;
    let proposals = require(ctx, Command::proposals().at(node), "list proposals").await?;
    let proposals = ctx.parser.proposals(&proposals)?;
    info!(
        seed = ctx.seed,
        validators = validators.len(),
        delegations = bonds.delegations.len(),
        withdrawals = bonds.withdrawals.len(),
        proposals = proposals.len(),
        "listed ledger state"
    );

    while accounts.len() < ctx.policy.min_accounts {
        let key = key_alias(&mut ctx.rng, ctx.seed);
        let generated = require(ctx, Command::generate_key(&key), "generate key").await?;
        let key = ctx.parser.generated_key(&generated)?;
        let alias = format!("{prefix}{key}");
        let initialized = require(
            ctx,
            Command::init_account(&alias, &key).at(node),
            "initialize account",
        )
        .await?;
        let (alias, address) = ctx.parser.initialized_account(&initialized)?;
        info!(seed = ctx.seed, %alias, %address, "created account");
        accounts.push((alias, address));
    }

    let mut balances: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    for (alias, _) in &accounts {
        let listed = require(ctx, Command::balance(alias).at(node), "query balance").await?;
        balances.insert(alias.clone(), ctx.parser.balances(&listed)?);
    }

    let store = &ctx.store;
    let seed = ctx.seed;
    for (alias, address) in &accounts {
        for token in &ctx.policy.tokens {
            let balance = balances
                .get(alias)
                .and_then(|owned| owned.get(token))
                .copied()
                .unwrap_or_default();
            store.create_account(seed, alias, address, token, balance)?;
        }
    }
    for address in &validators {
        store.create_validator(seed, address)?;
    }

    store.delete_all_delegations(seed)?;
    store.delete_all_withdrawals(seed)?;
    let native = &ctx.policy.native_token;
    let mut imported = (0, 0, 0);
    for bond in &bonds.delegations {
        let (Some(account), Some(validator)) = (
            store.account_by_address(seed, &bond.delegator, native)?,
            store.validator_by_address(seed, &bond.validator)?,
        ) else {
            continue;
        };
        store.create_delegation(seed, account.id, validator.id, bond.amount, bond.epoch)?;
        imported.0 += 1;
    }
    for unbond in &bonds.withdrawals {
        let (Some(account), Some(validator)) = (
            store.account_by_address(seed, &unbond.delegator, native)?,
            store.validator_by_address(seed, &unbond.validator)?,
        ) else {
            continue;
        };
        store.create_withdrawal(
            seed,
            account.id,
            validator.id,
            unbond.amount,
            unbond.withdrawable_epoch,
        )?;
        imported.1 += 1;
    }
    for proposal in proposals.iter().filter(|p| p.status.is_open()) {
        let Some(author) = store.account_by_address(seed, &proposal.author, native)? else {
            continue;
        };
        store.create_proposal(
            seed,
            proposal.id,
            author.id,
            proposal.start_epoch,
            proposal.end_epoch,
        )?;
        imported.2 += 1;
    }
    info!(
        seed,
        accounts = accounts.len(),
        delegations = imported.0,
        withdrawals = imported.1,
        proposals = imported.2,
        "initialized store"
    );

    Ok(Handled::Ran {
        command: String::new(),
        output: Output::ok(String::new()),
    })
}
