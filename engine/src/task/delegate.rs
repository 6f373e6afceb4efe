use super::{affected, delta, Context, Handled};
use crate::Error;
use rand::Rng;
use stampede_client::{parser::Parser, Command, Executor};

/// Epochs between the execution of a bond and the epoch it becomes active.
pub const ACTIVE_EPOCH_WAIT: u64 = 2;

/// Bond part of a funded account's native balance to a random validator.
///
/// The epoch is queried before bonding, so a confirmed bond is always recorded. It is only
/// used when the bond does not report the epoch it executed in.
pub(super) async fn handle<E: Executor, P: Parser>(
    ctx: &mut Context<E, P>,
    node: &str,
) -> Result<Handled, Error> {
    let amount = ctx
        .rng
        .gen_range(ctx.policy.bond_min..=ctx.policy.bond_max);
    let native = std::slice::from_ref(&ctx.policy.native_token);
    let Some(delegator) = ctx.store.random_account_with_balance_greater_than(
        ctx.seed,
        amount,
        Some(native),
        &mut ctx.rng,
    )?
    else {
        return Ok(Handled::Skipped);
    };
    let Some(validator) = ctx.store.random_validator(ctx.seed, &mut ctx.rng)? else {
        return Ok(Handled::Skipped);
    };

    let queried = ctx.parser.epoch(&query!(ctx, Command::epoch().at(node)))?;

    let command = ctx.transaction(
        Command::bond(&delegator.alias, &validator.address, amount),
        node,
    );
    let output = ctx.execute(&command).await?;
    if !ctx.commit(&output) {
        return Ok(Handled::ran(&command, output));
    }

    let epoch = ctx
        .parser
        .execution_epoch(&output.stdout)
        .unwrap_or(queried);
    ctx.store.create_delegation(
        ctx.seed,
        delegator.id,
        validator.id,
        amount,
        epoch + ACTIVE_EPOCH_WAIT,
    )?;
    let changed = ctx.store.update_balance(
        ctx.seed,
        &delegator.alias,
        &ctx.policy.native_token,
        -delta(amount)?,
    )?;
    affected("update_balance", 1, changed)?;
    Ok(Handled::ran(&command, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{fixtures::*, Outcome, TaskKind};
    use stampede_client::{mocks, Output};

    #[tokio::test]
    async fn test_records_delegation() {
        let executor = mocks::Executor::new();
        executor
            .set("epoch", Output::ok(mocks::console::epoch(6)))
            .set("bond", Output::ok(mocks::console::transaction(Some(7))));
        let (mut ctx, _dir) = context(&executor);
        let delegator = account(&ctx, "a", 1_000);
        let validator = ctx.store.create_validator(SEED, "atest1v").unwrap();

        let result = TaskKind::Delegate.run(&mut ctx, 1, NODE).await.unwrap();
        assert_eq!(result.outcome, Outcome::Succeeded);

        let delegations = ctx.store.delegations(SEED).unwrap();
        assert_eq!(delegations.len(), 1);
        let delegation = &delegations[0];
        assert_eq!(delegation.account_id, delegator);
        assert_eq!(delegation.validator_id, validator);
        assert_eq!(delegation.epoch, 7 + ACTIVE_EPOCH_WAIT);
        assert!((10..=100).contains(&delegation.amount));
        assert_eq!(balance(&ctx, "a", "XAN"), 1_000 - delegation.amount);
        assert_eq!(executor.count("epoch"), 1);
    }

    #[tokio::test]
    async fn test_queries_epoch_when_unreported() {
        let executor = mocks::Executor::new();
        executor
            .set("bond", Output::ok(mocks::console::transaction(None)))
            .set("epoch", Output::ok(mocks::console::epoch(3)));
        let (mut ctx, _dir) = context(&executor);
        account(&ctx, "a", 1_000);
        ctx.store.create_validator(SEED, "atest1v").unwrap();

        TaskKind::Delegate.run(&mut ctx, 1, NODE).await.unwrap();
        let delegations = ctx.store.delegations(SEED).unwrap();
        assert_eq!(delegations[0].epoch, 3 + ACTIVE_EPOCH_WAIT);
        assert_eq!(executor.count("epoch"), 1);
    }

    #[tokio::test]
    async fn test_epoch_failure_before_bond() {
        let executor = mocks::Executor::new();
        executor.set("bond", Output::ok(mocks::console::transaction(None)));
        let (mut ctx, _dir) = context(&executor);
        account(&ctx, "a", 1_000);
        ctx.store.create_validator(SEED, "atest1v").unwrap();

        let result = TaskKind::Delegate.run(&mut ctx, 1, NODE).await.unwrap();
        assert!(result.is_error());
        assert!(result.command.contains("epoch"));
        assert_eq!(executor.count("bond"), 0);
        assert!(ctx.store.delegations(SEED).unwrap().is_empty());
        assert_eq!(balance(&ctx, "a", "XAN"), 1_000);
    }

    #[tokio::test]
    async fn test_confirmed_bond_is_recorded() {
        let executor = mocks::Executor::new();
        // The epoch becomes unavailable once the bond has been submitted
        executor
            .push("epoch", Output::ok(mocks::console::epoch(3)))
            .set("epoch", Output::failed("connection refused"))
            .set("bond", Output::ok(mocks::console::transaction(None)));
        let (mut ctx, _dir) = context(&executor);
        account(&ctx, "a", 1_000);
        ctx.store.create_validator(SEED, "atest1v").unwrap();

        let result = TaskKind::Delegate.run(&mut ctx, 1, NODE).await.unwrap();
        assert_eq!(result.outcome, Outcome::Succeeded);
        assert!(result.command.starts_with("client bond"));
        assert_eq!(executor.count("epoch"), 1);

        let delegations = ctx.store.delegations(SEED).unwrap();
        assert_eq!(delegations.len(), 1);
        assert_eq!(delegations[0].epoch, 3 + ACTIVE_EPOCH_WAIT);
        assert_eq!(balance(&ctx, "a", "XAN"), 1_000 - delegations[0].amount);
    }

    #[tokio::test]
    async fn test_requires_funds_and_validator() {
        let executor = mocks::Executor::new();
        let (mut ctx, _dir) = context(&executor);
        account(&ctx, "a", 5);
        ctx.store.create_validator(SEED, "atest1v").unwrap();
        let result = TaskKind::Delegate.run(&mut ctx, 1, NODE).await.unwrap();
        assert_eq!(result.outcome, Outcome::Skipped);

        let (mut ctx, _dir) = context(&executor);
        account(&ctx, "a", 1_000);
        let result = TaskKind::Delegate.run(&mut ctx, 1, NODE).await.unwrap();
        assert_eq!(result.outcome, Outcome::Skipped);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_bond() {
        let executor = mocks::Executor::new();
        executor
            .set("epoch", Output::ok(mocks::console::epoch(3)))
            .set("bond", Output::classify("Transaction is invalid.", ""));
        let (mut ctx, _dir) = context(&executor);
        account(&ctx, "a", 1_000);
        ctx.store.create_validator(SEED, "atest1v").unwrap();

        let result = TaskKind::Delegate.run(&mut ctx, 1, NODE).await.unwrap();
        assert!(result.is_error());
        assert!(ctx.store.delegations(SEED).unwrap().is_empty());
        assert_eq!(balance(&ctx, "a", "XAN"), 1_000);
    }
}
