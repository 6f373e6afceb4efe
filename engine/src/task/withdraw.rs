use super::{affected, delta, Context, Handled};
use crate::Error;
use stampede_client::{parser::Parser, Command, Executor};

/// Withdraw every matured unbond of a random (account, validator) pair.
pub(super) async fn handle<E: Executor, P: Parser>(
    ctx: &mut Context<E, P>,
    node: &str,
) -> Result<Handled, Error> {
    let epoch = ctx.parser.epoch(&query!(ctx, Command::epoch().at(node)))?;
    let Some(withdrawal) = ctx
        .store
        .random_withdrawable_withdrawal(ctx.seed, epoch, &mut ctx.rng)?
    else {
        return Ok(Handled::Skipped);
    };
    let account = ctx
        .store
        .account(withdrawal.account_id)?
        .ok_or(Error::Dangling {
            entity: "account",
            id: withdrawal.account_id,
        })?;
    let validator = ctx
        .store
        .validator(withdrawal.validator_id)?
        .ok_or(Error::Dangling {
            entity: "validator",
            id: withdrawal.validator_id,
        })?;
    let compatible =
        ctx.store
            .compatible_withdrawals(ctx.seed, account.id, validator.id, epoch)?;
    let total: u64 = compatible.iter().map(|w| w.amount).sum();

    let command = ctx.transaction(Command::withdraw(&account.alias, &validator.address), node);
    let output = ctx.execute(&command).await?;
    if ctx.commit(&output) {
        let mut deleted = 0;
        for withdrawal in &compatible {
            deleted += ctx.store.delete_withdrawal(withdrawal.id)?;
        }
        affected("delete_withdrawal", compatible.len(), deleted)?;
        let changed = ctx.store.update_balance(
            ctx.seed,
            &account.alias,
            &ctx.policy.native_token,
            delta(total)?,
        )?;
        affected("update_balance", 1, changed)?;
    }
    Ok(Handled::ran(&command, output))
}

#[cfg(test)]
mod tests {
    use crate::task::{fixtures::*, Outcome, TaskKind};
    use stampede_client::{mocks, Output};

    #[tokio::test]
    async fn test_aggregates_matured() {
        let executor = mocks::Executor::new();
        executor
            .set("epoch", Output::ok(mocks::console::epoch(10)))
            .set("withdraw", Output::ok(mocks::console::transaction(None)));
        let (mut ctx, _dir) = context(&executor);
        let delegator = account(&ctx, "a", 5);
        let validator = ctx.store.create_validator(SEED, "atest1v").unwrap();
        let other = ctx.store.create_validator(SEED, "atest1w").unwrap();
        ctx.store.create_withdrawal(SEED, delegator, validator, 30, 8).unwrap();
        ctx.store.create_withdrawal(SEED, delegator, validator, 20, 10).unwrap();
        let immature = ctx
            .store
            .create_withdrawal(SEED, delegator, validator, 40, 11)
            .unwrap();
        ctx.store.create_withdrawal(SEED, delegator, other, 7, 12).unwrap();

        let result = TaskKind::Withdraw.run(&mut ctx, 1, NODE).await.unwrap();
        assert_eq!(result.outcome, Outcome::Succeeded);
        assert_eq!(executor.calls()[1].value("--validator"), Some("atest1v"));

        let remaining: Vec<_> = ctx
            .store
            .withdrawals(SEED)
            .unwrap()
            .into_iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&immature));
        assert_eq!(balance(&ctx, "a", "XAN"), 5 + 30 + 20);
    }

    #[tokio::test]
    async fn test_nothing_mature() {
        let executor = mocks::Executor::new();
        executor.set("epoch", Output::ok(mocks::console::epoch(10)));
        let (mut ctx, _dir) = context(&executor);
        let delegator = account(&ctx, "a", 5);
        let validator = ctx.store.create_validator(SEED, "atest1v").unwrap();
        ctx.store.create_withdrawal(SEED, delegator, validator, 30, 10).unwrap();

        let result = TaskKind::Withdraw.run(&mut ctx, 1, NODE).await.unwrap();
        assert_eq!(result.outcome, Outcome::Skipped);
        assert_eq!(executor.count("withdraw"), 0);
    }

    #[tokio::test]
    async fn test_rejected_withdraw() {
        let executor = mocks::Executor::new();
        executor
            .set("epoch", Output::ok(mocks::console::epoch(10)))
            .set("withdraw", Output::classify("", "Transaction was rejected by VPs"));
        let (mut ctx, _dir) = context(&executor);
        let delegator = account(&ctx, "a", 5);
        let validator = ctx.store.create_validator(SEED, "atest1v").unwrap();
        ctx.store.create_withdrawal(SEED, delegator, validator, 30, 8).unwrap();

        let result = TaskKind::Withdraw.run(&mut ctx, 1, NODE).await.unwrap();
        assert!(result.is_error());
        assert_eq!(ctx.store.withdrawals(SEED).unwrap().len(), 1);
        assert_eq!(balance(&ctx, "a", "XAN"), 5);
    }
}
