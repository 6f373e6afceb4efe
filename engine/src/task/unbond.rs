use super::{affected, Context, Handled};
use crate::Error;
use stampede_client::{parser::Parser, Command, Executor};
use tracing::{debug, warn};

/// Unbond an active delegation in full, tracking the withdrawals it schedules.
pub(super) async fn handle<E: Executor, P: Parser>(
    ctx: &mut Context<E, P>,
    node: &str,
) -> Result<Handled, Error> {
    let epoch = ctx.parser.epoch(&query!(ctx, Command::epoch().at(node)))?;
    let Some(delegation) = ctx.store.random_valid_delegation(
        ctx.seed,
        epoch,
        ctx.policy.unbond_ceiling,
        &mut ctx.rng,
    )?
    else {
        return Ok(Handled::Skipped);
    };
    let account = ctx
        .store
        .account(delegation.account_id)?
        .ok_or(Error::Dangling {
            entity: "account",
            id: delegation.account_id,
        })?;
    let validator = ctx
        .store
        .validator(delegation.validator_id)?
        .ok_or(Error::Dangling {
            entity: "validator",
            id: delegation.validator_id,
        })?;

    let command = ctx.transaction(
        Command::unbond(&account.alias, &validator.address, delegation.amount),
        node,
    );
    let output = ctx.execute(&command).await?;
    if !ctx.commit(&output) {
        return Ok(Handled::ran(&command, output));
    }

    let schedule = ctx.parser.withdrawal_schedule(&output.stdout);
    if schedule.is_empty() {
        resync(ctx, node).await?;
    } else {
        for maturity in schedule {
            ctx.store.create_withdrawal(
                ctx.seed,
                account.id,
                validator.id,
                maturity.amount,
                maturity.epoch,
            )?;
        }
    }
    let deleted = ctx.store.delete_delegation(delegation.id)?;
    affected("delete_delegation", 1, deleted)?;
    Ok(Handled::ran(&command, output))
}

/// Replace this population's withdrawals with those listed by the node.
async fn resync<E: Executor, P: Parser>(ctx: &mut Context<E, P>, node: &str) -> Result<(), Error> {
    let command = Command::bonds().at(node);
    let output = ctx.execute(&command).await?;
    if !output.success {
        warn!(seed = ctx.seed, stderr = %output.stderr, "unable to list bonds, withdrawals not tracked");
        return Ok(());
    }
    let bonds = ctx.parser.bonds(&output.stdout)?;
    let removed = ctx.store.delete_all_withdrawals(ctx.seed)?;
    let mut imported = 0;
    for unbond in bonds.withdrawals {
        let Some(account) =
            ctx.store
                .account_by_address(ctx.seed, &unbond.delegator, &ctx.policy.native_token)?
        else {
            continue;
        };
        let Some(validator) = ctx.store.validator_by_address(ctx.seed, &unbond.validator)? else {
            continue;
        };
        ctx.store.create_withdrawal(
            ctx.seed,
            account.id,
            validator.id,
            unbond.amount,
            unbond.withdrawable_epoch,
        )?;
        imported += 1;
    }
    debug!(seed = ctx.seed, removed, imported, "resynchronized withdrawals");
    Ok(())
}
