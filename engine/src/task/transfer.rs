use super::{affected, delta, Context, Handled};
use crate::Error;
use rand::Rng;
use stampede_client::{parser::Parser, Command, Executor};

/// Move part of a funded account's balance to any account holding the same token.
pub(super) async fn handle<E: Executor, P: Parser>(
    ctx: &mut Context<E, P>,
    node: &str,
) -> Result<Handled, Error> {
    let Some(source) = ctx.store.random_account_with_balance_greater_than(
        ctx.seed,
        0,
        Some(ctx.policy.tokens.as_slice()),
        &mut ctx.rng,
    )?
    else {
        return Ok(Handled::Skipped);
    };
    let token = std::slice::from_ref(&source.token);
    let Some(target) = ctx
        .store
        .random_account(ctx.seed, Some(token), &mut ctx.rng)?
    else {
        return Ok(Handled::Skipped);
    };
    let amount = ctx.rng.gen_range(1..=source.balance);

    let signer = ctx.signer(&source.alias);
    let command = ctx.transaction(
        Command::transfer(&source.alias, &target.alias, signer, &source.token, amount),
        node,
    );
    let output = ctx.execute(&command).await?;
    if ctx.commit(&output) {
        let amount = delta(amount)?;
        let debited = ctx
            .store
            .update_balance(ctx.seed, &source.alias, &source.token, -amount)?;
        affected("update_balance", 1, debited)?;
        let credited = ctx
            .store
            .update_balance(ctx.seed, &target.alias, &target.token, amount)?;
        affected("update_balance", 1, credited)?;
    }
    Ok(Handled::ran(&command, output))
}
