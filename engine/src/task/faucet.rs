use super::{affected, delta, Context, Handled};
use crate::Error;
use rand::Rng;
use stampede_client::{parser::Parser, Command, Executor};

/// Credit a random account with a random amount of the token it holds.
pub(super) async fn handle<E: Executor, P: Parser>(
    ctx: &mut Context<E, P>,
    node: &str,
) -> Result<Handled, Error> {
    let Some(account) = ctx
        .store
        .random_account(ctx.seed, Some(ctx.policy.tokens.as_slice()), &mut ctx.rng)?
    else {
        return Ok(Handled::Skipped);
    };
    let amount = ctx.rng.gen_range(1..=ctx.policy.faucet_limit);

    let signer = ctx.signer(&account.alias);
    let command = ctx.transaction(
        Command::faucet(&account.alias, signer, &account.token, amount),
        node,
    );
    let output = ctx.execute(&command).await?;
    if ctx.commit(&output) {
        let changed =
            ctx.store
                .update_balance(ctx.seed, &account.alias, &account.token, delta(amount)?)?;
        affected("update_balance", 1, changed)?;
    }
    Ok(Handled::ran(&command, output))
}
