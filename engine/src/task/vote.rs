use super::{Context, Handled};
use crate::Error;
use rand::Rng;
use stampede_client::{parser::Parser, Command, Executor, Vote};

/// Cast a random vote on an open proposal, signed by an active delegator.
///
/// Votes are not tracked, so nothing is recorded on success.
pub(super) async fn handle<E: Executor, P: Parser>(
    ctx: &mut Context<E, P>,
    node: &str,
) -> Result<Handled, Error> {
    let epoch = ctx.parser.epoch(&query!(ctx, Command::epoch().at(node)))?;
    let Some(proposal) = ctx
        .store
        .random_votable_proposal(ctx.seed, epoch, &mut ctx.rng)?
    else {
        return Ok(Handled::Skipped);
    };
    let Some(delegation) = ctx.store.random_valid_delegation(
        ctx.seed,
        epoch,
        ctx.policy.unbond_ceiling,
        &mut ctx.rng,
    )?
    else {
        return Ok(Handled::Skipped);
    };
    let voter = ctx
        .store
        .account(delegation.account_id)?
        .ok_or(Error::Dangling {
            entity: "account",
            id: delegation.account_id,
        })?;
    let vote = if ctx.rng.gen_bool(0.5) {
        Vote::Yay
    } else {
        Vote::Nay
    };

    let signer = ctx.signer(&voter.alias);
    let command = ctx.transaction(
        Command::vote_proposal(proposal.proposal_id, vote, signer),
        node,
    );
    let output = ctx.execute(&command).await?;
    Ok(Handled::ran(&command, output))
}

#[cfg(test)]
mod tests {
    use crate::task::{fixtures::*, Outcome, TaskKind};
    use stampede_client::{mocks, Output};

    #[tokio::test]
    async fn test_votes_with_delegator() {
        let executor = mocks::Executor::new();
        executor
            .set("epoch", Output::ok(mocks::console::epoch(8)))
            .set("vote-proposal", Output::ok(mocks::console::transaction(None)));
        let (mut ctx, _dir) = context(&executor);
        let voter = account(&ctx, "a", 10);
        let validator = ctx.store.create_validator(SEED, "atest1v").unwrap();
        ctx.store.create_delegation(SEED, voter, validator, 50, 3).unwrap();
        ctx.store.create_proposal(SEED, 4, voter, 6, 9).unwrap();

        let result = TaskKind::VoteProposal.run(&mut ctx, 1, NODE).await.unwrap();
        assert_eq!(result.outcome, Outcome::Succeeded);
        let calls = executor.calls();
        let call = &calls[1];
        assert_eq!(call.value("--proposal-id"), Some("4"));
        assert_eq!(call.value("--signer"), Some("a"));
        assert!(matches!(call.value("--vote"), Some("yay") | Some("nay")));
        assert_eq!(balance(&ctx, "a", "XAN"), 10);
    }

    #[tokio::test]
    async fn test_needs_open_proposal_and_delegation() {
        let executor = mocks::Executor::new();
        executor.set("epoch", Output::ok(mocks::console::epoch(8)));
        let (mut ctx, _dir) = context(&executor);
        let voter = account(&ctx, "a", 10);
        ctx.store.create_proposal(SEED, 0, voter, 6, 9).unwrap();

        // Open proposal, no delegation
        let result = TaskKind::VoteProposal.run(&mut ctx, 1, NODE).await.unwrap();
        assert_eq!(result.outcome, Outcome::Skipped);

        // Delegation, but the window has closed
        let validator = ctx.store.create_validator(SEED, "atest1v").unwrap();
        ctx.store.create_delegation(SEED, voter, validator, 50, 3).unwrap();
        executor.set("epoch", Output::ok(mocks::console::epoch(10)));
        let result = TaskKind::VoteProposal.run(&mut ctx, 2, NODE).await.unwrap();
        assert_eq!(result.outcome, Outcome::Skipped);
        assert_eq!(executor.count("vote-proposal"), 0);
    }
}
