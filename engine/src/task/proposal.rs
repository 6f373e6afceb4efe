use super::{affected, delta, Context, Handled};
use crate::Error;
use rand::Rng;
use serde::Serialize;
use stampede_client::{parser::Parser, Command, Executor};

/// Voting windows open and close on multiples of this many epochs.
///
/// Drawn epochs are rounded up rather than down, so a window never opens sooner than two
/// epochs after submission and never closes before the drawn length has elapsed.
const EPOCH_ALIGNMENT: u64 = 3;

const DISCUSSION_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const LOREM: &str = "Ut convallis eleifend orci vel venenatis. Duis vulputate metus in lacus \
    sollicitudin vestibulum. Suspendisse vel velit ac est consectetur feugiat nec ac urna.";

#[derive(Clone, Debug, Serialize)]
pub struct Content {
    pub title: String,
    pub authors: String,
    #[serde(rename = "discussions-to")]
    pub discussions_to: String,
    pub created: String,
    pub license: String,
    #[serde(rename = "abstract")]
    pub summary: String,
    pub motivation: String,
    pub details: String,
    pub requires: String,
}

/// Proposal document submitted with `init-proposal`.
#[derive(Clone, Debug, Serialize)]
pub struct Payload {
    pub content: Content,
    pub author: String,
    pub voting_start_epoch: u64,
    pub voting_end_epoch: u64,
    pub grace_epoch: u64,
}

impl Payload {
    /// A proposal by `author` whose voting opens at least two epochs after `epoch`.
    pub fn random<R: Rng + ?Sized>(author: &str, epoch: u64, rng: &mut R) -> Self {
        let start = align(epoch + rng.gen_range(2..=45));
        let end = align(start + rng.gen_range(EPOCH_ALIGNMENT..=45));
        let grace = end + rng.gen_range(6..=20);
        let discussion: String = (0..10)
            .map(|_| {
                DISCUSSION_ID_CHARSET[rng.gen_range(0..DISCUSSION_ID_CHARSET.len())] as char
            })
            .collect();
        Self {
            content: Content {
                title: "Proposal title".to_string(),
                authors: "load-tester@stampede.dev".to_string(),
                discussions_to: format!("www.github.com/stampede/proposals/{discussion}"),
                created: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
                license: "MIT".to_string(),
                summary: LOREM.to_string(),
                motivation: LOREM.to_string(),
                details: LOREM.to_string(),
                requires: "-1".to_string(),
            },
            author: author.to_string(),
            voting_start_epoch: start,
            voting_end_epoch: end,
            grace_epoch: grace,
        }
    }
}

fn align(epoch: u64) -> u64 {
    epoch.div_ceil(EPOCH_ALIGNMENT) * EPOCH_ALIGNMENT
}

/// Submit a proposal authored by an account that can afford the deposit.
pub(super) async fn handle<E: Executor, P: Parser>(
    ctx: &mut Context<E, P>,
    node: &str,
) -> Result<Handled, Error> {
    let epoch = ctx.parser.epoch(&query!(ctx, Command::epoch().at(node)))?;
    let native = std::slice::from_ref(&ctx.policy.native_token);
    let Some(author) = ctx.store.random_account_with_balance_greater_than(
        ctx.seed,
        ctx.policy.proposal_min_funds,
        Some(native),
        &mut ctx.rng,
    )?
    else {
        return Ok(Handled::Skipped);
    };

    let payload = Payload::random(&author.address, epoch, &mut ctx.rng);
    tokio::fs::create_dir_all(&ctx.artifacts).await?;
    let path = ctx.artifacts.join(format!("proposal-{}.json", ctx.seed));
    tokio::fs::write(&path, serde_json::to_vec_pretty(&payload)?).await?;

    let command = ctx.transaction(Command::init_proposal(&path.to_string_lossy()), node);
    let output = ctx.execute(&command).await?;
    if ctx.commit(&output) {
        let id = ctx
            .store
            .last_proposal_id(ctx.seed)?
            .map_or(0, |last| last + 1);
        ctx.store.create_proposal(
            ctx.seed,
            id,
            author.id,
            payload.voting_start_epoch,
            payload.voting_end_epoch,
        )?;
        let changed = ctx.store.update_balance(
            ctx.seed,
            &author.alias,
            &ctx.policy.native_token,
            -delta(ctx.policy.proposal_min_funds)?,
        )?;
        affected("update_balance", 1, changed)?;
    }
    Ok(Handled::ran(&command, output))
}
