//! Governance proposals submitted by synthetic accounts.

use crate::{int, pick, seed_key, Error, Id, Store};
use rand::Rng;
use rusqlite::{params, Row};

/// Number of epochs a proposal's voting window must already have been open for.
///
/// The current epoch may advance between the query used to select a proposal and the
/// submission of the vote, so only proposals whose window covers both the previous and the
/// current epoch are considered votable.
pub const VOTE_EPOCH_SLACK: u64 = 1;

const COLUMNS: &str = "id, seed, proposal_id, author_id, start_epoch, end_epoch";

/// A proposal, votable between `start_epoch` and `end_epoch`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub id: Id,
    pub seed: u64,
    /// Identifier assigned by the ledger.
    pub proposal_id: u64,
    pub author_id: Id,
    pub start_epoch: u64,
    pub end_epoch: u64,
}

impl Proposal {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            seed: row.get::<_, i64>(1)? as u64,
            proposal_id: row.get::<_, i64>(2)? as u64,
            author_id: row.get(3)?,
            start_epoch: row.get::<_, i64>(4)? as u64,
            end_epoch: row.get::<_, i64>(5)? as u64,
        })
    }
}

impl Store {
    /// Record a proposal, replacing the voting window of an already known `proposal_id`.
    pub fn create_proposal(
        &self,
        seed: u64,
        proposal_id: u64,
        author_id: Id,
        start_epoch: u64,
        end_epoch: u64,
    ) -> Result<Id, Error> {
        let id = self.conn()?.query_row(
            "INSERT INTO proposal (seed, proposal_id, author_id, start_epoch, end_epoch)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (seed, proposal_id) DO UPDATE SET
                author_id = excluded.author_id,
                start_epoch = excluded.start_epoch,
                end_epoch = excluded.end_epoch
             RETURNING id",
            params![
                seed_key(seed),
                int(proposal_id)?,
                author_id,
                int(start_epoch)?,
                int(end_epoch)?
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Every proposal of `seed`, ordered by ledger identifier.
    pub fn proposals(&self, seed: u64) -> Result<Vec<Proposal>, Error> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM proposal WHERE seed = ?1 ORDER BY proposal_id"
        ))?;
        let proposals = stmt
            .query_map([seed_key(seed)], Proposal::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(proposals)
    }

    /// The highest ledger identifier recorded for `seed`, if any.
    pub fn last_proposal_id(&self, seed: u64) -> Result<Option<u64>, Error> {
        let last: Option<i64> = self.conn()?.query_row(
            "SELECT MAX(proposal_id) FROM proposal WHERE seed = ?1",
            [seed_key(seed)],
            |row| row.get(0),
        )?;
        Ok(last.map(|id| id as u64))
    }

    /// Pick a proposal whose voting window contains both `epoch - 1` and `epoch`.
    pub fn random_votable_proposal<R: Rng + ?Sized>(
        &self,
        seed: u64,
        epoch: u64,
        rng: &mut R,
    ) -> Result<Option<Proposal>, Error> {
        let Some(opened_by) = epoch.checked_sub(VOTE_EPOCH_SLACK) else {
            return Ok(None);
        };
        let candidates = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM proposal
                 WHERE seed = ?1 AND start_epoch <= ?2 AND end_epoch >= ?3
                 ORDER BY proposal_id"
            ))?;
            let rows = stmt
                .query_map(
                    params![seed_key(seed), int(opened_by)?, int(epoch)?],
                    Proposal::from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        Ok(pick(candidates, rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_last_proposal_id() {
        let store = Store::in_memory().unwrap();
        let author = store.create_account(1, "a", "addr-a", "NAM", 100).unwrap();
        assert_eq!(store.last_proposal_id(1).unwrap(), None);

        store.create_proposal(1, 0, author, 3, 6).unwrap();
        assert_eq!(store.last_proposal_id(1).unwrap(), Some(0));
        store.create_proposal(1, 4, author, 3, 6).unwrap();
        store.create_proposal(1, 2, author, 3, 6).unwrap();
        assert_eq!(store.last_proposal_id(1).unwrap(), Some(4));
        assert_eq!(store.last_proposal_id(2).unwrap(), None);
    }

    #[test]
    fn test_create_proposal_is_idempotent() {
        let store = Store::in_memory().unwrap();
        let author = store.create_account(1, "a", "addr-a", "NAM", 100).unwrap();
        let first = store.create_proposal(1, 0, author, 3, 6).unwrap();
        let second = store.create_proposal(1, 0, author, 6, 9).unwrap();
        assert_eq!(first, second);

        let proposals = store.proposals(1).unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].start_epoch, 6);
        assert_eq!(proposals[0].end_epoch, 9);
    }

    #[test]
    fn test_random_votable_proposal_window() {
        let store = Store::in_memory().unwrap();
        let author = store.create_account(1, "a", "addr-a", "NAM", 100).unwrap();
        store.create_proposal(1, 0, author, 6, 9).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        let votable = |epoch| {
            store
                .random_votable_proposal(1, epoch, &mut StdRng::seed_from_u64(epoch))
                .unwrap()
                .is_some()
        };
        assert!(!votable(0));
        assert!(!votable(5));
        // Window must have been open during the previous epoch too
        assert!(!votable(6));
        assert!(votable(7));
        assert!(votable(9));
        assert!(!votable(10));

        assert!(store
            .random_votable_proposal(2, 7, &mut rng)
            .unwrap()
            .is_none());
    }
}
