//! Delegations (bonded stake awaiting or past activation) and withdrawals (unbonded stake
//! awaiting or past maturity).

use crate::{int, pick, seed_key, Error, Id, Store};
use rand::Rng;
use rusqlite::{params, Row};

/// Number of epochs a withdrawal must have been mature for before it is selected.
///
/// The epoch used for selection is queried from one request and the withdrawal is submitted in
/// another, possibly to a node that has not yet observed the latest epoch. Aggregation
/// ([Store::compatible_withdrawals]) still includes everything mature at the queried epoch,
/// since the ledger withdraws all of it at once.
pub const WITHDRAW_EPOCH_SLACK: u64 = 1;

const COLUMNS: &str = "id, seed, account_id, validator_id, amount, epoch";

/// Stake bonded by an account to a validator, usable once `epoch` has passed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delegation {
    pub id: Id,
    pub seed: u64,
    pub account_id: Id,
    pub validator_id: Id,
    pub amount: u64,
    /// Epoch at which the bond becomes active.
    pub epoch: u64,
}

/// Stake unbonded from a validator, withdrawable from `epoch` on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Withdrawal {
    pub id: Id,
    pub seed: u64,
    pub account_id: Id,
    pub validator_id: Id,
    pub amount: u64,
    /// Epoch from which the stake can be withdrawn.
    pub epoch: u64,
}

macro_rules! from_row {
    ($ty:ident) => {
        impl $ty {
            fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
                Ok(Self {
                    id: row.get(0)?,
                    seed: row.get::<_, i64>(1)? as u64,
                    account_id: row.get(2)?,
                    validator_id: row.get(3)?,
                    amount: row.get::<_, i64>(4)? as u64,
                    epoch: row.get::<_, i64>(5)? as u64,
                })
            }
        }
    };
}

from_row!(Delegation);
from_row!(Withdrawal);

impl Store {
    pub fn create_delegation(
        &self,
        seed: u64,
        account_id: Id,
        validator_id: Id,
        amount: u64,
        epoch: u64,
    ) -> Result<Id, Error> {
        let id = self.conn()?.query_row(
            "INSERT INTO delegation (seed, account_id, validator_id, amount, epoch)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id",
            params![seed_key(seed), account_id, validator_id, int(amount)?, int(epoch)?],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Every delegation of `seed`, in insertion order.
    pub fn delegations(&self, seed: u64) -> Result<Vec<Delegation>, Error> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM delegation WHERE seed = ?1 ORDER BY id"
        ))?;
        let delegations = stmt
            .query_map([seed_key(seed)], Delegation::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(delegations)
    }

    /// Pick a delegation that became active before `epoch` and holds at most `ceiling`.
    pub fn random_valid_delegation<R: Rng + ?Sized>(
        &self,
        seed: u64,
        epoch: u64,
        ceiling: u64,
        rng: &mut R,
    ) -> Result<Option<Delegation>, Error> {
        let candidates = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM delegation
                 WHERE seed = ?1 AND epoch < ?2 AND amount <= ?3
                 ORDER BY id"
            ))?;
            let rows = stmt
                .query_map(
                    params![seed_key(seed), int(epoch)?, int(ceiling)?],
                    Delegation::from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        Ok(pick(candidates, rng))
    }

    pub fn delete_delegation(&self, id: Id) -> Result<usize, Error> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM delegation WHERE id = ?1", [id])?;
        Ok(deleted)
    }

    pub fn delete_all_delegations(&self, seed: u64) -> Result<usize, Error> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM delegation WHERE seed = ?1", [seed_key(seed)])?;
        Ok(deleted)
    }

    /// Record `amount` unbonded from `validator_id` that matures at `epoch`.
    ///
    /// Unbonds of the same pair maturing in the same epoch are withdrawn together, so they
    /// share one row whose amount is their sum. Returns the id of that row.
    pub fn create_withdrawal(
        &self,
        seed: u64,
        account_id: Id,
        validator_id: Id,
        amount: u64,
        epoch: u64,
    ) -> Result<Id, Error> {
        let (seed, amount, epoch) = (seed_key(seed), int(amount)?, int(epoch)?);
        let id = self.conn()?.query_row(
            "INSERT INTO withdrawal (seed, account_id, validator_id, amount, epoch)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (seed, account_id, validator_id, epoch)
             DO UPDATE SET amount = amount + excluded.amount
             RETURNING id",
            params![seed, account_id, validator_id, amount, epoch],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Every withdrawal of `seed`, in insertion order.
    pub fn withdrawals(&self, seed: u64) -> Result<Vec<Withdrawal>, Error> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM withdrawal WHERE seed = ?1 ORDER BY id"
        ))?;
        let withdrawals = stmt
            .query_map([seed_key(seed)], Withdrawal::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(withdrawals)
    }

    /// Pick a withdrawal that has been mature for at least [WITHDRAW_EPOCH_SLACK] epochs.
    pub fn random_withdrawable_withdrawal<R: Rng + ?Sized>(
        &self,
        seed: u64,
        epoch: u64,
        rng: &mut R,
    ) -> Result<Option<Withdrawal>, Error> {
        let Some(mature) = epoch.checked_sub(WITHDRAW_EPOCH_SLACK) else {
            return Ok(None);
        };
        let candidates = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM withdrawal
                 WHERE seed = ?1 AND epoch <= ?2
                 ORDER BY id"
            ))?;
            let rows = stmt
                .query_map(params![seed_key(seed), int(mature)?], Withdrawal::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        Ok(pick(candidates, rng))
    }

    /// Every withdrawal of `account_id` from `validator_id` that is mature at `epoch`.
    ///
    /// The ledger withdraws all matured stake of an (account, validator) pair in one
    /// transaction, so this is the set a single withdraw consumes.
    pub fn compatible_withdrawals(
        &self,
        seed: u64,
        account_id: Id,
        validator_id: Id,
        epoch: u64,
    ) -> Result<Vec<Withdrawal>, Error> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM withdrawal
             WHERE seed = ?1 AND account_id = ?2 AND validator_id = ?3 AND epoch <= ?4
             ORDER BY id"
        ))?;
        let withdrawals = stmt
            .query_map(
                params![seed_key(seed), account_id, validator_id, int(epoch)?],
                Withdrawal::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(withdrawals)
    }

    pub fn delete_withdrawal(&self, id: Id) -> Result<usize, Error> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM withdrawal WHERE id = ?1", [id])?;
        Ok(deleted)
    }

    pub fn delete_all_withdrawals(&self, seed: u64) -> Result<usize, Error> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM withdrawal WHERE seed = ?1", [seed_key(seed)])?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn setup() -> (Store, Id, Id) {
        let store = Store::in_memory().unwrap();
        let account = store.create_account(1, "a", "addr-a", "NAM", 100).unwrap();
        let validator = store.create_validator(1, "val").unwrap();
        (store, account, validator)
    }

    #[test]
    fn test_random_valid_delegation() {
        let (store, account, validator) = setup();
        let pending = store
            .create_delegation(1, account, validator, 10, 5)
            .unwrap();
        let huge = store
            .create_delegation(1, account, validator, 1_000, 1)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        // Activation epoch must be strictly in the past
        assert!(store
            .random_valid_delegation(1, 5, 100, &mut rng)
            .unwrap()
            .is_none());
        let delegation = store
            .random_valid_delegation(1, 6, 100, &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(delegation.id, pending);

        // Ceiling excludes large delegations
        let delegation = store
            .random_valid_delegation(1, 6, 1_000, &mut rng)
            .unwrap()
            .unwrap();
        assert!(delegation.id == pending || delegation.id == huge);
    }

    #[test]
    fn test_delete_delegation() {
        let (store, account, validator) = setup();
        let id = store
            .create_delegation(1, account, validator, 10, 5)
            .unwrap();
        assert_eq!(store.delete_delegation(id).unwrap(), 1);
        assert_eq!(store.delete_delegation(id).unwrap(), 0);
    }

    #[test]
    fn test_create_withdrawal_accumulates() {
        let (store, account, validator) = setup();
        let first = store
            .create_withdrawal(1, account, validator, 50, 11)
            .unwrap();
        let second = store
            .create_withdrawal(1, account, validator, 50, 11)
            .unwrap();
        assert_eq!(first, second);
        let withdrawals = store.withdrawals(1).unwrap();
        assert_eq!(withdrawals.len(), 1);
        assert_eq!(withdrawals[0].amount, 100);

        // Other epochs and other seeds stay separate
        store
            .create_withdrawal(1, account, validator, 50, 12)
            .unwrap();
        assert_eq!(store.withdrawals(1).unwrap().len(), 2);
        let other = store.create_account(2, "b", "addr-b", "NAM", 0).unwrap();
        let other_validator = store.create_validator(2, "val").unwrap();
        store
            .create_withdrawal(2, other, other_validator, 50, 11)
            .unwrap();
        assert_eq!(store.withdrawals(1).unwrap()[0].amount, 100);
        assert_eq!(store.withdrawals(2).unwrap()[0].amount, 50);
    }

    #[test]
    fn test_random_withdrawable_withdrawal() {
        let (store, account, validator) = setup();
        store
            .create_withdrawal(1, account, validator, 10, 7)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        assert!(store
            .random_withdrawable_withdrawal(1, 0, &mut rng)
            .unwrap()
            .is_none());
        assert!(store
            .random_withdrawable_withdrawal(1, 7, &mut rng)
            .unwrap()
            .is_none());
        assert!(store
            .random_withdrawable_withdrawal(1, 8, &mut rng)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_compatible_withdrawals() {
        let (store, account, validator) = setup();
        let other_validator = store.create_validator(1, "val-2").unwrap();
        let other_account = store.create_account(1, "b", "addr-b", "NAM", 0).unwrap();

        let early = store
            .create_withdrawal(1, account, validator, 10, 3)
            .unwrap();
        let on_time = store
            .create_withdrawal(1, account, validator, 20, 8)
            .unwrap();
        store
            .create_withdrawal(1, account, validator, 40, 9)
            .unwrap();
        store
            .create_withdrawal(1, account, other_validator, 80, 3)
            .unwrap();
        store
            .create_withdrawal(1, other_account, validator, 160, 3)
            .unwrap();

        let compatible = store
            .compatible_withdrawals(1, account, validator, 8)
            .unwrap();
        let ids: Vec<_> = compatible.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![early, on_time]);
        assert_eq!(compatible.iter().map(|w| w.amount).sum::<u64>(), 30);
    }

    #[test]
    fn test_delete_all_withdrawals() {
        let (store, account, validator) = setup();
        store
            .create_withdrawal(1, account, validator, 10, 3)
            .unwrap();
        store
            .create_withdrawal(1, account, validator, 20, 4)
            .unwrap();
        assert_eq!(store.delete_all_withdrawals(1).unwrap(), 2);
        assert!(store.withdrawals(1).unwrap().is_empty());
    }
}
