//! Accounts (one row per alias and token) and validators.

use crate::{int, pick, seed_key, Error, Id, Store};
use rand::Rng;
use rusqlite::{params, OptionalExtension, Row};

const ACCOUNT_COLUMNS: &str = "id, seed, alias, address, token, balance";

/// The balance of one token held by one synthetic account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: Id,
    pub seed: u64,
    pub alias: String,
    pub address: String,
    pub token: String,
    pub balance: u64,
}

impl Account {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            seed: row.get::<_, i64>(1)? as u64,
            alias: row.get(2)?,
            address: row.get(3)?,
            token: row.get(4)?,
            balance: row.get::<_, i64>(5)? as u64,
        })
    }
}

/// A validator that accounts may bond to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validator {
    pub id: Id,
    pub seed: u64,
    pub address: String,
}

impl Validator {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            seed: row.get::<_, i64>(1)? as u64,
            address: row.get(2)?,
        })
    }
}

impl Store {
    /// Record the `token` balance of `alias`.
    ///
    /// Recording an (alias, token) pair that already exists overwrites its address and balance
    /// with the new snapshot instead of adding a second row.
    pub fn create_account(
        &self,
        seed: u64,
        alias: &str,
        address: &str,
        token: &str,
        balance: u64,
    ) -> Result<Id, Error> {
        let balance = int(balance)?;
        let id = self.conn()?.query_row(
            "INSERT INTO account (seed, alias, address, token, balance)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (seed, alias, token)
             DO UPDATE SET address = excluded.address, balance = excluded.balance
             RETURNING id",
            params![seed_key(seed), alias, address, token, balance],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Record a validator, returning the existing row if `address` is already known.
    pub fn create_validator(&self, seed: u64, address: &str) -> Result<Id, Error> {
        let id = self.conn()?.query_row(
            "INSERT INTO validator (seed, address) VALUES (?1, ?2)
             ON CONFLICT (seed, address) DO UPDATE SET address = excluded.address
             RETURNING id",
            params![seed_key(seed), address],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn account(&self, id: Id) -> Result<Option<Account>, Error> {
        let account = self
            .conn()?
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = ?1"),
                [id],
                Account::from_row,
            )
            .optional()?;
        Ok(account)
    }

    pub fn account_by_alias(
        &self,
        seed: u64,
        alias: &str,
        token: &str,
    ) -> Result<Option<Account>, Error> {
        let account = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM account
                     WHERE seed = ?1 AND alias = ?2 AND token = ?3"
                ),
                params![seed_key(seed), alias, token],
                Account::from_row,
            )
            .optional()?;
        Ok(account)
    }

    pub fn account_by_address(
        &self,
        seed: u64,
        address: &str,
        token: &str,
    ) -> Result<Option<Account>, Error> {
        let account = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM account
                     WHERE seed = ?1 AND address = ?2 AND token = ?3
                     ORDER BY id LIMIT 1"
                ),
                params![seed_key(seed), address, token],
                Account::from_row,
            )
            .optional()?;
        Ok(account)
    }

    /// Every account row of `seed`, in insertion order.
    pub fn accounts(&self, seed: u64) -> Result<Vec<Account>, Error> {
        self.accounts_where(seed, None)
    }

    fn accounts_where(&self, seed: u64, min_balance: Option<i64>) -> Result<Vec<Account>, Error> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account
             WHERE seed = ?1 AND (?2 IS NULL OR balance > ?2)
             ORDER BY id"
        ))?;
        let accounts = stmt
            .query_map(params![seed_key(seed), min_balance], Account::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    /// Pick any account row of `seed`, optionally restricted to `tokens`.
    pub fn random_account<R: Rng + ?Sized>(
        &self,
        seed: u64,
        tokens: Option<&[String]>,
        rng: &mut R,
    ) -> Result<Option<Account>, Error> {
        let candidates = self
            .accounts_where(seed, None)?
            .into_iter()
            .filter(|account| holds(tokens, account))
            .collect();
        Ok(pick(candidates, rng))
    }

    /// Pick an account row of `seed` whose balance is strictly greater than `amount`,
    /// optionally restricted to `tokens`.
    pub fn random_account_with_balance_greater_than<R: Rng + ?Sized>(
        &self,
        seed: u64,
        amount: u64,
        tokens: Option<&[String]>,
        rng: &mut R,
    ) -> Result<Option<Account>, Error> {
        let candidates = self
            .accounts_where(seed, Some(int(amount)?))?
            .into_iter()
            .filter(|account| holds(tokens, account))
            .collect();
        Ok(pick(candidates, rng))
    }

    /// Apply `delta` to the `token` balance of `alias`, returning the number of rows changed.
    ///
    /// A debit that would take the balance below zero changes nothing.
    pub fn update_balance(
        &self,
        seed: u64,
        alias: &str,
        token: &str,
        delta: i64,
    ) -> Result<usize, Error> {
        let changed = self.conn()?.execute(
            "UPDATE account SET balance = balance + ?4
             WHERE seed = ?1 AND alias = ?2 AND token = ?3 AND balance + ?4 >= 0",
            params![seed_key(seed), alias, token, delta],
        )?;
        Ok(changed)
    }

    pub fn validator(&self, id: Id) -> Result<Option<Validator>, Error> {
        let validator = self
            .conn()?
            .query_row(
                "SELECT id, seed, address FROM validator WHERE id = ?1",
                [id],
                Validator::from_row,
            )
            .optional()?;
        Ok(validator)
    }

    pub fn validator_by_address(
        &self,
        seed: u64,
        address: &str,
    ) -> Result<Option<Validator>, Error> {
        let validator = self
            .conn()?
            .query_row(
                "SELECT id, seed, address FROM validator WHERE seed = ?1 AND address = ?2",
                params![seed_key(seed), address],
                Validator::from_row,
            )
            .optional()?;
        Ok(validator)
    }

    /// Every validator of `seed`, in insertion order.
    pub fn validators(&self, seed: u64) -> Result<Vec<Validator>, Error> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, seed, address FROM validator WHERE seed = ?1 ORDER BY id")?;
        let validators = stmt
            .query_map([seed_key(seed)], Validator::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(validators)
    }

    pub fn random_validator<R: Rng + ?Sized>(
        &self,
        seed: u64,
        rng: &mut R,
    ) -> Result<Option<Validator>, Error> {
        Ok(pick(self.validators(seed)?, rng))
    }
}

fn holds(tokens: Option<&[String]>, account: &Account) -> bool {
    tokens.map_or(true, |tokens| tokens.iter().any(|token| *token == account.token))
}
