//! Seed-scoped shadow ledger for synthetic load generation.
//!
//! A [Store] keeps a best-effort local approximation of on-chain state (accounts and their
//! balances, validators, delegations, pending withdrawals, and governance proposals) so that a
//! load generator can always issue transactions that will execute without querying the network
//! for every decision.
//!
//! # Seeds
//!
//! Every row carries the seed of the actor population that created it. Independent
//! populations share one database without ever reading or writing each other's rows, so
//! every operation takes the seed it is scoped to.
//!
//! # Selection
//!
//! Random selections (`random_*`) never consult SQLite's own random source. Candidates are
//! loaded in insertion order and sampled with the caller's generator, so a population seeded
//! identically makes identical choices against identical state. An empty candidate set is
//! reported as `None`, which callers treat as "nothing to do" rather than a fault.
//!
//! # Affected Rows
//!
//! Mutations that touch existing rows (`update_balance`, `delete_*`) return the number of rows
//! affected. Callers compare this against the count they expect: a mismatch means the store
//! has drifted from the ledger it mirrors.
//!
//! # Example
//!
//! ```rust
//! use rand::{rngs::StdRng, SeedableRng};
//! use stampede_store::Store;
//!
//! let store = Store::in_memory().unwrap();
//! let mut rng = StdRng::seed_from_u64(7);
//!
//! store.create_account(7, "alice", "addr-alice", "NAM", 100).unwrap();
//! let account = store
//!     .random_account_with_balance_greater_than(7, 50, None, &mut rng)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(account.alias, "alice");
//!
//! assert_eq!(store.update_balance(7, "alice", "NAM", -30).unwrap(), 1);
//! let account = store.account_by_alias(7, "alice", "NAM").unwrap().unwrap();
//! assert_eq!(account.balance, 70);
//! ```

use rand::{seq::IteratorRandom, Rng};
use rusqlite::Connection;
use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};
use thiserror::Error;
use tracing::debug;

mod accounts;
pub use accounts::{Account, Validator};
mod bonds;
pub use bonds::{Delegation, Withdrawal, WITHDRAW_EPOCH_SLACK};
mod proposals;
pub use proposals::{Proposal, VOTE_EPOCH_SLACK};

/// Row identifier assigned by the store.
pub type Id = i64;

/// Errors that can occur when interacting with the [Store].
#[derive(Debug, Error)]
pub enum Error {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("value out of range: {0}")]
    OutOfRange(u64),
}

/// A relational shadow of ledger state, shared by every population in a run.
///
/// All access is serialized through one connection, so each operation (including the
/// read-modify-write of [Store::update_balance]) is atomic with respect to every other.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path`, keeping any rows already present.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::init(conn)
    }

    /// Open the database at `path` after discarding whatever a previous run left there.
    pub fn open_fresh(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.as_os_str().to_owned();
            file.push(suffix);
            match std::fs::remove_file(&file) {
                Ok(()) => debug!(file = ?file, "removed previous database file"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Self::open(path)
    }

    /// Open a database that lives only as long as the returned [Store].
    pub fn in_memory() -> Result<Self, Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, Error> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.conn.lock().map_err(|_| Error::Poisoned)
    }

    /// Remove every row belonging to `seed`, returning the number of rows removed.
    pub fn purge(&self, seed: u64) -> Result<usize, Error> {
        let conn = self.conn()?;
        let mut removed = 0;
        for table in ["proposal", "withdrawal", "delegation", "validator", "account"] {
            removed += conn.execute(
                &format!("DELETE FROM {table} WHERE seed = ?1"),
                [seed_key(seed)],
            )?;
        }
        Ok(removed)
    }

    /// Remove every row of every seed.
    pub fn clear(&self) -> Result<(), Error> {
        self.conn()?.execute_batch(
            "DELETE FROM proposal;
             DELETE FROM withdrawal;
             DELETE FROM delegation;
             DELETE FROM validator;
             DELETE FROM account;",
        )?;
        Ok(())
    }
}

/// Seeds are stored bit-for-bit in a signed column.
pub(crate) fn seed_key(seed: u64) -> i64 {
    seed as i64
}

pub(crate) fn int(value: u64) -> Result<i64, Error> {
    i64::try_from(value).map_err(|_| Error::OutOfRange(value))
}

/// Uniformly pick one of `candidates` using the caller's generator.
pub(crate) fn pick<T, R: Rng + ?Sized>(candidates: Vec<T>, rng: &mut R) -> Option<T> {
    candidates.into_iter().choose(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_seeds_are_isolated() {
        let store = Store::in_memory().unwrap();
        store.create_account(1, "a", "addr-a", "NAM", 10).unwrap();
        store.create_account(2, "b", "addr-b", "NAM", 10).unwrap();

        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..16 {
            let account = store.random_account(1, None, &mut rng).unwrap().unwrap();
            assert_eq!(account.alias, "a");
        }
        assert_eq!(store.update_balance(1, "b", "NAM", 5).unwrap(), 0);

        assert_eq!(store.purge(1).unwrap(), 1);
        assert!(store.random_account(1, None, &mut rng).unwrap().is_none());
        assert!(store.random_account(2, None, &mut rng).unwrap().is_some());
    }

    #[test]
    fn test_clear() {
        let store = Store::in_memory().unwrap();
        let account = store.create_account(1, "a", "addr-a", "NAM", 10).unwrap();
        let validator = store.create_validator(1, "val").unwrap();
        store
            .create_delegation(1, account, validator, 5, 3)
            .unwrap();
        store.clear().unwrap();
        assert!(store.accounts(1).unwrap().is_empty());
        assert!(store.delegations(1).unwrap().is_empty());
    }

    #[test]
    fn test_open_fresh_discards_previous_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shadow.db");
        {
            let store = Store::open(&path).unwrap();
            store.create_account(1, "a", "addr-a", "NAM", 10).unwrap();
        }
        {
            let store = Store::open(&path).unwrap();
            assert_eq!(store.accounts(1).unwrap().len(), 1);
        }
        let store = Store::open_fresh(&path).unwrap();
        assert!(store.accounts(1).unwrap().is_empty());
    }

    #[test]
    fn test_selection_is_deterministic() {
        let store = Store::in_memory().unwrap();
        for i in 0..10 {
            store
                .create_account(1, &format!("a{i}"), &format!("addr{i}"), "NAM", 10)
                .unwrap();
        }
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..8)
                .map(|_| store.random_account(1, None, &mut rng).unwrap().unwrap().id)
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(3), draw(3));
    }
}
