//! Storage collaborator contracts.
//!
//! An [`AccountStore`] persists accounts and the ledger; an [`AtomicUnit`]
//! is one begin/commit/rollback scope over it. Row locks taken through a unit
//! are exclusive across units and are held until that unit commits or rolls
//! back. Dropping a unit without committing rolls it back.

use crate::account::{Account, AccountId};
use crate::error::Result;
use crate::money::Money;
use crate::transaction::{PendingRecord, TransactionRecord};

/// Reference to a row locked by a particular unit.
///
/// Only meaningful for the unit that returned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowHandle(usize);

impl RowHandle {
    pub fn new(slot: usize) -> Self {
        RowHandle(slot)
    }

    pub fn slot(&self) -> usize {
        self.0
    }
}

/// Persistence for accounts and their transaction records.
pub trait AccountStore: Send + Sync {
    /// The atomic-unit type this store hands out.
    type Unit<'s>: AtomicUnit
    where
        Self: 's;

    /// Starts a new atomic unit. Takes no locks.
    fn begin(&self) -> Self::Unit<'_>;

    /// Non-locking read of the last committed state of an account.
    fn fetch(&self, id: &AccountId) -> Result<Account>;

    /// Inserts a new account; `Conflict` if the id is taken.
    ///
    /// The uniqueness check and the insert are one atomic step.
    fn create(&self, account: Account) -> Result<()>;

    /// Committed records for `id`, newest first. Non-locking.
    fn history_for(&self, id: &AccountId) -> Result<Vec<TransactionRecord>>;

    /// A single committed record by id; `RecordNotFound` if none has it.
    fn record(&self, id: u64) -> Result<TransactionRecord>;
}

/// One atomic unit of work against an [`AccountStore`].
///
/// Nothing staged through a unit is visible to other readers until
/// [`commit`](AtomicUnit::commit) returns.
pub trait AtomicUnit {
    /// Locks the account row for the rest of this unit, blocking while
    /// another unit holds it. `NotFound` if the account does not exist.
    ///
    /// Locking a row this unit already holds returns the existing handle.
    fn fetch_for_update(&mut self, id: &AccountId) -> Result<RowHandle>;

    /// The locked account as seen by this unit, including staged changes.
    fn account(&self, handle: RowHandle) -> Result<&Account>;

    /// Changes a locked account's balance by `delta` and returns the new
    /// balance. `InsufficientFunds` if the result would be negative and
    /// `BalanceOverflow` if it is out of range; either way nothing is changed.
    fn apply_delta(&mut self, handle: RowHandle, delta: Money) -> Result<Money>;

    /// Replaces a locked account's credential digest.
    fn replace_credential(&mut self, handle: RowHandle, credential: String) -> Result<()>;

    /// Stages a ledger record to be appended at commit.
    fn append(&mut self, record: PendingRecord) -> Result<()>;

    /// Publishes every staged change at once, releases all locks and returns
    /// the appended records with their assigned ids.
    fn commit(self) -> Result<Vec<TransactionRecord>>;

    /// Discards every staged change and releases all locks.
    fn rollback(self);
}
