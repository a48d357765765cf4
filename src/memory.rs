//! In-process storage collaborator.
//!
//! Each account row carries its own latch (`Arc<Mutex<()>>`). A unit locks a
//! row by taking an owned guard on the latch and keeps it until it commits or
//! is dropped. Changes are staged on a private copy of the row and only
//! written back, together with the unit's ledger records, inside a single
//! exclusive `publish` section so readers never see half of a commit.

use crate::account::{Account, AccountId, DeltaRefusal};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::journal::TransactionLog;
use crate::money::Money;
use crate::store::{AccountStore, AtomicUnit, RowHandle};
use crate::transaction::{PendingRecord, TransactionRecord};
use log::{debug, trace};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct Row {
    /// Exclusive row lock.
    latch: Arc<Mutex<()>>,

    /// Last committed image. Written only by a unit holding `latch`.
    image: RwLock<Account>,
}

/// Thread-safe in-memory account store.
pub struct MemoryStore {
    rows: RwLock<HashMap<AccountId, Arc<Row>>>,
    journal: RwLock<TransactionLog>,

    /// Shared by readers, exclusive while a unit publishes its changes.
    publish: RwLock<()>,

    /// Upper bound on waiting for a row latch; `None` waits forever.
    lock_timeout: Option<Duration>,
}

impl MemoryStore {
    /// Creates an empty store whose row locks block indefinitely.
    pub fn new() -> Self {
        MemoryStore {
            rows: RwLock::new(HashMap::new()),
            journal: RwLock::new(TransactionLog::new()),
            publish: RwLock::new(()),
            lock_timeout: None,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new().with_lock_timeout(config.lock_timeout)
    }

    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Committed state of every account, sorted by id.
    pub fn accounts(&self) -> Vec<Account> {
        let _publish = self.publish.read();
        let mut accounts: Vec<Account> = self
            .rows
            .read()
            .values()
            .map(|row| row.image.read().clone())
            .collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        accounts
    }

    /// Number of committed ledger records across all accounts.
    pub fn record_count(&self) -> usize {
        self.journal.read().len()
    }

    fn row(&self, id: &AccountId) -> Result<Arc<Row>> {
        self.rows
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(id.clone()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore for MemoryStore {
    type Unit<'s> = MemoryUnit<'s>;

    fn begin(&self) -> MemoryUnit<'_> {
        MemoryUnit {
            store: self,
            locked: Vec::new(),
            pending: Vec::new(),
            finished: false,
        }
    }

    fn fetch(&self, id: &AccountId) -> Result<Account> {
        let _publish = self.publish.read();
        let row = self.row(id)?;
        let account = row.image.read().clone();
        Ok(account)
    }

    fn create(&self, account: Account) -> Result<()> {
        let mut rows = self.rows.write();
        if rows.contains_key(&account.id) {
            return Err(LedgerError::Conflict(account.id));
        }

        debug!("Created account {}", account.id);
        rows.insert(
            account.id.clone(),
            Arc::new(Row {
                latch: Arc::new(Mutex::new(())),
                image: RwLock::new(account),
            }),
        );
        Ok(())
    }

    fn history_for(&self, id: &AccountId) -> Result<Vec<TransactionRecord>> {
        let _publish = self.publish.read();
        if !self.rows.read().contains_key(id) {
            return Err(LedgerError::NotFound(id.clone()));
        }
        Ok(self.journal.read().history_for(id))
    }

    fn record(&self, id: u64) -> Result<TransactionRecord> {
        let _publish = self.publish.read();
        self.journal
            .read()
            .get(id)
            .cloned()
            .ok_or(LedgerError::RecordNotFound(id))
    }
}

struct LockedRow {
    row: Arc<Row>,

    /// Private copy the unit mutates; published on commit.
    working: Account,
    dirty: bool,

    /// Held for the life of the unit. Dropping it releases the row.
    _guard: ArcMutexGuard<RawMutex, ()>,
}

/// Atomic unit over a [`MemoryStore`].
pub struct MemoryUnit<'s> {
    store: &'s MemoryStore,
    locked: Vec<LockedRow>,
    pending: Vec<PendingRecord>,
    finished: bool,
}

impl MemoryUnit<'_> {
    fn slot(&self, handle: RowHandle) -> Result<&LockedRow> {
        self.locked
            .get(handle.slot())
            .ok_or_else(|| LedgerError::StorageFailure(format!("unknown row handle {}", handle.slot())))
    }

    fn slot_mut(&mut self, handle: RowHandle) -> Result<&mut LockedRow> {
        self.locked
            .get_mut(handle.slot())
            .ok_or_else(|| LedgerError::StorageFailure(format!("unknown row handle {}", handle.slot())))
    }
}

impl AtomicUnit for MemoryUnit<'_> {
    fn fetch_for_update(&mut self, id: &AccountId) -> Result<RowHandle> {
        if let Some(slot) = self.locked.iter().position(|l| &l.working.id == id) {
            return Ok(RowHandle::new(slot));
        }

        let row = self.store.row(id)?;
        trace!("Waiting for row lock on {}", id);
        let guard = match self.store.lock_timeout {
            Some(timeout) => row.latch.try_lock_arc_for(timeout).ok_or_else(|| {
                LedgerError::StorageFailure(format!(
                    "timed out after {:?} waiting for lock on account {}",
                    timeout, id
                ))
            })?,
            None => row.latch.lock_arc(),
        };
        trace!("Locked row {}", id);

        // The image cannot change while we hold the latch.
        let working = row.image.read().clone();
        self.locked.push(LockedRow {
            row,
            working,
            dirty: false,
            _guard: guard,
        });
        Ok(RowHandle::new(self.locked.len() - 1))
    }

    fn account(&self, handle: RowHandle) -> Result<&Account> {
        Ok(&self.slot(handle)?.working)
    }

    fn apply_delta(&mut self, handle: RowHandle, delta: Money) -> Result<Money> {
        let locked = self.slot_mut(handle)?;
        let available = locked.working.balance;
        match locked.working.apply_delta(delta) {
            Ok(balance) => {
                locked.dirty = true;
                Ok(balance)
            }
            Err(DeltaRefusal::Insufficient) => Err(LedgerError::InsufficientFunds {
                account: locked.working.id.clone(),
                requested: -delta,
                available,
            }),
            Err(DeltaRefusal::Overflow) => Err(LedgerError::BalanceOverflow {
                account: locked.working.id.clone(),
                delta,
            }),
        }
    }

    fn replace_credential(&mut self, handle: RowHandle, credential: String) -> Result<()> {
        let locked = self.slot_mut(handle)?;
        locked.working.credential = credential;
        locked.dirty = true;
        Ok(())
    }

    fn append(&mut self, record: PendingRecord) -> Result<()> {
        if !record.amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!(
                "record amount must be positive, got {}",
                record.amount
            )));
        }
        self.pending.push(record);
        Ok(())
    }

    fn commit(mut self) -> Result<Vec<TransactionRecord>> {
        let records = {
            let _publish = self.store.publish.write();
            for locked in self.locked.iter().filter(|l| l.dirty) {
                *locked.row.image.write() = locked.working.clone();
            }
            let mut journal = self.store.journal.write();
            self.pending
                .drain(..)
                .map(|pending| journal.append(pending))
                .collect::<Vec<_>>()
        };

        self.finished = true;
        self.locked.clear();
        Ok(records)
    }

    fn rollback(mut self) {
        self.discard();
    }
}

impl MemoryUnit<'_> {
    fn discard(&mut self) {
        if self.finished {
            return;
        }
        if !self.locked.is_empty() || !self.pending.is_empty() {
            debug!(
                "Rolling back unit: releasing {} row(s), dropping {} record(s)",
                self.locked.len(),
                self.pending.len()
            );
        }
        self.finished = true;
        self.pending.clear();
        self.locked.clear();
    }
}

impl Drop for MemoryUnit<'_> {
    fn drop(&mut self) {
        self.discard();
    }
}
