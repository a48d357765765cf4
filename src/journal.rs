//! Append-only transaction log.

use crate::account::AccountId;
use crate::transaction::{PendingRecord, TransactionRecord};
use std::collections::HashMap;

/// The ledger: every committed movement, in commit order.
///
/// Offers no update or delete. Appends are driven by the store when an
/// atomic unit commits, so a rolled-back unit never reaches this type.
#[derive(Debug, Default)]
pub struct TransactionLog {
    /// All records, indexed by `id - 1`.
    records: Vec<TransactionRecord>,

    /// Positions into `records` per owning account.
    by_account: HashMap<AccountId, Vec<usize>>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and returns it with its assigned id.
    ///
    /// Ids start at 1 and increase by one per append.
    pub fn append(&mut self, pending: PendingRecord) -> TransactionRecord {
        let position = self.records.len();
        let record = TransactionRecord::commit(position as u64 + 1, pending);
        self.by_account
            .entry(record.account.clone())
            .or_default()
            .push(position);
        self.records.push(record.clone());
        record
    }

    /// Records owned by `account`, newest first.
    ///
    /// Ties on timestamp are broken by descending id so the result is
    /// deterministic.
    pub fn history_for(&self, account: &AccountId) -> Vec<TransactionRecord> {
        let mut history: Vec<TransactionRecord> = self
            .by_account
            .get(account)
            .map(|positions| positions.iter().map(|&p| self.records[p].clone()).collect())
            .unwrap_or_default();
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        history
    }

    /// Looks up a record by id.
    pub fn get(&self, id: u64) -> Option<&TransactionRecord> {
        let position = usize::try_from(id).ok()?.checked_sub(1)?;
        self.records.get(position)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
