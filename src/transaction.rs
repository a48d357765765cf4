//! Movement records written to the ledger.

use crate::account::AccountId;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Kind of balance movement a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MovementKind {
    /// Cash credited to the owning account.
    Deposit,

    /// Cash debited from the owning account.
    Withdraw,

    /// Outgoing leg of a transfer, recorded against the source.
    TransferOut,

    /// Incoming leg of a transfer, recorded against the target.
    TransferIn,
}

impl MovementKind {
    /// Description used when the caller does not supply one.
    pub fn default_description(&self) -> &'static str {
        match self {
            MovementKind::Deposit => "Cash Deposit",
            MovementKind::Withdraw => "ATM Withdrawal",
            MovementKind::TransferOut => "Online Transfer Out",
            MovementKind::TransferIn => "Online Transfer In",
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MovementKind::Deposit => "Deposit",
            MovementKind::Withdraw => "Withdraw",
            MovementKind::TransferOut => "TransferOut",
            MovementKind::TransferIn => "TransferIn",
        };
        f.write_str(name)
    }
}

/// A movement staged inside an atomic unit, not yet assigned an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    pub account: AccountId,
    pub amount: Money,
    pub kind: MovementKind,
    pub timestamp: DateTime<Utc>,
    pub counterparty: Option<AccountId>,
    pub description: String,
}

impl PendingRecord {
    fn new(
        account: &AccountId,
        amount: Money,
        kind: MovementKind,
        timestamp: DateTime<Utc>,
        counterparty: Option<&AccountId>,
    ) -> Self {
        PendingRecord {
            account: account.clone(),
            amount,
            kind,
            timestamp,
            counterparty: counterparty.cloned(),
            description: kind.default_description().to_string(),
        }
    }

    pub fn deposit(account: &AccountId, amount: Money, timestamp: DateTime<Utc>) -> Self {
        Self::new(account, amount, MovementKind::Deposit, timestamp, None)
    }

    pub fn withdraw(account: &AccountId, amount: Money, timestamp: DateTime<Utc>) -> Self {
        Self::new(account, amount, MovementKind::Withdraw, timestamp, None)
    }

    /// Both legs of a transfer: `(TransferOut on source, TransferIn on target)`.
    ///
    /// The legs share amount and timestamp and name each other's account as
    /// counterparty.
    pub fn transfer_pair(
        source: &AccountId,
        target: &AccountId,
        amount: Money,
        timestamp: DateTime<Utc>,
    ) -> (Self, Self) {
        (
            Self::new(source, amount, MovementKind::TransferOut, timestamp, Some(target)),
            Self::new(target, amount, MovementKind::TransferIn, timestamp, Some(source)),
        )
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// An immutable, committed ledger entry.
///
/// # Invariants
///
/// - `amount > 0`; direction is carried by `kind`
/// - never updated or deleted once committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    /// Monotonic id assigned by the store at commit.
    pub id: u64,

    /// Account the record belongs to.
    pub account: AccountId,

    /// Moved amount, always positive.
    pub amount: Money,

    /// Direction and nature of the movement.
    pub kind: MovementKind,

    /// When the owning unit stamped the movement.
    pub timestamp: DateTime<Utc>,

    /// Other side of a transfer; `None` for deposits and withdrawals.
    pub counterparty: Option<AccountId>,

    /// Free-text description.
    pub description: String,
}

impl TransactionRecord {
    /// Seals a pending record with its store-assigned id.
    pub fn commit(id: u64, pending: PendingRecord) -> Self {
        TransactionRecord {
            id,
            account: pending.account,
            amount: pending.amount,
            kind: pending.kind,
            timestamp: pending.timestamp,
            counterparty: pending.counterparty,
            description: pending.description,
        }
    }

    /// Signed effect of this record on its account's balance.
    pub fn signed_amount(&self) -> Money {
        match self.kind {
            MovementKind::Deposit | MovementKind::TransferIn => self.amount,
            MovementKind::Withdraw | MovementKind::TransferOut => -self.amount,
        }
    }
}
