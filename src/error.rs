//! Error types for the ledger engine.

use crate::account::AccountId;
use crate::money::Money;
use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur during ledger operation.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Account does not exist
    #[error("Account {0} not found")]
    NotFound(AccountId),

    /// No ledger record carries this id
    #[error("Transaction record {0} not found")]
    RecordNotFound(u64),

    /// Account identifier already taken at registration
    #[error("Account {0} already exists")]
    Conflict(AccountId),

    /// Amount not strictly positive, or a transfer onto the same account
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Debit would take the balance below zero
    #[error("Insufficient funds in account {account}: requested {requested}, available {available}")]
    InsufficientFunds {
        account: AccountId,
        requested: Money,
        available: Money,
    },

    /// Credit would push the balance past the representable range
    #[error("Balance overflow in account {account}: cannot apply {delta}")]
    BalanceOverflow { account: AccountId, delta: Money },

    /// Bad credential. Deliberately carries no detail about the cause.
    #[error("Authentication failed")]
    AuthFailed,

    /// Unexpected persistence-layer failure, including lock timeouts
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// The secret hasher could not produce a digest
    #[error("Credential hashing failed: {0}")]
    Hashing(String),

    /// Invalid configuration value
    #[error("Invalid configuration {key}: {message}")]
    Config { key: &'static str, message: String },

    /// Failed to open or read the script file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid script row
    #[error("Invalid operation at row {row}: {message}")]
    InvalidRecord { row: usize, message: String },

    /// Missing script file argument
    #[error("Missing script file argument. Usage: ledger-engine <script.csv>")]
    MissingArgument,
}

/// Coarse classification a presentation layer can switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidAmount,
    InsufficientFunds,
    AuthFailed,
    StorageFailure,
}

impl LedgerError {
    /// Classifies errors raised by ledger operations.
    ///
    /// Returns `None` for failures of the script front end and its setup
    /// (configuration, I/O, CSV, malformed rows, missing argument): those
    /// never come out of an engine operation. A balance overflow is an
    /// unacceptable amount for that account, so it counts as
    /// `InvalidAmount`. A hashing failure is a collaborator fault and counts
    /// as `StorageFailure`.
    pub fn kind(&self) -> Option<ErrorKind> {
        let kind = match self {
            LedgerError::NotFound(_) | LedgerError::RecordNotFound(_) => ErrorKind::NotFound,
            LedgerError::Conflict(_) => ErrorKind::Conflict,
            LedgerError::InvalidAmount(_) | LedgerError::BalanceOverflow { .. } => {
                ErrorKind::InvalidAmount
            }
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::AuthFailed => ErrorKind::AuthFailed,
            LedgerError::StorageFailure(_) | LedgerError::Hashing(_) => ErrorKind::StorageFailure,
            LedgerError::Config { .. }
            | LedgerError::Io(_)
            | LedgerError::Csv(_)
            | LedgerError::InvalidRecord { .. }
            | LedgerError::MissingArgument => return None,
        };
        Some(kind)
    }
}
