//! # Ledger Engine
//!
//! Account-balance mutation engine: deposits, withdrawals, transfers and
//! credential changes that move money between accounts atomically and stay
//! correct under concurrent access.
//!
//! ## Design Principles
//!
//! - **Exact money**: two-place fixed-point via `rust_decimal`, never floats
//! - **Atomic units**: every operation commits all of its effects or none
//! - **Row locks**: operations on the same account are serialized; transfers
//!   lock both rows in ascending id order so crossing transfers cannot deadlock
//! - **Append-only ledger**: one immutable record per committed movement
//!
//! ## Example
//!
//! ```no_run
//! use ledger_engine::{Argon2Hasher, LedgerEngine, MemoryStore, Money, NewAccount};
//! use std::str::FromStr;
//!
//! let engine = LedgerEngine::new(MemoryStore::new(), Argon2Hasher::new()).unwrap();
//! engine
//!     .open_account(NewAccount::new("1001", "Alice", Money::from_str("500").unwrap()), "1234")
//!     .unwrap();
//! engine
//!     .open_account(NewAccount::new("1002", "Bob", Money::ZERO), "5678")
//!     .unwrap();
//! engine
//!     .transfer(&"1001".into(), &"1002".into(), Money::from_str("200").unwrap())
//!     .unwrap();
//! ```

pub mod account;
pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod journal;
pub mod memory;
pub mod money;
pub mod script;
pub mod store;
pub mod transaction;

pub use account::{Account, AccountId, AccountKind, ContactInfo, DeltaRefusal, NewAccount};
pub use auth::{Argon2Hasher, AuthGate, SecretHasher, Session};
pub use config::LedgerConfig;
pub use engine::{LedgerEngine, UnitState};
pub use error::{ErrorKind, LedgerError, Result};
pub use journal::TransactionLog;
pub use memory::{MemoryStore, MemoryUnit};
pub use money::Money;
pub use script::{Operation, ScriptRow, ScriptRunner, ScriptSummary};
pub use store::{AccountStore, AtomicUnit, RowHandle};
pub use transaction::{MovementKind, PendingRecord, TransactionRecord};
