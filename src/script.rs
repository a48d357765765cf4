//! CSV operation scripts.
//!
//! A script is a CSV file with the header `op,account,other,amount,secret,detail`
//! replayed in order against a fresh in-memory ledger:
//!
//! | op           | other         | amount          | secret     | detail      |
//! |--------------|---------------|-----------------|------------|-------------|
//! | `open`       | kind (opt.)   | opening balance | PIN        | holder name |
//! | `deposit`    |               | amount          |            |             |
//! | `withdraw`   |               | amount          |            |             |
//! | `transfer`   | target        | amount          |            |             |
//! | `change-pin` |               |                 | old PIN    | new PIN     |

use crate::account::{AccountId, AccountKind, NewAccount};
use crate::auth::SecretHasher;
use crate::engine::LedgerEngine;
use crate::error::{LedgerError, Result};
use crate::memory::MemoryStore;
use crate::money::Money;
use crate::store::AccountStore;
use csv::{ReaderBuilder, Trim};
use log::{debug, warn};
use serde::Deserialize;
use std::io::{Read, Write};
use std::str::FromStr;

/// Raw script row as read from CSV.
#[derive(Debug, Deserialize)]
pub struct ScriptRow {
    /// Operation name
    pub op: String,

    /// Account the operation acts on
    pub account: String,

    /// Transfer target, or account kind for `open`
    pub other: Option<String>,

    /// Amount (absent for `change-pin`)
    pub amount: Option<String>,

    /// PIN for `open`, current PIN for `change-pin`
    pub secret: Option<String>,

    /// Holder name for `open`, new PIN for `change-pin`
    pub detail: Option<String>,
}

/// A parsed operation ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Open {
        account: AccountId,
        holder: String,
        kind: AccountKind,
        opening_balance: Money,
        secret: String,
    },
    Deposit {
        account: AccountId,
        amount: Money,
    },
    Withdraw {
        account: AccountId,
        amount: Money,
    },
    Transfer {
        source: AccountId,
        target: AccountId,
        amount: Money,
    },
    ChangePin {
        account: AccountId,
        old_secret: String,
        new_secret: String,
    },
}

impl ScriptRow {
    /// Parses the raw row into a typed operation.
    ///
    /// Only checks shape (known op, required fields present, amounts
    /// numeric). Business rules are left to the engine.
    pub fn parse(&self, row: usize) -> Result<Operation> {
        let invalid = |message: String| LedgerError::InvalidRecord { row, message };

        let account = self.account.trim();
        if account.is_empty() {
            return Err(invalid("missing account".into()));
        }
        let account = AccountId::from(account);

        match self.op.trim().to_lowercase().as_str() {
            "open" => {
                let kind = match non_empty(&self.other) {
                    Some(raw) => AccountKind::parse(raw)
                        .ok_or_else(|| invalid(format!("unknown account kind {:?}", raw)))?,
                    None => AccountKind::default(),
                };
                Ok(Operation::Open {
                    account,
                    holder: required(&self.detail, "holder name").map_err(invalid)?,
                    kind,
                    opening_balance: self.amount(row)?.unwrap_or(Money::ZERO),
                    secret: required(&self.secret, "secret").map_err(invalid)?,
                })
            }
            "deposit" => Ok(Operation::Deposit {
                account,
                amount: self.required_amount(row)?,
            }),
            "withdraw" | "withdrawal" => Ok(Operation::Withdraw {
                account,
                amount: self.required_amount(row)?,
            }),
            "transfer" => Ok(Operation::Transfer {
                source: account,
                target: AccountId::from(required(&self.other, "transfer target").map_err(invalid)?),
                amount: self.required_amount(row)?,
            }),
            "change-pin" => Ok(Operation::ChangePin {
                account,
                old_secret: required(&self.secret, "current secret").map_err(invalid)?,
                new_secret: required(&self.detail, "new secret").map_err(invalid)?,
            }),
            other => Err(invalid(format!("unknown operation {:?}", other))),
        }
    }

    fn amount(&self, row: usize) -> Result<Option<Money>> {
        match non_empty(&self.amount) {
            None => Ok(None),
            Some(raw) => {
                let amount = Money::from_str(raw).map_err(|e| LedgerError::InvalidRecord {
                    row,
                    message: format!("bad amount {:?}: {}", raw, e),
                })?;
                if !amount.is_exact() {
                    return Err(LedgerError::InvalidRecord {
                        row,
                        message: format!(
                            "amount {:?} has more than {} decimal places",
                            raw,
                            Money::SCALE
                        ),
                    });
                }
                Ok(Some(amount))
            }
        }
    }

    fn required_amount(&self, row: usize) -> Result<Money> {
        self.amount(row)?.ok_or_else(|| LedgerError::InvalidRecord {
            row,
            message: "missing amount".into(),
        })
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn required(field: &Option<String>, what: &str) -> std::result::Result<String, String> {
    non_empty(field)
        .map(str::to_string)
        .ok_or_else(|| format!("missing {}", what))
}

/// Counts of script rows by outcome.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScriptSummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Replays scripts against an in-memory ledger.
pub struct ScriptRunner<H> {
    engine: LedgerEngine<MemoryStore, H>,
}

impl<H: SecretHasher> ScriptRunner<H> {
    pub fn new(store: MemoryStore, hasher: H) -> Result<Self> {
        Ok(ScriptRunner {
            engine: LedgerEngine::new(store, hasher)?,
        })
    }

    pub fn engine(&self) -> &LedgerEngine<MemoryStore, H> {
        &self.engine
    }

    /// Processes a script from a CSV reader in streaming fashion.
    ///
    /// Rows that fail to parse or are rejected by the engine are logged at
    /// warn level and skipped.
    pub fn process_csv<R: Read>(&self, reader: R) -> Result<ScriptSummary> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut summary = ScriptSummary::default();
        for (row_idx, result) in csv_reader.deserialize::<ScriptRow>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row

            let outcome = result
                .map_err(LedgerError::from)
                .and_then(|record| record.parse(row_num))
                .and_then(|op| self.execute(op));

            match outcome {
                Ok(()) => summary.applied += 1,
                Err(e) => {
                    warn!("Row {}: {}", row_num, e);
                    summary.rejected += 1;
                }
            }
        }

        debug!(
            "Script finished: {} applied, {} rejected",
            summary.applied, summary.rejected
        );
        Ok(summary)
    }

    /// Executes a single parsed operation.
    pub fn execute(&self, op: Operation) -> Result<()> {
        match op {
            Operation::Open {
                account,
                holder,
                kind,
                opening_balance,
                secret,
            } => {
                let request = NewAccount::new(account, holder, opening_balance).with_kind(kind);
                self.engine.open_account(request, &secret)?;
            }
            Operation::Deposit { account, amount } => {
                self.engine.deposit(&account, amount)?;
            }
            Operation::Withdraw { account, amount } => {
                self.engine.withdraw(&account, amount)?;
            }
            Operation::Transfer {
                source,
                target,
                amount,
            } => {
                self.engine.transfer(&source, &target, amount)?;
            }
            Operation::ChangePin {
                account,
                old_secret,
                new_secret,
            } => {
                self.engine
                    .change_credential(&account, &old_secret, &new_secret)?;
            }
        }
        Ok(())
    }

    /// Writes final account states to CSV, sorted by account id.
    pub fn write_output<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["account", "holder", "balance", "records"])?;

        let store = self.engine.store();
        for account in store.accounts() {
            let records = store.history_for(&account.id)?.len();
            csv_writer.write_record([
                account.id.to_string(),
                account.holder.clone(),
                account.balance.to_string(),
                records.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }
}
