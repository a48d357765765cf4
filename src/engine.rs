//! Core ledger engine.
//!
//! Every balance-changing operation runs as one atomic unit that moves
//! through `Started -> Locked -> Validated -> Applied -> Committed`, or ends
//! in `Aborted` from any earlier state. An aborted unit releases its locks
//! and leaves no balance change or record behind.
//!
//! Amount and identity checks happen before a unit is even started, so an
//! invalid request never touches storage.

use crate::account::{Account, AccountId, NewAccount};
use crate::auth::{AuthGate, SecretHasher, Session};
use crate::error::{LedgerError, Result};
use crate::money::Money;
use crate::store::{AccountStore, AtomicUnit, RowHandle};
use crate::transaction::{PendingRecord, TransactionRecord};
use chrono::Utc;
use log::{debug, info, trace};
use std::sync::Arc;

/// Lifecycle of an atomic unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Started,
    Locked,
    Validated,
    Applied,
    Committed,
    Aborted,
}

impl UnitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Committed | UnitState::Aborted)
    }

    /// Whether a unit in this state may move to `next`.
    pub fn can_advance(&self, next: UnitState) -> bool {
        use UnitState::*;
        match (self, next) {
            (from, Aborted) => !from.is_terminal(),
            (Started, Locked) | (Locked, Locked) => true,
            (Locked, Validated) => true,
            (Validated, Applied) | (Applied, Applied) => true,
            (Applied, Committed) => true,
            _ => false,
        }
    }
}

/// An atomic unit plus the state it has reached.
///
/// Dropping a unit that has not committed aborts it.
struct TrackedUnit<U: AtomicUnit> {
    unit: Option<U>,
    operation: &'static str,
    state: UnitState,
}

impl<U: AtomicUnit> TrackedUnit<U> {
    fn begin(unit: U, operation: &'static str) -> Self {
        trace!("{}: unit started", operation);
        TrackedUnit {
            unit: Some(unit),
            operation,
            state: UnitState::Started,
        }
    }

    fn advance(&mut self, next: UnitState) {
        debug_assert!(
            self.state.can_advance(next),
            "illegal unit transition {:?} -> {:?}",
            self.state,
            next
        );
        if self.state != next {
            trace!("{}: {:?} -> {:?}", self.operation, self.state, next);
        }
        self.state = next;
    }

    fn inner(&mut self) -> Result<&mut U> {
        self.unit
            .as_mut()
            .ok_or_else(|| LedgerError::StorageFailure("unit already finished".into()))
    }

    fn lock(&mut self, id: &AccountId) -> Result<RowHandle> {
        let handle = self.inner()?.fetch_for_update(id)?;
        self.advance(UnitState::Locked);
        Ok(handle)
    }

    fn balance(&mut self, handle: RowHandle) -> Result<Money> {
        Ok(self.inner()?.account(handle)?.balance)
    }

    fn validated(&mut self) {
        self.advance(UnitState::Validated);
    }

    fn apply(&mut self, handle: RowHandle, delta: Money) -> Result<Money> {
        let balance = self.inner()?.apply_delta(handle, delta)?;
        self.advance(UnitState::Applied);
        Ok(balance)
    }

    fn log(&mut self, record: PendingRecord) -> Result<()> {
        self.inner()?.append(record)
    }

    fn commit(mut self) -> Result<Vec<TransactionRecord>> {
        let unit = self
            .unit
            .take()
            .ok_or_else(|| LedgerError::StorageFailure("unit already finished".into()))?;
        match unit.commit() {
            Ok(records) => {
                self.advance(UnitState::Committed);
                Ok(records)
            }
            Err(e) => {
                self.advance(UnitState::Aborted);
                Err(e)
            }
        }
    }
}

impl<U: AtomicUnit> Drop for TrackedUnit<U> {
    fn drop(&mut self) {
        if let Some(unit) = self.unit.take() {
            self.advance(UnitState::Aborted);
            unit.rollback();
        }
    }
}

fn ensure_positive(amount: Money, operation: &str) -> Result<()> {
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount(format!(
            "{} amount must be positive, got {}",
            operation, amount
        )));
    }
    ensure_exact(amount, operation)
}

fn ensure_exact(amount: Money, operation: &str) -> Result<()> {
    if amount.is_exact() {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(format!(
            "{} amount {} has more than {} decimal places",
            operation,
            amount,
            Money::SCALE
        )))
    }
}

/// The ledger engine.
///
/// Sole writer of account balances and sole creator of transaction records.
/// Safe to share across threads; operations on disjoint accounts never wait
/// on each other.
pub struct LedgerEngine<S, H> {
    store: Arc<S>,
    auth: AuthGate<S, H>,
}

impl<S: AccountStore, H: SecretHasher> LedgerEngine<S, H> {
    pub fn new(store: S, hasher: H) -> Result<Self> {
        let store = Arc::new(store);
        let auth = AuthGate::new(store.clone(), hasher)?;
        Ok(LedgerEngine { store, auth })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn auth(&self) -> &AuthGate<S, H> {
        &self.auth
    }

    /// Registers a new account with an opening balance.
    ///
    /// The opening balance may be zero but not negative. No ledger record is
    /// written for it.
    pub fn open_account(&self, request: NewAccount, secret: &str) -> Result<Account> {
        if request.opening_balance.is_negative() {
            return Err(LedgerError::InvalidAmount(format!(
                "opening balance cannot be negative, got {}",
                request.opening_balance
            )));
        }
        ensure_exact(request.opening_balance, "opening balance")?;

        let credential = self.auth.hash_secret(secret)?;
        let account = Account::from_registration(request, credential);
        self.store.create(account.clone())?;
        info!("Opened account {} with balance {}", account.id, account.balance);
        Ok(account)
    }

    /// Authenticates and opens a session.
    pub fn login(&self, id: &AccountId, secret: &str) -> Result<Session> {
        self.auth.login(id, secret)
    }

    /// Fresh read of the session's account.
    pub fn dashboard(&self, session: &Session) -> Result<Account> {
        self.store.fetch(session.account())
    }

    /// Current committed balance. Non-locking; may be stale by one in-flight
    /// operation.
    pub fn balance(&self, id: &AccountId) -> Result<Money> {
        Ok(self.store.fetch(id)?.balance)
    }

    /// Ledger records for the account, newest first.
    pub fn history(&self, id: &AccountId) -> Result<Vec<TransactionRecord>> {
        self.store.history_for(id)
    }

    /// Looks up one committed record by its id.
    pub fn record(&self, id: u64) -> Result<TransactionRecord> {
        self.store.record(id)
    }

    /// Credits `amount` and returns the new balance.
    pub fn deposit(&self, id: &AccountId, amount: Money) -> Result<Money> {
        ensure_positive(amount, "deposit")?;

        let mut unit = TrackedUnit::begin(self.store.begin(), "deposit");
        let handle = unit.lock(id)?;
        unit.validated();
        let balance = unit.apply(handle, amount)?;
        unit.log(PendingRecord::deposit(id, amount, Utc::now()))?;
        unit.commit()?;

        debug!("Deposited {} to account {}, balance {}", amount, id, balance);
        Ok(balance)
    }

    /// Debits `amount` and returns the new balance.
    pub fn withdraw(&self, id: &AccountId, amount: Money) -> Result<Money> {
        ensure_positive(amount, "withdrawal")?;

        let mut unit = TrackedUnit::begin(self.store.begin(), "withdraw");
        let handle = unit.lock(id)?;
        let available = unit.balance(handle)?;
        if available < amount {
            debug!(
                "Withdrawal of {} from account {} refused (insufficient funds)",
                amount, id
            );
            return Err(LedgerError::InsufficientFunds {
                account: id.clone(),
                requested: amount,
                available,
            });
        }
        unit.validated();
        let balance = unit.apply(handle, -amount)?;
        unit.log(PendingRecord::withdraw(id, amount, Utc::now()))?;
        unit.commit()?;

        debug!("Withdrew {} from account {}, balance {}", amount, id, balance);
        Ok(balance)
    }

    /// Moves `amount` from `source` to `target` and returns the new source
    /// balance.
    ///
    /// Both rows are locked in ascending id order regardless of direction, so
    /// crossing transfers cannot deadlock.
    pub fn transfer(&self, source: &AccountId, target: &AccountId, amount: Money) -> Result<Money> {
        ensure_positive(amount, "transfer")?;
        if source == target {
            return Err(LedgerError::InvalidAmount(format!(
                "cannot transfer from account {} to itself",
                source
            )));
        }

        let mut unit = TrackedUnit::begin(self.store.begin(), "transfer");
        let (source_handle, target_handle) = if source < target {
            let s = unit.lock(source)?;
            (s, unit.lock(target)?)
        } else {
            let t = unit.lock(target)?;
            (unit.lock(source)?, t)
        };

        let available = unit.balance(source_handle)?;
        if available < amount {
            debug!(
                "Transfer of {} from {} to {} refused (insufficient funds)",
                amount, source, target
            );
            return Err(LedgerError::InsufficientFunds {
                account: source.clone(),
                requested: amount,
                available,
            });
        }
        unit.validated();

        let balance = unit.apply(source_handle, -amount)?;
        unit.apply(target_handle, amount)?;
        let (outgoing, incoming) = PendingRecord::transfer_pair(source, target, amount, Utc::now());
        unit.log(outgoing)?;
        unit.log(incoming)?;
        unit.commit()?;

        debug!(
            "Transferred {} from {} to {}, source balance {}",
            amount, source, target, balance
        );
        Ok(balance)
    }

    /// Rotates the account secret. Writes no ledger record.
    pub fn change_credential(&self, id: &AccountId, old_secret: &str, new_secret: &str) -> Result<()> {
        self.auth.rotate(id, old_secret, new_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Argon2Hasher;
    use crate::config::LedgerConfig;
    use crate::memory::MemoryStore;
    use crate::transaction::MovementKind;
    use std::str::FromStr;

    fn dec(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    fn engine() -> LedgerEngine<MemoryStore, Argon2Hasher> {
        let config = LedgerConfig {
            argon2_memory_kib: 64,
            argon2_iterations: 1,
            ..LedgerConfig::default()
        };
        let engine = LedgerEngine::new(
            MemoryStore::from_config(&config),
            Argon2Hasher::from_config(&config).unwrap(),
        )
        .unwrap();
        engine
            .open_account(NewAccount::new("1001", "Alice", dec("500.00")), "1234")
            .unwrap();
        engine
            .open_account(NewAccount::new("1002", "Bob", dec("300.00")), "5678")
            .unwrap();
        engine
    }

    #[test]
    fn test_state_transitions() {
        use UnitState::*;
        assert!(Started.can_advance(Locked));
        assert!(Locked.can_advance(Locked));
        assert!(Locked.can_advance(Validated));
        assert!(Validated.can_advance(Applied));
        assert!(Applied.can_advance(Committed));
        assert!(Started.can_advance(Aborted));
        assert!(Applied.can_advance(Aborted));

        assert!(!Started.can_advance(Applied));
        assert!(!Locked.can_advance(Committed));
        assert!(!Committed.can_advance(Aborted));
        assert!(!Aborted.can_advance(Aborted));
    }

    #[test]
    fn test_deposit_returns_new_balance() {
        let engine = engine();
        let id = AccountId::from("1001");
        assert_eq!(engine.deposit(&id, dec("25.50")).unwrap(), dec("525.50"));

        let history = engine.history(&id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, MovementKind::Deposit);
        assert_eq!(history[0].description, "Cash Deposit");
        assert!(history[0].counterparty.is_none());
    }

    #[test]
    fn test_invalid_amounts_rejected_before_storage() {
        let engine = engine();
        let missing = AccountId::from("nope");

        // InvalidAmount wins over NotFound: validation happens first.
        for amount in ["0", "-1", "0.001"] {
            assert!(matches!(
                engine.deposit(&missing, dec(amount)),
                Err(LedgerError::InvalidAmount(_))
            ));
            assert!(matches!(
                engine.withdraw(&missing, dec(amount)),
                Err(LedgerError::InvalidAmount(_))
            ));
            assert!(matches!(
                engine.transfer(&missing, &"1001".into(), dec(amount)),
                Err(LedgerError::InvalidAmount(_))
            ));
        }
        assert_eq!(engine.store().record_count(), 0);
    }

    #[test]
    fn test_sub_cent_deposit_is_rejected_not_rounded() {
        let engine = engine();
        let id = AccountId::from("1001");

        let err = engine.deposit(&id, dec("0.005")).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
        assert_eq!(engine.balance(&id).unwrap(), dec("500"));
        assert_eq!(engine.store().record_count(), 0);

        let err = engine
            .open_account(NewAccount::new("2002", "Dan", dec("10.001")), "0000")
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
        assert!(engine.store().fetch(&"2002".into()).is_err());
    }

    #[test]
    fn test_credit_overflow_is_balance_overflow() {
        let engine = engine();
        let (a, b) = (AccountId::from("1001"), AccountId::from("1002"));
        let huge = Money::from(rust_decimal::Decimal::MAX);
        engine
            .open_account(NewAccount::new("9000", "Rich", huge), "0000")
            .unwrap();

        let err = engine.deposit(&a, huge).unwrap_err();
        assert!(matches!(err, LedgerError::BalanceOverflow { ref account, .. } if account == &a));

        let err = engine.transfer(&"9000".into(), &b, huge).unwrap_err();
        assert!(matches!(err, LedgerError::BalanceOverflow { ref account, .. } if account == &b));
        assert_eq!(engine.balance(&b).unwrap(), dec("300"));
        assert_eq!(engine.balance(&"9000".into()).unwrap(), huge);
        assert_eq!(engine.store().record_count(), 0);
    }

    #[test]
    fn test_record_lookup_by_id() {
        let engine = engine();
        engine
            .transfer(&"1001".into(), &"1002".into(), dec("20"))
            .unwrap();

        let incoming = engine.record(2).unwrap();
        assert_eq!(incoming.kind, MovementKind::TransferIn);
        assert_eq!(incoming.account, AccountId::from("1002"));
        assert!(matches!(engine.record(3), Err(LedgerError::RecordNotFound(3))));
        assert!(matches!(engine.record(0), Err(LedgerError::RecordNotFound(0))));
    }

    #[test]
    fn test_unknown_account_is_not_found() {
        let engine = engine();
        let missing = AccountId::from("nope");
        assert!(matches!(engine.deposit(&missing, dec("1")), Err(LedgerError::NotFound(_))));
        assert!(matches!(engine.withdraw(&missing, dec("1")), Err(LedgerError::NotFound(_))));
        assert!(matches!(
            engine.transfer(&"1001".into(), &missing, dec("1")),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            engine.transfer(&missing, &"1001".into(), dec("1")),
            Err(LedgerError::NotFound(_))
        ));
        assert_eq!(engine.balance(&"1001".into()).unwrap(), dec("500"));
        assert_eq!(engine.store().record_count(), 0);
    }

    #[test]
    fn test_self_transfer_rejected() {
        let engine = engine();
        let id = AccountId::from("1001");
        assert!(matches!(
            engine.transfer(&id, &id, dec("1")),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_transfer_scenario() {
        let engine = engine();
        let a = AccountId::from("1001");
        let b = AccountId::from("1002");

        assert_eq!(engine.transfer(&a, &b, dec("200.00")).unwrap(), dec("300.00"));
        assert_eq!(engine.balance(&a).unwrap().to_string(), "300.00");
        assert_eq!(engine.balance(&b).unwrap().to_string(), "500.00");

        let out = engine.history(&a).unwrap();
        let inbound = engine.history(&b).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(inbound.len(), 1);
        assert_eq!(out[0].kind, MovementKind::TransferOut);
        assert_eq!(inbound[0].kind, MovementKind::TransferIn);
        assert_eq!(out[0].amount, dec("200.00"));
        assert_eq!(inbound[0].amount, dec("200.00"));
        assert_eq!(out[0].timestamp, inbound[0].timestamp);
        assert_eq!(out[0].counterparty.as_ref(), Some(&b));
        assert_eq!(inbound[0].counterparty.as_ref(), Some(&a));
    }

    #[test]
    fn test_reverse_direction_transfer() {
        let engine = engine();
        let a = AccountId::from("1001");
        let b = AccountId::from("1002");

        // Target sorts first; handles must still map to the right accounts.
        assert_eq!(engine.transfer(&b, &a, dec("100")).unwrap(), dec("200"));
        assert_eq!(engine.balance(&a).unwrap(), dec("600"));
    }

    #[test]
    fn test_transfer_insufficient_funds_leaves_no_trace() {
        let engine = engine();
        let a = AccountId::from("1001");
        let b = AccountId::from("1002");

        let err = engine.transfer(&b, &a, dec("300.01")).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { ref account, .. } if account == &b));
        assert_eq!(engine.balance(&a).unwrap(), dec("500"));
        assert_eq!(engine.balance(&b).unwrap(), dec("300"));
        assert_eq!(engine.store().record_count(), 0);
    }

    #[test]
    fn test_open_account_rules() {
        let engine = engine();
        let err = engine
            .open_account(NewAccount::new("1001", "Mallory", Money::ZERO), "0000")
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
        assert_eq!(engine.balance(&"1001".into()).unwrap(), dec("500"));

        let err = engine
            .open_account(NewAccount::new("2000", "Eve", dec("-1")), "0000")
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        let opened = engine
            .open_account(NewAccount::new("2001", "Carol", Money::ZERO), "0000")
            .unwrap();
        assert!(opened.balance.is_zero());
        assert_ne!(opened.credential, "0000");
        assert!(engine.history(&"2001".into()).unwrap().is_empty());
    }

    #[test]
    fn test_session_dashboard_reflects_latest_balance() {
        let engine = engine();
        let session = engine.login(&"1001".into(), "1234").unwrap();
        engine.deposit(session.account(), dec("10")).unwrap();

        let account = engine.dashboard(&session).unwrap();
        assert_eq!(account.balance, dec("510"));
        assert_eq!(account.holder, "Alice");
    }

    #[test]
    fn test_change_credential_writes_no_record() {
        let engine = engine();
        let id = AccountId::from("1001");
        engine.change_credential(&id, "1234", "4321").unwrap();

        assert!(engine.login(&id, "4321").is_ok());
        assert!(matches!(engine.login(&id, "1234"), Err(LedgerError::AuthFailed)));
        assert_eq!(engine.store().record_count(), 0);
    }
}
