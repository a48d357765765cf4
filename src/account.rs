//! Account model and balance operations.
//!
//! Maintains the invariant: `balance >= 0` after every applied change.

use crate::money::Money;
use serde::Serialize;
use std::borrow::Borrow;
use std::fmt;

/// Unique account identifier (the account number).
///
/// Ordering is plain lexical order of the underlying string; multi-row lock
/// acquisition relies on it being a total order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        AccountId(id.to_string())
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        AccountId(id)
    }
}

impl Borrow<str> for AccountId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AccountKind {
    #[default]
    Savings,
    Current,
}

impl AccountKind {
    /// Parses a case-insensitive kind name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "savings" => Some(AccountKind::Savings),
            "current" => Some(AccountKind::Current),
            _ => None,
        }
    }
}

/// Contact metadata carried with an account. Not interpreted by the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContactInfo {
    pub phone: String,
    pub email: String,
    pub address: String,
    pub branch: String,
    pub branch_code: String,
}

/// Registration request for a new account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: AccountId,
    pub holder: String,
    pub kind: AccountKind,
    pub opening_balance: Money,
    pub contact: ContactInfo,
}

impl NewAccount {
    /// Creates a request with default kind and empty contact details.
    pub fn new(id: impl Into<AccountId>, holder: impl Into<String>, opening_balance: Money) -> Self {
        NewAccount {
            id: id.into(),
            holder: holder.into(),
            kind: AccountKind::default(),
            opening_balance,
            contact: ContactInfo::default(),
        }
    }

    pub fn with_kind(mut self, kind: AccountKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_contact(mut self, contact: ContactInfo) -> Self {
        self.contact = contact;
        self
    }
}

/// A stored account record.
///
/// # Invariants
///
/// - `balance >= 0` at every committed state
/// - `credential` is always a one-way digest, never the secret itself
#[derive(Clone, Serialize)]
pub struct Account {
    /// Unique account number.
    pub id: AccountId,

    /// Name of the account holder.
    pub holder: String,

    /// Current balance. Never negative.
    pub balance: Money,

    /// Digest of the account secret (PIN).
    #[serde(skip)]
    pub credential: String,

    /// Savings or current.
    pub kind: AccountKind,

    /// Contact metadata.
    pub contact: ContactInfo,
}

/// Why a balance change was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaRefusal {
    /// The balance would go below zero
    Insufficient,
    /// The balance is outside the representable range
    Overflow,
}

impl Account {
    /// Builds the stored record for a registration request.
    pub fn from_registration(request: NewAccount, credential: String) -> Self {
        Account {
            id: request.id,
            holder: request.holder,
            balance: request.opening_balance,
            credential,
            kind: request.kind,
            contact: request.contact,
        }
    }

    /// Applies a signed change to the balance and returns the new balance.
    ///
    /// On refusal the balance is left untouched.
    pub fn apply_delta(&mut self, delta: Money) -> Result<Money, DeltaRefusal> {
        match self.balance.checked_add(delta) {
            Some(next) if next.is_negative() => Err(DeltaRefusal::Insufficient),
            Some(next) => {
                self.balance = next;
                Ok(next)
            }
            None => Err(DeltaRefusal::Overflow),
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("holder", &self.holder)
            .field("balance", &self.balance)
            .field("kind", &self.kind)
            .field("contact", &self.contact)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    fn account(balance: &str) -> Account {
        Account::from_registration(NewAccount::new("1001", "Alice", dec(balance)), "digest".into())
    }

    #[test]
    fn test_registration_copies_fields() {
        let request = NewAccount::new("1001", "Alice", dec("500"))
            .with_kind(AccountKind::Current)
            .with_contact(ContactInfo {
                email: "alice@example.com".into(),
                ..ContactInfo::default()
            });
        let account = Account::from_registration(request, "digest".into());

        assert_eq!(account.id.as_str(), "1001");
        assert_eq!(account.balance.to_string(), "500.00");
        assert_eq!(account.kind, AccountKind::Current);
        assert_eq!(account.contact.email, "alice@example.com");
    }

    #[test]
    fn test_credit_increases_balance() {
        let mut account = account("10");
        assert_eq!(account.apply_delta(dec("2.5")), Ok(dec("12.50")));
        assert_eq!(account.balance.to_string(), "12.50");
    }

    #[test]
    fn test_debit_to_exact_zero() {
        let mut account = account("10");
        assert_eq!(account.apply_delta(dec("-10")), Ok(Money::ZERO));
        assert!(account.balance.is_zero());
    }

    #[test]
    fn test_overdraw_leaves_balance_untouched() {
        let mut account = account("10");
        assert_eq!(account.apply_delta(dec("-10.01")), Err(DeltaRefusal::Insufficient));
        assert_eq!(account.balance.to_string(), "10.00");
    }

    #[test]
    fn test_overflowing_credit_is_not_insufficient_funds() {
        let mut account = account("1");
        let huge = Money::from(rust_decimal::Decimal::MAX);
        assert_eq!(account.apply_delta(huge), Err(DeltaRefusal::Overflow));
        assert_eq!(account.balance.to_string(), "1.00");
    }

    #[test]
    fn test_debug_hides_credential() {
        let rendered = format!("{:?}", account("1"));
        assert!(!rendered.contains("digest"));
    }

    #[test]
    fn test_ids_order_lexically() {
        assert!(AccountId::from("1001") < AccountId::from("1002"));
        assert!(AccountId::from("9") > AccountId::from("10"));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(AccountKind::parse(" Current "), Some(AccountKind::Current));
        assert_eq!(AccountKind::parse("loan"), None);
    }
}
