//! Credential verification and rotation.
//!
//! Secrets are only ever stored as one-way digests produced by a
//! [`SecretHasher`]. Every failed check, whatever its cause, surfaces as the
//! same [`LedgerError::AuthFailed`], and a missing account still pays for one
//! hash verification against a decoy digest so it costs the same as a wrong
//! secret.

use crate::account::{Account, AccountId};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::store::{AccountStore, AtomicUnit};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Version};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;

/// One-way, salted secret hashing.
pub trait SecretHasher: Send + Sync {
    /// Produces a fresh digest for `secret`.
    fn hash(&self, secret: &str) -> Result<String>;

    /// Checks `secret` against a digest produced by [`hash`](Self::hash).
    fn verify(&self, secret: &str, digest: &str) -> Result<bool>;
}

/// Argon2id hasher producing PHC-format strings.
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    /// Hasher with the argon2 crate's default cost.
    pub fn new() -> Self {
        Argon2Hasher {
            argon2: Argon2::default(),
        }
    }

    /// Hasher with the cost parameters from `config`.
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        let params = config.argon2_params()?;
        Ok(Argon2Hasher {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| LedgerError::Hashing(e.to_string()))
    }

    fn verify(&self, secret: &str, digest: &str) -> Result<bool> {
        let parsed = PasswordHash::new(digest).map_err(|e| LedgerError::Hashing(e.to_string()))?;

        match self.argon2.verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(LedgerError::Hashing(e.to_string())),
        }
    }
}

/// An authenticated caller context.
///
/// Returned by [`AuthGate::login`] and passed explicitly into later calls;
/// there is no ambient "current account".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    account: AccountId,
    holder: String,
    started_at: DateTime<Utc>,
}

impl Session {
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Verifies and rotates account credentials.
pub struct AuthGate<S, H> {
    store: Arc<S>,
    hasher: H,

    /// Digest checked when the account does not exist.
    decoy: String,
}

impl<S: AccountStore, H: SecretHasher> AuthGate<S, H> {
    pub fn new(store: Arc<S>, hasher: H) -> Result<Self> {
        let decoy = hasher.hash("decoy-secret")?;
        Ok(AuthGate {
            store,
            hasher,
            decoy,
        })
    }

    /// Digest for a new account's secret.
    pub fn hash_secret(&self, secret: &str) -> Result<String> {
        self.hasher.hash(secret)
    }

    /// Returns the account if `secret` matches its credential.
    pub fn verify(&self, id: &AccountId, secret: &str) -> Result<Account> {
        let account = match self.store.fetch(id) {
            Ok(account) => Some(account),
            Err(LedgerError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let digest = account
            .as_ref()
            .map(|a| a.credential.as_str())
            .unwrap_or(self.decoy.as_str());
        let matches = self.check(secret, digest);

        match account {
            Some(account) if matches => Ok(account),
            _ => {
                debug!("Authentication failed for account {}", id);
                Err(LedgerError::AuthFailed)
            }
        }
    }

    /// Verifies the secret and opens a session for the account.
    pub fn login(&self, id: &AccountId, secret: &str) -> Result<Session> {
        let account = self.verify(id, secret)?;
        info!("Account {} logged in", account.id);
        Ok(Session {
            account: account.id,
            holder: account.holder,
            started_at: Utc::now(),
        })
    }

    /// Replaces the credential if `old_secret` matches.
    ///
    /// Check and replace happen under the account's row lock, so of two
    /// concurrent rotations from the same old secret at most one succeeds.
    /// Any failure leaves the previous credential in place.
    pub fn rotate(&self, id: &AccountId, old_secret: &str, new_secret: &str) -> Result<()> {
        // Hashed before locking to keep the row hold short.
        let fresh = self.hasher.hash(new_secret)?;

        let mut unit = self.store.begin();
        let handle = match unit.fetch_for_update(id) {
            Ok(handle) => handle,
            Err(LedgerError::NotFound(_)) => {
                self.check(old_secret, &self.decoy);
                debug!("Credential rotation failed for account {}", id);
                return Err(LedgerError::AuthFailed);
            }
            Err(e) => return Err(e),
        };

        if !self.check(old_secret, &unit.account(handle)?.credential) {
            unit.rollback();
            debug!("Credential rotation failed for account {}", id);
            return Err(LedgerError::AuthFailed);
        }

        unit.replace_credential(handle, fresh)?;
        unit.commit()?;
        info!("Rotated credential for account {}", id);
        Ok(())
    }

    fn check(&self, secret: &str, digest: &str) -> bool {
        match self.hasher.verify(secret, digest) {
            Ok(matches) => matches,
            Err(e) => {
                warn!("Credential check could not run: {}", e);
                false
            }
        }
    }
}
