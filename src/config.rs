//! Runtime settings read from the environment.
//!
//! - `LEDGER_LOCK_TIMEOUT_MS`: bound on row-lock waits (unset = wait forever)
//! - `LEDGER_ARGON2_MEMORY_KIB`, `LEDGER_ARGON2_ITERATIONS`,
//!   `LEDGER_ARGON2_PARALLELISM`: secret-hashing cost

use crate::error::{LedgerError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

const LOCK_TIMEOUT_MS: &str = "LEDGER_LOCK_TIMEOUT_MS";
const ARGON2_MEMORY_KIB: &str = "LEDGER_ARGON2_MEMORY_KIB";
const ARGON2_ITERATIONS: &str = "LEDGER_ARGON2_ITERATIONS";
const ARGON2_PARALLELISM: &str = "LEDGER_ARGON2_PARALLELISM";

/// Engine and store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Longest a unit waits for a row lock before aborting.
    pub lock_timeout: Option<Duration>,

    /// Argon2 memory cost in KiB.
    pub argon2_memory_kib: u32,

    /// Argon2 pass count.
    pub argon2_iterations: u32,

    /// Argon2 lanes.
    pub argon2_parallelism: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            lock_timeout: None,
            argon2_memory_kib: argon2::Params::DEFAULT_M_COST,
            argon2_iterations: argon2::Params::DEFAULT_T_COST,
            argon2_parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

impl LedgerConfig {
    /// Reads settings from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let lock_timeout_ms: Option<u64> = parse_opt(&lookup, LOCK_TIMEOUT_MS)?;

        let config = LedgerConfig {
            lock_timeout: lock_timeout_ms.map(Duration::from_millis),
            argon2_memory_kib: parse_opt(&lookup, ARGON2_MEMORY_KIB)?
                .unwrap_or(defaults.argon2_memory_kib),
            argon2_iterations: parse_opt(&lookup, ARGON2_ITERATIONS)?
                .unwrap_or(defaults.argon2_iterations),
            argon2_parallelism: parse_opt(&lookup, ARGON2_PARALLELISM)?
                .unwrap_or(defaults.argon2_parallelism),
        };
        config.argon2_params()?;
        Ok(config)
    }

    /// Argon2 cost parameters, checked against the algorithm's limits.
    ///
    /// An out-of-range value is a `Config` error naming the variable that
    /// sets it.
    pub fn argon2_params(&self) -> Result<argon2::Params> {
        argon2::Params::new(
            self.argon2_memory_kib,
            self.argon2_iterations,
            self.argon2_parallelism,
            None,
        )
        .map_err(|e| {
            let key = match e {
                argon2::Error::TimeTooSmall => ARGON2_ITERATIONS,
                argon2::Error::ThreadsTooFew | argon2::Error::ThreadsTooMany => ARGON2_PARALLELISM,
                _ => ARGON2_MEMORY_KIB,
            };
            LedgerError::Config {
                key,
                message: e.to_string(),
            }
        })
    }
}

fn parse_opt<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| LedgerError::Config {
                key,
                message: format!("{:?}: {}", raw, e),
            }),
    }
}
