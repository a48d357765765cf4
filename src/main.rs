//! Ledger Engine CLI
//!
//! Replays a CSV operation script against a fresh in-memory ledger and
//! outputs final account states.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- script.csv > accounts.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity
//! - `LEDGER_LOCK_TIMEOUT_MS`, `LEDGER_ARGON2_*`: see [`LedgerConfig`]

use ledger_engine::{Argon2Hasher, LedgerConfig, LedgerError, MemoryStore, Result, ScriptRunner};
use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::process;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(LedgerError::MissingArgument);
    }

    let config = LedgerConfig::from_env()?;
    let input_path = &args[1];
    let file = File::open(input_path)?;
    let reader = BufReader::new(file);

    let runner = ScriptRunner::new(
        MemoryStore::from_config(&config),
        Argon2Hasher::from_config(&config)?,
    )?;
    runner.process_csv(reader)?;

    let stdout = io::stdout();
    let handle = stdout.lock();
    runner.write_output(handle)?;

    Ok(())
}
