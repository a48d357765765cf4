//! Integration tests for the ledger engine CLI.
//!
//! These tests run the actual binary and verify output against expected CSV files.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write;

/// Get path to test data file
fn test_data_path(filename: &str) -> String {
    format!("tests/data/{}", filename)
}

/// Binary with cheap hashing so debug builds stay fast
fn engine_cmd() -> Command {
    let mut cmd = Command::cargo_bin("ledger-engine").unwrap();
    cmd.env("LEDGER_ARGON2_MEMORY_KIB", "64")
        .env("LEDGER_ARGON2_ITERATIONS", "1");
    cmd
}

/// Run the binary with the given input file and return stdout
fn run_engine(input_file: &str) -> String {
    let assert = engine_cmd().arg(input_file).assert().success();
    String::from_utf8(assert.get_output().stdout.clone()).unwrap()
}

/// Normalize CSV for comparison (sort lines, trim whitespace)
fn normalize_csv(csv: &str) -> Vec<String> {
    let mut lines: Vec<String> = csv
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    // Keep header first, sort the rest
    if lines.len() > 1 {
        let header = lines.remove(0);
        lines.sort();
        lines.insert(0, header);
    }

    lines
}

fn assert_matches_expected(sample: &str, expected: &str) {
    let output = run_engine(&test_data_path(sample));
    let expected = fs::read_to_string(test_data_path(expected)).unwrap();

    assert_eq!(normalize_csv(&output), normalize_csv(&expected));
}

#[test]
fn test_sample_a_transfer_scenario() {
    assert_matches_expected("sample_a.csv", "expected_a.csv");
}

#[test]
fn test_sample_b_rejected_operations() {
    assert_matches_expected("sample_b_rejections.csv", "expected_b.csv");
}

#[test]
fn test_sample_c_whitespace_handling() {
    assert_matches_expected("sample_c_whitespace.csv", "expected_c.csv");
}

#[test]
fn test_sample_d_pin_changes() {
    assert_matches_expected("sample_d_pins.csv", "expected_d.csv");
}

#[test]
fn test_rejections_are_logged_not_fatal() {
    engine_cmd()
        .env("RUST_LOG", "warn")
        .arg(test_data_path("sample_b_rejections.csv"))
        .assert()
        .success()
        .stderr(predicate::str::contains("Insufficient funds"))
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_secrets_never_reach_output() {
    let output = run_engine(&test_data_path("sample_a.csv"));
    assert!(!output.contains("1234"));
    assert!(!output.contains("argon2"));
}

#[test]
fn test_script_from_temp_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "op,account,other,amount,secret,detail").unwrap();
    writeln!(file, "open,A1,,0,1111,Ann").unwrap();
    writeln!(file, "deposit,A1,,100,,").unwrap();
    writeln!(file, "withdraw,A1,,100,,").unwrap();
    file.flush().unwrap();

    let output = run_engine(file.path().to_str().unwrap());
    assert!(output.contains("A1,Ann,0.00,2"));
}

#[test]
fn test_missing_file_error() {
    engine_cmd()
        .arg("nonexistent.csv")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error").or(predicate::str::contains("Error")));
}

#[test]
fn test_missing_argument_error() {
    engine_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing script file"));
}

#[test]
fn test_bad_configuration_error() {
    engine_cmd()
        .env("LEDGER_LOCK_TIMEOUT_MS", "soon")
        .arg(test_data_path("sample_a.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("LEDGER_LOCK_TIMEOUT_MS"));
}

#[test]
fn test_out_of_range_hashing_cost_is_configuration_error() {
    engine_cmd()
        .env("LEDGER_ARGON2_ITERATIONS", "0")
        .arg(test_data_path("sample_a.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration LEDGER_ARGON2_ITERATIONS"));
}

#[test]
fn test_output_has_correct_header() {
    let output = run_engine(&test_data_path("sample_a.csv"));
    assert!(output.starts_with("account,holder,balance,records"));
}

#[test]
fn test_balances_have_two_decimal_places() {
    let output = run_engine(&test_data_path("sample_c_whitespace.csv"));

    for line in output.lines().skip(1) {
        let parts: Vec<&str> = line.split(',').collect();
        let balance = parts[2];
        let dot_pos = balance.find('.').expect("balance has a decimal point");
        assert_eq!(balance.len() - dot_pos - 1, 2, "Expected 2 decimal places in: {}", balance);
    }
}
