//! CLI integration tests
//!
//! Runs the panelview binary against data views saved into temp dirs.

#![allow(deprecated)] // Command::cargo_bin deprecation - no stable replacement yet

use assert_cmd::Command;
use panelview::core::DataView;
use panelview::panel::merge::LongTable;
use panelview::types::TRADE_DATE;
use predicates::prelude::*;
use tempfile::TempDir;

fn saved_view() -> TempDir {
    let mut table = LongTable::new(TRADE_DATE, vec!["close".to_string(), "volume".to_string()]);
    for (i, date) in [20200102, 20200103, 20200106].iter().enumerate() {
        table.push_row(*date, "000001.SZ", vec![Some(10.0 + i as f64), Some(100.0)]).unwrap();
        table.push_row(*date, "600000.SH", vec![Some(20.0), Some(200.0)]).unwrap();
    }
    let dir = TempDir::new().unwrap();
    DataView::from_long_table(&table).unwrap().save(dir.path()).unwrap();
    dir
}

fn panelview() -> Command {
    Command::cargo_bin("panelview").unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// HELP
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_cli_help() {
    panelview()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("formula"))
        .stdout(predicate::str::contains("COMMANDS"));
}

#[test]
fn test_formula_help_lists_functions() {
    panelview()
        .args(["formula", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ts_Mean"));
}

// ═══════════════════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_info() {
    let dir = saved_view();
    panelview()
        .arg("info")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("20200102"))
        .stdout(predicate::str::contains("volume"))
        .stdout(predicate::str::contains("(custom)").not());
}

#[test]
fn test_info_marks_custom_fields() {
    let dir = saved_view();
    panelview()
        .arg("formula")
        .arg(dir.path())
        .args(["--name", "amount", "--expr", "close * volume", "--save"])
        .assert()
        .success();
    panelview()
        .arg("info")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("(custom)"));
}

#[test]
fn test_info_missing_dir() {
    let dir = TempDir::new().unwrap();
    panelview()
        .arg("info")
        .arg(dir.path().join("nothing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No stored data view"));
}

#[test]
fn test_get_field() {
    let dir = saved_view();
    panelview()
        .arg("get")
        .arg(dir.path())
        .args(["--field", "close", "--symbol", "000001.SZ"])
        .assert()
        .success()
        .stdout(predicate::str::contains("000001.SZ"))
        .stdout(predicate::str::contains("12"))
        .stdout(predicate::str::contains("600000.SH").not());
}

#[test]
fn test_formula_save_then_remove() {
    let dir = saved_view();
    panelview()
        .arg("formula")
        .arg(dir.path())
        .args(["--name", "amount", "--expr", "close * volume", "--save"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1200"));

    let dv = DataView::load(dir.path()).unwrap();
    assert!(dv.has_field("amount"));

    panelview()
        .arg("remove")
        .arg(dir.path())
        .arg("amount")
        .assert()
        .success();
    assert!(!DataView::load(dir.path()).unwrap().has_field("amount"));
}

#[test]
fn test_formula_without_save_leaves_view() {
    let dir = saved_view();
    panelview()
        .arg("formula")
        .arg(dir.path())
        .args(["--name", "ret", "--expr", "return(close, 1)", "--name-style", "upper"])
        .assert()
        .success()
        .stdout(predicate::str::contains("RETURN(close, 1)"));
    assert!(!DataView::load(dir.path()).unwrap().has_field("ret"));
}

#[test]
fn test_formula_parse_error() {
    let dir = saved_view();
    panelview()
        .arg("formula")
        .arg(dir.path())
        .args(["--name", "bad", "--expr", "close +"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("parse error"));
}

#[test]
fn test_fields_catalog() {
    panelview()
        .args(["fields", "--category", "quarterly"])
        .assert()
        .success()
        .stdout(predicate::str::contains("roe"))
        .stdout(predicate::str::contains("close").not());
}

#[test]
fn test_validate_config() {
    let dir = TempDir::new().unwrap();
    let good = dir.path().join("good.yaml");
    std::fs::write(
        &good,
        "start_date: 20200101\nend_date: 20200331\nsymbol: 000001.SZ\nfields: [close, roe]\n",
    )
    .unwrap();
    panelview()
        .arg("validate")
        .arg(&good)
        .assert()
        .success()
        .stdout(predicate::str::contains("Benchmark").not());

    let benchmarked = dir.path().join("benchmarked.yaml");
    std::fs::write(
        &benchmarked,
        "start_date: 20200101\nend_date: 20200331\nuniverse: 000300.SH\nbenchmark: 000300.SH\nfields: [close]\n",
    )
    .unwrap();
    panelview()
        .arg("validate")
        .arg(&benchmarked)
        .assert()
        .success()
        .stdout(predicate::str::contains("Benchmark: 000300.SH"));

    let bad = dir.path().join("bad.yaml");
    std::fs::write(
        &bad,
        "start_date: 20200101\nend_date: 20200331\nsymbol: 000001.SZ\nfields: [close, made_up]\n",
    )
    .unwrap();
    panelview()
        .arg("validate")
        .arg(&bad)
        .assert()
        .failure()
        .stdout(predicate::str::contains("made_up"));
}
