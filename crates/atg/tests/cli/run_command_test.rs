//! CLI Integration Tests - Run Command
//!
//! Exercises the built `atg` binary directly rather than its argument
//! types in isolation, so a flag rename or a broken `clap` derive
//! attribute shows up here even though the unit tests in
//! `atg-core::cli::types` wouldn't catch it.

use assert_cmd::Command;
use predicates::prelude::*;

fn atg_cmd() -> Command {
    Command::cargo_bin("atg").expect("failed to find atg binary")
}

#[test]
fn run_help_lists_the_pipeline_flags() {
    atg_cmd()
        .arg("run")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--repository-path"))
        .stdout(predicate::str::contains("--skip-build"))
        .stdout(predicate::str::contains("--clean-up"));
}

#[test]
fn run_rejects_skip_build_and_clean_up_both_unset() {
    // Arrange: required path flags present, neither --skip-build nor
    // --clean-up given, so validation should fail before any filesystem
    // access.
    atg_cmd()
        .arg("run")
        .arg("--repository-path")
        .arg("/nonexistent/repo")
        .arg("--project-path")
        .arg("/nonexistent/repo/project.vcm")
        .arg("--vectorcast-dir")
        .arg("/nonexistent/vectorcast")
        .assert()
        .failure()
        .stderr(predicate::str::contains("skip_build"));
}

#[test]
fn run_rejects_verbose_and_quiet_together() {
    atg_cmd()
        .arg("run")
        .arg("--repository-path")
        .arg("/nonexistent/repo")
        .arg("--project-path")
        .arg("/nonexistent/repo/project.vcm")
        .arg("--vectorcast-dir")
        .arg("/nonexistent/vectorcast")
        .arg("--skip-build")
        .arg("--verbose")
        .arg("--quiet")
        .assert()
        .failure()
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn run_rejects_zero_baseline_iterations() {
    atg_cmd()
        .arg("run")
        .arg("--repository-path")
        .arg("/nonexistent/repo")
        .arg("--project-path")
        .arg("/nonexistent/repo/project.vcm")
        .arg("--vectorcast-dir")
        .arg("/nonexistent/vectorcast")
        .arg("--skip-build")
        .arg("--baseline-iterations")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("baseline_iterations"));
}

#[test]
fn run_missing_required_flags_fails_at_parse_time() {
    atg_cmd()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}
