//! CLI integration test modules.
//!
//! - `run_command_test` - exercises `atg run`'s help output and its
//!   argument-validation failures.

mod run_command_test;
