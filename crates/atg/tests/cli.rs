//! CLI integration tests, driven through the built `atg` binary.

mod cli;
