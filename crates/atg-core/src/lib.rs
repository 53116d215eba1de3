//! Incremental automatic test-generation driver: given a Manage project
//! and a source-control commit range, rebuild only the environments
//! whose files actually changed, regenerate and baseline their tests,
//! and splice the result back into the archived test script.

pub mod adapters;
pub mod baseline;
pub mod cli;
pub mod config;
pub mod discover;
pub mod error;
pub mod exec;
pub mod impact;
pub mod model;
pub mod process;
pub mod project;
pub mod report;
pub mod tst;

pub use error::{AtgError, Result};
