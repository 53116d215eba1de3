//! CLI argument types, grounded on `clnrm-core/src/cli/types.rs`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::{AtgError, Result};

#[derive(Debug, Parser)]
#[command(name = "atg", about = "Incremental automatic test-generation driver")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the whole pipeline: build, discover, select impact, generate and baseline tests.
    Run(RunArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Repository root, used to resolve manifest paths and (if given) the SCM diff.
    #[arg(long)]
    pub repository_path: PathBuf,

    /// Path to the Manage project's `.vcm` file.
    #[arg(long)]
    pub project_path: PathBuf,

    /// Root of the installed test tool (holds `manage`, `clicast`, `pyedg`).
    #[arg(long)]
    pub vectorcast_dir: PathBuf,

    /// Root directory for final, spliced `.tst` files. Defaults to
    /// `<project_root>/environment`.
    #[arg(long)]
    pub final_tst_path: Option<PathBuf>,

    /// Optional TOML sidecar providing defaults for any flag not given
    /// on the command line.
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Before/after commit range for the SCM hook. Omit to treat every
    /// environment as impacted.
    #[arg(long, num_args = 2, value_names = ["BEFORE", "AFTER"])]
    pub scm_range: Option<Vec<String>>,

    /// Per-command timeout, seconds.
    #[arg(long, default_value_t = 600)]
    pub timeout: u64,

    /// Print a JUnit XML report after the run.
    #[arg(long, default_value_t = false)]
    pub report: bool,

    /// Analyse and print impact without invoking the test tool.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long, default_value_t = 10)]
    pub baseline_iterations: u32,

    /// Remove a pre-existing build folder instead of failing.
    #[arg(long, default_value_t = false)]
    pub clean_up: bool,

    /// Skip populate/build; verify environments already built by a previous run.
    #[arg(long, default_value_t = false)]
    pub skip_build: bool,

    /// Cap how many unchanged-file names the dry-run report prints.
    #[arg(long, default_value_t = 20)]
    pub limit_unchanged: usize,

    /// Accept SCM renames/copies as unchanged at their new path.
    #[arg(long, default_value_t = false)]
    pub allow_moves: bool,

    /// Drop environments that fail to build instead of failing the whole run.
    #[arg(long, default_value_t = false)]
    pub allow_broken_environments: bool,

    #[arg(long, default_value_t = false)]
    pub verbose: bool,

    #[arg(long, default_value_t = false)]
    pub quiet: bool,

    /// Write structured logs to a file in addition to stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Treat a non-zero ATG exit code as "this routine has no tests"
    /// only when false; when true, non-zero is a hard failure.
    #[arg(long, default_value_t = false)]
    pub strict_rc: bool,

    /// Worker pool size. Defaults to the CPU count.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Scratch directory for intermediate ATG/baseline artefacts.
    #[arg(long)]
    pub atg_work_dir: Option<PathBuf>,

    /// Compiler node passed to `manage --level <node> --build`.
    #[arg(long)]
    pub compiler_node: Option<String>,
}

impl RunArgs {
    /// Mirrors validation rules: `skip_build` XOR `clean_up`,
    /// `verbose ∧ quiet`, `report ∧ quiet` are all errors.
    pub fn validate(&self) -> Result<()> {
        if self.skip_build == self.clean_up {
            return Err(AtgError::configuration(
                "exactly one of --skip_build or --clean_up must be set",
            ));
        }
        if self.verbose && self.quiet {
            return Err(AtgError::configuration("--verbose and --quiet are mutually exclusive"));
        }
        if self.report && self.quiet {
            return Err(AtgError::configuration("--report and --quiet are mutually exclusive"));
        }
        if self.baseline_iterations < 1 {
            return Err(AtgError::configuration("--baseline_iterations must be >= 1"));
        }
        if let Some(range) = &self.scm_range {
            if range.len() != 2 {
                return Err(AtgError::configuration("--scm_range takes exactly BEFORE and AFTER"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> RunArgs {
        RunArgs {
            repository_path: PathBuf::from("/repo"),
            project_path: PathBuf::from("/repo/project.vcm"),
            vectorcast_dir: PathBuf::from("/opt/vectorcast"),
            final_tst_path: None,
            config_file: None,
            scm_range: None,
            timeout: 600,
            report: false,
            dry_run: false,
            baseline_iterations: 10,
            clean_up: false,
            skip_build: true,
            limit_unchanged: 20,
            allow_moves: false,
            allow_broken_environments: false,
            verbose: false,
            quiet: false,
            log_file: None,
            strict_rc: false,
            workers: None,
            atg_work_dir: None,
            compiler_node: None,
        }
    }

    #[test]
    fn skip_build_and_clean_up_must_not_both_be_false_or_true() {
        let mut args = base_args();
        args.skip_build = false;
        args.clean_up = false;
        assert!(args.validate().is_err());

        args.skip_build = true;
        args.clean_up = true;
        assert!(args.validate().is_err());

        args.clean_up = false;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn verbose_and_quiet_are_mutually_exclusive() {
        let mut args = base_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn report_and_quiet_are_mutually_exclusive() {
        let mut args = base_args();
        args.report = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn zero_baseline_iterations_is_rejected() {
        let mut args = base_args();
        args.baseline_iterations = 0;
        assert!(args.validate().is_err());
    }
}
