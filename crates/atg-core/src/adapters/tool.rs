//! Tool commands: the external unit-test tooling suite is an
//! opaque process, invoked by a fixed set of command shapes. Every
//! command runs with the environment directory as its working directory.

use std::path::{Path, PathBuf};

use crate::error::{AtgError, Result};
use crate::process::{CommandSpec, ProcessOutput, Runner};

/// Wraps `Runner` with the tool's command vocabulary. `tool_binary` is
/// the test tool's CLI driver (e.g. `clicast`); `tool_python` is the
/// interpreter used to invoke the strip-failures helper script.
pub struct ToolAdapter {
    tool_binary: PathBuf,
    tool_python: PathBuf,
    strip_failures_script: PathBuf,
    runner: Runner,
}

impl ToolAdapter {
    pub fn new(
        tool_binary: impl Into<PathBuf>,
        tool_python: impl Into<PathBuf>,
        strip_failures_script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tool_binary: tool_binary.into(),
            tool_python: tool_python.into(),
            strip_failures_script: strip_failures_script.into(),
            runner: Runner::new(),
        }
    }

    async fn run_in(&self, env_dir: &Path, args: Vec<String>, log_prefix: Option<PathBuf>) -> Result<ProcessOutput> {
        let mut spec = CommandSpec::new(self.tool_binary.to_string_lossy(), args).with_cwd(env_dir);
        if let Some(prefix) = log_prefix {
            spec = spec.with_log_prefix(prefix);
        }
        self.runner.run(&spec).await
    }

    /// `-l c ENVironment script run <env>.env`
    pub async fn rebuild(&self, env_dir: &Path, env_file: &str) -> Result<ProcessOutput> {
        self.run_in(
            env_dir,
            vec![
                "-l".into(),
                "c".into(),
                "ENVironment".into(),
                "script".into(),
                "run".into(),
                env_file.into(),
            ],
            None,
        )
        .await
    }

    /// `-e <env> tools auto_baseline_test <out>.tst`
    pub async fn auto_baseline_test(&self, env_dir: &Path, env_name: &str, out_tst: &str) -> Result<ProcessOutput> {
        self.run_in(
            env_dir,
            vec!["-e".into(), env_name.into(), "tools".into(), "auto_baseline_test".into(), out_tst.into()],
            None,
        )
        .await
    }

    /// `-e <env> tools auto_atg_test <out>.tst`
    pub async fn auto_atg_test(&self, env_dir: &Path, env_name: &str, out_tst: &str) -> Result<ProcessOutput> {
        self.run_in(
            env_dir,
            vec!["-e".into(), env_name.into(), "tools".into(), "auto_atg_test".into(), out_tst.into()],
            None,
        )
        .await
    }

    /// `test script run <path>`
    pub async fn import_script(&self, env_dir: &Path, env_name: &str, path: &str) -> Result<ProcessOutput> {
        self.run_in(
            env_dir,
            vec!["-e".into(), env_name.into(), "test".into(), "script".into(), "run".into(), path.into()],
            None,
        )
        .await
    }

    /// `execute batch --update_coverage_data`
    pub async fn execute_batch(&self, env_dir: &Path, env_name: &str) -> Result<ProcessOutput> {
        self.run_in(
            env_dir,
            vec![
                "-e".into(),
                env_name.into(),
                "execute".into(),
                "batch".into(),
                "--update_coverage_data".into(),
            ],
            None,
        )
        .await
    }

    /// `TESt ACtuals_to_expected`
    pub async fn actuals_to_expected(&self, env_dir: &Path, env_name: &str) -> Result<ProcessOutput> {
        self.run_in(
            env_dir,
            vec!["-e".into(), env_name.into(), "TESt".into(), "ACtuals_to_expected".into()],
            None,
        )
        .await
    }

    /// `test script create <out>`
    pub async fn extract_script(&self, env_dir: &Path, env_name: &str, out_tst: &str) -> Result<ProcessOutput> {
        self.run_in(
            env_dir,
            vec!["-e".into(), env_name.into(), "test".into(), "script".into(), "create".into(), out_tst.into()],
            None,
        )
        .await
    }

    /// `<tool-python> strip_failures.py <in> <out>`, run against the
    /// live environment database.
    pub async fn strip_failures(&self, env_dir: &Path, input_tst: &str, output_tst: &str) -> Result<ProcessOutput> {
        let spec = CommandSpec::new(
            self.tool_python.to_string_lossy(),
            vec![
                self.strip_failures_script.to_string_lossy().into_owned(),
                input_tst.to_string(),
                output_tst.to_string(),
            ],
        )
        .with_cwd(env_dir);
        self.runner.run(&spec).await
    }

    /// Builds a fatal `AtgError` from a failed tool invocation, flagging
    /// a possible missing-license condition.
    pub fn invocation_error(&self, action: &str, output: &ProcessOutput) -> AtgError {
        let missing_license = crate::error::stderr_suggests_missing_license(&output.stderr);
        AtgError::tool_invocation(
            format!("{action} exited with code {}: {}", output.exit_code, output.stderr),
            missing_license,
        )
    }
}
