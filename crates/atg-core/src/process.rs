//! Process Runner: launches external commands with a timeout,
//! captures stdout/stderr/exit code, and optionally writes a per-call log
//! pair (`<prefix>.out`, `<prefix>.err`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, warn};

use crate::error::{AtgError, Result};

/// Outcome of running a command. A non-zero exit code is *not* a failure
/// of the runner itself — callers interpret it.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Description of a single command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
    /// When set, a `<log_prefix>.out` / `.err` pair is written next to the
    /// command's working directory (or as an absolute path).
    pub log_prefix: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            env: HashMap::new(),
            timeout: None,
            log_prefix: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_log_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.log_prefix = Some(prefix.into());
        self
    }

    fn display(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs external commands. Stateless; cheap to clone/share across workers.
#[derive(Debug, Clone, Default)]
pub struct Runner;

impl Runner {
    pub fn new() -> Self {
        Self
    }

    /// Runs `spec`, waiting at most `spec.timeout` (no limit if absent).
    /// Fails only on spawn errors; timeouts and non-zero exits are
    /// reported through `ProcessOutput`, not `Err`.
    pub async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (k, v) in &spec.env {
            command.env(k, v);
        }
        command.stdout(std::process::Stdio::piped());
        command.stderr(std::process::Stdio::piped());

        debug!(command = %spec.display(), "spawning process");
        let start = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            AtgError::io(spec.cwd.clone().unwrap_or_default(), e)
                .with_context(format!("failed to spawn `{}`", spec.display()))
        })?;

        // Taken up front so reading them can run concurrently with the
        // wait/timeout below instead of after it: a child that fills its
        // pipe buffer before exiting would otherwise deadlock against a
        // `wait()` that never returns.
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let wait_outcome = async {
            match spec.timeout {
                Some(d) => match tokio_timeout(d, child.wait()).await {
                    Ok(Ok(status)) => Ok((status.code().unwrap_or(-1), false)),
                    Ok(Err(e)) => Err(e),
                    Err(_) => {
                        warn!(command = %spec.display(), "process exceeded timeout, killing");
                        child.kill().await?;
                        child.wait().await?;
                        Ok((-1, true))
                    }
                },
                None => child.wait().await.map(|status| (status.code().unwrap_or(-1), false)),
            }
        };

        let (wait_result, stdout_buf, stderr_buf) =
            tokio::join!(wait_outcome, drain_pipe(stdout_pipe), drain_pipe(stderr_pipe));

        let (exit_code, timed_out) = wait_result.map_err(|e| {
            AtgError::io(spec.cwd.clone().unwrap_or_default(), e)
                .with_context(format!("failed to wait on `{}`", spec.display()))
        })?;

        let elapsed = start.elapsed();
        let stdout = String::from_utf8_lossy(&stdout_buf).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_buf).into_owned();

        let result = ProcessOutput {
            stdout,
            stderr,
            exit_code,
            timed_out,
        };

        if let Some(prefix) = &spec.log_prefix {
            self.write_log_pair(prefix, &spec.display(), &result, elapsed).await?;
        }

        Ok(result)
    }

    async fn write_log_pair(
        &self,
        prefix: &Path,
        command_display: &str,
        result: &ProcessOutput,
        elapsed: Duration,
    ) -> Result<()> {
        let out_path = path_with_suffix(prefix, "out");
        let err_path = path_with_suffix(prefix, "err");

        let mut out_contents = result.stdout.clone();
        if !out_contents.ends_with('\n') && !out_contents.is_empty() {
            out_contents.push('\n');
        }
        out_contents.push_str(&format!("-- elapsed: {:.3}s --\n", elapsed.as_secs_f64()));
        out_contents.push_str(&format!("-- exit code: {} --\n", result.exit_code));

        write_file(&out_path, &out_contents).await?;
        write_file(&err_path, &result.stderr).await?;

        debug!(command = %command_display, out = %out_path.display(), "wrote process log pair");
        Ok(())
    }
}

async fn drain_pipe<R: tokio::io::AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

fn path_with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut os = prefix.as_os_str().to_owned();
    os.push(".");
    os.push(suffix);
    PathBuf::from(os)
}

async fn write_file(path: &Path, contents: &str) -> Result<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| AtgError::io(path, e))?;
    file.write_all(contents.as_bytes())
        .await
        .map_err(|e| AtgError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_reports_exit_zero() {
        let runner = Runner::new();
        let spec = CommandSpec::new("true", Vec::<String>::new());
        let out = runner.run(&spec).await.expect("spawn must succeed");
        assert!(out.success());
        assert!(!out.timed_out);
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_a_runner_error() {
        let runner = Runner::new();
        let spec = CommandSpec::new("false", Vec::<String>::new());
        let out = runner.run(&spec).await.expect("spawn must succeed");
        assert!(!out.success());
        assert_eq!(out.exit_code, 1);
    }

    #[tokio::test]
    async fn timeout_kills_child_and_marks_non_success() {
        let runner = Runner::new();
        let spec = CommandSpec::new("sleep", vec!["5"]).with_timeout(Duration::from_millis(50));
        let out = runner.run(&spec).await.expect("spawn must succeed");
        assert!(out.timed_out);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn log_pair_written_with_trailer_lines() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("call-1");
        let runner = Runner::new();
        let spec = CommandSpec::new("echo", vec!["hello"]).with_log_prefix(&prefix);
        runner.run(&spec).await.unwrap();

        let out_contents = std::fs::read_to_string(path_with_suffix(&prefix, "out")).unwrap();
        assert!(out_contents.contains("hello"));
        assert!(out_contents.contains("-- elapsed:"));
        assert!(out_contents.contains("-- exit code: 0 --"));
        assert!(path_with_suffix(&prefix, "err").exists());
    }
}
