//! Configuration: the run's configuration object plus a
//! provider trait standing in for a dynamically-loaded configuration
//! module.

pub mod loader;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AtgError, Result};

/// TOML-loadable defaults for CLI flags, grounded on
/// `clnrm-core/src/config/project.rs`'s `CleanroomConfig` and the
/// `configargparse` default-config-file idiom.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct AtgConfig {
    pub repository_path: Option<PathBuf>,
    pub project_path: Option<PathBuf>,
    pub final_tst_path: Option<PathBuf>,
    pub vectorcast_dir: Option<PathBuf>,
    pub timeout_seconds: Option<u64>,
    pub baseline_iterations: Option<u32>,
    pub limit_unchanged: Option<usize>,
    pub workers: Option<usize>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
}

/// The assembled run configuration:
/// `{repository_path, project_path, final_tst_path, find_unchanged_files,
/// store_updated_tests, options, env_vars}`. `find_unchanged_files` is
/// `scm_range`: `None` means every environment is impacted;
/// `store_updated_tests` is the `ConfigProvider` callback.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub repository_path: PathBuf,
    pub project_path: PathBuf,
    pub final_tst_path: PathBuf,
    pub vectorcast_dir: PathBuf,
    pub scm_range: Option<(String, String)>,
    pub env_vars: HashMap<String, String>,
}

impl RunConfig {
    /// `final_tst_path` defaults to `<project_root>/environment` when
    /// absent.
    pub fn default_final_tst_path(project_path: &Path) -> PathBuf {
        let manage_dir = project_path.parent().unwrap_or(project_path);
        let project_name = project_path.file_stem().and_then(|s| s.to_str()).unwrap_or("project");
        manage_dir.join(project_name).join("environment")
    }

    pub fn validate(&self) -> Result<()> {
        if !self.repository_path.is_dir() {
            return Err(AtgError::configuration(format!(
                "repository_path is not a directory: {}",
                self.repository_path.display()
            )));
        }
        if !self.project_path.is_file() {
            return Err(AtgError::configuration(format!(
                "project_path is not a file: {}",
                self.project_path.display()
            )));
        }
        Ok(())
    }
}

/// A hook invoked once the run has produced updated test-script paths.
/// `NullConfigProvider` is a no-op default.
pub trait ConfigProvider: Send + Sync {
    fn store_updated_tests(&self, updated: &[PathBuf]);
}

#[derive(Debug, Clone, Default)]
pub struct NullConfigProvider;

impl ConfigProvider for NullConfigProvider {
    fn store_updated_tests(&self, _updated: &[PathBuf]) {}
}

/// Appends each updated path to a log file, one per line.
#[derive(Debug, Clone)]
pub struct LoggingConfigProvider {
    pub log_path: PathBuf,
}

impl ConfigProvider for LoggingConfigProvider {
    fn store_updated_tests(&self, updated: &[PathBuf]) {
        use std::io::Write;
        let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(&self.log_path) else {
            tracing::warn!(path = %self.log_path.display(), "failed to open updated-tests log");
            return;
        };
        for path in updated {
            let _ = writeln!(file, "{}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_final_tst_path_matches_manage_dir_project_environment() {
        let project_path = Path::new("/root/manage/project.vcm");
        let default = RunConfig::default_final_tst_path(project_path);
        assert_eq!(default, PathBuf::from("/root/manage/project/environment"));
    }

    #[test]
    fn logging_provider_appends_one_line_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("updated.log");
        let provider = LoggingConfigProvider { log_path: log_path.clone() };
        provider.store_updated_tests(&[PathBuf::from("a.tst"), PathBuf::from("b.tst")]);
        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
