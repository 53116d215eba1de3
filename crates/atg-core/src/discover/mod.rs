//! Dependency Discoverer: for each built environment, reads
//! its dependency manifest and coverage database to populate the file
//! dependency graph and the routine inventory. All writes to the shared
//! maps go through the shared-state primitive.

pub mod coverage;
pub mod manifest;

use std::path::Path;

use tracing::warn;

use crate::exec::{Executor, SharedState};
use crate::model::{DependencyGraph, Environment, RoutineInventory};

/// Result of discovery across every built environment.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    pub graph: DependencyGraph,
    pub routines: RoutineInventory,
}

/// Drives manifest and coverage-database parsing across environments in
/// parallel, accumulating into one shared `DiscoveryResult`.
pub struct Discoverer {
    executor: Executor,
    repository_path: std::path::PathBuf,
}

impl Discoverer {
    pub fn new(executor: Executor, repository_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            executor,
            repository_path: repository_path.into(),
        }
    }

    pub async fn discover(&self, environments: Vec<Environment>) -> DiscoveryResult {
        let state: SharedState<DiscoveryResult> = SharedState::new(DiscoveryResult::default());
        let repository_path = self.repository_path.clone();

        let shared = state.clone();
        self.executor
            .run_parallel(environments, move |env: Environment| {
                let shared = shared.clone();
                let repository_path = repository_path.clone();
                async move {
                    process_one_environment(&env, &repository_path, &shared).await;
                }
            })
            .await;

        // `SharedState` is `Arc`-backed; this is the only remaining owner
        // once every worker above has finished, so read it back out.
        state.get_cloned().await
    }
}

async fn process_one_environment(
    env: &Environment,
    repository_path: &Path,
    shared: &SharedState<DiscoveryResult>,
) {
    let files = match manifest::parse_manifest_file(&env.manifest_path()) {
        Ok(files) => files,
        Err(e) => {
            warn!(env = %env.name, error = %e, "failed to parse dependency manifest");
            return;
        }
    };

    let relative_files: Vec<String> = files
        .into_iter()
        .filter_map(|f| relative_to_repository(&f.path, repository_path))
        .collect();

    let routines = match coverage::units_to_functions(&env.coverage_db_path()) {
        Ok(routines) => routines,
        Err(e) => {
            warn!(env = %env.name, error = %e, "failed to query coverage database");
            Default::default()
        }
    };

    shared
        .update(|result| {
            if relative_files.is_empty() {
                result.graph.insert_environment(env.clone());
            }
            for file in relative_files {
                result.graph.insert(env.clone(), file);
            }
            result.routines.insert(env.clone(), routines);
        })
        .await;
}

/// A manifest file is recorded only if its path is rooted under the
/// repository, and is stored as a repository-relative path. A relative
/// path that still carries a `..` component after stripping the
/// repository prefix points back outside the repository and is dropped,
/// same as a path outside the repository altogether.
fn relative_to_repository(fname: &str, repository_path: &Path) -> Option<String> {
    use std::path::Component;

    let path = Path::new(fname);
    let relative = path.strip_prefix(repository_path).ok()?;
    if relative.components().any(|c| matches!(c, Component::ParentDir)) {
        return None;
    }
    Some(relative.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_outside_the_repository_are_dropped() {
        let repo = Path::new("/repo");
        assert_eq!(
            relative_to_repository("/repo/src/a.c", repo),
            Some("src/a.c".to_string())
        );
        assert_eq!(relative_to_repository("/other/a.c", repo), None);
    }

    #[test]
    fn parent_dir_escape_after_prefix_is_dropped() {
        let repo = Path::new("/repo");
        assert_eq!(relative_to_repository("/repo/../etc/passwd", repo), None);
    }

    proptest::proptest! {
        /// Relative-path domain: any recorded file is repository-relative,
        /// never absolute, never carries a `..` segment.
        #[test]
        fn recorded_paths_are_always_relative_and_dot_dot_free(
            segments in proptest::collection::vec("[a-z]{1,8}", 1..4),
        ) {
            let repo = Path::new("/repo");
            let abs = format!("/repo/{}", segments.join("/"));
            if let Some(rel) = relative_to_repository(&abs, repo) {
                proptest::prop_assert!(!rel.starts_with('/'));
                proptest::prop_assert!(!rel.split('/').any(|seg| seg == ".."));
            }
        }
    }
}
