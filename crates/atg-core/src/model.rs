//! Core data model: environments, the file dependency graph, and
//! the routine inventory.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

/// A built test environment, identified by `(name, build_location)`.
///
/// Constructed by the Project Builder, reconstructed in place many times
/// by the Baseliner, never mutated concurrently by more than one worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Environment {
    pub name: String,
    pub build_location: PathBuf,
}

impl Environment {
    pub fn new(name: impl Into<String>, build_location: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            build_location: build_location.into(),
        }
    }

    /// Path to the environment's dependency manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.build_location.join("include_dependencies.xml")
    }

    /// Path to the environment's coverage database.
    pub fn coverage_db_path(&self) -> PathBuf {
        self.build_location.join("cover.db")
    }

    /// Path to the per-environment configuration file (`CCAST_.CFG`),
    /// co-located with the rebuild script one directory above the built
    /// environment (`build_location`'s parent), not inside it.
    pub fn config_path(&self) -> PathBuf {
        self.build_location
            .parent()
            .unwrap_or(&self.build_location)
            .join("CCAST_.CFG")
    }

    /// Path to the rebuild script (`<name>.env`), co-located with the
    /// build directory one level up.
    pub fn rebuild_script(&self) -> PathBuf {
        self.build_location
            .parent()
            .unwrap_or(&self.build_location)
            .join(format!("{}.env", self.name))
    }

    /// Environment is *valid* iff its manifest and coverage database
    /// exist on disk. The build-log/exit-code half of the invariant
    /// is checked by the caller that ran the build, since it
    /// requires the build's own exit status.
    pub fn artefacts_present(&self) -> bool {
        self.manifest_path().is_file() && self.coverage_db_path().is_file()
    }
}

/// Two mappings kept consistent: `env -> files` and `file -> envs`,
/// always relative to the repository root.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    env_to_files: HashMap<Environment, HashSet<String>>,
    file_to_envs: HashMap<String, HashSet<Environment>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `env` depends on `file` (a repository-relative path).
    /// Maintains both directions; idempotent.
    pub fn insert(&mut self, env: Environment, file: String) {
        self.file_to_envs
            .entry(file.clone())
            .or_default()
            .insert(env.clone());
        self.env_to_files.entry(env).or_default().insert(file);
    }

    /// Registers `env` with no dependency files, so it still appears in
    /// `environments()` even though its manifest named none. Idempotent;
    /// a later `insert` for the same environment adds to this entry
    /// rather than replacing it.
    pub fn insert_environment(&mut self, env: Environment) {
        self.env_to_files.entry(env).or_default();
    }

    pub fn files_of(&self, env: &Environment) -> HashSet<String> {
        self.env_to_files.get(env).cloned().unwrap_or_default()
    }

    pub fn envs_of(&self, file: &str) -> HashSet<Environment> {
        self.file_to_envs.get(file).cloned().unwrap_or_default()
    }

    pub fn environments(&self) -> impl Iterator<Item = &Environment> {
        self.env_to_files.keys()
    }

    /// Invariant 1: symmetry of the two maps.
    pub fn is_symmetric(&self) -> bool {
        self.env_to_files.iter().all(|(env, files)| {
            files
                .iter()
                .all(|f| self.file_to_envs.get(f).is_some_and(|envs| envs.contains(env)))
        }) && self.file_to_envs.iter().all(|(file, envs)| {
            envs.iter()
                .all(|e| self.env_to_files.get(e).is_some_and(|files| files.contains(file)))
        })
    }
}

/// `env -> (unit_source_path -> ordered routine names)`.
/// Ordering is preserved as returned by the coverage query.
pub type RoutineInventory = HashMap<Environment, BTreeMap<PathBuf, Vec<String>>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn env(n: &str) -> Environment {
        Environment::new(n, PathBuf::from(format!("/build/{n}")))
    }

    #[test]
    fn graph_insert_keeps_both_directions_symmetric() {
        let mut g = DependencyGraph::new();
        g.insert(env("e1"), "a.c".into());
        g.insert(env("e1"), "b.c".into());
        g.insert(env("e2"), "b.c".into());

        assert!(g.is_symmetric());
        assert_eq!(g.files_of(&env("e1")).len(), 2);
        assert_eq!(g.envs_of("b.c").len(), 2);
    }

    #[test]
    fn unknown_env_or_file_yields_empty_set() {
        let g = DependencyGraph::new();
        assert!(g.files_of(&env("nope")).is_empty());
        assert!(g.envs_of("nope.c").is_empty());
    }

    #[test]
    fn insert_environment_registers_with_no_files() {
        let mut g = DependencyGraph::new();
        g.insert_environment(env("e1"));
        assert!(g.environments().any(|e| *e == env("e1")));
        assert!(g.files_of(&env("e1")).is_empty());
        assert!(g.is_symmetric());
    }

    proptest::proptest! {
        /// Bidirectional graph consistency: for any sequence of inserts,
        /// env ∈ envs_of(f) iff f ∈ files_of(env).
        #[test]
        fn inserts_keep_the_graph_symmetric(
            pairs in proptest::collection::vec(("[a-z]{1,4}", "[a-z]{1,4}\\.c"), 0..20),
        ) {
            let mut g = DependencyGraph::new();
            for (name, file) in &pairs {
                g.insert(env(name), file.clone());
            }
            proptest::prop_assert!(g.is_symmetric());
        }
    }
}
