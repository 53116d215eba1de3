//! SCM hook: `unchanged_files(before, after)`, realised by
//! shelling `git diff --name-status` and `git ls-files` through the same
//! opaque-process `Runner` used for the test tool, rather than binding a
//! git library. Renames are rejected unless `allow_moves` is set.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::{AtgError, Result};
use crate::process::{CommandSpec, Runner};

/// `unchanged_files(before, after) -> set<relative_path>`.
pub trait ScmAdapter: Send + Sync {
    fn unchanged_files(
        &self,
        before: &str,
        after: &str,
    ) -> impl std::future::Future<Output = Result<HashSet<String>>> + Send;
}

/// Shells out to `git` in `repository_path`.
pub struct GitScmAdapter {
    repository_path: PathBuf,
    allow_moves: bool,
    runner: Runner,
}

impl GitScmAdapter {
    pub fn new(repository_path: impl Into<PathBuf>, allow_moves: bool) -> Self {
        Self {
            repository_path: repository_path.into(),
            allow_moves,
            runner: Runner::new(),
        }
    }

    async fn all_files(&self) -> Result<HashSet<String>> {
        let spec = CommandSpec::new("git", ["ls-files"]).with_cwd(&self.repository_path);
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            return Err(AtgError::scm(format!("git ls-files failed: {}", output.stderr)));
        }
        Ok(output
            .stdout
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    async fn changed_files(&self, before: &str, after: &str) -> Result<HashSet<String>> {
        let spec = CommandSpec::new(
            "git",
            ["diff", "--name-status", before, after],
        )
        .with_cwd(&self.repository_path);
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            return Err(AtgError::scm(format!("git diff failed: {}", output.stderr)));
        }

        let mut changed = HashSet::new();
        for line in output.stdout.lines() {
            let mut fields = line.split('\t');
            let Some(status) = fields.next() else {
                continue;
            };
            if status.starts_with('R') || status.starts_with('C') {
                if !self.allow_moves {
                    return Err(AtgError::scm(
                        "commit range contains file moves; pass allow_moves to permit",
                    ));
                }
                // rename/copy: old path, new path
                fields.next();
                if let Some(new_path) = fields.next() {
                    changed.insert(new_path.to_string());
                }
            } else if let Some(path) = fields.next() {
                changed.insert(path.to_string());
            }
        }
        Ok(changed)
    }
}

impl ScmAdapter for GitScmAdapter {
    async fn unchanged_files(&self, before: &str, after: &str) -> Result<HashSet<String>> {
        let all = self.all_files().await?;
        let changed = self.changed_files(before, after).await?;
        Ok(all.difference(&changed).cloned().collect())
    }
}
