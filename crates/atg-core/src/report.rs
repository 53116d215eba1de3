//! Dry-run reporting and JUnit XML generation, grounded on
//! `clnrm-core/src/cli/utils.rs::generate_junit_xml`.

use std::collections::HashSet;

use junit_report::{Duration, OffsetDateTime, Report, TestCase, TestSuite};

use crate::error::{AtgError, Result};
use crate::model::{DependencyGraph, Environment, RoutineInventory};

const RULE: &str = "################################################################################";

/// Everything a `--dry_run` invocation needs to print without touching
/// any build or ATG tooling: what changed, what was discovered, and
/// which environments would be re-run.
pub struct DryRunReport<'a> {
    pub repository_path: &'a std::path::Path,
    pub scm_range: Option<(&'a str, &'a str)>,
    pub total_files: usize,
    pub changed_files: usize,
    pub unchanged_files: &'a HashSet<String>,
    pub limit_unchanged: usize,
    pub manage_vcm_path: &'a std::path::Path,
    pub environments: &'a [Environment],
    pub dependencies: &'a DependencyGraph,
    pub routines: &'a RoutineInventory,
    pub impacted: &'a [Environment],
}

impl DryRunReport<'_> {
    /// Renders the report as a sequence of `#`-ruled sections, one per
    /// analysis phase.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.section_changes(&mut out);
        self.section_environments(&mut out);
        self.section_routine_counts(&mut out);
        self.section_file_usage(&mut out);
        self.section_impacted(&mut out);
        out
    }

    fn section_changes(&self, out: &mut String) {
        out.push_str(RULE);
        out.push('\n');
        match self.scm_range {
            Some((before, after)) => {
                out.push_str(&format!(
                    "After analysing {} between {before} and {after}\n",
                    self.repository_path.display()
                ));
            }
            None => {
                out.push_str(&format!(
                    "After analysing {} (no SCM range given, treating everything as changed)\n",
                    self.repository_path.display()
                ));
            }
        }
        out.push_str(&format!("   There were {} total files\n", self.total_files));
        out.push_str(&format!("   There were {} changed files\n", self.changed_files));
        out.push_str(&format!(
            "   We calculated that the following {} files were unchanged (limited to {}):\n",
            self.unchanged_files.len(),
            self.limit_unchanged
        ));
        let mut sorted: Vec<&String> = self.unchanged_files.iter().collect();
        sorted.sort();
        for file in sorted.into_iter().take(self.limit_unchanged) {
            out.push_str(&format!("      {file}\n"));
        }
        out.push_str(RULE);
        out.push('\n');
    }

    fn section_environments(&self, out: &mut String) {
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&format!(
            "After building {}, we found {} environments:\n",
            self.manage_vcm_path.display(),
            self.environments.len()
        ));
        for env in self.environments {
            out.push_str(&format!("      {}\n", env.name));
        }
        out.push_str(RULE);
        out.push('\n');
    }

    fn section_routine_counts(&self, out: &mut String) {
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&format!(
            "After processing {}, we found the following routine counts:\n",
            self.manage_vcm_path.display()
        ));
        for env in self.environments {
            let count = self
                .routines
                .get(env)
                .map(|units| units.values().map(Vec::len).sum::<usize>())
                .unwrap_or(0);
            out.push_str(&format!("      {} had {count} routines\n", env.name));
        }
        out.push_str(RULE);
        out.push('\n');
    }

    fn section_file_usage(&self, out: &mut String) {
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&format!(
            "After processing {}, we found the following used files:\n",
            self.manage_vcm_path.display()
        ));
        let mut files: Vec<String> = self
            .environments
            .iter()
            .flat_map(|e| self.dependencies.files_of(e))
            .collect();
        files.sort();
        files.dedup();
        for file in &files {
            let suffix = if self.unchanged_files.contains(file) { "UNCHANGED" } else { "CHANGED" };
            let count = self.dependencies.envs_of(file).len();
            out.push_str(&format!("      {file} {suffix} (used in {count} envs)\n"));
        }
        out.push_str(RULE);
        out.push('\n');
    }

    fn section_impacted(&self, out: &mut String) {
        out.push_str(RULE);
        out.push('\n');
        out.push_str("After processing the changes, we will re-run these environments\n");
        for env in self.impacted {
            let used = self.dependencies.files_of(env);
            let mut impacted_deps: Vec<&String> =
                used.iter().filter(|f| !self.unchanged_files.contains(*f)).collect();
            impacted_deps.sort();
            let count = self
                .routines
                .get(env)
                .map(|units| units.values().map(Vec::len).sum::<usize>())
                .unwrap_or(0);
            let files = impacted_deps.into_iter().cloned().collect::<Vec<_>>().join(", ");
            out.push_str(&format!("    {} ({count} routines) due to {files}\n", env.name));
        }
        out.push_str(RULE);
    }
}

/// Renders a [`DryRunReport`]. Split out as a free function so callers
/// don't need to know `DryRunReport` has a method; mirrors the
/// original's standalone `debug_report(...)` entry point.
pub fn debug_report(report: &DryRunReport) -> String {
    report.render()
}

/// One environment's processing result, for JUnit reporting.
pub struct EnvironmentOutcome {
    pub name: String,
    pub duration: std::time::Duration,
    pub error: Option<String>,
}

/// Builds a JUnit XML document with one test case per environment
/// (teacher's `generate_junit_xml` pattern, one suite per run).
pub fn generate_junit_xml(outcomes: &[EnvironmentOutcome]) -> Result<String> {
    let mut suite = TestSuite::new("atg");
    suite.set_timestamp(OffsetDateTime::now_utc());

    for outcome in outcomes {
        let duration = Duration::seconds(outcome.duration.as_secs() as i64);
        let test_case = match &outcome.error {
            Some(message) => TestCase::failure(&outcome.name, duration, "environment_failure", message),
            None => TestCase::success(&outcome.name, duration),
        };
        suite.add_testcase(test_case);
    }

    let mut report = Report::new();
    report.add_testsuite(suite);

    let mut xml = Vec::new();
    report
        .write_xml(&mut xml)
        .map_err(|e| AtgError::configuration(format!("JUnit XML generation failed: {e}")))?;

    String::from_utf8(xml).map_err(|e| AtgError::configuration(format!("JUnit XML is not valid UTF-8: {e}")))
}

/// Writes the rendered JUnit XML to `path`.
pub fn write_junit_xml(path: &std::path::Path, outcomes: &[EnvironmentOutcome]) -> Result<()> {
    let xml = generate_junit_xml(outcomes)?;
    std::fs::write(path, xml).map_err(|e| AtgError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn env(n: &str) -> Environment {
        Environment::new(n, PathBuf::from(format!("/build/{n}")))
    }

    #[test]
    fn render_includes_all_five_sections() {
        let unchanged = HashSet::new();
        let deps = DependencyGraph::new();
        let routines: RoutineInventory = RoutineInventory::new();
        let environments = vec![env("e1")];
        let impacted = vec![env("e1")];

        let report = DryRunReport {
            repository_path: std::path::Path::new("/repo"),
            scm_range: Some(("abc123", "def456")),
            total_files: 10,
            changed_files: 2,
            unchanged_files: &unchanged,
            limit_unchanged: 5,
            manage_vcm_path: std::path::Path::new("/repo/project.vcm"),
            environments: &environments,
            dependencies: &deps,
            routines: &routines,
            impacted: &impacted,
        };

        let rendered = report.render();
        assert!(rendered.contains("After analysing"));
        assert!(rendered.contains("After building"));
        assert!(rendered.contains("routine counts"));
        assert!(rendered.contains("used files"));
        assert!(rendered.contains("re-run these environments"));
    }

    #[test]
    fn unchanged_files_listing_respects_limit() {
        let mut unchanged = HashSet::new();
        unchanged.insert("a.c".to_string());
        unchanged.insert("b.c".to_string());
        unchanged.insert("c.c".to_string());
        let deps = DependencyGraph::new();
        let routines: RoutineInventory = RoutineInventory::new();
        let environments = vec![];
        let impacted = vec![];

        let report = DryRunReport {
            repository_path: std::path::Path::new("/repo"),
            scm_range: None,
            total_files: 3,
            changed_files: 0,
            unchanged_files: &unchanged,
            limit_unchanged: 1,
            manage_vcm_path: std::path::Path::new("/repo/project.vcm"),
            environments: &environments,
            dependencies: &deps,
            routines: &routines,
            impacted: &impacted,
        };

        let rendered = report.render();
        let listed = rendered.lines().filter(|l| l.trim_start().starts_with(char::is_alphabetic) && l.contains(".c")).count();
        assert_eq!(listed, 1);
    }

    #[test]
    fn junit_xml_marks_failures_distinctly() {
        let outcomes = vec![
            EnvironmentOutcome { name: "envA".into(), duration: std::time::Duration::from_secs(3), error: None },
            EnvironmentOutcome {
                name: "envB".into(),
                duration: std::time::Duration::from_secs(1),
                error: Some("build failed".into()),
            },
        ];
        let xml = generate_junit_xml(&outcomes).unwrap();
        assert!(xml.contains("envA"));
        assert!(xml.contains("envB"));
        assert!(xml.contains("build failed"));
    }

    #[test]
    fn routine_counts_use_inventory_when_present() {
        let mut routines: RoutineInventory = RoutineInventory::new();
        let mut units = BTreeMap::new();
        units.insert(PathBuf::from("foo.c"), vec!["routine_a".to_string(), "routine_b".to_string()]);
        routines.insert(env("e1"), units);
        let deps = DependencyGraph::new();
        let unchanged = HashSet::new();
        let environments = vec![env("e1")];
        let impacted = vec![];

        let report = DryRunReport {
            repository_path: std::path::Path::new("/repo"),
            scm_range: None,
            total_files: 1,
            changed_files: 1,
            unchanged_files: &unchanged,
            limit_unchanged: 0,
            manage_vcm_path: std::path::Path::new("/repo/project.vcm"),
            environments: &environments,
            dependencies: &deps,
            routines: &routines,
            impacted: &impacted,
        };

        assert!(report.render().contains("e1 had 2 routines"));
    }
}
