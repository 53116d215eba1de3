//! Project Builder: populates and builds the VectorCAST
//! Manage project's environments, or, when `skip_build` is set, verifies
//! environments that were already built by a previous run.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{AtgError, Result};
use crate::exec::Executor;
use crate::model::Environment;
use crate::process::{CommandSpec, Runner};

const NEEDED_ARTEFACTS: [&str; 2] = ["cover.db", "include_dependencies.xml"];
const BUILD_LOG_NAME: &str = "environment_builder.log";
const BUILD_SUCCESS_MARKER: &str = "Environment built Successfully";

/// Options governing one Builder run.
#[derive(Debug, Clone)]
pub struct BuilderOptions {
    /// Skip the populate-and-build step; only discover and validate
    /// environments that already exist under `build_folder`.
    pub skip_build: bool,
    /// Remove a pre-existing `build_folder` instead of failing.
    /// Mutually exclusive with `skip_build`.
    pub clean_up: bool,
    /// Don't fail the whole run when an environment fails to build;
    /// drop it and continue.
    pub allow_broken_environments: bool,
    /// Compiler node passed to `manage --level <node> --build`, if any.
    pub compiler_node: Option<String>,
}

impl BuilderOptions {
    /// Validates the `skip_build` XOR `clean_up` rule.
    pub fn validate(&self) -> Result<()> {
        if self.skip_build && self.clean_up {
            return Err(AtgError::configuration(
                "skip_build and clean_up are mutually exclusive",
            ));
        }
        Ok(())
    }
}

/// Drives the Manage project through populate/build/verify.
pub struct Builder {
    manage_exe: PathBuf,
    clicast_exe: PathBuf,
    project_name: String,
    manage_root_dir: PathBuf,
    build_folder: PathBuf,
    cwd: PathBuf,
    runner: Runner,
    executor: Executor,
    options: BuilderOptions,
}

impl Builder {
    /// `manage_vcm_path` is the `.vcm` project file; `manage_root_dir` (its
    /// sibling directory of the same stem) must already exist with an
    /// `environment` subdirectory.
    pub fn new(
        manage_vcm_path: impl AsRef<Path>,
        vectorcast_dir: impl AsRef<Path>,
        options: BuilderOptions,
        executor: Executor,
    ) -> Result<Self> {
        options.validate()?;

        let manage_vcm_path = manage_vcm_path.as_ref().to_path_buf();
        if !manage_vcm_path.is_file() {
            return Err(AtgError::build_tree(format!(
                "Manage project file not found: {}",
                manage_vcm_path.display()
            )));
        }
        if manage_vcm_path.extension().and_then(|e| e.to_str()) != Some("vcm") {
            return Err(AtgError::build_tree(format!(
                "expected a .vcm project file, got {}",
                manage_vcm_path.display()
            )));
        }

        let manage_root_dir = manage_vcm_path.with_extension("");
        if !manage_root_dir.is_dir() {
            return Err(AtgError::build_tree(format!(
                "Manage project directory not found: {}",
                manage_root_dir.display()
            )));
        }
        if !manage_root_dir.join("environment").is_dir() {
            return Err(AtgError::build_tree(format!(
                "Manage project is missing its 'environment' directory: {}",
                manage_root_dir.display()
            )));
        }

        let build_folder = manage_root_dir.join("build");
        if options.skip_build && !build_folder.is_dir() {
            return Err(AtgError::build_tree(format!(
                "skip_build requires an existing build folder: {}",
                build_folder.display()
            )));
        }

        let project_name = manage_vcm_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let cwd = manage_root_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| manage_root_dir.clone());

        let vectorcast_dir = vectorcast_dir.as_ref().to_path_buf();
        Ok(Self {
            manage_exe: vectorcast_dir.join("manage"),
            clicast_exe: vectorcast_dir.join("clicast"),
            project_name,
            manage_root_dir,
            build_folder,
            cwd,
            runner: Runner::new(),
            executor,
            options,
        })
    }

    /// Runs the whole Builder sequence: populate (unless `skip_build`),
    /// discover, build-or-verify. Returns the environments that came out
    /// valid.
    pub async fn process(&self) -> Result<Vec<Environment>> {
        info!(project = %self.project_name, "processing Manage project");

        if !self.options.skip_build {
            self.prepare_build_folder().await?;
            self.populate_build_folder().await?;
        }

        let discovered = self.discover_environments()?;
        debug!(count = discovered.len(), "discovered environments");

        let built = if self.options.skip_build {
            self.check_built_environments(discovered).await?
        } else {
            self.build_environments(discovered).await?
        };

        info!(project = %self.project_name, valid = built.len(), "Manage project processed");
        Ok(built)
    }

    /// (a) Populate: remove or reject a pre-existing build folder.
    async fn prepare_build_folder(&self) -> Result<()> {
        if self.build_folder.exists() {
            if !self.options.clean_up {
                return Err(AtgError::build_tree(format!(
                    "{} already exists, not proceeding",
                    self.build_folder.display()
                )));
            }
            tokio::fs::remove_dir_all(&self.build_folder)
                .await
                .map_err(|e| AtgError::io(&self.build_folder, e))?;
        }
        Ok(())
    }

    async fn populate_build_folder(&self) -> Result<()> {
        let mut args = vec!["-p".to_string(), self.project_name.clone()];
        if let Some(node) = &self.options.compiler_node {
            args.push("--level".into());
            args.push(node.clone());
        }
        args.push("--build".into());

        let spec = CommandSpec::new(self.manage_exe.to_string_lossy(), args).with_cwd(&self.cwd);
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            return Err(self.build_failure("--build", &output.stderr));
        }
        if !self.build_folder.is_dir() {
            return Err(AtgError::build_tree(format!(
                "build completed but {} is missing",
                self.build_folder.display()
            )));
        }
        Ok(())
    }

    fn build_failure(&self, action: &str, stderr: &str) -> AtgError {
        let missing_license = crate::error::stderr_suggests_missing_license(stderr);
        let suffix = if missing_license { " -- missing license?" } else { "" };
        AtgError::tool_invocation(format!("manage {action} failed{suffix}: {stderr}"), missing_license)
    }

    /// (b) Discover: walk `build_folder` for `<name>.env` files whose
    /// directory also has a `CCAST_.CFG`.
    fn discover_environments(&self) -> Result<Vec<Environment>> {
        let mut found = Vec::new();
        for entry in walkdir::WalkDir::new(&self.build_folder)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let is_env = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("env"));
            if !is_env {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(dir) = path.parent() else {
                continue;
            };
            if dir.join("CCAST_.CFG").exists() {
                // `dir` is the env-location directory holding `<name>.env`
                // and `CCAST_.CFG`; the built environment (cover.db,
                // include_dependencies.xml) will live in `dir/<name>` once
                // built, so that is what `Environment::build_location`
                // names.
                found.push(Environment::new(stem.to_string(), dir.join(stem)));
            }
        }
        found.sort();
        found.dedup();
        Ok(found)
    }

    /// (c) Build each discovered environment in parallel, then verify.
    async fn build_environments(&self, environments: Vec<Environment>) -> Result<Vec<Environment>> {
        let clicast_exe = self.clicast_exe.clone();
        let runner = self.runner.clone();
        let allow_broken = self.options.allow_broken_environments;

        let results = self
            .executor
            .run_parallel(environments, move |env| {
                let clicast_exe = clicast_exe.clone();
                let runner = runner.clone();
                async move {
                    let returncode = build_one(&runner, &clicast_exe, &env).await;
                    let valid = match returncode {
                        Ok(code) => check_success_build(&env, code == 0),
                        Err(e) => {
                            warn!(env = env.name, error = %e, "failed to invoke rebuild script");
                            false
                        }
                    };
                    (env, valid)
                }
            })
            .await;

        self.collect_valid(results, allow_broken)
    }

    /// `skip_build` path: assume every discovered environment already
    /// built successfully; validate each against the same predicate.
    async fn check_built_environments(&self, environments: Vec<Environment>) -> Result<Vec<Environment>> {
        let allow_broken = self.options.allow_broken_environments;
        let results = self
            .executor
            .run_parallel(environments, move |env| async move {
                let valid = check_success_build(&env, true);
                (env, valid)
            })
            .await;
        self.collect_valid(results, allow_broken)
    }

    /// When `allow_broken_environments` is false, any broken environment
    /// is fatal for the whole run (mirrors `build_manage.py::check_env`'s
    /// `raise RuntimeError` on the first failed environment); otherwise
    /// broken environments are dropped and logged.
    fn collect_valid(&self, results: Vec<Option<(Environment, bool)>>, allow_broken: bool) -> Result<Vec<Environment>> {
        let mut valid = Vec::new();
        for item in results.into_iter().flatten() {
            let (env, ok) = item;
            if ok {
                valid.push(env);
            } else if !allow_broken {
                return Err(AtgError::build_tree(format!(
                    "environment {} did not build successfully",
                    env.name
                )));
            } else {
                warn!(env = env.name, "dropping broken environment (allow_broken_environments)");
            }
        }
        Ok(valid)
    }
}

async fn build_one(runner: &Runner, clicast_exe: &Path, env: &Environment) -> Result<i32> {
    let env_script = format!("{}.env", env.name);
    let env_location = env.build_location.parent().unwrap_or(&env.build_location);
    let spec = CommandSpec::new(
        clicast_exe.to_string_lossy(),
        ["-lc", "environment", "script", "run", &env_script],
    )
    .with_cwd(env_location)
    .with_log_prefix(env_location.join("rebuild"));

    let output = runner.run(&spec).await?;
    Ok(output.exit_code)
}

/// Mirrors `check_success_build`: zero return code, built folder present,
/// the two required artefacts present, and the build log says success.
fn check_success_build(env: &Environment, zero_return_code: bool) -> bool {
    if !zero_return_code || !env.build_location.is_dir() {
        return false;
    }
    let all_present = NEEDED_ARTEFACTS
        .iter()
        .all(|name| env.build_location.join(name).is_file());
    if !all_present {
        return false;
    }
    let build_log = env.build_location.join(BUILD_LOG_NAME);
    match std::fs::read_to_string(&build_log) {
        Ok(contents) => contents.contains(BUILD_SUCCESS_MARKER),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_build_and_clean_up_are_mutually_exclusive() {
        let options = BuilderOptions {
            skip_build: true,
            clean_up: true,
            allow_broken_environments: false,
            compiler_node: None,
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn skip_build_alone_is_valid() {
        let options = BuilderOptions {
            skip_build: true,
            clean_up: false,
            allow_broken_environments: false,
            compiler_node: None,
        };
        assert!(options.validate().is_ok());
    }

    fn make_env(dir: &Path) -> Environment {
        Environment::new("my_env", dir.to_path_buf())
    }

    #[test]
    fn check_success_build_requires_all_artefacts_and_log_marker() {
        let dir = tempfile::tempdir().unwrap();
        let env = make_env(dir.path());
        assert!(!check_success_build(&env, true));

        std::fs::write(dir.path().join("cover.db"), "").unwrap();
        std::fs::write(dir.path().join("include_dependencies.xml"), "").unwrap();
        assert!(!check_success_build(&env, true));

        std::fs::write(
            dir.path().join(BUILD_LOG_NAME),
            "... Environment built Successfully ...",
        )
        .unwrap();
        assert!(check_success_build(&env, true));
        assert!(!check_success_build(&env, false));
    }

    #[test]
    fn new_rejects_missing_vcm_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("project.vcm");
        let result = Builder::new(
            &missing,
            "/opt/vectorcast",
            BuilderOptions {
                skip_build: false,
                clean_up: false,
                allow_broken_environments: false,
                compiler_node: None,
            },
            Executor::new(Some(1)),
        );
        assert!(matches!(result, Err(AtgError::BuildTree { .. })));
    }

    #[test]
    fn discover_environments_requires_sibling_cfg() {
        let dir = tempfile::tempdir().unwrap();
        let vcm = dir.path().join("project.vcm");
        std::fs::write(&vcm, "").unwrap();
        let root = dir.path().join("project");
        std::fs::create_dir_all(root.join("environment")).unwrap();
        let build = root.join("build");
        let with_cfg = build.join("envA");
        let without_cfg = build.join("envB");
        std::fs::create_dir_all(&with_cfg).unwrap();
        std::fs::create_dir_all(&without_cfg).unwrap();
        std::fs::write(with_cfg.join("envA.env"), "").unwrap();
        std::fs::write(with_cfg.join("CCAST_.CFG"), "").unwrap();
        std::fs::write(without_cfg.join("envB.env"), "").unwrap();

        let builder = Builder::new(
            &vcm,
            "/opt/vectorcast",
            BuilderOptions {
                skip_build: true,
                clean_up: false,
                allow_broken_environments: false,
                compiler_node: None,
            },
            Executor::new(Some(1)),
        )
        .unwrap();

        let found = builder.discover_environments().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "envA");
    }
}
