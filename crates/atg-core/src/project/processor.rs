//! Project Processor: for the impacted environments, fans out
//! ATG per-routine, merges the per-routine scripts, baselines each
//! environment, then splices the baselined ATG tests into the archived
//! test script.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::baseline::{BaselineConfig, Baseliner};
use crate::error::{AtgError, Result};
use crate::exec::{Executor, SharedState};
use crate::model::{Environment, RoutineInventory};
use crate::process::{CommandSpec, Runner};
use crate::tst;

const CONFIG_EDG_FLAGS_KEY: &str = "C_EDG_FLAGS:";
// `^NAME:.*ATG` names the TEST.NAME key; matched against the raw
// line it is `^TEST\.NAME:.*ATG`.
const ATG_NAME_PATTERN: &str = r"^TEST\.NAME:.*ATG";

/// Fixed options for one Processor run.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub vectorcast_dir: PathBuf,
    pub atg_timeout: Duration,
    pub strict_return_code: bool,
    pub baseline_iterations: u32,
    /// Root directory under which per-environment final `.tst`s are
    /// written (`<final_tst_path>/<env>/<env>.tst`).
    pub final_tst_path: PathBuf,
}

/// One `(unit_source, routine)` ATG attempt's outcome.
#[derive(Debug, Clone)]
struct RoutineResult {
    unit_source: PathBuf,
    routine: String,
    tst_file: Option<PathBuf>,
}

/// Drives Stages A-D across a set of impacted environments.
pub struct Processor {
    config: ProcessorConfig,
    executor: Executor,
    runner: Runner,
    baseliner: Baseliner,
}

impl Processor {
    pub fn new(config: ProcessorConfig, executor: Executor, baseliner: Baseliner) -> Self {
        Self {
            config,
            executor,
            runner: Runner::new(),
            baseliner,
        }
    }

    /// Runs Stages A-D for `environments`, keyed against `routines`
    /// (the inventory produced by the Dependency Discoverer, already
    /// filtered to impacted environments/units by the caller). Returns
    /// the set of final `.tst` paths written, one per environment.
    pub async fn process(&self, environments: Vec<Environment>, routines: &RoutineInventory) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.config.final_tst_path)
            .map_err(|e| AtgError::io(&self.config.final_tst_path, e))?;

        let per_routine = self.run_atg(&environments, routines).await;
        let merged = self.merge_atg_routine_tst(&environments, per_routine).await;

        let mut final_paths = Vec::new();
        for env in &environments {
            let Some(merged_tst) = merged.get(env) else {
                continue;
            };
            match self.baseline_one_environment(env, merged_tst).await {
                Ok(final_tst) => match self.prune_and_merge_one_environment(env, &final_tst).await {
                    Ok(path) => final_paths.push(path),
                    Err(e) => warn!(env = %env.name, error = %e, "failed to splice and persist"),
                },
                Err(e) => warn!(env = %env.name, error = %e, "baseline failed for environment"),
            }
        }
        Ok(final_paths)
    }

    /// Stage A: fan out ATG at routine granularity across every impacted
    /// environment.
    async fn run_atg(
        &self,
        environments: &[Environment],
        routines: &RoutineInventory,
    ) -> SharedState<BTreeMap<String, Vec<RoutineResult>>> {
        let state: SharedState<BTreeMap<String, Vec<RoutineResult>>> = SharedState::new(BTreeMap::new());

        let mut contexts = Vec::new();
        for env in environments {
            state.update(|m| m.entry(env.name.clone()).or_default()).await;
            let Some(units) = routines.get(env) else {
                continue;
            };
            for (unit_source, routine_names) in units {
                for routine in routine_names {
                    contexts.push((env.clone(), unit_source.clone(), routine.clone()));
                }
            }
        }

        let vectorcast_dir = self.config.vectorcast_dir.clone();
        let timeout = self.config.atg_timeout;
        let strict_return_code = self.config.strict_return_code;
        let runner = self.runner.clone();
        let shared = state.clone();

        self.executor
            .run_parallel(contexts, move |(env, unit_source, routine)| {
                let vectorcast_dir = vectorcast_dir.clone();
                let runner = runner.clone();
                let shared = shared.clone();
                async move {
                    let result =
                        run_atg_one_routine(&runner, &vectorcast_dir, &env, &unit_source, &routine, timeout, strict_return_code)
                            .await;
                    shared
                        .update(|m| m.entry(env.name.clone()).or_default().push(result))
                        .await;
                }
            })
            .await;

        state
    }

    /// Stage B: concatenate each environment's per-routine scripts,
    /// sorted by `(unit, routine)`, behind a three-line ASCII header.
    async fn merge_atg_routine_tst(
        &self,
        environments: &[Environment],
        per_routine: SharedState<BTreeMap<String, Vec<RoutineResult>>>,
    ) -> BTreeMap<Environment, PathBuf> {
        let results = per_routine.get_cloned().await;
        let mut merged = BTreeMap::new();

        for env in environments {
            let mut routine_results = results.get(&env.name).cloned().unwrap_or_default();
            routine_results.sort_by(|a, b| {
                (&a.unit_source, &a.routine).cmp(&(&b.unit_source, &b.routine))
            });

            let env_location = env.build_location.parent().unwrap_or(&env.build_location);
            let merged_path = env_location.join(format!("{}_atg.tst", env.name));

            let mut contents = String::new();
            for result in &routine_results {
                let unit_name = result
                    .unit_source
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let succeeded = result.tst_file.is_some();
                let msg = format!(
                    "-- ATG {} for {} (in unit {}) --",
                    if succeeded { "succeeded" } else { "failed" },
                    result.routine,
                    unit_name
                );
                let header = "-".repeat(msg.len());
                contents.push_str(&header);
                contents.push('\n');
                contents.push_str(&msg);
                contents.push('\n');
                contents.push_str(&header);
                contents.push('\n');

                if let Some(tst_file) = &result.tst_file {
                    match std::fs::read_to_string(tst_file) {
                        Ok(body) => contents.push_str(&body),
                        Err(e) => warn!(path = %tst_file.display(), error = %e, "missing ATG output, treating as failed"),
                    }
                }
            }

            if let Err(e) = std::fs::write(&merged_path, &contents) {
                warn!(env = %env.name, error = %e, "failed to write merged ATG script");
                continue;
            }
            merged.insert(env.clone(), merged_path);
        }
        merged
    }

    /// Stage C: baseline the merged ATG script, with ATG regeneration
    /// disabled (it is the input, not to be regenerated).
    async fn baseline_one_environment(&self, env: &Environment, merged_tst: &Path) -> Result<PathBuf> {
        let env_location = env.build_location.parent().unwrap_or(&env.build_location);
        let mut config = BaselineConfig::new(self.config.baseline_iterations)?;
        config.run_atg = false;
        self.baseliner.run(env_location, &env.name, merged_tst, &config).await
    }

    /// Stage D: drop existing ATG tests from the archive, append the
    /// baselined ATG output, atomically replace the archived script.
    async fn prune_and_merge_one_environment(&self, env: &Environment, final_tst: &Path) -> Result<PathBuf> {
        let env_location = env.build_location.parent().unwrap_or(&env.build_location);
        let manage_build_dir = env_location
            .parent()
            .ok_or_else(|| AtgError::build_tree("environment has no build-folder parent"))?;
        let manage_project_dir = manage_build_dir
            .parent()
            .ok_or_else(|| AtgError::build_tree("build folder has no project-directory parent"))?;

        let archived_tst = manage_project_dir
            .join("environment")
            .join(&env.name)
            .join(format!("{}.tst", env.name));
        let archived_contents = std::fs::read_to_string(&archived_tst).map_err(|e| AtgError::io(&archived_tst, e))?;
        let final_contents = std::fs::read_to_string(final_tst).map_err(|e| AtgError::io(final_tst, e))?;

        let match_all = Regex::new(".*").expect("static regex");
        let match_atg = Regex::new(ATG_NAME_PATTERN).expect("static regex");
        let without_atg = tst::remove_by_pattern(&archived_contents, &match_all, &match_atg);

        let combined = format!("{without_atg}{final_contents}");

        let final_folder = self.config.final_tst_path.join(&env.name);
        std::fs::create_dir_all(&final_folder).map_err(|e| AtgError::io(&final_folder, e))?;
        let destination = final_folder.join(format!("{}.tst", env.name));

        let tmp = destination.with_extension("tst.tmp");
        std::fs::write(&tmp, &combined).map_err(|e| AtgError::io(&tmp, e))?;
        std::fs::rename(&tmp, &destination).map_err(|e| AtgError::io(&destination, e))?;

        debug!(env = %env.name, path = %destination.display(), "spliced and persisted final test script");
        Ok(destination)
    }
}

/// Reads the `C_EDG_FLAGS:` line out of the environment's `CCAST_.CFG`.
fn get_edg_flags(env_build_dir: &Path) -> Result<String> {
    let cfg_path = env_build_dir.join("CCAST_.CFG");
    let contents = std::fs::read_to_string(&cfg_path).map_err(|e| AtgError::io(&cfg_path, e))?;
    contents
        .lines()
        .find_map(|line| line.strip_prefix(CONFIG_EDG_FLAGS_KEY).map(|rest| rest.trim().to_string()))
        .ok_or_else(|| AtgError::configuration(format!("no {CONFIG_EDG_FLAGS_KEY} line in {}", cfg_path.display())))
}

/// Translation-unit path for a given unit source inside `env_path`:
/// basename with `.tu` inserted before the suffix.
fn unit_to_tu_path(env_path: &Path, unit_source: &Path) -> PathBuf {
    let stem = unit_source.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let suffix = unit_source.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_default();
    let tu_name = if suffix.is_empty() {
        format!("{stem}.tu")
    } else {
        format!("{stem}.tu.{suffix}")
    };
    env_path.join(tu_name)
}

async fn run_atg_one_routine(
    runner: &Runner,
    vectorcast_dir: &Path,
    env: &Environment,
    unit_source: &Path,
    routine: &str,
    timeout: Duration,
    strict_return_code: bool,
) -> RoutineResult {
    let env_location = env.build_location.parent().unwrap_or(&env.build_location);
    let unit = unit_source.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let output_prefix = env.build_location.join(format!("{}_{}_{}", env.name, unit, routine));

    let log_file = output_prefix.with_extension("log");
    let tst_file = output_prefix.with_extension("tst");

    let edg_flags = match get_edg_flags(env_location) {
        Ok(flags) => flags,
        Err(e) => {
            warn!(env = %env.name, unit, routine, error = %e, "missing EDG flags, dropping routine");
            return RoutineResult { unit_source: unit_source.to_path_buf(), routine: routine.to_string(), tst_file: None };
        }
    };
    let tu_path = unit_to_tu_path(&env.build_location, unit_source);

    let pyedg = vectorcast_dir.join("pyedg");
    let mut args: Vec<String> = edg_flags.split_whitespace().map(str::to_string).collect();
    args.push(tu_path.to_string_lossy().into_owned());

    let spec = CommandSpec::new(pyedg.to_string_lossy(), args)
        .with_cwd(&env.build_location)
        .with_timeout(timeout)
        .with_env("VCAST_ATG_LOG_FILE_NAME", log_file.to_string_lossy())
        .with_env("VCAST_ATG_RESTRICT_SUBPROGRAM", routine)
        .with_env("VCAST_PYEDG_ATG_OUTPUT_FILE", tst_file.to_string_lossy())
        .with_env(
            "VCAST_PYEDG_PATH",
            vectorcast_dir.join("python/vector/apps/atg_utils/run_atg.py").to_string_lossy(),
        )
        .with_log_prefix(&output_prefix);

    let outcome = runner.run(&spec).await;
    let succeeded = match outcome {
        Ok(output) => !strict_return_code || output.exit_code == 0,
        Err(e) => {
            warn!(env = %env.name, unit, routine, error = %e, "ATG invocation failed to spawn");
            false
        }
    };

    let tst_file = if succeeded && tst_file.is_file() { Some(tst_file) } else { None };
    RoutineResult { unit_source: unit_source.to_path_buf(), routine: routine.to_string(), tst_file }
}
