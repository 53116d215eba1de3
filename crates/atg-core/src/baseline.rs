//! Baseliner: per-environment fixed-point loop — rebuild,
//! import, execute, convert actuals-to-expected, re-extract, strip
//! failures — iterating until two successive scripts are byte-identical
//! or `max_iterations` is exhausted.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::adapters::tool::ToolAdapter;
use crate::error::{AtgError, Result};
use crate::tst;

const FILE_BL: &str = "bl.tst";
const FILE_ATG: &str = "atg.tst";
const FILE_MERGED: &str = "merged.tst";
const FILE_STRIPPED_UNCH: &str = "stripped_unch.tst";
const FILE_EXPECTEDS: &str = "expecteds.tst";
const FILE_INTERMEDIATE: &str = "intermediate.tst";
const FILE_FINAL: &str = "final.tst";

/// Configuration for one Baseliner run.
#[derive(Debug, Clone)]
pub struct BaselineConfig {
    /// `N >= 1`, the maximum number of strip-failures iterations.
    pub max_iterations: u32,
    /// Whether to run the tool's ATG generator during Rebuild, or take
    /// `atg_script` as a pre-supplied input (Stage C of the Project
    /// Processor disables this: the ATG script is input, not
    /// regenerated).
    pub run_atg: bool,
    /// Whether the Iterate step checks for a fixed point at all.
    pub check_fixed_point: bool,
}

impl BaselineConfig {
    pub fn new(max_iterations: u32) -> Result<Self> {
        if max_iterations < 1 {
            return Err(AtgError::configuration("baseline_iterations must be >= 1"));
        }
        Ok(Self {
            max_iterations,
            run_atg: true,
            check_fixed_point: true,
        })
    }
}

/// Drives one environment through the Rebuild → Merge → Strip-unchanged
/// → Expecteds → Iterate → Finalise state machine.
pub struct Baseliner {
    tool: ToolAdapter,
}

impl Baseliner {
    pub fn new(tool: ToolAdapter) -> Self {
        Self { tool }
    }

    /// Runs the full state machine for `env_name` inside `env_dir`
    /// (the environment's build directory's parent, where the `.env`
    /// script and the build subdirectory both live), taking
    /// `atg_script` as the input ATG script to merge against the
    /// tool-generated baseline. Returns the path to `final.tst`.
    pub async fn run(
        &self,
        workdir: &Path,
        env_name: &str,
        atg_script: &Path,
        config: &BaselineConfig,
    ) -> Result<PathBuf> {
        let env_file = format!("{env_name}.env");
        let env_subdir = workdir.join(env_name);

        // 1. Rebuild.
        self.rebuild(workdir, &env_subdir, &env_file, env_name).await?;
        self.invoke(
            "auto_baseline_test",
            self.tool.auto_baseline_test(workdir, env_name, FILE_BL).await?,
        )?;
        if config.run_atg {
            self.invoke(
                "auto_atg_test",
                self.tool.auto_atg_test(workdir, env_name, FILE_ATG).await?,
            )?;
        }

        // 2. Merge.
        let bl_path = workdir.join(FILE_BL);
        let bl_contents = read(&bl_path)?;
        let atg_contents = read(atg_script)?;
        let merged = tst::merge_attributes(&bl_contents, &atg_contents);
        let merged_path = workdir.join(FILE_MERGED);
        write(&merged_path, &merged)?;

        // 3. Strip-unchanged.
        let stripped_unch = tst::strip_unchanged(&merged);
        let stripped_unch_path = workdir.join(FILE_STRIPPED_UNCH);
        write(&stripped_unch_path, &stripped_unch)?;

        // 4. Expecteds.
        self.invoke(
            "test script run",
            self.tool.import_script(workdir, env_name, FILE_STRIPPED_UNCH).await?,
        )?;
        self.invoke("execute batch", self.tool.execute_batch(workdir, env_name).await?)?;
        self.invoke(
            "actuals_to_expected",
            self.tool.actuals_to_expected(workdir, env_name).await?,
        )?;
        self.invoke(
            "test script create",
            self.tool.extract_script(workdir, env_name, FILE_EXPECTEDS).await?,
        )?;

        // 5. Iterate.
        self.rebuild(workdir, &env_subdir, &env_file, env_name).await?;
        self.invoke(
            "test script run",
            self.tool.import_script(workdir, env_name, FILE_EXPECTEDS).await?,
        )?;
        self.invoke("execute batch", self.tool.execute_batch(workdir, env_name).await?)?;
        self.invoke(
            "test script create",
            self.tool.extract_script(workdir, env_name, FILE_INTERMEDIATE).await?,
        )?;

        let mut current = workdir.join("stripped_1.tst");
        std::fs::copy(workdir.join(FILE_INTERMEDIATE), &current).map_err(|e| AtgError::io(&current, e))?;

        for i in 1..=config.max_iterations {
            let now = workdir.join(format!("stripped_{i}.tst"));
            let next = workdir.join(format!("stripped_{}.tst", i + 1));

            let output = self.tool.strip_failures(workdir, &file_name(&now), &file_name(&next)).await?;
            self.invoke("strip_failures", output)?;

            let terminate = config.check_fixed_point && files_byte_equal(&now, &next)?;
            if terminate {
                info!(iteration = i, "baseline reached a fixed point");
            }

            self.rebuild(workdir, &env_subdir, &env_file, env_name).await?;
            self.invoke(
                "test script run",
                self.tool.import_script(workdir, env_name, &file_name(&next)).await?,
            )?;
            self.invoke("execute batch", self.tool.execute_batch(workdir, env_name).await?)?;
            self.invoke(
                "test script create",
                self.tool.extract_script(workdir, env_name, &file_name(&next)).await?,
            )?;

            current = next;
            if terminate {
                break;
            }
        }

        // 6. Finalise.
        let final_path = workdir.join(FILE_FINAL);
        std::fs::copy(&current, &final_path).map_err(|e| AtgError::io(&final_path, e))?;
        Ok(final_path)
    }

    async fn rebuild(&self, workdir: &Path, env_subdir: &Path, env_file: &str, env_name: &str) -> Result<()> {
        if env_subdir.exists() {
            std::fs::remove_dir_all(env_subdir).map_err(|e| AtgError::io(env_subdir, e))?;
        }
        debug!(env = env_name, "rebuilding environment");
        let output = self.tool.rebuild(workdir, env_file).await?;
        self.invoke("ENVironment script run", output)
    }

    fn invoke(&self, action: &str, output: crate::process::ProcessOutput) -> Result<()> {
        if !output.success() {
            return Err(self.tool.invocation_error(action, &output));
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| AtgError::io(path, e))
}

fn write(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| AtgError::io(path, e))
}

/// Fixed point: byte-level equality of two successive iteration scripts.
fn files_byte_equal(a: &Path, b: &Path) -> Result<bool> {
    let a_bytes = std::fs::read(a).map_err(|e| AtgError::io(a, e))?;
    let b_bytes = std::fs::read(b).map_err(|e| AtgError::io(b, e))?;
    Ok(a_bytes == b_bytes)
}
