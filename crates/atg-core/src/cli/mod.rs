//! CLI entry point, grounded on `clnrm-core/src/cli/mod.rs`'s
//! `run_cli` shape: parse, validate, set up logging, dispatch.

pub mod types;
pub mod utils;

use std::collections::HashSet;

use clap::Parser;
use tracing::info;

use crate::adapters::{GitScmAdapter, ScmAdapter, ToolAdapter};
use crate::baseline::Baseliner;
use crate::config::{loader, ConfigProvider, NullConfigProvider, RunConfig};
use crate::discover::Discoverer;
use crate::error::Result;
use crate::exec::Executor;
use crate::impact::select_impacted;
use crate::model::Environment;
use crate::project::{Builder, BuilderOptions, Processor, ProcessorConfig};
use crate::report::{self, DryRunReport, EnvironmentOutcome};
use types::{Cli, Commands, RunArgs};
use utils::setup_logging;

/// Parses argv, validates flags, wires up every component, and runs the
/// whole pipeline once. Returns `Ok(())` for a clean run (including
/// dry-run and report-only), `Err` for anything deemed fatal.
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let Commands::Run(mut args) = cli.command;
    args.validate()?;

    setup_logging(args.verbose, args.quiet, args.log_file.as_deref())?;

    if let Some(config_path) = &args.config_file {
        let defaults = loader::load_from_path(config_path)?;
        if args.workers.is_none() {
            args.workers = defaults.workers;
        }
        if args.final_tst_path.is_none() {
            args.final_tst_path = defaults.final_tst_path;
        }
    }

    run_with_args(args).await
}

async fn run_with_args(args: RunArgs) -> Result<()> {
    let final_tst_path = args
        .final_tst_path
        .clone()
        .unwrap_or_else(|| RunConfig::default_final_tst_path(&args.project_path));

    let run_config = RunConfig {
        repository_path: args.repository_path.clone(),
        project_path: args.project_path.clone(),
        final_tst_path: final_tst_path.clone(),
        vectorcast_dir: args.vectorcast_dir.clone(),
        scm_range: args.scm_range.as_ref().map(|r| (r[0].clone(), r[1].clone())),
        env_vars: Default::default(),
    };
    run_config.validate()?;

    let executor = Executor::new(args.workers);

    info!(project = %args.project_path.display(), "building Manage project");
    let builder_options = BuilderOptions {
        skip_build: args.skip_build,
        clean_up: args.clean_up,
        allow_broken_environments: args.allow_broken_environments,
        compiler_node: args.compiler_node.clone(),
    };
    let builder = Builder::new(
        &args.project_path,
        &args.vectorcast_dir,
        builder_options,
        executor.clone(),
    )?;
    let environments = builder.process().await?;

    info!(count = environments.len(), "discovering dependencies and routines");
    let discoverer = Discoverer::new(executor.clone(), &args.repository_path);
    let discovery = discoverer.discover(environments.clone()).await;

    let unchanged_files = match &run_config.scm_range {
        Some((before, after)) => {
            let adapter = GitScmAdapter::new(&args.repository_path, args.allow_moves);
            Some(adapter.unchanged_files(before, after).await?)
        }
        None => None,
    };

    let impacted: Vec<Environment> = select_impacted(&discovery.graph, unchanged_files.as_ref())
        .into_iter()
        .collect();

    if args.dry_run {
        print_dry_run_report(&args, &environments, &discovery.graph, &discovery.routines, &impacted, unchanged_files.as_ref());
        return Ok(());
    }

    let provider: Box<dyn ConfigProvider> = Box::new(NullConfigProvider);

    let tool_adapter = ToolAdapter::new(
        args.vectorcast_dir.join("clicast"),
        "python3",
        args.vectorcast_dir.join("python/vector/apps/atg_utils/strip_failures.py"),
    );
    let baseliner = Baseliner::new(tool_adapter);
    let processor_config = ProcessorConfig {
        vectorcast_dir: args.vectorcast_dir.clone(),
        atg_timeout: std::time::Duration::from_secs(args.timeout),
        strict_return_code: args.strict_rc,
        baseline_iterations: args.baseline_iterations,
        final_tst_path: final_tst_path.clone(),
    };
    let processor = Processor::new(processor_config, executor.clone(), baseliner);

    info!(count = impacted.len(), "processing impacted environments");
    let final_paths = processor.process(impacted.clone(), &discovery.routines).await?;
    provider.store_updated_tests(&final_paths);

    if args.report {
        let outcomes: Vec<EnvironmentOutcome> = impacted
            .iter()
            .map(|env| EnvironmentOutcome {
                name: env.name.clone(),
                duration: std::time::Duration::default(),
                error: if final_paths.iter().any(|p| p.starts_with(final_tst_path.join(&env.name))) {
                    None
                } else {
                    Some("no final test script was produced".to_string())
                },
            })
            .collect();
        let xml = report::generate_junit_xml(&outcomes)?;
        println!("{xml}");
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn print_dry_run_report(
    args: &RunArgs,
    environments: &[Environment],
    graph: &crate::model::DependencyGraph,
    routines: &crate::model::RoutineInventory,
    impacted: &[Environment],
    unchanged_files: Option<&HashSet<String>>,
) {
    let unchanged = unchanged_files.cloned().unwrap_or_default();
    let mut total_files: Vec<String> = environments.iter().flat_map(|e| graph.files_of(e)).collect();
    total_files.sort();
    total_files.dedup();
    let changed_files = total_files.len().saturating_sub(unchanged.len());

    let scm_range = args.scm_range.as_ref().map(|r| (r[0].as_str(), r[1].as_str()));
    let report = DryRunReport {
        repository_path: &args.repository_path,
        scm_range,
        total_files: total_files.len(),
        changed_files,
        unchanged_files: &unchanged,
        limit_unchanged: args.limit_unchanged,
        manage_vcm_path: &args.project_path,
        environments,
        dependencies: graph,
        routines,
        impacted,
    };
    println!("{}", report::debug_report(&report));
}
