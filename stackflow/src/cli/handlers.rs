//! Command handlers.
//!
//! Each `handle_*` function runs one subcommand, prints its result to stdout
//! and returns the process exit code. The `run_*` functions hold the logic
//! and are reusable without a terminal.

use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::commands::{CliArgs, DeployArgs, HistoryArgs, OutputsArgs, PlanArgs, RunsArgs, UnlockArgs};
use super::output::{OutputFormatter, RunSummary, UnlockResult};
use crate::cancellation::CancellationToken;
use crate::config::{LeaseStoreKind, StackflowConfig};
use crate::core::{OutputRecord, RunOutcome};
use crate::errors::{ConfigurationError, ContractErrorInfo, NotFoundError, StackflowError};
use crate::events::LoggingEventSink;
use crate::graph::OrderedWaves;
use crate::orchestrator::{DeploymentPlan, DeploymentRun, FailureMode};
use crate::stacks::ARTIFACT_PARAMETER;
use crate::utils::validate_stack_name;
use crate::utils::validation::ALL_STACKS;

/// The run succeeded.
pub const EXIT_SUCCESS: i32 = 0;
/// An error outside the deployment taxonomy (I/O, driver setup).
pub const EXIT_FAILURE: i32 = 1;
/// At least one stack failed.
pub const EXIT_PARTIAL_FAILURE: i32 = 2;
/// Configuration, cycle, contract or unsatisfied-dependency error.
pub const EXIT_CONFIGURATION: i32 = 3;
/// Another run holds an overlapping lease.
pub const EXIT_CONCURRENT_DEPLOYMENT: i32 = 4;
/// The run was interrupted.
pub const EXIT_CANCELLED: i32 = 130;

/// Maps a run outcome to an exit code.
pub fn exit_code_for_outcome(outcome: RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Succeeded => EXIT_SUCCESS,
        RunOutcome::PartialFailure => EXIT_PARTIAL_FAILURE,
        RunOutcome::Aborted => EXIT_CONFIGURATION,
        RunOutcome::Cancelled => EXIT_CANCELLED,
    }
}

/// Maps a library error to an exit code.
pub fn exit_code_for_error(error: &StackflowError) -> i32 {
    match error {
        StackflowError::Configuration(_)
        | StackflowError::Cycle(_)
        | StackflowError::UnsatisfiedDependency(_)
        | StackflowError::ContractViolation(_) => EXIT_CONFIGURATION,
        StackflowError::ConcurrentDeployment(_) => EXIT_CONCURRENT_DEPLOYMENT,
        _ => EXIT_FAILURE,
    }
}

/// Loads the configuration named on the command line and applies overrides.
///
/// `--state-dir` wins over `STACKFLOW_STATE_DIR`, which wins over the file.
pub fn load_config(cli: &CliArgs) -> Result<StackflowConfig> {
    let mut config = StackflowConfig::from_file(&cli.config).map_err(StackflowError::from)?;
    config.apply_env_overrides();
    if let Some(ref dir) = cli.state_dir {
        config = config.with_state_dir(dir);
    }
    Ok(config)
}

/// Runs `stackflow deploy`.
pub async fn handle_deploy(cli: &CliArgs, args: &DeployArgs) -> i32 {
    let formatter = OutputFormatter::new(cli.format.into());
    let result = match load_config(cli) {
        Ok(config) => run_deploy(config, args).await,
        Err(e) => Err(e),
    };
    finish(&formatter, result, OutputFormatter::format_run, |run| {
        exit_code_for_outcome(run.outcome)
    })
}

/// Runs `stackflow plan`.
pub fn handle_plan(cli: &CliArgs, args: &PlanArgs) -> i32 {
    let formatter = OutputFormatter::new(cli.format.into());
    let result = load_config(cli).and_then(|config| run_plan(&config, &args.stacks));
    finish(&formatter, result, OutputFormatter::format_plan, |_| EXIT_SUCCESS)
}

/// Runs `stackflow outputs`.
pub async fn handle_outputs(cli: &CliArgs, args: &OutputsArgs) -> i32 {
    let formatter = OutputFormatter::new(cli.format.into());
    let result = match load_config(cli) {
        Ok(config) => run_outputs(&config, args.stack.as_deref()).await,
        Err(e) => Err(e),
    };
    finish(&formatter, result, |f, records| f.format_records(records), |_| EXIT_SUCCESS)
}

/// Runs `stackflow history`.
pub async fn handle_history(cli: &CliArgs, args: &HistoryArgs) -> i32 {
    let formatter = OutputFormatter::new(cli.format.into());
    let result = match load_config(cli) {
        Ok(config) => run_history(&config, &args.stack, &args.key).await,
        Err(e) => Err(e),
    };
    finish(&formatter, result, |f, records| f.format_records(records), |_| EXIT_SUCCESS)
}

/// Runs `stackflow unlock`.
pub fn handle_unlock(cli: &CliArgs, args: &UnlockArgs) -> i32 {
    let formatter = OutputFormatter::new(cli.format.into());
    let result = load_config(cli).and_then(|config| run_unlock(&config, &args.stacks));
    finish(&formatter, result, |f, results| f.format_unlock(results), |_| EXIT_SUCCESS)
}

/// Runs `stackflow runs`.
pub async fn handle_runs(cli: &CliArgs, args: &RunsArgs) -> i32 {
    let formatter = OutputFormatter::new(cli.format.into());
    let config = match load_config(cli) {
        Ok(config) => config,
        Err(e) => return report(&formatter, &e),
    };

    if args.latest || args.run_id.is_some() {
        let result = run_show_run(&config, args.run_id.as_deref()).await;
        finish(&formatter, result, OutputFormatter::format_run, |_| EXIT_SUCCESS)
    } else {
        let result = run_list_runs(&config).await;
        finish(&formatter, result, |f, runs| f.format_runs(runs), |_| EXIT_SUCCESS)
    }
}

fn finish<T>(
    formatter: &OutputFormatter,
    result: Result<T>,
    render: impl Fn(&OutputFormatter, &T) -> Result<String>,
    exit_code: impl Fn(&T) -> i32,
) -> i32 {
    match result.and_then(|value| render(formatter, &value).map(|text| (text, exit_code(&value)))) {
        Ok((text, code)) => {
            println!("{text}");
            code
        }
        Err(e) => report(formatter, &e),
    }
}

fn report(formatter: &OutputFormatter, error: &anyhow::Error) -> i32 {
    if let Some(e) = error.downcast_ref::<StackflowError>() {
        eprintln!("{}", formatter.format_error(e));
        exit_code_for_error(e)
    } else {
        eprintln!("Error: {error:#}");
        EXIT_FAILURE
    }
}

/// Deploys `args.stacks` with the configured orchestrator.
///
/// Ctrl-C cancels the run: in-flight stacks finish, the rest are skipped.
pub async fn run_deploy(mut config: StackflowConfig, args: &DeployArgs) -> Result<DeploymentRun> {
    if args.continue_independent {
        config.orchestrator.failure_mode = FailureMode::ContinueIndependent;
    }
    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 {
            return Err(StackflowError::from(ConfigurationError::new("--concurrency must be at least 1")).into());
        }
        config.orchestrator.max_concurrency = concurrency;
    }

    let artifact = args.artifact.as_deref().map(str::trim).filter(|a| !a.is_empty());
    let waves = config.waves(artifact)?;
    let plan = DeploymentPlan::new(&waves, Some(args.stacks.as_slice())).map_err(StackflowError::from)?;
    require_artifact(&waves, &plan)?;

    let orchestrator = config
        .build_orchestrator()
        .await?
        .with_event_sink(Arc::new(LoggingEventSink::default()));

    let cancellation = Arc::new(CancellationToken::new());
    let interrupt = watch_interrupt(Arc::clone(&cancellation));
    let result = orchestrator
        .deploy_with_cancellation(&waves, Some(args.stacks.as_slice()), &cancellation)
        .await;
    interrupt.abort();

    Ok(result?)
}

fn require_artifact(waves: &OrderedWaves, plan: &DeploymentPlan) -> Result<(), StackflowError> {
    let missing: Vec<String> = plan
        .selected()
        .into_iter()
        .filter(|name| {
            waves
                .descriptor(name)
                .and_then(|d| d.parameters.get(ARTIFACT_PARAMETER))
                .is_some_and(|value| value.trim().is_empty())
        })
        .collect();

    if missing.is_empty() {
        return Ok(());
    }
    Err(ConfigurationError::new(format!(
        "Stack(s) {} need an artifact reference",
        missing.join(", ")
    ))
    .with_stacks(missing)
    .with_error_info(
        ContractErrorInfo::new("STACK-002-MISSING_ARTIFACT", "No artifact to deploy")
            .with_fix_hint("Pass --artifact <tag> or set STACKFLOW_ARTIFACT."),
    )
    .into())
}

fn watch_interrupt(token: Arc<CancellationToken>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, skipping stacks that have not started");
            token.cancel("interrupted");
        }
    })
}

/// Plans a deployment of `stacks` without calling the driver.
pub fn run_plan(config: &StackflowConfig, stacks: &[String]) -> Result<DeploymentPlan> {
    let waves = config.waves(None)?;
    Ok(DeploymentPlan::new(&waves, Some(stacks)).map_err(StackflowError::from)?)
}

/// Returns the latest records of one stack, or of every stack.
pub async fn run_outputs(config: &StackflowConfig, stack: Option<&str>) -> Result<Vec<OutputRecord>> {
    let registry = config.open_registry().await?;
    match stack {
        Some(stack) => Ok(registry.outputs_of(stack).await),
        None => {
            let snapshot = registry.snapshot().await;
            let mut records = Vec::with_capacity(snapshot.len());
            for stack in snapshot.stacks() {
                records.extend(registry.outputs_of(stack).await);
            }
            Ok(records)
        }
    }
}

/// Returns every version of one output, oldest first.
pub async fn run_history(config: &StackflowConfig, stack: &str, key: &str) -> Result<Vec<OutputRecord>> {
    let registry = config.open_registry().await?;
    let history = registry.history(stack, key).await;
    if history.is_empty() {
        return Err(StackflowError::from(NotFoundError::new(stack, key)).into());
    }
    Ok(history)
}

/// Summarizes every archived run, oldest first.
pub async fn run_list_runs(config: &StackflowConfig) -> Result<Vec<RunSummary>> {
    let journal = config.journal();
    let mut summaries = Vec::new();
    for run_id in journal.list().await? {
        match journal.load(run_id).await {
            Ok(run) => summaries.push(RunSummary::from(&run)),
            Err(e) => warn!(run_id = %run_id, error = %e, "Skipping unreadable run archive"),
        }
    }
    Ok(summaries)
}

/// Loads one archived run, or the most recent one when `run_id` is `None`.
pub async fn run_show_run(config: &StackflowConfig, run_id: Option<&str>) -> Result<DeploymentRun> {
    let journal = config.journal();
    match run_id {
        Some(raw) => {
            let id = Uuid::parse_str(raw).map_err(|e| {
                StackflowError::from(ConfigurationError::new(format!("Invalid run id '{raw}': {e}")))
            })?;
            Ok(journal.load(id).await?)
        }
        None => journal
            .latest()
            .await?
            .ok_or_else(|| anyhow::anyhow!("No runs archived in {}", journal.dir().display())),
    }
}

/// Force-releases the leases of `stacks` (or every configured stack).
pub fn run_unlock(config: &StackflowConfig, stacks: &[String]) -> Result<Vec<UnlockResult>> {
    if config.orchestrator.lease_store == LeaseStoreKind::Memory {
        warn!("In-memory leases do not outlive a process, nothing to unlock");
    }

    let names: Vec<String> = if stacks.iter().any(|s| s == ALL_STACKS) {
        config.descriptors(None).map_err(StackflowError::from)?.into_iter().map(|d| d.name).collect()
    } else {
        for stack in stacks {
            validate_stack_name(stack).map_err(StackflowError::from)?;
        }
        stacks.to_vec()
    };

    let leases = config.build_lease_store()?;
    let mut results = Vec::with_capacity(names.len());
    for stack in names {
        let holder = leases.holder(&stack).map(|h| h.run_id.to_string());
        let released = leases.force_release(&stack)?;
        if released {
            info!(stack = %stack, holder = ?holder, "Lease removed");
        }
        results.push(UnlockResult {
            stack,
            released,
            holder,
        });
    }
    Ok(results)
}
