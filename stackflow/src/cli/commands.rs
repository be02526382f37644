use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;

/// Dependency-ordered deployment of interdependent infrastructure stacks
#[derive(Parser, Debug)]
#[command(
    name = "stackflow",
    about = "Dependency-ordered deployment of interdependent infrastructure stacks",
    version,
    long_about = "stackflow derives a dependency graph from the outputs each stack consumes, \
                  applies stacks wave by wave through a provider driver, and records their \
                  outputs in a versioned registry for downstream stacks."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'c',
        long,
        global = true,
        env = "STACKFLOW_CONFIG",
        value_name = "FILE",
        default_value = DEFAULT_CONFIG_FILE,
        help = "Configuration file"
    )]
    pub config: PathBuf,

    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "State directory (overrides orchestrator.state_dir and STACKFLOW_STATE_DIR)"
    )]
    pub state_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - only log errors"
    )]
    pub quiet: bool,

    #[arg(
        short = 'f',
        long,
        global = true,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Deploy stacks and everything they depend on",
        long_about = "Applies the named stacks, plus their upstream stacks, wave by wave. \
                      Stacks in the same wave run concurrently when the driver allows it.\n\n\
                      Examples:\n  \
                      stackflow deploy all\n  \
                      stackflow deploy service --artifact 1.4.2\n  \
                      stackflow deploy network certificate --continue-independent"
    )]
    Deploy(DeployArgs),

    #[command(
        about = "Show the deployment waves without applying anything",
        long_about = "Builds and validates the dependency graph and prints the waves a deploy \
                      of the given stacks would run. No driver is called.\n\n\
                      Examples:\n  \
                      stackflow plan\n  \
                      stackflow plan service --format json"
    )]
    Plan(PlanArgs),

    #[command(
        about = "Show the latest recorded outputs",
        long_about = "Prints the latest version of every output in the registry, or of one stack.\n\n\
                      Examples:\n  \
                      stackflow outputs\n  \
                      stackflow outputs network"
    )]
    Outputs(OutputsArgs),

    #[command(
        about = "Show every recorded version of one output",
        long_about = "Prints all versions of a single output, oldest first.\n\n\
                      Examples:\n  \
                      stackflow history network vpcId"
    )]
    History(HistoryArgs),

    #[command(
        about = "Remove stale stack leases",
        long_about = "Deletes lease files left behind by a run that did not exit cleanly. \
                      Only use this when no other deployment is running.\n\n\
                      Examples:\n  \
                      stackflow unlock service\n  \
                      stackflow unlock all"
    )]
    Unlock(UnlockArgs),

    #[command(
        about = "List archived deployment runs",
        long_about = "Lists every archived run, oldest first, or prints one run in full.\n\n\
                      Examples:\n  \
                      stackflow runs\n  \
                      stackflow runs --latest\n  \
                      stackflow runs 01920a4e-7c1b-7a8e-9f3d-2b6c5d4e3f21 --format json"
    )]
    Runs(RunsArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct DeployArgs {
    #[arg(
        value_name = "STACK",
        required = true,
        help = "Stacks to deploy, or 'all'"
    )]
    pub stacks: Vec<String>,

    #[arg(
        short = 'a',
        long,
        env = "STACKFLOW_ARTIFACT",
        value_name = "TAG",
        help = "Artifact reference handed to the service stack"
    )]
    pub artifact: Option<String>,

    #[arg(
        long,
        value_name = "N",
        help = "Maximum stacks applied at once (overrides orchestrator.max_concurrency)"
    )]
    pub concurrency: Option<usize>,

    #[arg(
        long,
        help = "Keep deploying stacks that do not depend on a failed stack"
    )]
    pub continue_independent: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    #[arg(value_name = "STACK", help = "Stacks to plan, or 'all' (default)")]
    pub stacks: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct OutputsArgs {
    #[arg(value_name = "STACK", help = "Only show this stack")]
    pub stack: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct HistoryArgs {
    #[arg(value_name = "STACK")]
    pub stack: String,

    #[arg(value_name = "KEY")]
    pub key: String,
}

#[derive(Parser, Debug, Clone)]
pub struct UnlockArgs {
    #[arg(
        value_name = "STACK",
        required = true,
        help = "Stacks to unlock, or 'all'"
    )]
    pub stacks: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct RunsArgs {
    #[arg(value_name = "RUN_ID", help = "Print this run in full")]
    pub run_id: Option<String>,

    #[arg(long, conflicts_with = "run_id", help = "Print the most recent run in full")]
    pub latest: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_deploy_args() {
        let args = CliArgs::parse_from([
            "stackflow",
            "deploy",
            "service",
            "--artifact",
            "1.4.2",
            "--concurrency",
            "2",
            "--continue-independent",
        ]);
        match args.command {
            Commands::Deploy(deploy) => {
                assert_eq!(deploy.stacks, vec!["service"]);
                assert_eq!(deploy.artifact.as_deref(), Some("1.4.2"));
                assert_eq!(deploy.concurrency, Some(2));
                assert!(deploy.continue_independent);
            }
            _ => panic!("Expected Deploy command"),
        }
    }

    #[test]
    fn test_deploy_requires_a_stack() {
        assert!(CliArgs::try_parse_from(["stackflow", "deploy"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::parse_from([
            "stackflow",
            "plan",
            "--format",
            "json",
            "--state-dir",
            "/tmp/state",
            "-v",
        ]);

        assert_eq!(args.format, OutputFormatArg::Json);
        assert_eq!(args.state_dir, Some(PathBuf::from("/tmp/state")));
        assert!(args.verbose);
        match args.command {
            Commands::Plan(plan) => assert!(plan.stacks.is_empty()),
            _ => panic!("Expected Plan command"),
        }
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(CliArgs::try_parse_from(["stackflow", "outputs", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_history_args() {
        let args = CliArgs::parse_from(["stackflow", "history", "network", "vpcId"]);
        match args.command {
            Commands::History(history) => {
                assert_eq!(history.stack, "network");
                assert_eq!(history.key, "vpcId");
            }
            _ => panic!("Expected History command"),
        }
    }

    #[test]
    fn test_runs_args() {
        let args = CliArgs::parse_from(["stackflow", "runs", "--latest"]);
        match args.command {
            Commands::Runs(runs) => {
                assert!(runs.latest);
                assert!(runs.run_id.is_none());
            }
            _ => panic!("Expected Runs command"),
        }

        assert!(CliArgs::try_parse_from(["stackflow", "runs", "some-id", "--latest"]).is_err());
    }
}
