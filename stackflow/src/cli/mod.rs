//! The `stackflow` command-line interface.
#![allow(missing_docs)]

pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{
    CliArgs, Commands, DeployArgs, HistoryArgs, OutputFormatArg, OutputsArgs, PlanArgs, RunsArgs, UnlockArgs,
};
pub use output::{OutputFormat, OutputFormatter, RunSummary, UnlockResult};
