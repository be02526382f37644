use stackflow::cli::commands::{CliArgs, Commands, OutputFormatArg};
use stackflow::cli::handlers::{
    handle_deploy, handle_history, handle_outputs, handle_plan, handle_runs, handle_unlock,
};
use stackflow::config::LOG_LEVEL_ENV;
use stackflow::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("stackflow v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Deploy(deploy_args) => handle_deploy(&args, deploy_args).await,
        Commands::Plan(plan_args) => handle_plan(&args, plan_args),
        Commands::Outputs(outputs_args) => handle_outputs(&args, outputs_args).await,
        Commands::History(history_args) => handle_history(&args, history_args).await,
        Commands::Unlock(unlock_args) => handle_unlock(&args, unlock_args),
        Commands::Runs(runs_args) => handle_runs(&args, runs_args).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let level = if let Some(level_str) = &args.log_level {
            parse_level(level_str)
        } else if args.verbose {
            Level::DEBUG
        } else if args.quiet {
            Level::ERROR
        } else {
            let level_str = env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());
            parse_level(&level_str)
        };

        let mut filter = EnvFilter::from_default_env();

        if env::var("RUST_LOG").is_err() {
            if let Ok(directive) = format!("stackflow={level}").parse() {
                filter = filter.add_directive(directive);
            }
        }

        let layer = match args.format {
            OutputFormatArg::Json => fmt::layer().json().with_target(true).with_writer(std::io::stderr).boxed(),
            OutputFormatArg::Human => fmt::layer().with_target(true).with_writer(std::io::stderr).boxed(),
        };

        tracing_subscriber::registry().with(filter).with(layer).init();
    });
}

fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}
