//! Driver that shells out to a provider command per stack.

use super::{ApplyOutcome, DriverError, ResolvedInputs, StackDriver};
use crate::stacks::{ResourceSpec, StackDescriptor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Placeholder replaced by the stack name in command arguments.
pub const STACK_PLACEHOLDER: &str = "{stack}";

/// Environment variable carrying the stack name.
pub const STACK_ENV_VAR: &str = "STACKFLOW_STACK";

/// Default time allowed for one apply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How to invoke the provider command.
#[derive(Debug, Clone)]
pub struct CommandDriverConfig {
    /// Program to run.
    pub program: PathBuf,
    /// Arguments; `{stack}` is replaced by the stack name.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
    /// Working directory, if not the current one.
    pub working_dir: Option<PathBuf>,
    /// Time allowed for one apply.
    pub timeout: Duration,
    /// Whether the provider tolerates concurrent applies.
    pub parallel_safe: bool,
}

impl CommandDriverConfig {
    /// Creates a config for `program` with default settings.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![STACK_PLACEHOLDER.to_string()],
            env: BTreeMap::new(),
            working_dir: None,
            timeout: DEFAULT_TIMEOUT,
            parallel_safe: false,
        }
    }

    /// Replaces the argument list.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the per-apply timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Marks the provider as safe for concurrent applies.
    #[must_use]
    pub fn with_parallel_safe(mut self, parallel_safe: bool) -> Self {
        self.parallel_safe = parallel_safe;
        self
    }
}

#[derive(Debug, Serialize)]
struct ApplyRequest<'a> {
    stack: &'a str,
    resources: &'a [ResourceSpec],
    inputs: &'a BTreeMap<String, String>,
    parameters: &'a BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ResponseStatus {
    Changed,
    Noop,
}

#[derive(Debug, Deserialize)]
struct ApplyResponse {
    status: ResponseStatus,
    #[serde(default)]
    outputs: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    code: String,
    #[serde(default)]
    message: String,
}

/// Runs a configured program once per stack.
///
/// The program receives a JSON request on stdin and must print
/// `{"status": "changed"|"noop", "outputs": {...}}` on stdout. A non-zero
/// exit is a failure; a `{"code", "message"}` body on stdout names it.
#[derive(Debug, Clone)]
pub struct CommandDriver {
    config: CommandDriverConfig,
}

impl CommandDriver {
    /// Creates a command driver.
    #[must_use]
    pub fn new(config: CommandDriverConfig) -> Self {
        Self { config }
    }

    /// Returns the driver configuration.
    #[must_use]
    pub fn config(&self) -> &CommandDriverConfig {
        &self.config
    }

    fn command_for(&self, stack: &str) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.config.args.iter().map(|a| a.replace(STACK_PLACEHOLDER, stack)));
        cmd.envs(&self.config.env);
        cmd.env(STACK_ENV_VAR, stack);
        if let Some(ref dir) = self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, stack: &str, payload: Vec<u8>) -> Result<std::process::Output, DriverError> {
        let mut child = self.command_for(stack).spawn().map_err(|e| {
            DriverError::new(
                "SpawnFailed",
                format!("Failed to start {}: {e}", self.config.program.display()),
            )
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    debug!(error = %e, "Provider command closed stdin early");
                }
            });
        }

        match timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(DriverError::new(
                "WaitFailed",
                format!("Failed to wait for provider command: {e}"),
            )),
            Err(_) => Err(DriverError::new(
                "Timeout",
                format!("Provider command exceeded {}s", self.config.timeout.as_secs_f64()),
            )),
        }
    }
}

#[async_trait]
impl StackDriver for CommandDriver {
    fn name(&self) -> &str {
        "command"
    }

    fn parallel_safe(&self) -> bool {
        self.config.parallel_safe
    }

    async fn apply(
        &self,
        descriptor: &StackDescriptor,
        inputs: &ResolvedInputs,
    ) -> Result<ApplyOutcome, DriverError> {
        let request = ApplyRequest {
            stack: &descriptor.name,
            resources: &descriptor.resources,
            inputs: &inputs.inputs,
            parameters: &inputs.parameters,
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|e| DriverError::new("InvalidRequest", e.to_string()))?;

        debug!(stack = %descriptor.name, program = %self.config.program.display(), "Running provider command");
        let output = self.run(&descriptor.name, payload).await?;

        if !output.status.success() {
            return Err(failure_from(&output));
        }

        let response: ApplyResponse = serde_json::from_slice(&output.stdout).map_err(|e| {
            DriverError::new("InvalidResponse", format!("Provider response is not valid JSON: {e}"))
        })?;
        let outputs = response
            .outputs
            .into_iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => (key, s),
                other => (key, other.to_string()),
            })
            .collect();

        Ok(match response.status {
            ResponseStatus::Changed => ApplyOutcome::Changed { outputs },
            ResponseStatus::Noop => ApplyOutcome::NoOp { outputs },
        })
    }
}

fn failure_from(output: &std::process::Output) -> DriverError {
    if let Ok(body) = serde_json::from_slice::<ErrorResponse>(&output.stdout) {
        return DriverError::new(body.code, body.message);
    }

    let code = output
        .status
        .code()
        .map_or_else(|| "ExitStatusSignal".to_string(), |c| format!("ExitStatus{c}"));
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        warn!(code = %code, "Provider command failed without diagnostics");
    }
    DriverError::new(code, stderr)
}
