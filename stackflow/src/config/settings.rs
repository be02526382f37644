//! Table-level settings of `stackflow.toml`.

use crate::driver::CommandDriverConfig;
use crate::errors::ConfigurationError;
use crate::orchestrator::{FailureMode, DEFAULT_MAX_CONCURRENCY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default state directory, relative to the working directory.
pub const DEFAULT_STATE_DIR: &str = ".stackflow";

/// Default provider command timeout.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30 * 60;

/// Where stack leases are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaseStoreKind {
    /// One lease file per stack under `<state_dir>/leases`.
    #[default]
    File,
    /// Process memory only. Does not protect against other processes.
    Memory,
}

/// Which driver applies stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// An external provider program.
    #[default]
    Command,
    /// The local rehearsal driver.
    Simulated,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => write!(f, "command"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}

/// The `[orchestrator]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorSettings {
    /// Directory holding the registry, leases and run journal.
    pub state_dir: PathBuf,
    /// Stacks applied at once within a wave, for parallel-safe drivers.
    pub max_concurrency: usize,
    /// What happens to the rest of the run after a stack fails.
    pub failure_mode: FailureMode,
    /// Lease backend.
    pub lease_store: LeaseStoreKind,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            failure_mode: FailureMode::default(),
            lease_store: LeaseStoreKind::default(),
        }
    }
}

/// The `[driver]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverSettings {
    /// Driver kind.
    pub kind: DriverKind,
    /// Provider program, required for the command driver.
    pub program: Option<PathBuf>,
    /// Program arguments; `{stack}` is replaced by the stack name.
    pub args: Vec<String>,
    /// Extra environment for the program.
    pub env: BTreeMap<String, String>,
    /// Working directory for the program.
    pub working_dir: Option<PathBuf>,
    /// Per-stack timeout.
    pub timeout_seconds: u64,
    /// Whether stacks of one wave may apply concurrently.
    pub parallel_safe: bool,
    /// Stacks the simulated driver fails, with the failure code.
    pub fail_stacks: BTreeMap<String, String>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            kind: DriverKind::default(),
            program: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            parallel_safe: false,
            fail_stacks: BTreeMap::new(),
        }
    }
}

impl DriverSettings {
    /// Checks the settings make sense for the selected kind.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.timeout_seconds == 0 {
            return Err(ConfigurationError::new("driver.timeout_seconds must be positive"));
        }
        match self.kind {
            DriverKind::Command if self.program.is_none() => Err(ConfigurationError::new(
                "driver.program is required when driver.kind = \"command\"",
            )),
            DriverKind::Command if !self.fail_stacks.is_empty() => Err(ConfigurationError::new(
                "driver.fail_stacks only applies to driver.kind = \"simulated\"",
            )),
            _ => Ok(()),
        }
    }

    /// Builds the command driver configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if no program is configured.
    pub fn command_config(&self) -> Result<CommandDriverConfig, ConfigurationError> {
        let program = self
            .program
            .clone()
            .ok_or_else(|| ConfigurationError::new("driver.program is required when driver.kind = \"command\""))?;

        let mut config = CommandDriverConfig::new(program)
            .with_args(self.args.iter().cloned())
            .with_timeout(Duration::from_secs(self.timeout_seconds))
            .with_parallel_safe(self.parallel_safe);
        for (key, value) in &self.env {
            config = config.with_env(key, value);
        }
        config.working_dir.clone_from(&self.working_dir);
        Ok(config)
    }
}
