//! Configuration loaded from `stackflow.toml`.
//!
//! The file has four parts:
//! - `[environment]`: account, region and naming context
//! - `[orchestrator]`: state directory, concurrency, failure mode, leases
//! - `[driver]`: which driver applies stacks and how
//! - `[[stacks]]`: optional stack definitions; when absent the built-in
//!   to-do application catalog is used
//!
//! # Environment Variables
//!
//! - `STACKFLOW_CONFIG`: configuration file path (read by the binary)
//! - `STACKFLOW_STATE_DIR`: overrides `orchestrator.state_dir`
//! - `STACKFLOW_ARTIFACT`: artifact reference handed to the `service` stack
//! - `STACKFLOW_LOG_LEVEL`: log level when `RUST_LOG` is unset
//!
//! # Example
//!
//! ```no_run
//! use stackflow::config::StackflowConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = StackflowConfig::from_file("stackflow.toml")?;
//! config.apply_env_overrides();
//!
//! let waves = config.waves(Some("1.4.2"))?;
//! let orchestrator = config.build_orchestrator().await?;
//! let run = orchestrator.deploy(&waves, Some(&["service"][..])).await?;
//! # Ok(())
//! # }
//! ```

mod settings;

pub use settings::{
    DriverKind, DriverSettings, LeaseStoreKind, OrchestratorSettings, DEFAULT_STATE_DIR,
    DEFAULT_TIMEOUT_SECONDS,
};

use crate::driver::{CommandDriver, SimulatedDriver, StackDriver};
use crate::errors::{ConfigurationError, ContractErrorInfo, StackflowError};
use crate::graph::{DependencyGraph, OrderedWaves};
use crate::orchestrator::{FileLeaseStore, InMemoryLeaseStore, LeaseStore, Orchestrator, RunJournal};
use crate::registry::{FileOutputRegistry, OutputRegistry};
use crate::stacks::{todo_app_catalog, ApplicationEnvironment, StackDescriptor, ARTIFACT_PARAMETER};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "stackflow.toml";

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "STACKFLOW_STATE_DIR";

/// Environment variable carrying the artifact reference.
pub const ARTIFACT_ENV: &str = "STACKFLOW_ARTIFACT";

/// Environment variable carrying the log level.
pub const LOG_LEVEL_ENV: &str = "STACKFLOW_LOG_LEVEL";

const REGISTRY_FILE: &str = "outputs.json";
const RUNS_DIR: &str = "runs";
const LEASES_DIR: &str = "leases";
const SIMULATED_STATE_FILE: &str = "simulated-state.json";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackflowConfig {
    /// Deployment context shared by every stack.
    #[serde(default)]
    pub environment: ApplicationEnvironment,
    /// Orchestrator settings.
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    /// Driver settings.
    #[serde(default)]
    pub driver: DriverSettings,
    /// Explicit stack definitions. Empty means the built-in catalog.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stacks: Vec<StackDescriptor>,
}

impl StackflowConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the document is malformed or invalid.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigurationError> {
        let config: Self = toml::from_str(contents).map_err(|e| {
            ConfigurationError::new(format!("Failed to parse configuration: {e}")).with_error_info(
                ContractErrorInfo::new("STACK-002-CONFIG_PARSE", "Configuration file is not valid")
                    .with_fix_hint("Check the TOML syntax and the table/key names."),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the file cannot be read, parsed or
    /// validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::new(format!(
                "Failed to read configuration file {}: {e}",
                path.display()
            ))
            .with_error_info(
                ContractErrorInfo::new("STACK-002-CONFIG_READ", "Configuration file could not be read")
                    .with_context_entry("path", path.display().to_string())
                    .with_fix_hint("Pass --config or set STACKFLOW_CONFIG to an existing file."),
            )
        })?;

        info!(path = %path.display(), "Loading configuration");
        Self::from_toml_str(&contents).map_err(|e| {
            ConfigurationError {
                message: format!("{}: {}", path.display(), e.message),
                ..e
            }
        })
    }

    /// Applies `STACKFLOW_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides read through `lookup`. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(STATE_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            debug!(state_dir = %dir, "State directory overridden from environment");
            self.orchestrator.state_dir = PathBuf::from(dir);
        }
    }

    /// Replaces the state directory.
    #[must_use]
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.orchestrator.state_dir = dir.into();
        self
    }

    /// Checks cross-table invariants.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.orchestrator.max_concurrency == 0 {
            return Err(ConfigurationError::new("orchestrator.max_concurrency must be at least 1"));
        }
        if self.orchestrator.state_dir.as_os_str().is_empty() {
            return Err(ConfigurationError::new("orchestrator.state_dir must not be empty"));
        }
        self.driver.validate()?;
        for desc in &self.stacks {
            desc.validate().map_err(|e| match e {
                StackflowError::Configuration(c) => c,
                other => ConfigurationError::new(other.to_string()).with_stacks(vec![desc.name.clone()]),
            })?;
        }
        Ok(())
    }

    /// Returns true if stacks come from the built-in catalog.
    #[must_use]
    pub fn uses_builtin_catalog(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Builds the stack descriptors, handing `artifact` to stacks that take one.
    ///
    /// Explicit stacks receive the environment's base parameters when the
    /// `[environment]` table is complete; their own parameters win.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the catalog needs a context value
    /// the environment lacks.
    pub fn descriptors(&self, artifact: Option<&str>) -> Result<Vec<StackDescriptor>, ConfigurationError> {
        if self.uses_builtin_catalog() {
            return todo_app_catalog(&self.environment, artifact);
        }

        let with_environment = self.environment.validate().is_ok();
        Ok(self
            .stacks
            .iter()
            .cloned()
            .map(|mut desc| {
                if with_environment {
                    let physical = self.environment.prefix(&desc.name);
                    for (key, value) in self.environment.base_parameters(physical) {
                        desc.parameters.entry(key).or_insert(value);
                    }
                }
                if let (Some(artifact), Some(value)) = (artifact, desc.parameters.get_mut(ARTIFACT_PARAMETER)) {
                    *value = artifact.to_string();
                }
                desc
            })
            .collect())
    }

    /// Builds and orders the dependency graph.
    ///
    /// # Errors
    ///
    /// Returns a configuration or cycle error.
    pub fn waves(&self, artifact: Option<&str>) -> Result<OrderedWaves, StackflowError> {
        DependencyGraph::build(self.descriptors(artifact)?)
    }

    /// State directory.
    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.orchestrator.state_dir
    }

    /// Output registry file.
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.state_dir().join(REGISTRY_FILE)
    }

    /// Run journal directory.
    #[must_use]
    pub fn journal_dir(&self) -> PathBuf {
        self.state_dir().join(RUNS_DIR)
    }

    /// Lease file directory.
    #[must_use]
    pub fn lease_dir(&self) -> PathBuf {
        self.state_dir().join(LEASES_DIR)
    }

    /// State file of the simulated driver.
    #[must_use]
    pub fn simulated_state_path(&self) -> PathBuf {
        self.state_dir().join(SIMULATED_STATE_FILE)
    }

    /// Builds the configured driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver settings are incomplete or the simulated
    /// driver's state file cannot be loaded.
    pub async fn build_driver(&self) -> Result<Arc<dyn StackDriver>, StackflowError> {
        debug!(kind = %self.driver.kind, "Building driver");
        match self.driver.kind {
            DriverKind::Command => Ok(Arc::new(CommandDriver::new(self.driver.command_config()?))),
            DriverKind::Simulated => {
                let driver = SimulatedDriver::with_state_file(self.simulated_state_path()).await?;
                for (stack, code) in &self.driver.fail_stacks {
                    driver.fail_stack(stack, code);
                }
                Ok(Arc::new(driver))
            }
        }
    }

    /// Builds the configured lease store.
    ///
    /// # Errors
    ///
    /// Returns an error if the lease directory cannot be created.
    pub fn build_lease_store(&self) -> Result<Arc<dyn LeaseStore>, StackflowError> {
        match self.orchestrator.lease_store {
            LeaseStoreKind::File => Ok(Arc::new(FileLeaseStore::new(self.lease_dir())?)),
            LeaseStoreKind::Memory => Ok(Arc::new(InMemoryLeaseStore::new())),
        }
    }

    /// Opens the file-backed output registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry file exists but cannot be loaded.
    pub async fn open_registry(&self) -> Result<Arc<dyn OutputRegistry>, StackflowError> {
        Ok(Arc::new(FileOutputRegistry::open(self.registry_path()).await?))
    }

    /// Opens the run journal.
    #[must_use]
    pub fn journal(&self) -> RunJournal {
        RunJournal::new(self.journal_dir())
    }

    /// Wires a fully configured orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver, registry or lease store cannot be set up.
    pub async fn build_orchestrator(&self) -> Result<Orchestrator, StackflowError> {
        let driver = self.build_driver().await?;
        let registry = self.open_registry().await?;
        let leases = self.build_lease_store()?;

        Ok(Orchestrator::new(driver, registry)
            .with_lease_store(leases)
            .with_failure_mode(self.orchestrator.failure_mode)
            .with_max_concurrency(self.orchestrator.max_concurrency)
            .with_journal(self.journal()))
    }
}

#[cfg(test)]
mod config_tests;
