//! Error types for the stackflow orchestrator.
//!
//! Configuration-time errors ([`CycleError`], [`ConfigurationError`]) abort an
//! invocation before any stack is applied. Apply-time errors are recorded on
//! the failing stack of a deployment run and contained to its dependents.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for stackflow operations.
#[derive(Debug, Error)]
pub enum StackflowError {
    /// Stack definitions or configuration are malformed.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// The dependency graph contains a cycle.
    #[error("{0}")]
    Cycle(#[from] CycleError),

    /// A required input was missing at apply time.
    #[error("{0}")]
    UnsatisfiedDependency(#[from] UnsatisfiedDependencyError),

    /// A driver reported success without a declared output.
    #[error("{0}")]
    ContractViolation(#[from] ContractViolationError),

    /// A provider-level failure while applying a stack.
    #[error("{0}")]
    StackApply(#[from] StackApplyError),

    /// Another run holds a lease on an overlapping stack set.
    #[error("{0}")]
    ConcurrentDeployment(#[from] ConcurrentDeploymentError),

    /// An output was not found in the registry.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StackflowError {
    /// Returns true for errors that are detected before any stack is applied.
    #[must_use]
    pub fn is_configuration_time(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Cycle(_))
    }

    /// Returns the diagnostic info attached to the error, if any.
    #[must_use]
    pub fn error_info(&self) -> Option<&ContractErrorInfo> {
        match self {
            Self::Configuration(e) => e.error_info.as_ref(),
            Self::Cycle(e) => Some(&e.error_info),
            Self::UnsatisfiedDependency(e) => Some(&e.error_info),
            Self::ContractViolation(e) => Some(&e.error_info),
            Self::ConcurrentDeployment(e) => Some(&e.error_info),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StackflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Metadata about an error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "STACK-001-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("summary".to_string(), serde_json::json!(self.summary));
        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        if !self.context.is_empty() {
            map.insert("context".to_string(), serde_json::json!(self.context));
        }
        serde_json::Value::Object(map)
    }
}

/// Error raised when stack definitions or configuration are malformed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The stacks involved in the error.
    pub stacks: Vec<String>,
    /// Optional diagnostic info.
    pub error_info: Option<ContractErrorInfo>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stacks: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stacks involved.
    #[must_use]
    pub fn with_stacks(mut self, stacks: Vec<String>) -> Self {
        self.stacks = stacks;
        self
    }

    /// Sets the diagnostic info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }
}

/// Error raised when the dependency graph contains a cycle.
#[derive(Debug, Clone, Error)]
#[error("Dependency cycle detected: {}", cycle_path.join(" -> "))]
pub struct CycleError {
    /// Every stack that could not be placed in a wave.
    pub stacks: Vec<String>,
    /// One concrete cycle among them, first stack repeated at the end.
    pub cycle_path: Vec<String>,
    /// Diagnostic info.
    pub error_info: ContractErrorInfo,
}

impl CycleError {
    /// Creates a new cycle error.
    #[must_use]
    pub fn new(stacks: Vec<String>, cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "STACK-001-CYCLE",
            format!("Stacks {} form a dependency cycle", stacks.join(", ")),
        )
        .with_fix_hint("Remove one of the required inputs in the cycle to break it.");

        Self {
            stacks,
            cycle_path,
            error_info: info,
        }
    }
}

/// Error raised when a required input is missing from the registry at apply time.
#[derive(Debug, Clone, Error)]
#[error("Stack '{stack}' requires output '{upstream}.{key}' which is not in the output registry")]
pub struct UnsatisfiedDependencyError {
    /// The stack being applied.
    pub stack: String,
    /// The upstream stack that should have published the output.
    pub upstream: String,
    /// The missing output key.
    pub key: String,
    /// Diagnostic info.
    pub error_info: ContractErrorInfo,
}

impl UnsatisfiedDependencyError {
    /// Creates a new unsatisfied dependency error.
    #[must_use]
    pub fn new(stack: impl Into<String>, upstream: impl Into<String>, key: impl Into<String>) -> Self {
        let stack = stack.into();
        let upstream = upstream.into();
        let key = key.into();
        let info = ContractErrorInfo::new(
            "STACK-003-UNSATISFIED",
            "Required input missing although its stack is in an earlier wave",
        )
        .with_fix_hint("Inspect the output registry; the upstream stack may need to be re-applied.")
        .with_context_entry("stack", stack.clone())
        .with_context_entry("upstream", upstream.clone())
        .with_context_entry("key", key.clone());

        Self {
            stack,
            upstream,
            key,
            error_info: info,
        }
    }
}

/// Error raised when a driver succeeds but omits declared outputs.
#[derive(Debug, Clone, Error)]
#[error("Stack '{stack}' did not publish declared outputs: {}", missing_keys.join(", "))]
pub struct ContractViolationError {
    /// The stack that violated its contract.
    pub stack: String,
    /// Declared keys absent from the driver result.
    pub missing_keys: Vec<String>,
    /// Diagnostic info.
    pub error_info: ContractErrorInfo,
}

impl ContractViolationError {
    /// Creates a new contract violation error.
    #[must_use]
    pub fn new(stack: impl Into<String>, missing_keys: Vec<String>) -> Self {
        let stack = stack.into();
        let info = ContractErrorInfo::new(
            "STACK-004-CONTRACT",
            format!("Stack '{stack}' published an incomplete output set"),
        )
        .with_fix_hint("Declared outputs must be stable across applies; fix the driver or the descriptor.")
        .with_context_entry("stack", stack.clone());

        Self {
            stack,
            missing_keys,
            error_info: info,
        }
    }
}

/// Provider-level failure while applying a stack.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("Stack '{stack}' failed to apply [{code}]: {message}")]
pub struct StackApplyError {
    /// The stack that failed.
    pub stack: String,
    /// Provider error code (e.g. "LimitExceeded").
    pub code: String,
    /// Provider error message.
    pub message: String,
}

impl StackApplyError {
    /// Creates a new stack apply error.
    #[must_use]
    pub fn new(stack: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Error raised when another run holds a lease on an overlapping stack set.
#[derive(Debug, Clone, Error)]
#[error("Stacks already being deployed by another run: {}", conflicting.join(", "))]
pub struct ConcurrentDeploymentError {
    /// Stacks whose leases could not be acquired.
    pub conflicting: Vec<String>,
    /// The run currently holding the first conflicting lease, if known.
    pub holder: Option<String>,
    /// Diagnostic info.
    pub error_info: ContractErrorInfo,
}

impl ConcurrentDeploymentError {
    /// Creates a new concurrent deployment error.
    #[must_use]
    pub fn new(conflicting: Vec<String>, holder: Option<String>) -> Self {
        let mut info = ContractErrorInfo::new(
            "STACK-006-LEASE",
            "An overlapping deployment is already in progress",
        )
        .with_fix_hint("Wait for the other run to finish, or remove stale leases with `stackflow unlock`.");
        if let Some(ref holder) = holder {
            info = info.with_context_entry("holder", holder.clone());
        }

        Self {
            conflicting,
            holder,
            error_info: info,
        }
    }
}

/// Error raised when an output is not present in the registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("No output '{key}' recorded for stack '{stack}'")]
pub struct NotFoundError {
    /// The stack name.
    pub stack: String,
    /// The output key.
    pub key: String,
}

impl NotFoundError {
    /// Creates a new not-found error.
    #[must_use]
    pub fn new(stack: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            key: key.into(),
        }
    }
}

/// Provides default suggestions for error codes.
pub struct ErrorSuggestions;

impl ErrorSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "STACK-001-CYCLE" => Some(
                "Check the required inputs of the listed stacks for circular references.",
            ),
            "STACK-002-UNKNOWN_STACK" => Some(
                "Ensure every required input names a stack defined in the configuration. \
                 Check for typos in stack names.",
            ),
            "STACK-002-UNKNOWN_OUTPUT" => Some(
                "Add the key to the upstream stack's declared outputs or fix the input name.",
            ),
            "STACK-002-DUPLICATE" => Some("Stack names must be unique."),
            "STACK-002-EMPTY" => Some("Define at least one stack before deploying."),
            "STACK-006-LEASE" => Some(
                "Only one deployment may touch a stack at a time. \
                 Stale leases left by a crashed run can be removed with `stackflow unlock`.",
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stack", "network");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.summary, "Test error");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stack"), Some(&"network".to_string()));
    }

    #[test]
    fn test_cycle_error_message() {
        let err = CycleError::new(
            vec!["a".to_string(), "b".to_string()],
            vec!["a".to_string(), "b".to_string(), "a".to_string()],
        );

        assert!(err.to_string().contains("a -> b -> a"));
        assert_eq!(err.error_info.code, "STACK-001-CYCLE");
    }

    #[test]
    fn test_stack_apply_error_preserves_provider_detail() {
        let err = StackApplyError::new("certificate", "LimitExceeded", "too many certificates");
        let msg = err.to_string();

        assert!(msg.contains("certificate"));
        assert!(msg.contains("LimitExceeded"));
        assert!(msg.contains("too many certificates"));
    }

    #[test]
    fn test_configuration_time_classification() {
        let cycle: StackflowError = CycleError::new(vec![], vec![]).into();
        let config: StackflowError = ConfigurationError::new("bad").into();
        let lease: StackflowError = ConcurrentDeploymentError::new(vec!["service".into()], None).into();

        assert!(cycle.is_configuration_time());
        assert!(config.is_configuration_time());
        assert!(!lease.is_configuration_time());
        assert_eq!(lease.error_info().map(|i| i.code.as_str()), Some("STACK-006-LEASE"));
    }

    #[test]
    fn test_error_suggestions() {
        assert!(ErrorSuggestions::get("STACK-001-CYCLE").is_some());
        assert!(ErrorSuggestions::get("UNKNOWN").is_none());
    }
}
