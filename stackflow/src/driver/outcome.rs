//! Values exchanged with a driver.

use crate::core::ApplyKind;
use crate::errors::UnsatisfiedDependencyError;
use crate::registry::OutputSnapshot;
use crate::stacks::StackDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Inputs handed to a driver for one stack.
///
/// `inputs` is keyed `stack.key`; `parameters` are the descriptor's static
/// parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInputs {
    /// Upstream output values keyed `stack.key`.
    pub inputs: BTreeMap<String, String>,
    /// Static parameters.
    pub parameters: BTreeMap<String, String>,
}

impl ResolvedInputs {
    /// Resolves every required input of `descriptor` from `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`UnsatisfiedDependencyError`] for the first input with no
    /// recorded value.
    pub fn resolve(
        descriptor: &StackDescriptor,
        snapshot: &OutputSnapshot,
    ) -> Result<Self, UnsatisfiedDependencyError> {
        let mut inputs = BTreeMap::new();
        for required in &descriptor.required_inputs {
            let value = snapshot.get(&required.stack, &required.key).ok_or_else(|| {
                UnsatisfiedDependencyError::new(&descriptor.name, &required.stack, &required.key)
            })?;
            inputs.insert(required.to_string(), value.to_string());
        }

        Ok(Self {
            inputs,
            parameters: descriptor.parameters.clone(),
        })
    }

    /// Returns the value of an upstream output.
    #[must_use]
    pub fn input(&self, stack: &str, key: &str) -> Option<&str> {
        self.inputs.get(&format!("{stack}.{key}")).map(String::as_str)
    }

    /// Returns a static parameter.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

/// Result of a successful driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Resources were created or updated.
    Changed {
        /// Outputs reported by the provider.
        outputs: BTreeMap<String, String>,
    },
    /// Nothing needed to change.
    NoOp {
        /// Outputs reported by the provider.
        outputs: BTreeMap<String, String>,
    },
}

impl ApplyOutcome {
    /// Returns the outcome kind.
    #[must_use]
    pub fn kind(&self) -> ApplyKind {
        match self {
            Self::Changed { .. } => ApplyKind::Changed,
            Self::NoOp { .. } => ApplyKind::Noop,
        }
    }

    /// Returns the reported outputs.
    #[must_use]
    pub fn outputs(&self) -> &BTreeMap<String, String> {
        match self {
            Self::Changed { outputs } | Self::NoOp { outputs } => outputs,
        }
    }

    /// Consumes the outcome, returning its outputs.
    #[must_use]
    pub fn into_outputs(self) -> BTreeMap<String, String> {
        match self {
            Self::Changed { outputs } | Self::NoOp { outputs } => outputs,
        }
    }
}

/// A provider failure, mapped into a code and message.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct DriverError {
    /// Provider error code (e.g. "LimitExceeded").
    pub code: String,
    /// Human readable message.
    pub message: String,
}

impl DriverError {
    /// Creates a new driver error.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InMemoryOutputRegistry, OutputRegistry};

    #[tokio::test]
    async fn test_resolve_reads_snapshot() {
        let registry = InMemoryOutputRegistry::new();
        registry.put("network", "vpcId", "vpc-1").await.unwrap();
        registry.put("certificate", "sslCertArn", "arn:cert").await.unwrap();

        let descriptor = StackDescriptor::new("service")
            .with_required_input("network", "vpcId")
            .with_required_input("certificate", "sslCertArn")
            .with_parameter("artifact", "v1.2.3");

        let resolved = ResolvedInputs::resolve(&descriptor, &registry.snapshot().await).unwrap();
        assert_eq!(resolved.input("network", "vpcId"), Some("vpc-1"));
        assert_eq!(resolved.input("certificate", "sslCertArn"), Some("arn:cert"));
        assert_eq!(resolved.parameter("artifact"), Some("v1.2.3"));
    }

    #[test]
    fn test_resolve_missing_input() {
        let descriptor = StackDescriptor::new("service").with_required_input("network", "vpcId");

        let err = ResolvedInputs::resolve(&descriptor, &OutputSnapshot::default()).unwrap_err();
        assert_eq!(err.stack, "service");
        assert_eq!(err.upstream, "network");
        assert_eq!(err.key, "vpcId");
    }

    #[test]
    fn test_outcome_kind() {
        let changed = ApplyOutcome::Changed { outputs: BTreeMap::new() };
        let noop = ApplyOutcome::NoOp { outputs: BTreeMap::new() };

        assert_eq!(changed.kind(), ApplyKind::Changed);
        assert_eq!(noop.kind(), ApplyKind::Noop);
    }
}
