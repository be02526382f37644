//! Local rehearsal driver.
//!
//! Provisions nothing. Each apply fingerprints the descriptor and resolved
//! inputs; an unchanged fingerprint is a no-op, anything else produces a fresh
//! set of deterministic outputs. Useful for exercising a catalog end to end
//! before pointing it at a real provider.

use super::{ApplyOutcome, DriverError, ResolvedInputs, StackDriver};
use crate::stacks::StackDescriptor;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

const FINGERPRINT_PREFIX_LEN: usize = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AppliedStack {
    fingerprint: String,
    outputs: BTreeMap<String, String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SimulatedState {
    stacks: BTreeMap<String, AppliedStack>,
}

/// Deterministic in-process provider.
#[derive(Debug, Default)]
pub struct SimulatedDriver {
    state: Mutex<SimulatedState>,
    state_path: Option<PathBuf>,
    failures: RwLock<BTreeMap<String, String>>,
}

impl SimulatedDriver {
    /// Creates a driver whose state lives only in memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a driver persisting its state to `path`, loading it if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file exists but cannot be read or parsed.
    pub async fn with_state_file(path: impl Into<PathBuf>) -> Result<Self, crate::errors::StackflowError> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SimulatedState::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            state: Mutex::new(state),
            state_path: Some(path),
            failures: RwLock::default(),
        })
    }

    /// Makes every apply of `stack` fail with `code`.
    #[must_use]
    pub fn with_failure(self, stack: impl Into<String>, code: impl Into<String>) -> Self {
        self.fail_stack(stack, code);
        self
    }

    /// Makes every apply of `stack` fail with `code`.
    pub fn fail_stack(&self, stack: impl Into<String>, code: impl Into<String>) {
        self.failures.write().insert(stack.into(), code.into());
    }

    /// Clears a configured failure.
    pub fn clear_failure(&self, stack: &str) {
        self.failures.write().remove(stack);
    }

    /// Returns the state file path, if persistent.
    #[must_use]
    pub fn state_path(&self) -> Option<&Path> {
        self.state_path.as_deref()
    }

    async fn persist(&self, state: &SimulatedState) -> Result<(), DriverError> {
        let Some(ref path) = self.state_path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| DriverError::new("StateWriteFailed", e.to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DriverError::new("StateWriteFailed", e.to_string()))?;
            }
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| DriverError::new("StateWriteFailed", e.to_string()))
    }
}

/// Computes the SHA-256 fingerprint of a descriptor plus its inputs.
#[must_use]
pub fn fingerprint(descriptor: &StackDescriptor, inputs: &ResolvedInputs) -> String {
    let mut hasher = Sha256::new();
    // BTree-backed fields serialize in a stable order
    if let Ok(bytes) = serde_json::to_vec(descriptor) {
        hasher.update(&bytes);
    }
    hasher.update(b"\n");
    if let Ok(bytes) = serde_json::to_vec(inputs) {
        hasher.update(&bytes);
    }
    hex::encode(hasher.finalize())
}

#[async_trait]
impl StackDriver for SimulatedDriver {
    fn name(&self) -> &str {
        "simulated"
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    async fn apply(
        &self,
        descriptor: &StackDescriptor,
        inputs: &ResolvedInputs,
    ) -> Result<ApplyOutcome, DriverError> {
        if let Some(code) = self.failures.read().get(&descriptor.name).cloned() {
            return Err(DriverError::new(
                code,
                format!("Simulated failure for stack '{}'", descriptor.name),
            ));
        }

        let fingerprint = fingerprint(descriptor, inputs);
        let mut state = self.state.lock().await;

        if let Some(applied) = state.stacks.get(&descriptor.name) {
            if applied.fingerprint == fingerprint {
                debug!(stack = %descriptor.name, "Simulated stack unchanged");
                return Ok(ApplyOutcome::NoOp {
                    outputs: applied.outputs.clone(),
                });
            }
        }

        let short = &fingerprint[..FINGERPRINT_PREFIX_LEN];
        let outputs: BTreeMap<String, String> = descriptor
            .declared_outputs
            .iter()
            .map(|key| (key.clone(), format!("{}-{key}-{short}", descriptor.name)))
            .collect();

        state.stacks.insert(
            descriptor.name.clone(),
            AppliedStack {
                fingerprint,
                outputs: outputs.clone(),
            },
        );
        self.persist(&state).await?;

        Ok(ApplyOutcome::Changed { outputs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ApplyKind;

    fn network() -> StackDescriptor {
        StackDescriptor::new("network").with_declared_outputs(["vpcId", "ecsClusterName"])
    }

    #[tokio::test]
    async fn test_second_apply_is_noop() {
        let driver = SimulatedDriver::new();
        let inputs = ResolvedInputs::default();

        let first = driver.apply(&network(), &inputs).await.unwrap();
        let second = driver.apply(&network(), &inputs).await.unwrap();

        assert_eq!(first.kind(), ApplyKind::Changed);
        assert_eq!(second.kind(), ApplyKind::Noop);
        assert_eq!(first.outputs(), second.outputs());
    }

    #[tokio::test]
    async fn test_changed_inputs_produce_new_outputs() {
        let driver = SimulatedDriver::new();
        let descriptor = StackDescriptor::new("service")
            .with_required_input("network", "vpcId")
            .with_declared_output("serviceUrl");

        let mut inputs = ResolvedInputs::default();
        inputs.inputs.insert("network.vpcId".into(), "vpc-1".into());
        let first = driver.apply(&descriptor, &inputs).await.unwrap();

        inputs.inputs.insert("network.vpcId".into(), "vpc-2".into());
        let second = driver.apply(&descriptor, &inputs).await.unwrap();

        assert_eq!(second.kind(), ApplyKind::Changed);
        assert_ne!(first.outputs()["serviceUrl"], second.outputs()["serviceUrl"]);
        assert!(second.outputs()["serviceUrl"].starts_with("service-serviceUrl-"));
    }

    #[tokio::test]
    async fn test_configured_failure() {
        let driver = SimulatedDriver::new().with_failure("certificate", "LimitExceeded");
        let descriptor = StackDescriptor::new("certificate").with_declared_output("sslCertArn");

        let err = driver.apply(&descriptor, &ResolvedInputs::default()).await.unwrap_err();
        assert_eq!(err.code, "LimitExceeded");

        driver.clear_failure("certificate");
        assert!(driver.apply(&descriptor, &ResolvedInputs::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_state_file_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simulated.json");
        let inputs = ResolvedInputs::default();

        let first = {
            let driver = SimulatedDriver::with_state_file(&path).await.unwrap();
            driver.apply(&network(), &inputs).await.unwrap()
        };

        let driver = SimulatedDriver::with_state_file(&path).await.unwrap();
        let second = driver.apply(&network(), &inputs).await.unwrap();

        assert_eq!(second.kind(), ApplyKind::Noop);
        assert_eq!(first.outputs(), second.outputs());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let inputs = ResolvedInputs::default();
        assert_eq!(fingerprint(&network(), &inputs), fingerprint(&network(), &inputs));
        assert_eq!(fingerprint(&network(), &inputs).len(), 64);
    }
}
