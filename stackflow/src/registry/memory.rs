//! In-memory output registry.

use super::state::{OutputSnapshot, RegistryState};
use super::OutputRegistry;
use crate::core::OutputRecord;
use crate::errors::StackflowError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Output registry held in process memory.
///
/// Used by tests and rehearsal runs; nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryOutputRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryOutputRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with records.
    #[must_use]
    pub fn with_records(records: Vec<OutputRecord>) -> Self {
        Self {
            state: RwLock::new(RegistryState::from_records(records)),
        }
    }
}

#[async_trait]
impl OutputRegistry for InMemoryOutputRegistry {
    async fn put_all(
        &self,
        stack: &str,
        outputs: &BTreeMap<String, String>,
        run_id: Option<Uuid>,
    ) -> Result<BTreeMap<String, u64>, StackflowError> {
        self.state.write().append(stack, outputs, run_id)
    }

    async fn record(&self, stack: &str, key: &str) -> Option<OutputRecord> {
        self.state.read().latest(stack, key).cloned()
    }

    async fn history(&self, stack: &str, key: &str) -> Vec<OutputRecord> {
        self.state.read().history(stack, key)
    }

    async fn outputs_of(&self, stack: &str) -> Vec<OutputRecord> {
        self.state.read().outputs_of(stack)
    }

    async fn snapshot(&self) -> OutputSnapshot {
        self.state.read().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_all_assigns_versions() {
        let registry = InMemoryOutputRegistry::new();
        let outputs = BTreeMap::from([
            ("vpcId".to_string(), "vpc-1".to_string()),
            ("loadBalancerArn".to_string(), "arn:lb".to_string()),
        ]);
        let run_id = Uuid::now_v7();

        let versions = registry.put_all("network", &outputs, Some(run_id)).await.unwrap();
        assert_eq!(versions.values().copied().collect::<Vec<_>>(), vec![1, 1]);

        let record = registry.record("network", "vpcId").await.unwrap();
        assert_eq!(record.run_id, Some(run_id));
        assert_eq!(registry.outputs_of("network").await.len(), 2);
    }

    #[tokio::test]
    async fn test_with_records() {
        let registry = InMemoryOutputRegistry::with_records(vec![
            OutputRecord::new("network", "vpcId", "vpc-1", 1),
            OutputRecord::new("network", "vpcId", "vpc-2", 2),
        ]);

        assert_eq!(registry.get("network", "vpcId").await.unwrap(), "vpc-2");
        assert_eq!(registry.put("network", "vpcId", "vpc-3").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let registry = InMemoryOutputRegistry::new();
        registry.put("network", "vpcId", "vpc-1").await.unwrap();

        let snapshot = registry.snapshot().await;
        registry.put("network", "vpcId", "vpc-2").await.unwrap();

        assert_eq!(snapshot.get("network", "vpcId"), Some("vpc-1"));
        assert_eq!(snapshot.stacks().collect::<Vec<_>>(), vec!["network"]);
        assert_eq!(registry.snapshot().await.get("network", "vpcId"), Some("vpc-2"));
    }
}
