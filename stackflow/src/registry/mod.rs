//! Output registry: durable, versioned `(stack, key) -> value` storage.
//!
//! Outputs are written after a stack applies successfully and read by
//! dependents, through one consistent [`OutputSnapshot`], before they apply.

mod file;
mod memory;
mod state;

pub use file::FileOutputRegistry;
pub use memory::InMemoryOutputRegistry;
pub use state::OutputSnapshot;

use crate::core::OutputRecord;
use crate::errors::{NotFoundError, StackflowError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Debug;
use uuid::Uuid;

/// Storage backend for stack outputs.
///
/// Every write is durable before the call returns.
#[async_trait]
pub trait OutputRegistry: Send + Sync + Debug {
    /// Writes a stack's outputs as one commit and returns the version
    /// assigned to each key.
    async fn put_all(
        &self,
        stack: &str,
        outputs: &BTreeMap<String, String>,
        run_id: Option<Uuid>,
    ) -> Result<BTreeMap<String, u64>, StackflowError>;

    /// Returns the latest record for a key.
    async fn record(&self, stack: &str, key: &str) -> Option<OutputRecord>;

    /// Returns every version of a key, oldest first.
    async fn history(&self, stack: &str, key: &str) -> Vec<OutputRecord>;

    /// Returns the latest record of every key of one stack.
    async fn outputs_of(&self, stack: &str) -> Vec<OutputRecord>;

    /// Returns the latest value of every key, read at a single instant.
    async fn snapshot(&self) -> OutputSnapshot;

    /// Writes one output and returns its new version.
    async fn put(&self, stack: &str, key: &str, value: &str) -> Result<u64, StackflowError> {
        let outputs = BTreeMap::from([(key.to_string(), value.to_string())]);
        let versions = self.put_all(stack, &outputs, None).await?;
        versions
            .get(key)
            .copied()
            .ok_or_else(|| StackflowError::Internal(format!("registry assigned no version to {stack}.{key}")))
    }

    /// Returns the latest value of a key.
    async fn get(&self, stack: &str, key: &str) -> Result<String, StackflowError> {
        self.record(stack, key)
            .await
            .map(|r| r.value)
            .ok_or_else(|| NotFoundError::new(stack, key).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_put_and_get() {
        let registry = InMemoryOutputRegistry::new();

        assert_eq!(registry.put("network", "vpcId", "vpc-1").await.unwrap(), 1);
        assert_eq!(registry.put("network", "vpcId", "vpc-2").await.unwrap(), 2);
        assert_eq!(registry.get("network", "vpcId").await.unwrap(), "vpc-2");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let registry = InMemoryOutputRegistry::new();
        let err = registry.get("network", "vpcId").await.unwrap_err();

        assert!(matches!(err, StackflowError::NotFound(ref e) if e.key == "vpcId"));
    }
}
