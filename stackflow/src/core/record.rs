//! Versioned output records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One version of one output published by a stack.
///
/// Records are never mutated; a re-apply appends a new version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// The stack that published the output.
    pub stack: String,
    /// The output key.
    pub key: String,
    /// The output value.
    pub value: String,
    /// Version number, starting at 1 per `(stack, key)`.
    pub version: u64,
    /// When the record was written.
    pub applied_at: DateTime<Utc>,
    /// The deployment run that wrote the record, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
}

impl OutputRecord {
    /// Creates a new record stamped with the current time.
    #[must_use]
    pub fn new(
        stack: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        version: u64,
    ) -> Self {
        Self {
            stack: stack.into(),
            key: key.into(),
            value: value.into(),
            version,
            applied_at: Utc::now(),
            run_id: None,
        }
    }

    /// Sets the run that wrote the record.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Returns the `stack.key` address of the record.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}.{}", self.stack, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creation() {
        let run_id = Uuid::now_v7();
        let record = OutputRecord::new("network", "vpcId", "vpc-123", 1).with_run_id(run_id);

        assert_eq!(record.address(), "network.vpcId");
        assert_eq!(record.version, 1);
        assert_eq!(record.run_id, Some(run_id));
    }

    #[test]
    fn test_record_serialization_omits_missing_run_id() {
        let record = OutputRecord::new("network", "vpcId", "vpc-123", 2);
        let json = serde_json::to_value(&record).unwrap();

        assert!(json.get("run_id").is_none());
        assert_eq!(json["version"], 2);
    }
}
