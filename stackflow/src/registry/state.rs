//! In-memory registry state shared by the registry backends.

use crate::core::OutputRecord;
use crate::errors::StackflowError;
use crate::utils::{validate_output_key, validate_stack_name};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Latest output values of every stack, captured at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSnapshot {
    values: BTreeMap<String, BTreeMap<String, String>>,
    taken_at: Option<DateTime<Utc>>,
}

impl OutputSnapshot {
    /// Returns the value of `stack.key`, if recorded.
    #[must_use]
    pub fn get(&self, stack: &str, key: &str) -> Option<&str> {
        self.values.get(stack)?.get(key).map(String::as_str)
    }

    /// Returns the outputs of one stack.
    #[must_use]
    pub fn stack(&self, stack: &str) -> Option<&BTreeMap<String, String>> {
        self.values.get(stack)
    }

    /// Returns the names of stacks with recorded outputs, sorted.
    pub fn stacks(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns the number of `(stack, key)` pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.values().map(BTreeMap::len).sum()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns when the snapshot was taken.
    #[must_use]
    pub fn taken_at(&self) -> Option<DateTime<Utc>> {
        self.taken_at
    }
}

/// Append-only history of records keyed by stack then output key.
#[derive(Debug, Clone, Default)]
pub(crate) struct RegistryState {
    records: BTreeMap<String, BTreeMap<String, Vec<OutputRecord>>>,
}

impl RegistryState {
    /// Rebuilds state from a flat record list, ordering versions.
    pub(crate) fn from_records(records: Vec<OutputRecord>) -> Self {
        let mut state = Self::default();
        for record in records {
            state
                .records
                .entry(record.stack.clone())
                .or_default()
                .entry(record.key.clone())
                .or_default()
                .push(record);
        }
        for keys in state.records.values_mut() {
            for versions in keys.values_mut() {
                versions.sort_by_key(|r| r.version);
            }
        }
        state
    }

    /// Returns every record, grouped by stack and key.
    pub(crate) fn all_records(&self) -> Vec<OutputRecord> {
        self.records
            .values()
            .flat_map(BTreeMap::values)
            .flatten()
            .cloned()
            .collect()
    }

    /// Appends a new version of each output.
    pub(crate) fn append(
        &mut self,
        stack: &str,
        outputs: &BTreeMap<String, String>,
        run_id: Option<Uuid>,
    ) -> Result<BTreeMap<String, u64>, StackflowError> {
        validate_stack_name(stack)?;
        for key in outputs.keys() {
            validate_output_key(stack, key)?;
        }

        let now = Utc::now();
        let keys = self.records.entry(stack.to_string()).or_default();
        let mut versions = BTreeMap::new();

        for (key, value) in outputs {
            let history = keys.entry(key.clone()).or_default();
            let version = history.last().map_or(1, |r| r.version + 1);
            let mut record = OutputRecord::new(stack, key, value, version);
            record.applied_at = now;
            record.run_id = run_id;
            history.push(record);
            versions.insert(key.clone(), version);
        }

        Ok(versions)
    }

    pub(crate) fn latest(&self, stack: &str, key: &str) -> Option<&OutputRecord> {
        self.records.get(stack)?.get(key)?.last()
    }

    pub(crate) fn history(&self, stack: &str, key: &str) -> Vec<OutputRecord> {
        self.records
            .get(stack)
            .and_then(|keys| keys.get(key))
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn outputs_of(&self, stack: &str) -> Vec<OutputRecord> {
        self.records
            .get(stack)
            .map(|keys| keys.values().filter_map(|v| v.last().cloned()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn snapshot(&self) -> OutputSnapshot {
        let values = self
            .records
            .iter()
            .map(|(stack, keys)| {
                let latest = keys
                    .iter()
                    .filter_map(|(key, versions)| versions.last().map(|r| (key.clone(), r.value.clone())))
                    .collect();
                (stack.clone(), latest)
            })
            .collect();

        OutputSnapshot {
            values,
            taken_at: Some(Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_versions_are_per_key() {
        let mut state = RegistryState::default();
        state.append("network", &outputs(&[("vpcId", "v1"), ("lb", "l1")]), None).unwrap();
        let versions = state.append("network", &outputs(&[("vpcId", "v2")]), None).unwrap();

        assert_eq!(versions.get("vpcId"), Some(&2));
        assert_eq!(state.latest("network", "lb").unwrap().version, 1);
        assert_eq!(state.history("network", "vpcId").len(), 2);
    }

    #[test]
    fn test_history_is_preserved() {
        let mut state = RegistryState::default();
        state.append("certificate", &outputs(&[("certArn", "a")]), None).unwrap();
        state.append("certificate", &outputs(&[("certArn", "b")]), None).unwrap();

        let values: Vec<_> = state
            .history("certificate", "certArn")
            .into_iter()
            .map(|r| (r.version, r.value))
            .collect();
        assert_eq!(values, vec![(1, "a".to_string()), (2, "b".to_string())]);
    }

    #[test]
    fn test_malformed_key_rejected() {
        let mut state = RegistryState::default();
        assert!(state.append("network", &outputs(&[("bad key", "x")]), None).is_err());
        assert!(state.append("Network", &outputs(&[("vpcId", "x")]), None).is_err());
        assert!(state.snapshot().is_empty());
    }

    #[test]
    fn test_from_records_round_trip() {
        let mut state = RegistryState::default();
        state.append("network", &outputs(&[("vpcId", "v1")]), None).unwrap();
        state.append("network", &outputs(&[("vpcId", "v2")]), None).unwrap();
        state.append("cognito", &outputs(&[("userPoolId", "p")]), None).unwrap();

        let mut records = state.all_records();
        records.reverse();
        let rebuilt = RegistryState::from_records(records);

        assert_eq!(rebuilt.latest("network", "vpcId").unwrap().value, "v2");
        assert_eq!(rebuilt.snapshot().len(), 2);
    }

    #[test]
    fn test_snapshot_reads_latest() {
        let mut state = RegistryState::default();
        state.append("network", &outputs(&[("vpcId", "v1")]), None).unwrap();
        state.append("network", &outputs(&[("vpcId", "v2")]), None).unwrap();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.get("network", "vpcId"), Some("v2"));
        assert_eq!(snapshot.get("network", "missing"), None);
        assert!(snapshot.taken_at().is_some());
    }
}
