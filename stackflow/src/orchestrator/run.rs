//! The record of one deployment run.

use super::FailureMode;
use crate::core::{ApplyKind, RunOutcome, SkipReason, StackStatus};
use crate::errors::StackflowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Error detail stored on a failed stack or an aborted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    /// Stable error code.
    pub code: String,
    /// Human readable message.
    pub message: String,
}

impl RunError {
    /// Creates a new run error.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&StackflowError> for RunError {
    fn from(err: &StackflowError) -> Self {
        let code = match err {
            StackflowError::StackApply(e) => e.code.clone(),
            other => other
                .error_info()
                .map_or_else(|| "STACK-000-INTERNAL".to_string(), |info| info.code.clone()),
        };
        Self::new(code, err.to_string())
    }
}

/// Status of one stack within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackRunEntry {
    /// Stack name.
    pub stack: String,
    /// Wave the stack belongs to.
    pub wave: usize,
    /// Current status.
    pub status: StackStatus,
    /// Outcome kind, for succeeded stacks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_kind: Option<ApplyKind>,
    /// Error detail, for failed stacks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    /// Why the stack was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    /// Versions written to the registry, by key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output_versions: BTreeMap<String, u64>,
    /// When the driver was called.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the stack reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl StackRunEntry {
    fn pending(stack: impl Into<String>, wave: usize) -> Self {
        Self {
            stack: stack.into(),
            wave,
            status: StackStatus::Pending,
            apply_kind: None,
            error: None,
            skip_reason: None,
            output_versions: BTreeMap::new(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Ordered `(stack, status)` record owned by one orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRun {
    /// Run id (UUID v7).
    pub run_id: Uuid,
    /// Requested targets; `None` means every stack.
    pub targets: Option<Vec<String>>,
    /// Driver used.
    pub driver: String,
    /// Failure mode in effect.
    pub failure_mode: FailureMode,
    /// Overall outcome, final once `finished_at` is set.
    pub outcome: RunOutcome,
    /// Error that aborted the run, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<RunError>,
    /// Cancellation reason, if cancelled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Per-stack entries in wave order, then by name.
    pub entries: Vec<StackRunEntry>,
}

impl DeploymentRun {
    /// Creates a run with every stack pending.
    #[must_use]
    pub fn new(
        run_id: Uuid,
        waves: &[Vec<String>],
        targets: Option<Vec<String>>,
        driver: impl Into<String>,
        failure_mode: FailureMode,
    ) -> Self {
        let entries = waves
            .iter()
            .enumerate()
            .flat_map(|(idx, wave)| wave.iter().map(move |name| StackRunEntry::pending(name, idx)))
            .collect();

        Self {
            run_id,
            targets,
            driver: driver.into(),
            failure_mode,
            outcome: RunOutcome::Succeeded,
            fatal_error: None,
            cancel_reason: None,
            started_at: Utc::now(),
            finished_at: None,
            entries,
        }
    }

    /// Returns the entry for a stack.
    #[must_use]
    pub fn entry(&self, stack: &str) -> Option<&StackRunEntry> {
        self.entries.iter().find(|e| e.stack == stack)
    }

    /// Returns the status of a stack.
    #[must_use]
    pub fn status_of(&self, stack: &str) -> Option<StackStatus> {
        self.entry(stack).map(|e| e.status)
    }

    /// Returns the names of the stacks with the given status.
    #[must_use]
    pub fn stacks_with_status(&self, status: StackStatus) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.status == status)
            .map(|e| e.stack.as_str())
            .collect()
    }

    /// Returns the names of stacks still pending in a wave.
    #[must_use]
    pub fn pending_in_wave(&self, wave: usize) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.wave == wave && e.status == StackStatus::Pending)
            .map(|e| e.stack.clone())
            .collect()
    }

    /// Returns the names of every pending stack.
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        self.stacks_with_status(StackStatus::Pending)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Returns true if the run fully succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Returns the elapsed wall time, once finished.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    fn entry_mut(&mut self, stack: &str) -> Option<&mut StackRunEntry> {
        self.entries.iter_mut().find(|e| e.stack == stack)
    }

    pub(crate) fn mark_applying(&mut self, stack: &str) {
        if let Some(entry) = self.entry_mut(stack) {
            entry.status = StackStatus::Applying;
            entry.started_at = Some(Utc::now());
        }
    }

    pub(crate) fn mark_succeeded(&mut self, stack: &str, kind: ApplyKind, versions: BTreeMap<String, u64>) {
        if let Some(entry) = self.entry_mut(stack) {
            entry.status = StackStatus::Succeeded;
            entry.apply_kind = Some(kind);
            entry.output_versions = versions;
            entry.finished_at = Some(Utc::now());
        }
    }

    pub(crate) fn mark_failed(&mut self, stack: &str, error: RunError) {
        if let Some(entry) = self.entry_mut(stack) {
            entry.status = StackStatus::Failed;
            entry.error = Some(error);
            entry.finished_at = Some(Utc::now());
        }
    }

    pub(crate) fn mark_skipped(&mut self, stack: &str, reason: SkipReason) {
        if let Some(entry) = self.entry_mut(stack) {
            entry.status = StackStatus::Skipped;
            entry.skip_reason = Some(reason);
            entry.finished_at = Some(Utc::now());
        }
    }

    /// Computes the outcome and stamps the finish time.
    pub(crate) fn finish(&mut self) {
        self.outcome = if self.fatal_error.is_some() {
            RunOutcome::Aborted
        } else if self.entries.iter().any(|e| e.status == StackStatus::Failed) {
            RunOutcome::PartialFailure
        } else if self
            .entries
            .iter()
            .any(|e| e.skip_reason == Some(SkipReason::Cancelled))
        {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Succeeded
        };
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ContractViolationError, StackApplyError};

    fn run() -> DeploymentRun {
        let waves = vec![
            vec!["certificate".to_string(), "network".to_string()],
            vec!["service".to_string()],
        ];
        DeploymentRun::new(Uuid::now_v7(), &waves, None, "mock", FailureMode::Halt)
    }

    #[test]
    fn test_new_run_is_pending_in_wave_order() {
        let run = run();
        let order: Vec<_> = run.entries.iter().map(|e| (e.stack.as_str(), e.wave)).collect();

        assert_eq!(order, vec![("certificate", 0), ("network", 0), ("service", 1)]);
        assert_eq!(run.pending_in_wave(0), vec!["certificate", "network"]);
    }

    #[test]
    fn test_finish_partial_failure() {
        let mut run = run();
        run.mark_succeeded("network", ApplyKind::Changed, BTreeMap::new());
        run.mark_failed("certificate", RunError::new("LimitExceeded", "too many"));
        run.mark_skipped("service", SkipReason::DependencyFailed);
        run.finish();

        assert_eq!(run.outcome, RunOutcome::PartialFailure);
        assert!(run.duration().is_some());
        assert_eq!(run.stacks_with_status(StackStatus::Failed), vec!["certificate"]);
    }

    #[test]
    fn test_finish_cancelled_and_aborted() {
        let mut cancelled = run();
        cancelled.mark_skipped("service", SkipReason::Cancelled);
        cancelled.finish();
        assert_eq!(cancelled.outcome, RunOutcome::Cancelled);

        let mut aborted = run();
        let err: StackflowError = ContractViolationError::new("network", vec!["vpcId".into()]).into();
        aborted.fatal_error = Some(RunError::from(&err));
        aborted.finish();
        assert_eq!(aborted.outcome, RunOutcome::Aborted);
        assert_eq!(aborted.fatal_error.unwrap().code, "STACK-004-CONTRACT");
    }

    #[test]
    fn test_run_error_keeps_provider_code() {
        let err: StackflowError = StackApplyError::new("certificate", "LimitExceeded", "too many").into();
        assert_eq!(RunError::from(&err).code, "LimitExceeded");
    }

    #[test]
    fn test_run_serializes() {
        let mut run = run();
        run.mark_skipped("service", SkipReason::NotTargeted);
        run.finish();

        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["failure_mode"], "halt");
        assert_eq!(json["entries"][2]["skip_reason"], "not-targeted");

        let back: DeploymentRun = serde_json::from_value(json).unwrap();
        assert_eq!(back, run);
    }
}
