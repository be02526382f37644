//! Stack status and outcome enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The status of one stack within a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    /// Not yet started.
    #[default]
    Pending,
    /// The driver is currently applying the stack.
    Applying,
    /// The stack applied (or was already up to date) and its outputs are durable.
    Succeeded,
    /// The stack failed to apply.
    Failed,
    /// The stack was not applied in this run.
    Skipped,
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Applying => write!(f, "applying"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Why a stack ended a run as [`StackStatus::Skipped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Neither a target nor upstream of one.
    NotTargeted,
    /// A stack in its upstream closure failed.
    DependencyFailed,
    /// The run halted after a failure before this stack's wave started.
    Halted,
    /// The caller cancelled the run before this stack started.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotTargeted => write!(f, "not-targeted"),
            Self::DependencyFailed => write!(f, "dependency-failed"),
            Self::Halted => write!(f, "halted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How a successful apply was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyKind {
    /// The driver created or updated resources.
    Changed,
    /// Desired and current state already matched.
    Noop,
}

impl fmt::Display for ApplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Changed => write!(f, "changed"),
            Self::Noop => write!(f, "noop"),
        }
    }
}

/// Overall result of a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every stack the run applied succeeded.
    Succeeded,
    /// At least one stack failed to apply.
    PartialFailure,
    /// The run stopped on an unsatisfied dependency or contract violation.
    Aborted,
    /// The run was cancelled before every stack was applied.
    Cancelled,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::PartialFailure => write!(f, "partial_failure"),
            Self::Aborted => write!(f, "aborted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl RunOutcome {
    /// Returns true if the run fully succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_status_display() {
        assert_eq!(StackStatus::Pending.to_string(), "pending");
        assert_eq!(StackStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(StackStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_skip_reason_serialize() {
        let json = serde_json::to_string(&SkipReason::DependencyFailed).unwrap();
        assert_eq!(json, r#""dependency-failed""#);

        let back: SkipReason = serde_json::from_str(r#""cancelled""#).unwrap();
        assert_eq!(back, SkipReason::Cancelled);
    }

    #[test]
    fn test_apply_kind_display() {
        assert_eq!(ApplyKind::Noop.to_string(), "noop");
        assert_eq!(ApplyKind::Changed.to_string(), "changed");
    }

    #[test]
    fn test_run_outcome_serialize() {
        let json = serde_json::to_string(&RunOutcome::PartialFailure).unwrap();
        assert_eq!(json, r#""partial_failure""#);
        assert!(RunOutcome::Succeeded.is_success());
        assert!(!RunOutcome::Cancelled.is_success());
    }
}
