//! Failure policy for a deployment run.

use crate::graph::OrderedWaves;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// What the orchestrator does after a stack fails to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    /// Finish the current wave, start no new wave (default).
    #[default]
    Halt,
    /// Keep running later waves, skipping only dependents of failed stacks.
    ContinueIndependent,
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Halt => write!(f, "halt"),
            Self::ContinueIndependent => write!(f, "continue-independent"),
        }
    }
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "halt" => Ok(Self::Halt),
            "continue-independent" => Ok(Self::ContinueIndependent),
            other => Err(format!(
                "unknown failure mode '{other}' (expected 'halt' or 'continue-independent')"
            )),
        }
    }
}

/// Record of one stack failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stack name.
    pub stack: String,
    /// Error code.
    pub code: String,
    /// Whether the failure stops the run regardless of mode.
    pub fatal: bool,
    /// When the failure was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a non-fatal failure record.
    #[must_use]
    pub fn new(stack: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            code: code.into(),
            fatal: false,
            recorded_at: Utc::now(),
        }
    }

    /// Marks the failure as fatal for the run.
    #[must_use]
    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }
}

/// Tracks failures during a run and answers scheduling questions.
#[derive(Debug)]
pub struct FailureCollector {
    mode: FailureMode,
    failures: Vec<FailureRecord>,
    blocked: BTreeSet<String>,
}

impl FailureCollector {
    /// Creates a new failure collector.
    #[must_use]
    pub fn new(mode: FailureMode) -> Self {
        Self {
            mode,
            failures: Vec::new(),
            blocked: BTreeSet::new(),
        }
    }

    /// Records a failure and blocks every transitive dependent of the stack.
    pub fn record_failure(&mut self, record: FailureRecord, waves: &OrderedWaves) {
        self.blocked.extend(waves.transitive_dependents(&record.stack));
        self.failures.push(record);
    }

    /// Returns true if some upstream stack of `stack` failed.
    #[must_use]
    pub fn is_blocked(&self, stack: &str) -> bool {
        self.blocked.contains(stack)
    }

    /// Returns true if a fatal failure was recorded.
    #[must_use]
    pub fn has_fatal(&self) -> bool {
        self.failures.iter().any(|f| f.fatal)
    }

    /// Returns true if no further wave may start.
    #[must_use]
    pub fn should_halt(&self) -> bool {
        match self.mode {
            FailureMode::Halt => !self.failures.is_empty(),
            FailureMode::ContinueIndependent => self.has_fatal(),
        }
    }

    /// Returns all failures in the order they were recorded.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }
}

impl Default for FailureCollector {
    fn default() -> Self {
        Self::new(FailureMode::default())
    }
}
