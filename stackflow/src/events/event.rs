//! Structured events emitted during a deployment run.

use crate::core::{ApplyKind, RunOutcome, SkipReason};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One status transition within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeployEvent {
    /// The run has acquired its leases and is about to apply wave 0.
    #[serde(rename = "run.started")]
    RunStarted {
        /// Run id.
        run_id: Uuid,
        /// Stacks the run will apply.
        stacks: Vec<String>,
        /// Number of waves in the graph.
        waves: usize,
    },
    /// A wave is starting.
    #[serde(rename = "wave.started")]
    WaveStarted {
        /// Run id.
        run_id: Uuid,
        /// Wave index.
        wave: usize,
        /// Stacks of the wave that will be applied.
        stacks: Vec<String>,
    },
    /// The driver was called for a stack.
    #[serde(rename = "stack.applying")]
    StackApplying {
        /// Run id.
        run_id: Uuid,
        /// Stack name.
        stack: String,
        /// Wave index.
        wave: usize,
    },
    /// A stack applied and its outputs are durable.
    #[serde(rename = "stack.succeeded")]
    StackSucceeded {
        /// Run id.
        run_id: Uuid,
        /// Stack name.
        stack: String,
        /// Wave index.
        wave: usize,
        /// Whether anything changed.
        kind: ApplyKind,
        /// Number of outputs written to the registry.
        outputs_written: usize,
    },
    /// A stack failed.
    #[serde(rename = "stack.failed")]
    StackFailed {
        /// Run id.
        run_id: Uuid,
        /// Stack name.
        stack: String,
        /// Wave index.
        wave: usize,
        /// Error code.
        code: String,
        /// Error message.
        message: String,
    },
    /// A stack will not be applied in this run.
    #[serde(rename = "stack.skipped")]
    StackSkipped {
        /// Run id.
        run_id: Uuid,
        /// Stack name.
        stack: String,
        /// Why it was skipped.
        reason: SkipReason,
    },
    /// Every stack of a wave reached a terminal status.
    #[serde(rename = "wave.completed")]
    WaveCompleted {
        /// Run id.
        run_id: Uuid,
        /// Wave index.
        wave: usize,
        /// Stacks that succeeded.
        succeeded: usize,
        /// Stacks that failed.
        failed: usize,
    },
    /// The run ended.
    #[serde(rename = "run.completed")]
    RunCompleted {
        /// Run id.
        run_id: Uuid,
        /// Overall outcome.
        outcome: RunOutcome,
        /// Elapsed wall time in milliseconds.
        duration_ms: u64,
    },
}

impl DeployEvent {
    /// Returns the dotted event type, e.g. `stack.failed`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run.started",
            Self::WaveStarted { .. } => "wave.started",
            Self::StackApplying { .. } => "stack.applying",
            Self::StackSucceeded { .. } => "stack.succeeded",
            Self::StackFailed { .. } => "stack.failed",
            Self::StackSkipped { .. } => "stack.skipped",
            Self::WaveCompleted { .. } => "wave.completed",
            Self::RunCompleted { .. } => "run.completed",
        }
    }

    /// Returns the run the event belongs to.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::WaveStarted { run_id, .. }
            | Self::StackApplying { run_id, .. }
            | Self::StackSucceeded { run_id, .. }
            | Self::StackFailed { run_id, .. }
            | Self::StackSkipped { run_id, .. }
            | Self::WaveCompleted { run_id, .. }
            | Self::RunCompleted { run_id, .. } => *run_id,
        }
    }

    /// Returns the stack the event is about, for stack events.
    #[must_use]
    pub fn stack(&self) -> Option<&str> {
        match self {
            Self::StackApplying { stack, .. }
            | Self::StackSucceeded { stack, .. }
            | Self::StackFailed { stack, .. }
            | Self::StackSkipped { stack, .. } => Some(stack),
            _ => None,
        }
    }
}
