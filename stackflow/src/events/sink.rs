//! Event sink trait and implementations.

use super::DeployEvent;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn, Level};

/// Receives deployment events.
///
/// Sinks must not fail: errors are logged and suppressed.
#[async_trait]
pub trait EventSink: Send + Sync + std::fmt::Debug {
    /// Handles one event.
    async fn emit(&self, event: &DeployEvent);
}

/// A sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &DeployEvent) {}
}

/// Forwards events to `tracing`.
///
/// Failures log at ERROR and skips at WARN regardless of the configured level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink for routine events at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_routine(&self, event: &DeployEvent, message: &str) {
        let data = serde_json::to_string(event).unwrap_or_default();
        if self.level == Level::DEBUG {
            debug!(event_type = event.event_type(), run_id = %event.run_id(), event_data = %data, "{message}");
        } else {
            info!(event_type = event.event_type(), run_id = %event.run_id(), event_data = %data, "{message}");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &DeployEvent) {
        match event {
            DeployEvent::StackFailed {
                run_id,
                stack,
                wave,
                code,
                message,
            } => {
                error!(run_id = %run_id, stack = %stack, wave = wave, code = %code, "Stack failed: {message}");
            }
            DeployEvent::StackSkipped { run_id, stack, reason } => {
                warn!(run_id = %run_id, stack = %stack, reason = %reason, "Stack skipped");
            }
            DeployEvent::RunStarted { stacks, waves, .. } => {
                self.log_routine(event, &format!("Deploying {} stack(s) in {waves} wave(s)", stacks.len()));
            }
            DeployEvent::WaveStarted { wave, stacks, .. } => {
                self.log_routine(event, &format!("Wave {wave}: {}", stacks.join(", ")));
            }
            DeployEvent::StackApplying { stack, .. } => {
                self.log_routine(event, &format!("Applying {stack}"));
            }
            DeployEvent::StackSucceeded { stack, kind, .. } => {
                self.log_routine(event, &format!("Stack {stack} succeeded ({kind})"));
            }
            DeployEvent::WaveCompleted { wave, .. } => {
                self.log_routine(event, &format!("Wave {wave} completed"));
            }
            DeployEvent::RunCompleted { outcome, .. } => {
                self.log_routine(event, &format!("Run completed: {outcome}"));
            }
        }
    }
}

/// Records events in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<DeployEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<DeployEvent> {
        self.events.read().clone()
    }

    /// Returns the event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().iter().map(DeployEvent::event_type).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events whose type starts with `type_prefix`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<DeployEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(type_prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &DeployEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ApplyKind, SkipReason};
    use uuid::Uuid;

    fn applying(stack: &str) -> DeployEvent {
        DeployEvent::StackApplying {
            run_id: Uuid::nil(),
            stack: stack.to_string(),
            wave: 0,
        }
    }

    #[tokio::test]
    async fn test_noop_sink() {
        NoOpEventSink.emit(&applying("network")).await;
    }

    #[tokio::test]
    async fn test_logging_sink() {
        let sink = LoggingEventSink::default();
        sink.emit(&applying("network")).await;
        sink.emit(&DeployEvent::StackSkipped {
            run_id: Uuid::nil(),
            stack: "service".to_string(),
            reason: SkipReason::Halted,
        })
        .await;
        LoggingEventSink::debug().emit(&applying("network")).await;
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(&applying("network")).await;
        sink.emit(&DeployEvent::StackSucceeded {
            run_id: Uuid::nil(),
            stack: "network".to_string(),
            wave: 0,
            kind: ApplyKind::Changed,
            outputs_written: 1,
        })
        .await;

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.event_types(), vec!["stack.applying", "stack.succeeded"]);
    }

    #[tokio::test]
    async fn test_collecting_sink_filter_and_clear() {
        let sink = CollectingEventSink::new();
        sink.emit(&applying("network")).await;
        sink.emit(&applying("certificate")).await;
        sink.emit(&DeployEvent::WaveCompleted {
            run_id: Uuid::nil(),
            wave: 0,
            succeeded: 2,
            failed: 0,
        })
        .await;

        assert_eq!(sink.events_of_type("stack.").len(), 2);
        assert_eq!(sink.events_of_type("wave.").len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }
}
