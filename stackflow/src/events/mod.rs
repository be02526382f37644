//! Deployment events.
//!
//! The orchestrator reports every status transition as a [`DeployEvent`]
//! through an [`EventSink`]. Sinks decide what to do with them: log them,
//! collect them for assertions, or drop them.

mod event;
mod sink;

pub use event::DeployEvent;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
