//! Wave-by-wave deployment of a stack graph.
//!
//! This module provides:
//! - The [`Orchestrator`] and its deploy loop
//! - Failure modes and failure tracking
//! - Stack leases
//! - The [`DeploymentRun`] record and its on-disk archive
//! - Dry-run planning

mod deploy;
mod failure;
mod journal;
mod lease;
mod plan;
mod run;


pub use failure::{FailureCollector, FailureMode, FailureRecord};
pub use journal::RunJournal;
pub use lease::{FileLeaseStore, InMemoryLeaseStore, LeaseGuard, LeaseInfo, LeaseStore};
pub use plan::{DeploymentPlan, PlannedStack};
pub use run::{DeploymentRun, RunError, StackRunEntry};

use crate::driver::StackDriver;
use crate::events::{EventSink, NoOpEventSink};
use crate::registry::OutputRegistry;
use std::sync::Arc;

/// Default number of stacks applied at once within a wave.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Applies an [`OrderedWaves`](crate::graph::OrderedWaves) through a driver,
/// recording outputs in a registry.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    driver: Arc<dyn StackDriver>,
    registry: Arc<dyn OutputRegistry>,
    leases: Arc<dyn LeaseStore>,
    events: Arc<dyn EventSink>,
    failure_mode: FailureMode,
    max_concurrency: usize,
    journal: Option<RunJournal>,
}

impl Orchestrator {
    /// Creates an orchestrator with in-memory leases and no event sink.
    #[must_use]
    pub fn new(driver: Arc<dyn StackDriver>, registry: Arc<dyn OutputRegistry>) -> Self {
        Self {
            driver,
            registry,
            leases: Arc::new(InMemoryLeaseStore::new()),
            events: Arc::new(NoOpEventSink),
            failure_mode: FailureMode::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            journal: None,
        }
    }

    /// Sets the lease store.
    #[must_use]
    pub fn with_lease_store(mut self, leases: Arc<dyn LeaseStore>) -> Self {
        self.leases = leases;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the failure mode.
    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Sets how many stacks of one wave may apply at once. Zero is treated as one.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Archives every finished run to `journal`.
    #[must_use]
    pub fn with_journal(mut self, journal: RunJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Returns the output registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn OutputRegistry> {
        &self.registry
    }

    /// Returns the failure mode.
    #[must_use]
    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }
}
