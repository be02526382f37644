//! # Stackflow
//!
//! Dependency-ordered deployment of interdependent cloud infrastructure stacks.
//!
//! Stackflow provides:
//!
//! - **Explicit dependency graphs**: edges come only from the outputs a stack consumes
//! - **Wave scheduling**: stacks with no edges between them deploy together
//! - **Versioned output registry**: every output write is durable and versioned
//! - **Provider-agnostic drivers**: a command driver, a simulated driver, or your own
//! - **Failure containment**: a failed stack only blocks its dependents
//! - **Stack leases**: overlapping concurrent deployments are refused up front
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stackflow::prelude::*;
//!
//! # async fn example() -> Result<(), StackflowError> {
//! let waves = DependencyGraph::build(vec![
//!     StackDescriptor::new("network").with_declared_output("vpcId"),
//!     StackDescriptor::new("service")
//!         .with_required_input("network", "vpcId")
//!         .with_declared_output("serviceUrl"),
//! ])?;
//!
//! let orchestrator = Orchestrator::new(
//!     Arc::new(SimulatedDriver::new()),
//!     Arc::new(InMemoryOutputRegistry::new()),
//! );
//! let run = orchestrator.deploy(&waves, Some(&["service"][..])).await?;
//! assert_eq!(run.outcome, RunOutcome::Succeeded);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod cli;
pub mod config;
pub mod core;
pub mod driver;
pub mod errors;
pub mod events;
pub mod graph;
pub mod orchestrator;
pub mod registry;
pub mod stacks;
pub mod testing;
pub mod utils;

/// Crate version, as published.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::StackflowConfig;
    pub use crate::core::{ApplyKind, OutputRecord, RunOutcome, SkipReason, StackStatus};
    pub use crate::driver::{
        ApplyOutcome, CommandDriver, CommandDriverConfig, DriverError, ResolvedInputs,
        SimulatedDriver, StackDriver,
    };
    pub use crate::errors::{
        ConcurrentDeploymentError, ConfigurationError, ContractErrorInfo, ContractViolationError,
        CycleError, StackApplyError, StackflowError, UnsatisfiedDependencyError,
    };
    pub use crate::events::{DeployEvent, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::graph::{DependencyGraph, OrderedWaves};
    pub use crate::orchestrator::{
        DeploymentPlan, DeploymentRun, FailureMode, FileLeaseStore, InMemoryLeaseStore,
        Orchestrator, RunJournal,
    };
    pub use crate::registry::{FileOutputRegistry, InMemoryOutputRegistry, OutputRegistry};
    pub use crate::stacks::{todo_app_catalog, ApplicationEnvironment, StackDescriptor};
}
