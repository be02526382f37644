//! Stack driver boundary.
//!
//! A driver turns a descriptor plus resolved inputs into provider calls and
//! reports whether anything changed. The orchestrator never looks past this
//! trait, so drivers are free to talk to a cloud CLI, an SDK, or nothing at all.

mod command;
mod outcome;
mod simulated;

pub use command::{CommandDriver, CommandDriverConfig};
pub use outcome::{ApplyOutcome, DriverError, ResolvedInputs};
pub use simulated::SimulatedDriver;

use crate::stacks::StackDescriptor;
use async_trait::async_trait;
use std::fmt::Debug;

/// Applies one stack against a provider.
///
/// Implementations must be deterministic and idempotent for the same
/// descriptor, inputs and remote state.
#[async_trait]
pub trait StackDriver: Send + Sync + Debug {
    /// Returns the driver name, used in logs and run archives.
    fn name(&self) -> &str;

    /// Returns true if several stacks of one wave may apply at once.
    fn parallel_safe(&self) -> bool {
        false
    }

    /// Creates or updates the stack and reports its outputs.
    async fn apply(
        &self,
        descriptor: &StackDescriptor,
        inputs: &ResolvedInputs,
    ) -> Result<ApplyOutcome, DriverError>;
}
