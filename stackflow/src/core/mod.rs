//! Core domain model types for stackflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stack status, skip reasons and run outcomes
//! - Versioned output records

mod record;
mod status;

pub use record::OutputRecord;
pub use status::{ApplyKind, RunOutcome, SkipReason, StackStatus};
