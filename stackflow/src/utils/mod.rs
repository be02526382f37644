//! Small shared helpers: identifiers and name validation.

pub mod validation;

pub use validation::{
    is_valid_output_key, is_valid_stack_name, validate_output_key, validate_stack_name,
};

use uuid::Uuid;

/// Generates a time-ordered identifier for a deployment run.
///
/// UUID v7 ids sort by creation time, so archived runs list chronologically.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::now_v7()
}
