//! Testing utilities for stackflow deployments.
//!
//! This module provides:
//! - Mock, failing and slow stack drivers
//! - Fixture graphs for the documented scenarios
//! - Assertions over deployment runs

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{
    assert_apply_kind, assert_failed_with, assert_skipped, assert_stack_status, assert_succeeded,
};
pub use fixtures::{sample_environment, scenario_a, todo_app_waves, DeployHarness};
pub use mocks::{FailingDriver, MockDriver, SlowDriver};
