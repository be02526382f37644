//! Test assertions for deployment runs.

use crate::core::{ApplyKind, SkipReason, StackStatus};
use crate::orchestrator::DeploymentRun;

/// Asserts that a stack ended with the expected status.
pub fn assert_stack_status(run: &DeploymentRun, stack: &str, expected: StackStatus) {
    let actual = run.status_of(stack);
    assert_eq!(
        actual,
        Some(expected),
        "Expected stack '{stack}' to be {expected}, got {actual:?}"
    );
}

/// Asserts that a stack succeeded.
pub fn assert_succeeded(run: &DeploymentRun, stack: &str) {
    assert_stack_status(run, stack, StackStatus::Succeeded);
}

/// Asserts that a stack succeeded with the given outcome kind.
pub fn assert_apply_kind(run: &DeploymentRun, stack: &str, expected: ApplyKind) {
    assert_succeeded(run, stack);
    let actual = run.entry(stack).and_then(|e| e.apply_kind);
    assert_eq!(
        actual,
        Some(expected),
        "Expected stack '{stack}' to apply as {expected}, got {actual:?}"
    );
}

/// Asserts that a stack failed with the given error code.
pub fn assert_failed_with(run: &DeploymentRun, stack: &str, code: &str) {
    assert_stack_status(run, stack, StackStatus::Failed);
    let actual = run.entry(stack).and_then(|e| e.error.as_ref()).map(|e| e.code.as_str());
    assert_eq!(
        actual,
        Some(code),
        "Expected stack '{stack}' to fail with {code}, got {actual:?}"
    );
}

/// Asserts that a stack was skipped for the given reason.
pub fn assert_skipped(run: &DeploymentRun, stack: &str, reason: SkipReason) {
    assert_stack_status(run, stack, StackStatus::Skipped);
    let actual = run.entry(stack).and_then(|e| e.skip_reason);
    assert_eq!(
        actual,
        Some(reason),
        "Expected stack '{stack}' to be skipped as {reason}, got {actual:?}"
    );
}
