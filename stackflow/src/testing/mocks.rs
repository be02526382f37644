//! Mock drivers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::driver::{ApplyOutcome, DriverError, ResolvedInputs, StackDriver};
use crate::stacks::StackDescriptor;

type Scripted = Result<ApplyOutcome, DriverError>;

fn declared_outputs(descriptor: &StackDescriptor) -> BTreeMap<String, String> {
    descriptor
        .declared_outputs
        .iter()
        .map(|key| (key.clone(), format!("{}-{key}", descriptor.name)))
        .collect()
}

/// A driver that behaves like a converging provider and records every call.
///
/// Unless scripted otherwise, the first apply of a stack (or any apply with
/// new inputs) is `Changed` and a repeat with the same inputs is `NoOp`.
/// Each declared output gets the value `<stack>-<key>`.
#[derive(Debug, Default)]
pub struct MockDriver {
    parallel_safe: bool,
    scripted: Mutex<BTreeMap<String, VecDeque<Scripted>>>,
    failures: Mutex<BTreeMap<String, DriverError>>,
    outputs: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    applied: Mutex<BTreeMap<String, ResolvedInputs>>,
    calls: Mutex<Vec<(String, ResolvedInputs)>>,
}

impl MockDriver {
    /// Creates a sequential mock driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock driver that allows concurrent applies.
    #[must_use]
    pub fn parallel() -> Self {
        Self {
            parallel_safe: true,
            ..Self::default()
        }
    }

    /// Queues a one-shot result for the next apply of `stack`.
    pub fn script(&self, stack: impl Into<String>, result: Result<ApplyOutcome, DriverError>) {
        self.scripted.lock().entry(stack.into()).or_default().push_back(result);
    }

    /// Makes every apply of `stack` fail until [`MockDriver::clear_failure`].
    pub fn fail(&self, stack: impl Into<String>, code: impl Into<String>) {
        let stack = stack.into();
        let error = DriverError::new(code, format!("mock failure for {stack}"));
        self.failures.lock().insert(stack, error);
    }

    /// Clears a configured failure.
    pub fn clear_failure(&self, stack: &str) {
        self.failures.lock().remove(stack);
    }

    /// Overrides the outputs reported for `stack`.
    pub fn set_outputs(&self, stack: impl Into<String>, outputs: BTreeMap<String, String>) {
        self.outputs.lock().insert(stack.into(), outputs);
    }

    /// Returns the stacks applied, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(stack, _)| stack.clone()).collect()
    }

    /// Returns the number of applies of `stack`.
    #[must_use]
    pub fn call_count(&self, stack: &str) -> usize {
        self.calls.lock().iter().filter(|(s, _)| s == stack).count()
    }

    /// Returns the inputs of the most recent apply of `stack`.
    #[must_use]
    pub fn last_inputs(&self, stack: &str) -> Option<ResolvedInputs> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|(s, _)| s == stack)
            .map(|(_, inputs)| inputs.clone())
    }

    /// Resets call tracking.
    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl StackDriver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn parallel_safe(&self) -> bool {
        self.parallel_safe
    }

    async fn apply(
        &self,
        descriptor: &StackDescriptor,
        inputs: &ResolvedInputs,
    ) -> Result<ApplyOutcome, DriverError> {
        let name = descriptor.name.clone();
        self.calls.lock().push((name.clone(), inputs.clone()));

        if let Some(result) = self.scripted.lock().get_mut(&name).and_then(VecDeque::pop_front) {
            return result;
        }
        if let Some(error) = self.failures.lock().get(&name).cloned() {
            return Err(error);
        }

        let outputs = self
            .outputs
            .lock()
            .get(&name)
            .cloned()
            .unwrap_or_else(|| declared_outputs(descriptor));

        let mut applied = self.applied.lock();
        if applied.get(&name) == Some(inputs) {
            Ok(ApplyOutcome::NoOp { outputs })
        } else {
            applied.insert(name, inputs.clone());
            Ok(ApplyOutcome::Changed { outputs })
        }
    }
}

/// A driver whose every apply fails with the same code.
#[derive(Debug)]
pub struct FailingDriver {
    code: String,
    calls: AtomicUsize,
}

impl FailingDriver {
    /// Creates a failing driver.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of applies attempted.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StackDriver for FailingDriver {
    fn name(&self) -> &str {
        "failing"
    }

    async fn apply(
        &self,
        descriptor: &StackDescriptor,
        _inputs: &ResolvedInputs,
    ) -> Result<ApplyOutcome, DriverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DriverError::new(
            self.code.clone(),
            format!("stack '{}' always fails", descriptor.name),
        ))
    }
}

/// A driver that takes a fixed time per apply and tracks concurrency.
#[derive(Debug)]
pub struct SlowDriver {
    delay: Duration,
    parallel_safe: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowDriver {
    /// Creates a sequential slow driver.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            parallel_safe: false,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Allows concurrent applies.
    #[must_use]
    pub fn parallel(mut self) -> Self {
        self.parallel_safe = true;
        self
    }

    /// Returns the number of applies started.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the highest number of applies seen running at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StackDriver for SlowDriver {
    fn name(&self) -> &str {
        "slow"
    }

    fn parallel_safe(&self) -> bool {
        self.parallel_safe
    }

    async fn apply(
        &self,
        descriptor: &StackDescriptor,
        _inputs: &ResolvedInputs,
    ) -> Result<ApplyOutcome, DriverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(ApplyOutcome::Changed {
            outputs: declared_outputs(descriptor),
        })
    }
}
