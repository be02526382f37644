//! The deploy loop.

use super::{
    DeploymentPlan, DeploymentRun, FailureCollector, FailureRecord, LeaseGuard, Orchestrator, RunError,
};
use crate::cancellation::CancellationToken;
use crate::core::{ApplyKind, SkipReason};
use crate::driver::{ApplyOutcome, ResolvedInputs};
use crate::errors::{ContractViolationError, StackApplyError, StackflowError};
use crate::events::DeployEvent;
use crate::graph::OrderedWaves;
use crate::registry::OutputSnapshot;
use crate::stacks::StackDescriptor;
use crate::utils::generate_run_id;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What happened to one stack in a wave.
#[derive(Debug)]
enum StackAttempt {
    Applied {
        kind: ApplyKind,
        versions: BTreeMap<String, u64>,
    },
    Failed(StackApplyError),
    Fatal(StackflowError),
    Cancelled,
}

impl Orchestrator {
    /// Deploys `targets` (plus their upstream closure), or every stack.
    ///
    /// Configuration problems (unknown targets) and lease conflicts are
    /// returned as errors before any driver call. Everything that happens
    /// after the first apply is reported in the returned run.
    ///
    /// # Errors
    ///
    /// Returns [`StackflowError::Configuration`] for unknown targets and
    /// [`StackflowError::ConcurrentDeployment`] if another run holds an
    /// overlapping lease.
    pub async fn deploy<S: AsRef<str>>(
        &self,
        waves: &OrderedWaves,
        targets: Option<&[S]>,
    ) -> Result<DeploymentRun, StackflowError> {
        self.deploy_with_cancellation(waves, targets, &CancellationToken::new())
            .await
    }

    /// Like [`Orchestrator::deploy`], checking `cancellation` before each wave
    /// and each sequential apply. The token belongs to this run only.
    ///
    /// # Errors
    ///
    /// Same as [`Orchestrator::deploy`].
    pub async fn deploy_with_cancellation<S: AsRef<str>>(
        &self,
        waves: &OrderedWaves,
        targets: Option<&[S]>,
        cancellation: &CancellationToken,
    ) -> Result<DeploymentRun, StackflowError> {
        let plan = DeploymentPlan::new(waves, targets)?;
        let run_id = generate_run_id();
        let selected = plan.selected();

        let _leases = LeaseGuard::acquire(self.leases.clone(), run_id, selected.clone())?;

        let started = Instant::now();
        let mut run = DeploymentRun::new(
            run_id,
            waves.waves(),
            plan.targets.clone(),
            self.driver.name(),
            self.failure_mode,
        );
        info!(run_id = %run_id, stacks = selected.len(), driver = %self.driver.name(), "Starting deployment run");
        self.emit(DeployEvent::RunStarted {
            run_id,
            stacks: selected,
            waves: waves.wave_count(),
        })
        .await;

        for stack in plan.not_targeted() {
            self.skip(&mut run, &stack, SkipReason::NotTargeted).await;
        }

        let mut failures = FailureCollector::new(self.failure_mode);

        for wave in 0..waves.wave_count() {
            let pending = run.pending_in_wave(wave);
            if pending.is_empty() {
                continue;
            }

            if cancellation.is_cancelled() {
                info!(run_id = %run_id, wave = wave, "Run cancelled, skipping remaining stacks");
                self.skip_remaining(&mut run, |_| SkipReason::Cancelled).await;
                break;
            }
            if failures.should_halt() {
                info!(run_id = %run_id, wave = wave, "Run halted after failure");
                self.skip_remaining(&mut run, |stack| halt_reason(&failures, stack)).await;
                break;
            }

            let mut runnable = Vec::new();
            for stack in pending {
                if failures.is_blocked(&stack) {
                    self.skip(&mut run, &stack, SkipReason::DependencyFailed).await;
                } else {
                    runnable.push(stack);
                }
            }
            if runnable.is_empty() {
                continue;
            }

            self.emit(DeployEvent::WaveStarted {
                run_id,
                wave,
                stacks: runnable.clone(),
            })
            .await;

            let snapshot = self.registry.snapshot().await;
            for stack in &runnable {
                run.mark_applying(stack);
            }
            let attempts = self
                .apply_wave(run_id, waves, wave, &runnable, &snapshot, cancellation)
                .await;

            let (mut succeeded, mut failed) = (0, 0);
            for (stack, attempt) in attempts {
                match attempt {
                    StackAttempt::Applied { kind, versions } => {
                        succeeded += 1;
                        let outputs_written = versions.len();
                        run.mark_succeeded(&stack, kind, versions);
                        self.emit(DeployEvent::StackSucceeded {
                            run_id,
                            stack,
                            wave,
                            kind,
                            outputs_written,
                        })
                        .await;
                    }
                    StackAttempt::Failed(err) => {
                        failed += 1;
                        failures.record_failure(FailureRecord::new(&stack, &err.code), waves);
                        run.mark_failed(&stack, RunError::new(&err.code, &err.message));
                        self.emit(DeployEvent::StackFailed {
                            run_id,
                            stack,
                            wave,
                            code: err.code,
                            message: err.message,
                        })
                        .await;
                    }
                    StackAttempt::Fatal(err) => {
                        failed += 1;
                        let detail = RunError::from(&err);
                        error!(run_id = %run_id, stack = %stack, code = %detail.code, "Run aborted: {err}");
                        failures.record_failure(FailureRecord::new(&stack, &detail.code).fatal(), waves);
                        run.mark_failed(&stack, detail.clone());
                        run.fatal_error.get_or_insert_with(|| detail.clone());
                        self.emit(DeployEvent::StackFailed {
                            run_id,
                            stack,
                            wave,
                            code: detail.code,
                            message: detail.message,
                        })
                        .await;
                    }
                    StackAttempt::Cancelled => {
                        self.skip(&mut run, &stack, SkipReason::Cancelled).await;
                    }
                }
            }

            self.emit(DeployEvent::WaveCompleted {
                run_id,
                wave,
                succeeded,
                failed,
            })
            .await;
        }

        // A wave can end with a cancellation that arrived after its last stack started
        if cancellation.is_cancelled() {
            self.skip_remaining(&mut run, |_| SkipReason::Cancelled).await;
            run.cancel_reason = cancellation.reason();
        }

        run.finish();
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let failed: Vec<&str> = failures.failures().iter().map(|f| f.stack.as_str()).collect();
        info!(
            run_id = %run_id,
            outcome = %run.outcome,
            duration_ms = duration_ms,
            failed = ?failed,
            "Deployment run finished"
        );
        self.emit(DeployEvent::RunCompleted {
            run_id,
            outcome: run.outcome,
            duration_ms,
        })
        .await;

        if let Some(ref journal) = self.journal {
            match journal.archive(&run).await {
                Ok(path) => debug!(run_id = %run_id, path = %path.display(), "Archived run"),
                Err(e) => warn!(run_id = %run_id, error = %e, "Failed to archive run"),
            }
        }

        Ok(run)
    }

    /// Applies one wave, concurrently when the driver allows it.
    async fn apply_wave(
        &self,
        run_id: Uuid,
        waves: &OrderedWaves,
        wave: usize,
        stacks: &[String],
        snapshot: &OutputSnapshot,
        cancellation: &CancellationToken,
    ) -> Vec<(String, StackAttempt)> {
        let mut attempts = Vec::with_capacity(stacks.len());

        if self.driver.parallel_safe() && stacks.len() > 1 {
            let semaphore = Semaphore::new(self.max_concurrency);
            let mut tasks: FuturesUnordered<_> = stacks
                .iter()
                .map(|stack| {
                    let semaphore = &semaphore;
                    async move {
                        let _permit = semaphore.acquire().await.ok();
                        let attempt = self.apply_named(run_id, waves, wave, stack, snapshot, cancellation).await;
                        (stack.clone(), attempt)
                    }
                })
                .collect();

            while let Some(result) = tasks.next().await {
                attempts.push(result);
            }
            attempts.sort_by(|a, b| a.0.cmp(&b.0));
        } else {
            for stack in stacks {
                let attempt = self.apply_named(run_id, waves, wave, stack, snapshot, cancellation).await;
                attempts.push((stack.clone(), attempt));
            }
        }

        attempts
    }

    async fn apply_named(
        &self,
        run_id: Uuid,
        waves: &OrderedWaves,
        wave: usize,
        stack: &str,
        snapshot: &OutputSnapshot,
        cancellation: &CancellationToken,
    ) -> StackAttempt {
        if cancellation.is_cancelled() {
            return StackAttempt::Cancelled;
        }
        match waves.descriptor(stack) {
            Some(descriptor) => self.apply_stack(run_id, wave, descriptor, snapshot).await,
            None => StackAttempt::Fatal(StackflowError::Internal(format!(
                "stack '{stack}' is scheduled but has no descriptor"
            ))),
        }
    }

    /// Resolves inputs, calls the driver, checks the output contract and
    /// records outputs.
    async fn apply_stack(
        &self,
        run_id: Uuid,
        wave: usize,
        descriptor: &StackDescriptor,
        snapshot: &OutputSnapshot,
    ) -> StackAttempt {
        let name = descriptor.name.as_str();

        let inputs = match ResolvedInputs::resolve(descriptor, snapshot) {
            Ok(inputs) => inputs,
            Err(e) => return StackAttempt::Fatal(e.into()),
        };
        debug!(run_id = %run_id, stack = %name, inputs = ?inputs.inputs, "Resolved inputs");

        self.emit(DeployEvent::StackApplying {
            run_id,
            stack: name.to_string(),
            wave,
        })
        .await;

        let outcome = match self.driver.apply(descriptor, &inputs).await {
            Ok(outcome) => outcome,
            Err(e) => return StackAttempt::Failed(StackApplyError::new(name, e.code, e.message)),
        };
        let kind = outcome.kind();

        let outputs = match checked_outputs(descriptor, outcome, snapshot) {
            Ok(outputs) => outputs,
            Err(e) => return StackAttempt::Fatal(e.into()),
        };

        let to_write: BTreeMap<String, String> = match kind {
            ApplyKind::Changed => outputs,
            // Only write what the registry does not already hold
            ApplyKind::Noop => outputs
                .into_iter()
                .filter(|(key, value)| snapshot.get(name, key) != Some(value.as_str()))
                .collect(),
        };

        if to_write.is_empty() {
            return StackAttempt::Applied {
                kind,
                versions: BTreeMap::new(),
            };
        }

        match self.registry.put_all(name, &to_write, Some(run_id)).await {
            Ok(versions) => StackAttempt::Applied { kind, versions },
            Err(e) => StackAttempt::Fatal(e),
        }
    }

    async fn skip(&self, run: &mut DeploymentRun, stack: &str, reason: SkipReason) {
        run.mark_skipped(stack, reason);
        self.emit(DeployEvent::StackSkipped {
            run_id: run.run_id,
            stack: stack.to_string(),
            reason,
        })
        .await;
    }

    async fn skip_remaining(&self, run: &mut DeploymentRun, reason: impl Fn(&str) -> SkipReason) {
        for stack in run.pending() {
            let why = reason(&stack);
            self.skip(run, &stack, why).await;
        }
    }

    async fn emit(&self, event: DeployEvent) {
        self.events.emit(&event).await;
    }
}

fn halt_reason(failures: &FailureCollector, stack: &str) -> SkipReason {
    if failures.is_blocked(stack) {
        SkipReason::DependencyFailed
    } else {
        SkipReason::Halted
    }
}

/// Enforces the declared output contract: every declared key present,
/// undeclared keys dropped. A no-op fills keys the driver left out from the
/// registry snapshot.
fn checked_outputs(
    descriptor: &StackDescriptor,
    outcome: ApplyOutcome,
    snapshot: &OutputSnapshot,
) -> Result<BTreeMap<String, String>, ContractViolationError> {
    let kind = outcome.kind();
    let mut outputs = outcome.into_outputs();

    if kind == ApplyKind::Noop {
        for key in &descriptor.declared_outputs {
            if outputs.contains_key(key) {
                continue;
            }
            if let Some(value) = snapshot.get(&descriptor.name, key) {
                outputs.insert(key.clone(), value.to_string());
            }
        }
    }

    let missing: Vec<String> = descriptor
        .declared_outputs
        .iter()
        .filter(|key| !outputs.contains_key(*key))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ContractViolationError::new(&descriptor.name, missing));
    }

    let undeclared: Vec<&String> = outputs
        .keys()
        .filter(|key| !descriptor.declared_outputs.contains(*key))
        .collect();
    if !undeclared.is_empty() {
        warn!(stack = %descriptor.name, keys = ?undeclared, "Dropping undeclared outputs");
        outputs.retain(|key, _| descriptor.declared_outputs.contains(key));
    }

    Ok(outputs)
}
