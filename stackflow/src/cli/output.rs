//! Output formatting for command results
//!
//! Every command result renders either as pretty JSON (machine-readable) or
//! as aligned plain text for terminals.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;
use uuid::Uuid;

use crate::core::{OutputRecord, RunOutcome, SkipReason, StackStatus};
use crate::errors::StackflowError;
use crate::orchestrator::{DeploymentPlan, DeploymentRun, StackRunEntry};

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// Human-readable formatted text
    Human,
}

/// Result of unlocking one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlockResult {
    /// Stack name.
    pub stack: String,
    /// True if a lease existed and was removed.
    pub released: bool,
    /// Run that held the lease, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
}

/// One line of `stackflow runs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Run id.
    pub run_id: Uuid,
    /// Overall outcome.
    pub outcome: RunOutcome,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Stacks the run selected.
    pub stacks: usize,
    /// Stacks that failed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

impl From<&DeploymentRun> for RunSummary {
    fn from(run: &DeploymentRun) -> Self {
        Self {
            run_id: run.run_id,
            outcome: run.outcome,
            started_at: run.started_at,
            stacks: run
                .entries
                .iter()
                .filter(|e| e.skip_reason != Some(SkipReason::NotTargeted))
                .count(),
            failed: run
                .stacks_with_status(StackStatus::Failed)
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Output formatter for command results
#[derive(Debug, Clone, Copy)]
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    /// Creates a new output formatter with the specified format
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns the configured format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Formats a dry-run plan
    pub fn format_plan(&self, plan: &DeploymentPlan) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(plan, "plan"),
            OutputFormat::Human => Ok(format_plan_human(plan)),
        }
    }

    /// Formats a finished deployment run
    pub fn format_run(&self, run: &DeploymentRun) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(run, "deployment run"),
            OutputFormat::Human => Ok(format_run_human(run)),
        }
    }

    /// Formats registry records
    pub fn format_records(&self, records: &[OutputRecord]) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(&records, "output records"),
            OutputFormat::Human => Ok(format_records_human(records)),
        }
    }

    /// Formats unlock results
    pub fn format_unlock(&self, results: &[UnlockResult]) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(&results, "unlock results"),
            OutputFormat::Human => Ok(format_unlock_human(results)),
        }
    }

    /// Formats archived run summaries
    pub fn format_runs(&self, runs: &[RunSummary]) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(&runs, "run summaries"),
            OutputFormat::Human => Ok(format_runs_human(runs)),
        }
    }

    /// Formats a library error with its diagnostic code and fix hint
    pub fn format_error(&self, error: &StackflowError) -> String {
        match self.format {
            OutputFormat::Json => {
                let mut body = serde_json::json!({ "error": error.to_string() });
                if let Some(info) = error.error_info() {
                    body["details"] = info.to_json();
                }
                body.to_string()
            }
            OutputFormat::Human => {
                let mut out = format!("Error: {error}");
                if let Some(info) = error.error_info() {
                    let _ = write!(out, "\n  code: {}", info.code);
                    if let Some(ref hint) = info.fix_hint {
                        let _ = write!(out, "\n  hint: {hint}");
                    }
                }
                out
            }
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string_pretty(value).with_context(|| format!("Failed to serialize {what} to JSON"))
}

fn format_plan_human(plan: &DeploymentPlan) -> String {
    let mut out = String::new();
    let width = name_width(plan.waves.iter().flatten().map(|s| s.name.as_str()));

    for (idx, wave) in plan.waves.iter().enumerate() {
        let _ = writeln!(out, "Wave {}", idx + 1);
        for stack in wave {
            let marker = if stack.selected { "*" } else { " " };
            let _ = write!(out, "  {marker} {:width$}", stack.name);
            if !stack.depends_on.is_empty() {
                let _ = write!(out, "  <- {}", stack.depends_on.join(", "));
            }
            out.push('\n');
        }
    }

    let selected = plan.selected();
    let _ = write!(out, "{} of {} stacks selected", selected.len(), plan.waves.iter().map(Vec::len).sum::<usize>());
    out
}

fn entry_detail(entry: &StackRunEntry) -> String {
    match entry.status {
        StackStatus::Succeeded => {
            let kind = entry.apply_kind.map(|k| k.to_string()).unwrap_or_default();
            if entry.output_versions.is_empty() {
                kind
            } else {
                format!("{kind}, {} outputs written", entry.output_versions.len())
            }
        }
        StackStatus::Failed => entry
            .error
            .as_ref()
            .map(|e| format!("{}: {}", e.code, e.message))
            .unwrap_or_default(),
        StackStatus::Skipped => entry.skip_reason.map(|r| r.to_string()).unwrap_or_default(),
        StackStatus::Pending | StackStatus::Applying => String::new(),
    }
}

fn format_run_human(run: &DeploymentRun) -> String {
    let mut out = String::new();
    let width = name_width(run.entries.iter().map(|e| e.stack.as_str()));

    let _ = writeln!(out, "Run {} ({} driver, {})", run.run_id, run.driver, run.failure_mode);
    let mut wave = None;
    for entry in &run.entries {
        if wave != Some(entry.wave) {
            wave = Some(entry.wave);
            let _ = writeln!(out, "Wave {}", entry.wave + 1);
        }
        let _ = writeln!(
            out,
            "  {:width$}  {:9}  {}",
            entry.stack,
            entry.status.to_string(),
            entry_detail(entry)
        );
    }

    let _ = write!(out, "Outcome: {}", run.outcome);
    if let Some(duration) = run.duration() {
        let _ = write!(out, " in {:.1}s", duration.num_milliseconds() as f64 / 1000.0);
    }
    if let Some(ref fatal) = run.fatal_error {
        let _ = write!(out, "\nAborted: {}: {}", fatal.code, fatal.message);
    }
    if let Some(ref reason) = run.cancel_reason {
        let _ = write!(out, "\nCancelled: {reason}");
    }
    out
}

fn format_records_human(records: &[OutputRecord]) -> String {
    if records.is_empty() {
        return "No outputs recorded".to_string();
    }

    let width = records.iter().map(|r| r.address().len()).max().unwrap_or(0);
    records
        .iter()
        .map(|r| {
            format!(
                "{:width$}  v{:<3} {}  {}",
                r.address(),
                r.version,
                r.applied_at.format("%Y-%m-%d %H:%M:%S"),
                r.value
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_unlock_human(results: &[UnlockResult]) -> String {
    results
        .iter()
        .map(|r| match (r.released, r.holder.as_deref()) {
            (true, Some(holder)) => format!("{}: released lease held by run {holder}", r.stack),
            (true, None) => format!("{}: released", r.stack),
            (false, _) => format!("{}: not locked", r.stack),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_runs_human(runs: &[RunSummary]) -> String {
    if runs.is_empty() {
        return "No runs recorded".to_string();
    }

    runs.iter()
        .map(|r| {
            let mut line = format!(
                "{}  {}  {:15}  {} stacks",
                r.run_id,
                r.started_at.format("%Y-%m-%d %H:%M:%S"),
                r.outcome.to_string(),
                r.stacks
            );
            if !r.failed.is_empty() {
                let _ = write!(line, ", failed: {}", r.failed.join(", "));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn name_width<'a>(names: impl Iterator<Item = &'a str>) -> usize {
    names.map(str::len).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConfigurationError;
    use crate::orchestrator::{DeploymentPlan, FailureMode};
    use crate::testing::fixtures::scenario_a;

    #[test]
    fn test_plan_human_marks_selection() {
        let plan = DeploymentPlan::new(&scenario_a(), Some(&["network"][..])).unwrap();
        let text = OutputFormatter::new(OutputFormat::Human).format_plan(&plan).unwrap();

        assert!(text.starts_with("Wave 1\n"));
        assert!(text.contains("* network"));
        assert!(text.contains("  certificate"));
        assert!(text.contains("service      <- certificate, network"));
        assert!(text.ends_with("1 of 3 stacks selected"));
    }

    #[test]
    fn test_plan_json_is_parseable() {
        let plan = DeploymentPlan::new(&scenario_a(), None::<&[&str]>).unwrap();
        let text = OutputFormatter::new(OutputFormat::Json).format_plan(&plan).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["waves"][1][0]["name"], "service");
        assert_eq!(value["targets"], serde_json::Value::Null);
    }

    #[test]
    fn test_run_human_lists_every_stack() {
        let waves = scenario_a();
        let run = DeploymentRun::new(Uuid::nil(), waves.waves(), None, "mock", FailureMode::Halt);
        let text = OutputFormatter::new(OutputFormat::Human).format_run(&run).unwrap();

        assert!(text.contains("mock driver, halt"));
        for stack in ["certificate", "network", "service"] {
            assert!(text.contains(stack));
        }
        assert!(text.contains("Wave 2"));
    }

    #[test]
    fn test_records_human() {
        let records = vec![OutputRecord::new("network", "vpcId", "vpc-1", 3)];
        let text = OutputFormatter::new(OutputFormat::Human).format_records(&records).unwrap();

        assert!(text.starts_with("network.vpcId  v3"));
        assert!(text.ends_with("vpc-1"));
        assert_eq!(
            OutputFormatter::new(OutputFormat::Human).format_records(&[]).unwrap(),
            "No outputs recorded"
        );
    }

    #[test]
    fn test_error_json_carries_code() {
        let err: StackflowError = ConfigurationError::new("bad").into();
        let text = OutputFormatter::new(OutputFormat::Json).format_error(&err);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["error"], "bad");

        let cycle: StackflowError =
            crate::errors::CycleError::new(vec!["a".into(), "b".into()], vec!["a".into(), "b".into(), "a".into()]).into();
        let text = OutputFormatter::new(OutputFormat::Human).format_error(&cycle);
        assert!(text.contains("code: STACK-001-CYCLE"));
    }

    #[test]
    fn test_unlock_human() {
        let results = vec![
            UnlockResult {
                stack: "service".into(),
                released: true,
                holder: Some("run-1".into()),
            },
            UnlockResult {
                stack: "network".into(),
                released: false,
                holder: None,
            },
        ];
        let text = OutputFormatter::new(OutputFormat::Human).format_unlock(&results).unwrap();
        assert_eq!(text, "service: released lease held by run run-1\nnetwork: not locked");
    }

    #[test]
    fn test_runs_human_lists_failures() {
        let mut run = DeploymentRun::new(Uuid::nil(), scenario_a().waves(), None, "mock", FailureMode::Halt);
        run.mark_succeeded("network", crate::core::ApplyKind::Changed, std::collections::BTreeMap::new());
        run.mark_failed("certificate", crate::orchestrator::RunError::new("LimitExceeded", "quota"));
        run.mark_skipped("service", SkipReason::DependencyFailed);
        run.finish();

        let summary = RunSummary::from(&run);
        assert_eq!(summary.outcome, RunOutcome::PartialFailure);
        assert_eq!(summary.stacks, 3);

        let text = OutputFormatter::new(OutputFormat::Human).format_runs(&[summary]).unwrap();
        assert!(text.starts_with("00000000-0000-0000-0000-000000000000"));
        assert!(text.contains("partial_failure"));
        assert!(text.ends_with("3 stacks, failed: certificate"));
        assert_eq!(
            OutputFormatter::new(OutputFormat::Human).format_runs(&[]).unwrap(),
            "No runs recorded"
        );
    }
}
