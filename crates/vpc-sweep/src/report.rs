//! Run report assembly
//!
//! Pure aggregation over a completed [`CleanupRun`]: per-kind counts per
//! scope and in total, failed-task detail, and a machine-readable JSON
//! document. The human summary goes to stdout as a table; the structured
//! document is what automation should consume.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;
use tracing::info;
use vpc_sweep_common::ResourceKind;

use crate::orchestrator::{CleanupRun, RunMode, ScopeOutcome};
use crate::resource::TaskState;

/// Outcome counters for one resource kind.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct KindCounts {
    pub protected: u32,
    pub eligible: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl KindCounts {
    fn merge(&mut self, other: &KindCounts) {
        self.protected += other.protected;
        self.eligible += other.eligible;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Detail row for a task that ended in failure.
#[derive(Debug, Clone, Serialize)]
pub struct FailedTaskReport {
    pub account: String,
    pub region: String,
    pub kind: String,
    pub id: String,
    pub action: String,
    pub attempts: u32,
    pub error: String,
}

/// Aggregation for one (account, region).
#[derive(Debug, Clone, Serialize)]
pub struct ScopeReport {
    pub account: String,
    pub region: String,
    pub counts: BTreeMap<String, KindCounts>,
    /// Kinds whose discovery failed; their contribution is unknown rather
    /// than zero.
    pub unknown_kinds: Vec<String>,
    pub errors: Vec<String>,
    pub classification_errors: u32,
}

/// What the run amounted to, so operators can react without digging
/// through logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    NothingEligible,
    DryRun,
    Executed { failures: usize },
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::NothingEligible => write!(f, "nothing eligible found"),
            RunOutcome::DryRun => write!(f, "dry-run only, nothing executed"),
            RunOutcome::Executed { failures: 0 } => write!(f, "executed with no failures"),
            RunOutcome::Executed { failures } => write!(f, "executed with {failures} failures"),
        }
    }
}

/// The full structured report for one run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub run_id: String,
    pub mode: String,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
    pub totals: BTreeMap<String, KindCounts>,
    pub scopes: Vec<ScopeReport>,
    pub failed_tasks: Vec<FailedTaskReport>,
}

/// Build the report for a completed run.
pub fn build(run: &CleanupRun) -> Report {
    let mut totals: BTreeMap<String, KindCounts> = BTreeMap::new();
    let mut scopes = Vec::with_capacity(run.scopes.len());
    let mut failed_tasks = Vec::new();

    for outcome in &run.scopes {
        let scope_report = build_scope(outcome, &mut failed_tasks);
        for (kind, counts) in &scope_report.counts {
            totals.entry(kind.clone()).or_default().merge(counts);
        }
        scopes.push(scope_report);
    }

    let eligible_total: u32 = totals.values().map(|c| c.eligible).sum();
    let outcome = if eligible_total == 0 {
        RunOutcome::NothingEligible
    } else if run.mode == RunMode::DryRun {
        RunOutcome::DryRun
    } else {
        RunOutcome::Executed {
            failures: run.failed_count(),
        }
    };

    Report {
        run_id: run.run_id.clone(),
        mode: run.mode.as_str().to_string(),
        outcome,
        started_at: run.started_at,
        finished_at: run.finished_at,
        elapsed_seconds: run.elapsed().num_milliseconds() as f64 / 1000.0,
        totals,
        scopes,
        failed_tasks,
    }
}

fn build_scope(outcome: &ScopeOutcome, failed_tasks: &mut Vec<FailedTaskReport>) -> ScopeReport {
    let mut counts: BTreeMap<String, KindCounts> = BTreeMap::new();

    for record in &outcome.protected {
        counts
            .entry(record.kind.as_str().to_string())
            .or_default()
            .protected += 1;
    }

    for task in &outcome.tasks {
        if let TaskState::Failed { error } = &task.state {
            failed_tasks.push(FailedTaskReport {
                account: outcome.scope.account.clone(),
                region: outcome.scope.region.clone(),
                kind: task.kind().as_str().to_string(),
                id: task.resource_id().to_string(),
                action: task.step.action.as_str().to_string(),
                attempts: task.attempt_count,
                error: error.clone(),
            });
        }

        // Per-kind outcome counters track resources, so only the final
        // delete step of each resource contributes.
        if !task.step.action.is_delete() {
            continue;
        }
        let entry = counts.entry(task.kind().as_str().to_string()).or_default();
        entry.eligible += 1;
        match &task.state {
            TaskState::Succeeded => entry.succeeded += 1,
            TaskState::Failed { .. } => entry.failed += 1,
            TaskState::Skipped { .. } => entry.skipped += 1,
            TaskState::Pending | TaskState::InFlight => {}
        }
    }

    ScopeReport {
        account: outcome.scope.account.clone(),
        region: outcome.scope.region.clone(),
        counts,
        unknown_kinds: outcome
            .discovery_errors
            .iter()
            .filter_map(|e| e.kind.map(|k| k.as_str().to_string()))
            .collect(),
        errors: outcome
            .discovery_errors
            .iter()
            .map(|e| match e.kind {
                Some(kind) => format!("{kind}: {}", e.message),
                None => e.message.clone(),
            })
            .collect(),
        classification_errors: outcome.classification_errors,
    }
}

/// Write the report as pretty JSON.
pub fn write_json(report: &Report, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    info!(path = %path.display(), "Report written");
    Ok(())
}

/// Print the human-readable summary table.
pub fn print_summary(report: &Report) {
    println!("\n=== Cleanup Report ===");
    println!("Run:     {}", report.run_id);
    println!("Mode:    {}", report.mode);
    println!("Outcome: {}", report.outcome);
    println!("Elapsed: {:.1}s", report.elapsed_seconds);

    if !report.totals.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Kind"),
                Cell::new("Protected"),
                Cell::new("Eligible"),
                Cell::new("Succeeded"),
                Cell::new("Failed"),
                Cell::new("Skipped"),
            ]);

        // Present kinds in deletion order rather than alphabetically.
        for kind in ResourceKind::ALL {
            if let Some(counts) = report.totals.get(kind.as_str()) {
                table.add_row(vec![
                    Cell::new(kind.as_str()),
                    Cell::new(counts.protected),
                    Cell::new(counts.eligible),
                    Cell::new(counts.succeeded),
                    Cell::new(counts.failed),
                    Cell::new(counts.skipped),
                ]);
            }
        }
        println!("{table}");
    }

    for scope in &report.scopes {
        if !scope.errors.is_empty() {
            println!("\n{}/{}: incomplete discovery", scope.account, scope.region);
            for error in &scope.errors {
                println!("  - {error}");
            }
        }
        if scope.classification_errors > 0 {
            println!(
                "\n{}/{}: {} resources could not be classified (treated as protected)",
                scope.account, scope.region, scope.classification_errors
            );
        }
    }

    if !report.failed_tasks.is_empty() {
        println!("\nFailed tasks:");
        for task in &report.failed_tasks {
            println!(
                "  {}/{} {} {} {} after {} attempts: {}",
                task.account, task.region, task.action, task.kind, task.id, task.attempts,
                task.error
            );
        }
    }
}
