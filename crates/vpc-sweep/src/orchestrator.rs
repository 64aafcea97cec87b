//! Cleanup orchestration across accounts and regions
//!
//! The orchestrator owns the run: it fans out over (account, region)
//! scopes with a bounded worker pool, and within each scope runs
//! discovery, classification, planning, and batch execution. Scopes share
//! no resources, so they are safe to process in parallel; batches within
//! one scope execute strictly in sequence, which is the ordering
//! guarantee the dependency graph relies on.
//!
//! Run state is owned exclusively by the orchestrator while the run is in
//! progress and becomes an immutable [`CleanupRun`] at the end; the
//! report builder only ever sees a completed run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vpc_sweep_common::ResourceKind;
use vpc_sweep_common::defaults::{DEFAULT_SCOPE_WORKERS, DEFAULT_TASK_WORKERS};

use crate::classify::{self, Classification};
use crate::client::ClientFactory;
use crate::config::Scope;
use crate::executor::{self, RetryPolicy};
use crate::graph;
use crate::resource::{DeletionTask, ResourceRecord, TaskState};

/// Whether a run mutates anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Discovery and classification only; every task is synthesized as
    /// skipped without touching the executor.
    DryRun,
    /// Execute deletions.
    Live,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::DryRun => "dry-run",
            RunMode::Live => "live",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for one cleanup run.
#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub mode: RunMode,
    pub retry: RetryPolicy,
    /// Scopes processed concurrently
    pub scope_workers: usize,
    /// Tasks in flight per scope within one batch
    pub task_workers: usize,
}

impl SweepOptions {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            retry: RetryPolicy::default(),
            scope_workers: DEFAULT_SCOPE_WORKERS,
            task_workers: DEFAULT_TASK_WORKERS,
        }
    }
}

impl Default for SweepOptions {
    /// Dry-run by default; mutation is always an explicit choice.
    fn default() -> Self {
        Self::new(RunMode::DryRun)
    }
}

/// A discovery failure recorded against a scope.
///
/// `kind = None` marks a scope-level failure (client construction or
/// identity validation); otherwise one resource kind could not be listed
/// and its contribution to the report is unknown.
#[derive(Debug, Clone)]
pub struct DiscoveryError {
    pub kind: Option<ResourceKind>,
    pub message: String,
}

/// Everything that happened in one (account, region).
#[derive(Debug)]
pub struct ScopeOutcome {
    pub scope: Scope,
    pub protected: Vec<ResourceRecord>,
    pub classification_errors: u32,
    pub discovery_errors: Vec<DiscoveryError>,
    pub tasks: Vec<DeletionTask>,
}

impl ScopeOutcome {
    fn new(scope: Scope) -> Self {
        Self {
            scope,
            protected: Vec::new(),
            classification_errors: 0,
            discovery_errors: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.state.is_failed()).count()
    }
}

/// The completed, immutable record of one run.
#[derive(Debug)]
pub struct CleanupRun {
    pub run_id: String,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scopes: Vec<ScopeOutcome>,
}

impl CleanupRun {
    pub fn failed_count(&self) -> usize {
        self.scopes.iter().map(ScopeOutcome::failed_count).sum()
    }

    /// Number of eligible resources across the run (one delete task per
    /// eligible resource; detach and rule-strip steps are not counted).
    pub fn eligible_count(&self) -> usize {
        self.scopes
            .iter()
            .flat_map(|s| s.tasks.iter())
            .filter(|t| t.step.action.is_delete())
            .count()
    }

    pub fn has_discovery_errors(&self) -> bool {
        self.scopes.iter().any(|s| !s.discovery_errors.is_empty())
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Drives cleanup runs against clients produced by a [`ClientFactory`].
pub struct Orchestrator {
    factory: Arc<dyn ClientFactory>,
    options: SweepOptions,
}

impl Orchestrator {
    pub fn new(factory: Arc<dyn ClientFactory>, options: SweepOptions) -> Self {
        Self { factory, options }
    }

    /// Run cleanup over the given scopes.
    ///
    /// Scope failures never abort the run; each scope's outcome, healthy
    /// or not, lands in the returned [`CleanupRun`].
    pub async fn run(&self, scopes: Vec<Scope>, cancel: CancellationToken) -> CleanupRun {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            run_id = %run_id,
            mode = %self.options.mode,
            scopes = scopes.len(),
            "Starting cleanup run"
        );

        let pool = Arc::new(Semaphore::new(self.options.scope_workers.max(1)));
        let mut handles = Vec::with_capacity(scopes.len());
        for scope in scopes {
            let factory = self.factory.clone();
            let options = self.options.clone();
            let cancel = cancel.clone();
            let pool = pool.clone();
            let handle_scope = scope.clone();
            let handle = tokio::spawn(async move {
                let _permit = pool.acquire_owned().await.expect("scope pool closed");
                run_scope(factory, options, scope, cancel).await
            });
            handles.push((handle_scope, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (scope, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(scope = %scope, error = ?e, "Scope worker panicked");
                    let mut outcome = ScopeOutcome::new(scope);
                    outcome.discovery_errors.push(DiscoveryError {
                        kind: None,
                        message: format!("scope worker panicked: {e}"),
                    });
                    outcomes.push(outcome);
                }
            }
        }

        let run = CleanupRun {
            run_id,
            mode: self.options.mode,
            started_at,
            finished_at: Utc::now(),
            scopes: outcomes,
        };
        info!(
            run_id = %run.run_id,
            eligible = run.eligible_count(),
            failed = run.failed_count(),
            "Cleanup run finished"
        );
        run
    }
}

/// Process one scope: discover, classify, plan, execute.
async fn run_scope(
    factory: Arc<dyn ClientFactory>,
    options: SweepOptions,
    scope: Scope,
    cancel: CancellationToken,
) -> ScopeOutcome {
    let mut outcome = ScopeOutcome::new(scope.clone());
    info!(scope = %scope, "Processing scope");

    let client = match factory.client_for(&scope).await {
        Ok(client) => client,
        Err(e) => {
            warn!(scope = %scope, error = ?e, "Cannot build resource client for scope");
            outcome.discovery_errors.push(DiscoveryError {
                kind: None,
                message: format!("{e:#}"),
            });
            return outcome;
        }
    };

    // Discovery and classification. A kind that cannot be listed is
    // recorded and the remaining kinds still proceed.
    let mut eligible: Vec<ResourceRecord> = Vec::new();
    for kind in ResourceKind::ALL {
        if cancel.is_cancelled() {
            info!(scope = %scope, "Cancelled during discovery");
            return outcome;
        }
        match client.list(kind).await {
            Ok(raws) => {
                debug!(scope = %scope, kind = %kind, count = raws.len(), "Listed resources");
                for raw in raws {
                    match classify::classify(&raw) {
                        Ok(Classification::Eligible) => {
                            eligible.push(ResourceRecord::from_raw(
                                raw,
                                &scope.account,
                                &scope.region,
                                false,
                            ));
                        }
                        Ok(Classification::Protected { reason }) => {
                            debug!(kind = %kind, id = %raw.id, reason, "Protected, excluded");
                            outcome.protected.push(ResourceRecord::from_raw(
                                raw,
                                &scope.account,
                                &scope.region,
                                true,
                            ));
                        }
                        Err(e) => {
                            warn!(
                                scope = %scope,
                                error = %e,
                                "Classification failed, treating resource as protected"
                            );
                            outcome.classification_errors += 1;
                            outcome.protected.push(ResourceRecord::from_raw(
                                raw,
                                &scope.account,
                                &scope.region,
                                true,
                            ));
                        }
                    }
                }
            }
            Err(e) => {
                warn!(scope = %scope, kind = %kind, error = %e, "Discovery failed for kind");
                outcome.discovery_errors.push(DiscoveryError {
                    kind: Some(kind),
                    message: e.to_string(),
                });
            }
        }
    }

    let task_batches: Vec<Vec<DeletionTask>> = graph::order(eligible)
        .into_iter()
        .map(|batch| batch.into_iter().map(DeletionTask::new).collect())
        .collect();
    let total: usize = task_batches.iter().map(Vec::len).sum();
    info!(
        scope = %scope,
        batches = task_batches.len(),
        steps = total,
        protected = outcome.protected.len(),
        "Deletion plan ready"
    );

    match options.mode {
        RunMode::DryRun => {
            for mut batch in task_batches {
                for task in &mut batch {
                    info!(scope = %scope, step = %task.step.describe(), "[DRY RUN] Would execute");
                    task.state = TaskState::Skipped {
                        reason: "dry-run".to_string(),
                    };
                }
                outcome.tasks.extend(batch);
            }
        }
        RunMode::Live => {
            let limit = Arc::new(Semaphore::new(options.task_workers.max(1)));
            let mut aborted = false;
            for batch in task_batches {
                // Cancellation is observed before starting any new batch;
                // in-flight calls from earlier batches have already drained.
                if aborted || cancel.is_cancelled() {
                    aborted = true;
                    for mut task in batch {
                        task.state = TaskState::Skipped {
                            reason: "cancelled".to_string(),
                        };
                        outcome.tasks.push(task);
                    }
                    continue;
                }

                let attempts = batch.into_iter().map(|mut task| {
                    let client = client.clone();
                    let limit = limit.clone();
                    let cancel = cancel.clone();
                    let retry = options.retry.clone();
                    async move {
                        let _permit = limit.acquire_owned().await.expect("task pool closed");
                        executor::execute(client.as_ref(), &mut task, &retry, &cancel).await;
                        task
                    }
                });
                // Every task in the batch reaches a terminal state before
                // the next batch starts.
                outcome.tasks.extend(futures::future::join_all(attempts).await);
            }
        }
    }

    outcome
}
