//! Deletion execution with retry on transient dependency errors
//!
//! One generic executor drives every task, parameterized by the client's
//! error classification. Dependency violations and throttling are retried
//! with exponential backoff up to a configured attempt bound; not-found
//! answers resolve the task as skipped (already deleted); permission and
//! validation errors fail the task immediately.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vpc_sweep_common::defaults::{
    DEFAULT_INITIAL_BACKOFF_SECS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_SECS,
};

use crate::client::ResourceClient;
use crate::resource::{DeletionTask, TaskState};

/// Retry configuration for transient delete failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum delete attempts per task (including the first)
    pub max_attempts: u32,
    /// Initial delay before the first retry
    pub initial_delay: Duration,
    /// Cap for exponential delay growth
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_secs(DEFAULT_INITIAL_BACKOFF_SECS),
            max_delay: Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS),
        }
    }
}

/// Drive one task to a terminal state.
///
/// Issues exactly one mutating client call per attempt. The cancellation
/// token is observed before the first attempt and during every backoff
/// sleep; an in-flight provider call is never aborted mid-call.
pub async fn execute(
    client: &dyn ResourceClient,
    task: &mut DeletionTask,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) {
    if cancel.is_cancelled() {
        task.state = TaskState::Skipped {
            reason: "cancelled".to_string(),
        };
        return;
    }

    let backoff = ExponentialBuilder::default()
        .with_min_delay(policy.initial_delay)
        .with_max_delay(policy.max_delay)
        .with_factor(2.0)
        .with_jitter()
        .build();
    let mut delays = backoff.into_iter();

    loop {
        task.state = TaskState::InFlight;
        task.attempt_count += 1;

        match client.delete(&task.step.record, task.step.action).await {
            Ok(()) => {
                info!(
                    step = %task.step.describe(),
                    account = %task.step.record.account,
                    region = %task.step.record.region,
                    attempts = task.attempt_count,
                    "Completed"
                );
                task.state = TaskState::Succeeded;
                return;
            }
            Err(e) if e.is_not_found() => {
                debug!(step = %task.step.describe(), "Already gone, skipping");
                task.state = TaskState::Skipped {
                    reason: "not found".to_string(),
                };
                return;
            }
            Err(e) if e.is_retryable() => {
                task.last_error = Some(e.to_string());
                if task.attempt_count >= policy.max_attempts {
                    warn!(
                        step = %task.step.describe(),
                        attempts = task.attempt_count,
                        error = %e,
                        "Retries exhausted"
                    );
                    task.state = TaskState::Failed {
                        error: e.to_string(),
                    };
                    return;
                }

                let delay = delays.next().unwrap_or(policy.max_delay);
                debug!(
                    step = %task.step.describe(),
                    attempt = task.attempt_count,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        task.state = TaskState::Failed {
                            error: format!(
                                "cancelled after {} attempts; last error: {e}",
                                task.attempt_count
                            ),
                        };
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(step = %task.step.describe(), error = %e, "Failed");
                task.last_error = Some(e.to_string());
                task.state = TaskState::Failed {
                    error: e.to_string(),
                };
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiError;
    use crate::resource::{DeletionStep, RawResource, ResourceRecord, StepAction};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex;
    use vpc_sweep_common::ResourceKind;

    /// Client whose delete calls pop scripted responses.
    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<(), ApiError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<(), ApiError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ResourceClient for ScriptedClient {
        async fn list(&self, _kind: ResourceKind) -> Result<Vec<RawResource>, ApiError> {
            Ok(Vec::new())
        }

        async fn delete(
            &self,
            _record: &ResourceRecord,
            _action: StepAction,
        ) -> Result<(), ApiError> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()))
        }
    }

    fn task(kind: ResourceKind, id: &str) -> DeletionTask {
        let record = Arc::new(ResourceRecord::from_raw(
            RawResource::new(kind, id),
            "prod",
            "us-east-2",
            false,
        ));
        DeletionTask::new(DeletionStep::new(record, StepAction::Delete))
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let client = ScriptedClient::new(vec![Ok(())]);
        let mut t = task(ResourceKind::Subnet, "subnet-1");
        execute(&client, &mut t, &fast_policy(5), &CancellationToken::new()).await;
        assert_eq!(t.state, TaskState::Succeeded);
        assert_eq!(t.attempt_count, 1);
    }

    #[tokio::test]
    async fn not_found_resolves_to_skipped() {
        let client = ScriptedClient::new(vec![Err(ApiError::NotFound("gone".into()))]);
        let mut t = task(ResourceKind::Subnet, "subnet-1");
        execute(&client, &mut t, &fast_policy(5), &CancellationToken::new()).await;
        assert_eq!(
            t.state,
            TaskState::Skipped {
                reason: "not found".into()
            }
        );
        assert_eq!(t.attempt_count, 1);
    }

    #[tokio::test]
    async fn dependency_violation_retries_until_exact_bound() {
        let client = ScriptedClient::new(vec![
            Err(ApiError::DependencyViolation("in use".into()));
            10
        ]);
        let mut t = task(ResourceKind::SecurityGroup, "sg-1");
        execute(&client, &mut t, &fast_policy(5), &CancellationToken::new()).await;
        assert!(t.state.is_failed());
        // Exactly the configured bound, never fewer, never more.
        assert_eq!(t.attempt_count, 5);
        assert_eq!(client.calls(), 5);
    }

    #[tokio::test]
    async fn transient_error_then_success() {
        let client = ScriptedClient::new(vec![
            Err(ApiError::DependencyViolation("eni attached".into())),
            Err(ApiError::Throttled("slow down".into())),
            Ok(()),
        ]);
        let mut t = task(ResourceKind::SecurityGroup, "sg-1");
        execute(&client, &mut t, &fast_policy(5), &CancellationToken::new()).await;
        assert_eq!(t.state, TaskState::Succeeded);
        assert_eq!(t.attempt_count, 3);
        assert!(t.last_error.is_some());
    }

    #[tokio::test]
    async fn permission_denied_fails_without_retry() {
        let client = ScriptedClient::new(vec![Err(ApiError::PermissionDenied("nope".into()))]);
        let mut t = task(ResourceKind::Vpc, "vpc-1");
        execute(&client, &mut t, &fast_policy(5), &CancellationToken::new()).await;
        assert!(t.state.is_failed());
        assert_eq!(t.attempt_count, 1);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn validation_error_fails_without_retry() {
        let client = ScriptedClient::new(vec![Err(ApiError::Validation("bad id".into()))]);
        let mut t = task(ResourceKind::Vpc, "vpc-1");
        execute(&client, &mut t, &fast_policy(5), &CancellationToken::new()).await;
        assert!(t.state.is_failed());
        assert_eq!(t.attempt_count, 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_calls_the_client() {
        let client = ScriptedClient::new(vec![Ok(())]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut t = task(ResourceKind::Subnet, "subnet-1");
        execute(&client, &mut t, &fast_policy(5), &cancel).await;
        assert_eq!(
            t.state,
            TaskState::Skipped {
                reason: "cancelled".into()
            }
        );
        assert_eq!(client.calls(), 0);
    }
}
