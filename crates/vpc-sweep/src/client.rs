//! Narrow resource-client interface consumed by the core
//!
//! The orchestrator, executor, and graph builder never talk to a cloud
//! SDK directly; they consume this per-resource-type interface (list,
//! delete) and the error classification below. The AWS-backed
//! implementation lives in [`crate::aws`]; tests substitute an in-memory
//! mock.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use vpc_sweep_common::ResourceKind;

use crate::config::Scope;
use crate::resource::{RawResource, ResourceRecord, StepAction};

/// Client error categories the core depends on.
///
/// Providers map their own error shapes into these; the executor's retry
/// and skip decisions are driven entirely by this classification.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Resource no longer exists (benign during teardown)
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Resource still has dependent objects (transient, retried)
    #[error("resource has dependent objects: {0}")]
    DependencyViolation(String),

    /// Rate limit exceeded (transient, retried)
    #[error("rate limit exceeded: {0}")]
    Throttled(String),

    /// Credentials lack permission for the operation (fatal per task)
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The request itself was rejected as invalid (fatal per task)
    #[error("invalid request: {0}")]
    Validation(String),

    /// Anything else (fatal per task)
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Errors worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::DependencyViolation(_) | ApiError::Throttled(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// Per-resource-type operations against one (account, region).
///
/// `delete` performs exactly one mutating provider call per invocation;
/// idempotency at the task level comes from the provider answering
/// `NotFound` for already-deleted resources.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// List all resources of `kind` in the client's scope.
    async fn list(&self, kind: ResourceKind) -> Result<Vec<RawResource>, ApiError>;

    /// Apply `action` (detach, rule-strip, or delete) to one resource.
    async fn delete(&self, record: &ResourceRecord, action: StepAction) -> Result<(), ApiError>;
}

/// Builds a [`ResourceClient`] for each scope the orchestrator visits.
///
/// The AWS factory resolves credentials per account profile and validates
/// the caller identity; test factories hand out in-memory fakes.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn client_for(&self, scope: &Scope) -> anyhow::Result<Arc<dyn ResourceClient>>;
}
