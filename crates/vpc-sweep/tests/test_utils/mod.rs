//! Shared test utilities for integration tests
//!
//! An in-memory network that stands in for the EC2-backed client: a
//! static inventory, a set of deleted ids, an execution log, and
//! injectable failures per resource id or kind.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use vpc_sweep::client::{ApiError, ClientFactory, ResourceClient};
use vpc_sweep::config::Scope;
use vpc_sweep::resource::{RawResource, ResourceRecord, StepAction};
use vpc_sweep_common::ResourceKind;

/// One recorded mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub kind: ResourceKind,
    pub id: String,
    pub action: StepAction,
}

/// In-memory network shared by every client the factory hands out.
#[derive(Default)]
pub struct MockNetwork {
    inventory: Mutex<Vec<RawResource>>,
    deleted: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
    fail_delete: Mutex<HashMap<String, ApiError>>,
    fail_list: Mutex<HashSet<ResourceKind>>,
}

impl MockNetwork {
    pub fn new(inventory: Vec<RawResource>) -> Arc<Self> {
        Arc::new(Self {
            inventory: Mutex::new(inventory),
            ..Default::default()
        })
    }

    /// Make every delete attempt against `id` fail with `error`.
    pub fn fail_delete(&self, id: &str, error: ApiError) {
        self.fail_delete
            .lock()
            .unwrap()
            .insert(id.to_string(), error);
    }

    /// Make listing `kind` fail.
    pub fn fail_list(&self, kind: ResourceKind) {
        self.fail_list.lock().unwrap().insert(kind);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn deleted_ids(&self) -> HashSet<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Index of the first call matching the predicate, if any.
    pub fn call_index(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(pred)
    }
}

pub struct MockClient {
    network: Arc<MockNetwork>,
}

#[async_trait]
impl ResourceClient for MockClient {
    async fn list(&self, kind: ResourceKind) -> Result<Vec<RawResource>, ApiError> {
        if self.network.fail_list.lock().unwrap().contains(&kind) {
            return Err(ApiError::Other(format!("listing {kind} is broken")));
        }
        Ok(self
            .network
            .inventory
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect())
    }

    async fn delete(&self, record: &ResourceRecord, action: StepAction) -> Result<(), ApiError> {
        self.network.calls.lock().unwrap().push(Call {
            kind: record.kind,
            id: record.id.clone(),
            action,
        });

        if let Some(error) = self.network.fail_delete.lock().unwrap().get(&record.id) {
            return Err(error.clone());
        }

        match action {
            StepAction::Delete => {
                let mut deleted = self.network.deleted.lock().unwrap();
                if deleted.contains(&record.id) {
                    return Err(ApiError::NotFound(format!("{} is gone", record.id)));
                }
                deleted.insert(record.id.clone());
                Ok(())
            }
            StepAction::Detach | StepAction::StripRules => Ok(()),
        }
    }
}

/// Hands every scope a client over the same shared network.
pub struct MockFactory {
    pub network: Arc<MockNetwork>,
}

#[async_trait]
impl ClientFactory for MockFactory {
    async fn client_for(&self, _scope: &Scope) -> anyhow::Result<Arc<dyn ResourceClient>> {
        Ok(Arc::new(MockClient {
            network: self.network.clone(),
        }))
    }
}

pub fn test_scope() -> Scope {
    Scope {
        account: "prod".to_string(),
        account_id: "111111111111".to_string(),
        profile: None,
        region: "us-east-2".to_string(),
    }
}
