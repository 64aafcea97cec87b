//! Resource records and deletion task types
//!
//! A [`RawResource`] is what the client's list operation returns for one
//! provider object. The orchestrator stamps it with its scope and the
//! classifier's verdict to produce an immutable [`ResourceRecord`], which
//! the graph builder expands into [`DeletionStep`]s and the executor
//! drives through the [`DeletionTask`] state machine.

use std::collections::HashMap;
use std::sync::Arc;

use vpc_sweep_common::ResourceKind;

/// Well-known attribute keys populated by the resource client's listers.
///
/// The classifier and the deletion steps key off these; a lister that
/// cannot populate a required key for its kind produces a record that
/// fails classification closed (treated as protected).
pub mod attr {
    /// "true" when the provider marks the resource as the account default
    /// (VPCs, network ACLs)
    pub const IS_DEFAULT: &str = "is_default";

    /// Security group name ("default" groups are protected)
    pub const GROUP_NAME: &str = "group_name";

    /// "true" when a DHCP option set is the one the region's default VPC
    /// is currently associated with
    pub const REGION_DEFAULT: &str = "region_default";

    /// VPC the resource is attached to (needed for detach operations)
    pub const VPC_ID: &str = "vpc_id";

    /// Human-readable name tag, when present (logging only)
    pub const NAME: &str = "name";
}

/// A related resource reference discovered alongside a record.
///
/// Covers route-table associations (where `main` marks the VPC's main
/// table) and security-group rule references to other groups
/// (`main = false`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub id: String,
    pub main: bool,
}

impl Association {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            main: false,
        }
    }

    pub fn main(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            main: true,
        }
    }
}

/// One provider object as returned by a list operation, before
/// classification.
#[derive(Debug, Clone)]
pub struct RawResource {
    pub kind: ResourceKind,
    pub id: String,
    pub attrs: HashMap<String, String>,
    pub associations: Vec<Association>,
}

impl RawResource {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            attrs: HashMap::new(),
            associations: Vec::new(),
        }
    }

    /// Builder-style attribute setter, used heavily by listers and tests.
    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn with_association(mut self, assoc: Association) -> Self {
        self.associations.push(assoc);
        self
    }
}

/// An immutable discovered resource within one cleanup pass.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub id: String,
    pub account: String,
    pub region: String,
    pub attrs: HashMap<String, String>,
    /// Derived by the classifier; a record with `is_default = true` never
    /// appears in any deletion task.
    pub is_default: bool,
    pub associations: Vec<Association>,
}

impl ResourceRecord {
    pub fn from_raw(raw: RawResource, account: &str, region: &str, is_default: bool) -> Self {
        Self {
            kind: raw.kind,
            id: raw.id,
            account: account.to_string(),
            region: region.to_string(),
            attrs: raw.attrs,
            is_default,
            associations: raw.associations,
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }
}

/// The operation a deletion step performs against its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepAction {
    /// Detach the resource from its VPC (internet and VPN gateways)
    Detach,
    /// Clear a security group's ingress/egress rule sets without deleting
    /// the group (cycle breaking)
    StripRules,
    /// Delete (or release) the resource
    Delete,
}

impl StepAction {
    pub fn as_str(self) -> &'static str {
        match self {
            StepAction::Detach => "detach",
            StepAction::StripRules => "strip-rules",
            StepAction::Delete => "delete",
        }
    }

    /// Only the final delete marks the resource gone; detach and
    /// rule-strip are preparatory.
    pub fn is_delete(self) -> bool {
        matches!(self, StepAction::Delete)
    }
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work emitted by the graph builder.
#[derive(Debug, Clone)]
pub struct DeletionStep {
    pub record: Arc<ResourceRecord>,
    pub action: StepAction,
}

impl DeletionStep {
    pub fn new(record: Arc<ResourceRecord>, action: StepAction) -> Self {
        Self { record, action }
    }

    /// Short description for logs: `delete subnet subnet-0abc`.
    pub fn describe(&self) -> String {
        format!("{} {} {}", self.action, self.record.kind, self.record.id)
    }
}

/// Terminal and intermediate states of a deletion task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    InFlight,
    Succeeded,
    Failed { error: String },
    Skipped { reason: String },
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed { .. } | TaskState::Skipped { .. }
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TaskState::Failed { .. })
    }
}

/// A deletion step plus its execution state.
///
/// Created during ordering, mutated only by the executor, terminal on
/// Succeeded/Failed/Skipped.
#[derive(Debug, Clone)]
pub struct DeletionTask {
    pub step: DeletionStep,
    pub state: TaskState,
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

impl DeletionTask {
    pub fn new(step: DeletionStep) -> Self {
        Self {
            step,
            state: TaskState::Pending,
            attempt_count: 0,
            last_error: None,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.step.record.kind
    }

    pub fn resource_id(&self) -> &str {
        &self.step.record.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_resource_builder() {
        let raw = RawResource::new(ResourceKind::Vpc, "vpc-1")
            .with_attr(attr::IS_DEFAULT, "false")
            .with_association(Association::main("rtbassoc-1"));
        assert_eq!(raw.attrs.get(attr::IS_DEFAULT).unwrap(), "false");
        assert!(raw.associations[0].main);
    }

    #[test]
    fn task_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::InFlight.is_terminal());
        assert!(TaskState::Succeeded.is_terminal());
        assert!(
            TaskState::Failed {
                error: "boom".into()
            }
            .is_failed()
        );
        assert!(
            TaskState::Skipped {
                reason: "dry-run".into()
            }
            .is_terminal()
        );
    }

    #[test]
    fn step_describe() {
        let record = Arc::new(ResourceRecord::from_raw(
            RawResource::new(ResourceKind::Subnet, "subnet-1"),
            "prod",
            "us-east-2",
            false,
        ));
        let step = DeletionStep::new(record, StepAction::Delete);
        assert_eq!(step.describe(), "delete subnet subnet-1");
    }
}
