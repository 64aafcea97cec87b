//! Deletion-order planning
//!
//! Builds the ordered batch list for one scope: a topological layering of
//! the fixed kind-level dependency graph, refined with instance-level
//! ordering inside a kind (security groups referencing other groups) and
//! detach-then-delete expansion for gateway kinds.
//!
//! Batches execute strictly in sequence; steps within one batch share no
//! dependency edge and may run concurrently.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};
use vpc_sweep_common::ResourceKind;
use vpc_sweep_common::resource_kind::DEPENDENCY_EDGES;

use crate::resource::{DeletionStep, ResourceRecord, StepAction};

/// A set of steps safe to execute concurrently.
pub type Batch = Vec<DeletionStep>;

/// Topological layering of the fixed kind graph.
///
/// Kind K lands in a layer strictly after every kind with an edge into K
/// (longest-path layering under Kahn's algorithm). The edge set is
/// acyclic by construction, so every kind is placed.
pub fn kind_layers() -> Vec<Vec<ResourceKind>> {
    let mut in_degree: HashMap<ResourceKind, usize> =
        ResourceKind::ALL.iter().map(|k| (*k, 0)).collect();
    for (_, to) in DEPENDENCY_EDGES {
        *in_degree.get_mut(to).expect("edge references unknown kind") += 1;
    }

    let mut layer_of: HashMap<ResourceKind, usize> = HashMap::new();
    // Iterate ALL for deterministic order within a layer.
    let mut ready: Vec<ResourceKind> = ResourceKind::ALL
        .iter()
        .filter(|k| in_degree[*k] == 0)
        .copied()
        .collect();
    for kind in &ready {
        layer_of.insert(*kind, 0);
    }

    while let Some(kind) = ready.pop() {
        let layer = layer_of[&kind];
        for (from, to) in DEPENDENCY_EDGES {
            if *from == kind {
                let entry = layer_of.entry(*to).or_insert(0);
                *entry = (*entry).max(layer + 1);
                let d = in_degree.get_mut(to).expect("edge references unknown kind");
                *d -= 1;
                if *d == 0 {
                    ready.push(*to);
                }
            }
        }
    }

    let depth = layer_of.values().max().copied().unwrap_or(0);
    let mut layers = vec![Vec::new(); depth + 1];
    for kind in ResourceKind::ALL {
        layers[layer_of[&kind]].push(kind);
    }
    layers
}

/// Instance-level plan for the records of one kind within one layer.
struct KindPlan {
    /// Rule-strip steps for records entangled in a reference cycle.
    strip: Vec<Arc<ResourceRecord>>,
    /// Delete order levels for records with resolvable references.
    levels: Vec<Vec<Arc<ResourceRecord>>>,
    /// Deletes for the stripped records (safe once rules are gone).
    tail: Vec<Arc<ResourceRecord>>,
}

/// Order instances of one kind by their same-kind references.
///
/// An association from record A to record B of the same kind means A's
/// rules reference B, so A must be handled before B. Records left
/// unplaced by Kahn's algorithm are entangled in a reference cycle; their
/// rule sets are cleared first, which removes every edge they contribute
/// and makes their deletion order irrelevant.
fn plan_kind(records: Vec<Arc<ResourceRecord>>) -> KindPlan {
    let n = records.len();
    let index: HashMap<&str, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id.as_str(), i))
        .collect();

    let mut out_edges: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree: Vec<usize> = vec![0; n];
    for (i, record) in records.iter().enumerate() {
        let mut seen: HashSet<usize> = HashSet::new();
        for assoc in &record.associations {
            if let Some(&j) = index.get(assoc.id.as_str()) {
                if j != i && seen.insert(j) {
                    out_edges[i].push(j);
                    in_degree[j] += 1;
                }
            }
        }
    }

    let mut level = vec![0usize; n];
    let mut placed = vec![false; n];
    let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    while let Some(i) = ready.pop() {
        placed[i] = true;
        for &j in &out_edges[i] {
            level[j] = level[j].max(level[i] + 1);
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.push(j);
            }
        }
    }

    let depth = (0..n)
        .filter(|&i| placed[i])
        .map(|i| level[i])
        .max()
        .unwrap_or(0);
    let mut levels: Vec<Vec<Arc<ResourceRecord>>> = vec![Vec::new(); depth + 1];
    let mut strip = Vec::new();
    for (i, record) in records.into_iter().enumerate() {
        if placed[i] {
            levels[level[i]].push(record);
        } else {
            strip.push(record);
        }
    }
    levels.retain(|l| !l.is_empty());

    let tail = strip.clone();
    KindPlan { strip, levels, tail }
}

/// Build the ordered batch list for a set of eligible records.
///
/// Records flagged as defaults are dropped here as a final safety net;
/// the classifier should never let one through.
pub fn order(eligible: Vec<ResourceRecord>) -> Vec<Batch> {
    let mut by_kind: HashMap<ResourceKind, Vec<Arc<ResourceRecord>>> = HashMap::new();
    for record in eligible {
        if record.is_default {
            warn!(
                kind = %record.kind,
                id = %record.id,
                "default resource reached the planner, refusing to schedule it"
            );
            continue;
        }
        by_kind.entry(record.kind).or_default().push(Arc::new(record));
    }

    let mut batches: Vec<Batch> = Vec::new();
    for layer in kind_layers() {
        let mut detach: Batch = Vec::new();
        let mut strip: Batch = Vec::new();
        let mut level_batches: Vec<Batch> = Vec::new();
        let mut tail: Batch = Vec::new();

        for kind in layer {
            let Some(records) = by_kind.remove(&kind) else {
                continue;
            };

            if kind.needs_detach() {
                detach.extend(
                    records
                        .iter()
                        .map(|r| DeletionStep::new(r.clone(), StepAction::Detach)),
                );
            }

            let plan = plan_kind(records);
            if !plan.strip.is_empty() {
                debug!(
                    kind = %kind,
                    count = plan.strip.len(),
                    "reference cycle detected, clearing rule sets before deletion"
                );
                strip.extend(
                    plan.strip
                        .iter()
                        .map(|r| DeletionStep::new(r.clone(), StepAction::StripRules)),
                );
            }
            for (i, level) in plan.levels.into_iter().enumerate() {
                if level_batches.len() <= i {
                    level_batches.push(Vec::new());
                }
                level_batches[i].extend(
                    level
                        .into_iter()
                        .map(|r| DeletionStep::new(r, StepAction::Delete)),
                );
            }
            tail.extend(
                plan.tail
                    .into_iter()
                    .map(|r| DeletionStep::new(r, StepAction::Delete)),
            );
        }

        for batch in [detach, strip]
            .into_iter()
            .chain(level_batches)
            .chain([tail])
        {
            if !batch.is_empty() {
                batches.push(batch);
            }
        }
    }

    batches
}
