//! Install planner - deterministic topological ordering

use crate::error::{CycleError, Result};
use crate::graph::{DependencyGraph, Node};
use crate::instance::ResourceInstance;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Resources in an order where every dependency precedes its dependents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallPlan {
    resources: Vec<ResourceInstance>,
}

impl InstallPlan {
    pub(crate) fn from_ordered(resources: Vec<ResourceInstance>) -> Self {
        Self { resources }
    }

    /// Instances in install order
    pub fn resources(&self) -> &[ResourceInstance] {
        &self.resources
    }

    /// Instance ids in install order
    pub fn ids(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.id.as_str()).collect()
    }

    /// Number of planned instances
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn into_resources(self) -> Vec<ResourceInstance> {
        self.resources
    }
}

/// Order the graph's instances for installation
pub fn plan(graph: &DependencyGraph) -> Result<InstallPlan> {
    let order = topological_order(graph.nodes())?;
    let resources = order
        .iter()
        .filter_map(|id| graph.instance(id).cloned())
        .collect();
    Ok(InstallPlan::from_ordered(resources))
}

/// Build the graph and plan it in one step
pub fn plan_instances(instances: Vec<ResourceInstance>) -> Result<InstallPlan> {
    plan(&DependencyGraph::build(instances)?)
}

/// Kahn's algorithm with a fixed visiting order
///
/// The queue starts with the dependency-free ids in ascending order. Each
/// popped id releases its dependents in ascending order, and newly free ids
/// are appended, so the result depends only on the edges and never on input
/// order.
pub(crate) fn topological_order(
    nodes: &BTreeMap<String, Node>,
) -> std::result::Result<Vec<String>, CycleError> {
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = nodes
        .iter()
        .map(|(id, node)| {
            (
                id.as_str(),
                node.depends_on.iter().map(String::as_str).collect(),
            )
        })
        .collect();
    let mut total_links: usize = pending.values().map(BTreeSet::len).sum();

    let mut queue: VecDeque<&str> = pending
        .iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(id, _)| *id)
        .collect();
    if queue.is_empty() && !nodes.is_empty() {
        return Err(CycleError::AllResourcesHaveDependencies);
    }

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(id) = queue.pop_front() {
        log::debug!("planner: next is {id}");
        order.push(id.to_string());
        let Some(node) = nodes.get(id) else {
            continue;
        };
        for dependent in &node.dependents {
            if let Some(deps) = pending.get_mut(dependent.as_str())
                && deps.remove(id)
            {
                total_links -= 1;
                if deps.is_empty() {
                    queue.push_back(dependent.as_str());
                }
            }
        }
    }

    if total_links > 0 {
        let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        let unplaced: BTreeSet<&str> = nodes
            .keys()
            .map(String::as_str)
            .filter(|id| !placed.contains(id))
            .collect();
        let remaining = unplaced
            .iter()
            .filter(|id| on_cycle(nodes, &unplaced, id))
            .map(|id| (*id).to_string())
            .collect();
        return Err(CycleError::ResidualCycle { remaining });
    }
    Ok(order)
}

/// Whether `start` can reach itself through unplaced dependents
///
/// Unplaced ids that merely wait on a cycle are not part of it.
fn on_cycle(nodes: &BTreeMap<String, Node>, unplaced: &BTreeSet<&str>, start: &str) -> bool {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        let Some(node) = nodes.get(id) else {
            continue;
        };
        for next in &node.dependents {
            let next = next.as_str();
            if next == start {
                return true;
            }
            if unplaced.contains(next) && seen.insert(next) {
                stack.push(next);
            }
        }
    }
    false
}
