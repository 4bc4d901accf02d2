//! Dependency graph over resource instances

use crate::error::{Error, Result};
use crate::instance::ResourceInstance;
use std::collections::{BTreeMap, BTreeSet};

/// Edges of one node, both directions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// Ids this node needs installed first
    pub depends_on: BTreeSet<String>,
    /// Ids that need this node installed first
    pub dependents: BTreeSet<String>,
}

/// Instances keyed by id, with an edge from A to B whenever B is A's
/// `inside` or appears in A's `environment` or `peers`
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    instances: BTreeMap<String, ResourceInstance>,
    nodes: BTreeMap<String, Node>,
}

impl DependencyGraph {
    /// Build the graph, rejecting duplicate ids and references to unknown ids
    ///
    /// Port compatibility is not checked here.
    pub fn build(instances: Vec<ResourceInstance>) -> Result<Self> {
        let mut graph = Self::default();
        for instance in instances {
            if graph.instances.contains_key(&instance.id) {
                return Err(Error::DuplicateResource(instance.id));
            }
            graph.nodes.insert(instance.id.clone(), Node::default());
            graph.instances.insert(instance.id.clone(), instance);
        }

        let mut edges = Vec::new();
        for instance in graph.instances.values() {
            for reference in instance.references() {
                if !graph.instances.contains_key(&reference.id) {
                    return Err(Error::DanglingReference {
                        from: instance.id.clone(),
                        to: reference.id.clone(),
                    });
                }
                edges.push((instance.id.clone(), reference.id.clone()));
            }
        }
        for (from, to) in edges {
            log::debug!("{from} depends on {to}");
            graph.add_edge(from, to);
        }
        Ok(graph)
    }

    fn add_edge(&mut self, from: String, to: String) {
        if let Some(node) = self.nodes.get_mut(&to) {
            node.dependents.insert(from.clone());
        }
        if let Some(node) = self.nodes.get_mut(&from) {
            node.depends_on.insert(to);
        }
    }

    /// Number of instances in the graph
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Instance with the given id
    pub fn instance(&self, id: &str) -> Option<&ResourceInstance> {
        self.instances.get(id)
    }

    /// Incoming and outgoing edges of `id`
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn nodes(&self) -> &BTreeMap<String, Node> {
        &self.nodes
    }

    /// Number of distinct edges
    pub fn link_count(&self) -> usize {
        self.nodes.values().map(|n| n.depends_on.len()).sum()
    }

    /// Each id mapped to the sorted ids it depends on
    pub fn dependencies(&self) -> BTreeMap<String, Vec<String>> {
        self.nodes
            .iter()
            .map(|(id, node)| (id.clone(), node.depends_on.iter().cloned().collect()))
            .collect()
    }
}
