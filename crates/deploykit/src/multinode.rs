//! Multi-node planning - partition an install plan per machine
//!
//! A machine is a root of the `inside` hierarchy. Machines are ordered by
//! the `environment` and `peers` edges that cross machine boundaries, using
//! the same deterministic ordering as single-node plans.

use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, Node};
use crate::instance::ResourceInstance;
use crate::planner::{InstallPlan, plan, topological_order};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// One machine's share of the plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachinePlan {
    /// Id of the root resource of the machine
    pub machine: String,
    /// Machines that must be fully applied first
    pub depends_on: Vec<String>,
    pub plan: InstallPlan,
}

/// Per-machine plans in machine dependency order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MultiNodeInstallPlan {
    pub machines: Vec<MachinePlan>,
}

impl MultiNodeInstallPlan {
    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn machine(&self, id: &str) -> Option<&MachinePlan> {
        self.machines.iter().find(|m| m.machine == id)
    }

    /// Group machines into waves whose members depend only on earlier waves
    pub fn waves(&self) -> Vec<Vec<&MachinePlan>> {
        let mut level: BTreeMap<&str, usize> = BTreeMap::new();
        let mut waves: Vec<Vec<&MachinePlan>> = Vec::new();
        for machine in &self.machines {
            // machines are in dependency order, so every dependency has a level
            let wave = machine
                .depends_on
                .iter()
                .filter_map(|dep| level.get(dep.as_str()))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            level.insert(&machine.machine, wave);
            if waves.len() <= wave {
                waves.resize_with(wave + 1, Vec::new);
            }
            waves[wave].push(machine);
        }
        waves
    }
}

/// Plan the instances, then split the plan by machine
pub fn plan_multi_node(instances: Vec<ResourceInstance>) -> Result<MultiNodeInstallPlan> {
    let graph = DependencyGraph::build(instances)?;
    let ordered = plan(&graph)?;

    // plan order puts every `inside` host before its guests
    let mut machine_of: BTreeMap<String, String> = BTreeMap::new();
    for instance in ordered.resources() {
        let machine = match &instance.inside {
            Some(host) => machine_of
                .get(&host.id)
                .cloned()
                .unwrap_or_else(|| host.id.clone()),
            None => instance.id.clone(),
        };
        machine_of.insert(instance.id.clone(), machine);
    }

    let mut machine_nodes: BTreeMap<String, Node> = machine_of
        .values()
        .map(|m| (m.clone(), Node::default()))
        .collect();
    for instance in ordered.resources() {
        let from = &machine_of[&instance.id];
        for dependency in instance.environment.iter().chain(instance.peers.iter()) {
            let to = &machine_of[&dependency.id];
            if from == to {
                continue;
            }
            log::debug!("machine {from} depends on machine {to}");
            if let Some(node) = machine_nodes.get_mut(to) {
                node.dependents.insert(from.clone());
            }
            if let Some(node) = machine_nodes.get_mut(from) {
                node.depends_on.insert(to.clone());
            }
        }
    }

    let machine_order = topological_order(&machine_nodes)?;
    let mut grouped: BTreeMap<&str, Vec<ResourceInstance>> = BTreeMap::new();
    for instance in ordered.resources() {
        grouped
            .entry(machine_of[&instance.id].as_str())
            .or_default()
            .push(instance.clone());
    }

    let machines = machine_order
        .iter()
        .map(|machine| MachinePlan {
            machine: machine.clone(),
            depends_on: machine_nodes[machine].depends_on.iter().cloned().collect(),
            plan: InstallPlan::from_ordered(grouped.remove(machine.as_str()).unwrap_or_default()),
        })
        .collect();
    Ok(MultiNodeInstallPlan { machines })
}

/// Applies one machine's plan, wherever that machine is
pub trait MachineApplier: Sync {
    fn apply(&self, machine: &MachinePlan) -> anyhow::Result<()>;
}

impl<F> MachineApplier for F
where
    F: Fn(&MachinePlan) -> anyhow::Result<()> + Sync,
{
    fn apply(&self, machine: &MachinePlan) -> anyhow::Result<()> {
        self(machine)
    }
}

/// Apply every machine plan, running independent machines concurrently
///
/// Machines run in waves: a wave starts only once every earlier wave has
/// succeeded. Returns the ids of the applied machines in plan order.
pub fn execute_multi_node(
    plan: &MultiNodeInstallPlan,
    applier: &dyn MachineApplier,
    jobs: usize,
) -> Result<Vec<String>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| Error::Machine {
            machine: String::new(),
            source: anyhow::anyhow!("Failed to create thread pool: {e}"),
        })?;

    let mut applied = Vec::with_capacity(plan.len());
    for (index, wave) in plan.waves().into_iter().enumerate() {
        log::info!(
            "Applying wave {} ({})",
            index + 1,
            wave.iter()
                .map(|m| m.machine.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let results: Vec<(&str, anyhow::Result<()>)> = pool.install(|| {
            wave.par_iter()
                .map(|machine| (machine.machine.as_str(), applier.apply(machine)))
                .collect()
        });

        let mut failure = None;
        for (machine, result) in results {
            match result {
                Ok(()) => applied.push(machine.to_string()),
                Err(source) => {
                    log::error!("Machine {machine} failed: {source:#}");
                    failure.get_or_insert(Error::Machine {
                        machine: machine.to_string(),
                        source,
                    });
                }
            }
        }
        if let Some(error) = failure {
            return Err(error);
        }
    }
    Ok(applied)
}
