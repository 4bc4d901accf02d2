//! # Deploykit
//!
//! Dependency graphs, install planning and sequenced installation.
//!
//! This crate takes a list of concrete resource instances, orders them so that
//! every dependency comes first, and drives each one through its manager,
//! stopping started services again if the run fails.
//!
//! ## Core Concepts
//!
//! - **ResourceInstance**: A resolved resource with its ports and references
//! - **DependencyGraph**: Edges from each instance to its `inside`, `environment` and `peers`
//! - **InstallPlan**: A deterministic topological order of the graph
//! - **MultiNodeInstallPlan**: The plan split per machine, machines in dependency order
//! - **Sequencer**: Installs and starts a plan, with optional rollback
//!
//! ## Example
//!
//! ```ignore
//! use deploykit::{plan_instances, InMemoryLibrary, RunContext, Sequencer};
//!
//! let plan = plan_instances(instances)?;
//! let ctx = RunContext::new("/opt/deploy");
//! let library = InMemoryLibrary::new();
//! let factory = |instance: &ResourceInstance, ctx: &RunContext| make_manager(instance, ctx);
//!
//! let summary = Sequencer::new(&factory, &library, &ctx).run(&plan)?;
//! println!("installed {}", summary.installed.len());
//! ```
//!
//! ## Collaborator Traits
//!
//! - [`Manager`]: Lifecycle operations for one resource
//! - [`ManagerFactory`]: Binds a manager to each instance
//! - [`Library`] and [`Package`]: Where installable payloads come from
//! - [`ProgressCallback`]: Receives progress updates
//! - [`MachineApplier`]: Applies one machine's plan in a multi-node run

pub mod context;
pub mod error;
pub mod graph;
pub mod instance;
pub mod multinode;
pub mod planner;
pub mod sequencer;

// Re-export main types at crate root
pub use context::{
    InMemoryLibrary, Library, LibraryEntry, Manager, ManagerFactory, NoProgress, Package,
    ProgressCallback, ResourceOutcome, RunContext,
};
pub use error::{CycleError, Error, Phase, Result};
pub use graph::{DependencyGraph, Node};
pub use instance::{Properties, ResourceInstance, ResourceRef, merge_instances};
pub use multinode::{
    MachineApplier, MachinePlan, MultiNodeInstallPlan, execute_multi_node, plan_multi_node,
};
pub use planner::{InstallPlan, plan, plan_instances};
pub use sequencer::{InstallSummary, SequenceOptions, Sequencer, SequencerState};
