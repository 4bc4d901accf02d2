//! Install sequencer - walks a plan through each resource's manager
//!
//! Resources are handled strictly one at a time in plan order, since a
//! resource's install or start may need its dependencies already running.

use crate::context::{
    Library, Manager, ManagerFactory, NoProgress, ProgressCallback, ResourceOutcome, RunContext,
};
use crate::error::{Error, Phase, Result};
use crate::instance::ResourceInstance;
use crate::planner::InstallPlan;
use serde::Serialize;

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    NotStarted,
    Running,
    Succeeded,
    /// Failed and left as-is
    Failed,
    /// Failed, then started services were force-stopped
    RolledBack,
}

/// Options for a run
#[derive(Debug, Clone, Default)]
pub struct SequenceOptions {
    /// On failure, force-stop every service handled so far, newest first
    pub force_stop_on_error: bool,
}

/// Summary of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallSummary {
    pub installed: Vec<String>,
    pub already_installed: Vec<String>,
    pub started: Vec<String>,
    pub already_running: Vec<String>,
    /// Id of the resource that wrote the manifest
    pub install_target: String,
}

impl InstallSummary {
    /// Number of resources that needed an install or a start
    pub fn total_changes(&self) -> usize {
        self.installed.len() + self.started.len()
    }
}

/// Runs install plans
pub struct Sequencer<'a> {
    factory: &'a dyn ManagerFactory,
    library: &'a dyn Library,
    ctx: &'a RunContext,
    options: SequenceOptions,
    state: SequencerState,
}

/// Managers bound to a plan, in plan order
struct Bound {
    instances: Vec<ResourceInstance>,
    managers: Vec<Box<dyn Manager>>,
    target: usize,
}

impl<'a> Sequencer<'a> {
    pub fn new(
        factory: &'a dyn ManagerFactory,
        library: &'a dyn Library,
        ctx: &'a RunContext,
    ) -> Self {
        Self {
            factory,
            library,
            ctx,
            options: SequenceOptions::default(),
            state: SequencerState::NotStarted,
        }
    }

    pub fn with_options(mut self, options: SequenceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn run(&mut self, plan: &InstallPlan) -> Result<InstallSummary> {
        self.run_with_progress(plan, &mut NoProgress)
    }

    /// Install and start every resource of `plan`
    ///
    /// On failure the original error is returned. With `force_stop_on_error`
    /// set, every service handled before the failure is force-stopped first,
    /// in reverse order; failures while stopping are only logged.
    pub fn run_with_progress<P: ProgressCallback>(
        &mut self,
        plan: &InstallPlan,
        progress: &mut P,
    ) -> Result<InstallSummary> {
        self.state = SequencerState::Running;
        progress.on_plan_start(plan.len());

        let result = self.bind(plan).and_then(|mut bound| {
            let mut summary = InstallSummary {
                install_target: bound.instances[bound.target].id.clone(),
                ..Default::default()
            };
            let mut undo: Vec<usize> = Vec::new();

            if let Err(e) = self.install_all(&mut bound, &mut undo, &mut summary, progress) {
                return Err(self.recover(e, &mut bound, &undo, progress));
            }

            let target = &bound.managers[bound.target];
            log::info!("Writing resource manifest through {}", target.id());
            target
                .write_resources_to_file(&bound.instances)
                .map_err(|source| Error::Resource {
                    id: target.id().to_string(),
                    phase: Phase::WriteManifest,
                    source,
                })?;
            Ok(summary)
        });

        self.state = match (&result, self.state) {
            (Ok(_), _) => SequencerState::Succeeded,
            (Err(_), SequencerState::RolledBack) => SequencerState::RolledBack,
            (Err(_), _) => SequencerState::Failed,
        };
        progress.on_plan_complete();
        result
    }

    /// Create every manager up front and find the single install target
    fn bind(&self, plan: &InstallPlan) -> Result<Bound> {
        let instances = plan.resources().to_vec();
        let mut managers = Vec::with_capacity(instances.len());
        for instance in &instances {
            let manager = self
                .factory
                .create(instance, self.ctx)
                .map_err(|source| Error::Driver {
                    id: instance.id.clone(),
                    source,
                })?;
            managers.push(manager);
        }

        let targets: Vec<usize> = managers
            .iter()
            .enumerate()
            .filter(|(_, m)| m.can_be_install_target() && m.use_as_install_target())
            .map(|(i, _)| i)
            .collect();
        match targets.as_slice() {
            [target] => Ok(Bound {
                instances,
                managers,
                target: *target,
            }),
            _ => Err(Error::NoInstallTarget {
                candidates: targets.iter().map(|&i| instances[i].id.clone()).collect(),
            }),
        }
    }

    fn install_all<P: ProgressCallback>(
        &self,
        bound: &mut Bound,
        undo: &mut Vec<usize>,
        summary: &mut InstallSummary,
        progress: &mut P,
    ) -> Result<()> {
        for index in 0..bound.instances.len() {
            let id = bound.instances[index].id.clone();
            progress.on_resource_start(&id, &bound.instances[index].key.label());
            match self.install_one(bound, index, undo, summary) {
                Ok(outcome) => progress.on_resource_complete(&id, &outcome),
                Err(e) => {
                    let outcome = ResourceOutcome::Failed {
                        phase: e.failed_step().map(|(_, phase)| phase),
                        error: e.to_string(),
                    };
                    progress.on_resource_complete(&id, &outcome);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn install_one(
        &self,
        bound: &mut Bound,
        index: usize,
        undo: &mut Vec<usize>,
        summary: &mut InstallSummary,
    ) -> Result<ResourceOutcome> {
        let instance = &mut bound.instances[index];
        let manager = &mut bound.managers[index];
        let id = instance.id.clone();
        let step = |phase: Phase| {
            let id = id.clone();
            move |source: anyhow::Error| Error::Resource { id, phase, source }
        };

        let outcome = if manager.is_installed() {
            log::info!("{id} already installed, validating");
            manager
                .validate_post_install()
                .map_err(step(Phase::ValidatePostInstall))?;
            summary.already_installed.push(id.clone());
            ResourceOutcome::AlreadyInstalled
        } else {
            let unavailable = |reason: &str| Error::PackageUnavailable {
                id: id.clone(),
                key: instance.key.label(),
                reason: reason.to_string(),
            };
            let entry = self
                .library
                .get_entry(instance, self.ctx)
                .ok_or_else(|| unavailable("no library entry"))?;
            let package = entry
                .get_package()
                .ok_or_else(|| unavailable("no package is currently available"))?;

            manager
                .validate_pre_install()
                .map_err(step(Phase::ValidatePreInstall))?;
            log::info!("Installing {id} from {}", package.location());
            manager.install(package).map_err(step(Phase::Install))?;
            summary.installed.push(id.clone());
            ResourceOutcome::Installed
        };
        instance.installed = true;

        if manager.is_service() {
            undo.push(index);
            if manager.is_running() {
                log::info!("{id} already running");
                summary.already_running.push(id);
            } else {
                log::info!("Starting {id}");
                manager.start().map_err(step(Phase::Start))?;
                summary.started.push(id);
            }
        }
        Ok(outcome)
    }

    fn recover<P: ProgressCallback>(
        &mut self,
        error: Error,
        bound: &mut Bound,
        undo: &[usize],
        progress: &mut P,
    ) -> Error {
        if !self.options.force_stop_on_error {
            return error;
        }

        log::error!("Install failed: {error}. Stopping {} service(s)", undo.len());
        progress.on_rollback(undo.len());
        for &index in undo.iter().rev() {
            let manager = &mut bound.managers[index];
            if !manager.force_stop() {
                log::warn!("Could not stop {} during rollback", manager.id());
            }
        }
        self.state = SequencerState::RolledBack;
        error
    }
}
