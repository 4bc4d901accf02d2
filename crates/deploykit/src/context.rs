//! Run context and collaborator traits
//!
//! The sequencer drives resources through these traits only, so drivers,
//! package sources and progress reporting can be swapped without touching
//! the install logic.

use crate::error::Phase;
use crate::instance::ResourceInstance;
use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Settings for one run, passed explicitly to every collaborator
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Root directory of the deployment
    pub deployment_home: PathBuf,
    /// Whether this is a dry run (no actual changes)
    pub dry_run: bool,
    /// Whether to output verbose information
    pub verbose: bool,
}

impl RunContext {
    pub fn new(deployment_home: impl Into<PathBuf>) -> Self {
        Self {
            deployment_home: deployment_home.into(),
            dry_run: false,
            verbose: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Performs the lifecycle operations for one resource instance
///
/// Boolean queries cannot fail; every other call returns the manager's own
/// error, which the sequencer passes on untouched.
pub trait Manager: Send {
    /// Id of the instance this manager is bound to
    fn id(&self) -> &str;

    fn is_installed(&self) -> bool;

    fn validate_pre_install(&mut self) -> Result<()> {
        Ok(())
    }

    fn install(&mut self, package: &dyn Package) -> Result<()>;

    fn validate_post_install(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_service(&self) -> bool {
        false
    }

    fn is_running(&self) -> bool {
        false
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stop without raising; returns whether the stop succeeded
    fn force_stop(&mut self) -> bool {
        match self.stop() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Unable to stop {}: {e:#}", self.id());
                false
            }
        }
    }

    fn can_be_install_target(&self) -> bool {
        false
    }

    fn use_as_install_target(&self) -> bool {
        false
    }

    /// Persist the manifest of installed resources
    ///
    /// Only called on the install target, once, after every resource
    /// succeeded.
    fn write_resources_to_file(&self, _resources: &[ResourceInstance]) -> Result<()> {
        anyhow::bail!("{} is not an install target", self.id())
    }
}

/// Binds a manager to each instance
pub trait ManagerFactory {
    fn create(&self, instance: &ResourceInstance, ctx: &RunContext) -> Result<Box<dyn Manager>>;
}

impl<F> ManagerFactory for F
where
    F: Fn(&ResourceInstance, &RunContext) -> Result<Box<dyn Manager>>,
{
    fn create(&self, instance: &ResourceInstance, ctx: &RunContext) -> Result<Box<dyn Manager>> {
        self(instance, ctx)
    }
}

/// Installable payload for a resource
pub trait Package: fmt::Debug + Send + Sync {
    fn is_available(&self) -> bool;

    /// Where the package comes from, for messages
    fn location(&self) -> String;

    /// Local file holding the package
    fn file(&self) -> Result<PathBuf> {
        anyhow::bail!("package {} has no local file", self.location())
    }

    /// Whether installing this package means unpacking it first
    fn is_archive(&self) -> bool {
        false
    }

    /// Unpack into `target_dir`, returning the name of the top-level directory
    fn extract(&self, _target_dir: &Path) -> Result<String> {
        anyhow::bail!("package {} cannot be extracted", self.location())
    }
}

/// Packages for one resource key, in priority order
#[derive(Debug, Default)]
pub struct LibraryEntry {
    packages: Vec<Box<dyn Package>>,
}

impl LibraryEntry {
    pub fn new(packages: Vec<Box<dyn Package>>) -> Self {
        Self { packages }
    }

    /// First package that is currently available
    pub fn get_package(&self) -> Option<&dyn Package> {
        self.packages
            .iter()
            .find(|p| p.is_available())
            .map(|p| p.as_ref())
    }

    pub fn packages(&self) -> &[Box<dyn Package>] {
        &self.packages
    }
}

/// Source of packages
pub trait Library {
    fn get_entry(&self, instance: &ResourceInstance, ctx: &RunContext) -> Option<&LibraryEntry>;
}

/// Library held in memory, keyed by canonical resource key
#[derive(Debug, Default)]
pub struct InMemoryLibrary {
    entries: BTreeMap<String, LibraryEntry>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &catalog::ResourceKey, entry: LibraryEntry) {
        self.entries.insert(key.canonical(), entry);
    }

    pub fn with_entry(mut self, key: &catalog::ResourceKey, entry: LibraryEntry) -> Self {
        self.add(key, entry);
        self
    }
}

impl Library for InMemoryLibrary {
    fn get_entry(&self, instance: &ResourceInstance, _ctx: &RunContext) -> Option<&LibraryEntry> {
        self.entries.get(&instance.key.canonical())
    }
}

/// What happened to one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOutcome {
    Installed,
    AlreadyInstalled,
    Failed { phase: Option<Phase>, error: String },
}

impl ResourceOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Progress callback for sequencing
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback: Send {
    /// Called once before the first resource
    fn on_plan_start(&mut self, count: usize);

    /// Called when starting a single resource
    fn on_resource_start(&mut self, id: &str, description: &str);

    /// Called when a resource completes or fails
    fn on_resource_complete(&mut self, id: &str, outcome: &ResourceOutcome);

    /// Called before stopping `count` services after a failure
    fn on_rollback(&mut self, count: usize);

    /// Called once after the run ends, successfully or not
    fn on_plan_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_plan_start(&mut self, _count: usize) {}
    fn on_resource_start(&mut self, _id: &str, _description: &str) {}
    fn on_resource_complete(&mut self, _id: &str, _outcome: &ResourceOutcome) {}
    fn on_rollback(&mut self, _count: usize) {}
    fn on_plan_complete(&mut self) {}
}
