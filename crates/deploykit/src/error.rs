//! Error types for planning and sequencing

use std::fmt;
use thiserror::Error;

/// Lifecycle step a resource failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ValidatePreInstall,
    Install,
    ValidatePostInstall,
    Start,
    WriteManifest,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidatePreInstall => "pre-install validation",
            Self::Install => "install",
            Self::ValidatePostInstall => "post-install validation",
            Self::Start => "start",
            Self::WriteManifest => "manifest write",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why no install order exists
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    /// No resource is free of dependencies, so ordering cannot even begin
    #[error("install solution contains cycles: all resources have dependencies")]
    AllResourcesHaveDependencies,

    /// Ordering made progress, then stalled; lists the resources on a cycle
    #[error("install solution contains a cycle among: {}", .remaining.join(", "))]
    ResidualCycle { remaining: Vec<String> },
}

/// Errors from graph building, planning and sequencing
#[derive(Error, Debug)]
pub enum Error {
    #[error("resource id '{0}' is used more than once")]
    DuplicateResource(String),

    #[error("resource '{from}' references unknown resource '{to}'")]
    DanglingReference { from: String, to: String },

    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// Zero or several resources volunteered as install target
    #[error("expected exactly one install target, found {}", describe_candidates(.candidates))]
    NoInstallTarget { candidates: Vec<String> },

    #[error("no package available for resource '{id}' ({key}): {reason}")]
    PackageUnavailable {
        id: String,
        key: String,
        reason: String,
    },

    #[error("failed to create manager for resource '{id}': {source}")]
    Driver {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// A manager call failed; `source` is the manager's own error
    #[error("resource '{id}' failed during {phase}: {source}")]
    Resource {
        id: String,
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },

    #[error("machine '{machine}' failed: {source}")]
    Machine {
        machine: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid property path '{path}': {reason}")]
    Property { path: String, reason: String },
}

impl Error {
    /// Resource id and phase, for manager failures
    pub fn failed_step(&self) -> Option<(&str, Phase)> {
        match self {
            Self::Resource { id, phase, .. } => Some((id, *phase)),
            _ => None,
        }
    }
}

fn describe_candidates(candidates: &[String]) -> String {
    if candidates.is_empty() {
        "none".to_string()
    } else {
        format!("{} ({})", candidates.len(), candidates.join(", "))
    }
}

/// Result type for deploykit operations
pub type Result<T> = std::result::Result<T, Error>;
