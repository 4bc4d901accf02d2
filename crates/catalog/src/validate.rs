//! Validation findings for a loaded catalog

use crate::constraint::PortCoverage;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A single problem found in a resource definition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    #[error("{0}")]
    Parse(String),

    #[error("property {property} refers to undefined property {reference}")]
    UndefinedPropertyReference { property: String, reference: String },

    #[error("invalid property reference '{reference}' in definition of property {property}")]
    IllFormedPropertyReference { property: String, reference: String },

    #[error("constraint references undefined input port {port}")]
    UndefinedInputPort { port: String },

    #[error("constraint references non-existent output port {port} on resource {provider}")]
    MissingOutputPort { port: String, provider: String },

    #[error(
        "constraint references non-existent property output_ports.{port}.{property} in resource {provider}"
    )]
    MissingOutputProperty {
        port: String,
        property: String,
        provider: String,
    },

    #[error("constraint '{constraint}' has no matching resources")]
    NoMatchingResource { constraint: String },

    #[error("password property config_port.{property} has no default and must be supplied at install time")]
    PasswordWithoutDefault { property: String },
}

/// An issue attributed to the resource it was found on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub resource: String,
    pub issue: Issue,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.issue)
    }
}

/// Counted errors and warnings plus per-resource port coverage
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    errors: Vec<Finding>,
    warnings: Vec<Finding>,
    coverage: BTreeMap<String, PortCoverage>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, resource: &str, issue: Issue) {
        log::debug!("error in {resource}: {issue}");
        self.errors.push(Finding {
            resource: resource.to_string(),
            issue,
        });
    }

    pub fn warning(&mut self, resource: &str, issue: Issue) {
        log::debug!("warning in {resource}: {issue}");
        self.warnings.push(Finding {
            resource: resource.to_string(),
            issue,
        });
    }

    pub(crate) fn set_coverage(&mut self, resource: &str, coverage: PortCoverage) {
        self.coverage.insert(resource.to_string(), coverage);
    }

    pub fn errors(&self) -> &[Finding] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Finding] {
        &self.warnings
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Port coverage of each validated resource, keyed by label
    pub fn coverage(&self) -> &BTreeMap<String, PortCoverage> {
        &self.coverage
    }

    /// No errors and no warnings
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
