//! Constraints and port-coverage propagation
//!
//! A constraint names the resources that may satisfy a relationship
//! (`inside`, `environment` or `peers`) and maps the owner's input ports to the
//! provider's output ports.
//!
//! Validating a constraint also computes which of the owner's input ports it
//! is certain to connect ([`PortCoverage::guaranteed`]) and which it connects
//! only for some choices of provider ([`PortCoverage::maybe`]).

use crate::catalog::Catalog;
use crate::definition::ResourceDefinition;
use crate::key::ResourceKey;
use crate::validate::{Issue, ValidationReport};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A single provider requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseConstraint {
    pub key: ResourceKey,
    /// Owner input port name to provider output port name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub port_mapping: BTreeMap<String, String>,
}

impl BaseConstraint {
    pub fn new(key: ResourceKey) -> Self {
        Self {
            key,
            port_mapping: BTreeMap::new(),
        }
    }

    pub fn map_port(mut self, input_port: &str, output_port: &str) -> Self {
        self.port_mapping
            .insert(input_port.to_string(), output_port.to_string());
        self
    }

    /// Check whether `candidate` can satisfy this constraint
    pub fn matches(&self, candidate: &ResourceKey) -> bool {
        self.key.name == candidate.name && self.key.version.accepts(&candidate.version)
    }

    pub fn find_all_matching(
        &self,
        by_name: &BTreeMap<String, BTreeSet<ResourceKey>>,
    ) -> BTreeSet<ResourceKey> {
        by_name
            .get(&self.key.name)
            .map(|candidates| {
                candidates
                    .iter()
                    .filter(|candidate| self.matches(candidate))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Constraint tree attached to a relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ConstraintRepr", into = "ConstraintRepr")]
pub enum Constraint {
    Base(BaseConstraint),
    /// Exactly one branch will be chosen
    OneOf(Vec<Constraint>),
    /// Every branch applies
    AllOf(Vec<Constraint>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged, deny_unknown_fields)]
enum ConstraintRepr {
    OneOf {
        #[serde(rename = "one-of")]
        one_of: Vec<Constraint>,
    },
    AllOf {
        #[serde(rename = "all-of")]
        all_of: Vec<Constraint>,
    },
    Base(BaseConstraint),
}

impl From<ConstraintRepr> for Constraint {
    fn from(repr: ConstraintRepr) -> Self {
        match repr {
            ConstraintRepr::OneOf { one_of } => Self::OneOf(one_of),
            ConstraintRepr::AllOf { all_of } => Self::AllOf(all_of),
            ConstraintRepr::Base(base) => Self::Base(base),
        }
    }
}

impl From<Constraint> for ConstraintRepr {
    fn from(constraint: Constraint) -> Self {
        match constraint {
            Constraint::OneOf(one_of) => Self::OneOf { one_of },
            Constraint::AllOf(all_of) => Self::AllOf { all_of },
            Constraint::Base(base) => Self::Base(base),
        }
    }
}

impl Constraint {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Base(_) => "base",
            Self::OneOf(_) => "one-of",
            Self::AllOf(_) => "all-of",
        }
    }

    /// Every base constraint in the tree, depth first
    pub fn base_constraints(&self) -> Vec<&BaseConstraint> {
        match self {
            Self::Base(base) => vec![base],
            Self::OneOf(children) | Self::AllOf(children) => {
                children.iter().flat_map(Self::base_constraints).collect()
            }
        }
    }

    /// Keys of every catalog entry that can satisfy some part of the constraint
    ///
    /// An empty result is not an error here; callers decide whether to warn.
    pub fn find_all_matching(
        &self,
        by_name: &BTreeMap<String, BTreeSet<ResourceKey>>,
    ) -> BTreeSet<ResourceKey> {
        match self {
            Self::Base(base) => base.find_all_matching(by_name),
            Self::OneOf(children) | Self::AllOf(children) => children
                .iter()
                .flat_map(|child| child.find_all_matching(by_name))
                .collect(),
        }
    }

    /// Check the constraint against `catalog` on behalf of `owner`
    ///
    /// Problems are recorded in `report` and never stop the walk. Returns the
    /// owner's input ports this constraint connects.
    pub fn validate(
        &self,
        owner: &ResourceDefinition,
        catalog: &Catalog,
        report: &mut ValidationReport,
    ) -> PortCoverage {
        match self {
            Self::Base(base) => validate_base(base, owner, catalog, report),
            Self::OneOf(children) => PortCoverage::one_of(
                children
                    .iter()
                    .map(|child| child.validate(owner, catalog, report))
                    .collect::<Vec<_>>(),
            ),
            Self::AllOf(children) => PortCoverage::all_of(
                children
                    .iter()
                    .map(|child| child.validate(owner, catalog, report))
                    .collect::<Vec<_>>(),
            ),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base(base) => write!(f, "{}", base.key.label()),
            Self::OneOf(children) | Self::AllOf(children) => {
                let labels: Vec<String> = children.iter().map(ToString::to_string).collect();
                write!(f, "{}({})", self.kind(), labels.join(", "))
            }
        }
    }
}

fn validate_base(
    base: &BaseConstraint,
    owner: &ResourceDefinition,
    catalog: &Catalog,
    report: &mut ValidationReport,
) -> PortCoverage {
    let owner_label = owner.key.label();
    let matching = base.find_all_matching(catalog.by_name());
    if matching.is_empty() {
        report.warning(
            &owner_label,
            Issue::NoMatchingResource {
                constraint: base.key.label(),
            },
        );
    }

    for (input_port, output_port) in &base.port_mapping {
        let Some(input) = owner.input_ports.get(input_port) else {
            report.error(
                &owner_label,
                Issue::UndefinedInputPort {
                    port: input_port.clone(),
                },
            );
            continue;
        };

        for key in &matching {
            let Some(provider) = catalog.get(key) else {
                continue;
            };
            match provider.output_ports.get(output_port) {
                Some(output) => {
                    for property in input.keys() {
                        if !output.contains_key(property) {
                            report.error(
                                &owner_label,
                                Issue::MissingOutputProperty {
                                    port: output_port.clone(),
                                    property: property.clone(),
                                    provider: key.label(),
                                },
                            );
                        }
                    }
                }
                None => report.error(
                    &owner_label,
                    Issue::MissingOutputPort {
                        port: output_port.clone(),
                        provider: key.label(),
                    },
                ),
            }
        }
    }

    PortCoverage {
        guaranteed: base.port_mapping.keys().cloned().collect(),
        maybe: BTreeSet::new(),
    }
}

/// Input ports connected by a constraint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortCoverage {
    /// Connected whichever providers are chosen
    pub guaranteed: BTreeSet<String>,
    /// Connected only for some choices of provider
    pub maybe: BTreeSet<String>,
}

impl PortCoverage {
    /// Combine the branches of a one-of
    ///
    /// A port stays guaranteed only if every branch guarantees it. Ports that
    /// fall out of the intersection join `maybe`, as does every branch's own
    /// `maybe`. No branches means no coverage.
    pub fn one_of(branches: impl IntoIterator<Item = Self>) -> Self {
        let mut branches = branches.into_iter();
        let Some(first) = branches.next() else {
            return Self::default();
        };
        branches.fold(first, |acc, branch| {
            let guaranteed: BTreeSet<String> = acc
                .guaranteed
                .intersection(&branch.guaranteed)
                .cloned()
                .collect();
            let mut maybe = acc.maybe;
            maybe.extend(branch.maybe);
            maybe.extend(acc.guaranteed.difference(&guaranteed).cloned());
            maybe.extend(branch.guaranteed.difference(&guaranteed).cloned());
            Self { guaranteed, maybe }
        })
    }

    /// Combine the branches of an all-of, or the relationships of one resource
    pub fn all_of(branches: impl IntoIterator<Item = Self>) -> Self {
        branches
            .into_iter()
            .fold(Self::default(), |mut acc, branch| {
                acc.guaranteed.extend(branch.guaranteed);
                acc.maybe.extend(branch.maybe);
                acc
            })
    }

    pub fn is_guaranteed(&self, port: &str) -> bool {
        self.guaranteed.contains(port)
    }

    pub fn is_maybe(&self, port: &str) -> bool {
        self.maybe.contains(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coverage(guaranteed: &[&str], maybe: &[&str]) -> PortCoverage {
        PortCoverage {
            guaranteed: guaranteed.iter().map(|s| (*s).to_string()).collect(),
            maybe: maybe.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn test_constraint_json_forms() {
        let base: Constraint = serde_json::from_value(json!({
            "key": {"name": "mysql", "version": "5.1"},
            "port_mapping": {"db": "mysql"}
        }))
        .unwrap();
        assert!(matches!(&base, Constraint::Base(b) if b.port_mapping["db"] == "mysql"));

        let nested: Constraint = serde_json::from_value(json!({
            "all-of": [
                {"key": {"name": "a", "version": "1"}},
                {"one-of": [
                    {"key": {"name": "b", "version": "1"}},
                    {"key": {"name": "c", "version": {"less-than": "2"}}}
                ]}
            ]
        }))
        .unwrap();
        assert_eq!(nested.to_string(), "all-of(a 1, one-of(b 1, c < 2))");
        assert_eq!(nested.base_constraints().len(), 3);
    }

    #[test]
    fn test_misspelled_constraint_keys_are_rejected() {
        let key = json!({"name": "mysql", "version": "5.1"});
        for bad in [
            json!({"key": key, "port_maping": {"db": "mysql"}}),
            json!({"one_of": [{"key": key}]}),
            json!({"one-of": [{"key": key}], "all-of": []}),
        ] {
            assert!(
                serde_json::from_value::<Constraint>(bad.clone()).is_err(),
                "accepted {bad}"
            );
        }
    }

    #[test]
    fn test_base_matches() {
        let base = BaseConstraint::new(ResourceKey {
            name: "python".into(),
            version: serde_json::from_value(json!({"greater-than-or-equal": "2.6"})).unwrap(),
        });
        assert!(base.matches(&ResourceKey::new("python", "2.7")));
        assert!(!base.matches(&ResourceKey::new("python", "2.5")));
        assert!(!base.matches(&ResourceKey::new("jython", "2.7")));
    }

    #[test]
    fn test_find_all_matching_unions_children() {
        let mut by_name: BTreeMap<String, BTreeSet<ResourceKey>> = BTreeMap::new();
        for (name, version) in [("mysql", "5.1"), ("mysql", "5.5"), ("sqlite", "3")] {
            by_name
                .entry(name.to_string())
                .or_default()
                .insert(ResourceKey::new(name, version));
        }
        let constraint = Constraint::OneOf(vec![
            Constraint::Base(BaseConstraint::new(ResourceKey::new("mysql", "5.5"))),
            Constraint::Base(BaseConstraint::new(ResourceKey::new("sqlite", "3"))),
            Constraint::Base(BaseConstraint::new(ResourceKey::new("postgres", "9"))),
        ]);
        let found = constraint.find_all_matching(&by_name);
        assert_eq!(
            found.into_iter().map(|k| k.label()).collect::<Vec<_>>(),
            vec!["mysql 5.5", "sqlite 3"]
        );
    }

    #[test]
    fn test_one_of_drops_ports_not_in_every_branch() {
        let result = PortCoverage::one_of([coverage(&["host", "p"], &[]), coverage(&["host"], &[])]);
        assert_eq!(result, coverage(&["host"], &["p"]));
    }

    #[test]
    fn test_one_of_keeps_branch_maybes() {
        let result = PortCoverage::one_of([
            coverage(&["host"], &["x"]),
            coverage(&["host", "y"], &[]),
            coverage(&["host"], &["z"]),
        ]);
        assert_eq!(result, coverage(&["host"], &["x", "y", "z"]));
    }

    #[test]
    fn test_all_of_unions_branches() {
        let result = PortCoverage::all_of([coverage(&["host", "p"], &[]), coverage(&["host"], &["q"])]);
        assert_eq!(result, coverage(&["host", "p"], &["q"]));
    }

    #[test]
    fn test_empty_composites_cover_nothing() {
        assert_eq!(PortCoverage::one_of(Vec::new()), PortCoverage::default());
        assert_eq!(PortCoverage::all_of(Vec::new()), PortCoverage::default());
    }
}
