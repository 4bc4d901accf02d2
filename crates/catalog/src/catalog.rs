//! The resource catalog
//!
//! Definitions are indexed twice: by canonical key for direct lookups and by
//! name for constraint resolution.

use crate::constraint::{Constraint, PortCoverage};
use crate::definition::ResourceDefinition;
use crate::error::{Error, Result};
use crate::key::ResourceKey;
use crate::port::{PropertyRef, PropertyType};
use crate::validate::{Issue, ValidationReport};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::Path;

/// Version written to and accepted in definition documents
pub const RESOURCE_DEF_VERSION: &str = "1.0";

/// All known resource definitions
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    by_key: BTreeMap<String, ResourceDefinition>,
    by_name: BTreeMap<String, BTreeSet<ResourceKey>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from parsed definitions
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = ResourceDefinition>,
    ) -> Result<Self> {
        let mut catalog = Self::new();
        for definition in definitions {
            catalog.insert(definition)?;
        }
        Ok(catalog)
    }

    /// Parse a definitions document, failing on the first bad definition
    pub fn from_document(document: Value) -> Result<Self> {
        let mut report = ValidationReport::new();
        let catalog = Self::from_document_lenient(document, &mut report)?;
        if let Some(finding) = report.errors().first() {
            return Err(Error::parse(&finding.resource, finding.issue.to_string()));
        }
        Ok(catalog)
    }

    /// Parse a definitions document, recording bad definitions in `report`
    ///
    /// Definitions that fail to parse are skipped so the rest can still be
    /// validated. Only a document of the wrong overall shape is an error.
    pub fn from_document_lenient(document: Value, report: &mut ValidationReport) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.extend_from_document(document, report)?;
        Ok(catalog)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_document(serde_json::from_str(json)?)
    }

    /// Load a definitions file
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_document(read_document(path)?)
    }

    /// Load the primary file and merge each extension file into it, in order
    pub fn load_with_extensions(
        primary: &Path,
        extensions: &[impl AsRef<Path>],
        report: &mut ValidationReport,
    ) -> Result<Self> {
        let mut catalog = Self::from_document_lenient(read_document(primary)?, report)?;
        for extension in extensions {
            let path = extension.as_ref();
            log::debug!("Adding resources from {}", path.display());
            catalog.extend_from_document(read_document(path)?, report)?;
        }
        Ok(catalog)
    }

    fn extend_from_document(&mut self, document: Value, report: &mut ValidationReport) -> Result<()> {
        for (index, item) in definition_list(document)?.into_iter().enumerate() {
            let label = item
                .get("key")
                .and_then(|k| serde_json::from_value::<ResourceKey>(k.clone()).ok())
                .map_or_else(|| format!("definition #{index}"), |k| k.label());
            match serde_json::from_value::<ResourceDefinition>(item) {
                Ok(definition) => {
                    if let Err(e) = self.insert(definition) {
                        report.error(&label, Issue::Parse(e.to_string()));
                    }
                }
                Err(e) => report.error(&label, Issue::Parse(e.to_string())),
            }
        }
        Ok(())
    }

    /// Add a definition, replacing any existing one with the same key
    pub fn insert(&mut self, definition: ResourceDefinition) -> Result<Option<ResourceDefinition>> {
        definition.check_shape()?;
        let canonical = definition.key.canonical();
        self.by_name
            .entry(definition.key.name.clone())
            .or_default()
            .insert(definition.key.clone());
        let previous = self.by_key.insert(canonical, definition);
        if let Some(previous) = &previous {
            log::warn!(
                "Resource {} defined more than once, keeping the later definition",
                previous.key
            );
        }
        Ok(previous)
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&ResourceDefinition> {
        self.by_key.get(&key.canonical())
    }

    pub fn get_canonical(&self, canonical: &str) -> Option<&ResourceDefinition> {
        self.by_key.get(canonical)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.by_key.contains_key(&key.canonical())
    }

    /// Definitions in canonical key order
    pub fn definitions(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.by_key.values()
    }

    pub fn by_name(&self) -> &BTreeMap<String, BTreeSet<ResourceKey>> {
        &self.by_name
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn find_all_matching(&self, constraint: &Constraint) -> BTreeSet<ResourceKey> {
        constraint.find_all_matching(&self.by_name)
    }

    /// Keep only the resources reachable from `seeds`
    ///
    /// Reachability follows `inside`, `environment` and `peers` constraints
    /// until no new resources turn up.
    pub fn prune(&self, seeds: &[ResourceKey]) -> Result<Self> {
        let mut keep: BTreeSet<ResourceKey> = BTreeSet::new();
        let mut work: VecDeque<ResourceKey> = VecDeque::new();
        for seed in seeds {
            if !self.contains(seed) {
                return Err(Error::UnknownResource(seed.label()));
            }
            if keep.insert(seed.clone()) {
                work.push_back(seed.clone());
            }
        }

        while let Some(key) = work.pop_front() {
            let Some(definition) = self.get(&key) else {
                continue;
            };
            for (relationship, constraint) in definition.constraints() {
                let matching = self.find_all_matching(constraint);
                if matching.is_empty() {
                    log::warn!(
                        "{relationship} constraint '{constraint}' in resource {key} has no matching resources"
                    );
                }
                for found in matching {
                    if keep.insert(found.clone()) {
                        log::debug!("{key} reaches {found}");
                        work.push_back(found);
                    }
                }
            }
        }

        Self::from_definitions(keep.iter().filter_map(|k| self.get(k).cloned()))
    }

    /// Validate every definition against the catalog
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();
        self.validate_into(&mut report);
        report
    }

    pub fn validate_into(&self, report: &mut ValidationReport) {
        log::info!("Checking {} resources", self.len());
        for definition in self.definitions() {
            let coverage = self.validate_definition(definition, report);
            report.set_coverage(&definition.key.label(), coverage);
        }
    }

    /// Input-port coverage of one resource, ignoring any findings
    pub fn port_coverage(&self, key: &ResourceKey) -> Option<PortCoverage> {
        let definition = self.get(key)?;
        Some(self.validate_definition(definition, &mut ValidationReport::new()))
    }

    fn validate_definition(
        &self,
        definition: &ResourceDefinition,
        report: &mut ValidationReport,
    ) -> PortCoverage {
        let label = definition.key.label();

        for (qualified, property) in definition.properties() {
            for reference in property.references() {
                match PropertyRef::parse(&reference) {
                    Some(parsed) if definition.has_property(&parsed) => {}
                    Some(_) => report.error(
                        &label,
                        Issue::UndefinedPropertyReference {
                            property: qualified.clone(),
                            reference,
                        },
                    ),
                    None => report.error(
                        &label,
                        Issue::IllFormedPropertyReference {
                            property: qualified.clone(),
                            reference,
                        },
                    ),
                }
            }
        }

        for (name, property) in &definition.config_port {
            if property.property_type == PropertyType::Password && property.default.is_none() {
                report.warning(
                    &label,
                    Issue::PasswordWithoutDefault {
                        property: name.clone(),
                    },
                );
            }
        }

        // relationships apply together, so their coverage combines like an all-of
        PortCoverage::all_of(
            definition
                .constraints()
                .map(|(_, constraint)| constraint.validate(definition, self, report))
                .collect::<Vec<_>>(),
        )
    }

    /// Serialize as a versioned definitions document, sorted by key
    pub fn to_document(&self) -> Result<Value> {
        let mut definitions: Vec<&ResourceDefinition> = self.by_key.values().collect();
        definitions.sort_by(|a, b| a.key.cmp(&b.key));
        let definitions = definitions
            .into_iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(json!({
            "resource_def_version": RESOURCE_DEF_VERSION,
            "resource_definitions": definitions,
        }))
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.to_document()?)?;
        fs::write(path, content).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn read_document(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|e| Error::parse(path.display().to_string(), e.to_string()))
}

/// Accept either a bare list or `{"resource_def_version": ..., "resource_definitions": [...]}`
fn definition_list(document: Value) -> Result<Vec<Value>> {
    match document {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            if let Some(version) = map.get("resource_def_version")
                && version != RESOURCE_DEF_VERSION
            {
                return Err(Error::parse(
                    "document",
                    format!("unsupported resource_def_version {version}"),
                ));
            }
            match map.remove("resource_definitions") {
                Some(Value::Array(items)) => Ok(items),
                _ => Err(Error::parse(
                    "document",
                    "expected a resource_definitions list",
                )),
            }
        }
        _ => Err(Error::parse(
            "document",
            "expected a list of definitions or a resource_definitions object",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::BaseConstraint;
    use serde_json::json;
    use std::io::Write;

    fn sample() -> Catalog {
        Catalog::from_document(json!({
            "resource_def_version": "1.0",
            "resource_definitions": [
                {
                    "key": {"name": "ubuntu-linux", "version": "10.04"},
                    "config_port": {"genforma_home": "path"},
                    "output_ports": {"host": {"genforma_home": "path", "hostname": "hostname"}}
                },
                {
                    "key": {"name": "mysql", "version": "5.1"},
                    "config_port": {
                        "admin_password": "password",
                        "home": {"type": "path", "default": "${input_ports.host.genforma_home}/mysql"}
                    },
                    "input_ports": {"host": {"genforma_home": "path"}},
                    "output_ports": {"mysql": {"host": "hostname", "port": "tcp-port"}},
                    "inside": {"key": {"name": "ubuntu-linux", "version": {"greater-than-or-equal": "10.00"}},
                               "port_mapping": {"host": "host"}}
                },
                {
                    "key": {"name": "sqlite", "version": "3"},
                    "input_ports": {"host": {"genforma_home": "path"}},
                    "output_ports": {"sqlite": {"path": "path"}},
                    "inside": {"key": {"name": "ubuntu-linux", "version": "10.04"},
                               "port_mapping": {"host": "host"}}
                },
                {
                    "key": {"name": "webapp", "version": "1.0"},
                    "input_ports": {
                        "host": {"genforma_home": "path"},
                        "mysql": {"host": "hostname", "port": "tcp-port"},
                        "sqlite": {"path": "path"}
                    },
                    "inside": {"key": {"name": "ubuntu-linux", "version": "10.04"},
                               "port_mapping": {"host": "host"}},
                    "environment": {"one-of": [
                        {"key": {"name": "mysql", "version": "5.1"}, "port_mapping": {"mysql": "mysql"}},
                        {"key": {"name": "sqlite", "version": "3"}, "port_mapping": {"sqlite": "sqlite"}}
                    ]}
                },
                {
                    "key": {"name": "unrelated", "version": "1"}
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_load_indexes_by_key_and_name() {
        let catalog = sample();
        assert_eq!(catalog.len(), 5);
        assert!(catalog.contains(&ResourceKey::new("mysql", "5.1")));
        assert_eq!(catalog.by_name()["mysql"].len(), 1);
        assert!(catalog.get_canonical("webapp@1.0").is_some());
    }

    #[test]
    fn test_list_document_is_accepted() {
        let catalog = Catalog::from_document(json!([
            {"key": {"name": "a", "version": "1"}}
        ]))
        .unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_bad_documents_are_rejected() {
        assert!(Catalog::from_document(json!("nope")).is_err());
        assert!(Catalog::from_document(json!({"resource_def_version": "2.0", "resource_definitions": []})).is_err());
        assert!(Catalog::from_json_str("[{\"display_name\": \"no key\"}]").is_err());
    }

    #[test]
    fn test_lenient_load_skips_bad_definitions() {
        let mut report = ValidationReport::new();
        let catalog = Catalog::from_document_lenient(
            json!([
                {"key": {"name": "good", "version": "1"}},
                {"key": {"name": "bad", "version": "1"}, "config_port": {"x": "float"}},
                {"key": {"name": "host", "version": "1"}, "inside": {"all-of": []}}
            ]),
            &mut report,
        )
        .unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(report.error_count(), 2);
        assert_eq!(report.errors()[0].resource, "bad 1");
    }

    #[test]
    fn test_later_definition_replaces_earlier() {
        let mut catalog = sample();
        let mut replacement = ResourceDefinition::new(ResourceKey::new("mysql", "5.1"));
        replacement.display_name = Some("MySQL".into());
        let previous = catalog.insert(replacement).unwrap();
        assert!(previous.is_some());
        assert_eq!(catalog.len(), 5);
        assert_eq!(
            catalog.get(&ResourceKey::new("mysql", "5.1")).unwrap().display_name(),
            "MySQL"
        );
    }

    #[test]
    fn test_prune_follows_constraints_to_fixed_point() {
        let catalog = sample();
        let pruned = catalog.prune(&[ResourceKey::new("webapp", "1.0")]).unwrap();
        let labels: Vec<String> = pruned.definitions().map(|d| d.key.label()).collect();
        assert_eq!(
            labels,
            vec!["mysql 5.1", "sqlite 3", "ubuntu-linux 10.04", "webapp 1.0"]
        );
    }

    #[test]
    fn test_prune_reaches_resources_through_intermediates() {
        let catalog = Catalog::from_document(json!([
            {
                "key": {"name": "a", "version": "1"},
                "inside": {"one-of": [
                    {"key": {"name": "b", "version": "1"}},
                    {"key": {"name": "missing", "version": "1"}}
                ]}
            },
            {
                "key": {"name": "b", "version": "1"},
                "environment": {"key": {"name": "c", "version": "1"}}
            },
            {"key": {"name": "c", "version": "1"}},
            {"key": {"name": "d", "version": "1"}}
        ]))
        .unwrap();

        let pruned = catalog.prune(&[ResourceKey::new("a", "1")]).unwrap();
        let labels: Vec<String> = pruned.definitions().map(|d| d.key.label()).collect();
        assert_eq!(labels, vec!["a 1", "b 1", "c 1"]);
        assert!(!pruned.contains(&ResourceKey::new("d", "1")));
    }

    #[test]
    fn test_prune_unknown_seed_is_an_error() {
        let err = sample().prune(&[ResourceKey::new("ghost", "1")]).unwrap_err();
        assert!(matches!(err, Error::UnknownResource(k) if k == "ghost 1"));
    }

    #[test]
    fn test_validate_sample() {
        let report = sample().validate();
        assert_eq!(report.error_count(), 0);
        assert_eq!(report.warning_count(), 1);
        assert_eq!(
            report.warnings()[0].issue,
            Issue::PasswordWithoutDefault {
                property: "admin_password".into()
            }
        );

        let coverage = &report.coverage()["webapp 1.0"];
        assert!(coverage.is_guaranteed("host"));
        assert!(coverage.is_maybe("mysql"));
        assert!(coverage.is_maybe("sqlite"));
    }

    #[test]
    fn test_validate_reports_bad_references_and_ports() {
        let catalog = Catalog::from_document(json!([
            {
                "key": {"name": "db", "version": "1"},
                "output_ports": {"db": {"host": "hostname"}}
            },
            {
                "key": {"name": "app", "version": "1"},
                "config_port": {
                    "url": {"type": "string", "default": "${input_ports.db.host}:${input_ports.db.port}"},
                    "other": {"type": "string", "fixed-value": "${properties.x}"}
                },
                "input_ports": {"db": {"host": "hostname", "port": "tcp-port"}},
                "environment": {"all-of": [
                    {"key": {"name": "db", "version": "1"}, "port_mapping": {"db": "db", "cache": "db"}},
                    {"key": {"name": "db", "version": "1"}, "port_mapping": {"db": "database"}},
                    {"key": {"name": "queue", "version": "1"}}
                ]}
            }
        ]))
        .unwrap();

        let report = catalog.validate();
        let issues: Vec<&Issue> = report.errors().iter().map(|f| &f.issue).collect();
        assert!(issues.contains(&&Issue::IllFormedPropertyReference {
            property: "config_port.other".into(),
            reference: "properties.x".into(),
        }));
        assert!(issues.contains(&&Issue::UndefinedInputPort { port: "cache".into() }));
        assert!(issues.contains(&&Issue::MissingOutputProperty {
            port: "db".into(),
            property: "port".into(),
            provider: "db 1".into(),
        }));
        assert!(issues.contains(&&Issue::MissingOutputPort {
            port: "database".into(),
            provider: "db 1".into(),
        }));
        assert_eq!(report.error_count(), 4);
        assert_eq!(
            report.warnings()[0].issue,
            Issue::NoMatchingResource {
                constraint: "queue 1".into()
            }
        );
    }

    #[test]
    fn test_undefined_template_reference() {
        let catalog = Catalog::from_document(json!([{
            "key": {"name": "app", "version": "1"},
            "config_port": {"log": {"type": "path", "default": "${config_port.home}/log"}}
        }]))
        .unwrap();
        let report = catalog.validate();
        assert_eq!(
            report.errors()[0].issue,
            Issue::UndefinedPropertyReference {
                property: "config_port.log".into(),
                reference: "config_port.home".into(),
            }
        );
    }

    #[test]
    fn test_port_coverage_for_single_resource() {
        let catalog = sample();
        let coverage = catalog.port_coverage(&ResourceKey::new("mysql", "5.1")).unwrap();
        assert!(coverage.is_guaranteed("host"));
        assert!(catalog.port_coverage(&ResourceKey::new("x", "1")).is_none());
    }

    #[test]
    fn test_find_all_matching_via_catalog() {
        let catalog = sample();
        let constraint = Constraint::Base(BaseConstraint::new(ResourceKey {
            name: "ubuntu-linux".into(),
            version: crate::key::VersionSpec::Any,
        }));
        assert_eq!(catalog.find_all_matching(&constraint).len(), 1);
    }

    #[test]
    fn test_extensions_merge_and_write_out() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("resource_definitions.json");
        let extension = dir.path().join("resources.json");
        fs::write(
            &primary,
            json!({"resource_def_version": "1.0", "resource_definitions": [
                {"key": {"name": "b", "version": "1"}}
            ]})
            .to_string(),
        )
        .unwrap();
        let mut file = fs::File::create(&extension).unwrap();
        write!(file, "{}", json!([{"key": {"name": "a", "version": "1"}}])).unwrap();

        let mut report = ValidationReport::new();
        let catalog = Catalog::load_with_extensions(&primary, &[&extension], &mut report).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(report.error_count(), 0);

        let out = dir.path().join("out.json");
        catalog.write_to_file(&out).unwrap();
        let reloaded = Catalog::load(&out).unwrap();
        assert_eq!(reloaded.len(), 2);
        let written: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written["resource_definitions"][0]["key"]["name"], json!("a"));
    }
}
