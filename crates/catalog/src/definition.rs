//! Resource definitions

use crate::constraint::Constraint;
use crate::error::{Error, Result};
use crate::key::ResourceKey;
use crate::port::{Port, PropertyDef, PropertyRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// The three ways one resource can depend on another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Relationship {
    /// Containment; the provider hosts the resource
    Inside,
    Environment,
    Peers,
}

impl Relationship {
    pub const ALL: [Self; 3] = [Self::Inside, Self::Environment, Self::Peers];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inside => "inside",
            Self::Environment => "environment",
            Self::Peers => "peers",
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative description of a resource type
///
/// Fields this crate does not interpret (driver hints, documentation) are
/// kept in `extra` so a catalog can be written back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub key: ResourceKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config_port: Port,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input_ports: BTreeMap<String, Port>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output_ports: BTreeMap<String, Port>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inside: Option<Constraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Constraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<Constraint>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceDefinition {
    pub fn new(key: ResourceKey) -> Self {
        Self {
            key,
            display_name: None,
            config_port: Port::new(),
            input_ports: BTreeMap::new(),
            output_ports: BTreeMap::new(),
            inside: None,
            environment: None,
            peers: None,
            extra: Map::new(),
        }
    }

    pub fn display_name(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| self.key.label())
    }

    pub fn constraint(&self, relationship: Relationship) -> Option<&Constraint> {
        match relationship {
            Relationship::Inside => self.inside.as_ref(),
            Relationship::Environment => self.environment.as_ref(),
            Relationship::Peers => self.peers.as_ref(),
        }
    }

    /// Present constraints, in `inside`, `environment`, `peers` order
    pub fn constraints(&self) -> impl Iterator<Item = (Relationship, &Constraint)> {
        Relationship::ALL
            .into_iter()
            .filter_map(|rel| self.constraint(rel).map(|c| (rel, c)))
    }

    /// Check whether a referenced property exists on this definition
    pub fn has_property(&self, reference: &PropertyRef) -> bool {
        match reference {
            PropertyRef::Config { property } => self.config_port.contains_key(property),
            PropertyRef::Input { port, property } => self
                .input_ports
                .get(port)
                .is_some_and(|p| p.contains_key(property)),
            PropertyRef::Output { port, property } => self
                .output_ports
                .get(port)
                .is_some_and(|p| p.contains_key(property)),
        }
    }

    /// Every property with its qualified name, e.g. `input_ports.host.home`
    pub fn properties(&self) -> Vec<(String, &PropertyDef)> {
        let mut out: Vec<(String, &PropertyDef)> = self
            .config_port
            .iter()
            .map(|(name, def)| (format!("config_port.{name}"), def))
            .collect();
        for (port, props) in &self.input_ports {
            out.extend(
                props
                    .iter()
                    .map(|(name, def)| (format!("input_ports.{port}.{name}"), def)),
            );
        }
        for (port, props) in &self.output_ports {
            out.extend(
                props
                    .iter()
                    .map(|(name, def)| (format!("output_ports.{port}.{name}"), def)),
            );
        }
        out
    }

    /// Reject constraint trees the relationship model cannot express
    ///
    /// `inside` names a single host, so it may not be an all-of. A one-of
    /// holds only base constraints and an all-of holds base or one-of children.
    pub fn check_shape(&self) -> Result<()> {
        for (relationship, constraint) in self.constraints() {
            if relationship == Relationship::Inside && matches!(constraint, Constraint::AllOf(_)) {
                return Err(Error::parse(
                    self.key.label(),
                    "an inside constraint cannot be all-of",
                ));
            }
            check_constraint_shape(constraint).map_err(|message| {
                Error::parse(self.key.label(), format!("{relationship} constraint: {message}"))
            })?;
        }
        Ok(())
    }
}

fn check_constraint_shape(constraint: &Constraint) -> std::result::Result<(), String> {
    match constraint {
        Constraint::Base(_) => Ok(()),
        Constraint::OneOf(children) => match children.iter().find(|c| !matches!(c, Constraint::Base(_))) {
            Some(child) => Err(format!("one-of may only contain base constraints, found {}", child.kind())),
            None => Ok(()),
        },
        Constraint::AllOf(children) => {
            for child in children {
                match child {
                    Constraint::Base(_) => {}
                    Constraint::OneOf(_) => check_constraint_shape(child)?,
                    Constraint::AllOf(_) => {
                        return Err("all-of may not contain another all-of".to_string());
                    }
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tomcat() -> ResourceDefinition {
        serde_json::from_value(json!({
            "key": {"name": "tomcat", "version": "6.0"},
            "display_name": "Apache Tomcat",
            "driver_module_name": "engage.drivers.tomcat",
            "config_port": {
                "home": {"type": "path", "default": "${input_ports.host.genforma_home}/tomcat"},
                "admin_password": "password"
            },
            "input_ports": {
                "host": {"genforma_home": "path", "hostname": "hostname"},
                "java": {"home": "path"}
            },
            "output_ports": {
                "tomcat": {"home": {"type": "path", "source": "config_port.home"}}
            },
            "inside": {"key": {"name": "ubuntu-linux", "version": "9.10"},
                       "port_mapping": {"host": "host"}},
            "environment": {"one-of": [
                {"key": {"name": "java-runtime", "version": "1.6"}, "port_mapping": {"java": "java"}},
                {"key": {"name": "jdk", "version": "1.6"}, "port_mapping": {"java": "java"}}
            ]}
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_full_definition() {
        let def = tomcat();
        assert_eq!(def.display_name(), "Apache Tomcat");
        assert_eq!(def.input_ports.len(), 2);
        assert_eq!(
            def.constraints().map(|(r, _)| r).collect::<Vec<_>>(),
            vec![Relationship::Inside, Relationship::Environment]
        );
        assert_eq!(def.extra["driver_module_name"], json!("engage.drivers.tomcat"));
        assert!(def.check_shape().is_ok());
    }

    #[test]
    fn test_has_property() {
        let def = tomcat();
        assert!(def.has_property(&PropertyRef::parse("config_port.home").unwrap()));
        assert!(def.has_property(&PropertyRef::parse("input_ports.java.home").unwrap()));
        assert!(!def.has_property(&PropertyRef::parse("input_ports.java.bin").unwrap()));
        assert!(!def.has_property(&PropertyRef::parse("output_ports.web.home").unwrap()));
    }

    #[test]
    fn test_properties_are_qualified() {
        let def = tomcat();
        let names: Vec<String> = def.properties().into_iter().map(|(n, _)| n).collect();
        assert!(names.contains(&"config_port.admin_password".to_string()));
        assert!(names.contains(&"input_ports.host.hostname".to_string()));
        assert!(names.contains(&"output_ports.tomcat.home".to_string()));
    }

    #[test]
    fn test_inside_all_of_is_rejected() {
        let mut def = tomcat();
        def.inside = Some(Constraint::AllOf(Vec::new()));
        let err = def.check_shape().unwrap_err();
        assert!(err.to_string().contains("cannot be all-of"));
    }

    #[test]
    fn test_nested_one_of_is_rejected() {
        let mut def = tomcat();
        def.peers = Some(Constraint::OneOf(vec![Constraint::OneOf(Vec::new())]));
        assert!(def.check_shape().is_err());

        def.peers = Some(Constraint::AllOf(vec![Constraint::OneOf(Vec::new())]));
        assert!(def.check_shape().is_ok());
    }

    #[test]
    fn test_write_out_keeps_unknown_fields() {
        let value = serde_json::to_value(tomcat()).unwrap();
        assert_eq!(value["driver_module_name"], json!("engage.drivers.tomcat"));
        assert_eq!(value["config_port"]["admin_password"], json!("password"));
    }
}
