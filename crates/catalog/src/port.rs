//! Port and property definitions
//!
//! A definition has one config port plus named input and output ports. Each
//! port maps property names to a [`PropertyDef`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Property name to definition
pub type Port = BTreeMap<String, PropertyDef>;

/// Type of a port property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropertyType {
    String,
    Int,
    Bool,
    Path,
    Password,
    Hostname,
    TcpPort,
    List,
    Map,
}

/// Definition of a single port property
///
/// In JSON this is either the bare type name (`"path"`) or an object with a
/// `type` and optional `default`, `fixed-value` and `source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PropertyRepr", into = "PropertyRepr")]
pub struct PropertyDef {
    pub property_type: PropertyType,
    pub default: Option<Value>,
    pub fixed_value: Option<Value>,
    /// Another property this one is copied from
    pub source: Option<String>,
}

impl PropertyDef {
    pub fn new(property_type: PropertyType) -> Self {
        Self {
            property_type,
            default: None,
            fixed_value: None,
            source: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// All property references made by this definition
    ///
    /// `source` is a reference by itself; string defaults and fixed values
    /// contribute their `${...}` template references.
    pub fn references(&self) -> Vec<String> {
        let mut refs = Vec::new();
        if let Some(source) = &self.source {
            refs.push(source.clone());
        }
        for value in [&self.default, &self.fixed_value].into_iter().flatten() {
            if let Value::String(s) = value {
                refs.extend(template_references(s));
            }
        }
        refs
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged, deny_unknown_fields)]
enum PropertyRepr {
    Type(PropertyType),
    Full {
        #[serde(rename = "type")]
        property_type: PropertyType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
        #[serde(rename = "fixed-value", default, skip_serializing_if = "Option::is_none")]
        fixed_value: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
}

impl From<PropertyRepr> for PropertyDef {
    fn from(repr: PropertyRepr) -> Self {
        match repr {
            PropertyRepr::Type(property_type) => Self::new(property_type),
            PropertyRepr::Full {
                property_type,
                default,
                fixed_value,
                source,
            } => Self {
                property_type,
                default,
                fixed_value,
                source,
            },
        }
    }
}

impl From<PropertyDef> for PropertyRepr {
    fn from(def: PropertyDef) -> Self {
        if def.default.is_none() && def.fixed_value.is_none() && def.source.is_none() {
            return Self::Type(def.property_type);
        }
        Self::Full {
            property_type: def.property_type,
            default: def.default,
            fixed_value: def.fixed_value,
            source: def.source,
        }
    }
}

fn template_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{[a-zA-Z0-9_]+(?:\.[a-zA-Z0-9_]+)*\}")
            .expect("template reference pattern must be valid")
    })
}

/// Extract the qualified names referenced as `${a.b.c}` in a template string
pub fn template_references(template: &str) -> Vec<String> {
    template_pattern()
        .find_iter(template)
        .map(|m| {
            let s = m.as_str();
            s[2..s.len() - 1].to_string()
        })
        .collect()
}

/// A parsed reference to a property on the same resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyRef {
    /// `config_port.<prop>`
    Config { property: String },
    /// `input_ports.<port>.<prop>`
    Input { port: String, property: String },
    /// `output_ports.<port>.<prop>`
    Output { port: String, property: String },
}

impl PropertyRef {
    /// Parse a qualified name, returning `None` when it has the wrong shape
    pub fn parse(qualified: &str) -> Option<Self> {
        let parts: Vec<&str> = qualified.split('.').collect();
        match parts.as_slice() {
            ["config_port", property] => Some(Self::Config {
                property: (*property).to_string(),
            }),
            ["input_ports", port, property] => Some(Self::Input {
                port: (*port).to_string(),
                property: (*property).to_string(),
            }),
            ["output_ports", port, property] => Some(Self::Output {
                port: (*port).to_string(),
                property: (*property).to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { property } => write!(f, "config_port.{property}"),
            Self::Input { port, property } => write!(f, "input_ports.{port}.{property}"),
            Self::Output { port, property } => write!(f, "output_ports.{port}.{property}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_property_def_short_and_long_forms() {
        let short: PropertyDef = serde_json::from_value(json!("tcp-port")).unwrap();
        assert_eq!(short, PropertyDef::new(PropertyType::TcpPort));

        let long: PropertyDef = serde_json::from_value(json!({
            "type": "path",
            "default": "${config_port.home}/logs",
            "source": "input_ports.host.home"
        }))
        .unwrap();
        assert_eq!(long.property_type, PropertyType::Path);
        assert_eq!(
            long.references(),
            vec!["input_ports.host.home", "config_port.home"]
        );
    }

    #[test]
    fn test_unknown_property_type_is_rejected() {
        assert!(serde_json::from_value::<PropertyDef>(json!("float")).is_err());
    }

    #[test]
    fn test_misspelled_property_keys_are_rejected() {
        let typo = json!({"type": "path", "fixed_value": "/opt"});
        assert!(serde_json::from_value::<PropertyDef>(typo).is_err());

        let fixed: PropertyDef =
            serde_json::from_value(json!({"type": "path", "fixed-value": "/opt"})).unwrap();
        assert_eq!(fixed.fixed_value, Some(json!("/opt")));
    }

    #[test]
    fn test_template_references() {
        assert_eq!(
            template_references("${input_ports.host.home}/x-${config_port.name}"),
            vec!["input_ports.host.home", "config_port.name"]
        );
        assert!(template_references("$HOME and ${not valid}").is_empty());
    }

    #[test]
    fn test_non_string_defaults_have_no_references() {
        let def = PropertyDef::new(PropertyType::Int).with_default(json!(8080));
        assert!(def.references().is_empty());
    }

    #[test]
    fn test_property_ref_parse() {
        assert_eq!(
            PropertyRef::parse("config_port.port"),
            Some(PropertyRef::Config {
                property: "port".into()
            })
        );
        assert_eq!(
            PropertyRef::parse("output_ports.mysql.host").map(|r| r.to_string()),
            Some("output_ports.mysql.host".to_string())
        );
        assert_eq!(PropertyRef::parse("config_port.a.b"), None);
        assert_eq!(PropertyRef::parse("input_ports.host"), None);
        assert_eq!(PropertyRef::parse("properties.x"), None);
    }
}
