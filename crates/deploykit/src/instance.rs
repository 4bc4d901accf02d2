//! Concrete resource instances
//!
//! An instance is a resolved node of an install spec: it names its
//! dependencies by id rather than by constraint, and carries the property
//! values its manager needs.

use crate::error::{Error, Result};
use catalog::ResourceKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Ordered property bag addressed by dotted paths
///
/// `add` only creates leaves under existing parents and never overwrites,
/// so a path that resolved once keeps resolving to the same value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(Map<String, Value>);

impl Properties {
    /// Empty property set
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `a.b.c`
    pub fn get(&self, qualified: &str) -> Option<&Value> {
        let mut parts = qualified.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Look up `a.b.c` as a string
    pub fn get_str(&self, qualified: &str) -> Option<&str> {
        self.get(qualified).and_then(Value::as_str)
    }

    pub fn get_bool(&self, qualified: &str) -> Option<bool> {
        self.get(qualified).and_then(Value::as_bool)
    }

    /// Add a new leaf at `a.b.c`
    ///
    /// Every parent (`a`, `a.b`) must already exist as an object and the leaf
    /// must not exist yet.
    pub fn add(&mut self, qualified: &str, value: Value) -> Result<()> {
        let invalid = |reason: &str| Error::Property {
            path: qualified.to_string(),
            reason: reason.to_string(),
        };
        let (parent, leaf) = match qualified.rsplit_once('.') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, qualified),
        };
        if leaf.is_empty() {
            return Err(invalid("empty property name"));
        }

        let mut target = &mut self.0;
        if let Some(parent) = parent {
            for part in parent.split('.') {
                target = target
                    .get_mut(part)
                    .and_then(Value::as_object_mut)
                    .ok_or_else(|| invalid("parent does not exist"))?;
            }
        }
        if target.contains_key(leaf) {
            return Err(invalid("property already defined"));
        }
        target.insert(leaf.to_string(), value);
        Ok(())
    }

    /// Set a top-level property, returning the value it replaced
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Properties {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Resolved pointer to another instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: String,
    pub key: ResourceKey,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub port_mapping: BTreeMap<String, String>,
}

impl ResourceRef {
    pub fn new(id: impl Into<String>, key: ResourceKey) -> Self {
        Self {
            id: id.into(),
            key,
            port_mapping: BTreeMap::new(),
        }
    }
}

/// A concrete resource in an install spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInstance {
    pub id: String,
    pub key: ResourceKey,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub config_port: Properties,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input_ports: BTreeMap<String, Properties>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output_ports: BTreeMap<String, Properties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inside: Option<ResourceRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<ResourceRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers: Vec<ResourceRef>,
    #[serde(default)]
    pub installed: bool,
    /// Driver id overriding the configured driver for this key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
}

impl ResourceInstance {
    pub fn new(id: impl Into<String>, key: ResourceKey) -> Self {
        Self {
            id: id.into(),
            key,
            properties: Properties::new(),
            config_port: Properties::new(),
            input_ports: BTreeMap::new(),
            output_ports: BTreeMap::new(),
            inside: None,
            environment: Vec::new(),
            peers: Vec::new(),
            installed: false,
            driver: None,
        }
    }

    pub fn inside_of(mut self, host: &Self) -> Self {
        self.inside = Some(host.to_ref());
        self
    }

    pub fn with_environment(mut self, dependency: &Self) -> Self {
        self.environment.push(dependency.to_ref());
        self
    }

    pub fn with_peer(mut self, peer: &Self) -> Self {
        self.peers.push(peer.to_ref());
        self
    }

    /// A reference to this instance
    pub fn to_ref(&self) -> ResourceRef {
        ResourceRef::new(self.id.clone(), self.key.clone())
    }

    /// `inside`, then `environment`, then `peers`
    pub fn references(&self) -> impl Iterator<Item = &ResourceRef> {
        self.inside
            .iter()
            .chain(self.environment.iter())
            .chain(self.peers.iter())
    }

    /// All port values in one bag, addressable with qualified references
    pub fn config(&self) -> Properties {
        let ports = |ports: &BTreeMap<String, Properties>| {
            Value::Object(
                ports
                    .iter()
                    .map(|(name, props)| (name.clone(), Value::Object(props.as_map().clone())))
                    .collect(),
            )
        };
        let mut config = Properties::new();
        config.insert(
            "config_port",
            Value::Object(self.config_port.as_map().clone()),
        );
        config.insert("input_ports", ports(&self.input_ports));
        config.insert("output_ports", ports(&self.output_ports));
        config
    }

    /// Look up a qualified property such as `output_ports.host.genforma_home`
    ///
    /// The first segment selects `config_port`, `input_ports`,
    /// `output_ports` or `properties`.
    pub fn property(&self, qualified: &str) -> Option<&Value> {
        let (section, rest) = qualified.split_once('.')?;
        match section {
            "config_port" => self.config_port.get(rest),
            "properties" => self.properties.get(rest),
            "input_ports" | "output_ports" => {
                let ports = if section == "input_ports" {
                    &self.input_ports
                } else {
                    &self.output_ports
                };
                let (port, property) = rest.split_once('.')?;
                ports.get(port)?.get(property)
            }
            _ => None,
        }
    }
}

/// Replace or append instances by id, then refresh the keys of every
/// reference to a replaced instance
///
/// Used to fold previously installed resources back into an install spec.
pub fn merge_instances(
    spec: Vec<ResourceInstance>,
    updates: Vec<ResourceInstance>,
) -> Vec<ResourceInstance> {
    let mut merged = spec;
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, inst)| (inst.id.clone(), i))
        .collect();
    let mut updated_keys: HashMap<String, ResourceKey> = HashMap::new();

    for update in updates {
        updated_keys.insert(update.id.clone(), update.key.clone());
        match index.get(&update.id) {
            Some(&i) => merged[i] = update,
            None => {
                index.insert(update.id.clone(), merged.len());
                merged.push(update);
            }
        }
    }

    for instance in &mut merged {
        let refs = instance
            .inside
            .iter_mut()
            .chain(instance.environment.iter_mut())
            .chain(instance.peers.iter_mut());
        for reference in refs {
            if let Some(key) = updated_keys.get(&reference.id) {
                reference.key = key.clone();
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_properties_get_and_add() {
        let mut props: Properties = serde_json::from_value(json!({
            "host": {"name": "web1", "os": {"family": "linux"}}
        }))
        .unwrap();
        assert_eq!(props.get_str("host.os.family"), Some("linux"));
        assert_eq!(props.get("host.missing"), None);

        props.add("host.os.arch", json!("x86_64")).unwrap();
        assert_eq!(props.get_str("host.os.arch"), Some("x86_64"));
        props.add("top", json!(true)).unwrap();
        assert_eq!(props.get_bool("top"), Some(true));
    }

    #[test]
    fn test_properties_add_rejects_bad_paths() {
        let mut props: Properties = serde_json::from_value(json!({"a": {"b": 1}})).unwrap();
        let err = props.add("a.b", json!(2)).unwrap_err();
        assert!(err.to_string().contains("already defined"));
        assert!(props.add("x.y", json!(2)).is_err());
        assert!(props.add("a.b.c", json!(2)).is_err());
        assert!(props.add("a.", json!(2)).is_err());
        assert_eq!(props.get("a.b"), Some(&json!(1)));
    }

    #[test]
    fn test_instance_json_shape() {
        let instance: ResourceInstance = serde_json::from_value(json!({
            "id": "mysql-1",
            "key": {"name": "mysql", "version": "5.1"},
            "config_port": {"port": 3306},
            "input_ports": {"host": {"genforma_home": "/opt/gf"}},
            "output_ports": {"mysql": {"host": "db.local", "port": 3306}},
            "inside": {"id": "server", "key": {"name": "ubuntu-linux", "version": "10.04"},
                       "port_mapping": {"host": "host"}}
        }))
        .unwrap();
        assert!(!instance.installed);
        assert_eq!(instance.references().count(), 1);
        assert_eq!(
            instance.property("input_ports.host.genforma_home"),
            Some(&json!("/opt/gf"))
        );
        assert_eq!(instance.property("config_port.port"), Some(&json!(3306)));
        assert_eq!(instance.property("output_ports.mysql"), None);
        assert_eq!(instance.property("nowhere.x"), None);

        let config = instance.config();
        assert_eq!(config.get_str("input_ports.host.genforma_home"), Some("/opt/gf"));
        assert_eq!(config.get("config_port.port"), Some(&json!(3306)));
        assert_eq!(config.len(), 3);

        let value = serde_json::to_value(&instance).unwrap();
        assert!(value.get("environment").is_none());
        assert_eq!(value["installed"], json!(false));
        let back: ResourceInstance = serde_json::from_value(value).unwrap();
        assert_eq!(back, instance);
    }

    #[test]
    fn test_merge_instances_replaces_and_fixes_references() {
        let server = ResourceInstance::new("server", ResourceKey::new("ubuntu-linux", "10.04"));
        let app = ResourceInstance::new("app", ResourceKey::new("webapp", "1.0")).inside_of(&server);

        let mut upgraded = ResourceInstance::new("server", ResourceKey::new("ubuntu-linux", "12.04"));
        upgraded.installed = true;
        let extra = ResourceInstance::new("monitor", ResourceKey::new("monit", "5"));

        let merged = merge_instances(vec![server, app], vec![upgraded, extra]);
        let ids: Vec<&str> = merged.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["server", "app", "monitor"]);
        assert!(merged[0].installed);
        assert_eq!(
            merged[1].inside.as_ref().map(|r| r.key.label()),
            Some("ubuntu-linux 12.04".to_string())
        );
    }
}
