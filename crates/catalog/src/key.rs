//! Resource keys and version specifications
//!
//! Versions are opaque strings. Bounds compare them with plain string
//! ordering, so `"10.0" < "9.0"`; definitions that need numeric ordering
//! must zero-pad their versions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version part of a [`ResourceKey`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "VersionRepr", into = "VersionRepr")]
pub enum VersionSpec {
    /// A specific version string
    Exact(String),
    /// `*`, matches every version
    Any,
    /// Zero or more bounds, all of which must hold
    Bounds(VersionBounds),
}

/// Upper and lower bounds on a version string
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionBounds {
    #[serde(rename = "greater-than", default, skip_serializing_if = "Option::is_none")]
    pub greater_than: Option<String>,
    #[serde(
        rename = "greater-than-or-equal",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub greater_than_or_equal: Option<String>,
    #[serde(rename = "less-than", default, skip_serializing_if = "Option::is_none")]
    pub less_than: Option<String>,
    #[serde(
        rename = "less-than-or-equal",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub less_than_or_equal: Option<String>,
}

impl VersionBounds {
    /// Check whether every present bound holds for `version`
    pub fn contains(&self, version: &str) -> bool {
        self.greater_than.as_deref().is_none_or(|b| version > b)
            && self.greater_than_or_equal.as_deref().is_none_or(|b| version >= b)
            && self.less_than.as_deref().is_none_or(|b| version < b)
            && self.less_than_or_equal.as_deref().is_none_or(|b| version <= b)
    }

    pub fn is_empty(&self) -> bool {
        self.greater_than.is_none()
            && self.greater_than_or_equal.is_none()
            && self.less_than.is_none()
            && self.less_than_or_equal.is_none()
    }
}

impl VersionSpec {
    /// Check whether a candidate's version satisfies this spec
    ///
    /// Literal equality always matches. Beyond that, `*` accepts anything and
    /// bounds accept exact candidate versions that fall inside them.
    pub fn accepts(&self, candidate: &Self) -> bool {
        if self == candidate {
            return true;
        }
        match (self, candidate) {
            (Self::Any, _) => true,
            (Self::Bounds(bounds), Self::Exact(version)) => bounds.contains(version),
            _ => false,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "{v}"),
            Self::Any => write!(f, "*"),
            Self::Bounds(b) => {
                let mut parts = Vec::new();
                if let Some(v) = &b.greater_than {
                    parts.push(format!(">{v}"));
                }
                if let Some(v) = &b.greater_than_or_equal {
                    parts.push(format!(">={v}"));
                }
                if let Some(v) = &b.less_than {
                    parts.push(format!("<{v}"));
                }
                if let Some(v) = &b.less_than_or_equal {
                    parts.push(format!("<={v}"));
                }
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum VersionRepr {
    Text(String),
    Bounds(VersionBounds),
}

impl From<VersionRepr> for VersionSpec {
    fn from(repr: VersionRepr) -> Self {
        match repr {
            VersionRepr::Text(s) if s == "*" => Self::Any,
            VersionRepr::Text(s) => Self::Exact(s),
            VersionRepr::Bounds(b) => Self::Bounds(b),
        }
    }
}

impl From<VersionSpec> for VersionRepr {
    fn from(spec: VersionSpec) -> Self {
        match spec {
            VersionSpec::Exact(s) => Self::Text(s),
            VersionSpec::Any => Self::Text("*".to_string()),
            VersionSpec::Bounds(b) => Self::Bounds(b),
        }
    }
}

/// Name and version identifying a resource type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub name: String,
    pub version: VersionSpec,
}

impl ResourceKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: VersionSpec::from(VersionRepr::Text(version.into())),
        }
    }

    /// Canonical string used for catalog lookups
    ///
    /// Two keys that deserialize to the same value always produce the same
    /// string, whatever JSON spelling they came from, and different keys never
    /// share one. Bounds render in brackets (`py@[>2,<3]`); a name or exact
    /// version that could be mistaken for another shape is JSON-quoted.
    pub fn canonical(&self) -> String {
        let name = if self.name.contains(['@', '"']) {
            quoted(&self.name)
        } else {
            self.name.clone()
        };
        let version = match &self.version {
            VersionSpec::Exact(v) if v == "*" || v.starts_with(['[', '"']) => quoted(v),
            VersionSpec::Exact(v) => v.clone(),
            VersionSpec::Any => "*".to_string(),
            VersionSpec::Bounds(_) => format!("[{}]", self.version),
        };
        format!("{name}@{version}")
    }

    /// Human-readable label, e.g. `mysql 5.1` or `2.6 <= python < 3.0`
    pub fn label(&self) -> String {
        match &self.version {
            VersionSpec::Exact(v) => format!("{} {v}", self.name),
            VersionSpec::Any => format!("{} *", self.name),
            VersionSpec::Bounds(b) => {
                let mut s = if let Some(v) = &b.greater_than {
                    format!("{v} < {}", self.name)
                } else if let Some(v) = &b.greater_than_or_equal {
                    format!("{v} <= {}", self.name)
                } else {
                    self.name.clone()
                };
                if let Some(v) = &b.less_than {
                    s = format!("{s} < {v}");
                } else if let Some(v) = &b.less_than_or_equal {
                    s = format!("{s} <= {v}");
                }
                s
            }
        }
    }
}

fn quoted(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
