//! # Catalog
//!
//! Resource definitions and the constraint engine that relates them.
//!
//! A definition describes a resource *type*: its key (name and version), its
//! config, input and output ports, and up to three constraints naming the
//! resources it must run `inside`, alongside (`environment`) or next to
//! (`peers`).
//!
//! ## Example
//!
//! ```ignore
//! use catalog::{Catalog, ResourceKey};
//!
//! let catalog = Catalog::load("resource_definitions.json".as_ref())?;
//! let report = catalog.validate();
//! println!("{} errors, {} warnings", report.error_count(), report.warning_count());
//!
//! let pruned = catalog.prune(&[ResourceKey::new("django-app", "1.0")])?;
//! pruned.write_to_file("pruned.json".as_ref())?;
//! ```

pub mod catalog;
pub mod constraint;
pub mod definition;
pub mod error;
pub mod key;
pub mod port;
pub mod validate;

pub use catalog::{Catalog, RESOURCE_DEF_VERSION};
pub use constraint::{BaseConstraint, Constraint, PortCoverage};
pub use definition::{Relationship, ResourceDefinition};
pub use error::{Error, Result};
pub use key::{ResourceKey, VersionBounds, VersionSpec};
pub use port::{Port, PropertyDef, PropertyRef, PropertyType, template_references};
pub use validate::{Finding, Issue, ValidationReport};
