//! Managers bound to resource instances
//!
//! Drivers are picked by id. An instance may name its driver directly;
//! otherwise the `[drivers]` table of the config maps resource keys to ids.

mod command;
mod dummy;
mod install_target;

pub use command::CommandDriver;
pub use dummy::{DummyDriver, DummyServiceDriver};
pub use install_target::InstallTargetDriver;

use anyhow::Result;
use deploykit::{Manager, ManagerFactory, ResourceInstance, RunContext};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::state;

/// Every driver id the registry can build
pub const DRIVER_IDS: &[&str] = &["install-target", "dummy", "dummy-service", "command"];

pub fn is_known(id: &str) -> bool {
    DRIVER_IDS.contains(&id)
}

/// Maps resource keys to driver ids and builds managers from them
#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, String>,
}

impl DriverRegistry {
    pub fn new(drivers: BTreeMap<String, String>) -> Self {
        Self { drivers }
    }

    pub fn with_driver(mut self, key: impl Into<String>, driver: impl Into<String>) -> Self {
        self.drivers.insert(key.into(), driver.into());
        self
    }

    /// Driver id for an instance: its own `driver` field, then the full key
    /// label, then the bare resource name
    pub fn resolve<'a>(&'a self, instance: &'a ResourceInstance) -> Option<&'a str> {
        instance
            .driver
            .as_deref()
            .or_else(|| self.drivers.get(&instance.key.label()).map(String::as_str))
            .or_else(|| self.drivers.get(&instance.key.name).map(String::as_str))
    }

    /// Manifest written by the install target among `instances`
    ///
    /// Without exactly one install target this is the manifest under the
    /// context's deployment home; the sequencer rejects such runs anyway.
    pub fn manifest_path(&self, instances: &[ResourceInstance], ctx: &RunContext) -> PathBuf {
        let mut targets = instances
            .iter()
            .filter(|instance| self.resolve(instance) == Some("install-target"))
            .map(|instance| InstallTargetDriver::new(instance, ctx))
            .filter(|driver| driver.use_as_install_target());
        match (targets.next(), targets.next()) {
            (Some(target), None) => target.manifest_path(),
            _ => state::manifest_path(&ctx.deployment_home),
        }
    }
}

impl ManagerFactory for DriverRegistry {
    fn create(&self, instance: &ResourceInstance, ctx: &RunContext) -> Result<Box<dyn Manager>> {
        let Some(driver) = self.resolve(instance) else {
            anyhow::bail!("no driver configured for {}", instance.key);
        };
        log::debug!("Binding {} to driver {}", instance.id, driver);

        let manager: Box<dyn Manager> = match driver {
            "install-target" => Box::new(InstallTargetDriver::new(instance, ctx)),
            "dummy" => Box::new(DummyDriver::new(instance)),
            "dummy-service" => Box::new(DummyServiceDriver::new(instance)),
            "command" => Box::new(CommandDriver::new(instance, ctx)),
            other => anyhow::bail!(
                "unknown driver '{}' (known: {})",
                other,
                DRIVER_IDS.join(", ")
            ),
        };
        Ok(manager)
    }
}
