use anyhow::Result;
use deploykit::{Manager, Package, ResourceInstance, RunContext};
use std::path::PathBuf;

use crate::state;

/// The machine the deployment lands on
///
/// Never installed by engage itself. Exactly one of these per run writes the
/// manifest of installed resources once every resource succeeded.
#[derive(Debug)]
pub struct InstallTargetDriver {
    id: String,
    use_as_target: bool,
    deployment_home: PathBuf,
    dry_run: bool,
}

impl InstallTargetDriver {
    pub fn new(instance: &ResourceInstance, ctx: &RunContext) -> Self {
        let use_as_target = instance
            .properties
            .get_bool("use_as_install_target")
            .or_else(|| instance.config_port.get_bool("use_as_install_target"))
            .unwrap_or(true);

        let deployment_home = instance
            .output_ports
            .get("host")
            .and_then(|host| host.get_str("deployment_home"))
            .map_or_else(|| ctx.deployment_home.clone(), PathBuf::from);

        Self {
            id: instance.id.clone(),
            use_as_target,
            deployment_home,
            dry_run: ctx.dry_run,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        state::manifest_path(&self.deployment_home)
    }
}

impl Manager for InstallTargetDriver {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_installed(&self) -> bool {
        true
    }

    fn install(&mut self, _package: &dyn Package) -> Result<()> {
        anyhow::bail!("{} is an install target and cannot be installed", self.id)
    }

    fn can_be_install_target(&self) -> bool {
        true
    }

    fn use_as_install_target(&self) -> bool {
        self.use_as_target
    }

    fn write_resources_to_file(&self, resources: &[ResourceInstance]) -> Result<()> {
        let path = self.manifest_path();
        if self.dry_run {
            log::info!("[dry-run] Would write {} resource(s) to {}", resources.len(), path.display());
            return Ok(());
        }
        state::write_manifest(&path, resources)
    }
}
