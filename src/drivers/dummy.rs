//! Drivers that only log, for trying out specs and plans

use anyhow::Result;
use deploykit::{Manager, Package, ResourceInstance};

/// Plain resource that logs each lifecycle call
#[derive(Debug)]
pub struct DummyDriver {
    id: String,
    name: String,
    installed: bool,
}

impl DummyDriver {
    pub fn new(instance: &ResourceInstance) -> Self {
        Self {
            id: instance.id.clone(),
            name: format!("{} (dummy)", instance.key),
            installed: instance.installed,
        }
    }
}

impl Manager for DummyDriver {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_installed(&self) -> bool {
        self.installed
    }

    fn validate_pre_install(&mut self) -> Result<()> {
        log::info!("{}: validate_pre_install called", self.name);
        Ok(())
    }

    fn install(&mut self, _package: &dyn Package) -> Result<()> {
        if self.installed {
            anyhow::bail!("{}: install called when already installed", self.name);
        }
        log::info!("{}: install called", self.name);
        self.installed = true;
        Ok(())
    }

    fn validate_post_install(&mut self) -> Result<()> {
        log::info!("{}: validate_post_install called", self.name);
        Ok(())
    }
}

/// Service that keeps its running state in memory
#[derive(Debug)]
pub struct DummyServiceDriver {
    inner: DummyDriver,
    started: bool,
}

impl DummyServiceDriver {
    pub fn new(instance: &ResourceInstance) -> Self {
        let mut inner = DummyDriver::new(instance);
        inner.name = format!("{} (dummy service)", instance.key);
        Self {
            inner,
            started: false,
        }
    }
}

impl Manager for DummyServiceDriver {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn is_installed(&self) -> bool {
        self.inner.is_installed()
    }

    fn validate_pre_install(&mut self) -> Result<()> {
        self.inner.validate_pre_install()
    }

    fn install(&mut self, package: &dyn Package) -> Result<()> {
        self.inner.install(package)
    }

    fn validate_post_install(&mut self) -> Result<()> {
        self.inner.validate_post_install()
    }

    fn is_service(&self) -> bool {
        true
    }

    fn is_running(&self) -> bool {
        self.started
    }

    fn start(&mut self) -> Result<()> {
        if self.started {
            anyhow::bail!("{}: start was already called", self.inner.name);
        }
        log::info!("{}: start called", self.inner.name);
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.started {
            anyhow::bail!("{}: stop called on a service that was not started", self.inner.name);
        }
        log::info!("{}: stop called", self.inner.name);
        self.started = false;
        Ok(())
    }
}
