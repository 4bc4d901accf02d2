//! Driver that runs shell commands from the instance's config port
//!
//! Recognized keys: `install_command`, `check_command`, `start_command`,
//! `stop_command` and `status_command`. Each runs through `sh -c` with the
//! deployment home and the package location in the environment. A check or
//! status command exiting 0 means installed or running.
//!
//! Archive packages are unpacked before `install_command` runs, into
//! `install_dir` when the config port sets one and the deployment home
//! otherwise. The unpacked top-level directory is passed as
//! `ENGAGE_PACKAGE_DIR`.

use anyhow::{Context, Result};
use deploykit::{Manager, Package, ResourceInstance, RunContext};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Debug, Default)]
struct Commands {
    install: Option<String>,
    check: Option<String>,
    start: Option<String>,
    stop: Option<String>,
    status: Option<String>,
}

#[derive(Debug)]
pub struct CommandDriver {
    id: String,
    commands: Commands,
    deployment_home: PathBuf,
    install_dir: Option<PathBuf>,
    dry_run: bool,
    installed: bool,
    started: bool,
}

impl CommandDriver {
    pub fn new(instance: &ResourceInstance, ctx: &RunContext) -> Self {
        let get = |key: &str| instance.config_port.get_str(key).map(str::to_string);
        Self {
            id: instance.id.clone(),
            commands: Commands {
                install: get("install_command"),
                check: get("check_command"),
                start: get("start_command"),
                stop: get("stop_command"),
                status: get("status_command"),
            },
            deployment_home: ctx.deployment_home.clone(),
            install_dir: get("install_dir").map(|dir| crate::paths::expand(&dir)),
            dry_run: ctx.dry_run,
            installed: instance.installed,
            started: false,
        }
    }

    fn shell(&self, script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script])
            .env("ENGAGE_RESOURCE_ID", &self.id)
            .env("ENGAGE_DEPLOYMENT_HOME", &self.deployment_home)
            .stdin(Stdio::null());
        cmd
    }

    /// Run a command, failing with its stderr on a non-zero exit
    fn run(&self, mut cmd: Command, script: &str) -> Result<()> {
        if self.dry_run {
            log::info!("[dry-run] {}: {}", self.id, script);
            return Ok(());
        }
        log::debug!("{}: running {}", self.id, script);
        let output = cmd
            .output()
            .with_context(|| format!("Failed to execute: sh -c {script}"))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            log::debug!("{}: {}", self.id, stdout.trim());
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Command failed ({}): {}: {}",
                output.status,
                script,
                stderr.trim()
            );
        }
        Ok(())
    }

    /// Unpack an archive package, returning the extracted top directory
    ///
    /// Nothing is written under dry run, so there is no directory to return.
    fn unpack(&self, package: &dyn Package) -> Result<Option<PathBuf>> {
        let target: &Path = self.install_dir.as_deref().unwrap_or(&self.deployment_home);
        if self.dry_run {
            log::info!(
                "[dry-run] {}: extract {} into {}",
                self.id,
                package.location(),
                target.display()
            );
            return Ok(None);
        }
        let top = package
            .extract(target)
            .with_context(|| format!("{}: failed to unpack {}", self.id, package.location()))?;
        log::debug!("{}: unpacked {} into {}", self.id, top, target.display());
        Ok(Some(target.join(top)))
    }

    /// Run a probe command, true on exit 0
    fn probe(&self, script: &str) -> bool {
        self.shell(script)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Manager for CommandDriver {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_installed(&self) -> bool {
        if self.installed {
            return true;
        }
        self.commands.check.as_deref().is_some_and(|c| self.probe(c))
    }

    fn install(&mut self, package: &dyn Package) -> Result<()> {
        let unpacked = if package.is_archive() {
            self.unpack(package)?
        } else {
            None
        };
        let Some(script) = &self.commands.install else {
            log::info!("{}: no install_command, nothing to run", self.id);
            self.installed = true;
            return Ok(());
        };
        let mut cmd = self.shell(script);
        cmd.env("ENGAGE_PACKAGE", package.location());
        if let Ok(file) = package.file() {
            cmd.env("ENGAGE_PACKAGE_FILE", file);
        }
        if let Some(dir) = unpacked {
            cmd.env("ENGAGE_PACKAGE_DIR", dir);
        }
        self.run(cmd, script)?;
        self.installed = true;
        Ok(())
    }

    fn validate_post_install(&mut self) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        if let Some(check) = &self.commands.check
            && !self.probe(check)
        {
            anyhow::bail!("{}: check_command failed after install: {}", self.id, check);
        }
        Ok(())
    }

    fn is_service(&self) -> bool {
        self.commands.start.is_some()
    }

    fn is_running(&self) -> bool {
        match &self.commands.status {
            Some(status) => self.probe(status),
            None => self.started,
        }
    }

    fn start(&mut self) -> Result<()> {
        let Some(script) = &self.commands.start else {
            anyhow::bail!("{} has no start_command", self.id);
        };
        self.run(self.shell(script), script)?;
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(script) = &self.commands.stop else {
            anyhow::bail!("{} has no stop_command", self.id);
        };
        self.run(self.shell(script), script)?;
        self.started = false;
        Ok(())
    }
}
