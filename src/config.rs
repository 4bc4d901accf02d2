use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::drivers;
use crate::paths;

/// File name looked for under `extension_dir`
pub const EXTENSION_FILE: &str = "resources.json";

// ============================================================================
// Main Config Schema
// ============================================================================

/// The engage configuration, read from `engage.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngageConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub install: InstallConfig,

    /// Resource key label or bare resource name -> driver id
    #[serde(default)]
    pub drivers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the deployment; the install target writes its manifest here
    #[serde(default = "default_deployment_home")]
    pub deployment_home: String,

    /// Primary resource definition document
    #[serde(default = "default_resource_definitions")]
    pub resource_definitions: String,

    /// Extra definition documents, merged after the primary one
    #[serde(default)]
    pub extension_definitions: Vec<String>,

    /// Directory scanned for `resources.json` extension documents
    #[serde(default)]
    pub extension_dir: Option<String>,

    /// Package library document
    #[serde(default = "default_library")]
    pub library: String,

    /// Directory that relative package locations resolve against
    #[serde(default = "default_package_cache")]
    pub package_cache: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Force-stop started services when a run fails
    #[serde(default)]
    pub force_stop_on_error: bool,

    /// Machines applied concurrently in multi-node runs
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Ask before installing
    #[serde(default = "default_confirm")]
    pub confirm: bool,
}

fn default_deployment_home() -> String {
    "~/engage".to_string()
}

fn default_resource_definitions() -> String {
    "~/engage/metadata/resource_definitions.json".to_string()
}

fn default_library() -> String {
    "~/engage/metadata/resource_library.json".to_string()
}

fn default_package_cache() -> String {
    "~/engage/sw_packages".to_string()
}

fn default_jobs() -> usize {
    4
}

fn default_confirm() -> bool {
    true
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            deployment_home: default_deployment_home(),
            resource_definitions: default_resource_definitions(),
            extension_definitions: Vec::new(),
            extension_dir: None,
            library: default_library(),
            package_cache: default_package_cache(),
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            force_stop_on_error: false,
            jobs: default_jobs(),
            confirm: default_confirm(),
        }
    }
}

impl EngageConfig {
    /// Load `engage.toml` from the config directory, or defaults if absent
    pub fn load() -> Result<Self> {
        let path = paths::config_file()?;
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.paths.validate()?;
        if self.install.jobs == 0 {
            anyhow::bail!("install.jobs must be at least 1");
        }
        for (key, driver) in &self.drivers {
            if !drivers::is_known(driver) {
                anyhow::bail!(
                    "Unknown driver '{}' for '{}' (known: {})",
                    driver,
                    key,
                    drivers::DRIVER_IDS.join(", ")
                );
            }
        }
        Ok(())
    }

    /// Driver configured for a resource, by full key label first, then bare name
    pub fn driver_for(&self, label: &str, name: &str) -> Option<&str> {
        self.drivers
            .get(label)
            .or_else(|| self.drivers.get(name))
            .map(String::as_str)
    }
}

impl PathsConfig {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("deployment_home", &self.deployment_home),
            ("resource_definitions", &self.resource_definitions),
            ("library", &self.library),
            ("package_cache", &self.package_cache),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                anyhow::bail!("paths.{name} cannot be empty");
            }
        }
        if self.extension_definitions.iter().any(|p| p.trim().is_empty()) {
            anyhow::bail!("paths.extension_definitions cannot contain empty paths");
        }
        Ok(())
    }

    pub fn deployment_home(&self) -> PathBuf {
        paths::expand(&self.deployment_home)
    }

    pub fn resource_definitions(&self) -> PathBuf {
        paths::expand(&self.resource_definitions)
    }

    pub fn library(&self) -> PathBuf {
        paths::expand(&self.library)
    }

    pub fn package_cache(&self) -> PathBuf {
        paths::expand(&self.package_cache)
    }

    /// Explicit extension documents, then every `resources.json` under
    /// `extension_dir` in sorted path order
    pub fn extension_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .extension_definitions
            .iter()
            .map(|p| paths::expand(p))
            .collect();

        if let Some(dir) = &self.extension_dir {
            let dir = paths::expand(dir);
            let mut found: Vec<PathBuf> = WalkDir::new(&dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && e.file_name() == EXTENSION_FILE)
                .map(|e| e.into_path())
                .collect();
            found.sort();
            log::debug!(
                "Found {} extension document(s) under {}",
                found.len(),
                dir.display()
            );
            files.extend(found);
        }
        files
    }
}
