use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use deploykit::ResourceInstance;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// File the install target writes under the deployment home
pub const MANIFEST_FILE: &str = "installed_resources.json";

// ============================================================================
// Installed Resource Manifest
// ============================================================================

/// Path of the manifest under a deployment home
pub fn manifest_path(deployment_home: &Path) -> PathBuf {
    deployment_home.join(MANIFEST_FILE)
}

/// Read the manifest, or an empty list if none was written yet
pub fn read_manifest(path: &Path) -> Result<Vec<ResourceInstance>> {
    if !path.exists() {
        log::debug!("No manifest at {}", path.display());
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse manifest: {}", path.display()))
}

/// Write the manifest as pretty JSON, creating the parent directory
pub fn write_manifest(path: &Path, resources: &[ResourceInstance]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    let content = serde_json::to_string_pretty(resources).context("Failed to serialize manifest")?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
    log::debug!("Wrote {} resource(s) to {}", resources.len(), path.display());
    Ok(())
}

// ============================================================================
// Run History
// ============================================================================

/// How the last run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
    RolledBack,
}

/// Record of the most recent install run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastRun {
    pub finished: DateTime<Utc>,
    pub spec: String,
    pub outcome: RunOutcome,
    #[serde(default)]
    pub installed: Vec<String>,
    #[serde(default)]
    pub started: Vec<String>,
    /// Failing resource and message, when the run failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// State kept between runs in the state directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngageState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<LastRun>,
}

impl EngageState {
    fn state_file() -> Result<PathBuf> {
        Ok(paths::state_dir()?.join("state.toml"))
    }

    /// Load state from disk, or return default if file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::state_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))
    }

    /// Save state to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::state_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create state directory: {}", dir.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize state to TOML")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;
        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Record a finished run and save
    pub fn record(&mut self, run: LastRun) -> Result<()> {
        self.last_run = Some(run);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::ResourceKey;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        let resources = read_manifest(&manifest_path(temp.path())).unwrap();
        assert!(resources.is_empty());
    }

    #[test]
    fn test_manifest_written_and_read_back() {
        let temp = TempDir::new().unwrap();
        let path = manifest_path(&temp.path().join("deploy"));

        let host = ResourceInstance::new("host", ResourceKey::new("ubuntu-linux", "10.04"));
        let mut db = ResourceInstance::new("db", ResourceKey::new("mysql", "5.1")).inside_of(&host);
        db.installed = true;
        write_manifest(&path, &[host.clone(), db.clone()]).unwrap();

        let read = read_manifest(&path).unwrap();
        assert_eq!(read, vec![host, db]);
        assert!(fs::read_to_string(&path).unwrap().contains("\"installed\": true"));
    }

    #[test]
    fn test_corrupt_manifest_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = manifest_path(temp.path());
        fs::write(&path, "{not json").unwrap();
        let err = read_manifest(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse manifest"));
    }

    #[test]
    fn test_state_saves_last_run() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("state.toml");
        assert_eq!(EngageState::load_from(&path).unwrap(), EngageState::default());

        let state = EngageState {
            last_run: Some(LastRun {
                finished: Utc::now(),
                spec: "spec.json".to_string(),
                outcome: RunOutcome::RolledBack,
                installed: vec!["host".to_string()],
                started: vec!["db".to_string()],
                error: Some("resource 'web' failed during install: boom".to_string()),
            }),
        };
        state.save_to(&path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("rolled-back"));
        assert_eq!(EngageState::load_from(&path).unwrap(), state);
    }
}
