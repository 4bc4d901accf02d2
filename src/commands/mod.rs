pub mod deps;
pub mod install;
pub mod plan;
pub mod status;
pub mod validate;

use anyhow::{Context, Result};
use catalog::{Catalog, ValidationReport};
use deploykit::ResourceInstance;
use std::fs;
use std::path::Path;

use crate::config::EngageConfig;

/// Read an install spec: a JSON list of resource instances
pub fn load_spec(path: &Path) -> Result<Vec<ResourceInstance>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read install spec: {}", path.display()))?;
    let instances: Vec<ResourceInstance> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse install spec: {}", path.display()))?;
    log::debug!("Loaded {} instance(s) from {}", instances.len(), path.display());
    Ok(instances)
}

/// Load the configured definitions plus every extension document
pub fn load_catalog(
    config: &EngageConfig,
    primary: &Path,
    extra: &[impl AsRef<Path>],
    report: &mut ValidationReport,
) -> Result<Catalog> {
    let mut extensions = config.paths.extension_files();
    extensions.extend(extra.iter().map(|p| p.as_ref().to_path_buf()));
    Catalog::load_with_extensions(primary, &extensions, report)
        .with_context(|| format!("Failed to load resource definitions: {}", primary.display()))
}
