//! Package library backed by a JSON document
//!
//! ```json
//! {"entries": [{"key": {"name": "mysql", "version": "5.1"},
//!               "packages": [{"type": "archive", "location": "mysql-5.1.tar.gz"}]}]}
//! ```
//!
//! Packages of an entry are probed in order and the first available one is
//! used. Relative `file` and `archive` locations resolve against the package
//! cache.

use anyhow::{Context, Result, bail};
use catalog::ResourceKey;
use deploykit::{Library, LibraryEntry, Package, ResourceInstance, RunContext};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Deserialize)]
struct LibraryDocument {
    #[serde(default)]
    entries: Vec<EntrySpec>,
}

#[derive(Debug, Deserialize)]
struct EntrySpec {
    key: ResourceKey,
    #[serde(default)]
    packages: Vec<PackageSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum PackageKind {
    Reference,
    File,
    Archive,
}

#[derive(Debug, Deserialize)]
struct PackageSpec {
    #[serde(rename = "type")]
    kind: PackageKind,
    location: String,
    /// Platforms this package works on; all when absent
    #[serde(default)]
    platforms: Option<Vec<String>>,
}

/// This machine's platform as `os-arch`, e.g. `linux-x86_64`
pub fn current_platform() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Whether a platform list admits this machine, by `os-arch` or bare `os`
fn supports_platform(platforms: Option<&[String]>) -> bool {
    let Some(platforms) = platforms else {
        return true;
    };
    let current = current_platform();
    platforms
        .iter()
        .any(|p| *p == current || p == std::env::consts::OS)
}

// ============================================================================
// Packages
// ============================================================================

/// A name or URL some other tool resolves (apt, pip, ...)
#[derive(Debug)]
pub struct ReferencePackage {
    location: String,
    platforms: Option<Vec<String>>,
}

impl Package for ReferencePackage {
    fn is_available(&self) -> bool {
        supports_platform(self.platforms.as_deref())
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}

/// A file in the package cache
#[derive(Debug)]
pub struct FilePackage {
    location: String,
    path: PathBuf,
    platforms: Option<Vec<String>>,
}

impl Package for FilePackage {
    fn is_available(&self) -> bool {
        if !supports_platform(self.platforms.as_deref()) {
            log::debug!("{} not available on {}", self.location, current_platform());
            return false;
        }
        let available = self.path.is_file();
        if !available {
            log::debug!("{} is not in the package cache", self.path.display());
        }
        available
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    fn file(&self) -> Result<PathBuf> {
        if !self.path.is_file() {
            bail!("Package file not found: {}", self.path.display());
        }
        Ok(self.path.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    fn detect(location: &str) -> Option<Self> {
        let lower = location.to_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

/// A file package that is unpacked during install
#[derive(Debug)]
pub struct ArchivePackage {
    file: FilePackage,
    format: ArchiveFormat,
}

impl Package for ArchivePackage {
    fn is_available(&self) -> bool {
        self.file.is_available()
    }

    fn location(&self) -> String {
        self.file.location()
    }

    fn file(&self) -> Result<PathBuf> {
        self.file.file()
    }

    fn is_archive(&self) -> bool {
        true
    }

    /// Unpack into `target_dir`; every entry must sit under one top-level
    /// directory, whose name is returned
    fn extract(&self, target_dir: &Path) -> Result<String> {
        let archive = self.file()?;
        log::info!("Expanding archive '{}'", archive.display());
        fs::create_dir_all(target_dir)
            .with_context(|| format!("Failed to create {}", target_dir.display()))?;
        match self.format {
            ArchiveFormat::TarGz => extract_targz(&archive, target_dir),
            ArchiveFormat::Zip => extract_zip(&archive, target_dir),
        }
    }
}

fn open_targz(path: &Path) -> Result<tar::Archive<flate2::read::GzDecoder<File>>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(tar::Archive::new(flate2::read::GzDecoder::new(file)))
}

fn extract_targz(path: &Path, target_dir: &Path) -> Result<String> {
    let mut names = Vec::new();
    for entry in open_targz(path)?.entries()? {
        let entry = entry?;
        let is_dir = entry.header().entry_type().is_dir();
        names.push((entry.path()?.into_owned(), is_dir));
    }
    let top = common_top_dir(path, &names)?;

    open_targz(path)?
        .unpack(target_dir)
        .with_context(|| format!("Failed to extract {}", path.display()))?;
    Ok(top)
}

fn extract_zip(path: &Path, target_dir: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Invalid zip archive: {}", path.display()))?;

    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        names.push((PathBuf::from(entry.name()), entry.is_dir()));
    }
    let top = common_top_dir(path, &names)?;

    archive
        .extract(target_dir)
        .with_context(|| format!("Failed to extract {}", path.display()))?;
    Ok(top)
}

/// The single top-level directory shared by all entries
fn common_top_dir(archive: &Path, entries: &[(PathBuf, bool)]) -> Result<String> {
    let invalid = |name: &Path, why: &str| {
        anyhow::anyhow!(
            "Archive {} not valid for install: {} {}",
            archive.display(),
            why,
            name.display()
        )
    };

    let mut common: Option<String> = None;
    for (name, is_dir) in entries {
        let mut parts = Vec::new();
        for component in name.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return Err(invalid(name, "contains unsafe path")),
            }
        }
        let Some(top) = parts.first() else {
            continue;
        };
        if parts.len() == 1 && !is_dir {
            return Err(invalid(name, "contains top-level file"));
        }
        match &common {
            None => common = Some(top.clone()),
            Some(existing) if existing == top => {}
            Some(_) => return Err(invalid(name, "contains file outside common directory")),
        }
    }
    common.ok_or_else(|| anyhow::anyhow!("Archive {} is empty", archive.display()))
}

// ============================================================================
// Library
// ============================================================================

/// Library entries keyed by canonical resource key
#[derive(Debug, Default)]
pub struct FileLibrary {
    entries: BTreeMap<String, LibraryEntry>,
}

impl FileLibrary {
    /// Load a library document; a missing file gives an empty library
    pub fn load(path: &Path, package_cache: &Path) -> Result<Self> {
        if !path.exists() {
            log::warn!("No package library at {}", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read package library: {}", path.display()))?;
        Self::from_json_str(&content, package_cache)
            .with_context(|| format!("Invalid package library: {}", path.display()))
    }

    pub fn from_json_str(json: &str, package_cache: &Path) -> Result<Self> {
        let document: LibraryDocument = serde_json::from_str(json)?;
        let mut entries = BTreeMap::new();
        for entry in document.entries {
            let packages = entry
                .packages
                .into_iter()
                .map(|spec| build_package(spec, package_cache))
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("Invalid packages for {}", entry.key))?;
            if entries
                .insert(entry.key.canonical(), LibraryEntry::new(packages))
                .is_some()
            {
                log::warn!("Library entry {} defined twice, keeping the last", entry.key);
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn build_package(spec: PackageSpec, package_cache: &Path) -> Result<Box<dyn Package>> {
    let file = |location: String, platforms| {
        let expanded = crate::paths::expand(&location);
        let path = if expanded.is_absolute() {
            expanded
        } else {
            package_cache.join(expanded)
        };
        FilePackage {
            location,
            path,
            platforms,
        }
    };

    let package: Box<dyn Package> = match spec.kind {
        PackageKind::Reference => Box::new(ReferencePackage {
            location: spec.location,
            platforms: spec.platforms,
        }),
        PackageKind::File => Box::new(file(spec.location, spec.platforms)),
        PackageKind::Archive => {
            let Some(format) = ArchiveFormat::detect(&spec.location) else {
                bail!(
                    "Unsupported archive format for {} (expected .tar.gz, .tgz or .zip)",
                    spec.location
                );
            };
            Box::new(ArchivePackage {
                file: file(spec.location, spec.platforms),
                format,
            })
        }
    };
    Ok(package)
}

impl Library for FileLibrary {
    fn get_entry(&self, instance: &ResourceInstance, _ctx: &RunContext) -> Option<&LibraryEntry> {
        self.entries.get(&instance.key.canonical())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    pub(crate) fn write_targz(path: &Path, files: &[(&str, &str)]) {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        {
            let mut builder = tar::Builder::new(&mut encoder);
            for (name, data) in files {
                let mut header = tar::Header::new_gnu();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder
                    .append_data(&mut header, name, data.as_bytes())
                    .unwrap();
            }
            builder.finish().unwrap();
        }
        fs::write(path, encoder.finish().unwrap()).unwrap();
    }

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let mut buffer = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buffer));
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            for (name, data) in files {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        fs::write(path, buffer).unwrap();
    }

    fn instance(name: &str, version: &str) -> ResourceInstance {
        ResourceInstance::new(name, ResourceKey::new(name, version))
    }

    #[test]
    fn test_entries_by_key_and_first_available_package() {
        let cache = TempDir::new().unwrap();
        fs::write(cache.path().join("memcached-1.4.bin"), b"bin").unwrap();

        let library = FileLibrary::from_json_str(
            r#"{"entries": [
                {"key": {"name": "memcached", "version": "1.4"},
                 "packages": [
                    {"type": "file", "location": "missing.bin"},
                    {"type": "reference", "location": "memcached", "platforms": ["plan9"]},
                    {"type": "file", "location": "memcached-1.4.bin"}
                 ]},
                {"key": {"name": "python", "version": "2.7"},
                 "packages": [{"type": "reference", "location": "python2.7"}]}
            ]}"#,
            cache.path(),
        )
        .unwrap();
        assert_eq!(library.len(), 2);

        let ctx = RunContext::new("/opt/deploy");
        let entry = library
            .get_entry(&instance("memcached", "1.4"), &ctx)
            .unwrap();
        let package = entry.get_package().unwrap();
        assert_eq!(package.location(), "memcached-1.4.bin");
        assert_eq!(
            package.file().unwrap(),
            cache.path().join("memcached-1.4.bin")
        );

        let python = library.get_entry(&instance("python", "2.7"), &ctx).unwrap();
        let reference = python.get_package().unwrap();
        assert!(reference.file().is_err());
        assert!(library.get_entry(&instance("python", "3.1"), &ctx).is_none());
    }

    #[test]
    fn test_platform_filter() {
        assert!(supports_platform(None));
        assert!(supports_platform(Some(&[current_platform()])));
        assert!(supports_platform(Some(&[std::env::consts::OS.to_string()])));
        assert!(!supports_platform(Some(&["plan9-mips".to_string()])));
    }

    #[test]
    fn test_unknown_archive_format_is_rejected() {
        let err = FileLibrary::from_json_str(
            r#"{"entries": [{"key": {"name": "a", "version": "1"},
                "packages": [{"type": "archive", "location": "a.rar"}]}]}"#,
            Path::new("/cache"),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("Unsupported archive format"));
    }

    #[test]
    fn test_extract_targz_returns_top_directory() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("app-1.0.tar.gz");
        write_targz(
            &archive,
            &[("app-1.0/bin/run", "#!/bin/sh"), ("app-1.0/README", "hi")],
        );

        let package = ArchivePackage {
            file: FilePackage {
                location: "app-1.0.tar.gz".to_string(),
                path: archive,
                platforms: None,
            },
            format: ArchiveFormat::TarGz,
        };
        assert!(package.is_available());
        let target = temp.path().join("out");
        assert_eq!(package.extract(&target).unwrap(), "app-1.0");
        assert_eq!(
            fs::read_to_string(target.join("app-1.0/README")).unwrap(),
            "hi"
        );
    }

    #[test]
    fn test_extract_zip_requires_common_directory() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("mixed.zip");
        write_zip(&archive, &[("one/a.txt", "a"), ("two/b.txt", "b")]);

        let package = ArchivePackage {
            file: FilePackage {
                location: "mixed.zip".to_string(),
                path: archive,
                platforms: None,
            },
            format: ArchiveFormat::Zip,
        };
        let err = package.extract(&temp.path().join("out")).unwrap_err();
        assert!(err.to_string().contains("outside common directory"));
        assert!(!temp.path().join("out/one").exists());
    }

    #[test]
    fn test_extract_zip() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("tool.zip");
        write_zip(&archive, &[("tool/bin/tool", "x")]);
        let package = ArchivePackage {
            file: FilePackage {
                location: "tool.zip".to_string(),
                path: archive,
                platforms: None,
            },
            format: ArchiveFormat::Zip,
        };
        let target = temp.path().join("out");
        assert_eq!(package.extract(&target).unwrap(), "tool");
        assert!(target.join("tool/bin/tool").is_file());
    }

    #[test]
    fn test_common_top_dir_rules() {
        let archive = Path::new("x.tgz");
        let ok = [
            (PathBuf::from("./pkg/"), true),
            (PathBuf::from("pkg/a"), false),
        ];
        assert_eq!(common_top_dir(archive, &ok).unwrap(), "pkg");

        let top_file = [(PathBuf::from("setup.py"), false)];
        assert!(common_top_dir(archive, &top_file).is_err());

        let escape = [(PathBuf::from("pkg/../../etc/passwd"), false)];
        assert!(common_top_dir(archive, &escape).is_err());

        let absolute = [(PathBuf::from("/etc/passwd"), false)];
        assert!(common_top_dir(archive, &absolute).is_err());

        assert!(common_top_dir(archive, &[]).is_err());
    }
}
