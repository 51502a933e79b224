//! Registry clients: where hosted package metadata comes from.
//!
//! Clients speak raw JSON. Validation happens in the hosted source, so a
//! client only has to know how to list versions and hand back a manifest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use serde_json::{json, Value};

use crate::error::{PackageNotFoundError, SourceError};
use crate::version::Version;

/// Backend consulted by the hosted source.
pub trait RegistryClient: Send + Sync {
    /// Every published version string of `name`, in any order.
    fn versions(&self, name: &str) -> Result<Vec<String>, SourceError>;

    /// The manifest JSON of `name` at `version`.
    fn manifest(&self, name: &str, version: &Version) -> Result<Value, SourceError>;
}

/// In-memory registry, filled up front. Used by tests and embedders.
#[derive(Default)]
pub struct MemoryRegistry {
    packages: RwLock<BTreeMap<String, BTreeMap<String, Value>>>,
    requests: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`add_manifest`](Self::add_manifest) for simple dependency lists.
    pub fn with_package(self, name: &str, version: &str, dependencies: &[(&str, &str)]) -> Self {
        let deps: serde_json::Map<String, Value> = dependencies
            .iter()
            .map(|(dep, constraint)| (dep.to_string(), Value::String(constraint.to_string())))
            .collect();
        self.add_manifest(json!({
            "name": name,
            "version": version,
            "dependencies": deps,
        }));
        self
    }

    /// Publish a raw manifest under its `name` and `version` fields.
    /// Manifests missing either field are ignored.
    pub fn add_manifest(&self, manifest: Value) {
        let name = manifest.get("name").and_then(Value::as_str).map(str::to_string);
        let version = manifest.get("version").and_then(Value::as_str).map(str::to_string);
        if let (Some(name), Some(version)) = (name, version) {
            if let Ok(mut packages) = self.packages.write() {
                packages.entry(name).or_default().insert(version, manifest);
            }
        }
    }

    /// Number of `versions` and `manifest` calls served so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    fn with_package_map<T>(
        &self,
        name: &str,
        f: impl FnOnce(&BTreeMap<String, Value>) -> Result<T, SourceError>,
    ) -> Result<T, SourceError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let packages = self
            .packages
            .read()
            .map_err(|_| SourceError::Registry("memory registry lock poisoned".to_string()))?;
        match packages.get(name) {
            Some(versions) => f(versions),
            None => Err(PackageNotFoundError::package(name).into()),
        }
    }
}

impl RegistryClient for MemoryRegistry {
    fn versions(&self, name: &str) -> Result<Vec<String>, SourceError> {
        self.with_package_map(name, |versions| Ok(versions.keys().cloned().collect()))
    }

    fn manifest(&self, name: &str, version: &Version) -> Result<Value, SourceError> {
        self.with_package_map(name, |versions| {
            find_version(versions, version)
                .cloned()
                .ok_or_else(|| PackageNotFoundError::version(name, version).into())
        })
    }
}

/// Registry mirrored on disk as one packument per package:
/// `<root>/<name>.json` with scoped names encoded as `@scope%2Fname.json`.
///
/// A packument is `{"versions": {"<version>": <manifest>, ...}}`.
pub struct DirectoryRegistry {
    root: PathBuf,
    packuments: DashMap<String, Arc<BTreeMap<String, Value>>>,
}

impl DirectoryRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            packuments: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn packument_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", encoded_package_path(name)))
    }

    fn packument(&self, name: &str) -> Result<Arc<BTreeMap<String, Value>>, SourceError> {
        if let Some(cached) = self.packuments.get(name) {
            return Ok(Arc::clone(cached.value()));
        }
        let path = self.packument_path(name);
        let body = match std::fs::read_to_string(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PackageNotFoundError::package(name).into());
            }
            Err(e) => {
                return Err(SourceError::Registry(format!("failed to read {}: {}", path.display(), e)));
            }
        };
        let doc: Value = serde_json::from_str(&body)
            .map_err(|e| SourceError::Registry(format!("invalid packument {}: {}", path.display(), e)))?;
        let versions: BTreeMap<String, Value> = match doc.get("versions") {
            Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => BTreeMap::new(),
        };
        let versions = Arc::new(versions);
        self.packuments.insert(name.to_string(), Arc::clone(&versions));
        Ok(versions)
    }
}

impl RegistryClient for DirectoryRegistry {
    fn versions(&self, name: &str) -> Result<Vec<String>, SourceError> {
        Ok(self.packument(name)?.keys().cloned().collect())
    }

    fn manifest(&self, name: &str, version: &Version) -> Result<Value, SourceError> {
        let packument = self.packument(name)?;
        find_version(&packument, version)
            .cloned()
            .ok_or_else(|| PackageNotFoundError::version(name, version).into())
    }
}

/// Scoped names keep their `@` but escape the slash.
fn encoded_package_path(package: &str) -> String {
    if package.starts_with('@') {
        package.replace('/', "%2F")
    } else {
        package.to_string()
    }
}

/// Look a version up by its canonical string, then by parsed equality
/// (`v1.0.0` and `1.0.0` name the same release).
fn find_version<'a>(versions: &'a BTreeMap<String, Value>, version: &Version) -> Option<&'a Value> {
    versions.get(&version.to_string()).or_else(|| {
        versions
            .iter()
            .find(|(key, _)| Version::parse_partial(key).ok().as_ref() == Some(version))
            .map(|(_, value)| value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_registry_lookups() {
        let registry = MemoryRegistry::new()
            .with_package("o-grid", "5.0.0", &[("o-colors", "^4.0.0")])
            .with_package("o-grid", "5.1.0", &[]);
        let mut versions = registry.versions("o-grid").unwrap();
        versions.sort();
        assert_eq!(versions, vec!["5.0.0", "5.1.0"]);
        let manifest = registry.manifest("o-grid", &Version::new(5, 0, 0)).unwrap();
        assert_eq!(manifest["dependencies"]["o-colors"], "^4.0.0");
        assert_eq!(registry.request_count(), 2);
    }

    #[test]
    fn test_memory_registry_not_found() {
        let registry = MemoryRegistry::new().with_package("o-grid", "5.0.0", &[]);
        let err = registry.versions("jakedash").unwrap_err();
        assert_eq!(err.to_string(), "could not find package jakedash");
        let err = registry.manifest("o-grid", &Version::new(6, 0, 0)).unwrap_err();
        assert!(err.is_unusable_version());
    }

    #[test]
    fn test_directory_registry_reads_scoped_packuments() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("@financial-times%2Fo-buttons.json"),
            r#"{"versions": {
                "6.0.0": {"name": "@financial-times/o-buttons", "version": "6.0.0", "dependencies": {}},
                "6.1.0": {"name": "@financial-times/o-buttons", "version": "6.1.0"}
            }}"#,
        )
        .unwrap();
        let registry = DirectoryRegistry::new(dir.path());
        let versions = registry.versions("@financial-times/o-buttons").unwrap();
        assert_eq!(versions, vec!["6.0.0", "6.1.0"]);
        let manifest = registry
            .manifest("@financial-times/o-buttons", &Version::new(6, 1, 0))
            .unwrap();
        assert_eq!(manifest["version"], "6.1.0");

        // Served from the packument cache once read.
        std::fs::remove_file(dir.path().join("@financial-times%2Fo-buttons.json")).unwrap();
        assert!(registry.versions("@financial-times/o-buttons").is_ok());
    }

    #[test]
    fn test_directory_registry_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ nope").unwrap();
        let registry = DirectoryRegistry::new(dir.path());
        assert!(matches!(
            registry.versions("missing"),
            Err(SourceError::NotFound(_))
        ));
        assert!(matches!(
            registry.versions("broken"),
            Err(SourceError::Registry(_))
        ));
    }
}
