//! Package manifests: `{name, version, dependencies}` JSON documents.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::source::SourceRegistry;
use super::{PackageId, PackageRange, PackageRef};
use crate::error::ManifestError;
use crate::version::{Version, VersionConstraint};

/// The dependency-relevant part of a package manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub version: Version,
    /// Keyed and iterated by dependency name.
    pub dependencies: BTreeMap<String, PackageRange>,
}

#[derive(Deserialize)]
struct RawManifest {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, RawDependency>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Constraint(String),
    Detailed {
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        description: Option<Value>,
    },
}

impl Manifest {
    /// Parse the entrypoint's manifest. A missing version defaults to `0.0.0`.
    pub fn parse_root(json: &str, sources: &SourceRegistry) -> Result<Manifest, ManifestError> {
        let value: Value = serde_json::from_str(json).map_err(|e| ManifestError::Json(e.to_string()))?;
        Self::from_value(value, sources)
    }

    /// Build a manifest from parsed JSON, validating versions and constraints.
    pub fn from_value(value: Value, sources: &SourceRegistry) -> Result<Manifest, ManifestError> {
        let raw: RawManifest =
            serde_json::from_value(value).map_err(|e| ManifestError::Json(e.to_string()))?;

        let version = match raw.version.as_deref() {
            Some(text) => Version::parse(text).map_err(|e| ManifestError::Version {
                name: raw.name.clone(),
                version: text.to_string(),
                reason: e.to_string(),
            })?,
            None => Version::new(0, 0, 0),
        };

        let mut dependencies = BTreeMap::new();
        for (dep_name, spec) in raw.dependencies {
            if dep_name == raw.name {
                return Err(ManifestError::SelfDependency { name: raw.name });
            }
            let (constraint_text, source_name, description) = match spec {
                RawDependency::Constraint(text) => (text, None, None),
                RawDependency::Detailed {
                    version,
                    source,
                    description,
                } => (version.unwrap_or_else(|| "*".to_string()), source, description),
            };
            let constraint =
                VersionConstraint::parse(&constraint_text).map_err(|e| ManifestError::Constraint {
                    name: raw.name.clone(),
                    dependency: dep_name.clone(),
                    constraint: constraint_text.clone(),
                    reason: e.to_string(),
                })?;
            let source = match source_name.as_deref() {
                Some(name) => sources.get(name),
                None => sources.default_source(),
            };
            let package = source.parse_ref(&dep_name, description.as_ref())?;
            dependencies.insert(dep_name, package.with_constraint(constraint));
        }

        Ok(Manifest {
            name: raw.name,
            version,
            dependencies,
        })
    }

    /// The root package's reference and id.
    pub fn root_ref(&self) -> PackageRef {
        PackageRef::root(self.name.clone())
    }

    pub fn root_id(&self) -> PackageId {
        self.root_ref().at_version(self.version.clone())
    }

    /// Ensure this manifest describes `id` and not some other package.
    pub(crate) fn check_describes(self, id: &PackageId) -> Result<Manifest, ManifestError> {
        if self.name != id.name() {
            return Err(ManifestError::NameMismatch {
                expected: id.name().to_string(),
                actual: self.name,
            });
        }
        Ok(Manifest {
            version: id.version.clone(),
            ..self
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::package::{HostedSource, MemoryRegistry, HOSTED};

    fn sources() -> SourceRegistry {
        SourceRegistry::new(Arc::new(HostedSource::new(
            "https://registry.example",
            Arc::new(MemoryRegistry::new()),
        )))
    }

    #[test]
    fn test_parse_root_manifest() {
        let manifest = Manifest::parse_root(
            r#"{"name": "install-dependencies-test", "version": "1.0.0",
                "dependencies": {"o-grid": "^5", "o-colors": ">=4.1.0 <6"}}"#,
            &sources(),
        )
        .unwrap();
        assert_eq!(manifest.version, Version::new(1, 0, 0));
        let names: Vec<&str> = manifest.dependencies.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["o-colors", "o-grid"]);
        let grid = &manifest.dependencies["o-grid"];
        assert_eq!(grid.package.source.as_deref(), Some(HOSTED));
        assert_eq!(grid.package.description, "https://registry.example");
        assert_eq!(grid.constraint.to_string(), "^5.0.0");
    }

    #[test]
    fn test_missing_version_and_dependencies() {
        let manifest = Manifest::parse_root(r#"{"name": "app", "dependencies": {}}"#, &sources()).unwrap();
        assert_eq!(manifest.version, Version::new(0, 0, 0));
        assert!(manifest.dependencies.is_empty());
        assert_eq!(manifest.root_id().to_string(), "app@0.0.0");
    }

    #[test]
    fn test_self_dependency_rejected() {
        let err = Manifest::parse_root(
            r#"{"name": "install-dependencies-test", "dependencies": {"install-dependencies-test": "*"}}"#,
            &sources(),
        )
        .unwrap_err();
        assert_eq!(err, ManifestError::SelfDependency { name: "install-dependencies-test".into() });
        assert_eq!(err.to_string(), "install-dependencies-test may not depend on itself");
    }

    #[test]
    fn test_detailed_dependency_with_unknown_source() {
        let manifest = Manifest::parse_root(
            r#"{"name": "app", "dependencies": {"o-grid": {"version": "^1.0.0", "source": "git", "description": "https://example.com/o-grid.git"}}}"#,
            &sources(),
        )
        .unwrap();
        let grid = &manifest.dependencies["o-grid"];
        assert_eq!(grid.package.source.as_deref(), Some("git"));
        assert_eq!(grid.package.description, "https://example.com/o-grid.git");
    }

    #[test]
    fn test_bad_inputs() {
        assert!(matches!(
            Manifest::parse_root(r#"{"name": "app", "version": "one"}"#, &sources()),
            Err(ManifestError::Version { .. })
        ));
        assert!(matches!(
            Manifest::parse_root(r#"{"name": "app", "dependencies": {"x": "^^1"}}"#, &sources()),
            Err(ManifestError::Constraint { .. })
        ));
        assert!(matches!(Manifest::parse_root("{", &sources()), Err(ManifestError::Json(_))));
    }
}
