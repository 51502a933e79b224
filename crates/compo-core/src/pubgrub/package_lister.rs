//! Per-package view of a source that turns versions and manifests into
//! incompatibilities for the solver.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use super::incompatibility::{Cause, Incompatibility};
use super::term::Term;
use crate::error::SourceError;
use crate::package::{BoundSource, Manifest, PackageId, PackageRange, PackageRef, RootSource};
use crate::version::{Version, VersionConstraint};

pub struct PackageLister {
    reference: PackageRef,
    source: Arc<dyn BoundSource>,
    /// Version to prefer whenever it is allowed.
    locked: Option<PackageId>,
    is_downgrade: bool,
    /// Ascending version list, fetched on first use.
    versions: Option<Result<Arc<Vec<PackageId>>, SourceError>>,
    /// Versions whose manifest could not be used.
    known_invalid: VersionConstraint,
    /// Per dependency, the versions of this package whose dependency on it
    /// has already been emitted.
    already_listed: HashMap<String, VersionConstraint>,
    listed_locked: bool,
}

impl PackageLister {
    pub fn new(
        reference: PackageRef,
        source: Arc<dyn BoundSource>,
        locked: Option<PackageId>,
        is_downgrade: bool,
    ) -> Self {
        Self {
            reference,
            source,
            locked,
            is_downgrade,
            versions: None,
            known_invalid: VersionConstraint::Empty,
            already_listed: HashMap::new(),
            listed_locked: false,
        }
    }

    /// Lister for the entrypoint, locked to its own version.
    pub fn root(manifest: &Manifest) -> Self {
        let id = manifest.root_id();
        Self::new(
            id.package.clone(),
            Arc::new(RootSource::new(manifest.clone())),
            Some(id),
            false,
        )
    }

    fn versions(&mut self) -> Result<Arc<Vec<PackageId>>, SourceError> {
        let source = &self.source;
        let reference = &self.reference;
        self.versions
            .get_or_insert_with(|| {
                source.get_versions(reference).map(|listed| {
                    let mut sorted = listed.as_ref().clone();
                    sorted.sort_by(|a, b| a.version.cmp(&b.version));
                    Arc::new(sorted)
                })
            })
            .clone()
    }

    /// The version list, if it has been fetched successfully.
    pub fn cached_versions(&self) -> Option<&[PackageId]> {
        match &self.versions {
            Some(Ok(versions)) => Some(versions.as_slice()),
            _ => None,
        }
    }

    /// How many versions `constraint` allows. Missing packages count as zero
    /// so they get picked (and reported) early.
    pub fn count_versions(&mut self, constraint: &VersionConstraint) -> Result<usize, SourceError> {
        if let Some(locked) = &self.locked {
            if constraint.allows(&locked.version) {
                return Ok(1);
            }
        }
        match self.versions() {
            Ok(versions) => Ok(versions.iter().filter(|id| constraint.allows(&id.version)).count()),
            Err(SourceError::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// The preferred version allowed by `constraint`: the newest release
    /// (oldest when downgrading), else the first pre-release met.
    pub fn best_version(&mut self, constraint: &VersionConstraint) -> Result<Option<PackageId>, SourceError> {
        if let Some(locked) = &self.locked {
            if constraint.allows(&locked.version) {
                return Ok(Some(locked.clone()));
            }
        }

        let versions = self.versions()?;
        let limit = constraint.as_range();
        let is_past_limit = |version: &Version| -> bool {
            match &limit {
                Some(range) if self.is_downgrade => range.max().is_some_and(|max| version > max),
                Some(range) => range.min().is_some_and(|min| version < min),
                None => false,
            }
        };

        let ordered: Box<dyn Iterator<Item = &PackageId>> = if self.is_downgrade {
            Box::new(versions.iter())
        } else {
            Box::new(versions.iter().rev())
        };

        let mut best_prerelease: Option<&PackageId> = None;
        for id in ordered {
            if is_past_limit(&id.version) {
                break;
            }
            if !constraint.allows(&id.version) {
                continue;
            }
            if !id.version.is_prerelease() {
                return Ok(Some(id.clone()));
            }
            if best_prerelease.is_none() {
                best_prerelease = Some(id);
            }
        }
        Ok(best_prerelease.cloned())
    }

    /// Dependency incompatibilities for `id`, each widened to the run of
    /// adjacent versions that share the same dependency.
    ///
    /// Unusable manifests become a single "no versions" fact instead of an error.
    pub fn incompatibilities_for(&mut self, id: &PackageId) -> Result<Vec<Incompatibility>, SourceError> {
        if self.known_invalid.allows(&id.version) {
            return Ok(Vec::new());
        }

        let manifest = match self.source.describe(id) {
            Ok(manifest) => manifest,
            Err(e) if e.is_unusable_version() => {
                debug!("{} is unusable: {}", id, e);
                self.known_invalid = self.known_invalid.union(&VersionConstraint::Exact(id.version.clone()));
                return Ok(vec![Incompatibility::unit(Term::positive(id.to_range()), Cause::NoVersions)]);
            }
            Err(e) => return Err(e),
        };

        let is_locked = self.locked.as_ref().is_some_and(|locked| locked.version == id.version);
        if self.versions.is_none() && is_locked {
            // The locked version may not be in the listing; describe it alone.
            if self.listed_locked {
                return Ok(Vec::new());
            }
            self.listed_locked = true;
            let depender = id.to_range();
            return Ok(manifest
                .dependencies
                .values()
                .map(|target| Incompatibility::dependency(depender.clone(), target.clone()))
                .collect());
        }

        let versions = self.versions()?;
        let index = versions.partition_point(|other| other.version < id.version);
        if versions.get(index).map(|other| &other.version) != Some(&id.version) {
            self.known_invalid = self.known_invalid.union(&VersionConstraint::Exact(id.version.clone()));
            return Ok(vec![Incompatibility::unit(Term::positive(id.to_range()), Cause::NoVersions)]);
        }

        let dependencies: Vec<&PackageRange> = manifest
            .dependencies
            .values()
            .filter(|range| {
                !self
                    .already_listed
                    .get(range.name())
                    .is_some_and(|listed| listed.allows(&id.version))
            })
            .collect();
        if dependencies.is_empty() {
            return Ok(Vec::new());
        }

        let lower = self.dependency_bounds(&versions, &dependencies, index, false)?;
        let upper = self.dependency_bounds(&versions, &dependencies, index, true)?;

        let mut incompatibilities = Vec::with_capacity(dependencies.len());
        for target in dependencies {
            let name = target.name();
            let constraint =
                VersionConstraint::range_raw(lower.get(name).cloned(), upper.get(name).cloned(), true, false)
                    .unwrap_or_else(|_| VersionConstraint::Exact(id.version.clone()));
            let listed = self
                .already_listed
                .entry(name.to_string())
                .or_insert(VersionConstraint::Empty);
            *listed = constraint.union(listed);
            incompatibilities.push(Incompatibility::dependency(
                self.reference.with_constraint(constraint),
                target.clone(),
            ));
        }
        Ok(incompatibilities)
    }

    /// For each dependency, the nearest version (scanning up or down from
    /// `index`) where it stops being identical. Lower bounds are inclusive,
    /// upper bounds exclusive; a missing entry means unbounded. Unusable
    /// neighbours are skipped, any other source error aborts.
    fn dependency_bounds(
        &self,
        versions: &[PackageId],
        dependencies: &[&PackageRange],
        index: usize,
        upper: bool,
    ) -> Result<HashMap<String, Version>, SourceError> {
        let mut bounds: HashMap<String, Version> = HashMap::new();
        let mut previous = &versions[index];

        let scan: Box<dyn Iterator<Item = &PackageId>> = if upper {
            Box::new(versions[index + 1..].iter())
        } else {
            Box::new(versions[..index].iter().rev())
        };
        for id in scan {
            let manifest = match self.source.describe(id) {
                Ok(manifest) => manifest,
                Err(e) if e.is_unusable_version() => continue,
                Err(e) => return Err(e),
            };
            for range in dependencies {
                if bounds.contains_key(range.name()) {
                    continue;
                }
                if manifest.dependencies.get(range.name()) != Some(*range) {
                    let bound = if upper { &id.version } else { &previous.version };
                    bounds.insert(range.name().to_string(), bound.clone());
                }
            }
            if bounds.len() == dependencies.len() {
                break;
            }
            previous = id;
        }
        Ok(bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    use crate::package::{MemoryRegistry, RegistryClient, SourceRegistry, HOSTED};

    const URL: &str = "https://registry.example";

    fn lister(client: MemoryRegistry, locked: Option<&str>, is_downgrade: bool) -> PackageLister {
        let sources = Arc::new(SourceRegistry::hosted(URL, Arc::new(client)));
        let bound = sources.default_source().bind(Arc::clone(&sources));
        let reference = PackageRef::new("foo", HOSTED, URL);
        let locked = locked.map(|v| reference.at_version(Version::parse(v).unwrap()));
        PackageLister::new(reference, bound, locked, is_downgrade)
    }

    fn c(s: &str) -> VersionConstraint {
        VersionConstraint::parse(s).unwrap()
    }

    fn foo_versions() -> MemoryRegistry {
        MemoryRegistry::new()
            .with_package("foo", "1.0.0", &[("bar", "^1.0.0")])
            .with_package("foo", "1.1.0", &[("bar", "^1.0.0")])
            .with_package("foo", "1.2.0", &[("bar", "^1.0.0")])
            .with_package("foo", "2.0.0-beta", &[("bar", "^2.0.0")])
            .with_package("foo", "2.0.0", &[("bar", "^2.0.0")])
            .with_package("bar", "1.0.0", &[])
    }

    #[test]
    fn test_best_version_prefers_releases() {
        let mut lister = lister(foo_versions(), None, false);
        assert_eq!(lister.best_version(&c("*")).unwrap().unwrap().version.to_string(), "2.0.0");
        assert_eq!(lister.best_version(&c("^1.0.0")).unwrap().unwrap().version.to_string(), "1.2.0");
        let pre = c(">=2.0.0-alpha <2.0.0");
        assert_eq!(lister.best_version(&pre).unwrap().unwrap().version.to_string(), "2.0.0-beta");
        assert_eq!(lister.best_version(&c("^3.0.0")).unwrap(), None);
    }

    #[test]
    fn test_best_version_downgrade_and_lock() {
        let mut downgrade = lister(foo_versions(), None, true);
        assert_eq!(downgrade.best_version(&c("^1.0.0")).unwrap().unwrap().version.to_string(), "1.0.0");

        let mut locked = lister(foo_versions(), Some("1.1.0"), false);
        assert_eq!(locked.best_version(&c("^1.0.0")).unwrap().unwrap().version.to_string(), "1.1.0");
        assert_eq!(locked.count_versions(&c("^1.0.0")).unwrap(), 1);
        assert_eq!(locked.best_version(&c("^2.0.0")).unwrap().unwrap().version.to_string(), "2.0.0");
    }

    #[test]
    fn test_count_versions_missing_package_is_zero() {
        let mut lister = lister(MemoryRegistry::new(), None, false);
        assert_eq!(lister.count_versions(&c("*")).unwrap(), 0);
        assert!(matches!(lister.best_version(&c("*")), Err(SourceError::NotFound(_))));
    }

    #[test]
    fn test_shared_dependency_listed_once() {
        let mut lister = lister(foo_versions(), None, false);
        let id = |v: &str| PackageRef::new("foo", HOSTED, URL).at_version(Version::parse(v).unwrap());

        let first = lister.incompatibilities_for(&id("1.1.0")).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].to_string(), "foo@<2.0.0-beta depends on bar@^1.0.0");

        assert!(lister.incompatibilities_for(&id("1.0.0")).unwrap().is_empty());
        assert!(lister.incompatibilities_for(&id("1.2.0")).unwrap().is_empty());

        let second = lister.incompatibilities_for(&id("2.0.0")).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].terms()[0].constraint(), &c(">=2.0.0-beta"));
    }

    /// Fails the manifest request for one version with a transport error.
    struct FlakyRegistry {
        inner: MemoryRegistry,
        broken: Version,
    }

    impl RegistryClient for FlakyRegistry {
        fn versions(&self, name: &str) -> Result<Vec<String>, SourceError> {
            self.inner.versions(name)
        }

        fn manifest(&self, name: &str, version: &Version) -> Result<Value, SourceError> {
            if *version == self.broken {
                return Err(SourceError::Registry("connection reset".to_string()));
            }
            self.inner.manifest(name, version)
        }
    }

    #[test]
    fn test_registry_error_on_neighbour_aborts() {
        let client = FlakyRegistry {
            inner: foo_versions(),
            broken: Version::new(1, 0, 0),
        };
        let sources = Arc::new(SourceRegistry::hosted(URL, Arc::new(client)));
        let bound = sources.default_source().bind(Arc::clone(&sources));
        let reference = PackageRef::new("foo", HOSTED, URL);
        let mut lister = PackageLister::new(reference.clone(), bound, None, false);

        let result = lister.incompatibilities_for(&reference.at_version(Version::new(1, 1, 0)));
        assert!(matches!(result, Err(SourceError::Registry(_))));
    }

    #[test]
    fn test_unusable_neighbour_is_skipped() {
        let client = foo_versions().with_package("foo", "0.9.0", &[("foo", "*")]);
        let mut lister = lister(client, None, false);
        let id = PackageRef::new("foo", HOSTED, URL).at_version(Version::new(1, 1, 0));
        let facts = lister.incompatibilities_for(&id).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].to_string(), "foo@<2.0.0-beta depends on bar@^1.0.0");
    }

    #[test]
    fn test_unusable_manifest_becomes_no_versions() {
        let client = MemoryRegistry::new()
            .with_package("foo", "1.0.0", &[])
            .with_package("foo", "1.1.0", &[("foo", "*")]);
        let mut lister = lister(client, None, false);
        let broken = PackageRef::new("foo", HOSTED, URL).at_version(Version::new(1, 1, 0));
        let facts = lister.incompatibilities_for(&broken).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].cause(), &Cause::NoVersions);
        assert!(lister.incompatibilities_for(&broken).unwrap().is_empty());
    }

    #[test]
    fn test_root_lister_is_locked() {
        let sources = SourceRegistry::hosted(URL, Arc::new(MemoryRegistry::new()));
        let manifest =
            Manifest::parse_root(r#"{"name": "app", "dependencies": {"foo": "^1.0.0"}}"#, &sources).unwrap();
        let mut root = PackageLister::root(&manifest);
        let id = root.best_version(&VersionConstraint::Any).unwrap().unwrap();
        assert_eq!(id, manifest.root_id());
        let deps = root.incompatibilities_for(&id).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].to_string(), "app depends on foo@^1.0.0");
        assert!(root.incompatibilities_for(&id).unwrap().is_empty());
    }
}
