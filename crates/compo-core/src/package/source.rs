//! Package sources: how references are parsed and how versions and
//! manifests are fetched for them.
//!
//! A [`Source`] is the stateless half (parsing descriptions). Binding it to
//! a [`SourceRegistry`] yields a [`BoundSource`] that actually talks to a
//! backend and memoises what it learns.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, warn};
use serde_json::Value;

use super::manifest::Manifest;
use super::registry::RegistryClient;
use super::{PackageId, PackageRef, HOSTED};
use crate::error::{ManifestError, PackageNotFoundError, SourceError};
use crate::version::Version;

/// Parses package references for one source kind.
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    /// Build a reference from a dependency entry's optional `description`.
    /// The result's description is canonical, so equal packages compare equal.
    fn parse_ref(&self, name: &str, description: Option<&Value>) -> Result<PackageRef, ManifestError>;

    fn parse_id(
        &self,
        name: &str,
        version: Version,
        description: Option<&Value>,
    ) -> Result<PackageId, ManifestError> {
        Ok(self.parse_ref(name, description)?.at_version(version))
    }

    /// Attach the source to the registry it resolves dependencies against.
    fn bind(&self, sources: Arc<SourceRegistry>) -> Arc<dyn BoundSource>;
}

/// A source able to list versions and describe them.
pub trait BoundSource: Send + Sync {
    /// All versions of `package`, ascending.
    fn get_versions(&self, package: &PackageRef) -> Result<Arc<Vec<PackageId>>, SourceError>;

    fn describe(&self, id: &PackageId) -> Result<Arc<Manifest>, SourceError>;
}

/// The default source, backed by a [`RegistryClient`].
pub struct HostedSource {
    url: String,
    client: Arc<dyn RegistryClient>,
}

impl HostedSource {
    pub fn new(url: impl Into<String>, client: Arc<dyn RegistryClient>) -> Self {
        Self {
            url: canonical_url(&url.into()),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn canonical_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

impl Source for HostedSource {
    fn name(&self) -> &str {
        HOSTED
    }

    fn parse_ref(&self, name: &str, description: Option<&Value>) -> Result<PackageRef, ManifestError> {
        let url = match description {
            None | Some(Value::Null) => self.url.clone(),
            Some(Value::String(url)) => canonical_url(url),
            Some(other) => {
                return Err(ManifestError::Json(format!(
                    "the hosted description of {} must be a URL string, got {}",
                    name, other
                )));
            }
        };
        Ok(PackageRef::new(name, HOSTED, url))
    }

    fn bind(&self, sources: Arc<SourceRegistry>) -> Arc<dyn BoundSource> {
        Arc::new(BoundHostedSource {
            url: self.url.clone(),
            client: Arc::clone(&self.client),
            sources,
            versions: DashMap::new(),
            manifests: DashMap::new(),
        })
    }
}

struct BoundHostedSource {
    url: String,
    client: Arc<dyn RegistryClient>,
    sources: Arc<SourceRegistry>,
    versions: DashMap<PackageRef, Arc<Vec<PackageId>>>,
    manifests: DashMap<PackageId, Arc<Manifest>>,
}

impl BoundHostedSource {
    fn check_served(&self, package: &PackageRef) -> Result<(), SourceError> {
        if package.description == self.url {
            return Ok(());
        }
        Err(PackageNotFoundError::new(format!(
            "{} is hosted on {}, which is not a configured registry",
            package.name, package.description
        ))
        .into())
    }
}

impl BoundSource for BoundHostedSource {
    fn get_versions(&self, package: &PackageRef) -> Result<Arc<Vec<PackageId>>, SourceError> {
        if let Some(cached) = self.versions.get(package) {
            return Ok(Arc::clone(cached.value()));
        }
        self.check_served(package)?;

        let mut ids: Vec<PackageId> = Vec::new();
        for text in self.client.versions(&package.name)? {
            match Version::parse(&text) {
                Ok(version) => ids.push(package.at_version(version)),
                Err(e) => warn!("skipping {}@{}: {}", package.name, text, e),
            }
        }
        ids.sort_by(|a, b| a.version.cmp(&b.version));
        ids.dedup();
        debug!("{}: {} versions listed", package.name, ids.len());

        let ids = Arc::new(ids);
        self.versions.insert(package.clone(), Arc::clone(&ids));
        Ok(ids)
    }

    fn describe(&self, id: &PackageId) -> Result<Arc<Manifest>, SourceError> {
        if let Some(cached) = self.manifests.get(id) {
            return Ok(Arc::clone(cached.value()));
        }
        self.check_served(&id.package)?;

        let value = self.client.manifest(id.name(), &id.version)?;
        let manifest = Manifest::from_value(value, &self.sources)?.check_describes(id)?;
        let manifest = Arc::new(manifest);
        self.manifests.insert(id.clone(), Arc::clone(&manifest));
        Ok(manifest)
    }
}

/// Stand-in for a source name nothing is registered under.
///
/// References still parse, so manifests naming it load; every lookup
/// fails with [`SourceError::UnknownSource`].
pub struct UnknownSource {
    name: String,
}

impl UnknownSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Source for UnknownSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse_ref(&self, name: &str, description: Option<&Value>) -> Result<PackageRef, ManifestError> {
        let description = match description {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            // serde_json maps are sorted, so this is canonical too.
            Some(other) => other.to_string(),
        };
        Ok(PackageRef::new(name, self.name.clone(), description))
    }

    fn bind(&self, _sources: Arc<SourceRegistry>) -> Arc<dyn BoundSource> {
        Arc::new(BoundUnknownSource {
            name: self.name.clone(),
        })
    }
}

struct BoundUnknownSource {
    name: String,
}

impl BoundSource for BoundUnknownSource {
    fn get_versions(&self, _package: &PackageRef) -> Result<Arc<Vec<PackageId>>, SourceError> {
        Err(SourceError::UnknownSource(self.name.clone()))
    }

    fn describe(&self, _id: &PackageId) -> Result<Arc<Manifest>, SourceError> {
        Err(SourceError::UnknownSource(self.name.clone()))
    }
}

/// Serves exactly one package: the entrypoint being resolved.
pub struct RootSource {
    manifest: Arc<Manifest>,
    id: PackageId,
}

impl RootSource {
    pub fn new(manifest: Manifest) -> Self {
        let id = manifest.root_id();
        Self {
            manifest: Arc::new(manifest),
            id,
        }
    }
}

impl BoundSource for RootSource {
    fn get_versions(&self, package: &PackageRef) -> Result<Arc<Vec<PackageId>>, SourceError> {
        if *package != self.id.package {
            return Err(PackageNotFoundError::package(&package.name).into());
        }
        Ok(Arc::new(vec![self.id.clone()]))
    }

    fn describe(&self, id: &PackageId) -> Result<Arc<Manifest>, SourceError> {
        if *id != self.id {
            return Err(PackageNotFoundError::version(id.name(), &id.version).into());
        }
        Ok(Arc::clone(&self.manifest))
    }
}

/// Source kinds by name, with a default for dependencies that name none.
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<dyn Source>>,
    default: String,
}

impl SourceRegistry {
    /// A registry whose default (and only) source is `default`.
    pub fn new(default: Arc<dyn Source>) -> Self {
        let name = default.name().to_string();
        let mut sources: BTreeMap<String, Arc<dyn Source>> = BTreeMap::new();
        sources.insert(name.clone(), default);
        Self {
            sources,
            default: name,
        }
    }

    /// Registry with a hosted default backed by `client`.
    pub fn hosted(url: &str, client: Arc<dyn RegistryClient>) -> Self {
        Self::new(Arc::new(HostedSource::new(url, client)))
    }

    pub fn register(&mut self, source: Arc<dyn Source>) {
        self.sources.insert(source.name().to_string(), source);
    }

    /// The source registered as `name`, or an [`UnknownSource`] for it.
    pub fn get(&self, name: &str) -> Arc<dyn Source> {
        match self.sources.get(name) {
            Some(source) => Arc::clone(source),
            None => Arc::new(UnknownSource::new(name)),
        }
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn default_source(&self) -> Arc<dyn Source> {
        self.get(&self.default)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }
}
