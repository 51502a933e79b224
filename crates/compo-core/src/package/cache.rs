//! The system cache: one bound source per source kind, shared by every
//! package lister in a resolution.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use log::debug;
use rayon::prelude::*;

use super::source::{BoundSource, SourceRegistry, UnknownSource};
use super::{Manifest, PackageId, PackageRange, PackageRef, Source};
use crate::error::SourceError;
use crate::version::Version;

pub struct SystemCache {
    sources: Arc<SourceRegistry>,
    bound: DashMap<String, Arc<dyn BoundSource>>,
}

impl SystemCache {
    pub fn new(sources: SourceRegistry) -> Self {
        Self {
            sources: Arc::new(sources),
            bound: DashMap::new(),
        }
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    /// The bound source for `package`, binding it on first use.
    ///
    /// The root package has no source here; it is served by
    /// [`RootSource`](super::RootSource) instead.
    pub fn bound(&self, package: &PackageRef) -> Arc<dyn BoundSource> {
        let name = match package.source.as_deref() {
            Some(name) => name,
            None => return UnknownSource::new("root").bind(Arc::clone(&self.sources)),
        };
        if let Some(bound) = self.bound.get(name) {
            return Arc::clone(bound.value());
        }
        let bound = self.sources.get(name).bind(Arc::clone(&self.sources));
        Arc::clone(self.bound.entry(name.to_string()).or_insert(bound).value())
    }

    pub fn is_known_source(&self, package: &PackageRef) -> bool {
        package.source.as_deref().is_some_and(|name| self.sources.is_known(name))
    }

    pub fn get_versions(&self, package: &PackageRef) -> Result<Arc<Vec<PackageId>>, SourceError> {
        self.bound(package).get_versions(package)
    }

    pub fn describe(&self, id: &PackageId) -> Result<Arc<Manifest>, SourceError> {
        self.bound(&id.package).describe(id)
    }

    /// Warm the cache ahead of solving by describing the preferred version
    /// of each dependency, breadth first, up to `depth` levels below the
    /// root. Lookup failures are left for the solver to report.
    ///
    /// Returns how many manifests were described.
    pub fn prefetch(&self, root: &Manifest, depth: usize) -> usize {
        let mut seen: HashSet<PackageRange> = HashSet::new();
        let mut frontier: Vec<PackageRange> = root
            .dependencies
            .values()
            .filter(|range| seen.insert((*range).clone()))
            .cloned()
            .collect();
        let mut described = 0;

        for level in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let next: Vec<Vec<PackageRange>> = frontier
                .par_iter()
                .filter(|range| self.is_known_source(&range.package))
                .filter_map(|range| {
                    let versions = self.get_versions(&range.package).ok()?;
                    let best = versions
                        .iter()
                        .filter(|id| range.constraint.allows(&id.version))
                        .max_by(|a, b| Version::prioritize(&a.version, &b.version))?;
                    let manifest = self.describe(best).ok()?;
                    Some(manifest.dependencies.values().cloned().collect())
                })
                .collect();
            described += next.len();
            debug!("prefetch level {}: {} of {} described", level, next.len(), frontier.len());
            frontier = next
                .into_iter()
                .flatten()
                .filter(|range| seen.insert(range.clone()))
                .collect();
        }
        described
    }
}
