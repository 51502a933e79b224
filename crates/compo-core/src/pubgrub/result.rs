//! What a resolution is asked to do and what it hands back.

use std::collections::{BTreeMap, HashMap};

use crate::package::{Manifest, PackageId};
use crate::version::Version;

/// Knobs for one resolution.
#[derive(Clone, Debug, Default)]
pub struct SolveOptions {
    /// Prefer the oldest allowed versions instead of the newest.
    pub downgrade: bool,
    /// Versions to keep whenever the constraints still allow them, by name.
    pub locked: HashMap<String, PackageId>,
}

impl SolveOptions {
    pub fn lock(mut self, id: PackageId) -> Self {
        self.locked.insert(id.name().to_string(), id);
        self
    }
}

/// A successful resolution.
#[derive(Clone, Debug)]
pub struct SolveResult {
    /// Selected packages in decision order, root first.
    pub packages: Vec<PackageId>,
    pub manifests: BTreeMap<String, Manifest>,
    /// Every version seen for each selected package, ascending. Packages
    /// whose listing was never fetched report just the selected version.
    pub available_versions: BTreeMap<String, Vec<Version>>,
    pub attempted_solutions: usize,
}

impl SolveResult {
    pub fn get(&self, name: &str) -> Option<&PackageId> {
        self.packages.iter().find(|id| id.name() == name)
    }

    /// The most preferable version known for `name`, selected or not.
    pub fn newest_available(&self, name: &str) -> Option<&Version> {
        self.available_versions
            .get(name)?
            .iter()
            .max_by(|a, b| Version::prioritize(a, b))
    }

    /// Selected packages with a preferable version available.
    pub fn outdated(&self) -> Vec<(&PackageId, &Version)> {
        self.packages
            .iter()
            .filter(|id| !id.is_root())
            .filter_map(|id| {
                let newest = self.newest_available(id.name())?;
                (*newest != id.version).then_some((id, newest))
            })
            .collect()
    }
}
