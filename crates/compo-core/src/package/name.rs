//! Package identity: a reference to a package, a constrained range of it,
//! or one exact version.

use std::fmt;

use crate::version::{Version, VersionConstraint};

/// Name of the default, registry-backed source.
pub const HOSTED: &str = "hosted";

/// A package independent of version: name plus where it comes from.
///
/// `source == None` marks the root package. Descriptions are canonicalised
/// by the owning source when parsed, so plain equality is "same package".
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageRef {
    pub name: String,
    pub source: Option<String>,
    pub description: String,
}

impl PackageRef {
    pub fn new(name: impl Into<String>, source: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: Some(source.into()),
            description: description.into(),
        }
    }

    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            description: String::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.source.is_none()
    }

    pub fn with_constraint(&self, constraint: VersionConstraint) -> PackageRange {
        PackageRange {
            package: self.clone(),
            constraint,
        }
    }

    pub fn at_version(&self, version: Version) -> PackageId {
        PackageId {
            package: self.clone(),
            version,
        }
    }

    fn fmt_source(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source.as_deref() {
            Some(source) if source != HOSTED => write!(f, " from {}", source),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        self.fmt_source(f)
    }
}

/// A package with a version constraint attached.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PackageRange {
    pub package: PackageRef,
    pub constraint: VersionConstraint,
}

impl PackageRange {
    pub fn name(&self) -> &str {
        &self.package.name
    }

    pub fn is_root(&self) -> bool {
        self.package.is_root()
    }

    /// Same package, disregarding the constraint.
    pub fn same_package(&self, other: &PackageRange) -> bool {
        self.package == other.package
    }

    pub fn with_constraint(&self, constraint: VersionConstraint) -> PackageRange {
        self.package.with_constraint(constraint)
    }

    pub fn allows(&self, id: &PackageId) -> bool {
        self.package == id.package && self.constraint.allows(&id.version)
    }

    /// `name@*`-style rendering without the source suffix.
    pub(crate) fn fmt_bare(&self) -> String {
        if self.is_root() {
            return self.package.name.clone();
        }
        format!("{}@{}", self.package.name, self.constraint)
    }
}

impl fmt::Display for PackageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "{}", self.package.name);
        }
        write!(f, "{}@{}", self.package.name, self.constraint)?;
        self.package.fmt_source(f)
    }
}

/// A package at one exact version.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PackageId {
    pub package: PackageRef,
    pub version: Version,
}

impl PackageId {
    pub fn name(&self) -> &str {
        &self.package.name
    }

    pub fn is_root(&self) -> bool {
        self.package.is_root()
    }

    pub fn to_range(&self) -> PackageRange {
        self.package
            .with_constraint(VersionConstraint::Exact(self.version.clone()))
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.package.name, self.version)?;
        self.package.fmt_source(f)
    }
}
