//! Error types shared by the version algebra, the package layer and the solver.
//!
//! Expected failures (missing packages, malformed manifests) are values the
//! solver folds into incompatibilities; only `ResolveError::Source` and
//! `ResolveError::State` abort a resolution early.

use thiserror::Error;

use crate::pubgrub::SolveFailure;
use crate::version::Version;

/// Malformed version or constraint input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("could not parse \"{text}\": {reason}")]
    Format { text: String, reason: String },
    #[error("minimum version \"{min}\" must be less than maximum \"{max}\"")]
    InvertedRange { min: Version, max: Version },
}

impl VersionError {
    pub(crate) fn format(text: &str, reason: impl Into<String>) -> Self {
        VersionError::Format {
            text: text.to_string(),
            reason: reason.into(),
        }
    }
}

/// A manifest that could not be turned into a usable package description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("invalid manifest: {0}")]
    Json(String),
    #[error("invalid version \"{version}\" in manifest of {name}: {reason}")]
    Version {
        name: String,
        version: String,
        reason: String,
    },
    #[error("invalid constraint \"{constraint}\" on {dependency} in manifest of {name}: {reason}")]
    Constraint {
        name: String,
        dependency: String,
        constraint: String,
        reason: String,
    },
    #[error("manifest of {expected} declares the name {actual}")]
    NameMismatch { expected: String, actual: String },
    #[error("{name} may not depend on itself")]
    SelfDependency { name: String },
}

/// The source has no package (or no such version) under the requested name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PackageNotFoundError {
    pub message: String,
}

impl PackageNotFoundError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// `could not find package <name>`
    pub fn package(name: &str) -> Self {
        Self::new(format!("could not find package {}", name))
    }

    /// `package <name> has no version <version>`
    pub fn version(name: &str, version: &Version) -> Self {
        Self::new(format!("package {} has no version {}", name, version))
    }
}

/// Failure reported by a bound source or registry client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error(transparent)]
    NotFound(#[from] PackageNotFoundError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("unknown source \"{0}\"")]
    UnknownSource(String),
    /// Transport or storage failure; never folded into the solve.
    #[error("registry error: {0}")]
    Registry(String),
}

impl SourceError {
    /// Errors the package lister turns into "no versions" facts.
    pub fn is_unusable_version(&self) -> bool {
        matches!(self, SourceError::NotFound(_) | SourceError::Manifest(_))
    }
}

/// Outcome of a resolution that did not produce a solution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Failure(Box<SolveFailure>),
    #[error(transparent)]
    Source(#[from] SourceError),
    /// An internal invariant was broken. Always a bug.
    #[error("[BUG] {0}")]
    State(String),
}

impl ResolveError {
    pub(crate) fn state(message: impl Into<String>) -> Self {
        ResolveError::State(message.into())
    }

    /// The failure proof, when solving finished without a solution.
    pub fn as_failure(&self) -> Option<&SolveFailure> {
        match self {
            ResolveError::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<SolveFailure> for ResolveError {
    fn from(failure: SolveFailure) -> Self {
        ResolveError::Failure(Box::new(failure))
    }
}

/// Unreadable or malformed configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid pin {name}@{version}: {reason}")]
    Pin {
        name: String,
        version: String,
        reason: String,
    },
}
