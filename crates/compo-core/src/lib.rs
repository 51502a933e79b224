//! Core library for compo: the version algebra, package sources and the
//! PubGrub solver that picks component versions for a bundle.
//! Used by the CLI binary; embedders call [`resolve_versions`] directly.

pub mod config;
pub mod error;
pub mod logging;
pub mod package;
pub mod pubgrub;
pub mod version;

// Re-export main API for CLI
pub use config::Config;
pub use error::{ConfigError, ManifestError, PackageNotFoundError, ResolveError, SourceError, VersionError};
pub use package::{
    DirectoryRegistry, Manifest, MemoryRegistry, PackageId, PackageRange, PackageRef, RegistryClient,
    SourceRegistry, SystemCache,
};
pub use pubgrub::{resolve_versions, SolveFailure, SolveOptions, SolveResult};
pub use version::{Version, VersionConstraint, VersionRange};
