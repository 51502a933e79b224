//! Packages: identity, manifests, and the sources that serve them.

mod cache;
mod manifest;
mod name;
mod registry;
mod source;

pub use cache::SystemCache;
pub use manifest::Manifest;
pub use name::{PackageId, PackageRange, PackageRef, HOSTED};
pub use registry::{DirectoryRegistry, MemoryRegistry, RegistryClient};
pub use source::{BoundSource, HostedSource, RootSource, Source, SourceRegistry, UnknownSource};
