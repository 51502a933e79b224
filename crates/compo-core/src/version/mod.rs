//! Version algebra: versions, ranges, unions and the constraint grammar.

mod constraint;
mod parse;
mod range;
#[allow(clippy::module_inception)]
mod version;

pub use constraint::VersionConstraint;
pub use range::VersionRange;
pub use version::Version;
