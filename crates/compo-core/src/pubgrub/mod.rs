//! PubGrub version solving.
//!
//! [`resolve_versions`] is the entry point. A failed resolution carries a
//! [`SolveFailure`] whose message explains the conflict in numbered prose.

mod failure;
mod incompatibility;
mod package_lister;
mod partial_solution;
mod reformat;
mod result;
mod solver;
mod term;

pub use failure::SolveFailure;
pub use incompatibility::{Cause, IncompId, Incompatibility, IncompatibilityStore};
pub use package_lister::PackageLister;
pub use partial_solution::{Assignment, PartialSolution};
pub use result::{SolveOptions, SolveResult};
pub use solver::{resolve_versions, VersionSolver};
pub use term::{SetRelation, Term};
