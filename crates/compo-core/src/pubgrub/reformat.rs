//! Rewrites the ranges of a failure's derivation in terms of versions that
//! actually exist, so `>=2.0.0-0` reads as `>=2.0.0` and a raw `<1.1.0`
//! bound reads as `<=1.0.9` when that is the newest version below it.

use std::collections::{HashMap, HashSet};

use super::incompatibility::{Cause, IncompId, Incompatibility, IncompatibilityStore};
use super::package_lister::PackageLister;
use super::term::Term;
use crate::package::{PackageId, PackageRef};
use crate::version::{Version, VersionConstraint, VersionRange};

/// Copy the derivation of `root` into a fresh store with reformatted terms.
/// Shared sub-derivations stay shared.
pub(crate) fn reformat_ranges(
    store: &IncompatibilityStore,
    root: IncompId,
    listers: &HashMap<PackageRef, PackageLister>,
) -> (IncompatibilityStore, IncompId) {
    // Causes are always allocated before what they derive, so ascending id
    // order visits parents first.
    let mut reachable: HashSet<IncompId> = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !reachable.insert(id) {
            continue;
        }
        if let Cause::Conflict { conflict, other } = store.get(id).cause() {
            stack.push(*conflict);
            stack.push(*other);
        }
    }
    let mut order: Vec<IncompId> = reachable.into_iter().collect();
    order.sort();

    let mut out = IncompatibilityStore::new();
    let mut mapped: HashMap<IncompId, IncompId> = HashMap::new();
    for id in order {
        let original = store.get(id);
        let cause = match original.cause() {
            Cause::Conflict { conflict, other } => Cause::Conflict {
                conflict: mapped.get(conflict).copied().unwrap_or(*conflict),
                other: mapped.get(other).copied().unwrap_or(*other),
            },
            cause => cause.clone(),
        };
        let terms: Vec<Term> = original
            .terms()
            .iter()
            .map(|term| reformat_term(term, listers))
            .collect();
        let rewritten = Incompatibility::new(terms, cause.clone())
            .unwrap_or_else(|_| original.with_cause(cause));
        mapped.insert(id, out.alloc(rewritten));
    }

    let new_root = mapped.get(&root).copied().unwrap_or(root);
    (out, new_root)
}

fn reformat_term(term: &Term, listers: &HashMap<PackageRef, PackageLister>) -> Term {
    let versions: &[PackageId] = listers
        .get(&term.package.package)
        .and_then(PackageLister::cached_versions)
        .unwrap_or(&[]);

    let constraint = match term.constraint() {
        VersionConstraint::Range(range) => reformat_range(range, versions),
        VersionConstraint::Union(ranges) => Some(VersionConstraint::union_of(ranges.iter().map(|range| {
            reformat_range(range, versions).unwrap_or_else(|| VersionConstraint::from_range(range.clone()))
        }))),
        _ => None,
    };
    match constraint {
        Some(constraint) => Term::new(term.package.with_constraint(constraint), term.is_positive),
        None => term.clone(),
    }
}

fn reformat_range(range: &VersionRange, versions: &[PackageId]) -> Option<VersionConstraint> {
    let min = reformat_min(range, versions);
    let max = reformat_max(range, versions);
    if min.is_none() && max.is_none() {
        return None;
    }
    let (max, include_max) = match max {
        Some((max, include_max)) => (Some(max), include_max),
        None => (range.max().cloned(), range.include_max()),
    };
    let min = min.or_else(|| range.min().cloned());
    VersionConstraint::range_raw(min, max, range.include_min(), include_max).ok()
}

/// `>=X.Y.Z-0` becomes the first existing pre-release of `X.Y.Z`, or `X.Y.Z`.
fn reformat_min(range: &VersionRange, versions: &[PackageId]) -> Option<Version> {
    let min = range.min()?;
    if !range.include_min() || !min.is_first_prerelease() {
        return None;
    }
    let index = versions.partition_point(|id| id.version < *min);
    match versions.get(index) {
        Some(next) if next.version.equals_without_prerelease(min) => Some(next.version.clone()),
        _ => Some(min.release()),
    }
}

/// A raw exclusive release bound becomes `<=` the newest version below it,
/// or a plain `<X.Y.Z` when nothing is listed below it.
fn reformat_max(range: &VersionRange, versions: &[PackageId]) -> Option<(Version, bool)> {
    let max = range.max()?;
    if range.include_max() || max.is_prerelease() {
        return None;
    }
    if range
        .min()
        .is_some_and(|min| min.is_prerelease() && min.equals_without_prerelease(max))
    {
        return None;
    }
    let index = versions.partition_point(|id| id.version < *max);
    match index.checked_sub(1).and_then(|i| versions.get(i)) {
        Some(previous) => Some((previous.version.clone(), true)),
        None => Some((max.first_prerelease(), false)),
    }
}
