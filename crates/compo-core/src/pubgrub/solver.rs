//! The PubGrub version solver: unit propagation, conflict-driven clause
//! learning and version selection over a [`PartialSolution`].

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use indexmap::IndexSet;
use log::{debug, info};

use super::failure::SolveFailure;
use super::incompatibility::{Cause, IncompId, Incompatibility, IncompatibilityStore};
use super::package_lister::PackageLister;
use super::partial_solution::PartialSolution;
use super::reformat::reformat_ranges;
use super::result::{SolveOptions, SolveResult};
use super::term::{SetRelation, Term};
use crate::error::{ResolveError, SourceError};
use crate::package::{Manifest, PackageRange, PackageRef, SystemCache};
use crate::version::VersionConstraint;

/// Resolve `root`'s dependency graph against `cache`.
///
/// Fails with [`ResolveError::Failure`] carrying a rendered explanation when
/// no solution exists.
pub fn resolve_versions(
    cache: &SystemCache,
    root: &Manifest,
    options: &SolveOptions,
) -> Result<SolveResult, ResolveError> {
    VersionSolver::new(cache, root, options).solve()
}

enum Propagation {
    /// Nothing new can be derived.
    None,
    /// Every term is satisfied.
    Conflict,
    /// A new assignment was derived for this package.
    Derived(String),
}

pub struct VersionSolver<'a> {
    cache: &'a SystemCache,
    root: &'a Manifest,
    options: &'a SolveOptions,
    store: IncompatibilityStore,
    /// Incompatibilities by the package names they mention, in registration order.
    incompatibilities: HashMap<String, Vec<IncompId>>,
    solution: PartialSolution,
    listers: HashMap<PackageRef, PackageLister>,
}

impl<'a> VersionSolver<'a> {
    pub fn new(cache: &'a SystemCache, root: &'a Manifest, options: &'a SolveOptions) -> Self {
        Self {
            cache,
            root,
            options,
            store: IncompatibilityStore::new(),
            incompatibilities: HashMap::new(),
            solution: PartialSolution::new(),
            listers: HashMap::new(),
        }
    }

    pub fn solve(mut self) -> Result<SolveResult, ResolveError> {
        let started = Instant::now();
        let root = self.root.root_id().to_range();
        self.add_incompatibility(Incompatibility::unit(Term::negative(root), Cause::Root));

        let outcome = self.run();
        info!(
            "Version solving took {:.3} seconds. Tried {} solutions.",
            started.elapsed().as_secs_f64(),
            self.solution.attempted_solutions()
        );
        outcome
    }

    fn run(&mut self) -> Result<SolveResult, ResolveError> {
        let mut next = Some(self.root.name.clone());
        while let Some(package) = next {
            self.propagate(&package)?;
            next = self.choose_package_version()?;
        }
        self.result()
    }

    fn propagate(&mut self, package: &str) -> Result<(), ResolveError> {
        let mut changed: IndexSet<String> = IndexSet::new();
        changed.insert(package.to_string());

        while let Some(package) = changed.shift_remove_index(0) {
            let ids = self.incompatibilities.get(&package).cloned().unwrap_or_default();
            // Newest first: learned incompatibilities are the most general.
            for id in ids.into_iter().rev() {
                match self.propagate_incompatibility(id)? {
                    Propagation::Conflict => {
                        let root_cause = self.resolve_conflict(id)?;
                        changed.clear();
                        match self.propagate_incompatibility(root_cause)? {
                            Propagation::Derived(name) => {
                                changed.insert(name);
                            }
                            _ => {
                                return Err(ResolveError::state(format!(
                                    "learned incompatibility {} derived nothing",
                                    self.store.get(root_cause)
                                )));
                            }
                        }
                        break;
                    }
                    Propagation::Derived(name) => {
                        changed.insert(name);
                    }
                    Propagation::None => {}
                }
            }
        }
        Ok(())
    }

    /// Derive the inverse of the one term of `id` the solution leaves open.
    fn propagate_incompatibility(&mut self, id: IncompId) -> Result<Propagation, ResolveError> {
        let mut unsatisfied: Option<&Term> = None;
        for term in self.store.get(id).terms() {
            match self.solution.relation(term) {
                SetRelation::Disjoint => return Ok(Propagation::None),
                SetRelation::Overlapping => {
                    if unsatisfied.is_some() {
                        return Ok(Propagation::None);
                    }
                    unsatisfied = Some(term);
                }
                SetRelation::Subset => {}
            }
        }

        let term = match unsatisfied {
            Some(term) => term.clone(),
            None => return Ok(Propagation::Conflict),
        };
        debug!("derived:{} {}", if term.is_positive { " not" } else { "" }, term.package);
        let name = term.name().to_string();
        self.solution.derive(term.package, !term.is_positive, id)?;
        Ok(Propagation::Derived(name))
    }

    /// Learn the root cause of the satisfied incompatibility `id` and
    /// backjump to where it allows a new derivation.
    fn resolve_conflict(&mut self, id: IncompId) -> Result<IncompId, ResolveError> {
        debug!("conflict: {}", self.store.get(id));

        let mut current = id;
        let mut is_new = false;
        while !self.store.get(current).is_failure() {
            let incompatibility = self.store.get(current);

            let mut most_recent_term: Option<&Term> = None;
            let mut most_recent_satisfier = None;
            // What the satisfier allows beyond the term; `None` when it alone satisfies it.
            let mut difference: Option<Term> = None;
            // Never backjump past the root's decision.
            let mut previous_satisfier_level = 1;

            for term in incompatibility.terms() {
                let satisfier = self.solution.satisfier(term)?;
                match most_recent_satisfier {
                    None => {
                        most_recent_term = Some(term);
                        most_recent_satisfier = Some(satisfier);
                    }
                    Some(recent) if recent.index < satisfier.index => {
                        previous_satisfier_level = previous_satisfier_level.max(recent.decision_level);
                        most_recent_term = Some(term);
                        most_recent_satisfier = Some(satisfier);
                        difference = None;
                    }
                    Some(_) => {
                        previous_satisfier_level = previous_satisfier_level.max(satisfier.decision_level);
                    }
                }

                if most_recent_term.is_some_and(|recent| std::ptr::eq(recent, term)) {
                    if let Some(recent) = most_recent_satisfier {
                        difference = recent.term.difference(term);
                        if let Some(rest) = &difference {
                            let level = self.solution.satisfier(&rest.inverse())?.decision_level;
                            previous_satisfier_level = previous_satisfier_level.max(level);
                        }
                    }
                }
            }

            let (term, satisfier) = match (most_recent_term, most_recent_satisfier) {
                (Some(term), Some(satisfier)) => (term.clone(), satisfier.clone()),
                _ => return Err(ResolveError::state("a conflict must have terms")),
            };

            let cause_id = match satisfier.cause {
                Some(cause) if previous_satisfier_level >= satisfier.decision_level => cause,
                _ => {
                    self.solution.backtrack(previous_satisfier_level)?;
                    if is_new {
                        self.register(current);
                    }
                    return Ok(current);
                }
            };

            let mut terms: Vec<Term> = incompatibility
                .terms()
                .iter()
                .filter(|t| **t != term)
                .cloned()
                .collect();
            terms.extend(
                self.store
                    .get(cause_id)
                    .terms()
                    .iter()
                    .filter(|t| t.package != satisfier.term.package)
                    .cloned(),
            );
            let partially = if difference.is_some() { " partially" } else { "" };
            if let Some(rest) = difference {
                terms.push(rest.inverse());
            }

            let learned = Incompatibility::new(
                terms,
                Cause::Conflict {
                    conflict: current,
                    other: cause_id,
                },
            )?;
            current = self.store.alloc(learned);
            is_new = true;
            debug!(
                "! {} is{} satisfied by {}\n! which is caused by \"{}\"\n! thus: {}",
                term,
                partially,
                satisfier,
                self.store.get(cause_id),
                self.store.get(current)
            );
        }

        let (store, root) = reformat_ranges(&self.store, current, &self.listers);
        Err(SolveFailure::new(store, root).into())
    }

    /// Pick the next package to decide. `None` once every positive term is decided.
    fn choose_package_version(&mut self) -> Result<Option<String>, ResolveError> {
        let unsatisfied = self.solution.unsatisfied();
        if unsatisfied.is_empty() {
            return Ok(None);
        }

        // Packages from unknown sources can only ever conflict.
        if let Some(candidate) = unsatisfied
            .iter()
            .find(|c| !c.is_root() && !self.cache.is_known_source(&c.package))
        {
            let any = candidate.with_constraint(VersionConstraint::Any);
            self.add_incompatibility(Incompatibility::unit(Term::positive(any), Cause::UnknownSource));
            return Ok(Some(candidate.name().to_string()));
        }

        // Fewest candidate versions first, so forced conflicts surface early.
        let mut best: Option<(usize, PackageRange)> = None;
        for candidate in unsatisfied {
            let count = self.lister(&candidate.package).count_versions(&candidate.constraint)?;
            if best.as_ref().map_or(true, |(fewest, _)| count < *fewest) {
                best = Some((count, candidate));
            }
        }
        let package = match best {
            Some((_, package)) => package,
            None => return Ok(None),
        };
        let name = package.name().to_string();

        let version = match self.lister(&package.package).best_version(&package.constraint) {
            Ok(version) => version,
            Err(SourceError::NotFound(error)) => {
                let any = package.with_constraint(VersionConstraint::Any);
                self.add_incompatibility(Incompatibility::unit(Term::positive(any), Cause::PackageNotFound(error)));
                return Ok(Some(name));
            }
            Err(e) => return Err(e.into()),
        };

        let version = match version {
            Some(version) => version,
            None => {
                // A constraint excluding a single version is the inverse of a
                // lock; asking for any version gives better-scoped facts.
                let retry = if excludes_single_version(&package.constraint) {
                    self.lister(&package.package).best_version(&VersionConstraint::Any)?
                } else {
                    None
                };
                match retry {
                    Some(version) => version,
                    None => {
                        self.add_incompatibility(Incompatibility::unit(Term::positive(package), Cause::NoVersions));
                        return Ok(Some(name));
                    }
                }
            }
        };

        let incompatibilities = self.lister(&package.package).incompatibilities_for(&version)?;
        let mut conflict = false;
        for incompatibility in incompatibilities {
            // Already satisfied: deciding now would conflict immediately, so
            // let propagation steer towards another version first.
            conflict = conflict
                || incompatibility
                    .terms()
                    .iter()
                    .all(|t| t.name() == name || self.solution.satisfies(t));
            self.add_incompatibility(incompatibility);
        }

        if !conflict {
            debug!("selecting {}", version);
            self.solution.decide(version)?;
        }
        Ok(Some(name))
    }

    fn add_incompatibility(&mut self, incompatibility: Incompatibility) -> IncompId {
        debug!("fact: {}", incompatibility);
        let id = self.store.alloc(incompatibility);
        self.register(id);
        id
    }

    fn register(&mut self, id: IncompId) {
        for term in self.store.get(id).terms() {
            self.incompatibilities
                .entry(term.name().to_string())
                .or_default()
                .push(id);
        }
    }

    fn lister(&mut self, reference: &PackageRef) -> &mut PackageLister {
        let cache = self.cache;
        let root = self.root;
        let options = self.options;
        self.listers.entry(reference.clone()).or_insert_with(|| {
            if reference.is_root() {
                return PackageLister::root(root);
            }
            let locked = options
                .locked
                .get(&reference.name)
                .filter(|id| id.package == *reference)
                .cloned();
            PackageLister::new(reference.clone(), cache.bound(reference), locked, options.downgrade)
        })
    }

    fn result(&self) -> Result<SolveResult, ResolveError> {
        let mut packages = Vec::new();
        let mut manifests = BTreeMap::new();
        let mut available_versions = BTreeMap::new();

        for id in self.solution.decisions() {
            let manifest = if id.is_root() {
                self.root.clone()
            } else {
                self.cache.describe(id)?.as_ref().clone()
            };
            manifests.insert(id.name().to_string(), manifest);

            let versions = self
                .listers
                .get(&id.package)
                .and_then(PackageLister::cached_versions)
                .map(|ids| ids.iter().map(|known| known.version.clone()).collect())
                .unwrap_or_else(|| vec![id.version.clone()]);
            available_versions.insert(id.name().to_string(), versions);
            packages.push(id.clone());
        }

        Ok(SolveResult {
            packages,
            manifests,
            available_versions,
            attempted_solutions: self.solution.attempted_solutions(),
        })
    }
}

fn excludes_single_version(constraint: &VersionConstraint) -> bool {
    matches!(VersionConstraint::Any.difference(constraint), VersionConstraint::Exact(_))
}
