//! The partial solution: the ordered list of decisions and derivations
//! made so far, with per-package summaries for O(1) relation lookups.

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;

use super::incompatibility::IncompId;
use super::term::{SetRelation, Term};
use crate::error::ResolveError;
use crate::package::{PackageId, PackageRange, PackageRef};

/// A term in the partial solution, either decided or derived.
#[derive(Clone, Debug)]
pub struct Assignment {
    pub term: Term,
    pub decision_level: usize,
    /// Position in the assignment list.
    pub index: usize,
    /// The incompatibility this was derived from; `None` for decisions.
    pub cause: Option<IncompId>,
}

impl Assignment {
    pub fn is_decision(&self) -> bool {
        self.cause.is_none()
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.term)
    }
}

#[derive(Debug)]
pub struct PartialSolution {
    assignments: Vec<Assignment>,
    decisions: IndexMap<String, PackageId>,
    /// Intersection of all positive assignments per package name.
    positive: IndexMap<String, Term>,
    /// Intersection of negative assignments per name and reference, for
    /// packages with no positive assignment yet.
    negative: HashMap<String, HashMap<PackageRef, Term>>,
    attempted_solutions: usize,
    backtracking: bool,
}

impl Default for PartialSolution {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialSolution {
    pub fn new() -> Self {
        Self {
            assignments: Vec::new(),
            decisions: IndexMap::new(),
            positive: IndexMap::new(),
            negative: HashMap::new(),
            attempted_solutions: 1,
            backtracking: false,
        }
    }

    pub fn decisions(&self) -> impl Iterator<Item = &PackageId> {
        self.decisions.values()
    }

    pub fn decision_level(&self) -> usize {
        self.decisions.len()
    }

    /// How many solutions have been tried. Consecutive backtracks count once.
    pub fn attempted_solutions(&self) -> usize {
        self.attempted_solutions
    }

    /// Positive ranges not yet backed by a decision, in first-derived order.
    pub fn unsatisfied(&self) -> Vec<PackageRange> {
        self.positive
            .values()
            .filter(|term| !self.decisions.contains_key(term.name()))
            .map(|term| term.package.clone())
            .collect()
    }

    /// Select `id`, opening a new decision level.
    pub fn decide(&mut self, id: PackageId) -> Result<(), ResolveError> {
        if self.backtracking {
            self.attempted_solutions += 1;
        }
        self.backtracking = false;
        self.decisions.insert(id.name().to_string(), id.clone());
        let assignment = Assignment {
            term: Term::positive(id.to_range()),
            decision_level: self.decision_level(),
            index: self.assignments.len(),
            cause: None,
        };
        self.assign(assignment)
    }

    /// Record a term implied by `cause` at the current decision level.
    pub fn derive(&mut self, package: PackageRange, is_positive: bool, cause: IncompId) -> Result<(), ResolveError> {
        let assignment = Assignment {
            term: Term::new(package, is_positive),
            decision_level: self.decision_level(),
            index: self.assignments.len(),
            cause: Some(cause),
        };
        self.assign(assignment)
    }

    fn assign(&mut self, assignment: Assignment) -> Result<(), ResolveError> {
        self.assignments.push(assignment);
        if let Some(last) = self.assignments.last() {
            let term = last.term.clone();
            self.register(&term)?;
        }
        Ok(())
    }

    /// Drop every assignment above `decision_level`.
    pub fn backtrack(&mut self, decision_level: usize) -> Result<(), ResolveError> {
        self.backtracking = true;

        let mut packages: HashSet<String> = HashSet::new();
        while self
            .assignments
            .last()
            .is_some_and(|a| a.decision_level > decision_level)
        {
            if let Some(removed) = self.assignments.pop() {
                let name = removed.term.name().to_string();
                if removed.is_decision() {
                    self.decisions.shift_remove(&name);
                }
                packages.insert(name);
            }
        }

        // Merged summaries cannot be unmerged; rebuild them from what is left.
        for name in &packages {
            self.positive.shift_remove(name);
            self.negative.remove(name);
        }
        let survivors: Vec<Term> = self
            .assignments
            .iter()
            .filter(|a| packages.contains(a.term.name()))
            .map(|a| a.term.clone())
            .collect();
        for term in &survivors {
            self.register(term)?;
        }
        Ok(())
    }

    fn register(&mut self, term: &Term) -> Result<(), ResolveError> {
        let name = term.name().to_string();
        if let Some(old) = self.positive.get(&name) {
            let merged = old
                .intersect(term)
                .ok_or_else(|| ResolveError::state(format!("{} and {} have no intersection", old, term)))?;
            self.positive.insert(name, merged);
            return Ok(());
        }

        let reference = &term.package.package;
        let merged = match self.negative.get(&name).and_then(|by_ref| by_ref.get(reference)) {
            Some(old) => term
                .intersect(old)
                .ok_or_else(|| ResolveError::state(format!("{} and {} have no intersection", term, old)))?,
            None => term.clone(),
        };

        if merged.is_positive {
            self.negative.remove(&name);
            self.positive.insert(name, merged);
        } else {
            self.negative
                .entry(name)
                .or_default()
                .insert(merged.package.package.clone(), merged);
        }
        Ok(())
    }

    /// The earliest assignment at which the solution satisfies `term`.
    pub fn satisfier(&self, term: &Term) -> Result<&Assignment, ResolveError> {
        let mut assigned: Option<Term> = None;
        for assignment in &self.assignments {
            if assignment.term.name() != term.name() {
                continue;
            }

            if !assignment.term.package.is_root() && !assignment.term.package.same_package(&term.package) {
                // A positive assignment from another source rules `term`'s package out.
                if !assignment.term.is_positive {
                    continue;
                }
                return Ok(assignment);
            }

            let merged = match &assigned {
                None => Some(assignment.term.clone()),
                Some(previous) => previous.intersect(&assignment.term),
            };
            let merged = merged.ok_or_else(|| {
                ResolveError::state(format!("assignments for {} have no intersection", term.name()))
            })?;
            if merged.satisfies(term) {
                return Ok(assignment);
            }
            assigned = Some(merged);
        }
        Err(ResolveError::state(format!("{} is not satisfied", term)))
    }

    pub fn relation(&self, term: &Term) -> SetRelation {
        if let Some(positive) = self.positive.get(term.name()) {
            return positive.relation(term);
        }
        match self
            .negative
            .get(term.name())
            .and_then(|by_ref| by_ref.get(&term.package.package))
        {
            Some(negative) => negative.relation(term),
            None => SetRelation::Overlapping,
        }
    }

    pub fn satisfies(&self, term: &Term) -> bool {
        self.relation(term) == SetRelation::Subset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::HOSTED;
    use crate::version::{Version, VersionConstraint};

    fn range(name: &str, constraint: &str) -> PackageRange {
        PackageRef::new(name, HOSTED, "r").with_constraint(VersionConstraint::parse(constraint).unwrap())
    }

    fn id(name: &str, version: &str) -> PackageId {
        PackageRef::new(name, HOSTED, "r").at_version(Version::parse(version).unwrap())
    }

    #[test]
    fn test_decide_opens_levels() {
        let mut solution = PartialSolution::new();
        solution.derive(range("foo", "^1.0.0"), true, IncompId(0)).unwrap();
        assert_eq!(solution.decision_level(), 0);
        assert_eq!(solution.unsatisfied(), vec![range("foo", "^1.0.0")]);

        solution.decide(id("foo", "1.2.0")).unwrap();
        assert_eq!(solution.decision_level(), 1);
        assert!(solution.unsatisfied().is_empty());
        assert!(solution.satisfies(&Term::positive(range("foo", "^1.0.0"))));
    }

    #[test]
    fn test_negative_terms_merge_then_promote() {
        let mut solution = PartialSolution::new();
        solution.derive(range("foo", "^2.0.0"), false, IncompId(0)).unwrap();
        solution.derive(range("foo", "^3.0.0"), false, IncompId(1)).unwrap();
        assert!(solution.satisfies(&Term::negative(range("foo", "^2.0.0"))));
        assert_eq!(solution.relation(&Term::positive(range("foo", "^2.1.0"))), SetRelation::Disjoint);

        solution.derive(range("foo", ">=1.0.0"), true, IncompId(2)).unwrap();
        assert!(solution.satisfies(&Term::positive(range("foo", ">=1.0.0"))));
        assert_eq!(solution.relation(&Term::positive(range("foo", "^3.0.0"))), SetRelation::Disjoint);
        assert_eq!(solution.unsatisfied().len(), 1);
    }

    #[test]
    fn test_backtrack_rebuilds_summaries() {
        let mut solution = PartialSolution::new();
        solution.derive(range("foo", "*"), true, IncompId(0)).unwrap();
        solution.decide(id("foo", "1.0.0")).unwrap();
        solution.derive(range("bar", "^1.0.0"), true, IncompId(1)).unwrap();
        solution.decide(id("bar", "1.5.0")).unwrap();
        solution.derive(range("foo", "^2.0.0"), false, IncompId(2)).unwrap();

        solution.backtrack(1).unwrap();
        assert_eq!(solution.decision_level(), 1);
        assert_eq!(solution.unsatisfied(), vec![range("bar", "^1.0.0")]);
        assert_eq!(solution.relation(&Term::positive(range("foo", "^2.0.0"))), SetRelation::Disjoint);
    }

    #[test]
    fn test_attempted_solutions_counts_backtrack_runs() {
        let mut solution = PartialSolution::new();
        solution.decide(id("foo", "1.0.0")).unwrap();
        solution.decide(id("bar", "1.0.0")).unwrap();
        solution.decide(id("baz", "1.0.0")).unwrap();
        solution.backtrack(2).unwrap();
        solution.backtrack(1).unwrap();
        solution.decide(id("bar", "2.0.0")).unwrap();
        assert_eq!(solution.attempted_solutions(), 2);
    }

    #[test]
    fn test_satisfier_finds_earliest_assignment() {
        let mut solution = PartialSolution::new();
        solution.derive(range("foo", ">=1.0.0"), true, IncompId(0)).unwrap();
        solution.derive(range("foo", "<2.0.0"), true, IncompId(1)).unwrap();
        solution.decide(id("foo", "1.2.0")).unwrap();

        let satisfier = solution.satisfier(&Term::positive(range("foo", "^1.0.0"))).unwrap();
        assert_eq!(satisfier.index, 1);
        assert_eq!(satisfier.cause, Some(IncompId(1)));

        let missing = solution.satisfier(&Term::positive(range("bar", "*")));
        assert!(matches!(missing, Err(ResolveError::State(_))));
    }
}
