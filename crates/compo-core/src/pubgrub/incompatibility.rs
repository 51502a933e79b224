//! Incompatibilities: sets of terms that cannot all hold at once, plus the
//! arena that keeps the derivation graph between them.

use std::fmt;

use indexmap::IndexMap;

use super::term::Term;
use crate::error::{PackageNotFoundError, ResolveError};
use crate::package::{PackageRange, PackageRef};

/// Index of an incompatibility in its [`IncompatibilityStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IncompId(pub(crate) usize);

/// Why an incompatibility holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cause {
    /// The root package must be selected.
    Root,
    /// One package range depends on another.
    Dependency,
    /// No versions of the package match the constraint.
    NoVersions,
    /// The package comes from a source nothing is registered under.
    UnknownSource,
    PackageNotFound(PackageNotFoundError),
    /// Derived during conflict resolution from two earlier incompatibilities.
    Conflict { conflict: IncompId, other: IncompId },
}

impl Cause {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Cause::Conflict { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Incompatibility {
    terms: Vec<Term>,
    cause: Cause,
}

impl Incompatibility {
    /// Build an incompatibility, folding together terms about the same package.
    ///
    /// Positive root terms are dropped from derived incompatibilities: the
    /// root is always selected, so they carry no information.
    pub fn new(terms: Vec<Term>, cause: Cause) -> Result<Self, ResolveError> {
        let terms = if terms.len() != 1
            && cause.is_conflict()
            && terms.iter().any(|t| t.is_positive && t.package.is_root())
        {
            terms
                .into_iter()
                .filter(|t| !t.is_positive || !t.package.is_root())
                .collect()
        } else {
            terms
        };

        if terms.len() == 1 || (terms.len() == 2 && terms[0].name() != terms[1].name()) {
            return Ok(Self { terms, cause });
        }

        let mut by_name: IndexMap<String, IndexMap<PackageRef, Term>> = IndexMap::new();
        for term in terms {
            let by_ref = by_name.entry(term.name().to_string()).or_default();
            let reference = term.package.package.clone();
            match by_ref.get(&reference) {
                Some(existing) => {
                    // Mutually exclusive terms would make this incompatibility
                    // irrelevant; it should never have been derived.
                    let merged = existing.intersect(&term).ok_or_else(|| {
                        ResolveError::state(format!("{} and {} have no intersection", existing, term))
                    })?;
                    by_ref.insert(reference, merged);
                }
                None => {
                    by_ref.insert(reference, term);
                }
            }
        }

        let mut folded = Vec::new();
        for by_ref in by_name.into_values() {
            let has_positive = by_ref.values().any(|t| t.is_positive);
            folded.extend(by_ref.into_values().filter(|t| t.is_positive || !has_positive));
        }
        Ok(Self {
            terms: folded,
            cause,
        })
    }

    /// `depender` requires `target`.
    pub fn dependency(depender: PackageRange, target: PackageRange) -> Self {
        Self {
            terms: vec![Term::positive(depender), Term::negative(target)],
            cause: Cause::Dependency,
        }
    }

    /// A single-term incompatibility; never needs folding.
    pub fn unit(term: Term, cause: Cause) -> Self {
        Self {
            terms: vec![term],
            cause,
        }
    }

    /// The same terms under a different cause.
    pub(crate) fn with_cause(&self, cause: Cause) -> Self {
        Self {
            terms: self.terms.clone(),
            cause,
        }
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    /// Whether this incompatibility means no solution exists at all.
    pub fn is_failure(&self) -> bool {
        self.terms.is_empty() || (self.terms.len() == 1 && self.terms[0].package.is_root())
    }

    fn single_term_where(&self, predicate: impl Fn(&Term) -> bool) -> Option<&Term> {
        let mut found = None;
        for term in &self.terms {
            if !predicate(term) {
                continue;
            }
            if found.is_some() {
                return None;
            }
            found = Some(term);
        }
        found
    }

    fn verb(&self) -> &'static str {
        if self.cause == Cause::Dependency {
            "depends on"
        } else {
            "requires"
        }
    }

    /// Describe this and `other` together, as in "A depends on B which requires C".
    pub fn and_to_string(&self, other: &Incompatibility, this_line: Option<usize>, other_line: Option<usize>) -> String {
        if let Some(text) = self.try_requires_both(other, this_line, other_line) {
            return text;
        }
        if let Some(text) = self.try_requires_through(other, this_line, other_line) {
            return text;
        }
        if let Some(text) = self.try_requires_forbidden(other, this_line, other_line) {
            return text;
        }

        let mut out = self.to_string();
        push_line(&mut out, this_line);
        out.push_str(" and ");
        out.push_str(&other.to_string());
        push_line(&mut out, other_line);
        out
    }

    /// Both incompatibilities hang off the same positive term.
    fn try_requires_both(&self, other: &Incompatibility, this_line: Option<usize>, other_line: Option<usize>) -> Option<String> {
        if self.terms.len() == 1 || other.terms.len() == 1 {
            return None;
        }
        let this_positive = self.single_term_where(|t| t.is_positive)?;
        let other_positive = other.single_term_where(|t| t.is_positive)?;
        if this_positive.package != other_positive.package {
            return None;
        }

        let verb = if self.cause == Cause::Dependency && other.cause == Cause::Dependency {
            "depends on"
        } else {
            "requires"
        };
        let mut out = format!("{} {} both {}", terse(this_positive, true), verb, negatives(self));
        push_line(&mut out, this_line);
        out.push_str(" and ");
        out.push_str(&negatives(other));
        push_line(&mut out, other_line);
        Some(out)
    }

    /// One incompatibility's negative term feeds the other's positive term.
    fn try_requires_through(&self, other: &Incompatibility, this_line: Option<usize>, other_line: Option<usize>) -> Option<String> {
        if self.terms.len() == 1 || other.terms.len() == 1 {
            return None;
        }
        let this_negative = self.single_term_where(|t| !t.is_positive);
        let other_negative = other.single_term_where(|t| !t.is_positive);
        if this_negative.is_none() && other_negative.is_none() {
            return None;
        }
        let this_positive = self.single_term_where(|t| t.is_positive);
        let other_positive = other.single_term_where(|t| t.is_positive);

        let feeds = |negative: Option<&Term>, positive: Option<&Term>| match (negative, positive) {
            (Some(n), Some(p)) => n.name() == p.name() && n.inverse().satisfies(p),
            _ => false,
        };

        let (prior, prior_negative, prior_line, latter, latter_line) = if feeds(this_negative, other_positive) {
            (self, this_negative?, this_line, other, other_line)
        } else if feeds(other_negative, this_positive) {
            (other, other_negative?, other_line, self, this_line)
        } else {
            return None;
        };

        let prior_positives: Vec<&Term> = prior.terms.iter().filter(|t| t.is_positive).collect();
        let mut out = String::new();
        match prior_positives.as_slice() {
            [] => return None,
            [single] => {
                out.push_str(&format!("{} {} ", terse(single, true), prior.verb()));
            }
            many => {
                out.push_str(&format!("if {} then ", join_terse(many, " or ")));
            }
        }
        out.push_str(&terse(prior_negative, false));
        push_line(&mut out, prior_line);
        out.push_str(" which ");
        out.push_str(latter.verb());
        out.push(' ');
        out.push_str(&negatives(latter));
        push_line(&mut out, latter_line);
        Some(out)
    }

    /// One side is a single-term fact ruling out what the other requires.
    fn try_requires_forbidden(&self, other: &Incompatibility, this_line: Option<usize>, other_line: Option<usize>) -> Option<String> {
        if self.terms.len() != 1 && other.terms.len() != 1 {
            return None;
        }
        let (prior, prior_line, latter, latter_line) = if self.terms.len() == 1 {
            (other, other_line, self, this_line)
        } else {
            (self, this_line, other, other_line)
        };

        let negative = prior.single_term_where(|t| !t.is_positive)?;
        let forbidden = latter.terms.first()?;
        if !negative.inverse().satisfies(forbidden) {
            return None;
        }

        let positives: Vec<&Term> = prior.terms.iter().filter(|t| t.is_positive).collect();
        let mut out = String::new();
        match positives.as_slice() {
            [] => return None,
            [single] => {
                out.push_str(&format!("{} {} ", terse(single, true), prior.verb()));
            }
            many => {
                out.push_str(&format!("if {} then ", join_terse(many, " or ")));
            }
        }

        if latter.cause == Cause::UnknownSource {
            out.push_str(&forbidden.package.fmt_bare());
            out.push(' ');
            if let Some(line) = prior_line {
                out.push_str(&format!("({}) ", line));
            }
            out.push_str(&format!(
                "from unknown source \"{}\"",
                forbidden.package.package.source.as_deref().unwrap_or_default()
            ));
            push_line(&mut out, latter_line);
            return Some(out);
        }

        out.push_str(&terse(forbidden, false));
        out.push(' ');
        if let Some(line) = prior_line {
            out.push_str(&format!("({}) ", line));
        }
        match &latter.cause {
            Cause::NoVersions => out.push_str("which doesn't match any versions"),
            Cause::PackageNotFound(error) => {
                out.push_str(&format!("which doesn't exist ({})", error.message));
            }
            _ => out.push_str("which is forbidden"),
        }
        push_line(&mut out, latter_line);
        Some(out)
    }
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Cause::Dependency if self.terms.len() == 2 => {
                return write!(
                    f,
                    "{} depends on {}",
                    terse(&self.terms[0], true),
                    terse(&self.terms[1], false)
                );
            }
            Cause::NoVersions if self.terms.len() == 1 => {
                let term = &self.terms[0];
                return write!(f, "no versions of {} match {}", term.package.package, term.constraint());
            }
            Cause::PackageNotFound(error) if self.terms.len() == 1 => {
                return write!(f, "{} doesn't exist ({})", self.terms[0].package.package, error.message);
            }
            Cause::UnknownSource if self.terms.len() == 1 => {
                let package = &self.terms[0].package.package;
                return write!(
                    f,
                    "{} comes from unknown source \"{}\"",
                    package.name,
                    package.source.as_deref().unwrap_or_default()
                );
            }
            Cause::Root if self.terms.len() == 1 => {
                let term = &self.terms[0];
                return write!(f, "{} is {}", term.name(), term.constraint());
            }
            _ => {}
        }
        if self.is_failure() {
            return write!(f, "version solving failed");
        }

        if let [term] = self.terms.as_slice() {
            let verdict = if term.is_positive { "forbidden" } else { "required" };
            if term.constraint().is_any() {
                return write!(f, "{} is {}", term.package.package, verdict);
            }
            return write!(f, "{} is {}", term.package, verdict);
        }

        if let [first, second] = self.terms.as_slice() {
            if first.is_positive == second.is_positive {
                if first.is_positive {
                    return write!(f, "{} is incompatible with {}", terse_any(first), terse_any(second));
                }
                return write!(f, "either {} or {}", terse(first, false), terse(second, false));
            }
        }

        let positive: Vec<&Term> = self.terms.iter().filter(|t| t.is_positive).collect();
        let negative: Vec<&Term> = self.terms.iter().filter(|t| !t.is_positive).collect();
        match (positive.as_slice(), negative.is_empty()) {
            ([single], false) => write!(f, "{} requires {}", terse(single, true), join_terse(&negative, " or ")),
            ([], _) => write!(f, "one of {} must be true", join_terse(&negative, " or ")),
            (_, true) => write!(f, "one of {} must be false", join_terse(&positive, " or ")),
            (_, false) => write!(
                f,
                "if {} then {}",
                join_terse(&positive, " and "),
                join_terse(&negative, " or ")
            ),
        }
    }
}

fn terse(term: &Term, allow_every: bool) -> String {
    if allow_every && term.constraint().is_any() {
        format!("every version of {}", term.package.package)
    } else {
        term.package.to_string()
    }
}

/// Positive terms with no constraint read better as just the package.
fn terse_any(term: &Term) -> String {
    if term.constraint().is_any() {
        term.package.package.to_string()
    } else {
        term.package.to_string()
    }
}

fn join_terse(terms: &[&Term], separator: &str) -> String {
    terms
        .iter()
        .map(|t| terse(t, false))
        .collect::<Vec<_>>()
        .join(separator)
}

fn negatives(incompatibility: &Incompatibility) -> String {
    let negative: Vec<&Term> = incompatibility.terms.iter().filter(|t| !t.is_positive).collect();
    join_terse(&negative, " or ")
}

fn push_line(out: &mut String, line: Option<usize>) {
    if let Some(line) = line {
        out.push_str(&format!(" ({})", line));
    }
}

/// Arena owning every incompatibility of one resolution.
///
/// Conflict causes refer to their parents by [`IncompId`], so shared
/// derivations stay shared.
#[derive(Clone, Debug, Default)]
pub struct IncompatibilityStore {
    items: Vec<Incompatibility>,
}

impl IncompatibilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, incompatibility: Incompatibility) -> IncompId {
        self.items.push(incompatibility);
        IncompId(self.items.len() - 1)
    }

    pub fn get(&self, id: IncompId) -> &Incompatibility {
        &self.items[id.0]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The leaves of `id`'s derivation, left to right.
    pub fn external_incompatibilities(&self, id: IncompId) -> Vec<IncompId> {
        let mut leaves = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match self.get(current).cause() {
                Cause::Conflict { conflict, other } => {
                    stack.push(*other);
                    stack.push(*conflict);
                }
                _ => leaves.push(current),
            }
        }
        leaves
    }
}
