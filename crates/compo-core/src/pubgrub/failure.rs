//! Failure explanations: renders the derivation of a failed resolution as
//! numbered English prose.

use std::collections::HashMap;

use thiserror::Error;

use super::incompatibility::{Cause, IncompId, Incompatibility, IncompatibilityStore};
use crate::error::PackageNotFoundError;

/// Proof that no solution exists.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SolveFailure {
    store: IncompatibilityStore,
    root: IncompId,
    message: String,
}

impl SolveFailure {
    pub(crate) fn new(store: IncompatibilityStore, root: IncompId) -> Self {
        let message = Writer::new(&store, root).write();
        Self {
            store,
            root,
            message,
        }
    }

    /// The full explanation, one sentence per line.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The failure incompatibility at the end of the derivation.
    pub fn incompatibility(&self) -> &Incompatibility {
        self.store.get(self.root)
    }

    pub fn store(&self) -> &IncompatibilityStore {
        &self.store
    }

    /// The first missing package behind the failure, if one is.
    pub fn package_not_found(&self) -> Option<&PackageNotFoundError> {
        self.store
            .external_incompatibilities(self.root)
            .into_iter()
            .find_map(|id| match self.store.get(id).cause() {
                Cause::PackageNotFound(error) => Some(error),
                _ => None,
            })
    }
}

struct Writer<'a> {
    store: &'a IncompatibilityStore,
    root: IncompId,
    /// How many derivations each incompatibility takes part in.
    derivations: HashMap<IncompId, usize>,
    lines: Vec<(String, Option<usize>)>,
    line_numbers: HashMap<IncompId, usize>,
}

impl<'a> Writer<'a> {
    fn new(store: &'a IncompatibilityStore, root: IncompId) -> Self {
        let mut derivations: HashMap<IncompId, usize> = HashMap::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let count = derivations.entry(id).or_insert(0);
            *count += 1;
            if *count > 1 {
                continue;
            }
            if let Cause::Conflict { conflict, other } = store.get(id).cause() {
                stack.push(*other);
                stack.push(*conflict);
            }
        }
        Self {
            store,
            root,
            derivations,
            lines: Vec::new(),
            line_numbers: HashMap::new(),
        }
    }

    fn write(mut self) -> String {
        let root = self.store.get(self.root);
        if root.cause().is_conflict() {
            self.visit(self.root, false);
        } else {
            self.write_line(self.root, format!("Because {}, version solving failed.", root), false);
        }

        let padding = match self.line_numbers.values().max() {
            Some(last) => format!("({}) ", last).len(),
            None => 0,
        };

        let mut out = String::new();
        let mut last_was_empty = false;
        for (message, number) in &self.lines {
            if message.is_empty() {
                if !last_was_empty {
                    out.push('\n');
                }
                last_was_empty = true;
                continue;
            }
            last_was_empty = false;

            match number {
                Some(number) => {
                    let label = format!("({})", number);
                    out.push_str(&format!("{:<width$}", label, width = padding));
                }
                None => out.push_str(&" ".repeat(padding)),
            }
            out.push_str(message);
            out.push('\n');
        }
        out
    }

    fn write_line(&mut self, id: IncompId, message: String, numbered: bool) {
        if numbered {
            let number = self.line_numbers.len() + 1;
            self.line_numbers.insert(id, number);
            self.lines.push((message, Some(number)));
        } else {
            self.lines.push((message, None));
        }
    }

    fn is_derived(&self, id: IncompId) -> bool {
        self.store.get(id).cause().is_conflict()
    }

    fn causes(&self, id: IncompId) -> Option<(IncompId, IncompId)> {
        match self.store.get(id).cause() {
            Cause::Conflict { conflict, other } => Some((*conflict, *other)),
            _ => None,
        }
    }

    /// Write the derivation of `id`, a derived incompatibility.
    fn visit(&mut self, id: IncompId, conclusion: bool) {
        let store = self.store;
        let (conflict_id, other_id) = match self.causes(id) {
            Some(causes) => causes,
            None => return,
        };
        let numbered = conclusion || self.derivations.get(&id).copied().unwrap_or(0) > 1;
        let conjunction = if conclusion || id == self.root { "So," } else { "And" };
        let incompatibility = store.get(id);
        let conflict = store.get(conflict_id);
        let other = store.get(other_id);

        match (self.is_derived(conflict_id), self.is_derived(other_id)) {
            (true, true) => {
                let conflict_line = self.line_numbers.get(&conflict_id).copied();
                let other_line = self.line_numbers.get(&other_id).copied();
                match (conflict_line, other_line) {
                    (Some(_), Some(_)) => {
                        let text = conflict.and_to_string(other, conflict_line, other_line);
                        self.write_line(id, format!("Because {}, {}.", text, incompatibility), numbered);
                    }
                    (Some(line), None) | (None, Some(line)) => {
                        let (with_line, without_line) = if conflict_line.is_some() {
                            (conflict, other_id)
                        } else {
                            (other, conflict_id)
                        };
                        self.visit(without_line, false);
                        self.write_line(
                            id,
                            format!("{} because {} ({}), {}.", conjunction, with_line, line, incompatibility),
                            numbered,
                        );
                    }
                    (None, None) => {
                        let single_line_conflict = self.is_single_line(conflict_id);
                        let single_line_other = self.is_single_line(other_id);
                        if single_line_conflict || single_line_other {
                            let (first, second) = if single_line_other {
                                (conflict_id, other_id)
                            } else {
                                (other_id, conflict_id)
                            };
                            self.visit(first, false);
                            self.visit(second, false);
                            self.write_line(id, format!("Thus, {}.", incompatibility), numbered);
                        } else {
                            self.visit(conflict_id, true);
                            self.lines.push((String::new(), None));
                            self.visit(other_id, false);
                            let reference = match self.line_numbers.get(&conflict_id) {
                                Some(line) => format!("{} ({})", conflict, line),
                                None => conflict.to_string(),
                            };
                            self.write_line(
                                id,
                                format!("{} because {}, {}.", conjunction, reference, incompatibility),
                                numbered,
                            );
                        }
                    }
                }
            }
            (true, false) | (false, true) => {
                let (derived_id, external) = if self.is_derived(conflict_id) {
                    (conflict_id, other)
                } else {
                    (other_id, conflict)
                };

                if let Some(line) = self.line_numbers.get(&derived_id).copied() {
                    let text = external.and_to_string(store.get(derived_id), None, Some(line));
                    self.write_line(id, format!("Because {}, {}.", text, incompatibility), numbered);
                } else if self.is_collapsible(derived_id) {
                    let (inner_conflict, inner_other) = match self.causes(derived_id) {
                        Some(causes) => causes,
                        None => return,
                    };
                    let (collapsed_derived, collapsed_external) = if self.is_derived(inner_conflict) {
                        (inner_conflict, inner_other)
                    } else {
                        (inner_other, inner_conflict)
                    };
                    self.visit(collapsed_derived, false);
                    let text = store.get(collapsed_external).and_to_string(external, None, None);
                    self.write_line(
                        id,
                        format!("{} because {}, {}.", conjunction, text, incompatibility),
                        numbered,
                    );
                } else {
                    self.visit(derived_id, false);
                    self.write_line(
                        id,
                        format!("{} because {}, {}.", conjunction, external, incompatibility),
                        numbered,
                    );
                }
            }
            (false, false) => {
                let text = conflict.and_to_string(other, None, None);
                self.write_line(id, format!("Because {}, {}.", text, incompatibility), numbered);
            }
        }
    }

    /// Whether `id` can be folded into the sentence of its only consumer.
    fn is_collapsible(&self, id: IncompId) -> bool {
        if self.derivations.get(&id).copied().unwrap_or(0) > 1 {
            return false;
        }
        let (conflict, other) = match self.causes(id) {
            Some(causes) => causes,
            None => return false,
        };
        let (conflict_derived, other_derived) = (self.is_derived(conflict), self.is_derived(other));
        if conflict_derived == other_derived {
            return false;
        }
        let complex = if conflict_derived { conflict } else { other };
        !self.line_numbers.contains_key(&complex)
    }

    /// Derived from two external incompatibilities.
    fn is_single_line(&self, id: IncompId) -> bool {
        match self.causes(id) {
            Some((conflict, other)) => !self.is_derived(conflict) && !self.is_derived(other),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::package::{PackageRange, PackageRef, HOSTED};
    use crate::pubgrub::Term;
    use crate::version::{Version, VersionConstraint};

    fn range(name: &str, constraint: &str) -> PackageRange {
        PackageRef::new(name, HOSTED, "r").with_constraint(VersionConstraint::parse(constraint).unwrap())
    }

    fn root() -> PackageRange {
        PackageRef::root("myapp").at_version(Version::new(0, 0, 0)).to_range()
    }

    fn conflict(store: &mut IncompatibilityStore, terms: Vec<Term>, conflict: IncompId, other: IncompId) -> IncompId {
        store.alloc(Incompatibility::new(terms, Cause::Conflict { conflict, other }).unwrap())
    }

    #[test]
    fn test_external_root_failure() {
        let mut store = IncompatibilityStore::new();
        let root = store.alloc(Incompatibility::unit(Term::negative(root()), Cause::Root));
        let failure = SolveFailure::new(store, root);
        assert_eq!(failure.message(), "Because myapp is 0.0.0, version solving failed.\n");
        assert!(failure.package_not_found().is_none());
    }

    #[test]
    fn test_package_not_found_is_reported() {
        let mut store = IncompatibilityStore::new();
        let missing = store.alloc(Incompatibility::unit(
            Term::positive(range("jakedash", "*")),
            Cause::PackageNotFound(PackageNotFoundError::package("jakedash")),
        ));
        let dep = store.alloc(Incompatibility::dependency(root(), range("jakedash", "*")));
        let top = conflict(&mut store, vec![Term::positive(root())], missing, dep);

        let failure = SolveFailure::new(store, top);
        assert_eq!(
            failure.message(),
            "Because myapp depends on jakedash@* which doesn't exist (could not find package jakedash), \
             version solving failed.\n"
        );
        assert_eq!(failure.package_not_found().map(|e| e.message.as_str()), Some("could not find package jakedash"));
        assert_eq!(failure.to_string(), failure.message());
    }

    #[test]
    fn test_shared_derivation_gets_line_numbers() {
        // a and b both need c, whose only versions need d@^2.0.0, which does not exist.
        let mut store = IncompatibilityStore::new();
        let no_d = store.alloc(Incompatibility::unit(Term::positive(range("d", "^2.0.0")), Cause::NoVersions));
        let c_needs_d = store.alloc(Incompatibility::dependency(range("c", "*"), range("d", "^2.0.0")));
        let c_forbidden = conflict(&mut store, vec![Term::positive(range("c", "*"))], no_d, c_needs_d);

        let a_needs_c = store.alloc(Incompatibility::dependency(range("a", "*"), range("c", "*")));
        let a_forbidden = conflict(&mut store, vec![Term::positive(range("a", "*"))], c_forbidden, a_needs_c);

        let b_needs_c = store.alloc(Incompatibility::dependency(range("b", "*"), range("c", "*")));
        let b_forbidden = conflict(&mut store, vec![Term::positive(range("b", "*"))], c_forbidden, b_needs_c);

        let top = conflict(&mut store, vec![Term::positive(root())], a_forbidden, b_forbidden);

        let failure = SolveFailure::new(store, top);
        assert_eq!(
            failure.message(),
            "(1) Because every version of c depends on d@^2.0.0 which doesn't match any versions, c is forbidden.\n\
             (2) So, because every version of a depends on c@*, a is forbidden.\n\
             \n    Because every version of b depends on c@* which is forbidden (1), b is forbidden.\n\
             \x20   So, because a is forbidden (2), version solving failed.\n"
        );
    }
}
