//! Terms: signed statements about a package's selected version.

use std::fmt;

use crate::package::{PackageId, PackageRange};
use crate::version::VersionConstraint;

/// How the versions one term allows relate to another's.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetRelation {
    /// Every selection `self` allows, `other` allows too.
    Subset,
    /// No selection satisfies both.
    Disjoint,
    Overlapping,
}

/// "`package` is selected within its constraint" (positive) or its negation.
///
/// A negative term is also satisfied when the package is not selected at all.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Term {
    pub package: PackageRange,
    pub is_positive: bool,
}

impl Term {
    pub fn new(package: PackageRange, is_positive: bool) -> Self {
        Self {
            package,
            is_positive,
        }
    }

    pub fn positive(package: PackageRange) -> Self {
        Self::new(package, true)
    }

    pub fn negative(package: PackageRange) -> Self {
        Self::new(package, false)
    }

    pub fn name(&self) -> &str {
        self.package.name()
    }

    pub fn constraint(&self) -> &VersionConstraint {
        &self.package.constraint
    }

    pub fn inverse(&self) -> Term {
        Self::new(self.package.clone(), !self.is_positive)
    }

    /// Whether selecting `id` makes this term true.
    pub fn allows(&self, id: &PackageId) -> bool {
        id.name() == self.name() && self.package.allows(id) == self.is_positive
    }

    /// Whether this term being true makes `other` true.
    pub fn satisfies(&self, other: &Term) -> bool {
        self.name() == other.name() && self.relation(other) == SetRelation::Subset
    }

    /// The relation of the versions this term allows to those `other` allows.
    ///
    /// Both terms must name the same package.
    pub fn relation(&self, other: &Term) -> SetRelation {
        self.assert_same_name(other);
        let ours = self.constraint();
        let theirs = other.constraint();
        let compatible = self.compatible_package(&other.package);

        match (self.is_positive, other.is_positive) {
            (true, true) => {
                if !compatible {
                    SetRelation::Disjoint
                } else if theirs.allows_all(ours) {
                    SetRelation::Subset
                } else if !ours.allows_any(theirs) {
                    SetRelation::Disjoint
                } else {
                    SetRelation::Overlapping
                }
            }
            (true, false) => {
                if !compatible || !theirs.allows_any(ours) {
                    SetRelation::Subset
                } else if theirs.allows_all(ours) {
                    SetRelation::Disjoint
                } else {
                    SetRelation::Overlapping
                }
            }
            (false, true) => {
                if compatible && ours.allows_all(theirs) {
                    SetRelation::Disjoint
                } else {
                    SetRelation::Overlapping
                }
            }
            (false, false) => {
                if compatible && ours.allows_all(theirs) {
                    SetRelation::Subset
                } else {
                    SetRelation::Overlapping
                }
            }
        }
    }

    /// A term true exactly when both terms are, or `None` when no single
    /// term expresses that (including when nothing satisfies both).
    pub fn intersect(&self, other: &Term) -> Option<Term> {
        self.assert_same_name(other);

        if self.compatible_package(&other.package) {
            if self.is_positive != other.is_positive {
                let (positive, negative) = if self.is_positive { (self, other) } else { (other, self) };
                self.non_empty(positive.constraint().difference(negative.constraint()), true)
            } else if self.is_positive {
                self.non_empty(self.constraint().intersect(other.constraint()), true)
            } else {
                self.non_empty(self.constraint().union(other.constraint()), false)
            }
        } else if self.is_positive != other.is_positive {
            // Different sources: the positive term already implies the negative one.
            Some(if self.is_positive { self.clone() } else { other.clone() })
        } else {
            None
        }
    }

    /// A term true when this one is and `other` is not.
    pub fn difference(&self, other: &Term) -> Option<Term> {
        self.intersect(&other.inverse())
    }

    /// The root package is compatible with any reference sharing its name.
    fn compatible_package(&self, other: &PackageRange) -> bool {
        self.package.is_root() || other.is_root() || self.package.same_package(other)
    }

    fn non_empty(&self, constraint: VersionConstraint, is_positive: bool) -> Option<Term> {
        if constraint.is_empty() {
            return None;
        }
        Some(Term::new(self.package.with_constraint(constraint), is_positive))
    }

    fn assert_same_name(&self, other: &Term) {
        assert_eq!(
            self.name(),
            other.name(),
            "[BUG] {} should refer to package {}",
            other,
            self.name()
        );
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_positive {
            write!(f, "not ")?;
        }
        write!(f, "{}", self.package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{PackageRef, HOSTED};
    use crate::version::Version;

    fn hosted(name: &str, constraint: &str) -> PackageRange {
        PackageRef::new(name, HOSTED, "r").with_constraint(VersionConstraint::parse(constraint).unwrap())
    }

    fn pos(constraint: &str) -> Term {
        Term::positive(hosted("foo", constraint))
    }

    fn neg(constraint: &str) -> Term {
        Term::negative(hosted("foo", constraint))
    }

    #[test]
    fn test_relation_positive_positive() {
        assert_eq!(pos("^1.2.0").relation(&pos("^1.0.0")), SetRelation::Subset);
        assert_eq!(pos("^1.0.0").relation(&pos("^2.0.0")), SetRelation::Disjoint);
        assert_eq!(pos("^1.0.0").relation(&pos(">=1.5.0")), SetRelation::Overlapping);
    }

    #[test]
    fn test_relation_positive_negative() {
        assert_eq!(pos("^1.0.0").relation(&neg("^2.0.0")), SetRelation::Subset);
        assert_eq!(pos("^1.2.0").relation(&neg("^1.0.0")), SetRelation::Disjoint);
        assert_eq!(pos("^1.0.0").relation(&neg(">=1.5.0")), SetRelation::Overlapping);
    }

    #[test]
    fn test_relation_negative_terms() {
        assert_eq!(neg("^1.0.0").relation(&pos("^1.2.0")), SetRelation::Disjoint);
        assert_eq!(neg("^1.0.0").relation(&pos("^2.0.0")), SetRelation::Overlapping);
        assert_eq!(neg("*").relation(&neg("^1.0.0")), SetRelation::Subset);
        assert_eq!(neg("^1.2.0").relation(&neg("^1.0.0")), SetRelation::Overlapping);
    }

    #[test]
    fn test_relation_across_sources() {
        let git = Term::positive(PackageRef::new("foo", "git", "g").with_constraint(VersionConstraint::Any));
        assert_eq!(git.relation(&pos("*")), SetRelation::Disjoint);
        assert_eq!(git.relation(&neg("*")), SetRelation::Subset);
        assert_eq!(git.inverse().relation(&pos("*")), SetRelation::Overlapping);
    }

    #[test]
    fn test_intersect() {
        assert_eq!(pos("^1.0.0").intersect(&pos(">=1.5.0")), Some(pos(">=1.5.0 <2.0.0")));
        assert_eq!(pos("^1.0.0").intersect(&pos("^2.0.0")), None);
        let mixed = pos("^1.0.0").intersect(&neg(">=1.5.0")).unwrap();
        assert!(mixed.is_positive);
        assert!(mixed.constraint().allows(&Version::new(1, 4, 0)));
        assert!(!mixed.constraint().allows(&Version::new(1, 5, 0)));
        let both_negative = neg("^1.0.0").intersect(&neg("^2.0.0")).unwrap();
        assert!(!both_negative.is_positive);
        assert!(both_negative.constraint().allows(&Version::new(2, 1, 0)));
    }

    #[test]
    fn test_root_is_compatible_with_same_name() {
        let root = Term::positive(PackageRef::root("foo").at_version(Version::new(1, 0, 0)).to_range());
        assert_eq!(root.relation(&pos("^1.0.0")), SetRelation::Subset);
    }

    #[test]
    fn test_display() {
        assert_eq!(neg("^1.0.0").to_string(), "not foo@^1.0.0");
        assert_eq!(pos("*").to_string(), "foo@*");
    }

    #[test]
    #[should_panic(expected = "should refer to package")]
    fn test_relation_requires_same_name() {
        let bar = Term::positive(hosted("bar", "*"));
        pos("*").relation(&bar);
    }
}
