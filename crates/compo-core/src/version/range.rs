//! Contiguous version intervals and the comparisons the set algebra is built on.

use std::cmp::Ordering;
use std::fmt;

use super::Version;

/// A contiguous interval of versions. `None` bounds are unbounded.
///
/// Ranges held inside a [`VersionConstraint`](super::VersionConstraint) are
/// never empty; a point range has `min == max` with both ends inclusive.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub(crate) min: Option<Version>,
    pub(crate) max: Option<Version>,
    pub(crate) include_min: bool,
    pub(crate) include_max: bool,
}

impl VersionRange {
    pub(crate) fn full() -> Self {
        Self {
            min: None,
            max: None,
            include_min: false,
            include_max: false,
        }
    }

    pub(crate) fn point(version: Version) -> Self {
        Self {
            min: Some(version.clone()),
            max: Some(version),
            include_min: true,
            include_max: true,
        }
    }

    pub fn min(&self) -> Option<&Version> {
        self.min.as_ref()
    }

    pub fn max(&self) -> Option<&Version> {
        self.max.as_ref()
    }

    pub fn include_min(&self) -> bool {
        self.include_min
    }

    pub fn include_max(&self) -> bool {
        self.include_max
    }

    pub(crate) fn is_point(&self) -> bool {
        self.include_min && self.include_max && self.min.is_some() && self.min == self.max
    }

    pub(crate) fn is_full(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn allows(&self, version: &Version) -> bool {
        if let Some(min) = &self.min {
            match version.cmp(min) {
                Ordering::Less => return false,
                Ordering::Equal if !self.include_min => return false,
                _ => {}
            }
        }
        if let Some(max) = &self.max {
            match version.cmp(max) {
                Ordering::Greater => return false,
                Ordering::Equal if !self.include_max => return false,
                _ => {}
            }
        }
        true
    }

    pub(crate) fn allows_all(&self, other: &VersionRange) -> bool {
        !allows_lower(other, self) && !allows_higher(other, self)
    }

    pub(crate) fn allows_any(&self, other: &VersionRange) -> bool {
        !strictly_lower(other, self) && !strictly_higher(other, self)
    }

    /// Intersection of two ranges, `None` when they do not overlap.
    pub(crate) fn intersect(&self, other: &VersionRange) -> Option<VersionRange> {
        let (min, include_min) = if allows_lower(self, other) {
            if strictly_lower(self, other) {
                return None;
            }
            (other.min.clone(), other.include_min)
        } else {
            if strictly_lower(other, self) {
                return None;
            }
            (self.min.clone(), self.include_min)
        };
        let (max, include_max) = if allows_higher(self, other) {
            (other.max.clone(), other.include_max)
        } else {
            (self.max.clone(), self.include_max)
        };
        Some(VersionRange {
            min,
            max,
            include_min,
            include_max,
        })
    }

    /// Union of two ranges that overlap or touch.
    pub(crate) fn merge(&self, other: &VersionRange) -> VersionRange {
        let (min, include_min) = if allows_lower(self, other) {
            (self.min.clone(), self.include_min)
        } else {
            (other.min.clone(), other.include_min)
        };
        let (max, include_max) = if allows_higher(self, other) {
            (self.max.clone(), self.include_max)
        } else {
            (other.max.clone(), other.include_max)
        };
        VersionRange {
            min,
            max,
            include_min,
            include_max,
        }
    }

    /// `self` minus `other`: zero, one or two ranges.
    pub(crate) fn subtract(&self, other: &VersionRange) -> Vec<VersionRange> {
        if !self.allows_any(other) {
            return vec![self.clone()];
        }

        let before = if !allows_lower(self, other) {
            None
        } else if self.min == other.min {
            // Only the shared bound survives.
            self.min.clone().map(VersionRange::point)
        } else {
            Some(VersionRange {
                min: self.min.clone(),
                max: other.min.clone(),
                include_min: self.include_min,
                include_max: !other.include_min,
            })
        };

        let after = if !allows_higher(self, other) {
            None
        } else if self.max == other.max {
            self.max.clone().map(VersionRange::point)
        } else {
            Some(VersionRange {
                min: other.max.clone(),
                max: self.max.clone(),
                include_min: !other.include_max,
                include_max: self.include_max,
            })
        };

        before.into_iter().chain(after).collect()
    }

    /// Whether this range is exactly `[min, min.next_breaking()-0)`.
    pub(crate) fn is_caret(&self) -> bool {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => {
                self.include_min
                    && !self.include_max
                    && min.next_breaking().is_ok_and(|next| *max == next.first_prerelease())
            }
            _ => false,
        }
    }

    fn fmt_max(&self, f: &mut fmt::Formatter<'_>, max: &Version) -> fmt::Result {
        if self.include_max {
            return write!(f, "<={}", max);
        }
        if max.is_first_prerelease() {
            // Normalised exclusive bound on a release.
            return write!(f, "<{}", max.release());
        }
        write!(f, "<{}", max)?;
        let min_is_prerelease_of_max = self
            .min
            .as_ref()
            .is_some_and(|min| min.is_prerelease() && min.equals_without_prerelease(max));
        if !max.is_prerelease() && max.build.is_empty() && !min_is_prerelease_of_max {
            // Raw bound: still admits pre-releases of `max`.
            write!(f, "-∞")?;
        }
        Ok(())
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_full() {
            return write!(f, "*");
        }
        if self.is_point() {
            if let Some(min) = &self.min {
                return write!(f, "{}", min);
            }
        }
        if self.is_caret() {
            if let Some(min) = &self.min {
                return write!(f, "^{}", min);
            }
        }
        if let Some(min) = &self.min {
            write!(f, "{}{}", if self.include_min { ">=" } else { ">" }, min)?;
        }
        if let Some(max) = &self.max {
            if self.min.is_some() {
                write!(f, " ")?;
            }
            self.fmt_max(f, max)?;
        }
        Ok(())
    }
}

/// Sort key for unions: by lower bound, then upper bound.
pub(crate) fn compare_ranges(a: &VersionRange, b: &VersionRange) -> Ordering {
    match (&a.min, &b.min) {
        (None, None) => compare_max(a, b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x
            .cmp(y)
            .then_with(|| match (a.include_min, b.include_min) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => Ordering::Equal,
            })
            .then_with(|| compare_max(a, b)),
    }
}

fn compare_max(a: &VersionRange, b: &VersionRange) -> Ordering {
    match (&a.max, &b.max) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.cmp(y).then_with(|| match (a.include_max, b.include_max) {
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ => Ordering::Equal,
        }),
    }
}

/// `a` admits some version below everything `b` admits.
pub(crate) fn allows_lower(a: &VersionRange, b: &VersionRange) -> bool {
    match (&a.min, &b.min) {
        (None, other) => other.is_some(),
        (Some(_), None) => false,
        (Some(x), Some(y)) => match x.cmp(y) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => a.include_min && !b.include_min,
        },
    }
}

/// `a` admits some version above everything `b` admits.
pub(crate) fn allows_higher(a: &VersionRange, b: &VersionRange) -> bool {
    match (&a.max, &b.max) {
        (None, other) => other.is_some(),
        (Some(_), None) => false,
        (Some(x), Some(y)) => match x.cmp(y) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => a.include_max && !b.include_max,
        },
    }
}

/// Every version in `a` is below every version in `b`.
pub(crate) fn strictly_lower(a: &VersionRange, b: &VersionRange) -> bool {
    match (&a.max, &b.min) {
        (Some(max), Some(min)) => match max.cmp(min) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => !a.include_max || !b.include_min,
        },
        _ => false,
    }
}

pub(crate) fn strictly_higher(a: &VersionRange, b: &VersionRange) -> bool {
    strictly_lower(b, a)
}

/// `a` ends exactly where `b` starts, with exactly one side including the bound.
pub(crate) fn are_adjacent(a: &VersionRange, b: &VersionRange) -> bool {
    a.max.is_some() && a.max == b.min && (a.include_max != b.include_min)
}
