//! The version constraint sum type and its set algebra.
//!
//! Every operation works on the sorted range list of each operand and
//! renormalises the result, so values are always in canonical form:
//! `Empty` and `Any` are never spelled as ranges, a single-point range is
//! `Exact`, and a `Union` holds at least two disjoint, non-adjacent ranges.

use std::fmt;
use std::str::FromStr;

use super::range::{allows_higher, are_adjacent, compare_ranges};
use super::{Version, VersionRange};
use crate::error::VersionError;

/// A set of versions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VersionConstraint {
    Empty,
    Any,
    Exact(Version),
    Range(VersionRange),
    Union(Vec<VersionRange>),
}

impl VersionConstraint {
    pub fn any() -> Self {
        VersionConstraint::Any
    }

    pub fn empty() -> Self {
        VersionConstraint::Empty
    }

    pub fn exact(version: Version) -> Self {
        VersionConstraint::Exact(version)
    }

    /// A range with the exclusive-maximum normalisation applied: `<X.Y.Z`
    /// excludes every pre-release of `X.Y.Z` unless `min` is itself one.
    pub fn range(
        min: Option<Version>,
        max: Option<Version>,
        include_min: bool,
        include_max: bool,
    ) -> Result<Self, VersionError> {
        if let (Some(lo), Some(hi)) = (&min, &max) {
            if lo >= hi {
                return Self::range_raw(min, max, include_min, include_max);
            }
        }
        let max = match max {
            Some(max)
                if !include_max
                    && !max.is_prerelease()
                    && max.build.is_empty()
                    && !min
                        .as_ref()
                        .is_some_and(|m| m.is_prerelease() && m.equals_without_prerelease(&max)) =>
            {
                Some(max.first_prerelease())
            }
            other => other,
        };
        Self::range_raw(min, max, include_min, include_max)
    }

    /// A range taken literally, without touching the upper bound.
    pub fn range_raw(
        min: Option<Version>,
        max: Option<Version>,
        include_min: bool,
        include_max: bool,
    ) -> Result<Self, VersionError> {
        if let (Some(lo), Some(hi)) = (&min, &max) {
            if lo > hi {
                return Err(VersionError::InvertedRange {
                    min: lo.clone(),
                    max: hi.clone(),
                });
            }
            if lo == hi {
                return Ok(if include_min && include_max {
                    VersionConstraint::Exact(lo.clone())
                } else {
                    VersionConstraint::Empty
                });
            }
        }
        Ok(Self::from_range(VersionRange {
            include_min: include_min && min.is_some(),
            include_max: include_max && max.is_some(),
            min,
            max,
        }))
    }

    /// `^version`: from `version` up to the next breaking release.
    pub fn compatible_with(version: &Version) -> Result<Self, VersionError> {
        Ok(Self::from_range(VersionRange {
            min: Some(version.clone()),
            max: Some(version.next_breaking()?.first_prerelease()),
            include_min: true,
            include_max: false,
        }))
    }

    /// `~version`: from `version` up to the next minor release.
    pub fn tilde(version: &Version) -> Result<Self, VersionError> {
        Ok(Self::from_range(VersionRange {
            min: Some(version.clone()),
            max: Some(version.next_minor()?.first_prerelease()),
            include_min: true,
            include_max: false,
        }))
    }

    pub fn parse(text: &str) -> Result<Self, VersionError> {
        super::parse::parse_constraint(text)
    }

    /// Union of any number of constraints.
    pub fn union_of<I>(constraints: I) -> Self
    where
        I: IntoIterator<Item = VersionConstraint>,
    {
        let ranges = constraints
            .into_iter()
            .flat_map(|c| c.ranges())
            .collect();
        Self::from_ranges(ranges)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, VersionConstraint::Empty)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, VersionConstraint::Any)
    }

    pub fn allows(&self, version: &Version) -> bool {
        match self {
            VersionConstraint::Empty => false,
            VersionConstraint::Any => true,
            VersionConstraint::Exact(v) => v == version,
            VersionConstraint::Range(r) => r.allows(version),
            VersionConstraint::Union(rs) => rs.iter().any(|r| r.allows(version)),
        }
    }

    /// Every version `other` allows is allowed here.
    pub fn allows_all(&self, other: &VersionConstraint) -> bool {
        match (self, other) {
            (_, VersionConstraint::Empty) | (VersionConstraint::Any, _) => true,
            (VersionConstraint::Empty, _) => false,
            (_, VersionConstraint::Exact(v)) => self.allows(v),
            _ => {
                let ours = self.ranges();
                other
                    .ranges()
                    .iter()
                    .all(|theirs| ours.iter().any(|r| r.allows_all(theirs)))
            }
        }
    }

    /// Some version is allowed by both.
    pub fn allows_any(&self, other: &VersionConstraint) -> bool {
        match (self, other) {
            (VersionConstraint::Empty, _) | (_, VersionConstraint::Empty) => false,
            (VersionConstraint::Any, _) | (_, VersionConstraint::Any) => true,
            (VersionConstraint::Exact(v), _) => other.allows(v),
            (_, VersionConstraint::Exact(v)) => self.allows(v),
            _ => {
                let theirs = other.ranges();
                self.ranges()
                    .iter()
                    .any(|ours| theirs.iter().any(|r| ours.allows_any(r)))
            }
        }
    }

    pub fn intersect(&self, other: &VersionConstraint) -> VersionConstraint {
        match (self, other) {
            (VersionConstraint::Empty, _) | (_, VersionConstraint::Empty) => VersionConstraint::Empty,
            (VersionConstraint::Any, c) | (c, VersionConstraint::Any) => c.clone(),
            (VersionConstraint::Exact(v), c) | (c, VersionConstraint::Exact(v)) => {
                if c.allows(v) {
                    VersionConstraint::Exact(v.clone())
                } else {
                    VersionConstraint::Empty
                }
            }
            _ => {
                let ours = self.ranges();
                let theirs = other.ranges();
                let (mut i, mut j) = (0, 0);
                let mut out = Vec::new();
                while i < ours.len() && j < theirs.len() {
                    if let Some(r) = ours[i].intersect(&theirs[j]) {
                        out.push(r);
                    }
                    // Advance whichever range ends first.
                    if allows_higher(&ours[i], &theirs[j]) {
                        j += 1;
                    } else {
                        i += 1;
                    }
                }
                Self::from_ranges(out)
            }
        }
    }

    pub fn union(&self, other: &VersionConstraint) -> VersionConstraint {
        match (self, other) {
            (VersionConstraint::Any, _) | (_, VersionConstraint::Any) => VersionConstraint::Any,
            (VersionConstraint::Empty, c) | (c, VersionConstraint::Empty) => c.clone(),
            _ => {
                let mut ranges = self.ranges();
                ranges.extend(other.ranges());
                Self::from_ranges(ranges)
            }
        }
    }

    pub fn difference(&self, other: &VersionConstraint) -> VersionConstraint {
        match (self, other) {
            (VersionConstraint::Empty, _) | (_, VersionConstraint::Any) => VersionConstraint::Empty,
            (c, VersionConstraint::Empty) => c.clone(),
            _ => {
                let theirs = other.ranges();
                let mut remaining = self.ranges();
                for cut in &theirs {
                    remaining = remaining.iter().flat_map(|r| r.subtract(cut)).collect();
                    if remaining.is_empty() {
                        break;
                    }
                }
                Self::from_ranges(remaining)
            }
        }
    }

    /// The single interval this constraint covers, if it is one.
    pub fn as_range(&self) -> Option<VersionRange> {
        match self {
            VersionConstraint::Any => Some(VersionRange::full()),
            VersionConstraint::Exact(v) => Some(VersionRange::point(v.clone())),
            VersionConstraint::Range(r) => Some(r.clone()),
            VersionConstraint::Empty | VersionConstraint::Union(_) => None,
        }
    }

    /// Sorted, disjoint ranges making up this constraint.
    pub fn ranges(&self) -> Vec<VersionRange> {
        match self {
            VersionConstraint::Empty => Vec::new(),
            VersionConstraint::Any => vec![VersionRange::full()],
            VersionConstraint::Exact(v) => vec![VersionRange::point(v.clone())],
            VersionConstraint::Range(r) => vec![r.clone()],
            VersionConstraint::Union(rs) => rs.clone(),
        }
    }

    pub(crate) fn from_range(range: VersionRange) -> Self {
        if range.is_full() {
            VersionConstraint::Any
        } else if range.is_point() {
            match range.min {
                Some(v) => VersionConstraint::Exact(v),
                None => VersionConstraint::Any,
            }
        } else {
            VersionConstraint::Range(range)
        }
    }

    /// Sort, merge touching ranges, and collapse to the simplest variant.
    pub(crate) fn from_ranges(mut ranges: Vec<VersionRange>) -> Self {
        ranges.sort_by(compare_ranges);
        let mut merged: Vec<VersionRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if last.allows_any(&range) || are_adjacent(last, &range) => {
                    *last = last.merge(&range);
                }
                _ => merged.push(range),
            }
        }
        match merged.len() {
            0 => VersionConstraint::Empty,
            1 => match merged.pop() {
                Some(range) => Self::from_range(range),
                None => VersionConstraint::Empty,
            },
            _ => VersionConstraint::Union(merged),
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Empty => write!(f, "<empty>"),
            VersionConstraint::Any => write!(f, "*"),
            VersionConstraint::Exact(v) => write!(f, "{}", v),
            VersionConstraint::Range(r) => write!(f, "{}", r),
            VersionConstraint::Union(rs) => {
                for (i, r) in rs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " || ")?;
                    }
                    write!(f, "{}", r)?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionConstraint::parse(s)
    }
}

impl From<Version> for VersionConstraint {
    fn from(version: Version) -> Self {
        VersionConstraint::Exact(version)
    }
}
