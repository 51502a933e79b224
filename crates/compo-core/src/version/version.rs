//! Semantic versions as used by the solver.
//!
//! Pre-release and build identifiers reuse `semver`'s types so identifier
//! precedence follows SemVer 2.0 exactly.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::{BuildMetadata, Prerelease};

use crate::error::VersionError;

/// An immutable `major.minor.patch[-pre][+build]` version.
///
/// Field order matters: the derived ordering compares the numeric parts,
/// then the pre-release (a release sorts above all of its pre-releases),
/// then build metadata, which only separates otherwise equal versions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Prerelease,
    pub build: BuildMetadata,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Prerelease::EMPTY,
            build: BuildMetadata::EMPTY,
        }
    }

    /// Parse a full `X.Y.Z[-pre][+build]` version.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        parse_version(text, false)
    }

    /// Parse a version where minor and patch may be omitted (`1` is `1.0.0`).
    pub fn parse_partial(text: &str) -> Result<Self, VersionError> {
        parse_version(text, true)
    }

    /// Copy with a pre-release tag; `pre` must be a valid SemVer pre-release.
    pub fn with_pre(&self, pre: &str) -> Result<Self, VersionError> {
        let pre = Prerelease::new(pre).map_err(|e| VersionError::format(pre, e.to_string()))?;
        Ok(Self {
            pre,
            build: BuildMetadata::EMPTY,
            ..self.clone()
        })
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// The lowest possible pre-release of this version, `X.Y.Z-0`.
    pub fn first_prerelease(&self) -> Self {
        Self {
            major: self.major,
            minor: self.minor,
            patch: self.patch,
            pre: Prerelease::new("0").unwrap_or(Prerelease::EMPTY),
            build: BuildMetadata::EMPTY,
        }
    }

    pub fn is_first_prerelease(&self) -> bool {
        self.pre.as_str() == "0" && self.build.is_empty()
    }

    /// `X.Y.Z` without pre-release or build.
    pub fn release(&self) -> Self {
        Self::new(self.major, self.minor, self.patch)
    }

    pub fn next_major(&self) -> Result<Self, VersionError> {
        Ok(Self::new(self.bump(self.major)?, 0, 0))
    }

    pub fn next_minor(&self) -> Result<Self, VersionError> {
        Ok(Self::new(self.major, self.bump(self.minor)?, 0))
    }

    pub fn next_patch(&self) -> Result<Self, VersionError> {
        Ok(Self::new(self.major, self.minor, self.bump(self.patch)?))
    }

    /// The first version with an incompatible API: bumps major, or minor while on `0.x`.
    pub fn next_breaking(&self) -> Result<Self, VersionError> {
        if self.major == 0 {
            self.next_minor()
        } else {
            self.next_major()
        }
    }

    fn bump(&self, component: u64) -> Result<u64, VersionError> {
        component
            .checked_add(1)
            .ok_or_else(|| VersionError::format(&self.to_string(), "version component is too large to bump"))
    }

    /// True when both versions share `major.minor.patch`.
    pub fn equals_without_prerelease(&self, other: &Version) -> bool {
        self.major == other.major && self.minor == other.minor && self.patch == other.patch
    }

    /// Ordering for "which version would we rather use": every release ranks
    /// above every pre-release, then normal version order applies.
    pub fn prioritize(a: &Version, b: &Version) -> Ordering {
        match (a.is_prerelease(), b.is_prerelease()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.cmp(b),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl From<semver::Version> for Version {
    fn from(v: semver::Version) -> Self {
        Self {
            major: v.major,
            minor: v.minor,
            patch: v.patch,
            pre: v.pre,
            build: v.build,
        }
    }
}

fn parse_version(text: &str, allow_partial: bool) -> Result<Version, VersionError> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(VersionError::format(text, "empty version"));
    }

    let (rest, build) = match trimmed.split_once('+') {
        Some((rest, build)) => (rest, Some(build)),
        None => (trimmed, None),
    };
    let (core, pre) = match rest.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (rest, None),
    };

    let mut parts = [0u64; 3];
    let mut count = 0;
    for piece in core.split('.') {
        if count == 3 {
            return Err(VersionError::format(text, "too many numeric components"));
        }
        if piece.is_empty() || !piece.bytes().all(|b| b.is_ascii_digit()) {
            return Err(VersionError::format(text, format!("\"{}\" is not a number", piece)));
        }
        if piece.len() > 1 && piece.starts_with('0') {
            return Err(VersionError::format(text, "numeric components may not have leading zeros"));
        }
        parts[count] = piece
            .parse()
            .map_err(|_| VersionError::format(text, format!("\"{}\" is too large", piece)))?;
        count += 1;
    }
    if count < 3 && !allow_partial {
        return Err(VersionError::format(text, "expected major.minor.patch"));
    }

    if pre == Some("") || build == Some("") {
        return Err(VersionError::format(text, "empty pre-release or build identifier"));
    }
    let pre = match pre {
        Some(p) => Prerelease::new(p).map_err(|e| VersionError::format(text, e.to_string()))?,
        None => Prerelease::EMPTY,
    };
    let build = match build {
        Some(b) => BuildMetadata::new(b).map_err(|e| VersionError::format(text, e.to_string()))?,
        None => BuildMetadata::EMPTY,
    };

    Ok(Version {
        major: parts[0],
        minor: parts[1],
        patch: parts[2],
        pre,
        build,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_full_version() {
        let version = v("1.2.3-beta.1+build.5");
        assert_eq!(version.major, 1);
        assert_eq!(version.minor, 2);
        assert_eq!(version.patch, 3);
        assert_eq!(version.pre.as_str(), "beta.1");
        assert_eq!(version.build.as_str(), "build.5");
        assert_eq!(version.to_string(), "1.2.3-beta.1+build.5");
    }

    #[test]
    fn test_partial_versions_fill_zeros() {
        assert_eq!(Version::parse_partial("1111111").unwrap(), Version::new(1111111, 0, 0));
        assert_eq!(Version::parse_partial("2.4").unwrap(), Version::new(2, 4, 0));
        assert!(Version::parse("2.4").is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("a.b.c").is_err());
        assert!(Version::parse("1.2.3.4").is_err());
        assert!(Version::parse("01.2.3").is_err());
        assert!(Version::parse("1.2.3-").is_err());
    }

    #[test]
    fn test_prerelease_orders_below_release() {
        assert!(v("1.0.0-0") < v("1.0.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0-alpha.1"));
        assert!(v("1.0.0-alpha.1") < v("1.0.0-alpha.beta"));
        assert!(v("1.0.0-beta.2") < v("1.0.0-beta.11"));
        assert!(v("1.0.0-rc.1") < v("1.0.0"));
        assert!(v("1.0.0") < v("1.0.1-0"));
    }

    #[test]
    fn test_build_only_breaks_ties() {
        assert_ne!(v("1.0.0+a"), v("1.0.0"));
        assert!(v("1.0.0+a") < v("1.0.1"));
        assert!(v("0.9.9+zzz") < v("1.0.0"));
    }

    #[test]
    fn test_next_breaking() {
        assert_eq!(v("1.2.3").next_breaking().unwrap(), v("2.0.0"));
        assert_eq!(v("0.2.3").next_breaking().unwrap(), v("0.3.0"));
        assert_eq!(v("0.0.3").next_breaking().unwrap(), v("0.1.0"));
    }

    #[test]
    fn test_first_prerelease() {
        let first = v("2.0.0").first_prerelease();
        assert_eq!(first.to_string(), "2.0.0-0");
        assert!(first.is_first_prerelease());
        assert!(first < v("2.0.0-alpha"));
        assert!(!v("2.0.0-alpha").is_first_prerelease());
    }

    #[test]
    fn test_prioritize_prefers_releases() {
        let mut versions = vec![v("2.0.0-beta"), v("1.0.0"), v("1.5.0"), v("3.0.0-rc.1")];
        versions.sort_by(Version::prioritize);
        let ordered: Vec<String> = versions.iter().map(|x| x.to_string()).collect();
        assert_eq!(ordered, vec!["2.0.0-beta", "3.0.0-rc.1", "1.0.0", "1.5.0"]);
    }
}
