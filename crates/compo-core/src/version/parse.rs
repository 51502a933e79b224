//! Constraint string grammar.
//!
//! ```text
//! constraint  := alternative ( "||" alternative )*
//! alternative := "*" | "any" | "x" | "<empty>"
//!              | "^" version | "~" version
//!              | version
//!              | comparison ( ws comparison )*
//! comparison  := ( ">=" | ">" | "<=" | "<" | "=" ) ws? version
//! ```
//!
//! Versions inside constraints may be partial (`^1` is `^1.0.0`). A `<`
//! bound written as `X.Y.Z-∞` is kept raw and still admits `X.Y.Z`'s
//! pre-releases.

use std::cmp::Ordering;

use super::{Version, VersionConstraint};
use crate::error::VersionError;

const RAW_SUFFIX: &str = "-∞";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
    Equal,
}

/// `(version, inclusive)` for the lower bound.
type Lower = (Version, bool);

/// `(version, inclusive, raw)` for the upper bound.
type Upper = (Version, bool, bool);

pub(crate) fn parse_constraint(text: &str) -> Result<VersionConstraint, VersionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(VersionError::format(text, "cannot parse an empty string"));
    }
    if !trimmed.contains("||") {
        return parse_alternative(trimmed, text);
    }

    let mut alternatives = Vec::new();
    for part in trimmed.split("||") {
        let part = part.trim();
        if part.is_empty() {
            return Err(VersionError::format(text, "empty alternative around \"||\""));
        }
        alternatives.push(parse_alternative(part, text)?);
    }
    Ok(VersionConstraint::union_of(alternatives))
}

fn parse_alternative(input: &str, original: &str) -> Result<VersionConstraint, VersionError> {
    match input {
        "*" | "any" | "x" | "X" => return Ok(VersionConstraint::Any),
        "<empty>" => return Ok(VersionConstraint::Empty),
        _ => {}
    }

    if let Some(rest) = input.strip_prefix('^') {
        let version = single_version(rest, original)?;
        return VersionConstraint::compatible_with(&version).map_err(|e| rewrap(e, original));
    }
    if let Some(rest) = input.strip_prefix('~') {
        let version = single_version(rest, original)?;
        return VersionConstraint::tilde(&version).map_err(|e| rewrap(e, original));
    }
    if split_operator(input).is_none() {
        return Ok(VersionConstraint::Exact(single_version(input, original)?));
    }

    parse_comparisons(input, original)
}

fn single_version(text: &str, original: &str) -> Result<Version, VersionError> {
    let text = text.trim();
    if text.split_whitespace().count() > 1 {
        return Err(VersionError::format(
            original,
            "a bare version must be the only constraint",
        ));
    }
    Version::parse_partial(text).map_err(|e| rewrap(e, original))
}

fn parse_comparisons(input: &str, original: &str) -> Result<VersionConstraint, VersionError> {
    let mut min: Option<Lower> = None;
    let mut max: Option<Upper> = None;

    let mut rest = input.trim_start();
    while !rest.is_empty() {
        let (op, after) = split_operator(rest).ok_or_else(|| {
            VersionError::format(original, format!("expected a comparison at \"{}\"", rest))
        })?;
        let after = after.trim_start();
        let end = after.find(char::is_whitespace).unwrap_or(after.len());
        let (token, remaining) = after.split_at(end);
        if token.is_empty() {
            return Err(VersionError::format(original, "expected a version after the operator"));
        }
        rest = remaining.trim_start();

        let (token, raw) = match token.strip_suffix(RAW_SUFFIX) {
            Some(stripped) if op == Op::Less => (stripped, true),
            _ => (token, false),
        };
        let version = Version::parse_partial(token).map_err(|e| rewrap(e, original))?;

        match op {
            Op::GreaterOrEqual => tighten_min(&mut min, version, true),
            Op::Greater => tighten_min(&mut min, version, false),
            Op::LessOrEqual => tighten_max(&mut max, version, true, false),
            Op::Less => tighten_max(&mut max, version, false, raw),
            Op::Equal => {
                tighten_min(&mut min, version.clone(), true);
                tighten_max(&mut max, version, true, false);
            }
        }
    }

    let (min, include_min) = match min {
        Some((v, inclusive)) => (Some(v), inclusive),
        None => (None, false),
    };
    let (max, include_max, raw) = match max {
        Some((v, inclusive, raw)) => (Some(v), inclusive, raw),
        None => (None, false, false),
    };
    if raw {
        VersionConstraint::range_raw(min, max, include_min, include_max)
    } else {
        VersionConstraint::range(min, max, include_min, include_max)
    }
}

fn tighten_min(current: &mut Option<Lower>, version: Version, inclusive: bool) {
    match current {
        None => *current = Some((version, inclusive)),
        Some((v, inc)) => match version.cmp(v) {
            Ordering::Greater => *current = Some((version, inclusive)),
            Ordering::Equal => *inc = *inc && inclusive,
            Ordering::Less => {}
        },
    }
}

fn tighten_max(current: &mut Option<Upper>, version: Version, inclusive: bool, raw: bool) {
    match current {
        None => *current = Some((version, inclusive, raw)),
        Some((v, inc, was_raw)) => match version.cmp(v) {
            Ordering::Less => *current = Some((version, inclusive, raw)),
            Ordering::Equal => {
                *inc = *inc && inclusive;
                *was_raw = *was_raw && raw;
            }
            Ordering::Greater => {}
        },
    }
}

fn split_operator(input: &str) -> Option<(Op, &str)> {
    const OPERATORS: [(&str, Op); 5] = [
        (">=", Op::GreaterOrEqual),
        ("<=", Op::LessOrEqual),
        (">", Op::Greater),
        ("<", Op::Less),
        ("=", Op::Equal),
    ];
    OPERATORS
        .iter()
        .find_map(|(symbol, op)| input.strip_prefix(symbol).map(|rest| (*op, rest)))
}

/// Report the whole constraint rather than the inner version token.
fn rewrap(error: VersionError, original: &str) -> VersionError {
    match error {
        VersionError::Format { reason, .. } => VersionError::format(original, reason),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn parse(s: &str) -> VersionConstraint {
        parse_constraint(s).unwrap()
    }

    #[test]
    fn test_wildcards() {
        assert_eq!(parse("*"), VersionConstraint::Any);
        assert_eq!(parse("any"), VersionConstraint::Any);
        assert_eq!(parse("<empty>"), VersionConstraint::Empty);
    }

    #[test]
    fn test_bare_versions_are_exact() {
        assert_eq!(parse("1.2.3"), VersionConstraint::Exact(v("1.2.3")));
        assert_eq!(parse("1111111"), VersionConstraint::Exact(v("1111111.0.0")));
        assert_eq!(parse("=2.0.0"), VersionConstraint::Exact(v("2.0.0")));
    }

    #[test]
    fn test_caret_and_tilde() {
        assert_eq!(parse("^1"), VersionConstraint::compatible_with(&v("1.0.0")).unwrap());
        assert_eq!(parse("^0.2.3").to_string(), "^0.2.3");
        let tilde = parse("~1.2.3");
        assert!(tilde.allows(&v("1.2.9")));
        assert!(!tilde.allows(&v("1.3.0")));
    }

    #[test]
    fn test_comparison_chains_tighten() {
        let c = parse(">=1.0.0 >=1.2.0 <3.0.0 <2.5.0");
        assert_eq!(c, parse(">=1.2.0 <2.5.0"));
        assert!(c.allows(&v("2.4.9")));
        assert!(!c.allows(&v("2.5.0-beta")));
        assert_eq!(parse(">= 1.0.0 < 2.0.0"), parse(">=1.0.0 <2.0.0"));
    }

    #[test]
    fn test_degenerate_chains() {
        assert_eq!(parse(">=1.0.0 <=1.0.0"), VersionConstraint::Exact(v("1.0.0")));
        assert_eq!(parse(">=1.0.0 <1.0.0"), VersionConstraint::Empty);
        assert!(matches!(
            parse_constraint(">=2.0.0 <1.0.0"),
            Err(VersionError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_raw_upper_bound_round_trips() {
        let raw = VersionConstraint::range_raw(None, Some(v("2.0.0")), false, false).unwrap();
        let printed = raw.to_string();
        assert_eq!(printed, "<2.0.0-∞");
        assert_eq!(parse(&printed), raw);
    }

    #[test]
    fn test_unions() {
        let c = parse("^1.0.0 || ^3.0.0");
        assert!(c.allows(&v("1.4.0")));
        assert!(c.allows(&v("3.4.0")));
        assert!(!c.allows(&v("2.4.0")));
    }

    #[test]
    fn test_format_errors() {
        for bad in ["", "   ", "foo", "^", ">=", "1.0.0 2.0.0", ">=1.0.0 ||", "^1.0.0 >=1.2.0"] {
            assert!(
                matches!(parse_constraint(bad), Err(VersionError::Format { .. })),
                "{bad:?} should not parse"
            );
        }
    }
}
