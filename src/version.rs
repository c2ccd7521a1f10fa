//! Semantic version tokens as they appear in module archive names.
//!
//! Tokens carry a mandatory `v` prefix (`v1.2.3-rc.1+build`). Parsing is
//! delegated to the `semver` crate; ordering ignores build metadata.

use std::cmp::Ordering;

/// Parse a `v`-prefixed version token.
///
/// Returns `None` for anything that is not a complete
/// `vMAJOR.MINOR.PATCH[-PRE][+BUILD]` version.
pub fn parse(s: &str) -> Option<semver::Version> {
    let rest = s.strip_prefix('v')?;
    semver::Version::parse(rest).ok()
}

/// Whether `s` is a well-formed version token.
pub fn is_valid(s: &str) -> bool {
    parse(s).is_some()
}

/// Total order over version tokens.
///
/// Major, minor, patch, then prerelease (a release sorts after any of its
/// prereleases). Build metadata does not participate. Invalid tokens sort
/// before every valid one and are equal to each other.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => precedence(&a, &b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

fn precedence(a: &semver::Version, b: &semver::Version) -> Ordering {
    (a.major, a.minor, a.patch)
        .cmp(&(b.major, b.minor, b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

/// Sort version tokens ascending.
///
/// Tokens of equal precedence (differing only in build metadata) fall back to
/// byte order so the result does not depend on input order.
pub fn sort(versions: &mut [String]) {
    versions.sort_by(|a, b| compare(a, b).then_with(|| a.cmp(b)));
}
