//! Dotted version comparison.
//!
//! Module versions are compared component-wise as integers, so `1.10.0`
//! sorts after `1.2.0`. Missing trailing components count as zero and a
//! prerelease suffix (`-beta.1`) does not take part in ordering.

use std::cmp::Ordering;

/// Compare two dotted version strings.
///
/// `compare("1.2", "1.2.0")` is `Equal`; `compare("2.0.0-rc.1", "2.0.0")`
/// is also `Equal` because prerelease tags are ignored.
pub fn compare(a: &str, b: &str) -> Ordering {
    let left = components(a);
    let right = components(b);
    let len = left.len().max(right.len());

    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Numeric release components of a version string, prerelease stripped.
///
/// A component that does not start with digits counts as zero.
pub fn components(version: &str) -> Vec<u64> {
    let release = release_part(version);
    if release.is_empty() {
        return Vec::new();
    }
    release
        .split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

/// The prerelease tag of a version, if any.
pub fn prerelease(version: &str) -> Option<&str> {
    let trimmed = version.trim();
    trimmed
        .split_once('-')
        .map(|(_, pre)| pre.split('+').next().unwrap_or(pre))
        .filter(|pre| !pre.is_empty())
}

/// Check that a version string has the `MAJOR.MINOR.PATCH[-PRERELEASE]` shape.
///
/// Build metadata (`+build.5`) is rejected.
pub fn validate(version: &str) -> Result<(), String> {
    let parsed = semver::Version::parse(version).map_err(|e| format!("'{version}': {e}"))?;
    if !parsed.build.is_empty() {
        return Err(format!("'{version}': build metadata is not allowed"));
    }
    Ok(())
}

/// Whether `version` lies in the half-open interval `(from, to]`.
pub fn in_upgrade_range(version: &str, from: &str, to: &str) -> bool {
    compare(version, from) == Ordering::Greater && compare(version, to) != Ordering::Greater
}

fn release_part(version: &str) -> &str {
    let trimmed = version.trim();
    let end = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    &trimmed[..end]
}
