//! Package version comparison.
//!
//! Packages in the wild do not all follow semver. Besides the strict
//! `MAJOR.MINOR.PATCH` form we accept an extended form carrying a fourth
//! numeric component and a trailing qualifier, e.g. `1.2.3.4rc`. Both forms
//! share one total order:
//!
//! 1. the first three components, numerically;
//! 2. the fourth component, where a missing one sorts lowest;
//! 3. the qualifier, in *descending* lexicographic order, so that a
//!    qualified version sorts before the unqualified one
//!    (`1.2.3.4rc < 1.2.3.4`).
//!
//! Ranges only ever look at the first three components.

use crate::core::error::{StagerError, StagerResult};
use std::cmp::{Ordering, Reverse};
use std::fmt;

/// Version marker used by package types that only ever keep one instance.
pub const ANY_VERSION: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Fourth numeric component of an extended version (`4` in `1.2.3.4rc`)
    pub build: Option<u64>,
    /// Trailing qualifier of an extended version (`rc` in `1.2.3.4rc`)
    pub qualifier: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            build: None,
            qualifier: None,
        }
    }

    /// Parse a version string (e.g. "1.2.3", "1.2.3.4", "1.2.3.4rc", "1.2.3.beta")
    ///
    /// Strings with five or more purely numeric components ("1.2.3.4.5") are
    /// rejected since they cannot be told apart from a mistyped strict version.
    pub fn parse(s: &str) -> StagerResult<Self> {
        let s = s.trim();
        let mut parts = s.splitn(4, '.');

        let major = parse_component(parts.next(), s)?;
        let minor = parse_component(parts.next(), s)?;
        let patch = parse_component(parts.next(), s)?;

        let Some(rest) = parts.next() else {
            return Ok(Self::new(major, minor, patch));
        };

        if rest.is_empty()
            || !rest
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return Err(invalid(s));
        }

        let numeric_only = rest
            .split('.')
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
        if numeric_only && rest.contains('.') {
            return Err(StagerError::Version(format!(
                "Too many numeric components in version: {}",
                s
            )));
        }

        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let build = if digits == 0 {
            None
        } else {
            Some(rest[..digits].parse().map_err(|_| invalid(s))?)
        };
        let qualifier = Some(&rest[digits..])
            .filter(|q| !q.is_empty())
            .map(str::to_string);

        Ok(Self {
            major,
            minor,
            patch,
            build,
            qualifier,
        })
    }

    /// True for a clean `MAJOR.MINOR.PATCH` version.
    pub fn is_strict(&self) -> bool {
        self.build.is_none() && self.qualifier.is_none()
    }

    /// The version reduced to its first three components.
    pub fn normalized(&self) -> Version {
        Version::new(self.major, self.minor, self.patch)
    }

    fn triple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }

    /// Check if this version satisfies a constraint
    pub fn satisfies(&self, constraint: &VersionConstraint) -> bool {
        let v = self.triple();
        match constraint {
            VersionConstraint::Any => true,
            VersionConstraint::Exact(c) => v == c.triple(),
            VersionConstraint::Compatible(c) => {
                let upper = if c.major > 0 {
                    (c.major + 1, 0, 0)
                } else if c.minor > 0 {
                    (0, c.minor + 1, 0)
                } else {
                    (0, 0, c.patch + 1)
                };
                v >= c.triple() && v < upper
            }
            VersionConstraint::Patch(c) => v >= c.triple() && v < (c.major, c.minor + 1, 0),
            VersionConstraint::Greater(c) => v > c.triple(),
            VersionConstraint::GreaterOrEqual(c) => v >= c.triple(),
            VersionConstraint::LessThan(c) => v < c.triple(),
            VersionConstraint::LessOrEqual(c) => v <= c.triple(),
            VersionConstraint::AnyPatch { major, minor } => {
                self.major == *major && self.minor == *minor
            }
            VersionConstraint::AnyMinor { major } => self.major == *major,
            VersionConstraint::AllOf(constraints) => constraints.iter().all(|c| self.satisfies(c)),
            VersionConstraint::AnyOf(constraints) => constraints.iter().any(|c| self.satisfies(c)),
        }
    }

    fn sort_key(&self) -> (u64, u64, u64, Option<u64>, Reverse<&str>) {
        (
            self.major,
            self.minor,
            self.patch,
            self.build,
            Reverse(self.qualifier.as_deref().unwrap_or("")),
        )
    }
}

fn invalid(s: &str) -> StagerError {
    StagerError::Version(format!("Invalid version format: {}", s))
}

fn parse_component(part: Option<&str>, s: &str) -> StagerResult<u64> {
    match part {
        Some(p) if !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()) => {
            p.parse().map_err(|_| invalid(s))
        }
        _ => Err(invalid(s)),
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    // Two strict versions never differ past the third component, so the
    // fallback part of the key only decides between extended versions.
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.is_strict() {
            f.write_str(".")?;
            if let Some(build) = self.build {
                write!(f, "{}", build)?;
            }
            if let Some(ref qualifier) = self.qualifier {
                f.write_str(qualifier)?;
            }
        }
        Ok(())
    }
}

/// Version constraint types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// "*", "x" or an empty range
    Any,
    /// Exact version: "1.2.3" or "=1.2.3"
    Exact(Version),
    /// Compatible version: "^1.2.3" (>=1.2.3 <2.0.0)
    Compatible(Version),
    /// Patch version: "~1.2.3" (>=1.2.3 <1.3.0)
    Patch(Version),
    Greater(Version),
    GreaterOrEqual(Version),
    LessThan(Version),
    LessOrEqual(Version),
    /// Any patch version: "1.2.x" or "1.2"
    AnyPatch { major: u64, minor: u64 },
    /// Any minor version: "1.x" or "1"
    AnyMinor { major: u64 },
    /// Space or comma separated comparators, all of which must hold
    AllOf(Vec<VersionConstraint>),
    /// `||` separated alternatives
    AnyOf(Vec<VersionConstraint>),
}

/// A version inside a range, where trailing components may be wildcards.
#[derive(Debug, Clone, Copy)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
}

impl Partial {
    fn parse(s: &str) -> StagerResult<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() > 3 {
            return Err(StagerError::Version(format!("Not a range: {}", s)));
        }
        let component = |i: usize| -> StagerResult<Option<u64>> {
            match parts.get(i) {
                None | Some(&"x") | Some(&"X") | Some(&"*") => Ok(None),
                Some(p) if !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()) => p
                    .parse()
                    .map(Some)
                    .map_err(|_| StagerError::Version(format!("Not a range: {}", s))),
                Some(_) => Err(StagerError::Version(format!("Not a range: {}", s))),
            }
        };
        Ok(Self {
            major: component(0)?,
            minor: component(1)?,
            patch: component(2)?,
        })
    }

    fn floor(&self) -> Version {
        Version::new(
            self.major.unwrap_or(0),
            self.minor.unwrap_or(0),
            self.patch.unwrap_or(0),
        )
    }

    /// Smallest version above everything this partial matches.
    fn ceiling(&self) -> Option<Version> {
        match (self.major, self.minor, self.patch) {
            (None, _, _) => None,
            (Some(major), None, _) => Some(Version::new(major + 1, 0, 0)),
            (Some(major), Some(minor), None) => Some(Version::new(major, minor + 1, 0)),
            (Some(_), Some(_), Some(_)) => None,
        }
    }

    fn as_exact(&self) -> VersionConstraint {
        match (self.major, self.minor, self.patch) {
            (None, _, _) => VersionConstraint::Any,
            (Some(major), None, _) => VersionConstraint::AnyMinor { major },
            (Some(major), Some(minor), None) => VersionConstraint::AnyPatch { major, minor },
            (Some(_), Some(_), Some(_)) => VersionConstraint::Exact(self.floor()),
        }
    }
}

fn parse_comparator(token: &str) -> StagerResult<VersionConstraint> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(VersionConstraint::Any);
    }

    if let Some(rest) = token.strip_prefix(">=") {
        let p = Partial::parse(rest)?;
        return Ok(match p.major {
            None => VersionConstraint::Any,
            Some(_) => VersionConstraint::GreaterOrEqual(p.floor()),
        });
    }
    if let Some(rest) = token.strip_prefix("<=") {
        let p = Partial::parse(rest)?;
        return Ok(match (p.major, p.ceiling()) {
            (None, _) => VersionConstraint::Any,
            (_, Some(ceiling)) => VersionConstraint::LessThan(ceiling),
            (_, None) => VersionConstraint::LessOrEqual(p.floor()),
        });
    }
    if let Some(rest) = token.strip_prefix('>') {
        let p = Partial::parse(rest)?;
        return Ok(match (p.major, p.ceiling()) {
            (None, _) => VersionConstraint::LessThan(Version::new(0, 0, 0)),
            (_, Some(ceiling)) => VersionConstraint::GreaterOrEqual(ceiling),
            (_, None) => VersionConstraint::Greater(p.floor()),
        });
    }
    if let Some(rest) = token.strip_prefix('<') {
        let p = Partial::parse(rest)?;
        return Ok(match p.major {
            None => VersionConstraint::LessThan(Version::new(0, 0, 0)),
            Some(_) => VersionConstraint::LessThan(p.floor()),
        });
    }
    if let Some(rest) = token.strip_prefix('^') {
        let p = Partial::parse(rest)?;
        return Ok(match p.major {
            None => VersionConstraint::Any,
            Some(_) => VersionConstraint::Compatible(p.floor()),
        });
    }
    if let Some(rest) = token.strip_prefix('~') {
        let p = Partial::parse(rest)?;
        return Ok(match (p.major, p.minor) {
            (None, _) => VersionConstraint::Any,
            (Some(major), None) => VersionConstraint::AnyMinor { major },
            _ => VersionConstraint::Patch(p.floor()),
        });
    }

    let rest = token.strip_prefix('=').unwrap_or(token);
    Ok(Partial::parse(rest)?.as_exact())
}

/// Parse a range string.
///
/// Examples: `1.2.3`, `^1.2.0`, `~1.2`, `1.x`, `>=1.0.0 <2.0.0`,
/// `>=1.0.0, <2.0.0 || >=2.5.0`, `1.0.0 - 2.0.0`
pub fn parse_range(s: &str) -> StagerResult<VersionConstraint> {
    let s = s.trim();

    let or_parts: Vec<&str> = s.split("||").collect();
    if or_parts.len() > 1 {
        let constraints: StagerResult<Vec<_>> = or_parts.iter().map(|p| parse_range(p)).collect();
        return Ok(VersionConstraint::AnyOf(constraints?));
    }

    // Glue bare operators to the version that follows them (">= 1.2.3")
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for raw in s.split(|c: char| c.is_whitespace() || c == ',') {
        if raw.is_empty() {
            continue;
        }
        if matches!(raw, ">=" | "<=" | ">" | "<" | "=" | "^" | "~") {
            pending_op = Some(raw);
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(format!("{}{}", op, raw)),
            None => tokens.push(raw.to_string()),
        }
    }
    if let Some(op) = pending_op {
        return Err(StagerError::Version(format!("Dangling operator '{}' in {}", op, s)));
    }

    // Hyphen range: "1.2.3 - 2.3.4"
    if tokens.len() == 3 && tokens[1] == "-" {
        let lower = Partial::parse(&tokens[0])?;
        let upper = Partial::parse(&tokens[2])?;
        let upper = match upper.ceiling() {
            Some(ceiling) => VersionConstraint::LessThan(ceiling),
            None if upper.major.is_none() => VersionConstraint::Any,
            None => VersionConstraint::LessOrEqual(upper.floor()),
        };
        return Ok(VersionConstraint::AllOf(vec![
            VersionConstraint::GreaterOrEqual(lower.floor()),
            upper,
        ]));
    }

    match tokens.len() {
        0 => Ok(VersionConstraint::Any),
        1 => parse_comparator(&tokens[0]),
        _ => {
            let constraints: StagerResult<Vec<_>> =
                tokens.iter().map(|t| parse_comparator(t)).collect();
            Ok(VersionConstraint::AllOf(constraints?))
        }
    }
}

/// True if `version` is a strict or extended version.
pub fn valid(version: &str) -> bool {
    Version::parse(version).is_ok()
}

/// Compare two version strings. Both must be valid.
pub fn compare(v1: &str, v2: &str) -> StagerResult<Ordering> {
    Ok(Version::parse(v1)?.cmp(&Version::parse(v2)?))
}

/// Compare two version strings, falling back to plain string order when
/// either side is not a version (e.g. the `*` marker).
pub fn compare_or_lexical(v1: &str, v2: &str) -> Ordering {
    match (Version::parse(v1), Version::parse(v2)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => v1.cmp(v2),
    }
}

/// Check `version` against `range`.
///
/// When `range` is not a parseable range (e.g. an extended version such as
/// `1.2.3.4rc`) the two strings must be equal.
pub fn satisfies(version: &str, range: &str) -> bool {
    let Ok(constraint) = parse_range(range) else {
        return version == range;
    };
    match Version::parse(version) {
        Ok(v) => v.normalized().satisfies(&constraint),
        Err(_) => version == range,
    }
}

/// Highest version in `versions` satisfying `range`, or the first exact
/// match when `range` is not a range.
pub fn max_satisfying<'a, S: AsRef<str>>(versions: &'a [S], range: &str) -> Option<&'a str> {
    match parse_range(range) {
        Ok(constraint) => versions
            .iter()
            .map(AsRef::as_ref)
            .filter_map(|s| Version::parse(s).ok().map(|v| (v, s)))
            .filter(|(v, _)| v.normalized().satisfies(&constraint))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, s)| s),
        Err(_) => versions.iter().map(AsRef::as_ref).find(|s| *s == range),
    }
}

/// Sort version strings from highest to lowest. Strings that are not
/// versions go last, in lexical order.
pub fn sort_descending<S: AsRef<str>>(versions: &mut [S]) {
    versions.sort_by(|a, b| compare_or_lexical(b.as_ref(), a.as_ref()));
}
