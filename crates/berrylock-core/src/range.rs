//! npm-style version ranges as sets of versions.
//!
//! Ranges are parsed with the `semver` crate after rewriting npm-only syntax
//! (hyphen ranges, x-ranges, space-separated comparators, bare versions).
//! Each `||` branch becomes the intersection of its comparators' intervals,
//! and a whole range is the merged union of its branches. This lets two
//! ranges be compared for equality and containment without enumerating
//! versions.

use std::cmp::Ordering;

use semver::{BuildMetadata, Comparator, Op, Version, VersionReq};

use crate::error::RangeError;

/// Iterate the trimmed, non-empty `||` branches of a range.
pub fn branches(range: &str) -> impl Iterator<Item = &str> {
    range.split("||").map(str::trim).filter(|b| !b.is_empty())
}

/// Whether a locked `stored` range can stand in for a `requested` range.
///
/// True when any branch of one is identical (textually or as a version set)
/// to any branch of the other, or when every version `requested` accepts is
/// also accepted by `stored`.
///
/// ```
/// use berrylock_core::range::range_satisfies;
///
/// assert!(range_satisfies("^4.0.0", "^3.0.0 || ^4.0.0"));
/// assert!(range_satisfies("^4.0.0", "4.2.x"));
/// assert!(!range_satisfies("^4.0.0", "^5.0.0"));
/// ```
#[must_use]
pub fn range_satisfies(stored: &str, requested: &str) -> bool {
    for s in branches(stored) {
        for r in branches(requested) {
            if s == r {
                return true;
            }
            if let (Ok(s), Ok(r)) = (RangeSet::parse(s), RangeSet::parse(r)) {
                if !r.is_empty() && s == r {
                    return true;
                }
            }
        }
    }

    match (RangeSet::parse(stored), RangeSet::parse(requested)) {
        (Ok(stored), Ok(requested)) => !requested.is_empty() && stored.contains(&requested),
        _ => false,
    }
}

/// A union of disjoint version intervals, sorted by lower bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSet {
    intervals: Vec<Interval>,
}

impl RangeSet {
    /// Parse a range, including `||` unions.
    pub fn parse(range: &str) -> Result<Self, RangeError> {
        let mut intervals = Vec::new();
        let mut saw_branch = false;

        for branch in branches(range) {
            saw_branch = true;
            let req = parse_range(branch)?;
            if let Some(interval) = req_interval(&req)
                .ok_or_else(|| RangeError::new(branch, "unsupported comparator"))?
            {
                intervals.push(interval);
            }
        }

        // An empty range means "any version" in npm.
        if !saw_branch {
            intervals.push(Interval::full());
        }

        Ok(Self {
            intervals: merge(intervals),
        })
    }

    /// True when no version satisfies the range.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// True when every version in `other` is also in `self`.
    #[must_use]
    pub fn contains(&self, other: &RangeSet) -> bool {
        other
            .intervals
            .iter()
            .all(|inner| self.intervals.iter().any(|outer| outer.contains(inner)))
    }

    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.intervals.iter().any(|i| i.matches(version))
    }
}

/// Parse a single (non-union) range, handling npm-specific syntax.
///
/// Handles:
/// - Standard semver ranges: ^1.0.0, ~1.0.0, >=1.0.0, etc.
/// - Bare versions, which npm treats as exact: 1.2.3, 1.2
/// - Hyphen ranges: 1.0.0 - 2.0.0
/// - X-ranges: 1.x, 1.0.x, *
/// - Space-separated comparators: >= 2.1.2 < 3.0.0
pub fn parse_range(range: &str) -> Result<VersionReq, RangeError> {
    let range = range.trim();
    let invalid = |e: semver::Error| RangeError::new(range, e.to_string());

    if range.is_empty() || range == "*" || range == "x" || range == "X" {
        return Ok(VersionReq::STAR);
    }

    if let Some((start, end)) = parse_hyphen_range(range) {
        return VersionReq::parse(&format!(">={start}, <={end}")).map_err(invalid);
    }

    if is_bare_version(range) {
        return VersionReq::parse(&format!("={range}")).map_err(invalid);
    }

    if range.contains(['x', 'X', '*']) {
        let converted = convert_x_range(range)
            .ok_or_else(|| RangeError::new(range, "version number too large"))?;
        return VersionReq::parse(&converted).map_err(invalid);
    }

    VersionReq::parse(&convert_space_separated_comparators(range)).map_err(invalid)
}

/// `1`, `1.2`, `1.2.3` or `1.2.3-pre` with no operator.
fn is_bare_version(range: &str) -> bool {
    if Version::parse(range).is_ok() {
        return true;
    }
    let parts: Vec<&str> = range.split('.').collect();
    parts.len() <= 2
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Parse a hyphen range like "1.0.0 - 2.0.0".
fn parse_hyphen_range(range: &str) -> Option<(&str, &str)> {
    let (start, end) = range.split_once(" - ")?;
    let (start, end) = (start.trim(), end.trim());
    (!start.is_empty() && !end.is_empty()).then_some((start, end))
}

/// Convert space-separated comparators to comma-separated.
///
/// npm allows: ">= 2.1.2 < 3.0.0" which means ">=2.1.2 AND <3.0.0"
/// Rust semver requires: ">=2.1.2, <3.0.0"
fn convert_space_separated_comparators(range: &str) -> String {
    let mut result = String::new();
    let mut need_comma = false;

    for token in range.split_whitespace() {
        let has_version = token.chars().any(|c| c.is_ascii_digit());
        if need_comma {
            result.push_str(", ");
        }
        result.push_str(token);
        // A lone operator waits for its version before the next comma.
        need_comma = has_version;
    }

    result
}

/// Convert x-range to semver range. `None` when the upper bound overflows.
fn convert_x_range(range: &str) -> Option<String> {
    let parts: Vec<&str> = range.split('.').collect();
    let is_wild = |p: &str| matches!(p, "x" | "X" | "*");

    match parts.as_slice() {
        [major, wild] | [major, wild, _] if is_wild(wild) => {
            if let Ok(m) = major.parse::<u64>() {
                return Some(format!(">={m}.0.0, <{}.0.0", m.checked_add(1)?));
            }
        }
        [major, minor, wild] if is_wild(wild) => {
            if let (Ok(m), Ok(n)) = (major.parse::<u64>(), minor.parse::<u64>()) {
                return Some(format!(">={m}.{n}.0, <{m}.{}.0", n.checked_add(1)?));
            }
        }
        _ => {}
    }

    // Operators in front of x-ranges (">=1.x") fall back to zeros.
    Some(range.replace(['x', 'X', '*'], "0"))
}

/// One end of an interval.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    version: Version,
    inclusive: bool,
}

impl Endpoint {
    fn included(version: Version) -> Self {
        Self {
            version,
            inclusive: true,
        }
    }

    fn excluded(version: Version) -> Self {
        Self {
            version,
            inclusive: false,
        }
    }
}

/// Versions between `lower` and `upper`; `upper == None` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Interval {
    lower: Endpoint,
    upper: Option<Endpoint>,
}

impl Interval {
    fn full() -> Self {
        Self {
            lower: Endpoint::included(Version::new(0, 0, 0)),
            upper: None,
        }
    }

    fn between(lower: Version, upper: Version) -> Self {
        Self {
            lower: Endpoint::included(lower),
            upper: Some(Endpoint::excluded(upper)),
        }
    }

    fn at_least(lower: Endpoint) -> Self {
        Self { lower, upper: None }
    }

    fn below(upper: Endpoint) -> Self {
        Self {
            lower: Endpoint::included(Version::new(0, 0, 0)),
            upper: Some(upper),
        }
    }

    fn is_empty(&self) -> bool {
        match &self.upper {
            None => false,
            Some(upper) => match self.lower.version.cmp(&upper.version) {
                Ordering::Less => false,
                Ordering::Equal => !(self.lower.inclusive && upper.inclusive),
                Ordering::Greater => true,
            },
        }
    }

    fn intersect(self, other: Self) -> Self {
        let lower = if cmp_lower(&self.lower, &other.lower) == Ordering::Less {
            other.lower
        } else {
            self.lower
        };
        let upper = if cmp_upper(self.upper.as_ref(), other.upper.as_ref()) == Ordering::Greater {
            other.upper
        } else {
            self.upper
        };
        Self { lower, upper }
    }

    fn contains(&self, inner: &Self) -> bool {
        cmp_lower(&self.lower, &inner.lower) != Ordering::Greater
            && cmp_upper(inner.upper.as_ref(), self.upper.as_ref()) != Ordering::Greater
    }

    fn matches(&self, version: &Version) -> bool {
        let above = match version.cmp(&self.lower.version) {
            Ordering::Greater => true,
            Ordering::Equal => self.lower.inclusive,
            Ordering::Less => false,
        };
        let below = match &self.upper {
            None => true,
            Some(upper) => match version.cmp(&upper.version) {
                Ordering::Less => true,
                Ordering::Equal => upper.inclusive,
                Ordering::Greater => false,
            },
        };
        above && below
    }
}

/// Lower bounds: smaller version first, inclusive before exclusive.
fn cmp_lower(a: &Endpoint, b: &Endpoint) -> Ordering {
    a.version
        .cmp(&b.version)
        .then_with(|| b.inclusive.cmp(&a.inclusive))
}

/// Upper bounds: unbounded last, exclusive before inclusive.
fn cmp_upper(a: Option<&Endpoint>, b: Option<&Endpoint>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a
            .version
            .cmp(&b.version)
            .then_with(|| a.inclusive.cmp(&b.inclusive)),
    }
}

/// Whether `next` starts no later than `upper` ends, counting adjacency.
fn touches(upper: Option<&Endpoint>, next: &Endpoint) -> bool {
    match upper {
        None => true,
        Some(upper) => match next.version.cmp(&upper.version) {
            Ordering::Less => true,
            Ordering::Equal => upper.inclusive || next.inclusive,
            Ordering::Greater => false,
        },
    }
}

fn merge(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.retain(|i| !i.is_empty());
    intervals.sort_by(|a, b| cmp_lower(&a.lower, &b.lower));

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        if let Some(last) = merged.last_mut() {
            if touches(last.upper.as_ref(), &interval.lower) {
                if cmp_upper(interval.upper.as_ref(), last.upper.as_ref()) == Ordering::Greater {
                    last.upper = interval.upper;
                }
                continue;
            }
        }
        merged.push(interval);
    }
    merged
}

/// Interval accepted by every comparator of `req`.
///
/// `None` means a comparator uses an operator this engine does not model;
/// `Some(None)` means the comparators contradict each other.
fn req_interval(req: &VersionReq) -> Option<Option<Interval>> {
    let mut acc = Interval::full();
    for comparator in &req.comparators {
        acc = acc.intersect(comparator_interval(comparator)?);
    }
    Some((!acc.is_empty()).then_some(acc))
}

fn comparator_interval(c: &Comparator) -> Option<Interval> {
    let major = c.major;
    let next_major = Version::new(major.saturating_add(1), 0, 0);
    let full = |minor: u64, patch: u64| Version {
        major,
        minor,
        patch,
        pre: c.pre.clone(),
        build: BuildMetadata::EMPTY,
    };

    let interval = match c.op {
        Op::Exact | Op::Wildcard => match (c.minor, c.patch) {
            (Some(minor), Some(patch)) => {
                let v = full(minor, patch);
                Interval {
                    lower: Endpoint::included(v.clone()),
                    upper: Some(Endpoint::included(v)),
                }
            }
            (Some(minor), None) => Interval::between(
                Version::new(major, minor, 0),
                Version::new(major, minor.saturating_add(1), 0),
            ),
            (None, _) => Interval::between(Version::new(major, 0, 0), next_major),
        },
        Op::Greater => match (c.minor, c.patch) {
            (Some(minor), Some(patch)) => Interval::at_least(Endpoint::excluded(full(minor, patch))),
            (Some(minor), None) => Interval::at_least(Endpoint::included(Version::new(
                major,
                minor.saturating_add(1),
                0,
            ))),
            (None, _) => Interval::at_least(Endpoint::included(next_major)),
        },
        Op::GreaterEq => Interval::at_least(Endpoint::included(full(
            c.minor.unwrap_or(0),
            c.patch.unwrap_or(0),
        ))),
        Op::Less => Interval::below(Endpoint::excluded(full(
            c.minor.unwrap_or(0),
            c.patch.unwrap_or(0),
        ))),
        Op::LessEq => match (c.minor, c.patch) {
            (Some(minor), Some(patch)) => Interval::below(Endpoint::included(full(minor, patch))),
            (Some(minor), None) => Interval::below(Endpoint::excluded(Version::new(
                major,
                minor.saturating_add(1),
                0,
            ))),
            (None, _) => Interval::below(Endpoint::excluded(next_major)),
        },
        Op::Tilde => match c.minor {
            Some(minor) => Interval {
                lower: Endpoint::included(full(minor, c.patch.unwrap_or(0))),
                upper: Some(Endpoint::excluded(Version::new(
                    major,
                    minor.saturating_add(1),
                    0,
                ))),
            },
            None => Interval::between(Version::new(major, 0, 0), next_major),
        },
        Op::Caret => match (c.minor, c.patch) {
            (Some(minor), patch) => {
                let lower = full(minor, patch.unwrap_or(0));
                let upper = if major > 0 {
                    next_major
                } else if minor > 0 || patch.is_none() {
                    Version::new(0, minor.saturating_add(1), 0)
                } else {
                    Version::new(0, 0, patch.unwrap_or(0).saturating_add(1))
                };
                Interval {
                    lower: Endpoint::included(lower),
                    upper: Some(Endpoint::excluded(upper)),
                }
            }
            (None, _) => Interval::between(Version::new(major, 0, 0), next_major),
        },
        _ => return None,
    };

    Some(interval)
}
