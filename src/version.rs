//! Gentoo version grammar, ordering and comparison operators (spec.md §3, §4.A).
//!
//! Mirrors the teacher's `version_match.rs`, but the `Version`/`Operator`
//! types are now owned by this crate instead of borrowed from an external
//! `portage-atom` dependency.

use std::cmp::Ordering;
use std::fmt;

use crate::error::CoreError;
use crate::name::NameKind;

/// One of the five ordered release suffixes, plus the implicit "no
/// suffix" release rank that sits between `_rc` and `_p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum SuffixKind {
    Alpha,
    Beta,
    Pre,
    Rc,
    Release,
    P,
}

impl SuffixKind {
    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "alpha" => Some(Self::Alpha),
            "beta" => Some(Self::Beta),
            "pre" => Some(Self::Pre),
            "rc" => Some(Self::Rc),
            "p" => Some(Self::P),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            SuffixKind::Alpha => "alpha",
            SuffixKind::Beta => "beta",
            SuffixKind::Pre => "pre",
            SuffixKind::Rc => "rc",
            SuffixKind::Release => "",
            SuffixKind::P => "p",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Suffix {
    kind: SuffixKind,
    number: u64,
}

impl PartialOrd for Suffix {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Suffix {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind.cmp(&other.kind).then(self.number.cmp(&other.number))
    }
}

const IMPLICIT_RELEASE: Suffix = Suffix {
    kind: SuffixKind::Release,
    number: 0,
};

/// A parsed Gentoo version string: numeric components, optional trailing
/// letter, ordered release suffixes, and a revision.
///
/// Total ordering follows spec.md §4.A: numeric parts compare numerically
/// unless a non-first part has a leading zero (PMS string-comparison
/// quirk), the letter suffix is lexicographic after the numeric tuple,
/// suffixes order `_alpha < _beta < _pre < _rc < (none) < _p`, and the
/// revision compares last.
#[derive(Debug, Clone, Eq)]
pub struct VersionSpec {
    raw: String,
    /// Raw numeric component strings, in order (`"1", "2", "3"` for `1.2.3`).
    pub(crate) numbers: Vec<String>,
    letter: Option<char>,
    suffixes: Vec<Suffix>,
    revision: u64,
    has_explicit_revision: bool,
}

impl VersionSpec {
    /// Parse a version string. Fails with [`CoreError::Name`] (kind
    /// [`NameKind::Package`], since a version is only ever meaningful
    /// attached to a package atom) on malformed input.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let raw = s.to_string();
        let mut rest = s;

        let (body, revision, has_explicit_revision) = match rest.rfind("-r") {
            Some(idx) if rest[idx + 2..].chars().all(|c| c.is_ascii_digit()) && !rest[idx + 2..].is_empty() => {
                let rev: u64 = rest[idx + 2..].parse().map_err(|_| bad(&raw))?;
                (&rest[..idx], rev, true)
            }
            _ => (rest, 0u64, false),
        };
        rest = body;

        if rest.is_empty() {
            return Err(bad(&raw));
        }

        let mut numbers = Vec::new();
        let mut chars = rest.char_indices().peekable();
        let mut last_end = 0;
        loop {
            let start = last_end;
            let mut end = start;
            let bytes = rest.as_bytes();
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if end == start {
                return Err(bad(&raw));
            }
            numbers.push(rest[start..end].to_string());
            last_end = end;
            if last_end < bytes.len() && bytes[last_end] == b'.' {
                last_end += 1;
                continue;
            }
            break;
        }
        let _ = &mut chars;
        rest = &rest[last_end..];

        let mut letter = None;
        if let Some(c) = rest.chars().next() {
            if c.is_ascii_alphabetic() {
                letter = Some(c);
                rest = &rest[c.len_utf8()..];
            }
        }

        let mut suffixes = Vec::new();
        while let Some(stripped) = rest.strip_prefix('_') {
            let tag_end = stripped
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(stripped.len());
            let tag_end = stripped[..tag_end]
                .char_indices()
                .take_while(|(_, c)| c.is_ascii_alphabetic())
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            let tag = &stripped[..tag_end];
            let kind = SuffixKind::parse(tag).ok_or_else(|| bad(&raw))?;
            let num_start = tag_end;
            let num_end = stripped[num_start..]
                .char_indices()
                .take_while(|(_, c)| c.is_ascii_digit())
                .last()
                .map(|(i, c)| num_start + i + c.len_utf8())
                .unwrap_or(num_start);
            let number = if num_end > num_start {
                stripped[num_start..num_end].parse().map_err(|_| bad(&raw))?
            } else {
                0
            };
            suffixes.push(Suffix { kind, number });
            rest = &stripped[num_end..];
        }

        if !rest.is_empty() {
            return Err(bad(&raw));
        }

        Ok(Self {
            raw,
            numbers,
            letter,
            suffixes,
            revision,
            has_explicit_revision,
        })
    }

    /// The version text with the revision (if any) stripped.
    pub fn base(&self) -> &str {
        match self.raw.rfind("-r") {
            Some(idx) if self.has_explicit_revision => &self.raw[..idx],
            _ => &self.raw,
        }
    }

    /// The revision number (`0` when absent).
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Compare ignoring revision (used by the `~` operator).
    pub fn cmp_ignoring_revision(&self, other: &Self) -> Ordering {
        self.cmp_core(other)
    }

    fn cmp_core(&self, other: &Self) -> Ordering {
        for (i, (a, b)) in self.numbers.iter().zip(other.numbers.iter()).enumerate() {
            let ord = compare_component(a, b, i == 0);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        let len_ord = self.numbers.len().cmp(&other.numbers.len());
        if len_ord != Ordering::Equal {
            return len_ord;
        }
        let letter_ord = self.letter.cmp(&other.letter);
        if letter_ord != Ordering::Equal {
            return letter_ord;
        }
        let max_len = self.suffixes.len().max(other.suffixes.len());
        for i in 0..max_len {
            let a = self.suffixes.get(i).unwrap_or(&IMPLICIT_RELEASE);
            let b = other.suffixes.get(i).unwrap_or(&IMPLICIT_RELEASE);
            let ord = a.cmp(b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Compares one numeric component. spec.md:81 scopes the leading-zero
/// string-comparison quirk to a non-first part; the first component always
/// compares as an integer.
fn compare_component(a: &str, b: &str, is_first: bool) -> Ordering {
    if is_first {
        let an: u128 = a.parse().unwrap_or(0);
        let bn: u128 = b.parse().unwrap_or(0);
        return an.cmp(&bn);
    }
    let a_leading_zero = a.len() > 1 && a.starts_with('0');
    let b_leading_zero = b.len() > 1 && b.starts_with('0');
    if a_leading_zero || b_leading_zero {
        a.trim_end_matches('0').cmp(b.trim_end_matches('0'))
    } else {
        let an: u128 = a.parse().unwrap_or(0);
        let bn: u128 = b.parse().unwrap_or(0);
        an.cmp(&bn)
    }
}

fn bad(raw: &str) -> CoreError {
    CoreError::Name {
        kind: NameKind::Package,
        value: raw.to_string(),
    }
}

impl PartialEq for VersionSpec {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_core(other) == Ordering::Equal && self.revision == other.revision
    }
}

impl PartialOrd for VersionSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_core(other).then(self.revision.cmp(&other.revision))
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// The seven PMS version-comparison operators (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `=`
    Equal,
    /// `~` — equal ignoring revision.
    Approximate,
    /// `>=`
    GreaterOrEqual,
    /// `>`
    Greater,
    /// `=*` — version-prefix equal.
    EqualGlob,
}

impl Operator {
    /// Parse the textual prefix of an atom, returning the operator and the
    /// number of bytes it consumed.
    pub fn parse_prefix(s: &str) -> Option<(Self, usize)> {
        if s.starts_with(">=") {
            Some((Self::GreaterOrEqual, 2))
        } else if s.starts_with("<=") {
            Some((Self::LessOrEqual, 2))
        } else if s.starts_with('<') {
            Some((Self::Less, 1))
        } else if s.starts_with('>') {
            Some((Self::Greater, 1))
        } else if s.starts_with('~') {
            Some((Self::Approximate, 1))
        } else if s.starts_with('=') {
            // `=*` is resolved by the atom parser once the version text's
            // trailing `*` is observed; here we only recognise the `=` lead byte.
            Some((Self::Equal, 1))
        } else {
            None
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Equal => "=",
            Operator::Approximate => "~",
            Operator::GreaterOrEqual => ">=",
            Operator::Greater => ">",
            Operator::EqualGlob => "=*",
        };
        f.write_str(s)
    }
}

/// Test whether `candidate` satisfies `op constraint`, per PMS 8.3.2.
pub fn version_matches(candidate: &VersionSpec, op: Operator, constraint: &VersionSpec) -> bool {
    match op {
        Operator::Less => candidate < constraint,
        Operator::LessOrEqual => candidate <= constraint,
        Operator::Equal => candidate == constraint,
        Operator::GreaterOrEqual => candidate >= constraint,
        Operator::Greater => candidate > constraint,
        Operator::Approximate => candidate.cmp_ignoring_revision(constraint) == Ordering::Equal,
        Operator::EqualGlob => glob_matches(candidate, constraint),
    }
}

fn glob_matches(candidate: &VersionSpec, constraint: &VersionSpec) -> bool {
    if candidate.numbers.len() < constraint.numbers.len() {
        return false;
    }
    for (c, p) in candidate.numbers.iter().zip(constraint.numbers.iter()) {
        if c != p {
            return false;
        }
    }
    if candidate.numbers.len() == constraint.numbers.len() {
        if let Some(cl) = constraint.letter {
            return candidate.letter == Some(cl);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> VersionSpec {
        VersionSpec::parse(s).unwrap()
    }

    #[test]
    fn order_basic_chain() {
        assert!(v("1.2.3") < v("1.2.3-r1"));
        assert!(v("1.2.3-r1") < v("1.2.4_pre"));
        assert!(v("1.2.4_pre") < v("1.2.4"));
    }

    #[test]
    fn suffix_ordering_is_total() {
        assert!(v("1_alpha") < v("1_beta"));
        assert!(v("1_beta") < v("1_pre"));
        assert!(v("1_pre") < v("1_rc"));
        assert!(v("1_rc") < v("1"));
        assert!(v("1") < v("1_p"));
    }

    #[test]
    fn leading_zero_forces_string_compare() {
        // "01" vs "1" as plain numbers would be equal; PMS treats a
        // leading-zero component as a string comparison instead.
        assert_ne!(v("1.01"), v("1.1"));
    }

    #[test]
    fn leading_zero_quirk_does_not_apply_to_first_component() {
        assert_eq!(v("09").cmp(&v("9")), Ordering::Equal);
    }

    #[test]
    fn letter_suffix_breaks_ties_lexicographically() {
        assert!(v("1.2.3a") < v("1.2.3b"));
        assert!(v("1.2.3") < v("1.2.3a"));
    }

    #[test]
    fn equality_includes_revision_by_default() {
        assert_ne!(v("1.2.3"), v("1.2.3-r1"));
        assert_eq!(v("1.2.3-r1").cmp_ignoring_revision(&v("1.2.3")), Ordering::Equal);
    }

    #[test]
    fn matches_approximate_ignores_revision() {
        assert!(version_matches(&v("1.2.3-r1"), Operator::Approximate, &v("1.2.3")));
        assert!(!version_matches(&v("1.2.4"), Operator::Approximate, &v("1.2.3")));
    }

    #[test]
    fn matches_equal_glob_prefix() {
        assert!(version_matches(&v("1.75.0"), Operator::EqualGlob, &v("1.75")));
        assert!(!version_matches(&v("1.7"), Operator::EqualGlob, &v("1.75")));
        assert!(!version_matches(&v("1.76.0"), Operator::EqualGlob, &v("1.75")));
    }

    #[test]
    fn display_round_trips() {
        assert_eq!(v("1.2.3-r1").to_string(), "1.2.3-r1");
        assert_eq!(v("1.2.4_pre2").to_string(), "1.2.4_pre2");
    }

    #[test]
    fn rejects_malformed() {
        assert!(VersionSpec::parse("").is_err());
        assert!(VersionSpec::parse("abc").is_err());
        assert!(VersionSpec::parse("1._bogus").is_err());
    }
}
