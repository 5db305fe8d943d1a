//! The package-dep atom grammar: `[op]cat/pkg[-version][:slot][::repo][[use-reqs]]`
//! (spec.md §3 "Package-dep atom", §6 "Package-atom textual form").

use std::fmt;

use crate::error::CoreError;
use crate::name::{QualifiedPackageName, RepositoryName, SlotName};
use crate::use_req::{parse_use_requirements, UseRequirement};
use crate::version::{Operator, VersionSpec};

/// The `:slot`/`:*`/`:=`/`:N=` slot-restriction forms on an atom.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SlotRestriction {
    /// The required slot, when one is named (`:slot`, `:slot=`, `:slot/subslot`).
    pub slot: Option<SlotName>,
    /// The required sub-slot, when named (`:slot/subslot`).
    pub subslot: Option<SlotName>,
    /// `:*` — any slot is acceptable (mutually exclusive with `rebuild`).
    pub any_slot: bool,
    /// `:=` / `:slot=` — a slot operator requesting a rebuild trigger when
    /// the dependency's slot/subslot changes underfoot.
    pub rebuild: bool,
}

impl SlotRestriction {
    fn is_unrestricted(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for SlotRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unrestricted() {
            return Ok(());
        }
        write!(f, ":")?;
        if self.any_slot {
            return write!(f, "*");
        }
        if let Some(slot) = &self.slot {
            write!(f, "{slot}")?;
            if let Some(subslot) = &self.subslot {
                write!(f, "/{subslot}")?;
            }
        }
        if self.rebuild {
            write!(f, "=")?;
        }
        Ok(())
    }
}

/// A parsed package-dep atom (spec.md §3). Textual form round-trips
/// losslessly: `parse(s).to_string() == s` for any well-formed `s`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageDepSpec {
    /// The comparison operator, absent for a bare `cat/pkg` atom.
    pub operator: Option<Operator>,
    /// The qualified package name.
    pub name: QualifiedPackageName,
    /// The version constraint, present iff `operator` is present.
    pub version: Option<VersionSpec>,
    /// `true` when the version was written with a trailing `*`
    /// (`=cat/pkg-1.2*`), turning `operator` from `Equal` into the glob
    /// semantics of [`Operator::EqualGlob`] at match time.
    pub version_glob: bool,
    /// The `:slot` restriction, if any.
    pub slot: SlotRestriction,
    /// The `::repo` restriction, if any.
    pub repo: Option<RepositoryName>,
    /// The `[...]` USE-requirement list.
    pub use_requirements: Vec<UseRequirement>,
}

impl PackageDepSpec {
    /// The effective matching operator, folding in [`Self::version_glob`].
    pub fn effective_operator(&self) -> Option<Operator> {
        self.operator.map(|op| {
            if self.version_glob && op == Operator::Equal {
                Operator::EqualGlob
            } else {
                op
            }
        })
    }
}

fn parse_err(text: &str, reason: impl Into<String>) -> CoreError {
    CoreError::SpecParse {
        text: text.to_string(),
        where_: crate::error::LineCol { line: 1, col: 1 },
        reason: reason.into(),
    }
}

/// Parse one package-dep atom (no leading `!`/`!!` block marker — those
/// are stripped by the dep-spec tree parser before this is called, per
/// spec.md §3's AST invariant that `Block`'s inner atom carries no block
/// prefix).
pub fn parse_atom(text: &str) -> Result<PackageDepSpec, CoreError> {
    let original = text;
    let mut rest = text;

    let (operator, op_len) = match Operator::parse_prefix(rest) {
        Some((op, len)) => (Some(op), len),
        None => (None, 0),
    };
    rest = &rest[op_len..];

    // `[...]` use-requirement clause, always at the tail.
    let (rest, use_requirements) = if rest.ends_with(']') {
        let open = rest
            .rfind('[')
            .ok_or_else(|| parse_err(original, "unmatched ']'"))?;
        let body = &rest[open + 1..rest.len() - 1];
        (&rest[..open], parse_use_requirements(body)?)
    } else {
        (rest, Vec::new())
    };

    // `::repo`, always after any slot restriction.
    let (rest, repo) = match rest.rfind("::") {
        Some(idx) => {
            let repo_text = &rest[idx + 2..];
            if repo_text.is_empty() {
                return Err(parse_err(original, "empty repository name after '::'"));
            }
            (&rest[..idx], Some(RepositoryName::new(repo_text)?))
        }
        None => (rest, None),
    };

    // `:slot`, `:*`, `:=`, `:slot=`, `:slot/subslot[=]`.
    let (rest, slot) = match find_slot_colon(rest) {
        Some(idx) => {
            let slot_text = &rest[idx + 1..];
            (&rest[..idx], parse_slot_restriction(original, slot_text)?)
        }
        None => (rest, SlotRestriction::default()),
    };

    // Category/package[-version].
    let (cat_pkg, version_text) = if operator.is_some() {
        split_name_version(original, rest)?
    } else {
        (rest, None)
    };

    let name = QualifiedPackageName::parse(cat_pkg)
        .map_err(|_| parse_err(original, "expected 'category/package'"))?;

    let (version, version_glob) = match version_text {
        Some(v) if v.ends_with('*') => (Some(VersionSpec::parse(&v[..v.len() - 1])?), true),
        Some(v) => (Some(VersionSpec::parse(v)?), false),
        None => (None, false),
    };
    if version_glob && operator != Some(Operator::Equal) {
        return Err(parse_err(original, "trailing '*' only valid with '='"));
    }

    Ok(PackageDepSpec {
        operator,
        name,
        version,
        version_glob,
        slot,
        repo,
        use_requirements,
    })
}

/// Find the `:` introducing a slot restriction, i.e. the first `:` not
/// part of `::repo` (which has already been stripped by the caller).
fn find_slot_colon(s: &str) -> Option<usize> {
    s.find(':')
}

fn parse_slot_restriction(original: &str, slot_text: &str) -> Result<SlotRestriction, CoreError> {
    if slot_text == "*" {
        return Ok(SlotRestriction {
            any_slot: true,
            ..Default::default()
        });
    }
    if slot_text == "=" {
        return Ok(SlotRestriction {
            rebuild: true,
            ..Default::default()
        });
    }
    let (body, rebuild) = match slot_text.strip_suffix('=') {
        Some(b) => (b, true),
        None => (slot_text, false),
    };
    if body.is_empty() {
        return Err(parse_err(original, "empty slot restriction"));
    }
    let (slot_part, subslot_part) = match body.split_once('/') {
        Some((a, b)) => (a, Some(b)),
        None => (body, None),
    };
    Ok(SlotRestriction {
        slot: Some(SlotName::new(slot_part)?),
        subslot: subslot_part.map(SlotName::new).transpose()?,
        any_slot: false,
        rebuild,
    })
}

/// Split `"category/package-version"` (or `"category/package"` when no
/// version is present) at the PMS version boundary: the rightmost `-`
/// immediately followed by a digit.
fn split_name_version(original: &str, s: &str) -> Result<(&str, Option<&str>), CoreError> {
    let bytes = s.as_bytes();
    let mut split = None;
    for i in (0..bytes.len().saturating_sub(1)).rev() {
        if bytes[i] == b'-' && bytes[i + 1].is_ascii_digit() {
            split = Some(i);
            break;
        }
    }
    match split {
        Some(i) => Ok((&s[..i], Some(&s[i + 1..]))),
        None => Err(parse_err(original, "operator requires an explicit version")),
    }
}

impl fmt::Display for PackageDepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(op) = self.operator {
            write!(f, "{op}")?;
        }
        write!(f, "{}", self.name)?;
        if let Some(version) = &self.version {
            write!(f, "-{version}")?;
            if self.version_glob {
                write!(f, "*")?;
            }
        }
        write!(f, "{}", self.slot)?;
        if let Some(repo) = &self.repo {
            write!(f, "::{repo}")?;
        }
        if !self.use_requirements.is_empty() {
            write!(f, "[")?;
            for (i, req) in self.use_requirements.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{req}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_atom() {
        let a = parse_atom("dev-lang/rust").unwrap();
        assert!(a.operator.is_none());
        assert_eq!(a.name.to_string(), "dev-lang/rust");
        assert!(a.version.is_none());
    }

    #[test]
    fn parses_full_atom_spec_example() {
        let a = parse_atom(">=cat/pkg-1.2.3:2::repo[foo,-bar,baz?]").unwrap();
        assert_eq!(a.operator, Some(Operator::GreaterOrEqual));
        assert_eq!(a.name.category.as_str(), "cat");
        assert_eq!(a.name.package.as_str(), "pkg");
        assert_eq!(a.version.as_ref().unwrap().to_string(), "1.2.3");
        assert_eq!(a.slot.slot.as_ref().unwrap().as_str(), "2");
        assert_eq!(a.repo.as_ref().unwrap().as_str(), "repo");
        assert_eq!(a.use_requirements.len(), 3);
    }

    #[test]
    fn atom_round_trips() {
        for s in [
            "dev-lang/rust",
            ">=cat/pkg-1.2.3:2::repo[foo,-bar,baz?]",
            "dev-lang/python:3.11",
            "dev-lang/python:*",
            "dev-lib/bar:=",
            "dev-lib/bar:0=",
            "dev-lib/libfoo:0/2",
            "=dev-lang/rust-1.75*",
            "~dev-lang/rust-1.75.0",
        ] {
            let parsed = parse_atom(s).unwrap();
            assert_eq!(parsed.to_string(), s, "round trip failed for {s}");
        }
    }

    #[test]
    fn rejects_operator_without_version() {
        assert!(parse_atom(">=cat/pkg").is_err());
    }

    #[test]
    fn rejects_star_without_equal() {
        assert!(parse_atom(">=cat/pkg-1.2*").is_err());
    }

    #[test]
    fn slot_rebuild_with_slot_number() {
        let a = parse_atom("dev-lib/bar:0=").unwrap();
        assert!(a.slot.rebuild);
        assert_eq!(a.slot.slot.as_ref().unwrap().as_str(), "0");
    }

    #[test]
    fn subslot_matching_fields() {
        let a = parse_atom("dev-lib/libfoo:0/2").unwrap();
        assert_eq!(a.slot.slot.as_ref().unwrap().as_str(), "0");
        assert_eq!(a.slot.subslot.as_ref().unwrap().as_str(), "2");
    }
}
