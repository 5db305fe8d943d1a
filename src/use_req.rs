//! The `[flag, -flag, flag?, flag!?, flag=, use(+)]` USE-requirement
//! sublanguage embedded in package atoms (spec.md §4.D).
//!
//! Grounded on `paludis/elike_use_requirement.cc` (`examples/original_source`),
//! which models each row as its own predicate object rather than a
//! collapsed boolean pair; kept here as a closed enum so a diagnostic
//! string can be reconstructed per-predicate the way the original's
//! `human_string_fragment()` does.

use std::fmt;

use crate::error::CoreError;
use crate::name::UseFlagName;

/// Tri-state flag query result: a package may simply not declare a flag
/// in its `IUSE`, which is distinct from declaring it and leaving it off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tribool {
    /// Declared in IUSE and enabled.
    True,
    /// Declared in IUSE and disabled.
    False,
    /// Not declared in IUSE at all.
    Unset,
}

impl Tribool {
    fn resolve(self, default: Option<bool>, flag: &str, warn_on: &str) -> bool {
        match self {
            Tribool::True => true,
            Tribool::False => false,
            Tribool::Unset => match default {
                Some(d) => d,
                None => {
                    tracing::warn!(flag, candidate = warn_on, "USE flag not in IUSE and no default given; treating as false");
                    false
                }
            },
        }
    }
}

/// A single parsed USE-requirement predicate (one comma-separated member
/// of a `[...]` clause).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UseRequirement {
    /// `flag` / `flag(+)` / `flag(-)` — flag enabled on candidate.
    Enabled {
        /// The flag being tested.
        flag: UseFlagName,
        /// Default to use when the flag is absent from the candidate's `IUSE`.
        default: Option<bool>,
    },
    /// `-flag` / `-flag(+)` / `-flag(-)` — flag disabled on candidate.
    Disabled {
        flag: UseFlagName,
        default: Option<bool>,
    },
    /// `flag?` — if the flag is enabled on *mine*, it must be enabled on
    /// the candidate.
    IfMineEnabledThenEnabled {
        flag: UseFlagName,
        default: Option<bool>,
    },
    /// `!flag?` / `-flag?` — if the flag is disabled on *mine*, it must be
    /// disabled on the candidate. Two spellings, one predicate.
    IfMineDisabledThenDisabled {
        flag: UseFlagName,
        default: Option<bool>,
    },
    /// `flag=` — flag state on the candidate equals flag state on *mine*.
    EqualToMine {
        flag: UseFlagName,
        default: Option<bool>,
    },
    /// `!flag=` — flag states differ.
    NotEqualToMine {
        flag: UseFlagName,
        default: Option<bool>,
    },
}

impl UseRequirement {
    fn flag(&self) -> &UseFlagName {
        match self {
            UseRequirement::Enabled { flag, .. }
            | UseRequirement::Disabled { flag, .. }
            | UseRequirement::IfMineEnabledThenEnabled { flag, .. }
            | UseRequirement::IfMineDisabledThenDisabled { flag, .. }
            | UseRequirement::EqualToMine { flag, .. }
            | UseRequirement::NotEqualToMine { flag, .. } => flag,
        }
    }

    /// Evaluate this predicate against a candidate's flag query and
    /// (where the predicate is self-referential) the requesting package's
    /// flag query. `candidate_label` is only used for warning diagnostics.
    ///
    /// Self-dependent predicates (`?`, `=`) without a `mine` query are
    /// rejected with [`CoreError::UseReqParse`] — spec.md §4.D: "self-dep
    /// predicates... without a mine are rejected".
    pub fn evaluate(
        &self,
        query_candidate: impl Fn(&str) -> Tribool,
        query_mine: Option<impl Fn(&str) -> Tribool>,
        candidate_label: &str,
    ) -> Result<bool, CoreError> {
        let flag = self.flag().as_str();
        let is_self_dep = !matches!(self, UseRequirement::Enabled { .. } | UseRequirement::Disabled { .. });
        if is_self_dep && query_mine.is_none() {
            return Err(CoreError::UseReqParse {
                text: flag.to_string(),
                reason: "self-dep predicate used without a requesting package id".into(),
            });
        }
        let cand = query_candidate(flag);
        let mine = || query_mine.as_ref().unwrap()(flag).resolve(None, flag, "mine");
        Ok(match self {
            UseRequirement::Enabled { default, .. } => {
                cand.resolve(*default, flag, candidate_label)
            }
            UseRequirement::Disabled { default, .. } => {
                !cand.resolve(*default, flag, candidate_label)
            }
            UseRequirement::IfMineEnabledThenEnabled { default, .. } => {
                !mine() || cand.resolve(*default, flag, candidate_label)
            }
            UseRequirement::IfMineDisabledThenDisabled { default, .. } => {
                mine() || !cand.resolve(*default, flag, candidate_label)
            }
            UseRequirement::EqualToMine { default, .. } => {
                mine() == cand.resolve(*default, flag, candidate_label)
            }
            UseRequirement::NotEqualToMine { default, .. } => {
                mine() != cand.resolve(*default, flag, candidate_label)
            }
        })
    }
}

impl fmt::Display for UseRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_default(f: &mut fmt::Formatter<'_>, default: Option<bool>) -> fmt::Result {
            match default {
                Some(true) => write!(f, "(+)"),
                Some(false) => write!(f, "(-)"),
                None => Ok(()),
            }
        }
        match self {
            UseRequirement::Enabled { flag, default } => {
                write!(f, "{flag}")?;
                write_default(f, *default)
            }
            UseRequirement::Disabled { flag, default } => {
                write!(f, "-{flag}")?;
                write_default(f, *default)
            }
            UseRequirement::IfMineEnabledThenEnabled { flag, default } => {
                write!(f, "{flag}")?;
                write_default(f, *default)?;
                write!(f, "?")
            }
            UseRequirement::IfMineDisabledThenDisabled { flag, default } => {
                write!(f, "!{flag}")?;
                write_default(f, *default)?;
                write!(f, "?")
            }
            UseRequirement::EqualToMine { flag, default } => {
                write!(f, "{flag}")?;
                write_default(f, *default)?;
                write!(f, "=")
            }
            UseRequirement::NotEqualToMine { flag, default } => {
                write!(f, "!{flag}")?;
                write_default(f, *default)?;
                write!(f, "=")
            }
        }
    }
}

/// Parse the comma-separated body of a `[...]` clause (without the
/// brackets). Comma-separation itself is EAPI-gated elsewhere (spec.md
/// §4.D); this parses one well-formed clause regardless.
pub fn parse_use_requirements(text: &str) -> Result<Vec<UseRequirement>, CoreError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(',').map(parse_one).collect()
}

fn parse_one(tok: &str) -> Result<UseRequirement, CoreError> {
    let malformed = |reason: &str| CoreError::UseReqParse {
        text: tok.to_string(),
        reason: reason.to_string(),
    };

    let mut rest = tok;
    let negated = if let Some(r) = rest.strip_prefix('!') {
        rest = r;
        true
    } else {
        false
    };
    let disabled_prefix = if let Some(r) = rest.strip_prefix('-') {
        rest = r;
        true
    } else {
        false
    };

    // Trailing `?` or `=`.
    let (suffix, body) = if let Some(b) = rest.strip_suffix('?') {
        (Some('?'), b)
    } else if let Some(b) = rest.strip_suffix('=') {
        (Some('='), b)
    } else {
        (None, rest)
    };

    // Optional trailing `(+)` / `(-)` default.
    let (default, body) = if let Some(b) = body.strip_suffix("(+)") {
        (Some(true), b)
    } else if let Some(b) = body.strip_suffix("(-)") {
        (Some(false), b)
    } else {
        (None, body)
    };

    if body.is_empty() {
        return Err(malformed("empty flag name"));
    }
    let flag = UseFlagName::new(body).map_err(|_| malformed("invalid use flag name"))?;

    Ok(match (negated, disabled_prefix, suffix) {
        (false, false, None) => UseRequirement::Enabled { flag, default },
        (false, true, None) => UseRequirement::Disabled { flag, default },
        (false, false, Some('?')) => UseRequirement::IfMineEnabledThenEnabled { flag, default },
        (true, false, Some('?')) | (false, true, Some('?')) => {
            UseRequirement::IfMineDisabledThenDisabled { flag, default }
        }
        (false, false, Some('=')) => UseRequirement::EqualToMine { flag, default },
        (true, false, Some('=')) => UseRequirement::NotEqualToMine { flag, default },
        _ => return Err(malformed("unsupported combination of !/-/?/= markers")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate_iuse_enabled(flag: &str) -> impl Fn(&str) -> Tribool {
        let flag = flag.to_string();
        move |f| if f == flag { Tribool::True } else { Tribool::Unset }
    }

    #[test]
    fn parses_all_forms() {
        let reqs = parse_use_requirements("foo,-bar,baz?,!qux?,quux=,!corge=,plugh(+),grault(-)").unwrap();
        assert_eq!(reqs.len(), 8);
        assert!(matches!(reqs[0], UseRequirement::Enabled { .. }));
        assert!(matches!(reqs[1], UseRequirement::Disabled { .. }));
        assert!(matches!(reqs[2], UseRequirement::IfMineEnabledThenEnabled { .. }));
        assert!(matches!(reqs[3], UseRequirement::IfMineDisabledThenDisabled { .. }));
        assert!(matches!(reqs[4], UseRequirement::EqualToMine { .. }));
        assert!(matches!(reqs[5], UseRequirement::NotEqualToMine { .. }));
        assert!(matches!(reqs[6], UseRequirement::Enabled { default: Some(true), .. }));
        assert!(matches!(reqs[7], UseRequirement::Enabled { default: Some(false), .. }));
    }

    #[test]
    fn dash_flag_question_is_same_as_bang() {
        let a = parse_one("!ssl?").unwrap();
        let b = parse_one("-ssl?").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_empty_flag() {
        assert!(parse_one("?").is_err());
    }

    #[test]
    fn evaluate_missing_flag_with_default_true() {
        let req = UseRequirement::Enabled {
            flag: UseFlagName::new("baz").unwrap(),
            default: Some(true),
        };
        let ok = req
            .evaluate(|_| Tribool::Unset, None::<fn(&str) -> Tribool>, "p-1")
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn evaluate_missing_flag_no_default_is_false_and_warns() {
        let req = UseRequirement::Enabled {
            flag: UseFlagName::new("baz").unwrap(),
            default: None,
        };
        let ok = req
            .evaluate(|_| Tribool::Unset, None::<fn(&str) -> Tribool>, "p-1")
            .unwrap();
        assert!(!ok);
    }

    #[test]
    fn evaluate_conditional_requires_mine() {
        let req = UseRequirement::IfMineEnabledThenEnabled {
            flag: UseFlagName::new("baz").unwrap(),
            default: None,
        };
        let err = req
            .evaluate(candidate_iuse_enabled("baz"), None::<fn(&str) -> Tribool>, "p-1")
            .unwrap_err();
        assert!(matches!(err, CoreError::UseReqParse { .. }));
    }

    #[test]
    fn evaluate_full_set_matches_spec_example() {
        // IUSE = (foo bar), enabled = (foo). [foo,-bar,baz(+)] => true.
        let query = |f: &str| match f {
            "foo" => Tribool::True,
            "bar" => Tribool::False,
            _ => Tribool::Unset,
        };
        let reqs = parse_use_requirements("foo,-bar,baz(+)").unwrap();
        let ok = reqs
            .iter()
            .map(|r| r.evaluate(query, None::<fn(&str) -> Tribool>, "p-1"))
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
            .into_iter()
            .all(|b| b);
        assert!(ok);

        // [baz] alone (no default) => false.
        let reqs2 = parse_use_requirements("baz").unwrap();
        let ok2 = reqs2[0].evaluate(query, None::<fn(&str) -> Tribool>, "p-1").unwrap();
        assert!(!ok2);
    }

    #[test]
    fn display_round_trips() {
        for s in ["foo", "-bar", "baz?", "!baz?", "quux=", "!quux=", "plugh(+)", "grault(-)"] {
            let req = parse_one(s).unwrap();
            assert_eq!(req.to_string(), s);
        }
    }
}
