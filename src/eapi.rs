//! EAPI-gated grammar options (spec.md §6 `EapiOptions`, §9 open question).
//!
//! The original sources gate dep-spec constructs per EAPI through a
//! `Feature` set keyed by EAPI id (see `893ba563_pkgcraft-pkgcraft…eapi.rs`
//! in the retrieval pack's `other_examples/`). This crate takes the same
//! shape but keeps only the options the dep-spec grammar and USE-req
//! evaluator actually consult, per spec.md §6. `EapiOptions` is the
//! authoritative gate: the parser never re-derives a rule from the EAPI
//! identifier itself.

use std::fmt;

/// How strictly the USE-flag parser treats unknown tokens in an atom's
/// `[...]` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IuseFlagParseMode {
    /// Any token not matching the grammar is fatal.
    Strict,
    /// Unknown tokens are accepted but warned about.
    #[default]
    Lax,
    /// Unknown tokens are silently accepted.
    Permissive,
}

/// The boolean/enum knobs that gate dep-spec grammar legality for one EAPI
/// (spec.md §6). Constructed once per EAPI and threaded explicitly through
/// every parse call — there is no global "current EAPI" (spec.md §9).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EapiOptions {
    /// EAPI identifier this record describes, e.g. `"7"`, `"8"`, `"paludis-1"`.
    pub id: String,
    /// Self-referential dependency atoms (an atom on the package's own
    /// qualified name) are permitted.
    pub allow_self_deps: bool,
    /// `flag(+)` / `flag(-)` USE-requirement defaults are permitted.
    pub allow_default_values: bool,
    /// `::repo` atom qualifiers are permitted.
    pub allow_repo_qualifier: bool,
    /// `:=`, `:*`, `:N=` slot operators are permitted.
    pub allow_slot_operator: bool,
    /// `!!atom` strong blocks are permitted (otherwise only `!atom`).
    pub allow_strong_blocks: bool,
    /// `label:` dependency-class labels are permitted.
    pub allow_labels: bool,
    /// EAPI violations are fatal ([`crate::error::CoreError::EapiViolation`])
    /// rather than downgraded to a `tracing::warn!`.
    pub strict_parsing: bool,
    /// Accept Portage's historical syntax variants in addition to this
    /// EAPI's canonical grammar.
    pub portage_syntax: bool,
    /// Accept both the EAPI's native syntax and `portage_syntax` without
    /// preferring either.
    pub both_syntaxes: bool,
    /// How unknown tokens inside `[...]` are treated.
    pub iuse_flag_parse_mode: IuseFlagParseMode,
}

impl EapiOptions {
    /// The permissive baseline used when no specific EAPI table applies —
    /// every construct from every era is accepted, nothing is fatal. Not a
    /// real EAPI; useful for parsing fixtures and for `strict_parsing`-off
    /// exploratory tooling.
    pub fn permissive(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            allow_self_deps: true,
            allow_default_values: true,
            allow_repo_qualifier: true,
            allow_slot_operator: true,
            allow_strong_blocks: true,
            allow_labels: true,
            strict_parsing: false,
            portage_syntax: false,
            both_syntaxes: false,
            iuse_flag_parse_mode: IuseFlagParseMode::Lax,
        }
    }

    /// EAPI 7: slot operators and repo qualifiers are legal, defaults are
    /// legal, strong blocks are legal, labels are not part of the
    /// standard grammar (Paludis extension), strict by default.
    pub fn eapi7() -> Self {
        Self {
            id: "7".into(),
            allow_self_deps: false,
            allow_default_values: true,
            allow_repo_qualifier: false,
            allow_slot_operator: true,
            allow_strong_blocks: true,
            allow_labels: false,
            strict_parsing: true,
            portage_syntax: false,
            both_syntaxes: false,
            iuse_flag_parse_mode: IuseFlagParseMode::Strict,
        }
    }

    /// EAPI 8 adds nothing the dep-spec grammar cares about over 7 in this
    /// core; kept distinct so callers can grow the table without touching
    /// call sites.
    pub fn eapi8() -> Self {
        Self {
            id: "8".into(),
            ..Self::eapi7()
        }
    }

    /// The `paludis-1` exheres-style EAPI: adds repo qualifiers and
    /// dependency-class labels on top of EAPI 7.
    pub fn paludis1() -> Self {
        Self {
            id: "paludis-1".into(),
            allow_repo_qualifier: true,
            allow_labels: true,
            ..Self::eapi7()
        }
    }
}

impl fmt::Display for EapiOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EAPI {}", self.id)
    }
}
