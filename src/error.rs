//! The closed error-kind set for the dep-spec core.
//!
//! Every fallible operation in this crate returns one of these variants
//! (or a narrower per-component error that [`From`]s into it). Warnings —
//! EAPI-non-strict downgrades, missing-flag predicates, discarded
//! suggested arms — never appear here; they go to the `tracing` sink
//! described in [`crate::eapi`] and are never folded into a `Result`.

use std::fmt;

use crate::name::NameKind;

/// A point in source text, 1-indexed, used by parse errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    /// 1-indexed line.
    pub line: usize,
    /// 1-indexed column.
    pub col: usize,
}

impl fmt::Display for LineCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// The closed set of error kinds surfaced by the dep-spec core (spec §7).
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Invalid name or version literal.
    #[error("invalid {kind}: {value:?}")]
    Name {
        /// Which name type rejected the value.
        kind: NameKind,
        /// The offending literal.
        value: String,
    },

    /// Malformed dep-spec text.
    #[error("{where_}: malformed dep-spec {text:?}: {reason}")]
    SpecParse {
        /// The text that failed to parse.
        text: String,
        /// Location within `text`.
        where_: LineCol,
        /// Human-readable reason.
        reason: String,
    },

    /// Malformed `[...]` USE-requirement clause.
    #[error("malformed use requirement {text:?}: {reason}")]
    UseReqParse {
        /// The text that failed to parse.
        text: String,
        /// Human-readable reason.
        reason: String,
    },

    /// A construct is forbidden under the active EAPI and `strict_parsing`
    /// is set, so the violation is fatal rather than a warning.
    #[error("construct {construct:?} is not permitted under EAPI {eapi:?}")]
    EapiViolation {
        /// The construct that triggered the check (`"||"`, `"!!"`, `"::repo"`, ...).
        construct: String,
        /// The EAPI identifier.
        eapi: String,
    },

    /// No candidate package satisfies an atom during resolution.
    #[error("no candidate satisfies {atom}")]
    NoMatch {
        /// The unsatisfied atom, formatted.
        atom: String,
        /// The conditional path under which the atom was pulled in.
        path: String,
    },

    /// A package-name fragment matches more than one qualified name.
    #[error("{part:?} is ambiguous: matches {matches:?}")]
    AmbiguousPackageName {
        /// The unqualified fragment that was looked up.
        part: String,
        /// The qualified names it could refer to.
        matches: Vec<String>,
    },

    /// Two atoms for the same `(name, slot)` cannot both be satisfied by a
    /// single chosen package ID.
    #[error("slot collision for {existing} vs {new}")]
    SlotCollision {
        /// The already-chosen identity, formatted.
        existing: String,
        /// The new, irreconcilable atom, formatted.
        new: String,
        /// The conditional path of the new pull-in.
        path: String,
    },

    /// A dependency cycle was detected and `circular_policy` is `error`.
    #[error("circular dependency among {cycle:?}")]
    CircularDependency {
        /// The members of the cycle, formatted.
        cycle: Vec<String>,
        /// The conditional path under which the cycle was closed.
        path: String,
    },

    /// A strong block (`!!atom`) matches an already-installed package.
    #[error("{blocked} is blocked by installed {blocker}")]
    BlockedByInstalled {
        /// The blocking atom, formatted.
        blocker: String,
        /// The installed identity it matches, formatted.
        blocked: String,
    },

    /// Every arm of an `||( ... )` group is unsatisfiable.
    #[error("no arm of || group at {path} is satisfiable")]
    AnyOfUnsatisfiable {
        /// The conditional path of the group.
        path: String,
    },

    /// Malformed core configuration (e.g. conflicting policy values).
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Human-readable reason.
        message: String,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoreError>;
