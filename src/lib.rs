//! Dep-spec grammar, USE-requirement evaluator, and resolver core for
//! Gentoo-style package managers.
//!
//! This crate is the Paludis-style dependency-specification language and
//! its `DepList` resolver: parse per-package `DEPEND`/`RDEPEND`/`PDEPEND`
//! strings, `LICENSE`/`SRC_URI` trees and USE-flag requirements into a
//! typed AST ([`spec_tree`]), evaluate that AST against a queryable
//! package database ([`database`]), and walk it into an ordered install
//! plan ([`dep_list`]).
//!
//! Module map:
//! - [`name`], [`version`] — validated names and Gentoo-ordered versions.
//! - [`spec_tree`] — the dep-spec AST, shared by five tree kinds.
//! - [`eapi`], [`parser`] — EAPI-parameterised tokeniser/builder.
//! - [`use_req`] — the `[flag, -flag, flag?, ...]` predicate sublanguage.
//! - [`atom`] — `PackageDepSpec`, the parsed form of a package atom.
//! - [`package_id`] — the read-only `PackageID` contract.
//! - [`database`] — query/selection plus the `Environment`/`Repository`/
//!   `PackageDatabase` external interfaces and an in-memory test double.
//! - [`condition_tracker`] — the "why was this pulled in" path.
//! - [`dep_list`] — the resolver itself.
//! - [`format`] — pretty-printing, flattening, tree-folding helpers.
//! - [`error`] — the closed `CoreError` set every fallible operation returns.

pub mod atom;
pub mod condition_tracker;
pub mod database;
pub mod dep_list;
pub mod eapi;
pub mod error;
pub mod format;
pub mod name;
pub mod package_id;
pub mod parser;
pub mod spec_tree;
pub mod use_req;
pub mod version;

pub use atom::{parse_atom, PackageDepSpec, SlotRestriction};
pub use dep_list::{resolve, CancellationToken, DepList, DepListConfig, Plan, PlanEntry};
pub use error::CoreError;
pub use package_id::{PackageId, PackageIdentity, RawMetadata, StoredPackageId};
pub use spec_tree::{SpecNode, SpecTree, TreeKind};
pub use version::VersionSpec;
