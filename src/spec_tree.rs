//! The dep-spec AST (spec.md §3 "Spec-tree AST").
//!
//! Five tree kinds share one node shape but admit different leaves and
//! different structural invariants, enforced at construction time rather
//! than by separate Rust types per kind — matching how the teacher's
//! `pool.rs` interns one arena of nodes behind several typed indices
//! rather than five parallel tree hierarchies.

use std::fmt;

use crate::atom::PackageDepSpec;
use crate::error::CoreError;
use crate::name::{SetName, UseFlagName};

/// Which of the five dep-spec grammars a [`SpecTree`] was parsed under.
/// Determines which [`SpecNode`] leaf variants are legal — enforced by
/// [`SpecTree::new`], not by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeKind {
    /// `DEPEND`/`RDEPEND`/etc: package atoms, blocks, use-conditionals,
    /// any-of and all-of groups, labels.
    Dependency,
    /// `LICENSE`: license leaves, use-conditionals, any-of/all-of groups.
    License,
    /// `SRC_URI`: fetchable URIs (`uri -> rename`), use-conditionals,
    /// all-of groups. No any-of, no blocks.
    FetchableUri,
    /// `HOMEPAGE`: plain URIs, use-conditionals, all-of groups.
    SimpleUri,
    /// `RESTRICT`/`PROPERTIES`: text tokens, use-conditionals, all-of
    /// groups.
    RestrictOrProvide,
}

/// One node of a dep-spec tree. The active leaf variants are constrained
/// by the tree's [`TreeKind`]; see [`SpecTree::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecNode {
    /// `( ... )` — all children apply unconditionally.
    AllOf(Vec<SpecNode>),
    /// `|| ( ... )` — at least one child must be satisfied. Legal only in
    /// [`TreeKind::Dependency`] and [`TreeKind::License`].
    AnyOf(Vec<SpecNode>),
    /// `flag? ( ... )` / `!flag? ( ... )` — children apply only when the
    /// requesting package's flag state matches.
    UseConditional {
        /// The flag being tested.
        flag: UseFlagName,
        /// `true` for `!flag? ( ... )`.
        negated: bool,
        /// The guarded subtree.
        children: Vec<SpecNode>,
    },
    /// A package atom leaf. Legal only in [`TreeKind::Dependency`].
    Package(PackageDepSpec),
    /// A named set reference (`@system`). Legal only in
    /// [`TreeKind::Dependency`].
    Set(SetName),
    /// `!atom` / `!!atom` — a blocker leaf wrapping a package atom. Legal
    /// only in [`TreeKind::Dependency`]. The wrapped atom never itself
    /// carries a block prefix.
    Block {
        /// `true` for `!!atom` (strong block).
        strong: bool,
        /// The blocked atom.
        atom: PackageDepSpec,
    },
    /// A dependency-class label (`build:`, `run:`, ...). Legal only in
    /// [`TreeKind::Dependency`] when the active EAPI permits labels.
    Label(String),
    /// A license leaf. Legal only in [`TreeKind::License`].
    License(String),
    /// `uri -> rename` or bare `uri`. Legal only in
    /// [`TreeKind::FetchableUri`].
    Uri {
        /// The source URI.
        uri: String,
        /// The local filename, when renamed with `->`.
        rename: Option<String>,
    },
    /// A bare URI. Legal only in [`TreeKind::SimpleUri`].
    PlainUri(String),
    /// A bare text token. Legal only in [`TreeKind::RestrictOrProvide`].
    Text(String),
}

impl SpecNode {
    fn check_kind(&self, kind: TreeKind, path: &str) -> Result<(), CoreError> {
        let ok = match (self, kind) {
            (SpecNode::AllOf(_), _) => true,
            (SpecNode::UseConditional { .. }, _) => true,
            (SpecNode::AnyOf(_), TreeKind::Dependency | TreeKind::License) => true,
            (SpecNode::Package(_) | SpecNode::Set(_) | SpecNode::Block { .. } | SpecNode::Label(_), TreeKind::Dependency) => true,
            (SpecNode::License(_), TreeKind::License) => true,
            (SpecNode::Uri { .. }, TreeKind::FetchableUri) => true,
            (SpecNode::PlainUri(_), TreeKind::SimpleUri) => true,
            (SpecNode::Text(_), TreeKind::RestrictOrProvide) => true,
            _ => false,
        };
        if !ok {
            return Err(CoreError::Configuration {
                message: format!("node at {path} is not legal in a {kind:?} tree"),
            });
        }
        if let Some(children) = self.children() {
            for (i, child) in children.iter().enumerate() {
                child.check_kind(kind, &format!("{path}/{i}"))?;
            }
        }
        Ok(())
    }

    /// The node's children, for node kinds that have any.
    pub fn children(&self) -> Option<&[SpecNode]> {
        match self {
            SpecNode::AllOf(c) | SpecNode::AnyOf(c) | SpecNode::UseConditional { children: c, .. } => Some(c),
            _ => None,
        }
    }
}

/// A validated dep-spec tree: a root [`SpecNode`] together with the
/// [`TreeKind`] every descendant has been checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecTree {
    kind: TreeKind,
    root: SpecNode,
}

impl SpecTree {
    /// Wrap `root`, checking every descendant against `kind`'s legal leaf
    /// set. This is the sole place tree-kind invariants are enforced.
    pub fn new(kind: TreeKind, root: SpecNode) -> Result<Self, CoreError> {
        root.check_kind(kind, "root")?;
        Ok(Self { kind, root })
    }

    /// Which grammar this tree was parsed under.
    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    /// The root node.
    pub fn root(&self) -> &SpecNode {
        &self.root
    }
}

impl fmt::Display for SpecTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_node(&self.root, f, true)
    }
}

fn write_node(node: &SpecNode, f: &mut fmt::Formatter<'_>, top: bool) -> fmt::Result {
    match node {
        SpecNode::AllOf(children) => write_group(None, children, f, top),
        SpecNode::AnyOf(children) => write_group(Some("||"), children, f, top),
        SpecNode::UseConditional { flag, negated, children } => {
            if *negated {
                write!(f, "!")?;
            }
            write!(f, "{flag}? ")?;
            write_group(None, children, f, false)
        }
        SpecNode::Package(atom) => write!(f, "{atom}"),
        SpecNode::Set(name) => write!(f, "{name}"),
        SpecNode::Block { strong, atom } => {
            write!(f, "{}{atom}", if *strong { "!!" } else { "!" })
        }
        SpecNode::Label(label) => write!(f, "{label}:"),
        SpecNode::License(text) | SpecNode::PlainUri(text) | SpecNode::Text(text) => {
            write!(f, "{text}")
        }
        SpecNode::Uri { uri, rename } => match rename {
            Some(r) => write!(f, "{uri} -> {r}"),
            None => write!(f, "{uri}"),
        },
    }
}

fn write_group(prefix: Option<&str>, children: &[SpecNode], f: &mut fmt::Formatter<'_>, top: bool) -> fmt::Result {
    if let Some(p) = prefix {
        write!(f, "{p} ")?;
    }
    if top && prefix.is_none() {
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write_node(child, f, true)?;
        }
        return Ok(());
    }
    write!(f, "(")?;
    for child in children {
        write!(f, " ")?;
        write_node(child, f, false)?;
    }
    write!(f, " )")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::parse_atom;

    #[test]
    fn all_of_in_dependency_tree_is_legal() {
        let root = SpecNode::AllOf(vec![SpecNode::Package(parse_atom("dev-lang/rust").unwrap())]);
        assert!(SpecTree::new(TreeKind::Dependency, root).is_ok());
    }

    #[test]
    fn any_of_rejected_outside_dependency_and_license() {
        let root = SpecNode::AnyOf(vec![SpecNode::Text("nostrip".into())]);
        assert!(SpecTree::new(TreeKind::RestrictOrProvide, root).is_err());
    }

    #[test]
    fn package_leaf_rejected_in_license_tree() {
        let root = SpecNode::Package(parse_atom("dev-lang/rust").unwrap());
        assert!(SpecTree::new(TreeKind::License, root).is_err());
    }

    #[test]
    fn nested_use_conditional_checked_recursively() {
        let bad_inner = SpecNode::Package(parse_atom("dev-lang/rust").unwrap());
        let root = SpecNode::UseConditional {
            flag: UseFlagName::new("ssl").unwrap(),
            negated: false,
            children: vec![bad_inner],
        };
        assert!(SpecTree::new(TreeKind::License, root).is_err());
    }

    #[test]
    fn display_renders_any_of_group() {
        let root = SpecNode::AnyOf(vec![
            SpecNode::Package(parse_atom("dev-lang/rust").unwrap()),
            SpecNode::Package(parse_atom("dev-lang/go").unwrap()),
        ]);
        let tree = SpecTree::new(TreeKind::Dependency, root).unwrap();
        assert_eq!(tree.to_string(), "|| ( dev-lang/rust dev-lang/go )");
    }

    #[test]
    fn block_formats_with_prefix() {
        let atom = parse_atom("dev-lang/rust").unwrap();
        let node = SpecNode::Block { strong: true, atom };
        let tree = SpecTree::new(TreeKind::Dependency, node).unwrap();
        assert_eq!(tree.to_string(), "!!dev-lang/rust");
    }
}
