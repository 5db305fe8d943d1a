//! Pretty-printing, flattening and tree-folding helpers (spec.md §2
//! component I) — distinct from the structural `Display` impls already on
//! [`crate::spec_tree::SpecTree`], [`crate::atom::PackageDepSpec`] and
//! [`crate::use_req::UseRequirement`], which round-trip a single node back
//! to its textual grammar. This module instead renders whole [`Plan`]s for
//! a human, and folds a tree down to a flat summary rather than back to
//! itself.
//!
//! Grounded on the teacher's `provider.rs` `Display*` wrapper pattern
//! (`DisplaySolvable`, `DisplayName`): a zero-cost struct borrowing the
//! context it needs, with the actual rendering in its `Display` impl,
//! rather than a `to_string()` method hung directly off the domain type.

use std::fmt;

use crate::dep_list::{Action, Plan, PlanEntry};
use crate::spec_tree::SpecNode;

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Install => write!(f, "N"),
            Action::Reinstall => write!(f, "R"),
            Action::UpgradeFrom(from) => write!(f, "U {from}"),
            Action::DowngradeFrom(from) => write!(f, "D {from}"),
            Action::SkipExisting => write!(f, "S"),
            Action::SuggestedSkipped => write!(f, "s"),
        }
    }
}

/// Renders one [`PlanEntry`] as `[tag] category/package-version:slot::repo`,
/// the one-line-per-package shape of a resolver's `--pretend` output.
pub struct DisplayEntry<'a>(pub &'a PlanEntry);

impl fmt::Display for DisplayEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identity = self.0.id.identity();
        write!(
            f,
            "[{}] {}-{}:{}::{}",
            self.0.action, identity.name, identity.version, identity.slot, identity.repository
        )
    }
}

/// Renders a full [`Plan`], one entry per line, indented by how deeply
/// nested the entry's conditional path is — a flattened group nests one
/// level, an any-of arm inside it two, and so on — then the recorded
/// blocks.
pub struct DisplayPlan<'a>(pub &'a Plan);

impl fmt::Display for DisplayPlan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.aborted {
            writeln!(f, "(aborted)")?;
        }
        for entry in &self.0.entries {
            let depth = entry.path.frames().len();
            writeln!(f, "{}{}", "  ".repeat(depth), DisplayEntry(entry))?;
        }
        for block in &self.0.blocks {
            writeln!(f, "{}{}", if block.strong { "!!" } else { "!" }, block.atom)?;
        }
        Ok(())
    }
}

/// A one-line "why" string for an entry (spec.md §4.H): the root target
/// reads as itself; anything pulled in through a conditional path reads
/// as `name pulled in via <path>`, matching §4.H's own worked example
/// (`A pulled in via foo[bar?] -> ||(x y) -> z`).
pub fn explain_entry(entry: &PlanEntry) -> String {
    let name = &entry.id.identity().name;
    if entry.path.is_root() {
        format!("{name} is a target")
    } else {
        format!("{name} pulled in via {}", entry.path)
    }
}

/// Folds `node` bottom-up: `leaf` converts a childless node to `T`,
/// `combine` reduces a node together with its already-folded children.
/// The generic visitor [`crate::spec_tree::SpecTree`]'s own `check_kind`
/// and `Display` impls each hand-roll in their own shape; this gives
/// callers one to reuse instead of writing a fifth.
pub fn fold<T>(node: &SpecNode, leaf: &dyn Fn(&SpecNode) -> T, combine: &dyn Fn(&SpecNode, Vec<T>) -> T) -> T {
    match node.children() {
        Some(children) => {
            let folded = children.iter().map(|c| fold(c, leaf, combine)).collect();
            combine(node, folded)
        }
        None => leaf(node),
    }
}

/// Total leaf count of a tree (groups themselves don't count).
pub fn leaf_count(node: &SpecNode) -> usize {
    fold(node, &|_| 1, &|_, children| children.iter().sum())
}

/// Maximum group-nesting depth of a tree (a bare leaf at the root is 0).
pub fn max_depth(node: &SpecNode) -> usize {
    fold(node, &|_| 0, &|_, children| 1 + children.into_iter().max().unwrap_or(0))
}

/// Flattens `node` to the textual form of every leaf reachable under
/// `flag_enabled`'s USE opinion, in traversal order, discarding all group
/// structure (`AllOf`/`AnyOf` boundaries, which arm was which). Useful for
/// "list every package/license/URI this tree could ever mention" views
/// where [`crate::spec_tree::SpecTree`]'s `Display` (which preserves and
/// reparses as the original grouped text) would be the wrong shape.
pub fn flatten_leaves(node: &SpecNode, flag_enabled: &dyn Fn(&str) -> bool) -> Vec<String> {
    let mut out = Vec::new();
    flatten_into(node, flag_enabled, &mut out);
    out
}

fn flatten_into(node: &SpecNode, flag_enabled: &dyn Fn(&str) -> bool, out: &mut Vec<String>) {
    match node {
        SpecNode::AllOf(children) | SpecNode::AnyOf(children) => {
            for child in children {
                flatten_into(child, flag_enabled, out);
            }
        }
        SpecNode::UseConditional { flag, negated, children } => {
            if *negated != flag_enabled(flag.as_str()) {
                for child in children {
                    flatten_into(child, flag_enabled, out);
                }
            }
        }
        SpecNode::Package(atom) => out.push(atom.to_string()),
        SpecNode::Block { strong, atom } => out.push(format!("{}{atom}", if *strong { "!!" } else { "!" })),
        SpecNode::Set(name) => out.push(format!("@{name}")),
        SpecNode::Label(label) => out.push(format!("{label}:")),
        SpecNode::License(text) | SpecNode::PlainUri(text) | SpecNode::Text(text) => out.push(text.clone()),
        SpecNode::Uri { uri, rename } => out.push(match rename {
            Some(r) => format!("{uri} -> {r}"),
            None => uri.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::parse_atom;
    use crate::condition_tracker::{ConditionFrame, ConditionPath};
    use crate::dep_list::{BlockRecord, Phase};
    use crate::eapi::EapiOptions;
    use crate::name::{KeywordName, QualifiedPackageName, RepositoryName, SlotName, UseFlagName};
    use crate::package_id::{PackageId, PackageIdentity, RawMetadata, StoredPackageId};
    use crate::spec_tree::TreeKind;
    use crate::version::VersionSpec;
    use std::rc::Rc;

    fn id(name: &str) -> Rc<dyn PackageId> {
        Rc::new(StoredPackageId::new(RawMetadata {
            identity: PackageIdentity {
                name: QualifiedPackageName::parse(name).unwrap(),
                version: VersionSpec::parse("1").unwrap(),
                slot: SlotName::new("0").unwrap(),
                repository: RepositoryName::new("gentoo").unwrap(),
            },
            eapi: EapiOptions::eapi7(),
            iuse: Vec::new(),
            enabled: Vec::new(),
            keywords: vec![KeywordName::new("amd64").unwrap()],
            mask_reason: None,
            depend: String::new(),
            rdepend: String::new(),
            pdepend: String::new(),
            sdepend: String::new(),
            license: String::new(),
            src_uri: String::new(),
            provide: String::new(),
        }))
    }

    fn entry(name: &str, path: ConditionPath, action: Action) -> PlanEntry {
        PlanEntry {
            id: id(name),
            atom: parse_atom(name).unwrap(),
            path,
            phase: Phase::Build,
            action,
        }
    }

    #[test]
    fn display_entry_shows_tag_and_identity() {
        let e = entry("a/x", ConditionPath::root(), Action::Install);
        assert_eq!(DisplayEntry(&e).to_string(), "[N] a/x-1:0::gentoo");
    }

    #[test]
    fn display_plan_indents_by_condition_path_depth() {
        let nested = ConditionPath::root().push(ConditionFrame::AnyOf { chosen_index: 0 });
        let plan = Plan {
            entries: vec![
                entry("a/x", ConditionPath::root(), Action::Install),
                entry("a/y", nested, Action::Install),
            ],
            blocks: Vec::new(),
            aborted: false,
        };
        let rendered = DisplayPlan(&plan).to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "[N] a/x-1:0::gentoo");
        assert_eq!(lines[1], "  [N] a/y-1:0::gentoo");
    }

    #[test]
    fn display_plan_marks_aborted_passes() {
        let plan = Plan {
            entries: Vec::new(),
            blocks: Vec::new(),
            aborted: true,
        };
        assert!(DisplayPlan(&plan).to_string().starts_with("(aborted)"));
    }

    #[test]
    fn display_plan_lists_blocks() {
        let plan = Plan {
            entries: Vec::new(),
            blocks: vec![BlockRecord {
                strong: true,
                atom: parse_atom("a/z").unwrap(),
                path: ConditionPath::root(),
            }],
            aborted: false,
        };
        assert_eq!(DisplayPlan(&plan).to_string(), "!!a/z\n");
    }

    #[test]
    fn explain_entry_names_root_targets_directly() {
        let e = entry("a/x", ConditionPath::root(), Action::Install);
        assert_eq!(explain_entry(&e), "a/x is a target");
    }

    #[test]
    fn explain_entry_follows_conditional_path() {
        let path = ConditionPath::root()
            .push(ConditionFrame::UseConditional {
                flag: UseFlagName::new("bar").unwrap(),
                negated: false,
            })
            .push(ConditionFrame::AnyOf { chosen_index: 0 });
        let e = entry("a/z", path, Action::Install);
        assert_eq!(explain_entry(&e), "a/z pulled in via bar? \u{2192} ||(arm 0)");
    }

    fn dep(text: &str) -> SpecNode {
        crate::parser::parse_tree(text, TreeKind::Dependency, &EapiOptions::eapi7())
            .unwrap()
            .root()
            .clone()
    }

    #[test]
    fn leaf_count_ignores_group_structure() {
        let tree = dep("|| ( a/x a/y ) a/z");
        assert_eq!(leaf_count(&tree), 3);
    }

    #[test]
    fn max_depth_counts_group_nesting() {
        let flat = dep("a/x");
        assert_eq!(max_depth(&flat), 1);
        let nested = dep("foo? ( || ( a/x a/y ) )");
        assert_eq!(max_depth(&nested), 3);
    }

    #[test]
    fn flatten_leaves_drops_group_boundaries() {
        let tree = dep("|| ( a/x a/y ) feat? ( a/z )");
        let leaves = flatten_leaves(&tree, &|_| true);
        assert_eq!(leaves, vec!["a/x".to_string(), "a/y".to_string(), "a/z".to_string()]);
    }

    #[test]
    fn flatten_leaves_respects_use_conditional_predicate() {
        let tree = dep("feat? ( a/z )");
        assert!(flatten_leaves(&tree, &|_| false).is_empty());
        assert_eq!(flatten_leaves(&tree, &|_| true), vec!["a/z".to_string()]);
    }
}
