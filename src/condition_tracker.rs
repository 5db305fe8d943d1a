//! Reconstructs the conditional path under which a plan entry was pulled
//! in (spec.md §4.H), grounded on `paludis/dep_list/condition_tracker.hh`
//! (`examples/original_source/`): an append-only, shareable path rather
//! than a mutable visitor, so many pending queue items can branch off
//! the same prefix without copying it.

use std::fmt;
use std::rc::Rc;

use crate::name::UseFlagName;

/// One step of a conditional path: either a `UseConditional` guard or the
/// arm chosen inside an `AnyOf` group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionFrame {
    /// Traversed `flag? ( ... )` or `!flag? ( ... )`.
    UseConditional {
        /// The guarding flag.
        flag: UseFlagName,
        /// `true` for `!flag?`.
        negated: bool,
    },
    /// Traversed into arm `chosen_index` of an `|| ( ... )` group.
    AnyOf {
        /// Index of the selected arm within the group.
        chosen_index: usize,
    },
}

impl fmt::Display for ConditionFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionFrame::UseConditional { flag, negated } => {
                if *negated {
                    write!(f, "!{flag}?")
                } else {
                    write!(f, "{flag}?")
                }
            }
            ConditionFrame::AnyOf { chosen_index } => write!(f, "||(arm {chosen_index})"),
        }
    }
}

#[derive(Debug)]
enum Node {
    Root,
    Cons(Rc<Node>, ConditionFrame),
}

/// An immutable, cheaply-cloneable path of [`ConditionFrame`]s from the
/// resolve root to one enqueued item. Pushing never mutates the
/// receiver, so siblings in the pending queue can share a prefix.
#[derive(Debug, Clone)]
pub struct ConditionPath(Rc<Node>);

impl Default for ConditionPath {
    fn default() -> Self {
        Self::root()
    }
}

impl ConditionPath {
    /// The empty path (a target atom seeded directly, with no why-path).
    pub fn root() -> Self {
        Self(Rc::new(Node::Root))
    }

    /// Extend this path with one more frame, returning a new path. The
    /// receiver is left unchanged — other holders of it still see the
    /// shorter prefix.
    pub fn push(&self, frame: ConditionFrame) -> Self {
        Self(Rc::new(Node::Cons(self.0.clone(), frame)))
    }

    /// The frames in traversal order, root first.
    pub fn frames(&self) -> Vec<ConditionFrame> {
        let mut out = Vec::new();
        let mut cur = &self.0;
        loop {
            match cur.as_ref() {
                Node::Root => break,
                Node::Cons(parent, frame) => {
                    out.push(frame.clone());
                    cur = parent;
                }
            }
        }
        out.reverse();
        out
    }

    /// `true` for the root path (a directly-seeded target).
    pub fn is_root(&self) -> bool {
        matches!(*self.0, Node::Root)
    }
}

impl fmt::Display for ConditionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frames = self.frames();
        for (i, frame) in frames.iter().enumerate() {
            if i > 0 {
                write!(f, " \u{2192} ")?;
            }
            write!(f, "{frame}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_is_empty() {
        let p = ConditionPath::root();
        assert!(p.is_root());
        assert_eq!(p.frames().len(), 0);
        assert_eq!(p.to_string(), "");
    }

    #[test]
    fn pushing_does_not_mutate_receiver() {
        let root = ConditionPath::root();
        let child = root.push(ConditionFrame::AnyOf { chosen_index: 1 });
        assert!(root.is_root());
        assert_eq!(child.frames().len(), 1);
    }

    #[test]
    fn siblings_share_a_prefix() {
        let base = ConditionPath::root().push(ConditionFrame::UseConditional {
            flag: UseFlagName::new("bar").unwrap(),
            negated: false,
        });
        let a = base.push(ConditionFrame::AnyOf { chosen_index: 0 });
        let b = base.push(ConditionFrame::AnyOf { chosen_index: 1 });
        assert_eq!(a.frames().len(), 2);
        assert_eq!(b.frames().len(), 2);
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn display_matches_why_pulled_in_shape() {
        let path = ConditionPath::root()
            .push(ConditionFrame::UseConditional {
                flag: UseFlagName::new("bar").unwrap(),
                negated: false,
            })
            .push(ConditionFrame::AnyOf { chosen_index: 0 });
        assert_eq!(path.to_string(), "bar? \u{2192} ||(arm 0)");
    }
}
