//! The tokeniser + recursive-descent spec-tree builder (spec.md §4.B–C).
//!
//! Single pass over whitespace-separated tokens, parameterised by a tree
//! kind and an [`EapiOptions`] record. `EapiOptions` is consulted at
//! every legality check; no rule is re-derived from the EAPI id.

use crate::atom::parse_atom;
use crate::eapi::EapiOptions;
use crate::error::CoreError;
use crate::name::{SetName, UseFlagName};
use crate::spec_tree::{SpecNode, SpecTree, TreeKind};

fn err(text: &str, token_index: usize, reason: impl Into<String>) -> CoreError {
    CoreError::SpecParse {
        text: text.to_string(),
        where_: crate::error::LineCol {
            line: 1,
            col: token_index + 1,
        },
        reason: reason.into(),
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<&'a str>,
    pos: usize,
    kind: TreeKind,
    eapi: &'a EapiOptions,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<&'a str> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, lit: &str) -> Result<(), CoreError> {
        match self.bump() {
            Some(t) if t == lit => Ok(()),
            Some(t) => Err(err(self.source, self.pos - 1, format!("expected {lit:?}, found {t:?}"))),
            None => Err(err(self.source, self.pos, format!("expected {lit:?}, found end of input"))),
        }
    }

    fn eapi_gate(&self, construct: &str, allowed: bool) -> Result<(), CoreError> {
        if allowed {
            return Ok(());
        }
        if self.eapi.strict_parsing {
            Err(CoreError::EapiViolation {
                construct: construct.to_string(),
                eapi: self.eapi.id.clone(),
            })
        } else {
            tracing::warn!(construct, eapi = %self.eapi.id, "construct not permitted under this EAPI, keeping as-is");
            Ok(())
        }
    }

    /// `Term*`, stopping at `)` or end of input.
    fn parse_sequence(&mut self) -> Result<Vec<SpecNode>, CoreError> {
        let mut children = Vec::new();
        while let Some(t) = self.peek() {
            if t == ")" {
                break;
            }
            children.push(self.parse_term()?);
        }
        Ok(children)
    }

    fn parse_term(&mut self) -> Result<SpecNode, CoreError> {
        let tok = self.peek().expect("parse_term called at end of input");

        if tok == "(" {
            self.bump();
            let children = self.parse_sequence()?;
            self.expect(")")?;
            return Ok(SpecNode::AllOf(children));
        }

        if tok == "||" {
            // Tree-kind legality of `AnyOf` (Dependency, License only) is a
            // grammar invariant, not an EAPI permission; it is enforced by
            // `SpecTree::new` once the whole tree is built, not here.
            self.bump();
            self.expect("(")?;
            let mut children = self.parse_sequence()?;
            self.expect(")")?;
            flatten_any_of(&mut children);
            return Ok(SpecNode::AnyOf(children));
        }

        if is_conditional(tok) {
            let (negated, flag_text) = strip_conditional(tok);
            let flag = UseFlagName::new(flag_text).map_err(|_| err(self.source, self.pos, "invalid USE flag name"))?;
            self.bump();
            self.expect("(")?;
            let children = self.parse_sequence()?;
            if children.is_empty() {
                tracing::warn!(flag = flag_text, "empty use-conditional body");
            }
            self.expect(")")?;
            return Ok(SpecNode::UseConditional { flag, negated, children });
        }

        match self.kind {
            TreeKind::Dependency => self.parse_dependency_term(tok),
            TreeKind::License => {
                self.bump();
                Ok(SpecNode::License(tok.to_string()))
            }
            TreeKind::FetchableUri => self.parse_fetchable_uri_term(tok),
            TreeKind::SimpleUri => {
                self.bump();
                Ok(SpecNode::PlainUri(tok.to_string()))
            }
            TreeKind::RestrictOrProvide => {
                self.bump();
                Ok(SpecNode::Text(tok.to_string()))
            }
        }
    }

    fn parse_dependency_term(&mut self, tok: &'a str) -> Result<SpecNode, CoreError> {
        if let Some(rest) = tok.strip_prefix("!!") {
            self.eapi_gate("!!", self.eapi.allow_strong_blocks)?;
            self.bump();
            let atom = parse_atom(rest)?;
            return Ok(SpecNode::Block { strong: true, atom });
        }
        if let Some(rest) = tok.strip_prefix('!') {
            self.bump();
            let atom = parse_atom(rest)?;
            return Ok(SpecNode::Block { strong: false, atom });
        }
        if let Some(rest) = tok.strip_prefix('@') {
            self.bump();
            let name = SetName::new(rest).map_err(|_| err(self.source, self.pos - 1, "invalid set name"))?;
            return Ok(SpecNode::Set(name));
        }
        if is_label(tok) {
            self.eapi_gate("label", self.eapi.allow_labels)?;
            self.bump();
            return Ok(SpecNode::Label(tok[..tok.len() - 1].to_string()));
        }
        self.bump();
        let atom = parse_atom(tok)?;
        if !self.eapi.allow_repo_qualifier && atom.repo.is_some() {
            self.eapi_gate("::repo", false)?;
        }
        if !self.eapi.allow_slot_operator && (atom.slot.any_slot || atom.slot.rebuild) {
            self.eapi_gate(":=/:*", false)?;
        }
        Ok(SpecNode::Package(atom))
    }

    fn parse_fetchable_uri_term(&mut self, tok: &'a str) -> Result<SpecNode, CoreError> {
        self.bump();
        if self.peek() == Some("->") {
            self.bump();
            let rename = self
                .bump()
                .ok_or_else(|| err(self.source, self.pos, "expected filename after '->'"))?;
            return Ok(SpecNode::Uri {
                uri: tok.to_string(),
                rename: Some(rename.to_string()),
            });
        }
        Ok(SpecNode::Uri {
            uri: tok.to_string(),
            rename: None,
        })
    }
}

fn is_conditional(tok: &str) -> bool {
    let body = tok.strip_prefix('!').unwrap_or(tok);
    body.len() > 1 && body.ends_with('?') && !body.contains(':')
}

fn strip_conditional(tok: &str) -> (bool, &str) {
    let (negated, body) = match tok.strip_prefix('!') {
        Some(b) => (true, b),
        None => (false, tok),
    };
    (negated, &body[..body.len() - 1])
}

/// A bare identifier followed by `:` and nothing else (`build:`, not a
/// slot-qualified atom, which never appears as a standalone token).
fn is_label(tok: &str) -> bool {
    tok.len() > 1
        && tok.ends_with(':')
        && tok[..tok.len() - 1]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn flatten_any_of(children: &mut Vec<SpecNode>) {
    let mut flat = Vec::with_capacity(children.len());
    for child in children.drain(..) {
        match child {
            SpecNode::AnyOf(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    *children = flat;
}

/// Parse `text` as a dep-spec tree of the given `kind` under `eapi`.
pub fn parse_tree(text: &str, kind: TreeKind, eapi: &EapiOptions) -> Result<SpecTree, CoreError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut parser = Parser {
        source: text,
        tokens,
        pos: 0,
        kind,
        eapi,
    };
    let children = parser.parse_sequence()?;
    if let Some(extra) = parser.peek() {
        return Err(err(text, parser.pos, format!("unexpected {extra:?}")));
    }
    SpecTree::new(kind, SpecNode::AllOf(children))
}
