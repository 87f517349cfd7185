//! Candidate branch spans from a syntax tree.
//!
//! Every short-circuit operand and every conditional-expression arm is a
//! candidate. Only *leaf* candidates (those that do not strictly contain
//! another candidate of the same file) are handed out, so nested branches
//! surface their innermost sub-expressions.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{CoverageError, Result};
use crate::runtime::ast::{self, BoolOpKind, Expr, ExprKind, Visitor};
use crate::runtime::parser::parse_module;
use crate::source::SourceFile;
use crate::span::Span;

/// File name used when extracting from source text with no backing file.
pub const UNKNOWN_FILE: &str = "<unknown>";

/// Why a span is a branch candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    /// Operand `index` of a short-circuit chain.
    BoolOperand { op: BoolOpKind, index: usize },

    /// Value taken when a conditional expression's test holds.
    IfBody,

    /// Value taken when a conditional expression's test fails.
    IfElse,
}

/// The syntax node a candidate span denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchNode {
    pub kind: BranchKind,

    /// Span of the enclosing boolean or conditional expression.
    pub parent: Span,
}

/// Candidate spans of one source unit, in insertion order.
#[derive(Debug, Default, Clone)]
pub struct CandidateBranchSet {
    order: Vec<Span>,
    nodes: HashMap<Span, BranchNode>,
}

impl CandidateBranchSet {
    /// Register `span`. Re-registering a span keeps its original position
    /// and records the latest node.
    pub fn insert(&mut self, span: Span, node: BranchNode) {
        assert!(!span.is_empty(), "zero-width branch candidate {span:?}");

        if self.nodes.insert(span, node).is_none() {
            self.order.push(span);
        }
    }

    pub fn get(&self, span: &Span) -> Option<&BranchNode> {
        self.nodes.get(span)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// True if no other candidate lies strictly inside `span`.
    pub fn is_leaf(&self, span: &Span) -> bool {
        !self.order.iter().any(|other| span.contains(other))
    }

    /// Lazily yield the leaf candidates in insertion order.
    pub fn into_leaves(self) -> BranchSpans {
        BranchSpans {
            set: self,
            next: 0,
        }
    }
}

/// Lazy sequence of leaf candidate spans.
///
/// Consumed once; extract again (or collect) to iterate a second time.
#[derive(Debug)]
pub struct BranchSpans {
    set: CandidateBranchSet,
    next: usize,
}

impl BranchSpans {
    /// The full candidate set, leaves and suppressed spans alike.
    pub fn candidates(&self) -> &CandidateBranchSet {
        &self.set
    }
}

impl Iterator for BranchSpans {
    type Item = Span;

    fn next(&mut self) -> Option<Span> {
        while let Some(span) = self.set.order.get(self.next).copied() {
            self.next += 1;
            if self.set.is_leaf(&span) {
                return Some(span);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.set.order.len() - self.next))
    }
}

#[derive(Default)]
struct BranchVisitor {
    set: CandidateBranchSet,
}

impl Visitor for BranchVisitor {
    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            // chains are checked two operands at a time; later operands
            // are not isolated
            ExprKind::BoolOp { op, values } => {
                for (index, operand) in values.iter().take(2).enumerate() {
                    self.set.insert(
                        operand.span,
                        BranchNode {
                            kind: BranchKind::BoolOperand { op: *op, index },
                            parent: expr.span,
                        },
                    );
                }
            }
            ExprKind::IfExp { body, orelse, .. } => {
                let arms = [(body, BranchKind::IfBody), (orelse, BranchKind::IfElse)];
                for (arm, kind) in arms {
                    self.set.insert(
                        arm.span,
                        BranchNode {
                            kind,
                            parent: expr.span,
                        },
                    );
                }
            }
            _ => {}
        }
        ast::walk_expr(self, expr);
    }
}

/// Extract the leaf branch spans of `source`.
///
/// `file_name` only labels syntax errors.
pub fn parse_source(source: &str, file_name: &str) -> Result<BranchSpans> {
    let module = parse_module(source).map_err(|err| CoverageError::Syntax {
        file: file_name.to_string(),
        message: err.to_string(),
    })?;

    let mut visitor = BranchVisitor::default();
    ast::walk_module(&mut visitor, &module);
    Ok(visitor.set.into_leaves())
}

/// Load `path` as UTF-8 text and extract its leaf branch spans.
pub fn parse_file(path: &Path) -> Result<BranchSpans> {
    let source = SourceFile::new(path).read_to_string()?;
    parse_source(&source, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Pos;

    fn span(sl: u32, sc: u32, el: u32, ec: u32) -> Span {
        Span::new(Pos::new(sl, sc), Pos::new(el, ec))
    }

    fn leaves(source: &str) -> Vec<Span> {
        parse_source(source, UNKNOWN_FILE).unwrap().collect()
    }

    #[test]
    fn conditional_yields_both_arms() {
        assert_eq!(
            leaves("a if test else b"),
            vec![span(1, 0, 1, 1), span(1, 15, 1, 16)]
        );
    }

    #[test]
    fn nested_conditional_yields_innermost_arms() {
        assert_eq!(
            leaves("a if test else (b if test2 else c)"),
            vec![span(1, 0, 1, 1), span(1, 16, 1, 17), span(1, 32, 1, 33)]
        );
    }

    #[test]
    #[should_panic(expected = "zero-width branch candidate")]
    fn zero_width_candidates_are_rejected() {
        let mut set = CandidateBranchSet::default();
        set.insert(
            span(1, 3, 1, 3),
            BranchNode {
                kind: BranchKind::IfBody,
                parent: span(1, 0, 1, 9),
            },
        );
    }

    #[test]
    fn boolean_chains_register_first_two_operands() {
        assert_eq!(
            leaves("x = a or b or c\n"),
            vec![span(1, 4, 1, 5), span(1, 9, 1, 10)]
        );
    }

    #[test]
    fn mixed_chain_suppresses_the_outer_operand() {
        // `(p and q) or r`: the `and` node is operand 0 of the `or` and is
        // registered before its own operands
        let spans = leaves("p and q or r\n");
        assert_eq!(
            spans,
            vec![span(1, 11, 1, 12), span(1, 0, 1, 1), span(1, 6, 1, 7)]
        );
    }

    #[test]
    fn walks_into_function_bodies() {
        let source = "\
def pick(flag):
    return 'yes' if flag else 'no'
";
        assert_eq!(
            leaves(source),
            vec![span(2, 11, 2, 16), span(2, 30, 2, 34)]
        );
    }

    #[test]
    fn no_leaf_contains_another_candidate() {
        let source = "\
def f(a, b, c):
    x = (a and (b or c)) if a else (c if b else a or b)
    while a or (b and not c):
        x = f(a, b, c) or x
    return x
";
        let spans = parse_source(source, UNKNOWN_FILE).unwrap();
        let candidates = spans.candidates().clone();
        let leaves: Vec<_> = spans.collect();

        assert!(!leaves.is_empty());
        assert!(leaves.len() < candidates.len());
        for leaf in &leaves {
            assert!(!leaf.is_empty());
            assert!(candidates.is_leaf(leaf));
            assert!(candidates.get(leaf).is_some());
        }
    }

    #[test]
    fn leaves_are_reported_with_their_node() {
        let spans = parse_source("v = a if t else b\n", UNKNOWN_FILE).unwrap();
        let node = spans.candidates().get(&span(1, 4, 1, 5)).copied();
        assert_eq!(
            node,
            Some(BranchNode {
                kind: BranchKind::IfBody,
                parent: span(1, 4, 1, 17),
            })
        );
    }

    #[test]
    fn syntax_errors_name_the_file() {
        let err = parse_source("x = (1 +\n", "broken.py").unwrap_err();
        match err {
            CoverageError::Syntax { file, .. } => assert_eq!(file, "broken.py"),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn deeply_nested_groups_are_syntax_errors() {
        let source = format!("x = {}1{}\n", "(".repeat(1000), ")".repeat(1000));
        let err = parse_source(&source, "deep.py").unwrap_err();
        assert!(matches!(err, CoverageError::Syntax { .. }), "{err:?}");
        assert!(err.is_per_file());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_file(&dir.path().join("absent.py")).unwrap_err();
        assert!(matches!(err, CoverageError::SourceRead { .. }));
    }

    #[test]
    fn parse_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.py");
        std::fs::write(&path, "y = 1 and 2\n").unwrap();

        let spans: Vec<_> = parse_file(&path).unwrap().collect();
        assert_eq!(spans, vec![span(1, 4, 1, 5), span(1, 10, 1, 11)]);
    }
}
