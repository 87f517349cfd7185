//! Recursive-descent parser producing [`ast::Module`](super::ast::Module).
//!
//! Precedence, loosest first: conditional expression, `or`, `and`, `not`,
//! comparisons, `+ -`, `* / // %`, unary `- +`, `**`, then calls, subscripts
//! and attribute access.

use std::rc::Rc;

use super::ast::{
    BinOpKind, BoolOpKind, CmpOpKind, Expr, ExprKind, FunctionDef, Module, Stmt, StmtKind,
    UnaryOpKind,
};
use super::lexer::{ParseError, ParseResult, Token, TokenKind, tokenize};
use crate::span::{Pos, Span};

/// Deepest nesting of groups, lists, calls, unary operators and blocks the
/// parser accepts before giving up with a syntax error.
const MAX_NESTING: usize = 64;

/// Parse a complete source unit.
pub fn parse_module(source: &str) -> ParseResult<Module> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        depth: 0,
    };

    let mut body = Vec::new();
    while !parser.at(&TokenKind::Eof) {
        body.push(parser.parse_statement()?);
    }

    Ok(Module { body })
}

/// Parse a single expression, e.g. for tests or an evaluation prompt.
pub fn parse_expression(source: &str) -> ParseResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        depth: 0,
    };
    let expr = parser.parse_expr()?;
    parser.eat(&TokenKind::Newline);
    parser.expect(&TokenKind::Eof, "end of expression")?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn current(&self) -> &Token {
        // the lexer always terminates the stream with `Eof`
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn bump(&mut self) -> Token {
        let token = self.current().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.bump())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> ParseResult<Token> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_name(&mut self, what: &str) -> ParseResult<(String, Span)> {
        match &self.current().kind {
            TokenKind::Name(name) => {
                let name = name.clone();
                let span = self.bump().span;
                Ok((name, span))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::new(
                "too many nested expressions or blocks",
                self.current().span.start,
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.current();
        ParseError::new(
            format!("expected {expected}, found {}", token.kind),
            token.span.start,
        )
    }

    // ----- statements -----

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        match self.current().kind {
            TokenKind::Def => self.parse_def(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Indent => Err(ParseError::new(
                "unexpected indent",
                self.current().span.start,
            )),
            _ => {
                let stmt = self.parse_simple_statement()?;
                if !self.at(&TokenKind::Eof) {
                    self.expect(&TokenKind::Newline, "end of line")?;
                }
                Ok(stmt)
            }
        }
    }

    fn parse_simple_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.current().span.start;

        let keyword = match self.current().kind {
            TokenKind::Pass => Some(StmtKind::Pass),
            TokenKind::Break => Some(StmtKind::Break),
            TokenKind::Continue => Some(StmtKind::Continue),
            _ => None,
        };
        if let Some(kind) = keyword {
            let token = self.bump();
            return Ok(Stmt {
                kind,
                span: token.span,
            });
        }

        match self.current().kind {
            TokenKind::Return => {
                let token = self.bump();
                if self.at(&TokenKind::Newline) || self.at(&TokenKind::Eof) {
                    return Ok(Stmt {
                        kind: StmtKind::Return(None),
                        span: token.span,
                    });
                }
                let value = self.parse_expr()?;
                let span = Span::new(start, value.span.end);
                Ok(Stmt {
                    kind: StmtKind::Return(Some(value)),
                    span,
                })
            }
            TokenKind::Import => {
                self.bump();
                let (name, name_span) = self.expect_name("module name")?;
                Ok(Stmt {
                    kind: StmtKind::Import(name),
                    span: Span::new(start, name_span.end),
                })
            }
            TokenKind::Raise => {
                self.bump();
                let value = self.parse_expr()?;
                let span = Span::new(start, value.span.end);
                Ok(Stmt {
                    kind: StmtKind::Raise(value),
                    span,
                })
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.parse_expr()?;
        let start = expr.span.start;

        let aug = match self.current().kind {
            TokenKind::PlusAssign => Some(BinOpKind::Add),
            TokenKind::MinusAssign => Some(BinOpKind::Sub),
            TokenKind::StarAssign => Some(BinOpKind::Mul),
            _ => None,
        };

        if self.at(&TokenKind::Assign) || aug.is_some() {
            let op_token = self.bump();
            let ExprKind::Name(target) = expr.kind else {
                return Err(ParseError::new(
                    "only names can be assigned to",
                    op_token.span.start,
                ));
            };
            let value = self.parse_expr()?;
            let span = Span::new(start, value.span.end);
            let kind = match aug {
                Some(op) => StmtKind::AugAssign { target, op, value },
                None => StmtKind::Assign { target, value },
            };
            return Ok(Stmt { kind, span });
        }

        let span = expr.span;
        Ok(Stmt {
            kind: StmtKind::Expr(expr),
            span,
        })
    }

    fn parse_def(&mut self) -> ParseResult<Stmt> {
        let start = self.bump().span.start;
        let (name, _) = self.expect_name("function name")?;
        self.expect(&TokenKind::LParen, "`(` after function name")?;

        let mut params = Vec::new();
        while !self.at(&TokenKind::RParen) {
            let (param, _) = self.expect_name("parameter name")?;
            params.push(param);
            if self.eat(&TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "`)` to close parameter list")?;

        let body = self.parse_suite()?;
        let span = Span::new(start, block_end(&body));
        let def = FunctionDef {
            name,
            params,
            body,
            span,
        };

        Ok(Stmt {
            kind: StmtKind::FunctionDef(Rc::new(def)),
            span,
        })
    }

    /// Parses `if`/`elif` chains; an `elif` becomes a nested `If` in `orelse`.
    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let start = self.bump().span.start;
        let test = self.parse_expr()?;
        let body = self.parse_suite()?;

        let orelse = if self.at(&TokenKind::Elif) {
            vec![self.parse_if()?]
        } else if self.eat(&TokenKind::Else).is_some() {
            self.parse_suite()?
        } else {
            Vec::new()
        };

        let end = if orelse.is_empty() {
            block_end(&body)
        } else {
            block_end(&orelse)
        };

        Ok(Stmt {
            kind: StmtKind::If { test, body, orelse },
            span: Span::new(start, end),
        })
    }

    fn parse_while(&mut self) -> ParseResult<Stmt> {
        let start = self.bump().span.start;
        let test = self.parse_expr()?;
        let body = self.parse_suite()?;
        let span = Span::new(start, block_end(&body));
        Ok(Stmt {
            kind: StmtKind::While { test, body },
            span,
        })
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        let start = self.bump().span.start;
        let (target, _) = self.expect_name("loop variable")?;
        self.expect(&TokenKind::In, "`in`")?;
        let iter = self.parse_expr()?;
        let body = self.parse_suite()?;
        let span = Span::new(start, block_end(&body));
        Ok(Stmt {
            kind: StmtKind::For { target, iter, body },
            span,
        })
    }

    /// `:` followed by an indented block, or by a single simple statement on
    /// the same line.
    fn parse_suite(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(&TokenKind::Colon, "`:`")?;

        if self.eat(&TokenKind::Newline).is_none() {
            let stmt = self.parse_simple_statement()?;
            if !self.at(&TokenKind::Eof) {
                self.expect(&TokenKind::Newline, "end of line")?;
            }
            return Ok(vec![stmt]);
        }

        self.expect(&TokenKind::Indent, "an indented block")?;
        let mut body = Vec::new();
        while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
            body.push(self.nested(Self::parse_statement)?);
        }
        self.eat(&TokenKind::Dedent);

        Ok(body)
    }

    // ----- expressions -----

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.nested(Self::parse_conditional)
    }

    fn parse_conditional(&mut self) -> ParseResult<Expr> {
        let body = self.parse_or()?;
        if self.eat(&TokenKind::If).is_none() {
            return Ok(body);
        }

        let test = self.parse_or()?;
        self.expect(&TokenKind::Else, "`else` in conditional expression")?;
        let orelse = self.parse_expr()?;

        let span = Span::new(body.span.start, orelse.span.end);
        Ok(Expr {
            kind: ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            span,
        })
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        self.parse_bool_chain(TokenKind::Or, BoolOpKind::Or, Self::parse_and)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        self.parse_bool_chain(TokenKind::And, BoolOpKind::And, Self::parse_not)
    }

    fn parse_bool_chain(
        &mut self,
        token: TokenKind,
        op: BoolOpKind,
        operand: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let first = operand(self)?;
        if !self.at(&token) {
            return Ok(first);
        }

        let mut values = vec![first];
        while self.eat(&token).is_some() {
            values.push(operand(self)?);
        }

        let span = Span::new(values[0].span.start, values[values.len() - 1].span.end);
        Ok(Expr {
            kind: ExprKind::BoolOp { op, values },
            span,
        })
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        match self.eat(&TokenKind::Not) {
            Some(token) => {
                let operand = self.nested(Self::parse_not)?;
                Ok(unary(UnaryOpKind::Not, token.span.start, operand))
            }
            None => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let left = self.parse_arith()?;

        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        loop {
            let op = match self.current().kind {
                TokenKind::EqEq => CmpOpKind::Eq,
                TokenKind::NotEq => CmpOpKind::NotEq,
                TokenKind::Lt => CmpOpKind::Lt,
                TokenKind::LtE => CmpOpKind::LtE,
                TokenKind::Gt => CmpOpKind::Gt,
                TokenKind::GtE => CmpOpKind::GtE,
                TokenKind::In => CmpOpKind::In,
                TokenKind::Not => {
                    self.bump();
                    if !self.at(&TokenKind::In) {
                        return Err(self.unexpected("`in` after `not`"));
                    }
                    CmpOpKind::NotIn
                }
                _ => break,
            };
            self.bump();
            ops.push(op);
            comparators.push(self.parse_arith()?);
        }

        if ops.is_empty() {
            return Ok(left);
        }

        let span = Span::new(left.span.start, comparators[comparators.len() - 1].span.end);
        Ok(Expr {
            kind: ExprKind::Compare {
                left: Box::new(left),
                ops,
                comparators,
            },
            span,
        })
    }

    fn parse_arith(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinOpKind::Add,
                TokenKind::Minus => BinOpKind::Sub,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinOpKind::Mul,
                TokenKind::Slash => BinOpKind::Div,
                TokenKind::DoubleSlash => BinOpKind::FloorDiv,
                TokenKind::Percent => BinOpKind::Mod,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.parse_factor()?;
            left = binary(op, left, right);
        }
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        let op = match self.current().kind {
            TokenKind::Minus => UnaryOpKind::Neg,
            TokenKind::Plus => UnaryOpKind::Pos,
            _ => return self.parse_power(),
        };
        let start = self.bump().span.start;
        let operand = self.nested(Self::parse_factor)?;
        Ok(unary(op, start, operand))
    }

    fn parse_power(&mut self) -> ParseResult<Expr> {
        let base = self.parse_postfix()?;
        if self.eat(&TokenKind::DoubleStar).is_none() {
            return Ok(base);
        }
        let exponent = self.nested(Self::parse_factor)?;
        Ok(binary(BinOpKind::Pow, base, exponent))
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.current().kind {
                TokenKind::LParen => {
                    self.bump();
                    let mut args = Vec::new();
                    while !self.at(&TokenKind::RParen) {
                        args.push(self.parse_expr()?);
                        if self.eat(&TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                    let close = self.expect(&TokenKind::RParen, "`)` to close call")?;
                    let span = Span::new(expr.span.start, close.span.end);
                    expr = Expr {
                        kind: ExprKind::Call {
                            func: Box::new(expr),
                            args,
                        },
                        span,
                    };
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.parse_expr()?;
                    let close = self.expect(&TokenKind::RBracket, "`]` to close subscript")?;
                    let span = Span::new(expr.span.start, close.span.end);
                    expr = Expr {
                        kind: ExprKind::Subscript {
                            value: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    };
                }
                TokenKind::Dot => {
                    self.bump();
                    let (attr, attr_span) = self.expect_name("attribute name")?;
                    let span = Span::new(expr.span.start, attr_span.end);
                    expr = Expr {
                        kind: ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        span,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        let kind = match token.kind {
            TokenKind::Name(name) => ExprKind::Name(name),
            TokenKind::Int(value) => ExprKind::Int(value),
            TokenKind::Float(value) => ExprKind::Float(value),
            TokenKind::Str(value) => ExprKind::Str(value),
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::None => ExprKind::NoneLit,
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "`)` to close group")?;
                return Ok(inner);
            }
            TokenKind::LBracket => {
                self.bump();
                let mut items = Vec::new();
                while !self.at(&TokenKind::RBracket) {
                    items.push(self.parse_expr()?);
                    if self.eat(&TokenKind::Comma).is_none() {
                        break;
                    }
                }
                let close = self.expect(&TokenKind::RBracket, "`]` to close list")?;
                return Ok(Expr {
                    kind: ExprKind::List(items),
                    span: Span::new(token.span.start, close.span.end),
                });
            }
            _ => return Err(self.unexpected("expression")),
        };

        self.bump();
        Ok(Expr {
            kind,
            span: token.span,
        })
    }
}

fn unary(op: UnaryOpKind, start: Pos, operand: Expr) -> Expr {
    let span = Span::new(start, operand.span.end);
    Expr {
        kind: ExprKind::UnaryOp {
            op,
            operand: Box::new(operand),
        },
        span,
    }
}

fn binary(op: BinOpKind, left: Expr, right: Expr) -> Expr {
    let span = Span::new(left.span.start, right.span.end);
    Expr {
        kind: ExprKind::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    }
}

/// End position of the last statement of a non-empty block.
fn block_end(body: &[Stmt]) -> Pos {
    body.last().map(|s| s.span.end).unwrap_or(Pos::new(0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(sl: u32, sc: u32, el: u32, ec: u32) -> Span {
        Span::new(Pos::new(sl, sc), Pos::new(el, ec))
    }

    #[test]
    fn conditional_expression_spans() {
        let expr = parse_expression("a if test else b").unwrap();
        assert_eq!(expr.span, span(1, 0, 1, 16));

        let ExprKind::IfExp { test, body, orelse } = expr.kind else {
            panic!("expected conditional expression, got {:?}", expr.kind);
        };
        assert_eq!(body.span, span(1, 0, 1, 1));
        assert_eq!(test.span, span(1, 5, 1, 9));
        assert_eq!(orelse.span, span(1, 15, 1, 16));
    }

    #[test]
    fn grouping_parentheses_are_not_part_of_the_span() {
        let expr = parse_expression("a if t1 else (b if t2 else c)").unwrap();
        let ExprKind::IfExp { orelse, .. } = expr.kind else {
            panic!("expected conditional expression");
        };
        assert_eq!(orelse.span, span(1, 14, 1, 28));
    }

    #[test]
    fn or_chains_are_flat_and_mixed_chains_nest() {
        let expr = parse_expression("a or b or c").unwrap();
        let ExprKind::BoolOp { op, values } = &expr.kind else {
            panic!("expected bool op");
        };
        assert_eq!(*op, BoolOpKind::Or);
        assert_eq!(values.len(), 3);

        let expr = parse_expression("a and b or c").unwrap();
        let ExprKind::BoolOp { op, values } = &expr.kind else {
            panic!("expected bool op");
        };
        assert_eq!(*op, BoolOpKind::Or);
        assert_eq!(values.len(), 2);
        assert!(matches!(
            values[0].kind,
            ExprKind::BoolOp {
                op: BoolOpKind::And,
                ..
            }
        ));
        assert_eq!(values[0].span, span(1, 0, 1, 7));
    }

    #[test]
    fn multi_line_expression_spans() {
        let expr = parse_expression("(first and\n    second)").unwrap();
        let ExprKind::BoolOp { values, .. } = &expr.kind else {
            panic!("expected bool op");
        };
        assert_eq!(expr.span, span(1, 1, 2, 10));
        assert_eq!(values[1].span, span(2, 4, 2, 10));
    }

    #[test]
    fn parses_blocks_and_elif() {
        let source = "\
def sign(x):
    if x > 0:
        return 1
    elif x < 0:
        return -1
    else:
        return 0
";
        let module = parse_module(source).unwrap();
        assert_eq!(module.body.len(), 1);

        let StmtKind::FunctionDef(def) = &module.body[0].kind else {
            panic!("expected def");
        };
        assert_eq!(def.name, "sign");
        assert_eq!(def.params, vec!["x".to_string()]);
        assert_eq!(def.span, span(1, 0, 7, 16));

        let StmtKind::If { orelse, .. } = &def.body[0].kind else {
            panic!("expected if");
        };
        assert!(matches!(orelse[0].kind, StmtKind::If { .. }));
    }

    #[test]
    fn single_line_suite() {
        let module = parse_module("if x: y = 1\nz = 2\n").unwrap();
        assert_eq!(module.body.len(), 2);
    }

    #[test]
    fn assignment_to_call_is_rejected() {
        let err = parse_module("f() = 1\n").unwrap_err();
        assert_eq!(err.message, "only names can be assigned to");
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let depth = 1000;
        let grouped = format!("x = {}1{}\n", "(".repeat(depth), ")".repeat(depth));
        let err = parse_module(&grouped).unwrap_err();
        assert_eq!(err.message, "too many nested expressions or blocks");

        let negated = format!("x = {}1\n", "not ".repeat(depth));
        assert!(parse_module(&negated).is_err());

        let minus = format!("x = {}1\n", "-".repeat(depth));
        assert!(parse_module(&minus).is_err());

        let lists = format!("x = {}{}\n", "[".repeat(depth), "]".repeat(depth));
        assert!(parse_module(&lists).is_err());
    }

    #[test]
    fn moderate_nesting_still_parses() {
        let grouped = format!("x = {}1{}\n", "(".repeat(30), ")".repeat(30));
        assert!(parse_module(&grouped).is_ok());
    }

    #[test]
    fn missing_else_is_a_syntax_error() {
        let err = parse_expression("a if b").unwrap_err();
        assert!(err.message.starts_with("expected `else`"), "{}", err.message);
    }
}
