//! Syntax tree for the scripting language.
//!
//! Every node carries the [`Span`] of exactly its own text. Grouping
//! parentheses are not part of the inner expression's span.

use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOpKind {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOpKind {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    NoneLit,
    List(Vec<Expr>),
    /// Short-circuit chain; `a or b or c` has three values.
    BoolOp {
        op: BoolOpKind,
        values: Vec<Expr>,
    },
    /// `body if test else orelse`
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: Box<Expr>,
    },
    BinOp {
        op: BinOpKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOpKind>,
        comparators: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Assign {
        target: String,
        value: Expr,
    },
    AugAssign {
        target: String,
        op: BinOpKind,
        value: Expr,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    For {
        target: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    FunctionDef(std::rc::Rc<FunctionDef>),
    Return(Option<Expr>),
    Import(String),
    Raise(Expr),
    Pass,
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// A parsed source unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

/// Read-only traversal over a syntax tree.
///
/// The default methods recurse into every child, including function bodies,
/// so an implementor only overrides the nodes it cares about and calls the
/// matching `walk_*` function to keep descending.
pub trait Visitor {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_module<V: Visitor + ?Sized>(visitor: &mut V, module: &Module) {
    for stmt in &module.body {
        visitor.visit_stmt(stmt);
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Expr(value)
        | StmtKind::Assign { value, .. }
        | StmtKind::AugAssign { value, .. }
        | StmtKind::Raise(value) => visitor.visit_expr(value),
        StmtKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        StmtKind::If { test, body, orelse } => {
            visitor.visit_expr(test);
            body.iter().for_each(|s| visitor.visit_stmt(s));
            orelse.iter().for_each(|s| visitor.visit_stmt(s));
        }
        StmtKind::While { test, body } => {
            visitor.visit_expr(test);
            body.iter().for_each(|s| visitor.visit_stmt(s));
        }
        StmtKind::For { iter, body, .. } => {
            visitor.visit_expr(iter);
            body.iter().for_each(|s| visitor.visit_stmt(s));
        }
        StmtKind::FunctionDef(def) => def.body.iter().for_each(|s| visitor.visit_stmt(s)),
        StmtKind::Import(_) | StmtKind::Pass | StmtKind::Break | StmtKind::Continue => {}
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Name(_)
        | ExprKind::Int(_)
        | ExprKind::Float(_)
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::NoneLit => {}
        ExprKind::List(items) => items.iter().for_each(|e| visitor.visit_expr(e)),
        ExprKind::BoolOp { values, .. } => values.iter().for_each(|e| visitor.visit_expr(e)),
        ExprKind::IfExp { test, body, orelse } => {
            visitor.visit_expr(test);
            visitor.visit_expr(body);
            visitor.visit_expr(orelse);
        }
        ExprKind::UnaryOp { operand, .. } => visitor.visit_expr(operand),
        ExprKind::BinOp { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        ExprKind::Compare {
            left, comparators, ..
        } => {
            visitor.visit_expr(left);
            comparators.iter().for_each(|e| visitor.visit_expr(e));
        }
        ExprKind::Call { func, args } => {
            visitor.visit_expr(func);
            args.iter().for_each(|e| visitor.visit_expr(e));
        }
        ExprKind::Attribute { value, .. } => visitor.visit_expr(value),
        ExprKind::Subscript { value, index } => {
            visitor.visit_expr(value);
            visitor.visit_expr(index);
        }
    }
}
