//! Compiled units and their sub-expression position tables.

use std::path::{Path, PathBuf};

use super::ast::{self, Expr, FunctionDef, Stmt, StmtKind, Visitor};

/// One entry of a position table: `(start_line, end_line, start_col, end_col)`.
///
/// Any coordinate may be unknown, e.g. for synthetic operations that have no
/// source text of their own.
pub type RawPosition = (Option<u32>, Option<u32>, Option<u32>, Option<u32>);

/// An executable unit: a module body or a function body.
#[derive(Debug)]
pub struct Code {
    /// Function name, or `<module>` for a module body.
    pub name: String,

    /// Name of the module this unit belongs to.
    pub module: String,

    /// Backing source file, if the unit was loaded from one.
    pub filename: Option<PathBuf>,

    /// Line of the unit's first statement or `def`.
    pub first_line: u32,

    positions: Vec<RawPosition>,
}

pub const MODULE_UNIT_NAME: &str = "<module>";

impl Code {
    /// Compile the top-level body of a module.
    pub fn for_module(module: &str, filename: Option<PathBuf>, body: &ast::Module) -> Self {
        let mut table = PositionTable::default();
        for stmt in &body.body {
            table.visit_stmt(stmt);
        }

        Self {
            name: MODULE_UNIT_NAME.to_string(),
            module: module.to_string(),
            filename,
            first_line: body.body.first().map(|s| s.span.start.line).unwrap_or(1),
            positions: table.entries,
        }
    }

    /// Compile the body of a function definition.
    pub fn for_function(module: &str, filename: Option<PathBuf>, def: &FunctionDef) -> Self {
        let mut table = PositionTable::default();
        for stmt in &def.body {
            table.visit_stmt(stmt);
        }

        // implicit `return None` when control falls off the end
        let last = def.span.end.line;
        table.entries.push((Some(last), Some(last), None, None));

        Self {
            name: def.name.clone(),
            module: module.to_string(),
            filename,
            first_line: def.span.start.line,
            positions: table.entries,
        }
    }

    /// `module` for module bodies, `module.function` for functions.
    pub fn qualified_name(&self) -> String {
        if self.name == MODULE_UNIT_NAME {
            self.module.clone()
        } else {
            format!("{}.{}", self.module, self.name)
        }
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Source positions of every operation in this unit, in evaluation order.
    pub fn positions(&self) -> &[RawPosition] {
        &self.positions
    }
}

/// Collects statement and expression positions, stopping at nested
/// function bodies (those are separate units).
#[derive(Default)]
struct PositionTable {
    entries: Vec<RawPosition>,
}

impl PositionTable {
    fn push(&mut self, span: crate::span::Span) {
        self.entries.push((
            Some(span.start.line),
            Some(span.end.line),
            Some(span.start.col),
            Some(span.end.col),
        ));
    }
}

impl Visitor for PositionTable {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        self.push(stmt.span);
        if !matches!(stmt.kind, StmtKind::FunctionDef(_)) {
            ast::walk_stmt(self, stmt);
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        self.push(expr.span);
        ast::walk_expr(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::parser::parse_module;

    #[test]
    fn module_table_skips_function_bodies() {
        let module = parse_module("def f():\n    return a or b\nx = 1\n").unwrap();
        let code = Code::for_module("app", None, &module);

        // `def` statement, `x = 1`, and the literal `1`
        assert_eq!(code.positions().len(), 3);
        assert_eq!(code.qualified_name(), "app");
    }

    #[test]
    fn function_table_ends_with_unknown_columns() {
        let module = parse_module("def f():\n    return a or b\n").unwrap();
        let StmtKind::FunctionDef(def) = &module.body[0].kind else {
            panic!("expected def");
        };
        let code = Code::for_function("app", None, def);

        assert_eq!(code.qualified_name(), "app.f");
        assert_eq!(
            code.positions(),
            &[
                (Some(2), Some(2), Some(4), Some(17)),
                (Some(2), Some(2), Some(11), Some(17)),
                (Some(2), Some(2), Some(11), Some(12)),
                (Some(2), Some(2), Some(16), Some(17)),
                (Some(2), Some(2), None, None),
            ]
        );
    }
}
