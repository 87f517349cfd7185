//! Tree-walking interpreter.
//!
//! Each module body and function call runs in its own frame. Frames report
//! to the per-thread trace hook (see [`super::trace`]) exactly like a
//! debugger hook would: `Call` on entry, `Line` before each statement and each
//! loop re-test, `Exception` + `Return(None)` when an error unwinds the frame,
//! `Return(Some(value))` on normal exit.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::debug;

use super::ast::{BoolOpKind, CmpOpKind, Expr, ExprKind, Stmt, StmtKind, UnaryOpKind};
use super::builtins;
use super::code::Code;
use super::error::{ScriptError, ScriptResult};
use super::parser::parse_module;
use super::trace::{self, Frame, TraceEvent, TraceFn};
use super::value::{
    Builtin, Function, ModuleObject, Value, binary_op, compare_values, contains_value, negate,
    positive, values_equal,
};

/// Name given to the module a driver runs directly.
pub const MAIN_MODULE: &str = "__main__";

/// Script file extension used when resolving `import name`.
pub const SCRIPT_EXTENSION: &str = "py";

const MAX_DEPTH: usize = 100;

pub struct Interpreter {
    search_path: Vec<PathBuf>,
    modules: HashMap<String, Rc<ModuleObject>>,
    argv: Vec<String>,
    output: Box<dyn Write>,
    trace_opcodes: bool,
    depth: usize,
}

/// How a block finished.
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Mutable state of one executing frame.
struct FrameState {
    code: Rc<Code>,
    globals: Rc<ModuleObject>,
    /// `None` for module bodies, whose locals are the module globals.
    locals: Option<HashMap<String, Value>>,
    tracer: Option<TraceFn>,
    line: u32,
}

impl FrameState {
    fn view(&self) -> Frame<'_> {
        Frame {
            code: &self.code,
            line: self.line,
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            search_path: Vec::new(),
            modules: HashMap::new(),
            argv: Vec::new(),
            output: Box::new(std::io::stdout()),
            trace_opcodes: false,
            depth: 0,
        }
    }

    /// Directories searched by `import` and [`Interpreter::run_module`].
    pub fn with_search_path(mut self, path: Vec<PathBuf>) -> Self {
        self.search_path = path;
        self
    }

    /// Value of the `argv` global seen by scripts.
    pub fn with_argv(mut self, argv: Vec<String>) -> Self {
        self.argv = argv;
        self
    }

    /// Redirect `print` output.
    pub fn with_output(mut self, output: Box<dyn Write>) -> Self {
        self.output = output;
        self
    }

    /// Report an `Opcode` event before every expression evaluation.
    pub fn set_trace_opcodes(&mut self, enabled: bool) {
        self.trace_opcodes = enabled;
    }

    /// Previously loaded module by name.
    pub fn module(&self, name: &str) -> Option<Rc<ModuleObject>> {
        self.modules.get(name).cloned()
    }

    /// Run a script file as the `__main__` module.
    ///
    /// The script's directory is added to the front of the search path.
    pub fn run_path(&mut self, path: &Path) -> ScriptResult<Rc<ModuleObject>> {
        if let Some(dir) = path.parent() {
            let dir = if dir.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                dir.to_path_buf()
            };
            if !self.search_path.contains(&dir) {
                self.search_path.insert(0, dir);
            }
        }

        let source = read_source(path)?;
        self.exec_module(MAIN_MODULE, Some(path.to_path_buf()), &source)
    }

    /// Resolve `name` on the search path and run it as `__main__`.
    pub fn run_module(&mut self, name: &str) -> ScriptResult<Rc<ModuleObject>> {
        let path = self.find_module(name)?;
        let source = read_source(&path)?;
        self.exec_module(MAIN_MODULE, Some(path), &source)
    }

    /// Run source text that has no backing file.
    pub fn run_source(&mut self, source: &str, module: &str) -> ScriptResult<Rc<ModuleObject>> {
        self.exec_module(module, None, source)
    }

    fn find_module(&self, name: &str) -> ScriptResult<PathBuf> {
        let file_name = format!("{name}.{SCRIPT_EXTENSION}");
        self.search_path
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ScriptError::Import(format!("No module named '{name}'")))
    }

    fn exec_module(
        &mut self,
        name: &str,
        file: Option<PathBuf>,
        source: &str,
    ) -> ScriptResult<Rc<ModuleObject>> {
        let display = file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("<{name}>"));
        let ast = parse_module(source).map_err(|error| ScriptError::Syntax {
            file: display,
            error,
        })?;

        let code = Rc::new(Code::for_module(name, file.clone(), &ast));
        let module = Rc::new(ModuleObject::new(name, file));
        // registered before running so circular imports see the partial module
        self.modules.insert(name.to_string(), module.clone());

        debug!("running module {name}");
        self.run_frame(code, module.clone(), None, &ast.body)?;
        Ok(module)
    }

    fn import(&mut self, name: &str) -> ScriptResult<Rc<ModuleObject>> {
        if let Some(module) = self.modules.get(name) {
            return Ok(module.clone());
        }
        let path = self.find_module(name)?;
        let source = read_source(&path)?;
        self.exec_module(name, Some(path), &source)
    }

    /// Run `body` in a fresh frame, reporting the frame to the trace hook.
    fn run_frame(
        &mut self,
        code: Rc<Code>,
        globals: Rc<ModuleObject>,
        locals: Option<HashMap<String, Value>>,
        body: &[Stmt],
    ) -> ScriptResult<Value> {
        if self.depth >= MAX_DEPTH {
            return Err(ScriptError::Recursion);
        }

        let mut frame = FrameState {
            line: code.first_line,
            code,
            globals,
            locals,
            tracer: None,
        };

        if let Some(hook) = trace::gettrace() {
            frame.tracer = hook.call(&frame.view(), &TraceEvent::Call);
        }

        self.depth += 1;
        let outcome = self.exec_block(&mut frame, body);
        self.depth -= 1;

        let result = match outcome {
            Ok(Flow::Return(value)) => Ok(value),
            Ok(Flow::Normal) => Ok(Value::None),
            Ok(Flow::Break | Flow::Continue) => Err(ScriptError::Type(
                "'break' or 'continue' outside loop".into(),
            )),
            Err(err) => Err(err),
        };

        match &result {
            Ok(value) => self.trace(&mut frame, &TraceEvent::Return(Some(value))),
            Err(err) => {
                self.trace(&mut frame, &TraceEvent::Exception(err));
                self.trace(&mut frame, &TraceEvent::Return(None));
            }
        }

        result
    }

    /// Deliver `event` to the frame's local handler, if any.
    fn trace(&self, frame: &mut FrameState, event: &TraceEvent<'_>) {
        if let Some(tracer) = frame.tracer.take() {
            frame.tracer = tracer.call(&frame.view(), event);
        }
    }

    fn trace_line(&self, frame: &mut FrameState, line: u32) {
        frame.line = line;
        self.trace(frame, &TraceEvent::Line);
    }

    fn exec_block(&mut self, frame: &mut FrameState, body: &[Stmt]) -> ScriptResult<Flow> {
        for stmt in body {
            match self.exec_stmt(frame, stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, frame: &mut FrameState, stmt: &Stmt) -> ScriptResult<Flow> {
        self.trace_line(frame, stmt.span.start.line);
        self.exec_stmt_inner(frame, stmt).map_err(|err| {
            if err.has_location() {
                err
            } else {
                ScriptError::At {
                    file: frame
                        .code
                        .filename()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| format!("<{}>", frame.code.module)),
                    line: stmt.span.start.line,
                    source: Box::new(err),
                }
            }
        })
    }

    fn exec_stmt_inner(&mut self, frame: &mut FrameState, stmt: &Stmt) -> ScriptResult<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(frame, expr)?;
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(frame, value)?;
                self.store(frame, target, value);
            }
            StmtKind::AugAssign { target, op, value } => {
                let current = self.load(frame, target)?;
                let rhs = self.eval(frame, value)?;
                let updated = binary_op(*op, &current, &rhs)?;
                self.store(frame, target, updated);
            }
            StmtKind::If { test, body, orelse } => {
                let branch = if self.eval(frame, test)?.is_truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_block(frame, branch);
            }
            StmtKind::While { test, body } => {
                let header = stmt.span.start.line;
                let mut first = true;
                loop {
                    if !first {
                        self.trace_line(frame, header);
                    }
                    first = false;

                    if !self.eval(frame, test)?.is_truthy() {
                        break;
                    }
                    match self.exec_block(frame, body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StmtKind::For { target, iter, body } => {
                let header = stmt.span.start.line;
                let items = self.iterate(frame, iter)?;
                for (index, item) in items.into_iter().enumerate() {
                    if index > 0 {
                        self.trace_line(frame, header);
                    }
                    self.store(frame, target, item);
                    match self.exec_block(frame, body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StmtKind::FunctionDef(def) => {
                let code = Code::for_function(
                    &frame.globals.name,
                    frame.globals.file.clone(),
                    def,
                );
                let function = Function {
                    def: def.clone(),
                    code: Rc::new(code),
                    globals: Rc::downgrade(&frame.globals),
                };
                self.store(frame, &def.name, Value::Function(Rc::new(function)));
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(frame, expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Import(name) => {
                let module = self.import(name)?;
                self.store(frame, name, Value::Module(module));
            }
            StmtKind::Raise(expr) => {
                let value = self.eval(frame, expr)?;
                return Err(ScriptError::Raised(value.to_string()));
            }
            StmtKind::Pass => {}
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn iterate(&mut self, frame: &mut FrameState, iter: &Expr) -> ScriptResult<Vec<Value>> {
        match self.eval(frame, iter)? {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(&c.to_string())).collect()),
            other => Err(ScriptError::Type(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    fn load(&self, frame: &FrameState, name: &str) -> ScriptResult<Value> {
        if let Some(value) = frame.locals.as_ref().and_then(|locals| locals.get(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = frame.globals.get(name) {
            return Ok(value);
        }
        if name == "argv" {
            return Ok(Value::list(
                self.argv.iter().map(|arg| Value::str(arg)).collect(),
            ));
        }
        Builtin::lookup(name)
            .map(Value::Builtin)
            .ok_or_else(|| ScriptError::Name(name.to_string()))
    }

    fn store(&self, frame: &mut FrameState, name: &str, value: Value) {
        match frame.locals.as_mut() {
            Some(locals) => {
                locals.insert(name.to_string(), value);
            }
            None => frame.globals.set(name, value),
        }
    }

    fn eval(&mut self, frame: &mut FrameState, expr: &Expr) -> ScriptResult<Value> {
        if self.trace_opcodes {
            self.trace(frame, &TraceEvent::Opcode);
        }

        match &expr.kind {
            ExprKind::Name(name) => self.load(frame, name),
            ExprKind::Int(i) => Ok(Value::Int(*i)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::Str(s) => Ok(Value::str(s)),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::NoneLit => Ok(Value::None),
            ExprKind::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(frame, item))
                    .collect::<ScriptResult<Vec<_>>>()?;
                Ok(Value::list(values))
            }
            ExprKind::BoolOp { op, values } => {
                let mut result = Value::None;
                for operand in values {
                    result = self.eval(frame, operand)?;
                    let truthy = result.is_truthy();
                    let settled = match op {
                        BoolOpKind::And => !truthy,
                        BoolOpKind::Or => truthy,
                    };
                    if settled {
                        break;
                    }
                }
                Ok(result)
            }
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval(frame, test)?.is_truthy() {
                    self.eval(frame, body)
                } else {
                    self.eval(frame, orelse)
                }
            }
            ExprKind::UnaryOp { op, operand } => {
                let value = self.eval(frame, operand)?;
                match op {
                    UnaryOpKind::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOpKind::Neg => negate(&value),
                    UnaryOpKind::Pos => positive(&value),
                }
            }
            ExprKind::BinOp { op, left, right } => {
                let left = self.eval(frame, left)?;
                let right = self.eval(frame, right)?;
                binary_op(*op, &left, &right)
            }
            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => {
                let mut lhs = self.eval(frame, left)?;
                for (op, comparator) in ops.iter().zip(comparators) {
                    let rhs = self.eval(frame, comparator)?;
                    if !compare(*op, &lhs, &rhs)? {
                        return Ok(Value::Bool(false));
                    }
                    lhs = rhs;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::Call { func, args } => {
                let callee = self.eval(frame, func)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(frame, arg))
                    .collect::<ScriptResult<Vec<_>>>()?;
                self.call(callee, args)
            }
            ExprKind::Attribute { value, attr } => match self.eval(frame, value)? {
                Value::Module(module) => module.get(attr).ok_or_else(|| {
                    ScriptError::Name(format!("{}.{attr}", module.name))
                }),
                other => Err(ScriptError::Type(format!(
                    "'{}' object has no attribute '{attr}'",
                    other.type_name()
                ))),
            },
            ExprKind::Subscript { value, index } => {
                let container = self.eval(frame, value)?;
                let index = self.eval(frame, index)?;
                subscript(&container, &index)
            }
        }
    }

    /// Call a function value with positional arguments.
    pub fn call(&mut self, callee: Value, args: Vec<Value>) -> ScriptResult<Value> {
        match callee {
            Value::Function(function) => {
                let def = &function.def;
                if def.params.len() != args.len() {
                    return Err(ScriptError::Type(format!(
                        "{}() takes {} positional argument(s) but {} were given",
                        def.name,
                        def.params.len(),
                        args.len()
                    )));
                }
                let globals = function.globals.upgrade().ok_or_else(|| {
                    ScriptError::Name(format!("module of {}()", def.name))
                })?;
                let locals = def.params.iter().cloned().zip(args).collect();
                self.run_frame(function.code.clone(), globals, Some(locals), &def.body)
            }
            Value::Builtin(builtin) => builtins::call(builtin, &args, self.output.as_mut()),
            other => Err(ScriptError::Type(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }
}

fn compare(op: CmpOpKind, lhs: &Value, rhs: &Value) -> ScriptResult<bool> {
    use std::cmp::Ordering;

    Ok(match op {
        CmpOpKind::Eq => values_equal(lhs, rhs),
        CmpOpKind::NotEq => !values_equal(lhs, rhs),
        CmpOpKind::Lt => compare_values(lhs, rhs)? == Ordering::Less,
        CmpOpKind::LtE => compare_values(lhs, rhs)? != Ordering::Greater,
        CmpOpKind::Gt => compare_values(lhs, rhs)? == Ordering::Greater,
        CmpOpKind::GtE => compare_values(lhs, rhs)? != Ordering::Less,
        CmpOpKind::In => contains_value(rhs, lhs)?,
        CmpOpKind::NotIn => !contains_value(rhs, lhs)?,
    })
}

fn subscript(container: &Value, index: &Value) -> ScriptResult<Value> {
    let Value::Int(i) = index else {
        return Err(ScriptError::Type(format!(
            "indices must be integers, not {}",
            index.type_name()
        )));
    };

    let pick = |len: usize| -> ScriptResult<usize> {
        let len = len as i64;
        let resolved = if *i < 0 { *i + len } else { *i };
        if (0..len).contains(&resolved) {
            Ok(resolved as usize)
        } else {
            Err(ScriptError::Index("index out of range".into()))
        }
    };

    match container {
        Value::List(items) => {
            let items = items.borrow();
            Ok(items[pick(items.len())?].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::str(&chars[pick(chars.len())?].to_string()))
        }
        other => Err(ScriptError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn read_source(path: &Path) -> ScriptResult<String> {
    fs::read_to_string(path).map_err(|source| ScriptError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::runtime::trace::{EventKind, settrace};

    /// `Write` sink shared with the test.
    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    fn run(source: &str) -> (ScriptResult<Rc<ModuleObject>>, String) {
        let out = Capture::default();
        let mut interp = Interpreter::new().with_output(Box::new(out.clone()));
        let result = interp.run_source(source, "test");
        (result, out.text())
    }

    #[test]
    fn runs_functions_loops_and_short_circuits() {
        let source = "\
def classify(n):
    return 'small' if n < 3 else 'big'

total = 0
for i in range(5):
    if i % 2 == 0 and i > 0:
        total += i
print(total, classify(1), classify(10))
print(0 or 'fallback', 1 and 2)
";
        let (result, out) = run(source);
        result.expect("script should run");
        assert_eq!(out, "6 small big\nfallback 2\n");
    }

    #[test]
    fn while_loop_with_break_and_continue() {
        let source = "\
n = 0
seen = []
while True:
    n += 1
    if n == 2:
        continue
    if n > 4:
        break
    seen = seen + [n]
print(seen)
";
        let (result, out) = run(source);
        result.unwrap();
        assert_eq!(out, "[1, 3, 4]\n");
    }

    #[test]
    fn errors_carry_their_line() {
        let (result, _) = run("x = 1\ny = x / 0\n");
        let err = result.unwrap_err();
        assert_eq!(
            err.to_string(),
            "<test>, line 2: ZeroDivisionError: division by zero"
        );
    }

    #[test]
    fn exit_is_reported_as_exit_code() {
        let (result, out) = run("print('a')\nexit(3)\nprint('b')\n");
        assert_eq!(result.unwrap_err().exit_code(), Some(3));
        assert_eq!(out, "a\n");
    }

    #[test]
    fn unbounded_recursion_is_an_error() {
        // debug builds need more than the default test-thread stack for 100 frames
        let handle = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let (result, _) = run("def f(n):\n    return f(n + 1)\nf(0)\n");
                matches!(result.unwrap_err().root(), ScriptError::Recursion)
            })
            .unwrap();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn imports_resolve_on_the_search_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("helpers.py"), "def double(x):\n    return x * 2\n").unwrap();
        fs::write(
            dir.path().join("main.py"),
            "import helpers\nprint(helpers.double(21))\n",
        )
        .unwrap();

        let out = Capture::default();
        let mut interp = Interpreter::new().with_output(Box::new(out.clone()));
        interp.run_path(&dir.path().join("main.py")).unwrap();

        assert_eq!(out.text(), "42\n");
        assert!(interp.module("helpers").is_some());
    }

    #[test]
    fn trace_hook_sees_calls_lines_and_returns() {
        let events: Rc<RefCell<Vec<(EventKind, String, u32)>>> = Rc::default();

        fn local(events: Rc<RefCell<Vec<(EventKind, String, u32)>>>) -> TraceFn {
            TraceFn::new(move |frame, event| {
                events.borrow_mut().push((
                    event.kind(),
                    frame.code.qualified_name(),
                    frame.line,
                ));
                Some(local(events.clone()))
            })
        }

        let hook_events = events.clone();
        settrace(Some(TraceFn::new(move |frame, event| {
            hook_events.borrow_mut().push((
                event.kind(),
                frame.code.qualified_name(),
                frame.line,
            ));
            Some(local(hook_events.clone()))
        })));

        let (result, _) = run("def f(a):\n    return a\nf(1)\n");
        settrace(None);
        result.unwrap();

        let events = events.borrow();
        let kinds: Vec<_> = events
            .iter()
            .map(|(k, name, line)| (*k, name.as_str(), *line))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (EventKind::Call, "test", 1),
                (EventKind::Line, "test", 1),
                (EventKind::Line, "test", 3),
                (EventKind::Call, "test.f", 1),
                (EventKind::Line, "test.f", 2),
                (EventKind::Return, "test.f", 2),
                (EventKind::Return, "test", 3),
            ]
        );
    }

    #[test]
    fn handler_returning_none_stops_local_events() {
        let count = Rc::new(RefCell::new(0));
        let seen = count.clone();
        settrace(Some(TraceFn::new(move |_, _| {
            *seen.borrow_mut() += 1;
            None
        })));

        let (result, _) = run("def f():\n    return 1\nf()\nf()\n");
        settrace(None);
        result.unwrap();

        // one `Call` for the module and one per call of `f`
        assert_eq!(*count.borrow(), 3);
    }

    #[test]
    fn exceptions_are_traced_before_the_frame_returns() {
        let kinds: Rc<RefCell<Vec<EventKind>>> = Rc::default();

        fn local(kinds: Rc<RefCell<Vec<EventKind>>>) -> TraceFn {
            TraceFn::new(move |_, event| {
                kinds.borrow_mut().push(event.kind());
                Some(local(kinds.clone()))
            })
        }

        let hook_kinds = kinds.clone();
        settrace(Some(TraceFn::new(move |_, event| {
            hook_kinds.borrow_mut().push(event.kind());
            Some(local(hook_kinds.clone()))
        })));

        let (result, _) = run("raise 'boom'\n");
        settrace(None);

        assert_eq!(result.unwrap_err().root().to_string(), "boom");
        assert_eq!(
            *kinds.borrow(),
            vec![
                EventKind::Call,
                EventKind::Line,
                EventKind::Exception,
                EventKind::Return
            ]
        );
    }
}
