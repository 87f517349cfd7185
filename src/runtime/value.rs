//! Runtime values and the operators defined on them.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use super::ast::{BinOpKind, FunctionDef};
use super::code::Code;
use super::error::ScriptError;

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Function(Rc<Function>),
    Builtin(Builtin),
    Module(Rc<ModuleObject>),
}

/// A user-defined function bound to the module it was defined in.
#[derive(Debug)]
pub struct Function {
    pub def: Rc<FunctionDef>,
    pub code: Rc<Code>,
    pub globals: Weak<ModuleObject>,
}

/// A loaded module and its global namespace.
#[derive(Debug)]
pub struct ModuleObject {
    pub name: String,
    pub file: Option<PathBuf>,
    pub globals: RefCell<HashMap<String, Value>>,
}

impl ModuleObject {
    pub fn new(name: impl Into<String>, file: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file,
            globals: RefCell::new(HashMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.globals.borrow_mut().insert(name.into(), value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Len,
    Range,
    Str,
    Int,
    Exit,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "print" => Builtin::Print,
            "len" => Builtin::Len,
            "range" => Builtin::Range,
            "str" => Builtin::Str,
            "int" => Builtin::Int,
            "exit" => Builtin::Exit,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Range => "range",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Exit => "exit",
        }
    }
}

impl Value {
    pub fn str(text: &str) -> Self {
        Value::Str(Rc::from(text))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function",
            Value::Module(_) => "module",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Function(_) | Value::Builtin(_) | Value::Module(_) => true,
        }
    }

    /// Quoted form used inside containers.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            other => other.to_string(),
        }
    }

    fn number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                let items = items.borrow();
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Function(func) => write!(f, "<function {}>", func.code.qualified_name()),
            Value::Builtin(b) => write!(f, "<built-in function {}>", b.name()),
            Value::Module(m) => write!(f, "<module '{}'>", m.name),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

/// `a == b` with numeric coercion between bools, ints and floats.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.number(), b.number()) {
        return match (x, y) {
            (Number::Int(x), Number::Int(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        };
    }

    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b))
        }
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        (Value::Module(x), Value::Module(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// Ordering for `<`, `<=`, `>`, `>=`.
pub fn compare_values(a: &Value, b: &Value) -> Result<Ordering, ScriptError> {
    if let (Some(x), Some(y)) = (a.number(), b.number()) {
        return match (x, y) {
            (Number::Int(x), Number::Int(y)) => Ok(x.cmp(&y)),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .ok_or_else(|| ScriptError::Value("cannot order NaN".into())),
        };
    }

    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            for (a, b) in x.iter().zip(y.iter()) {
                let ord = compare_values(a, b)?;
                if ord != Ordering::Equal {
                    return Ok(ord);
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        _ => Err(ScriptError::Type(format!(
            "'<' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

/// Membership test for `in` / `not in`.
pub fn contains_value(container: &Value, item: &Value) -> Result<bool, ScriptError> {
    match (container, item) {
        (Value::List(items), _) => Ok(items.borrow().iter().any(|v| values_equal(v, item))),
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(&**needle)),
        (Value::Str(_), other) => Err(ScriptError::Type(format!(
            "'in <string>' requires string as left operand, not {}",
            other.type_name()
        ))),
        (other, _) => Err(ScriptError::Type(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Apply a binary arithmetic operator.
pub fn binary_op(op: BinOpKind, a: &Value, b: &Value) -> Result<Value, ScriptError> {
    if let (Some(x), Some(y)) = (a.number(), b.number()) {
        return numeric_op(op, x, y);
    }

    match (op, a, b) {
        (BinOpKind::Add, Value::Str(x), Value::Str(y)) => Ok(Value::str(&format!("{x}{y}"))),
        (BinOpKind::Add, Value::List(x), Value::List(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOpKind::Mul, Value::Str(s), Value::Int(n))
        | (BinOpKind::Mul, Value::Int(n), Value::Str(s)) => {
            Ok(Value::str(&s.repeat(usize::try_from(*n).unwrap_or(0))))
        }
        (BinOpKind::Mul, Value::List(items), Value::Int(n))
        | (BinOpKind::Mul, Value::Int(n), Value::List(items)) => {
            let items = items.borrow();
            let count = usize::try_from(*n).unwrap_or(0);
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::list(out))
        }
        _ => Err(ScriptError::Type(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op_symbol(op),
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn numeric_op(op: BinOpKind, x: Number, y: Number) -> Result<Value, ScriptError> {
    let overflow = || ScriptError::Value("integer overflow".into());

    if let (Number::Int(a), Number::Int(b)) = (x, y) {
        return match op {
            BinOpKind::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
            BinOpKind::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
            BinOpKind::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
            BinOpKind::Div => {
                if b == 0 {
                    return Err(ScriptError::ZeroDivision("division by zero".into()));
                }
                Ok(Value::Float(a as f64 / b as f64))
            }
            BinOpKind::FloorDiv => {
                if b == 0 {
                    return Err(ScriptError::ZeroDivision(
                        "integer division or modulo by zero".into(),
                    ));
                }
                let q = a.checked_div(b).ok_or_else(overflow)?;
                let floored = if a % b != 0 && ((a < 0) != (b < 0)) {
                    q - 1
                } else {
                    q
                };
                Ok(Value::Int(floored))
            }
            BinOpKind::Mod => {
                if b == 0 {
                    return Err(ScriptError::ZeroDivision(
                        "integer division or modulo by zero".into(),
                    ));
                }
                let r = a.checked_rem(b).ok_or_else(overflow)?;
                let r = if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r };
                Ok(Value::Int(r))
            }
            BinOpKind::Pow => match u32::try_from(b) {
                Ok(exp) => a.checked_pow(exp).map(Value::Int).ok_or_else(overflow),
                Err(_) => Ok(Value::Float((a as f64).powf(b as f64))),
            },
        };
    }

    let (a, b) = (x.as_f64(), y.as_f64());
    let value = match op {
        BinOpKind::Add => a + b,
        BinOpKind::Sub => a - b,
        BinOpKind::Mul => a * b,
        BinOpKind::Div | BinOpKind::FloorDiv | BinOpKind::Mod if b == 0.0 => {
            return Err(ScriptError::ZeroDivision("float division by zero".into()));
        }
        BinOpKind::Div => a / b,
        BinOpKind::FloorDiv => (a / b).floor(),
        BinOpKind::Mod => a - b * (a / b).floor(),
        BinOpKind::Pow => a.powf(b),
    };
    Ok(Value::Float(value))
}

/// Unary minus.
pub fn negate(value: &Value) -> Result<Value, ScriptError> {
    match value.number() {
        Some(Number::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| ScriptError::Value("integer overflow".into())),
        Some(Number::Float(f)) => Ok(Value::Float(-f)),
        None => Err(ScriptError::Type(format!(
            "bad operand type for unary -: '{}'",
            value.type_name()
        ))),
    }
}

/// Unary plus.
pub fn positive(value: &Value) -> Result<Value, ScriptError> {
    match value.number() {
        Some(Number::Int(i)) => Ok(Value::Int(i)),
        Some(Number::Float(f)) => Ok(Value::Float(f)),
        None => Err(ScriptError::Type(format!(
            "bad operand type for unary +: '{}'",
            value.type_name()
        ))),
    }
}

pub fn op_symbol(op: BinOpKind) -> &'static str {
    match op {
        BinOpKind::Add => "+",
        BinOpKind::Sub => "-",
        BinOpKind::Mul => "*",
        BinOpKind::Div => "/",
        BinOpKind::FloorDiv => "//",
        BinOpKind::Mod => "%",
        BinOpKind::Pow => "**",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_division_and_modulo_follow_the_divisor_sign() {
        let cases = [(-7, 2, -4, 1), (7, -2, -4, -1), (7, 2, 3, 1), (-7, -2, 3, -1)];
        for (a, b, q, r) in cases {
            let (a, b) = (Value::Int(a), Value::Int(b));
            assert!(values_equal(
                &binary_op(BinOpKind::FloorDiv, &a, &b).unwrap(),
                &Value::Int(q)
            ));
            assert!(values_equal(
                &binary_op(BinOpKind::Mod, &a, &b).unwrap(),
                &Value::Int(r)
            ));
        }
    }

    #[test]
    fn division_by_zero_is_reported() {
        let err = binary_op(BinOpKind::Div, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert!(matches!(err, ScriptError::ZeroDivision(_)));
    }

    #[test]
    fn bools_take_part_in_arithmetic_and_equality() {
        let sum = binary_op(BinOpKind::Add, &Value::Bool(true), &Value::Int(2)).unwrap();
        assert!(values_equal(&sum, &Value::Int(3)));
        assert!(values_equal(&Value::Bool(true), &Value::Float(1.0)));
    }

    #[test]
    fn display_matches_script_conventions() {
        let list = Value::list(vec![Value::Int(1), Value::str("a"), Value::None]);
        assert_eq!(list.to_string(), "[1, 'a', None]");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Bool(false).to_string(), "False");
    }

    #[test]
    fn mismatched_operands_are_type_errors() {
        let err = binary_op(BinOpKind::Sub, &Value::str("a"), &Value::Int(1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: unsupported operand type(s) for -: 'str' and 'int'"
        );
    }
}
