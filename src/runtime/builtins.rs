use std::io::Write;

use super::error::{ScriptError, ScriptResult};
use super::value::{Builtin, Value};

const MAX_RANGE_LEN: i64 = 10_000_000;

pub fn call(builtin: Builtin, args: &[Value], out: &mut dyn Write) -> ScriptResult<Value> {
    match builtin {
        Builtin::Print => {
            let line: Vec<String> = args.iter().map(Value::to_string).collect();
            writeln!(out, "{}", line.join(" ")).map_err(ScriptError::Output)?;
            Ok(Value::None)
        }
        Builtin::Len => {
            let [value] = expect_args::<1>(builtin, args)?;
            let len = match value {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.borrow().len(),
                other => {
                    return Err(ScriptError::Type(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::Int(len as i64))
        }
        Builtin::Range => range(args),
        Builtin::Str => {
            let [value] = expect_args::<1>(builtin, args)?;
            Ok(Value::str(&value.to_string()))
        }
        Builtin::Int => {
            let [value] = expect_args::<1>(builtin, args)?;
            match value {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
                Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                    ScriptError::Value(format!("invalid literal for int(): '{s}'"))
                }),
                other => Err(ScriptError::Type(format!(
                    "int() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))),
            }
        }
        Builtin::Exit => match args {
            [] => Err(ScriptError::Exit(0)),
            [Value::Int(code)] => Err(ScriptError::Exit(*code)),
            [Value::None] => Err(ScriptError::Exit(0)),
            [other] => Err(ScriptError::Type(format!(
                "exit code must be an integer, not '{}'",
                other.type_name()
            ))),
            _ => Err(arity(builtin, "at most 1", args.len())),
        },
    }
}

fn range(args: &[Value]) -> ScriptResult<Value> {
    let ints = args
        .iter()
        .map(|arg| match arg {
            Value::Int(i) => Ok(*i),
            other => Err(ScriptError::Type(format!(
                "'{}' object cannot be interpreted as an integer",
                other.type_name()
            ))),
        })
        .collect::<ScriptResult<Vec<i64>>>()?;

    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(arity(Builtin::Range, "1 to 3", args.len())),
    };
    if step == 0 {
        return Err(ScriptError::Value("range() arg 3 must not be zero".into()));
    }

    let span = if step > 0 {
        stop.saturating_sub(start)
    } else {
        start.saturating_sub(stop)
    };
    if span / step.saturating_abs() > MAX_RANGE_LEN {
        return Err(ScriptError::Value("range() is too large".into()));
    }

    let mut items = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        items.push(Value::Int(i));
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    Ok(Value::list(items))
}

fn expect_args<const N: usize>(builtin: Builtin, args: &[Value]) -> ScriptResult<&[Value; N]> {
    args.try_into()
        .map_err(|_| arity(builtin, &N.to_string(), args.len()))
}

fn arity(builtin: Builtin, expected: &str, given: usize) -> ScriptError {
    ScriptError::Type(format!(
        "{}() takes {expected} argument(s) ({given} given)",
        builtin.name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(value: &Value) -> Vec<i64> {
        let Value::List(items) = value else {
            panic!("expected list, got {value:?}");
        };
        items
            .borrow()
            .iter()
            .map(|v| match v {
                Value::Int(i) => *i,
                other => panic!("expected int, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn range_variants() {
        assert_eq!(ints(&range(&[Value::Int(3)]).unwrap()), vec![0, 1, 2]);
        assert_eq!(ints(&range(&[Value::Int(2), Value::Int(5)]).unwrap()), vec![2, 3, 4]);
        assert_eq!(
            ints(&range(&[Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap()),
            vec![5, 3, 1]
        );
        assert!(range(&[Value::Int(1), Value::Int(2), Value::Int(0)]).is_err());
    }

    #[test]
    fn print_joins_with_spaces() {
        let mut out = Vec::new();
        call(
            Builtin::Print,
            &[Value::str("x"), Value::Int(1), Value::None],
            &mut out,
        )
        .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "x 1 None\n");
    }

    #[test]
    fn len_checks_arity() {
        let mut sink = std::io::sink();
        let err = call(Builtin::Len, &[], &mut sink).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: len() takes 1 argument(s) (0 given)");
    }
}
