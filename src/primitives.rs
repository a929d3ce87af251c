use crate::evaluator::{EvalError, EvalResult, Interpreter, check_arity, expect_number};
use crate::source::Span;
use crate::value::{Value, format_value};
use tracing::info;

/// Binds the general-purpose natives in the interpreter's global frame.
pub fn register(interpreter: &mut Interpreter) {
    interpreter.define_native("+", prim_add);
    interpreter.define_native("-", prim_sub);
    interpreter.define_native("*", prim_mul);
    interpreter.define_native("/", prim_div);
    interpreter.define_native("=", prim_equals);
    interpreter.define_native("<", prim_less_than);
    interpreter.define_native(">", prim_greater_than);

    interpreter.define_native("print", prim_print);

    interpreter.define_native("list", prim_list);
    interpreter.define_native("first", prim_first);
    interpreter.define_native("rest", prim_rest);
}

fn fold_numbers<F: Fn(f64, f64) -> f64>(
    args: &[Value],
    span: Span,
    start: f64,
    func: F,
    operator: &str,
) -> EvalResult {
    let mut acc = start;
    for arg in args {
        acc = func(acc, expect_number!(arg, span, operator));
    }
    Ok(Value::Number(acc))
}

fn compare_numbers<F: Fn(f64, f64) -> bool>(
    args: &[Value],
    span: Span,
    compare: F,
    operator: &str,
) -> EvalResult {
    check_arity!(args, 2, span, operator);
    let left = expect_number!(&args[0], span, operator);
    let right = expect_number!(&args[1], span, operator);
    Ok(Value::Boolean(compare(left, right)))
}

pub fn prim_add(_: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    // (+) -> 0
    fold_numbers(&args, span, 0.0, |acc, val| acc + val, "+")
}

pub fn prim_sub(_: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    // (- x) -> -x
    // (- x y z) -> x - y - z
    check_arity!(args, min 1, span, "-");
    let first = expect_number!(&args[0], span, "-");
    if args.len() == 1 {
        return Ok(Value::Number(-first));
    }
    fold_numbers(&args[1..], span, first, |acc, val| acc - val, "-")
}

pub fn prim_mul(_: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    // (*) -> 1
    fold_numbers(&args, span, 1.0, |acc, val| acc * val, "*")
}

pub fn prim_div(_: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    // (/ x) -> x, not a reciprocal
    // (/ x y z) -> x / y / z
    check_arity!(args, min 1, span, "/");
    let mut result = expect_number!(&args[0], span, "/");
    for arg in &args[1..] {
        let divisor = expect_number!(arg, span, "/");
        if divisor == 0.0 {
            return Err(EvalError::DivisionByZero(span));
        }
        result /= divisor;
    }
    Ok(Value::Number(result))
}

/// Equality on primitive values only. Collections, functions and synth
/// nodes are never equal, not even to themselves.
pub fn prim_equals(_: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "=");
    let equal = match (&args[0], &args[1]) {
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Keyword(a), Value::Keyword(b)) => a == b,
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        (Value::Nil, Value::Nil) => true,
        _ => false,
    };
    Ok(Value::Boolean(equal))
}

pub fn prim_less_than(_: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    compare_numbers(&args, span, |left, right| left < right, "<")
}

pub fn prim_greater_than(_: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    compare_numbers(&args, span, |left, right| left > right, ">")
}

pub fn prim_print(interpreter: &mut Interpreter, args: Vec<Value>, _: Span) -> EvalResult {
    let line = args.iter().map(format_value).collect::<Vec<_>>().join(" ");
    if interpreter.config().mirror_print {
        info!(target: "cadenza::print", "{}", line);
    }
    interpreter.push_output(line);
    Ok(Value::Nil)
}

pub fn prim_list(_: &mut Interpreter, args: Vec<Value>, _: Span) -> EvalResult {
    Ok(Value::List(args))
}

fn expect_sequence<'a>(args: &'a [Value], span: Span, operator: &str) -> EvalResult<&'a [Value]> {
    check_arity!(args, 1, span, operator);
    match &args[0] {
        Value::List(elements) | Value::Vector(elements) => Ok(elements.as_slice()),
        other => Err(EvalError::TypeMismatch {
            name: operator.to_string(),
            expected: "list or vector".to_string(),
            found: other.type_name(),
            span,
        }),
    }
}

pub fn prim_first(_: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    let elements = expect_sequence(&args, span, "first")?;
    Ok(elements.first().cloned().unwrap_or(Value::Nil))
}

/// Always returns a list, even for a vector argument.
pub fn prim_rest(_: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    let elements = expect_sequence(&args, span, "rest")?;
    Ok(Value::List(elements.iter().skip(1).cloned().collect()))
}
