use crate::audio::SharedEngine;
use crate::config::Config;
use crate::environment::Environment;
use crate::source::Span;
use crate::stack::ensure_sufficient_stack;
use crate::types::{Expr, Node};
use crate::value::{Function, Lambda, Native, NativeFunc, Value, format_value};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use thiserror::Error;

// --- Evaluation Error ---
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("undefined symbol: {name}")]
    UndefinedSymbol { name: String, span: Span },
    #[error("cannot call non-function: {found}")]
    NotAFunction { found: String, span: Span },
    #[error("{name} expects {expected} argument{}, got {found}", plural(.expected))]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },
    #[error("{0}")]
    InvalidArguments(String, Span),
    #[error("{name} requires a {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: &'static str,
        span: Span,
    },
    #[error("division by zero")]
    DivisionByZero(Span),
    #[error("{0}")]
    InvalidNote(String, Span),
    #[error("unknown {kind} type: {name}")]
    UnknownPattern {
        kind: &'static str,
        name: String,
        span: Span,
    },
    #[error("{0}")]
    InvalidSpecialForm(String, Span),
    #[error("map keys must be keywords or strings, got {found}")]
    InvalidMapKey { found: &'static str, span: Span },
    #[error("maximum call depth exceeded ({limit})")]
    CallDepthExceeded { limit: usize, span: Span },
}

fn plural(count: &usize) -> &'static str {
    if *count == 1 { "" } else { "s" }
}

impl EvalError {
    pub fn span(&self) -> Span {
        match self {
            EvalError::UndefinedSymbol { span, .. }
            | EvalError::NotAFunction { span, .. }
            | EvalError::ArityMismatch { span, .. }
            | EvalError::TypeMismatch { span, .. }
            | EvalError::UnknownPattern { span, .. }
            | EvalError::InvalidMapKey { span, .. }
            | EvalError::CallDepthExceeded { span, .. } => *span,
            EvalError::InvalidArguments(_, span)
            | EvalError::DivisionByZero(span)
            | EvalError::InvalidNote(_, span)
            | EvalError::InvalidSpecialForm(_, span) => *span,
        }
    }
}

// Result type alias for convenience
pub type EvalResult<T = Value> = Result<T, EvalError>;

/// Names that are dispatched as special forms rather than looked up.
const SPECIAL_FORMS: [&str; 6] = ["def", "defn", "let", "if", "do", "fn"];

pub fn special_form_identifiers() -> HashSet<String> {
    SPECIAL_FORMS.iter().map(|name| name.to_string()).collect()
}

// Checks the number of arguments
macro_rules! check_arity {
    ($args:expr, $expected:expr, $span:expr, $name:expr) => {
        if $args.len() != $expected {
            return Err(EvalError::ArityMismatch {
                name: $name.to_string(),
                expected: $expected,
                found: $args.len(),
                span: $span,
            });
        }
    };
    // Variant for minimum number of args
    ($args:expr, min $expected:expr, $span:expr, $name:expr) => {
        if $args.len() < $expected {
            return Err(EvalError::InvalidArguments(
                format!(
                    "{} requires at least {} argument{}, got {}",
                    $name,
                    $expected,
                    if $expected == 1 { "" } else { "s" },
                    $args.len()
                ),
                $span,
            ));
        }
    };
    // Variant for range of args (inclusive)
    ($args:expr, $min:expr, $max:expr, $span:expr, $name:expr) => {
        if !($min..=$max).contains(&$args.len()) {
            return Err(EvalError::InvalidArguments(
                format!(
                    "{} expects between {} and {} arguments, got {}",
                    $name,
                    $min,
                    $max,
                    $args.len()
                ),
                $span,
            ));
        }
    };
}
pub(crate) use check_arity;

// Extracts a number from a Value or returns a TypeMismatch error
macro_rules! expect_number {
    ($value:expr, $span:expr, $name:expr) => {{
        let value = $value;
        match value.as_number() {
            Some(n) => n,
            None => {
                return Err(EvalError::TypeMismatch {
                    name: $name.to_string(),
                    expected: "number".to_string(),
                    found: value.type_name(),
                    span: $span,
                });
            }
        }
    }};
}
pub(crate) use expect_number;

/// The tree-walking evaluator. One interpreter is one session: it owns the
/// global frame, the output buffer and the handle to the audio engine.
pub struct Interpreter {
    global: Rc<RefCell<Environment>>,
    engine: SharedEngine,
    config: Config,
    output: Vec<String>,
    depth: usize,
}

impl Interpreter {
    pub fn new(engine: SharedEngine, config: Config) -> Self {
        let mut interpreter = Interpreter {
            global: Environment::new(),
            engine,
            config,
            output: Vec::new(),
            depth: 0,
        };
        {
            let mut global = interpreter.global.borrow_mut();
            global.set("true", Value::Boolean(true));
            global.set("false", Value::Boolean(false));
            global.set("nil", Value::Nil);
        }
        crate::primitives::register(&mut interpreter);
        crate::music::register(&mut interpreter);
        interpreter
    }

    /// Binds a native function in the global frame.
    pub fn define_native(&mut self, name: &str, func: NativeFunc) {
        let native = Native {
            name: name.to_string(),
            func,
        };
        self.global
            .borrow_mut()
            .set(name, Value::Function(Function::Native(native)));
    }

    pub fn global_env(&self) -> Rc<RefCell<Environment>> {
        self.global.clone()
    }

    pub fn engine(&self) -> SharedEngine {
        self.engine.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub fn clear_output(&mut self) {
        self.output.clear();
    }

    /// Appends a line to the output buffer.
    pub fn push_output(&mut self, line: String) {
        self.output.push(line);
    }

    /// Forgets any call depth left over from an aborted evaluation.
    pub fn reset_call_depth(&mut self) {
        self.depth = 0;
    }

    /// Evaluates `node` within `env`.
    pub fn eval(&mut self, node: &Node, env: &Rc<RefCell<Environment>>) -> EvalResult {
        ensure_sufficient_stack(|| self.evaluate(node, env))
    }

    fn evaluate(&mut self, node: &Node, env: &Rc<RefCell<Environment>>) -> EvalResult {
        match &node.kind {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::String(s) => Ok(Value::String(s.clone())),
            Expr::Keyword(k) => Ok(Value::Keyword(k.clone())),

            Expr::Symbol(name) => {
                let found = env.borrow().get(name);
                found.ok_or_else(|| EvalError::UndefinedSymbol {
                    name: name.clone(),
                    span: node.span,
                })
            }

            Expr::Vector(elements) => Ok(Value::Vector(self.evaluate_all(elements, env)?)),

            Expr::Map(pairs) => self.evaluate_map(pairs, env),

            Expr::List(elements) => match &elements[..] {
                [] => Ok(Value::List(Vec::new())),
                [first, rest @ ..] => match first.as_symbol() {
                    Some("def") => self.evaluate_def(rest, env, node.span),
                    Some("defn") => self.evaluate_defn(rest, env, node.span),
                    Some("let") => self.evaluate_let(rest, env, node.span),
                    Some("if") => self.evaluate_if(rest, env, node.span),
                    Some("do") => self.evaluate_do(rest, env),
                    Some("fn") => self.evaluate_fn(rest, env, node.span),
                    _ => self.evaluate_application(first, rest, env, node.span),
                },
            },
        }
    }

    fn evaluate_all(
        &mut self,
        nodes: &[Node],
        env: &Rc<RefCell<Environment>>,
    ) -> EvalResult<Vec<Value>> {
        nodes.iter().map(|node| self.eval(node, env)).collect()
    }

    fn evaluate_map(
        &mut self,
        pairs: &[(Node, Node)],
        env: &Rc<RefCell<Environment>>,
    ) -> EvalResult {
        let mut map = BTreeMap::new();
        for (key_node, value_node) in pairs {
            let key = self.eval(key_node, env)?;
            let value = self.eval(value_node, env)?;
            let key = match key {
                Value::Keyword(k) => format!(":{}", k),
                Value::String(s) => s,
                other => {
                    return Err(EvalError::InvalidMapKey {
                        found: other.type_name(),
                        span: key_node.span,
                    });
                }
            };
            map.insert(key, value);
        }
        Ok(Value::Map(map))
    }

    fn evaluate_application(
        &mut self,
        operator: &Node,
        operands: &[Node],
        env: &Rc<RefCell<Environment>>,
        span: Span,
    ) -> EvalResult {
        let function = match self.eval(operator, env)? {
            Value::Function(function) => function,
            other => {
                return Err(EvalError::NotAFunction {
                    found: format_value(&other),
                    span: operator.span,
                });
            }
        };
        let args = self.evaluate_all(operands, env)?;
        self.apply(&function, args, span)
    }

    /// Calls `function` with already evaluated arguments.
    pub fn apply(&mut self, function: &Function, args: Vec<Value>, span: Span) -> EvalResult {
        match function {
            Function::Native(native) => (native.func)(self, args, span),
            Function::UserDefined(lambda) => self.apply_lambda(lambda, args, span),
        }
    }

    fn apply_lambda(&mut self, lambda: &Lambda, args: Vec<Value>, span: Span) -> EvalResult {
        if args.len() != lambda.params.len() {
            return Err(EvalError::ArityMismatch {
                name: lambda.name.clone().unwrap_or_else(|| "function".to_string()),
                expected: lambda.params.len(),
                found: args.len(),
                span,
            });
        }
        if self.depth >= self.config.max_call_depth {
            return Err(EvalError::CallDepthExceeded {
                limit: self.config.max_call_depth,
                span,
            });
        }

        let frame = Environment::new_enclosed(lambda.closure.clone());
        {
            let mut frame = frame.borrow_mut();
            for (param, arg) in lambda.params.iter().zip(args) {
                frame.set(param.as_str(), arg);
            }
        }

        self.depth += 1;
        let result = self.eval(&lambda.body, &frame);
        self.depth -= 1;
        result
    }

    fn evaluate_def(
        &mut self,
        operands: &[Node],
        env: &Rc<RefCell<Environment>>,
        span: Span,
    ) -> EvalResult {
        let [name, value] = operands else {
            return Err(EvalError::InvalidSpecialForm(
                "def requires exactly 2 arguments".to_string(),
                span,
            ));
        };
        let Some(name) = name.as_symbol() else {
            return Err(EvalError::InvalidSpecialForm(
                "def requires a symbol as first argument".to_string(),
                name.span,
            ));
        };

        let value = self.eval(value, env)?;
        env.borrow_mut().set(name, value.clone());
        Ok(value)
    }

    fn evaluate_defn(
        &mut self,
        operands: &[Node],
        env: &Rc<RefCell<Environment>>,
        span: Span,
    ) -> EvalResult {
        let [name, params, body] = operands else {
            return Err(EvalError::InvalidSpecialForm(
                "defn requires exactly 3 arguments".to_string(),
                span,
            ));
        };
        let Some(name) = name.as_symbol() else {
            return Err(EvalError::InvalidSpecialForm(
                "defn requires a symbol as first argument".to_string(),
                name.span,
            ));
        };

        let lambda = Lambda {
            params: parse_params(params, "defn")?,
            body: body.clone(),
            closure: env.clone(),
            name: Some(name.to_string()),
        };
        let function = Value::Function(Function::UserDefined(Rc::new(lambda)));
        env.borrow_mut().set(name, function.clone());
        Ok(function)
    }

    fn evaluate_let(
        &mut self,
        operands: &[Node],
        env: &Rc<RefCell<Environment>>,
        span: Span,
    ) -> EvalResult {
        let [bindings, body] = operands else {
            return Err(EvalError::InvalidSpecialForm(
                "let requires exactly 2 arguments".to_string(),
                span,
            ));
        };
        let Expr::Vector(bindings_forms) = &bindings.kind else {
            return Err(EvalError::InvalidSpecialForm(
                "let requires a vector of bindings".to_string(),
                bindings.span,
            ));
        };
        if bindings_forms.len() % 2 != 0 {
            return Err(EvalError::InvalidSpecialForm(
                "let bindings must be an even number of forms".to_string(),
                bindings.span,
            ));
        }

        let frame = Environment::new_enclosed(env.clone());
        for pair in bindings_forms.chunks(2) {
            let Some(name) = pair[0].as_symbol() else {
                return Err(EvalError::InvalidSpecialForm(
                    "let binding names must be symbols".to_string(),
                    pair[0].span,
                ));
            };
            // Later bindings see earlier ones.
            let value = self.eval(&pair[1], &frame)?;
            frame.borrow_mut().set(name, value);
        }
        self.eval(body, &frame)
    }

    fn evaluate_if(
        &mut self,
        operands: &[Node],
        env: &Rc<RefCell<Environment>>,
        span: Span,
    ) -> EvalResult {
        if let [condition, consequent, maybe_alternate @ ..] = operands
            && maybe_alternate.len() <= 1
        {
            if self.eval(condition, env)?.is_truthy() {
                self.eval(consequent, env)
            } else if let [alternate] = maybe_alternate {
                self.eval(alternate, env)
            } else {
                Ok(Value::Nil)
            }
        } else {
            Err(EvalError::InvalidSpecialForm(
                "if requires 2 or 3 arguments".to_string(),
                span,
            ))
        }
    }

    fn evaluate_do(&mut self, operands: &[Node], env: &Rc<RefCell<Environment>>) -> EvalResult {
        let mut result = Value::Nil;
        for operand in operands {
            result = self.eval(operand, env)?;
        }
        Ok(result)
    }

    fn evaluate_fn(
        &mut self,
        operands: &[Node],
        env: &Rc<RefCell<Environment>>,
        span: Span,
    ) -> EvalResult {
        let [params, body] = operands else {
            return Err(EvalError::InvalidSpecialForm(
                "fn requires exactly 2 arguments".to_string(),
                span,
            ));
        };
        let lambda = Lambda {
            params: parse_params(params, "fn")?,
            body: body.clone(),
            closure: env.clone(),
            name: None,
        };
        Ok(Value::Function(Function::UserDefined(Rc::new(lambda))))
    }
}

fn parse_params(params: &Node, form: &str) -> EvalResult<Vec<String>> {
    let Expr::Vector(elements) = &params.kind else {
        return Err(EvalError::InvalidSpecialForm(
            format!("{} requires a vector of parameters", form),
            params.span,
        ));
    };
    elements
        .iter()
        .map(|param| {
            param.as_symbol().map(str::to_string).ok_or_else(|| {
                EvalError::InvalidSpecialForm(
                    "function parameters must be symbols".to_string(),
                    param.span,
                )
            })
        })
        .collect()
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::OfflineEngine;
    use crate::parser::parse_str;

    fn interpreter() -> Interpreter {
        Interpreter::new(OfflineEngine::shared(), Config::default())
    }

    // Evaluates every form of `input` in a fresh interpreter and returns the last value.
    fn eval_str(interpreter: &mut Interpreter, input: &str) -> EvalResult {
        let forms = match parse_str(input) {
            Ok(forms) => forms,
            Err(e) => panic!("Parsing failed for input '{}': {}", input, e),
        };
        let env = interpreter.global_env();
        let mut result = Value::Nil;
        for form in &forms {
            result = interpreter.eval(form, &env)?;
        }
        Ok(result)
    }

    fn assert_eval(input: &str, expected: Value) {
        match eval_str(&mut interpreter(), input) {
            Ok(value) => assert_eq!(value, expected, "Input: '{}'", input),
            Err(e) => panic!("Evaluation failed for input '{}': {}", input, e),
        }
    }

    fn assert_eval_error(input: &str, expected_message: &str) -> EvalError {
        match eval_str(&mut interpreter(), input) {
            Ok(value) => panic!(
                "Expected evaluation to fail for input '{}', but got: {}",
                input, value
            ),
            Err(e) => {
                assert_eq!(e.to_string(), expected_message, "Input: '{}'", input);
                e
            }
        }
    }

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_eval_self_evaluating() {
        assert_eval("123", num(123.0));
        assert_eval("-4.5", num(-4.5));
        assert_eval(r#""hello""#, Value::String("hello".to_string()));
        assert_eval(":maj7", Value::Keyword("maj7".to_string()));
        assert_eval("()", Value::List(vec![]));
    }

    #[test]
    fn test_eval_prebound_globals() {
        assert_eval("true", Value::Boolean(true));
        assert_eval("false", Value::Boolean(false));
        assert_eval("nil", Value::Nil);
    }

    #[test]
    fn test_eval_symbol_lookup_unbound() {
        let err = assert_eval_error("y", "undefined symbol: y");
        assert_eq!(err.span(), Span::new(0, 1));
    }

    #[test]
    fn test_eval_vector_and_map() {
        assert_eval("[1 (+ 1 1) 3]", Value::Vector(vec![num(1.0), num(2.0), num(3.0)]));

        let mut expected = BTreeMap::new();
        expected.insert(":note".to_string(), num(60.0));
        expected.insert("amp".to_string(), num(0.5));
        assert_eval(r#"{:note 60 "amp" 0.5}"#, Value::Map(expected));

        assert_eval_error("{1 2}", "map keys must be keywords or strings, got number");
    }

    #[test]
    fn test_eval_map_value_before_key_check() {
        let mut interpreter = interpreter();
        let err = eval_str(&mut interpreter, r#"{1 (print "x")}"#).unwrap_err();
        assert!(matches!(err, EvalError::InvalidMapKey { found: "number", .. }));
        assert_eq!(interpreter.output(), &["\"x\"".to_string()]);
    }

    #[test]
    fn test_eval_if() {
        assert_eval("(if true 1 2)", num(1.0));
        assert_eval("(if false 1 2)", num(2.0));
        assert_eval("(if false 1)", Value::Nil);
        assert_eval("(if nil 1 2)", num(2.0));
        assert_eval("(if 0 1 2)", num(1.0)); // 0 is truthy
        assert_eval(r#"(if "" 1 2)"#, num(1.0));
        assert_eval("(if () 1 2)", num(1.0));
        assert_eval_error("(if true)", "if requires 2 or 3 arguments");
        assert_eval_error("(if true 1 2 3)", "if requires 2 or 3 arguments");
    }

    #[test]
    fn test_eval_if_evaluates_one_branch() {
        // The untaken branch would fail if evaluated.
        assert_eval("(if true 1 (undefined))", num(1.0));
        assert_eval("(if false (undefined) 2)", num(2.0));
    }

    #[test]
    fn test_eval_def() {
        let mut interpreter = interpreter();
        assert_eq!(eval_str(&mut interpreter, "(def x 10)"), Ok(num(10.0)));
        assert_eq!(eval_str(&mut interpreter, "(* x 2)"), Ok(num(20.0)));
        assert_eq!(eval_str(&mut interpreter, "x"), Ok(num(10.0)));

        assert_eval_error("(def x)", "def requires exactly 2 arguments");
        assert_eval_error("(def 1 2)", "def requires a symbol as first argument");
    }

    #[test]
    fn test_eval_defn_and_recursion() {
        assert_eval("(defn double [x] (* x 2)) (double 21)", num(42.0));
        assert_eval(
            "(defn fact [n] (if (< n 2) 1 (* n (fact (- n 1))))) (fact 5)",
            num(120.0),
        );
        assert_eval_error("(defn f [1] 1)", "function parameters must be symbols");
        assert_eval_error("(defn f (x) 1)", "defn requires a vector of parameters");
        assert_eval_error("(defn f [x])", "defn requires exactly 3 arguments");
    }

    #[test]
    fn test_eval_let() {
        assert_eval("(let [a 1 b (+ a 1)] (+ a b))", num(3.0));
        assert_eval("(let [] 5)", num(5.0));
        assert_eval_error("(let [a] a)", "let bindings must be an even number of forms");
        assert_eval_error("(let (a 1) a)", "let requires a vector of bindings");
        assert_eval_error("(let [1 2] 3)", "let binding names must be symbols");
    }

    #[test]
    fn test_let_does_not_leak() {
        let mut interpreter = interpreter();
        assert_eq!(
            eval_str(&mut interpreter, "(def a 10) (let [a 1] a)"),
            Ok(num(1.0))
        );
        assert_eq!(eval_str(&mut interpreter, "a"), Ok(num(10.0)));
    }

    #[test]
    fn test_eval_do() {
        assert_eval("(do 1 2 3)", num(3.0));
        assert_eval("(do)", Value::Nil);
    }

    #[test]
    fn test_eval_fn_and_closures() {
        assert_eval("((fn [x y] (+ x y)) 1 2)", num(3.0));
        assert_eval(
            "(defn adder [n] (fn [x] (+ x n))) (def add5 (adder 5)) (add5 10)",
            num(15.0),
        );
        // Lexical scope: the closure sees its defining frame, not the caller's.
        assert_eval(
            "(def n 1) (defn get-n [] n) (let [n 2] (get-n))",
            num(1.0),
        );
        assert_eval_error("(fn [x])", "fn requires exactly 2 arguments");
    }

    #[test]
    fn test_eval_arity_mismatch() {
        assert_eval_error(
            "(defn double [x] (* x 2)) (double 1 2)",
            "double expects 1 argument, got 2",
        );
        assert_eval_error("((fn [x] x))", "function expects 1 argument, got 0");
        assert_eval_error("((fn [a b] a) 1)", "function expects 2 arguments, got 1");
        assert_eval_error("((fn [] 1) 1)", "function expects 0 arguments, got 1");
    }

    #[test]
    fn test_eval_not_a_function() {
        assert_eval_error("(1 2)", "cannot call non-function: 1");
        assert_eval_error(r#"("a")"#, r#"cannot call non-function: "a""#);
    }

    #[test]
    fn test_call_depth_limit() {
        let mut interpreter = Interpreter::new(
            OfflineEngine::shared(),
            Config::default().with_max_call_depth(50),
        );
        let err = eval_str(&mut interpreter, "(defn loop [n] (loop n)) (loop 1)");
        assert!(matches!(
            err,
            Err(EvalError::CallDepthExceeded { limit: 50, .. })
        ));

        // Bounded recursion below the limit still works.
        interpreter.reset_call_depth();
        assert_eq!(
            eval_str(
                &mut interpreter,
                "(defn count [n] (if (< n 1) 0 (+ 1 (count (- n 1))))) (count 40)"
            ),
            Ok(num(40.0))
        );
    }

    #[test]
    fn test_default_depth_limit_message() {
        assert_eval_error(
            "(defn loop [n] (loop n)) (loop 1)",
            "maximum call depth exceeded (1000)",
        );
    }

    #[test]
    fn test_define_native() {
        fn answer(_: &mut Interpreter, _: Vec<Value>, _: Span) -> EvalResult {
            Ok(Value::Number(42.0))
        }
        let mut interpreter = interpreter();
        interpreter.define_native("answer", answer);
        assert_eq!(eval_str(&mut interpreter, "(answer)"), Ok(num(42.0)));
        assert!(interpreter.global_env().borrow().has("answer"));
    }

    #[test]
    fn test_special_form_identifiers() {
        let names = special_form_identifiers();
        for name in ["def", "defn", "let", "if", "do", "fn"] {
            assert!(names.contains(name));
        }
        assert_eq!(names.len(), 6);
    }
}
