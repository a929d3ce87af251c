use crate::environment::Environment;
use crate::evaluator::{EvalResult, Interpreter};
use crate::source::Span;
use crate::types::Node;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// A value produced by evaluation.
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    String(String),
    Keyword(String), // without the leading ':'
    Boolean(bool),
    Nil,
    Function(Function),
    List(Vec<Value>),
    Vector(Vec<Value>),
    /// Keys are normalized: `:name` for keywords, raw text for strings.
    Map(BTreeMap<String, Value>),
    SynthNode(SynthNode),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Keyword(_) => "keyword",
            Value::Boolean(_) => "boolean",
            Value::Nil => "nil",
            Value::Function(_) => "function",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Map(_) => "map",
            Value::SynthNode(_) => "synth-node",
        }
    }

    /// `nil` and `false` are falsy, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Boolean(b) => *b,
            _ => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text of a keyword or string, used wherever a name is accepted.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Value::Keyword(s) | Value::String(s) => Some(s),
            _ => None,
        }
    }
}

// Host-side equality: structural for data, identity for functions.
// The language's own `=` is stricter, see `primitives::prim_equals`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::SynthNode(a), Value::SynthNode(b)) => a == b,
            _ => false,
        }
    }
}

pub type NativeFunc = fn(&mut Interpreter, Vec<Value>, Span) -> EvalResult<Value>;

#[derive(Clone)]
pub enum Function {
    UserDefined(Rc<Lambda>),
    Native(Native),
}

impl Function {
    pub fn name(&self) -> Option<&str> {
        match self {
            Function::UserDefined(lambda) => lambda.name.as_deref(),
            Function::Native(native) => Some(&native.name),
        }
    }
}

pub struct Lambda {
    pub params: Vec<String>,
    pub body: Node,
    pub closure: Rc<RefCell<Environment>>,
    pub name: Option<String>,
}

#[derive(Clone)]
pub struct Native {
    pub name: String,
    pub func: NativeFunc,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::UserDefined(lambda) => write!(
                f,
                "Lambda({}, [{}])",
                lambda.name.as_deref().unwrap_or("anonymous"),
                lambda.params.join(" ")
            ),
            Function::Native(native) => write!(f, "Native({})", native.name),
        }
    }
}

// Function pointers don't compare reliably, so natives compare by name and
// lambdas by identity.
impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Function::UserDefined(a), Function::UserDefined(b)) => Rc::ptr_eq(a, b),
            (Function::Native(a), Function::Native(b)) => a.name == b.name,
            _ => false,
        }
    }
}

/// Handle to a running synth in the audio engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthNode {
    pub id: i64,
    pub synth: String,
    pub params: BTreeMap<String, f64>,
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        // Covers -0 as well.
        "0".to_string()
    } else {
        n.to_string()
    }
}

fn format_sequence(elements: &[Value]) -> String {
    elements
        .iter()
        .map(format_value)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical textual form of a value, as shown by the REPL and `print`.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        Value::String(s) => format!("\"{}\"", s),
        Value::Keyword(k) => format!(":{}", k),
        Value::Boolean(b) => b.to_string(),
        Value::Nil => "nil".to_string(),
        Value::Function(function) => {
            format!("<function {}>", function.name().unwrap_or("anonymous"))
        }
        Value::List(elements) => format!("({})", format_sequence(elements)),
        Value::Vector(elements) => format!("[{}]", format_sequence(elements)),
        Value::Map(pairs) => {
            let pairs: Vec<String> = pairs
                .iter()
                .map(|(key, value)| format!("{} {}", key, format_value(value)))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        }
        Value::SynthNode(node) => format!("<synth-node {} #{}>", node.synth, node.id),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_value(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(ns: &[f64]) -> Vec<Value> {
        ns.iter().map(|n| Value::Number(*n)).collect()
    }

    #[test]
    fn test_format_atoms() {
        assert_eq!(format_value(&Value::Number(6.0)), "6");
        assert_eq!(format_value(&Value::Number(2.5)), "2.5");
        assert_eq!(format_value(&Value::Number(-0.0)), "0");
        assert_eq!(format_value(&Value::Number(f64::INFINITY)), "Infinity");
        assert_eq!(format_value(&Value::String("hi".into())), "\"hi\"");
        assert_eq!(format_value(&Value::Keyword("maj7".into())), ":maj7");
        assert_eq!(format_value(&Value::Boolean(true)), "true");
        assert_eq!(format_value(&Value::Nil), "nil");
    }

    #[test]
    fn test_format_collections() {
        assert_eq!(format_value(&Value::List(numbers(&[1.0, 2.0, 3.0]))), "(1 2 3)");
        assert_eq!(format_value(&Value::Vector(numbers(&[60.0, 64.0]))), "[60 64]");
        assert_eq!(format_value(&Value::List(vec![])), "()");

        let mut pairs = BTreeMap::new();
        pairs.insert(":note".to_string(), Value::Number(60.0));
        pairs.insert(":amp".to_string(), Value::Number(0.5));
        assert_eq!(format_value(&Value::Map(pairs)), "{:amp 0.5, :note 60}");
    }

    #[test]
    fn test_format_synth_node() {
        let node = SynthNode {
            id: 1000,
            synth: "sonic-pi-saw".into(),
            params: BTreeMap::new(),
        };
        assert_eq!(
            Value::SynthNode(node).to_string(),
            "<synth-node sonic-pi-saw #1000>"
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(Value::Boolean(true).is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::String(String::new()).is_truthy());
        assert!(Value::List(vec![]).is_truthy());
    }
}
