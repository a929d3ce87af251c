use crate::audio::{OfflineEngine, SharedEngine};
use crate::config::Config;
use crate::environment::Environment;
use crate::evaluator::{EvalError, Interpreter};
use crate::parser::{ParseError, parse_str};
use crate::source::Span;
use crate::value::{self, Value};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, instrument};

/// Anything that can stop a façade evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl RuntimeError {
    pub fn span(&self) -> Span {
        match self {
            RuntimeError::Parse(err) => err.span(),
            RuntimeError::Eval(err) => err.span(),
        }
    }
}

/// Outcome of one `Runtime::eval` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub result: Result<Value, RuntimeError>,
    /// Lines printed during this call, including those before a failure.
    pub output: Vec<String>,
}

impl Evaluation {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn value(&self) -> Option<&Value> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&RuntimeError> {
        self.result.as_ref().err()
    }
}

/// Host-facing entry point: a persistent session that evaluates source text.
pub struct Runtime {
    interpreter: Interpreter,
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new(OfflineEngine::shared())
    }
}

impl Runtime {
    pub fn new(engine: SharedEngine) -> Self {
        Runtime::with_config(engine, Config::default())
    }

    pub fn with_config(engine: SharedEngine, config: Config) -> Self {
        Runtime {
            interpreter: Interpreter::new(engine, config),
        }
    }

    /// Evaluates every form in `code` against the session's global frame and
    /// returns the last value. The first error stops evaluation; definitions
    /// made before it stay in place.
    #[instrument(level = "debug", skip_all, fields(len = code.len()))]
    pub fn eval(&mut self, code: &str) -> Evaluation {
        self.interpreter.clear_output();
        self.interpreter.reset_call_depth();

        let result = self.run(code);
        if let Err(err) = &result {
            debug!(error = %err, "evaluation failed");
        }
        Evaluation {
            result,
            output: self.interpreter.take_output(),
        }
    }

    fn run(&mut self, code: &str) -> Result<Value, RuntimeError> {
        let forms = parse_str(code)?;
        debug!(forms = forms.len(), "parsed");

        let env = self.interpreter.global_env();
        let mut last = Value::Nil;
        for form in &forms {
            last = self.interpreter.eval(form, &env)?;
        }
        Ok(last)
    }

    /// Evaluates each entry independently, in order, in the same session.
    pub fn eval_multi<I, S>(&mut self, lines: I) -> Vec<Evaluation>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines
            .into_iter()
            .map(|line| self.eval(line.as_ref()))
            .collect()
    }

    /// Checks that `code` lexes and parses. Nothing is evaluated.
    pub fn validate(&self, code: &str) -> Result<(), ParseError> {
        parse_str(code).map(|_| ())
    }

    pub fn format_value(&self, value: &Value) -> String {
        value::format_value(value)
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn interpreter_mut(&mut self) -> &mut Interpreter {
        &mut self.interpreter
    }

    pub fn global_env(&self) -> Rc<RefCell<Environment>> {
        self.interpreter.global_env()
    }
}
