use crate::evaluator::EvalError;
use crate::parser::ParseError;
use crate::runtime::RuntimeError;
use crate::source::Span;
use ariadne::{Label, Report, ReportKind, Source};
use std::ops::Range;

const SOURCE_ID: &str = "input";

type ErrorReport = Report<'static, (&'static str, Range<usize>)>;

/// Errors that can be shown against the source text they came from.
pub trait Diagnostic: std::fmt::Display {
    fn span(&self) -> Span;

    /// Text attached to the highlighted span.
    fn label(&self) -> String;

    /// Renders the report as plain text, without colors.
    fn render(&self, input: &str) -> String {
        let mut buffer = Vec::new();
        let written = build_report(self, input, false)
            .write((SOURCE_ID, Source::from(input)), &mut buffer);
        match written {
            Ok(()) => String::from_utf8_lossy(&buffer).into_owned(),
            Err(_) => self.to_string(),
        }
    }

    /// Prints the report to stderr.
    fn pretty_print(&self, input: &str) {
        if build_report(self, input, true)
            .eprint((SOURCE_ID, Source::from(input)))
            .is_err()
        {
            eprintln!("error: {}", self);
        }
    }
}

fn build_report<D: Diagnostic + ?Sized>(error: &D, input: &str, color: bool) -> ErrorReport {
    let range = label_range(error.span(), input.len());
    Report::build(ReportKind::Error, (SOURCE_ID, range.clone()))
        .with_config(ariadne::Config::default().with_color(color))
        .with_message(error.to_string())
        .with_label(Label::new((SOURCE_ID, range)).with_message(error.label()))
        .finish()
}

// Zero-width spans (end of input) point at the character before them.
fn label_range(span: Span, len: usize) -> Range<usize> {
    let range = span.to_range();
    if range.is_empty() && range.start > 0 {
        let end = range.start.min(len);
        end.saturating_sub(1)..end
    } else {
        range
    }
}

impl Diagnostic for EvalError {
    fn span(&self) -> Span {
        EvalError::span(self)
    }

    fn label(&self) -> String {
        match self {
            EvalError::UndefinedSymbol { .. } => "not defined in this scope".to_string(),
            EvalError::NotAFunction { .. } => "this cannot be called".to_string(),
            EvalError::ArityMismatch {
                expected, found, ..
            } => format!(
                "expected {} argument{}, got {}",
                expected,
                if *expected == 1 { "" } else { "s" },
                found
            ),
            EvalError::InvalidArguments(..) => "in this call".to_string(),
            EvalError::TypeMismatch {
                expected, found, ..
            } => format!("expected a {}, found {}", expected, found),
            EvalError::DivisionByZero(_) => "a divisor here is zero".to_string(),
            EvalError::InvalidNote(..) => "not a note name".to_string(),
            EvalError::UnknownPattern { kind, name, .. } => {
                format!("no {} type named `{}`", kind, name)
            }
            EvalError::InvalidSpecialForm(..) => "this form is malformed".to_string(),
            EvalError::InvalidMapKey { .. } => "keys must be keywords or strings".to_string(),
            EvalError::CallDepthExceeded { .. } => "recursion limit reached here".to_string(),
        }
    }
}

impl Diagnostic for ParseError {
    fn span(&self) -> Span {
        ParseError::span(self)
    }

    fn label(&self) -> String {
        match self {
            ParseError::UnexpectedToken { expected, .. }
            | ParseError::UnexpectedEof { expected, .. } => format!("expected {}", expected),
            ParseError::OddMapForms(_) => "this key has no value".to_string(),
            ParseError::Lexer(lex_err) => lex_err.error.to_string(),
        }
    }
}

impl Diagnostic for RuntimeError {
    fn span(&self) -> Span {
        RuntimeError::span(self)
    }

    fn label(&self) -> String {
        match self {
            RuntimeError::Parse(err) => err.label(),
            RuntimeError::Eval(err) => err.label(),
        }
    }
}
