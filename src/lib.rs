//! Cadenza: a small Lisp for live music coding.
//!
//! Source text is tokenized, parsed into S-expressions and evaluated by a
//! tree-walking interpreter. Music natives drive an external audio engine
//! through the [`AudioEngine`] trait.

pub mod audio;
pub mod config;
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod music;
pub mod parser;
pub mod pretty_print;
pub mod primitives;
pub mod runtime;
pub mod source;
pub mod stack;
pub mod types;
pub mod value;

pub use audio::{AudioEngine, OfflineEngine, OscArg, OscMessage, SharedEngine};
pub use config::Config;
pub use environment::Environment;
pub use evaluator::{EvalError, EvalResult, Interpreter, special_form_identifiers};
pub use lexer::{LexerError, LexerErrorKind, Token, TokenKind, tokenize};
pub use parser::{ParseError, Parser, parse_str};
pub use pretty_print::Diagnostic;
pub use runtime::{Evaluation, Runtime, RuntimeError};
pub use source::Span;
pub use types::{Expr, Node};
pub use value::{Function, SynthNode, Value, format_value};

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static TRACING_INIT: Once = Once::new();

/// Installs a stderr log subscriber filtered by `RUST_LOG`.
///
/// Does nothing when `RUST_LOG` is unset, and only the first call has any
/// effect. Library code never calls this; hosts do.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_err() {
            return;
        }
        let filter = EnvFilter::from_default_env();
        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .try_init();
    });
}
