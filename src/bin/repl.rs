use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;

use cadenza::{
    Diagnostic, Environment, LexerErrorKind, ParseError, Runtime, TokenKind, parse_str,
    special_form_identifiers, tokenize,
};
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Cmd, Completer, Context, Editor, EventHandler, KeyCode, KeyEvent, Modifiers};
use rustyline::{Helper, Highlighter, Hinter, Validator};

const HISTORY_FILE: &str = "cadenza_history.txt";

struct CadenzaCompleter {
    env: Rc<RefCell<Environment>>,
}

impl CadenzaCompleter {
    fn new(env: Rc<RefCell<Environment>>) -> Self {
        CadenzaCompleter { env }
    }
}

impl rustyline::completion::Completer for CadenzaCompleter {
    type Candidate = String;
    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        // Only complete a symbol that ends right at the cursor.
        let prefix = match tokenize(&line[..pos]) {
            Ok(tokens) => tokens
                .iter()
                .rev()
                .find(|token| token.kind != TokenKind::Eof)
                .filter(|token| token.span.end == pos)
                .and_then(|token| match &token.kind {
                    TokenKind::Symbol(prefix) => Some(prefix.clone()),
                    _ => None,
                }),
            Err(_) => None,
        };
        let Some(prefix) = prefix else {
            return Ok((pos, vec![]));
        };

        let mut candidates: Vec<String> = self
            .env
            .borrow()
            .get_identifiers()
            .union(&special_form_identifiers())
            .filter_map(|id| id.strip_prefix(prefix.as_str()).map(str::to_string))
            .filter(|rest| !rest.is_empty())
            .collect();
        candidates.sort();
        Ok((pos, candidates))
    }
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct InputValidator {
    #[rustyline(Validator)]
    validator: CadenzaValidator,
    #[rustyline(Highlighter)]
    highlighter: CadenzaHighlighter,
    #[rustyline(Completer)]
    completer: CadenzaCompleter,
}

struct CadenzaValidator;

impl Validator for CadenzaValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        match parse_str(ctx.input()) {
            // Keep reading while a form or string is still open.
            Err(ParseError::UnexpectedEof { .. }) => Ok(ValidationResult::Incomplete),
            Err(ParseError::Lexer(err)) if err.error == LexerErrorKind::UnterminatedString => {
                Ok(ValidationResult::Incomplete)
            }
            // Anything else is submitted and reported by the evaluator.
            _ => Ok(ValidationResult::Valid(None)),
        }
    }
}

struct CadenzaHighlighter;

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_-+*/<>=!?".contains(c)
}

impl Highlighter for CadenzaHighlighter {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        // (bracket, offset in `highlighted`, offset in `line`)
        let mut stack: Vec<(char, usize, usize)> = Vec::new();
        let mut highlighted = String::new();
        let mut in_string = false;
        let mut in_keyword = false;
        let mut in_comment = false;
        let mut escape = false;
        let cursor = pos.checked_sub(1);

        for (i, c) in line.chars().enumerate() {
            if in_comment {
                highlighted.push_str(&format!("\x1b[90m{}\x1b[0m", c)); // Gray for comments
                continue;
            }
            if in_string {
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == '"' {
                    in_string = false;
                }
                highlighted.push_str(&format!("\x1b[32m{}\x1b[0m", c)); // Green for strings
                continue;
            }
            if in_keyword {
                if is_symbol_char(c) {
                    highlighted.push_str(&format!("\x1b[33m{}\x1b[0m", c)); // Yellow for keywords
                    continue;
                }
                in_keyword = false;
            }

            match c {
                '"' => {
                    in_string = true;
                    highlighted.push_str(&format!("\x1b[32m{}\x1b[0m", c));
                }
                ':' => {
                    in_keyword = true;
                    highlighted.push_str(&format!("\x1b[33m{}\x1b[0m", c));
                }
                ';' => {
                    in_comment = true;
                    highlighted.push_str(&format!("\x1b[90m{}\x1b[0m", c));
                }
                '(' | '[' | '{' => {
                    stack.push((c, highlighted.len(), i));
                    highlighted.push(c);
                }
                ')' | ']' | '}' => {
                    if let Some((opening, matching_pos, opening_index)) = stack.pop() {
                        if (opening == '(' && c == ')')
                            || (opening == '[' && c == ']')
                            || (opening == '{' && c == '}')
                        {
                            if cursor == Some(opening_index) || cursor == Some(i) {
                                highlighted.push_str(&format!("\x1b[34m{}\x1b[0m", c)); // Blue for matching brackets
                                highlighted.replace_range(
                                    matching_pos..=matching_pos,
                                    &format!("\x1b[1;34m{}\x1b[0m", opening),
                                );
                            } else {
                                highlighted.push(c);
                            }
                        } else {
                            highlighted.push_str(&format!("\x1b[31m{}\x1b[0m", c)); // Red for mismatched brackets
                            highlighted.replace_range(
                                matching_pos..=matching_pos,
                                &format!("\x1b[1;31m{}\x1b[0m", opening),
                            );
                        }
                    } else {
                        highlighted.push_str(&format!("\x1b[31m{}\x1b[0m", c)); // Red for unmatched closing brackets
                    }
                }
                _ => {
                    highlighted.push(c);
                }
            }
        }

        Cow::Owned(highlighted)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

fn main() -> rustyline::Result<()> {
    cadenza::init_tracing();

    println!("Cadenza REPL v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl-D to quit.");

    let mut runtime = Runtime::default();
    let h = InputValidator {
        highlighter: CadenzaHighlighter,
        validator: CadenzaValidator,
        completer: CadenzaCompleter::new(runtime.global_env()),
    };
    let config = rustyline::config::Config::builder()
        .edit_mode(rustyline::EditMode::Vi)
        .build();
    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(h));
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('s'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::Newline),
    );
    if rl.load_history(HISTORY_FILE).is_err() {
        println!("No previous history.");
    }

    loop {
        let readline = rl.readline("cadenza> ");
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let trimmed_input = line.trim();
                if trimmed_input.is_empty() {
                    continue;
                }
                if trimmed_input.eq_ignore_ascii_case("exit") {
                    break;
                }

                let evaluation = runtime.eval(trimmed_input);
                for output_line in &evaluation.output {
                    println!("{}", output_line);
                }
                match &evaluation.result {
                    Ok(value) => println!("{}", runtime.format_value(value)),
                    Err(err) => err.pretty_print(trimmed_input),
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C
                println!("Interrupted. Type 'exit' or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D
                println!("\nExiting.");
                break;
            }
            Err(err) => {
                eprintln!("Readline Error: {:?}", err);
                break;
            }
        }
    }
    rl.save_history(HISTORY_FILE)
}
