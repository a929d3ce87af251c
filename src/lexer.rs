use logos::Logos;
use std::fmt;
use thiserror::Error;

use crate::source::Span;

// Shared character classes. A symbol never starts with a digit, and a `-`
// directly followed by a digit is the start of a number instead.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r\x0C]+")] // Skip whitespace
#[logos(skip r";[^\n]*\n?")] // Skip comments, including the newline
#[logos(error = LexerErrorKind)]
enum RawToken {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[regex(r"-?[0-9]+(\.[0-9]*)?", |lex| {
        let slice = lex.slice();
        slice
            .parse::<f64>()
            .map_err(|_| LexerErrorKind::InvalidNumberFormat(slice.to_string()))
    })]
    Number(f64),
    #[regex(r#""([^"\\]|\\(.|\n))*"?"#, |lex| {
        let slice = lex.slice();
        let len = slice.len();
        // make sure string was terminated
        if len == 1 || !slice.ends_with('"') {
            return Err(LexerErrorKind::UnterminatedString);
        }
        unescape::unescape(&slice[1..len - 1])
    })]
    String(String),
    #[regex(r":[a-zA-Z0-9_+*/<>=!?-]*", |lex| lex.slice()[1..].to_string())]
    Keyword(String),
    #[regex(
        r"[a-zA-Z_+*/<>=!?][a-zA-Z0-9_+*/<>=!?-]*|-([a-zA-Z_+*/<>=!?-][a-zA-Z0-9_+*/<>=!?-]*)?",
        |lex| lex.slice().to_string()
    )]
    Symbol(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Number(f64),
    String(String),
    Keyword(String), // stored without the leading ':'
    Symbol(String),
    Eof,
}

impl TokenKind {
    pub fn is_closer(&self) -> bool {
        matches!(self, TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace)
    }
}

impl From<RawToken> for TokenKind {
    fn from(raw: RawToken) -> Self {
        match raw {
            RawToken::LParen => TokenKind::LParen,
            RawToken::RParen => TokenKind::RParen,
            RawToken::LBracket => TokenKind::LBracket,
            RawToken::RBracket => TokenKind::RBracket,
            RawToken::LBrace => TokenKind::LBrace,
            RawToken::RBrace => TokenKind::RBrace,
            RawToken::Number(n) => TokenKind::Number(n),
            RawToken::String(s) => TokenKind::String(s),
            RawToken::Keyword(k) => TokenKind::Keyword(k),
            RawToken::Symbol(s) => TokenKind::Symbol(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

mod unescape {
    use super::{LexerErrorKind, LexerResult};

    // Only \" and \n are escapes. Any other backslash pair is kept verbatim.
    pub fn unescape(s: &str) -> LexerResult<String> {
        // un-escaping should only ever reduce the length of the string.
        let mut result = String::with_capacity(s.len());
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => result.push('\n'),
                    Some('"') => result.push('"'),
                    Some(other) => {
                        result.push('\\');
                        result.push(other);
                    }
                    None => return Err(LexerErrorKind::UnterminatedString),
                }
            } else {
                result.push(c);
            }
        }
        Ok(result)
    }
}

// Implement Display for easy printing
impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "\"{}\"", s), // Display with quotes for clarity
            TokenKind::Keyword(k) => write!(f, ":{}", k),
            TokenKind::Symbol(s) => write!(f, "{}", s),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Error)]
pub enum LexerErrorKind {
    #[error("unexpected character: '{0}'")]
    UnexpectedCharacter(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid number format: '{0}'")]
    InvalidNumberFormat(String),
    /// Raw scanner failure. `tokenize` reports it as `UnexpectedCharacter`.
    #[default]
    #[error("invalid token")]
    InvalidToken,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct LexerError {
    pub error: LexerErrorKind,
    pub span: Span,
}

// Result type alias for convenience
type LexerResult<T> = Result<T, LexerErrorKind>;

// Result type alias for convenience
type LexerRangedResult<T> = Result<T, LexerError>;

/// Scans `input` into tokens. A successful scan always ends with exactly one
/// `Eof` token positioned at the end of the input.
pub fn tokenize(input: &str) -> LexerRangedResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut lexer = RawToken::lexer(input);

    while let Some(result) = lexer.next() {
        let span = Span::from(lexer.span());
        match result {
            Ok(raw) => tokens.push(Token {
                kind: raw.into(),
                span,
            }),
            Err(LexerErrorKind::InvalidToken) => {
                let found = lexer.slice().chars().next().unwrap_or_default();
                return Err(LexerError {
                    error: LexerErrorKind::UnexpectedCharacter(found),
                    span,
                });
            }
            Err(error) => return Err(LexerError { error, span }),
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::point(input.len()),
    });
    Ok(tokens)
}
