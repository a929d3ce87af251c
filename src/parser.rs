use crate::lexer::{LexerError, Token, TokenKind};
use crate::source::Span;
use crate::stack::ensure_sufficient_stack;
use crate::types::{Expr, Node};
use std::fmt;
use std::iter::Peekable;
use std::vec::IntoIter; // To iterate over Vec<Token>
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected token: '{found}'")]
    UnexpectedToken { found: Token, expected: String },
    #[error("unexpected end of input")]
    UnexpectedEof { expected: String, span: Span },
    #[error("map literal must have an even number of forms")]
    OddMapForms(Span),
    #[error(transparent)]
    Lexer(#[from] LexerError),
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { found, .. } => found.span,
            ParseError::UnexpectedEof { span, .. } => *span,
            ParseError::OddMapForms(span) => *span,
            ParseError::Lexer(lex_err) => lex_err.span,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

// Result type alias for convenience
type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    // We iterate over owned Tokens, consuming them.
    tokens: Peekable<IntoIter<Token>>,
    // End offset of the last consumed token, for errors when the stream is exhausted.
    last_end: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens: tokens.into_iter().peekable(),
            last_end: 0,
        }
    }

    // Consumes the next token if available.
    fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.next();
        if let Some(token) = &token {
            self.last_end = token.span.end;
        }
        token
    }

    fn at_end(&mut self) -> bool {
        matches!(
            self.tokens.peek(),
            None | Some(Token {
                kind: TokenKind::Eof,
                ..
            })
        )
    }

    fn eof(&self, expected: &str, token: Option<Token>) -> ParseError {
        ParseError::UnexpectedEof {
            expected: expected.to_string(),
            span: token.map_or(Span::point(self.last_end), |t| t.span),
        }
    }

    /// Parses exactly one form and advances past it.
    pub fn parse_form(&mut self) -> ParseResult<Node> {
        let token = self.next_token();
        self.parse_form_with_token(token)
    }

    fn parse_form_with_token(&mut self, token: Option<Token>) -> ParseResult<Node> {
        ensure_sufficient_stack(|| match token {
            Some(Token {
                kind: TokenKind::LParen,
                span,
            }) => {
                let (elements, span) = self.parse_sequence(span, TokenKind::RParen, "')'")?;
                Ok(Node::new(Expr::List(elements), span))
            }
            Some(Token {
                kind: TokenKind::LBracket,
                span,
            }) => {
                let (elements, span) = self.parse_sequence(span, TokenKind::RBracket, "']'")?;
                Ok(Node::new(Expr::Vector(elements), span))
            }
            Some(Token {
                kind: TokenKind::LBrace,
                span,
            }) => self.parse_map(span),
            Some(Token {
                kind: TokenKind::Eof,
                span,
            }) => Err(ParseError::UnexpectedEof {
                expected: "a form".to_string(),
                span,
            }),
            Some(atom) => self.parse_atom(atom),
            None => Err(self.eof("a form", None)),
        })
    }

    /// Parses an atomic expression (number, string, keyword, symbol).
    fn parse_atom(&mut self, token: Token) -> ParseResult<Node> {
        Ok(Node::new(
            match token.kind {
                TokenKind::Number(n) => Expr::Number(n),
                TokenKind::String(s) => Expr::String(s),
                TokenKind::Keyword(k) => Expr::Keyword(k),
                TokenKind::Symbol(s) => Expr::Symbol(s),
                other_token => Err(ParseError::UnexpectedToken {
                    found: Token {
                        kind: other_token,
                        span: token.span,
                    },
                    expected: "a form".to_string(),
                })?,
            },
            token.span,
        ))
    }

    /// Parses forms up to the `close` delimiter; returns them with the span
    /// from the opening to the closing delimiter.
    fn parse_sequence(
        &mut self,
        open: Span,
        close: TokenKind,
        expected: &str,
    ) -> ParseResult<(Vec<Node>, Span)> {
        let mut elements = Vec::new();
        loop {
            match self.next_token() {
                Some(Token { kind, span }) if kind == close => {
                    return Ok((elements, open.merge(span)));
                }
                Some(
                    token @ Token {
                        kind: TokenKind::Eof,
                        ..
                    },
                ) => return Err(self.eof(expected, Some(token))),
                None => return Err(self.eof(expected, None)),
                Some(token) if token.kind.is_closer() => {
                    return Err(ParseError::UnexpectedToken {
                        found: token,
                        expected: expected.to_string(),
                    });
                }
                token => elements.push(self.parse_form_with_token(token)?),
            }
        }
    }

    fn stray_closer(found: Token) -> ParseError {
        ParseError::UnexpectedToken {
            found,
            expected: "'}'".to_string(),
        }
    }

    /// Parses a map literal `{k v ...}`. Keys and values are plain forms;
    /// checking that keys are keywords or strings is left to evaluation.
    fn parse_map(&mut self, open: Span) -> ParseResult<Node> {
        let mut pairs = Vec::new();
        loop {
            let key = match self.next_token() {
                Some(Token {
                    kind: TokenKind::RBrace,
                    span,
                }) => return Ok(Node::new(Expr::Map(pairs), open.merge(span))),
                Some(
                    token @ Token {
                        kind: TokenKind::Eof,
                        ..
                    },
                ) => return Err(self.eof("'}'", Some(token))),
                None => return Err(self.eof("'}'", None)),
                Some(token) if token.kind.is_closer() => return Err(Self::stray_closer(token)),
                token => self.parse_form_with_token(token)?,
            };

            match self.next_token() {
                Some(Token {
                    kind: TokenKind::RBrace | TokenKind::Eof,
                    span,
                }) => return Err(ParseError::OddMapForms(open.merge(span))),
                None => {
                    return Err(ParseError::OddMapForms(
                        open.merge(Span::point(self.last_end)),
                    ));
                }
                Some(token) if token.kind.is_closer() => return Err(Self::stray_closer(token)),
                token => {
                    let value = self.parse_form_with_token(token)?;
                    pairs.push((key, value));
                }
            }
        }
    }

    /// Parses every top-level form until the end of input.
    pub fn parse_all(&mut self) -> ParseResult<Vec<Node>> {
        let mut forms = Vec::new();
        while !self.at_end() {
            forms.push(self.parse_form()?);
        }
        Ok(forms)
    }
}

// Helper function to lex and parse a string directly (useful for tests and REPL)
pub fn parse_str(input: &str) -> ParseResult<Vec<Node>> {
    let tokens = crate::lexer::tokenize(input)?;
    Parser::new(tokens).parse_all()
}
