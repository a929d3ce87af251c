use crate::source::Span;
use std::fmt; // For custom display formatting

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: Expr, // The actual S-expression data
    pub span: Span, // The source span it covers
}

impl Node {
    pub fn new(kind: Expr, span: Span) -> Self {
        Node { kind, span }
    }

    pub fn new_number(n: f64, span: Span) -> Self {
        Node::new(Expr::Number(n), span)
    }

    pub fn new_string(s: &str, span: Span) -> Self {
        Node::new(Expr::String(s.to_string()), span)
    }

    pub fn new_keyword(k: &str, span: Span) -> Self {
        Node::new(Expr::Keyword(k.to_string()), span)
    }

    pub fn new_symbol(s: &str, span: Span) -> Self {
        Node::new(Expr::Symbol(s.to_string()), span)
    }

    /// Returns the symbol name if this node is a bare symbol.
    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            Expr::Symbol(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Delegate to Expr's Display implementation
        write!(f, "{}", self.kind)
    }
}

/// A parsed form. Produced once per parse and never mutated by evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    String(String),
    Keyword(String), // without the leading ':'
    Symbol(String),
    List(Vec<Node>),         // ( ... )
    Vector(Vec<Node>),       // [ ... ]
    Map(Vec<(Node, Node)>),  // { k v ... }, pairs in source order
}

fn write_joined(f: &mut fmt::Formatter<'_>, nodes: &[Node]) -> fmt::Result {
    let mut first = true;
    for node in nodes {
        if !first {
            write!(f, " ")?;
        }
        write!(f, "{}", node)?;
        first = false;
    }
    Ok(())
}

// Renders the form back into source syntax.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::String(str) => {
                write!(
                    f,
                    "\"{}\"",
                    str.chars().fold(String::new(), |mut acc, char| {
                        match char {
                            '"' => acc.push_str("\\\""),
                            '\n' => acc.push_str("\\n"),
                            c => acc.push(c),
                        }
                        acc
                    })
                )
            }
            Expr::Keyword(k) => write!(f, ":{}", k),
            Expr::Symbol(s) => write!(f, "{}", s),
            Expr::List(elements) => {
                write!(f, "(")?;
                write_joined(f, elements)?;
                write!(f, ")")
            }
            Expr::Vector(elements) => {
                write!(f, "[")?;
                write_joined(f, elements)?;
                write!(f, "]")
            }
            Expr::Map(pairs) => {
                write!(f, "{{")?;
                let mut first = true;
                for (key, value) in pairs {
                    if !first {
                        write!(f, " ")?;
                    }
                    write!(f, "{} {}", key, value)?;
                    first = false;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(kind: Expr) -> Node {
        Node::new(kind, Span::default())
    }

    #[test]
    fn test_display_round_trips_source_form() {
        let node = n(Expr::List(vec![
            n(Expr::Symbol("synth".into())),
            n(Expr::Keyword("saw".into())),
            n(Expr::Map(vec![(
                n(Expr::Keyword("note".into())),
                n(Expr::Number(60.0)),
            )])),
            n(Expr::Vector(vec![n(Expr::Number(1.5)), n(Expr::String("a\"b".into()))])),
        ]));
        assert_eq!(node.to_string(), r#"(synth :saw {:note 60} [1.5 "a\"b"])"#);
    }

    #[test]
    fn test_as_symbol() {
        assert_eq!(n(Expr::Symbol("x".into())).as_symbol(), Some("x"));
        assert_eq!(n(Expr::Keyword("x".into())).as_symbol(), None);
    }
}
