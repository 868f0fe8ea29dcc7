//! Lexical tokens of a directive line.

use std::fmt;

/// Character offsets of a token inside its line (0-based, end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// 1-based column of the first character, as shown to users.
    pub fn column(&self) -> usize {
        self.start + 1
    }
}

/// Token kinds produced by the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Unquoted text.
    Word,
    /// `'...'` or `"..."`, value unescaped.
    QuotedString,
    /// Unquoted integer or decimal.
    Number,
    /// Unquoted comma-separated text.
    List,
    /// `exp:{ ... }`, value is the body between the outer braces.
    ExpressionBlock,
    /// Statement terminator `;`.
    Delimiter,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Word => "word",
            TokenKind::QuotedString => "quoted string",
            TokenKind::Number => "number",
            TokenKind::List => "list",
            TokenKind::ExpressionBlock => "expression block",
            TokenKind::Delimiter => "delimiter",
        };
        f.write_str(name)
    }
}

/// A single token: kind, raw source text, interpreted value and location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Exactly as written in the line, quotes and markers included.
    pub text: String,
    /// Unescaped string contents, expression body, or the raw text otherwise.
    pub value: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, value: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            value: value.into(),
            span,
        }
    }

    /// Comma-split elements of a list (a single element for any other kind).
    pub fn elements(&self) -> Vec<&str> {
        match self.kind {
            TokenKind::List => self.value.split(',').collect(),
            _ => vec![self.value.as_str()],
        }
    }

    pub fn is_delimiter(&self) -> bool {
        self.kind == TokenKind::Delimiter
    }
}
