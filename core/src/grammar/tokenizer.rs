//! Line tokenizer.
//!
//! Splits one directive line on whitespace while keeping quoted spans,
//! comma lists and `exp:{ ... }` blocks intact. Both grammar versions go
//! through the same tokenizer; the parser decides what each token means at
//! its argument position.

use super::token::{Span, Token, TokenKind};
use crate::error::{ParseError, ParseResult};

/// Marker opening an expression block.
pub const EXPRESSION_OPEN: &str = "exp:{";

const ESCAPE: char = '\\';
const TERMINATOR: char = ';';

/// Tokenize a single directive line.
///
/// Fails with [`ParseError::Syntax`] carrying the 1-based column of the
/// opening quote or `exp:{` marker that was never closed.
pub fn tokenize(line: &str) -> ParseResult<Vec<Token>> {
    Tokenizer::new(line).run()
}

struct Tokenizer {
    chars: Vec<char>,
    cursor: usize,
}

impl Tokenizer {
    fn new(line: &str) -> Self {
        Self {
            chars: line.chars().collect(),
            cursor: 0,
        }
    }

    fn run(mut self) -> ParseResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let Some(c) = self.peek() else { break };

            let token = if c == TERMINATOR {
                let start = self.cursor;
                self.cursor += 1;
                Token::new(TokenKind::Delimiter, ";", ";", Span::new(start, self.cursor))
            } else if self.at_expression_open() {
                self.scan_expression()?
            } else {
                self.scan_word()?
            };
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.cursor).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.cursor += 1;
        }
    }

    fn at_expression_open(&self) -> bool {
        let marker: Vec<char> = EXPRESSION_OPEN.chars().collect();
        self.chars
            .get(self.cursor..self.cursor + marker.len())
            .is_some_and(|window| window == marker.as_slice())
    }

    fn text(&self, span: Span) -> String {
        self.chars[span.start..span.end].iter().collect()
    }

    /// `exp:{` up to the matching `}`; only brace depth is tracked.
    fn scan_expression(&mut self) -> ParseResult<Token> {
        let start = self.cursor;
        self.cursor += EXPRESSION_OPEN.chars().count();
        let body_start = self.cursor;
        let mut depth = 1usize;

        while let Some(c) = self.peek() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let body = self.text(Span::new(body_start, self.cursor));
                        self.cursor += 1;
                        let span = Span::new(start, self.cursor);
                        return Ok(Token::new(TokenKind::ExpressionBlock, self.text(span), body, span));
                    }
                }
                _ => {}
            }
            self.cursor += 1;
        }

        Err(ParseError::syntax(start + 1, "unterminated expression block"))
    }

    /// Consume a quoted span starting at the cursor, returning its unescaped
    /// contents. The cursor ends after the closing quote.
    fn scan_quoted(&mut self) -> ParseResult<String> {
        let open = self.cursor;
        let quote = self.chars[open];
        self.cursor += 1;
        let mut value = String::new();

        while let Some(c) = self.peek() {
            if c == ESCAPE {
                match self.chars.get(self.cursor + 1).copied() {
                    Some(next) if next == quote || next == ESCAPE => {
                        value.push(next);
                        self.cursor += 2;
                    }
                    _ => {
                        value.push(c);
                        self.cursor += 1;
                    }
                }
                continue;
            }
            if c == quote {
                self.cursor += 1;
                return Ok(value);
            }
            value.push(c);
            self.cursor += 1;
        }

        Err(ParseError::syntax(open + 1, format!("unterminated {quote}-quoted string")))
    }

    /// Contiguous non-whitespace text. A quote opens a quoted segment only
    /// at the start of the word (`'a b'`, `'x'y`); elsewhere it is an
    /// ordinary character, as in `s/'//g`. A token that is exactly one
    /// quoted span becomes a [`TokenKind::QuotedString`].
    fn scan_word(&mut self) -> ParseResult<Token> {
        let start = self.cursor;
        let mut quoted_value = None;
        let mut segments = 0usize;

        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == TERMINATOR {
                break;
            }
            if (c == '\'' || c == '"') && self.cursor == start {
                let value = self.scan_quoted()?;
                if segments == 0 {
                    quoted_value = Some(value);
                }
            } else {
                self.cursor += 1;
            }
            segments += 1;
        }

        let span = Span::new(start, self.cursor);
        let text = self.text(span);

        if segments == 1 {
            if let Some(value) = quoted_value {
                return Ok(Token::new(TokenKind::QuotedString, text, value, span));
            }
        }

        let kind = classify_word(&text);
        Ok(Token::new(kind, text.clone(), text, span))
    }
}

fn classify_word(text: &str) -> TokenKind {
    if is_number(text) {
        TokenKind::Number
    } else if text.contains(',') && text.split(',').any(|part| !part.is_empty()) {
        TokenKind::List
    } else {
        TokenKind::Word
    }
}

/// Optional sign, digits, at most one decimal point.
pub fn is_number(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    if digits.is_empty() || !digits.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    let dots = digits.chars().filter(|&c| c == '.').count();
    dots <= 1
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && text.parse::<f64>().is_ok()
}
