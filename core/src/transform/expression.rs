//! Expression engine for `exp:{...}` bodies.
//!
//! Expressions are compiled once when a directive is initialized and then
//! evaluated per record. Identifiers resolve to a column of the record first,
//! then to a run variable.
//!
//! ```text
//! ternary     := or ( '?' ternary ':' ternary )?
//! or          := and ( '||' and )*
//! and         := equality ( '&&' equality )*
//! equality    := comparison ( ('==' | '!=') comparison )*
//! comparison  := additive ( ('<' | '<=' | '>' | '>=') additive )*
//! additive    := term ( ('+' | '-') term )*
//! term        := unary ( ('*' | '/' | '%') unary )*
//! unary       := ('!' | '-') unary | primary
//! primary     := number | string | true | false | null | identifier | '(' ternary ')'
//! ```

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use super::context::Variables;
use crate::error::{EvalResult, EvaluationError, ExpressionError};
use crate::models::{display_value, number_value, numeric_value, Record};

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    Number(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
}

impl fmt::Display for Lexeme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lexeme::Number(n) => write!(f, "{n}"),
            Lexeme::Str(s) => write!(f, "'{s}'"),
            Lexeme::Ident(name) => f.write_str(name),
            Lexeme::Op(op) => f.write_str(op),
        }
    }
}

/// Longest operators first so `<=` wins over `<`.
const OPERATORS: &[&str] = &[
    "&&", "||", "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%", "!", "?", ":", "(", ")",
];

fn lex(source: &str) -> Result<Vec<Lexeme>, ExpressionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut lexemes = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| ExpressionError::UnexpectedChar { found: c, offset: start })?;
            lexemes.push(Lexeme::Number(value));
            continue;
        }

        if c == '\'' || c == '"' {
            let start = i;
            i += 1;
            let mut value = String::new();
            loop {
                match chars.get(i) {
                    None => return Err(ExpressionError::UnterminatedString(start)),
                    Some('\\') if chars.get(i + 1).is_some() => {
                        value.push(chars[i + 1]);
                        i += 2;
                    }
                    Some(&q) if q == c => {
                        i += 1;
                        break;
                    }
                    Some(&other) => {
                        value.push(other);
                        i += 1;
                    }
                }
            }
            lexemes.push(Lexeme::Str(value));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            lexemes.push(Lexeme::Ident(chars[start..i].iter().collect()));
            continue;
        }

        let op = OPERATORS.iter().find(|op| {
            op.chars()
                .enumerate()
                .all(|(k, oc)| chars.get(i + k) == Some(&oc))
        });
        match op {
            Some(op) => {
                i += op.len();
                lexemes.push(Lexeme::Op(op));
            }
            None => return Err(ExpressionError::UnexpectedChar { found: c, offset: i }),
        }
    }

    Ok(lexemes)
}

// =============================================================================
// Syntax tree
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "||" => BinaryOp::Or,
            "&&" => BinaryOp::And,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Identifier(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

// =============================================================================
// Parser
// =============================================================================

struct ExprParser {
    lexemes: Vec<Lexeme>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.pos)
    }

    fn advance(&mut self) -> Option<Lexeme> {
        let lexeme = self.lexemes.get(self.pos).cloned();
        self.pos += 1;
        lexeme
    }

    fn at_op(&self, symbol: &str) -> bool {
        matches!(self.peek(), Some(Lexeme::Op(op)) if *op == symbol)
    }

    fn expect_op(&mut self, symbol: &str) -> Result<(), ExpressionError> {
        match self.advance() {
            Some(Lexeme::Op(op)) if op == symbol => Ok(()),
            Some(other) => Err(ExpressionError::UnexpectedToken {
                found: other.to_string(),
                expected: format!("'{symbol}'"),
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    fn parse(mut self) -> Result<Expr, ExpressionError> {
        if self.lexemes.is_empty() {
            return Err(ExpressionError::Empty);
        }
        let expr = self.ternary()?;
        match self.peek() {
            None => Ok(expr),
            Some(extra) => Err(ExpressionError::UnexpectedToken {
                found: extra.to_string(),
                expected: "end of expression".to_string(),
            }),
        }
    }

    fn ternary(&mut self) -> Result<Expr, ExpressionError> {
        let condition = self.binary(0)?;
        if !self.at_op("?") {
            return Ok(condition);
        }
        self.advance();
        let then = self.ternary()?;
        self.expect_op(":")?;
        let otherwise = self.ternary()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    /// Binary levels, loosest first.
    const LEVELS: &'static [&'static [&'static str]] = &[
        &["||"],
        &["&&"],
        &["==", "!="],
        &["<", "<=", ">", ">="],
        &["+", "-"],
        &["*", "/", "%"],
    ];

    fn binary(&mut self, level: usize) -> Result<Expr, ExpressionError> {
        let Some(symbols) = Self::LEVELS.get(level) else {
            return self.unary();
        };
        let mut left = self.binary(level + 1)?;
        loop {
            let op = match self.peek() {
                Some(Lexeme::Op(op)) if symbols.contains(op) => BinaryOp::from_symbol(op),
                _ => None,
            };
            let Some(op) = op else { break };
            self.advance();
            let right = self.binary(level + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        let op = if self.at_op("!") {
            Some(UnaryOp::Not)
        } else if self.at_op("-") {
            Some(UnaryOp::Negate)
        } else {
            None
        };
        match op {
            Some(op) => {
                self.advance();
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(self.unary()?),
                })
            }
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.advance() {
            Some(Lexeme::Number(n)) => Ok(Expr::Literal(number_value(n))),
            Some(Lexeme::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Lexeme::Ident(name)) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                _ => Expr::Identifier(name),
            }),
            Some(Lexeme::Op("(")) => {
                let inner = self.ternary()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Some(other) => Err(ExpressionError::UnexpectedToken {
                found: other.to_string(),
                expected: "a value".to_string(),
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

// =============================================================================
// Compiled expression
// =============================================================================

/// A compiled expression with the source text it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    pub fn compile(source: &str) -> Result<Self, ExpressionError> {
        let lexemes = lex(source)?;
        let root = ExprParser { lexemes, pos: 0 }.parse()?;
        Ok(Self {
            source: source.trim().to_string(),
            root,
        })
    }

    /// Source text, trimmed.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    pub fn evaluate(&self, record: &Record, variables: &Variables) -> EvalResult<Value> {
        eval(&self.root, record, variables)
    }

    /// Evaluate as a condition: booleans, `"true"`/`"false"` strings and
    /// null (false).
    pub fn evaluate_condition(&self, record: &Record, variables: &Variables) -> EvalResult<bool> {
        truth(&self.evaluate(record, variables)?)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn truth(value: &Value) -> EvalResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(EvaluationError::Type(format!("expected a boolean, found {other}"))),
    }
}

fn number(value: &Value, op: BinaryOp) -> EvalResult<f64> {
    match value {
        Value::Bool(_) | Value::Null => None,
        other => numeric_value(other),
    }
    .ok_or_else(|| EvaluationError::Type(format!("{op:?} needs numbers, found {value}")))
}

fn eval(expr: &Expr, record: &Record, variables: &Variables) -> EvalResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Identifier(name) => record
            .get(name)
            .or_else(|| variables.get(name))
            .cloned()
            .ok_or_else(|| EvaluationError::UnknownIdentifier(name.clone())),
        Expr::Unary { op, operand } => {
            let value = eval(operand, record, variables)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!truth(&value)?)),
                UnaryOp::Negate => Ok(number_value(-number(&value, BinaryOp::Sub)?)),
            }
        }
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => {
            if truth(&eval(condition, record, variables)?)? {
                eval(then, record, variables)
            } else {
                eval(otherwise, record, variables)
            }
        }
        Expr::Binary { op, left, right } => {
            let lhs = eval(left, record, variables)?;
            match op {
                BinaryOp::And => {
                    if !truth(&lhs)? {
                        return Ok(Value::Bool(false));
                    }
                    return Ok(Value::Bool(truth(&eval(right, record, variables)?)?));
                }
                BinaryOp::Or => {
                    if truth(&lhs)? {
                        return Ok(Value::Bool(true));
                    }
                    return Ok(Value::Bool(truth(&eval(right, record, variables)?)?));
                }
                _ => {}
            }
            let rhs = eval(right, record, variables)?;
            binary(*op, &lhs, &rhs)
        }
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(equals(lhs, rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!equals(lhs, rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(lhs, rhs)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::Add => match (number(lhs, op), number(rhs, op)) {
            (Ok(a), Ok(b)) => Ok(number_value(a + b)),
            _ if lhs.is_string() || rhs.is_string() => {
                Ok(Value::String(format!("{}{}", display_value(lhs), display_value(rhs))))
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        },
        BinaryOp::Sub => Ok(number_value(number(lhs, op)? - number(rhs, op)?)),
        BinaryOp::Mul => Ok(number_value(number(lhs, op)? * number(rhs, op)?)),
        BinaryOp::Div | BinaryOp::Rem => {
            let (a, b) = (number(lhs, op)?, number(rhs, op)?);
            if b == 0.0 {
                return Err(EvaluationError::DivisionByZero);
            }
            Ok(number_value(if op == BinaryOp::Div { a / b } else { a % b }))
        }
        BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(truth(lhs)? && truth(rhs)?)),
    }
}

fn both_numbers(lhs: &Value, rhs: &Value) -> Option<(f64, f64)> {
    if lhs.is_boolean() || rhs.is_boolean() {
        return None;
    }
    Some((numeric_value(lhs)?, numeric_value(rhs)?))
}

fn equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => match both_numbers(lhs, rhs) {
            Some((a, b)) => a == b,
            None => display_value(lhs) == display_value(rhs),
        },
    }
}

fn compare(lhs: &Value, rhs: &Value) -> EvalResult<Ordering> {
    if lhs.is_null() || rhs.is_null() {
        return Err(EvaluationError::Type("cannot order null".to_string()));
    }
    match both_numbers(lhs, rhs) {
        Some((a, b)) => a
            .partial_cmp(&b)
            .ok_or_else(|| EvaluationError::Type("incomparable numbers".to_string())),
        None => Ok(display_value(lhs).cmp(&display_value(rhs))),
    }
}
