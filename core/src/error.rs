//! Error types for the recipe grammar and the directive pipeline.
//!
//! Errors are grouped by the stage that raises them:
//!
//! - [`ParseError`] - tokenizer and parser errors for a single directive line
//! - [`LineError`] - a [`ParseError`] tagged with its recipe line
//! - [`MigrationError`] - V1 → V2 rewrite failures
//! - [`ExpressionError`] - expression compile errors
//! - [`EvaluationError`] - per-record failures while applying a directive
//! - [`DirectiveError`] - directive initialization failures
//! - [`ExecutionError`] - errors that prevent a pipeline run from starting
//! - [`CsvError`] - CSV input and output
//! - [`ConfigError`] - directive configuration loading
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Parse Errors
// =============================================================================

/// Errors raised while tokenizing or parsing one directive line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Unterminated quote or expression block, or a stray character.
    #[error("Syntax error at column {column}: {message}")]
    Syntax { column: usize, message: String },

    /// Name not found in the signature registry after alias resolution.
    #[error("Unknown directive '{name}'")]
    UnknownDirective { name: String },

    /// Name explicitly disallowed by the directive configuration.
    #[error("Directive '{name}' has been excluded by configuration")]
    ExcludedDirective { name: String },

    /// Wrong number of arguments.
    #[error("Directive '{directive}' expects {expected} argument(s), found {found}")]
    Arity {
        directive: String,
        expected: String,
        found: usize,
    },

    /// Argument kind incompatible with the signature at a 1-based position.
    #[error("Directive '{directive}' argument {position}: expected {expected}, found '{found}'")]
    Type {
        directive: String,
        position: usize,
        expected: String,
        found: String,
    },

    /// Expression whose braces would end an `exp:{...}` block early.
    #[error("Directive '{directive}' expression has unbalanced braces: {body}")]
    UnbalancedExpression { directive: String, body: String },

    /// The line holds no directive, only a terminator.
    #[error("Empty statement")]
    Empty,
}

impl ParseError {
    pub fn syntax(column: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            column,
            message: message.into(),
        }
    }
}

/// A parse error located on a 1-based recipe line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Line {line}: {source}")]
pub struct LineError {
    pub line: usize,
    #[source]
    pub source: ParseError,
}

impl LineError {
    pub fn new(line: usize, source: ParseError) -> Self {
        Self { line, source }
    }
}

// =============================================================================
// Migration Errors
// =============================================================================

/// Errors from the V1 → V2 grammar migration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    /// Fail-fast mode stopped at the first bad line.
    #[error("Migration aborted at {0}")]
    Aborted(LineError),

    /// Continue mode finished, but some lines could not be migrated.
    ///
    /// `partial` holds one entry per input line; failed lines are echoed
    /// verbatim and must not be treated as migrated output.
    #[error("{} line(s) could not be migrated", failures.len())]
    Incomplete {
        failures: Vec<LineError>,
        partial: Vec<String>,
    },
}

impl MigrationError {
    /// All failed lines, in input order.
    pub fn failures(&self) -> Vec<&LineError> {
        match self {
            MigrationError::Aborted(err) => vec![err],
            MigrationError::Incomplete { failures, .. } => failures.iter().collect(),
        }
    }
}

// =============================================================================
// Expression Errors
// =============================================================================

/// Errors compiling an expression body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("Unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    #[error("Unexpected character '{found}' at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },

    #[error("Unexpected token '{found}', expected {expected}")]
    UnexpectedToken { found: String, expected: String },

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Empty expression")]
    Empty,
}

// =============================================================================
// Evaluation Errors
// =============================================================================

/// A directive could not be applied to one record.
///
/// The executor diverts the record to the error stream; the run continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    /// Identifier is neither a column of the record nor a run variable.
    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    /// Directive argument names a column the record does not have.
    #[error("Column '{0}' does not exist")]
    MissingColumn(String),

    /// Target column already present.
    #[error("Column '{0}' already exists")]
    ColumnExists(String),

    /// Operand or column value of the wrong type.
    #[error("Type error: {0}")]
    Type(String),

    #[error("Division by zero")]
    DivisionByZero,

    /// Value could not be interpreted by the directive.
    #[error("Invalid value in column '{column}': {message}")]
    InvalidValue { column: String, message: String },
}

// =============================================================================
// Directive Errors
// =============================================================================

/// Errors raised while initializing a directive from its parsed arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    /// The grammar knows the directive but no implementation is registered.
    #[error("No implementation registered for directive '{directive}'")]
    Unsupported { directive: String },

    /// Arguments parsed but are not acceptable to the implementation.
    #[error("Invalid argument for '{directive}': {message}")]
    InvalidArgument { directive: String, message: String },
}

impl DirectiveError {
    pub fn invalid(directive: &str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            directive: directive.to_string(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Execution Errors
// =============================================================================

/// Errors that prevent a pipeline from being built or started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Recipe text failed to parse.
    #[error("Recipe error: {0}")]
    Recipe(#[from] LineError),

    /// A directive failed to initialize.
    #[error("Directive error: {0}")]
    Directive(#[from] DirectiveError),
}

/// A `fail` directive matched at least one record.
///
/// Reported in the execution result once the directive has finished its pass
/// over every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("Directive '{directive}' (step {index}) failed the run: {reason} matched {matched} record(s)")]
pub struct FatalDirectiveError {
    pub directive: String,
    pub index: usize,
    pub reason: String,
    pub matched: usize,
}

// =============================================================================
// CSV Errors
// =============================================================================

/// Errors reading records from CSV or writing them back out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsvError {
    /// The input has no header row.
    #[error("Empty CSV input")]
    Empty,

    /// The reader rejected the input at a 1-based line.
    #[error("Line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("Delimiter '{0}' is not a single ASCII character")]
    Delimiter(char),

    /// A record could not be serialized; `record` is 1-based.
    #[error("Cannot write record {record}: {message}")]
    Write { record: usize, message: String },

    #[error("{context}: {message}")]
    Io { context: String, message: String },
}

impl CsvError {
    pub(crate) fn malformed(error: &csv::Error) -> Self {
        let line = error
            .position()
            .map(|p| usize::try_from(p.line()).unwrap_or(usize::MAX))
            .unwrap_or(0);
        Self::Malformed {
            line,
            message: error.to_string(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, error: &std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: error.to_string(),
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors loading a directive configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for tokenizing and parsing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for per-record evaluation.
pub type EvalResult<T> = Result<T, EvaluationError>;

/// Result type for directive initialization.
pub type DirectiveResult<T> = Result<T, DirectiveError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
