//! # Wrangler - recipe grammar, migration and execution
//!
//! A recipe is an ordered list of directives, one per line, that transforms a
//! sequence of records. This crate tokenizes and parses recipe lines against
//! a table of directive signatures, rewrites legacy (V1) recipes into the
//! canonical V2 grammar, and executes parsed recipes over records.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Recipe text │────▶│  Tokenizer  │────▶│   Parser    │────▶│  Migrator   │──▶ V2 text
//! │  (V1 / V2)  │     │             │     │ (signatures)│     │             │
//! └─────────────┘     └─────────────┘     └──────┬──────┘     └─────────────┘
//!                                                │
//!                     ┌─────────────┐     ┌──────▼──────┐
//!       Records ─────▶│  Pipeline   │◀────│  Registry   │
//!                     │  executor   │     │ (built-ins) │
//!                     └──────┬──────┘     └─────────────┘
//!                            ▼
//!                  output + error records
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wrangler::{migrate, execute_text, DirectiveConfig, Record};
//!
//! let v2 = migrate(&["set column total price * qty", "drop price"])?;
//! assert_eq!(v2, vec!["set-column :total exp:{price * qty};", "drop :price;"]);
//!
//! let result = execute_text(&v2.join("\n"), records, &DirectiveConfig::default())?;
//! println!("{}", result.summary());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types for every stage
//! - [`config`] - Directive exclusions and aliases
//! - [`grammar`] - Tokenizer, signatures, parser and V1 → V2 migration
//! - [`models`] - The [`Record`] row model
//! - [`transform`] - Expressions, directive registry, built-ins and executor
//! - [`ingest`] - CSV reading and writing for the command line

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Recipe grammar
pub mod grammar;

// Execution
pub mod transform;

// CSV input/output
pub mod ingest;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    DirectiveError,
    EvaluationError,
    ExecutionError,
    ExpressionError,
    FatalDirectiveError,
    LineError,
    MigrationError,
    ParseError,
};

// =============================================================================
// Re-exports - Configuration and models
// =============================================================================

pub use config::DirectiveConfig;
pub use models::Record;

// =============================================================================
// Re-exports - Grammar
// =============================================================================

pub use grammar::{
    all_signatures,
    migrate,
    parse_line,
    signature_of,
    tokenize,
    Argument,
    ArgumentKind,
    GrammarMigration,
    MigrateToV2,
    MigrationOptions,
    MigrationReport,
    ParsedDirective,
    Recipe,
    RecipeParser,
    Signature,
    Token,
    TokenKind,
};

// =============================================================================
// Re-exports - Execution
// =============================================================================

pub use transform::{
    execute,
    execute_text,
    CancellationToken,
    Directive,
    DirectiveRegistry,
    ErrorRecord,
    ExecutionContext,
    ExecutionResult,
    ExecutorOptions,
    Expression,
    Outcome,
    Pipeline,
    StepReport,
};

// =============================================================================
// Re-exports - CSV
// =============================================================================

pub use ingest::{read_bytes_auto, read_file_auto, write_records, CsvError, IngestResult};
