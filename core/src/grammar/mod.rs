//! Recipe grammar: tokenizer, signature registry, parser and the V1 → V2
//! migration.
//!
//! ```text
//! line ──▶ tokenize ──▶ parse (signature table) ──▶ ParsedDirective ──▶ V2 text
//! ```

pub mod directive;
pub mod migrate;
pub mod parser;
pub mod signature;
pub mod token;
pub mod tokenizer;

pub use directive::{quote, Argument, Numeric, ParsedDirective};
pub use migrate::{migrate, GrammarMigration, LineOutcome, MigrateToV2, MigrationOptions, MigrationReport};
pub use parser::{is_blank_or_comment, parse, parse_line, parse_statement, Recipe, RecipeParser, Step};
pub use signature::{all_signatures, signature_of, ArgumentKind, ElementKind, Param, Shape, Signature};
pub use token::{Span, Token, TokenKind};
pub use tokenizer::tokenize;
