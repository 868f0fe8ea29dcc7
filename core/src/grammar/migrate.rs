//! V1 → V2 recipe migration.
//!
//! Every input line yields exactly one output line, in order. Directive lines
//! are parsed against their signatures and re-rendered in canonical form;
//! blank and comment lines pass through untouched. Already-canonical lines
//! render to themselves, so migrating twice changes nothing.

use super::directive::{braces_balanced, Argument, ParsedDirective};
use super::parser::{is_blank_or_comment, parse_statement};
use super::token::Token;
use super::tokenizer::tokenize;
use crate::config::DirectiveConfig;
use crate::error::{LineError, MigrationError, ParseError, ParseResult};

/// A rewrite from one grammar version to another.
pub trait GrammarMigration {
    fn migrate(&self, lines: &[String]) -> Result<Vec<String>, MigrationError>;
}

/// Migration behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Stop at the first line that fails to parse instead of reporting all.
    pub fail_fast: bool,
}

/// What happened to one input line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Migrated(String),
    /// Blank or comment line, passed through.
    Unchanged(String),
    Failed { original: String, error: ParseError },
}

impl LineOutcome {
    /// Output text for the line; failed lines are echoed as written.
    pub fn text(&self) -> &str {
        match self {
            LineOutcome::Migrated(text) | LineOutcome::Unchanged(text) => text,
            LineOutcome::Failed { original, .. } => original,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LineOutcome::Failed { .. })
    }
}

/// Per-line migration results, one entry per input line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub lines: Vec<LineOutcome>,
}

impl MigrationReport {
    pub fn is_complete(&self) -> bool {
        !self.lines.iter().any(LineOutcome::is_failed)
    }

    pub fn migrated_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| matches!(l, LineOutcome::Migrated(_)))
            .count()
    }

    /// Failed lines with their 1-based line numbers.
    pub fn failures(&self) -> Vec<LineError> {
        self.lines
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| match outcome {
                LineOutcome::Failed { error, .. } => Some(LineError::new(index + 1, error.clone())),
                _ => None,
            })
            .collect()
    }

    /// Output lines, failed lines echoed as written.
    pub fn output(&self) -> Vec<String> {
        self.lines.iter().map(|l| l.text().to_string()).collect()
    }

    /// Migrated lines, or [`MigrationError::Incomplete`] when any line failed.
    pub fn into_result(self) -> Result<Vec<String>, MigrationError> {
        if self.is_complete() {
            return Ok(self.output());
        }
        Err(MigrationError::Incomplete {
            failures: self.failures(),
            partial: self.output(),
        })
    }
}

/// Rewrites V1 (and mixed) recipe lines into canonical V2 text.
#[derive(Debug, Clone, Default)]
pub struct MigrateToV2 {
    config: DirectiveConfig,
    options: MigrationOptions,
}

impl MigrateToV2 {
    pub fn new(config: DirectiveConfig) -> Self {
        Self {
            config,
            options: MigrationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &DirectiveConfig {
        &self.config
    }

    /// Rewrite a single line. Blank and comment lines come back unchanged.
    pub fn migrate_line(&self, line: &str) -> ParseResult<String> {
        if is_blank_or_comment(line) {
            return Ok(line.to_string());
        }

        let tokens = tokenize(line)?;
        let rendered = tokens
            .split(Token::is_delimiter)
            .filter(|statement| !statement.is_empty())
            .map(|statement| {
                let directive = parse_statement(statement, &self.config)?;
                ensure_renderable(&directive)?;
                Ok(directive.to_v2())
            })
            .collect::<ParseResult<Vec<_>>>()?;

        if rendered.is_empty() {
            return Err(ParseError::Empty);
        }
        Ok(rendered.join(" "))
    }

    /// Migrate every line, recording what happened to each.
    ///
    /// In fail-fast mode the first failure is returned as
    /// [`MigrationError::Aborted`].
    pub fn migrate_report<S: AsRef<str>>(&self, lines: &[S]) -> Result<MigrationReport, MigrationError> {
        let mut report = MigrationReport {
            lines: Vec::with_capacity(lines.len()),
        };

        for (index, line) in lines.iter().enumerate() {
            let line = line.as_ref();
            let number = index + 1;

            let outcome = if is_blank_or_comment(line) {
                LineOutcome::Unchanged(line.to_string())
            } else {
                match self.migrate_line(line) {
                    Ok(migrated) => {
                        tracing::debug!(line = number, %migrated, "migrated line");
                        LineOutcome::Migrated(migrated)
                    }
                    Err(error) => {
                        tracing::warn!(line = number, %error, "line could not be migrated");
                        if self.options.fail_fast {
                            return Err(MigrationError::Aborted(LineError::new(number, error)));
                        }
                        LineOutcome::Failed {
                            original: line.to_string(),
                            error,
                        }
                    }
                }
            };
            report.lines.push(outcome);
        }

        tracing::info!(
            lines = report.lines.len(),
            migrated = report.migrated_count(),
            failed = report.lines.iter().filter(|l| l.is_failed()).count(),
            "migration finished"
        );
        Ok(report)
    }
}

/// A V1 expression whose braces do not balance would close its `exp:{`
/// block early once rendered, so the line cannot be migrated.
fn ensure_renderable(directive: &ParsedDirective) -> ParseResult<()> {
    for argument in &directive.arguments {
        if let Argument::ExpressionBlock(body) = argument {
            if !braces_balanced(body) {
                return Err(ParseError::UnbalancedExpression {
                    directive: directive.name.clone(),
                    body: body.clone(),
                });
            }
        }
    }
    Ok(())
}

impl GrammarMigration for MigrateToV2 {
    fn migrate(&self, lines: &[String]) -> Result<Vec<String>, MigrationError> {
        self.migrate_report(lines)?.into_result()
    }
}

/// Migrate lines with the default configuration, reporting every failure.
pub fn migrate<S: AsRef<str>>(lines: &[S]) -> Result<Vec<String>, MigrationError> {
    MigrateToV2::default().migrate_report(lines)?.into_result()
}
