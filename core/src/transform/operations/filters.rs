//! Row filters and error routing.

use regex::Regex;

use super::column_text;
use super::columns::regex_arg;
use crate::error::{DirectiveError, DirectiveResult, EvalResult};
use crate::grammar::ParsedDirective;
use crate::models::{is_empty_value, Record};
use crate::transform::context::ExecutionContext;
use crate::transform::directive::{
    column_arg, expression_arg, factory, list_arg, raw_arg, text_arg, Directive, DirectiveRegistry, Outcome,
};
use crate::transform::expression::Expression;

pub fn register(registry: &mut DirectiveRegistry) {
    registry
        .register("filter-row-if-true", factory::<FilterOnCondition>)
        .register("filter-row-if-false", factory::<FilterOnCondition>)
        .register("filter-row-if-matched", factory::<FilterOnRegex>)
        .register("filter-row-if-not-matched", factory::<FilterOnRegex>)
        .register("filter-rows-on", factory::<FilterRowsOn>)
        .register("send-to-error", factory::<SendToError>)
        .register("fail", factory::<Fail>);
}

// =============================================================================
// Predicates
// =============================================================================

/// Drop-when rule shared by the filter directives.
enum Predicate {
    /// Drop when the condition evaluates to `drop_when`.
    Condition { expression: Expression, drop_when: bool },
    /// Drop when the full-match result equals `drop_when`.
    Regex { column: String, regex: Regex, drop_when: bool },
    /// Drop when every listed column is missing, null or empty.
    EmptyOrNull(Vec<String>),
}

impl Predicate {
    fn condition(directive: &ParsedDirective, index: usize, drop_when: bool) -> DirectiveResult<Self> {
        Ok(Predicate::Condition {
            expression: expression_arg(directive, index)?,
            drop_when,
        })
    }

    fn regex(directive: &ParsedDirective, index: usize, drop_when: bool) -> DirectiveResult<Self> {
        let column = column_arg(directive, index)?;
        let pattern = text_arg(directive, index + 1)?;
        Ok(Predicate::Regex {
            column,
            regex: regex_arg(directive, &format!("^(?:{pattern})$"))?,
            drop_when,
        })
    }

    fn drops(&self, record: &Record, context: &ExecutionContext) -> EvalResult<bool> {
        match self {
            Predicate::Condition { expression, drop_when } => {
                Ok(expression.evaluate_condition(record, &context.variables)? == *drop_when)
            }
            Predicate::Regex { column, regex, drop_when } => {
                let value = column_text(record, column)?;
                Ok(regex.is_match(&value) == *drop_when)
            }
            Predicate::EmptyOrNull(columns) => Ok(columns
                .iter()
                .all(|column| record.get(column).map_or(true, is_empty_value))),
        }
    }
}

fn filter(predicate: Option<&Predicate>, record: &Record, context: &ExecutionContext) -> EvalResult<Outcome> {
    match predicate {
        Some(p) if p.drops(record, context)? => Ok(Outcome::none()),
        _ => Ok(Outcome::one(record.clone())),
    }
}

// =============================================================================
// Filters
// =============================================================================

/// `filter-row-if-true` and `filter-row-if-false`.
#[derive(Default)]
pub struct FilterOnCondition {
    predicate: Option<Predicate>,
}

impl Directive for FilterOnCondition {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        let drop_when = directive.canonical == "filter-row-if-true";
        self.predicate = Some(Predicate::condition(directive, 0, drop_when)?);
        Ok(())
    }

    fn apply(&self, record: &Record, context: &mut ExecutionContext) -> EvalResult<Outcome> {
        filter(self.predicate.as_ref(), record, context)
    }
}

/// `filter-row-if-matched` and `filter-row-if-not-matched`; the pattern
/// must match the whole value.
#[derive(Default)]
pub struct FilterOnRegex {
    predicate: Option<Predicate>,
}

impl Directive for FilterOnRegex {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        let drop_when = directive.canonical == "filter-row-if-matched";
        self.predicate = Some(Predicate::regex(directive, 0, drop_when)?);
        Ok(())
    }

    fn apply(&self, record: &Record, context: &mut ExecutionContext) -> EvalResult<Outcome> {
        filter(self.predicate.as_ref(), record, context)
    }
}

/// `filter-rows-on <mode> ...`; the mode keyword is argument 0.
#[derive(Default)]
pub struct FilterRowsOn {
    predicate: Option<Predicate>,
}

impl Directive for FilterRowsOn {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        let mode = raw_arg(directive, 0)?;
        self.predicate = Some(match mode.as_str() {
            "condition-true" => Predicate::condition(directive, 1, true)?,
            "condition-false" => Predicate::condition(directive, 1, false)?,
            "regex-match" => Predicate::regex(directive, 1, true)?,
            "regex-not-match" => Predicate::regex(directive, 1, false)?,
            "empty-or-null-columns" => Predicate::EmptyOrNull(list_arg(directive, 1)?),
            other => {
                return Err(DirectiveError::invalid(
                    &directive.canonical,
                    format!("unknown mode '{other}'"),
                ))
            }
        });
        Ok(())
    }

    fn apply(&self, record: &Record, context: &mut ExecutionContext) -> EvalResult<Outcome> {
        filter(self.predicate.as_ref(), record, context)
    }
}

// =============================================================================
// Error routing
// =============================================================================

/// Diverts records matching the condition; the reason is the condition text.
#[derive(Default)]
pub struct SendToError {
    condition: Option<Expression>,
}

impl Directive for SendToError {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.condition = Some(expression_arg(directive, 0)?);
        Ok(())
    }

    fn apply(&self, record: &Record, context: &mut ExecutionContext) -> EvalResult<Outcome> {
        match &self.condition {
            Some(c) if c.evaluate_condition(record, &context.variables)? => Ok(Outcome::Divert(c.source().to_string())),
            _ => Ok(Outcome::one(record.clone())),
        }
    }
}

/// Like `send-to-error`, and the run fails once the step completes.
#[derive(Default)]
pub struct Fail {
    condition: Option<Expression>,
}

impl Directive for Fail {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.condition = Some(expression_arg(directive, 0)?);
        Ok(())
    }

    fn apply(&self, record: &Record, context: &mut ExecutionContext) -> EvalResult<Outcome> {
        match &self.condition {
            Some(c) if c.evaluate_condition(record, &context.variables)? => Ok(Outcome::Fail(c.source().to_string())),
            _ => Ok(Outcome::one(record.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{apply, build};
    use super::*;
    use crate::error::EvaluationError;
    use serde_json::json;

    fn passenger(fare: f64, name: &str) -> Record {
        Record::from_pairs([("Fare", json!(fare)), ("Name", json!(name)), ("Cabin", json!(""))])
    }

    fn kept(line: &str, record: &Record) -> bool {
        match apply(line, record).unwrap() {
            Outcome::Emit(records) => !records.is_empty(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_condition_filters() {
        let cheap = passenger(7.25, "Braund");
        assert!(!kept("filter-row-if-true Fare < 8.06", &cheap));
        assert!(kept("filter-row-if-false Fare < 8.06", &cheap));
        assert!(kept("filter-rows-on condition-true Fare > 8.06", &cheap));
        assert!(!kept("filter-rows-on condition-false exp:{Fare > 8.06};", &cheap));
    }

    #[test]
    fn test_regex_filters_match_whole_value() {
        let r = passenger(7.25, "Braund");
        assert!(!kept("filter-row-if-matched Name Br.*", &r));
        assert!(kept("filter-row-if-matched Name Br", &r));
        assert!(!kept("filter-row-if-not-matched Name Br", &r));
        assert!(!kept("filter-rows-on regex-match :Name '.*und';", &r));
        assert!(kept("filter-rows-on regex-not-match :Name '.*und';", &r));

        let err = apply("filter-row-if-matched Missing .*", &r).unwrap_err();
        assert_eq!(err, EvaluationError::MissingColumn("Missing".into()));
    }

    #[test]
    fn test_empty_or_null_columns() {
        let r = passenger(7.25, "Braund");
        assert!(!kept("filter-rows-on empty-or-null-columns Cabin,Boat", &r));
        assert!(kept("filter-rows-on empty-or-null-columns Cabin,Name", &r));
    }

    #[test]
    fn test_send_to_error_and_fail() {
        let cheap = passenger(7.25, "Braund");
        let dear = passenger(71.28, "Cumings");

        assert_eq!(apply("send-to-error Fare < 8.06", &cheap).unwrap(), Outcome::Divert("Fare < 8.06".into()));
        assert_eq!(apply("send-to-error Fare < 8.06", &dear).unwrap(), Outcome::one(dear.clone()));
        assert_eq!(
            apply("fail exp:{Name == 'Braund'};", &cheap).unwrap(),
            Outcome::Fail("Name == 'Braund'".into())
        );
        assert!(build("fail exp:{Fare <};").is_err());
    }
}
