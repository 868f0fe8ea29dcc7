//! Built-in directive implementations.
//!
//! Grouped by concern:
//!
//! - [`columns`] - schema changes: set, rename, drop, keep, copy, merge, ...
//! - [`text`] - value rewriting: case, trim, split, mask, sed, ...
//! - [`filters`] - row filters and error routing
//! - [`variables`] - run-scoped variables
//! - [`encoding`] - base32/base64/hex, URL coding, hashing, text distances
//! - [`dates`] - date parsing and formatting
//! - [`formats`] - JSON, CSV and fixed-width parsing and writing
//!
//! Directives the grammar knows but nothing registers here (XML, Excel,
//! HTTP, catalog lookups, ...) fail at initialization as unsupported.

pub mod columns;
pub mod dates;
pub mod encoding;
pub mod filters;
pub mod formats;
pub mod text;
pub mod variables;

use serde_json::Value;

use super::directive::DirectiveRegistry;
use crate::error::{EvalResult, EvaluationError};
use crate::models::{display_value, Record};

/// Register every built-in directive.
pub fn register_builtins(registry: &mut DirectiveRegistry) {
    columns::register(registry);
    text::register(registry);
    filters::register(registry);
    variables::register(registry);
    encoding::register(registry);
    dates::register(registry);
    formats::register(registry);
}

/// Text of a column that must exist.
pub(crate) fn column_text(record: &Record, column: &str) -> EvalResult<String> {
    record.require(column).map(display_value)
}

/// Text of a column that must exist and hold a non-null value.
pub(crate) fn column_string(record: &Record, column: &str) -> EvalResult<String> {
    match record.require(column)? {
        Value::Null => Err(EvaluationError::InvalidValue {
            column: column.to_string(),
            message: "value is null".to_string(),
        }),
        value => Ok(display_value(value)),
    }
}

/// Copy of `record` with one column replaced by `f` of its text.
pub(crate) fn map_text<F>(record: &Record, column: &str, f: F) -> EvalResult<Record>
where
    F: FnOnce(&str) -> EvalResult<Value>,
{
    let mut out = record.clone();
    let slot = out
        .get_mut(column)
        .ok_or_else(|| EvaluationError::MissingColumn(column.to_string()))?;
    if !slot.is_null() {
        *slot = f(&display_value(slot))?;
    }
    Ok(out)
}

pub(crate) fn invalid(column: &str, message: impl Into<String>) -> EvaluationError {
    EvaluationError::InvalidValue {
        column: column.to_string(),
        message: message.into(),
    }
}
