//! Date directives.
//!
//! Patterns use the `yyyy-MM-dd HH:mm:ss` letter syntax common to recipe
//! authors and are translated to chrono format items once, at
//! initialization. Parsed dates are stored as RFC 3339 strings; naive
//! values are taken as UTC.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use std::fmt::Write as _;

use super::{column_string, invalid};
use crate::error::{DirectiveError, DirectiveResult, EvalResult};
use crate::grammar::ParsedDirective;
use crate::models::{display_value, numeric_value, Record};
use crate::transform::context::ExecutionContext;
use crate::transform::directive::{column_arg, factory, text_arg, Directive, DirectiveRegistry, Outcome};

pub fn register(registry: &mut DirectiveRegistry) {
    registry
        .register("parse-as-simple-date", factory::<ParseSimpleDate>)
        .register("format-date", factory::<FormatDate>)
        .register("format-unix-timestamp", factory::<FormatUnixTimestamp>)
        .register("diff-date", factory::<DiffDate>);
}

// =============================================================================
// Pattern translation
// =============================================================================

/// Translate a `yyyy-MM-dd`-style pattern to a chrono format string.
///
/// Quoted text is literal, `''` is a single quote. Unknown pattern letters
/// are rejected.
pub fn translate_pattern(pattern: &str) -> Result<String, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            if chars.get(i + 1) == Some(&'\'') {
                out.push('\'');
                i += 2;
                continue;
            }
            i += 1;
            loop {
                match (chars.get(i), chars.get(i + 1)) {
                    (None, _) => return Err(format!("unterminated quote in pattern '{pattern}'")),
                    (Some('\''), Some('\'')) => {
                        out.push('\'');
                        i += 2;
                    }
                    (Some('\''), _) => {
                        i += 1;
                        break;
                    }
                    (Some(&literal), _) => {
                        push_literal(&mut out, literal);
                        i += 1;
                    }
                }
            }
            continue;
        }

        if !c.is_ascii_alphabetic() {
            push_literal(&mut out, c);
            i += 1;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        let item = match (c, run) {
            ('y', 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1) => "%-m",
            ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', 1) => "%-d",
            ('d', _) => "%d",
            ('H', 1) => "%-H",
            ('H', _) => "%H",
            ('h', 1) => "%-I",
            ('h', _) => "%I",
            ('m', _) => "%M",
            ('s', _) => "%S",
            ('S', _) => "%3f",
            ('a', _) => "%p",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            ('D', _) => "%j",
            ('z', _) => "%Z",
            ('Z', _) => "%z",
            ('X', _) => "%:z",
            _ => return Err(format!("unsupported pattern letter '{c}' in '{pattern}'")),
        };
        out.push_str(item);
        i += run;
    }

    Ok(out)
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

fn pattern_arg(directive: &ParsedDirective, index: usize) -> DirectiveResult<String> {
    let pattern = text_arg(directive, index)?;
    translate_pattern(&pattern).map_err(|e| DirectiveError::invalid(&directive.canonical, e))
}

// =============================================================================
// Parsing and formatting helpers
// =============================================================================

/// Parse `text` with a chrono format, falling back from zoned to naive
/// date-time to date-only.
fn parse_with(text: &str, format: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(zoned) = DateTime::parse_from_str(text, format) {
        return Some(zoned);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
        return Some(Utc.from_utc_datetime(&naive).fixed_offset());
    }
    NaiveDate::parse_from_str(text, format)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
}

/// Dates as stored by `parse-as-simple-date`, plus bare ISO dates.
fn parse_stored(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .ok()
        .or_else(|| parse_with(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|| parse_with(text, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|| parse_with(text, "%Y-%m-%d"))
}

fn stored_date(record: &Record, column: &str) -> EvalResult<Option<DateTime<FixedOffset>>> {
    match record.require(column)? {
        Value::Null => Ok(None),
        value => {
            let text = display_value(value);
            parse_stored(&text)
                .map(Some)
                .ok_or_else(|| invalid(column, format!("'{text}' is not a date")))
        }
    }
}

/// Format without panicking on items the value cannot supply.
fn format_date(date: &DateTime<FixedOffset>, format: &str, column: &str) -> EvalResult<String> {
    let mut out = String::new();
    write!(out, "{}", date.format(format))
        .map_err(|_| invalid(column, format!("cannot format date with '{format}'")))?;
    Ok(out)
}

// =============================================================================
// Directives
// =============================================================================

/// `parse-as-simple-date :col 'pattern'`: replaces the value with its
/// RFC 3339 form.
#[derive(Default)]
pub struct ParseSimpleDate {
    column: String,
    format: String,
}

impl Directive for ParseSimpleDate {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        self.format = pattern_arg(directive, 1)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        if record.require(&self.column)?.is_null() {
            return Ok(Outcome::one(record.clone()));
        }
        let text = column_string(record, &self.column)?;
        let date = parse_with(text.trim(), &self.format).ok_or_else(|| {
            invalid(&self.column, format!("'{text}' does not match the date pattern"))
        })?;
        let mut out = record.clone();
        out.set(self.column.clone(), Value::String(date.to_rfc3339()));
        Ok(Outcome::one(out))
    }
}

/// `format-date :col 'pattern'` on a stored date.
#[derive(Default)]
pub struct FormatDate {
    column: String,
    format: String,
}

impl Directive for FormatDate {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        self.format = pattern_arg(directive, 1)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let Some(date) = stored_date(record, &self.column)? else {
            return Ok(Outcome::one(record.clone()));
        };
        let mut out = record.clone();
        out.set(self.column.clone(), Value::String(format_date(&date, &self.format, &self.column)?));
        Ok(Outcome::one(out))
    }
}

/// `format-unix-timestamp :col 'pattern'`; the value is milliseconds since
/// the epoch, formatted in UTC.
#[derive(Default)]
pub struct FormatUnixTimestamp {
    column: String,
    format: String,
}

impl Directive for FormatUnixTimestamp {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        self.format = pattern_arg(directive, 1)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let value = record.require(&self.column)?;
        if value.is_null() {
            return Ok(Outcome::one(record.clone()));
        }
        let millis = numeric_value(value)
            .filter(|n| n.fract() == 0.0)
            .ok_or_else(|| invalid(&self.column, format!("'{}' is not a timestamp", display_value(value))))?;
        let date = DateTime::from_timestamp_millis(millis as i64)
            .ok_or_else(|| invalid(&self.column, "timestamp out of range"))?
            .fixed_offset();
        let mut out = record.clone();
        out.set(self.column.clone(), Value::String(format_date(&date, &self.format, &self.column)?));
        Ok(Outcome::one(out))
    }
}

/// `diff-date :a :b :destination` writes `a - b` in milliseconds; null when
/// either side is null.
#[derive(Default)]
pub struct DiffDate {
    first: String,
    second: String,
    destination: String,
}

impl Directive for DiffDate {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.first = column_arg(directive, 0)?;
        self.second = column_arg(directive, 1)?;
        self.destination = column_arg(directive, 2)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let first = stored_date(record, &self.first)?;
        let second = stored_date(record, &self.second)?;
        let diff = match (first, second) {
            (Some(a), Some(b)) => Value::from((a - b).num_milliseconds()),
            _ => Value::Null,
        };
        let mut out = record.clone();
        out.set(self.destination.clone(), diff);
        Ok(Outcome::one(out))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{apply_one, build};
    use super::*;
    use crate::error::EvaluationError;
    use serde_json::json;

    #[test]
    fn test_translate_pattern() {
        assert_eq!(translate_pattern("yyyy-MM-dd HH:mm:ss").unwrap(), "%Y-%m-%d %H:%M:%S");
        assert_eq!(translate_pattern("MM/dd/yy").unwrap(), "%m/%d/%y");
        assert_eq!(translate_pattern("EEE, d MMM yyyy").unwrap(), "%a, %-d %b %Y");
        assert_eq!(translate_pattern("yyyy'T'HH 'o''clock' 100%").unwrap(), "%YT%H o'clock 100%%");
        assert!(translate_pattern("yyyy-QQ").is_err());
        assert!(translate_pattern("'open").is_err());
    }

    #[test]
    fn test_parse_as_simple_date() {
        let r = Record::from_pairs([("date", json!("06/02/2017")), ("ts", json!("2017-06-02 10:15:00"))]);
        let out = apply_one("parse-as-simple-date :date 'MM/dd/yyyy';", &r).unwrap();
        assert_eq!(out.get("date"), Some(&json!("2017-06-02T00:00:00+00:00")));

        let out = apply_one("parse-as-simple-date :ts 'yyyy-MM-dd HH:mm:ss';", &r).unwrap();
        assert_eq!(out.get("ts"), Some(&json!("2017-06-02T10:15:00+00:00")));

        let err = apply_one("parse-as-simple-date :ts 'MM/dd/yyyy';", &r).unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidValue { .. }));
    }

    #[test]
    fn test_format_date_and_timestamp() {
        let r = Record::from_pairs([("d", json!("2017-06-02T10:15:00+00:00")), ("ms", json!(1496398500000i64))]);
        let out = apply_one("format-date :d 'dd.MM.yyyy HH:mm';", &r).unwrap();
        assert_eq!(out.get("d"), Some(&json!("02.06.2017 10:15")));

        let out = apply_one("format-unix-timestamp :ms 'yyyy-MM-dd';", &r).unwrap();
        assert_eq!(out.get("ms"), Some(&json!("2017-06-02")));
        assert!(build("format-date :d 'qq';").is_err());
    }

    #[test]
    fn test_diff_date() {
        let r = Record::from_pairs([
            ("end", json!("2017-06-02T10:15:00+00:00")),
            ("start", json!("2017-06-02")),
            ("none", json!(null)),
        ]);
        let out = apply_one("diff-date end start elapsed", &r).unwrap();
        assert_eq!(out.get("elapsed"), Some(&json!(36_900_000)));
        let out = apply_one("diff-date end none elapsed", &r).unwrap();
        assert_eq!(out.get("elapsed"), Some(&json!(null)));
    }
}
