//! Structured payloads inside a column: JSON, CSV, fixed-width, and the
//! reverse direction (writing a record out as JSON or CSV).

use serde_json::{Map, Value};

use super::columns::parse_flag;
use super::{column_string, invalid};
use crate::error::{DirectiveError, DirectiveResult, EvalResult};
use crate::grammar::ParsedDirective;
use crate::models::{display_value, Record};
use crate::transform::context::ExecutionContext;
use crate::transform::directive::{
    column_arg, count_arg, factory, list_arg, text_arg, Directive, DirectiveRegistry, Outcome,
};

pub fn register(registry: &mut DirectiveRegistry) {
    registry
        .register("parse-as-json", factory::<ParseJson>)
        .register("parse-as-csv", factory::<ParseCsv>)
        .register("parse-as-fixed-length", factory::<ParseFixedLength>)
        .register("write-as-json-map", factory::<WriteJsonMap>)
        .register("write-as-json-object", factory::<WriteJsonObject>)
        .register("write-as-csv", factory::<WriteCsv>)
        .register("set-record-delim", factory::<SetRecordDelim>);
}

/// `\t`, `\n` and `\r` escapes in delimiter arguments.
fn unescape(text: &str) -> String {
    text.replace("\\t", "\t").replace("\\n", "\n").replace("\\r", "\r")
}

// =============================================================================
// JSON
// =============================================================================

/// `parse-as-json :col [depth]`: object keys become `<col>_<key>` columns,
/// nested objects flatten until `depth` levels and are kept whole below it.
/// The source column is removed. A top-level array yields one record per
/// element.
#[derive(Default)]
pub struct ParseJson {
    column: String,
    depth: Option<usize>,
}

fn flatten_into(out: &mut Record, prefix: &str, value: Value, depth: usize) {
    match value {
        Value::Object(map) if depth > 0 => {
            for (key, nested) in map {
                flatten_into(out, &format!("{prefix}_{key}"), nested, depth - 1);
            }
        }
        other => out.set(prefix, other),
    }
}

impl ParseJson {
    fn expand(&self, record: &Record, value: Value) -> Record {
        let mut out = record.clone();
        out.remove(&self.column);
        flatten_into(&mut out, &self.column, value, self.depth.unwrap_or(usize::MAX));
        out
    }
}

impl Directive for ParseJson {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        self.depth = match directive.number(1) {
            Some(_) => Some(count_arg(directive, 1)?),
            None => None,
        };
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let parsed = match record.require(&self.column)? {
            Value::String(text) => {
                serde_json::from_str::<Value>(text).map_err(|e| invalid(&self.column, e.to_string()))?
            }
            Value::Null => return Ok(Outcome::one(record.clone())),
            other => other.clone(),
        };
        match parsed {
            Value::Array(items) => Ok(Outcome::Emit(
                items.into_iter().map(|item| self.expand(record, item)).collect(),
            )),
            value => Ok(Outcome::one(self.expand(record, value))),
        }
    }
}

/// `write-as-json-map :col`: the record (before the write) as a JSON string.
#[derive(Default)]
pub struct WriteJsonMap {
    column: String,
}

impl Directive for WriteJsonMap {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let json = serde_json::to_string(&record.to_json()).map_err(|e| invalid(&self.column, e.to_string()))?;
        let mut out = record.clone();
        out.set(self.column.clone(), Value::String(json));
        Ok(Outcome::one(out))
    }
}

/// `write-as-json-object :dest :a,:b`: the listed columns as an object value.
#[derive(Default)]
pub struct WriteJsonObject {
    destination: String,
    columns: Vec<String>,
}

impl Directive for WriteJsonObject {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.destination = column_arg(directive, 0)?;
        self.columns = list_arg(directive, 1)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let object: Map<String, Value> = self
            .columns
            .iter()
            .map(|c| (c.clone(), record.get(c).cloned().unwrap_or(Value::Null)))
            .collect();
        let mut out = record.clone();
        out.set(self.destination.clone(), Value::Object(object));
        Ok(Outcome::one(out))
    }
}

// =============================================================================
// CSV
// =============================================================================

/// `parse-as-csv :col 'delimiter' [header]`: each line of the value becomes
/// a record with `<col>_1`, `<col>_2`, ... columns. With `header` the first
/// line seen in the run names the columns and is dropped; the names are kept
/// as the step's state in the [`ExecutionContext`].
#[derive(Default)]
pub struct ParseCsv {
    column: String,
    delimiter: u8,
    header: bool,
}

impl ParseCsv {
    fn rows(&self, text: &str) -> EvalResult<Vec<Vec<String>>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        reader
            .records()
            .map(|row| {
                row.map(|r| r.iter().map(str::to_string).collect())
                    .map_err(|e| invalid(&self.column, e.to_string()))
            })
            .collect()
    }
}

impl Directive for ParseCsv {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        let delimiter = unescape(&text_arg(directive, 1)?);
        self.delimiter = match delimiter.as_bytes() {
            [byte] => *byte,
            _ => {
                return Err(DirectiveError::invalid(
                    &directive.canonical,
                    format!("delimiter must be a single byte, found '{delimiter}'"),
                ))
            }
        };
        self.header = match directive.raw(2) {
            None => false,
            Some(flag) => parse_flag(directive, flag)?,
        };
        Ok(())
    }

    fn apply(&self, record: &Record, context: &mut ExecutionContext) -> EvalResult<Outcome> {
        if record.require(&self.column)?.is_null() {
            return Ok(Outcome::one(record.clone()));
        }
        let text = column_string(record, &self.column)?;
        let mut names = context.step_state().and_then(header_names);

        let mut records = Vec::new();
        for row in self.rows(&text)? {
            if self.header && names.is_none() {
                context.set_step_state(Value::from(row.clone()));
                names = Some(row);
                continue;
            }
            let mut out = record.clone();
            for (i, field) in row.into_iter().enumerate() {
                let name = names
                    .as_ref()
                    .and_then(|n| n.get(i).cloned())
                    .unwrap_or_else(|| format!("{}_{}", self.column, i + 1));
                out.set(name, Value::String(field));
            }
            records.push(out);
        }
        Ok(Outcome::Emit(records))
    }

    fn is_stateless(&self) -> bool {
        !self.header
    }
}

fn header_names(state: &Value) -> Option<Vec<String>> {
    state
        .as_array()
        .map(|names| names.iter().map(display_value).collect())
}

/// `write-as-csv :col`: every value of the record as one CSV line.
#[derive(Default)]
pub struct WriteCsv {
    column: String,
}

impl Directive for WriteCsv {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let mut writer = csv::WriterBuilder::new().terminator(csv::Terminator::Any(b'\n')).from_writer(Vec::new());
        writer
            .write_record(record.values().map(display_value))
            .map_err(|e| invalid(&self.column, e.to_string()))?;
        let bytes = writer.into_inner().map_err(|e| invalid(&self.column, e.to_string()))?;
        let line = String::from_utf8(bytes).map_err(|e| invalid(&self.column, e.to_string()))?;

        let mut out = record.clone();
        out.set(self.column.clone(), Value::String(line.trim_end_matches('\n').to_string()));
        Ok(Outcome::one(out))
    }
}

// =============================================================================
// Fixed width and record splitting
// =============================================================================

/// `parse-as-fixed-length :col 3,5,2 ['padding']`: consecutive widths become
/// `<col>_1`, `<col>_2`, ... with the padding character trimmed.
#[derive(Default)]
pub struct ParseFixedLength {
    column: String,
    widths: Vec<usize>,
    total: usize,
    padding: char,
}

impl Directive for ParseFixedLength {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        self.widths = list_arg(directive, 1)?
            .iter()
            .map(|w| w.parse::<usize>().ok().filter(|n| *n > 0))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| DirectiveError::invalid(&directive.canonical, "widths must be positive integers"))?;
        self.total = self
            .widths
            .iter()
            .try_fold(0usize, |sum, width| sum.checked_add(*width))
            .ok_or_else(|| DirectiveError::invalid(&directive.canonical, "widths add up to more than a value can hold"))?;
        self.padding = match directive.text(2) {
            Some(p) => p.chars().next().unwrap_or(' '),
            None => ' ',
        };
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let chars: Vec<char> = column_string(record, &self.column)?.chars().collect();
        if chars.len() < self.total {
            return Err(invalid(
                &self.column,
                format!("value has {} characters, widths need {}", chars.len(), self.total),
            ));
        }

        let mut out = record.clone();
        let mut start = 0;
        for (i, width) in self.widths.iter().enumerate() {
            let field: String = chars[start..start + width].iter().collect();
            out.set(
                format!("{}_{}", self.column, i + 1),
                Value::String(field.trim_matches(self.padding).to_string()),
            );
            start += width;
        }
        Ok(Outcome::one(out))
    }
}

/// `set-record-delim :col 'delimiter' [limit]`: one record per non-empty
/// part, holding only that column; at most `limit` records.
#[derive(Default)]
pub struct SetRecordDelim {
    column: String,
    delimiter: String,
    limit: Option<usize>,
}

impl Directive for SetRecordDelim {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        self.delimiter = unescape(&text_arg(directive, 1)?);
        if self.delimiter.is_empty() {
            return Err(DirectiveError::invalid(&directive.canonical, "delimiter is empty"));
        }
        self.limit = match directive.number(2) {
            Some(_) => Some(count_arg(directive, 2)?),
            None => None,
        };
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let text = column_string(record, &self.column)?;
        let records = text
            .split(self.delimiter.as_str())
            .filter(|part| !part.is_empty())
            .take(self.limit.unwrap_or(usize::MAX))
            .map(|part| Record::from_pairs([(self.column.clone(), Value::String(part.to_string()))]))
            .collect();
        Ok(Outcome::Emit(records))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{apply, apply_one, build};
    use super::*;
    use serde_json::json;

    fn emitted(outcome: Outcome) -> Vec<Record> {
        match outcome {
            Outcome::Emit(records) => records,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_as_json_flattens() {
        let r = Record::from_pairs([("id", json!(1)), ("body", json!(r#"{"name":{"first":"Ann","last":"Lee"},"age":40}"#))]);
        let out = apply_one("parse-as-json body", &r).unwrap();
        let columns: Vec<&str> = out.columns().collect();
        assert_eq!(columns, vec!["id", "body_name_first", "body_name_last", "body_age"]);

        let out = apply_one("parse-as-json body 1", &r).unwrap();
        assert_eq!(out.get("body_name"), Some(&json!({"first": "Ann", "last": "Lee"})));
    }

    #[test]
    fn test_parse_as_json_array_and_errors() {
        let r = Record::from_pairs([("body", json!(r#"[{"a":1},{"a":2}]"#)), ("bad", json!("{"))]);
        let records = emitted(apply("parse-as-json body", &r).unwrap());
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("body_a"), Some(&json!(2)));
        assert!(apply("parse-as-json bad", &r).is_err());
    }

    #[test]
    fn test_parse_as_csv() {
        let r = Record::from_pairs([("body", json!("a,\"b,c\",d"))]);
        let out = apply_one("parse-as-csv :body ',';", &r).unwrap();
        assert_eq!(out.get("body_2"), Some(&json!("b,c")));
        assert_eq!(out.get("body_3"), Some(&json!("d")));

        let directive = build("parse-as-csv :body '\\t' true;").unwrap();
        assert!(!directive.is_stateless());
        let mut context = ExecutionContext::new();
        let header = Record::from_pairs([("body", json!("x\ty"))]);
        let row = Record::from_pairs([("body", json!("1\t2"))]);
        assert_eq!(directive.apply(&header, &mut context).unwrap(), Outcome::none());
        let records = emitted(directive.apply(&row, &mut context).unwrap());
        assert_eq!(records[0].get("y"), Some(&json!("2")));

        // A new run starts without a header.
        let mut context = ExecutionContext::new();
        assert_eq!(directive.apply(&row, &mut context).unwrap(), Outcome::none());
        assert_eq!(context.step_state(), Some(&json!(["1", "2"])));
    }

    #[test]
    fn test_write_as_json_and_csv() {
        let r = Record::from_pairs([("a", json!(1)), ("b", json!("x,y"))]);
        let out = apply_one("write-as-json-map out", &r).unwrap();
        assert_eq!(out.get("out"), Some(&json!(r#"{"a":1,"b":"x,y"}"#)));

        let out = apply_one("write-as-json-object out a,zz", &r).unwrap();
        assert_eq!(out.get("out"), Some(&json!({"a": 1, "zz": null})));

        let out = apply_one("write-as-csv out", &r).unwrap();
        assert_eq!(out.get("out"), Some(&json!("1,\"x,y\"")));
    }

    #[test]
    fn test_parse_as_fixed_length() {
        let r = Record::from_pairs([("line", json!("12  AB__xyz")), ("short", json!("12"))]);
        let out = apply_one("parse-as-fixed-length :line 4,4,3 '_';", &r).unwrap();
        assert_eq!(out.get("line_1"), Some(&json!("12  ")));
        assert_eq!(out.get("line_2"), Some(&json!("AB")));

        let out = apply_one("parse-as-fixed-length line 4,4,3", &r).unwrap();
        assert_eq!(out.get("line_1"), Some(&json!("12")));
        assert!(apply("parse-as-fixed-length short 4,4", &r).is_err());
        assert!(build("parse-as-fixed-length :line 18446744073709551615,1;").is_err());
    }

    #[test]
    fn test_set_record_delim() {
        let r = Record::from_pairs([("body", json!("a|b||c")), ("other", json!(1))]);
        let records = emitted(apply("set-record-delim body |", &r).unwrap());
        assert_eq!(records.len(), 3);
        assert_eq!(records[2], Record::from_pairs([("body", json!("c"))]));

        let records = emitted(apply("set-record-delim body | 2", &r).unwrap());
        assert_eq!(records.len(), 2);
    }
}
