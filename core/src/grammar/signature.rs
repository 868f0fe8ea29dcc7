//! Directive signature registry.
//!
//! A static table from directive name to the ordered kinds of its arguments.
//! Both the parser and the migrator read it; nothing in here is executable
//! directive code.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// Element kind of a comma list argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// Rendered `:a,:b`.
    Column,
    /// Rendered `1,2,3`.
    Number,
    /// Opaque literal elements, rendered as written.
    Raw,
}

/// Kind of one positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    /// Column reference, `:name` in V2.
    Column,
    /// String literal, single-quoted in V2.
    Text,
    /// Numeric literal, unquoted.
    Number,
    /// Comma list.
    List(ElementKind),
    /// Expression, `exp:{...}` in V2; in V1 the rest of the line.
    Expression,
    /// Bare token (keyword, identifier, flag), never quoted or prefixed.
    Raw,
}

impl fmt::Display for ArgumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgumentKind::Column => "column",
            ArgumentKind::Text => "string",
            ArgumentKind::Number => "number",
            ArgumentKind::List(ElementKind::Column) => "column list",
            ArgumentKind::List(ElementKind::Number) => "number list",
            ArgumentKind::List(ElementKind::Raw) => "list",
            ArgumentKind::Expression => "expression",
            ArgumentKind::Raw => "token",
        };
        f.write_str(name)
    }
}

/// One positional parameter of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ArgumentKind,
    pub optional: bool,
}

impl Param {
    const fn new(name: &'static str, kind: ArgumentKind) -> Self {
        Self { name, kind, optional: false }
    }

    const fn opt(self) -> Self {
        Self { optional: true, ..self }
    }

    fn usage(&self) -> String {
        let body = match self.kind {
            ArgumentKind::Column => format!(":{}", self.name),
            ArgumentKind::Text => format!("'{}'", self.name),
            ArgumentKind::Number => format!("<{}>", self.name),
            ArgumentKind::List(ElementKind::Column) => format!(":{0}1,:{0}2,...", self.name),
            ArgumentKind::List(_) => format!("{0}1,{0}2,...", self.name),
            ArgumentKind::Expression => format!("exp:{{{}}}", self.name),
            ArgumentKind::Raw => self.name.to_string(),
        };
        if self.optional {
            format!("[{body}]")
        } else {
            body
        }
    }
}

const fn col(name: &'static str) -> Param {
    Param::new(name, ArgumentKind::Column)
}

const fn text(name: &'static str) -> Param {
    Param::new(name, ArgumentKind::Text)
}

const fn num(name: &'static str) -> Param {
    Param::new(name, ArgumentKind::Number)
}

const fn cols(name: &'static str) -> Param {
    Param::new(name, ArgumentKind::List(ElementKind::Column))
}

const fn nums(name: &'static str) -> Param {
    Param::new(name, ArgumentKind::List(ElementKind::Number))
}

const fn exp(name: &'static str) -> Param {
    Param::new(name, ArgumentKind::Expression)
}

const fn raw(name: &'static str) -> Param {
    Param::new(name, ArgumentKind::Raw)
}

/// Arguments selected by a leading literal sub-keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Case {
    pub keyword: &'static str,
    pub params: &'static [Param],
}

/// Argument shape of a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Fixed(&'static [Param]),
    /// First argument is a sub-keyword choosing the remaining parameters.
    Dispatch(&'static [Case]),
}

/// Registered signature of one directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub name: &'static str,
    pub description: &'static str,
    pub shape: Shape,
}

impl Signature {
    const fn fixed(name: &'static str, params: &'static [Param], description: &'static str) -> Self {
        Self {
            name,
            description,
            shape: Shape::Fixed(params),
        }
    }

    const fn dispatch(name: &'static str, cases: &'static [Case], description: &'static str) -> Self {
        Self {
            name,
            description,
            shape: Shape::Dispatch(cases),
        }
    }

    /// Case for a sub-keyword, for dispatching signatures.
    pub fn case(&self, keyword: &str) -> Option<&'static Case> {
        match self.shape {
            Shape::Fixed(_) => None,
            Shape::Dispatch(cases) => cases.iter().find(|c| c.keyword == keyword),
        }
    }

    /// One V2 usage line per shape, e.g. `rename :source :target`.
    pub fn usages(&self) -> Vec<String> {
        match self.shape {
            Shape::Fixed(params) => vec![usage_line(self.name, None, params)],
            Shape::Dispatch(cases) => cases
                .iter()
                .map(|c| usage_line(self.name, Some(c.keyword), c.params))
                .collect(),
        }
    }
}

fn usage_line(name: &str, keyword: Option<&str>, params: &[Param]) -> String {
    let mut parts = vec![name.to_string()];
    parts.extend(keyword.map(str::to_string));
    parts.extend(params.iter().map(Param::usage));
    format!("{};", parts.join(" "))
}

/// Human-readable arity of a parameter list: `2` or `2 to 3`.
pub fn arity(params: &[Param]) -> String {
    let required = params.iter().filter(|p| !p.optional).count();
    if required == params.len() {
        required.to_string()
    } else {
        format!("{} to {}", required, params.len())
    }
}

/// V1 directive names written as two words.
///
/// `(first word, sub-keyword, canonical name)`.
pub const LEGACY_COMPOUNDS: &[(&str, &str, &str)] = &[
    ("set", "column", "set-column"),
    ("set", "columns", "set-columns"),
];

/// Canonical name for a legacy two-word V1 name, if `first second` is one.
pub fn legacy_compound(first: &str, second: &str) -> Option<&'static str> {
    LEGACY_COMPOUNDS
        .iter()
        .find(|(a, b, _)| *a == first && *b == second)
        .map(|(_, _, canonical)| *canonical)
}

// =============================================================================
// Signature table
// =============================================================================

const CONDITION: &[Param] = &[exp("condition")];
const ONE_COLUMN: &[Param] = &[col("column")];
const COLUMN_PATTERN: &[Param] = &[col("column"), text("pattern")];
const COLUMN_FORMAT: &[Param] = &[col("column"), text("format")];
const SOURCE_TARGET: &[Param] = &[col("source"), col("target")];
const SOURCE_TARGET_PATH: &[Param] = &[col("source"), col("target"), text("path")];
const DEPTH: &[Param] = &[col("column"), num("depth").opt()];
const METRIC: &[Param] = &[raw("method"), col("column1"), col("column2"), col("destination")];

/// Every directive the grammar knows.
pub static SIGNATURES: &[Signature] = &[
    // Columns
    Signature::fixed("set-column", &[col("column"), exp("expression")], "Sets a column to the result of an expression."),
    Signature::fixed("set-columns", &[cols("column")], "Renames all columns positionally."),
    Signature::fixed("rename", SOURCE_TARGET, "Renames a column."),
    Signature::fixed("set-type", &[col("column"), raw("type")], "Converts a column value to a type."),
    Signature::fixed("drop", &[cols("column")], "Drops columns."),
    Signature::fixed("keep", &[cols("column")], "Keeps only the listed columns."),
    Signature::fixed("copy", &[col("source"), col("target"), raw("force").opt()], "Copies a column value to another column."),
    Signature::fixed("swap", &[col("first"), col("second")], "Swaps the values of two columns."),
    Signature::fixed("merge", &[col("first"), col("second"), col("target"), text("separator")], "Joins two columns into a new one."),
    Signature::fixed("cleanse-column-names", &[], "Lowercases column names and replaces special characters."),
    Signature::fixed("change-column-case", &[raw("case")], "Changes the case of every column name."),
    Signature::fixed("columns-replace", &[text("sed-expression")], "Rewrites column names with a sed expression."),
    Signature::fixed("flatten", &[cols("column")], "Emits one record per array element of the listed columns."),
    Signature::fixed("generate-uuid", ONE_COLUMN, "Writes a random UUID to a column."),
    // Text
    Signature::fixed("uppercase", ONE_COLUMN, "Uppercases a column value."),
    Signature::fixed("lowercase", ONE_COLUMN, "Lowercases a column value."),
    Signature::fixed("titlecase", ONE_COLUMN, "Titlecases a column value."),
    Signature::fixed("trim", ONE_COLUMN, "Removes leading and trailing whitespace."),
    Signature::fixed("ltrim", ONE_COLUMN, "Removes leading whitespace."),
    Signature::fixed("rtrim", ONE_COLUMN, "Removes trailing whitespace."),
    Signature::fixed("indexsplit", &[col("source"), num("start"), num("end"), col("destination")], "Copies a 1-based character range to a new column."),
    Signature::fixed("split", &[col("source"), text("delimiter"), col("first"), col("second")], "Splits a column at the first delimiter into two columns."),
    Signature::fixed("split-to-rows", &[col("column"), text("separator")], "Emits one record per separated value."),
    Signature::fixed("split-to-columns", &[col("column"), text("separator")], "Splits a value into numbered columns."),
    Signature::fixed("split-email", ONE_COLUMN, "Splits an email address into account and domain."),
    Signature::fixed("split-url", ONE_COLUMN, "Splits a URL into its components."),
    Signature::fixed("cut-character", &[col("source"), col("destination"), text("range")], "Copies a character range to a new column."),
    Signature::fixed("mask-number", &[col("column"), text("pattern")], "Masks a value, keeping characters where the pattern has '#'."),
    Signature::fixed("mask-shuffle", ONE_COLUMN, "Shuffles the characters of a value."),
    Signature::fixed("find-and-replace", &[col("column"), text("sed-expression")], "Rewrites a value with a sed expression."),
    Signature::fixed("fill-null-or-empty", &[col("column"), text("value")], "Fills null or empty values with a constant."),
    Signature::fixed("quantize", &[col("source"), col("destination"), raw("ranges")], "Maps numeric ranges to labels."),
    Signature::fixed("extract-regex-groups", COLUMN_PATTERN, "Extracts regex capture groups into new columns."),
    Signature::fixed("stemming", ONE_COLUMN, "Stems the words of a value."),
    Signature::fixed("text-distance", METRIC, "Computes a text distance between two columns."),
    Signature::fixed("text-metric", METRIC, "Computes a text similarity metric between two columns."),
    Signature::fixed("url-encode", ONE_COLUMN, "URL-encodes a value."),
    Signature::fixed("url-decode", ONE_COLUMN, "URL-decodes a value."),
    Signature::fixed("encode", &[raw("type"), col("column")], "Encodes a value (base64, hex) into a new column."),
    Signature::fixed("decode", &[raw("type"), col("column")], "Decodes a value (base64, hex) into a new column."),
    Signature::fixed("hash", &[col("column"), text("algorithm"), raw("encode").opt()], "Hashes a value."),
    // Dates
    Signature::fixed("format-date", COLUMN_FORMAT, "Formats a date value."),
    Signature::fixed("format-unix-timestamp", COLUMN_FORMAT, "Formats a unix timestamp in milliseconds."),
    Signature::fixed("parse-as-date", &[col("column"), text("timezone").opt()], "Parses a natural date value."),
    Signature::fixed("parse-as-simple-date", COLUMN_FORMAT, "Parses a date value with a pattern."),
    Signature::fixed("diff-date", &[col("first"), col("second"), col("destination")], "Writes the difference between two dates in milliseconds."),
    // Parsers and writers
    Signature::fixed("parse-as-csv", &[col("column"), text("delimiter"), raw("header").opt()], "Parses a CSV value into columns."),
    Signature::fixed("parse-as-json", DEPTH, "Parses a JSON value into columns."),
    Signature::fixed("parse-as-protobuf", &[col("column"), raw("schema"), text("record"), text("version").opt()], "Parses a protobuf message."),
    Signature::fixed("parse-as-xml", ONE_COLUMN, "Parses an XML value."),
    Signature::fixed("parse-xml-to-json", DEPTH, "Converts an XML value to JSON."),
    Signature::fixed("parse-as-excel", &[col("column"), text("sheet").opt()], "Parses an Excel workbook."),
    Signature::fixed("parse-as-hl7", DEPTH, "Parses an HL7 message."),
    Signature::fixed("parse-as-avro-file", ONE_COLUMN, "Parses an Avro data file."),
    Signature::fixed("parse-as-log", COLUMN_FORMAT, "Parses a log line with a pattern."),
    Signature::fixed("parse-as-fixed-length", &[col("column"), nums("width"), text("padding").opt()], "Splits a value into fixed-width columns."),
    Signature::fixed("json-path", SOURCE_TARGET_PATH, "Extracts a JSON path into a column."),
    Signature::fixed("xpath", SOURCE_TARGET_PATH, "Extracts an XPath into a column."),
    Signature::fixed("xpath-array", SOURCE_TARGET_PATH, "Extracts all XPath matches into a column."),
    Signature::fixed("set-charset", &[col("column"), raw("charset")], "Decodes a byte value with a character set."),
    Signature::fixed("set-record-delim", &[col("column"), text("delimiter"), num("limit").opt()], "Splits a value into records on a delimiter."),
    Signature::fixed("write-as-json-map", ONE_COLUMN, "Writes the whole record as a JSON object."),
    Signature::fixed("write-as-json-object", &[col("destination"), cols("column")], "Writes the listed columns as a JSON object."),
    Signature::fixed("write-as-csv", ONE_COLUMN, "Writes the whole record as a CSV line."),
    // Lookups and services
    Signature::fixed("invoke-http", &[text("url"), cols("column"), text("headers").opt()], "Posts columns to an HTTP service."),
    Signature::fixed("catalog-lookup", &[text("catalog"), col("column")], "Looks a value up in a reference catalog."),
    Signature::fixed("table-lookup", &[col("column"), text("table")], "Looks a value up in a dataset table."),
    // Filters and routing
    Signature::fixed("filter-row-if-matched", COLUMN_PATTERN, "Drops records whose value matches a regex."),
    Signature::fixed("filter-row-if-not-matched", COLUMN_PATTERN, "Drops records whose value does not match a regex."),
    Signature::fixed("filter-row-if-true", CONDITION, "Drops records for which the condition is true."),
    Signature::fixed("filter-row-if-false", CONDITION, "Drops records for which the condition is false."),
    Signature::dispatch(
        "filter-rows-on",
        &[
            Case { keyword: "condition-false", params: CONDITION },
            Case { keyword: "condition-true", params: CONDITION },
            Case { keyword: "empty-or-null-columns", params: &[cols("column")] },
            Case { keyword: "regex-match", params: COLUMN_PATTERN },
            Case { keyword: "regex-not-match", params: COLUMN_PATTERN },
        ],
        "Drops records by condition, emptiness or regex.",
    ),
    Signature::fixed("send-to-error", CONDITION, "Diverts records for which the condition is true to the error stream."),
    Signature::fixed("fail", CONDITION, "Diverts matching records and fails the run."),
    // Variables
    Signature::fixed("set-variable", &[raw("variable"), exp("expression")], "Sets a run variable from an expression."),
    Signature::fixed("increment-variable", &[raw("variable"), num("value"), exp("condition")], "Increments a run variable when the condition holds."),
];

static BY_NAME: Lazy<HashMap<&'static str, &'static Signature>> =
    Lazy::new(|| SIGNATURES.iter().map(|s| (s.name, s)).collect());

/// Signature for a canonical directive name.
pub fn signature_of(name: &str) -> Option<&'static Signature> {
    BY_NAME.get(name).copied()
}

/// All signatures sorted by name.
pub fn all_signatures() -> Vec<&'static Signature> {
    let mut all: Vec<_> = SIGNATURES.iter().collect();
    all.sort_by_key(|s| s.name);
    all
}
