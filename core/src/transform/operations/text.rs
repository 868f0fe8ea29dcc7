//! Value-rewriting directives.

use rand::Rng;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use super::columns::regex_arg;
use super::{column_string, invalid, map_text};
use crate::error::{DirectiveError, DirectiveResult, EvalResult};
use crate::grammar::ParsedDirective;
use crate::models::{display_value, is_empty_value, numeric_value, Record};
use crate::transform::context::ExecutionContext;
use crate::transform::directive::{
    column_arg, count_arg, factory, raw_arg, text_arg, Directive, DirectiveRegistry, Outcome,
};

pub fn register(registry: &mut DirectiveRegistry) {
    registry
        .register("uppercase", factory::<ChangeCase>)
        .register("lowercase", factory::<ChangeCase>)
        .register("titlecase", factory::<ChangeCase>)
        .register("trim", factory::<Trim>)
        .register("ltrim", factory::<Trim>)
        .register("rtrim", factory::<Trim>)
        .register("indexsplit", factory::<IndexSplit>)
        .register("split", factory::<Split>)
        .register("split-to-rows", factory::<SplitToRows>)
        .register("split-to-columns", factory::<SplitToColumns>)
        .register("split-email", factory::<SplitEmail>)
        .register("split-url", factory::<SplitUrl>)
        .register("cut-character", factory::<CutCharacter>)
        .register("mask-number", factory::<MaskNumber>)
        .register("mask-shuffle", factory::<MaskShuffle>)
        .register("find-and-replace", factory::<FindAndReplace>)
        .register("fill-null-or-empty", factory::<FillNullOrEmpty>)
        .register("quantize", factory::<Quantize>)
        .register("extract-regex-groups", factory::<ExtractRegexGroups>);
}

// =============================================================================
// Sed expressions
// =============================================================================

/// `s/pattern/replacement/flags` with `g` (every match) and `i` (ignore
/// case) flags. `\1` and `&` in the replacement refer to captures.
#[derive(Debug, Clone)]
pub struct SedExpression {
    regex: Regex,
    replacement: String,
    global: bool,
}

impl SedExpression {
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut chars = text.chars();
        if chars.next() != Some('s') {
            return Err(format!("'{text}' is not a sed expression"));
        }
        let delimiter = chars
            .next()
            .ok_or_else(|| format!("'{text}' is missing a delimiter"))?;

        let mut parts = vec![String::new()];
        let mut escaped = false;
        for c in chars {
            let current = parts.last_mut().ok_or("empty sed expression")?;
            if escaped {
                if c != delimiter {
                    current.push('\\');
                }
                current.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == delimiter {
                parts.push(String::new());
            } else {
                current.push(c);
            }
        }
        if parts.len() != 3 {
            return Err(format!("'{text}' must have the form s{delimiter}pattern{delimiter}replacement{delimiter}flags"));
        }

        let flags = parts.pop().unwrap_or_default();
        let replacement = parts.pop().unwrap_or_default();
        let pattern = parts.pop().unwrap_or_default();

        let mut global = false;
        let mut ignore_case = false;
        for flag in flags.chars() {
            match flag {
                'g' => global = true,
                'i' | 'I' => ignore_case = true,
                other => return Err(format!("unknown sed flag '{other}'")),
            }
        }

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| e.to_string())?;

        Ok(Self {
            regex,
            replacement: translate_replacement(&replacement),
            global,
        })
    }

    pub fn apply(&self, input: &str) -> String {
        if self.global {
            self.regex.replace_all(input, self.replacement.as_str()).into_owned()
        } else {
            self.regex.replace(input, self.replacement.as_str()).into_owned()
        }
    }
}

/// Sed replacement syntax to `regex` syntax.
fn translate_replacement(sed: &str) -> String {
    let mut out = String::with_capacity(sed.len());
    let mut chars = sed.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(d) if d.is_ascii_digit() => out.push_str(&format!("${{{d}}}")),
                Some('$') => out.push_str("$$"),
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            '&' => out.push_str("${0}"),
            '$' => out.push_str("$$"),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// Case and whitespace
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Case {
    #[default]
    Upper,
    Lower,
    Title,
}

fn titlecase(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut start_of_word = true;
    for c in value.chars() {
        if c.is_whitespace() {
            start_of_word = true;
            out.push(c);
        } else if start_of_word {
            out.extend(c.to_uppercase());
            start_of_word = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// `uppercase`, `lowercase` and `titlecase`.
#[derive(Default)]
pub struct ChangeCase {
    column: String,
    case: Case,
}

impl Directive for ChangeCase {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        self.case = match directive.canonical.as_str() {
            "lowercase" => Case::Lower,
            "titlecase" => Case::Title,
            _ => Case::Upper,
        };
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let out = map_text(record, &self.column, |value| {
            Ok(Value::String(match self.case {
                Case::Upper => value.to_uppercase(),
                Case::Lower => value.to_lowercase(),
                Case::Title => titlecase(value),
            }))
        })?;
        Ok(Outcome::one(out))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Side {
    #[default]
    Both,
    Start,
    End,
}

/// `trim`, `ltrim` and `rtrim`.
#[derive(Default)]
pub struct Trim {
    column: String,
    side: Side,
}

impl Directive for Trim {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        self.side = match directive.canonical.as_str() {
            "ltrim" => Side::Start,
            "rtrim" => Side::End,
            _ => Side::Both,
        };
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let out = map_text(record, &self.column, |value| {
            let trimmed = match self.side {
                Side::Both => value.trim(),
                Side::Start => value.trim_start(),
                Side::End => value.trim_end(),
            };
            Ok(Value::String(trimmed.to_string()))
        })?;
        Ok(Outcome::one(out))
    }
}

// =============================================================================
// Splitting
// =============================================================================

/// `indexsplit :source <start> <end> :destination`, 1-based and inclusive.
#[derive(Default)]
pub struct IndexSplit {
    source: String,
    start: usize,
    end: usize,
    destination: String,
}

impl Directive for IndexSplit {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.source = column_arg(directive, 0)?;
        self.start = count_arg(directive, 1)?;
        self.end = count_arg(directive, 2)?;
        self.destination = column_arg(directive, 3)?;
        if self.start == 0 || self.end < self.start {
            return Err(DirectiveError::invalid(
                &directive.canonical,
                format!("invalid range {}..{}", self.start, self.end),
            ));
        }
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let value = column_string(record, &self.source)?;
        let part: String = value
            .chars()
            .skip(self.start - 1)
            .take(self.end - self.start + 1)
            .collect();
        let mut out = record.clone();
        out.set(self.destination.clone(), Value::String(part));
        Ok(Outcome::one(out))
    }
}

/// `split :source 'delimiter' :first :second` at the first delimiter.
#[derive(Default)]
pub struct Split {
    source: String,
    delimiter: String,
    first: String,
    second: String,
}

impl Directive for Split {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.source = column_arg(directive, 0)?;
        self.delimiter = text_arg(directive, 1)?;
        self.first = column_arg(directive, 2)?;
        self.second = column_arg(directive, 3)?;
        if self.delimiter.is_empty() {
            return Err(DirectiveError::invalid(&directive.canonical, "delimiter is empty"));
        }
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let value = column_string(record, &self.source)?;
        let (first, second) = match value.split_once(&self.delimiter) {
            Some((a, b)) => (Value::String(a.to_string()), Value::String(b.to_string())),
            None => (Value::String(value), Value::Null),
        };
        let mut out = record.clone();
        out.set(self.first.clone(), first);
        out.set(self.second.clone(), second);
        Ok(Outcome::one(out))
    }
}

/// `split-to-rows :col 'regex'`: one record per part.
#[derive(Default)]
pub struct SplitToRows {
    column: String,
    separator: Option<Regex>,
}

impl Directive for SplitToRows {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        self.separator = Some(regex_arg(directive, &text_arg(directive, 1)?)?);
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let (Some(separator), Some(value)) = (&self.separator, record.require(&self.column)?.as_str()) else {
            return Ok(Outcome::one(record.clone()));
        };
        let records = separator
            .split(value)
            .map(|part| {
                let mut out = record.clone();
                out.set(self.column.clone(), Value::String(part.to_string()));
                out
            })
            .collect();
        Ok(Outcome::Emit(records))
    }
}

/// `split-to-columns :col 'regex'`: parts go to `<col>_1`, `<col>_2`, ...
#[derive(Default)]
pub struct SplitToColumns {
    column: String,
    separator: Option<Regex>,
}

impl Directive for SplitToColumns {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        self.separator = Some(regex_arg(directive, &text_arg(directive, 1)?)?);
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let value = column_string(record, &self.column)?;
        let mut out = record.clone();
        if let Some(separator) = &self.separator {
            for (i, part) in separator.split(&value).enumerate() {
                out.set(format!("{}_{}", self.column, i + 1), Value::String(part.to_string()));
            }
        }
        Ok(Outcome::one(out))
    }
}

/// Adds `<col>_account` and `<col>_domain`; both null for non-addresses.
#[derive(Default)]
pub struct SplitEmail {
    column: String,
}

fn split_address(value: &str) -> Option<(String, String)> {
    let value = value.trim();
    let address = match (value.rfind('<'), value.rfind('>')) {
        (Some(open), Some(close)) if open < close => &value[open + 1..close],
        _ => value,
    };
    let (account, domain) = address.rsplit_once('@')?;
    if account.is_empty() || domain.is_empty() {
        return None;
    }
    Some((account.to_string(), domain.to_string()))
}

impl Directive for SplitEmail {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let value = record.require(&self.column)?;
        let (account, domain) = match value.as_str().and_then(split_address) {
            Some((a, d)) => (Value::String(a), Value::String(d)),
            None => (Value::Null, Value::Null),
        };
        let mut out = record.clone();
        out.set(format!("{}_account", self.column), account);
        out.set(format!("{}_domain", self.column), domain);
        Ok(Outcome::one(out))
    }
}

/// Adds `<col>_protocol`, `_authority`, `_host`, `_port`, `_path`, `_query`
/// and `_filename`.
#[derive(Default)]
pub struct SplitUrl {
    column: String,
}

impl Directive for SplitUrl {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let value = column_string(record, &self.column)?;
        let url = url::Url::parse(value.trim()).map_err(|e| invalid(&self.column, e.to_string()))?;

        let host = url.host_str().map(str::to_string);
        let authority = host.as_ref().map(|h| match url.port() {
            Some(port) => format!("{h}:{port}"),
            None => h.clone(),
        });
        let filename = match url.query() {
            Some(q) => format!("{}?{q}", url.path()),
            None => url.path().to_string(),
        };
        let text = |s: Option<String>| s.map(Value::String).unwrap_or(Value::Null);

        let mut out = record.clone();
        let prefix = &self.column;
        out.set(format!("{prefix}_protocol"), Value::String(url.scheme().to_string()));
        out.set(format!("{prefix}_authority"), text(authority));
        out.set(format!("{prefix}_host"), text(host));
        out.set(
            format!("{prefix}_port"),
            url.port_or_known_default().map(Value::from).unwrap_or(Value::Null),
        );
        out.set(format!("{prefix}_path"), Value::String(url.path().to_string()));
        out.set(format!("{prefix}_query"), text(url.query().map(str::to_string)));
        out.set(format!("{prefix}_filename"), Value::String(filename));
        Ok(Outcome::one(out))
    }
}

/// `cut-character :source :destination 'ranges'` with `cut -c` ranges:
/// `3`, `1-3`, `2-`, `-4`, comma separated.
#[derive(Default)]
pub struct CutCharacter {
    source: String,
    destination: String,
    ranges: Vec<(usize, Option<usize>)>,
}

fn parse_ranges(text: &str) -> Result<Vec<(usize, Option<usize>)>, String> {
    let bad = || format!("invalid character range '{text}'");
    let number = |s: &str| s.trim().parse::<usize>().ok().filter(|n| *n > 0);

    text.split(',')
        .map(|part| {
            let part = part.trim();
            match part.split_once('-') {
                None => number(part).map(|n| (n, Some(n))).ok_or_else(bad),
                Some(("", end)) => number(end).map(|e| (1, Some(e))).ok_or_else(bad),
                Some((start, "")) => number(start).map(|s| (s, None)).ok_or_else(bad),
                Some((start, end)) => match (number(start), number(end)) {
                    (Some(s), Some(e)) if s <= e => Ok((s, Some(e))),
                    _ => Err(bad()),
                },
            }
        })
        .collect()
}

impl Directive for CutCharacter {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.source = column_arg(directive, 0)?;
        self.destination = column_arg(directive, 1)?;
        self.ranges =
            parse_ranges(&text_arg(directive, 2)?).map_err(|e| DirectiveError::invalid(&directive.canonical, e))?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let chars: Vec<char> = column_string(record, &self.source)?.chars().collect();
        let mut cut = String::new();
        for &(start, end) in &self.ranges {
            let end = end.unwrap_or(chars.len()).min(chars.len());
            if start <= end {
                cut.extend(&chars[start - 1..end]);
            }
        }
        let mut out = record.clone();
        out.set(self.destination.clone(), Value::String(cut));
        Ok(Outcome::one(out))
    }
}

// =============================================================================
// Masking
// =============================================================================

/// `mask-number :col 'xxx-xx-####'`: `#` keeps the character at that
/// position, any other pattern character replaces it.
#[derive(Default)]
pub struct MaskNumber {
    column: String,
    pattern: Vec<char>,
}

pub(crate) fn mask(value: &str, pattern: &[char]) -> String {
    value
        .chars()
        .zip(pattern)
        .map(|(v, &p)| if p == '#' { v } else { p })
        .collect()
}

impl Directive for MaskNumber {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        self.pattern = text_arg(directive, 1)?.chars().collect();
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let out = map_text(record, &self.column, |value| Ok(Value::String(mask(value, &self.pattern))))?;
        Ok(Outcome::one(out))
    }
}

/// Replaces letters and digits with random ones of the same class.
#[derive(Default)]
pub struct MaskShuffle {
    column: String,
}

impl Directive for MaskShuffle {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let mut rng = rand::thread_rng();
        let out = map_text(record, &self.column, |value| {
            let shuffled: String = value
                .chars()
                .map(|c| {
                    if c.is_ascii_digit() {
                        char::from(b'0' + rng.gen_range(0..10u8))
                    } else if c.is_ascii_uppercase() {
                        char::from(b'A' + rng.gen_range(0..26u8))
                    } else if c.is_ascii_lowercase() {
                        char::from(b'a' + rng.gen_range(0..26u8))
                    } else {
                        c
                    }
                })
                .collect();
            Ok(Value::String(shuffled))
        })?;
        Ok(Outcome::one(out))
    }
}

// =============================================================================
// Replacement and extraction
// =============================================================================

#[derive(Default)]
pub struct FindAndReplace {
    column: String,
    sed: Option<SedExpression>,
}

impl Directive for FindAndReplace {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        let text = text_arg(directive, 1)?;
        self.sed = Some(SedExpression::parse(&text).map_err(|e| DirectiveError::invalid(&directive.canonical, e))?);
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let Some(sed) = &self.sed else {
            return Ok(Outcome::one(record.clone()));
        };
        let out = map_text(record, &self.column, |value| Ok(Value::String(sed.apply(value))))?;
        Ok(Outcome::one(out))
    }
}

/// Missing columns are added with the fill value.
#[derive(Default)]
pub struct FillNullOrEmpty {
    column: String,
    value: String,
}

impl Directive for FillNullOrEmpty {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        self.value = text_arg(directive, 1)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let mut out = record.clone();
        if record.get(&self.column).map_or(true, is_empty_value) {
            out.set(self.column.clone(), Value::String(self.value.clone()));
        }
        Ok(Outcome::one(out))
    }
}

/// `quantize :source :destination low:high=label,...`, bounds inclusive.
/// Values outside every range yield null.
#[derive(Default)]
pub struct Quantize {
    source: String,
    destination: String,
    ranges: Vec<(f64, f64, String)>,
}

fn parse_quantize_ranges(text: &str) -> Result<Vec<(f64, f64, String)>, String> {
    text.split(',')
        .map(|entry| {
            let bad = || format!("invalid range '{entry}', expected low:high=label");
            let (bounds, label) = entry.split_once('=').ok_or_else(bad)?;
            let (low, high) = bounds.split_once(':').ok_or_else(bad)?;
            let low: f64 = low.trim().parse().map_err(|_| bad())?;
            let high: f64 = high.trim().parse().map_err(|_| bad())?;
            if low > high {
                return Err(bad());
            }
            Ok((low, high, label.to_string()))
        })
        .collect()
}

impl Directive for Quantize {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.source = column_arg(directive, 0)?;
        self.destination = column_arg(directive, 1)?;
        self.ranges =
            parse_quantize_ranges(&raw_arg(directive, 2)?).map_err(|e| DirectiveError::invalid(&directive.canonical, e))?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let value = record.require(&self.source)?;
        let n = numeric_value(value)
            .ok_or_else(|| invalid(&self.source, format!("'{}' is not a number", display_value(value))))?;
        let label = self
            .ranges
            .iter()
            .find(|(low, high, _)| *low <= n && n <= *high)
            .map(|(_, _, label)| Value::String(label.clone()))
            .unwrap_or(Value::Null);
        let mut out = record.clone();
        out.set(self.destination.clone(), label);
        Ok(Outcome::one(out))
    }
}

/// Capture group `g` of match `m` goes to `<col>_<m>_<g>`.
#[derive(Default)]
pub struct ExtractRegexGroups {
    column: String,
    regex: Option<Regex>,
}

impl Directive for ExtractRegexGroups {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        self.regex = Some(regex_arg(directive, &text_arg(directive, 1)?)?);
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let value = column_string(record, &self.column)?;
        let mut out = record.clone();
        if let Some(regex) = &self.regex {
            for (m, captures) in regex.captures_iter(&value).enumerate() {
                for g in 1..captures.len() {
                    let group = captures
                        .get(g)
                        .map(|c| Value::String(c.as_str().to_string()))
                        .unwrap_or(Value::Null);
                    out.set(format!("{}_{}_{}", self.column, m + 1, g), group);
                }
            }
        }
        Ok(Outcome::one(out))
    }
}
