//! Schema-changing directives.

use regex::Regex;
use serde_json::Value;

use super::invalid;
use super::text::SedExpression;
use crate::error::{DirectiveError, DirectiveResult, EvalResult, EvaluationError};
use crate::grammar::ParsedDirective;
use crate::models::{display_value, numeric_value, number_value, Record};
use crate::transform::context::ExecutionContext;
use crate::transform::directive::{
    column_arg, expression_arg, factory, list_arg, raw_arg, text_arg, Directive, DirectiveRegistry, Outcome,
};
use crate::transform::expression::Expression;

pub fn register(registry: &mut DirectiveRegistry) {
    registry
        .register("set-column", factory::<SetColumn>)
        .register("set-columns", factory::<SetColumns>)
        .register("rename", factory::<RenameColumn>)
        .register("drop", factory::<DropColumns>)
        .register("keep", factory::<KeepColumns>)
        .register("copy", factory::<CopyColumn>)
        .register("swap", factory::<SwapColumns>)
        .register("merge", factory::<MergeColumns>)
        .register("set-type", factory::<SetType>)
        .register("cleanse-column-names", factory::<CleanseColumnNames>)
        .register("change-column-case", factory::<ChangeColumnCase>)
        .register("columns-replace", factory::<ColumnsReplace>)
        .register("flatten", factory::<Flatten>)
        .register("generate-uuid", factory::<GenerateUuid>);
}

/// `set-column :col exp:{...}`: add or overwrite a column.
#[derive(Default)]
pub struct SetColumn {
    column: String,
    expression: Option<Expression>,
}

impl Directive for SetColumn {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        self.expression = Some(expression_arg(directive, 1)?);
        Ok(())
    }

    fn apply(&self, record: &Record, context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let mut out = record.clone();
        if let Some(expression) = &self.expression {
            out.set(self.column.clone(), expression.evaluate(record, &context.variables)?);
        }
        Ok(Outcome::one(out))
    }
}

/// `set-columns :a,:b,...`: rename columns by position.
#[derive(Default)]
pub struct SetColumns {
    names: Vec<String>,
}

impl Directive for SetColumns {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.names = list_arg(directive, 0)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let mut out = record.clone();
        out.rename_all(|i, name| self.names.get(i).cloned().unwrap_or_else(|| name.to_string()));
        Ok(Outcome::one(out))
    }
}

#[derive(Default)]
pub struct RenameColumn {
    source: String,
    target: String,
}

impl Directive for RenameColumn {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.source = column_arg(directive, 0)?;
        self.target = column_arg(directive, 1)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let mut out = record.clone();
        out.rename(&self.source, &self.target)?;
        Ok(Outcome::one(out))
    }
}

/// Missing columns are ignored.
#[derive(Default)]
pub struct DropColumns {
    columns: Vec<String>,
}

impl Directive for DropColumns {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.columns = list_arg(directive, 0)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let mut out = record.clone();
        for column in &self.columns {
            out.remove(column);
        }
        Ok(Outcome::one(out))
    }
}

#[derive(Default)]
pub struct KeepColumns {
    columns: Vec<String>,
}

impl Directive for KeepColumns {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.columns = list_arg(directive, 0)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let mut out = record.clone();
        out.keep(&self.columns);
        Ok(Outcome::one(out))
    }
}

/// `copy :source :target [force]`; without `force` the target must not exist.
#[derive(Default)]
pub struct CopyColumn {
    source: String,
    target: String,
    force: bool,
}

impl Directive for CopyColumn {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.source = column_arg(directive, 0)?;
        self.target = column_arg(directive, 1)?;
        self.force = match directive.raw(2) {
            None => false,
            Some(flag) => parse_flag(directive, flag)?,
        };
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let value = record.require(&self.source)?.clone();
        if !self.force && record.contains(&self.target) {
            return Err(EvaluationError::ColumnExists(self.target.clone()));
        }
        let mut out = record.clone();
        out.set(self.target.clone(), value);
        Ok(Outcome::one(out))
    }
}

pub(crate) fn parse_flag(directive: &ParsedDirective, flag: &str) -> DirectiveResult<bool> {
    match flag.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(DirectiveError::invalid(
            &directive.canonical,
            format!("expected true or false, found '{flag}'"),
        )),
    }
}

#[derive(Default)]
pub struct SwapColumns {
    first: String,
    second: String,
}

impl Directive for SwapColumns {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.first = column_arg(directive, 0)?;
        self.second = column_arg(directive, 1)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let a = record.require(&self.first)?.clone();
        let b = record.require(&self.second)?.clone();
        let mut out = record.clone();
        out.set(self.first.clone(), b);
        out.set(self.second.clone(), a);
        Ok(Outcome::one(out))
    }
}

/// `merge :a :b :target 'sep'`: join two values into a new column.
#[derive(Default)]
pub struct MergeColumns {
    first: String,
    second: String,
    target: String,
    separator: String,
}

impl Directive for MergeColumns {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.first = column_arg(directive, 0)?;
        self.second = column_arg(directive, 1)?;
        self.target = column_arg(directive, 2)?;
        self.separator = text_arg(directive, 3)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let a = display_value(record.require(&self.first)?);
        let b = display_value(record.require(&self.second)?);
        let mut out = record.clone();
        out.set(self.target.clone(), Value::String(format!("{a}{}{b}", self.separator)));
        Ok(Outcome::one(out))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum TargetType {
    #[default]
    Text,
    Integer,
    Float,
    Boolean,
}

/// `set-type :col int|long|float|double|boolean|string`.
#[derive(Default)]
pub struct SetType {
    column: String,
    target: TargetType,
}

impl Directive for SetType {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        let name = raw_arg(directive, 1)?;
        self.target = match name.to_ascii_lowercase().as_str() {
            "int" | "integer" | "long" | "short" => TargetType::Integer,
            "float" | "double" | "decimal" => TargetType::Float,
            "bool" | "boolean" => TargetType::Boolean,
            "string" | "text" => TargetType::Text,
            _ => return Err(DirectiveError::invalid(&directive.canonical, format!("unknown type '{name}'"))),
        };
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let value = record.require(&self.column)?;
        if value.is_null() {
            return Ok(Outcome::one(record.clone()));
        }
        let converted = match self.target {
            TargetType::Text => Value::String(display_value(value)),
            TargetType::Integer => {
                let n = numeric_value(value)
                    .filter(|n| n.fract() == 0.0)
                    .ok_or_else(|| invalid(&self.column, format!("'{}' is not an integer", display_value(value))))?;
                number_value(n)
            }
            TargetType::Float => {
                let n = numeric_value(value)
                    .ok_or_else(|| invalid(&self.column, format!("'{}' is not a number", display_value(value))))?;
                serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
            }
            TargetType::Boolean => match display_value(value).trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "y" => Value::Bool(true),
                "false" | "0" | "no" | "n" => Value::Bool(false),
                other => return Err(invalid(&self.column, format!("'{other}' is not a boolean"))),
            },
        };
        let mut out = record.clone();
        out.set(self.column.clone(), converted);
        Ok(Outcome::one(out))
    }
}

/// Lowercase names, anything outside `[a-z0-9_]` becomes `_`.
#[derive(Default)]
pub struct CleanseColumnNames;

pub(crate) fn cleanse(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl Directive for CleanseColumnNames {
    fn initialize(&mut self, _directive: &ParsedDirective) -> DirectiveResult<()> {
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let mut out = record.clone();
        out.rename_all(|_, name| cleanse(name));
        Ok(Outcome::one(out))
    }
}

/// `change-column-case upper|lower`.
#[derive(Default)]
pub struct ChangeColumnCase {
    upper: bool,
}

impl Directive for ChangeColumnCase {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        let case = raw_arg(directive, 0)?;
        self.upper = match case.to_ascii_lowercase().as_str() {
            "upper" | "uppercase" => true,
            "lower" | "lowercase" => false,
            _ => return Err(DirectiveError::invalid(&directive.canonical, format!("unknown case '{case}'"))),
        };
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let mut out = record.clone();
        if self.upper {
            out.rename_all(|_, name| name.to_uppercase());
        } else {
            out.rename_all(|_, name| name.to_lowercase());
        }
        Ok(Outcome::one(out))
    }
}

/// `columns-replace 's/from/to/g'` over column names.
#[derive(Default)]
pub struct ColumnsReplace {
    sed: Option<SedExpression>,
}

impl Directive for ColumnsReplace {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        let text = text_arg(directive, 0)?;
        self.sed = Some(SedExpression::parse(&text).map_err(|e| DirectiveError::invalid(&directive.canonical, e))?);
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let mut out = record.clone();
        if let Some(sed) = &self.sed {
            out.rename_all(|_, name| sed.apply(name));
        }
        Ok(Outcome::one(out))
    }
}

/// `flatten :a,:b`: one record per array element; shorter arrays and
/// scalars yield null / repeat.
#[derive(Default)]
pub struct Flatten {
    columns: Vec<String>,
}

impl Directive for Flatten {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.columns = list_arg(directive, 0)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let width = self
            .columns
            .iter()
            .filter_map(|c| record.get(c).and_then(Value::as_array).map(Vec::len))
            .max();
        let Some(width) = width else {
            return Ok(Outcome::one(record.clone()));
        };

        let records = (0..width)
            .map(|i| {
                let mut out = record.clone();
                for column in &self.columns {
                    if let Some(Value::Array(items)) = record.get(column) {
                        out.set(column.clone(), items.get(i).cloned().unwrap_or(Value::Null));
                    }
                }
                out
            })
            .collect();
        Ok(Outcome::Emit(records))
    }
}

#[derive(Default)]
pub struct GenerateUuid {
    column: String,
}

impl Directive for GenerateUuid {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.column = column_arg(directive, 0)?;
        Ok(())
    }

    fn apply(&self, record: &Record, _context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let mut out = record.clone();
        out.set(self.column.clone(), Value::String(uuid::Uuid::new_v4().to_string()));
        Ok(Outcome::one(out))
    }
}

/// Compile a regex argument, reporting errors against the directive.
pub(crate) fn regex_arg(directive: &ParsedDirective, pattern: &str) -> DirectiveResult<Regex> {
    Regex::new(pattern).map_err(|e| DirectiveError::invalid(&directive.canonical, e.to_string()))
}
