//! Run-scoped variables. Records pass through unchanged; both directives
//! force their step to run sequentially.

use serde_json::Value;

use crate::error::{DirectiveResult, EvalResult, EvaluationError};
use crate::grammar::ParsedDirective;
use crate::models::{number_value, numeric_value, Record};
use crate::transform::context::ExecutionContext;
use crate::transform::directive::{
    expression_arg, factory, number_arg, raw_arg, Directive, DirectiveRegistry, Outcome,
};
use crate::transform::expression::Expression;

pub fn register(registry: &mut DirectiveRegistry) {
    registry
        .register("set-variable", factory::<SetVariable>)
        .register("increment-variable", factory::<IncrementVariable>);
}

/// `set-variable <name> exp:{...}`: the variable holds the value computed
/// for the most recent record.
#[derive(Default)]
pub struct SetVariable {
    name: String,
    expression: Option<Expression>,
}

impl Directive for SetVariable {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.name = raw_arg(directive, 0)?;
        self.expression = Some(expression_arg(directive, 1)?);
        Ok(())
    }

    fn apply(&self, record: &Record, context: &mut ExecutionContext) -> EvalResult<Outcome> {
        if let Some(expression) = &self.expression {
            let value = expression.evaluate(record, &context.variables)?;
            context.variables.set(self.name.clone(), value);
        }
        Ok(Outcome::one(record.clone()))
    }

    fn is_stateless(&self) -> bool {
        false
    }
}

/// `increment-variable <name> <value> exp:{...}`: adds `value` whenever the
/// condition holds. Unset variables start at 0.
#[derive(Default)]
pub struct IncrementVariable {
    name: String,
    step: f64,
    condition: Option<Expression>,
}

impl Directive for IncrementVariable {
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()> {
        self.name = raw_arg(directive, 0)?;
        self.step = number_arg(directive, 1)?.value;
        self.condition = Some(expression_arg(directive, 2)?);
        Ok(())
    }

    fn apply(&self, record: &Record, context: &mut ExecutionContext) -> EvalResult<Outcome> {
        let Some(condition) = &self.condition else {
            return Ok(Outcome::one(record.clone()));
        };
        if condition.evaluate_condition(record, &context.variables)? {
            let current = match context.variables.get(&self.name) {
                None | Some(Value::Null) => 0.0,
                Some(value) => numeric_value(value).ok_or_else(|| {
                    EvaluationError::Type(format!("variable '{}' is not a number: {value}", self.name))
                })?,
            };
            context.variables.set(self.name.clone(), number_value(current + self.step));
        }
        Ok(Outcome::one(record.clone()))
    }

    fn is_stateless(&self) -> bool {
        false
    }
}
