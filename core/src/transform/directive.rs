//! Directive contract and the registry of implementations.
//!
//! The grammar only knows signatures; executable behaviour lives behind the
//! [`Directive`] trait. A [`DirectiveRegistry`] maps canonical directive
//! names to factories producing fresh, uninitialized instances.

use std::collections::BTreeMap;

use super::context::ExecutionContext;
use super::expression::Expression;
use crate::error::{DirectiveError, DirectiveResult, EvalResult};
use crate::grammar::{Numeric, ParsedDirective};
use crate::models::Record;

/// Result of applying a directive to one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Zero, one or many records continue down the pipeline.
    Emit(Vec<Record>),
    /// The input record goes to the error stream; the run continues.
    Divert(String),
    /// The input record goes to the error stream and the run fails once the
    /// current step has seen every record.
    Fail(String),
}

impl Outcome {
    pub fn one(record: Record) -> Self {
        Outcome::Emit(vec![record])
    }

    /// Drop the record.
    pub fn none() -> Self {
        Outcome::Emit(Vec::new())
    }
}

/// An executable directive.
///
/// Lifecycle: a fresh instance is created per pipeline, `initialize`d once
/// with its parsed arguments, `apply`d to each record in order, and
/// `finalize`d when the run ends.
pub trait Directive: Send + Sync {
    /// Validate arguments and prepare internal state.
    fn initialize(&mut self, directive: &ParsedDirective) -> DirectiveResult<()>;

    fn apply(&self, record: &Record, context: &mut ExecutionContext) -> EvalResult<Outcome>;

    fn finalize(&mut self) {}

    /// `false` for directives that read or write run-scoped state while
    /// visiting records; those steps always run sequentially.
    fn is_stateless(&self) -> bool {
        true
    }
}

/// Creates an uninitialized directive instance.
pub type DirectiveFactory = fn() -> Box<dyn Directive>;

/// Factory for any `Default` directive.
pub fn factory<D: Directive + Default + 'static>() -> Box<dyn Directive> {
    Box::<D>::default()
}

/// Canonical directive name → implementation factory.
#[derive(Clone, Default)]
pub struct DirectiveRegistry {
    factories: BTreeMap<String, DirectiveFactory>,
}

impl DirectiveRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in directive.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::operations::register_builtins(&mut registry);
        registry
    }

    /// Register (or replace) the implementation of a directive.
    pub fn register(&mut self, name: impl Into<String>, factory: DirectiveFactory) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiate and initialize the implementation for a parsed directive,
    /// dispatching on its canonical name.
    pub fn create(&self, directive: &ParsedDirective) -> DirectiveResult<Box<dyn Directive>> {
        let factory = self
            .factories
            .get(&directive.canonical)
            .ok_or_else(|| DirectiveError::Unsupported {
                directive: directive.canonical.clone(),
            })?;
        let mut instance = factory();
        instance.initialize(directive)?;
        Ok(instance)
    }
}

impl std::fmt::Debug for DirectiveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

// =============================================================================
// Argument access for implementations
// =============================================================================

fn missing(directive: &ParsedDirective, index: usize, kind: &str) -> DirectiveError {
    DirectiveError::invalid(
        &directive.canonical,
        format!("argument {} must be a {kind}", index + 1),
    )
}

pub fn column_arg(directive: &ParsedDirective, index: usize) -> DirectiveResult<String> {
    directive
        .column(index)
        .map(str::to_string)
        .ok_or_else(|| missing(directive, index, "column"))
}

pub fn text_arg(directive: &ParsedDirective, index: usize) -> DirectiveResult<String> {
    directive
        .text(index)
        .map(str::to_string)
        .ok_or_else(|| missing(directive, index, "string"))
}

pub fn number_arg(directive: &ParsedDirective, index: usize) -> DirectiveResult<Numeric> {
    directive
        .number(index)
        .cloned()
        .ok_or_else(|| missing(directive, index, "number"))
}

pub fn list_arg(directive: &ParsedDirective, index: usize) -> DirectiveResult<Vec<String>> {
    directive
        .list(index)
        .map(<[String]>::to_vec)
        .ok_or_else(|| missing(directive, index, "list"))
}

pub fn raw_arg(directive: &ParsedDirective, index: usize) -> DirectiveResult<String> {
    directive
        .raw(index)
        .map(str::to_string)
        .ok_or_else(|| missing(directive, index, "token"))
}

/// Compile the expression argument at `index`.
pub fn expression_arg(directive: &ParsedDirective, index: usize) -> DirectiveResult<Expression> {
    let source = directive
        .expression(index)
        .ok_or_else(|| missing(directive, index, "expression"))?;
    Expression::compile(source).map_err(|e| DirectiveError::invalid(&directive.canonical, e.to_string()))
}

/// Non-negative integer argument.
pub fn count_arg(directive: &ParsedDirective, index: usize) -> DirectiveResult<usize> {
    let n = number_arg(directive, index)?;
    n.as_i64()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| DirectiveError::invalid(&directive.canonical, format!("'{}' is not a count", n.text)))
}
