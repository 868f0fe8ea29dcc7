//! Directive execution.
//!
//! - Expression: compiled `exp:{...}` conditions and computations
//! - Directive: the implementation contract and the registry of built-ins
//! - Operations: built-in directive implementations
//! - Pipeline: applies a parsed recipe to a record sequence

pub mod context;
pub mod directive;
pub mod expression;
pub mod operations;
pub mod pipeline;

pub use context::{ExecutionContext, Variables};
pub use directive::{factory, Directive, DirectiveFactory, DirectiveRegistry, Outcome};
pub use expression::Expression;
pub use pipeline::*;
