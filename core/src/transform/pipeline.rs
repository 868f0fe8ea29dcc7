//! Pipeline executor.
//!
//! Applies a recipe to a record sequence one directive at a time: every
//! record passes through step N before any record reaches step N + 1.
//! Records are visited in input order and outputs keep that order, so runs
//! are deterministic.
//!
//! ```rust,ignore
//! use wrangler::{execute_text, DirectiveConfig, Record};
//!
//! let result = execute_text("send-to-error exp:{Fare < 8.06};", records, &DirectiveConfig::default())?;
//! println!("{}", result.summary());
//! ```

use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::context::{ExecutionContext, Variables};
use super::directive::{Directive, DirectiveRegistry, Outcome};
use crate::config::DirectiveConfig;
use crate::error::{ExecutionError, FatalDirectiveError};
use crate::grammar::{Recipe, RecipeParser};
use crate::models::Record;

/// Executor behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Run stateless steps over record partitions in parallel.
    pub parallel: bool,
    /// Records per partition when running in parallel.
    pub partition_size: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            partition_size: 1024,
        }
    }
}

/// Cooperative cancellation, checked between steps.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A record removed from the main stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub record: Record,
    /// Zero-based recipe step that diverted the record.
    pub directive_index: usize,
    pub directive: String,
    /// Position of the record in that step's input.
    pub row: usize,
    pub reason: String,
}

/// Per-step counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub directive: String,
    /// Recipe line the directive came from.
    pub line: usize,
    pub input: usize,
    pub output: usize,
    pub diverted: usize,
    pub parallel: bool,
    pub elapsed_ms: u128,
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionResult {
    pub records: Vec<Record>,
    pub errors: Vec<ErrorRecord>,
    /// Set when a `fail` directive matched; the run stopped after that step.
    pub fatal: Option<FatalDirectiveError>,
    /// Set when the run was cancelled between steps.
    pub cancelled: bool,
    pub steps: Vec<StepReport>,
    /// Run variables as they stood at the end of the run.
    pub variables: Variables,
}

impl ExecutionResult {
    /// Completed every step without a fatal directive.
    pub fn is_ok(&self) -> bool {
        self.fatal.is_none() && !self.cancelled
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Executed {} step(s): {} records, {} errors",
            self.steps.len(),
            self.records.len(),
            self.errors.len()
        );
        if self.cancelled {
            summary.push_str(", cancelled");
        }
        if let Some(fatal) = &self.fatal {
            summary.push_str(&format!(", failed at '{}'", fatal.directive));
        }
        summary
    }
}

struct Stage {
    name: String,
    line: usize,
    directive: Box<dyn Directive>,
}

/// What one input record turned into.
enum RowResult {
    Emit(Vec<Record>),
    Divert(Record, String),
    Fail(Record, String),
}

/// An initialized recipe, ready to run once.
pub struct Pipeline {
    stages: Vec<Stage>,
    options: ExecutorOptions,
}

impl Pipeline {
    /// Instantiate and initialize every directive of the recipe, failing on
    /// the first one that is unsupported or rejects its arguments.
    pub fn new(recipe: &Recipe, registry: &DirectiveRegistry) -> Result<Self, ExecutionError> {
        let stages = recipe
            .steps
            .iter()
            .map(|step| {
                let directive = registry.create(&step.directive)?;
                Ok(Stage {
                    name: step.directive.name.clone(),
                    line: step.line,
                    directive,
                })
            })
            .collect::<Result<Vec<_>, ExecutionError>>()?;

        tracing::debug!(steps = stages.len(), "pipeline initialized");
        Ok(Self {
            stages,
            options: ExecutorOptions::default(),
        })
    }

    /// Parse recipe text and build a pipeline from it.
    pub fn from_text(
        text: &str,
        config: &DirectiveConfig,
        registry: &DirectiveRegistry,
    ) -> Result<Self, ExecutionError> {
        let recipe = RecipeParser::new(config).parse(text)?;
        Self::new(&recipe, registry)
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn execute(self, records: Vec<Record>) -> ExecutionResult {
        self.execute_with(records, &CancellationToken::new())
    }

    /// Run the recipe. Cancellation is honoured between steps and returns
    /// the records and errors accumulated so far.
    pub fn execute_with(mut self, records: Vec<Record>, token: &CancellationToken) -> ExecutionResult {
        let mut context = ExecutionContext::new();
        let mut result = ExecutionResult::default();
        let mut records = records;

        for (index, stage) in self.stages.iter().enumerate() {
            if token.is_cancelled() {
                tracing::info!(step = index, "run cancelled");
                result.cancelled = true;
                break;
            }

            let started = Instant::now();
            context.enter_step(index);
            let input = records.len();
            let parallel = self.options.parallel
                && stage.directive.is_stateless()
                && input > self.options.partition_size;

            let rows = if parallel {
                apply_partitioned(stage, &records, &context, self.options.partition_size)
            } else {
                apply_sequential(stage, &records, &mut context)
            };

            let mut output = Vec::with_capacity(input);
            let mut diverted = 0;
            let mut failed: Vec<String> = Vec::new();
            for (row, outcome) in rows.into_iter().enumerate() {
                let (record, reason) = match outcome {
                    RowResult::Emit(emitted) => {
                        output.extend(emitted);
                        continue;
                    }
                    RowResult::Divert(record, reason) => (record, reason),
                    RowResult::Fail(record, reason) => {
                        failed.push(reason.clone());
                        (record, reason)
                    }
                };
                diverted += 1;
                result.errors.push(ErrorRecord {
                    record,
                    directive_index: index,
                    directive: stage.name.clone(),
                    row,
                    reason,
                });
            }

            if diverted > 0 {
                tracing::warn!(step = index, directive = %stage.name, diverted, "records diverted");
            }
            tracing::debug!(step = index, directive = %stage.name, input, output = output.len(), "step applied");

            result.steps.push(StepReport {
                index,
                directive: stage.name.clone(),
                line: stage.line,
                input,
                output: output.len(),
                diverted,
                parallel,
                elapsed_ms: started.elapsed().as_millis(),
            });
            records = output;

            if let Some(reason) = failed.first() {
                result.fatal = Some(FatalDirectiveError {
                    directive: stage.name.clone(),
                    index,
                    reason: reason.clone(),
                    matched: failed.len(),
                });
                tracing::warn!(step = index, directive = %stage.name, "run failed");
                break;
            }
        }

        for stage in &mut self.stages {
            stage.directive.finalize();
        }

        result.records = records;
        result.variables = context.variables;
        tracing::info!("{}", result.summary());
        result
    }
}

fn apply_one(stage: &Stage, record: &Record, context: &mut ExecutionContext) -> RowResult {
    match stage.directive.apply(record, context) {
        Ok(Outcome::Emit(records)) => RowResult::Emit(records),
        Ok(Outcome::Divert(reason)) => RowResult::Divert(record.clone(), reason),
        Ok(Outcome::Fail(reason)) => RowResult::Fail(record.clone(), reason),
        Err(error) => RowResult::Divert(record.clone(), error.to_string()),
    }
}

fn apply_sequential(stage: &Stage, records: &[Record], context: &mut ExecutionContext) -> Vec<RowResult> {
    records
        .iter()
        .map(|record| apply_one(stage, record, context))
        .collect()
}

/// Partitions run on the rayon pool, each with its own copy of the context;
/// results are concatenated back in input order.
fn apply_partitioned(
    stage: &Stage,
    records: &[Record],
    context: &ExecutionContext,
    partition_size: usize,
) -> Vec<RowResult> {
    records
        .par_chunks(partition_size.max(1))
        .map(|partition| {
            let mut local = context.clone();
            partition
                .iter()
                .map(|record| apply_one(stage, record, &mut local))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

// =============================================================================
// Entry points
// =============================================================================

/// Run a parsed recipe with the built-in directives.
pub fn execute(recipe: &Recipe, records: Vec<Record>) -> Result<ExecutionResult, ExecutionError> {
    let pipeline = Pipeline::new(recipe, &DirectiveRegistry::with_builtins())?;
    Ok(pipeline.execute(records))
}

/// Parse recipe text and run it with the built-in directives.
pub fn execute_text(
    text: &str,
    records: Vec<Record>,
    config: &DirectiveConfig,
) -> Result<ExecutionResult, ExecutionError> {
    let pipeline = Pipeline::from_text(text, config, &DirectiveRegistry::with_builtins())?;
    Ok(pipeline.execute(records))
}
