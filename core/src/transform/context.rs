//! Run-scoped state threaded through directive application.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Named run variables, owned by one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Variables {
    values: BTreeMap<String, Value>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// State passed explicitly into every `apply` call of a run.
///
/// Besides the variables, each recipe step may keep one value across the
/// records it visits (the header row of `parse-as-csv`, for instance). That
/// value lives here, not in the directive, so it starts empty on every run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub variables: Variables,
    step: usize,
    step_state: BTreeMap<usize, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `step` (zero-based) the step whose state is read and written.
    pub(crate) fn enter_step(&mut self, step: usize) {
        self.step = step;
    }

    /// Value kept by the current step, if it stored one.
    pub fn step_state(&self) -> Option<&Value> {
        self.step_state.get(&self.step)
    }

    pub fn set_step_state(&mut self, value: Value) {
        self.step_state.insert(self.step, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_state_is_per_step() {
        let mut context = ExecutionContext::new();
        context.enter_step(2);
        context.set_step_state(json!(["a", "b"]));
        assert_eq!(context.step_state(), Some(&json!(["a", "b"])));

        context.enter_step(3);
        assert!(context.step_state().is_none());

        context.enter_step(2);
        assert_eq!(context.step_state(), Some(&json!(["a", "b"])));
    }
}
