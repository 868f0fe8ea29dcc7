//! Record model for the directive pipeline.
//!
//! - [`Record`] - ordered `(column, value)` pairs with unique column names
//! - [`display_value`] / [`is_empty_value`] - value helpers shared by directives
//!
//! Values are `serde_json::Value`, so a record serializes as a JSON object
//! with its columns in order.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{EvalResult, EvaluationError};

// =============================================================================
// Record
// =============================================================================

/// One row with a dynamic schema.
///
/// Column order is significant and names are unique. Lookups by name go
/// through an index that is rebuilt whenever columns are added, removed or
/// reordered.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from pairs; a repeated column keeps its first position
    /// and its last value.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut record = Self::new();
        for (name, value) in pairs {
            record.set(name, value);
        }
        record
    }

    /// Build a record from a JSON object; `None` for any other value.
    pub fn from_json_object(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self::from_pairs(map)),
            _ => None,
        }
    }

    /// Convert to a JSON object, columns in order.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self.fields.iter().cloned().collect();
        Value::Object(map)
    }

    fn reindex(&mut self) {
        self.index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.index.contains_key(column)
    }

    /// Position of a column.
    pub fn position(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.position(column).map(|i| &self.fields[i].1)
    }

    pub fn get_mut(&mut self, column: &str) -> Option<&mut Value> {
        let i = self.position(column)?;
        Some(&mut self.fields[i].1)
    }

    /// Column and value at a position.
    pub fn get_at(&self, position: usize) -> Option<(&str, &Value)> {
        self.fields.get(position).map(|(n, v)| (n.as_str(), v))
    }

    /// Value of a column, or [`EvaluationError::MissingColumn`].
    pub fn require(&self, column: &str) -> EvalResult<&Value> {
        self.get(column)
            .ok_or_else(|| EvaluationError::MissingColumn(column.to_string()))
    }

    /// Replace the value in place, or append a new column.
    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        match self.position(&column) {
            Some(i) => self.fields[i].1 = value,
            None => {
                self.index.insert(column.clone(), self.fields.len());
                self.fields.push((column, value));
            }
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let i = self.position(column)?;
        let (_, value) = self.fields.remove(i);
        self.reindex();
        Some(value)
    }

    /// Rename a column in place.
    pub fn rename(&mut self, from: &str, to: &str) -> EvalResult<()> {
        if from == to {
            return self.require(from).map(|_| ());
        }
        if self.contains(to) {
            return Err(EvaluationError::ColumnExists(to.to_string()));
        }
        let i = self
            .position(from)
            .ok_or_else(|| EvaluationError::MissingColumn(from.to_string()))?;
        self.fields[i].0 = to.to_string();
        self.index.remove(from);
        self.index.insert(to.to_string(), i);
        Ok(())
    }

    /// Keep only the listed columns, preserving record order.
    pub fn keep(&mut self, columns: &[String]) {
        self.fields.retain(|(name, _)| columns.contains(name));
        self.reindex();
    }

    /// Rewrite every column name; later duplicates are dropped.
    pub fn rename_all<F>(&mut self, mut rename: F)
    where
        F: FnMut(usize, &str) -> String,
    {
        let fields = std::mem::take(&mut self.fields);
        self.index.clear();
        for (i, (name, value)) in fields.into_iter().enumerate() {
            let renamed = rename(i, &name);
            if !self.contains(&renamed) {
                self.set(renamed, value);
            }
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, v)| v)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self::from_pairs(map))
    }
}

// =============================================================================
// Value helpers
// =============================================================================

/// Text form of a value: strings unquoted, null empty, everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Null, empty string, empty array or empty object.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Numeric reading of a value; numeric strings count.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// JSON number for an `f64`, integral values as integers.
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Record {
        Record::from_pairs([("a", json!(1)), ("b", json!("x")), ("c", json!(null))])
    }

    #[test]
    fn test_order_and_lookup() {
        let record = sample();
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(record.get("b"), Some(&json!("x")));
        assert_eq!(record.get_at(0), Some(("a", &json!(1))));
        assert!(record.get("z").is_none());
        assert_eq!(record.require("z"), Err(EvaluationError::MissingColumn("z".into())));
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut record = sample();
        record.set("a", json!(2));
        record.set("d", json!(true));
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["a", "b", "c", "d"]);
        assert_eq!(record.get("a"), Some(&json!(2)));
    }

    #[test]
    fn test_structural_changes_keep_index_consistent() {
        let mut record = sample();
        record.set("z", json!("new"));
        assert_eq!(record.position("z"), Some(3));
        assert_eq!(record.remove("a"), Some(json!(1)));
        assert_eq!(record.position("z"), Some(2));
        assert_eq!(record.get("c"), Some(&json!(null)));

        record.keep(&["z".to_string(), "c".to_string()]);
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["c", "z"]);
        assert_eq!(record.position("z"), Some(1));

        *record.get_mut("c").unwrap() = json!("filled");
        assert_eq!(record.get("c"), Some(&json!("filled")));
    }

    #[test]
    fn test_rename() {
        let mut record = sample();
        record.rename("a", "alpha").unwrap();
        assert_eq!(record.get_at(0), Some(("alpha", &json!(1))));
        assert!(!record.contains("a"));

        assert_eq!(record.rename("b", "c"), Err(EvaluationError::ColumnExists("c".into())));
        assert_eq!(record.rename("q", "r"), Err(EvaluationError::MissingColumn("q".into())));
    }

    #[test]
    fn test_rename_all_drops_collisions() {
        let mut record = Record::from_pairs([("A", json!(1)), ("a", json!(2)), ("B", json!(3))]);
        record.rename_all(|_, name| name.to_lowercase());
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(record.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_serde_keeps_column_order() {
        let record = Record::from_pairs([("z", json!(1)), ("a", json!(2))]);
        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"z":1,"a":2}"#);

        let back: Record = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
        assert_eq!(Record::from_json_object(record.to_json()), Some(record));
        assert!(Record::from_json_object(json!([1, 2])).is_none());
    }

    #[test]
    fn test_value_helpers() {
        assert_eq!(display_value(&json!("abc")), "abc");
        assert_eq!(display_value(&json!(null)), "");
        assert_eq!(display_value(&json!(1.5)), "1.5");
        assert!(is_empty_value(&json!("")));
        assert!(!is_empty_value(&json!(0)));
        assert_eq!(numeric_value(&json!(" 8.05 ")), Some(8.05));
        assert_eq!(numeric_value(&json!("abc")), None);
        assert_eq!(number_value(3.0), json!(3));
        assert_eq!(number_value(0.5), json!(0.5));
    }
}
