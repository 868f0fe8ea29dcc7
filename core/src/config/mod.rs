//! Directive configuration: exclusions and aliases.
//!
//! Read-only input to the parser. Serialized as
//!
//! ```json
//! {
//!   "exclusions": ["parse-as-csv", "invoke-http"],
//!   "aliases": { "json-parser": "parse-as-json" }
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::error::ConfigResult;

/// Excluded directive names and alias → canonical name mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveConfig {
    /// Directives rejected before signature lookup
    #[serde(default, deserialize_with = "null_as_default")]
    pub exclusions: BTreeSet<String>,

    /// Alias name → canonical directive name
    #[serde(default, deserialize_with = "null_as_default")]
    pub aliases: BTreeMap<String, String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl DirectiveConfig {
    /// Empty configuration: nothing excluded, no aliases
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exclusion(mut self, directive: impl Into<String>) -> Self {
        self.exclusions.insert(directive.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>, directive: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), directive.into());
        self
    }

    /// Parse a configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Ok(Self::from_json(&content)?)
    }

    /// Serialize to a pretty JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn is_excluded(&self, directive: &str) -> bool {
        self.exclusions.contains(directive)
    }

    pub fn has_alias(&self, directive: &str) -> bool {
        self.aliases.contains_key(directive)
    }

    /// Target of an alias, if `directive` is one
    pub fn alias_target(&self, directive: &str) -> Option<&str> {
        self.aliases.get(directive).map(String::as_str)
    }

    /// Dereference an alias, or return the name unchanged
    pub fn resolve<'a>(&'a self, directive: &'a str) -> &'a str {
        self.alias_target(directive).unwrap_or(directive)
    }

    /// Canonical name → aliases pointing at it, for help output
    pub fn reverse_aliases(&self) -> BTreeMap<String, Vec<String>> {
        let mut reverse: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (alias, target) in &self.aliases {
            reverse.entry(target.clone()).or_default().push(alias.clone());
        }
        reverse
    }
}
