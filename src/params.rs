//! Named query parameters.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Parameters supplied with a query, keyed by placeholder name without its
/// `:`, `@` or `$` prefix. Values are always bound as text.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params {
    values: BTreeMap<String, String>,
}

impl Params {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Builds one bind argument per entry, in key order.
    pub fn named_args(&self) -> Vec<NamedArg> {
        self.values
            .iter()
            .map(|(name, value)| NamedArg::new(name.clone(), value.clone()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<HashMap<String, String>> for Params {
    fn from(values: HashMap<String, String>) -> Self {
        values.into_iter().collect()
    }
}

impl From<BTreeMap<String, String>> for Params {
    fn from(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }
}

/// A single text argument bound to the statement parameter of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedArg {
    pub name: String,
    pub value: String,
}

impl NamedArg {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}
