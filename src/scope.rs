//! Variable scope for Statecraft.
//!
//! A [`Scope`] is the ordered key/value environment a task is evaluated
//! against. It is produced by inventory resolution and role loading, extended
//! per task (loop `item` binding, `register` results), and consumed by
//! templating and conditional evaluation. Merge semantics are
//! last-write-wins: a later layer overrides an earlier one key by key.
//!
//! A scope is owned by exactly one host run and threaded through sequential
//! task execution; it is never shared across concurrent runs.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The canonical variable value type.
///
/// Variables hold arbitrary YAML-shaped data: strings, numbers, booleans,
/// sequences, and nested mappings.
pub type Value = serde_yaml::Value;

/// An ordered variable environment with last-write-wins merge semantics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope {
    vars: IndexMap<String, Value>,
}

impl Scope {
    /// Create a new empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a scope from a YAML mapping string.
    ///
    /// An empty or null document yields an empty scope.
    pub fn from_yaml(content: &str) -> crate::error::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::new());
        }
        match serde_yaml::from_str::<Value>(content)? {
            Value::Null => Ok(Self::new()),
            value => Ok(Self {
                vars: serde_yaml::from_value(value)?,
            }),
        }
    }

    /// Get a variable by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Set a variable, overwriting any previous value under the same name.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    /// Remove a variable.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.vars.shift_remove(key)
    }

    /// Check whether a variable is defined.
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Merge another scope into this one; `other` wins on key conflicts.
    pub fn merge(&mut self, other: &Scope) {
        for (key, value) in &other.vars {
            self.vars.insert(key.clone(), value.clone());
        }
    }

    /// Return a copy of this scope with `other` merged over it.
    pub fn merged(&self, other: &Scope) -> Scope {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Iterate over variables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    /// Variable names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.vars.keys()
    }

    /// Number of variables in the scope.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// True when the scope holds no variables.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl FromIterator<(String, Value)> for Scope {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Scope {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.vars.iter()
    }
}
