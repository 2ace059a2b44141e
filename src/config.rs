//! User configuration handed to stage functions and objectives.
//!
//! The recipe's global `config` section is decoded once into a [`UserConfig`].
//! Every stage receives a derived copy with its local overrides deep-merged on
//! top; the global value itself is never mutated.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An immutable key/value configuration mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserConfig(Map<String, Value>);

impl UserConfig {
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    /// Derive the configuration of one stage: `self` with `overrides` merged on top.
    ///
    /// Nested mappings merge key by key; any other value in `overrides`
    /// replaces the value in `self`.
    pub fn derive(&self, overrides: &Map<String, Value>) -> UserConfig {
        let mut merged = self.0.clone();
        merge_maps(&mut merged, overrides);
        UserConfig(merged)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    /// Look up a nested value with a dotted path, e.g. `"sim.events"`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.0.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for UserConfig {
    fn from(values: Map<String, Value>) -> Self {
        Self(values)
    }
}

fn merge_maps(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_maps(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}
