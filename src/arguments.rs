//! The parsed result.

use std::fmt;
use std::ops::{Deref, DerefMut, Index};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key -> value mapping produced by a parse, in insertion order.
///
/// `_` always holds the leftover positionals and `--` the tokens after the
/// option terminator, when one was given. A key that was never set is absent;
/// indexing it yields `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(Map<String, Value>);

static NULL: Value = Value::Null;

impl Arguments {
    pub fn new() -> Self {
        let mut map = Map::new();
        map.insert("_".to_string(), Value::Array(Vec::new()));
        Arguments(map)
    }

    /// Leftover positionals.
    pub fn positionals(&self) -> &[Value] {
        self.0
            .get("_")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn set_positionals(&mut self, values: Vec<Value>) {
        self.0.insert("_".to_string(), Value::Array(values));
    }

    /// Tokens after `--`, if any.
    pub fn rest(&self) -> Option<&[Value]> {
        self.0.get("--").and_then(Value::as_array).map(Vec::as_slice)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    /// Shallow merge: every key of `other` replaces the one here.
    pub fn merge(&mut self, other: Arguments) {
        for (key, value) in other.0 {
            self.0.insert(key, value);
        }
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl Deref for Arguments {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Arguments {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Index<&str> for Arguments {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        self.0.get(key).unwrap_or(&NULL)
    }
}

impl From<Map<String, Value>> for Arguments {
    fn from(map: Map<String, Value>) -> Self {
        Arguments(map)
    }
}

impl fmt::Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(text) => f.write_str(&text),
            Err(_) => Err(fmt::Error),
        }
    }
}
