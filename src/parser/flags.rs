//! Per-key type classification.

use std::collections::HashMap;

use indexmap::IndexMap;

use super::aliases::{AliasTable, spellings};

/// Declared value type of a key. When a group carries several declarations
/// the first of `Count`, `Boolean`, `String`, `Number` wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Untyped,
    Boolean,
    Count,
    String,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyTraits {
    pub value_type: ValueType,
    pub array: bool,
    pub normalize: bool,
    pub narg: Option<usize>,
}

impl KeyTraits {
    pub fn is_boolean(&self) -> bool {
        self.value_type == ValueType::Boolean
    }

    pub fn is_count(&self) -> bool {
        self.value_type == ValueType::Count
    }

    pub fn is_boolean_or_count(&self) -> bool {
        self.is_boolean() || self.is_count()
    }

    /// Keys whose raw tokens are never turned into numbers.
    pub fn keeps_text(&self) -> bool {
        matches!(self.value_type, ValueType::String | ValueType::Boolean)
    }
}

/// Declarations as given, keyed by the spelling they were declared under.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    pub booleans: Vec<String>,
    pub counts: Vec<String>,
    pub strings: Vec<String>,
    pub numbers: Vec<String>,
    pub arrays: Vec<String>,
    pub normalize: Vec<String>,
    pub nargs: IndexMap<String, usize>,
}

impl Declarations {
    /// Every spelling that appears in a declaration list, in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.arrays
            .iter()
            .chain(&self.booleans)
            .chain(&self.strings)
            .chain(&self.numbers)
            .chain(&self.counts)
            .chain(&self.normalize)
            .chain(self.nargs.keys())
            .map(String::as_str)
    }
}

/// Traits resolved for every spelling known before token processing.
#[derive(Debug, Clone, Default)]
pub struct Flags {
    decl: Declarations,
    resolved: HashMap<String, KeyTraits>,
}

impl Flags {
    pub fn resolve(decl: Declarations, aliases: &AliasTable) -> Self {
        let mut flags = Flags {
            decl,
            resolved: HashMap::new(),
        };
        let known: Vec<String> = aliases
            .keys()
            .cloned()
            .chain(flags.decl.keys().map(str::to_string))
            .collect();
        for key in known {
            let traits = flags.compute(&key, aliases);
            flags.resolved.insert(key, traits);
        }
        flags
    }

    fn compute(&self, key: &str, aliases: &AliasTable) -> KeyTraits {
        let any = |list: &[String]| spellings(aliases, key).any(|k| list.iter().any(|d| d == k));
        let value_type = if any(&self.decl.counts) {
            ValueType::Count
        } else if any(&self.decl.booleans) {
            ValueType::Boolean
        } else if any(&self.decl.strings) {
            ValueType::String
        } else if any(&self.decl.numbers) {
            ValueType::Number
        } else {
            ValueType::Untyped
        };
        KeyTraits {
            value_type,
            array: any(&self.decl.arrays),
            normalize: any(&self.decl.normalize),
            narg: spellings(aliases, key).find_map(|k| self.decl.nargs.get(k).copied()),
        }
    }

    /// Traits of `key`. Spellings first seen while parsing are untyped.
    pub fn traits(&self, key: &str) -> KeyTraits {
        self.resolved.get(key).copied().unwrap_or_default()
    }

    pub fn is_declared(&self, key: &str) -> bool {
        self.resolved.contains_key(key)
    }

    pub fn counts(&self) -> &[String] {
        &self.decl.counts
    }
}
