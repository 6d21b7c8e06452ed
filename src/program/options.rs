//! Declared options of one program level.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::parser::{ArrayOption, CoerceFn, ParserConfiguration, ParserOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Boolean,
    Count,
    Number,
    String,
    Array,
}

/// `true`/`false` or a custom message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Switch {
    Flag(bool),
    Message(String),
}

impl Switch {
    pub fn is_on(&self) -> bool {
        match self {
            Switch::Flag(on) => *on,
            Switch::Message(_) => true,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Switch::Message(m) => Some(m),
            Switch::Flag(_) => None,
        }
    }
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        Switch::Flag(on)
    }
}

impl From<&str> for Switch {
    fn from(message: &str) -> Self {
        Switch::Message(message.to_string())
    }
}

/// Everything `Program::option` understands about one key.
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptionDefinition {
    #[serde(rename = "type")]
    pub value_type: Option<OptionType>,
    pub aliases: Vec<String>,
    pub default: Option<Value>,
    pub required: Option<Switch>,
    pub choices: Vec<Value>,
    pub conflicts: Vec<String>,
    pub implies: Vec<String>,
    #[serde(skip)]
    pub coerce: Option<CoerceFn>,
    pub normalize: bool,
    pub array: bool,
    #[serde(alias = "describe", alias = "description")]
    pub desc: Option<String>,
    pub hidden: bool,
    pub deprecated: Option<Switch>,
    pub global: Option<bool>,
    pub skip_validation: bool,
    pub narg: Option<usize>,
}

impl OptionDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, value_type: OptionType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn required(mut self, required: impl Into<Switch>) -> Self {
        self.required = Some(required.into());
        self
    }

    pub fn choices<V: Into<Value>>(mut self, choices: impl IntoIterator<Item = V>) -> Self {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn conflicts(mut self, key: impl Into<String>) -> Self {
        self.conflicts.push(key.into());
        self
    }

    pub fn implies(mut self, key: impl Into<String>) -> Self {
        self.implies.push(key.into());
        self
    }

    pub fn coerce<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + 'static,
    {
        self.coerce = Some(Rc::new(f));
        self
    }

    pub fn normalize(mut self) -> Self {
        self.normalize = true;
        self
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    pub fn describe(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn deprecated(mut self, deprecated: impl Into<Switch>) -> Self {
        self.deprecated = Some(deprecated.into());
        self
    }

    pub fn global(mut self, global: bool) -> Self {
        self.global = Some(global);
        self
    }

    pub fn skip_validation(mut self) -> Self {
        self.skip_validation = true;
        self
    }

    pub fn narg(mut self, n: usize) -> Self {
        self.narg = Some(n);
        self
    }

    /// The subset honored for positionals. Types other than string, number
    /// and boolean are dropped.
    pub(crate) fn positional_subset(self) -> Self {
        OptionDefinition {
            value_type: self.value_type.filter(|t| {
                matches!(t, OptionType::String | OptionType::Number | OptionType::Boolean)
            }),
            aliases: self.aliases,
            default: self.default,
            choices: self.choices,
            conflicts: self.conflicts,
            implies: self.implies,
            coerce: self.coerce,
            normalize: self.normalize,
            desc: self.desc,
            ..Default::default()
        }
    }
}

impl fmt::Debug for OptionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionDefinition")
            .field("type", &self.value_type)
            .field("aliases", &self.aliases)
            .field("default", &self.default)
            .field("required", &self.required)
            .field("choices", &self.choices)
            .field("coerce", &self.coerce.is_some())
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandedCommands {
    pub min: usize,
    pub max: Option<usize>,
    pub min_msg: Option<String>,
    pub max_msg: Option<String>,
}

/// Parser hints plus the declarations validation and help read.
#[derive(Debug, Clone, Default)]
pub struct ProgramOptions {
    pub key: IndexSet<String>,
    pub aliases: IndexMap<String, Vec<String>>,
    pub array: Vec<String>,
    pub boolean: Vec<String>,
    pub string: Vec<String>,
    pub number: Vec<String>,
    pub count: Vec<String>,
    pub normalize: Vec<String>,
    pub narg: IndexMap<String, usize>,
    pub default: IndexMap<String, Value>,
    pub config_objects: Vec<Map<String, Value>>,
    pub choices: IndexMap<String, Vec<Value>>,
    pub demanded_options: IndexMap<String, Option<String>>,
    pub demanded_commands: Option<DemandedCommands>,
    pub deprecated_options: IndexMap<String, Option<String>>,
    pub implies: IndexMap<String, Vec<String>>,
    pub conflicts: IndexMap<String, Vec<String>>,
    pub skip_validation: Vec<String>,
    pub hidden: Vec<String>,
    pub descriptions: IndexMap<String, String>,
    /// Keys dropped when entering a command. `_` is the demanded-commands slot.
    pub local: Vec<String>,
    pub configuration: ParserConfiguration,
}

impl ProgramOptions {
    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            aliases: self.aliases.clone(),
            array: self.array.iter().map(|k| ArrayOption::from(k.as_str())).collect(),
            boolean: self.boolean.clone(),
            count: self.count.clone(),
            string: self.string.clone(),
            number: self.number.clone(),
            normalize: self.normalize.clone(),
            narg: self.narg.clone(),
            default: self.default.clone(),
            coerce: IndexMap::new(),
            config_objects: self.config_objects.clone(),
            key: self.key.clone(),
            configuration: self.configuration,
        }
    }

    /// Copy without the local keys (and the aliases of those keys).
    pub fn without_local(&self, aliases: &IndexMap<String, Vec<String>>) -> Self {
        let mut lookup: HashSet<&str> = HashSet::new();
        for key in &self.local {
            lookup.insert(key);
            for alias in aliases.get(key).into_iter().flatten() {
                lookup.insert(alias);
            }
        }
        let keep = |k: &String| !lookup.contains(k.as_str());
        let list = |v: &Vec<String>| v.iter().filter(|k| keep(k)).cloned().collect::<Vec<_>>();
        fn map<V: Clone>(m: &IndexMap<String, V>, keep: impl Fn(&String) -> bool) -> IndexMap<String, V> {
            m.iter()
                .filter(|(k, _)| keep(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        }

        ProgramOptions {
            key: self.key.iter().filter(|k| keep(k)).cloned().collect(),
            aliases: map(&self.aliases, keep),
            array: list(&self.array),
            boolean: list(&self.boolean),
            string: list(&self.string),
            number: list(&self.number),
            count: list(&self.count),
            normalize: list(&self.normalize),
            narg: map(&self.narg, keep),
            default: map(&self.default, keep),
            config_objects: self.config_objects.clone(),
            choices: map(&self.choices, keep),
            demanded_options: map(&self.demanded_options, keep),
            demanded_commands: if lookup.contains("_") {
                None
            } else {
                self.demanded_commands.clone()
            },
            deprecated_options: map(&self.deprecated_options, keep),
            implies: map(&self.implies, keep),
            conflicts: map(&self.conflicts, keep),
            skip_validation: list(&self.skip_validation),
            hidden: list(&self.hidden),
            descriptions: map(&self.descriptions, keep),
            local: self.local.clone(),
            configuration: self.configuration,
        }
    }

    pub(crate) fn push_unique(list: &mut Vec<String>, key: &str) {
        if !list.iter().any(|k| k == key) {
            list.push(key.to_string());
        }
    }

    pub fn set_global(&mut self, key: &str, global: bool) {
        if global {
            self.local.retain(|k| k != key);
        } else {
            Self::push_unique(&mut self.local, key);
        }
    }

    /// Whether `key` (or its camelCase spelling) has a declared default.
    pub fn is_defaulted(&self, key: &str) -> bool {
        let camel = crate::parser::strings::camel_case(key);
        self.default.contains_key(key) || self.default.contains_key(&camel)
    }

    /// Whether any config object sets `key` (or its camelCase spelling).
    pub fn is_in_configs(&self, key: &str) -> bool {
        let camel = crate::parser::strings::camel_case(key);
        self.config_objects
            .iter()
            .any(|c| c.contains_key(key) || c.contains_key(&camel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn local_keys_and_their_aliases_are_dropped() {
        let mut opts = ProgramOptions::default();
        opts.key.extend(["keep".to_string(), "drop".to_string()]);
        opts.boolean = vec!["keep".into(), "drop".into(), "d".into()];
        opts.default.insert("d".into(), json!(true));
        opts.demanded_commands = Some(DemandedCommands {
            min: 1,
            max: None,
            min_msg: None,
            max_msg: None,
        });
        opts.set_global("drop", false);
        opts.set_global("_", false);

        let aliases = IndexMap::from([("drop".to_string(), vec!["d".to_string()])]);
        let reset = opts.without_local(&aliases);
        assert_eq!(reset.boolean, vec!["keep"]);
        assert!(reset.default.is_empty());
        assert!(reset.key.contains("keep") && !reset.key.contains("drop"));
        assert!(reset.demanded_commands.is_none());
        assert_eq!(reset.local, vec!["drop", "_"]);
    }

    #[test]
    fn global_toggle_round_trip() {
        let mut opts = ProgramOptions::default();
        opts.set_global("x", false);
        opts.set_global("x", false);
        assert_eq!(opts.local, vec!["x"]);
        opts.set_global("x", true);
        assert!(opts.local.is_empty());
    }

    #[test]
    fn definition_from_yaml() {
        let def: OptionDefinition = serde_yaml::from_str(
            "type: number\naliases: [p]\ndefault: 8080\nrequired: \"port please\"\ndescribe: listen port\n",
        )
        .unwrap();
        assert_eq!(def.value_type, Some(OptionType::Number));
        assert_eq!(def.default, Some(json!(8080)));
        assert_eq!(def.required.as_ref().and_then(Switch::message), Some("port please"));
        assert_eq!(def.desc.as_deref(), Some("listen port"));
    }

    #[test]
    fn positional_subset_drops_unsupported_settings() {
        let def = OptionDefinition::new()
            .of_type(OptionType::Count)
            .required(true)
            .hidden()
            .default_value(3)
            .alias("n")
            .positional_subset();
        assert_eq!(def.value_type, None);
        assert!(def.required.is_none());
        assert!(!def.hidden);
        assert_eq!(def.default, Some(json!(3)));
        assert_eq!(def.aliases, vec!["n"]);
    }

    #[test]
    fn defaults_and_configs_match_camel_case() {
        let mut opts = ProgramOptions::default();
        opts.default.insert("dryRun".into(), json!(false));
        let mut config = Map::new();
        config.insert("outDir".into(), json!("dist"));
        opts.config_objects.push(config);
        assert!(opts.is_defaulted("dry-run"));
        assert!(opts.is_in_configs("out-dir"));
        assert!(!opts.is_in_configs("dry-run"));
    }
}
