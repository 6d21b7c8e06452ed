//! Token-level parsing engine.
//!
//! `Parser::detailed` walks the tokens once, writing every value through the
//! alias table, then layers config objects, defaults and coercions on top:
//!
//! 1. explicit tokens
//! 2. config objects (only keys the tokens did not set)
//! 3. declared defaults (only keys still absent)
//!
//! Setup problems and coercion failures do not abort the parse; they are
//! reported in `DetailedArguments::error` next to a best-effort result.

pub mod aliases;
pub mod coerce;
pub mod flags;
pub mod keys;
pub mod strings;
pub mod tokenize;

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::trace;

use crate::arguments::Arguments;
use crate::error::Error;
use crate::platform::{Platform, StdPlatform};

pub use aliases::AliasTable;
pub use flags::{KeyTraits, ValueType};
pub use keys::Incoming;
pub use tokenize::{ArgsInput, tokenize};

use aliases::{add_new_alias, combine_aliases, extend_aliases, spellings};
use coerce::{maybe_coerce_number, process_value};
use flags::{Declarations, Flags};
use keys::{LeafPolicy, has_key, set_key, split_path};
use strings::camel_case;

static NEGATIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-([0-9]+(\.[0-9]+)?|\.[0-9]+)$").unwrap());
static SHORT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d*)?(e-?\d+)?$").unwrap());

/// User coercion applied after defaults, once per alias group.
pub type CoerceFn = Rc<dyn Fn(Value) -> anyhow::Result<Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfiguration {
    /// Repeating a non-array key collects its values into a list.
    pub duplicate_arguments_array: bool,
    /// Array values given to an array key are concatenated, not nested.
    pub flatten_duplicate_arrays: bool,
}

impl Default for ParserConfiguration {
    fn default() -> Self {
        ParserConfiguration {
            duplicate_arguments_array: true,
            flatten_duplicate_arrays: true,
        }
    }
}

/// An array declaration, optionally with an element type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayOption {
    Plain(String),
    Typed { key: String, value_type: ValueType },
}

impl ArrayOption {
    pub fn key(&self) -> &str {
        match self {
            ArrayOption::Plain(key) | ArrayOption::Typed { key, .. } => key,
        }
    }
}

impl From<&str> for ArrayOption {
    fn from(key: &str) -> Self {
        ArrayOption::Plain(key.to_string())
    }
}

#[derive(Clone, Default)]
pub struct ParserOptions {
    pub aliases: IndexMap<String, Vec<String>>,
    pub array: Vec<ArrayOption>,
    pub boolean: Vec<String>,
    pub count: Vec<String>,
    pub string: Vec<String>,
    pub number: Vec<String>,
    pub normalize: Vec<String>,
    pub narg: IndexMap<String, usize>,
    pub default: IndexMap<String, Value>,
    pub coerce: IndexMap<String, CoerceFn>,
    pub config_objects: Vec<Map<String, Value>>,
    /// Every declared key, typed or not.
    pub key: IndexSet<String>,
    pub configuration: ParserConfiguration,
}

impl fmt::Debug for ParserOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserOptions")
            .field("aliases", &self.aliases)
            .field("array", &self.array)
            .field("boolean", &self.boolean)
            .field("count", &self.count)
            .field("string", &self.string)
            .field("number", &self.number)
            .field("normalize", &self.normalize)
            .field("narg", &self.narg)
            .field("default", &self.default)
            .field("coerce", &self.coerce.keys().collect::<Vec<_>>())
            .field("config_objects", &self.config_objects)
            .field("key", &self.key)
            .field("configuration", &self.configuration)
            .finish()
    }
}

impl ParserOptions {
    fn declarations(&self) -> Declarations {
        let mut decl = Declarations {
            booleans: self.boolean.clone(),
            counts: self.count.clone(),
            strings: self.string.clone(),
            numbers: self.number.clone(),
            normalize: self.normalize.clone(),
            nargs: self.narg.clone(),
            ..Default::default()
        };
        for opt in &self.array {
            let key = opt.key().to_string();
            if let ArrayOption::Typed { value_type, .. } = opt {
                match value_type {
                    ValueType::Boolean => decl.booleans.push(key.clone()),
                    ValueType::String => decl.strings.push(key.clone()),
                    ValueType::Number => decl.numbers.push(key.clone()),
                    ValueType::Count | ValueType::Untyped => {}
                }
            }
            decl.arrays.push(key);
        }
        decl
    }
}

#[derive(Debug)]
pub struct DetailedArguments {
    pub argv: Arguments,
    pub aliases: AliasTable,
    /// Spellings that were generated rather than declared.
    pub new_aliases: IndexSet<String>,
    /// Keys whose value came from a declared default.
    pub defaulted: IndexSet<String>,
    pub error: Option<Error>,
}

#[derive(Clone)]
pub struct Parser {
    platform: Rc<dyn Platform>,
}

impl Default for Parser {
    fn default() -> Self {
        Parser::new(Rc::new(StdPlatform))
    }
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser").finish_non_exhaustive()
    }
}

impl Parser {
    pub fn new(platform: Rc<dyn Platform>) -> Self {
        Parser { platform }
    }

    pub fn parse(&self, args: impl Into<ArgsInput>, opts: &ParserOptions) -> Arguments {
        self.detailed(args, opts).argv
    }

    pub fn detailed(&self, args: impl Into<ArgsInput>, opts: &ParserOptions) -> DetailedArguments {
        let tokens = args.into().into_tokens();
        let mut run = Run::prepare(opts, self.platform.as_ref());
        run.check_configuration();
        run.walk(tokens);
        run.apply_config_objects();
        run.apply_defaults();
        run.apply_coercions();
        run.zero_counts();
        run.finish()
    }
}

/// State of one parse.
struct Run<'a> {
    opts: &'a ParserOptions,
    platform: &'a dyn Platform,
    flags: Flags,
    aliases: AliasTable,
    new_aliases: IndexSet<String>,
    defaults: IndexMap<String, Value>,
    defaulted: IndexSet<String>,
    argv: Map<String, Value>,
    rest: Vec<String>,
    error: Option<Error>,
}

impl<'a> Run<'a> {
    fn prepare(opts: &'a ParserOptions, platform: &'a dyn Platform) -> Self {
        let combined = combine_aliases(&opts.aliases);
        let decl = opts.declarations();

        let mut table = AliasTable::new();
        let mut new_aliases = IndexSet::new();
        let keys: Vec<&str> = opts
            .key
            .iter()
            .map(String::as_str)
            .chain(combined.keys().map(String::as_str))
            .chain(opts.default.keys().map(String::as_str))
            .chain(decl.keys())
            .chain(opts.coerce.keys().map(String::as_str))
            .collect();
        extend_aliases(&mut table, &mut new_aliases, &combined, keys);

        let mut defaults = opts.default.clone();
        for (key, value) in &opts.default {
            for alias in table.get(key).into_iter().flatten() {
                defaults.insert(alias.clone(), value.clone());
            }
        }

        let flags = Flags::resolve(decl, &table);
        let mut argv = Map::new();
        argv.insert("_".to_string(), Value::Array(Vec::new()));

        Run {
            opts,
            platform,
            flags,
            aliases: table,
            new_aliases,
            defaults,
            defaulted: IndexSet::new(),
            argv,
            rest: Vec::new(),
            error: None,
        }
    }

    fn traits(&self, key: &str) -> KeyTraits {
        self.flags.traits(key)
    }

    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn check_configuration(&mut self) {
        for key in self.flags.counts().to_vec() {
            let traits = self.traits(&key);
            if traits.array {
                self.fail(Error::Configuration(format!(
                    "Invalid configuration: {key}, opts.count excludes opts.array."
                )));
                return;
            }
            if traits.narg.is_some() {
                self.fail(Error::Configuration(format!(
                    "Invalid configuration: {key}, opts.count excludes opts.narg."
                )));
                return;
            }
        }
    }

    fn walk(&mut self, tokens: Vec<String>) {
        let (args, rest) = match tokens.iter().position(|t| t == "--") {
            Some(at) => (tokens[..at].to_vec(), tokens[at + 1..].to_vec()),
            None => (tokens, Vec::new()),
        };

        let mut i = 0;
        while i < args.len() {
            let arg = args[i].as_str();
            trace!(token = arg, "parse token");
            if let Some(body) = arg.strip_prefix("--").filter(|b| !b.is_empty()) {
                if let Some((key, value)) = body.split_once('=') {
                    i = self.assign_inline(key, value, &args, i);
                } else if let Some(key) = self.negated(body) {
                    self.set_arg(key, Value::Bool(false));
                } else {
                    i = self.consume(body, &args, i);
                }
            } else if arg.len() > 1 && arg.starts_with('-') && !NEGATIVE.is_match(arg) {
                i = self.short_group(arg, &args, i);
            } else {
                self.push_positional(arg);
            }
            i += 1;
        }
        self.rest = rest;
    }

    /// `no-foo` negates `foo` when `foo` is boolean or undeclared and
    /// `no-foo` is not a key of its own.
    fn negated<'b>(&self, body: &'b str) -> Option<&'b str> {
        let key = body.strip_prefix("no-").filter(|k| !k.is_empty())?;
        if self.flags.is_declared(body) {
            return None;
        }
        (self.traits(key).is_boolean() || !self.flags.is_declared(key)).then_some(key)
    }

    fn assign_inline(&mut self, key: &str, value: &str, args: &[String], i: usize) -> usize {
        match self.traits(key).narg {
            Some(n) if n > 1 => self.eat_nargs(key, args, i, n, Some(value)),
            _ => {
                self.set_arg(key, Value::String(value.to_string()));
                i
            }
        }
    }

    /// Assign a value to `key` from the tokens after `i`. Returns the index
    /// of the last consumed token.
    fn consume(&mut self, key: &str, args: &[String], i: usize) -> usize {
        let traits = self.traits(key);
        let next = args.get(i + 1).map(String::as_str);

        if let Some(n) = traits.narg {
            return self.eat_nargs(key, args, i, n, None);
        }

        if traits.array {
            return match next {
                Some(tok) if !is_flag(tok) && (!traits.is_boolean() || is_bool_text(tok)) => {
                    self.set_arg(key, Value::String(tok.to_string()));
                    i + 1
                }
                _ => {
                    let empty = if traits.is_boolean() {
                        Value::Bool(true)
                    } else {
                        Value::Array(Vec::new())
                    };
                    self.set_arg(key, empty);
                    i
                }
            };
        }

        if traits.is_boolean_or_count() {
            return match next {
                Some(tok) if is_bool_text(tok) => {
                    self.set_arg(key, Value::String(tok.to_string()));
                    i + 1
                }
                _ => {
                    self.set_arg(key, Value::Bool(true));
                    i
                }
            };
        }

        match next {
            Some(tok) if !is_flag(tok) => {
                self.set_arg(key, Value::String(tok.to_string()));
                i + 1
            }
            _ => {
                self.set_arg(key, default_for(&traits));
                i
            }
        }
    }

    fn eat_nargs(
        &mut self,
        key: &str,
        args: &[String],
        i: usize,
        n: usize,
        first: Option<&str>,
    ) -> usize {
        if n == 0 {
            let value = match first {
                Some(v) => Value::String(v.to_string()),
                None => default_for(&self.traits(key)),
            };
            self.set_arg(key, value);
            return i;
        }

        let mut values: Vec<&str> = first.into_iter().collect();
        let mut j = i + 1;
        while values.len() < n && j < args.len() && !is_flag(&args[j]) {
            values.push(&args[j]);
            j += 1;
        }
        if values.len() < n {
            self.fail(Error::Parse(format!("Not enough arguments following: {key}")));
        }
        for value in values {
            self.set_arg(key, Value::String(value.to_string()));
        }
        j - 1
    }

    /// `-abc`, `-k=v`, `-n5`.
    fn short_group(&mut self, arg: &str, args: &[String], i: usize) -> usize {
        let letters: Vec<char> = arg[1..].chars().collect();
        let last = letters.len() - 1;

        for j in 0..last {
            let letter = letters[j].to_string();
            let next: String = letters[j + 1..].iter().collect();

            if letters[j + 1] == '=' {
                let value: String = letters[j + 2..].iter().collect();
                self.set_arg(&letter, Value::String(value));
                return i;
            }
            if next == "-" {
                self.set_arg(&letter, Value::String(next));
                continue;
            }
            if letters[j].is_ascii_alphabetic() && SHORT_NUMBER.is_match(&next) {
                self.set_arg(&letter, Value::String(next));
                return i;
            }
            if !(letters[j + 1].is_ascii_alphanumeric() || letters[j + 1] == '_') {
                self.set_arg(&letter, Value::String(next));
                return i;
            }
            let value = default_for(&self.traits(&letter));
            self.set_arg(&letter, value);
        }

        let key = letters[last].to_string();
        if key == "-" {
            return i;
        }
        self.consume(&key, args, i)
    }

    fn push_positional(&mut self, arg: &str) {
        let value = maybe_coerce_number(&KeyTraits::default(), Value::String(arg.to_string()));
        if let Some(Value::Array(items)) = self.argv.get_mut("_") {
            items.push(value);
        }
    }

    /// Write `value` under `key`, every alias of `key`, and every alias of
    /// its first dot segment.
    fn set_arg(&mut self, key: &str, raw: Value) {
        if key.contains('-') {
            let alias = key.split('.').map(camel_case).collect::<Vec<_>>().join(".");
            if !alias.is_empty() && alias != key {
                add_new_alias(&mut self.aliases, &mut self.new_aliases, key, &alias);
            }
        }

        let traits = self.traits(key);
        let platform = self.platform;
        let value = process_value(&traits, raw, &|p| platform.normalize_path(p));

        let path = split_path(key);
        self.write(&path, value.clone());

        let full_aliases = self.aliases.get(key).cloned().unwrap_or_default();
        for alias in &full_aliases {
            self.write(&split_path(alias), value.clone());
        }

        if path.len() > 1 {
            let head_aliases = self.aliases.get(path[0]).cloned().unwrap_or_default();
            for alias in &head_aliases {
                let mut expanded = split_path(alias);
                expanded.extend_from_slice(&path[1..]);
                if !full_aliases.contains(&expanded.join(".")) {
                    self.write(&expanded, value.clone());
                }
            }
        }
    }

    fn write(&mut self, path: &[&str], value: Incoming) {
        let full = self.traits(&path.join("."));
        let leaf = path.last().map(|k| self.traits(k)).unwrap_or_default();
        let policy = LeafPolicy {
            type_array: full.array,
            count_or_bool: leaf.is_boolean_or_count(),
            narg: leaf.narg,
            duplicate_arguments_array: self.opts.configuration.duplicate_arguments_array,
            flatten_duplicate_arrays: self.opts.configuration.flatten_duplicate_arrays,
        };
        set_key(&mut self.argv, path, value, &policy);
    }

    fn apply_config_objects(&mut self) {
        let opts = self.opts;
        for config in &opts.config_objects {
            self.apply_config_object(config, None);
        }
    }

    fn apply_config_object(&mut self, config: &Map<String, Value>, prefix: Option<&str>) {
        for (key, value) in config {
            let full = match prefix {
                Some(p) => format!("{p}.{key}"),
                None => key.clone(),
            };
            match value {
                Value::Object(inner) => self.apply_config_object(inner, Some(&full)),
                _ if !has_key(&self.argv, &split_path(&full)) => self.set_arg(&full, value.clone()),
                _ => {}
            }
        }
    }

    fn apply_defaults(&mut self) {
        let defaults = self.defaults.clone();
        for (key, value) in &defaults {
            let path = split_path(key);
            if has_key(&self.argv, &path) {
                continue;
            }
            self.write(&path, Incoming::Value(value.clone()));
            self.defaulted.insert(key.clone());
            for alias in self.aliases.get(key).cloned().unwrap_or_default() {
                let alias_path = split_path(&alias);
                if !has_key(&self.argv, &alias_path) {
                    self.write(&alias_path, Incoming::Value(value.clone()));
                }
            }
        }
    }

    fn apply_coercions(&mut self) {
        let opts = self.opts;
        if opts.coerce.is_empty() {
            return;
        }
        let keys: Vec<String> = self.argv.keys().cloned().collect();
        let mut applied: HashSet<String> = HashSet::new();
        for key in keys {
            if applied.contains(&key) {
                continue;
            }
            let Some(coerce) = spellings(&self.aliases, &key).find_map(|k| opts.coerce.get(k)) else {
                continue;
            };
            let current = self.argv.get(&key).cloned().unwrap_or(Value::Null);
            match coerce(current) {
                Ok(value) => {
                    let value = maybe_coerce_number(&self.traits(&key), value);
                    let group: Vec<String> = spellings(&self.aliases, &key).map(str::to_string).collect();
                    for spelling in group {
                        applied.insert(spelling.clone());
                        self.argv.insert(spelling, value.clone());
                    }
                }
                Err(e) => self.fail(Error::coerce(key.as_str(), e)),
            }
        }
    }

    fn zero_counts(&mut self) {
        for key in self.flags.counts().to_vec() {
            if !has_key(&self.argv, &split_path(&key)) {
                self.set_arg(&key, Value::from(0));
            }
        }
    }

    fn finish(mut self) -> DetailedArguments {
        if !self.rest.is_empty() {
            let rest = std::mem::take(&mut self.rest);
            self.argv.insert(
                "--".to_string(),
                Value::Array(rest.into_iter().map(Value::String).collect()),
            );
        }
        DetailedArguments {
            argv: Arguments::from(self.argv),
            aliases: self.aliases,
            new_aliases: self.new_aliases,
            defaulted: self.defaulted,
            error: self.error,
        }
    }
}

fn is_flag(token: &str) -> bool {
    token.len() > 1 && token.starts_with('-') && !NEGATIVE.is_match(token)
}

fn is_bool_text(token: &str) -> bool {
    token == "true" || token == "false"
}

/// Value of a flag given without one.
fn default_for(traits: &KeyTraits) -> Value {
    match traits.value_type {
        ValueType::String => Value::String(String::new()),
        ValueType::Number => Value::Null,
        _ => Value::Bool(true),
    }
}
