//! Post-parse checks: non-option counts, required options, unknown
//! commands and arguments, choices, implications and conflicts.

use indexmap::IndexSet;
use serde_json::Value;

use crate::arguments::Arguments;
use crate::error::{Error, Result};
use crate::parser::AliasTable;
use crate::parser::strings::value_to_string;
use crate::program::ProgramOptions;

const SPECIAL_KEYS: [&str; 3] = ["$0", "--", "_"];

/// Everything a validation pass looks at.
#[derive(Debug)]
pub struct ValidationRequest<'a> {
    pub argv: &'a Arguments,
    pub options: &'a ProgramOptions,
    pub aliases: &'a AliasTable,
    pub new_aliases: &'a IndexSet<String>,
    /// Keys filled from positionals of the running command.
    pub positional_keys: &'a IndexSet<String>,
    /// Every registered command name and alias at this level.
    pub command_names: &'a [String],
    /// Command path matched so far.
    pub context_commands: &'a [String],
    pub strict: bool,
    pub strict_commands: bool,
    pub strict_options: bool,
    pub is_default_command: bool,
}

/// Pluggable validation. Implementations must not call back into the
/// program they validate.
pub trait Validation {
    /// The single post-parse check, run between the two middleware passes.
    fn validate(&self, request: &ValidationRequest<'_>) -> Result<()>;

    /// Whether enough tokens are left for a command's demanded positionals.
    fn positional_count(&self, required: usize, observed: usize) -> Result<()> {
        if observed < required {
            return Err(Error::NotEnoughArguments {
                got: observed,
                need: required,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultValidation;

impl Validation for DefaultValidation {
    fn validate(&self, req: &ValidationRequest<'_>) -> Result<()> {
        non_option_count(req)?;
        required_arguments(req)?;
        if req.strict_commands {
            unknown_commands(req)?;
        }
        if req.strict {
            unknown_arguments(req, true)?;
        } else if req.strict_options {
            unknown_arguments(req, false)?;
        }
        limited_choices(req)?;
        implications(req)?;
        conflicting(req)
    }
}

fn plural(count: usize, one: &str, many: &str, list: &str) -> String {
    if count == 1 {
        format!("{one}: {list}")
    } else {
        format!("{many}: {list}")
    }
}

pub fn non_option_count(req: &ValidationRequest<'_>) -> Result<()> {
    let Some(demanded) = &req.options.demanded_commands else {
        return Ok(());
    };
    let total = req.argv.positionals().len() + req.argv.rest().map_or(0, <[Value]>::len);
    let count = total.saturating_sub(req.context_commands.len());
    let substitute = |msg: &str, limit: usize| {
        msg.replace("$0", &count.to_string())
            .replacen("$1", &limit.to_string(), 1)
    };

    if count < demanded.min {
        return Err(match &demanded.min_msg {
            Some(msg) => Error::Validation(substitute(msg, demanded.min)),
            None => Error::NotEnoughArguments {
                got: count,
                need: demanded.min,
            },
        });
    }
    if let Some(max) = demanded.max
        && count > max
    {
        return Err(Error::Validation(match &demanded.max_msg {
            Some(msg) => substitute(msg, max),
            None => format!("Too many non-option arguments: got {count}, maximum of {max}"),
        }));
    }
    Ok(())
}

pub fn required_arguments(req: &ValidationRequest<'_>) -> Result<()> {
    let mut missing: Vec<&str> = Vec::new();
    let mut custom: Vec<&str> = Vec::new();
    for (key, message) in &req.options.demanded_options {
        if req.argv.get(key).is_none_or(Value::is_null) {
            missing.push(key);
            if let Some(msg) = message.as_deref()
                && !custom.contains(&msg)
            {
                custom.push(msg);
            }
        }
    }
    if missing.is_empty() {
        return Ok(());
    }
    let mut list = missing.join(", ");
    if !custom.is_empty() {
        list.push('\n');
        list.push_str(&custom.join("\n"));
    }
    Err(Error::Validation(plural(
        missing.len(),
        "Missing required argument",
        "Missing required arguments",
        &list,
    )))
}

/// Leftover positionals after the command path that are not command names.
fn unknown_positionals(req: &ValidationRequest<'_>) -> Vec<String> {
    req.argv
        .positionals()
        .iter()
        .skip(req.context_commands.len())
        .map(value_to_string)
        .filter(|token| !req.command_names.contains(token))
        .collect()
}

pub fn unknown_commands(req: &ValidationRequest<'_>) -> Result<()> {
    if req.context_commands.is_empty() && req.command_names.is_empty() {
        return Ok(());
    }
    let unknown = unknown_positionals(req);
    if unknown.is_empty() {
        return Ok(());
    }
    Err(Error::Validation(plural(
        unknown.len(),
        "Unknown command",
        "Unknown commands",
        &unknown.join(", "),
    )))
}

/// A key is known when some spelling of its group was declared rather than
/// generated while parsing.
fn is_known(req: &ValidationRequest<'_>, key: &str) -> bool {
    let Some(others) = req.aliases.get(key) else {
        return false;
    };
    std::iter::once(key)
        .chain(others.iter().map(String::as_str))
        .any(|k| !req.new_aliases.contains(k))
}

/// `check_positionals` is off for `strict_options`, which only looks at flags.
pub fn unknown_arguments(req: &ValidationRequest<'_>, check_positionals: bool) -> Result<()> {
    let positional_keys = if check_positionals {
        req.positional_keys.clone()
    } else {
        IndexSet::new()
    };
    let mut unknown: Vec<String> = req
        .argv
        .keys()
        .filter(|key| {
            !SPECIAL_KEYS.contains(&key.as_str())
                && !positional_keys.contains(*key)
                && !is_known(req, key)
        })
        .cloned()
        .collect();

    if check_positionals {
        if !req.context_commands.is_empty()
            || !req.command_names.is_empty()
            || req.is_default_command
        {
            unknown.extend(unknown_positionals(req));
        }

        let max = req
            .options
            .demanded_commands
            .as_ref()
            .map_or(0, |d| d.max.unwrap_or(usize::MAX));
        let expected = req.context_commands.len().saturating_add(max);
        for token in req.argv.positionals().iter().skip(expected) {
            let token = value_to_string(token);
            if !req.context_commands.contains(&token) && !unknown.contains(&token) {
                unknown.push(token);
            }
        }
    }

    if unknown.is_empty() {
        return Ok(());
    }
    let list = unknown
        .iter()
        .map(|s| {
            if s.trim().is_empty() {
                format!("\"{s}\"")
            } else {
                s.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    Err(Error::Validation(plural(
        unknown.len(),
        "Unknown argument",
        "Unknown arguments",
        &list,
    )))
}

fn stringified(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn limited_choices(req: &ValidationRequest<'_>) -> Result<()> {
    let choices = &req.options.choices;
    if choices.is_empty() {
        return Ok(());
    }
    let mut message = String::new();
    for (key, value) in req.argv.iter() {
        if SPECIAL_KEYS.contains(&key.as_str()) {
            continue;
        }
        let Some(allowed) = choices.get(key) else {
            continue;
        };
        let given: Vec<Value> = match value {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        let invalid: Vec<Value> = given
            .into_iter()
            .filter(|v| !v.is_null() && !allowed.contains(v))
            .collect();
        if !invalid.is_empty() {
            message.push_str(&format!(
                "\n  Argument: {key}, Given: {}, Choices: {}",
                stringified(&invalid),
                stringified(allowed)
            ));
        }
    }
    if message.is_empty() {
        return Ok(());
    }
    Err(Error::Validation(format!("Invalid values:{message}")))
}

/// `--no-key` means "key is absent"; a number means "at least that many
/// positionals".
fn key_exists(argv: &Arguments, key: &str) -> bool {
    if let Ok(n) = key.parse::<usize>() {
        return argv.positionals().len() >= n;
    }
    match key.strip_prefix("--no-") {
        Some(negated) if !negated.is_empty() => !argv.contains_key(negated),
        _ => argv.contains_key(key),
    }
}

pub fn implications(req: &ValidationRequest<'_>) -> Result<()> {
    let mut failed = Vec::new();
    for (key, implied) in &req.options.implies {
        for value in implied {
            if key_exists(req.argv, key) && !key_exists(req.argv, value) {
                failed.push(format!("  {key} -> {value}"));
            }
        }
    }
    if failed.is_empty() {
        return Ok(());
    }
    Err(Error::Validation(format!(
        "Implications failed:\n{}",
        failed.join("\n")
    )))
}

pub fn conflicting(req: &ValidationRequest<'_>) -> Result<()> {
    let present = |k: &str| req.argv.get(k).is_some_and(|v| !v.is_null());
    for key in req.argv.keys() {
        let Some(others) = req.options.conflicts.get(key) else {
            continue;
        };
        for other in others {
            if !other.is_empty() && present(key) && present(other) {
                return Err(Error::Validation(format!(
                    "Arguments {key} and {other} are mutually exclusive"
                )));
            }
        }
    }
    Ok(())
}
