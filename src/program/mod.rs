//! The program handle: declarations, commands and middleware of the current
//! level, plus the parse entry points.
//!
//! `Program` is a cheap `Rc` handle. Builders receive the same handle after it
//! was reset for the command they configure, so every level of a dispatch
//! mutates one state value. `freeze`/`unfreeze` bracket each top-level parse
//! and restore the declarations afterwards.

mod dispatch;
pub mod options;

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use indexmap::IndexSet;
use serde_json::{Map, Value};
use tracing::debug;

use crate::arguments::Arguments;
use crate::command::{Command, CommandRegistry};
use crate::deferred::Deferred;
use crate::error::{Error, Result};
use crate::middleware::{Middleware, MiddlewareStack, ValueFn};
use crate::parser::{AliasTable, ArgsInput};
use crate::platform::{Platform, StdPlatform};
use crate::usage::{DefaultUsage, Usage};
use crate::validation::{DefaultValidation, Validation};

pub use options::{DemandedCommands, OptionDefinition, OptionType, ProgramOptions, Switch};

const HELP_DESC: &str = "Show help";
const VERSION_DESC: &str = "Show version number";

/// Matched command path.
#[derive(Debug, Clone, Default)]
pub(crate) struct Context {
    pub commands: Vec<String>,
    pub full_commands: Vec<String>,
    /// Number of command levels entered since the program was created.
    pub resets: usize,
}

/// What the latest parse of this level learned about the tokens.
#[derive(Debug, Default)]
pub(crate) struct Parsed {
    pub aliases: AliasTable,
    pub new_aliases: IndexSet<String>,
    pub error: Option<Error>,
}

/// Saved declarations of one level.
struct Frozen {
    options: ProgramOptions,
    commands: CommandRegistry,
    middleware: MiddlewareStack,
    strict: bool,
    strict_commands: bool,
    strict_options: bool,
    exit_process: bool,
    has_output: bool,
    usage_line: Option<(String, Option<String>)>,
    commands_path: Vec<String>,
    full_commands: Vec<String>,
}

pub(crate) struct State {
    pub options: ProgramOptions,
    pub strict: bool,
    pub strict_commands: bool,
    pub strict_options: bool,
    pub exit_process: bool,
    pub script_name: String,
    pub help_opt: Option<String>,
    pub version_opt: Option<String>,
    pub version: Option<String>,
    pub commands: CommandRegistry,
    pub middleware: MiddlewareStack,
    pub usage: Rc<RefCell<dyn Usage>>,
    pub validation: Rc<dyn Validation>,
    pub context: Context,
    pub has_output: bool,
    pub parsed: Option<Parsed>,
    pub process_args: Vec<String>,
    pub usage_line: Option<(String, Option<String>)>,
    /// Setup misuse reported by the next parse.
    pub usage_error: Option<Error>,
    frozen: Vec<Frozen>,
}

#[derive(Clone)]
pub struct Program {
    pub(crate) inner: Rc<RefCell<State>>,
    pub(crate) platform: Rc<dyn Platform>,
}

impl Default for Program {
    fn default() -> Self {
        Program::new()
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.inner.borrow();
        f.debug_struct("Program")
            .field("script_name", &s.script_name)
            .field("commands", &s.commands.names())
            .field("context", &s.context.commands)
            .field("frozen", &s.frozen.len())
            .finish_non_exhaustive()
    }
}

impl Program {
    pub fn new() -> Self {
        Program::with_platform(Rc::new(StdPlatform))
    }

    pub fn with_platform(platform: Rc<dyn Platform>) -> Self {
        let state = State {
            options: ProgramOptions::default(),
            strict: false,
            strict_commands: false,
            strict_options: false,
            exit_process: true,
            script_name: platform.script_name(),
            help_opt: None,
            version_opt: None,
            version: None,
            commands: CommandRegistry::default(),
            middleware: MiddlewareStack::default(),
            usage: Rc::new(RefCell::new(DefaultUsage::new())),
            validation: Rc::new(DefaultValidation),
            context: Context::default(),
            has_output: false,
            parsed: None,
            process_args: Vec::new(),
            usage_line: None,
            usage_error: None,
            frozen: Vec::new(),
        };
        let program = Program {
            inner: Rc::new(RefCell::new(state)),
            platform,
        };
        program.help_option(Some("help"));
        program
    }

    fn update(&self, f: impl FnOnce(&mut State)) -> &Self {
        f(&mut self.inner.borrow_mut());
        self
    }

    fn declare(&self, f: impl FnOnce(&mut ProgramOptions)) -> &Self {
        self.update(|s| f(&mut s.options))
    }

    fn record_usage_error(&self, error: Error) {
        let mut s = self.inner.borrow_mut();
        if s.usage_error.is_none() {
            s.usage_error = Some(error);
        }
    }

    /// Declare `key` with everything `def` carries.
    pub fn option(&self, key: &str, def: OptionDefinition) -> &Self {
        let OptionDefinition {
            value_type,
            aliases,
            default,
            required,
            choices,
            conflicts,
            implies,
            coerce,
            normalize,
            array,
            desc,
            hidden,
            deprecated,
            global,
            skip_validation,
            narg,
        } = def;

        self.declare(|o| {
            o.key.insert(key.to_string());
            if !aliases.is_empty() {
                let group = o.aliases.entry(key.to_string()).or_default();
                for alias in &aliases {
                    ProgramOptions::push_unique(group, alias);
                }
            }
            if let Some(d) = deprecated.filter(Switch::is_on) {
                o.deprecated_options
                    .insert(key.to_string(), d.message().map(str::to_string));
            }
            match required {
                Some(r) if r.is_on() => {
                    o.demanded_options
                        .insert(key.to_string(), r.message().map(str::to_string));
                }
                Some(_) => {
                    o.demanded_options.shift_remove(key);
                }
                None => {}
            }
            if !conflicts.is_empty() {
                o.conflicts.entry(key.to_string()).or_default().extend(conflicts);
            }
            if !implies.is_empty() {
                o.implies.entry(key.to_string()).or_default().extend(implies);
            }
            if let Some(value) = default {
                o.default.insert(key.to_string(), value);
            }
            if normalize {
                ProgramOptions::push_unique(&mut o.normalize, key);
            }
            if !choices.is_empty() {
                o.choices.entry(key.to_string()).or_default().extend(choices);
            }
            if let Some(value_type) = value_type {
                let list = match value_type {
                    OptionType::Boolean => &mut o.boolean,
                    OptionType::Count => &mut o.count,
                    OptionType::Number => &mut o.number,
                    OptionType::String => &mut o.string,
                    OptionType::Array => &mut o.array,
                };
                for k in std::iter::once(key).chain(aliases.iter().map(String::as_str)) {
                    ProgramOptions::push_unique(list, k);
                }
            }
            if array {
                ProgramOptions::push_unique(&mut o.array, key);
            }
            if let Some(n) = narg {
                o.narg.insert(key.to_string(), n);
            }
            if let Some(global) = global {
                o.set_global(key, global);
            }
            if skip_validation {
                ProgramOptions::push_unique(&mut o.skip_validation, key);
            }
            if let Some(desc) = desc {
                o.descriptions.insert(key.to_string(), desc);
            }
            if hidden {
                ProgramOptions::push_unique(&mut o.hidden, key);
            }
        });

        if let Some(f) = coerce {
            self.add_coerce(key, f);
        }
        self
    }

    /// Refine a positional of the command being built. The command string
    /// contributes array, aliases, default and required.
    pub fn positional(&self, key: &str, def: OptionDefinition) -> &Self {
        let full_command = {
            let s = self.inner.borrow();
            if s.context.resets == 0 {
                None
            } else {
                Some(s.context.full_commands.last().cloned())
            }
        };
        let Some(full_command) = full_command else {
            self.record_usage_error(Error::Usage(
                ".positional() can only be called in a command's builder function".into(),
            ));
            return self;
        };

        let mut def = def.positional_subset();
        if let Some(cmd) = full_command {
            let hints = crate::command::cmd_to_parse_options(&cmd);
            if hints.array.iter().any(|k| k == key) {
                def.array = true;
            }
            if def.aliases.is_empty()
                && let Some(aliases) = hints.aliases.get(key)
            {
                def.aliases = aliases.clone();
            }
            if def.default.is_none()
                && let Some(value) = hints.default.get(key)
            {
                def.default = Some(value.clone());
            }
            if hints.required.contains(key) {
                def.required = Some(Switch::Flag(true));
            }
        }
        self.option(key, def)
    }

    pub fn alias(&self, key: &str, alias: &str) -> &Self {
        self.declare(|o| {
            o.key.insert(key.to_string());
            let group = o.aliases.entry(key.to_string()).or_default();
            ProgramOptions::push_unique(group, alias);
        })
    }

    fn typed(&self, key: &str, pick: fn(&mut ProgramOptions) -> &mut Vec<String>) -> &Self {
        self.declare(|o| {
            o.key.insert(key.to_string());
            ProgramOptions::push_unique(pick(o), key);
        })
    }

    pub fn boolean(&self, key: &str) -> &Self {
        self.typed(key, |o| &mut o.boolean)
    }

    pub fn string(&self, key: &str) -> &Self {
        self.typed(key, |o| &mut o.string)
    }

    pub fn number(&self, key: &str) -> &Self {
        self.typed(key, |o| &mut o.number)
    }

    pub fn array(&self, key: &str) -> &Self {
        self.typed(key, |o| &mut o.array)
    }

    pub fn count(&self, key: &str) -> &Self {
        self.typed(key, |o| &mut o.count)
    }

    pub fn normalize(&self, key: &str) -> &Self {
        self.typed(key, |o| &mut o.normalize)
    }

    pub fn default_value(&self, key: &str, value: impl Into<Value>) -> &Self {
        let value = value.into();
        self.declare(|o| {
            o.key.insert(key.to_string());
            o.default.insert(key.to_string(), value);
        })
    }

    /// An in-memory config object. Token values win over it, it wins over defaults.
    pub fn config(&self, object: Map<String, Value>) -> &Self {
        self.declare(|o| o.config_objects.push(object))
    }

    pub fn demand_option(&self, key: &str, required: impl Into<Switch>) -> &Self {
        self.option(key, OptionDefinition::new().required(required))
    }

    pub fn choices<V: Into<Value>>(&self, key: &str, values: impl IntoIterator<Item = V>) -> &Self {
        self.option(key, OptionDefinition::new().choices(values))
    }

    pub fn conflicts(&self, key: &str, other: &str) -> &Self {
        self.option(key, OptionDefinition::new().conflicts(other))
    }

    pub fn implies(&self, key: &str, other: &str) -> &Self {
        self.option(key, OptionDefinition::new().implies(other))
    }

    pub fn deprecate_option(&self, key: &str, deprecated: impl Into<Switch>) -> &Self {
        self.option(key, OptionDefinition::new().deprecated(deprecated))
    }

    pub fn hide(&self, key: &str) -> &Self {
        self.option(key, OptionDefinition::new().hidden())
    }

    /// Local options are dropped when a command is entered.
    pub fn global(&self, key: &str, global: bool) -> &Self {
        self.declare(|o| o.set_global(key, global))
    }

    pub fn skip_validation(&self, key: &str) -> &Self {
        self.option(key, OptionDefinition::new().skip_validation())
    }

    pub fn command(&self, command: Command) -> &Self {
        let added = self.inner.borrow_mut().commands.add(command);
        if let Err(e) = added {
            self.record_usage_error(e);
        }
        self
    }

    pub fn demand_command(&self, min: usize, max: Option<usize>) -> &Self {
        self.demand_command_with(DemandedCommands {
            min,
            max,
            min_msg: None,
            max_msg: None,
        })
    }

    /// Messages may use `$0` for the observed and `$1` for the expected count.
    pub fn demand_command_with(&self, demanded: DemandedCommands) -> &Self {
        self.declare(|o| {
            o.demanded_commands = Some(demanded);
            o.set_global("_", false);
        })
    }

    pub fn strict(&self, enabled: bool) -> &Self {
        self.update(|s| s.strict = enabled)
    }

    pub fn strict_commands(&self, enabled: bool) -> &Self {
        self.update(|s| s.strict_commands = enabled)
    }

    pub fn strict_options(&self, enabled: bool) -> &Self {
        self.update(|s| s.strict_options = enabled)
    }

    /// Whether help and version output end the process.
    pub fn exit_process(&self, enabled: bool) -> &Self {
        self.update(|s| s.exit_process = enabled)
    }

    pub fn script_name(&self, name: impl Into<String>) -> &Self {
        let name = name.into();
        self.update(|s| s.script_name = name)
    }

    pub fn middleware(&self, middleware: Middleware) -> &Self {
        self.update(|s| s.middleware.add(middleware))
    }

    /// A post-validation check. `Ok(false)` fails with
    /// `Argument check failed: <name>`. The check is global; register
    /// `Middleware::check(..).local()` to keep it on this level.
    pub fn check<F>(&self, name: &str, f: F) -> &Self
    where
        F: Fn(&Arguments) -> anyhow::Result<bool> + 'static,
    {
        self.middleware(Middleware::check(name, f))
    }

    pub fn check_async<F, Fut>(&self, name: &str, f: F) -> &Self
    where
        F: Fn(Arguments) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + 'static,
    {
        self.middleware(Middleware::check_async(name, f))
    }

    pub fn coerce<F>(&self, key: &str, f: F) -> &Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + 'static,
    {
        self.add_coerce(key, Rc::new(f))
    }

    /// Like `coerce`, for callbacks that resolve later. The parse turns
    /// pending once the key is present.
    pub fn coerce_async<F, Fut>(&self, key: &str, f: F) -> &Self
    where
        F: Fn(Value) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + 'static,
    {
        let owned = key.to_string();
        let deferred: ValueFn = Rc::new(move |value| {
            let key = owned.clone();
            let coerced = f(value);
            Deferred::from_future(async move { coerced.await.map_err(|e| Error::coerce(key, e)) })
        });
        self.add_deferred_coerce(key, deferred)
    }

    fn add_coerce(&self, key: &str, f: crate::parser::CoerceFn) -> &Self {
        let owned = key.to_string();
        let deferred: ValueFn =
            Rc::new(move |value| Deferred::from(f(value).map_err(|e| Error::coerce(owned.as_str(), e))));
        self.add_deferred_coerce(key, deferred)
    }

    fn add_deferred_coerce(&self, key: &str, f: ValueFn) -> &Self {
        self.update(|s| {
            s.options.key.insert(key.to_string());
            let aliases = s.options.aliases.get(key).cloned().unwrap_or_default();
            s.middleware.add_coerce(Middleware::coerce(key, f), &aliases);
        })
    }

    /// Observe failures before they reach the caller of `parse`.
    pub fn fail<F>(&self, f: F) -> &Self
    where
        F: Fn(Option<&str>, &Error) + 'static,
    {
        let usage = self.inner.borrow().usage.clone();
        usage.borrow_mut().add_fail_handler(Rc::new(f));
        self
    }

    /// Usage line of the current level. `$0` expands to the script name.
    pub fn usage(&self, line: &str, description: Option<&str>) -> &Self {
        let entry = (line.to_string(), description.map(str::to_string));
        self.update(|s| s.usage_line = Some(entry))
    }

    /// `None` disables the help option.
    pub fn help_option(&self, key: Option<&str>) -> &Self {
        let previous = self.inner.borrow_mut().help_opt.take();
        if let Some(previous) = previous {
            self.declare(|o| {
                o.boolean.retain(|k| *k != previous);
                o.key.shift_remove(&previous);
                o.descriptions.shift_remove(&previous);
            });
        }
        if let Some(key) = key {
            self.update(|s| s.help_opt = Some(key.to_string()));
            self.option(key, OptionDefinition::new().of_type(OptionType::Boolean).describe(HELP_DESC));
        }
        self
    }

    /// Enable `--version`, printing `version`.
    pub fn version(&self, version: impl Into<String>) -> &Self {
        let version = version.into();
        self.update(|s| {
            s.version_opt = Some("version".to_string());
            s.version = Some(version);
        });
        self.option(
            "version",
            OptionDefinition::new().of_type(OptionType::Boolean).describe(VERSION_DESC),
        )
    }

    pub fn with_usage(&self, usage: impl Usage + 'static) -> &Self {
        self.update(|s| s.usage = Rc::new(RefCell::new(usage)))
    }

    pub fn with_validation(&self, validation: impl Validation + 'static) -> &Self {
        self.update(|s| s.validation = Rc::new(validation))
    }

    /// Drop local options, commands and non-global middleware.
    pub fn reset(&self) -> &Self {
        let aliases = self.parsed_aliases();
        self.reset_with(&aliases);
        self
    }

    pub(crate) fn reset_with(&self, aliases: &AliasTable) {
        let mut s = self.inner.borrow_mut();
        s.options = s.options.without_local(aliases);
        s.commands.clear();
        s.middleware.reset();
        s.parsed = None;
        s.usage_line = None;
        s.context.resets += 1;
    }

    pub(crate) fn freeze(&self) {
        let mut s = self.inner.borrow_mut();
        let frozen = Frozen {
            options: s.options.clone(),
            commands: s.commands.clone(),
            middleware: s.middleware.clone(),
            strict: s.strict,
            strict_commands: s.strict_commands,
            strict_options: s.strict_options,
            exit_process: s.exit_process,
            has_output: s.has_output,
            usage_line: s.usage_line.clone(),
            commands_path: s.context.commands.clone(),
            full_commands: s.context.full_commands.clone(),
        };
        s.frozen.push(frozen);
        s.usage.borrow_mut().freeze();
    }

    pub(crate) fn unfreeze(&self) {
        let mut s = self.inner.borrow_mut();
        let Some(frozen) = s.frozen.pop() else {
            return;
        };
        s.options = frozen.options;
        s.commands = frozen.commands;
        s.middleware = frozen.middleware;
        s.strict = frozen.strict;
        s.strict_commands = frozen.strict_commands;
        s.strict_options = frozen.strict_options;
        s.exit_process = frozen.exit_process;
        s.has_output = frozen.has_output;
        s.usage_line = frozen.usage_line;
        s.context.commands = frozen.commands_path;
        s.context.full_commands = frozen.full_commands;
        s.usage.borrow_mut().unfreeze();
    }

    /// Parse `args`. The result is `Ready` when every builder, middleware and
    /// handler on the path answered synchronously.
    pub fn parse(&self, args: impl Into<ArgsInput>) -> Deferred<Arguments> {
        let tokens = args.into().into_tokens();
        let misuse = self.inner.borrow_mut().usage_error.take();
        if let Some(error) = misuse {
            return Deferred::err(self.route_failure(error));
        }

        self.freeze();
        {
            let mut s = self.inner.borrow_mut();
            s.process_args = tokens.clone();
            s.middleware.clear_applied();
            for handler in s.commands.handlers() {
                for middleware in &handler.middleware {
                    middleware.clear_applied();
                }
            }
        }
        debug!(tokens = tokens.len(), "parse");

        let failing = self.clone();
        let thawing = self.clone();
        self.run(tokens, dispatch::Frame::top(false))
            .map_err(move |e| failing.route_failure(e))
            .finally(move || thawing.unfreeze())
    }

    pub fn parse_process_args(&self) -> Deferred<Arguments> {
        self.parse(self.platform.process_args())
    }

    pub fn parse_async(&self, args: impl Into<ArgsInput>) -> LocalBoxFuture<'static, Result<Arguments>> {
        self.parse(args).into_local_future()
    }

    /// Fails with `AsyncInSyncParse` when any stage went asynchronous.
    pub fn parse_sync(&self, args: impl Into<ArgsInput>) -> Result<Arguments> {
        match self.parse(args).into_ready() {
            Some(result) => result,
            None => {
                // the dropped chain never reached its own unfreeze
                self.unfreeze();
                Err(self.route_failure(Error::AsyncInSyncParse))
            }
        }
    }

    /// Help text for the command path of the process arguments.
    pub fn get_help(&self) -> Deferred<String> {
        let usage = self.inner.borrow().usage.clone();
        let cached = usage.borrow().cached_help_message();
        if let Some(text) = cached {
            return Deferred::ready(text);
        }
        let tokens = self.inner.borrow().process_args.clone();
        self.freeze();
        let rendering = self.clone();
        let thawing = self.clone();
        self.run(tokens, dispatch::Frame::top(true))
            .map(move |_| rendering.help_text())
            .finally(move || thawing.unfreeze())
    }

    fn route_failure(&self, error: Error) -> Error {
        let usage = self.inner.borrow().usage.clone();
        let message = error.to_string();
        usage.borrow().fail(Some(&message), &error);
        error
    }

    /// Every spelling the latest parse grouped with `key`.
    pub fn parsed_aliases_of(&self, key: &str) -> Vec<String> {
        self.inner
            .borrow()
            .parsed
            .as_ref()
            .and_then(|p| p.aliases.get(key).cloned())
            .unwrap_or_default()
    }

    pub(crate) fn parsed_aliases(&self) -> AliasTable {
        self.inner
            .borrow()
            .parsed
            .as_ref()
            .map(|p| p.aliases.clone())
            .unwrap_or_default()
    }

    /// Command names matched so far.
    pub fn context_commands(&self) -> Vec<String> {
        self.inner.borrow().context.commands.clone()
    }

    /// Names and aliases registered at the current level.
    pub fn command_names(&self) -> Vec<String> {
        self.inner.borrow().commands.names()
    }

    /// Snapshot of the current declarations.
    pub fn options(&self) -> ProgramOptions {
        self.inner.borrow().options.clone()
    }

    pub fn platform(&self) -> Rc<dyn Platform> {
        self.platform.clone()
    }
}
