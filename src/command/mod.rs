//! Command records and the registry they are looked up in.

pub mod dsl;
pub mod positional;

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::arguments::Arguments;
use crate::deferred::{Deferred, lift, lift_future};
use crate::error::Result;
use crate::middleware::Middleware;
use crate::program::Program;

pub use dsl::{ParsedCommand, Positional, PositionalHints, cmd_to_parse_options, parse_command};

/// Configures the program for one command. The flag is true when help or
/// version was requested, so expensive setup can be skipped.
pub type BuilderFn = Rc<dyn Fn(&Program, bool) -> Deferred<()>>;

pub type HandlerFn = Rc<dyn Fn(Arguments) -> Deferred<()>>;

/// Name of the default command once registered.
pub const DEFAULT_COMMAND: &str = "$0";

pub(crate) fn is_default_marker(name: &str) -> bool {
    name.starts_with('*') || name.starts_with(DEFAULT_COMMAND)
}

/// A command definition, built fluently and handed to `Program::command`.
///
/// ```
/// use argweave::{Command, Program};
///
/// let program = Program::new();
/// program.command(
///     Command::new("greet <name>")
///         .describe("say hello")
///         .handler(|argv| {
///             println!("hello {}", argv["name"]);
///             Ok(())
///         }),
/// );
/// ```
#[derive(Clone)]
pub struct Command {
    pub(crate) cmd: String,
    pub(crate) aliases: Vec<String>,
    pub(crate) desc: Option<String>,
    pub(crate) builder: BuilderFn,
    pub(crate) handler: HandlerFn,
    pub(crate) middleware: Vec<Middleware>,
    pub(crate) deprecated: bool,
}

impl Command {
    pub fn new(cmd: impl Into<String>) -> Self {
        Command {
            cmd: cmd.into(),
            aliases: Vec::new(),
            desc: None,
            builder: Rc::new(|_, _| Deferred::ready(())),
            handler: Rc::new(|_| Deferred::ready(())),
            middleware: Vec::new(),
            deprecated: false,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn describe(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn builder<F>(mut self, f: F) -> Self
    where
        F: Fn(&Program, bool) -> anyhow::Result<()> + 'static,
    {
        self.builder = Rc::new(move |program, help| lift(f(program, help)));
        self
    }

    pub fn builder_async<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Program, bool) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.builder = Rc::new(move |program, help| lift_future(f(program.clone(), help)));
        self
    }

    pub fn handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arguments) -> anyhow::Result<()> + 'static,
    {
        self.handler = Rc::new(move |argv| lift(f(&argv)));
        self
    }

    pub fn handler_async<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.handler = Rc::new(move |argv| lift_future(f(argv)));
        self
    }

    /// Middleware that only runs for this command.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware.scoped_to_command());
        self
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("cmd", &self.cmd)
            .field("aliases", &self.aliases)
            .field("desc", &self.desc)
            .field("deprecated", &self.deprecated)
            .finish_non_exhaustive()
    }
}

/// A registered command.
pub struct CommandHandler {
    /// Command string with a default marker replaced by the primary name.
    pub original: String,
    pub name: String,
    pub aliases: Vec<String>,
    pub desc: Option<String>,
    pub demanded: Vec<Positional>,
    pub optional: Vec<Positional>,
    pub deprecated: bool,
    pub is_default: bool,
    pub(crate) builder: BuilderFn,
    pub(crate) handler: HandlerFn,
    pub(crate) middleware: Vec<Middleware>,
}

impl fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHandler")
            .field("original", &self.original)
            .field("aliases", &self.aliases)
            .field("demanded", &self.demanded)
            .field("optional", &self.optional)
            .field("is_default", &self.is_default)
            .finish_non_exhaustive()
    }
}

/// Handlers by primary name, secondary names, and the default command.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    handlers: IndexMap<String, Rc<CommandHandler>>,
    alias_map: IndexMap<String, String>,
    default_command: Option<Rc<CommandHandler>>,
}

impl CommandRegistry {
    pub fn add(&mut self, command: Command) -> Result<()> {
        let parsed = parse_command(&command.cmd)?;
        let aliases = command
            .aliases
            .iter()
            .map(|a| parse_command(a).map(|p| p.name))
            .collect::<Result<Vec<_>>>()?;

        let mut is_default = false;
        let mut names: Vec<String> = std::iter::once(parsed.name.clone())
            .chain(aliases.iter().cloned())
            .filter(|name| {
                let marker = is_default_marker(name);
                is_default |= marker;
                !marker
            })
            .collect();
        if names.is_empty() && is_default {
            names.push(DEFAULT_COMMAND.to_string());
        }

        let (name, aliases, original) = if is_default {
            let name = names.remove(0);
            let original = replace_default_marker(&command.cmd, &name);
            (name, names, original)
        } else {
            (parsed.name, aliases, command.cmd.clone())
        };

        for alias in &aliases {
            self.alias_map.insert(alias.clone(), name.clone());
        }

        let handler = Rc::new(CommandHandler {
            original,
            name: name.clone(),
            aliases,
            desc: command.desc,
            demanded: parsed.demanded,
            optional: parsed.optional,
            deprecated: command.deprecated,
            is_default,
            builder: command.builder,
            handler: command.handler,
            middleware: command.middleware,
        });
        if is_default {
            self.default_command = Some(handler.clone());
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Primary name, then secondary name, then the default command.
    pub fn lookup(&self, name: Option<&str>) -> Option<Rc<CommandHandler>> {
        name.and_then(|n| {
            self.handlers
                .get(n)
                .or_else(|| self.alias_map.get(n).and_then(|p| self.handlers.get(p)))
        })
        .or(self.default_command.as_ref())
        .cloned()
    }

    /// Every name a command can be invoked by.
    pub fn names(&self) -> Vec<String> {
        self.handlers
            .keys()
            .chain(self.alias_map.keys())
            .cloned()
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name) || self.alias_map.contains_key(name)
    }

    pub fn has_default_command(&self) -> bool {
        self.default_command.is_some()
    }

    pub fn default_command(&self) -> Option<Rc<CommandHandler>> {
        self.default_command.clone()
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Rc<CommandHandler>> {
        self.handlers.values()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
        self.alias_map.clear();
        self.default_command = None;
    }
}

fn replace_default_marker(cmd: &str, name: &str) -> String {
    let trimmed = cmd.trim_start();
    if let Some(rest) = trimmed.strip_prefix('*') {
        format!("{name}{rest}")
    } else if let Some(rest) = trimmed.strip_prefix(DEFAULT_COMMAND) {
        format!("{name}{rest}")
    } else {
        cmd.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(commands: Vec<Command>) -> CommandRegistry {
        let mut registry = CommandRegistry::default();
        for command in commands {
            registry.add(command).unwrap();
        }
        registry
    }

    #[test]
    fn lookup_by_name_alias_then_default() {
        let registry = registry(vec![
            Command::new("* [name]"),
            Command::new("run <name>").alias("r").alias("go"),
        ]);
        assert_eq!(registry.lookup(Some("run")).unwrap().name, "run");
        assert_eq!(registry.lookup(Some("go")).unwrap().name, "run");
        let fallback = registry.lookup(Some("other")).unwrap();
        assert_eq!(fallback.name, "$0");
        assert_eq!(fallback.original, "$0 [name]");
        assert_eq!(registry.lookup(None).unwrap().name, "$0");
        assert_eq!(registry.names(), vec!["$0", "run", "r", "go"]);
    }

    #[test]
    fn default_alias_makes_named_command_default() {
        let registry = registry(vec![Command::new("serve [port]").alias("*")]);
        let default = registry.default_command().unwrap();
        assert_eq!(default.name, "serve");
        assert_eq!(default.original, "serve [port]");
        assert!(default.aliases.is_empty());
        assert!(!registry.contains("*"));
    }

    #[test]
    fn re_registering_replaces() {
        let registry = registry(vec![
            Command::new("build <src>").describe("old"),
            Command::new("build <src> [dest]").describe("new"),
        ]);
        let handler = registry.lookup(Some("build")).unwrap();
        assert_eq!(handler.desc.as_deref(), Some("new"));
        assert_eq!(handler.optional.len(), 1);
    }

    #[test]
    fn empty_command_string_is_rejected() {
        let mut registry = CommandRegistry::default();
        assert!(registry.add(Command::new("")).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn no_default_means_no_fallback() {
        let registry = registry(vec![Command::new("run")]);
        assert!(registry.lookup(Some("walk")).is_none());
        assert!(!registry.has_default_command());
    }
}
