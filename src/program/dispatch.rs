//! Recursive command dispatch.
//!
//! `run` parses the tokens against the current declarations and either hands
//! off to a matched command or validates the bare result. `run_command`
//! resets the program, runs the command's builder and recurses into `run`
//! with the command path one token deeper. Only the innermost command that
//! reaches its handler populates positionals, validates and runs middleware;
//! enclosing levels see `has_output` and pass the result through.

use std::rc::Rc;

use indexmap::IndexSet;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Parsed, Program, ProgramOptions};
use crate::arguments::Arguments;
use crate::command::positional::{merge_positionals, synthetic_tokens, take_positionals};
use crate::command::{CommandHandler, DEFAULT_COMMAND, cmd_to_parse_options};
use crate::deferred::Deferred;
use crate::error::{Error, Result};
use crate::middleware::{Middleware, apply_middleware};
use crate::parser::strings::{
    is_safe_numeric_literal, number_value, parse_number, str_looks_like_number, value_to_string,
};
use crate::parser::{ArrayOption, Parser};
use crate::usage::{HelpCommand, HelpOption, HelpPage};
use crate::validation::ValidationRequest;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    /// Index into `_` where command matching starts.
    command_index: usize,
    nested: bool,
    /// Run builders only, so help reflects the command's declarations.
    help_only: bool,
}

impl Frame {
    pub(crate) fn top(help_only: bool) -> Self {
        Frame {
            command_index: 0,
            nested: false,
            help_only,
        }
    }
}

impl Program {
    pub(crate) fn run(&self, tokens: Vec<String>, frame: Frame) -> Deferred<Arguments> {
        let (parser_options, help_opt, version_opt, script_name) = {
            let s = self.inner.borrow();
            (
                s.options.parser_options(),
                s.help_opt.clone(),
                s.version_opt.clone(),
                s.script_name.clone(),
            )
        };
        let detailed = Parser::new(self.platform.clone()).detailed(tokens, &parser_options);
        let mut argv = detailed.argv;
        argv.insert("$0".to_string(), Value::String(script_name));

        let is_set = |key: &Option<String>| {
            key.as_deref()
                .is_some_and(|k| argv.get(k) == Some(&Value::Bool(true)))
        };
        let mut help_set = is_set(&help_opt);
        let version_set = is_set(&version_opt);

        // `app serve help` asks for help as well
        if let Some(help) = &help_opt {
            let last = argv.positionals().last().map(value_to_string);
            let matches = last.is_some_and(|token| {
                std::iter::once(help)
                    .chain(detailed.aliases.get(help).into_iter().flatten())
                    .any(|spelling| spelling.len() > 1 && *spelling == token)
            });
            if matches {
                let mut positionals = argv.positionals().to_vec();
                positionals.pop();
                argv.set_positionals(positionals);
                help_set = true;
            }
        }

        self.warn_deprecated(&argv, &detailed.defaulted);
        {
            let mut s = self.inner.borrow_mut();
            s.parsed = Some(Parsed {
                aliases: detailed.aliases,
                new_aliases: detailed.new_aliases,
                error: detailed.error,
            });
            if frame.command_index == 0 {
                s.usage.borrow_mut().clear_cached_help_message();
            }
        }

        let (names, has_default) = {
            let s = self.inner.borrow();
            (s.commands.names(), s.commands.has_default_command())
        };
        let help_or_version = help_set || version_set || frame.help_only;

        if let Some(token) = argv.positionals().get(frame.command_index).map(value_to_string)
            && token != DEFAULT_COMMAND
            && names.contains(&token)
        {
            debug!(command = %token, index = frame.command_index, "matched command");
            let inner = self.run_command(Some(token), frame.command_index + 1, frame, help_or_version);
            return self.post_process(inner, frame.nested, false);
        }

        let only_default = names.len() == 1 && names[0] == DEFAULT_COMMAND;
        if has_default && !(help_set && !only_default) {
            debug!("running default command");
            let inner = self.run_command(None, 0, frame, help_or_version);
            return self.post_process(inner, frame.nested, false);
        }

        let mut skip_validation = frame.nested || frame.help_only;
        let mut shown = false;
        if !frame.help_only && !self.has_output() && (help_set || version_set) {
            let text = if help_set {
                self.help_text()
            } else {
                self.version_text()
            };
            self.platform.write_out(&text);
            let exit = {
                let mut s = self.inner.borrow_mut();
                s.has_output = true;
                s.exit_process
            };
            if exit {
                self.platform.exit(0);
            }
            skip_validation = true;
            shown = true;
        }

        if !skip_validation {
            let s = self.inner.borrow();
            skip_validation = s
                .options
                .skip_validation
                .iter()
                .any(|k| argv.get(k) == Some(&Value::Bool(true)));
        }

        let mut chain = Deferred::ready(argv);
        if !skip_validation {
            if let Some(error) = self.take_parse_error() {
                return Deferred::err(error);
            }
            chain = apply_middleware(chain, self, &self.middleware_entries(), true);
            let program = self.clone();
            chain = chain.and_then(move |argv| {
                match program.validate(&argv, &IndexSet::new(), false) {
                    Ok(()) => Deferred::ready(argv),
                    Err(e) => Deferred::err(e),
                }
            });
        }
        self.post_process(chain, frame.nested, !shown && !frame.help_only)
    }

    fn run_command(
        &self,
        name: Option<String>,
        command_index: usize,
        frame: Frame,
        help_or_version: bool,
    ) -> Deferred<Arguments> {
        let found = self.inner.borrow().commands.lookup(name.as_deref());
        let Some(handler) = found else {
            return Deferred::err(Error::Usage(format!(
                "Unknown command: {}",
                name.unwrap_or_default()
            )));
        };
        let is_default = name.is_none();
        let parents = {
            let mut s = self.inner.borrow_mut();
            let parents = s.context.commands.clone();
            if let Some(name) = name {
                s.context.commands.push(name);
                s.context.full_commands.push(handler.original.clone());
            }
            parents
        };
        if handler.deprecated {
            warn!(command = %handler.name, "command is deprecated");
        }

        let aliases = self.parsed_aliases();
        self.reset_with(&aliases);
        let built = (handler.builder)(self, help_or_version);

        let program = self.clone();
        let popping = self.clone();
        built
            .and_then(move |()| {
                let misuse = program.inner.borrow_mut().usage_error.take();
                if let Some(error) = misuse {
                    return Deferred::err(error);
                }
                program.set_command_usage(&parents, &handler);
                let tokens = program.inner.borrow().process_args.clone();
                let inner = Frame {
                    command_index,
                    nested: true,
                    help_only: frame.help_only,
                };
                let next = program.clone();
                program
                    .run(tokens, inner)
                    .and_then(move |argv| next.apply_command(argv, handler, is_default, frame.help_only))
            })
            .finally(move || {
                if !is_default {
                    let mut s = popping.inner.borrow_mut();
                    s.context.commands.pop();
                    s.context.full_commands.pop();
                }
            })
    }

    fn apply_command(
        &self,
        mut argv: Arguments,
        handler: Rc<CommandHandler>,
        is_default: bool,
        help_only: bool,
    ) -> Deferred<Arguments> {
        if help_only {
            return Deferred::ready(argv);
        }
        let positional_keys = if self.has_output() {
            IndexSet::new()
        } else {
            match self.populate_positionals(&handler, &mut argv) {
                Ok(keys) => keys,
                Err(e) => return Deferred::err(e),
            }
        };

        let middleware: Vec<Middleware> = self
            .middleware_entries()
            .into_iter()
            .chain(handler.middleware.iter().cloned())
            .collect();
        let program = self.clone();
        apply_middleware(Deferred::ready(argv), self, &middleware, true).and_then(move |argv| {
            program.finish_command(argv, &handler, is_default, &middleware, &positional_keys)
        })
    }

    fn finish_command(
        &self,
        argv: Arguments,
        handler: &CommandHandler,
        is_default: bool,
        middleware: &[Middleware],
        positional_keys: &IndexSet<String>,
    ) -> Deferred<Arguments> {
        if self.has_output() {
            return Deferred::ready(argv);
        }
        if let Some(error) = self.take_parse_error() {
            return Deferred::err(error);
        }
        if let Err(e) = self.validate(&argv, positional_keys, is_default) {
            return Deferred::err(e);
        }

        self.inner.borrow_mut().has_output = true;
        debug!(command = %handler.name, "running handler");
        let run_handler = handler.handler.clone();
        let result = apply_middleware(
            Deferred::ready(parse_positional_numbers(argv)),
            self,
            middleware,
            false,
        )
        .and_then(move |argv| {
            let result = argv.clone();
            run_handler(argv).map(move |()| result)
        });
        if !is_default {
            self.cache_help();
        }
        result
    }

    /// Move the tokens after the command path onto the command's positional
    /// keys and coerce them like flags.
    fn populate_positionals(
        &self,
        handler: &CommandHandler,
        argv: &mut Arguments,
    ) -> Result<IndexSet<String>> {
        let (context, validation) = {
            let s = self.inner.borrow();
            (s.context.commands.clone(), s.validation.clone())
        };
        let mut rest: Vec<Value> = argv.positionals().iter().skip(context.len()).cloned().collect();
        validation.positional_count(handler.demanded.len(), rest.len())?;

        let map = take_positionals(handler, &mut rest);
        let positionals = context
            .iter()
            .cloned()
            .map(Value::String)
            .chain(rest.iter().map(|v| Value::String(value_to_string(v))))
            .collect();
        argv.set_positionals(positionals);

        let tokens = synthetic_tokens(&map);
        if tokens.is_empty() {
            return Ok(map.keys().cloned().collect());
        }

        let hints = cmd_to_parse_options(&handler.original);
        let mut parser_options = self.inner.borrow().options.parser_options();
        for (key, value) in hints.default {
            parser_options.default.entry(key).or_insert(value);
        }
        for (key, aliases) in hints.aliases {
            parser_options.aliases.entry(key).or_default().extend(aliases);
        }
        parser_options
            .array
            .extend(hints.array.iter().map(|k| ArrayOption::from(k.as_str())));

        let reparsed = Parser::new(self.platform.clone()).detailed(tokens, &parser_options);
        if let Some(error) = reparsed.error {
            return Err(error);
        }
        let s = self.inner.borrow();
        Ok(merge_positionals(
            argv,
            &map,
            &reparsed.argv,
            &reparsed.aliases,
            |key| s.options.is_in_configs(key) || s.options.is_defaulted(key),
        ))
    }

    /// Top-level finishing: numeric positionals, then the global
    /// after-validation middleware when no command ran.
    fn post_process(&self, argv: Deferred<Arguments>, nested: bool, run_global: bool) -> Deferred<Arguments> {
        if nested {
            return argv;
        }
        let program = self.clone();
        argv.map(parse_positional_numbers).and_then(move |argv| {
            if !run_global {
                return Deferred::ready(argv);
            }
            let entries = program.middleware_entries();
            apply_middleware(Deferred::ready(argv), &program, &entries, false)
        })
    }

    fn validate(
        &self,
        argv: &Arguments,
        positional_keys: &IndexSet<String>,
        is_default_command: bool,
    ) -> Result<()> {
        let s = self.inner.borrow();
        let empty = Parsed::default();
        let parsed = s.parsed.as_ref().unwrap_or(&empty);
        let command_names = s.commands.names();
        let request = ValidationRequest {
            argv,
            options: &s.options,
            aliases: &parsed.aliases,
            new_aliases: &parsed.new_aliases,
            positional_keys,
            command_names: &command_names,
            context_commands: &s.context.commands,
            strict: s.strict,
            strict_commands: s.strict_commands,
            strict_options: s.strict_options,
            is_default_command,
        };
        s.validation.validate(&request)
    }

    fn set_command_usage(&self, parents: &[String], handler: &CommandHandler) {
        let mut s = self.inner.borrow_mut();
        if s.usage_line.is_some() {
            return;
        }
        let own = handler
            .original
            .strip_prefix(DEFAULT_COMMAND)
            .map_or(handler.original.as_str(), str::trim);
        let mut parts: Vec<&str> = vec![DEFAULT_COMMAND];
        parts.extend(parents.iter().map(String::as_str));
        if !own.is_empty() {
            parts.push(own);
        }
        s.usage_line = Some((parts.join(" "), handler.desc.clone()));
    }

    fn warn_deprecated(&self, argv: &Arguments, defaulted: &IndexSet<String>) {
        let s = self.inner.borrow();
        for (key, message) in &s.options.deprecated_options {
            if !argv.contains_key(key) || defaulted.contains(key) {
                continue;
            }
            match message {
                Some(message) => warn!(option = %key, "option is deprecated: {message}"),
                None => warn!(option = %key, "option is deprecated"),
            }
        }
    }

    fn take_parse_error(&self) -> Option<Error> {
        self.inner
            .borrow_mut()
            .parsed
            .as_mut()
            .and_then(|p| p.error.take())
    }

    fn middleware_entries(&self) -> Vec<Middleware> {
        self.inner.borrow().middleware.entries().to_vec()
    }

    fn has_output(&self) -> bool {
        self.inner.borrow().has_output
    }

    /// What help shows for the current level.
    pub fn help_page(&self) -> HelpPage {
        let s = self.inner.borrow();
        let script = s.script_name.as_str();
        let prefix = std::iter::once(script)
            .chain(s.context.commands.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        let (usage, description) = match &s.usage_line {
            Some((line, desc)) => (line.replacen(DEFAULT_COMMAND, script, 1), desc.clone()),
            None if s.commands.is_empty() => (prefix.clone(), None),
            None => (format!("{prefix} <command>"), None),
        };

        let commands = s
            .commands
            .handlers()
            .map(|h| HelpCommand {
                cmd: match h.original.strip_prefix(DEFAULT_COMMAND) {
                    Some(rest) => format!("{prefix}{rest}"),
                    None => format!("{prefix} {}", h.original),
                },
                desc: h.desc.clone(),
                aliases: h.aliases.clone(),
                is_default: h.is_default,
                deprecated: h.deprecated,
            })
            .collect();

        let o = &s.options;
        let trailing: Vec<&str> = [s.help_opt.as_deref(), s.version_opt.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        let options = o
            .key
            .iter()
            .map(String::as_str)
            .filter(|k| !trailing.contains(k))
            .chain(trailing.iter().copied())
            .filter(|k| *k != "_" && o.key.contains(*k) && !o.hidden.iter().any(|h| h == k))
            .map(|key| HelpOption {
                key: key.to_string(),
                aliases: o.aliases.get(key).cloned().unwrap_or_default(),
                type_label: type_label(o, key),
                desc: o.descriptions.get(key).cloned(),
                default: o.default.get(key).cloned(),
                required: o.demanded_options.contains_key(key),
                choices: o.choices.get(key).cloned().unwrap_or_default(),
                deprecated: o.deprecated_options.contains_key(key),
            })
            .collect();

        HelpPage {
            usage,
            description,
            commands,
            options,
        }
    }

    pub(crate) fn help_text(&self) -> String {
        let page = self.help_page();
        let usage = self.inner.borrow().usage.clone();
        usage.borrow().help(&page)
    }

    fn version_text(&self) -> String {
        let (usage, version) = {
            let s = self.inner.borrow();
            (s.usage.clone(), s.version.clone().unwrap_or_default())
        };
        usage.borrow().version(&version)
    }

    fn cache_help(&self) {
        let page = self.help_page();
        let usage = self.inner.borrow().usage.clone();
        usage.borrow_mut().cache_help_message(&page);
    }
}

fn type_label(o: &ProgramOptions, key: &str) -> Option<&'static str> {
    let has = |list: &[String]| list.iter().any(|k| k == key);
    if has(&o.boolean) {
        Some("boolean")
    } else if has(&o.count) {
        Some("count")
    } else if has(&o.array) {
        Some("array")
    } else if has(&o.number) {
        Some("number")
    } else if has(&o.string) {
        Some("string")
    } else {
        None
    }
}

/// Numeric-looking strings in `_` become numbers. `--` keeps its raw tokens.
fn parse_positional_numbers(mut argv: Arguments) -> Arguments {
    if let Some(Value::Array(items)) = argv.get_mut("_") {
        for item in items.iter_mut() {
            let number = match item {
                Value::String(s) if str_looks_like_number(s) && is_safe_numeric_literal(s) => {
                    parse_number(s)
                }
                _ => None,
            };
            if let Some(n) = number {
                *item = number_value(n);
            }
        }
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::platform::Platform;
    use crate::program::{OptionDefinition, OptionType};
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct Recorder {
        out: RefCell<Vec<String>>,
        exits: RefCell<Vec<i32>>,
    }

    impl Platform for Recorder {
        fn env_var(&self, _key: &str) -> Option<String> {
            None
        }

        fn process_args(&self) -> Vec<String> {
            vec!["serve".into(), "8080".into()]
        }

        fn script_name(&self) -> String {
            "app".into()
        }

        fn write_out(&self, text: &str) {
            self.out.borrow_mut().push(text.to_string());
        }

        fn exit(&self, code: i32) {
            self.exits.borrow_mut().push(code);
        }
    }

    fn program() -> (Program, Rc<Recorder>) {
        let recorder = Rc::new(Recorder::default());
        (Program::with_platform(recorder.clone()), recorder)
    }

    #[test]
    fn command_positionals_are_populated() {
        let (p, _) = program();
        p.command(Command::new("foo <bar> [baz..]"));
        let argv = p.parse_sync("foo 1 2 3").unwrap();
        assert_eq!(argv["bar"], json!(1));
        assert_eq!(argv["baz"], json!([2, 3]));
        assert_eq!(argv["_"], json!(["foo"]));
        assert_eq!(argv["$0"], json!("app"));
    }

    #[test]
    fn missing_demanded_positional_fails_before_handler() {
        let (p, _) = program();
        let called = Rc::new(Cell::new(false));
        let seen = Rc::new(RefCell::new(None));
        let flag = called.clone();
        let sink = seen.clone();
        p.command(Command::new("foo <root> <files..>").handler(move |_| {
            flag.set(true);
            Ok(())
        }))
        .fail(move |msg, _| *sink.borrow_mut() = msg.map(str::to_string));

        let err = p.parse_sync("foo /root").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Not enough non-option arguments: got 1, need at least 2"
        );
        assert!(!called.get());
        assert_eq!(seen.borrow().as_deref(), Some(err.to_string().as_str()));
    }

    #[test]
    fn default_command_runs_when_nothing_matches() {
        let (p, _) = program();
        let ran = Rc::new(RefCell::new(Vec::new()));
        let on_default = ran.clone();
        let on_run = ran.clone();
        p.command(Command::new("*").handler(move |_| {
            on_default.borrow_mut().push("default".to_string());
            Ok(())
        }))
        .command(Command::new("run <name>").handler(move |argv| {
            on_run
                .borrow_mut()
                .push(format!("run {}", argv.get_str("name").unwrap_or_default()));
            Ok(())
        }));

        p.parse_sync("run Turner").unwrap();
        p.parse_sync("other").unwrap();
        assert_eq!(*ran.borrow(), vec!["run Turner", "default"]);
    }

    #[test]
    fn nested_commands_consume_their_path() {
        let (p, _) = program();
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        p.command(Command::new("remote").builder(move |program, _| {
            let sink = sink.clone();
            program.command(Command::new("add <name>").handler(move |argv| {
                *sink.borrow_mut() = Some(argv.clone());
                Ok(())
            }));
            Ok(())
        }));

        let argv = p.parse_sync("remote add origin").unwrap();
        assert_eq!(argv["name"], json!("origin"));
        assert_eq!(argv["_"], json!(["remote", "add"]));
        assert_eq!(seen.borrow().as_ref().map(|a| a["name"].clone()), Some(json!("origin")));
        assert!(p.context_commands().is_empty());
    }

    #[test]
    fn later_tokens_do_not_match_commands() {
        let (p, _) = program();
        let called = Rc::new(Cell::new(false));
        let flag = called.clone();
        p.command(Command::new("foo").handler(move |_| {
            flag.set(true);
            Ok(())
        }));
        let argv = p.parse_sync("bar foo").unwrap();
        assert!(!called.get());
        assert_eq!(argv["_"], json!(["bar", "foo"]));
    }

    #[test]
    fn strict_options_rejects_only_undeclared_flags() {
        let (p, _) = program();
        p.strict_options(true).option(
            "verbose",
            OptionDefinition::new().of_type(OptionType::Boolean).alias("v"),
        );
        assert!(p.parse_sync("-v --verbose extra").is_ok());
        let err = p.parse_sync("--nope").unwrap_err();
        assert_eq!(err.to_string(), "Unknown argument: nope");
    }

    #[test]
    fn coerce_runs_once_for_an_alias_group() {
        let (p, _) = program();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        p.option(
            "file",
            OptionDefinition::new().alias("f").coerce(move |v| {
                counter.set(counter.get() + 1);
                Ok(json!(value_to_string(&v).to_uppercase()))
            }),
        );
        let argv = p.parse_sync("-f a.txt").unwrap();
        assert_eq!(argv["file"], json!("A.TXT"));
        assert_eq!(argv["f"], json!("A.TXT"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn failed_check_reports_its_name() {
        let (p, _) = program();
        p.number("n")
            .check("positive", |argv| Ok(argv.get_i64("n").unwrap_or(0) > 0));
        assert!(p.parse_sync("--n 3").is_ok());
        let err = p.parse_sync("--n 0").unwrap_err();
        assert_eq!(err.to_string(), "Argument check failed: positive");
    }

    #[test]
    fn double_dash_keeps_raw_tokens() {
        let (p, _) = program();
        let argv = p.parse_sync("a -- 12 007").unwrap();
        assert_eq!(argv["_"], json!(["a"]));
        assert_eq!(argv["--"], json!(["12", "007"]));

        let argv = p.parse_sync("5 -- 6").unwrap();
        assert_eq!(argv["_"], json!([5]));
        assert_eq!(argv["--"], json!(["6"]));
    }

    #[test]
    fn coerce_error_reaches_fail_handlers() {
        let (p, _) = program();
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        p.coerce("port", |_| Err(anyhow::anyhow!("bad port")))
            .fail(move |msg, _| *sink.borrow_mut() = msg.map(str::to_string));

        let err = p.parse_sync("--port 80").unwrap_err();
        assert_eq!(err.to_string(), "bad port");
        assert!(matches!(err, Error::Coerce { ref key, .. } if key == "port"));
        assert_eq!(seen.borrow().as_deref(), Some("bad port"));
    }

    #[tokio::test]
    async fn async_coerce_updates_every_alias() {
        let (p, _) = program();
        p.option("file", OptionDefinition::new().alias("f"))
            .coerce_async("file", |v| async move {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                Ok::<_, anyhow::Error>(json!(value_to_string(&v).to_uppercase()))
            });

        assert!(!p.parse("").is_pending());
        let pending = p.parse("-f a.txt");
        assert!(pending.is_pending());
        let argv = pending.await.unwrap();
        assert_eq!(argv["file"], json!("A.TXT"));
        assert_eq!(argv["f"], json!("A.TXT"));
    }

    #[tokio::test]
    async fn async_coerce_error_is_a_coerce_error() {
        let (p, _) = program();
        p.coerce_async("port", |_| async { Err::<Value, _>(anyhow::anyhow!("lookup failed")) });
        let err = p.parse_async("--port 1").await.unwrap_err();
        assert_eq!(err.to_string(), "lookup failed");
        assert!(matches!(err, Error::Coerce { ref key, .. } if key == "port"));
    }

    #[tokio::test]
    async fn async_check_reports_its_name() {
        let (p, _) = program();
        p.number("n").check_async("positive", |argv| async move {
            Ok::<_, anyhow::Error>(argv.get_i64("n").unwrap_or(0) > 0)
        });
        assert!(p.parse_async("--n 3").await.is_ok());
        let err = p.parse_async("--n 0").await.unwrap_err();
        assert_eq!(err.to_string(), "Argument check failed: positive");
    }

    #[test]
    fn local_check_stays_in_its_command() {
        let (p, _) = program();
        p.command(Command::new("a").builder(|program, _| {
            program.middleware(Middleware::check("only-a", |_| Ok(false)).local());
            Ok(())
        }))
        .command(Command::new("b"));

        let err = p.parse_sync("a").unwrap_err();
        assert_eq!(err.to_string(), "Argument check failed: only-a");
        assert!(p.parse_sync("b").is_ok());
    }

    #[test]
    fn top_level_local_check_is_dropped_inside_commands() {
        let (p, _) = program();
        p.middleware(Middleware::check("top", |_| Ok(false)).local())
            .command(Command::new("serve"));
        assert!(p.parse_sync("serve").is_ok());
        let err = p.parse_sync("").unwrap_err();
        assert_eq!(err.to_string(), "Argument check failed: top");
    }

    #[test]
    fn demanded_commands_and_skip_validation() {
        let (p, _) = program();
        p.demand_command(1, None).skip_validation("force");
        let err = p.parse_sync("").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Not enough non-option arguments: got 0, need at least 1"
        );
        assert!(p.parse_sync("--force").is_ok());
    }

    #[test]
    fn parses_do_not_leak_builder_state() {
        let (p, _) = program();
        p.command(Command::new("one").builder(|program, _| {
            program
                .command(Command::new("inner"))
                .option("local", OptionDefinition::new().global(false))
                .middleware(Middleware::new(|_, _| {
                    let mut partial = Arguments::default();
                    partial.insert("leaked".into(), json!(true));
                    Ok(partial)
                }));
            Ok(())
        }));

        let first = p.parse_sync("one").unwrap();
        assert_eq!(first["leaked"], json!(true));
        assert_eq!(p.command_names(), vec!["one"]);
        assert!(!p.options().key.contains("local"));

        p.command(Command::new("two"));
        let second = p.parse_sync("two").unwrap();
        assert!(second.get("leaked").is_none());
        assert_eq!(p.command_names(), vec!["one", "two"]);
        assert!(p.inner.borrow().frozen.is_empty());
    }

    #[test]
    fn command_help_is_written_and_exits() {
        let (p, recorder) = program();
        p.command(
            Command::new("serve [port]")
                .describe("start the server")
                .builder(|program, _| {
                    program.positional(
                        "port",
                        OptionDefinition::new()
                            .of_type(OptionType::Number)
                            .describe("port to bind"),
                    );
                    Ok(())
                }),
        );
        p.parse_sync("serve --help").unwrap();
        assert_eq!(*recorder.exits.borrow(), vec![0]);
        let out = recorder.out.borrow();
        assert!(out[0].starts_with("app serve [port]\n\nstart the server"));
        assert!(out[0].contains("--port  port to bind [number]"));
    }

    #[test]
    fn version_is_printed() {
        let (p, recorder) = program();
        p.version("1.2.3").exit_process(false);
        p.parse_sync("--version").unwrap();
        assert_eq!(*recorder.out.borrow(), vec!["1.2.3"]);
        assert!(recorder.exits.borrow().is_empty());
    }

    #[test]
    fn positional_outside_builder_is_a_usage_error() {
        let (p, _) = program();
        p.positional("x", OptionDefinition::new());
        let err = p.parse_sync("").unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
        assert!(p.parse_sync("").is_ok());
    }

    #[test]
    fn get_help_lists_commands() {
        let (p, _) = program();
        p.command(Command::new("serve").describe("start"));
        let text = p.get_help().into_ready().unwrap().unwrap();
        assert!(text.starts_with("app <command>"));
        assert!(text.contains("app serve  start"));
        assert!(text.contains("--help"));
    }

    #[tokio::test]
    async fn async_step_turns_parse_into_future() {
        let (p, _) = program();
        p.number("n");
        assert!(!p.parse("--n 2").is_pending());

        p.middleware(Middleware::new_async(|argv, _| async move {
            let mut partial = Arguments::default();
            partial.insert("doubled".into(), json!(argv.get_i64("n").unwrap_or(0) * 2));
            Ok(partial)
        }));
        let pending = p.parse("--n 2");
        assert!(pending.is_pending());
        assert_eq!(pending.await.unwrap()["doubled"], json!(4));

        assert!(matches!(p.parse_sync("--n 2"), Err(Error::AsyncInSyncParse)));
        assert!(p.inner.borrow().frozen.is_empty());
    }

    #[tokio::test]
    async fn async_handler_resolves_with_arguments() {
        let (p, _) = program();
        let seen = Rc::new(Cell::new(0));
        let sink = seen.clone();
        p.command(Command::new("wait <ms>").handler_async(move |argv| {
            let sink = sink.clone();
            async move {
                let ms = argv.get_i64("ms").unwrap_or(0);
                tokio::time::sleep(std::time::Duration::from_millis(ms as u64)).await;
                sink.set(ms);
                Ok(())
            }
        }));
        let argv = p.parse_async("wait 3").await.unwrap();
        assert_eq!(argv["ms"], json!(3));
        assert_eq!(seen.get(), 3);
        assert!(p.context_commands().is_empty());
    }
}
