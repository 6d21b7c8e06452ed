//! Help text, failure routing and the cached help of the last command run.

use std::fmt::Write as _;
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::error::Error;

/// Observes a failure before it reaches the caller of `parse`.
pub type FailFn = Rc<dyn Fn(Option<&str>, &Error)>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HelpCommand {
    pub cmd: String,
    pub desc: Option<String>,
    pub aliases: Vec<String>,
    pub is_default: bool,
    pub deprecated: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HelpOption {
    pub key: String,
    pub aliases: Vec<String>,
    pub type_label: Option<&'static str>,
    pub desc: Option<String>,
    pub default: Option<Value>,
    pub required: bool,
    pub choices: Vec<Value>,
    pub deprecated: bool,
}

/// Snapshot of what help should show for the current command path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HelpPage {
    /// `$0 serve [port]`, already expanded.
    pub usage: String,
    pub description: Option<String>,
    pub commands: Vec<HelpCommand>,
    pub options: Vec<HelpOption>,
}

pub trait Usage {
    fn add_fail_handler(&mut self, handler: FailFn);

    /// Route a failure through the registered handlers, newest first.
    fn fail(&self, message: Option<&str>, error: &Error);

    fn help(&self, page: &HelpPage) -> String;

    fn version(&self, version: &str) -> String {
        version.to_string()
    }

    fn cache_help_message(&mut self, page: &HelpPage);

    fn cached_help_message(&self) -> Option<String>;

    fn clear_cached_help_message(&mut self);

    fn freeze(&mut self);

    fn unfreeze(&mut self);
}

#[derive(Clone, Default)]
struct Snapshot {
    fails: Vec<FailFn>,
    cached: Option<String>,
}

#[derive(Default)]
pub struct DefaultUsage {
    current: Snapshot,
    frozen: Vec<Snapshot>,
}

impl DefaultUsage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for DefaultUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultUsage")
            .field("fail_handlers", &self.current.fails.len())
            .field("cached", &self.current.cached)
            .field("frozen", &self.frozen.len())
            .finish()
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

impl Usage for DefaultUsage {
    fn add_fail_handler(&mut self, handler: FailFn) {
        self.current.fails.push(handler);
    }

    fn fail(&self, message: Option<&str>, error: &Error) {
        for handler in self.current.fails.iter().rev() {
            handler(message, error);
        }
        debug!(message = message.unwrap_or_default(), "parse failed");
    }

    fn help(&self, page: &HelpPage) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", page.usage);
        if let Some(desc) = &page.description {
            let _ = write!(out, "\n{desc}\n");
        }

        if !page.commands.is_empty() {
            out.push_str("\nCommands:\n");
            let width = page.commands.iter().map(|c| c.cmd.len()).max().unwrap_or(0);
            for command in &page.commands {
                let mut notes = Vec::new();
                if command.is_default {
                    notes.push("[default]".to_string());
                }
                if !command.aliases.is_empty() {
                    notes.push(format!("[aliases: {}]", command.aliases.join(", ")));
                }
                if command.deprecated {
                    notes.push("[deprecated]".to_string());
                }
                let desc = command.desc.as_deref().unwrap_or_default();
                let line = format!("  {:width$}  {desc} {}", command.cmd, notes.join(" "));
                let _ = writeln!(out, "{}", line.trim_end());
            }
        }

        if !page.options.is_empty() {
            out.push_str("\nOptions:\n");
            let labels: Vec<String> = page
                .options
                .iter()
                .map(|o| {
                    let mut names: Vec<&String> = o.aliases.iter().filter(|a| a.len() == 1).collect();
                    names.push(&o.key);
                    names.extend(o.aliases.iter().filter(|a| a.len() > 1));
                    names
                        .iter()
                        .map(|n| if n.len() == 1 { format!("-{n}") } else { format!("--{n}") })
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .collect();
            let width = labels.iter().map(String::len).max().unwrap_or(0);
            for (option, label) in page.options.iter().zip(&labels) {
                let mut notes = Vec::new();
                if let Some(t) = option.type_label {
                    notes.push(format!("[{t}]"));
                }
                if option.deprecated {
                    notes.push("[deprecated]".to_string());
                }
                if !option.choices.is_empty() {
                    let choices: Vec<String> = option.choices.iter().map(render_value).collect();
                    notes.push(format!("[choices: {}]", choices.join(", ")));
                }
                if let Some(default) = &option.default {
                    notes.push(format!("[default: {}]", render_value(default)));
                }
                if option.required {
                    notes.push("[required]".to_string());
                }
                let desc = option.desc.as_deref().unwrap_or_default();
                let line = format!("  {label:width$}  {desc} {}", notes.join(" "));
                let _ = writeln!(out, "{}", line.trim_end());
            }
        }
        out.trim_end().to_string()
    }

    fn cache_help_message(&mut self, page: &HelpPage) {
        self.current.cached = Some(self.help(page));
    }

    fn cached_help_message(&self) -> Option<String> {
        self.current.cached.clone()
    }

    fn clear_cached_help_message(&mut self) {
        self.current.cached = None;
    }

    fn freeze(&mut self) {
        self.frozen.push(self.current.clone());
    }

    fn unfreeze(&mut self) {
        if let Some(previous) = self.frozen.pop() {
            self.current = previous;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn page() -> HelpPage {
        HelpPage {
            usage: "app serve [port]".into(),
            description: Some("run the server".into()),
            commands: vec![HelpCommand {
                cmd: "app status".into(),
                desc: Some("show status".into()),
                aliases: vec!["st".into()],
                ..Default::default()
            }],
            options: vec![
                HelpOption {
                    key: "port".into(),
                    aliases: vec!["p".into()],
                    type_label: Some("number"),
                    desc: Some("listen port".into()),
                    default: Some(json!(8080)),
                    ..Default::default()
                },
                HelpOption {
                    key: "mode".into(),
                    type_label: Some("string"),
                    choices: vec![json!("dev"), json!("prod")],
                    required: true,
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn renders_sections() {
        let text = DefaultUsage::new().help(&page());
        let expected = "app serve [port]\n\
                        \n\
                        run the server\n\
                        \n\
                        Commands:\n  app status  show status [aliases: st]\n\
                        \n\
                        Options:\n  -p, --port  listen port [number] [default: 8080]\n  \
                        --mode       [string] [choices: \"dev\", \"prod\"] [required]";
        assert_eq!(text, expected);
    }

    #[test]
    fn fail_handlers_run_newest_first() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut usage = DefaultUsage::new();
        for name in ["first", "second"] {
            let seen = seen.clone();
            usage.add_fail_handler(Rc::new(move |msg, _| {
                seen.borrow_mut().push(format!("{name}:{}", msg.unwrap_or_default()));
            }));
        }
        usage.fail(Some("bad"), &Error::Validation("bad".into()));
        assert_eq!(*seen.borrow(), vec!["second:bad", "first:bad"]);
    }

    #[test]
    fn freeze_restores_handlers_and_cache() {
        let mut usage = DefaultUsage::new();
        usage.freeze();
        usage.add_fail_handler(Rc::new(|_, _| {}));
        usage.cache_help_message(&page());
        assert!(usage.cached_help_message().is_some());
        usage.unfreeze();
        assert!(usage.cached_help_message().is_none());
        assert_eq!(usage.current.fails.len(), 0);
    }
}
