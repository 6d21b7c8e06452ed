//! Programs declared as data.
//!
//! A manifest is plain YAML or JSON:
//!
//! ```yaml
//! script_name: demo
//! strict: true
//! options:
//!   verbose: { type: boolean, aliases: [v] }
//! commands:
//!   - command: "serve [port]"
//!     describe: start the server
//!     positionals:
//!       port: { type: number, default: 8080 }
//! ```
//!
//! Every command gets a handler-side middleware that records the matched
//! command path under `$command`.

use std::rc::Rc;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::arguments::Arguments;
use crate::command::Command;
use crate::error::Result;
use crate::middleware::Middleware;
use crate::platform::Platform;
use crate::program::{OptionDefinition, Program};

/// Key the executed command path is written to.
pub const COMMAND_KEY: &str = "$command";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProgramManifest {
    pub script_name: Option<String>,
    pub usage: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub strict: bool,
    pub strict_commands: bool,
    pub strict_options: bool,
    pub demand_command: Option<usize>,
    pub config: Option<Map<String, Value>>,
    pub options: IndexMap<String, OptionDefinition>,
    pub commands: Vec<CommandManifest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandManifest {
    pub command: String,
    pub aliases: Vec<String>,
    #[serde(alias = "desc", alias = "description")]
    pub describe: Option<String>,
    pub deprecated: bool,
    pub demand_command: Option<usize>,
    pub options: IndexMap<String, OptionDefinition>,
    pub positionals: IndexMap<String, OptionDefinition>,
    pub commands: Vec<CommandManifest>,
}

impl ProgramManifest {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn build(&self, platform: Rc<dyn Platform>) -> Program {
        let program = Program::with_platform(platform);
        self.apply(&program);
        program
    }

    pub fn apply(&self, program: &Program) {
        if let Some(name) = &self.script_name {
            program.script_name(name.as_str());
        }
        if let Some(line) = &self.usage {
            program.usage(line, self.description.as_deref());
        }
        if let Some(version) = &self.version {
            program.version(version.as_str());
        }
        if let Some(config) = &self.config {
            program.config(config.clone());
        }
        program
            .strict(self.strict)
            .strict_commands(self.strict_commands)
            .strict_options(self.strict_options);
        declare(program, &self.options, self.demand_command, &self.commands);
    }
}

impl CommandManifest {
    pub fn to_command(&self) -> Command {
        let level = Rc::new(self.clone());
        let mut command = Command::new(self.command.as_str())
            .builder(move |program, _| {
                for (key, def) in &level.positionals {
                    program.positional(key, def.clone());
                }
                declare(program, &level.options, level.demand_command, &level.commands);
                Ok(())
            })
            .middleware(record_command_path());
        for alias in &self.aliases {
            command = command.alias(alias.as_str());
        }
        if let Some(desc) = &self.describe {
            command = command.describe(desc.as_str());
        }
        if self.deprecated {
            command = command.deprecated();
        }
        command
    }
}

fn declare(
    program: &Program,
    options: &IndexMap<String, OptionDefinition>,
    demand_command: Option<usize>,
    commands: &[CommandManifest],
) {
    for (key, def) in options {
        program.option(key, def.clone());
    }
    if let Some(min) = demand_command {
        program.demand_command(min, None);
    }
    for command in commands {
        program.command(command.to_command());
    }
}

fn record_command_path() -> Middleware {
    Middleware::new(|_, program| {
        let mut partial = Arguments::default();
        partial.insert(
            COMMAND_KEY.to_string(),
            Value::String(program.context_commands().join(" ")),
        );
        Ok(partial)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::platform::StdPlatform;
    use serde_json::json;

    const DEMO: &str = r#"
script_name: demo
strict: true
options:
  verbose: { type: boolean, aliases: [v], describe: chatty output }
commands:
  - command: "serve [port]"
    describe: start the server
    positionals:
      port: { type: number, default: 8080 }
  - command: remote
    demand_command: 1
    commands:
      - command: "add <name> [url]"
"#;

    fn demo() -> Program {
        let program = ProgramManifest::from_yaml(DEMO).unwrap().build(Rc::new(StdPlatform));
        program.exit_process(false);
        program
    }

    #[test]
    fn runs_declared_command_with_positionals() {
        let argv = demo().parse_sync("serve 3000 -v").unwrap();
        assert_eq!(argv["port"], json!(3000));
        assert_eq!(argv["verbose"], json!(true));
        assert_eq!(argv[COMMAND_KEY], json!("serve"));
        assert_eq!(argv["$0"], json!("demo"));
    }

    #[test]
    fn positional_default_applies() {
        let argv = demo().parse_sync("serve").unwrap();
        assert_eq!(argv["port"], json!(8080));
    }

    #[test]
    fn nested_commands_record_full_path() {
        let argv = demo().parse_sync("remote add origin").unwrap();
        assert_eq!(argv["name"], json!("origin"));
        assert_eq!(argv[COMMAND_KEY], json!("remote add"));
    }

    #[test]
    fn strict_manifest_rejects_unknown_flags() {
        let err = demo().parse_sync("serve --nope").unwrap_err();
        assert_eq!(err.to_string(), "Unknown argument: nope");
    }

    #[test]
    fn json_manifest_loads() {
        let manifest = ProgramManifest::from_json(
            r#"{"options": {"n": {"type": "number", "required": true}}}"#,
        )
        .unwrap();
        let program = manifest.build(Rc::new(StdPlatform));
        assert_eq!(program.parse_sync("--n 4").unwrap()["n"], json!(4));
        let err = program.parse_sync("").unwrap_err();
        assert_eq!(err.to_string(), "Missing required argument: n");
    }

    #[test]
    fn unknown_manifest_field_is_rejected() {
        let err = ProgramManifest::from_yaml("bogus: 1").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }
}
