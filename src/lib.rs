//! Declarative argument parsing and nested command dispatch.
//!
//! ```
//! use argweave::{Command, OptionDefinition, OptionType, Program};
//!
//! let program = Program::new();
//! program
//!     .option("verbose", OptionDefinition::new().of_type(OptionType::Boolean).alias("v"))
//!     .command(Command::new("copy <src> <dest..>"));
//!
//! let argv = program.parse_sync("copy a.txt b/ c/ -v").unwrap();
//! assert_eq!(argv["src"], "a.txt");
//! assert_eq!(argv["dest"], serde_json::json!(["b/", "c/"]));
//! assert_eq!(argv["verbose"], true);
//! ```

pub mod arguments;
pub mod command;
pub mod deferred;
pub mod error;
pub mod manifest;
pub mod middleware;
pub mod parser;
pub mod platform;
pub mod program;
pub mod usage;
pub mod validation;

pub use arguments::Arguments;
pub use command::{Command, CommandHandler, CommandRegistry};
pub use deferred::Deferred;
pub use error::{Error, Result};
pub use manifest::{CommandManifest, ProgramManifest};
pub use middleware::Middleware;
pub use parser::{ArgsInput, DetailedArguments, Parser, ParserConfiguration, ParserOptions, tokenize};
pub use platform::{Platform, StdPlatform};
pub use program::{DemandedCommands, OptionDefinition, OptionType, Program, ProgramOptions, Switch};
pub use usage::{DefaultUsage, HelpPage, Usage};
pub use validation::{DefaultValidation, Validation, ValidationRequest};
