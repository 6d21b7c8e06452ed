/*!
Subcommands of the `argweave` binary.

  src/cmd/
    mod.rs       (this file)
    tokenize.rs  (TokenizeArgs + execute_tokenize)
    parse.rs     (ParseArgs + execute_parse)
    format.rs    (color / key-value rendering for human output)

Conventions:
  - Each subcommand module exposes exactly one public `execute_*` function
    that returns `anyhow::Result<()>`.
  - Argument structs derive `clap::Args` and are kept minimal.
  - JSON output paths do not go through `format`.
*/

pub mod format;
pub mod parse;
pub mod tokenize;

pub use parse::{ParseArgs, execute_parse};
pub use tokenize::{TokenizeArgs, execute_tokenize};
