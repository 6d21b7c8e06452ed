use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod utils;

use cmd::{ParseArgs, TokenizeArgs};

/// Argweave - run argument vectors through a declared program
///
/// Command layout:
///   argweave tokenize "<LINE>"
///   argweave parse [--spec FILE] [--json] -- ARGS...
///
/// Notes:
///   - tokenize : split a command line the way `parse` does when given a string
///   - parse    : build a program from a YAML/JSON manifest and print the parsed result
///
/// Global flags / env:
///   -v / -vv        Increase verbosity
///   -q / --quiet    Errors only
///   RUST_LOG        Overrides the level derived from -v / -q
///
/// Exit codes:
///   0  success (including printed help / version)
///   1  the program rejected the arguments
///   2  the manifest could not be loaded
///
/// Examples:
///   argweave tokenize "serve --port 3000 'two words'"
///   argweave parse --spec demo.yaml -- serve 3000 -v
///   argweave parse --spec demo.json --json -- remote add origin
#[derive(Parser, Debug)]
#[command(
    name = "argweave",
    version,
    author,
    about = "Argweave - declarative argument parsing and nested command dispatch",
    propagate_version = true,
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Silence all non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split a command line into tokens
    Tokenize(TokenizeArgs),

    /// Parse arguments against a program manifest
    Parse(ParseArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = utils::derive_level(cli.verbose, cli.quiet);
    utils::init_logging(level);

    match cli.command {
        Commands::Tokenize(args) => cmd::execute_tokenize(args),
        Commands::Parse(args) => cmd::execute_parse(args).await,
    }
}
