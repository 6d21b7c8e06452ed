//! `argweave tokenize "<LINE>"`: prints the tokens as a JSON array.

use anyhow::Result;
use clap::Args;
use tracing::debug;

#[derive(Args, Debug)]
pub struct TokenizeArgs {
    /// Command line to split (quote it in your shell)
    pub line: String,
}

pub fn execute_tokenize(args: TokenizeArgs) -> Result<()> {
    let tokens = argweave::tokenize(&args.line);
    debug!(count = tokens.len(), "tokenized");
    println!("{}", serde_json::to_string(&tokens)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(subcommand)]
        cmd: TestSub,
    }

    #[derive(clap::Subcommand, Debug)]
    enum TestSub {
        Tokenize(TokenizeArgs),
    }

    #[test]
    fn clap_takes_the_line_as_one_value() {
        let cli = TestCli::try_parse_from(["t", "tokenize", "serve --port 3000"]).unwrap();
        let TestSub::Tokenize(args) = cli.cmd;
        assert_eq!(args.line, "serve --port 3000");
        assert_eq!(argweave::tokenize(&args.line), ["serve", "--port", "3000"]);
    }
}
