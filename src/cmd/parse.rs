/*!
`parse.rs`

Implements `argweave parse [--spec FILE] [--json] -- ARGS...`.

Behavior:
  - `--spec` names a program manifest. `.json` files are read as JSON,
    anything else as YAML. Without `--spec` an empty program is used, which
    still parses flags and positionals generically.
  - The program is built against the real process platform, so `--help`
    and `--version` inside ARGS print and exit 0.
  - On success the parsed arguments are printed either as pretty JSON or
    as aligned `key: value` lines.

Exit codes:
  - 1 : the program rejected ARGS (propagated error)
  - 2 : the manifest could not be read or decoded
*/

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use anyhow::{Context, Result};
use argweave::{ProgramManifest, StdPlatform};
use clap::Args;
use tracing::{debug, info};

use crate::cmd::format::{StyleOptions, key_values};

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Program manifest (YAML, or JSON when the extension is .json)
    #[arg(short, long, value_name = "FILE")]
    pub spec: Option<PathBuf>,

    /// Output JSON instead of key: value lines
    #[arg(long)]
    pub json: bool,

    /// Arguments handed to the program (after `--`)
    #[arg(last = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

pub async fn execute_parse(args: ParseArgs) -> Result<()> {
    let manifest = match &args.spec {
        Some(path) => match load_manifest(path) {
            Ok(manifest) => manifest,
            Err(e) => {
                eprintln!("Invalid spec '{}': {e:#}", path.display());
                std::process::exit(2);
            }
        },
        None => ProgramManifest::default(),
    };

    let program = manifest.build(Rc::new(StdPlatform));
    let started = Instant::now();
    let argv = program
        .parse_async(args.args)
        .await
        .context("arguments rejected")?;
    debug!(elapsed_us = started.elapsed().as_micros() as u64, "parse finished");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&argv)?);
        return Ok(());
    }

    let style = StyleOptions::detect();
    println!("{}", key_values(&argv, &style));
    Ok(())
}

fn load_manifest(path: &Path) -> Result<ProgramManifest> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let manifest = if is_json {
        ProgramManifest::from_json(&text)?
    } else {
        ProgramManifest::from_yaml(&text)?
    };
    info!(
        path = %path.display(),
        options = manifest.options.len(),
        commands = manifest.commands.len(),
        "manifest loaded"
    );
    Ok(manifest)
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
        Parse(ParseArgs),
    }

    #[test]
    fn clap_passes_everything_after_double_dash() {
        let cli = TestCli::try_parse_from([
            "t", "parse", "--spec", "demo.yaml", "--", "serve", "--port", "3000",
        ])
        .unwrap();
        let TestSub::Parse(args) = cli.cmd;
        assert_eq!(args.spec.as_deref(), Some(Path::new("demo.yaml")));
        assert!(!args.json);
        assert_eq!(args.args, ["serve", "--port", "3000"]);
    }

    #[test]
    fn json_extension_selects_json_decoding() {
        let dir = std::env::temp_dir().join(format!("argweave-parse-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("prog.JSON");
        std::fs::write(&path, r#"{"script_name": "demo", "options": {"n": {"type": "number"}}}"#)
            .unwrap();
        let manifest = load_manifest(&path).unwrap();
        assert_eq!(manifest.script_name.as_deref(), Some("demo"));
        assert!(manifest.options.contains_key("n"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_manifest_reports_the_path() {
        let err = load_manifest(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.yaml"));
    }
}
