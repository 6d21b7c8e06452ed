//! Command strings: `serve <host> [port|p] [extra..]`.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

/// One positional slot of a command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Positional {
    /// Key first, then its aliases.
    pub names: Vec<String>,
    pub variadic: bool,
}

impl Positional {
    pub fn key(&self) -> &str {
        &self.names[0]
    }

    pub fn aliases(&self) -> &[String] {
        &self.names[1..]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub demanded: Vec<Positional>,
    pub optional: Vec<Positional>,
}

/// Split on whitespace that is not inside `<..>` or `[..]`.
fn split_words(cmd: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in cmd.chars() {
        match ch {
            '<' | '[' => {
                depth += 1;
                current.push(ch);
            }
            '>' | ']' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Drop bracket characters together with any dots right before them.
fn strip_brackets(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut dots = 0usize;
    for ch in word.chars() {
        match ch {
            '.' => dots += 1,
            '<' | '>' | '[' | ']' => dots = 0,
            c => {
                out.extend(std::iter::repeat_n('.', dots));
                dots = 0;
                out.push(c);
            }
        }
    }
    out.extend(std::iter::repeat_n('.', dots));
    out
}

pub fn parse_command(cmd: &str) -> Result<ParsedCommand> {
    let mut words = split_words(cmd).into_iter();
    let Some(first) = words.next() else {
        return Err(Error::Usage(format!("No command found in: {cmd}")));
    };
    let rest: Vec<String> = words.collect();
    let mut parsed = ParsedCommand {
        name: strip_brackets(&first),
        demanded: Vec::new(),
        optional: Vec::new(),
    };

    let last = rest.len().saturating_sub(1);
    for (i, word) in rest.iter().enumerate() {
        let word: String = word.chars().filter(|c| !c.is_whitespace()).collect();
        let marked = word.contains(".]") || word.contains(".>");
        if marked && i != last {
            warn!(command = cmd, positional = %word, "only the last positional can be variadic");
        }
        let positional = Positional {
            names: strip_brackets(&word).split('|').map(str::to_string).collect(),
            variadic: marked && i == last,
        };
        if word.starts_with('[') {
            parsed.optional.push(positional);
        } else {
            parsed.demanded.push(positional);
        }
    }
    Ok(parsed)
}

/// Parser hints implied by a command string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionalHints {
    pub array: Vec<String>,
    pub default: IndexMap<String, Value>,
    pub aliases: IndexMap<String, Vec<String>>,
    pub required: IndexSet<String>,
}

pub fn cmd_to_parse_options(cmd: &str) -> PositionalHints {
    let mut hints = PositionalHints::default();
    let Ok(parsed) = parse_command(cmd) else {
        return hints;
    };
    let all = parsed
        .demanded
        .iter()
        .map(|p| (p, true))
        .chain(parsed.optional.iter().map(|p| (p, false)));
    for (positional, required) in all {
        let key = positional.key().to_string();
        if positional.variadic {
            hints.array.push(key.clone());
            hints.default.insert(key.clone(), Value::Array(Vec::new()));
        }
        hints.aliases.insert(key.clone(), positional.aliases().to_vec());
        if required {
            hints.required.insert(key);
        }
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn names(list: &[Positional]) -> Vec<Vec<String>> {
        list.iter().map(|p| p.names.clone()).collect()
    }

    #[test]
    fn demanded_optional_and_variadic() {
        let parsed = parse_command("foo <bar> [baz..]").unwrap();
        assert_eq!(parsed.name, "foo");
        assert_eq!(names(&parsed.demanded), vec![vec!["bar"]]);
        assert_eq!(names(&parsed.optional), vec![vec!["baz"]]);
        assert!(!parsed.demanded[0].variadic);
        assert!(parsed.optional[0].variadic);
    }

    #[rstest]
    #[case("get <user | email>", vec!["user", "email"])]
    #[case("get  <user|email>", vec!["user", "email"])]
    #[case("get <user|email|id>", vec!["user", "email", "id"])]
    fn positional_aliases(#[case] cmd: &str, #[case] expected: Vec<&str>) {
        let parsed = parse_command(cmd).unwrap();
        assert_eq!(parsed.demanded[0].names, expected);
    }

    #[test]
    fn spaced_variadic_alias_group() {
        let parsed = parse_command("check [ ssns | sins.. ]").unwrap();
        assert_eq!(parsed.optional[0].names, vec!["ssns", "sins"]);
        assert!(parsed.optional[0].variadic);
    }

    #[test]
    fn earlier_variadic_marker_is_ignored() {
        let parsed = parse_command("cp <files..> <dest>").unwrap();
        assert_eq!(parsed.demanded[0].names, vec!["files"]);
        assert!(!parsed.demanded[0].variadic);
    }

    #[rstest]
    #[case("*")]
    #[case("$0")]
    #[case("* [name]")]
    fn default_markers_survive_as_name(#[case] cmd: &str) {
        let parsed = parse_command(cmd).unwrap();
        assert!(parsed.name == "*" || parsed.name == "$0");
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = parse_command("   ").unwrap_err();
        assert_eq!(err.to_string(), "No command found in:    ");
    }

    #[test]
    fn hints_from_command_string() {
        let hints = cmd_to_parse_options("foo <root|r> [files...]");
        assert_eq!(hints.array, vec!["files"]);
        assert_eq!(hints.default["files"], json!([]));
        assert_eq!(hints.aliases["root"], vec!["r"]);
        assert!(hints.aliases["files"].is_empty());
        assert!(hints.required.contains("root"));
        assert!(!hints.required.contains("files"));
    }
}
