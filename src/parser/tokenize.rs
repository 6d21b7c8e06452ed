//! Shell-like splitting of a raw argument string.
//!
//! Quote characters are kept inside the token; the value coercer strips a
//! matching pair later, once it knows which key the token belongs to.

/// Either a raw line that still needs splitting or pre-split tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgsInput {
    Line(String),
    Tokens(Vec<String>),
}

impl ArgsInput {
    pub fn into_tokens(self) -> Vec<String> {
        match self {
            ArgsInput::Line(line) => tokenize(&line),
            ArgsInput::Tokens(tokens) => tokens,
        }
    }
}

impl From<&str> for ArgsInput {
    fn from(line: &str) -> Self {
        ArgsInput::Line(line.to_string())
    }
}

impl From<String> for ArgsInput {
    fn from(line: String) -> Self {
        ArgsInput::Line(line)
    }
}

impl From<Vec<String>> for ArgsInput {
    fn from(tokens: Vec<String>) -> Self {
        ArgsInput::Tokens(tokens)
    }
}

impl From<Vec<&str>> for ArgsInput {
    fn from(tokens: Vec<&str>) -> Self {
        ArgsInput::Tokens(tokens.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ArgsInput {
    fn from(tokens: [&str; N]) -> Self {
        ArgsInput::Tokens(tokens.iter().map(|t| t.to_string()).collect())
    }
}

impl From<&[String]> for ArgsInput {
    fn from(tokens: &[String]) -> Self {
        ArgsInput::Tokens(tokens.to_vec())
    }
}

/// Split on spaces outside of single or double quotes.
pub fn tokenize(line: &str) -> Vec<String> {
    let line = line.trim();
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut opening: Option<char> = None;
    let mut prev_space = false;

    for c in line.chars() {
        if c == ' ' && opening.is_none() {
            if !prev_space && !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_space = true;
            continue;
        }
        prev_space = false;

        if Some(c) == opening {
            opening = None;
        } else if (c == '\'' || c == '"') && opening.is_none() {
            opening = Some(c);
        }
        current.push(c);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_runs_of_spaces() {
        assert_eq!(tokenize("  foo   --bar  9 "), vec!["foo", "--bar", "9"]);
    }

    #[test]
    fn keeps_quoted_spans_together_with_quotes() {
        assert_eq!(
            tokenize(r#"--name "Itachi Uchiha" -x 'a b'"#),
            vec!["--name", r#""Itachi Uchiha""#, "-x", "'a b'"]
        );
    }

    #[test]
    fn nested_other_quote_is_literal() {
        assert_eq!(tokenize(r#"say "it's fine""#), vec!["say", r#""it's fine""#]);
    }

    #[test]
    fn empty_line_has_no_tokens() {
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn token_input_is_passed_through() {
        let input: ArgsInput = vec!["a b", "c"].into();
        assert_eq!(input.into_tokens(), vec!["a b", "c"]);
    }
}
