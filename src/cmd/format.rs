/*!
format.rs

Human output for the `argweave` binary.

  - Color is enabled by default; NO_COLOR disables it.
  - Functions return strings and never print.
  - JSON output paths do not use these helpers.

Public API Summary:
  - StyleOptions::detect() -> StyleOptions
  - color(role, text, &StyleOptions) -> String
  - key_values(&Arguments, &StyleOptions) -> String
*/

use std::borrow::Cow;

use argweave::Arguments;
use serde_json::Value;

/* -------------------------------------------------------------------------- */
/* Style Options                                                              */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub struct StyleOptions {
    pub use_color: bool,
    pub term_width: usize,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self::detect()
    }
}

impl StyleOptions {
    pub fn detect() -> Self {
        let use_color = std::env::var_os("NO_COLOR").is_none();
        let term_width = std::env::var("COLUMNS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|w| w.clamp(40, 220))
            .unwrap_or(100);

        StyleOptions {
            use_color,
            term_width,
        }
    }

    pub fn plain() -> Self {
        StyleOptions {
            use_color: false,
            term_width: 100,
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Color                                                                      */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy)]
pub enum Role {
    Primary,
    Secondary,
    Accent,
    Dim,
}

pub fn color(role: Role, text: impl AsRef<str>, style: &StyleOptions) -> String {
    if !style.use_color {
        return text.as_ref().to_string();
    }
    let code = match role {
        Role::Primary => "38;5;45",    // cyan-ish
        Role::Secondary => "38;5;250", // gray
        Role::Accent => "38;5;213",    // magenta/pink
        Role::Dim => "2",
    };
    format!("\x1b[{code}m{}\x1b[0m", text.as_ref())
}

/* -------------------------------------------------------------------------- */
/* Key / value listing                                                        */
/* -------------------------------------------------------------------------- */

/// One `key: value` line per entry, keys padded to a common width.
///
/// `_` and `--` are dimmed, `$`-prefixed keys use the accent color. Values
/// longer than the terminal allows are cut with an ellipsis.
pub fn key_values(argv: &Arguments, style: &StyleOptions) -> String {
    let width = argv.keys().map(|k| k.chars().count()).max().unwrap_or(0);
    let value_room = style.term_width.saturating_sub(width + 2).max(8);

    argv.iter()
        .map(|(key, value)| {
            let role = match key.as_str() {
                "_" | "--" => Role::Dim,
                k if k.starts_with('$') => Role::Accent,
                _ => Role::Primary,
            };
            let label = format!("{key:width$}");
            let rendered = truncate_ellipsis(&render(value), value_room);
            format!(
                "{}{} {}",
                color(role, label, style),
                color(Role::Secondary, ":", style),
                rendered
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_ellipsis(s: &str, max_chars: usize) -> String {
    if display_width(s) <= max_chars {
        return s.to_string();
    }
    if max_chars <= 1 {
        return "…".into();
    }
    let mut out: String = s.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

/* -------------------------------------------------------------------------- */
/* ANSI / Width Utilities                                                     */
/* -------------------------------------------------------------------------- */

fn strip_ansi(s: &str) -> Cow<'_, str> {
    if !s.contains('\x1b') {
        return Cow::Borrowed(s);
    }
    let mut buf = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        buf.push(ch);
    }
    Cow::Owned(buf)
}

fn display_width(s: &str) -> usize {
    strip_ansi(s).chars().count()
}
