//! Key spelling and numeric-literal helpers.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Number, Value};

static HEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^0x[0-9a-f]+$").unwrap());
static LEADING_ZERO: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^0[^.]").unwrap());
static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?(?:\d+(?:\.\d*)?|\.\d+)(?:e[-+]?\d+)?$").unwrap());

/// Largest integer a double represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// `foo-bar` -> `fooBar`. Mixed-case input keeps its casing; single-case
/// input is lowercased first. Leading hyphens are dropped.
pub fn camel_case(s: &str) -> String {
    let is_camel = s != s.to_lowercase() && s != s.to_uppercase();
    let s = if is_camel { s.to_string() } else { s.to_lowercase() };
    if !s.contains('-') && !s.contains('_') {
        return s;
    }

    let chars: Vec<char> = s.chars().collect();
    let start = chars.iter().take_while(|&&c| c == '-').count();
    let mut out = String::with_capacity(s.len());
    let mut next_upper = false;
    for (i, &c) in chars.iter().enumerate().skip(start) {
        let c = if next_upper {
            next_upper = false;
            c.to_ascii_uppercase()
        } else {
            c
        };
        if i != 0 && (c == '-' || c == '_') {
            next_upper = true;
        } else if c != '-' && c != '_' {
            out.push(c);
        }
    }
    out
}

/// `fooBar` -> `foo-bar`.
pub fn decamelize(s: &str, join: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        let lower = c.to_ascii_lowercase();
        if lower != c && i > 0 {
            out.push_str(join);
            out.push(lower);
        } else {
            out.push(c);
        }
    }
    out
}

pub fn has_uppercase(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_uppercase())
}

/// Strict numeric-literal test. Hex is accepted; `0123` is not (the
/// leading zero would be lost).
pub fn looks_like_number(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => str_looks_like_number(s),
        _ => false,
    }
}

pub fn str_looks_like_number(s: &str) -> bool {
    if HEX.is_match(s) {
        return true;
    }
    if LEADING_ZERO.is_match(s) {
        return false;
    }
    DECIMAL.is_match(s)
}

/// A numeric literal is only coerced when its floor is a safe integer, so
/// huge ids and `1e400` stay strings. Hex is coerced while it fits a double.
pub fn is_safe_numeric_literal(s: &str) -> bool {
    if HEX.is_match(s) {
        return parse_number(s).is_some_and(f64::is_finite);
    }
    s.parse::<f64>()
        .map(|n| n.is_finite() && n.floor().abs() <= MAX_SAFE_INTEGER)
        .unwrap_or(false)
}

/// Numeric conversion with the permissive rules used for number-typed keys:
/// whitespace is trimmed, the empty string is zero, hex is understood.
/// `None` means "not a number".
pub fn parse_number(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return Some(0.0);
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        // wider than u64 still reads as a (rounded) double
        return hex
            .chars()
            .try_fold(0.0_f64, |acc, c| c.to_digit(16).map(|d| acc * 16.0 + f64::from(d)));
    }
    let lower = t.to_ascii_lowercase();
    if lower.contains("inf") || lower.contains("nan") {
        return None;
    }
    t.parse::<f64>().ok()
}

/// Integral values become JSON integers so `1` compares equal to `json!(1)`.
pub fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Scalar rendering used when a value is fed back through the parser.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
