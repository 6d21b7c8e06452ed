//! Raw token -> typed value.

use serde_json::Value;

use super::flags::{KeyTraits, ValueType};
use super::keys::Incoming;
use super::strings::{is_safe_numeric_literal, looks_like_number, number_value, parse_number};

/// Strip one pair of matching surrounding quotes.
pub fn strip_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Turn a value into a number when it reads as one, or when the key is
/// declared numeric. String and boolean keys keep their text.
pub fn maybe_coerce_number(traits: &KeyTraits, value: Value) -> Value {
    if traits.keeps_text() || value.is_array() || value.is_null() {
        return value;
    }
    let literal = match &value {
        Value::String(s) => looks_like_number(&value) && is_safe_numeric_literal(s),
        Value::Number(_) => true,
        _ => false,
    };
    if literal || traits.value_type == ValueType::Number {
        to_number(&value)
    } else {
        value
    }
}

/// Numeric conversion of any value. Things that are not numbers become null.
pub fn to_number(value: &Value) -> Value {
    match value {
        Value::Number(_) => value.clone(),
        Value::Bool(b) => Value::from(u8::from(*b)),
        Value::Null => Value::from(0),
        Value::String(s) => parse_number(s).map(number_value).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Full per-token pipeline: quotes, boolean text, numbers, count increments
/// and path normalization.
pub fn process_value(traits: &KeyTraits, raw: Value, normalize: &dyn Fn(&str) -> String) -> Incoming {
    let mut value = match raw {
        Value::String(s) => Value::String(strip_quotes(&s).to_string()),
        other => other,
    };

    if traits.is_boolean_or_count()
        && let Value::String(s) = &value
    {
        value = Value::Bool(s == "true");
    }

    value = match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| maybe_coerce_number(traits, v))
                .collect(),
        ),
        other => maybe_coerce_number(traits, other),
    };

    if traits.is_count() && value.is_boolean() {
        return Incoming::Increment;
    }

    if traits.normalize {
        value = match value {
            Value::String(s) => Value::String(normalize(&s)),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|v| match v {
                        Value::String(s) => Value::String(normalize(&s)),
                        other => other,
                    })
                    .collect(),
            ),
            other => other,
        };
    }

    Incoming::Value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::normalize;
    use rstest::rstest;
    use serde_json::json;

    fn typed(value_type: ValueType) -> KeyTraits {
        KeyTraits {
            value_type,
            ..Default::default()
        }
    }

    fn run(traits: KeyTraits, raw: Value) -> Incoming {
        process_value(&traits, raw, &normalize)
    }

    #[rstest]
    #[case(ValueType::Untyped, json!("42"), json!(42))]
    #[case(ValueType::Untyped, json!("0x10"), json!(16))]
    #[case(ValueType::Untyped, json!("007"), json!("007"))]
    #[case(ValueType::Untyped, json!("'quoted'"), json!("quoted"))]
    #[case(ValueType::String, json!("42"), json!("42"))]
    #[case(ValueType::Number, json!("abc"), Value::Null)]
    #[case(ValueType::Number, json!("007"), json!(7))]
    #[case(ValueType::Boolean, json!("true"), json!(true))]
    #[case(ValueType::Boolean, json!("yes"), json!(false))]
    #[case(ValueType::Untyped, json!("12345678901234567890"), json!("12345678901234567890"))]
    #[case(ValueType::Untyped, json!("0xFFFFFFFFFFFFFFFFFFFF"), json!(2f64.powi(80)))]
    #[case(ValueType::Untyped, json!("\""), json!("\""))]
    #[case(ValueType::Untyped, json!("\"\""), json!(""))]
    fn coerces_by_type(#[case] value_type: ValueType, #[case] raw: Value, #[case] expected: Value) {
        assert_eq!(run(typed(value_type), raw), Incoming::Value(expected));
    }

    #[test]
    fn count_occurrence_is_an_increment() {
        assert_eq!(run(typed(ValueType::Count), json!(true)), Incoming::Increment);
        assert_eq!(run(typed(ValueType::Count), json!("false")), Incoming::Increment);
        assert_eq!(run(typed(ValueType::Count), json!(0)), Incoming::Value(json!(0)));
    }

    #[test]
    fn arrays_coerce_elementwise() {
        let traits = KeyTraits {
            array: true,
            ..Default::default()
        };
        assert_eq!(run(traits, json!(["1", "b"])), Incoming::Value(json!([1, "b"])));
    }

    #[test]
    fn normalizes_paths() {
        let traits = KeyTraits {
            normalize: true,
            array: true,
            ..Default::default()
        };
        assert_eq!(
            run(traits, json!(["./a//b", "c/../d"])),
            Incoming::Value(json!(["a/b", "d"]))
        );
    }
}
