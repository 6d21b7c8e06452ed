//! Writing values into the result object along dot-notation paths.

use serde_json::{Map, Value};

/// A value about to be written.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Value(Value),
    /// One more occurrence of a count key.
    Increment,
}

impl From<Value> for Incoming {
    fn from(value: Value) -> Self {
        Incoming::Value(value)
    }
}

/// How the leaf of a path accumulates repeated writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeafPolicy {
    /// The full key is declared as an array.
    pub type_array: bool,
    /// The leaf key is a count or boolean (never turned into a list on repeat).
    pub count_or_bool: bool,
    pub narg: Option<usize>,
    pub duplicate_arguments_array: bool,
    pub flatten_duplicate_arrays: bool,
}

pub fn sanitize_key(key: &str) -> &str {
    if key == "__proto__" { "___proto___" } else { key }
}

pub fn split_path(key: &str) -> Vec<&str> {
    key.split('.').collect()
}

/// Write `value` at `path`, creating intermediate objects.
///
/// An intermediate that already holds something other than an object is
/// turned into a list whose last element is a fresh object, so earlier
/// values at that path survive.
pub fn set_key(obj: &mut Map<String, Value>, path: &[&str], value: Incoming, policy: &LeafPolicy) {
    let Some((leaf, parents)) = path.split_last() else {
        return;
    };

    let mut o = obj;
    for raw in parents {
        let key = sanitize_key(raw).to_string();
        let slot = o.entry(key).or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            let previous = std::mem::take(slot);
            let mut list = match previous {
                Value::Array(items) => items,
                other => vec![other],
            };
            list.push(Value::Object(Map::new()));
            *slot = Value::Array(list);
        }
        o = match slot {
            Value::Object(map) => map,
            Value::Array(items) => match items.last_mut() {
                Some(Value::Object(map)) => map,
                _ => return,
            },
            _ => return,
        };
    }

    set_leaf(o, sanitize_key(leaf), value, policy);
}

fn set_leaf(o: &mut Map<String, Value>, key: &str, value: Incoming, policy: &LeafPolicy) {
    let mut duplicate = policy.duplicate_arguments_array;
    if !duplicate && let Some(n) = policy.narg {
        duplicate = true;
        // a single-value narg restarts on any earlier value
        let full = match o.get(key) {
            Some(Value::Array(items)) => n == 1 || items.len() == n,
            Some(_) => n == 1,
            None => false,
        };
        if full {
            o.remove(key);
        }
    }

    let value = match value {
        Incoming::Increment => {
            let next = match o.get(key).and_then(Value::as_f64) {
                Some(n) => super::strings::number_value(n + 1.0),
                None => Value::from(1),
            };
            o.insert(key.to_string(), next);
            return;
        }
        Incoming::Value(value) => value,
    };

    let value_is_array = value.is_array();
    match o.get_mut(key) {
        Some(slot) if slot.is_array() => {
            if !duplicate && policy.type_array == value_is_array {
                *slot = value;
            } else if let Value::Array(items) = slot {
                match value {
                    Value::Array(more) if duplicate && policy.type_array => {
                        if policy.flatten_duplicate_arrays {
                            items.extend(more);
                        } else {
                            if !items.first().is_some_and(Value::is_array) {
                                let nested = std::mem::take(items);
                                items.push(Value::Array(nested));
                            }
                            items.push(Value::Array(more));
                        }
                    }
                    other => items.push(other),
                }
            }
        }
        None if policy.type_array => {
            let wrapped = if value_is_array { value } else { Value::Array(vec![value]) };
            o.insert(key.to_string(), wrapped);
        }
        Some(previous) if duplicate && !policy.count_or_bool => {
            let first = std::mem::take(previous);
            *previous = Value::Array(vec![first, value]);
        }
        _ => {
            o.insert(key.to_string(), value);
        }
    }
}

/// Whether `path` exists. Any non-object on the way means it does not.
pub fn has_key(obj: &Map<String, Value>, path: &[&str]) -> bool {
    let Some((leaf, parents)) = path.split_last() else {
        return false;
    };
    let mut current: Option<&Value> = None;
    let mut scope = Some(obj);
    for key in parents {
        let next = match (scope, current) {
            (Some(map), _) => map.get(*key),
            (None, Some(Value::Array(items))) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(Value::Object(map)) => {
                scope = Some(map);
                current = None;
            }
            Some(value @ Value::Array(_)) => {
                scope = None;
                current = Some(value);
            }
            _ => return false,
        }
    }
    match (scope, current) {
        (Some(map), _) => map.contains_key(*leaf),
        (None, Some(Value::Array(items))) => leaf.parse::<usize>().is_ok_and(|i| i < items.len()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn policy() -> LeafPolicy {
        LeafPolicy {
            duplicate_arguments_array: true,
            flatten_duplicate_arrays: true,
            ..Default::default()
        }
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn dotted_path_creates_nested_objects() {
        let mut o = Map::new();
        set_key(&mut o, &["a", "b", "c"], json!(1).into(), &policy());
        assert_eq!(Value::Object(o), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn intermediate_scalar_becomes_list_of_objects() {
        let mut o = obj(json!({"a": 5}));
        set_key(&mut o, &["a", "b"], json!("x").into(), &policy());
        assert_eq!(Value::Object(o), json!({"a": [5, {"b": "x"}]}));
    }

    #[test]
    fn repeat_turns_value_into_list() {
        let mut o = Map::new();
        for v in [1, 2, 3] {
            set_key(&mut o, &["foo"], json!(v).into(), &policy());
        }
        assert_eq!(o["foo"], json!([1, 2, 3]));
    }

    #[test]
    fn repeat_without_duplicates_overwrites() {
        let mut o = Map::new();
        let p = LeafPolicy {
            duplicate_arguments_array: false,
            ..policy()
        };
        set_key(&mut o, &["foo"], json!(1).into(), &p);
        set_key(&mut o, &["foo"], json!(2).into(), &p);
        assert_eq!(o["foo"], json!(2));
    }

    #[rstest]
    #[case::single_restarts(1, json!(["x", "y"]), json!(["z"]))]
    #[case::full_group_restarts(2, json!(["x", "y"]), json!(["z"]))]
    #[case::partial_group_appends(3, json!(["x", "y"]), json!(["x", "y", "z"]))]
    fn narg_array_without_duplicates(#[case] narg: usize, #[case] existing: Value, #[case] expected: Value) {
        let mut o = obj(json!({ "foo": existing }));
        let p = LeafPolicy {
            type_array: true,
            narg: Some(narg),
            duplicate_arguments_array: false,
            ..policy()
        };
        set_key(&mut o, &["foo"], json!("z").into(), &p);
        assert_eq!(o["foo"], expected);
    }

    #[test]
    fn array_key_wraps_then_appends() {
        let mut o = Map::new();
        let p = LeafPolicy {
            type_array: true,
            ..policy()
        };
        set_key(&mut o, &["foo"], json!(1).into(), &p);
        set_key(&mut o, &["foo"], json!(2).into(), &p);
        set_key(&mut o, &["foo"], json!([3, 4]).into(), &p);
        assert_eq!(o["foo"], json!([1, 2, 3, 4]));
    }

    #[test]
    fn array_values_nest_when_not_flattening() {
        let mut o = Map::new();
        let p = LeafPolicy {
            type_array: true,
            flatten_duplicate_arrays: false,
            ..policy()
        };
        set_key(&mut o, &["foo"], json!(["a", "b"]).into(), &p);
        set_key(&mut o, &["foo"], json!(["c"]).into(), &p);
        assert_eq!(o["foo"], json!([["a", "b"], ["c"]]));
    }

    #[test]
    fn booleans_overwrite_on_repeat() {
        let mut o = Map::new();
        let p = LeafPolicy {
            count_or_bool: true,
            ..policy()
        };
        set_key(&mut o, &["flag"], json!(true).into(), &p);
        set_key(&mut o, &["flag"], json!(false).into(), &p);
        assert_eq!(o["flag"], json!(false));
    }

    #[test]
    fn increments_count() {
        let mut o = Map::new();
        let p = LeafPolicy {
            count_or_bool: true,
            ..policy()
        };
        set_key(&mut o, &["v"], Incoming::Increment, &p);
        set_key(&mut o, &["v"], Incoming::Increment, &p);
        assert_eq!(o["v"], json!(2));
    }

    #[test]
    fn proto_segment_is_sanitized() {
        let mut o = Map::new();
        set_key(&mut o, &["__proto__", "polluted"], json!(true).into(), &policy());
        assert_eq!(Value::Object(o), json!({"___proto___": {"polluted": true}}));
    }

    #[test]
    fn has_key_walks_objects_only() {
        let o = obj(json!({"a": {"b": 1}, "s": "text", "n": null}));
        assert!(has_key(&o, &["a"]));
        assert!(has_key(&o, &["a", "b"]));
        assert!(!has_key(&o, &["a", "c"]));
        assert!(!has_key(&o, &["s", "length"]));
        assert!(!has_key(&o, &["n", "x"]));
        assert!(has_key(&o, &["n"]));
    }
}
