//! Moving leftover positionals onto the keys a command string declares.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use super::CommandHandler;
use crate::arguments::Arguments;
use crate::parser::AliasTable;
use crate::parser::strings::value_to_string;

/// Raw positional text by key, in declaration order.
pub type PositionalMap = IndexMap<String, Vec<String>>;

/// Demanded slots first, then optional ones. A variadic slot takes
/// everything left; the others take one token each while tokens remain.
pub fn take_positionals(handler: &CommandHandler, rest: &mut Vec<Value>) -> PositionalMap {
    let mut map = PositionalMap::new();
    for positional in handler.demanded.iter().chain(&handler.optional) {
        let key = positional.key().to_string();
        if positional.variadic {
            map.insert(key, rest.drain(..).map(|v| value_to_string(&v)).collect());
        } else if !rest.is_empty() {
            let first = rest.remove(0);
            map.insert(key, vec![value_to_string(&first)]);
        }
    }
    map
}

/// `--key=value` per collected value, so positionals go through the same
/// coercion as flags. The inline form keeps values like `-x` from being read
/// as flags.
pub fn synthetic_tokens(map: &PositionalMap) -> Vec<String> {
    map.iter()
        .flat_map(|(key, values)| values.iter().map(move |v| format!("--{key}={v}")))
        .collect()
}

/// Copy positional keys (and their aliases) from the re-parse into `argv`.
///
/// When `argv` already holds the key from a flag, neither side came from a
/// config object or default (`preset`), and either side is a list, the two
/// are concatenated. Otherwise the positional value wins. Returns every key
/// that carries a positional value.
pub fn merge_positionals(
    argv: &mut Arguments,
    map: &PositionalMap,
    reparsed: &Arguments,
    aliases: &AliasTable,
    preset: impl Fn(&str) -> bool,
) -> IndexSet<String> {
    let mut keys: IndexSet<String> = map.keys().cloned().collect();
    for key in map.keys() {
        keys.extend(aliases.get(key).into_iter().flatten().cloned());
    }

    for (key, value) in reparsed.iter() {
        if !keys.contains(key) {
            continue;
        }
        let combine = !preset(key)
            && argv
                .get(key)
                .is_some_and(|existing| existing.is_array() || value.is_array());
        let merged = match argv.get(key) {
            Some(existing) if combine => concat(existing, value),
            _ => value.clone(),
        };
        argv.insert(key.clone(), merged);
    }
    keys
}

fn concat(a: &Value, b: &Value) -> Value {
    let mut out = Vec::new();
    for side in [a, b] {
        match side {
            Value::Array(items) => out.extend(items.iter().cloned()),
            other => out.push(other.clone()),
        }
    }
    Value::Array(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CommandRegistry};
    use serde_json::json;

    fn handler(cmd: &str) -> std::rc::Rc<CommandHandler> {
        let mut registry = CommandRegistry::default();
        registry.add(Command::new(cmd)).unwrap();
        registry.handlers().next().cloned().unwrap()
    }

    #[test]
    fn demanded_then_optional_then_variadic() {
        let h = handler("foo <bar> [baz] [rest..]");
        let mut rest = vec![json!(1), json!("two"), json!(3), json!(4)];
        let map = take_positionals(&h, &mut rest);
        assert!(rest.is_empty());
        assert_eq!(map["bar"], vec!["1"]);
        assert_eq!(map["baz"], vec!["two"]);
        assert_eq!(map["rest"], vec!["3", "4"]);
    }

    #[test]
    fn missing_optional_is_absent_but_variadic_is_empty() {
        let h = handler("foo <bar> [baz] [rest..]");
        let mut rest = vec![json!("x")];
        let map = take_positionals(&h, &mut rest);
        assert!(!map.contains_key("baz"));
        assert_eq!(map["rest"], Vec::<String>::new());
        assert!(synthetic_tokens(&map) == vec!["--bar=x"]);
    }

    #[test]
    fn extra_tokens_stay_behind() {
        let h = handler("foo <bar>");
        let mut rest = vec![json!("a"), json!("b")];
        take_positionals(&h, &mut rest);
        assert_eq!(rest, vec![json!("b")]);
    }

    #[test]
    fn arrays_concatenate_unless_preset() {
        let mut argv = Arguments::new();
        argv.insert("files".into(), json!(["a"]));
        argv.insert("mode".into(), json!("flag"));
        let map = PositionalMap::from([
            ("files".to_string(), vec!["b".to_string()]),
            ("mode".to_string(), vec!["pos".to_string()]),
        ]);
        let mut reparsed = Arguments::new();
        reparsed.insert("files".into(), json!(["b"]));
        reparsed.insert("mode".into(), json!("pos"));
        reparsed.insert("f".into(), json!(["b"]));
        let aliases = AliasTable::from([("files".to_string(), vec!["f".to_string()])]);

        let keys = merge_positionals(&mut argv, &map, &reparsed, &aliases, |_| false);
        assert_eq!(argv["files"], json!(["a", "b"]));
        assert_eq!(argv["mode"], json!("pos"));
        assert_eq!(argv["f"], json!(["b"]));
        assert!(keys.contains("f"));

        let mut argv = Arguments::new();
        argv.insert("files".into(), json!(["a"]));
        merge_positionals(&mut argv, &map, &reparsed, &aliases, |k| k == "files");
        assert_eq!(argv["files"], json!(["b"]));
    }
}
