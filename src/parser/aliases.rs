//! Alias equivalence classes.
//!
//! Declared alias lists are merged into closed groups, then expanded with the
//! camelCase / kebab-case spelling of every member. The result is a lookup
//! table in which every spelling maps to all the other spellings of its group.

use indexmap::{IndexMap, IndexSet};

use super::strings::{camel_case, decamelize, has_uppercase};

/// Every spelling -> the other spellings of the same group.
pub type AliasTable = IndexMap<String, Vec<String>>;

/// Merge alias declarations that share any member.
///
/// Each declaration contributes the sequence `[aliases.., key]`. Members are
/// ordered by their first appearance in the concatenation of those sequences;
/// the last member of a merged group becomes its canonical key.
pub fn combine_aliases(declared: &IndexMap<String, Vec<String>>) -> IndexMap<String, Vec<String>> {
    let mut names: IndexSet<String> = IndexSet::new();
    let mut parent: Vec<usize> = Vec::new();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for (key, aliases) in declared {
        let mut first: Option<usize> = None;
        for name in aliases.iter().chain(std::iter::once(key)) {
            let (idx, inserted) = names.insert_full(name.clone());
            if inserted {
                parent.push(idx);
            }
            match first {
                None => first = Some(idx),
                Some(root) => {
                    let a = find(&mut parent, root);
                    let b = find(&mut parent, idx);
                    if a != b {
                        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                        parent[hi] = lo;
                    }
                }
            }
        }
    }

    let mut groups: IndexMap<usize, Vec<String>> = IndexMap::new();
    for idx in 0..names.len() {
        let root = find(&mut parent, idx);
        groups.entry(root).or_default().push(names[idx].clone());
    }

    groups
        .into_values()
        .filter_map(|mut members| {
            let canonical = members.pop()?;
            Some((canonical, members))
        })
        .collect()
}

/// Fill `table` for every key in `keys` that is not known yet.
///
/// The group members come from `combined`; case variants that were not
/// declared are appended and recorded in `new_aliases`.
pub fn extend_aliases<'a>(
    table: &mut AliasTable,
    new_aliases: &mut IndexSet<String>,
    combined: &IndexMap<String, Vec<String>>,
    keys: impl IntoIterator<Item = &'a str>,
) {
    for key in keys {
        if table.contains_key(key) {
            continue;
        }
        let mut list: Vec<String> = combined.get(key).cloned().unwrap_or_default();

        let snapshot: Vec<String> = list.iter().cloned().chain([key.to_string()]).collect();
        for x in &snapshot {
            if x.contains('-') {
                let c = camel_case(x);
                if c != key && !list.contains(&c) {
                    list.push(c.clone());
                    new_aliases.insert(c);
                }
            }
        }

        let snapshot: Vec<String> = list.iter().cloned().chain([key.to_string()]).collect();
        for x in &snapshot {
            if x.chars().count() > 1 && has_uppercase(x) {
                let c = decamelize(x, "-");
                if c != key && !list.contains(&c) {
                    list.push(c.clone());
                    new_aliases.insert(c);
                }
            }
        }

        for x in &list {
            let others = std::iter::once(key.to_string())
                .chain(list.iter().filter(|y| *y != x).cloned())
                .collect();
            table.insert(x.clone(), others);
        }
        table.insert(key.to_string(), list);
    }
}

/// Link `key` and `alias` when either has no aliases yet. Both spellings are
/// recorded as new, since neither was declared.
pub fn add_new_alias(
    table: &mut AliasTable,
    new_aliases: &mut IndexSet<String>,
    key: &str,
    alias: &str,
) {
    if table.get(key).is_none_or(|list| list.is_empty()) {
        table.insert(key.to_string(), vec![alias.to_string()]);
        new_aliases.insert(alias.to_string());
    }
    if table.get(alias).is_none_or(|list| list.is_empty()) {
        add_new_alias(table, new_aliases, alias, key);
    }
}

/// `key` followed by its aliases.
pub fn spellings<'a>(table: &'a AliasTable, key: &'a str) -> impl Iterator<Item = &'a str> {
    std::iter::once(key).chain(table.get(key).into_iter().flatten().map(String::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(pairs: &[(&str, &[&str])]) -> IndexMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn chained_declarations_collapse_into_one_group() {
        let combined = combine_aliases(&declared(&[("a", &["b"]), ("b", &["c"])]));
        assert_eq!(combined.len(), 1);
        let (canonical, rest) = combined.first().unwrap();
        assert_eq!(canonical, "c");
        assert_eq!(rest, &vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn combining_is_idempotent() {
        let once = combine_aliases(&declared(&[("x", &["y"]), ("z", &["y", "w"]), ("q", &[])]));
        let twice = combine_aliases(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn disjoint_groups_stay_apart() {
        let combined = combine_aliases(&declared(&[("verbose", &["v"]), ("quiet", &["q"])]));
        assert_eq!(combined.len(), 2);
        assert_eq!(combined["verbose"], vec!["v".to_string()]);
        assert_eq!(combined["quiet"], vec!["q".to_string()]);
    }

    #[test]
    fn extension_is_symmetric_and_adds_case_variants() {
        let combined = combine_aliases(&declared(&[("dry-run", &["n"])]));
        let mut table = AliasTable::new();
        let mut fresh = IndexSet::new();
        extend_aliases(&mut table, &mut fresh, &combined, ["dry-run"]);

        assert_eq!(table["dry-run"], vec!["n".to_string(), "dryRun".to_string()]);
        assert!(table["n"].contains(&"dry-run".to_string()));
        assert!(table["n"].contains(&"dryRun".to_string()));
        assert!(table["dryRun"].contains(&"n".to_string()));
        assert!(fresh.contains("dryRun"));
        assert!(!fresh.contains("n"));
    }

    #[test]
    fn camel_key_gains_kebab_alias() {
        let mut table = AliasTable::new();
        let mut fresh = IndexSet::new();
        extend_aliases(&mut table, &mut fresh, &IndexMap::new(), ["fooBar"]);
        assert_eq!(table["fooBar"], vec!["foo-bar".to_string()]);
        assert_eq!(table["foo-bar"], vec!["fooBar".to_string()]);
    }

    #[test]
    fn late_alias_marks_both_spellings_new() {
        let mut table = AliasTable::new();
        let mut fresh = IndexSet::new();
        add_new_alias(&mut table, &mut fresh, "foo-bar", "fooBar");
        assert_eq!(table["foo-bar"], vec!["fooBar".to_string()]);
        assert_eq!(table["fooBar"], vec!["foo-bar".to_string()]);
        assert!(fresh.contains("fooBar") && fresh.contains("foo-bar"));
    }
}
