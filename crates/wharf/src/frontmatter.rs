//! C5 — FrontMatterMerge: deterministic merge of ordered patches into a
//! single front-matter map with conflict audit and typed array-merge
//! strategies (spec §4.5).

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::types::{ArrayStrategy, ConflictAction, FrontMatterPatch, MergeConflict, MergeMode};

/// Exact reserved-key set (spec §4.5) — protected from non-Replace patches
/// once a value already exists in the original front matter.
const RESERVED_KEYS: &[&str] = &[
    "title",
    "linkTitle",
    "description",
    "summary",
    "weight",
    "slug",
    "url",
    "aliases",
    "date",
    "lastmod",
    "publishDate",
    "expiryDate",
    "unpublishdate",
    "draft",
    "layout",
    "type",
    "markup",
    "translationKey",
    "editURL",
    "repository",
    "section",
    "toc",
];

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Per-key default array-merge promotion when no explicit strategy is set
/// and the key already has a non-empty existing value (spec §4.5).
fn default_array_promotion(key: &str) -> Option<ArrayStrategy> {
    match key {
        "tags" | "categories" | "keywords" | "outputs" => Some(ArrayStrategy::Union),
        "resources" => Some(ArrayStrategy::Append),
        _ => None,
    }
}

fn effective_array_strategy(patch_strategy: ArrayStrategy, key: &str, has_existing_nonempty: bool) -> ArrayStrategy {
    if !matches!(patch_strategy, ArrayStrategy::Replace) {
        return patch_strategy;
    }
    if has_existing_nonempty {
        if let Some(promoted) = default_array_promotion(key) {
            return promoted;
        }
    }
    ArrayStrategy::Replace
}

fn is_nonempty_sequence(value: &Value) -> bool {
    matches!(value, Value::Sequence(seq) if !seq.is_empty())
}

/// Merges `patches` (stable-sorted by priority) into `original` and returns
/// the merged map plus an audit of every conflict encountered.
pub fn merge(
    original: &BTreeMap<String, Value>,
    patches: &[FrontMatterPatch],
) -> (BTreeMap<String, Value>, Vec<MergeConflict>) {
    let mut ordered: Vec<&FrontMatterPatch> = patches.iter().collect();
    ordered.sort_by_key(|p| p.priority);

    let mut base = original.clone();
    let mut conflicts = Vec::new();

    for patch in ordered {
        for (key, value) in &patch.data {
            apply_entry(&mut base, original, key, value, patch, &mut conflicts);
        }
    }

    (base, conflicts)
}

fn apply_entry(
    base: &mut BTreeMap<String, Value>,
    original: &BTreeMap<String, Value>,
    key: &str,
    value: &Value,
    patch: &FrontMatterPatch,
    conflicts: &mut Vec<MergeConflict>,
) {
    if matches!(patch.mode, MergeMode::SetIfMissing) {
        if base.contains_key(key) {
            conflicts.push(MergeConflict { key: key.to_string(), action: ConflictAction::KeptOriginal, source: patch.source.clone() });
        } else {
            base.insert(key.to_string(), value.clone());
            conflicts.push(MergeConflict { key: key.to_string(), action: ConflictAction::SetIfMissing, source: patch.source.clone() });
        }
        return;
    }

    if is_reserved(key) && original.contains_key(key) && !matches!(patch.mode, MergeMode::Replace) {
        let existing = base.get(key);
        if existing != Some(value) {
            conflicts.push(MergeConflict { key: key.to_string(), action: ConflictAction::KeptOriginal, source: patch.source.clone() });
        }
        return;
    }

    if matches!(patch.mode, MergeMode::Deep) {
        if let (Some(Value::Mapping(base_map)), Value::Mapping(new_map)) = (base.get(key).cloned(), value) {
            let merged = deep_merge_maps(&base_map, new_map, patch, original, key, conflicts);
            base.insert(key.to_string(), Value::Mapping(merged));
            return;
        }

        let existing_seq = base.get(key).cloned();
        if is_nonempty_sequence(value) || matches!(existing_seq, Some(Value::Sequence(_))) {
            if let Value::Sequence(new_seq) = value {
                let has_existing = matches!(&existing_seq, Some(v) if is_nonempty_sequence(v));
                let strategy = effective_array_strategy(patch.array_strategy, key, has_existing);
                let old_seq = match existing_seq {
                    Some(Value::Sequence(seq)) => seq,
                    _ => Vec::new(),
                };
                let merged = merge_arrays(&old_seq, new_seq, strategy);
                base.insert(key.to_string(), Value::Sequence(merged));
                return;
            }
        }
    }

    let existing = base.get(key);
    if existing.is_some() && existing != Some(value) {
        conflicts.push(MergeConflict { key: key.to_string(), action: ConflictAction::Overwritten, source: patch.source.clone() });
    }
    base.insert(key.to_string(), value.clone());
}

fn deep_merge_maps(
    base_map: &serde_yaml::Mapping,
    new_map: &serde_yaml::Mapping,
    patch: &FrontMatterPatch,
    original: &BTreeMap<String, Value>,
    parent_key: &str,
    conflicts: &mut Vec<MergeConflict>,
) -> serde_yaml::Mapping {
    let mut merged = base_map.clone();
    for (k, v) in new_map {
        let Some(key_str) = k.as_str() else {
            merged.insert(k.clone(), v.clone());
            continue;
        };
        let full_key = format!("{parent_key}.{key_str}");
        let existing = merged.get(k).cloned();
        if let (Some(Value::Mapping(existing_map)), Value::Mapping(new_nested)) = (existing.clone(), v) {
            let nested = deep_merge_maps(&existing_map, new_nested, patch, original, &full_key, conflicts);
            merged.insert(k.clone(), Value::Mapping(nested));
        } else {
            if existing.is_some() && existing.as_ref() != Some(v) {
                conflicts.push(MergeConflict { key: full_key, action: ConflictAction::Overwritten, source: patch.source.clone() });
            }
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

/// Merges `old` and `new` sequences per the resolved array strategy
/// (spec §4.5).
pub fn merge_arrays(old: &[Value], new: &[Value], strategy: ArrayStrategy) -> Vec<Value> {
    match strategy {
        ArrayStrategy::Replace => new.to_vec(),
        ArrayStrategy::Append => {
            let mut merged = old.to_vec();
            merged.extend(new.iter().cloned());
            merged
        }
        ArrayStrategy::Union => {
            let mut merged = old.to_vec();
            let existing_scalars: std::collections::HashSet<String> =
                old.iter().filter_map(stringify_scalar).collect();
            for item in new {
                match stringify_scalar(item) {
                    Some(s) if existing_scalars.contains(&s) => continue,
                    _ => merged.push(item.clone()),
                }
            }
            merged
        }
    }
}

fn stringify_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArrayStrategy, FrontMatterPatch, MergeMode};

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), yaml(v))).collect()
    }

    #[test]
    fn spec_scenario_five_front_matter_merge_conflicts() {
        let original = map(&[("title", "\"A\""), ("description", "\"B\""), ("weight", "10"), ("tags", "[alpha]")]);

        let patch_a = FrontMatterPatch::new("a", MergeMode::Deep, 1)
            .set("title", yaml("\"N\""))
            .set("keywords", yaml("[k1]"));
        let patch_b = FrontMatterPatch::new("b", MergeMode::Replace, 2).set("description", yaml("\"R\""));
        let patch_c = FrontMatterPatch::new("c", MergeMode::SetIfMissing, 3)
            .set("weight", yaml("42"))
            .set("summary", yaml("\"S\""));
        let patch_d = FrontMatterPatch::new("d", MergeMode::Deep, 4).set("tags", yaml("[alpha, beta]"));

        let (merged, conflicts) = merge(&original, &[patch_a, patch_b, patch_c, patch_d]);

        assert_eq!(merged.get("title"), Some(&yaml("\"A\"")));
        assert_eq!(merged.get("description"), Some(&yaml("\"R\"")));
        assert_eq!(merged.get("weight"), Some(&yaml("10")));
        assert_eq!(merged.get("summary"), Some(&yaml("\"S\"")));
        assert_eq!(merged.get("tags"), Some(&yaml("[alpha, beta]")));
        assert_eq!(merged.get("keywords"), Some(&yaml("[k1]")));

        assert!(conflicts.iter().any(|c| c.key == "title" && c.action == ConflictAction::KeptOriginal));
        assert!(conflicts.iter().any(|c| c.key == "description" && c.action == ConflictAction::Overwritten));
        assert!(conflicts.iter().any(|c| c.key == "weight" && c.action == ConflictAction::KeptOriginal));
        assert!(conflicts.iter().any(|c| c.key == "summary" && c.action == ConflictAction::SetIfMissing));
        assert!(!conflicts.iter().any(|c| c.key == "tags"));
        assert!(!conflicts.iter().any(|c| c.key == "keywords"));
    }

    #[test]
    fn merge_preserves_priority_order_regardless_of_declaration_order() {
        let original = BTreeMap::new();
        let low_priority = FrontMatterPatch::new("late", MergeMode::Replace, 10).set("x", yaml("\"late\""));
        let high_priority = FrontMatterPatch::new("early", MergeMode::Replace, 1).set("x", yaml("\"early\""));
        // Declared out of priority order on purpose.
        let (merged, _) = merge(&original, &[low_priority, high_priority]);
        assert_eq!(merged.get("x"), Some(&yaml("\"late\"")));
    }

    #[test]
    fn union_preserves_original_order_and_dedups() {
        let old = vec![yaml("\"a\""), yaml("\"b\"")];
        let new = vec![yaml("\"b\""), yaml("\"c\"")];
        let merged = merge_arrays(&old, &new, ArrayStrategy::Union);
        assert_eq!(merged, vec![yaml("\"a\""), yaml("\"b\""), yaml("\"c\"")]);
    }

    #[test]
    fn append_concatenates_without_dedup() {
        let old = vec![yaml("\"a\"")];
        let new = vec![yaml("\"a\"")];
        let merged = merge_arrays(&old, &new, ArrayStrategy::Append);
        assert_eq!(merged, vec![yaml("\"a\""), yaml("\"a\"")]);
    }

    #[test]
    fn replace_discards_old() {
        let old = vec![yaml("\"a\"")];
        let new = vec![yaml("\"b\"")];
        let merged = merge_arrays(&old, &new, ArrayStrategy::Replace);
        assert_eq!(merged, vec![yaml("\"b\"")]);
    }

    #[test]
    fn merged_keys_are_superset_of_original() {
        let original = map(&[("title", "\"A\"")]);
        let patch = FrontMatterPatch::new("p", MergeMode::Replace, 1).set("extra", yaml("1"));
        let (merged, _) = merge(&original, &[patch]);
        for key in original.keys() {
            assert!(merged.contains_key(key));
        }
    }

    #[test]
    fn reserved_key_replace_mode_bypasses_protection() {
        let original = map(&[("title", "\"A\"")]);
        let patch = FrontMatterPatch::new("p", MergeMode::Replace, 1).set("title", yaml("\"B\""));
        let (merged, conflicts) = merge(&original, &[patch]);
        assert_eq!(merged.get("title"), Some(&yaml("\"B\"")));
        assert!(conflicts.is_empty());
    }
}
