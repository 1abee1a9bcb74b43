//! Reshapes one raw submission into a main row plus child rows per repeat root.
//!
//! Pure: never touches storage or the network.

use log::debug;
use serde_json::{Map, Value};

use super::submissions_model::{Row, TransformedSubmission};
use crate::forms::{MAIN_ID_COLUMN, REPEAT_INDEX_COLUMN, SUBMISSION_ID_COLUMN};
use crate::identifiers::{last_segment, normalize_segment, sanitize_identifier};

/// Collapses nested objects into `/`-joined keys. Arrays are leaves.
pub fn flatten(value: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    let mut stack: Vec<(String, &Map<String, Value>)> = vec![(String::new(), value)];
    while let Some((prefix, obj)) = stack.pop() {
        for (key, val) in obj {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}/{key}")
            };
            match val {
                Value::Object(inner) => stack.push((path, inner)),
                other => {
                    out.insert(path, other.clone());
                }
            }
        }
    }
    out
}

/// Storage form of a value: `null` and `""` become NULL, leftover arrays and
/// objects become compact JSON text.
pub fn normalize_value(value: Value) -> Value {
    match value {
        Value::String(ref s) if s.is_empty() => Value::Null,
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        other => other,
    }
}

/// Sanitizes every key and normalizes every value. When two keys sanitize to
/// the same identifier the later one (in key order) wins.
pub fn to_sanitized_row(flat: Map<String, Value>) -> Row {
    flat.into_iter()
        .map(|(key, value)| (sanitize_identifier(&key), normalize_value(value)))
        .collect()
}

/// The external identifier carried by a main row, when it is an integer.
pub fn submission_id(main_row: &Row) -> Option<i64> {
    main_row.get(MAIN_ID_COLUMN).and_then(Value::as_i64)
}

fn same_segment(a: &str, b: &str) -> bool {
    normalize_segment(a).to_lowercase() == normalize_segment(b).to_lowercase()
}

/// Removes the repeat array for `root` from `submission`, trying the full
/// root path, then its tail, then the tail with a trailing comma.
fn take_repeat_array(submission: &mut Map<String, Value>, root: &str, tail: &str) -> Vec<Value> {
    let candidates = [root.to_string(), tail.to_string(), format!("{tail},")];
    let mut found = None;
    for key in &candidates {
        match submission.remove(key) {
            Some(Value::Array(items)) if !items.is_empty() => {
                found = Some(items);
                break;
            }
            Some(Value::Array(_)) | Some(Value::Null) | None => {}
            Some(other) => {
                debug!(
                    "[transform] repeat '{}' holds a non-array value ({}); treating as empty",
                    root,
                    type_name(&other)
                );
            }
        }
    }
    found.unwrap_or_default()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Moves every key of a repeat element under the full root path when the root
/// is nested under groups. Keys headed by the tail have the tail swapped for
/// the root; other keys, bare ones included, are prefixed with the root. Keys
/// already under the root are kept. A top-level root leaves keys as given.
fn qualify_key(key: String, root: &str, tail: &str) -> String {
    if root == tail {
        return key;
    }
    if key == root || key.starts_with(&format!("{root}/")) {
        return key;
    }
    let (head, rest) = match key.split_once('/') {
        Some((head, rest)) => (head, Some(rest)),
        None => (key.as_str(), None),
    };
    if !same_segment(head, tail) {
        return format!("{root}/{key}");
    }
    match rest {
        Some(rest) => format!("{root}/{rest}"),
        None => root.to_string(),
    }
}

fn child_row(
    element: Value,
    root: &str,
    tail: &str,
    parent_id: &Value,
    index: usize,
) -> Row {
    let object = match element {
        Value::Object(obj) => obj,
        other => {
            let mut wrapped = Map::new();
            wrapped.insert(tail.to_string(), other);
            wrapped
        }
    };
    let mut full = Map::new();
    for (key, value) in flatten(&object) {
        full.insert(qualify_key(key, root, tail), value);
    }
    full.insert(SUBMISSION_ID_COLUMN.to_string(), parent_id.clone());
    full.insert(REPEAT_INDEX_COLUMN.to_string(), Value::from(index as u64));
    to_sanitized_row(full)
}

/// Splits a submission into its main row and child rows.
///
/// Every root in `repeat_roots` gets an entry in the result, empty when the
/// submission has no instances of it. A missing or non-array repeat value is
/// treated as empty.
pub fn prepare_rows(submission: &Value, repeat_roots: &[String]) -> TransformedSubmission {
    let mut remaining = match submission {
        Value::Object(obj) => obj.clone(),
        _ => Map::new(),
    };
    let parent_id = remaining
        .get(MAIN_ID_COLUMN)
        .cloned()
        .unwrap_or(Value::Null);

    let mut result = TransformedSubmission::default();
    for root in repeat_roots {
        let tail = last_segment(root);
        let rows = take_repeat_array(&mut remaining, root, tail)
            .into_iter()
            .enumerate()
            .map(|(i, element)| child_row(element, root, tail, &parent_id, i + 1))
            .collect();
        result.repeat_rows.insert(root.clone(), rows);
    }
    result.main_row = to_sanitized_row(flatten(&remaining));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roots(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn splits_repeat_instances_into_indexed_child_rows() {
        let sub = json!({"_id": 7, "kids": [{"name": "A"}, {"name": "B"}]});
        let out = prepare_rows(&sub, &roots(&["kids"]));

        assert_eq!(out.main_row.get("_id"), Some(&json!(7)));
        assert!(!out.main_row.contains_key("kids"));

        let kids = &out.repeat_rows["kids"];
        assert_eq!(kids.len(), 2);
        assert_eq!(kids[0]["_submission_id"], json!(7));
        assert_eq!(kids[0]["repeat_index"], json!(1));
        assert_eq!(kids[0]["name"], json!("A"));
        assert_eq!(kids[1]["repeat_index"], json!(2));
        assert_eq!(kids[1]["name"], json!("B"));
        assert_eq!(kids[0].len(), 3);
    }

    #[test]
    fn nested_root_requalifies_every_element_key() {
        let sub = json!({
            "_id": 3,
            "kids": [{"kids/name": "A", "kids/age": 4, "note": "x"}]
        });
        let out = prepare_rows(&sub, &roots(&["family/kids"]));
        let row = &out.repeat_rows["family/kids"][0];
        assert_eq!(row["family_kids_name"], json!("A"));
        assert_eq!(row["family_kids_age"], json!(4));
        assert_eq!(row["family_kids_note"], json!("x"));
        assert!(!row.contains_key("note"));
    }

    #[test]
    fn nested_root_prefixes_bare_keys_with_root_path() {
        let sub = json!({"_id": 7, "kids": [{"name": "A"}, {"name": "B"}]});
        let out = prepare_rows(&sub, &roots(&["family/kids"]));
        let kids = &out.repeat_rows["family/kids"];
        let keys: Vec<&str> = kids[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["_submission_id", "family_kids_name", "repeat_index"]);
        assert_eq!(kids[1]["family_kids_name"], json!("B"));
    }

    #[test]
    fn full_path_keys_are_kept() {
        let sub = json!({
            "_id": 3,
            "family/kids": [{"family/kids/name": "A"}]
        });
        let out = prepare_rows(&sub, &roots(&["family/kids"]));
        assert_eq!(out.repeat_rows["family/kids"][0]["family_kids_name"], json!("A"));
        assert!(!out.main_row.contains_key("family_kids"));
    }

    #[test]
    fn trailing_comma_key_is_accepted() {
        let sub = json!({"_id": 1, "kids,": [{"name": "A"}]});
        let out = prepare_rows(&sub, &roots(&["kids"]));
        assert_eq!(out.repeat_rows["kids"].len(), 1);
        assert!(!out.main_row.contains_key("kids_"));
    }

    #[test]
    fn missing_or_malformed_repeat_is_empty() {
        let sub = json!({"_id": 1, "kids": "oops"});
        let out = prepare_rows(&sub, &roots(&["kids", "pets"]));
        assert!(out.repeat_rows["kids"].is_empty());
        assert!(out.repeat_rows["pets"].is_empty());
        assert_eq!(out.repeat_row_count(), 0);
    }

    #[test]
    fn groups_flatten_into_slash_joined_columns() {
        let sub = json!({
            "_id": 2,
            "meta": {"instanceID": "uuid:1"},
            "household": {"size": 4, "head": {"name": "Z"}}
        });
        let out = prepare_rows(&sub, &[]);
        assert_eq!(out.main_row["meta_instanceid"], json!("uuid:1"));
        assert_eq!(out.main_row["household_size"], json!(4));
        assert_eq!(out.main_row["household_head_name"], json!("Z"));
    }

    #[test]
    fn values_are_normalized() {
        let sub = json!({
            "_id": 5,
            "blank": "",
            "missing": null,
            "_tags": ["a", "b"],
            "flag": true
        });
        let out = prepare_rows(&sub, &[]);
        assert_eq!(out.main_row["blank"], Value::Null);
        assert_eq!(out.main_row["missing"], Value::Null);
        assert_eq!(out.main_row["_tags"], json!("[\"a\",\"b\"]"));
        assert_eq!(out.main_row["flag"], json!(true));
    }

    #[test]
    fn scalar_repeat_elements_become_single_column_rows() {
        let sub = json!({"_id": 9, "tags": ["red"]});
        let out = prepare_rows(&sub, &roots(&["group/tags"]));
        let row = &out.repeat_rows["group/tags"][0];
        assert_eq!(row["group_tags"], json!("red"));
        assert_eq!(row["repeat_index"], json!(1));
    }

    #[test]
    fn transform_is_deterministic() {
        let sub = json!({"_id": 7, "a/b": 1, "kids": [{"x": {"y": 2}}]});
        let r = roots(&["kids"]);
        assert_eq!(prepare_rows(&sub, &r), prepare_rows(&sub, &r));
        assert_eq!(prepare_rows(&sub, &r).repeat_rows["kids"][0]["x_y"], json!(2));
    }

    #[test]
    fn submission_id_reads_integer_ids() {
        let id_of = |sub: Value| submission_id(&prepare_rows(&sub, &[]).main_row);
        assert_eq!(id_of(json!({"_id": 12})), Some(12));
        assert_eq!(id_of(json!({"_id": "12"})), None);
        assert_eq!(id_of(json!({"_id": null})), None);
        assert_eq!(id_of(json!({"name": "no id"})), None);
    }
}
