//! Search of the untyped probe tree returned alongside an answer.
//!
//! The probe is a diagnostic payload whose nodes are tagged by pipeline stage.
//! The node holding the retrieval chunks is the object that has some entry whose
//! value is the merged-neighbouring-context marker; its chunk list lives under
//! `data.Input`. That payload shape belongs to the remote service.

use serde_json::{Map, Value};
use tracing::warn;

use crate::types::ContextChunk;

/// Marker value identifying the merged-neighbouring-context probe node.
pub const MERGE_MARKER: &str = "MERGE_NEIGHBOURING_CONTEXT";

/// Pre-order search for the first object with an entry satisfying `is_match`.
///
/// Object entries are visited in document order. For each entry the value is
/// tested first; when it does not match and is a container it is searched
/// before moving to the next entry. Array elements are visited by index.
pub fn find_node<'a, F>(value: &'a Value, is_match: &F) -> Option<&'a Map<String, Value>>
where
    F: Fn(&str, &Value) -> bool,
{
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if is_match(key, child) {
                    return Some(map);
                }
                if (child.is_object() || child.is_array())
                    && let Some(found) = find_node(child, is_match)
                {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(|item| find_node(item, is_match)),
        _ => None,
    }
}

/// Find the first object with any entry whose value is the string `marker`.
pub fn find_tagged<'a>(value: &'a Value, marker: &str) -> Option<&'a Map<String, Value>> {
    find_node(value, &|_, v: &Value| v.as_str() == Some(marker))
}

/// Chunk list of the merged-neighbouring-context node, if the probe has one.
///
/// A tagged node without a readable `data.Input` list counts as no match.
pub fn merged_context_chunks(probe: &Value) -> Option<Vec<ContextChunk>> {
    let node = find_tagged(probe, MERGE_MARKER)?;
    let input = node.get("data")?.get("Input")?;
    match serde_json::from_value::<Vec<ContextChunk>>(input.clone()) {
        Ok(chunks) => Some(chunks),
        Err(e) => {
            warn!(error = %e, "Merged context node has an unreadable chunk list");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn merge_node(contents: &[&str]) -> Value {
        let input: Vec<Value> = contents.iter().map(|c| json!({"Content": c})).collect();
        json!({"stage": MERGE_MARKER, "data": {"Input": input, "Output": []}})
    }

    #[test]
    fn test_finds_top_level_node() {
        let probe = merge_node(&["a", "b"]);
        let chunks = merged_context_chunks(&probe).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "a");
    }

    #[test]
    fn test_finds_deeply_nested_node() {
        let probe = json!({
            "pipeline": [
                {"stage": "RETRIEVE", "data": {"Input": [{"Content": "wrong"}]}},
                {"children": [[{"nested": {"steps": [merge_node(&["deep"])]}}]]}
            ]
        });
        let chunks = merged_context_chunks(&probe).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "deep");
    }

    #[test]
    fn test_marker_under_any_key() {
        let probe = json!([{"x": 1}, {"whatever": MERGE_MARKER, "data": {"Input": [{"Content": "c"}]}}]);
        assert_eq!(merged_context_chunks(&probe).unwrap()[0].content, "c");
    }

    #[test]
    fn test_missing_marker_returns_none() {
        let probe = json!({"steps": [{"stage": "RERANK", "data": {"Input": []}}]});
        assert!(merged_context_chunks(&probe).is_none());
        assert!(merged_context_chunks(&Value::Null).is_none());
    }

    #[test]
    fn test_first_match_wins_in_preorder() {
        // The first entry's subtree is searched before later siblings are tested.
        let probe = json!({
            "a": {"inner": merge_node(&["first"])},
            "b": MERGE_MARKER,
            "data": {"Input": [{"Content": "outer"}]}
        });
        assert_eq!(merged_context_chunks(&probe).unwrap()[0].content, "first");
    }

    #[test]
    fn test_tagged_node_without_input_is_no_match() {
        let probe = json!({"stage": MERGE_MARKER, "data": {}});
        assert!(merged_context_chunks(&probe).is_none());
    }

    #[test]
    fn test_find_node_generic_predicate() {
        let tree = json!({"a": [{"id": 3}, {"id": 7, "name": "seven"}]});
        let node = find_node(&tree, &|k, v| k == "id" && v.as_i64() == Some(7)).unwrap();
        assert_eq!(node.get("name"), Some(&json!("seven")));
    }
}
