//! Dotted-path access into a configuration tree (`"stock_info.enabled"`).

use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Leaf or subtree at `path`, if every segment resolves through a map.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.')
        .try_fold(doc, |node, segment| node.as_object()?.get(segment))
}

/// Store `value` at `path`, creating intermediate maps as needed.
///
/// An intermediate node that is not a map is replaced by an empty map.
pub fn assign(doc: &mut Value, path: &str, value: Value) -> Result<(), ConfigError> {
    let mut segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ConfigError::InvalidPath(path.to_string()));
    }
    let Some(leaf) = segments.pop() else {
        return Err(ConfigError::InvalidPath(path.to_string()));
    };

    let mut node = doc;
    for segment in segments {
        node = as_map(node, path)?
            .entry(segment)
            .or_insert_with(|| Value::Object(Map::new()));
    }
    as_map(node, path)?.insert(leaf.to_string(), value);
    Ok(())
}

fn as_map<'a>(node: &'a mut Value, path: &str) -> Result<&'a mut Map<String, Value>, ConfigError> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    node.as_object_mut()
        .ok_or_else(|| ConfigError::InvalidPath(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_leaf() {
        let doc = json!({"a": {"b": {"c": 5}}});
        assert_eq!(lookup(&doc, "a.b.c"), Some(&json!(5)));
        assert_eq!(lookup(&doc, "a.b"), Some(&json!({"c": 5})));
    }

    #[test]
    fn missing_or_non_map_segments_resolve_to_none() {
        let doc = json!({"a": {"b": 1}, "list": [1, 2]});
        assert_eq!(lookup(&doc, "x.y.z"), None);
        assert_eq!(lookup(&doc, "a.b.c"), None);
        assert_eq!(lookup(&doc, "list.0"), None);
        assert_eq!(lookup(&doc, ""), None);
    }

    #[test]
    fn assign_creates_intermediate_maps() {
        let mut doc = json!({});
        assign(&mut doc, "a.b.c", json!(5)).unwrap();
        assert_eq!(doc, json!({"a": {"b": {"c": 5}}}));
    }

    #[test]
    fn assign_keeps_siblings() {
        let mut doc = json!({"a": {"keep": true}});
        assign(&mut doc, "a.new", json!("x")).unwrap();
        assert_eq!(doc, json!({"a": {"keep": true, "new": "x"}}));
    }

    #[test]
    fn assign_replaces_scalar_intermediate() {
        let mut doc = json!({"a": 1});
        assign(&mut doc, "a.b", json!(2)).unwrap();
        assert_eq!(doc, json!({"a": {"b": 2}}));
    }

    #[test]
    fn assign_rejects_empty_segments() {
        let mut doc = json!({});
        for bad in ["", "a..b", ".a", "a."] {
            assert!(matches!(
                assign(&mut doc, bad, json!(1)),
                Err(ConfigError::InvalidPath(_))
            ));
        }
        assert_eq!(doc, json!({}));
    }
}
