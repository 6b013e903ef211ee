use crate::value::Value;
use std::collections::BTreeMap;

/// Nested objects deeper than this are dropped.
const MAX_DEPTH: usize = 16;

/// Flatten a nested JSON document into dotted parameter names.
///
/// Scalars and arrays become typed values; nulls are skipped.
pub fn flatten_json(root: &serde_json::Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    walk(root, String::new(), 0, &mut out);
    out
}

fn walk(node: &serde_json::Value, prefix: String, depth: usize, out: &mut BTreeMap<String, Value>) {
    match node {
        serde_json::Value::Object(map) => {
            if depth >= MAX_DEPTH {
                return;
            }
            for (key, child) in map {
                let name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                walk(child, name, depth + 1, out);
            }
        }
        other => {
            if prefix.is_empty() {
                return;
            }
            if let Some(value) = Value::from_json(other) {
                out.insert(prefix, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nested_objects_become_dotted_names() {
        let doc = serde_json::json!({
            "schedule": {
                "low-space-ratio": 0.8,
                "enable-joint-consensus": true,
                "store-limit": {"1": {"add-peer": 15}}
            },
            "replication": {"location-labels": ["zone", "host"], "isolation-level": ""},
            "pd-server": {"metric-storage": null}
        });
        let flat = flatten_json(&doc);
        assert_eq!(flat.get("schedule.low-space-ratio"), Some(&Value::Float(0.8)));
        assert_eq!(flat.get("schedule.enable-joint-consensus"), Some(&Value::Bool(true)));
        assert_eq!(flat.get("schedule.store-limit.1.add-peer"), Some(&Value::Int(15)));
        assert_eq!(
            flat.get("replication.location-labels"),
            Some(&Value::StringList(vec!["zone".into(), "host".into()]))
        );
        assert!(!flat.contains_key("pd-server.metric-storage"));
        assert_eq!(flat.len(), 5);
    }
}
