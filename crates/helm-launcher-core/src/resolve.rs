//! Effective-value resolution and minimal diffing.
//!
//! [`resolve`] folds a [`PatchStore`] over the chart defaults; [`compute_diff`]
//! is its inverse, producing the smallest set of entries that turns the
//! defaults into a given tree. Both are pure functions of their arguments.

use serde_json::Value;

use crate::patch::{PatchEntry, PatchOp, PatchStore};
use crate::path::{HelmValuesPath, PathSegment};
use crate::schema::{NodeKind, SchemaNode};
use crate::values::{delete_in, get_in, set_in};

/// Merge `defaults` with `store` into the effective values tree.
///
/// Entries are applied in path order. Entries whose path the schema does not
/// allow are skipped with a warning. Array slots created on the way to an
/// entry are filled with the array's item template.
pub fn resolve(defaults: &Value, store: &PatchStore, schema: &SchemaNode) -> Value {
    let mut tree = defaults.clone();
    let fill = |array_path: &[PathSegment]| {
        schema
            .node_at(array_path)
            .and_then(SchemaNode::item_template)
            .unwrap_or(Value::Null)
    };

    for (path, op) in store.iter() {
        if !schema.allows(path.segments()) {
            tracing::warn!(path = %path, "ignoring patch outside the schema");
            continue;
        }
        match op {
            PatchOp::Set(value) => set_in(&mut tree, path.segments(), value.clone(), &fill),
            PatchOp::Delete => delete_in(&mut tree, path.segments()),
        }
    }

    tree
}

/// Smallest list of entries such that `resolve(defaults, entries) == current`.
///
/// Leaves equal to their default produce nothing. Structured nodes are
/// compared member by member; array elements past the default length and
/// opaque leaves (yaml blocks) are recorded whole; shrunken arrays get one
/// truncating delete; vanished keys get a delete.
pub fn compute_diff(defaults: &Value, current: &Value, schema: &SchemaNode) -> Vec<PatchEntry> {
    let mut out = Vec::new();
    diff_node(
        Some(defaults),
        current,
        &HelmValuesPath::root(),
        Some(schema),
        &mut out,
    );
    out
}

fn diff_node(
    default: Option<&Value>,
    current: &Value,
    path: &HelmValuesPath,
    schema: Option<&SchemaNode>,
    out: &mut Vec<PatchEntry>,
) {
    if default == Some(current) {
        return;
    }
    let is_leaf = matches!(schema.map(|s| &s.kind), Some(NodeKind::Scalar(_)));

    match (default, current) {
        (Some(Value::Object(defaults)), Value::Object(values)) if !is_leaf => {
            for (key, value) in values {
                diff_node(
                    defaults.get(key),
                    value,
                    &path.key(key),
                    schema.and_then(|s| s.node_at(&[PathSegment::Key(key.clone())])),
                    out,
                );
            }
            for key in defaults.keys() {
                if !values.contains_key(key) {
                    out.push(PatchEntry::delete(path.key(key)));
                }
            }
        }
        (Some(Value::Array(defaults)), Value::Array(values)) if !is_leaf => {
            let items = schema.and_then(|s| match &s.kind {
                NodeKind::Array(array) => Some(array.items.as_ref()),
                _ => None,
            });
            for (index, value) in values.iter().enumerate() {
                match defaults.get(index) {
                    Some(default) => {
                        diff_node(Some(default), value, &path.index(index), items, out)
                    }
                    None => out.push(PatchEntry::set(path.index(index), value.clone())),
                }
            }
            if values.len() < defaults.len() {
                out.push(PatchEntry::delete(path.index(values.len())));
            }
        }
        _ => out.push(PatchEntry::set(path.clone(), current.clone())),
    }
}

/// Default value at `path`, if the chart defines one.
pub fn default_at<'a>(defaults: &'a Value, path: &HelmValuesPath) -> Option<&'a Value> {
    get_in(defaults, path.segments())
}

/// RFC 6902 patch turning the defaults into the resolved values.
pub fn to_json_patch(defaults: &Value, store: &PatchStore, schema: &SchemaNode) -> json_patch::Patch {
    let resolved = resolve(defaults, store, schema);
    json_patch::diff(defaults, &resolved)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use crate::schema::parse_schema;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> SchemaNode {
        parse_schema(
            &json!({
                "type": "object",
                "properties": {
                    "replicas": { "type": "integer" },
                    "image": { "type": "string" },
                    "env": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": { "type": "string" },
                                "value": { "type": "string" }
                            }
                        }
                    },
                    "podAnnotations": { "type": "object" },
                    "locked": {
                        "type": "object",
                        "additionalProperties": false,
                        "properties": { "a": { "type": "integer" } }
                    }
                }
            }),
            32,
        )
        .unwrap()
    }

    #[test]
    fn test_empty_store_yields_defaults() {
        let defaults = json!({"replicas": 1, "image": "nginx"});
        let resolved = resolve(&defaults, &PatchStore::new(), &schema());
        assert_eq!(resolved, defaults);
    }

    #[test]
    fn test_single_field_edit() {
        let defaults = json!({"replicas": 1, "image": "nginx"});
        let mut store = PatchStore::new();
        store.set(path!["replicas"], json!(3));
        assert_eq!(
            resolve(&defaults, &store, &schema()),
            json!({"replicas": 3, "image": "nginx"})
        );
        assert_eq!(
            store.to_diff_list(),
            vec![PatchEntry::set(path!["replicas"], json!(3))]
        );
    }

    #[test]
    fn test_patch_outside_schema_is_ignored() {
        let defaults = json!({"replicas": 1, "locked": {"a": 1}});
        let mut store = PatchStore::new();
        store.set(path!["replicas", "nested"], json!(1));
        store.set(path!["locked", "b"], json!(2));
        store.set(path!["podAnnotations", "x.io/y"], json!("z"));
        assert_eq!(
            resolve(&defaults, &store, &schema()),
            json!({"replicas": 1, "locked": {"a": 1}, "podAnnotations": {"x.io/y": "z"}})
        );
    }

    #[test]
    fn test_missing_array_slots_use_item_template() {
        let defaults = json!({"env": []});
        let mut store = PatchStore::new();
        store.set(path!["env", 1, "name"], json!("B"));
        assert_eq!(
            resolve(&defaults, &store, &schema()),
            json!({"env": [{"name": "", "value": ""}, {"name": "B", "value": ""}]})
        );
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let defaults = json!({"env": [{"name": "A", "value": "1"}], "image": "nginx"});
        let store = PatchStore::from_diff_list(vec![
            PatchEntry::set(path!["env", 0, "value"], json!("2")),
            PatchEntry::set(path!["env", 1], json!({"name": "B", "value": "3"})),
            PatchEntry::delete(path!["image"]),
        ]);
        let first = resolve(&defaults, &store, &schema());
        let second = resolve(&defaults, &store, &schema());
        assert_eq!(first, second);
        assert_eq!(
            first,
            json!({"env": [{"name": "A", "value": "2"}, {"name": "B", "value": "3"}]})
        );
    }

    #[test]
    fn test_diff_of_defaults_is_empty() {
        let defaults = json!({"replicas": 1, "env": [{"name": "A", "value": "1"}]});
        assert!(compute_diff(&defaults, &defaults, &schema()).is_empty());
    }

    #[test]
    fn test_diff_is_minimal_and_resolves_back() {
        let schema = schema();
        let defaults = json!({
            "replicas": 1,
            "image": "nginx",
            "env": [{"name": "A", "value": "1"}, {"name": "B", "value": "2"}],
            "podAnnotations": {"a": "1"}
        });
        let current = json!({
            "replicas": 1,
            "env": [{"name": "A", "value": "9"}],
            "podAnnotations": {"a": "1", "b": "2"}
        });

        let diff = compute_diff(&defaults, &current, &schema);
        assert_eq!(
            diff,
            vec![
                PatchEntry::set(path!["env", 0, "value"], json!("9")),
                PatchEntry::delete(path!["env", 1]),
                PatchEntry::set(path!["podAnnotations"], json!({"a": "1", "b": "2"})),
                PatchEntry::delete(path!["image"]),
            ]
        );

        let store = PatchStore::from_diff_list(diff);
        assert_eq!(resolve(&defaults, &store, &schema), current);
    }

    #[test]
    fn test_diff_records_grown_elements_whole() {
        let schema = schema();
        let defaults = json!({"env": []});
        let current = json!({"env": [{"name": "", "value": ""}, {"name": "X", "value": ""}]});
        let diff = compute_diff(&defaults, &current, &schema);
        assert_eq!(
            diff,
            vec![
                PatchEntry::set(path!["env", 0], json!({"name": "", "value": ""})),
                PatchEntry::set(path!["env", 1], json!({"name": "X", "value": ""})),
            ]
        );
        assert_eq!(
            resolve(&defaults, &PatchStore::from_diff_list(diff), &schema),
            current
        );
    }

    #[test]
    fn test_json_patch_export_applies_to_defaults() {
        let schema = schema();
        let defaults = json!({"replicas": 1, "image": "nginx"});
        let mut store = PatchStore::new();
        store.set(path!["replicas"], json!(4));
        store.set(path!["env", 0, "name"], json!("A"));

        let patch = to_json_patch(&defaults, &store, &schema);
        let mut applied = defaults.clone();
        json_patch::patch(&mut applied, &patch).unwrap();
        assert_eq!(applied, resolve(&defaults, &store, &schema));
    }
}
