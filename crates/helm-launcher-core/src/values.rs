//! Path-addressed reads and writes on plain `serde_json::Value` trees.

use serde_json::{Map, Value};

use crate::path::PathSegment;

/// Value at `segments`, if every step exists.
pub fn get_in<'a>(value: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(value, |current, segment| match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get(key),
            (Value::Array(items), PathSegment::Index(i)) => items.get(*i),
            _ => None,
        })
}

pub(crate) fn get_in_mut<'a>(value: &'a mut Value, segments: &[PathSegment]) -> Option<&'a mut Value> {
    segments
        .iter()
        .try_fold(value, |current, segment| match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get_mut(key),
            (Value::Array(items), PathSegment::Index(i)) => items.get_mut(*i),
            _ => None,
        })
}

/// Write `new` at `segments`, creating intermediate containers.
///
/// A step whose container has the wrong kind is replaced by an empty
/// container of the right kind. Missing array slots before the target index
/// are filled with `fill(array_path)`.
pub(crate) fn set_in<F>(root: &mut Value, segments: &[PathSegment], new: Value, fill: &F)
where
    F: Fn(&[PathSegment]) -> Value,
{
    let mut current = root;
    for (depth, segment) in segments.iter().enumerate() {
        current = match segment {
            PathSegment::Key(key) => {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                let Value::Object(map) = current else {
                    return;
                };
                map.entry(key.clone()).or_insert(Value::Null)
            }
            PathSegment::Index(index) => {
                if !current.is_array() {
                    *current = Value::Array(Vec::new());
                }
                let Value::Array(items) = current else {
                    return;
                };
                while items.len() <= *index {
                    items.push(fill(&segments[..depth]));
                }
                &mut items[*index]
            }
        };
    }
    *current = new;
}

/// Remove the value at `segments`: an object key is dropped, an array is
/// truncated at the index. Missing paths are left alone.
pub(crate) fn delete_in(root: &mut Value, segments: &[PathSegment]) {
    let Some((last, parent_segments)) = segments.split_last() else {
        return;
    };
    match (get_in_mut(root, parent_segments), last) {
        (Some(Value::Object(map)), PathSegment::Key(key)) => {
            map.shift_remove(key);
        }
        (Some(Value::Array(items)), PathSegment::Index(index)) => {
            items.truncate(*index);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn no_fill(_: &[PathSegment]) -> Value {
        Value::Null
    }

    #[test]
    fn test_get_in_mixed_path() {
        let v = json!({"env": [{"name": "A"}, {"name": "B"}]});
        assert_eq!(
            get_in(&v, path!["env", 1, "name"].segments()),
            Some(&json!("B"))
        );
        assert_eq!(get_in(&v, path!["env", 5].segments()), None);
        assert_eq!(get_in(&v, path!["env", "name"].segments()), None);
    }

    #[test]
    fn test_set_in_creates_intermediates() {
        let mut v = json!({});
        set_in(
            &mut v,
            path!["resources", "limits", "memory"].segments(),
            json!("2Gi"),
            &no_fill,
        );
        assert_eq!(v, json!({"resources": {"limits": {"memory": "2Gi"}}}));
    }

    #[test]
    fn test_set_in_fills_missing_slots() {
        let mut v = json!({"env": []});
        let fill = |array_path: &[PathSegment]| {
            assert_eq!(array_path, path!["env"].segments());
            json!({"name": ""})
        };
        set_in(&mut v, path!["env", 2, "name"].segments(), json!("C"), &fill);
        assert_eq!(
            v,
            json!({"env": [{"name": ""}, {"name": ""}, {"name": "C"}]})
        );
    }

    #[test]
    fn test_set_in_replaces_wrong_container_kind() {
        let mut v = json!({"env": "oops"});
        set_in(&mut v, path!["env", 0].segments(), json!("A"), &no_fill);
        assert_eq!(v, json!({"env": ["A"]}));
    }

    #[test]
    fn test_delete_in_key_and_truncate() {
        let mut v = json!({"a": 1, "b": 2, "list": [1, 2, 3, 4]});
        delete_in(&mut v, path!["a"].segments());
        delete_in(&mut v, path!["list", 2].segments());
        delete_in(&mut v, path!["missing", "deep"].segments());
        assert_eq!(v, json!({"b": 2, "list": [1, 2]}));
    }
}
