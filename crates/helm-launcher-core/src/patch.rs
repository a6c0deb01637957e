//! The Patch Store: the user's deviations from the chart defaults.
//!
//! Entries are keyed by [`HelmValuesPath`] (structural equality, last write
//! wins) and kept in path order, which is also the order the resolver applies
//! them in: a container entry always lands before the entries below it.
//!
//! An entry either sets a value or deletes the value at its path. Deleting an
//! object key removes it; deleting an array index truncates the array there.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::path::{HelmValuesPath, PathSegment};
use crate::values::set_in;

/// What a patch entry does at its path.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    Set(Value),
    Delete,
}

impl PatchOp {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            PatchOp::Set(v) => Some(v),
            PatchOp::Delete => None,
        }
    }
}

/// Wire form of one entry. `value` absent means "undefined" (delete); a JSON
/// `null` is a real value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchEntry {
    pub path: HelmValuesPath,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
}

fn deserialize_present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

impl PatchEntry {
    pub fn set(path: HelmValuesPath, value: Value) -> Self {
        Self {
            path,
            value: Some(value),
        }
    }

    pub fn delete(path: HelmValuesPath) -> Self {
        Self { path, value: None }
    }

    fn into_parts(self) -> (HelmValuesPath, PatchOp) {
        let op = match self.value {
            Some(v) => PatchOp::Set(v),
            None => PatchOp::Delete,
        };
        (self.path, op)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchStore {
    entries: BTreeMap<HelmValuesPath, PatchOp>,
}

impl PatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record `value` at `path`, replacing any entry at the same path.
    pub fn set(&mut self, path: HelmValuesPath, value: Value) {
        self.entries.insert(path, PatchOp::Set(value));
    }

    /// Record a deletion at `path`.
    pub fn delete(&mut self, path: HelmValuesPath) {
        self.entries.insert(path, PatchOp::Delete);
    }

    /// Drop the entry at `path`; the default shows through again. No-op when
    /// there is no entry.
    pub fn unset(&mut self, path: &HelmValuesPath) {
        self.entries.remove(path);
    }

    pub fn get(&self, path: &HelmValuesPath) -> Option<&PatchOp> {
        self.entries.get(path)
    }

    /// Clear every entry at once.
    pub fn restore_all_default(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HelmValuesPath, &PatchOp)> {
        self.entries.iter()
    }

    pub fn to_diff_list(&self) -> Vec<PatchEntry> {
        self.entries
            .iter()
            .map(|(path, op)| PatchEntry {
                path: path.clone(),
                value: op.as_value().cloned(),
            })
            .collect()
    }

    /// Rebuild a store; a later entry wins over an earlier one at the same path.
    pub fn from_diff_list(entries: impl IntoIterator<Item = PatchEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(PatchEntry::into_parts).collect(),
        }
    }

    /// Drop `prefix` and every entry below it.
    pub fn unset_subtree(&mut self, prefix: &HelmValuesPath) {
        self.entries.retain(|path, _| !path.starts_with(prefix));
    }

    /// Replace everything at or below `prefix` with `entries`.
    pub fn replace_subtree(
        &mut self,
        prefix: &HelmValuesPath,
        entries: impl IntoIterator<Item = PatchEntry>,
    ) {
        self.unset_subtree(prefix);
        for entry in entries {
            let (path, op) = entry.into_parts();
            self.entries.insert(path, op);
        }
    }

    /// Rebase after removing element `index` of the array at `array_path`.
    ///
    /// Entries under `array_path[index]` are dropped; entries under
    /// `array_path[j]` for `j > index` move to `array_path[j - 1]`.
    pub fn remove_array_index(&mut self, array_path: &HelmValuesPath, index: usize) {
        let position = array_path.len();
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries
            .into_iter()
            .filter_map(|(path, op)| {
                let element = path
                    .strip_prefix(array_path)
                    .and_then(|rest| rest.first())
                    .and_then(PathSegment::as_index);
                match element {
                    Some(j) if j == index => None,
                    Some(j) if j > index => {
                        Some((path.with_segment(position, PathSegment::Index(j - 1)), op))
                    }
                    _ => Some((path, op)),
                }
            })
            .collect();
    }

    /// Nearest strict ancestor of `path` holding a container value.
    pub fn container_ancestor(&self, path: &HelmValuesPath) -> Option<&HelmValuesPath> {
        self.entries
            .range(..path.clone())
            .rev()
            .find(|(candidate, op)| {
                path.starts_with(candidate)
                    && matches!(op, PatchOp::Set(Value::Object(_) | Value::Array(_)))
            })
            .map(|(candidate, _)| candidate)
    }

    /// Nearest entry at or above `path` holding a container value.
    pub fn covering_container(&self, path: &HelmValuesPath) -> Option<&HelmValuesPath> {
        match self.entries.get(path) {
            Some(PatchOp::Set(Value::Object(_) | Value::Array(_))) => self
                .entries
                .get_key_value(path)
                .map(|(candidate, _)| candidate),
            _ => self.container_ancestor(path),
        }
    }

    /// Replace the value at `path` inside the container entry at or above
    /// it, dropping entries below `path` that `value` already accounts for.
    ///
    /// Returns `false` when no such container entry exists, in which case
    /// nothing is changed.
    pub fn replace_covered(&mut self, path: &HelmValuesPath, value: Value) -> bool {
        let Some(container) = self.covering_container(path).cloned() else {
            return false;
        };
        self.entries
            .retain(|candidate, _| candidate == path || !candidate.starts_with(path));
        if container == *path {
            self.set(container, value);
            true
        } else {
            self.set_within_container(path, value)
        }
    }

    /// Write `value` inside the container entry that covers `path`, if any.
    ///
    /// Returns `false` when no ancestor entry holds a container, in which case
    /// nothing is changed.
    pub fn set_within_container(&mut self, path: &HelmValuesPath, value: Value) -> bool {
        let Some(ancestor) = self.container_ancestor(path).cloned() else {
            return false;
        };
        let Some(PatchOp::Set(container)) = self.entries.get_mut(&ancestor) else {
            return false;
        };
        let relative = path.strip_prefix(&ancestor).unwrap_or_default();
        set_in(container, relative, value, &|_| Value::Null);
        true
    }
}

impl FromIterator<PatchEntry> for PatchStore {
    fn from_iter<I: IntoIterator<Item = PatchEntry>>(iter: I) -> Self {
        Self::from_diff_list(iter)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_set_overwrites_by_structural_path() {
        let mut store = PatchStore::new();
        store.set(path!["replicas"], json!(2));
        store.set(path!["replicas"], json!(3));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&path!["replicas"]), Some(&PatchOp::Set(json!(3))));
    }

    #[test]
    fn test_unset_missing_is_noop() {
        let mut store = PatchStore::new();
        store.set(path!["a"], json!(1));
        store.unset(&path!["b"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_restore_all_default_clears() {
        let mut store = PatchStore::new();
        store.set(path!["a"], json!(1));
        store.delete(path!["b"]);
        store.restore_all_default();
        assert!(store.is_empty());
    }

    #[test]
    fn test_diff_list_round_trip_keeps_null_and_delete_apart() {
        let mut store = PatchStore::new();
        store.set(path!["nullable"], Value::Null);
        store.delete(path!["gone"]);
        store.set(path!["env", 0, "name"], json!("A"));

        let list = store.to_diff_list();
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(
            json,
            json!([
                { "path": ["env", 0, "name"], "value": "A" },
                { "path": ["gone"] },
                { "path": ["nullable"], "value": null }
            ])
        );

        let back: Vec<PatchEntry> = serde_json::from_value(json).unwrap();
        assert_eq!(PatchStore::from_diff_list(back), store);
    }

    #[test]
    fn test_from_diff_list_last_write_wins() {
        let store = PatchStore::from_diff_list(vec![
            PatchEntry::set(path!["a"], json!(1)),
            PatchEntry::set(path!["a"], json!(2)),
        ]);
        assert_eq!(store.get(&path!["a"]), Some(&PatchOp::Set(json!(2))));
    }

    #[test]
    fn test_remove_array_index_rebases() {
        let mut store = PatchStore::new();
        for i in 0..4 {
            store.set(path!["env", i, "name"], json!(format!("v{i}")));
        }
        store.set(path!["other"], json!(true));

        store.remove_array_index(&path!["env"], 1);

        assert_eq!(
            store.to_diff_list(),
            vec![
                PatchEntry::set(path!["env", 0, "name"], json!("v0")),
                PatchEntry::set(path!["env", 1, "name"], json!("v2")),
                PatchEntry::set(path!["env", 2, "name"], json!("v3")),
                PatchEntry::set(path!["other"], json!(true)),
            ]
        );
    }

    #[test]
    fn test_remove_array_index_leaves_sibling_arrays_alone() {
        let mut store = PatchStore::new();
        store.set(path!["envFrom", 2], json!("x"));
        store.set(path!["env", 2], json!("y"));
        store.remove_array_index(&path!["env"], 0);
        assert_eq!(store.get(&path!["envFrom", 2]), Some(&PatchOp::Set(json!("x"))));
        assert_eq!(store.get(&path!["env", 1]), Some(&PatchOp::Set(json!("y"))));
    }

    #[test]
    fn test_set_within_container_updates_element_entry() {
        let mut store = PatchStore::new();
        store.set(path!["env", 0], json!({"name": "", "value": ""}));
        assert!(store.set_within_container(&path!["env", 0, "name"], json!("FOO")));
        assert_eq!(
            store.get(&path!["env", 0]),
            Some(&PatchOp::Set(json!({"name": "FOO", "value": ""})))
        );
        assert!(!store.set_within_container(&path!["replicas"], json!(1)));
    }

    #[test]
    fn test_replace_covered_at_the_container_itself() {
        let mut store = PatchStore::new();
        store.set(path!["env"], json!([{"name": "A"}, {"name": "B"}]));
        store.set(path!["env", 1, "name"], json!("C"));
        assert!(store.replace_covered(&path!["env"], json!([{"name": "C"}])));
        assert_eq!(
            store.to_diff_list(),
            vec![PatchEntry::set(path!["env"], json!([{"name": "C"}]))]
        );

        store.set(path!["replicas"], json!(2));
        assert!(!store.replace_covered(&path!["replicas"], json!(3)));
        assert_eq!(store.get(&path!["replicas"]), Some(&PatchOp::Set(json!(2))));
    }

    #[test]
    fn test_replace_subtree() {
        let mut store = PatchStore::new();
        store.set(path!["env", 0, "name"], json!("A"));
        store.set(path!["env", 1, "name"], json!("B"));
        store.set(path!["image"], json!("x"));
        store.replace_subtree(&path!["env"], vec![PatchEntry::delete(path!["env", 0])]);
        assert_eq!(
            store.to_diff_list(),
            vec![
                PatchEntry::delete(path!["env", 0]),
                PatchEntry::set(path!["image"], json!("x")),
            ]
        );
    }
}
