//! Structural edits: array growth and removal, auto-injection toggles.
//!
//! Array edits keep the Patch Store minimal and consistent with the
//! positional meaning of its paths. Appending writes one whole-element entry.
//! Removing an element the store created shifts later entries down by one;
//! removing an element backed by the chart defaults re-diffs the array.

use serde_json::Value;

use crate::error::LauncherError;
use crate::form::UiState;
use crate::patch::PatchStore;
use crate::path::HelmValuesPath;
use crate::resolve::{compute_diff, default_at, resolve};
use crate::schema::{ArraySchema, NodeKind, SchemaNode};
use crate::values::{delete_in, get_in, set_in};

fn array_schema<'a>(
    schema: &'a SchemaNode,
    array_path: &HelmValuesPath,
) -> Result<&'a ArraySchema, LauncherError> {
    match schema.node_at(array_path.segments()).map(|node| &node.kind) {
        Some(NodeKind::Array(array)) => Ok(array),
        _ => Err(LauncherError::invariant(array_path, "not an array of the form")),
    }
}

fn array_len(tree: &Value, array_path: &HelmValuesPath) -> usize {
    match get_in(tree, array_path.segments()) {
        Some(Value::Array(items)) => items.len(),
        _ => 0,
    }
}

/// Append the item template to the array at `array_path`.
///
/// # Errors
///
/// [`LauncherError::InvariantViolation`] when `array_path` is not a
/// structured array of the schema or the array is already at `maxItems`.
pub fn add_array_item(
    store: &mut PatchStore,
    defaults: &Value,
    schema: &SchemaNode,
    array_path: &HelmValuesPath,
) -> Result<(), LauncherError> {
    let array = array_schema(schema, array_path)?;
    let current = resolve(defaults, store, schema);
    let len = array_len(&current, array_path);
    if array.max_items.is_some_and(|max| len >= max) {
        return Err(LauncherError::invariant(array_path, "array is already at maxItems"));
    }
    let template = array.items.default_value();

    if store.covering_container(array_path).is_some() {
        let mut items = match get_in(&current, array_path.segments()) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        items.push(template);
        store.replace_covered(array_path, Value::Array(items));
    } else {
        store.set(array_path.index(len), template);
        // Growing a truncated default array must not resurrect the next
        // default element.
        let default_len = defaults_len(defaults, array_path);
        if len + 1 < default_len {
            store.delete(array_path.index(len + 1));
        }
    }

    tracing::debug!(path = %array_path, index = len, "appended array item");
    Ok(())
}

/// Remove element `index` of the array at `array_path`.
///
/// # Errors
///
/// [`LauncherError::InvariantViolation`] when `index` is out of range, the
/// array is at `minItems`, or `array_path` is not a structured array.
pub fn remove_array_item(
    store: &mut PatchStore,
    defaults: &Value,
    schema: &SchemaNode,
    array_path: &HelmValuesPath,
    index: usize,
) -> Result<(), LauncherError> {
    let array = array_schema(schema, array_path)?;
    let current = resolve(defaults, store, schema);
    let Some(Value::Array(items)) = get_in(&current, array_path.segments()) else {
        return Err(LauncherError::invariant(array_path, "array has no elements"));
    };
    if index >= items.len() {
        return Err(LauncherError::invariant(
            array_path,
            format!("index {index} out of range for length {}", items.len()),
        ));
    }
    if items.len() <= array.min_items {
        return Err(LauncherError::invariant(array_path, "array is already at minItems"));
    }

    let mut remaining = items.clone();
    remaining.remove(index);

    if store.covering_container(array_path).is_some() {
        store.replace_covered(array_path, Value::Array(remaining));
    } else if index >= defaults_len(defaults, array_path) {
        store.remove_array_index(array_path, index);
    } else {
        let mut next = current.clone();
        set_in(
            &mut next,
            array_path.segments(),
            Value::Array(remaining),
            &|_| Value::Null,
        );
        let entries = compute_diff(defaults, &next, schema)
            .into_iter()
            .filter(|entry| entry.path.starts_with(array_path));
        store.replace_subtree(array_path, entries);
    }

    tracing::debug!(path = %array_path, index, "removed array item");
    Ok(())
}

fn defaults_len(defaults: &Value, array_path: &HelmValuesPath) -> usize {
    match default_at(defaults, array_path) {
        Some(Value::Array(items)) => items.len(),
        _ => 0,
    }
}

/// Switch the auto-injection group at `path` on or off.
///
/// Only the presentation flag changes; patch entries below `path` are kept
/// and come back into effect when the group is switched on again.
pub fn toggle_auto_injected(
    ui: &mut UiState,
    schema: &SchemaNode,
    path: &HelmValuesPath,
    is_auto_injected: bool,
) -> Result<(), LauncherError> {
    let injectable = schema
        .node_at(path.segments())
        .is_some_and(|node| node.meta.x_onyxia.auto_injection);
    if !injectable {
        return Err(LauncherError::invariant(path, "not an auto-injection group"));
    }
    if is_auto_injected {
        ui.disabled_auto_injections.remove(path);
    } else {
        ui.disabled_auto_injections.insert(path.clone());
    }
    tracing::debug!(path = %path, is_auto_injected, "toggled auto-injection");
    Ok(())
}

/// Put every switched-off auto-injection sub-tree back to its default.
pub fn reset_disabled_subtrees(values: &mut Value, defaults: &Value, ui: &UiState) {
    for path in &ui.disabled_auto_injections {
        match default_at(defaults, path) {
            Some(default) => set_in(values, path.segments(), default.clone(), &|_| Value::Null),
            None => delete_in(values, path.segments()),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
