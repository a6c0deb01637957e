//! Launch-context injection.
//!
//! Charts can ask for defaults and suggestion lists taken from the user's
//! environment (identity, project, storage settings) through
//! `x-onyxia.overwriteDefaultWith` and `x-onyxia.overwriteListEnumWith`.
//! A reference is either a dotted path into the context object
//! (`user.idep`) or a template embedding such paths (`{{user.idep}}-data`).

use std::collections::BTreeMap;

use serde_json::Value;

use crate::path::HelmValuesPath;
use crate::schema::{NodeKind, SchemaNode};
use crate::values::{get_in, set_in};

/// Rewrite `defaults` in place from `context` and collect suggestion lists.
///
/// References that cannot be resolved leave the chart default untouched and
/// are logged. The returned map is keyed by the path of the field the
/// suggestions belong to.
pub fn apply_context(
    defaults: &mut Value,
    schema: &SchemaNode,
    context: &Value,
) -> BTreeMap<HelmValuesPath, Vec<Value>> {
    let mut suggestions = BTreeMap::new();
    inject(schema, &HelmValuesPath::root(), defaults, context, &mut suggestions);
    suggestions
}

fn inject(
    node: &SchemaNode,
    path: &HelmValuesPath,
    defaults: &mut Value,
    context: &Value,
    suggestions: &mut BTreeMap<HelmValuesPath, Vec<Value>>,
) {
    let ext = &node.meta.x_onyxia;

    if let Some(reference) = &ext.overwrite_default_with {
        match resolve_reference(context, reference) {
            Some(value) => {
                tracing::debug!(path = %path, %reference, "default taken from launch context");
                set_in(defaults, path.segments(), value, &|_| Value::Null);
            }
            None => tracing::warn!(path = %path, %reference, "unresolved overwriteDefaultWith"),
        }
    }

    if let Some(reference) = &ext.overwrite_list_enum_with {
        match resolve_reference(context, reference) {
            Some(Value::Array(items)) => {
                suggestions.insert(path.clone(), items);
            }
            Some(other) => tracing::warn!(
                path = %path,
                %reference,
                found = %other,
                "overwriteListEnumWith does not point at a list"
            ),
            None => tracing::warn!(path = %path, %reference, "unresolved overwriteListEnumWith"),
        }
    }

    match &node.kind {
        NodeKind::Object(object) => {
            for property in &object.properties {
                inject(&property.node, &path.key(&property.name), defaults, context, suggestions);
            }
        }
        NodeKind::Array(array) => {
            let len = match get_in(defaults, path.segments()) {
                Some(Value::Array(items)) => items.len(),
                _ => 0,
            };
            for index in 0..len {
                inject(&array.items, &path.index(index), defaults, context, suggestions);
            }
        }
        NodeKind::Scalar(_) | NodeKind::Unsupported { .. } => {}
    }
}

/// Resolve a context reference: a bare dotted path yields the value as is,
/// a `{{path}}` template yields a string.
pub fn resolve_reference(context: &Value, reference: &str) -> Option<Value> {
    if !reference.contains("{{") {
        return lookup(context, reference.trim()).cloned();
    }

    let mut out = String::new();
    let mut rest = reference;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}")?;
        let value = lookup(context, after[..end].trim())?;
        match value {
            Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Some(Value::String(out))
}

fn lookup<'a>(context: &'a Value, dotted: &str) -> Option<&'a Value> {
    let path: HelmValuesPath = dotted.parse().ok()?;
    get_in(context, path.segments())
}

// ===========================================================================
// Tests
// ===========================================================================
