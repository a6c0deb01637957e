//! Raw-text view of the values tree.
//!
//! [`to_text`] renders an effective values tree as YAML or JSON;
//! [`from_text`] parses edited text back, checks it against the schema
//! shape and returns the minimal patch list against the defaults. Nothing
//! is applied when either step fails.

use serde_json::Value;

use crate::config::TextFormat;
use crate::error::{FieldError, FieldErrorKind, LauncherError};
use crate::patch::PatchEntry;
use crate::path::HelmValuesPath;
use crate::resolve::compute_diff;
use crate::schema::{json_type_name, NodeKind, Primitive, SchemaNode};

/// Render `values` in `format`.
pub fn to_text(values: &Value, format: TextFormat) -> Result<String, LauncherError> {
    match format {
        TextFormat::Yaml => Ok(serde_yaml_ng::to_string(values)?),
        TextFormat::Json => Ok(serde_json::to_string_pretty(values)?),
    }
}

/// Parse a document in `format`. An empty (or `null`) document is an empty
/// values object.
pub fn parse_text(text: &str, format: TextFormat) -> Result<Value, LauncherError> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value = match format {
        TextFormat::Yaml => serde_yaml_ng::from_str(text)?,
        TextFormat::Json => serde_json::from_str(text)?,
    };
    Ok(match value {
        Value::Null => Value::Object(Default::default()),
        other => other,
    })
}

/// Turn edited text into the patch entries that reproduce it.
///
/// # Errors
///
/// - [`LauncherError::YamlError`] / [`LauncherError::JsonError`]: one
///   document-level syntax error.
/// - [`LauncherError::ShapeMismatch`]: every path where the document's
///   structure contradicts the schema.
pub fn from_text(
    text: &str,
    format: TextFormat,
    defaults: &Value,
    schema: &SchemaNode,
) -> Result<Vec<PatchEntry>, LauncherError> {
    let value = parse_text(text, format)?;

    let mut errors = Vec::new();
    if value.is_object() {
        check_shape(&value, schema, &HelmValuesPath::root(), &mut errors);
    } else {
        errors.push(mismatch(HelmValuesPath::root(), "object", &value));
    }
    if !errors.is_empty() {
        return Err(LauncherError::ShapeMismatch { errors });
    }

    let entries = compute_diff(defaults, &value, schema);
    tracing::debug!(entries = entries.len(), "parsed raw values text");
    Ok(entries)
}

fn mismatch(path: HelmValuesPath, expected: &str, found: &Value) -> FieldError {
    FieldError::new(
        path,
        FieldErrorKind::ShapeMismatch {
            expected: expected.to_string(),
            found: json_type_name(found).to_string(),
        },
    )
}

/// Structural check only: containers where the schema declares containers,
/// no containers where it declares plain scalars, no undeclared keys in
/// closed objects. `null` is accepted anywhere (Helm's "unset").
fn check_shape(value: &Value, node: &SchemaNode, path: &HelmValuesPath, errors: &mut Vec<FieldError>) {
    if value.is_null() {
        return;
    }
    match &node.kind {
        NodeKind::Object(object) => {
            let Value::Object(map) = value else {
                errors.push(mismatch(path.clone(), "object", value));
                return;
            };
            for (key, child) in map {
                match object.properties.iter().find(|p| &p.name == key) {
                    Some(property) => check_shape(child, &property.node, &path.key(key), errors),
                    None if !object.allow_additional => {
                        errors.push(mismatch(path.key(key), "nothing", child));
                    }
                    None => {}
                }
            }
        }
        NodeKind::Array(array) => {
            let Value::Array(items) = value else {
                errors.push(mismatch(path.clone(), "array", value));
                return;
            };
            for (index, item) in items.iter().enumerate() {
                check_shape(item, &array.items, &path.index(index), errors);
            }
        }
        NodeKind::Scalar(scalar) => {
            let ok = match scalar.primitive {
                Primitive::Object => value.is_object(),
                Primitive::Array => value.is_array(),
                _ => !value.is_object() && !value.is_array(),
            };
            if !ok {
                errors.push(mismatch(path.clone(), scalar.primitive.name(), value));
            }
        }
        NodeKind::Unsupported { .. } => {}
    }
}

// ===========================================================================
// Tests
// ===========================================================================
