//! Field and cross-field validation of an effective values tree.
//!
//! Validation never fails as an operation: every finding is a
//! [`FieldError`] scoped to the offending path. Findings block the launch
//! and are shown next to their field, nothing more.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{FieldError, FieldErrorKind};
use crate::form::SliderBounds;
use crate::path::HelmValuesPath;
use crate::schema::{
    Hidden, NodeKind, ObjectSchema, Primitive, Property, RenderHint, ScalarSchema, SchemaNode,
    SliderExtremity, XOnyxia,
};
use crate::values::get_in;

// ---------------------------------------------------------------------------
// Slider values
// ---------------------------------------------------------------------------

/// Numeric part of a slider value: a plain number, or a string made of a
/// number followed by `unit` (`"2Gi"` with unit `Gi` is `2`).
pub fn numeric_part(value: &Value, unit: Option<&str>) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let digits = match unit {
                Some(unit) => s.strip_suffix(unit).unwrap_or(s),
                None => s,
            };
            digits.trim().parse().ok()
        }
        _ => None,
    }
}

fn is_slider(ext: &XOnyxia) -> bool {
    ext.render.is_some() && ext.render_hint() == Some(RenderHint::Slider)
}

/// Slider bounds from the extension, falling back to `minimum`/`maximum`.
pub fn slider_bounds(scalar: &ScalarSchema, ext: &XOnyxia) -> Option<SliderBounds> {
    let min = ext.slider_min.or(scalar.minimum)?;
    let max = ext.slider_max.or(scalar.maximum)?;
    Some(SliderBounds {
        min,
        max,
        step: ext.slider_step.or(scalar.multiple_of).unwrap_or(1.0),
        unit: ext.slider_unit.clone(),
    })
}

// ---------------------------------------------------------------------------
// Range pairing
// ---------------------------------------------------------------------------

/// Two sibling scalars rendered as one range slider.
#[derive(Debug)]
pub struct RangePair<'a> {
    pub low: &'a Property,
    pub high: &'a Property,
    pub bounds: SliderBounds,
}

/// Outcome of pairing the ends that share one `sliderRangeId`.
#[derive(Debug)]
pub enum RangeEnds<'a> {
    Paired(RangePair<'a>),
    /// Rendered and validated as independent fields.
    Unpaired { id: &'a str, reason: &'static str },
}

/// Pair the range-slider ends declared among the properties of `object`.
///
/// A pair needs exactly one `down` and one `up` scalar end and slider bounds
/// on at least one of them.
pub fn range_pairs(object: &ObjectSchema) -> Vec<RangeEnds<'_>> {
    let mut by_id: BTreeMap<&str, (Vec<&Property>, Vec<&Property>)> = BTreeMap::new();
    for property in &object.properties {
        let ext = &property.node.meta.x_onyxia;
        if !matches!(property.node.kind, NodeKind::Scalar(_)) || !ext.is_range_end() {
            continue;
        }
        if let (Some(id), Some(extremity)) = (ext.slider_range_id.as_deref(), ext.slider_extremity) {
            let ends = by_id.entry(id).or_default();
            match extremity {
                SliderExtremity::Down => ends.0.push(property),
                SliderExtremity::Up => ends.1.push(property),
            }
        }
    }

    by_id
        .into_iter()
        .map(|(id, (lows, highs))| {
            let ([low], [high]) = (lows.as_slice(), highs.as_slice()) else {
                let reason = if lows.len() > 1 || highs.len() > 1 {
                    "duplicated range end"
                } else {
                    "missing range end"
                };
                return RangeEnds::Unpaired { id, reason };
            };
            let bounds = end_bounds(low).or_else(|| end_bounds(high));
            match bounds {
                Some(bounds) => RangeEnds::Paired(RangePair {
                    low: *low,
                    high: *high,
                    bounds,
                }),
                None => RangeEnds::Unpaired {
                    id,
                    reason: "range without slider bounds",
                },
            }
        })
        .collect()
}

fn end_bounds(property: &Property) -> Option<SliderBounds> {
    match &property.node.kind {
        NodeKind::Scalar(scalar) => slider_bounds(scalar, &property.node.meta.x_onyxia),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Hiding
// ---------------------------------------------------------------------------

/// Whether the node at `path` is hidden, given the whole values tree.
///
/// Conditional hiding compares the value at the watched path (resolved from
/// the root, or from the parent of `path` when relative) with the expected
/// value.
pub fn is_hidden(ext: &XOnyxia, root: &Value, path: &HelmValuesPath) -> bool {
    match &ext.hidden {
        None | Some(Hidden::Flag(false)) => false,
        Some(Hidden::Flag(true)) => true,
        Some(Hidden::When(when)) => {
            let watched: HelmValuesPath = match when.path.parse() {
                Ok(p) => p,
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "ignoring unparsable hidden condition");
                    return false;
                }
            };
            let target = if when.is_path_relative {
                path.parent()
                    .unwrap_or_default()
                    .concat(watched.segments())
            } else {
                watched
            };
            get_in(root, target.segments()) == Some(&when.value)
        }
    }
}

// ---------------------------------------------------------------------------
// Scalar checks
// ---------------------------------------------------------------------------

/// First problem with a scalar leaf value, if any.
///
/// `null` and the empty string count as "no value": they only fail when the
/// field is required.
pub fn validate_scalar(
    value: &Value,
    scalar: &ScalarSchema,
    ext: &XOnyxia,
    required: bool,
) -> Option<FieldErrorKind> {
    if value.is_null() || value.as_str() == Some("") {
        return required.then_some(FieldErrorKind::Required);
    }

    let type_error = match scalar.primitive {
        Primitive::Boolean if !value.is_boolean() => Some(FieldErrorKind::NotABoolean),
        Primitive::Integer if !is_integer(value) => Some(FieldErrorKind::NotAnInteger),
        Primitive::Number if !value.is_number() => Some(FieldErrorKind::NotANumber),
        Primitive::String if !value.is_string() => Some(FieldErrorKind::NotAString),
        Primitive::Object if !value.is_object() => Some(FieldErrorKind::NotAnObject),
        Primitive::Array if !value.is_array() => Some(FieldErrorKind::NotAnArray),
        _ => None,
    };
    if type_error.is_some() {
        return type_error;
    }

    if let Some(options) = &scalar.enum_options {
        if !options.contains(value) {
            return Some(FieldErrorKind::NotInOptions);
        }
    }

    let number = match value {
        Value::Number(_) => numeric_part(value, None),
        Value::String(_) if is_slider(ext) => numeric_part(value, ext.slider_unit.as_deref()),
        _ => None,
    };
    if let Some(number) = number {
        if let Some(minimum) = scalar.minimum.or(ext.slider_min) {
            if number < minimum {
                return Some(FieldErrorKind::BelowMinimum { minimum });
            }
        }
        if let Some(maximum) = scalar.maximum.or(ext.slider_max) {
            if number > maximum {
                return Some(FieldErrorKind::AboveMaximum { maximum });
            }
        }
    }

    if let Value::String(s) = value {
        let length = s.chars().count();
        if let Some(min_length) = scalar.min_length {
            if length < min_length {
                return Some(FieldErrorKind::TooShort { min_length });
            }
        }
        if let Some(max_length) = scalar.max_length {
            if length > max_length {
                return Some(FieldErrorKind::TooLong { max_length });
            }
        }
        if let Some(pattern) = &scalar.pattern {
            if pattern.regex().is_some_and(|re| !re.is_match(s)) {
                return Some(FieldErrorKind::PatternMismatch {
                    pattern: pattern.as_str().to_string(),
                });
            }
        }
    }

    None
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Whole-tree validation
// ---------------------------------------------------------------------------

/// Validate every visible leaf of `tree` plus the cross-field constraints.
///
/// Cross-field constraints: the two ends of a range slider must satisfy
/// `low <= high` (both ends get the error) and arrays must respect
/// `minItems`/`maxItems`.
pub fn additional_validation(tree: &Value, schema: &SchemaNode) -> Vec<FieldError> {
    let mut validator = Validator {
        root: tree,
        errors: Vec::new(),
    };
    validator.walk(schema, Some(tree), &HelmValuesPath::root(), false);
    validator.errors
}

struct Validator<'a> {
    root: &'a Value,
    errors: Vec<FieldError>,
}

impl Validator<'_> {
    fn walk(
        &mut self,
        node: &SchemaNode,
        value: Option<&Value>,
        path: &HelmValuesPath,
        required: bool,
    ) {
        if is_hidden(&node.meta.x_onyxia, self.root, path) {
            return;
        }
        match &node.kind {
            NodeKind::Object(object) => {
                let Some(Value::Object(map)) = value else {
                    return;
                };
                for property in &object.properties {
                    self.walk(
                        &property.node,
                        map.get(&property.name),
                        &path.key(&property.name),
                        property.required,
                    );
                }
                self.check_ranges(object, map, path);
            }
            NodeKind::Array(array) => {
                let Some(Value::Array(items)) = value else {
                    return;
                };
                if items.len() < array.min_items {
                    self.push(
                        path.clone(),
                        FieldErrorKind::TooFewItems {
                            min_items: array.min_items,
                        },
                    );
                }
                if let Some(max_items) = array.max_items {
                    if items.len() > max_items {
                        self.push(path.clone(), FieldErrorKind::TooManyItems { max_items });
                    }
                }
                for (index, item) in items.iter().enumerate() {
                    self.walk(&array.items, Some(item), &path.index(index), false);
                }
            }
            NodeKind::Scalar(scalar) => {
                let value = value.unwrap_or(&Value::Null);
                if let Some(kind) = validate_scalar(value, scalar, &node.meta.x_onyxia, required) {
                    self.push(path.clone(), kind);
                }
            }
            NodeKind::Unsupported { .. } => {}
        }
    }

    fn check_ranges(&mut self, object: &ObjectSchema, map: &Map<String, Value>, path: &HelmValuesPath) {
        for ends in range_pairs(object) {
            let RangeEnds::Paired(RangePair { low, high, .. }) = ends else {
                continue;
            };
            let read = |property: &Property| {
                map.get(&property.name).and_then(|v| {
                    numeric_part(v, property.node.meta.x_onyxia.slider_unit.as_deref())
                })
            };
            if let (Some(l), Some(h)) = (read(low), read(high)) {
                if l > h {
                    let kind = FieldErrorKind::RangeOrder { low: l, high: h };
                    self.push(path.key(&low.name), kind.clone());
                    self.push(path.key(&high.name), kind);
                }
            }
        }
    }

    fn push(&mut self, path: HelmValuesPath, kind: FieldErrorKind) {
        self.errors.push(FieldError::new(path, kind));
    }
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
                    "name": { "type": "string", "pattern": "^[a-z]+$", "maxLength": 8 },
                    "replicas": { "type": "integer", "minimum": 1, "maximum": 10 },
                    "resources": {
                        "type": "object",
                        "properties": {
                            "memoryRequest": {
                                "type": "string",
                                "x-onyxia": {
                                    "render": "slider", "sliderMin": 1, "sliderMax": 64,
                                    "sliderUnit": "Gi", "sliderRangeId": "memory",
                                    "sliderExtremity": "down"
                                }
                            },
                            "memoryLimit": {
                                "type": "string",
                                "x-onyxia": {
                                    "render": "slider", "sliderMin": 1, "sliderMax": 64,
                                    "sliderUnit": "Gi", "sliderRangeId": "memory",
                                    "sliderExtremity": "up"
                                }
                            }
                        }
                    },
                    "ingress": {
                        "type": "object",
                        "properties": {
                            "enabled": { "type": "boolean" },
                            "hostname": {
                                "type": "string",
                                "x-onyxia": {
                                    "hidden": { "path": "enabled", "value": false, "isPathRelative": true }
                                }
                            }
                        },
                        "required": ["hostname"]
                    },
                    "ports": {
                        "type": "array",
                        "maxItems": 1,
                        "items": { "type": "integer" }
                    }
                }
            }),
            32,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_tree_has_no_errors() {
        let tree = json!({
            "name": "web",
            "replicas": 2,
            "resources": { "memoryRequest": "2Gi", "memoryLimit": "4Gi" },
            "ingress": { "enabled": true, "hostname": "a.example.org" },
            "ports": [80]
        });
        assert_eq!(additional_validation(&tree, &schema()), vec![]);
    }

    #[test]
    fn test_scalar_errors_are_path_scoped() {
        let tree = json!({ "name": "Web", "replicas": 0, "ports": [80, 443] });
        assert_eq!(
            additional_validation(&tree, &schema()),
            vec![
                FieldError::new(
                    path!["name"],
                    FieldErrorKind::PatternMismatch {
                        pattern: "^[a-z]+$".into()
                    }
                ),
                FieldError::new(path!["replicas"], FieldErrorKind::BelowMinimum { minimum: 1.0 }),
                FieldError::new(path!["ports"], FieldErrorKind::TooManyItems { max_items: 1 }),
            ]
        );
    }

    #[test]
    fn test_range_order_flags_both_ends() {
        let tree = json!({ "resources": { "memoryRequest": "8Gi", "memoryLimit": "2Gi" } });
        let kind = FieldErrorKind::RangeOrder {
            low: 8.0,
            high: 2.0,
        };
        assert_eq!(
            additional_validation(&tree, &schema()),
            vec![
                FieldError::new(path!["resources", "memoryRequest"], kind.clone()),
                FieldError::new(path!["resources", "memoryLimit"], kind),
            ]
        );
    }

    #[test]
    fn test_duplicated_range_end_is_not_order_checked() {
        let end = |extremity: &str| {
            json!({
                "type": "string",
                "x-onyxia": {
                    "render": "slider", "sliderMin": 1, "sliderMax": 64, "sliderUnit": "Gi",
                    "sliderRangeId": "memory", "sliderExtremity": extremity
                }
            })
        };
        let schema = parse_schema(
            &json!({
                "type": "object",
                "properties": {
                    "memoryRequest": end("down"),
                    "memoryBurst": end("down"),
                    "memoryLimit": end("up")
                }
            }),
            32,
        )
        .unwrap();
        let NodeKind::Object(object) = &schema.kind else {
            panic!("expected object");
        };
        assert!(matches!(
            range_pairs(object).as_slice(),
            [RangeEnds::Unpaired { id: "memory", .. }]
        ));

        let tree = json!({"memoryRequest": "8Gi", "memoryBurst": "1Gi", "memoryLimit": "2Gi"});
        assert_eq!(additional_validation(&tree, &schema), vec![]);
    }

    #[test]
    fn test_hidden_fields_are_not_validated() {
        let hidden = json!({ "ingress": { "enabled": false } });
        assert_eq!(additional_validation(&hidden, &schema()), vec![]);

        let shown = json!({ "ingress": { "enabled": true } });
        assert_eq!(
            additional_validation(&shown, &schema()),
            vec![FieldError::new(
                path!["ingress", "hostname"],
                FieldErrorKind::Required
            )]
        );
    }

    #[test]
    fn test_numeric_part_strips_unit() {
        assert_eq!(numeric_part(&json!("2Gi"), Some("Gi")), Some(2.0));
        assert_eq!(numeric_part(&json!("0.5"), None), Some(0.5));
        assert_eq!(numeric_part(&json!(3), Some("Gi")), Some(3.0));
        assert_eq!(numeric_part(&json!("lots"), Some("Gi")), None);
    }

    #[test]
    fn test_integer_accepts_whole_floats() {
        let schema = schema();
        let node = schema.node_at(path!["replicas"].segments()).unwrap();
        let NodeKind::Scalar(scalar) = &node.kind else {
            panic!("expected scalar");
        };
        let ext = XOnyxia::default();
        assert_eq!(validate_scalar(&json!(2.0), scalar, &ext, false), None);
        assert_eq!(
            validate_scalar(&json!(2.5), scalar, &ext, false),
            Some(FieldErrorKind::NotAnInteger)
        );
        assert_eq!(
            validate_scalar(&json!("2"), scalar, &ext, false),
            Some(FieldErrorKind::NotAnInteger)
        );
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let schema = parse_schema(
            &json!({
                "type": "object",
                "properties": { "x": { "type": "string", "pattern": "([" } }
            }),
            32,
        )
        .unwrap();
        let node = schema.node_at(path!["x"].segments()).unwrap();
        let NodeKind::Scalar(scalar) = &node.kind else {
            panic!("expected scalar");
        };
        let pattern = scalar.pattern.as_ref().unwrap();
        assert_eq!(pattern.as_str(), "([");
        assert!(pattern.regex().is_none());
        assert_eq!(additional_validation(&json!({"x": "anything"}), &schema), vec![]);
    }
}
