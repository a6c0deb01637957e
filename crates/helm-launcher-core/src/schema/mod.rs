//! Parsed chart value schemas.
//!
//! [`parse_schema`] turns a `values.schema.json` document into a closed tree
//! of [`SchemaNode`]s. Every raw node lands in exactly one [`NodeKind`]:
//! structured objects and arrays are walked further, scalars (including
//! objects and arrays edited as opaque text) are leaves, and anything the
//! engine cannot interpret becomes [`NodeKind::Unsupported`] instead of being
//! passed through.
//!
//! Local `$ref`s (`#/definitions/..`, `#/$defs/..`) are inlined while
//! parsing; the depth guard from [`LauncherOptions::max_depth`] stops
//! recursive definitions.
//!
//! [`LauncherOptions::max_depth`]: crate::config::LauncherOptions::max_depth

pub mod extension;

use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::error::LauncherError;
use crate::path::{escape_pointer_segment, PathSegment};

pub use extension::{Hidden, HiddenWhen, RenderHint, SliderExtremity, XOnyxia};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One position in the values schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub meta: NodeMeta,
    pub kind: NodeKind,
}

/// Annotations shared by every node kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub default: Option<Value>,
    pub read_only: bool,
    pub x_onyxia: XOnyxia,
    /// JSON Pointer of the raw node, for diagnostics.
    pub schema_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Object(ObjectSchema),
    Array(ArraySchema),
    Scalar(ScalarSchema),
    Unsupported { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    /// Declared properties, in schema order.
    pub properties: Vec<Property>,
    /// `false` only when the schema says `additionalProperties: false`.
    pub allow_additional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub required: bool,
    pub node: SchemaNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArraySchema {
    pub items: Box<SchemaNode>,
    pub min_items: usize,
    pub max_items: Option<usize>,
}

/// A leaf: edited as a single form field.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarSchema {
    pub primitive: Primitive,
    pub enum_options: Option<Vec<Value>>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub multiple_of: Option<f64>,
    pub pattern: Option<Pattern>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

/// A `pattern` keyword, compiled once when the schema is parsed.
///
/// An invalid pattern is kept with its compile error and never matched
/// against.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    compiled: Result<Regex, String>,
}

impl Pattern {
    fn compile(source: &str, pointer: &str) -> Self {
        let compiled = Regex::new(source).map_err(|e| e.to_string());
        if let Err(ref err) = compiled {
            tracing::warn!(
                schema_path = %pointer,
                pattern = %source,
                error = %err,
                "invalid pattern, values will not be checked against it"
            );
        }
        Self {
            source: source.to_string(),
            compiled,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn regex(&self) -> Option<&Regex> {
        self.compiled.as_ref().ok()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Primitive JSON type of a scalar leaf. `Object` and `Array` are opaque
/// structures edited as a YAML block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Boolean,
    Integer,
    Number,
    String,
    Object,
    Array,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Integer => "integer",
            Primitive::Number => "number",
            Primitive::String => "string",
            Primitive::Object => "object",
            Primitive::Array => "array",
        }
    }
}

/// Name of the JSON type of a value, as used in shape diagnostics.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a values schema document.
///
/// Fails only when the root itself cannot describe a values tree (it must be
/// an object schema). Everything below the root degrades to
/// [`NodeKind::Unsupported`] with a warning instead of failing.
pub fn parse_schema(raw: &Value, max_depth: usize) -> Result<SchemaNode, LauncherError> {
    let parser = Parser {
        root: raw,
        max_depth,
    };
    let node = parser.parse_node(raw, "#", 0);
    match node.kind {
        NodeKind::Object(_) => Ok(node),
        NodeKind::Scalar(ScalarSchema {
            primitive: Primitive::Object,
            ..
        }) => Ok(node),
        NodeKind::Unsupported { reason } => Err(LauncherError::SchemaError {
            path: "#".to_string(),
            message: reason,
        }),
        _ => Err(LauncherError::SchemaError {
            path: "#".to_string(),
            message: "root schema must describe an object".to_string(),
        }),
    }
}

struct Parser<'a> {
    root: &'a Value,
    max_depth: usize,
}

impl Parser<'_> {
    fn parse_node(&self, raw: &Value, pointer: &str, depth: usize) -> SchemaNode {
        if depth > self.max_depth {
            return unsupported(pointer, format!("nesting deeper than {}", self.max_depth));
        }

        let Some(obj) = raw.as_object() else {
            return unsupported(pointer, "schema node is not an object".to_string());
        };

        if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
            return self.parse_ref(obj, reference, pointer, depth);
        }

        let meta = parse_meta(raw, obj, pointer);
        let render = meta.x_onyxia.render_hint();

        let Some(type_name) = declared_type(obj) else {
            return unsupported(pointer, "cannot determine node type".to_string());
        };

        let kind = match type_name.as_str() {
            "object" => match obj.get("properties").and_then(Value::as_object) {
                Some(props) if render != Some(RenderHint::Yaml) => {
                    NodeKind::Object(self.parse_object(obj, props, pointer, depth))
                }
                _ => NodeKind::Scalar(parse_scalar(obj, pointer, Primitive::Object)),
            },
            "array" => match obj.get("items") {
                Some(items) if items.is_object() && render != Some(RenderHint::Yaml) => {
                    let items_pointer = format!("{pointer}/items");
                    NodeKind::Array(ArraySchema {
                        items: Box::new(self.parse_node(items, &items_pointer, depth + 1)),
                        min_items: usize_keyword(obj, "minItems").unwrap_or(0),
                        max_items: usize_keyword(obj, "maxItems"),
                    })
                }
                _ => NodeKind::Scalar(parse_scalar(obj, pointer, Primitive::Array)),
            },
            "string" => NodeKind::Scalar(parse_scalar(obj, pointer, Primitive::String)),
            "integer" => NodeKind::Scalar(parse_scalar(obj, pointer, Primitive::Integer)),
            "number" => NodeKind::Scalar(parse_scalar(obj, pointer, Primitive::Number)),
            "boolean" => NodeKind::Scalar(parse_scalar(obj, pointer, Primitive::Boolean)),
            other => NodeKind::Unsupported {
                reason: format!("unsupported type '{other}'"),
            },
        };

        if let NodeKind::Unsupported { reason } = &kind {
            tracing::warn!(schema_path = %pointer, %reason, "unsupported schema node");
        }

        SchemaNode { meta, kind }
    }

    fn parse_object(
        &self,
        obj: &Map<String, Value>,
        props: &Map<String, Value>,
        pointer: &str,
        depth: usize,
    ) -> ObjectSchema {
        let required: Vec<&str> = obj
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let properties = props
            .iter()
            .map(|(name, raw)| {
                let child_pointer = format!("{pointer}/properties/{}", escape_pointer_segment(name));
                Property {
                    name: name.clone(),
                    required: required.contains(&name.as_str()),
                    node: self.parse_node(raw, &child_pointer, depth + 1),
                }
            })
            .collect();

        ObjectSchema {
            properties,
            allow_additional: !matches!(obj.get("additionalProperties"), Some(Value::Bool(false))),
        }
    }

    fn parse_ref(
        &self,
        obj: &Map<String, Value>,
        reference: &str,
        pointer: &str,
        depth: usize,
    ) -> SchemaNode {
        let Some(local) = reference.strip_prefix('#') else {
            return unsupported(pointer, format!("external $ref '{reference}'"));
        };
        let Some(target) = self.root.pointer(local) else {
            return unsupported(pointer, format!("unresolvable $ref '{reference}'"));
        };

        // Sibling keywords next to `$ref` refine the target.
        let mut merged = target.clone();
        if let Some(merged_obj) = merged.as_object_mut() {
            for (key, value) in obj {
                if key != "$ref" {
                    merged_obj.insert(key.clone(), value.clone());
                }
            }
        }
        self.parse_node(&merged, pointer, depth + 1)
    }
}

fn unsupported(pointer: &str, reason: String) -> SchemaNode {
    tracing::warn!(schema_path = %pointer, %reason, "unsupported schema node");
    SchemaNode {
        meta: NodeMeta {
            schema_path: pointer.to_string(),
            ..NodeMeta::default()
        },
        kind: NodeKind::Unsupported { reason },
    }
}

fn parse_meta(raw: &Value, obj: &Map<String, Value>, pointer: &str) -> NodeMeta {
    let x_onyxia = XOnyxia::from_schema(raw, pointer);
    NodeMeta {
        title: obj.get("title").and_then(Value::as_str).map(str::to_string),
        description: obj
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        default: obj.get("default").cloned(),
        read_only: x_onyxia.readonly || obj.get("readOnly") == Some(&Value::Bool(true)),
        x_onyxia,
        schema_path: pointer.to_string(),
    }
}

/// Resolve the node type: explicit `type` (first non-null entry of a type
/// list), else inferred from structural keywords, enum values or the default.
fn declared_type(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("type") {
        Some(Value::String(t)) => return Some(t.clone()),
        Some(Value::Array(types)) => {
            return types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null")
                .map(str::to_string);
        }
        _ => {}
    }

    if obj.contains_key("properties") {
        return Some("object".to_string());
    }
    if obj.contains_key("items") {
        return Some("array".to_string());
    }
    let sample = obj
        .get("enum")
        .and_then(Value::as_array)
        .and_then(|options| options.first())
        .or_else(|| obj.get("default"))?;
    Some(json_type_name(sample).to_string())
}

fn parse_scalar(obj: &Map<String, Value>, pointer: &str, primitive: Primitive) -> ScalarSchema {
    ScalarSchema {
        primitive,
        enum_options: obj.get("enum").and_then(Value::as_array).cloned(),
        minimum: obj.get("minimum").and_then(Value::as_f64),
        maximum: obj.get("maximum").and_then(Value::as_f64),
        multiple_of: obj.get("multipleOf").and_then(Value::as_f64),
        pattern: obj
            .get("pattern")
            .and_then(Value::as_str)
            .map(|source| Pattern::compile(source, pointer)),
        min_length: usize_keyword(obj, "minLength"),
        max_length: usize_keyword(obj, "maxLength"),
    }
}

fn usize_keyword(obj: &Map<String, Value>, keyword: &str) -> Option<usize> {
    obj.get(keyword)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

impl SchemaNode {
    /// The structured schema node at `segments`, if the schema declares one.
    ///
    /// Opaque leaves and undeclared keys yield `None`.
    pub fn node_at(&self, segments: &[PathSegment]) -> Option<&SchemaNode> {
        let Some((first, rest)) = segments.split_first() else {
            return Some(self);
        };
        match (&self.kind, first) {
            (NodeKind::Object(object), PathSegment::Key(key)) => object
                .properties
                .iter()
                .find(|p| &p.name == key)
                .and_then(|p| p.node.node_at(rest)),
            (NodeKind::Array(array), PathSegment::Index(_)) => array.items.node_at(rest),
            _ => None,
        }
    }

    /// Whether a value may live at `segments` under this node.
    ///
    /// Declared structure is enforced; the interior of opaque leaves,
    /// undeclared keys of open objects and unsupported nodes are not walked
    /// and therefore allowed.
    pub fn allows(&self, segments: &[PathSegment]) -> bool {
        let Some((first, rest)) = segments.split_first() else {
            return true;
        };
        match (&self.kind, first) {
            (NodeKind::Object(object), PathSegment::Key(key)) => {
                match object.properties.iter().find(|p| &p.name == key) {
                    Some(property) => property.node.allows(rest),
                    None => object.allow_additional,
                }
            }
            (NodeKind::Array(array), PathSegment::Index(_)) => array.items.allows(rest),
            (
                NodeKind::Scalar(ScalarSchema {
                    primitive: Primitive::Object,
                    ..
                }),
                PathSegment::Key(_),
            ) => true,
            (
                NodeKind::Scalar(ScalarSchema {
                    primitive: Primitive::Array,
                    ..
                }),
                PathSegment::Index(_),
            ) => true,
            (NodeKind::Unsupported { .. }, _) => true,
            _ => false,
        }
    }

    /// Template for a fresh array element: the item schema's default value.
    pub fn item_template(&self) -> Option<Value> {
        match &self.kind {
            NodeKind::Array(array) => Some(array.items.default_value()),
            _ => None,
        }
    }

    /// Value a freshly created node starts with.
    ///
    /// The declared `default` wins; otherwise objects are built from their
    /// properties' defaults, arrays hold `minItems` templates, and scalars
    /// take the zero value of their kind (first enum option, slider minimum).
    pub fn default_value(&self) -> Value {
        if let Some(default) = &self.meta.default {
            return default.clone();
        }
        match &self.kind {
            NodeKind::Object(object) => {
                let mut map = Map::new();
                for property in &object.properties {
                    if matches!(property.node.kind, NodeKind::Unsupported { .. }) {
                        continue;
                    }
                    map.insert(property.name.clone(), property.node.default_value());
                }
                Value::Object(map)
            }
            NodeKind::Array(array) => {
                Value::Array(vec![array.items.default_value(); array.min_items])
            }
            NodeKind::Scalar(scalar) => scalar_zero(scalar, &self.meta.x_onyxia),
            NodeKind::Unsupported { .. } => Value::Null,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self.kind, NodeKind::Unsupported { .. })
    }
}

fn scalar_zero(scalar: &ScalarSchema, ext: &XOnyxia) -> Value {
    if let Some(first) = scalar.enum_options.as_ref().and_then(|o| o.first()) {
        return first.clone();
    }
    let lower = ext.slider_min.or(scalar.minimum);
    match scalar.primitive {
        Primitive::Boolean => Value::Bool(false),
        Primitive::Integer => Value::from(lower.map_or(0, |l| l.ceil() as i64)),
        Primitive::Number => Number::from_f64(lower.unwrap_or(0.0))
            .map(Value::Number)
            .unwrap_or_else(|| Value::from(0)),
        Primitive::String => match (lower, &ext.slider_unit) {
            (Some(l), Some(unit)) if ext.render_hint() == Some(RenderHint::Slider) => {
                Value::String(format!("{l}{unit}"))
            }
            _ => Value::String(String::new()),
        },
        Primitive::Object => Value::Object(Map::new()),
        Primitive::Array => Value::Array(Vec::new()),
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

    fn parse(raw: Value) -> SchemaNode {
        parse_schema(&raw, 32).unwrap()
    }

    #[test]
    fn test_parse_preserves_property_order() {
        let schema = parse(json!({
            "type": "object",
            "properties": {
                "zeta": { "type": "string" },
                "alpha": { "type": "integer" },
                "mid": { "type": "boolean" }
            },
            "required": ["alpha"]
        }));
        let NodeKind::Object(object) = &schema.kind else {
            panic!("expected object");
        };
        let names: Vec<&str> = object.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert!(object.properties[1].required);
        assert!(!object.properties[0].required);
    }

    #[test]
    fn test_opaque_object_and_untyped_array_are_scalars() {
        let schema = parse(json!({
            "type": "object",
            "properties": {
                "podAnnotations": { "type": "object" },
                "extraArgs": { "type": "array" },
                "forcedYaml": {
                    "type": "object",
                    "properties": { "a": { "type": "string" } },
                    "x-onyxia": { "render": "yaml" }
                }
            }
        }));
        for key in ["podAnnotations", "forcedYaml"] {
            let node = schema.node_at(path![key].segments()).unwrap();
            assert!(matches!(
                node.kind,
                NodeKind::Scalar(ScalarSchema { primitive: Primitive::Object, .. })
            ));
        }
        let node = schema.node_at(path!["extraArgs"].segments()).unwrap();
        assert!(matches!(
            node.kind,
            NodeKind::Scalar(ScalarSchema { primitive: Primitive::Array, .. })
        ));
    }

    #[test]
    fn test_unknown_type_becomes_unsupported() {
        let schema = parse(json!({
            "type": "object",
            "properties": {
                "weird": { "type": "tensor" },
                "nothing": {}
            }
        }));
        assert!(schema.node_at(path!["weird"].segments()).unwrap().is_unsupported());
        assert!(schema.node_at(path!["nothing"].segments()).unwrap().is_unsupported());
    }

    #[test]
    fn test_nullable_type_list_takes_first_non_null() {
        let schema = parse(json!({
            "type": "object",
            "properties": { "tag": { "type": ["null", "string"] } }
        }));
        let node = schema.node_at(path!["tag"].segments()).unwrap();
        assert!(matches!(
            node.kind,
            NodeKind::Scalar(ScalarSchema { primitive: Primitive::String, .. })
        ));
    }

    #[test]
    fn test_local_ref_is_inlined_with_sibling_overrides() {
        let schema = parse(json!({
            "type": "object",
            "definitions": {
                "port": { "type": "integer", "minimum": 1, "maximum": 65535 }
            },
            "properties": {
                "http": { "$ref": "#/definitions/port", "title": "HTTP port" }
            }
        }));
        let node = schema.node_at(path!["http"].segments()).unwrap();
        assert_eq!(node.meta.title.as_deref(), Some("HTTP port"));
        let NodeKind::Scalar(scalar) = &node.kind else {
            panic!("expected scalar");
        };
        assert_eq!(scalar.maximum, Some(65535.0));
    }

    #[test]
    fn test_recursive_ref_stops_at_max_depth() {
        let raw = json!({
            "type": "object",
            "definitions": {
                "tree": {
                    "type": "object",
                    "properties": { "child": { "$ref": "#/definitions/tree" } }
                }
            },
            "properties": { "root": { "$ref": "#/definitions/tree" } }
        });
        let schema = parse_schema(&raw, 6).unwrap();
        // Walk down until the guard kicks in.
        let mut segments = vec![PathSegment::Key("root".into())];
        loop {
            let node = schema.node_at(&segments).unwrap();
            if node.is_unsupported() {
                break;
            }
            segments.push(PathSegment::Key("child".into()));
            assert!(segments.len() < 10, "depth guard never triggered");
        }
    }

    #[test]
    fn test_root_must_be_object() {
        let err = parse_schema(&json!({"type": "string"}), 32).unwrap_err();
        assert!(matches!(err, LauncherError::SchemaError { .. }));
    }

    #[test]
    fn test_allows_follows_declared_shape() {
        let schema = parse(json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "replicas": { "type": "integer" },
                "env": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": { "name": { "type": "string" } }
                    }
                },
                "annotations": { "type": "object" }
            }
        }));
        assert!(schema.allows(path!["replicas"].segments()));
        assert!(!schema.allows(path!["replicas", "nested"].segments()));
        assert!(schema.allows(path!["env", 3, "name"].segments()));
        assert!(!schema.allows(path!["env", "name"].segments()));
        assert!(schema.allows(path!["annotations", "anything", "goes"].segments()));
        assert!(!schema.allows(path!["undeclared"].segments()));
        // Open object (default additionalProperties) under env items.
        assert!(schema.allows(path!["env", 0, "extra"].segments()));
    }

    #[test]
    fn test_item_template_uses_defaults_and_zero_values() {
        let schema = parse(json!({
            "type": "object",
            "properties": {
                "env": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "value": { "type": "string", "default": "x" },
                            "secret": { "type": "boolean" },
                            "mode": { "type": "string", "enum": ["a", "b"] }
                        }
                    }
                }
            }
        }));
        let env = schema.node_at(path!["env"].segments()).unwrap();
        assert_eq!(
            env.item_template(),
            Some(json!({"name": "", "value": "x", "secret": false, "mode": "a"}))
        );
    }

    #[test]
    fn test_slider_string_zero_value_carries_unit() {
        let schema = parse(json!({
            "type": "object",
            "properties": {
                "memory": {
                    "type": "string",
                    "x-onyxia": { "render": "slider", "sliderMin": 1, "sliderMax": 8, "sliderUnit": "Gi" }
                }
            }
        }));
        let node = schema.node_at(path!["memory"].segments()).unwrap();
        assert_eq!(node.default_value(), json!("1Gi"));
    }
}
